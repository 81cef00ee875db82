use std::{net::SocketAddr, time::Duration};

use anyhow::Context;

pub struct Config {
    pub listen_addr: SocketAddr,
    pub data_dir: String,
    pub cors_allow: Vec<String>,
    pub request_timeout: Duration,
    pub cache_ttl: Duration,
    pub sync_retries: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let listen_addr: SocketAddr = env_or("OPSDESK_LISTEN_ADDR", "0.0.0.0:8080")
            .parse()
            .context("Invalid OPSDESK_LISTEN_ADDR")?;
        let data_dir = env_or("OPSDESK_DATA_DIR", "./data");
        let cors_allow = env_or("OPSDESK_CORS_ALLOW_ORIGINS", "*")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let timeout_ms: u64 = env_or("OPSDESK_REQUEST_TIMEOUT_MS", "30000")
            .parse()
            .unwrap_or(30_000);
        let cache_ttl_secs: u64 = env_or("OPSDESK_CACHE_TTL_SECS", "300")
            .parse()
            .unwrap_or(300);
        let sync_retries: u32 = env_or("OPSDESK_SYNC_RETRIES", "3").parse().unwrap_or(3);

        Ok(Self {
            listen_addr,
            data_dir,
            cors_allow,
            request_timeout: Duration::from_millis(timeout_ms),
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            sync_retries,
        })
    }

    /// Defaults rooted at `data_dir`, without reading the environment.
    pub fn with_data_dir(data_dir: impl Into<String>) -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            data_dir: data_dir.into(),
            cors_allow: vec!["*".to_string()],
            request_timeout: Duration::from_secs(30),
            cache_ttl: Duration::from_secs(300),
            sync_retries: 3,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
