//! Client view domain models.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::clients_constants::{
    BOOKKEEPING_COLUMNS, DEFAULT_CACHE_TTL, FIELD_ALIASES, OPTIONAL_FIELDS, REQUIRED_FIELDS,
    RESERVED_FIELDS,
};
use crate::collections::{
    Record, REGISTRY_COLLECTION, REPORTED_BY_OTHER_COLLECTION, SELF_REPORTED_COLLECTION,
};
use crate::errors::{Result, ValidationError};

/// The three ranked origins a client description can come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientTier {
    /// Filled directly by the client. Highest priority.
    SelfReported,
    /// Curated master record.
    Registry,
    /// Filled by an employee on the client's behalf. Lowest priority.
    ReportedByOther,
}

impl ClientTier {
    /// Priority rank, 1 being the most trusted.
    pub fn rank(&self) -> u8 {
        match self {
            ClientTier::SelfReported => 1,
            ClientTier::Registry => 2,
            ClientTier::ReportedByOther => 3,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ClientTier::SelfReported => "Client-filled onboarding forms (highest priority)",
            ClientTier::Registry => "Master client registry records",
            ClientTier::ReportedByOther => "Employee-filled submission data (lowest priority)",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClientTier::SelfReported => "self_reported",
            ClientTier::Registry => "registry",
            ClientTier::ReportedByOther => "reported_by_other",
        }
    }

    /// Name of the collection that stores this tier.
    pub fn collection_name(&self) -> &'static str {
        match self {
            ClientTier::SelfReported => SELF_REPORTED_COLLECTION,
            ClientTier::Registry => REGISTRY_COLLECTION,
            ClientTier::ReportedByOther => REPORTED_BY_OTHER_COLLECTION,
        }
    }

    /// All tiers ordered from most to least trusted.
    pub fn all() -> [ClientTier; 3] {
        [
            ClientTier::SelfReported,
            ClientTier::Registry,
            ClientTier::ReportedByOther,
        ]
    }
}

/// Partial description of a client as seen by one origin.
///
/// Field names are canonical camelCase regardless of the column naming of
/// the collection the view was read from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientView {
    pub tier: ClientTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl ClientView {
    pub fn new(tier: ClientTier, name: impl Into<String>) -> Self {
        Self {
            tier,
            id: None,
            name: name.into(),
            created_at: None,
            fields: BTreeMap::new(),
        }
    }

    /// Sets a field; reserved member names are ignored.
    pub fn with_field(mut self, column: &str, value: impl Into<Value>) -> Self {
        let field = canonical_field(column);
        if !is_reserved(&field) {
            self.fields.insert(field, value.into());
        }
        self
    }

    /// Builds a view from raw column values.
    ///
    /// Fails when no non-empty name column is present.
    pub fn from_values(tier: ClientTier, values: &Map<String, Value>) -> Result<Self> {
        let mut name: Option<String> = None;
        let mut fields = BTreeMap::new();

        for (column, value) in values {
            if BOOKKEEPING_COLUMNS.contains(&column.as_str()) {
                continue;
            }
            let field = canonical_field(column);
            if field == "name" {
                if let Some(candidate) = value.as_str().map(str::trim).filter(|s| !s.is_empty()) {
                    name = Some(candidate.to_string());
                }
                continue;
            }
            if is_reserved(&field) {
                debug!("Dropping column '{}': it shadows a view member", column);
                continue;
            }
            fields.insert(field, value.clone());
        }

        let name = name.ok_or_else(|| ValidationError::MissingField("name".to_string()))?;
        Ok(Self {
            tier,
            id: None,
            name,
            created_at: None,
            fields,
        })
    }

    pub fn from_record(tier: ClientTier, record: &Record) -> Result<Self> {
        let mut view = Self::from_values(tier, &record.values)?;
        view.id = Some(record.id.clone());
        view.created_at = Some(record.created_at);
        Ok(view)
    }

    /// Normalized lookup key for this view.
    pub fn key(&self) -> String {
        normalize_name(&self.name)
    }

    pub fn field_str(&self, field: &str) -> Option<String> {
        self.fields
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn completeness_percent(&self) -> u8 {
        completeness_percent(&self.name, &self.fields)
    }
}

/// The reconciled record consumers read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedClientView {
    pub name: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
    pub data_source: ClientTier,
    pub has_highest_tier_data: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier_date: Option<DateTime<Utc>>,
    pub completeness_percent: u8,
}

impl MergedClientView {
    /// Wraps a single view without consulting any other tier.
    pub fn passthrough(view: &ClientView) -> Self {
        Self {
            name: view.name.clone(),
            fields: view.fields.clone(),
            data_source: view.tier,
            has_highest_tier_data: view.tier == ClientTier::SelfReported,
            tier_date: None,
            completeness_percent: view.completeness_percent(),
        }
    }
}

/// Lightweight indicator payload for one client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSummary {
    pub client_name: String,
    pub has_highest_tier_data: bool,
    pub tier_date: Option<DateTime<Utc>>,
    pub submission_status: Option<String>,
    pub assigned_team: Option<String>,
    pub completeness_percent: u8,
    pub data_source: ClientTier,
}

/// Configuration for the merge engine.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    pub cache_ttl: Duration,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

/// Trim + lowercase. Entity matching is exact on the result.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Maps a collection column onto its canonical field name.
fn is_reserved(field: &str) -> bool {
    RESERVED_FIELDS.contains(&field)
}

pub fn canonical_field(column: &str) -> String {
    if let Some((_, field)) = FIELD_ALIASES.iter().find(|(alias, _)| *alias == column) {
        return field.to_string();
    }

    let mut field = String::with_capacity(column.len());
    let mut upper_next = false;
    for ch in column.chars() {
        if ch == '_' {
            upper_next = !field.is_empty();
        } else if upper_next {
            field.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            field.push(ch);
        }
    }
    field
}

/// Whether a value counts as supplied for completeness and fallback purposes.
pub fn is_filled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

/// Percentage (0-100, rounded) of checklist fields that are filled.
pub fn completeness_percent(name: &str, fields: &BTreeMap<String, Value>) -> u8 {
    let total = REQUIRED_FIELDS.len() + OPTIONAL_FIELDS.len();
    let filled = REQUIRED_FIELDS
        .iter()
        .chain(OPTIONAL_FIELDS.iter())
        .filter(|column| {
            let field = canonical_field(column);
            if field == "name" {
                !name.trim().is_empty()
            } else {
                fields.get(&field).is_some_and(is_filled)
            }
        })
        .count();

    ((filled as f64 / total as f64) * 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_field_handles_aliases_and_snake_case() {
        assert_eq!(canonical_field("client_type"), "clientType");
        assert_eq!(canonical_field("website_url"), "website");
        assert_eq!(canonical_field("client_name"), "name");
        assert_eq!(canonical_field("customer_pain_points"), "customerPainPoints");
        assert_eq!(canonical_field("clientType"), "clientType");
        assert_eq!(canonical_field("_private"), "private");
    }

    #[test]
    fn from_values_requires_a_name() {
        let values = json!({"client_type": "SaaS"});
        let err = ClientView::from_values(ClientTier::Registry, values.as_object().unwrap())
            .unwrap_err();
        assert!(err.to_string().contains("name"));

        let blank = json!({"name": "   "});
        assert!(ClientView::from_values(ClientTier::Registry, blank.as_object().unwrap()).is_err());
    }

    #[test]
    fn from_values_maps_columns_to_canonical_fields() {
        let values = json!({
            "id": "r1",
            "client_name": " Acme ",
            "website_url": "https://acme.test",
            "company_size": "50-100",
        });
        let view =
            ClientView::from_values(ClientTier::SelfReported, values.as_object().unwrap()).unwrap();
        assert_eq!(view.name, "Acme");
        assert_eq!(view.field_str("website").as_deref(), Some("https://acme.test"));
        assert_eq!(view.field_str("companySize").as_deref(), Some("50-100"));
        assert!(!view.fields.contains_key("id"));
    }

    #[test]
    fn completeness_counts_name_and_non_empty_fields() {
        let view = ClientView::new(ClientTier::SelfReported, "Acme");
        // name only: 1 of 21
        assert_eq!(view.completeness_percent(), 5);

        let view = view
            .with_field("email", "ops@acme.test")
            .with_field("keywords", json!([]))
            .with_field("customer_fears", json!(["churn"]))
            .with_field("phone", "");
        // name, email, customer_fears: 3 of 21
        assert_eq!(view.completeness_percent(), 14);
    }

    #[test]
    fn merged_view_serializes_camel_case() {
        let view = ClientView::new(ClientTier::Registry, "Acme").with_field("client_type", "SaaS");
        let merged = MergedClientView::passthrough(&view);
        let json = serde_json::to_value(&merged).unwrap();
        assert_eq!(json["dataSource"], "registry");
        assert_eq!(json["clientType"], "SaaS");
        assert_eq!(json["hasHighestTierData"], false);
        assert!(json.get("tierDate").is_none());
    }

    #[test]
    fn columns_shadowing_view_members_are_dropped() {
        let values = json!({
            "name": "Acme",
            "data_source": "spoofed",
            "tier": "self_reported",
            "tierDate": "2020-01-01",
            "completeness_percent": 100,
            "industry": "Retail",
        });
        let view =
            ClientView::from_values(ClientTier::Registry, values.as_object().unwrap()).unwrap();
        assert_eq!(view.fields.len(), 1);
        assert_eq!(view.field_str("industry").as_deref(), Some("Retail"));

        let view = view.with_field("has_highest_tier_data", true);
        assert!(!view.fields.contains_key("hasHighestTierData"));

        let encoded = serde_json::to_string(&MergedClientView::passthrough(&view)).unwrap();
        assert_eq!(encoded.matches("\"dataSource\"").count(), 1);
        assert_eq!(encoded.matches("\"completenessPercent\"").count(), 1);
        let json: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(json["dataSource"], "registry");
        assert_eq!(json["hasHighestTierData"], false);
        assert!(json.get("tierDate").is_none());

        let encoded = serde_json::to_string(&view).unwrap();
        assert_eq!(encoded.matches("\"tier\"").count(), 1);
    }

    #[test]
    fn tiers_are_ranked() {
        let ranks: Vec<u8> = ClientTier::all().iter().map(ClientTier::rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
        assert_eq!(ClientTier::SelfReported.collection_name(), "client_onboarding");
    }
}
