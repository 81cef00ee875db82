use std::any::Any;
use std::sync::Arc;

use diesel::SqliteConnection;
use log::{debug, error};
use tokio::sync::{mpsc, oneshot};

use super::{get_connection, DbConnection, DbPool};
use crate::errors::StorageError;
use opsdesk_core::errors::{Error, Result};

const WRITE_QUEUE_CAPACITY: usize = 1024;

type Job<T> = Box<dyn FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static>;
type Erased = Box<dyn Any + Send + 'static>;
type Envelope = (Job<Erased>, oneshot::Sender<Result<Erased>>);

/// Handle for sending jobs to the writer actor.
#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::Sender<Envelope>,
}

impl WriteHandle {
    /// Runs `job` inside an immediate transaction on the writer's connection.
    ///
    /// Jobs execute one at a time in submission order.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (ret_tx, ret_rx) = oneshot::channel();
        let erased: Job<Erased> = Box::new(move |conn| job(conn).map(|v| Box::new(v) as Erased));

        self.tx
            .send((erased, ret_tx))
            .await
            .map_err(|_| Error::Unexpected("Write actor has stopped".to_string()))?;

        let boxed = ret_rx
            .await
            .map_err(|_| Error::Unexpected("Write actor dropped the reply".to_string()))??;

        boxed
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| Error::Unexpected("Write actor returned an unexpected type".to_string()))
    }
}

/// Spawns the single database writer.
///
/// The actor holds one pooled connection and serializes every write through
/// it. A failed checkout is reported to the waiting job and retried on the
/// next one.
pub fn spawn_writer(pool: Arc<DbPool>) -> WriteHandle {
    let (tx, mut rx) = mpsc::channel::<Envelope>(WRITE_QUEUE_CAPACITY);

    tokio::spawn(async move {
        let mut conn: Option<DbConnection> = None;

        while let Some((job, reply_tx)) = rx.recv().await {
            if conn.is_none() {
                match get_connection(&pool) {
                    Ok(fresh) => conn = Some(fresh),
                    Err(e) => {
                        error!("Write actor could not acquire a connection: {}", e);
                        let _ = reply_tx.send(Err(e));
                        continue;
                    }
                }
            }
            let Some(active) = conn.as_mut() else {
                continue;
            };

            let result = active
                .immediate_transaction::<_, StorageError, _>(|c| job(c).map_err(StorageError::from))
                .map_err(Error::from);

            // The caller may have given up waiting.
            let _ = reply_tx.send(result);
        }
        debug!("Write actor stopped");
    });

    WriteHandle { tx }
}
