//! Single-writer actor for the SQLite database.
//!
//! SQLite permits one writer at a time, so every mutation funnels through a
//! dedicated actor that holds one pooled connection for its whole life. Each
//! job runs inside an immediate transaction; writes are serialized and atomic
//! without busy-retry loops in the repositories.

use std::any::Any;
use std::sync::Arc;

use diesel::SqliteConnection;
use tokio::sync::{mpsc, oneshot};

use ledgerfolio_core::errors::Result;

use super::DbPool;
use crate::errors::StorageError;

const WRITE_QUEUE_CAPACITY: usize = 1024;

// One channel carries jobs with different return types, so results cross it
// type-erased and are downcast on the caller's side.
type Job<T> = Box<dyn FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static>;
type ErasedJob = Job<Box<dyn Any + Send + 'static>>;
type Reply = oneshot::Sender<Result<Box<dyn Any + Send + 'static>>>;

/// Cloneable handle for submitting jobs to the writer actor.
#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::Sender<(ErasedJob, Reply)>,
}

impl WriteHandle {
    /// Runs `job` on the writer connection inside an immediate transaction
    /// and returns its result. Jobs execute strictly in submission order.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static + Any,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send((
                Box::new(move |conn| job(conn).map(|v| Box::new(v) as Box<dyn Any + Send>)),
                reply_tx,
            ))
            .await
            .expect("write actor stopped while handles are alive");

        reply_rx
            .await
            .expect("write actor dropped a reply sender")
            .map(|boxed: Box<dyn Any + Send + 'static>| {
                *boxed
                    .downcast::<T>()
                    .unwrap_or_else(|_| panic!("write actor reply had an unexpected type"))
            })
    }
}

/// Spawns the writer actor on the current runtime and returns its handle.
///
/// The actor exits when the last `WriteHandle` is dropped.
pub fn spawn_writer(pool: Arc<DbPool>) -> WriteHandle {
    let (tx, mut rx) = mpsc::channel::<(ErasedJob, Reply)>(WRITE_QUEUE_CAPACITY);

    tokio::spawn(async move {
        let mut conn = pool
            .get()
            .expect("no connection available for the write actor");

        while let Some((job, reply_tx)) = rx.recv().await {
            // Jobs return core errors, but the transaction wrapper needs a
            // type with From<diesel::result::Error>. Errors cross the
            // boundary as StorageError and convert back on the way out.
            let result: Result<Box<dyn Any + Send + 'static>> = conn
                .immediate_transaction::<_, StorageError, _>(|c| {
                    job(c).map_err(StorageError::from)
                })
                .map_err(|e: StorageError| e.into());

            // The caller may have given up; a dropped receiver is fine.
            let _ = reply_tx.send(result);
        }
    });

    WriteHandle { tx }
}
