//! Checkpointed projection of committed events into read models.

use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, warn};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::{
    HoldingRow, HoldingsReadModelTrait, LedgerEntryRow, LedgerReadModelTrait,
    ProjectionCheckpointTrait,
};
use crate::errors::Result;
use crate::events::{EventRecord, EventStoreTrait, PortfolioId};
use crate::portfolio::{reducer, Portfolio};

/// Maintains the holdings and ledger read models from the committed stream.
///
/// Progress per aggregate is a checkpoint of the last applied version.
/// Records at or below the checkpoint are skipped, which makes delivery
/// effectively exactly-once over an at-least-once channel; a record further
/// ahead than `checkpoint + 1` triggers catch-up from the event store, so a
/// lagging or restarted projector heals itself.
pub struct Projector {
    event_store: Arc<dyn EventStoreTrait>,
    holdings: Arc<dyn HoldingsReadModelTrait>,
    ledger: Arc<dyn LedgerReadModelTrait>,
    checkpoints: Arc<dyn ProjectionCheckpointTrait>,
    /// Folded aggregate state per checkpoint, so the hot path applies one
    /// event instead of replaying the stream.
    books: DashMap<PortfolioId, Portfolio>,
}

impl Projector {
    pub fn new(
        event_store: Arc<dyn EventStoreTrait>,
        holdings: Arc<dyn HoldingsReadModelTrait>,
        ledger: Arc<dyn LedgerReadModelTrait>,
        checkpoints: Arc<dyn ProjectionCheckpointTrait>,
    ) -> Self {
        Self {
            event_store,
            holdings,
            ledger,
            checkpoints,
            books: DashMap::new(),
        }
    }

    /// Consumes committed records from a broadcast subscription until the
    /// sender side is dropped. A lagged subscription is only logged; the next
    /// record's gap check reconciles from the store.
    pub fn spawn(self: Arc<Self>, mut rx: broadcast::Receiver<EventRecord>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(record) => {
                        if let Err(err) = self.apply(&record).await {
                            warn!(
                                "projection of {} v{} failed: {err}",
                                record.aggregate_id, record.version
                            );
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("projector lagged by {missed} records, will catch up from store");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Applies one committed record idempotently.
    pub async fn apply(&self, record: &EventRecord) -> Result<()> {
        let checkpoint = self.checkpoints.load(&record.aggregate_id)?;
        if record.version <= checkpoint {
            debug!(
                "skipping {} v{}: checkpoint at {checkpoint}",
                record.aggregate_id, record.version
            );
            return Ok(());
        }

        if record.version > checkpoint + 1 {
            warn!(
                "gap for {}: checkpoint {checkpoint}, saw v{}, catching up",
                record.aggregate_id, record.version
            );
            let tail = self
                .event_store
                .read_from(&record.aggregate_id, checkpoint + 1)?;
            for stored in &tail {
                self.project(stored).await?;
            }
            return Ok(());
        }

        self.project(record).await
    }

    /// Projects everything appended past the checkpoints, stream by stream.
    /// Run at startup before live delivery begins.
    pub async fn catch_up(&self) -> Result<()> {
        let mut ids = self.event_store.aggregate_ids()?;
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        for aggregate_id in ids {
            let checkpoint = self.checkpoints.load(&aggregate_id)?;
            for record in self.event_store.read_from(&aggregate_id, checkpoint + 1)? {
                self.project(&record).await?;
            }
        }
        Ok(())
    }

    /// Drops both read models and re-projects the full log. Produces the same
    /// rows no matter how often it runs or what was projected before.
    pub async fn rebuild(&self) -> Result<()> {
        debug!("rebuilding read models from genesis");
        self.holdings.clear().await?;
        self.ledger.clear().await?;
        self.checkpoints.reset().await?;
        self.books.clear();

        let mut ids = self.event_store.aggregate_ids()?;
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        for aggregate_id in ids {
            for record in self.event_store.read_from(&aggregate_id, 1)? {
                self.project(&record).await?;
            }
        }
        Ok(())
    }

    async fn project(&self, record: &EventRecord) -> Result<()> {
        let checkpoint = self.checkpoints.load(&record.aggregate_id)?;
        if record.version <= checkpoint {
            return Ok(());
        }

        let mut book = self.book_before(&record.aggregate_id, record.version)?;
        reducer::apply(&mut book, record)?;

        self.ledger.insert(LedgerEntryRow::from_record(record)).await?;
        if let Some(symbol) = record.payload.symbol() {
            if let Some(position) = book.position(symbol) {
                self.holdings
                    .upsert(HoldingRow::from_position(
                        &record.aggregate_id,
                        position,
                        record.recorded_at,
                    ))
                    .await?;
            }
        }

        self.checkpoints
            .save(&record.aggregate_id, record.version)
            .await?;
        self.books.insert(record.aggregate_id.clone(), book);
        Ok(())
    }

    /// State as of `version - 1`: the cached book when it lines up, otherwise
    /// a fold of the stored prefix. A skewed cache entry is discarded rather
    /// than trusted.
    fn book_before(&self, aggregate_id: &PortfolioId, version: u64) -> Result<Portfolio> {
        if let Some(book) = self.books.get(aggregate_id) {
            if book.version + 1 == version {
                return Ok(book.clone());
            }
        }
        let prefix: Vec<EventRecord> = self
            .event_store
            .read_from(aggregate_id, 1)?
            .into_iter()
            .filter(|r| r.version < version)
            .collect();
        reducer::replay(Portfolio::seed(aggregate_id.clone()), &prefix)
    }
}
