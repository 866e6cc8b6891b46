//! Ledger engine facade: one constructor that wires the write path, the
//! consumers, and the query side together.
//!
//! Embedders that need custom wiring can assemble the parts themselves; this
//! covers the common case. Committed records fan out over a broadcast sink to
//! three consumers (snapshotter, projector, valuation), each behind its own
//! partitioned router so one slow aggregate cannot stall the others. Ticks
//! enter through a symbol-partitioned router shared by the valuation and risk
//! engines.

use std::sync::Arc;

use async_trait::async_trait;
use log::warn;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::constants::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_PARTITIONS};
use crate::dispatch::{PartitionWorker, PartitionedRouter};
use crate::errors::Result;
use crate::events::{BroadcastEventSink, EventRecord, EventStoreTrait};
use crate::portfolio::snapshot::{SnapshotPolicy, SnapshotStoreTrait, Snapshotter};
use crate::portfolio::{CommandEnvelope, CommandReceipt, PortfolioCommandService, RetryPolicy};
use crate::pricing::{PriceCache, PriceTick};
use crate::projections::{
    HoldingsReadModelTrait, LedgerReadModelTrait, ProjectionCheckpointTrait, Projector,
};
use crate::queries::QueryService;
use crate::risk::{RiskConfig, RiskEngine};
use crate::valuation::{ValuationConfig, ValuationEngine};

/// Settings for every part the engine wires up.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub retry: RetryPolicy,
    pub snapshots: SnapshotPolicy,
    pub valuation: ValuationConfig,
    pub risk: RiskConfig,
    /// Worker partitions per consumer.
    pub partitions: usize,
    /// Bounded capacity of each partition channel and of the broadcast sink.
    pub channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            snapshots: SnapshotPolicy::default(),
            valuation: ValuationConfig::default(),
            risk: RiskConfig::default(),
            partitions: DEFAULT_PARTITIONS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

struct ProjectionWorker {
    projector: Arc<Projector>,
}

#[async_trait]
impl PartitionWorker for ProjectionWorker {
    type Item = EventRecord;

    async fn handle(&mut self, record: EventRecord) {
        if let Err(err) = self.projector.apply(&record).await {
            warn!(
                "projection of {} v{} failed: {err}",
                record.aggregate_id, record.version
            );
        }
    }
}

struct ValuationEventWorker {
    engine: Arc<ValuationEngine>,
}

#[async_trait]
impl PartitionWorker for ValuationEventWorker {
    type Item = EventRecord;

    async fn handle(&mut self, record: EventRecord) {
        if let Err(err) = self.engine.handle_event(&record) {
            warn!(
                "valuation of {} v{} failed: {err}",
                record.aggregate_id, record.version
            );
        }
    }
}

struct TickWorker {
    valuation: Arc<ValuationEngine>,
    risk: Arc<RiskEngine>,
}

#[async_trait]
impl PartitionWorker for TickWorker {
    type Item = PriceTick;

    async fn handle(&mut self, tick: PriceTick) {
        // Benchmark close first, so valuations recomputed by this tick pair
        // against an up-to-date benchmark series.
        self.risk.handle_tick(&tick);
        let symbol = tick.symbol.clone();
        if let Err(err) = self.valuation.handle_tick(tick) {
            warn!("tick for {symbol} failed: {err}");
        }
    }
}

/// A running ledger engine.
pub struct LedgerEngine {
    commands: PortfolioCommandService,
    queries: QueryService,
    sink: Arc<BroadcastEventSink>,
    tick_router: PartitionedRouter<PriceTick>,
    tasks: Vec<JoinHandle<()>>,
}

impl LedgerEngine {
    /// Resumes the consumers from their checkpoints, folds the valuation
    /// books, and spawns the pipeline.
    pub async fn start(
        event_store: Arc<dyn EventStoreTrait>,
        snapshot_store: Arc<dyn SnapshotStoreTrait>,
        holdings: Arc<dyn HoldingsReadModelTrait>,
        ledger: Arc<dyn LedgerReadModelTrait>,
        checkpoints: Arc<dyn ProjectionCheckpointTrait>,
        config: EngineConfig,
    ) -> Result<Self> {
        let partitions = config.partitions.max(1);
        let capacity = config.channel_capacity.max(16);

        let sink = Arc::new(BroadcastEventSink::new(capacity));
        let prices = Arc::new(PriceCache::new());

        let commands = PortfolioCommandService::new(
            event_store.clone(),
            snapshot_store.clone(),
            sink.clone(),
        )
        .with_retry_policy(config.retry);

        let valuation = Arc::new(
            ValuationEngine::new(event_store.clone(), prices).with_config(config.valuation),
        );
        let risk = Arc::new(RiskEngine::new(config.risk));
        valuation.subscribe(risk.clone());

        let projector = Arc::new(Projector::new(
            event_store.clone(),
            holdings.clone(),
            ledger.clone(),
            checkpoints,
        ));

        // Catch up on whatever was appended while we were not running.
        projector.catch_up().await?;
        valuation.warm_start()?;

        let snapshotter = Arc::new(
            Snapshotter::new(event_store, snapshot_store).with_policy(config.snapshots),
        );

        let mut tasks = Vec::new();
        tasks.push(snapshotter.spawn(sink.subscribe()));
        tasks.push(spawn_event_pipeline(sink.subscribe(), partitions, capacity, {
            let projector = projector.clone();
            move |_| ProjectionWorker {
                projector: projector.clone(),
            }
        }));
        tasks.push(spawn_event_pipeline(sink.subscribe(), partitions, capacity, {
            let valuation = valuation.clone();
            move |_| ValuationEventWorker {
                engine: valuation.clone(),
            }
        }));

        let tick_router = PartitionedRouter::new(
            partitions,
            capacity,
            |tick: &PriceTick| tick.symbol.as_str(),
            {
                let valuation = valuation.clone();
                let risk = risk.clone();
                move |_| TickWorker {
                    valuation: valuation.clone(),
                    risk: risk.clone(),
                }
            },
        );

        let queries = QueryService::new(holdings, ledger, valuation, risk);

        Ok(Self {
            commands,
            queries,
            sink,
            tick_router,
            tasks,
        })
    }

    /// Handles one command end to end.
    pub async fn execute(&self, envelope: CommandEnvelope) -> Result<CommandReceipt> {
        self.commands.execute(envelope).await
    }

    /// Routes a price tick to its symbol's partition.
    pub async fn submit_tick(&self, tick: PriceTick) -> Result<()> {
        self.tick_router.dispatch(tick).await
    }

    pub fn queries(&self) -> &QueryService {
        &self.queries
    }

    /// Stops the pipeline, draining everything already accepted.
    pub async fn shutdown(self) {
        let Self {
            commands,
            queries,
            sink,
            tick_router,
            tasks,
        } = self;
        // The broadcast channel closes once every sink handle is gone; the
        // command service holds one.
        drop(commands);
        drop(queries);
        drop(sink);

        tick_router.shutdown().await;
        for task in tasks {
            let _ = task.await;
        }
    }
}

/// Forwards one broadcast subscription into a partitioned router until the
/// sink closes, then drains the router.
fn spawn_event_pipeline<W, F>(
    mut rx: broadcast::Receiver<EventRecord>,
    partitions: usize,
    capacity: usize,
    make_worker: F,
) -> JoinHandle<()>
where
    W: PartitionWorker<Item = EventRecord>,
    F: FnMut(usize) -> W,
{
    let router = PartitionedRouter::new(
        partitions,
        capacity,
        |record: &EventRecord| record.aggregate_id.as_str(),
        make_worker,
    );
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(record) => {
                    if router.dispatch(record).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("event consumer lagged by {missed} records");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        router.shutdown().await;
    })
}
