//! Background snapshotting.
//!
//! Watches committed events and refreshes an aggregate's snapshot when the
//! policy says replay has become expensive enough to be worth shortening.
//! Everything here is best-effort: a failed or skipped snapshot costs
//! replay time, never correctness.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use log::{debug, warn};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::constants::DEFAULT_SNAPSHOT_EVERY;
use crate::errors::Result;
use crate::events::{EventRecord, EventStoreTrait, PortfolioId};
use crate::portfolio::command_service::load_portfolio;

use super::{PortfolioSnapshot, SnapshotStoreTrait};

/// When to refresh an aggregate's snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotPolicy {
    /// Refresh once this many events have accumulated past the snapshot.
    pub every_n_events: u64,
    /// Also refresh when the snapshot is older than this and new events
    /// have arrived. Only applies once a first snapshot exists.
    pub max_age: Duration,
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self {
            every_n_events: DEFAULT_SNAPSHOT_EVERY,
            max_age: Duration::minutes(15),
        }
    }
}

/// Consumes committed events and keeps snapshots fresh per policy.
pub struct Snapshotter {
    event_store: Arc<dyn EventStoreTrait>,
    snapshot_store: Arc<dyn SnapshotStoreTrait>,
    policy: SnapshotPolicy,
    /// Last snapshot (version, taken_at) per aggregate, to avoid hitting
    /// the snapshot store on every committed event.
    last_taken: DashMap<PortfolioId, (u64, DateTime<Utc>)>,
}

impl Snapshotter {
    pub fn new(
        event_store: Arc<dyn EventStoreTrait>,
        snapshot_store: Arc<dyn SnapshotStoreTrait>,
    ) -> Self {
        Self {
            event_store,
            snapshot_store,
            policy: SnapshotPolicy::default(),
            last_taken: DashMap::new(),
        }
    }

    pub fn with_policy(mut self, policy: SnapshotPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Spawns the background loop over a committed-event subscription.
    ///
    /// The loop runs until the sink side is dropped. Lag is harmless here:
    /// the policy check reads the live stream version, so skipped records
    /// only delay the next check.
    pub fn spawn(self: Arc<Self>, mut rx: broadcast::Receiver<EventRecord>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(record) => self.observe(&record).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("snapshotter lagged behind committed events, skipped {skipped}");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Checks the policy for the record's aggregate and snapshots when due.
    pub async fn observe(&self, record: &EventRecord) {
        if !self.due(&record.aggregate_id, record.version) {
            return;
        }
        if let Err(err) = self.take_snapshot(&record.aggregate_id).await {
            warn!("snapshot of {} failed: {err}", record.aggregate_id);
        }
    }

    /// Rebuilds current state and saves it as the aggregate's snapshot.
    /// Returns the snapshotted version.
    pub async fn take_snapshot(&self, aggregate_id: &PortfolioId) -> Result<u64> {
        let state = load_portfolio(
            self.event_store.as_ref(),
            self.snapshot_store.as_ref(),
            aggregate_id,
        )?;
        if !state.exists() {
            return Ok(0);
        }

        let snapshot = PortfolioSnapshot::capture(state);
        let version = snapshot.version;
        let taken_at = snapshot.taken_at;
        self.snapshot_store.save(&snapshot).await?;
        self.last_taken
            .insert(aggregate_id.clone(), (version, taken_at));

        debug!("snapshotted {aggregate_id} at v{version}");
        Ok(version)
    }

    fn due(&self, aggregate_id: &PortfolioId, head_version: u64) -> bool {
        let last = self
            .last_taken
            .get(aggregate_id)
            .map(|entry| *entry.value())
            .or_else(|| {
                self.snapshot_store
                    .load_latest(aggregate_id)
                    .ok()
                    .flatten()
                    .map(|s| (s.version, s.taken_at))
            });

        match last {
            None => head_version >= self.policy.every_n_events,
            Some((version, taken_at)) => {
                if head_version <= version {
                    return false;
                }
                head_version - version >= self.policy.every_n_events
                    || Utc::now() - taken_at >= self.policy.max_age
            }
        }
    }
}
