//! Hash-partitioned dispatch over a fixed pool of channel workers.
//!
//! Every item carries a routing key. Items with the same key always land on
//! the same worker, in send order; items with different keys may be handled
//! concurrently. Consumers partition events by aggregate and ticks by symbol.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use log::debug;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::errors::{Error, Result};

/// One partition's consumer. A worker owns its partition for the lifetime of
/// the router and sees that partition's items strictly in arrival order.
#[async_trait]
pub trait PartitionWorker: Send + 'static {
    type Item: Send + 'static;

    async fn handle(&mut self, item: Self::Item);
}

/// Routes items onto `n` bounded channels by hashing their key.
///
/// Senders block when a partition's channel is full, which backpressures the
/// producer instead of dropping work. Workers block on `recv` when idle.
pub struct PartitionedRouter<T> {
    senders: Vec<mpsc::Sender<T>>,
    key_of: fn(&T) -> &str,
    handles: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> PartitionedRouter<T> {
    /// Spawns one worker task per partition. `make_worker` is called once per
    /// partition with the partition index.
    pub fn new<W, F>(partitions: usize, capacity: usize, key_of: fn(&T) -> &str, mut make_worker: F) -> Self
    where
        W: PartitionWorker<Item = T>,
        F: FnMut(usize) -> W,
    {
        let partitions = partitions.max(1);
        let mut senders = Vec::with_capacity(partitions);
        let mut handles = Vec::with_capacity(partitions);

        for index in 0..partitions {
            let (tx, mut rx) = mpsc::channel::<T>(capacity.max(1));
            let mut worker = make_worker(index);
            handles.push(tokio::spawn(async move {
                while let Some(item) = rx.recv().await {
                    worker.handle(item).await;
                }
                debug!("partition {index} drained, worker stopping");
            }));
            senders.push(tx);
        }

        Self {
            senders,
            key_of,
            handles,
        }
    }

    /// Hands the item to its key's worker, waiting when that partition's
    /// queue is full.
    pub async fn dispatch(&self, item: T) -> Result<()> {
        let slot = partition_of((self.key_of)(&item), self.senders.len());
        self.senders[slot]
            .send(item)
            .await
            .map_err(|_| Error::Unexpected(format!("partition {slot} is no longer accepting work")))
    }

    pub fn partitions(&self) -> usize {
        self.senders.len()
    }

    /// Closes all partitions and waits for the workers to drain what was
    /// already queued.
    pub async fn shutdown(self) {
        drop(self.senders);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

fn partition_of(key: &str, partitions: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % partitions as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        index: usize,
        seen: Arc<Mutex<Vec<(usize, String, u64)>>>,
    }

    #[async_trait]
    impl PartitionWorker for Recorder {
        type Item = (String, u64);

        async fn handle(&mut self, (key, seq): (String, u64)) {
            self.seen.lock().unwrap().push((self.index, key, seq));
        }
    }

    fn router(
        partitions: usize,
    ) -> (
        PartitionedRouter<(String, u64)>,
        Arc<Mutex<Vec<(usize, String, u64)>>>,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let router = PartitionedRouter::new(partitions, 64, |item: &(String, u64)| item.0.as_str(), |index| {
            Recorder {
                index,
                seen: seen.clone(),
            }
        });
        (router, seen)
    }

    #[tokio::test]
    async fn test_same_key_is_handled_in_send_order() {
        let (router, seen) = router(4);
        for seq in 0..100u64 {
            router.dispatch(("p1".to_string(), seq)).await.unwrap();
        }
        router.shutdown().await;

        let sequence: Vec<u64> = seen.lock().unwrap().iter().map(|(_, _, s)| *s).collect();
        assert_eq!(sequence, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_each_key_sticks_to_one_partition() {
        let (router, seen) = router(4);
        for seq in 0..10u64 {
            for key in ["a", "b", "c", "d", "e", "f"] {
                router.dispatch((key.to_string(), seq)).await.unwrap();
            }
        }
        router.shutdown().await;

        let seen = seen.lock().unwrap();
        for key in ["a", "b", "c", "d", "e", "f"] {
            let partitions: std::collections::HashSet<usize> = seen
                .iter()
                .filter(|(_, k, _)| k == key)
                .map(|(p, _, _)| *p)
                .collect();
            assert_eq!(partitions.len(), 1, "key {key} visited {partitions:?}");
        }
    }

    #[tokio::test]
    async fn test_per_key_order_survives_interleaving() {
        let (router, seen) = router(3);
        for seq in 0..50u64 {
            router.dispatch(("x".to_string(), seq)).await.unwrap();
            router.dispatch(("y".to_string(), seq)).await.unwrap();
        }
        router.shutdown().await;

        let seen = seen.lock().unwrap();
        for key in ["x", "y"] {
            let sequence: Vec<u64> = seen
                .iter()
                .filter(|(_, k, _)| k == key)
                .map(|(_, _, s)| *s)
                .collect();
            assert_eq!(sequence, (0..50).collect::<Vec<_>>(), "order broken for {key}");
        }
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_items() {
        let (router, seen) = router(2);
        for seq in 0..32u64 {
            router.dispatch(("k".to_string(), seq)).await.unwrap();
        }
        router.shutdown().await;
        assert_eq!(seen.lock().unwrap().len(), 32);
    }

    #[tokio::test]
    async fn test_zero_partitions_is_clamped_to_one() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let router = PartitionedRouter::new(0, 0, |item: &(String, u64)| item.0.as_str(), |index| {
            Recorder {
                index,
                seen: seen.clone(),
            }
        });
        assert_eq!(router.partitions(), 1);
        router.dispatch(("k".to_string(), 7)).await.unwrap();
        router.shutdown().await;
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
