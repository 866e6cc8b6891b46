//! Feed-side contract. Provider adapters live outside this crate; anything
//! that can yield ticks in observation order per symbol can drive the
//! valuation engines.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::PriceTick;
use crate::errors::Result;

/// A stream of price observations.
///
/// Delivery is at-least-once: duplicates and replays are expected and are
/// deduplicated downstream by `(symbol, observed_at)`.
#[async_trait]
pub trait PriceTickSource: Send {
    /// Next tick, or `None` once the feed is exhausted.
    async fn next_tick(&mut self) -> Result<Option<PriceTick>>;
}

/// Channel-backed source for tests and embedders that push ticks by hand.
pub struct ChannelTickSource {
    rx: mpsc::Receiver<PriceTick>,
}

impl ChannelTickSource {
    /// Returns the push side and the source. Dropping the sender ends the
    /// feed.
    pub fn pair(capacity: usize) -> (mpsc::Sender<PriceTick>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }
}

#[async_trait]
impl PriceTickSource for ChannelTickSource {
    async fn next_tick(&mut self) -> Result<Option<PriceTick>> {
        Ok(self.rx.recv().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_channel_source_yields_pushed_ticks_then_ends() {
        let (tx, mut source) = ChannelTickSource::pair(4);
        tx.send(PriceTick::new("AAPL", dec!(101), Utc::now()))
            .await
            .unwrap();
        drop(tx);

        let tick = source.next_tick().await.unwrap().unwrap();
        assert_eq!(tick.symbol.as_str(), "AAPL");
        assert!(source.next_tick().await.unwrap().is_none());
    }
}
