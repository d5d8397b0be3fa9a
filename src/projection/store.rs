//! Projection Store
//!
//! Thread-safe holder of the published [`Projection`]. The reconciler builds a
//! complete new view off to the side and `publish` swaps it in under a short
//! write lock, so readers see either the previous cycle or the next one,
//! never a mix of old prices and new PnL.
//!
//! Readers pull through the getters, or watch for "projection updated"
//! signals (the committed block height) via `subscribe` / `updates`.

use super::snapshot::{ProjectionSnapshot, SyncStats};
use super::Projection;
use crate::types::{AgentId, AssetPrice, LeaderboardEntry, PnLSample};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

struct Inner {
    current: RwLock<Arc<Projection>>,
    updates: watch::Sender<Option<u64>>,
}

/// Cheap to clone; all clones share the same published view.
#[derive(Clone)]
pub struct ProjectionStore {
    inner: Arc<Inner>,
}

impl ProjectionStore {
    pub fn new() -> Self {
        let (updates, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                current: RwLock::new(Arc::new(Projection::default())),
                updates,
            }),
        }
    }

    /// The current published view
    pub fn load(&self) -> Arc<Projection> {
        // A panicking writer cannot leave a half-built view behind: the swap is one assignment
        let guard = self
            .inner
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Make `projection` visible as of committed block `block`
    pub fn publish(&self, mut projection: Projection, block: u64) {
        projection.set_block_number(block);
        {
            let mut guard = self
                .inner
                .current
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *guard = Arc::new(projection);
        }
        debug!("Projection published at block {}", block);
        self.inner.updates.send_replace(Some(block));
    }

    // ── Pull API ─────────────────────────────────────────────────────

    pub fn prices(&self) -> Vec<AssetPrice> {
        self.load().prices()
    }

    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.load().leaderboard().to_vec()
    }

    pub fn positions(&self, agent: AgentId) -> BTreeMap<String, Decimal> {
        self.load().positions(agent)
    }

    pub fn pnl_series(&self, agent: AgentId) -> Vec<PnLSample> {
        self.load().pnl_series(agent)
    }

    // ── Change notification ──────────────────────────────────────────

    /// Receiver of the last committed block; changes once per committed cycle
    pub fn subscribe(&self) -> watch::Receiver<Option<u64>> {
        self.inner.updates.subscribe()
    }

    /// Stream form of `subscribe`
    pub fn updates(&self) -> WatchStream<Option<u64>> {
        WatchStream::new(self.subscribe())
    }

    pub fn snapshot(&self, stats: &SyncStats) -> ProjectionSnapshot {
        ProjectionSnapshot::capture(&self.load(), stats)
    }
}

impl Default for ProjectionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogPosition;
    use futures::StreamExt;
    use rust_decimal_macros::dec;

    fn with_price(symbol: &str, price: Decimal) -> Projection {
        let mut projection = Projection::default();
        projection.upsert_price(
            &AssetPrice {
                symbol: symbol.to_string(),
                price,
            },
            LogPosition::new(1, 0),
        );
        projection
    }

    #[test]
    fn test_publish_swaps_view() {
        let store = ProjectionStore::new();
        let before = store.load();

        store.publish(with_price("BTC", dec!(60000)), 100);

        // Old handle still sees the old view
        assert!(before.prices().is_empty());
        assert_eq!(store.prices()[0].price, dec!(60000));
        assert_eq!(store.load().block_number(), Some(100));
    }

    #[tokio::test]
    async fn test_subscribers_notified_on_publish() {
        let store = ProjectionStore::new();
        let mut rx = store.subscribe();
        assert_eq!(*rx.borrow(), None);

        store.publish(with_price("ETH", dec!(4000)), 7);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Some(7));

        let mut stream = store.updates();
        assert_eq!(stream.next().await, Some(Some(7)));
    }

    #[test]
    fn test_clones_share_state() {
        let store = ProjectionStore::new();
        let reader = store.clone();
        store.publish(with_price("BTC", dec!(1)), 1);
        assert_eq!(reader.prices().len(), 1);
    }
}
