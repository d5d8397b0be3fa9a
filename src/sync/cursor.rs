//! Cursor Store
//!
//! Holds the last-processed block height. Initialized once at startup, then
//! only moved forward by `commit` at the end of a completed cycle.
//!
//! Alongside the global cursor it keeps per-source lag marks: a source whose
//! fetch failed keeps the first block it has not delivered, and its next
//! window starts there. The global cursor still advances, so sources that did
//! succeed are never re-served a committed range (no duplicate PnL appends),
//! and the failed source loses nothing.

use crate::error::CursorRegression;
use crate::types::BlockWindow;
use alloy::primitives::Address;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct CursorStore {
    /// Next block to process. Everything below it has been committed.
    last_processed_block: u64,
    /// Sources behind the global cursor: address -> first undelivered block
    lagging: BTreeMap<Address, u64>,
    /// Agent events not fetched since this block because the registry was down
    agents_pending_from: Option<u64>,
}

impl CursorStore {
    /// Open the cursor at `start` (normally the chain height at startup)
    pub fn open(start: u64) -> Self {
        info!("Cursor opened at block {}", start);
        Self {
            last_processed_block: start,
            lagging: BTreeMap::new(),
            agents_pending_from: None,
        }
    }

    pub fn last_processed_block(&self) -> u64 {
        self.last_processed_block
    }

    /// `[last_processed_block, latest]`, or None when the chain has not moved.
    pub fn current_window(&self, latest: u64) -> Option<BlockWindow> {
        if latest < self.last_processed_block {
            return None;
        }
        Some(BlockWindow::new(self.last_processed_block, latest))
    }

    /// Set `last_processed_block = to + 1`.
    ///
    /// A target more than one block behind the cursor is a regression: it is
    /// logged and reported, and the cursor does not move.
    pub fn commit(&mut self, to: u64) -> Result<(), CursorRegression> {
        if to.saturating_add(1) < self.last_processed_block {
            let err = CursorRegression {
                to,
                cursor: self.last_processed_block,
            };
            warn!("{} (possible reorg) - cursor left unchanged", err);
            return Err(err);
        }

        let next = to + 1;
        debug!("Cursor commit: {} -> {}", self.last_processed_block, next);
        self.last_processed_block = self.last_processed_block.max(next);
        Ok(())
    }

    /// Window for one source: the cycle window, widened back to its lag mark.
    pub fn source_window(&self, address: &Address, window: BlockWindow) -> BlockWindow {
        match self.lagging.get(address) {
            Some(&from) if from < window.from => BlockWindow::new(from, window.to),
            _ => window,
        }
    }

    /// Record that `address` has not delivered anything from `from` onward
    pub fn mark_lagging(&mut self, address: Address, from: u64) {
        let mark = self.lagging.entry(address).or_insert(from);
        *mark = (*mark).min(from);
    }

    pub fn clear_lagging(&mut self, address: &Address) -> bool {
        self.lagging.remove(address).is_some()
    }

    pub fn lag_mark(&self, address: &Address) -> Option<u64> {
        self.lagging.get(address).copied()
    }

    pub fn lagging_count(&self) -> usize {
        self.lagging.len()
    }

    /// Registry unavailable: every agent is behind from `from`
    pub fn mark_agents_pending(&mut self, from: u64) {
        let mark = self.agents_pending_from.get_or_insert(from);
        *mark = (*mark).min(from);
    }

    /// Registry resolved again: turn the blanket mark into per-agent lag marks.
    pub fn resolve_agents_pending<'a, I>(&mut self, agents: I)
    where
        I: IntoIterator<Item = &'a Address>,
    {
        if let Some(from) = self.agents_pending_from.take() {
            for address in agents {
                self.mark_lagging(*address, from);
            }
            info!("Agent backlog from block {} handed to per-agent cursors", from);
        }
    }

    pub fn agents_pending_from(&self) -> Option<u64> {
        self.agents_pending_from
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_window_and_commit() {
        let mut cursor = CursorStore::open(100);
        assert_eq!(cursor.current_window(100), Some(BlockWindow::new(100, 100)));

        cursor.commit(100).unwrap();
        assert_eq!(cursor.last_processed_block(), 101);

        // Chain has not moved since the last cycle
        assert_eq!(cursor.current_window(100), None);
        assert_eq!(cursor.current_window(105), Some(BlockWindow::new(101, 105)));
    }

    #[test]
    fn test_commit_regression_rejected() {
        let mut cursor = CursorStore::open(100);
        assert_ok!(cursor.commit(150));
        assert_eq!(cursor.last_processed_block(), 151);

        let err = assert_err!(cursor.commit(120));
        assert_eq!(err, CursorRegression { to: 120, cursor: 151 });
        assert_eq!(cursor.last_processed_block(), 151);

        // Re-committing the last window is tolerated and does not move the cursor
        assert_ok!(cursor.commit(150));
        assert_eq!(cursor.last_processed_block(), 151);
    }

    #[test]
    fn test_cursor_monotonic() {
        let mut cursor = CursorStore::open(0);
        let mut previous = cursor.last_processed_block();
        for target in [5u64, 3, 9, 9, 1, 20, 19, 30] {
            let _ = cursor.commit(target);
            assert!(cursor.last_processed_block() >= previous);
            previous = cursor.last_processed_block();
        }
        assert_eq!(previous, 31);
    }

    #[test]
    fn test_lagging_source_window() {
        let mut cursor = CursorStore::open(100);
        let agent = Address::repeat_byte(0xaa);
        let other = Address::repeat_byte(0xbb);

        cursor.mark_lagging(agent, 100);
        cursor.commit(110).unwrap();
        // A later failure never moves the mark forward
        cursor.mark_lagging(agent, 111);
        assert_eq!(cursor.lag_mark(&agent), Some(100));

        let window = cursor.current_window(120).unwrap();
        assert_eq!(window, BlockWindow::new(111, 120));
        assert_eq!(cursor.source_window(&agent, window), BlockWindow::new(100, 120));
        assert_eq!(cursor.source_window(&other, window), window);

        assert!(cursor.clear_lagging(&agent));
        assert_eq!(cursor.source_window(&agent, window), window);
        assert_eq!(cursor.lagging_count(), 0);
    }

    #[test]
    fn test_agents_pending_becomes_lag_marks() {
        let mut cursor = CursorStore::open(50);
        cursor.mark_agents_pending(50);
        cursor.commit(60).unwrap();
        cursor.mark_agents_pending(61);
        assert_eq!(cursor.agents_pending_from(), Some(50));

        let agents = [Address::repeat_byte(1), Address::repeat_byte(2)];
        cursor.resolve_agents_pending(agents.iter());

        assert_eq!(cursor.agents_pending_from(), None);
        assert_eq!(cursor.lag_mark(&agents[0]), Some(50));
        assert_eq!(cursor.lag_mark(&agents[1]), Some(50));
    }
}
