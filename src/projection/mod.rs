//! Projection
//!
//! The read model consumers see: instrument prices, per-agent positions,
//! bounded PnL series and the derived leaderboard.
//!
//! Architecture:
//!     mod.rs         `Projection` state and its merge primitives
//!     store.rs       `ProjectionStore`: atomic publish, pull API, change signal
//!     snapshot.rs    JSON snapshot for out-of-process readers
//!
//! Created: 2026-10-13

pub mod snapshot;
pub mod store;

pub use snapshot::{ProjectionSnapshot, SyncStats};
pub use store::ProjectionStore;

use crate::types::{
    AgentId, AssetPrice, LeaderboardEntry, LogPosition, PnLSample, PositionEntry,
};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// One consistent view of all projections
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    prices: BTreeMap<String, Decimal>,
    positions: BTreeMap<AgentId, BTreeMap<String, Decimal>>,
    /// PnL samples per agent, ascending by chain position
    pnl: BTreeMap<AgentId, VecDeque<PnLSample>>,
    leaderboard: Vec<LeaderboardEntry>,
    /// Agents from the registry; ranked at zero until their first sample
    known_agents: BTreeSet<AgentId>,
    /// Log that last set each price / position set
    price_marks: BTreeMap<String, LogPosition>,
    position_marks: BTreeMap<AgentId, LogPosition>,
    /// Last block covered by the committed cycle that produced this view
    block_number: Option<u64>,
}

impl Projection {
    /// All prices, ordered by symbol
    pub fn prices(&self) -> Vec<AssetPrice> {
        self.prices
            .iter()
            .map(|(symbol, price)| AssetPrice {
                symbol: symbol.clone(),
                price: *price,
            })
            .collect()
    }

    pub fn price(&self, symbol: &str) -> Option<Decimal> {
        self.prices.get(symbol).copied()
    }

    /// Asset -> quantity for one agent (empty if unknown)
    pub fn positions(&self, agent: AgentId) -> BTreeMap<String, Decimal> {
        self.positions.get(&agent).cloned().unwrap_or_default()
    }

    /// Most recent samples, oldest first
    pub fn pnl_series(&self, agent: AgentId) -> Vec<PnLSample> {
        self.pnl
            .get(&agent)
            .map(|series| series.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Current PnL is the latest sample
    pub fn current_pnl(&self, agent: AgentId) -> Option<Decimal> {
        self.pnl
            .get(&agent)
            .and_then(|series| series.back())
            .map(|sample| sample.pnl)
    }

    pub fn leaderboard(&self) -> &[LeaderboardEntry] {
        &self.leaderboard
    }

    pub fn block_number(&self) -> Option<u64> {
        self.block_number
    }

    // ── Merge primitives (driven by the reconciler) ──────────────────

    /// Set a price unless a later log already set it. Returns false if stale.
    pub(crate) fn upsert_price(&mut self, price: &AssetPrice, at: LogPosition) -> bool {
        if self.price_marks.get(&price.symbol).is_some_and(|mark| *mark > at) {
            return false;
        }
        self.price_marks.insert(price.symbol.clone(), at);
        self.prices.insert(price.symbol.clone(), price.price);
        true
    }

    /// Replace the agent's entire position set unless a later log already did.
    pub(crate) fn replace_positions(
        &mut self,
        agent: AgentId,
        entries: &[PositionEntry],
        at: LogPosition,
    ) -> bool {
        if self.position_marks.get(&agent).is_some_and(|mark| *mark > at) {
            return false;
        }
        let set = entries
            .iter()
            .map(|entry| (entry.asset.clone(), entry.quantity))
            .collect();
        self.position_marks.insert(agent, at);
        self.positions.insert(agent, set);
        true
    }

    /// Insert a sample in chain order, evicting the oldest beyond `capacity`.
    ///
    /// Returns false when the sample is not retained: it was already present,
    /// or it is older than everything in a full window.
    pub(crate) fn push_pnl(&mut self, sample: PnLSample, capacity: usize) -> bool {
        let at = sample.position();
        let series = self.pnl.entry(sample.agent_id).or_default();

        let index = series.partition_point(|s| s.position() < at);
        if series.get(index).is_some_and(|s| s.position() == at) {
            return false;
        }
        series.insert(index, sample);

        let mut retained = true;
        while series.len() > capacity {
            series.pop_front();
            retained = retained && index > 0;
        }
        retained
    }

    /// Admit registry agents to the leaderboard. Returns true if any were new.
    pub(crate) fn register_agents<I>(&mut self, agents: I) -> bool
    where
        I: IntoIterator<Item = AgentId>,
    {
        let before = self.known_agents.len();
        self.known_agents.extend(agents);
        self.known_agents.len() > before
    }

    /// Rank every known agent and every agent with a PnL: descending PnL
    /// (zero until the first sample), ties by agent id ascending.
    pub(crate) fn rebuild_leaderboard(&mut self) {
        let mut rows: Vec<(AgentId, Decimal)> = self
            .known_agents
            .iter()
            .chain(self.pnl.keys())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|agent| (*agent, self.current_pnl(*agent).unwrap_or(Decimal::ZERO)))
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        self.leaderboard = rows
            .into_iter()
            .enumerate()
            .map(|(i, (agent_id, pnl))| LeaderboardEntry {
                agent_id,
                pnl,
                rank: i + 1,
            })
            .collect();
    }

    pub(crate) fn set_block_number(&mut self, block: u64) {
        self.block_number = Some(block);
    }
}
