// Core data structures shared by the sync pipeline and the projection

use alloy::primitives::{Address, LogData};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Agent identifier as emitted by the coordinator (`agentID`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub u64);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "agent-{}", self.0)
    }
}

/// A discovered agent contract. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentHandle {
    pub agent_id: AgentId,
    pub contract_address: Address,
}

/// An address the engine pulls events from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventSource {
    Coordinator(Address),
    Agent(AgentHandle),
}

impl EventSource {
    pub fn address(&self) -> Address {
        match self {
            EventSource::Coordinator(address) => *address,
            EventSource::Agent(handle) => handle.contract_address,
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EventSource::Coordinator(address) => write!(f, "coordinator {:?}", address),
            EventSource::Agent(handle) => {
                write!(f, "{} {:?}", handle.agent_id, handle.contract_address)
            }
        }
    }
}

/// Event kinds the engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    AssetPricesUpdated,
    PositionsUpdated,
    PnLUpdated,
    AgentRunStarted,
    OracleResponseCallback,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::AssetPricesUpdated,
        EventKind::PositionsUpdated,
        EventKind::PnLUpdated,
        EventKind::AgentRunStarted,
        EventKind::OracleResponseCallback,
    ];

    /// Run-lifecycle kinds are informational and never reach the projection
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            EventKind::AgentRunStarted | EventKind::OracleResponseCallback
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            EventKind::AssetPricesUpdated => "AssetPricesUpdated",
            EventKind::PositionsUpdated => "PositionsUpdated",
            EventKind::PnLUpdated => "PnLUpdated",
            EventKind::AgentRunStarted => "AgentRunStarted",
            EventKind::OracleResponseCallback => "OracleResponseCallback",
        };
        f.write_str(name)
    }
}

/// Inclusive block range `[from, to]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockWindow {
    pub from: u64,
    pub to: u64,
}

impl BlockWindow {
    pub fn new(from: u64, to: u64) -> Self {
        debug_assert!(from <= to, "empty window {}..={}", from, to);
        Self { from, to }
    }

    pub fn len(&self) -> u64 {
        self.to - self.from + 1
    }

    /// Split into consecutive sub-windows of at most `max_len` blocks.
    pub fn chunks(&self, max_len: u64) -> Vec<BlockWindow> {
        let max_len = max_len.max(1);
        let mut chunks = Vec::new();
        let mut start = self.from;
        loop {
            let end = start.saturating_add(max_len - 1).min(self.to);
            chunks.push(BlockWindow::new(start, end));
            if end >= self.to {
                break;
            }
            start = end + 1;
        }
        chunks
    }
}

impl fmt::Display for BlockWindow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

/// One raw log occurrence as returned by the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub address: Address,
    pub kind: EventKind,
    pub block_number: u64,
    pub log_index: u64,
    pub data: LogData,
}

impl RawEvent {
    /// Emission order key: ascending block, then log index within the block
    pub fn order_key(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }

    pub fn position(&self) -> LogPosition {
        LogPosition::new(self.block_number, self.log_index)
    }
}

/// Chain position of a log. Later positions win when two records touch the
/// same price, position set or PnL series.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct LogPosition {
    pub block_number: u64,
    pub log_index: u64,
}

impl LogPosition {
    pub fn new(block_number: u64, log_index: u64) -> Self {
        Self {
            block_number,
            log_index,
        }
    }
}

/// Instrument price, keyed by symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetPrice {
    pub symbol: String,
    pub price: Decimal,
}

/// One asset in an agent's full position set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionEntry {
    pub agent_id: AgentId,
    pub asset: String,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PnLSample {
    pub agent_id: AgentId,
    pub pnl: Decimal,
    /// Block the `PnLUpdated` event was emitted in
    pub block_number: u64,
    pub log_index: u64,
    /// Wall-clock time at ingestion
    pub observed_at: DateTime<Utc>,
}

impl PnLSample {
    pub fn position(&self) -> LogPosition {
        LogPosition::new(self.block_number, self.log_index)
    }
}

/// Derived ranking row; never stored apart from the PnL series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub agent_id: AgentId,
    pub pnl: Decimal,
    /// 1-based rank
    pub rank: usize,
}

/// Informational run-lifecycle notice. Every field may be absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleNotice {
    RunStarted {
        run_id: Option<u64>,
        agent_id: Option<AgentId>,
        query: Option<String>,
    },
    OracleResponse {
        run_id: Option<u64>,
        response: Option<String>,
        error_message: Option<String>,
    },
}

/// Decoded event, ready for the reconciler
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalRecord {
    Prices(Vec<AssetPrice>),
    /// Full replacement of the agent's position set
    Positions {
        agent_id: AgentId,
        entries: Vec<PositionEntry>,
    },
    Pnl(PnLSample),
    Lifecycle(LifecycleNotice),
}

/// A canonical record tagged with the log it came from
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub position: LogPosition,
    pub record: CanonicalRecord,
}
