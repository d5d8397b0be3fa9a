//! Ledger Access
//!
//! The engine only ever reads the ledger through [`LedgerClient`]:
//! chain height, event logs for one (address, event kind, block range),
//! and the coordinator's agent list.
//!
//! Architecture:
//!     rpc.rs       alloy JSON-RPC implementation (HTTP or WebSocket)
//!     memory.rs    in-memory ledger used by the sync tests
//!
//! Created: 2026-10-12

pub mod rpc;

#[cfg(test)]
pub mod memory;

pub use rpc::RpcLedger;

use crate::error::TransportError;
use crate::types::{EventKind, RawEvent};
use alloy::primitives::Address;
use async_trait::async_trait;

#[async_trait]
pub trait LedgerClient: Send + Sync + 'static {
    /// Latest block height
    async fn chain_height(&self) -> Result<u64, TransportError>;

    /// Logs of `kind` emitted by `address` in `[from, to]`, in emission order.
    async fn query_events(
        &self,
        address: Address,
        kind: EventKind,
        from: u64,
        to: u64,
    ) -> Result<Vec<RawEvent>, TransportError>;

    /// `getAgentContracts()` on the coordinator
    async fn agent_contracts(&self, coordinator: Address) -> Result<Vec<Address>, TransportError>;
}
