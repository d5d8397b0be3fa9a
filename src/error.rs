//! Error taxonomy for the sync engine
//!
//! Every failure class is recoverable: the worst outcome of any of these is a
//! stale projection for one polling interval, never a corrupted one.
//!
//! Created: 2026-10-12

use crate::types::EventKind;
use thiserror::Error;

/// Ledger RPC or network failure. Retried on the next cycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("RPC request failed: {0}")]
    Rpc(String),

    #[error("contract call {call} failed: {reason}")]
    Call { call: &'static str, reason: String },
}

/// Malformed event payload. Only the offending record is dropped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{kind}: ABI decode failed: {reason}")]
    Abi { kind: EventKind, reason: String },

    #[error("{kind}: {left_name} has {left} entries but {right_name} has {right}")]
    LengthMismatch {
        kind: EventKind,
        left_name: &'static str,
        left: usize,
        right_name: &'static str,
        right: usize,
    },

    #[error("{kind}: {field} value {value} is out of range")]
    OutOfRange {
        kind: EventKind,
        field: &'static str,
        value: String,
    },
}

/// Coordinator could not be asked for its agent list.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("coordinator unreachable: {0}")]
    Unreachable(#[source] TransportError),
}

/// Commit target behind the cursor (ledger reorg or cursor corruption).
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("cursor regression: commit target {to} is behind cursor {cursor}")]
pub struct CursorRegression {
    pub to: u64,
    pub cursor: u64,
}

/// Cycle-level error, caught at the scheduler boundary.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    CursorRegression(#[from] CursorRegression),
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
