//! AlphaEnsemble Sync Library
//!
//! Mirrors the AlphaEnsemble coordinator and agent contracts into a local
//! read model: asset prices, agent positions, PnL history and a leaderboard.
//! Events are pulled per block window, decoded, reconciled and published
//! atomically once per cycle.
//!
//! Created: 2026-10-12

pub mod config;
pub mod contracts;
pub mod error;
pub mod ledger;
pub mod projection;
pub mod sync;
pub mod types;

// Re-export commonly used types
pub use config::{load_config, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use ledger::{LedgerClient, RpcLedger};
pub use projection::{Projection, ProjectionSnapshot, ProjectionStore, SyncStats};
pub use sync::{CycleOutcome, Scheduler, SyncEngine};
pub use types::{AgentId, AssetPrice, LeaderboardEntry, PnLSample, PositionEntry};
