//! Sync Pipeline
//!
//! Keeps the projection in step with the ledger by pulling events from the
//! coordinator and every registered agent contract on a fixed cadence.
//!
//! Architecture:
//!     cursor.rs        last processed block plus per-source lag marks
//!     registry.rs      coordinator + agent contract discovery
//!     fetcher.rs       chunked, retried, concurrent log fetch
//!     decoder.rs       raw logs -> canonical records
//!     reconciler.rs    canonical records -> projection
//!     engine.rs        one cycle, start to commit
//!     scheduler.rs     single-flight cycle timer
//!
//! Created: 2026-10-13

pub mod cursor;
pub mod decoder;
pub mod engine;
pub mod fetcher;
pub mod reconciler;
pub mod registry;
pub mod scheduler;

pub use cursor::CursorStore;
pub use decoder::EventDecoder;
pub use engine::{CycleOutcome, CycleReport, SyncEngine};
pub use fetcher::{EventFetcher, SourceFetch};
pub use reconciler::{ReconcileStats, Reconciler};
pub use registry::ContractRegistry;
pub use scheduler::{Scheduler, SchedulerState, TickOutcome};
