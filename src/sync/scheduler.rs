//! Scheduler
//!
//! Fires a sync cycle every poll interval. At most one cycle runs at a time:
//! a tick that finds the engine busy is dropped and counted, never queued.
//! The engine sits behind a tokio mutex and each tick takes it with
//! `try_lock_owned`, so "running" is exactly "the lock is held".

use crate::ledger::LedgerClient;
use crate::sync::engine::{CycleOutcome, SyncEngine};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

#[derive(Debug)]
pub enum TickOutcome {
    /// A cycle was spawned
    Started(JoinHandle<()>),
    /// A cycle was already in flight
    Dropped,
}

pub struct Scheduler<L> {
    engine: Arc<Mutex<SyncEngine<L>>>,
    poll_interval: Duration,
    /// Ticks dropped since the last started cycle
    dropped_ticks: Arc<AtomicU64>,
}

impl<L: LedgerClient> Scheduler<L> {
    pub fn new(engine: SyncEngine<L>, poll_interval: Duration) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            poll_interval,
            dropped_ticks: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared handle to the engine (e.g. to close it after `run` returns)
    pub fn engine(&self) -> Arc<Mutex<SyncEngine<L>>> {
        Arc::clone(&self.engine)
    }

    pub fn state(&self) -> SchedulerState {
        match self.engine.try_lock() {
            Ok(_) => SchedulerState::Idle,
            Err(_) => SchedulerState::Running,
        }
    }

    /// Run a single cycle now, waiting for any in-flight one first
    pub async fn run_once(&self) -> CycleOutcome {
        let mut engine = self.engine.lock().await;
        let dropped = self.dropped_ticks.swap(0, Ordering::SeqCst);
        engine.record_dropped_ticks(dropped);
        engine.run_cycle().await
    }

    /// Handle one timer tick
    pub fn on_tick(&self) -> TickOutcome {
        match Arc::clone(&self.engine).try_lock_owned() {
            Ok(mut engine) => {
                let dropped = self.dropped_ticks.swap(0, Ordering::SeqCst);
                TickOutcome::Started(tokio::spawn(async move {
                    engine.record_dropped_ticks(dropped);
                    engine.run_cycle().await;
                }))
            }
            Err(_) => {
                let dropped = self.dropped_ticks.fetch_add(1, Ordering::SeqCst) + 1;
                debug!("Cycle still running - tick dropped ({} pending)", dropped);
                TickOutcome::Dropped
            }
        }
    }

    /// Tick until `shutdown` flips to true (or its sender is dropped), then
    /// wait for the in-flight cycle to finish.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Scheduler started (every {:?})", self.poll_interval);

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Option<JoinHandle<()>> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let TickOutcome::Started(handle) = self.on_tick() {
                        in_flight = Some(handle);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Scheduler stopping");
        if let Some(handle) = in_flight {
            if let Err(e) = handle.await {
                warn!("Last cycle did not finish cleanly: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileConfig;
    use crate::contracts::PnLUpdated;
    use crate::ledger::memory::MemoryLedger;
    use crate::projection::ProjectionStore;
    use crate::types::AgentId;
    use alloy::primitives::{Address, I256, U256};

    fn coordinator() -> Address {
        Address::repeat_byte(0xcc)
    }

    async fn scheduler(ledger: &Arc<MemoryLedger>, store: ProjectionStore) -> Scheduler<MemoryLedger> {
        let config = FileConfig {
            rpc_url: Some("http://127.0.0.1:8545".to_string()),
            coordinator_address: Some(format!("{:?}", coordinator())),
            ..Default::default()
        }
        .resolve()
        .unwrap();
        let engine = SyncEngine::open(Arc::clone(ledger), &config, store)
            .await
            .unwrap();
        Scheduler::new(engine, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_tick_dropped_while_cycle_runs() {
        let ledger = Arc::new(MemoryLedger::new(100));
        let scheduler = scheduler(&ledger, ProjectionStore::new()).await;
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        // Hold the engine as a running cycle would
        let guard = scheduler.engine().lock_owned().await;
        assert_eq!(scheduler.state(), SchedulerState::Running);
        assert!(matches!(scheduler.on_tick(), TickOutcome::Dropped));
        assert!(matches!(scheduler.on_tick(), TickOutcome::Dropped));
        drop(guard);

        match scheduler.on_tick() {
            TickOutcome::Started(handle) => handle.await.unwrap(),
            TickOutcome::Dropped => panic!("idle engine should start a cycle"),
        }
        let engine = scheduler.engine();
        let engine = engine.lock().await;
        assert_eq!(engine.stats().dropped_ticks, 2);
        assert_eq!(engine.stats().total_cycles, 1);
    }

    #[tokio::test]
    async fn test_run_once_commits_window() {
        let ledger = Arc::new(MemoryLedger::new(100));
        let scheduler = scheduler(&ledger, ProjectionStore::new()).await;

        assert!(matches!(scheduler.run_once().await, CycleOutcome::Committed(_)));
        assert!(matches!(scheduler.run_once().await, CycleOutcome::NoNewBlocks));
        assert_eq!(
            scheduler.engine().lock().await.cursor().last_processed_block(),
            101
        );
    }

    #[tokio::test]
    async fn test_run_publishes_and_stops() {
        let ledger = Arc::new(MemoryLedger::new(100));
        ledger.emit(
            coordinator(),
            100,
            0,
            &PnLUpdated {
                agentID: U256::from(4u64),
                pnl: I256::try_from(300_000_000i64).unwrap(),
            },
        );
        let store = ProjectionStore::new();
        let mut updates = store.subscribe();
        let scheduler = Arc::new(scheduler(&ledger, store.clone()).await);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.run(shutdown_rx).await })
        };

        updates.changed().await.unwrap();
        assert_eq!(*updates.borrow(), Some(100));
        assert_eq!(store.leaderboard()[0].agent_id, AgentId(4));

        shutdown_tx.send(true).unwrap();
        runner.await.unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }
}
