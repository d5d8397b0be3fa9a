//! Sync Engine
//!
//! One fetch-decode-reconcile-commit cycle over all event sources. Every
//! component is built once in `open` and owned here.
//!
//! Cycle:
//!     1. chain height -> window [cursor, height] (skip if the chain has not moved)
//!     2. registry -> sources (coordinator + agents; agents deferred if unresolved)
//!     3. concurrent fetch per source, widened back to any lag mark
//!     4. merge by (block, log index), decode, drop malformed records
//!     5. reconcile into a staged projection
//!     6. commit cursor, update lag marks, publish staged projection
//!
//! Any error before step 6 ends the cycle without committing or publishing;
//! the next cycle retries the same window.

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::ledger::LedgerClient;
use crate::projection::{ProjectionStore, SyncStats};
use crate::sync::{
    ContractRegistry, CursorStore, EventDecoder, EventFetcher, Reconciler,
};
use crate::types::{AgentHandle, BlockWindow, DecodedEvent, EventSource, RawEvent};
use alloy::primitives::Address;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What a committed cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub window: BlockWindow,
    pub sources: usize,
    pub failed_sources: Vec<Address>,
    pub registry_resolved: bool,
    pub events: usize,
    pub decode_errors: usize,
    pub merged: usize,
}

#[derive(Debug)]
pub enum CycleOutcome {
    Committed(CycleReport),
    /// Chain height has not passed the cursor
    NoNewBlocks,
    Failed,
}

pub struct SyncEngine<L> {
    ledger: Arc<L>,
    registry: ContractRegistry<L>,
    fetcher: EventFetcher<L>,
    decoder: EventDecoder,
    reconciler: Reconciler,
    cursor: CursorStore,
    store: ProjectionStore,
    stats: SyncStats,
    snapshot_file: Option<PathBuf>,
    registry_refresh_cycles: u64,
    cycles_since_refresh: u64,
    refresh_requested: Arc<AtomicBool>,
}

impl<L: LedgerClient> SyncEngine<L> {
    /// Build all components and place the cursor at the chain height
    /// (or the configured start block).
    pub async fn open(
        ledger: Arc<L>,
        config: &SyncConfig,
        store: ProjectionStore,
    ) -> SyncResult<Self> {
        let start = match config.start_block {
            Some(block) => {
                info!("Using configured start block {}", block);
                block
            }
            None => ledger.chain_height().await?,
        };

        let mut registry = ContractRegistry::new(Arc::clone(&ledger), config.coordinator_address);
        if let Err(e) = registry.resolve().await {
            warn!("Registry not resolved at startup ({}) - will retry each cycle", e);
        }

        let fetcher = EventFetcher::new(
            Arc::clone(&ledger),
            config.max_block_range,
            config.fetch_retries,
            config.retry_base_delay(),
        );

        info!("Sync engine opened");
        info!("  Coordinator: {:?}", config.coordinator_address);
        info!("  Agents: {}", registry.agents().len());
        info!("  Price decimals: {}", config.price_decimals);
        info!("  PnL history: {} samples", config.pnl_history_len);

        Ok(Self {
            ledger,
            registry,
            fetcher,
            decoder: EventDecoder::new(config.price_decimals),
            reconciler: Reconciler::new(config.pnl_history_len),
            cursor: CursorStore::open(start),
            store,
            stats: SyncStats {
                start_time: Some(Utc::now()),
                ..Default::default()
            },
            snapshot_file: config.snapshot_file.clone(),
            registry_refresh_cycles: config.registry_refresh_cycles,
            cycles_since_refresh: 0,
            refresh_requested: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Set this flag to re-query the coordinator's agent list next cycle
    pub fn refresh_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.refresh_requested)
    }

    pub fn cursor(&self) -> &CursorStore {
        &self.cursor
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    pub fn store(&self) -> &ProjectionStore {
        &self.store
    }

    pub(crate) fn record_dropped_ticks(&mut self, dropped: u64) {
        self.stats.dropped_ticks += dropped;
    }

    /// Run one cycle. Errors are caught here and never escape to readers.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.stats.total_cycles += 1;

        match self.try_cycle().await {
            Ok(Some(report)) => {
                self.stats.committed_cycles += 1;
                info!(
                    "Cycle committed {} | {} sources ({} failed) | {} events | {} merged | {} dropped",
                    report.window,
                    report.sources,
                    report.failed_sources.len(),
                    report.events,
                    report.merged,
                    report.decode_errors
                );
                self.write_snapshot();
                CycleOutcome::Committed(report)
            }
            Ok(None) => {
                self.stats.skipped_cycles += 1;
                debug!("No new blocks past {}", self.cursor.last_processed_block());
                CycleOutcome::NoNewBlocks
            }
            Err(e) => {
                self.stats.failed_cycles += 1;
                error!(
                    "Cycle failed, cursor stays at {}: {}",
                    self.cursor.last_processed_block(),
                    e
                );
                CycleOutcome::Failed
            }
        }
    }

    async fn try_cycle(&mut self) -> SyncResult<Option<CycleReport>> {
        let latest = self.ledger.chain_height().await?;
        let window = match self.cursor.current_window(latest) {
            Some(w) => w,
            None => return Ok(None),
        };

        let agents = self.resolve_agents().await;
        let registry_resolved = agents.is_some();

        let coordinator = self.registry.coordinator();
        let mut plan = vec![(
            coordinator,
            self.cursor.source_window(&coordinator.address(), window),
        )];
        for handle in agents.iter().flatten() {
            plan.push((
                EventSource::Agent(*handle),
                self.cursor.source_window(&handle.contract_address, window),
            ));
        }
        let sources = plan.len();

        let mut raw_events: Vec<RawEvent> = Vec::new();
        let mut delivered: Vec<Address> = Vec::new();
        let mut failed: Vec<(Address, u64)> = Vec::new();
        for fetched in self.fetcher.fetch_all(plan).await {
            match fetched.result {
                Ok(events) => {
                    raw_events.extend(events);
                    delivered.push(fetched.source.address());
                }
                Err(e) => {
                    warn!(
                        "Skipping {} for this cycle ({}): {}",
                        fetched.source, fetched.window, e
                    );
                    failed.push((fetched.source.address(), fetched.window.from));
                }
            }
        }
        // Stable: equal keys keep source order
        raw_events.sort_by_key(RawEvent::order_key);

        let records = self.decode_all(&raw_events);
        let decode_errors = raw_events.len() - records.len();

        let mut staged = self.store.load().as_ref().clone();
        if staged.register_agents(agents.iter().flatten().map(|h| h.agent_id)) {
            staged.rebuild_leaderboard();
        }
        let merge = self.reconciler.apply(&mut staged, &records);

        self.cursor.commit(window.to)?;

        for address in &delivered {
            if self.cursor.clear_lagging(address) {
                info!("Source {:?} caught up", address);
            }
        }
        for (address, from) in &failed {
            self.cursor.mark_lagging(*address, *from);
        }
        if !registry_resolved {
            self.cursor.mark_agents_pending(window.from);
        }
        self.store.publish(staged, window.to);

        self.stats.events_fetched += raw_events.len() as u64;
        self.stats.decode_errors += decode_errors as u64;
        self.stats.lifecycle_notices += merge.lifecycle_notices as u64;
        self.stats.superseded_records += merge.stale as u64;
        self.stats.source_failures += failed.len() as u64;

        Ok(Some(CycleReport {
            window,
            sources,
            failed_sources: failed.into_iter().map(|(a, _)| a).collect(),
            registry_resolved,
            events: raw_events.len(),
            decode_errors,
            merged: merge.merged(),
        }))
    }

    /// Agent handles for this cycle, or None if the registry is unreachable.
    async fn resolve_agents(&mut self) -> Option<Vec<AgentHandle>> {
        self.cycles_since_refresh += 1;
        let periodic = self.registry_refresh_cycles > 0
            && self.cycles_since_refresh >= self.registry_refresh_cycles;
        if self.refresh_requested.swap(false, Ordering::SeqCst) || periodic {
            info!("Refreshing agent registry");
            self.registry.invalidate();
            self.cycles_since_refresh = 0;
        }

        match self.registry.resolve().await {
            Ok(agents) => {
                let agents = agents.to_vec();
                self.cursor
                    .resolve_agents_pending(agents.iter().map(|h| &h.contract_address));
                Some(agents)
            }
            Err(e) => {
                warn!("Agent events deferred this cycle: {}", e);
                None
            }
        }
    }

    fn decode_all(&self, raw_events: &[RawEvent]) -> Vec<DecodedEvent> {
        raw_events
            .iter()
            .filter_map(|raw| match self.decoder.decode(raw) {
                Ok(record) => Some(DecodedEvent {
                    position: raw.position(),
                    record,
                }),
                Err(e) => {
                    warn!(
                        "Dropping malformed event from {:?} at block {} (log {}): {}",
                        raw.address, raw.block_number, raw.log_index, e
                    );
                    None
                }
            })
            .collect()
    }

    fn write_snapshot(&self) {
        if let Some(path) = &self.snapshot_file {
            if let Err(e) = self.store.snapshot(&self.stats).write_to_file(path) {
                error!("Failed to write projection snapshot: {:#}", e);
            }
        }
    }

    /// Final snapshot and summary. The engine is not used after this.
    pub fn close(&mut self) {
        self.write_snapshot();

        info!("===========================================");
        info!("   Sync Engine Stopped");
        info!("===========================================");
        info!("Cursor:             {}", self.cursor.last_processed_block());
        info!("Cycles:             {}", self.stats.total_cycles);
        info!("  committed:        {}", self.stats.committed_cycles);
        info!("  failed:           {}", self.stats.failed_cycles);
        info!("  no new blocks:    {}", self.stats.skipped_cycles);
        info!("Dropped ticks:      {}", self.stats.dropped_ticks);
        info!("Events fetched:     {}", self.stats.events_fetched);
        info!("Decode errors:      {}", self.stats.decode_errors);
        info!("Source failures:    {}", self.stats.source_failures);
        if self.cursor.lagging_count() > 0 {
            warn!("{} sources still lagging", self.cursor.lagging_count());
        }
    }
}
