//! Event Fetcher
//!
//! Pulls raw logs for one (address, event kind, block window). Wide windows
//! are split into `max_block_range` chunks, and each chunk is retried up to
//! `max_retries` times with exponential backoff (capped at
//! `MAX_RETRY_DELAY`) before the failure is surfaced.
//!
//! Failures are isolated per source: `fetch_all` runs every source
//! concurrently and returns one `SourceFetch` per source, so a dead agent
//! contract never blocks the coordinator or other agents.

use crate::error::TransportError;
use crate::ledger::LedgerClient;
use crate::types::{BlockWindow, EventKind, EventSource, RawEvent};
use alloy::primitives::Address;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Upper bound on a single backoff sleep
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Result of fetching every event kind for one source
#[derive(Debug)]
pub struct SourceFetch {
    pub source: EventSource,
    pub window: BlockWindow,
    pub result: Result<Vec<RawEvent>, TransportError>,
}

pub struct EventFetcher<L> {
    ledger: Arc<L>,
    max_block_range: u64,
    /// Retries per chunk after the first attempt
    max_retries: u32,
    retry_base_delay: Duration,
}

impl<L: LedgerClient> EventFetcher<L> {
    pub fn new(
        ledger: Arc<L>,
        max_block_range: u64,
        max_retries: u32,
        retry_base_delay: Duration,
    ) -> Self {
        Self {
            ledger,
            max_block_range: max_block_range.max(1),
            max_retries,
            retry_base_delay,
        }
    }

    /// Logs of `kind` from `address` within `window`, in emission order.
    pub async fn fetch(
        &self,
        address: Address,
        kind: EventKind,
        window: BlockWindow,
    ) -> Result<Vec<RawEvent>, TransportError> {
        let mut events = Vec::new();
        for chunk in window.chunks(self.max_block_range) {
            events.extend(self.fetch_chunk(address, kind, chunk).await?);
        }
        Ok(events)
    }

    async fn fetch_chunk(
        &self,
        address: Address,
        kind: EventKind,
        chunk: BlockWindow,
    ) -> Result<Vec<RawEvent>, TransportError> {
        let mut attempt = 0;
        loop {
            match self
                .ledger
                .query_events(address, kind, chunk.from, chunk.to)
                .await
            {
                Ok(events) => {
                    if !events.is_empty() {
                        debug!("{} {} logs from {:?} in {}", events.len(), kind, address, chunk);
                    }
                    return Ok(events);
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        warn!(
                            "Failed to fetch {} for {:?} blocks {} after {} attempts: {}",
                            kind,
                            address,
                            chunk,
                            attempt + 1,
                            e
                        );
                        return Err(e);
                    }
                    attempt += 1;
                    warn!(
                        "Retry {}/{} for {} {:?} blocks {}: {}",
                        attempt, self.max_retries, kind, address, chunk, e
                    );
                    sleep(self.retry_delay(attempt)).await;
                }
            }
        }
    }

    /// Backoff before retry `attempt` (1-based): base * 2^attempt, capped
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        self.retry_base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(MAX_RETRY_DELAY)
    }

    /// Every event kind for one source. Any failure fails the whole source,
    /// so a partial result never reaches the reconciler.
    pub async fn fetch_source(&self, source: EventSource, window: BlockWindow) -> SourceFetch {
        let address = source.address();
        let results = join_all(
            EventKind::ALL
                .into_iter()
                .map(|kind| self.fetch(address, kind, window)),
        )
        .await;

        let result = results
            .into_iter()
            .collect::<Result<Vec<Vec<RawEvent>>, _>>()
            .map(|per_kind| {
                let mut events: Vec<RawEvent> = per_kind.into_iter().flatten().collect();
                events.sort_by_key(RawEvent::order_key);
                events
            });

        SourceFetch {
            source,
            window,
            result,
        }
    }

    /// Fan out over all sources concurrently
    pub async fn fetch_all(&self, plan: Vec<(EventSource, BlockWindow)>) -> Vec<SourceFetch> {
        join_all(
            plan.into_iter()
                .map(|(source, window)| self.fetch_source(source, window)),
        )
        .await
    }
}
