//! Reconciler
//!
//! Applies one cycle's decoded events to a working copy of the projection:
//! - prices: upsert by symbol
//! - positions: the agent's whole set is replaced, never merged per asset
//! - PnL: inserted into the agent's bounded window in chain order;
//!   leaderboard re-derived
//! - lifecycle notices: logged and counted only
//!
//! Every merge is keyed on the event's chain position, not on arrival. A
//! lagging source that catches up can deliver blocks older than what other
//! sources already published; those records never overwrite a later price or
//! position set, and their PnL samples land in block order. Re-applying the
//! same batch is a no-op.

use crate::projection::Projection;
use crate::types::{CanonicalRecord, DecodedEvent, LifecycleNotice};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub prices: usize,
    pub position_sets: usize,
    pub pnl_samples: usize,
    pub lifecycle_notices: usize,
    /// Records superseded by a later log already in the projection
    pub stale: usize,
}

impl ReconcileStats {
    pub fn merged(&self) -> usize {
        self.prices + self.position_sets + self.pnl_samples
    }
}

pub struct Reconciler {
    /// PnL samples kept per agent
    history_len: usize,
}

impl Reconciler {
    pub fn new(history_len: usize) -> Self {
        Self {
            history_len: history_len.max(1),
        }
    }

    /// Merge `events` into `projection`. Callers publish the result as one batch.
    pub fn apply(&self, projection: &mut Projection, events: &[DecodedEvent]) -> ReconcileStats {
        let mut stats = ReconcileStats::default();

        for event in events {
            let at = event.position;
            match &event.record {
                CanonicalRecord::Prices(prices) => {
                    for price in prices {
                        if projection.upsert_price(price, at) {
                            debug!("Price {} = {}", price.symbol, price.price);
                            stats.prices += 1;
                        } else {
                            stats.stale += 1;
                        }
                    }
                }
                CanonicalRecord::Positions { agent_id, entries } => {
                    if projection.replace_positions(*agent_id, entries, at) {
                        debug!("{} positions replaced ({} assets)", agent_id, entries.len());
                        stats.position_sets += 1;
                    } else {
                        stats.stale += 1;
                    }
                }
                CanonicalRecord::Pnl(sample) => {
                    if projection.push_pnl(sample.clone(), self.history_len) {
                        debug!(
                            "{} PnL {} at block {}",
                            sample.agent_id, sample.pnl, sample.block_number
                        );
                        stats.pnl_samples += 1;
                    } else {
                        stats.stale += 1;
                    }
                }
                CanonicalRecord::Lifecycle(notice) => {
                    log_notice(notice);
                    stats.lifecycle_notices += 1;
                }
            }
        }

        if stats.stale > 0 {
            debug!("{} superseded records skipped", stats.stale);
        }
        // The batch is published as a whole, so ranking once after the last
        // sample yields the same visible leaderboard as ranking after each.
        if stats.pnl_samples > 0 {
            projection.rebuild_leaderboard();
        }

        stats
    }
}

fn log_notice(notice: &LifecycleNotice) {
    match notice {
        LifecycleNotice::RunStarted {
            run_id,
            agent_id,
            query,
        } => info!(
            "Agent run started: run={:?} agent={:?} query={:?}",
            run_id, agent_id, query
        ),
        LifecycleNotice::OracleResponse {
            run_id,
            response,
            error_message,
        } => match error_message {
            Some(err) => info!("Oracle callback for run {:?} failed: {}", run_id, err),
            None => info!(
                "Oracle callback for run {:?}: {} chars",
                run_id,
                response.as_deref().map(str::len).unwrap_or(0)
            ),
        },
    }
}
