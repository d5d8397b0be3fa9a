//! Projection Snapshot
//!
//! JSON form of the projection for processes that cannot link the store
//! (dashboards, scripts). Written after every committed cycle when
//! `SNAPSHOT_FILE` is set; the write goes to a temp file and is renamed into
//! place, so readers never see a truncated file.

use super::Projection;
use crate::types::{AgentId, AssetPrice, LeaderboardEntry, PnLSample};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Engine counters, carried in the snapshot
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SyncStats {
    pub total_cycles: u64,
    pub committed_cycles: u64,
    pub failed_cycles: u64,
    pub skipped_cycles: u64,
    pub dropped_ticks: u64,
    pub events_fetched: u64,
    pub decode_errors: u64,
    pub lifecycle_notices: u64,
    /// Records older than what the projection already holds
    pub superseded_records: u64,
    pub source_failures: u64,
    pub start_time: Option<DateTime<Utc>>,
}

/// Shared snapshot file format
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectionSnapshot {
    pub last_updated: DateTime<Utc>,
    /// Last committed block
    pub block_number: Option<u64>,
    pub prices: Vec<AssetPrice>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub positions: BTreeMap<AgentId, BTreeMap<String, Decimal>>,
    pub pnl_series: BTreeMap<AgentId, Vec<PnLSample>>,
    pub stats: SyncStats,
}

impl ProjectionSnapshot {
    pub fn capture(projection: &Projection, stats: &SyncStats) -> Self {
        let mut agents: Vec<AgentId> = projection
            .leaderboard()
            .iter()
            .map(|entry| entry.agent_id)
            .chain(projection.positions.keys().copied())
            .collect();
        agents.sort();
        agents.dedup();

        Self {
            last_updated: Utc::now(),
            block_number: projection.block_number(),
            prices: projection.prices(),
            leaderboard: projection.leaderboard().to_vec(),
            positions: agents
                .iter()
                .map(|agent| (*agent, projection.positions(*agent)))
                .filter(|(_, set)| !set.is_empty())
                .collect(),
            pnl_series: agents
                .iter()
                .map(|agent| (*agent, projection.pnl_series(*agent)))
                .filter(|(_, series)| !series.is_empty())
                .collect(),
            stats: stats.clone(),
        }
    }

    /// Write to JSON file
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize projection snapshot")?;

        // Write to temp file first, then rename (atomic)
        let temp_path = path.as_ref().with_extension("tmp");
        std::fs::write(&temp_path, &json).context("Failed to write temp file")?;
        std::fs::rename(&temp_path, path.as_ref()).context("Failed to rename temp file")?;

        Ok(())
    }

    /// Read from JSON file
    pub fn read_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())
            .context("Failed to read projection snapshot")?;
        serde_json::from_str(&json).context("Failed to parse projection snapshot JSON")
    }
}
