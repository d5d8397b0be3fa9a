//! Configuration management
//!
//! Settings come from an optional TOML file, then `.env` / process
//! environment variables on top (env wins). Every key has a default except
//! the ledger endpoint and the coordinator address.
//!
//! Environment keys:
//!   RPC_URL, COORDINATOR_ADDRESS, POLL_INTERVAL_MS, PRICE_DECIMALS,
//!   PNL_HISTORY_LEN, MAX_BLOCK_RANGE, FETCH_RETRIES, RETRY_BASE_DELAY_MS,
//!   START_BLOCK, SNAPSHOT_FILE, REGISTRY_REFRESH_CYCLES
//!
//! Created: 2026-10-12

use alloy::primitives::Address;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Fixed-point scale used by the coordinator for prices and PnL
pub const DEFAULT_PRICE_DECIMALS: u32 = 8;

/// rust_decimal cannot represent more fractional digits than this
const MAX_DECIMAL_SCALE: u32 = 28;

/// Retries per log chunk; one cycle holds the engine for all of them
const MAX_FETCH_RETRIES: u32 = 10;

/// Sync engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Ledger JSON-RPC endpoint (http(s):// or ws(s)://)
    pub rpc_url: String,
    pub coordinator_address: Address,
    pub poll_interval_ms: u64,
    pub price_decimals: u32,
    /// Number of PnL samples kept per agent
    pub pnl_history_len: usize,
    /// Widest block range per eth_getLogs call
    pub max_block_range: u64,
    /// Retries per log chunk after the first attempt
    pub fetch_retries: u32,
    pub retry_base_delay_ms: u64,
    /// Overrides the chain height as the initial cursor
    pub start_block: Option<u64>,
    /// Projection snapshot written after each committed cycle
    pub snapshot_file: Option<PathBuf>,
    /// Re-query the coordinator's agent list every N cycles (0 = never)
    pub registry_refresh_cycles: u64,
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.rpc_url.is_empty() {
            bail!("RPC_URL not set");
        }
        if self.poll_interval_ms == 0 {
            bail!("POLL_INTERVAL_MS must be greater than 0");
        }
        if self.price_decimals > MAX_DECIMAL_SCALE {
            bail!(
                "PRICE_DECIMALS {} exceeds the supported maximum of {}",
                self.price_decimals,
                MAX_DECIMAL_SCALE
            );
        }
        if self.pnl_history_len == 0 {
            bail!("PNL_HISTORY_LEN must be at least 1");
        }
        if self.fetch_retries > MAX_FETCH_RETRIES {
            bail!(
                "FETCH_RETRIES {} exceeds the supported maximum of {}",
                self.fetch_retries,
                MAX_FETCH_RETRIES
            );
        }
        if self.max_block_range == 0 {
            bail!("MAX_BLOCK_RANGE must be at least 1");
        }
        Ok(())
    }
}

/// On-disk TOML layout. All keys optional; missing ones fall back to env or defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub rpc_url: Option<String>,
    pub coordinator_address: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub price_decimals: Option<u32>,
    pub pnl_history_len: Option<usize>,
    pub max_block_range: Option<u64>,
    pub fetch_retries: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub start_block: Option<u64>,
    pub snapshot_file: Option<PathBuf>,
    pub registry_refresh_cycles: Option<u64>,
}

impl FileConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")
    }

    /// Overlay environment values. `lookup` returns the raw value for a key.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("RPC_URL") {
            self.rpc_url = Some(v);
        }
        if let Some(v) = lookup("COORDINATOR_ADDRESS") {
            self.coordinator_address = Some(v);
        }
        if let Some(v) = lookup("SNAPSHOT_FILE") {
            self.snapshot_file = Some(PathBuf::from(v));
        }
        override_parsed(&lookup, "POLL_INTERVAL_MS", &mut self.poll_interval_ms)?;
        override_parsed(&lookup, "PRICE_DECIMALS", &mut self.price_decimals)?;
        override_parsed(&lookup, "PNL_HISTORY_LEN", &mut self.pnl_history_len)?;
        override_parsed(&lookup, "MAX_BLOCK_RANGE", &mut self.max_block_range)?;
        override_parsed(&lookup, "FETCH_RETRIES", &mut self.fetch_retries)?;
        override_parsed(&lookup, "RETRY_BASE_DELAY_MS", &mut self.retry_base_delay_ms)?;
        override_parsed(&lookup, "START_BLOCK", &mut self.start_block)?;
        override_parsed(
            &lookup,
            "REGISTRY_REFRESH_CYCLES",
            &mut self.registry_refresh_cycles,
        )?;
        Ok(())
    }

    /// Fill defaults and validate
    pub fn resolve(self) -> Result<SyncConfig> {
        let coordinator = self
            .coordinator_address
            .context("COORDINATOR_ADDRESS not set")?;
        let coordinator_address = Address::from_str(coordinator.trim())
            .with_context(|| format!("Invalid COORDINATOR_ADDRESS: {}", coordinator))?;

        let config = SyncConfig {
            rpc_url: self.rpc_url.unwrap_or_default(),
            coordinator_address,
            poll_interval_ms: self.poll_interval_ms.unwrap_or(15_000),
            price_decimals: self.price_decimals.unwrap_or(DEFAULT_PRICE_DECIMALS),
            pnl_history_len: self.pnl_history_len.unwrap_or(10),
            max_block_range: self.max_block_range.unwrap_or(2_000),
            fetch_retries: self.fetch_retries.unwrap_or(3),
            retry_base_delay_ms: self.retry_base_delay_ms.unwrap_or(1_000),
            start_block: self.start_block,
            snapshot_file: self.snapshot_file,
            registry_refresh_cycles: self.registry_refresh_cycles.unwrap_or(0),
        };
        config.validate()?;
        Ok(config)
    }
}

fn override_parsed<T, F>(lookup: &F, key: &str, slot: &mut Option<T>) -> Result<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        let value = raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid {}: {}", key, raw))?;
        *slot = Some(value);
    }
    Ok(())
}

/// Load config: optional TOML file, then `.env` and process env on top.
pub fn load_config(path: Option<&Path>) -> Result<SyncConfig> {
    dotenv::dotenv().ok();

    let mut file = match path {
        Some(p) => FileConfig::load(p)?,
        None => FileConfig::default(),
    };
    file.apply_env(|key| std::env::var(key).ok())?;
    file.resolve()
}
