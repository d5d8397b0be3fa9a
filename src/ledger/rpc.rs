//! JSON-RPC Ledger Client
//!
//! alloy-backed [`LedgerClient`]. Uses a WebSocket transport for `ws://` and
//! `wss://` endpoints and plain HTTP otherwise; both are type-erased into a
//! `DynProvider` so the rest of the engine sees one concrete type.
//!
//! Notes:
//!     - One eth_getLogs call per (address, event kind, block range); range
//!       splitting and retries live in the fetcher, not here
//!     - Logs flagged `removed` (reorged out) or still pending (no block
//!       number / log index) are dropped
//!
//! Created: 2026-10-12

use super::LedgerClient;
use crate::contracts::IAlphaEnsemble;
use crate::error::TransportError;
use crate::types::{EventKind, RawEvent};
use alloy::primitives::Address;
use alloy::providers::{DynProvider, Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::{Filter, Log};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Ledger client over an alloy provider
pub struct RpcLedger<P> {
    provider: P,
}

impl<P: Provider> RpcLedger<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl RpcLedger<DynProvider> {
    /// Connect to `rpc_url`, choosing the transport from the URL scheme.
    pub async fn connect(rpc_url: &str) -> Result<Self> {
        let provider = if rpc_url.starts_with("ws://") || rpc_url.starts_with("wss://") {
            let ws = WsConnect::new(rpc_url);
            ProviderBuilder::new()
                .connect_ws(ws)
                .await
                .context("Failed to connect WebSocket provider")?
                .erased()
        } else {
            ProviderBuilder::new()
                .connect_http(rpc_url.parse().context("Invalid RPC URL")?)
                .erased()
        };

        let block = provider
            .get_block_number()
            .await
            .context("Failed to connect to RPC")?;
        info!(
            "Connected to {}... (block {})",
            &rpc_url[..40.min(rpc_url.len())],
            block
        );

        Ok(Self::new(provider))
    }
}

/// Convert one RPC log, dropping logs that are not final.
fn to_raw_event(kind: EventKind, log: Log) -> Option<RawEvent> {
    if log.removed {
        warn!(
            "Dropping removed {} log from {:?} (block {:?})",
            kind,
            log.address(),
            log.block_number
        );
        return None;
    }

    let (block_number, log_index) = match (log.block_number, log.log_index) {
        (Some(b), Some(i)) => (b, i),
        _ => {
            debug!("Skipping pending {} log from {:?}", kind, log.address());
            return None;
        }
    };

    Some(RawEvent {
        address: log.address(),
        kind,
        block_number,
        log_index,
        data: log.inner.data,
    })
}

#[async_trait]
impl<P: Provider + 'static> LedgerClient for RpcLedger<P> {
    async fn chain_height(&self) -> Result<u64, TransportError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| TransportError::Rpc(e.to_string()))
    }

    async fn query_events(
        &self,
        address: Address,
        kind: EventKind,
        from: u64,
        to: u64,
    ) -> Result<Vec<RawEvent>, TransportError> {
        let filter = Filter::new()
            .address(address)
            .event_signature(kind.signature_hash())
            .from_block(from)
            .to_block(to);

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| TransportError::Rpc(e.to_string()))?;

        let mut events: Vec<RawEvent> = logs
            .into_iter()
            .filter_map(|log| to_raw_event(kind, log))
            .collect();
        // Nodes return logs in order already; enforce it anyway
        events.sort_by_key(RawEvent::order_key);
        Ok(events)
    }

    async fn agent_contracts(&self, coordinator: Address) -> Result<Vec<Address>, TransportError> {
        IAlphaEnsemble::new(coordinator, &self.provider)
            .getAgentContracts()
            .call()
            .await
            .map_err(|e| TransportError::Call {
                call: "getAgentContracts",
                reason: e.to_string(),
            })
    }
}
