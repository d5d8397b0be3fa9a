//! Contract Definitions
//!
//! Solidity events and interfaces for the AlphaEnsemble coordinator and its
//! agent contracts, defined with alloy's `sol!` macro.
//!
//! Field order is the wire contract: it must match the emitting contracts
//! bit-for-bit, otherwise topic hashes and ABI offsets diverge.
//!
//! Created: 2026-10-12

use crate::types::EventKind;
use alloy::primitives::B256;
use alloy::sol;
use alloy::sol_types::SolEvent;

// ── Coordinator events ────────────────────────────────────────────────

sol! {
    #[derive(Debug, PartialEq)]
    event AssetPricesUpdated(string[] assets, uint256[] prices);

    #[derive(Debug, PartialEq)]
    event PositionsUpdated(uint256 agentID, string[] assets, int256[] positions);

    #[derive(Debug, PartialEq)]
    event PnLUpdated(uint256 agentID, int256 pnl);
}

// ── Agent run lifecycle ──────────────────────────────────────────────

sol! {
    #[derive(Debug, PartialEq)]
    event AgentRunStarted(uint256 runId, uint256 agentId, string query);

    #[derive(Debug, PartialEq)]
    event OracleResponseCallback(uint256 runId, string response, string errorMessage);
}

// ── Coordinator reads ────────────────────────────────────────────────

sol! {
    #[sol(rpc)]
    interface IAlphaEnsemble {
        function getAgentContracts() external view returns (address[] memory);
    }
}

impl EventKind {
    /// topic0 of the event
    pub fn signature_hash(&self) -> B256 {
        match self {
            EventKind::AssetPricesUpdated => AssetPricesUpdated::SIGNATURE_HASH,
            EventKind::PositionsUpdated => PositionsUpdated::SIGNATURE_HASH,
            EventKind::PnLUpdated => PnLUpdated::SIGNATURE_HASH,
            EventKind::AgentRunStarted => AgentRunStarted::SIGNATURE_HASH,
            EventKind::OracleResponseCallback => OracleResponseCallback::SIGNATURE_HASH,
        }
    }

    /// Canonical Solidity signature
    pub fn signature(&self) -> &'static str {
        match self {
            EventKind::AssetPricesUpdated => AssetPricesUpdated::SIGNATURE,
            EventKind::PositionsUpdated => PositionsUpdated::SIGNATURE,
            EventKind::PnLUpdated => PnLUpdated::SIGNATURE,
            EventKind::AgentRunStarted => AgentRunStarted::SIGNATURE,
            EventKind::OracleResponseCallback => OracleResponseCallback::SIGNATURE,
        }
    }

    pub fn from_signature_hash(hash: &B256) -> Option<EventKind> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.signature_hash() == *hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::keccak256;

    #[test]
    fn test_signatures_match_wire_contract() {
        assert_eq!(
            EventKind::AssetPricesUpdated.signature(),
            "AssetPricesUpdated(string[],uint256[])"
        );
        assert_eq!(
            EventKind::PositionsUpdated.signature(),
            "PositionsUpdated(uint256,string[],int256[])"
        );
        assert_eq!(EventKind::PnLUpdated.signature(), "PnLUpdated(uint256,int256)");
        assert_eq!(
            EventKind::AgentRunStarted.signature(),
            "AgentRunStarted(uint256,uint256,string)"
        );
        assert_eq!(
            EventKind::OracleResponseCallback.signature(),
            "OracleResponseCallback(uint256,string,string)"
        );
    }

    #[test]
    fn test_topic_lookup() {
        for kind in EventKind::ALL {
            let hash = keccak256(kind.signature().as_bytes());
            assert_eq!(kind.signature_hash(), hash);
            assert_eq!(EventKind::from_signature_hash(&hash), Some(kind));
        }
        assert_eq!(EventKind::from_signature_hash(&B256::ZERO), None);
    }
}
