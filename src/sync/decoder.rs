//! Event Decoder
//!
//! Pure mapping from a raw log to a [`CanonicalRecord`].
//!
//! Prices and PnL are fixed-point integers scaled by 10^decimals (8 by
//! default): 6000000000000 -> 60000.0. Position quantities are taken as-is.
//! Malformed payloads fail with a typed [`DecodeError`], never a default
//! value. Run-lifecycle notices are the exception: an undecodable one yields
//! a notice with absent fields.

use crate::contracts::{
    AgentRunStarted, AssetPricesUpdated, OracleResponseCallback, PnLUpdated, PositionsUpdated,
};
use crate::error::DecodeError;
use crate::types::{
    AgentId, AssetPrice, CanonicalRecord, EventKind, LifecycleNotice, LogPosition, PnLSample,
    PositionEntry, RawEvent,
};
use alloy::primitives::{LogData, I256, U256};
use alloy::sol_types::SolEvent;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct EventDecoder {
    /// Fixed-point decimals for prices and PnL
    scale: u32,
}

impl EventDecoder {
    pub fn new(scale: u32) -> Self {
        Self { scale }
    }

    pub fn decode(&self, raw: &RawEvent) -> Result<CanonicalRecord, DecodeError> {
        self.decode_at(raw, Utc::now())
    }

    /// Decode with an explicit ingestion timestamp
    pub fn decode_at(
        &self,
        raw: &RawEvent,
        observed_at: DateTime<Utc>,
    ) -> Result<CanonicalRecord, DecodeError> {
        match raw.kind {
            EventKind::AssetPricesUpdated => {
                let event = abi_decode::<AssetPricesUpdated>(raw.kind, &raw.data)?;
                self.decode_prices(&event).map(CanonicalRecord::Prices)
            }
            EventKind::PositionsUpdated => {
                let event = abi_decode::<PositionsUpdated>(raw.kind, &raw.data)?;
                let (agent_id, entries) = self.decode_positions(&event)?;
                Ok(CanonicalRecord::Positions { agent_id, entries })
            }
            EventKind::PnLUpdated => {
                let event = abi_decode::<PnLUpdated>(raw.kind, &raw.data)?;
                self.decode_pnl(&event, raw.position(), observed_at)
                    .map(CanonicalRecord::Pnl)
            }
            EventKind::AgentRunStarted | EventKind::OracleResponseCallback => Ok(
                CanonicalRecord::Lifecycle(decode_lifecycle(raw.kind, &raw.data)),
            ),
        }
    }

    /// `(symbols[], prices[])` -> one price per symbol
    pub fn decode_prices(&self, event: &AssetPricesUpdated) -> Result<Vec<AssetPrice>, DecodeError> {
        let kind = EventKind::AssetPricesUpdated;
        check_lengths(kind, "assets", event.assets.len(), "prices", event.prices.len())?;

        event
            .assets
            .iter()
            .zip(&event.prices)
            .map(|(symbol, raw)| {
                Ok(AssetPrice {
                    symbol: symbol.clone(),
                    price: self.unsigned_fixed(kind, "price", *raw)?,
                })
            })
            .collect()
    }

    /// `(agentId, assets[], positions[])` -> the agent's full position set
    pub fn decode_positions(
        &self,
        event: &PositionsUpdated,
    ) -> Result<(AgentId, Vec<PositionEntry>), DecodeError> {
        let kind = EventKind::PositionsUpdated;
        let agent_id = agent_id(kind, event.agentID)?;
        check_lengths(kind, "assets", event.assets.len(), "positions", event.positions.len())?;

        let entries = event
            .assets
            .iter()
            .zip(&event.positions)
            .map(|(asset, raw)| {
                Ok(PositionEntry {
                    agent_id,
                    asset: asset.clone(),
                    quantity: signed_decimal(kind, "position", *raw, 0)?,
                })
            })
            .collect::<Result<Vec<_>, DecodeError>>()?;

        Ok((agent_id, entries))
    }

    pub fn decode_pnl(
        &self,
        event: &PnLUpdated,
        position: LogPosition,
        observed_at: DateTime<Utc>,
    ) -> Result<PnLSample, DecodeError> {
        let kind = EventKind::PnLUpdated;
        Ok(PnLSample {
            agent_id: agent_id(kind, event.agentID)?,
            pnl: signed_decimal(kind, "pnl", event.pnl, self.scale)?,
            block_number: position.block_number,
            log_index: position.log_index,
            observed_at,
        })
    }

    fn unsigned_fixed(
        &self,
        kind: EventKind,
        field: &'static str,
        raw: U256,
    ) -> Result<Decimal, DecodeError> {
        let out_of_range = || DecodeError::OutOfRange {
            kind,
            field,
            value: raw.to_string(),
        };
        let value = u128::try_from(raw).map_err(|_| out_of_range())?;
        let value = i128::try_from(value).map_err(|_| out_of_range())?;
        Decimal::try_from_i128_with_scale(value, self.scale)
            .map(|d| d.normalize())
            .map_err(|_| out_of_range())
    }
}

fn signed_decimal(
    kind: EventKind,
    field: &'static str,
    raw: I256,
    scale: u32,
) -> Result<Decimal, DecodeError> {
    let out_of_range = || DecodeError::OutOfRange {
        kind,
        field,
        value: raw.to_string(),
    };
    let value = i128::try_from(raw).map_err(|_| out_of_range())?;
    Decimal::try_from_i128_with_scale(value, scale)
        .map(|d| d.normalize())
        .map_err(|_| out_of_range())
}

fn agent_id(kind: EventKind, raw: U256) -> Result<AgentId, DecodeError> {
    u64::try_from(raw)
        .map(AgentId)
        .map_err(|_| DecodeError::OutOfRange {
            kind,
            field: "agentID",
            value: raw.to_string(),
        })
}

fn check_lengths(
    kind: EventKind,
    left_name: &'static str,
    left: usize,
    right_name: &'static str,
    right: usize,
) -> Result<(), DecodeError> {
    if left != right {
        return Err(DecodeError::LengthMismatch {
            kind,
            left_name,
            left,
            right_name,
            right,
        });
    }
    Ok(())
}

fn abi_decode<E: SolEvent>(kind: EventKind, data: &LogData) -> Result<E, DecodeError> {
    E::decode_log_data(data).map_err(|e| DecodeError::Abi {
        kind,
        reason: e.to_string(),
    })
}

/// Never fails: whatever cannot be decoded is reported as absent.
fn decode_lifecycle(kind: EventKind, data: &LogData) -> LifecycleNotice {
    match kind {
        EventKind::AgentRunStarted => match AgentRunStarted::decode_log_data(data) {
            Ok(event) => LifecycleNotice::RunStarted {
                run_id: u64::try_from(event.runId).ok(),
                agent_id: u64::try_from(event.agentId).ok().map(AgentId),
                query: Some(event.query),
            },
            Err(e) => {
                debug!("Partial AgentRunStarted notice: {}", e);
                LifecycleNotice::RunStarted {
                    run_id: None,
                    agent_id: None,
                    query: None,
                }
            }
        },
        _ => match OracleResponseCallback::decode_log_data(data) {
            Ok(event) => LifecycleNotice::OracleResponse {
                run_id: u64::try_from(event.runId).ok(),
                response: Some(event.response).filter(|s| !s.is_empty()),
                error_message: Some(event.errorMessage).filter(|s| !s.is_empty()),
            },
            Err(e) => {
                debug!("Partial OracleResponseCallback notice: {}", e);
                LifecycleNotice::OracleResponse {
                    run_id: None,
                    response: None,
                    error_message: None,
                }
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, Bytes};
    use rust_decimal_macros::dec;

    fn raw<E: SolEvent>(kind: EventKind, event: &E) -> RawEvent {
        RawEvent {
            address: Address::repeat_byte(0xcc),
            kind,
            block_number: 100,
            log_index: 0,
            data: event.encode_log_data(),
        }
    }

    #[test]
    fn test_price_fixed_point() {
        let event = AssetPricesUpdated {
            assets: vec!["BTC".to_string(), "ETH".to_string()],
            prices: vec![U256::from(6_000_000_000_000u64), U256::from(400_000_000_000u64)],
        };
        let record = EventDecoder::new(8)
            .decode(&raw(EventKind::AssetPricesUpdated, &event))
            .unwrap();

        assert_eq!(
            record,
            CanonicalRecord::Prices(vec![
                AssetPrice { symbol: "BTC".to_string(), price: dec!(60000) },
                AssetPrice { symbol: "ETH".to_string(), price: dec!(4000) },
            ])
        );
    }

    #[test]
    fn test_fractional_price() {
        let event = AssetPricesUpdated {
            assets: vec!["NVDA".to_string()],
            prices: vec![U256::from(18_620_000_000u64)],
        };
        let prices = EventDecoder::new(8).decode_prices(&event).unwrap();
        assert_eq!(prices[0].price, dec!(186.2));
    }

    #[test]
    fn test_price_length_mismatch() {
        let event = AssetPricesUpdated {
            assets: vec!["BTC".to_string(), "ETH".to_string()],
            prices: vec![U256::from(1u64)],
        };
        let err = EventDecoder::new(8)
            .decode(&raw(EventKind::AssetPricesUpdated, &event))
            .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::LengthMismatch { left: 2, right: 1, .. }
        ));
    }

    #[test]
    fn test_price_out_of_range() {
        let event = AssetPricesUpdated {
            assets: vec!["BTC".to_string()],
            prices: vec![U256::MAX],
        };
        let err = EventDecoder::new(8).decode_prices(&event).unwrap_err();
        assert!(matches!(err, DecodeError::OutOfRange { field: "price", .. }));
    }

    #[test]
    fn test_positions_full_set() {
        let event = PositionsUpdated {
            agentID: U256::from(1u64),
            assets: vec!["BTC".to_string(), "ETH".to_string()],
            positions: vec![I256::try_from(5i64).unwrap(), I256::try_from(-3i64).unwrap()],
        };
        let (agent, entries) = EventDecoder::new(8).decode_positions(&event).unwrap();
        assert_eq!(agent, AgentId(1));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].quantity, dec!(5));
        assert_eq!(entries[1].quantity, dec!(-3));
        assert_eq!(entries[1].asset, "ETH");
    }

    #[test]
    fn test_negative_pnl() {
        let event = PnLUpdated {
            agentID: U256::from(2u64),
            pnl: I256::try_from(-1_250_000_000i64).unwrap(),
        };
        let record = EventDecoder::new(8)
            .decode(&raw(EventKind::PnLUpdated, &event))
            .unwrap();
        match record {
            CanonicalRecord::Pnl(sample) => {
                assert_eq!(sample.agent_id, AgentId(2));
                assert_eq!(sample.pnl, dec!(-12.5));
                assert_eq!(sample.block_number, 100);
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_agent_id_overflow() {
        let event = PnLUpdated {
            agentID: U256::from(u64::MAX) + U256::from(1u64),
            pnl: I256::ZERO,
        };
        let err = EventDecoder::new(8)
            .decode_pnl(&event, LogPosition::new(1, 0), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DecodeError::OutOfRange { field: "agentID", .. }));
    }

    #[test]
    fn test_truncated_payload_is_abi_error() {
        let mut event = raw(
            EventKind::PnLUpdated,
            &PnLUpdated {
                agentID: U256::from(1u64),
                pnl: I256::ZERO,
            },
        );
        event.data = LogData::new_unchecked(event.data.topics().to_vec(), Bytes::from(vec![0u8; 10]));

        let err = EventDecoder::new(8).decode(&event).unwrap_err();
        assert!(matches!(err, DecodeError::Abi { kind: EventKind::PnLUpdated, .. }));
    }

    #[test]
    fn test_lifecycle_decodes() {
        let event = AgentRunStarted {
            runId: U256::from(7u64),
            agentId: U256::from(1u64),
            query: "rebalance".to_string(),
        };
        let record = EventDecoder::new(8)
            .decode(&raw(EventKind::AgentRunStarted, &event))
            .unwrap();
        assert_eq!(
            record,
            CanonicalRecord::Lifecycle(LifecycleNotice::RunStarted {
                run_id: Some(7),
                agent_id: Some(AgentId(1)),
                query: Some("rebalance".to_string()),
            })
        );

        let callback = OracleResponseCallback {
            runId: U256::from(7u64),
            response: String::new(),
            errorMessage: "oracle timeout".to_string(),
        };
        let record = EventDecoder::new(8)
            .decode(&raw(EventKind::OracleResponseCallback, &callback))
            .unwrap();
        assert_eq!(
            record,
            CanonicalRecord::Lifecycle(LifecycleNotice::OracleResponse {
                run_id: Some(7),
                response: None,
                error_message: Some("oracle timeout".to_string()),
            })
        );
    }

    #[test]
    fn test_malformed_lifecycle_tolerated() {
        let event = RawEvent {
            address: Address::ZERO,
            kind: EventKind::OracleResponseCallback,
            block_number: 1,
            log_index: 0,
            data: LogData::new_unchecked(
                vec![EventKind::OracleResponseCallback.signature_hash()],
                Bytes::new(),
            ),
        };
        let record = EventDecoder::new(8).decode(&event).unwrap();
        assert_eq!(
            record,
            CanonicalRecord::Lifecycle(LifecycleNotice::OracleResponse {
                run_id: None,
                response: None,
                error_message: None,
            })
        );
    }
}
