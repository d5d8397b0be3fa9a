//! In-memory ledger for tests: scripted events, failures and chain height.

use super::LedgerClient;
use crate::error::TransportError;
use crate::types::{EventKind, RawEvent};
use alloy::primitives::{Address, LogData};
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryLedger {
    height: AtomicU64,
    events: Mutex<Vec<RawEvent>>,
    agents: Mutex<Vec<Address>>,
    failing: Mutex<HashSet<Address>>,
    /// Number of upcoming query_events calls that fail before succeeding
    flaky_calls: AtomicUsize,
    registry_down: Mutex<bool>,
    height_down: Mutex<bool>,
    pub query_calls: AtomicUsize,
    pub registry_calls: AtomicUsize,
}

impl MemoryLedger {
    pub fn new(height: u64) -> Self {
        let ledger = Self::default();
        ledger.set_height(height);
        ledger
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub fn set_agents(&self, agents: Vec<Address>) {
        *self.agents.lock().unwrap() = agents;
    }

    pub fn set_failing(&self, address: Address, failing: bool) {
        let mut set = self.failing.lock().unwrap();
        if failing {
            set.insert(address);
        } else {
            set.remove(&address);
        }
    }

    pub fn fail_next_queries(&self, count: usize) {
        self.flaky_calls.store(count, Ordering::SeqCst);
    }

    pub fn set_registry_down(&self, down: bool) {
        *self.registry_down.lock().unwrap() = down;
    }

    pub fn set_height_down(&self, down: bool) {
        *self.height_down.lock().unwrap() = down;
    }

    /// Append an encoded event at (block, log_index)
    pub fn emit<E: SolEvent>(&self, address: Address, block: u64, log_index: u64, event: &E) {
        self.emit_raw(address, block, log_index, event.encode_log_data());
    }

    pub fn emit_raw(&self, address: Address, block: u64, log_index: u64, data: LogData) {
        let kind = data
            .topics()
            .first()
            .and_then(EventKind::from_signature_hash)
            .expect("unknown event topic");
        self.events.lock().unwrap().push(RawEvent {
            address,
            kind,
            block_number: block,
            log_index,
            data,
        });
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn chain_height(&self) -> Result<u64, TransportError> {
        if *self.height_down.lock().unwrap() {
            return Err(TransportError::Rpc("connection refused".to_string()));
        }
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn query_events(
        &self,
        address: Address,
        kind: EventKind,
        from: u64,
        to: u64,
    ) -> Result<Vec<RawEvent>, TransportError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);

        let flaky = self
            .flaky_calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if flaky || self.failing.lock().unwrap().contains(&address) {
            return Err(TransportError::Rpc(format!("timeout querying {:?}", address)));
        }

        let mut events: Vec<RawEvent> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| {
                e.address == address
                    && e.kind == kind
                    && e.block_number >= from
                    && e.block_number <= to
            })
            .cloned()
            .collect();
        events.sort_by_key(RawEvent::order_key);
        Ok(events)
    }

    async fn agent_contracts(&self, _coordinator: Address) -> Result<Vec<Address>, TransportError> {
        self.registry_calls.fetch_add(1, Ordering::SeqCst);
        if *self.registry_down.lock().unwrap() {
            return Err(TransportError::Call {
                call: "getAgentContracts",
                reason: "execution reverted".to_string(),
            });
        }
        Ok(self.agents.lock().unwrap().clone())
    }
}
