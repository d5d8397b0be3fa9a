//! Contract Registry
//!
//! Resolves the set of event sources: the fixed coordinator plus one agent
//! contract per entry of `getAgentContracts()`. The agent list is queried
//! once and cached; `invalidate` forces the next `resolve` to ask again.
//!
//! Agent ids are list positions, the same ids the coordinator emits in
//! `PositionsUpdated` / `PnLUpdated`. A refresh never rewrites an existing
//! handle: contract redeployment is not supported, so a changed address at a
//! known index is reported and ignored.

use crate::error::RegistryError;
use crate::ledger::LedgerClient;
use crate::types::{AgentHandle, AgentId, EventSource};
use alloy::primitives::Address;
use std::sync::Arc;
use tracing::{info, warn};

pub struct ContractRegistry<L> {
    ledger: Arc<L>,
    coordinator: Address,
    agents: Vec<AgentHandle>,
    populated: bool,
}

impl<L: LedgerClient> ContractRegistry<L> {
    pub fn new(ledger: Arc<L>, coordinator: Address) -> Self {
        Self {
            ledger,
            coordinator,
            agents: Vec::new(),
            populated: false,
        }
    }

    pub fn coordinator(&self) -> EventSource {
        EventSource::Coordinator(self.coordinator)
    }

    /// Agent handles, querying the coordinator only if not cached yet.
    pub async fn resolve(&mut self) -> Result<&[AgentHandle], RegistryError> {
        if !self.populated {
            let addresses = self
                .ledger
                .agent_contracts(self.coordinator)
                .await
                .map_err(RegistryError::Unreachable)?;
            self.merge(addresses);
            self.populated = true;
        }
        Ok(&self.agents)
    }

    /// Drop the cache; known handles are kept.
    pub fn invalidate(&mut self) {
        self.populated = false;
    }

    pub fn agents(&self) -> &[AgentHandle] {
        &self.agents
    }

    pub fn is_populated(&self) -> bool {
        self.populated
    }

    fn merge(&mut self, addresses: Vec<Address>) {
        let before = self.agents.len();

        for (index, address) in addresses.into_iter().enumerate() {
            match self.agents.get(index) {
                Some(existing) if existing.contract_address != address => {
                    warn!(
                        "Coordinator reports {:?} for {} (known: {:?}) - keeping original",
                        address, existing.agent_id, existing.contract_address
                    );
                }
                Some(_) => {}
                None => {
                    let handle = AgentHandle {
                        agent_id: AgentId(index as u64),
                        contract_address: address,
                    };
                    info!("  Discovered {} at {:?}", handle.agent_id, address);
                    self.agents.push(handle);
                }
            }
        }

        info!(
            "Registry resolved: {} agents ({} new) under coordinator {:?}",
            self.agents.len(),
            self.agents.len() - before,
            self.coordinator
        );
    }
}
