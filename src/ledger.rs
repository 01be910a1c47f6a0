//! Per-principal views over contracts, used for dashboards
use crate::contract::{Contract, ContractStatus};
use crate::document::Filter;
use crate::error::MarketError;
use crate::identity::{Role, Session};
use crate::store::{Collection, DocumentStore};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Contracts grouped by status. Every status has an entry, possibly empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPartition(BTreeMap<ContractStatus, Vec<Contract>>);

impl StatusPartition {
    pub fn get(&self, status: ContractStatus) -> &[Contract] {
        self.0.get(&status).map(Vec::as_slice).unwrap_or_default()
    }
    pub fn count(&self, status: ContractStatus) -> usize {
        self.get(status).len()
    }
    pub fn iter(&self) -> impl Iterator<Item = (ContractStatus, &[Contract])> {
        self.0.iter().map(|(status, group)| (*status, group.as_slice()))
    }
    pub fn into_inner(self) -> BTreeMap<ContractStatus, Vec<Contract>> {
        self.0
    }
}

/// Groups contracts by status, keeping their relative order within each group.
pub fn partition_by_status(contracts: &[Contract]) -> StatusPartition {
    let mut groups: BTreeMap<ContractStatus, Vec<Contract>> = ContractStatus::ALL
        .into_iter()
        .map(|status| (status, Vec::new()))
        .collect();
    for contract in contracts {
        groups
            .entry(contract.status)
            .or_default()
            .push(contract.clone());
    }
    StatusPartition(groups)
}

#[derive(Debug, Clone)]
pub struct Dashboard {
    pub role: Role,
    pub contracts: StatusPartition,
}

pub struct ContractLedger {
    store: Arc<dyn DocumentStore>,
}

impl ContractLedger {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Contracts where `principal_id` is the farmer (producer) or the buyer (purchaser),
    /// oldest first.
    pub async fn contracts_for(
        &self,
        principal_id: &str,
        role: Role,
    ) -> Result<Vec<Contract>, MarketError> {
        let field = match role {
            Role::Producer => "farmerId",
            Role::Purchaser => "buyerId",
        };
        let docs = self
            .store
            .query(Collection::Contracts, &Filter::all().eq(field, principal_id))
            .await?;

        let mut contracts = docs
            .iter()
            .map(Contract::from_document)
            .collect::<Result<Vec<_>, _>>()?;
        contracts.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        debug!(principal = %principal_id, %role, count = contracts.len(), "contracts loaded");
        Ok(contracts)
    }

    pub async fn dashboard(&self, session: &Session) -> Result<Dashboard, MarketError> {
        let contracts = self
            .contracts_for(session.principal_id(), session.role())
            .await?;
        Ok(Dashboard {
            role: session.role(),
            contracts: partition_by_status(&contracts),
        })
    }
}
