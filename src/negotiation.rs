//! Service layer for the contract lifecycle
use crate::config::MarketConfig;
use crate::contract::{Contract, ContractEvent, ContractStatus};
use crate::document::Fields;
use crate::error::{MarketError, ValidationError};
use crate::identity::{Role, Session};
use crate::listing::{Listing, ListingCatalog};
use crate::store::{Collection, DocumentStore, Guard, UpdateOutcome};
use crate::types::TimeStamp;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct NegotiationEngine {
    store: Arc<dyn DocumentStore>,
    catalog: ListingCatalog,
    config: MarketConfig,
}

impl NegotiationEngine {
    pub fn new(store: Arc<dyn DocumentStore>, config: MarketConfig) -> Self {
        let catalog = ListingCatalog::new(store.clone(), config.reservation_attempts);
        Self {
            store,
            catalog,
            config,
        }
    }

    pub fn catalog(&self) -> &ListingCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    async fn load_contract(&self, contract_id: &str) -> Result<Contract, MarketError> {
        let doc = self
            .store
            .get(Collection::Contracts, contract_id)
            .await?
            .ok_or_else(|| MarketError::not_found("contract", contract_id))?;
        Ok(Contract::from_document(&doc)?)
    }

    /// Fetch a contract for one of its two parties.
    pub async fn get(&self, session: &Session, contract_id: &str) -> Result<Contract, MarketError> {
        let contract = self.load_contract(contract_id).await?;
        if contract.party_role(session.principal()).is_none() {
            return Err(MarketError::unauthorized(
                session.principal_id(),
                format!("read contract {contract_id}"),
            ));
        }
        Ok(contract)
    }

    /// Propose a contract against a listing. The requested quantity is reserved on the
    /// listing before the contract is stored.
    pub async fn propose(
        &self,
        session: &Session,
        listing_id: &str,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<Contract, MarketError> {
        session.require_role(Role::Purchaser, "propose contracts")?;
        // terms no listing could satisfy are refused before any stock is touched
        if quantity <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveQuantity(quantity).into());
        }
        if price <= Decimal::ZERO {
            return Err(ValidationError::NonPositivePrice(price).into());
        }
        let total = quantity
            .checked_mul(price)
            .ok_or(ValidationError::TotalOverflow { quantity, price })?;

        let listing = self.catalog.reserve(listing_id, quantity, price).await?;
        let contract = match self.record_proposal(&listing, session, quantity, price).await {
            Ok(contract) => contract,
            Err(e) => {
                warn!(listing = %listing_id, %quantity, "contract insert failed, releasing reservation");
                if let Err(release_err) = self.catalog.release(listing_id, quantity).await {
                    error!(listing = %listing_id, %quantity, "failed to release reservation: {release_err}");
                }
                return Err(e);
            }
        };

        info!(
            contract = %contract.id,
            listing = %listing_id,
            buyer = %contract.buyer_id,
            %quantity,
            %price,
            %total,
            "contract proposed"
        );
        Ok(contract)
    }

    async fn record_proposal(
        &self,
        listing: &Listing,
        session: &Session,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<Contract, MarketError> {
        let mut contract = Contract::from_proposal(
            listing,
            listing.digest()?,
            session.principal(),
            quantity,
            price,
            self.config.delivery_window_days,
        );
        contract.id = self
            .store
            .create(Collection::Contracts, contract.to_fields())
            .await?;
        Ok(contract)
    }

    pub async fn accept(&self, session: &Session, contract_id: &str) -> Result<Contract, MarketError> {
        self.transition(session, contract_id, ContractEvent::Accept).await
    }

    pub async fn decline(&self, session: &Session, contract_id: &str) -> Result<Contract, MarketError> {
        self.transition(session, contract_id, ContractEvent::Decline).await
    }

    pub async fn mark_delivered(
        &self,
        session: &Session,
        contract_id: &str,
    ) -> Result<Contract, MarketError> {
        self.transition(session, contract_id, ContractEvent::MarkDelivered)
            .await
    }

    pub async fn cancel(&self, session: &Session, contract_id: &str) -> Result<Contract, MarketError> {
        self.transition(session, contract_id, ContractEvent::Cancel).await
    }

    /// Applies `event` with a write guarded on the status the decision was made from,
    /// so of two racing transitions only one lands.
    async fn transition(
        &self,
        session: &Session,
        contract_id: &str,
        event: ContractEvent,
    ) -> Result<Contract, MarketError> {
        let mut contract = self.load_contract(contract_id).await?;
        let next = match contract.plan(session.principal(), event, self.config.cancel_policy) {
            Ok(next) => next,
            Err(e) => {
                warn!(contract = %contract_id, actor = %session.principal_id(), %event, "transition refused: {e}");
                return Err(e);
            }
        };

        let updated_at = TimeStamp::new();
        let mut patch = Fields::new();
        patch.insert("status".into(), next.as_str().into());
        patch.insert("updatedAt".into(), (&updated_at).into());
        let guard = Guard::new("status", contract.status.as_str());

        match self
            .store
            .update_if(Collection::Contracts, contract_id, &guard, patch)
            .await?
        {
            UpdateOutcome::Applied => {}
            UpdateOutcome::GuardFailed => {
                // someone else moved it first; report against what is stored now
                let current = self.load_contract(contract_id).await?;
                warn!(contract = %contract_id, %event, status = %current.status, "lost a transition race");
                return Err(MarketError::InvalidTransition {
                    status: current.status,
                    event,
                });
            }
            UpdateOutcome::Missing => return Err(MarketError::not_found("contract", contract_id)),
        }

        let previous = contract.status;
        contract.status = next;
        contract.updated_at = Some(updated_at);

        // the status change stands even if the stock cannot be returned
        if next == ContractStatus::Cancelled {
            if let Err(e) = self
                .catalog
                .release(&contract.listing_id, contract.quantity)
                .await
            {
                error!(contract = %contract_id, listing = %contract.listing_id, "failed to release reservation: {e}");
            }
        }

        info!(
            contract = %contract_id,
            actor = %session.principal_id(),
            from = %previous,
            to = %next,
            "contract transitioned"
        );
        Ok(contract)
    }
}
