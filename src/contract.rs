//! Contracts and the negotiation state machine.
//!
//! ```text
//!            accept              mark delivered
//! pending ----------> active ------------------> completed
//!    |                  |
//!    | decline/cancel   | cancel
//!    +------------------+-----> cancelled
//! ```
//!
//! Everything here is pure; persistence lives in [`crate::negotiation`].
use crate::config::CancelPolicy;
use crate::document::{Document, Fields};
use crate::error::{MarketError, SchemaError};
use crate::identity::{Principal, Role};
use crate::listing::Listing;
use crate::types::TimeStamp;
use crate::utils::{self, LISTING_PREFIX};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractEvent {
    Accept,
    Decline,
    MarkDelivered,
    Cancel,
}

impl ContractStatus {
    pub const ALL: [ContractStatus; 4] = [
        ContractStatus::Pending,
        ContractStatus::Active,
        ContractStatus::Completed,
        ContractStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Pending => "pending",
            ContractStatus::Active => "active",
            ContractStatus::Completed => "completed",
            ContractStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ContractStatus::Completed | ContractStatus::Cancelled)
    }

    /// The transition table. `None` means `event` is not allowed from this state.
    pub fn next(self, event: ContractEvent) -> Option<ContractStatus> {
        use ContractEvent::*;
        use ContractStatus::*;

        match (self, event) {
            (Pending, Accept) => Some(Active),
            (Pending, Decline) => Some(Cancelled),
            (Active, MarkDelivered) => Some(Completed),
            (Pending | Active, Cancel) => Some(Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContractStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown contract status `{s}`"))
    }
}

impl ContractEvent {
    pub const ALL: [ContractEvent; 4] = [
        ContractEvent::Accept,
        ContractEvent::Decline,
        ContractEvent::MarkDelivered,
        ContractEvent::Cancel,
    ];
}

impl fmt::Display for ContractEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            ContractEvent::Accept => "accept",
            ContractEvent::Decline => "decline",
            ContractEvent::MarkDelivered => "mark as delivered",
            ContractEvent::Cancel => "cancel",
        };
        f.write_str(verb)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub id: String,
    pub listing_id: String,
    pub listing_digest: String, // sha256 of the listing as it was validated
    pub farmer_id: String,
    pub farmer_name: String,
    pub buyer_id: String,
    pub buyer_name: String,
    pub crop_name: String,
    pub quantity: Decimal,
    pub price: Decimal,
    pub status: ContractStatus,
    pub created_at: TimeStamp<Utc>,
    pub delivery_date: TimeStamp<Utc>,
    pub updated_at: Option<TimeStamp<Utc>>,
}

impl Contract {
    /// A pending contract built from the listing snapshot the terms were checked against.
    /// The id is assigned when the contract is stored.
    pub fn from_proposal(
        listing: &Listing,
        listing_digest: String,
        buyer: &Principal,
        quantity: Decimal,
        price: Decimal,
        delivery_window_days: i64,
    ) -> Self {
        let created_at = TimeStamp::new();
        let delivery_date = created_at.plus_days(delivery_window_days);

        Self {
            id: String::new(),
            listing_id: listing.id.clone(),
            listing_digest,
            farmer_id: listing.farmer_id.clone(),
            farmer_name: listing.farmer_name.clone(),
            buyer_id: buyer.id.clone(),
            buyer_name: buyer.display_name.clone(),
            crop_name: listing.crop_name.clone(),
            quantity,
            price,
            status: ContractStatus::Pending,
            created_at,
            delivery_date,
            updated_at: None,
        }
    }

    /// `quantity * price`, or `None` when the product leaves the decimal range.
    pub fn total_value(&self) -> Option<Decimal> {
        self.quantity.checked_mul(self.price)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The side of the contract `principal` is on, if any.
    pub fn party_role(&self, principal: &Principal) -> Option<Role> {
        match principal.role {
            Role::Producer if principal.id == self.farmer_id => Some(Role::Producer),
            Role::Purchaser if principal.id == self.buyer_id => Some(Role::Purchaser),
            _ => None,
        }
    }

    /// Looks `event` up in the table, then checks `actor` may fire it, returning the
    /// status the contract would move to. The contract itself is not touched.
    ///
    /// Pairs outside the table are `InvalidTransition` for everyone; `Authorization`
    /// only ever refuses a move the table would otherwise allow.
    pub fn plan(
        &self,
        actor: &Principal,
        event: ContractEvent,
        policy: CancelPolicy,
    ) -> Result<ContractStatus, MarketError> {
        let next = self
            .status
            .next(event)
            .ok_or(MarketError::InvalidTransition {
                status: self.status,
                event,
            })?;

        let allowed = match (event, self.party_role(actor)) {
            (_, None) => false,
            (ContractEvent::Cancel, Some(role)) => match policy {
                CancelPolicy::Either => true,
                CancelPolicy::Producer => role == Role::Producer,
                CancelPolicy::Purchaser => role == Role::Purchaser,
            },
            (_, Some(role)) => role == Role::Producer,
        };
        if !allowed {
            return Err(MarketError::unauthorized(
                &actor.id,
                format!("{event} contract {}", self.id),
            ));
        }
        Ok(next)
    }

    pub fn from_document(doc: &Document) -> Result<Self, SchemaError> {
        let listing_id = doc.text("listingId")?;
        if !utils::is_record_id(listing_id, LISTING_PREFIX) {
            return Err(SchemaError::InvalidValue {
                field: "listingId",
                reason: format!("`{listing_id}` is not a listing id"),
            });
        }
        let quantity = doc.number("quantity")?;
        if quantity <= Decimal::ZERO {
            return Err(SchemaError::InvalidValue {
                field: "quantity",
                reason: format!("{quantity} is not positive"),
            });
        }
        let price = doc.number("price")?;
        if price <= Decimal::ZERO {
            return Err(SchemaError::InvalidValue {
                field: "price",
                reason: format!("{price} is not positive"),
            });
        }
        if quantity.checked_mul(price).is_none() {
            return Err(SchemaError::InvalidValue {
                field: "price",
                reason: format!("{quantity} x {price} overflows"),
            });
        }

        Ok(Self {
            id: doc.id.clone(),
            listing_id: listing_id.to_string(),
            listing_digest: doc.text("listingDigest")?.to_string(),
            farmer_id: doc.text("farmerId")?.to_string(),
            farmer_name: doc.text("farmerName")?.to_string(),
            buyer_id: doc.text("buyerId")?.to_string(),
            buyer_name: doc.text("buyerName")?.to_string(),
            crop_name: doc.text("cropName")?.to_string(),
            quantity,
            price,
            status: doc.parsed("status")?,
            created_at: doc.timestamp("createdAt")?,
            delivery_date: doc.timestamp("deliveryDate")?,
            updated_at: doc.optional_timestamp("updatedAt")?,
        })
    }

    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("listingId".into(), self.listing_id.clone().into());
        fields.insert("listingDigest".into(), self.listing_digest.clone().into());
        fields.insert("farmerId".into(), self.farmer_id.clone().into());
        fields.insert("farmerName".into(), self.farmer_name.clone().into());
        fields.insert("buyerId".into(), self.buyer_id.clone().into());
        fields.insert("buyerName".into(), self.buyer_name.clone().into());
        fields.insert("cropName".into(), self.crop_name.clone().into());
        fields.insert("quantity".into(), self.quantity.into());
        fields.insert("price".into(), self.price.into());
        fields.insert("status".into(), self.status.as_str().into());
        fields.insert("createdAt".into(), (&self.created_at).into());
        fields.insert("deliveryDate".into(), (&self.delivery_date).into());
        if let Some(updated_at) = &self.updated_at {
            fields.insert("updatedAt".into(), updated_at.into());
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::new_record_id;

    fn principal(id: &str, role: Role) -> Principal {
        Principal {
            id: id.into(),
            display_name: id.to_uppercase(),
            email: format!("{id}@example.com"),
            role,
            location: None,
            phone: None,
            created_at: TimeStamp::new(),
            updated_at: None,
        }
    }

    fn contract(status: ContractStatus) -> Contract {
        Contract {
            id: "contract_1".into(),
            listing_id: new_record_id(LISTING_PREFIX).unwrap(),
            listing_digest: "digest".into(),
            farmer_id: "farmer".into(),
            farmer_name: "FARMER".into(),
            buyer_id: "buyer".into(),
            buyer_name: "BUYER".into(),
            crop_name: "Wheat".into(),
            quantity: Decimal::from(10),
            price: Decimal::new(1250, 2),
            status,
            created_at: TimeStamp::new(),
            delivery_date: TimeStamp::new().plus_days(30),
            updated_at: None,
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for status in [ContractStatus::Completed, ContractStatus::Cancelled] {
            for event in ContractEvent::ALL {
                assert_eq!(status.next(event), None);
            }
        }
    }

    #[test]
    fn producer_only_events_refuse_the_buyer() {
        let pending = contract(ContractStatus::Pending);
        let buyer = principal("buyer", Role::Purchaser);

        for event in [ContractEvent::Accept, ContractEvent::Decline] {
            assert!(matches!(
                pending.plan(&buyer, event, CancelPolicy::Either),
                Err(MarketError::Authorization { .. })
            ));
        }
        assert_eq!(
            pending
                .plan(&buyer, ContractEvent::Cancel, CancelPolicy::Either)
                .unwrap(),
            ContractStatus::Cancelled
        );
    }

    #[test]
    fn strangers_are_refused_every_allowed_move() {
        let active = contract(ContractStatus::Active);
        let other_farmer = principal("someone-else", Role::Producer);

        for event in [ContractEvent::MarkDelivered, ContractEvent::Cancel] {
            assert!(matches!(
                active.plan(&other_farmer, event, CancelPolicy::Either),
                Err(MarketError::Authorization { .. })
            ));
        }
        assert!(matches!(
            active.plan(&other_farmer, ContractEvent::Accept, CancelPolicy::Either),
            Err(MarketError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn moves_outside_the_table_are_invalid_for_anyone() {
        let cancelled = contract(ContractStatus::Cancelled);
        let buyer = principal("buyer", Role::Purchaser);
        let stranger = principal("stranger", Role::Purchaser);

        for actor in [&buyer, &stranger] {
            assert!(matches!(
                cancelled.plan(actor, ContractEvent::Accept, CancelPolicy::Either),
                Err(MarketError::InvalidTransition {
                    status: ContractStatus::Cancelled,
                    event: ContractEvent::Accept,
                })
            ));
        }
    }

    #[test]
    fn total_value_overflow_is_reported() {
        let mut huge = contract(ContractStatus::Pending);
        huge.quantity = Decimal::from(10i64.pow(15));
        huge.price = Decimal::from(10i64.pow(15));

        assert_eq!(huge.total_value(), None);
        assert!(matches!(
            Contract::from_document(&Document::new("contract_1", huge.to_fields())),
            Err(SchemaError::InvalidValue { field: "price", .. })
        ));
    }

    #[test]
    fn cancel_policy_limits_who_cancels() {
        let active = contract(ContractStatus::Active);
        let farmer = principal("farmer", Role::Producer);
        let buyer = principal("buyer", Role::Purchaser);

        assert!(active.plan(&farmer, ContractEvent::Cancel, CancelPolicy::Purchaser).is_err());
        assert!(active.plan(&buyer, ContractEvent::Cancel, CancelPolicy::Purchaser).is_ok());
        assert!(active.plan(&buyer, ContractEvent::Cancel, CancelPolicy::Producer).is_err());
        assert!(active.plan(&farmer, ContractEvent::Cancel, CancelPolicy::Producer).is_ok());
    }

    #[test]
    fn fields_round_trip_and_total_is_derived() {
        let original = contract(ContractStatus::Active);

        let decoded =
            Contract::from_document(&Document::new(original.id.clone(), original.to_fields()))
                .unwrap();

        assert_eq!(decoded, original);
        assert_eq!(decoded.total_value(), Some(Decimal::new(12500, 2)));
    }

    #[test]
    fn stored_contract_must_reference_a_listing() {
        let mut fields = contract(ContractStatus::Pending).to_fields();
        fields.insert("listingId".into(), "not-an-id".into());

        assert!(matches!(
            Contract::from_document(&Document::new("contract_1", fields)),
            Err(SchemaError::InvalidValue { field: "listingId", .. })
        ));
    }
}
