//! Forward supply contracts between farmers and buyers.
//!
//! Farmers publish listings into a [`ListingCatalog`], buyers find them with
//! [`search`] and propose contracts through the [`NegotiationEngine`], and the
//! [`ContractLedger`] builds per-principal dashboards. Persistence goes through
//! the [`DocumentStore`] trait; [`SledStore`] is the bundled implementation.

pub mod config;
pub mod contract;
pub mod document;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod listing;
pub mod negotiation;
pub mod search;
pub mod store;
pub mod types;
pub mod utils;

pub use config::{CancelPolicy, MarketConfig};
pub use contract::{Contract, ContractEvent, ContractStatus};
pub use error::{MarketError, SchemaError, ValidationError};
pub use identity::{IdentityProvider, IdentityResolver, NewPrincipal, Principal, ProfileUpdate, Role, Session, SessionTable};
pub use ledger::{ContractLedger, Dashboard, StatusPartition, partition_by_status};
pub use listing::{CropCategory, Listing, ListingCatalog, ListingDraft};
pub use negotiation::NegotiationEngine;
pub use search::{CategoryFilter, SearchCriteria, search};
pub use store::{Collection, DocumentStore, InsertOutcome, SledStore, UpdateOutcome};
pub use types::TimeStamp;
