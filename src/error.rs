use crate::contract::{ContractEvent, ContractStatus};
use rust_decimal::Decimal;

/// Failures reported by every core operation.
#[derive(thiserror::Error, Debug)]
pub enum MarketError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("cannot {event} a contract that is {status}")]
    InvalidTransition {
        status: ContractStatus,
        event: ContractEvent,
    },
    #[error("{actor} is not permitted to {action}")]
    Authorization { actor: String, action: String },
    #[error("{kind} {id} was not found")]
    NotFound { kind: &'static str, id: String },
    #[error("listing {listing_id} kept changing, gave up after {attempts} attempts")]
    Conflict { listing_id: String, attempts: u32 },
    #[error("upstream call failed: {0:#}")]
    Upstream(#[from] anyhow::Error),
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("available quantity {0} is negative")]
    NegativeQuantity(Decimal),
    #[error("quantity {0} must be greater than zero")]
    NonPositiveQuantity(Decimal),
    #[error("price {0} must be greater than zero")]
    NonPositivePrice(Decimal),
    #[error("requested {requested} but only {available} is available")]
    InsufficientQuantity {
        requested: Decimal,
        available: Decimal,
    },
    #[error("offered price {offered} is below the minimum of {minimum}")]
    PriceBelowMinimum { offered: Decimal, minimum: Decimal },
    #[error("{quantity} x {price} is too large to price")]
    TotalOverflow { quantity: Decimal, price: Decimal },
    #[error("a profile already exists for {0}")]
    ProfileExists(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Raised when a stored record does not match the entity it is read as.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SchemaError {
    #[error("record is missing field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` should hold {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    #[error("field `{field}` holds an invalid value: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl From<SchemaError> for MarketError {
    fn from(value: SchemaError) -> Self {
        MarketError::Upstream(value.into())
    }
}

impl MarketError {
    pub(crate) fn not_found(kind: &'static str, id: &str) -> Self {
        MarketError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub(crate) fn unauthorized(actor: &str, action: impl Into<String>) -> Self {
        MarketError::Authorization {
            actor: actor.to_string(),
            action: action.into(),
        }
    }
}
