//! The module contains the errors the engine can throw.
//!
//! Validation and ownership errors are returned before anything is written.
//! Errors raised inside a unit of work roll the whole transaction back, so
//! payment, registration and ledger rows are never left half-updated.
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Registration closed: {0}")]
    EventClosed(String),
    #[error("Already registered: {0}")]
    AlreadyRegistered(String),
    #[error("Hold already active: {0}")]
    HoldActive(String),
    #[error("Hold expired: {0}")]
    HoldExpired(String),
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),
    #[error("Already paid: {0}")]
    AlreadyPaid(String),
    #[error("Already refunded: {0}")]
    AlreadyRefunded(String),
    #[error("Refund window closed: {0}")]
    RefundWindowClosed(String),
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("Inconsistent state: {0}")]
    InconsistentState(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Currency mismatch: {0}")]
    CurrencyMismatch(String),
    #[error("Payment gateway error: {0}")]
    Gateway(String),
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl EngineError {
    /// Returns `true` for the errors a client can fix by retrying later or
    /// changing its request (everything except storage/gateway failures).
    #[must_use]
    pub fn is_domain(&self) -> bool {
        !matches!(
            self,
            Self::Database(_) | Self::Gateway(_) | Self::Configuration(_)
        )
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::Forbidden(a), Self::Forbidden(b)) => a == b,
            (Self::EventClosed(a), Self::EventClosed(b)) => a == b,
            (Self::AlreadyRegistered(a), Self::AlreadyRegistered(b)) => a == b,
            (Self::HoldActive(a), Self::HoldActive(b)) => a == b,
            (Self::HoldExpired(a), Self::HoldExpired(b)) => a == b,
            (Self::CapacityExceeded(a), Self::CapacityExceeded(b)) => a == b,
            (Self::AlreadyPaid(a), Self::AlreadyPaid(b)) => a == b,
            (Self::AlreadyRefunded(a), Self::AlreadyRefunded(b)) => a == b,
            (Self::RefundWindowClosed(a), Self::RefundWindowClosed(b)) => a == b,
            (Self::InsufficientFunds(a), Self::InsufficientFunds(b)) => a == b,
            (Self::InconsistentState(a), Self::InconsistentState(b)) => a == b,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::CurrencyMismatch(a), Self::CurrencyMismatch(b)) => a == b,
            (Self::Gateway(a), Self::Gateway(b)) => a == b,
            (Self::Configuration(a), Self::Configuration(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
