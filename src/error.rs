use crate::domain::intent::IntentStatus;
use crate::domain::pool::PoolKind;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Insufficient funds in {pool} pool: available {available}, requested {requested}")]
    InsufficientFunds {
        pool: PoolKind,
        available: Decimal,
        requested: Decimal,
    },
    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),
    #[error("Conflicting confirmation for {reference}: already {current}, received {attempted}")]
    ConflictingConfirmation {
        reference: String,
        current: IntentStatus,
        attempted: IntentStatus,
    },
    #[error("Order {order} already settled by {settled_by}")]
    AlreadySettled { order: String, settled_by: String },
    #[error("Order {0} not found")]
    OrderNotFound(String),
    #[error("Payment intent {0} not found")]
    IntentNotFound(String),
    #[error("Invalid external reference: {0}")]
    InvalidReference(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Too much contention on {0}, giving up")]
    Contention(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Internal error: {0}")]
    Internal(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl LedgerError {
    /// Wraps any error as an internal one.
    pub fn internal<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Internal(err.into())
    }

    /// Errors a caller can fix by changing the request.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidAmount(_)
                | Self::InsufficientFunds { .. }
                | Self::InvalidReference(_)
                | Self::Validation(_)
        )
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
