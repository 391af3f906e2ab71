use socialcredit_types::InventoryError;
use thiserror::Error;

use crate::store::StoreError;

/// Failure of an economy operation.
///
/// Every variant except [EconomyError::Store] is a rejection: the operation left no trace in the
/// ledger, inventories, or session registries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EconomyError {
    #[error("{0}")]
    Invalid(String),
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },
    #[error("not enough {id}: holding {held}, need {requested}")]
    InsufficientItems {
        id: String,
        held: u32,
        requested: u32,
    },
    #[error("{0} not found")]
    NotFound(String),
    #[error("already handled")]
    AlreadyHandled,
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("daily limit reached ({limit} per day)")]
    DailyLimit { limit: u32 },
    #[error("{0} is out of stock")]
    OutOfStock(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EconomyError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid(reason.into())
    }

    /// Stable code reported to the gateway alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            EconomyError::Invalid(_) => "INVALID",
            EconomyError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            EconomyError::InsufficientItems { .. } => "INSUFFICIENT_ITEMS",
            EconomyError::NotFound(_) => "NOT_FOUND",
            EconomyError::AlreadyHandled => "ALREADY_HANDLED",
            EconomyError::Forbidden(_) => "FORBIDDEN",
            EconomyError::DailyLimit { .. } => "DAILY_LIMIT",
            EconomyError::OutOfStock(_) => "OUT_OF_STOCK",
            EconomyError::Store(_) => "STORE_UNAVAILABLE",
        }
    }
}

impl From<InventoryError> for EconomyError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::Insufficient {
                id,
                held,
                requested,
            } => EconomyError::InsufficientItems {
                id,
                held,
                requested,
            },
        }
    }
}
