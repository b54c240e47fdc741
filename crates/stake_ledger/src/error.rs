//! Failure taxonomy for ledger and engine operations.

use crate::custody::CustodyError;
use thiserror::Error;

/// Every variant aborts the whole operation; nothing is partially applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StakeError {
    #[error("amount must be greater than zero")]
    InvalidAmount,
    #[error("null identity")]
    InvalidAddress,
    #[error("caller is not authorized")]
    Unauthorized,
    #[error("cannot start cooldown with zero staked balance")]
    InvalidBalanceOnCooldown,
    #[error("cooldown has not elapsed")]
    InsufficientCooldown,
    #[error("unstake window finished")]
    UnstakeWindowFinished,
    #[error("staked balance {available} below requested {requested}")]
    InsufficientBalance { available: u64, requested: u64 },
    #[error("engine already initialized")]
    AlreadyInitialized,
    #[error("engine not initialized")]
    NotInitialized,
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),
    #[error("custody: {0}")]
    Custody(#[from] CustodyError),
}

impl StakeError {
    /// Stable snake_case name, used by scenario expectations and journals.
    pub fn code(&self) -> &'static str {
        match self {
            StakeError::InvalidAmount => "invalid_amount",
            StakeError::InvalidAddress => "invalid_address",
            StakeError::Unauthorized => "unauthorized",
            StakeError::InvalidBalanceOnCooldown => "invalid_balance_on_cooldown",
            StakeError::InsufficientCooldown => "insufficient_cooldown",
            StakeError::UnstakeWindowFinished => "unstake_window_finished",
            StakeError::InsufficientBalance { .. } => "insufficient_balance",
            StakeError::AlreadyInitialized => "already_initialized",
            StakeError::NotInitialized => "not_initialized",
            StakeError::Overflow(_) => "overflow",
            StakeError::Custody(_) => "custody",
        }
    }
}
