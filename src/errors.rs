//! Unified error types for the sync engine.
//!
//! Storage and expansion failures are returned to the caller of the operation that
//! caused them. Network failures and rejections that happen during a drain pass never
//! surface here; the coordinator absorbs them and reports through its event channel.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors produced by the engine's public operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The durable local store is unavailable, full, or otherwise failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Backend error description
        message: String,
    },

    /// Transaction amounts must be strictly positive.
    #[error("Invalid amount: {amount} (must be greater than zero)")]
    InvalidAmount {
        /// The offending amount
        amount: Decimal,
    },

    /// A transaction field failed validation.
    #[error("Invalid transaction: {message}")]
    InvalidTransaction {
        /// What was wrong
        message: String,
    },

    /// The installment count is not an integer between 2 and 120.
    #[error("Invalid installment count: {value} (must be an integer from 2 to 120)")]
    Expansion {
        /// The rejected count as it was received
        value: String,
    },

    /// The remote API received the transaction and declined it.
    #[error("Remote rejected transaction (status {status}): {message}")]
    Rejected {
        /// HTTP status returned by the remote API
        status: u16,
        /// Rejection message
        message: String,
    },

    /// The remote API could not be reached.
    #[error("Network error: {message}")]
    Network {
        /// Transport failure description
        message: String,
    },

    /// Configuration could not be read or parsed.
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },
}

impl From<sea_orm::DbErr> for Error {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Storage {
            message: err.to_string(),
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
