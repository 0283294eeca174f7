//! Remote transaction API boundary.
//!
//! The engine only needs two things from the backend: accept one transaction, and tell us
//! whether it is reachable at all. [`TransactionApi`] is that seam; [`HttpTransactionApi`]
//! is the production implementation and tests plug in scripted fakes.

/// HTTP implementation of the transaction API
pub mod http;

pub use http::HttpTransactionApi;

use crate::core::transaction::TransactionRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Successful submission: the remote store now owns the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgment {
    /// Identifier assigned by the remote store, when the response carried one
    pub id: Option<String>,
}

/// Why a submission did not result in an acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The request reached the server and the server declined it.
    #[error("rejected with status {status}: {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Message from the `{error}` body, or the raw body
        message: String,
    },
    /// The exchange could not be completed (refused, DNS, timeout, dropped connection).
    #[error("transport failure: {message}")]
    Transport {
        /// Failure description
        message: String,
    },
}

impl SubmitError {
    /// True for transport-level failures.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

impl From<SubmitError> for crate::errors::Error {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Rejected { status, message } => Self::Rejected { status, message },
            SubmitError::Transport { message } => Self::Network { message },
        }
    }
}

/// The remote transaction store.
#[async_trait]
pub trait TransactionApi: Send + Sync {
    /// Submits one transaction record.
    async fn submit(&self, record: &TransactionRecord) -> Result<Acknowledgment, SubmitError>;

    /// Cheap reachability check used by the connectivity probe.
    async fn is_reachable(&self) -> bool;
}
