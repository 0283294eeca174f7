//! `reqwest`-backed client for the backend's `/api/transactions` endpoint.

use super::{Acknowledgment, SubmitError, TransactionApi};
use crate::core::transaction::TransactionRecord;
use crate::errors::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const TRANSACTIONS_PATH: &str = "/api/transactions";

/// HTTP client for the remote transaction store.
#[derive(Debug, Clone)]
pub struct HttpTransactionApi {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
struct CreatedBody {
    id: serde_json::Value,
}

impl HttpTransactionApi {
    /// Builds a client for `base_url` whose requests are bounded by `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url).map_err(|e| Error::Config {
            message: format!("invalid remote base url '{base_url}': {e}"),
        })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::Config {
                message: format!("failed to build http client: {e}"),
            })?;

        Ok(Self { base_url, client })
    }

    fn transactions_url(&self) -> String {
        format!("{}{TRANSACTIONS_PATH}", self.base_url)
    }
}

/// Extracts the `{error}` message from a rejection body, falling back to the raw text.
fn rejection_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body).map_or_else(
        |_| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "no response body".to_string()
            } else {
                trimmed.to_string()
            }
        },
        |b| b.error,
    )
}

/// Reads the server-assigned id from a success body. A 2xx is an acknowledgment even if the
/// body is not what we expect; the transaction is already stored remotely.
fn acknowledgment_from(body: &str) -> Acknowledgment {
    let id = serde_json::from_str::<CreatedBody>(body)
        .ok()
        .and_then(|b| match b.id {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
    Acknowledgment { id }
}

#[async_trait]
impl TransactionApi for HttpTransactionApi {
    #[instrument(skip(self, record), fields(category = %record.category, date = %record.date))]
    async fn submit(&self, record: &TransactionRecord) -> std::result::Result<Acknowledgment, SubmitError> {
        let response = self
            .client
            .post(self.transactions_url())
            .json(record)
            .send()
            .await
            .map_err(|e| SubmitError::Transport {
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| SubmitError::Transport {
            message: format!("failed to read response body: {e}"),
        })?;

        if status.is_success() {
            debug!(status = status.as_u16(), "Transaction acknowledged");
            Ok(acknowledgment_from(&body))
        } else {
            let message = rejection_message(&body);
            warn!(status = status.as_u16(), %message, "Transaction rejected");
            Err(SubmitError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }

    async fn is_reachable(&self) -> bool {
        // Any HTTP answer, even an error status, proves the channel is up.
        self.client
            .head(self.transactions_url())
            .send()
            .await
            .is_ok()
    }
}
