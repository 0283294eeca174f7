//! Shared test utilities.
//!
//! Provides an in-memory pending store, draft builders with sensible defaults, and a
//! scripted [`MockTransactionApi`] that records every submission it receives.

#![allow(clippy::unwrap_used)]

use crate::{
    core::{
        pending_store::PendingStore,
        transaction::{TransactionDraft, TransactionKind, TransactionRecord},
    },
    errors::Result,
    remote::{Acknowledgment, SubmitError, TransactionApi},
};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Routes test logs through the test writer so they only show for failing tests.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Creates a pending store over an in-memory `SQLite` database.
pub async fn setup_test_store() -> Result<PendingStore> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    PendingStore::new(db).await
}

/// Builds an expense draft dated 2025-01-15.
///
/// # Defaults
/// * `description`: None
/// * `meta_id`: None
/// * no installment or recurrence metadata
pub fn expense_draft(category: &str, amount: i64) -> TransactionDraft {
    TransactionDraft::new(
        TransactionKind::Expense,
        category,
        Decimal::new(amount, 0),
        NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
    )
}

/// Scripted remote API.
///
/// Every submission is recorded in arrival order. Submissions whose description (or
/// category, when there is no description) matches a scripted key fail with the scripted
/// error; everything else is acknowledged.
#[derive(Default)]
pub struct MockTransactionApi {
    submissions: Mutex<Vec<TransactionRecord>>,
    failures: Mutex<HashMap<String, SubmitError>>,
    delay: Mutex<Option<Duration>>,
    unreachable: AtomicBool,
    next_id: AtomicU64,
}

impl MockTransactionApi {
    /// Creates a mock that acknowledges everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails submissions matching `key` with a transport error.
    pub fn fail_transport(&self, key: &str) {
        self.failures.lock().unwrap().insert(
            key.to_string(),
            SubmitError::Transport {
                message: "connection reset".to_string(),
            },
        );
    }

    /// Fails submissions matching `key` with an application-level rejection.
    pub fn reject(&self, key: &str) {
        self.failures.lock().unwrap().insert(
            key.to_string(),
            SubmitError::Rejected {
                status: 422,
                message: format!("{key} is not acceptable"),
            },
        );
    }

    /// Removes every scripted failure.
    pub fn heal(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// Makes every submission wait before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Controls what `is_reachable` reports.
    pub fn set_reachable(&self, reachable: bool) {
        self.unreachable.store(!reachable, Ordering::SeqCst);
    }

    /// Every record received so far, in arrival order.
    pub fn submissions(&self) -> Vec<TransactionRecord> {
        self.submissions.lock().unwrap().clone()
    }

    /// Categories of the records received so far, in arrival order.
    pub fn submitted_categories(&self) -> Vec<String> {
        self.submissions()
            .into_iter()
            .map(|r| r.category)
            .collect()
    }
}

#[async_trait]
impl TransactionApi for MockTransactionApi {
    async fn submit(
        &self,
        record: &TransactionRecord,
    ) -> std::result::Result<Acknowledgment, SubmitError> {
        self.submissions.lock().unwrap().push(record.clone());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = {
            let failures = self.failures.lock().unwrap();
            record
                .description
                .as_ref()
                .and_then(|d| failures.get(d))
                .or_else(|| failures.get(&record.category))
                .cloned()
        };

        match failure {
            Some(err) => Err(err),
            None => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(Acknowledgment {
                    id: Some(id.to_string()),
                })
            }
        }
    }

    async fn is_reachable(&self) -> bool {
        !self.unreachable.load(Ordering::SeqCst)
    }
}
