//! Installment expansion
//!
//! Turns one transaction intent with an installment count `N` into `N` transactions dated
//! the first day of each of the next `N` months, and submits them one after another. Every
//! generated record carries `installments = N` and `recurrence = "monthly"`, and its
//! description ends with `- Parcela i/N`.
//!
//! Submissions are sequential so that a partial failure leaves an explainable prefix-style
//! result. Unlike a drain pass, a failed installment does not stop the rest: installments
//! are created while online and the caller wants to report as much progress as possible.
//! Expanded installments never touch the pending store.

use crate::{
    core::{
        sync::submit_with_timeout,
        transaction::{TransactionDraft, TransactionKind},
    },
    errors::{Error, Result},
    remote::{Acknowledgment, SubmitError, TransactionApi},
};
use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Recurrence label attached to every generated installment.
pub const INSTALLMENT_RECURRENCE: &str = "monthly";

/// A validated installment count, between [`InstallmentCount::MIN`] and
/// [`InstallmentCount::MAX`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallmentCount(u32);

impl InstallmentCount {
    /// Smallest count this component handles; a single payment is a plain transaction.
    pub const MIN: u32 = 2;
    /// Largest accepted count: ten years of monthly payments.
    pub const MAX: u32 = 120;

    /// The count as a number.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl TryFrom<i64> for InstallmentCount {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        u32::try_from(value)
            .ok()
            .filter(|v| (Self::MIN..=Self::MAX).contains(v))
            .map(Self)
            .ok_or_else(|| Error::Expansion {
                value: value.to_string(),
            })
    }
}

impl TryFrom<&serde_json::Number> for InstallmentCount {
    type Error = Error;

    #[allow(clippy::cast_possible_truncation)]
    fn try_from(value: &serde_json::Number) -> Result<Self> {
        let invalid = || Error::Expansion {
            value: value.to_string(),
        };

        if let Some(n) = value.as_i64() {
            return Self::try_from(n);
        }
        // Parsers sometimes hand over `3.0`; a float is fine as long as it is integral.
        match value.as_f64() {
            Some(f) if f.is_finite() && f.fract() == 0.0 && f <= f64::from(u32::MAX) => {
                Self::try_from(f as i64).map_err(|_| invalid())
            }
            _ => Err(invalid()),
        }
    }
}

/// One user-stated transaction to be paid in installments.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallmentIntent {
    /// Income or expense
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// Category name
    pub category: String,
    /// Amount of each installment
    pub amount: Decimal,
    /// Base description; the category is used when absent
    #[serde(default)]
    pub description: Option<String>,
    /// Reference date; installments start the month after this date's month
    pub base_date: NaiveDate,
    /// Savings-goal reference copied onto every installment
    #[serde(default)]
    pub meta_id: Option<String>,
    /// Installment count as received from the caller
    pub installment_count: serde_json::Number,
}

/// One generated installment, ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedInstallment {
    /// 1-based position in the series
    pub index: u32,
    /// Series length
    pub of: u32,
    /// The transaction to submit
    pub draft: TransactionDraft,
}

/// A single installment that was not committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallmentFailure {
    /// 1-based position in the series
    pub index: u32,
    /// Why the submission failed
    pub error: SubmitError,
}

/// Outcome of expanding and submitting one intent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionReport {
    /// Installments submitted (always `N`)
    pub attempted: u32,
    /// Installments the remote store acknowledged
    pub committed: u32,
    /// Acknowledgments, in series order
    pub acknowledgments: Vec<Acknowledgment>,
    /// Failed installments, in series order
    pub failures: Vec<InstallmentFailure>,
}

impl ExpansionReport {
    /// Whether every installment was committed.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.committed == self.attempted
    }
}

/// Expands `intent` into its dated installments without submitting anything.
pub fn expand(intent: &InstallmentIntent) -> Result<Vec<ExpandedInstallment>> {
    let count = InstallmentCount::try_from(&intent.installment_count)?.get();

    let mut base = TransactionDraft::new(
        intent.kind,
        intent.category.clone(),
        intent.amount,
        intent.base_date,
    );
    base.meta_id.clone_from(&intent.meta_id);
    base.validate()?;

    let label = intent
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(intent.category.as_str())
        .to_string();
    let first_of_month = intent
        .base_date
        .with_day(1)
        .ok_or_else(|| Error::InvalidTransaction {
            message: format!("invalid base date {}", intent.base_date),
        })?;
    let out_of_range = || Error::Expansion {
        value: count.to_string(),
    };
    // The last date bounds every earlier one.
    first_of_month
        .checked_add_months(Months::new(count))
        .ok_or_else(out_of_range)?;

    (1..=count)
        .map(|index| -> Result<ExpandedInstallment> {
            let date = first_of_month
                .checked_add_months(Months::new(index))
                .ok_or_else(out_of_range)?;
            let mut draft = base.clone();
            draft.date = date;
            draft.description = Some(format!("{label} - Parcela {index}/{count}"));
            draft.installments = Some(count);
            draft.recurrence = Some(INSTALLMENT_RECURRENCE.to_string());
            Ok(ExpandedInstallment {
                index,
                of: count,
                draft,
            })
        })
        .collect()
}

/// Expands installment intents and submits them directly to the remote API.
pub struct InstallmentExpander {
    api: Arc<dyn TransactionApi>,
    submit_timeout: Duration,
}

impl InstallmentExpander {
    /// Creates an expander submitting through `api`.
    #[must_use]
    pub fn new(api: Arc<dyn TransactionApi>, submit_timeout: Duration) -> Self {
        Self {
            api,
            submit_timeout,
        }
    }

    /// Expands `intent` and submits every installment in order.
    ///
    /// An invalid intent fails before anything is submitted. After that, individual
    /// failures are collected in the report and do not stop the remaining installments.
    #[instrument(skip(self, intent), fields(category = %intent.category))]
    pub async fn expand_and_submit(&self, intent: &InstallmentIntent) -> Result<ExpansionReport> {
        let installments = expand(intent)?;
        let mut report = ExpansionReport::default();

        for installment in &installments {
            report.attempted += 1;
            let record = installment.draft.to_record();
            match submit_with_timeout(self.api.as_ref(), &record, self.submit_timeout).await {
                Ok(ack) => {
                    report.committed += 1;
                    report.acknowledgments.push(ack);
                }
                Err(error) => {
                    warn!(
                        index = installment.index,
                        of = installment.of,
                        %error,
                        "Installment submission failed"
                    );
                    report.failures.push(InstallmentFailure {
                        index: installment.index,
                        error,
                    });
                }
            }
        }

        info!(
            committed = report.committed,
            attempted = report.attempted,
            "Installments submitted"
        );
        Ok(report)
    }
}
