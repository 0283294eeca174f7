//! Transaction domain types shared by the pending store, the sync coordinator and the
//! installment expander.
//!
//! A [`TransactionDraft`] is what the user stated. A [`PendingTransaction`] is a draft that
//! the local store has accepted and numbered. A [`TransactionRecord`] is the body that goes
//! over the wire to the remote API; it never carries local-only fields.

use crate::{
    entities::pending_transaction,
    errors::{Error, Result},
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Direction of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Money coming in
    Income,
    /// Money going out
    Expense,
}

impl TransactionKind {
    /// Wire and storage representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            other => Err(Error::InvalidTransaction {
                message: format!("unknown transaction type '{other}'"),
            }),
        }
    }
}

/// A user-stated transaction that has not been stored or submitted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDraft {
    /// Income or expense
    pub kind: TransactionKind,
    /// Category name
    pub category: String,
    /// Positive amount
    pub amount: Decimal,
    /// Optional description; defaults to the category when submitted
    pub description: Option<String>,
    /// Calendar date of the transaction
    pub date: NaiveDate,
    /// Weak reference to a savings goal
    pub meta_id: Option<String>,
    /// Installment count metadata
    pub installments: Option<u32>,
    /// Recurrence metadata such as `"monthly"`
    pub recurrence: Option<String>,
    /// Recurrence count metadata
    pub recurrence_count: Option<u32>,
}

impl TransactionDraft {
    /// Creates a draft with only the required fields set.
    #[must_use]
    pub fn new(
        kind: TransactionKind,
        category: impl Into<String>,
        amount: Decimal,
        date: NaiveDate,
    ) -> Self {
        Self {
            kind,
            category: category.into(),
            amount,
            description: None,
            date,
            meta_id: None,
            installments: None,
            recurrence: None,
            recurrence_count: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the savings-goal reference.
    #[must_use]
    pub fn with_meta_id(mut self, meta_id: impl Into<String>) -> Self {
        self.meta_id = Some(meta_id.into());
        self
    }

    /// Checks the invariants every stored or submitted transaction must hold.
    pub fn validate(&self) -> Result<()> {
        if self.category.trim().is_empty() {
            return Err(Error::InvalidTransaction {
                message: "category must not be empty".to_string(),
            });
        }
        if self.amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount {
                amount: self.amount,
            });
        }
        for (field, value) in [
            ("installments", self.installments),
            ("recurrence_count", self.recurrence_count),
        ] {
            if value.is_some_and(|v| i32::try_from(v).is_err()) {
                return Err(Error::InvalidTransaction {
                    message: format!("{field} is out of range"),
                });
            }
        }
        Ok(())
    }

    /// Builds the wire body for this draft.
    ///
    /// An empty description is replaced by the category name.
    #[must_use]
    pub fn to_record(&self) -> TransactionRecord {
        let description = self
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map_or_else(|| self.category.clone(), ToString::to_string);

        TransactionRecord {
            kind: self.kind,
            category: self.category.clone(),
            amount: self.amount,
            description: Some(description),
            date: self.date,
            meta_id: self.meta_id.clone(),
            installments: self.installments,
            recurrence: self.recurrence.clone(),
            recurrence_count: self.recurrence_count,
        }
    }
}

/// Body of one submission to the remote transaction API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    /// Income or expense
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// Category name
    pub category: String,
    /// Positive amount, serialized as a JSON number
    pub amount: Decimal,
    /// Description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// ISO-8601 date
    pub date: NaiveDate,
    /// Savings-goal reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_id: Option<String>,
    /// Installment count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installments: Option<u32>,
    /// Recurrence label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<String>,
    /// Recurrence count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence_count: Option<u32>,
}

/// A transaction held by the local store until the remote API acknowledges it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransaction {
    /// Store-assigned identifier
    pub local_id: i64,
    /// Enqueue time, used only for drain ordering
    pub enqueued_at: DateTime<Utc>,
    /// The transaction itself
    pub draft: TransactionDraft,
}

impl PendingTransaction {
    /// Wire body with `local_id` and `enqueued_at` stripped.
    #[must_use]
    pub fn to_record(&self) -> TransactionRecord {
        self.draft.to_record()
    }
}

impl TryFrom<pending_transaction::Model> for PendingTransaction {
    type Error = Error;

    fn try_from(model: pending_transaction::Model) -> Result<Self> {
        let corrupt = |field: &str| Error::Storage {
            message: format!("pending transaction {} has an unreadable {field}", model.id),
        };

        let kind = model.kind.parse().map_err(|_| corrupt("type"))?;
        let amount = Decimal::from_str(&model.amount).map_err(|_| corrupt("amount"))?;
        let installments = model
            .installments
            .map(u32::try_from)
            .transpose()
            .map_err(|_| corrupt("installments"))?;
        let recurrence_count = model
            .recurrence_count
            .map(u32::try_from)
            .transpose()
            .map_err(|_| corrupt("recurrence_count"))?;

        Ok(Self {
            local_id: model.id,
            enqueued_at: model.enqueued_at,
            draft: TransactionDraft {
                kind,
                category: model.category,
                amount,
                description: model.description,
                date: model.date,
                meta_id: model.meta_id,
                installments,
                recurrence: model.recurrence,
                recurrence_count,
            },
        })
    }
}
