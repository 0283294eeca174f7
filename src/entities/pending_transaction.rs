//! Pending transaction entity - transactions recorded locally and not yet acknowledged
//! by the remote store.
//!
//! The `id` column is the store-assigned `local_id`. It uses SQLite `AUTOINCREMENT`, so
//! an id is never handed out twice even after the row holding it has been removed.
//! `meta_id` is a plain lookup key into the savings-goal table of the remote system; it is
//! deliberately not a relation.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Pending transaction database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pending_transactions")]
pub struct Model {
    /// Store-assigned local identifier, monotonically increasing
    #[sea_orm(primary_key)]
    pub id: i64,
    /// `"income"` or `"expense"`
    pub kind: String,
    /// Category name, never empty
    pub category: String,
    /// Canonical decimal string, always positive
    pub amount: String,
    /// Optional free-form description
    pub description: Option<String>,
    /// Calendar date of the transaction
    pub date: Date,
    /// Weak reference to a savings goal
    pub meta_id: Option<String>,
    /// Installment count metadata, opaque to the store
    pub installments: Option<i32>,
    /// Recurrence metadata, opaque to the store
    pub recurrence: Option<String>,
    /// Recurrence count metadata, opaque to the store
    pub recurrence_count: Option<i32>,
    /// When the entry was enqueued; drives drain order
    pub enqueued_at: DateTimeUtc,
}

/// Pending transactions have no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
