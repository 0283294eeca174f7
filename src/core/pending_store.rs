//! Local pending store - durable queue of transactions the remote store has not acknowledged.
//!
//! The store is an explicit handle over a `SeaORM` connection. It is the only shared mutable
//! resource in the engine: the submission path enqueues, the sync coordinator lists and
//! removes. Entries are immutable once stored; removal is the only state transition.

use crate::{
    config::database::{create_connection, create_tables},
    core::transaction::{PendingTransaction, TransactionDraft},
    entities::{PendingTransaction as PendingEntity, pending_transaction},
    errors::Result,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryOrder, Set,
};
use tracing::{debug, info, instrument};

/// Durable keyed storage for pending transactions.
#[derive(Debug, Clone)]
pub struct PendingStore {
    db: DatabaseConnection,
}

impl PendingStore {
    /// Connects to `database_url` and creates the pending table if it is absent.
    #[instrument]
    pub async fn open(database_url: &str) -> Result<Self> {
        let db = create_connection(database_url).await?;
        Self::new(db).await
    }

    /// Wraps an existing connection, creating the pending table if it is absent.
    pub async fn new(db: DatabaseConnection) -> Result<Self> {
        create_tables(&db).await?;
        info!("Pending store ready");
        Ok(Self { db })
    }

    /// Persists a validated draft and returns the stored record with its `local_id`
    /// and `enqueued_at` assigned.
    ///
    /// Any backend failure is returned as [`crate::errors::Error::Storage`]; the entry is
    /// either durably stored or the caller learns that it was not.
    #[instrument(skip(self, draft), fields(category = %draft.category))]
    pub async fn enqueue(&self, draft: TransactionDraft) -> Result<PendingTransaction> {
        draft.validate()?;

        let model = pending_transaction::ActiveModel {
            kind: Set(draft.kind.as_str().to_string()),
            category: Set(draft.category.clone()),
            amount: Set(draft.amount.normalize().to_string()),
            description: Set(draft.description.clone()),
            date: Set(draft.date),
            meta_id: Set(draft.meta_id.clone()),
            installments: Set(draft.installments.and_then(|v| i32::try_from(v).ok())),
            recurrence: Set(draft.recurrence.clone()),
            recurrence_count: Set(draft.recurrence_count.and_then(|v| i32::try_from(v).ok())),
            enqueued_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        debug!(local_id = model.id, "Transaction enqueued");
        PendingTransaction::try_from(model)
    }

    /// Returns every pending entry in insertion order.
    ///
    /// Ordered by the autoincrement id, not `enqueued_at`: the wall clock can step backwards
    /// between two enqueues. Each call re-reads the current state; the result is a snapshot.
    pub async fn list_all(&self) -> Result<Vec<PendingTransaction>> {
        PendingEntity::find()
            .order_by_asc(pending_transaction::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(PendingTransaction::try_from)
            .collect()
    }

    /// Removes one entry. Removing an id that is not stored is a no-op.
    #[instrument(skip(self))]
    pub async fn remove_by_id(&self, local_id: i64) -> Result<()> {
        let result = PendingEntity::delete_by_id(local_id).exec(&self.db).await?;
        debug!(removed = result.rows_affected, "Pending entry removed");
        Ok(())
    }

    /// Removes every entry and returns how many were dropped.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<u64> {
        let result = PendingEntity::delete_many().exec(&self.db).await?;
        info!(removed = result.rows_affected, "Pending store cleared");
        Ok(result.rows_affected)
    }

    /// Number of entries currently queued.
    pub async fn count(&self) -> Result<usize> {
        let count = PendingEntity::find().count(&self.db).await?;
        Ok(usize::try_from(count).unwrap_or(usize::MAX))
    }

    /// Closes the underlying connection.
    pub async fn close(self) -> Result<()> {
        self.db.close().await?;
        Ok(())
    }
}
