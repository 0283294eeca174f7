//! Database configuration module.
//!
//! Handles the `SQLite` connection and creation of the pending-transaction table using `SeaORM`.
//! The table statement is generated from the entity definition with
//! `Schema::create_table_from_entity`, so the schema always matches the Rust model. Creation is
//! `IF NOT EXISTS`: opening an existing database leaves its queued entries untouched.

use crate::entities::PendingTransaction;
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};
use tracing::{debug, instrument};

/// Default location of the local database file.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://finance_sync.sqlite?mode=rwc";

/// Gets the database URL from the `DATABASE_URL` environment variable, falling back to
/// the given configured value.
#[must_use]
pub fn get_database_url(configured: &str) -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| configured.to_string())
}

/// Establishes a connection to the `SQLite` database at `database_url`.
#[instrument]
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    debug!("Connecting to local database");
    Database::connect(database_url).await.map_err(Into::into)
}

/// Creates the pending-transaction table if it does not exist yet.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut pending_table = schema.create_table_from_entity(PendingTransaction);
    pending_table.if_not_exists();

    db.execute(builder.build(&pending_table)).await?;

    Ok(())
}
