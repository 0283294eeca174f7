//! Entity module - SeaORM entity definitions for the local database.
//! The engine persists a single table: the queue of pending transactions.

pub mod pending_transaction;

pub use pending_transaction::{
    Column as PendingTransactionColumn, Entity as PendingTransaction,
    Model as PendingTransactionModel,
};
