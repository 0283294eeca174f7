//! Core engine - framework-agnostic offline sync and installment logic.

/// Online/offline tracking and the reachability probe
pub mod connectivity;
/// Installment expansion and sequential submission
pub mod installments;
/// Durable queue of unacknowledged transactions
pub mod pending_store;
/// Drain passes, the submission path, and engine events
pub mod sync;
/// Transaction domain types
pub mod transaction;

pub use connectivity::{Connectivity, ConnectivityMonitor, Subscription, spawn_probe};
pub use installments::{ExpansionReport, InstallmentExpander, InstallmentIntent};
pub use pending_store::PendingStore;
pub use sync::{DrainOutcome, DrainReport, RecordOutcome, SkipReason, SyncCoordinator, SyncEvent};
pub use transaction::{PendingTransaction, TransactionDraft, TransactionKind, TransactionRecord};
