//! Sync coordinator - delivers the pending store to the remote transaction API.
//!
//! A drain pass takes a snapshot of the store, then submits the snapshot strictly in
//! insertion order:
//!
//! - acknowledged entries are removed from the store;
//! - a rejected entry stays queued and the pass moves on to the next entry;
//! - a transport failure (including a submission timeout) ends the pass immediately,
//!   leaving the failed entry and everything after it queued.
//!
//! Only one pass runs at a time. A drain request while a pass is in flight, or while
//! offline, is a no-op. Entries enqueued after the snapshot wait for the next pass.
//! There is no per-entry retry counter: an entry that the remote side keeps rejecting
//! stays queued until a user discards it.
//!
//! Outcomes are published to subscribers as [`SyncEvent`]s. A drain never returns an
//! error; nobody is waiting on it synchronously.

use crate::{
    core::{
        connectivity::{Connectivity, ConnectivityMonitor},
        pending_store::PendingStore,
        transaction::{PendingTransaction, TransactionDraft, TransactionRecord},
    },
    errors::Result,
    remote::{Acknowledgment, SubmitError, TransactionApi},
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Notifications published by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The number of queued entries was recomputed.
    PendingCountChanged(usize),
    /// A drain pass ended, whether it delivered everything, some, or nothing.
    SyncCompleted(DrainReport),
    /// A transaction was stored locally by the submission path.
    LocalTransactionAdded(PendingTransaction),
}

/// Summary of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Entries submitted during the pass
    pub attempted: usize,
    /// Entries acknowledged by the remote store
    pub delivered: usize,
    /// Entries the remote store declined; still queued
    pub rejected: usize,
    /// Whether the pass stopped before the end of its snapshot
    pub aborted: bool,
    /// Entries still queued after the pass
    pub remaining: usize,
}

/// Why a drain request did not start a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another pass is in flight
    AlreadyDraining,
    /// The connectivity monitor reports offline
    Offline,
}

/// Result of a drain request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// No pass was started
    Skipped(SkipReason),
    /// A pass ran
    Completed(DrainReport),
}

/// Result of the submission path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The remote store acknowledged the transaction directly
    Submitted(Acknowledgment),
    /// The transaction was stored locally for a later drain
    Queued(PendingTransaction),
}

/// Resets the draining flag when the pass ends, however it ends.
struct DrainGuard<'a>(&'a AtomicBool);

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns the drain state machine (`Idle -> Draining -> Idle`) and the event channel.
pub struct SyncCoordinator {
    store: PendingStore,
    api: Arc<dyn TransactionApi>,
    monitor: ConnectivityMonitor,
    submit_timeout: Duration,
    draining: AtomicBool,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncCoordinator {
    /// Creates a coordinator that owns `store`.
    #[must_use]
    pub fn new(
        store: PendingStore,
        api: Arc<dyn TransactionApi>,
        monitor: ConnectivityMonitor,
        submit_timeout: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            api,
            monitor,
            submit_timeout,
            draining: AtomicBool::new(false),
            events,
        }
    }

    /// Subscribes to coordinator events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// The underlying pending store.
    #[must_use]
    pub const fn store(&self) -> &PendingStore {
        &self.store
    }

    /// The connectivity monitor the coordinator consults.
    #[must_use]
    pub const fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    /// Whether a drain pass is in flight.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Number of queued entries.
    pub async fn pending_count(&self) -> Result<usize> {
        self.store.count().await
    }

    /// Stores a transaction locally and announces it.
    ///
    /// Storage failures are returned to the caller; the transaction is not kept anywhere else.
    pub async fn enqueue(&self, draft: TransactionDraft) -> Result<PendingTransaction> {
        let stored = self.store.enqueue(draft).await?;
        self.publish(SyncEvent::LocalTransactionAdded(stored.clone()));
        self.publish_pending_count().await;
        Ok(stored)
    }

    /// Submission path for a new user transaction.
    ///
    /// Offline, or when the submission fails in transport, the transaction is queued. A
    /// rejection is returned to the caller instead: queuing it would only repeat it.
    #[instrument(skip(self, draft), fields(category = %draft.category))]
    pub async fn record(&self, draft: TransactionDraft) -> Result<RecordOutcome> {
        draft.validate()?;

        if self.monitor.current_state() == Connectivity::Offline {
            info!("Offline, storing transaction locally");
            return self.enqueue(draft).await.map(RecordOutcome::Queued);
        }

        match self.submit_bounded(&draft.to_record()).await {
            Ok(ack) => Ok(RecordOutcome::Submitted(ack)),
            Err(SubmitError::Transport { message }) => {
                warn!(%message, "Submission failed in transport, storing transaction locally");
                self.enqueue(draft).await.map(RecordOutcome::Queued)
            }
            Err(err @ SubmitError::Rejected { .. }) => Err(err.into()),
        }
    }

    /// Runs one drain pass if the coordinator is idle and online.
    pub async fn drain(&self) -> DrainOutcome {
        if !self.monitor.is_online() {
            debug!("Drain requested while offline, skipping");
            return DrainOutcome::Skipped(SkipReason::Offline);
        }
        let Some(guard) = DrainGuard::acquire(&self.draining) else {
            debug!("Drain already in progress, skipping");
            return DrainOutcome::Skipped(SkipReason::AlreadyDraining);
        };

        let mut report = self.run_pass().await;
        drop(guard);

        report.remaining = match self.store.count().await {
            Ok(count) => count,
            Err(e) => {
                error!("Failed to count pending transactions after drain: {}", e);
                report.attempted.saturating_sub(report.delivered)
            }
        };
        self.publish(SyncEvent::PendingCountChanged(report.remaining));
        self.publish(SyncEvent::SyncCompleted(report.clone()));

        info!(
            delivered = report.delivered,
            rejected = report.rejected,
            aborted = report.aborted,
            remaining = report.remaining,
            "Drain pass finished"
        );
        DrainOutcome::Completed(report)
    }

    /// Drops every queued entry. Used for destructive resets only.
    pub async fn discard_all(&self) -> Result<u64> {
        let removed = self.store.clear().await?;
        warn!(removed, "Discarded all pending transactions");
        self.publish_pending_count().await;
        Ok(removed)
    }

    /// Tears the coordinator down and closes its store.
    pub async fn close(self) -> Result<()> {
        self.store.close().await
    }

    /// Spawns a task that drains once at start when online, then on every offline→online edge.
    pub fn spawn_auto_sync(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        let mut rx = self.monitor.watch();
        tokio::spawn(async move {
            let mut previous = *rx.borrow_and_update();
            if previous == Connectivity::Online {
                coordinator.drain().await;
            }
            while rx.changed().await.is_ok() {
                let current = *rx.borrow_and_update();
                if previous == Connectivity::Offline && current == Connectivity::Online {
                    info!("Connection restored, draining pending transactions");
                    coordinator.drain().await;
                }
                previous = current;
            }
        })
    }

    async fn run_pass(&self) -> DrainReport {
        let mut report = DrainReport::default();

        let snapshot = match self.store.list_all().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Failed to read pending transactions: {}", e);
                report.aborted = true;
                return report;
            }
        };
        if snapshot.is_empty() {
            debug!("Nothing to drain");
            return report;
        }
        info!(pending = snapshot.len(), "Draining pending transactions");

        for entry in &snapshot {
            report.attempted += 1;
            match self.submit_bounded(&entry.to_record()).await {
                Ok(_) => {
                    report.delivered += 1;
                    if let Err(e) = self.store.remove_by_id(entry.local_id).await {
                        // The remote side has it; the local copy will be sent again next pass.
                        error!(local_id = entry.local_id, "Failed to remove delivered entry: {}", e);
                        report.aborted = true;
                        break;
                    }
                }
                Err(SubmitError::Rejected { status, message }) => {
                    warn!(local_id = entry.local_id, status, %message, "Remote rejected pending transaction");
                    report.rejected += 1;
                }
                Err(SubmitError::Transport { message }) => {
                    warn!(local_id = entry.local_id, %message, "Transport failure, ending drain pass");
                    report.aborted = true;
                    break;
                }
            }
        }
        report
    }

    async fn submit_bounded(
        &self,
        record: &TransactionRecord,
    ) -> std::result::Result<Acknowledgment, SubmitError> {
        submit_with_timeout(self.api.as_ref(), record, self.submit_timeout).await
    }

    async fn publish_pending_count(&self) {
        match self.store.count().await {
            Ok(count) => self.publish(SyncEvent::PendingCountChanged(count)),
            Err(e) => error!("Failed to count pending transactions: {}", e),
        }
    }

    fn publish(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Submits `record`, turning an elapsed `timeout` into a transport failure.
pub(crate) async fn submit_with_timeout(
    api: &dyn TransactionApi,
    record: &TransactionRecord,
    timeout: Duration,
) -> std::result::Result<Acknowledgment, SubmitError> {
    tokio::time::timeout(timeout, api.submit(record))
        .await
        .unwrap_or_else(|_| {
            Err(SubmitError::Transport {
                message: format!("submission timed out after {timeout:?}"),
            })
        })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::errors::Error;
    use crate::test_utils::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn setup(
        connectivity: Connectivity,
    ) -> Result<(Arc<SyncCoordinator>, Arc<MockTransactionApi>)> {
        init_test_tracing();
        let store = setup_test_store().await?;
        let api = Arc::new(MockTransactionApi::new());
        let coordinator = SyncCoordinator::new(
            store,
            Arc::clone(&api) as Arc<dyn TransactionApi>,
            ConnectivityMonitor::new(connectivity),
            TIMEOUT,
        );
        Ok((Arc::new(coordinator), api))
    }

    async fn enqueue_abc(coordinator: &SyncCoordinator) -> Result<Vec<PendingTransaction>> {
        let mut stored = Vec::new();
        for (category, amount) in [("A", 10), ("B", 20), ("C", 30)] {
            stored.push(coordinator.enqueue(expense_draft(category, amount)).await?);
        }
        Ok(stored)
    }

    async fn queued_categories(coordinator: &SyncCoordinator) -> Result<Vec<String>> {
        Ok(coordinator
            .store()
            .list_all()
            .await?
            .into_iter()
            .map(|p| p.draft.category)
            .collect())
    }

    fn completed(outcome: DrainOutcome) -> DrainReport {
        match outcome {
            DrainOutcome::Completed(report) => report,
            DrainOutcome::Skipped(reason) => panic!("drain skipped: {reason:?}"),
        }
    }

    #[tokio::test]
    async fn test_round_trip_single_entry() -> Result<()> {
        let (coordinator, api) = setup(Connectivity::Online).await?;
        let stored = coordinator
            .enqueue(expense_draft("Mercado", 200).with_meta_id("goal-1"))
            .await?;

        let report = completed(coordinator.drain().await);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.remaining, 0);
        assert_eq!(coordinator.pending_count().await?, 0);

        let submissions = api.submissions();
        assert_eq!(submissions, vec![stored.to_record()]);
        let json = serde_json::to_value(&submissions[0]).unwrap();
        assert!(json.get("localId").is_none());
        assert!(json.get("enqueuedAt").is_none());
        assert_eq!(json["metaId"], "goal-1");
        Ok(())
    }

    #[tokio::test]
    async fn test_drains_in_insertion_order() -> Result<()> {
        let (coordinator, api) = setup(Connectivity::Online).await?;
        enqueue_abc(&coordinator).await?;

        completed(coordinator.drain().await);
        assert_eq!(api.submitted_categories(), vec!["A", "B", "C"]);
        assert_eq!(coordinator.pending_count().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_overlapping_drain_is_a_no_op() -> Result<()> {
        let (coordinator, api) = setup(Connectivity::Online).await?;
        coordinator.enqueue(expense_draft("A", 1)).await?;
        api.set_delay(Duration::from_millis(50));

        let (first, second) = tokio::join!(coordinator.drain(), coordinator.drain());

        assert_eq!(completed(first).delivered, 1);
        assert_eq!(second, DrainOutcome::Skipped(SkipReason::AlreadyDraining));
        assert_eq!(api.submissions().len(), 1);
        assert!(!coordinator.is_draining());
        Ok(())
    }

    #[tokio::test]
    async fn test_transport_failure_aborts_pass() -> Result<()> {
        let (coordinator, api) = setup(Connectivity::Online).await?;
        enqueue_abc(&coordinator).await?;
        api.fail_transport("B");

        let report = completed(coordinator.drain().await);

        assert!(report.aborted);
        assert_eq!(report.attempted, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.remaining, 2);
        assert_eq!(api.submitted_categories(), vec!["A", "B"]);
        assert_eq!(queued_categories(&coordinator).await?, vec!["B", "C"]);
        assert_eq!(coordinator.pending_count().await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_rejection_continues_with_siblings() -> Result<()> {
        let (coordinator, api) = setup(Connectivity::Online).await?;
        enqueue_abc(&coordinator).await?;
        api.reject("B");

        let report = completed(coordinator.drain().await);

        assert!(!report.aborted);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.rejected, 1);
        assert_eq!(api.submitted_categories(), vec!["A", "B", "C"]);
        assert_eq!(queued_categories(&coordinator).await?, vec!["B"]);
        assert_eq!(coordinator.pending_count().await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_rejected_entry_is_retried_next_pass() -> Result<()> {
        let (coordinator, api) = setup(Connectivity::Online).await?;
        enqueue_abc(&coordinator).await?;
        api.reject("B");
        completed(coordinator.drain().await);

        api.heal();
        let report = completed(coordinator.drain().await);

        assert_eq!(report.delivered, 1);
        assert_eq!(api.submitted_categories(), vec!["A", "B", "C", "B"]);
        assert_eq!(coordinator.pending_count().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_offline_drain_does_nothing() -> Result<()> {
        let (coordinator, api) = setup(Connectivity::Offline).await?;
        enqueue_abc(&coordinator).await?;

        assert_eq!(
            coordinator.drain().await,
            DrainOutcome::Skipped(SkipReason::Offline)
        );
        assert!(api.submissions().is_empty());
        assert_eq!(coordinator.pending_count().await?, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_entries_enqueued_mid_pass_wait_for_next_pass() -> Result<()> {
        let (coordinator, api) = setup(Connectivity::Online).await?;
        coordinator.enqueue(expense_draft("A", 1)).await?;
        api.set_delay(Duration::from_millis(100));

        let pass = tokio::spawn({
            let coordinator = Arc::clone(&coordinator);
            async move { coordinator.drain().await }
        });
        tokio::time::sleep(Duration::from_millis(30)).await;
        coordinator.enqueue(expense_draft("D", 4)).await?;

        let report = completed(pass.await.unwrap());
        assert_eq!(report.attempted, 1);
        assert_eq!(api.submitted_categories(), vec!["A"]);
        assert_eq!(queued_categories(&coordinator).await?, vec!["D"]);

        completed(coordinator.drain().await);
        assert_eq!(api.submitted_categories(), vec!["A", "D"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_timeout_counts_as_transport_failure() -> Result<()> {
        init_test_tracing();
        let store = setup_test_store().await?;
        let api = Arc::new(MockTransactionApi::new());
        api.set_delay(Duration::from_millis(200));
        let coordinator = SyncCoordinator::new(
            store,
            Arc::clone(&api) as Arc<dyn TransactionApi>,
            ConnectivityMonitor::new(Connectivity::Online),
            Duration::from_millis(20),
        );
        coordinator.enqueue(expense_draft("A", 1)).await?;
        coordinator.enqueue(expense_draft("B", 2)).await?;

        let report = completed(coordinator.drain().await);

        assert!(report.aborted);
        assert_eq!(api.submitted_categories(), vec!["A"]);
        assert_eq!(coordinator.pending_count().await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_events_for_enqueue_and_drain() -> Result<()> {
        let (coordinator, api) = setup(Connectivity::Online).await?;
        let mut events = coordinator.subscribe();

        let stored = coordinator.enqueue(expense_draft("A", 1)).await?;
        assert_eq!(
            events.try_recv().unwrap(),
            SyncEvent::LocalTransactionAdded(stored)
        );
        assert_eq!(events.try_recv().unwrap(), SyncEvent::PendingCountChanged(1));

        api.fail_transport("A");
        let report = completed(coordinator.drain().await);
        assert_eq!(events.try_recv().unwrap(), SyncEvent::PendingCountChanged(1));
        assert_eq!(events.try_recv().unwrap(), SyncEvent::SyncCompleted(report));
        assert!(events.try_recv().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_record_submits_directly_when_online() -> Result<()> {
        let (coordinator, api) = setup(Connectivity::Online).await?;

        let outcome = coordinator.record(expense_draft("Mercado", 80)).await?;

        assert!(matches!(outcome, RecordOutcome::Submitted(Acknowledgment { id: Some(_) })));
        assert_eq!(api.submissions().len(), 1);
        assert_eq!(coordinator.pending_count().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_record_queues_when_offline() -> Result<()> {
        let (coordinator, api) = setup(Connectivity::Offline).await?;

        let outcome = coordinator.record(expense_draft("Mercado", 80)).await?;

        assert!(matches!(outcome, RecordOutcome::Queued(_)));
        assert!(api.submissions().is_empty());
        assert_eq!(coordinator.pending_count().await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_record_queues_on_transport_failure() -> Result<()> {
        let (coordinator, api) = setup(Connectivity::Online).await?;
        api.fail_transport("Mercado");

        let outcome = coordinator.record(expense_draft("Mercado", 80)).await?;

        assert!(matches!(outcome, RecordOutcome::Queued(_)));
        assert_eq!(coordinator.pending_count().await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_record_surfaces_rejection() -> Result<()> {
        let (coordinator, api) = setup(Connectivity::Online).await?;
        api.reject("Mercado");

        let result = coordinator.record(expense_draft("Mercado", 80)).await;

        assert!(matches!(result, Err(Error::Rejected { status: 422, .. })));
        assert_eq!(coordinator.pending_count().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_discard_all_empties_store() -> Result<()> {
        let (coordinator, _api) = setup(Connectivity::Offline).await?;
        enqueue_abc(&coordinator).await?;
        let mut events = coordinator.subscribe();

        assert_eq!(coordinator.discard_all().await?, 3);
        assert_eq!(coordinator.pending_count().await?, 0);
        assert_eq!(events.try_recv().unwrap(), SyncEvent::PendingCountChanged(0));
        Ok(())
    }

    #[tokio::test]
    async fn test_auto_sync_drains_on_reconnect() -> Result<()> {
        let (coordinator, api) = setup(Connectivity::Offline).await?;
        enqueue_abc(&coordinator).await?;
        let mut events = coordinator.subscribe();
        let task = coordinator.spawn_auto_sync();
        tokio::task::yield_now().await;
        assert!(api.submissions().is_empty());

        coordinator.monitor().set_state(Connectivity::Online);

        let report = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let SyncEvent::SyncCompleted(report) = events.recv().await.unwrap() {
                    return report;
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(report.delivered, 3);
        assert_eq!(api.submitted_categories(), vec!["A", "B", "C"]);
        task.abort();
        Ok(())
    }
}
