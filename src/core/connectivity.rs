//! Connectivity monitor
//!
//! Tracks whether the remote store is reachable and tells interested parties when that
//! changes. Listeners fire only on real transitions, never on steady state. The monitor
//! holds no transaction data; its one job is to let the sync coordinator notice the
//! offline→online edge.

use crate::remote::TransactionApi;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Reachability of the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// The remote store can be reached
    Online,
    /// The remote store cannot be reached
    Offline,
}

impl Connectivity {
    /// Maps a reachability check onto a state.
    #[must_use]
    pub const fn from_reachable(reachable: bool) -> Self {
        if reachable { Self::Online } else { Self::Offline }
    }
}

type Listener = Arc<dyn Fn(Connectivity) + Send + Sync>;

struct Inner {
    state: watch::Sender<Connectivity>,
    listeners: Mutex<HashMap<u64, Listener>>,
    next_listener_id: AtomicU64,
}

/// Shared handle to the connectivity state. Clones observe the same state.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<Inner>,
}

/// Keeps a listener registered. Dropping it, or calling [`Subscription::unsubscribe`],
/// removes the listener.
#[must_use = "dropping the subscription unregisters the listener"]
pub struct Subscription {
    monitor: Weak<Inner>,
    id: u64,
}

impl Subscription {
    /// Removes the listener.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.monitor.upgrade()
            && let Ok(mut listeners) = inner.listeners.lock()
        {
            listeners.remove(&self.id);
        }
    }
}

impl ConnectivityMonitor {
    /// Creates a monitor starting in `initial`.
    #[must_use]
    pub fn new(initial: Connectivity) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            inner: Arc::new(Inner {
                state,
                listeners: Mutex::new(HashMap::new()),
                next_listener_id: AtomicU64::new(0),
            }),
        }
    }

    /// The state as of this call.
    #[must_use]
    pub fn current_state(&self) -> Connectivity {
        *self.inner.state.borrow()
    }

    /// Shorthand for `current_state() == Online`.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.current_state() == Connectivity::Online
    }

    /// Feeds the environment's connectivity signal into the monitor.
    ///
    /// Returns `true` when this was a transition; listeners are only invoked then.
    pub fn set_state(&self, state: Connectivity) -> bool {
        let changed = self.inner.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });

        if !changed {
            return false;
        }

        match state {
            Connectivity::Online => info!("Network: online"),
            Connectivity::Offline => warn!("Network: offline"),
        }

        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .map(|l| l.values().cloned().collect())
            .unwrap_or_default();
        for listener in listeners {
            listener(state);
        }
        true
    }

    /// Registers `listener` for every online/offline transition.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(Connectivity) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut listeners) = self.inner.listeners.lock() {
            listeners.insert(id, Arc::new(listener));
        }
        Subscription {
            monitor: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Receiver for async consumers that want to await transitions.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Connectivity> {
        self.inner.state.subscribe()
    }
}

/// Periodically asks `api` whether it is reachable and feeds the answer into `monitor`.
pub fn spawn_probe(
    monitor: ConnectivityMonitor,
    api: Arc<dyn TransactionApi>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let reachable = api.is_reachable().await;
            debug!(reachable, "Connectivity probe");
            monitor.set_state(Connectivity::from_reachable(reachable));
        }
    })
}
