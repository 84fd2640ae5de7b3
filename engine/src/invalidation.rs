//! Process-wide reset/invalidation channel.
//!
//! When the backing store is wiped (logout, account switch, cache purge),
//! incremental diffing is meaningless: every live query must re-fetch and
//! every asynchronous completion started before the wipe must be treated
//! as stale. The [`InvalidationBus`] carries both concerns: a broadcast to
//! subscribers, and a monotonically increasing epoch counter that in-flight
//! work snapshots at start and re-checks at completion.
//!
//! The bus is injectable rather than global so tests can trigger resets
//! deterministically.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use uuid::Uuid;

/// Callback invoked once per posted reset.
pub type ResetCallback = Box<dyn Fn() + Send + Sync>;

/// Broadcast channel for store-reset notifications.
#[derive(Default)]
pub struct InvalidationBus {
    epoch: AtomicU64,
    subscribers: DashMap<Uuid, ResetCallback>,
    /// Serializes delivery so subscribers observe resets in post order.
    delivery: Mutex<()>,
}

impl InvalidationBus {
    /// Create a new bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new bus wrapped in `Arc` for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// The current epoch. Bumped once per reset; completions carrying an
    /// older epoch must be discarded by their owner.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Register a reset callback. The subscription lives until the
    /// returned guard is dropped.
    pub fn subscribe(self: &Arc<Self>, callback: ResetCallback) -> InvalidationGuard {
        let token = Uuid::new_v4();
        self.subscribers.insert(token, callback);

        tracing::debug!(token = %token, "invalidation subscriber registered");

        InvalidationGuard {
            bus: Arc::downgrade(self),
            token,
        }
    }

    /// Signal that the store was wiped.
    ///
    /// The epoch is bumped before any subscriber runs, so work scheduled
    /// from inside a reset callback already observes the new epoch.
    pub fn post(&self) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(epoch, "invalidation posted");

        let _delivery = self.delivery.lock().expect("invalidation delivery lock poisoned");
        for entry in self.subscribers.iter() {
            (entry.value())();
        }
    }

    fn unsubscribe(&self, token: &Uuid) {
        if self.subscribers.remove(token).is_some() {
            tracing::debug!(token = %token, "invalidation subscriber unregistered");
        }
    }
}

impl std::fmt::Debug for InvalidationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationBus")
            .field("epoch", &self.epoch())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

/// Subscription handle; dropping it unsubscribes.
pub struct InvalidationGuard {
    bus: Weak<InvalidationBus>,
    token: Uuid,
}

impl Drop for InvalidationGuard {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(&self.token);
        }
    }
}
