//! Single-entity change listener.
//!
//! The degenerate case of a live query: watch exactly one record by
//! identity and report upserts and deletion of that record, nothing else.
//! Matching is structural: the listener holds a snapshot copy, so the
//! watched identity is compared by [`EntityId`], never by reference.

use crate::{
    ChangeEvent, EntityId, InlineScheduler, InvalidationGuard, LocalStore, ReadOnlyConvertible,
    Scheduler, Snapshot, SubscriptionGuard,
};
use std::sync::{Arc, Mutex, MutexGuard};

/// Typed observer for a watched entity.
///
/// For any one change event, exactly one of the two methods fires, never
/// both. After `on_delete` the listener is inert; construct a new one to
/// re-observe.
pub trait EntityObserver: Send {
    /// The watched record was inserted, updated, or refreshed; a fresh
    /// snapshot has already replaced the held one.
    fn on_upsert(&mut self, snapshot: &Snapshot) {
        let _ = snapshot;
    }

    /// The watched record was removed from the store.
    fn on_delete(&mut self) {}
}

struct Core {
    entity_id: EntityId,
    snapshot: Snapshot,
    observer: Option<Box<dyn EntityObserver>>,
    inert: bool,
    alive: bool,
}

/// Watches a single record for updates and deletion.
pub struct EntityListener {
    core: Arc<Mutex<Core>>,
    _change_subscription: SubscriptionGuard,
    _reset_subscription: InvalidationGuard,
}

impl EntityListener {
    /// Start watching the record the snapshot was derived from, with
    /// synchronous (inline) callback delivery.
    pub fn new(store: Arc<dyn LocalStore>, snapshot: Snapshot) -> Self {
        Self::with_scheduler(store, snapshot, Arc::new(InlineScheduler::new()))
    }

    /// Start watching with callbacks redelivered through a scheduler.
    pub fn with_scheduler(
        store: Arc<dyn LocalStore>,
        snapshot: Snapshot,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let core = Arc::new(Mutex::new(Core {
            entity_id: snapshot.entity_id().clone(),
            snapshot,
            observer: None,
            inert: false,
            alive: true,
        }));

        let change_core = Arc::clone(&core);
        let change_store = Arc::clone(&store);
        let change_scheduler = Arc::clone(&scheduler);
        let change_subscription = store.subscribe(Box::new(move |event| {
            let event = event.clone();
            let core = Arc::clone(&change_core);
            let store = Arc::clone(&change_store);
            change_scheduler.schedule(Box::new(move || {
                handle_store_event(&core, store.as_ref(), &event);
            }));
        }));

        let reset_core = Arc::clone(&core);
        let reset_store = Arc::clone(&store);
        let reset_subscription = store.invalidation().subscribe(Box::new(move || {
            let core = Arc::clone(&reset_core);
            let store = Arc::clone(&reset_store);
            scheduler.schedule(Box::new(move || {
                handle_reset(&core, store.as_ref());
            }));
        }));

        Self {
            core,
            _change_subscription: change_subscription,
            _reset_subscription: reset_subscription,
        }
    }

    /// Register the observer, replacing any previous one.
    pub fn set_observer(&self, observer: Box<dyn EntityObserver>) {
        self.lock_core().observer = Some(observer);
    }

    /// The most recent snapshot of the watched record.
    pub fn read_only_entity(&self) -> Snapshot {
        self.lock_core().snapshot.clone()
    }

    /// Whether the watched record has been deleted (listener is inert).
    pub fn is_inert(&self) -> bool {
        self.lock_core().inert
    }

    fn lock_core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().expect("entity listener lock poisoned")
    }
}

impl Drop for EntityListener {
    fn drop(&mut self) {
        if let Ok(mut core) = self.core.lock() {
            core.alive = false;
            core.observer = None;
        }
    }
}

fn handle_store_event(core: &Arc<Mutex<Core>>, store: &dyn LocalStore, event: &ChangeEvent) {
    let mut guard = core.lock().expect("entity listener lock poisoned");
    if !guard.alive || guard.inert {
        return;
    }

    // Deletion wins; upsert and delete are disjoint within one event.
    if event.deleted.contains(&guard.entity_id) {
        guard.inert = true;
        notify(core, guard, |observer, _| observer.on_delete());
        return;
    }

    if event.contains_upserted(&guard.entity_id) {
        let Some(record) = store.get(&guard.entity_id) else {
            // Raced a later commit that removed the record; its own event
            // will report the deletion.
            return;
        };
        guard.snapshot = record.to_read_only();
        notify(core, guard, |observer, snapshot| observer.on_upsert(snapshot));
    }
}

fn handle_reset(core: &Arc<Mutex<Core>>, store: &dyn LocalStore) {
    let mut guard = core.lock().expect("entity listener lock poisoned");
    if !guard.alive || guard.inert {
        return;
    }

    // Gone unless it reappears in the wiped (or re-seeded) store.
    match store.get(&guard.entity_id) {
        Some(record) => {
            guard.snapshot = record.to_read_only();
            notify(core, guard, |observer, snapshot| observer.on_upsert(snapshot));
        }
        None => {
            guard.inert = true;
            notify(core, guard, |observer, _| observer.on_delete());
        }
    }
}

/// Invoke the observer outside the lock, then put it back.
fn notify(
    core: &Arc<Mutex<Core>>,
    mut guard: MutexGuard<'_, Core>,
    call: impl FnOnce(&mut dyn EntityObserver, &Snapshot),
) {
    let Some(mut observer) = guard.observer.take() else {
        return;
    };
    let snapshot = guard.snapshot.clone();
    drop(guard);

    call(observer.as_mut(), &snapshot);

    let mut guard = core.lock().expect("entity listener lock poisoned");
    if guard.alive && guard.observer.is_none() {
        guard.observer = Some(observer);
    }
}
