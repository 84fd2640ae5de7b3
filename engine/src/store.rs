//! The persistence-engine boundary and its in-memory implementation.
//!
//! Read-model components only ever see the [`LocalStore`] trait: an
//! ordered, predicate-queryable source of records plus a change-event
//! subscription and a reset channel. [`MemoryStore`] is the reference
//! implementation; its write surface is what synchronization code (page
//! merges, user edits) talks to.
//!
//! Writes are serialized and change events are delivered in commit order:
//! the delivery lock is acquired before the data lock is released, so two
//! concurrent committers cannot publish their events out of order.
//! Subscriber callbacks may re-enter the store for reads.

use crate::error::Result;
use crate::{
    ChangeEvent, CollectionName, EntityId, Error, InvalidationBus, Origin, QuerySpec,
    ReadOnlyConvertible, Record, RecordId, Schema, Snapshot, Timestamp,
};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Callback invoked once per committed change batch.
pub type ChangeCallback = Box<dyn Fn(&ChangeEvent) + Send + Sync>;

/// The store boundary consumed by the read-model layer.
pub trait LocalStore: Send + Sync {
    /// The schema writes and queries are validated against.
    fn schema(&self) -> &Schema;

    /// Execute a query spec, returning matching records in spec order.
    fn query(&self, spec: &QuerySpec) -> Result<Vec<Record>>;

    /// Fetch a single record by identity.
    fn get(&self, entity_id: &EntityId) -> Option<Record>;

    /// Register a change-event callback. The subscription lives until the
    /// returned guard is dropped.
    fn subscribe(&self, callback: ChangeCallback) -> SubscriptionGuard;

    /// The reset channel associated with this store.
    fn invalidation(&self) -> Arc<InvalidationBus>;
}

/// Change subscription handle; dropping it unsubscribes.
pub struct SubscriptionGuard {
    cleanup: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionGuard {
    /// Build a guard from an unsubscribe action. Store implementations
    /// call this; consumers just hold the guard.
    pub fn new(cleanup: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cleanup: Some(Box::new(cleanup)),
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

type Collections = HashMap<CollectionName, HashMap<RecordId, Record>>;

/// In-memory, schema-validated record store with change notification.
pub struct MemoryStore {
    schema: Schema,
    data: Mutex<Collections>,
    subscribers: Arc<DashMap<Uuid, ChangeCallback>>,
    /// Serializes event delivery in commit order.
    delivery: Mutex<()>,
    invalidation: Arc<InvalidationBus>,
}

impl MemoryStore {
    /// Create a store with its own invalidation bus.
    pub fn new(schema: Schema) -> Self {
        Self::with_invalidation(schema, InvalidationBus::new_shared())
    }

    /// Create a store on an existing (shared) invalidation bus.
    pub fn with_invalidation(schema: Schema, invalidation: Arc<InvalidationBus>) -> Self {
        Self {
            schema,
            data: Mutex::new(Collections::new()),
            subscribers: Arc::new(DashMap::new()),
            delivery: Mutex::new(()),
            invalidation,
        }
    }

    /// Create a store wrapped in `Arc` for sharing.
    pub fn new_shared(schema: Schema) -> Arc<Self> {
        Arc::new(Self::new(schema))
    }

    /// Insert or update a single record with a locally originated write.
    pub fn upsert(
        &self,
        collection: &str,
        id: impl Into<RecordId>,
        payload: serde_json::Value,
        timestamp: Timestamp,
    ) -> Result<ChangeEvent> {
        self.upsert_batch(collection, vec![(id.into(), payload)], timestamp, Origin::Local)
    }

    /// Insert or update a batch of records in one commit.
    ///
    /// The whole batch is validated before anything is written, and all
    /// resulting changes are published as a single [`ChangeEvent`]: a
    /// page merge of hundreds of records produces exactly one
    /// notification cycle.
    pub fn upsert_batch(
        &self,
        collection: &str,
        rows: Vec<(RecordId, serde_json::Value)>,
        timestamp: Timestamp,
        origin: Origin,
    ) -> Result<ChangeEvent> {
        for (_, payload) in &rows {
            self.schema.validate_write(collection, payload)?;
        }

        let mut data = self.lock_data();
        let records = data.entry(collection.to_string()).or_default();

        let mut event = ChangeEvent::new();
        for (id, payload) in rows {
            let entity_id = EntityId::new(collection, id.clone());

            match records.get_mut(&id) {
                Some(existing) if existing.payload == payload => {
                    // No observable field changed; the record is only
                    // re-materialized.
                    if !event.inserted.contains(&entity_id) && !event.updated.contains(&entity_id)
                    {
                        event.refreshed.insert(entity_id);
                    }
                }
                Some(existing) => {
                    existing.update_payload(payload, timestamp, origin);
                    if !event.inserted.contains(&entity_id) {
                        event.refreshed.remove(&entity_id);
                        event.updated.insert(entity_id);
                    }
                }
                None => {
                    records.insert(
                        id.clone(),
                        Record::new(collection, id, payload, timestamp, origin),
                    );
                    event.inserted.insert(entity_id);
                }
            }
        }

        Ok(self.commit(data, event))
    }

    /// Write an edited snapshot back into its record.
    ///
    /// This is the user-edit path of the conversion contract: derive a
    /// snapshot, edit fields, write it back before a remote save.
    pub fn update_from_snapshot(
        &self,
        snapshot: &Snapshot,
        timestamp: Timestamp,
    ) -> Result<ChangeEvent> {
        let entity_id = snapshot.entity_id().clone();
        let payload = snapshot.fields_as_payload();
        self.schema.validate_write(&entity_id.collection, &payload)?;

        let mut data = self.lock_data();
        let record = data
            .get_mut(&entity_id.collection)
            .and_then(|records| records.get_mut(&entity_id.id))
            .ok_or_else(|| Error::RecordNotFound(entity_id.id.clone()))?;

        let mut event = ChangeEvent::new();
        if record.to_read_only() == *snapshot {
            event.refreshed.insert(entity_id);
        } else {
            record.apply_snapshot(snapshot, timestamp, Origin::Local);
            event.updated.insert(entity_id);
        }

        Ok(self.commit(data, event))
    }

    /// Delete a single record.
    pub fn delete(&self, entity_id: &EntityId) -> Result<ChangeEvent> {
        let mut data = self.lock_data();
        let removed = data
            .get_mut(&entity_id.collection)
            .and_then(|records| records.remove(&entity_id.id));

        if removed.is_none() {
            return Err(Error::RecordNotFound(entity_id.id.clone()));
        }

        let mut event = ChangeEvent::new();
        event.deleted.insert(entity_id.clone());
        Ok(self.commit(data, event))
    }

    /// Delete a batch of records in one commit. Missing identities are
    /// skipped.
    pub fn delete_batch(&self, entity_ids: &[EntityId]) -> ChangeEvent {
        let mut data = self.lock_data();

        let mut event = ChangeEvent::new();
        for entity_id in entity_ids {
            let removed = data
                .get_mut(&entity_id.collection)
                .and_then(|records| records.remove(&entity_id.id));
            if removed.is_some() {
                event.deleted.insert(entity_id.clone());
            }
        }

        self.commit(data, event)
    }

    /// Wipe every collection and signal the invalidation bus.
    ///
    /// No change event is emitted: subscribers of the bus re-fetch from
    /// scratch instead of diffing against wiped state.
    pub fn reset(&self) {
        {
            let mut data = self.lock_data();
            data.clear();
        }
        tracing::debug!("store reset");
        self.invalidation.post();
    }

    /// Total record count across all collections.
    pub fn record_count(&self) -> usize {
        self.lock_data().values().map(|records| records.len()).sum()
    }

    fn lock_data(&self) -> MutexGuard<'_, Collections> {
        self.data.lock().expect("store data lock poisoned")
    }

    /// Publish a committed change batch.
    ///
    /// The delivery lock is acquired while the data lock is still held, so
    /// delivery order always matches commit order; the data lock is then
    /// released before callbacks run, letting subscribers re-enter the
    /// store for reads.
    fn commit(&self, data: MutexGuard<'_, Collections>, event: ChangeEvent) -> ChangeEvent {
        if event.is_empty() {
            return event;
        }

        tracing::debug!(
            inserted = event.inserted.len(),
            updated = event.updated.len(),
            refreshed = event.refreshed.len(),
            deleted = event.deleted.len(),
            "committed change batch"
        );

        let delivery = self.delivery.lock().expect("store delivery lock poisoned");
        drop(data);

        for entry in self.subscribers.iter() {
            (entry.value())(&event);
        }
        drop(delivery);

        event
    }
}

impl LocalStore for MemoryStore {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn query(&self, spec: &QuerySpec) -> Result<Vec<Record>> {
        self.schema.validate_query(spec)?;

        let data = self.lock_data();
        let mut results: Vec<Record> = data
            .get(&spec.collection)
            .map(|records| {
                records
                    .values()
                    .filter(|record| {
                        spec.predicate
                            .as_ref()
                            .map(|p| p.matches(record))
                            .unwrap_or(true)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(data);

        results.sort_by(|a, b| spec.compare(a, b));
        if let Some(limit) = spec.limit {
            results.truncate(limit);
        }

        Ok(results)
    }

    fn get(&self, entity_id: &EntityId) -> Option<Record> {
        self.lock_data()
            .get(&entity_id.collection)
            .and_then(|records| records.get(&entity_id.id))
            .cloned()
    }

    fn subscribe(&self, callback: ChangeCallback) -> SubscriptionGuard {
        let token = Uuid::new_v4();
        self.subscribers.insert(token, callback);
        tracing::debug!(token = %token, "store subscriber registered");

        let subscribers = Arc::clone(&self.subscribers);
        SubscriptionGuard::new(move || {
            subscribers.remove(&token);
        })
    }

    fn invalidation(&self) -> Arc<InvalidationBus> {
        Arc::clone(&self.invalidation)
    }
}
