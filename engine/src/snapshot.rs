//! Read-only snapshots and the conversion contract.
//!
//! A snapshot is the only representation of a record that leaves the store.
//! It is an immutable value: once returned to a consumer it never changes,
//! even while sync code keeps rewriting the backing record. "Updating" a
//! snapshot means producing a new one and replacing the old value in the
//! caller's collection.

use crate::{EntityId, Record, Timestamp, Version};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The snapshot conversion contract implemented by every persisted type.
///
/// These two operations are the only permitted access path to record
/// fields: `to_read_only` derives an immutable snapshot, `update_from`
/// writes a (possibly edited) snapshot's fields back into the mutable
/// record before a remote save.
pub trait ReadOnlyConvertible {
    /// The immutable, consumer-facing representation.
    type ReadOnly: Clone + PartialEq;

    /// Derive a snapshot from the record's current field values.
    ///
    /// Must be a pure function of those values: no hidden state, no
    /// time-dependence, so equality and diffing behave deterministically.
    fn to_read_only(&self) -> Self::ReadOnly;

    /// Overwrite the record's fields to match the snapshot.
    ///
    /// Record metadata (timestamps, origin) is maintained by the store's
    /// write path, not by this operation.
    fn update_from(&mut self, read_only: &Self::ReadOnly);
}

/// An immutable, point-in-time view of a record.
///
/// Two snapshots are equal iff their identity and all observable fields
/// are equal; the version counter is carried for bookkeeping but does not
/// participate in equality.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    entity_id: EntityId,
    version: Version,
    /// BTreeMap for deterministic field order in serialized form
    fields: BTreeMap<String, serde_json::Value>,
}

impl Snapshot {
    /// Build a snapshot directly. Mostly useful for store implementations
    /// and tests; consumers normally obtain snapshots via conversion.
    pub fn new(
        entity_id: EntityId,
        version: Version,
        fields: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            entity_id,
            version,
            fields,
        }
    }

    /// The identity of the record this snapshot was derived from.
    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    /// Version of the record at conversion time.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Read a single field.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }

    /// All fields in deterministic (name) order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Produce an edited copy with one field replaced.
    ///
    /// This is how user edits are expressed: derive, edit, then hand the
    /// result to the store's `update_from_snapshot`.
    pub fn with_field(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub(crate) fn fields_as_payload(&self) -> serde_json::Value {
        serde_json::Value::Object(self.fields.clone().into_iter().collect())
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.entity_id == other.entity_id && self.fields == other.fields
    }
}

impl ReadOnlyConvertible for Record {
    type ReadOnly = Snapshot;

    fn to_read_only(&self) -> Snapshot {
        let fields = self
            .payload
            .as_object()
            .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        Snapshot {
            entity_id: self.entity_id.clone(),
            version: self.version,
            fields,
        }
    }

    fn update_from(&mut self, read_only: &Snapshot) {
        self.payload = read_only.fields_as_payload();
        self.version += 1;
    }
}

impl Record {
    /// Apply an edited snapshot, bumping version and touching metadata.
    ///
    /// Store-internal variant of [`ReadOnlyConvertible::update_from`] that
    /// also maintains the metadata the trait deliberately leaves alone.
    pub(crate) fn apply_snapshot(
        &mut self,
        snapshot: &Snapshot,
        timestamp: Timestamp,
        origin: crate::Origin,
    ) {
        self.update_from(snapshot);
        self.metadata.touch(timestamp, origin);
    }
}
