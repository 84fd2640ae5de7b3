//! Mutable record types owned by the store.

use crate::{CollectionName, RecordId, Timestamp, Version};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of a persisted record: entity type plus opaque key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityId {
    /// Collection (entity type) the record belongs to
    pub collection: CollectionName,
    /// Opaque key, unique within the collection
    pub id: RecordId,
}

impl EntityId {
    /// Create a new entity identity.
    pub fn new(collection: impl Into<CollectionName>, id: impl Into<RecordId>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Origin of a record's last write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Created or modified by a local user action
    Local,
    /// Received from remote/server synchronization
    Remote,
}

/// Metadata associated with a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// When the record was first created (milliseconds since epoch)
    pub created_at: Timestamp,
    /// When the record was last updated (milliseconds since epoch)
    pub updated_at: Timestamp,
    /// Whether the last write originated locally or from remote
    pub origin: Origin,
}

impl Metadata {
    /// Create new metadata for a freshly written record.
    pub fn new(timestamp: Timestamp, origin: Origin) -> Self {
        Self {
            created_at: timestamp,
            updated_at: timestamp,
            origin,
        }
    }

    /// Update metadata for a modification.
    pub fn touch(&mut self, timestamp: Timestamp, origin: Origin) {
        self.updated_at = timestamp;
        self.origin = origin;
    }
}

/// A mutable data record, owned exclusively by the store.
///
/// Sync code mutates records in place through the store's write surface;
/// read-model consumers only ever see the immutable snapshots produced by
/// [`ReadOnlyConvertible`](crate::ReadOnlyConvertible).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Stable identity (collection + key)
    pub entity_id: EntityId,
    /// Version number, incremented on each field write
    pub version: Version,
    /// The actual data fields (JSON object)
    pub payload: serde_json::Value,
    /// Record metadata
    pub metadata: Metadata,
}

impl Record {
    /// Create a new record.
    pub fn new(
        collection: impl Into<CollectionName>,
        id: impl Into<RecordId>,
        payload: serde_json::Value,
        timestamp: Timestamp,
        origin: Origin,
    ) -> Self {
        Self {
            entity_id: EntityId::new(collection, id),
            version: 1,
            payload,
            metadata: Metadata::new(timestamp, origin),
        }
    }

    /// Read a single field from the payload.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.payload.as_object().and_then(|obj| obj.get(name))
    }

    /// Replace the payload, bumping version and metadata.
    pub fn update_payload(
        &mut self,
        payload: serde_json::Value,
        timestamp: Timestamp,
        origin: Origin,
    ) {
        self.payload = payload;
        self.version += 1;
        self.metadata.touch(timestamp, origin);
    }
}
