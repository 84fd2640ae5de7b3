//! Change events describing one committed store mutation.

use crate::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The disjoint identity sets produced by one change-notification cycle.
///
/// `inserted`, `updated`, `refreshed` and `deleted` never overlap within
/// one event. "Upserted" is the union of the first three. BTreeSet keeps
/// iteration deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// Records that did not exist before this commit
    pub inserted: BTreeSet<EntityId>,
    /// Records whose observable fields changed
    pub updated: BTreeSet<EntityId>,
    /// Records rewritten without any observable field change
    pub refreshed: BTreeSet<EntityId>,
    /// Records removed by this commit
    pub deleted: BTreeSet<EntityId>,
}

impl ChangeEvent {
    /// An event carrying no identities.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the event carries any identity at all.
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty()
            && self.updated.is_empty()
            && self.refreshed.is_empty()
            && self.deleted.is_empty()
    }

    /// Inserted ∪ updated ∪ refreshed.
    pub fn upserted(&self) -> impl Iterator<Item = &EntityId> {
        self.inserted
            .iter()
            .chain(self.updated.iter())
            .chain(self.refreshed.iter())
    }

    /// Whether the upserted union contains an identity.
    pub fn contains_upserted(&self, entity_id: &EntityId) -> bool {
        self.inserted.contains(entity_id)
            || self.updated.contains(entity_id)
            || self.refreshed.contains(entity_id)
    }

    /// Whether any identity in the event belongs to a collection.
    pub fn touches_collection(&self, collection: &str) -> bool {
        self.upserted()
            .chain(self.deleted.iter())
            .any(|id| id.collection == collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(key: &str) -> EntityId {
        EntityId::new("orders", key)
    }

    #[test]
    fn empty_event() {
        let event = ChangeEvent::new();
        assert!(event.is_empty());
        assert_eq!(event.upserted().count(), 0);
    }

    #[test]
    fn upserted_is_the_union() {
        let mut event = ChangeEvent::new();
        event.inserted.insert(id("a"));
        event.updated.insert(id("b"));
        event.refreshed.insert(id("c"));
        event.deleted.insert(id("d"));

        let upserted: Vec<_> = event.upserted().cloned().collect();
        assert_eq!(upserted, vec![id("a"), id("b"), id("c")]);

        assert!(event.contains_upserted(&id("b")));
        assert!(!event.contains_upserted(&id("d")));
    }

    #[test]
    fn touches_collection() {
        let mut event = ChangeEvent::new();
        event.deleted.insert(EntityId::new("notes", "n-1"));

        assert!(event.touches_collection("notes"));
        assert!(!event.touches_collection("orders"));
    }

    #[test]
    fn serialization_roundtrip() {
        let mut event = ChangeEvent::new();
        event.inserted.insert(id("a"));
        event.deleted.insert(id("b"));

        let json = serde_json::to_string(&event).unwrap();
        let parsed: ChangeEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(event, parsed);
    }
}
