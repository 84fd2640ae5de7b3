//! # Vantage Engine
//!
//! A reactive read-model engine for locally persisted data.
//!
//! This crate keeps live, predicate/sort-filtered views over an observable
//! record store. Consumers never touch mutable records directly: every read
//! goes through an immutable [`Snapshot`], and every change to the store is
//! reported back as a minimal, structured diff (section/row granularity)
//! rather than a full reload.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine has no knowledge of files, network, or platform
//! - **Deterministic**: the same store contents always produce the same
//!   ordering and the same diffs
//! - **Serialized**: diff correctness depends on change events being
//!   delivered in commit order, which the store guarantees
//! - **Immutable reads**: a snapshot handed to a consumer never changes,
//!   even while the backing record is being rewritten by sync code
//!
//! ## Core Concepts
//!
//! ### Records and Snapshots
//!
//! Data lives in [`Record`]s: schema-validated JSON payloads with a stable
//! identity ([`EntityId`]: collection + opaque key), a version counter, and
//! metadata. Records are owned by the store; the only field access path is
//! the conversion contract [`ReadOnlyConvertible`], which produces immutable
//! [`Snapshot`] values and writes edited snapshots back.
//!
//! ### Live Queries
//!
//! A [`ResultsController`] owns a [`QuerySpec`] (predicate, sort order,
//! optional row limit, optional section key) and keeps its result set in
//! sync with the store. On every committed change it recomputes the affected
//! slice and emits a minimal diff through a typed [`ResultsListener`].
//!
//! ### Single-Entity Listeners
//!
//! An [`EntityListener`] watches exactly one identity and reports upserts
//! and deletion of that record, nothing else.
//!
//! ### Invalidation
//!
//! The [`InvalidationBus`] is an injectable, process-wide reset channel:
//! when the store is wiped (logout, account switch), every live query
//! re-fetches and notifies its consumer instead of silently going stale.
//! The bus also carries an epoch counter so that asynchronous completions
//! started before a reset can be discarded.
//!
//! ## Quick Start
//!
//! ```rust
//! use serde_json::json;
//! use vantage_engine::{
//!     CollectionSchema, FieldDef, FieldType, MemoryStore, QuerySpec,
//!     ResultsController, Schema, SortDescriptor,
//! };
//!
//! // 1. Define a schema
//! let schema = Schema::new().with_collection(CollectionSchema::new(
//!     "orders",
//!     vec![
//!         FieldDef::required("number", FieldType::Int),
//!         FieldDef::optional("status", FieldType::String),
//!     ],
//! ));
//!
//! // 2. Create a store and write a record
//! let store = MemoryStore::new_shared(schema);
//! store
//!     .upsert("orders", "order-1", json!({"number": 42, "status": "open"}), 1000)
//!     .unwrap();
//!
//! // 3. Observe it through a live query
//! let spec = QuerySpec::new("orders").sorted_by(vec![SortDescriptor::ascending("number")]);
//! let controller = ResultsController::new(store.clone(), spec);
//! controller.perform_fetch().unwrap();
//!
//! assert_eq!(controller.number_of_objects(), 1);
//! let snapshot = controller.fetched_objects()[0].clone();
//! assert_eq!(snapshot.field("number"), Some(&json!(42)));
//! ```
//!
//! ## Scheduling
//!
//! Controllers and listeners are driven by store-change callbacks that fire
//! on the committing thread. The [`Scheduler`] seam makes the single-writer
//! constraint explicit: inject a queueing scheduler to redeliver callbacks
//! onto a dedicated main context, or keep the default [`InlineScheduler`]
//! for synchronous, deterministic delivery (the right choice in tests).

pub mod controller;
pub mod entity_listener;
pub mod error;
pub mod event;
pub mod invalidation;
pub mod query;
pub mod record;
pub mod scheduler;
pub mod schema;
pub mod section;
pub mod snapshot;
pub mod store;

// Re-export main types at crate root
pub use controller::{ChangeKind, ResultsController, ResultsListener, SectionChangeKind};
pub use entity_listener::{EntityListener, EntityObserver};
pub use error::Error;
pub use event::ChangeEvent;
pub use invalidation::{InvalidationBus, InvalidationGuard, ResetCallback};
pub use query::{Comparison, Predicate, QuerySpec, SortDescriptor};
pub use record::{EntityId, Metadata, Origin, Record};
pub use scheduler::{InlineScheduler, Job, Scheduler};
pub use schema::{CollectionSchema, FieldDef, FieldType, Schema};
pub use section::{IndexPath, Section};
pub use snapshot::{ReadOnlyConvertible, Snapshot};
pub use store::{ChangeCallback, LocalStore, MemoryStore, SubscriptionGuard};

/// Type aliases for clarity
pub type RecordId = String;
pub type CollectionName = String;
pub type Timestamp = u64;
pub type Version = u64;
