//! Live queries over the store.
//!
//! A [`ResultsController`] owns a [`QuerySpec`] and keeps a materialized,
//! section-grouped result set in sync with the store. Every committed
//! change recomputes the affected slice and reports a minimal diff to the
//! registered [`ResultsListener`]: a record whose edit does not affect its
//! position is reported as a single update, reorderings become moves, and
//! only genuinely new/removed rows become inserts/deletes.
//!
//! Controller state is recomputed before callbacks fire, so accessors
//! already reflect the post-change truth inside `will_change_content`.

use crate::error::Result;
use crate::{
    ChangeEvent, EntityId, IndexPath, InlineScheduler, InvalidationGuard, LocalStore, Predicate,
    QuerySpec, ReadOnlyConvertible, Record, Scheduler, Section, Snapshot, SortDescriptor,
    SubscriptionGuard,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// Row-level change kinds reported to the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Delete,
    Move,
    Update,
}

/// Section-level change kinds reported to the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionChangeKind {
    Insert,
    Delete,
}

/// Typed observer interface for live-query consumers.
///
/// All methods are defaulted; implement only what you need. For one change
/// event the delivery order is: `will_change_content`, section changes,
/// row changes, `did_change_content`. A store reset delivers only
/// `did_reset_content`, after the controller has already re-fetched.
pub trait ResultsListener: Send {
    fn will_change_content(&mut self) {}

    fn did_change_object(
        &mut self,
        snapshot: &Snapshot,
        old_path: Option<IndexPath>,
        change: ChangeKind,
        new_path: Option<IndexPath>,
    ) {
        let _ = (snapshot, old_path, change, new_path);
    }

    fn did_change_section(&mut self, name: &str, index: usize, change: SectionChangeKind) {
        let _ = (name, index, change);
    }

    fn did_change_content(&mut self) {}

    fn did_reset_content(&mut self) {}
}

struct Core {
    spec: QuerySpec,
    sections: Vec<Section>,
    listener: Option<Box<dyn ResultsListener>>,
    has_fetched: bool,
    alive: bool,
}

/// A live, predicate/sort-filtered view over one collection.
pub struct ResultsController {
    core: Arc<Mutex<Core>>,
    store: Arc<dyn LocalStore>,
    _change_subscription: SubscriptionGuard,
    _reset_subscription: InvalidationGuard,
}

impl ResultsController {
    /// Create a controller with synchronous (inline) callback delivery.
    pub fn new(store: Arc<dyn LocalStore>, spec: QuerySpec) -> Self {
        Self::with_scheduler(store, spec, Arc::new(InlineScheduler::new()))
    }

    /// Create a controller that redelivers store callbacks through the
    /// given scheduler before touching state or invoking the listener.
    pub fn with_scheduler(
        store: Arc<dyn LocalStore>,
        spec: QuerySpec,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let core = Arc::new(Mutex::new(Core {
            spec,
            sections: Vec::new(),
            listener: None,
            has_fetched: false,
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
            store,
            _change_subscription: change_subscription,
            _reset_subscription: reset_subscription,
        }
    }

    /// Execute the query spec for the first time (or after mutating it).
    ///
    /// Fails only on a malformed spec: unknown collection, unknown or
    /// unsortable field. That is a programmer error, not a runtime
    /// condition to retry. No listener callbacks fire for the initial
    /// materialization.
    pub fn perform_fetch(&self) -> Result<()> {
        let mut core = self.lock_core();
        self.store.schema().validate_query(&core.spec)?;

        let records = self.store.query(&core.spec)?;
        core.sections = materialize(&core.spec, &records);
        core.has_fetched = true;

        tracing::debug!(
            collection = %core.spec.collection,
            rows = records.len(),
            sections = core.sections.len(),
            "performed fetch"
        );
        Ok(())
    }

    /// Register the consumer-facing listener, replacing any previous one.
    pub fn set_listener(&self, listener: Box<dyn ResultsListener>) {
        self.lock_core().listener = Some(listener);
    }

    /// Detach the listener; the controller keeps tracking silently.
    pub fn clear_listener(&self) {
        self.lock_core().listener = None;
    }

    /// All materialized snapshots, flattened across sections.
    pub fn fetched_objects(&self) -> Vec<Snapshot> {
        self.lock_core()
            .sections
            .iter()
            .flat_map(|s| s.objects().iter().cloned())
            .collect()
    }

    /// The materialized sections.
    pub fn sections(&self) -> Vec<Section> {
        self.lock_core().sections.clone()
    }

    /// Total number of materialized rows.
    pub fn number_of_objects(&self) -> usize {
        self.lock_core()
            .sections
            .iter()
            .map(|s| s.number_of_objects())
            .sum()
    }

    /// Whether the result set has no rows.
    pub fn is_empty(&self) -> bool {
        self.number_of_objects() == 0
    }

    /// Unchecked row access.
    ///
    /// # Panics
    ///
    /// Panics when `path` is outside the current section/row bounds. Use
    /// [`safe_object_at`](Self::safe_object_at) when indexes may lag an
    /// asynchronous UI.
    pub fn object_at(&self, path: IndexPath) -> Snapshot {
        let core = self.lock_core();
        core.sections[path.section].objects()[path.row].clone()
    }

    /// Bounds-checked row access.
    pub fn safe_object_at(&self, path: IndexPath) -> Option<Snapshot> {
        let core = self.lock_core();
        core.sections
            .get(path.section)
            .and_then(|section| section.objects().get(path.row))
            .cloned()
    }

    /// Flatten a (section, row) coordinate into a linear index across all
    /// sections, as used by infinite-scroll offset math.
    pub fn object_index(&self, path: IndexPath) -> usize {
        let core = self.lock_core();
        let preceding: usize = core
            .sections
            .iter()
            .take(path.section)
            .map(|s| s.number_of_objects())
            .sum();
        preceding + path.row
    }

    /// Replace the predicate and synchronously re-run the query.
    pub fn set_predicate(&self, predicate: Option<Predicate>) -> Result<()> {
        self.mutate_spec(|spec| spec.predicate = predicate)
    }

    /// Replace the sort descriptors and synchronously re-run the query.
    pub fn set_sort(&self, sort: Vec<SortDescriptor>) -> Result<()> {
        self.mutate_spec(|spec| spec.sort = sort)
    }

    /// Replace the row limit and synchronously re-run the query.
    pub fn set_limit(&self, limit: Option<usize>) -> Result<()> {
        self.mutate_spec(|spec| spec.limit = limit)
    }

    /// Apply a spec edit; re-query before returning so no stale read is
    /// observable afterwards. On validation failure the previous state is
    /// left untouched.
    fn mutate_spec(&self, edit: impl FnOnce(&mut QuerySpec)) -> Result<()> {
        let mut core = self.lock_core();

        let mut candidate = core.spec.clone();
        edit(&mut candidate);

        if !core.has_fetched {
            // Nothing materialized yet; validation happens at fetch time.
            core.spec = candidate;
            return Ok(());
        }

        self.store.schema().validate_query(&candidate)?;
        let records = self.store.query(&candidate)?;
        core.sections = materialize(&candidate, &records);
        core.spec = candidate;
        Ok(())
    }

    fn lock_core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().expect("results controller lock poisoned")
    }
}

impl Drop for ResultsController {
    fn drop(&mut self) {
        // Guards unregister the subscriptions; marking the core dead also
        // silences jobs a queueing scheduler may already hold. Never panic
        // here: drop may run while unwinding from a poisoned lock.
        if let Ok(mut core) = self.core.lock() {
            core.alive = false;
            core.listener = None;
        }
    }
}

fn handle_store_event(core: &Arc<Mutex<Core>>, store: &dyn LocalStore, event: &ChangeEvent) {
    let mut guard = core.lock().expect("results controller lock poisoned");
    if !guard.alive || !guard.has_fetched {
        return;
    }
    if !event.touches_collection(&guard.spec.collection) {
        return;
    }

    let records = match store.query(&guard.spec) {
        Ok(records) => records,
        Err(error) => {
            tracing::warn!(error = %error, "live query recompute failed");
            return;
        }
    };
    let new_sections = materialize(&guard.spec, &records);
    let diff = compute_diff(&guard.sections, &new_sections, event);
    guard.sections = new_sections;

    if diff.is_empty() {
        return;
    }

    tracing::debug!(
        collection = %guard.spec.collection,
        rows = diff.rows.len(),
        sections = diff.sections.len(),
        "emitting diff"
    );

    let listener = guard.listener.take();
    drop(guard);

    if let Some(mut listener) = listener {
        emit_diff(listener.as_mut(), &diff);
        restore_listener(core, listener);
    }
}

fn handle_reset(core: &Arc<Mutex<Core>>, store: &dyn LocalStore) {
    let mut guard = core.lock().expect("results controller lock poisoned");
    if !guard.alive {
        return;
    }

    // Re-fetch first so accessors reflect post-reset truth inside the
    // callback.
    let records = match store.query(&guard.spec) {
        Ok(records) => records,
        Err(error) => {
            tracing::warn!(error = %error, "post-reset refetch failed");
            Vec::new()
        }
    };
    guard.sections = materialize(&guard.spec, &records);

    if !guard.has_fetched {
        return;
    }

    let listener = guard.listener.take();
    drop(guard);

    if let Some(mut listener) = listener {
        listener.did_reset_content();
        restore_listener(core, listener);
    }
}

fn restore_listener(core: &Arc<Mutex<Core>>, listener: Box<dyn ResultsListener>) {
    let mut guard = core.lock().expect("results controller lock poisoned");
    // A listener registered from inside a callback wins over the one we
    // took out for delivery.
    if guard.alive && guard.listener.is_none() {
        guard.listener = Some(listener);
    }
}

fn section_name(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Group sorted records into sections.
///
/// Without a section key the result is always exactly one unnamed section
/// (even when empty). With a key, sections appear in the order their key
/// value first appears in the sorted record list.
fn materialize(spec: &QuerySpec, records: &[Record]) -> Vec<Section> {
    match &spec.section_key {
        None => vec![Section::new(
            String::new(),
            records.iter().map(|r| r.to_read_only()).collect(),
        )],
        Some(key) => {
            let mut order: Vec<String> = Vec::new();
            let mut groups: HashMap<String, Vec<Snapshot>> = HashMap::new();

            for record in records {
                let name = section_name(record.field(key));
                if !groups.contains_key(&name) {
                    order.push(name.clone());
                }
                groups.entry(name).or_default().push(record.to_read_only());
            }

            order
                .into_iter()
                .map(|name| {
                    let objects = groups.remove(&name).unwrap_or_default();
                    Section::new(name, objects)
                })
                .collect()
        }
    }
}

struct RowChange {
    snapshot: Snapshot,
    old_path: Option<IndexPath>,
    new_path: Option<IndexPath>,
    kind: ChangeKind,
}

struct SectionChange {
    name: String,
    index: usize,
    kind: SectionChangeKind,
}

struct Diff {
    sections: Vec<SectionChange>,
    rows: Vec<RowChange>,
}

impl Diff {
    fn is_empty(&self) -> bool {
        self.sections.is_empty() && self.rows.is_empty()
    }
}

fn flatten(sections: &[Section]) -> Vec<(EntityId, IndexPath, &Snapshot)> {
    let mut entries = Vec::new();
    for (section_index, section) in sections.iter().enumerate() {
        for (row, snapshot) in section.objects().iter().enumerate() {
            entries.push((
                snapshot.entity_id().clone(),
                IndexPath::new(section_index, row),
                snapshot,
            ));
        }
    }
    entries
}

/// Indexes of one longest increasing subsequence of `seq`.
///
/// Rows on this subsequence kept their relative order and are not reported
/// as moves; everything else did jump past a neighbor.
fn lis_indices(seq: &[usize]) -> HashSet<usize> {
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; seq.len()];

    for i in 0..seq.len() {
        let pos = tails.partition_point(|&t| seq[t] < seq[i]);
        if pos > 0 {
            prev[i] = Some(tails[pos - 1]);
        }
        if pos == tails.len() {
            tails.push(i);
        } else {
            tails[pos] = i;
        }
    }

    let mut on_lis = HashSet::new();
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        on_lis.insert(i);
        cursor = prev[i];
    }
    on_lis
}

/// Compute the minimal section/row diff between two materialized states.
///
/// Emission order: section deletes (descending), section inserts
/// (ascending), row deletes (descending old path), row inserts (ascending
/// new path), moves, then updates.
fn compute_diff(old: &[Section], new: &[Section], event: &ChangeEvent) -> Diff {
    let mut sections = Vec::new();

    let old_names: Vec<&str> = old.iter().map(|s| s.name()).collect();
    let new_names: Vec<&str> = new.iter().map(|s| s.name()).collect();

    for (index, name) in old_names.iter().enumerate().rev() {
        if !new_names.contains(name) {
            sections.push(SectionChange {
                name: name.to_string(),
                index,
                kind: SectionChangeKind::Delete,
            });
        }
    }
    for (index, name) in new_names.iter().enumerate() {
        if !old_names.contains(name) {
            sections.push(SectionChange {
                name: name.to_string(),
                index,
                kind: SectionChangeKind::Insert,
            });
        }
    }

    let old_entries = flatten(old);
    let new_entries = flatten(new);

    let old_position: HashMap<&EntityId, usize> = old_entries
        .iter()
        .enumerate()
        .map(|(i, (id, _, _))| (id, i))
        .collect();
    let new_ids: HashSet<&EntityId> = new_entries.iter().map(|(id, _, _)| id).collect();

    let mut rows = Vec::new();

    // Deletes, descending old path.
    for (id, path, snapshot) in old_entries.iter().rev() {
        if !new_ids.contains(id) {
            rows.push(RowChange {
                snapshot: (*snapshot).clone(),
                old_path: Some(*path),
                new_path: None,
                kind: ChangeKind::Delete,
            });
        }
    }

    // Inserts, ascending new path.
    for (id, path, snapshot) in &new_entries {
        if !old_position.contains_key(id) {
            rows.push(RowChange {
                snapshot: (*snapshot).clone(),
                old_path: None,
                new_path: Some(*path),
                kind: ChangeKind::Insert,
            });
        }
    }

    // Surviving rows, in new order, with their old flat positions.
    let survivors: Vec<(usize, usize)> = new_entries
        .iter()
        .enumerate()
        .filter_map(|(new_index, (id, _, _))| {
            old_position.get(id).map(|old_index| (new_index, *old_index))
        })
        .collect();
    let old_sequence: Vec<usize> = survivors.iter().map(|(_, old_index)| *old_index).collect();
    let stable = lis_indices(&old_sequence);

    let mut moves = Vec::new();
    let mut updates = Vec::new();
    for (k, (new_index, old_index)) in survivors.iter().enumerate() {
        let (id, new_path, new_snapshot) = &new_entries[*new_index];
        let (_, old_path, old_snapshot) = &old_entries[*old_index];

        if !stable.contains(&k) {
            moves.push(RowChange {
                snapshot: (*new_snapshot).clone(),
                old_path: Some(*old_path),
                new_path: Some(*new_path),
                kind: ChangeKind::Move,
            });
        } else if new_snapshot != old_snapshot || event.contains_upserted(id) {
            updates.push(RowChange {
                snapshot: (*new_snapshot).clone(),
                old_path: Some(*old_path),
                new_path: Some(*new_path),
                kind: ChangeKind::Update,
            });
        }
    }
    rows.extend(moves);
    rows.extend(updates);

    Diff { sections, rows }
}

fn emit_diff(listener: &mut dyn ResultsListener, diff: &Diff) {
    listener.will_change_content();
    for change in &diff.sections {
        listener.did_change_section(&change.name, change.index, change.kind);
    }
    for change in &diff.rows {
        listener.did_change_object(&change.snapshot, change.old_path, change.kind, change.new_path);
    }
    listener.did_change_content();
}
