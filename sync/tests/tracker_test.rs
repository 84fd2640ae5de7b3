//! Integration tests for the pagination tracker.
//!
//! A scripted fetcher stands in for the remote source; a semaphore gate
//! lets tests hold a fetch in flight to exercise coalescing, queueing and
//! reset races.

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use vantage_engine::{
    CollectionSchema, FieldDef, FieldType, InvalidationBus, LocalStore, MemoryStore, Origin,
    QuerySpec, ResultsController, Schema, SortDescriptor,
};
use vantage_sync::{
    FetchError, PageFetcher, PaginationTracker, SyncOutcome, TrackerConfig, TrackerState,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vantage_sync=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Fetcher returning scripted results, optionally gated so a fetch stays
/// in flight until the test releases a permit.
struct ScriptedFetcher {
    calls: Mutex<Vec<u32>>,
    results: Mutex<VecDeque<Result<usize, FetchError>>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedFetcher {
    fn new(results: Vec<Result<usize, FetchError>>) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            results: Mutex::new(results.into()),
            gate: None,
        })
    }

    fn gated(results: Vec<Result<usize, FetchError>>, gate: Arc<Semaphore>) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            results: Mutex::new(results.into()),
            gate: Some(gate),
        })
    }

    fn calls(&self) -> Vec<u32> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch_page(&self, page_number: u32, page_size: u32) -> Result<usize, FetchError> {
        self.calls.lock().unwrap().push(page_number);
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(page_size as usize))
    }
}

fn page_two_tracker(fetcher: Arc<ScriptedFetcher>) -> PaginationTracker {
    PaginationTracker::new(
        fetcher,
        TrackerConfig::with_page_size(2),
        InvalidationBus::new_shared(),
    )
}

/// Wait until no fetch is in flight.
async fn settle(tracker: &PaginationTracker) {
    for _ in 0..500 {
        match tracker.state() {
            TrackerState::Idle | TrackerState::IdleWithError => return,
            _ => tokio::time::sleep(Duration::from_millis(2)).await,
        }
    }
    panic!("tracker did not settle");
}

/// Wait until the fetcher has recorded `count` calls.
async fn await_calls(fetcher: &ScriptedFetcher, count: usize) {
    for _ in 0..500 {
        if fetcher.calls().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("fetcher never reached {count} calls");
}

#[tokio::test]
async fn full_page_then_short_page_reaches_the_end() {
    init_tracing();
    // Page 1 returns 2 items (full), page 2 returns 1 (short).
    let fetcher = ScriptedFetcher::new(vec![Ok(2), Ok(1)]);
    let tracker = page_two_tracker(fetcher.clone());

    tracker.sync_first_page(None);
    settle(&tracker).await;
    assert_eq!(tracker.state(), TrackerState::Idle);
    assert_eq!(tracker.cursor().current_page, 1);

    tracker.ensure_next_page_is_synced();
    settle(&tracker).await;
    assert_eq!(fetcher.calls(), vec![1, 2]);
    assert_eq!(tracker.cursor().current_page, 2);
    assert!(tracker.cursor().reached_end);

    // End reached: further triggers perform zero fetches.
    tracker.ensure_next_page_is_synced();
    tracker.ensure_next_page_is_synced();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(fetcher.calls(), vec![1, 2]);
}

#[tokio::test]
async fn duplicate_sync_first_page_issues_one_fetch() {
    init_tracing();
    let gate = Arc::new(Semaphore::new(0));
    let fetcher = ScriptedFetcher::gated(vec![Ok(2)], gate.clone());
    let tracker = page_two_tracker(fetcher.clone());

    let (tx1, rx1) = tokio::sync::oneshot::channel();
    let (tx2, rx2) = tokio::sync::oneshot::channel();
    tracker.sync_first_page(Some(Box::new(move |outcome| {
        let _ = tx1.send(outcome);
    })));
    tracker.sync_first_page(Some(Box::new(move |outcome| {
        let _ = tx2.send(outcome);
    })));

    gate.add_permits(1);

    // Both completions resolve with the single in-flight result.
    let first = rx1.await.unwrap().unwrap();
    let second = rx2.await.unwrap().unwrap();
    assert_eq!(first, second);
    assert_eq!(
        first,
        SyncOutcome {
            page: 1,
            item_count: 2,
            reached_end: false
        }
    );
    assert_eq!(fetcher.calls(), vec![1]);
}

#[tokio::test]
async fn failed_page_is_rerequested_on_retry() {
    init_tracing();
    let fetcher = ScriptedFetcher::new(vec![
        Ok(2),
        Err(FetchError::Network("timeout".into())),
        Ok(2),
    ]);
    let tracker = page_two_tracker(fetcher.clone());

    tracker.sync_first_page(None);
    settle(&tracker).await;

    tracker.ensure_next_page_is_synced();
    settle(&tracker).await;
    assert_eq!(tracker.state(), TrackerState::IdleWithError);
    // Not advanced: the value still targets page 2.
    assert_eq!(tracker.cursor().current_page, 1);

    // The next trigger re-requests page 2, not page 3.
    tracker.ensure_next_page_is_synced();
    settle(&tracker).await;
    assert_eq!(fetcher.calls(), vec![1, 2, 2]);
    assert_eq!(tracker.cursor().current_page, 2);
    assert_eq!(tracker.state(), TrackerState::Idle);
}

#[tokio::test]
async fn scroll_trigger_before_any_sync_fetches_the_first_page() {
    init_tracing();
    let fetcher = ScriptedFetcher::new(vec![Ok(2)]);
    let tracker = page_two_tracker(fetcher.clone());

    tracker.ensure_next_page_is_synced();
    settle(&tracker).await;

    assert_eq!(fetcher.calls(), vec![1]);
    assert_eq!(tracker.cursor().current_page, 1);
}

#[tokio::test]
async fn refresh_during_next_page_fetch_waits_its_turn() {
    init_tracing();
    let gate = Arc::new(Semaphore::new(1)); // first page passes immediately
    let fetcher = ScriptedFetcher::gated(vec![Ok(2), Ok(2), Ok(2)], gate.clone());
    let tracker = page_two_tracker(fetcher.clone());

    tracker.sync_first_page(None);
    settle(&tracker).await;

    // Next-page fetch blocks on the gate.
    tracker.ensure_next_page_is_synced();
    assert_eq!(tracker.state(), TrackerState::SyncingNextPage);
    assert_eq!(tracker.highest_page_being_synced(), Some(2));
    await_calls(&fetcher, 2).await;

    // Pull-to-refresh while it is in flight: queued, not raced.
    let (tx, rx) = tokio::sync::oneshot::channel();
    tracker.sync_first_page(Some(Box::new(move |outcome| {
        let _ = tx.send(outcome);
    })));
    assert_eq!(fetcher.calls(), vec![1, 2]);

    // Let the next-page fetch yield, then the queued first page run.
    gate.add_permits(2);
    let outcome = rx.await.unwrap().unwrap();
    assert_eq!(outcome.page, 1);
    settle(&tracker).await;

    assert_eq!(fetcher.calls(), vec![1, 2, 1]);
    assert_eq!(tracker.state(), TrackerState::Idle);
    assert_eq!(tracker.cursor().current_page, 1);
}

#[tokio::test]
async fn completion_from_before_a_reset_is_discarded() {
    init_tracing();
    let gate = Arc::new(Semaphore::new(1));
    let fetcher = ScriptedFetcher::gated(vec![Ok(2), Ok(2)], gate.clone());
    let bus = InvalidationBus::new_shared();
    let tracker = PaginationTracker::new(
        fetcher.clone(),
        TrackerConfig::with_page_size(2),
        bus.clone(),
    );

    tracker.sync_first_page(None);
    settle(&tracker).await;

    // Page 2 goes in flight, then the account logs out.
    tracker.ensure_next_page_is_synced();
    bus.post();
    gate.add_permits(1);
    settle(&tracker).await;

    // The stale completion did not resurrect pre-reset pagination state.
    assert_eq!(tracker.state(), TrackerState::Idle);
    assert_eq!(tracker.cursor().current_page, 1);
    assert!(!tracker.cursor().reached_end);

    // The next trigger starts over from the first page.
    gate.add_permits(1);
    tracker.ensure_next_page_is_synced();
    settle(&tracker).await;
    assert_eq!(fetcher.calls(), vec![1, 2, 1]);
}

#[tokio::test]
async fn highest_page_being_synced_tracks_the_in_flight_fetch() {
    init_tracing();
    let gate = Arc::new(Semaphore::new(0));
    let fetcher = ScriptedFetcher::gated(vec![Ok(2)], gate.clone());
    let tracker = page_two_tracker(fetcher);

    assert_eq!(tracker.highest_page_being_synced(), None);
    tracker.sync_first_page(None);
    assert_eq!(tracker.highest_page_being_synced(), Some(1));

    gate.add_permits(1);
    settle(&tracker).await;
    assert_eq!(tracker.highest_page_being_synced(), None);
}

/// Fetcher that persists pages into a real store, the way a view model's
/// delegate would.
struct StorePersistingFetcher {
    store: Arc<MemoryStore>,
    total_items: usize,
}

#[async_trait]
impl PageFetcher for StorePersistingFetcher {
    async fn fetch_page(&self, page_number: u32, page_size: u32) -> Result<usize, FetchError> {
        let start = (page_number as usize - 1) * page_size as usize;
        let end = (start + page_size as usize).min(self.total_items);
        let rows: Vec<(String, serde_json::Value)> = (start..end)
            .map(|i| (format!("order-{i:03}"), json!({"number": i})))
            .collect();
        let count = rows.len();

        self.store
            .upsert_batch("orders", rows, 1000 + u64::from(page_number), Origin::Remote)
            .map_err(|e| FetchError::Persistence(e.to_string()))?;

        Ok(count)
    }
}

#[tokio::test]
async fn pages_merge_into_an_observed_store() {
    init_tracing();
    let schema = Schema::new().with_collection(CollectionSchema::new(
        "orders",
        vec![FieldDef::required("number", FieldType::Int)],
    ));
    let store = MemoryStore::new_shared(schema);

    let spec = QuerySpec::new("orders").sorted_by(vec![SortDescriptor::ascending("number")]);
    let controller = ResultsController::new(store.clone(), spec);
    controller.perform_fetch().unwrap();

    // 5 items at page size 2: pages of 2, 2, 1.
    let tracker = PaginationTracker::new(
        Arc::new(StorePersistingFetcher {
            store: store.clone(),
            total_items: 5,
        }),
        TrackerConfig::with_page_size(2),
        store.invalidation(),
    );

    tracker.sync_first_page(None);
    settle(&tracker).await;
    assert_eq!(controller.number_of_objects(), 2);

    tracker.ensure_next_page_is_synced();
    settle(&tracker).await;
    assert_eq!(controller.number_of_objects(), 4);

    tracker.ensure_next_page_is_synced();
    settle(&tracker).await;
    assert_eq!(controller.number_of_objects(), 5);
    assert!(tracker.cursor().reached_end);

    // A reset flows through the shared invalidation bus to both sides.
    store.reset();
    assert!(controller.is_empty());
    assert_eq!(tracker.cursor().current_page, 1);
}
