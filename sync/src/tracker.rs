//! The pagination state machine.
//!
//! One tracker instance drives sequential page fetches for one list: the
//! first page on initial load or pull-to-refresh, the next page when the
//! consumer scrolls near the end of the materialized rows. At most one
//! fetch is in flight per tracker at any time; overlapping requests are
//! coalesced or queued, never raced.
//!
//! Cursor rules: `current_page` is the page most recently synced
//! successfully. A successful fetch of page `p` sets `current_page = p`;
//! a failed fetch leaves the cursor untouched, so the retry re-requests
//! the same page. `ensure_next_page_is_synced` requests
//! `current_page + 1` once a first page has been synced, and falls back
//! to a first-page sync before that.

use crate::config::TrackerConfig;
use crate::error::FetchError;
use crate::fetcher::PageFetcher;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard};
use vantage_engine::{InlineScheduler, InvalidationBus, InvalidationGuard, Scheduler};

/// Tracker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// No fetch in flight
    Idle,
    /// Fetching the first page (initial load, refresh, or retry)
    SyncingFirstPage,
    /// Fetching the page after `current_page`
    SyncingNextPage,
    /// The last fetch failed; waiting for an external retry trigger
    IdleWithError,
}

/// Paging cursor exposed to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncCursor {
    /// Page most recently synced successfully (the first page before any
    /// sync has completed)
    pub current_page: u32,
    /// Items requested per page
    pub page_size: u32,
    /// The last page returned fewer than `page_size` items
    pub reached_end: bool,
}

impl SyncCursor {
    fn fresh(config: &TrackerConfig) -> Self {
        Self {
            current_page: config.first_page,
            page_size: config.page_size,
            reached_end: false,
        }
    }
}

/// What one finished page sync produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Page number that was fetched
    pub page: u32,
    /// Items the page contained
    pub item_count: usize,
    /// Whether this page exhausted the remote data set
    pub reached_end: bool,
}

/// Completion invoked when a requested sync finishes.
pub type SyncCompletion = Box<dyn FnOnce(Result<SyncOutcome, FetchError>) + Send>;

struct Core {
    state: TrackerState,
    cursor: SyncCursor,
    /// A first page has been synced since construction/reset; gates
    /// next-page arithmetic.
    primed: bool,
    in_flight_page: Option<u32>,
    /// Completions waiting on the in-flight fetch.
    pending: Vec<SyncCompletion>,
    /// A first-page request received while a next-page fetch is in
    /// flight; starts when that fetch yields.
    queued_first_page: Option<Vec<SyncCompletion>>,
}

struct Shared {
    config: TrackerConfig,
    fetcher: Arc<dyn PageFetcher>,
    scheduler: Arc<dyn Scheduler>,
    invalidation: Arc<InvalidationBus>,
    core: Mutex<Core>,
}

/// Drives "sync first page" / "sync next page" for one paginated list.
///
/// Trigger methods return immediately; fetches run on the tokio runtime
/// and their results are redelivered through the injected scheduler.
pub struct PaginationTracker {
    inner: Arc<Shared>,
    _reset_subscription: InvalidationGuard,
}

impl PaginationTracker {
    /// Create a tracker with synchronous (inline) completion delivery.
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        config: TrackerConfig,
        invalidation: Arc<InvalidationBus>,
    ) -> Self {
        Self::with_scheduler(fetcher, config, invalidation, Arc::new(InlineScheduler::new()))
    }

    /// Create a tracker whose completions are redelivered through the
    /// given scheduler before they touch tracker state or consumer
    /// completions.
    pub fn with_scheduler(
        fetcher: Arc<dyn PageFetcher>,
        config: TrackerConfig,
        invalidation: Arc<InvalidationBus>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let inner = Arc::new(Shared {
            core: Mutex::new(Core {
                state: TrackerState::Idle,
                cursor: SyncCursor::fresh(&config),
                primed: false,
                in_flight_page: None,
                pending: Vec::new(),
                queued_first_page: None,
            }),
            config,
            fetcher,
            scheduler,
            invalidation: Arc::clone(&invalidation),
        });

        let reset_inner = Arc::clone(&inner);
        let reset_subscription = invalidation.subscribe(Box::new(move || {
            let inner = Arc::clone(&reset_inner);
            reset_inner.scheduler.schedule(Box::new(move || {
                handle_reset(&inner);
            }));
        }));

        Self {
            inner,
            _reset_subscription: reset_subscription,
        }
    }

    /// Current state.
    pub fn state(&self) -> TrackerState {
        self.lock_core().state
    }

    /// Current cursor.
    pub fn cursor(&self) -> SyncCursor {
        self.lock_core().cursor
    }

    /// Page number of the in-flight fetch, if any. Consumers use this for
    /// footer-spinner logic when syncing beyond the materialized rows.
    pub fn highest_page_being_synced(&self) -> Option<u32> {
        self.lock_core().in_flight_page
    }

    /// Fetch the first page.
    ///
    /// While a first-page fetch is already in flight no second request is
    /// issued; the completion is queued and fires with the in-flight
    /// request's eventual result. While a next-page fetch is in flight
    /// the first-page request is queued and starts once that fetch
    /// yields; at most one network fetch is in flight per tracker.
    pub fn sync_first_page(&self, completion: Option<SyncCompletion>) {
        let mut core = self.lock_core();
        match core.state {
            TrackerState::SyncingFirstPage => {
                tracing::debug!("first-page sync already in flight, coalescing");
                core.pending.extend(completion);
            }
            TrackerState::SyncingNextPage => {
                tracing::debug!("first-page sync queued behind in-flight next-page fetch");
                core.queued_first_page
                    .get_or_insert_with(Vec::new)
                    .extend(completion);
            }
            TrackerState::Idle | TrackerState::IdleWithError => {
                start_fetch(
                    &self.inner,
                    &mut core,
                    TrackerState::SyncingFirstPage,
                    self.inner.config.first_page,
                    completion.into_iter().collect(),
                );
            }
        }
    }

    /// Fetch the page after `current_page` unless the end was reached or
    /// a fetch is already in flight.
    ///
    /// Intended to be driven by a scroll-position observer once the
    /// consumer is near the end of the materialized rows; the tracker
    /// itself knows nothing about UI geometry.
    pub fn ensure_next_page_is_synced(&self) {
        let mut core = self.lock_core();

        match core.state {
            TrackerState::SyncingFirstPage | TrackerState::SyncingNextPage => return,
            TrackerState::Idle | TrackerState::IdleWithError => {}
        }
        if core.cursor.reached_end {
            return;
        }

        if core.primed {
            let page = core.cursor.current_page + 1;
            start_fetch(
                &self.inner,
                &mut core,
                TrackerState::SyncingNextPage,
                page,
                Vec::new(),
            );
        } else {
            // Nothing synced yet (or the last first-page attempt failed):
            // the next page is the first page.
            start_fetch(
                &self.inner,
                &mut core,
                TrackerState::SyncingFirstPage,
                self.inner.config.first_page,
                Vec::new(),
            );
        }
    }

    /// Re-sync from the first page, tagging the trigger for diagnostics
    /// (pull-to-refresh, filter change, view-will-appear).
    pub fn resynchronize(&self, reason: Option<&str>, completion: Option<SyncCompletion>) {
        tracing::info!(reason = reason.unwrap_or("unspecified"), "resynchronizing");
        self.sync_first_page(completion);
    }

    fn lock_core(&self) -> MutexGuard<'_, Core> {
        self.inner.core.lock().expect("tracker lock poisoned")
    }
}

/// Transition into a syncing state and spawn the fetch.
///
/// Must be called within a tokio runtime.
fn start_fetch(
    inner: &Arc<Shared>,
    core: &mut Core,
    state: TrackerState,
    page: u32,
    completions: Vec<SyncCompletion>,
) {
    core.state = state;
    core.in_flight_page = Some(page);
    core.pending = completions;

    let epoch = inner.invalidation.epoch();
    let page_size = inner.config.page_size;
    tracing::info!(page, page_size, "requesting page");

    let task_inner = Arc::clone(inner);
    tokio::spawn(async move {
        let result = task_inner.fetcher.fetch_page(page, page_size).await;
        let complete_inner = Arc::clone(&task_inner);
        task_inner.scheduler.schedule(Box::new(move || {
            complete_fetch(&complete_inner, page, epoch, result);
        }));
    });
}

/// React to a store wipe while no fetch is in flight: pagination starts
/// over. An in-flight fetch is handled by the epoch guard at completion.
fn handle_reset(inner: &Arc<Shared>) {
    let mut core = inner.core.lock().expect("tracker lock poisoned");
    if core.in_flight_page.is_some() {
        return;
    }
    core.state = TrackerState::Idle;
    core.cursor = SyncCursor::fresh(&inner.config);
    core.primed = false;
}

fn complete_fetch(inner: &Arc<Shared>, page: u32, epoch: u64, result: Result<usize, FetchError>) {
    let mut core = inner.core.lock().expect("tracker lock poisoned");
    core.in_flight_page = None;

    let outcome = result.map(|count| SyncOutcome {
        page,
        item_count: count,
        reached_end: count < inner.config.page_size as usize,
    });

    if inner.invalidation.epoch() != epoch {
        // The store was wiped while this fetch was in flight; applying
        // the result would resurrect pre-reset pagination state.
        tracing::debug!(page, "discarding completion from a previous epoch");
        core.state = TrackerState::Idle;
        core.cursor = SyncCursor::fresh(&inner.config);
        core.primed = false;
    } else {
        match &outcome {
            Ok(sync) => {
                core.primed = true;
                core.cursor.current_page = page;
                core.cursor.reached_end = sync.reached_end;
                core.state = TrackerState::Idle;
                tracing::info!(
                    page,
                    items = sync.item_count,
                    reached_end = sync.reached_end,
                    "page synchronized"
                );
            }
            Err(error) => {
                core.state = TrackerState::IdleWithError;
                tracing::warn!(page, error = %error, "page synchronization failed");
            }
        }
    }

    let completions = mem::take(&mut core.pending);
    if let Some(queued) = core.queued_first_page.take() {
        start_fetch(
            inner,
            &mut core,
            TrackerState::SyncingFirstPage,
            inner.config.first_page,
            queued,
        );
    }
    drop(core);

    // Completions run outside the lock; they may re-enter the tracker.
    for completion in completions {
        completion(outcome.clone());
    }
}
