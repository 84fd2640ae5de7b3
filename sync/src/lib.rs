//! # Vantage Sync
//!
//! Remote-to-local synchronization driver for Vantage read models.
//!
//! The [`PaginationTracker`] turns "the user scrolled near the end" and
//! "the user pulled to refresh" into a serialized sequence of page fetches
//! against a remote source, while the read-model layer independently
//! observes the store those pages are persisted into.
//!
//! The tracker never touches the network itself: the screen-specific view
//! model supplies a [`PageFetcher`] delegate that issues the actual request
//! and persists the results before reporting back the received item count.
//! From that count the tracker decides whether the end of the remote data
//! set was reached, whether the cursor advances, and whether a retry will
//! re-request the same page.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use vantage_engine::InvalidationBus;
//! use vantage_sync::{FetchError, PageFetcher, PaginationTracker, TrackerConfig};
//!
//! struct OrdersFetcher;
//!
//! #[async_trait]
//! impl PageFetcher for OrdersFetcher {
//!     async fn fetch_page(&self, page_number: u32, page_size: u32) -> Result<usize, FetchError> {
//!         // Issue the network request, persist the records into the
//!         // store, then report how many items the page contained.
//!         let _ = (page_number, page_size);
//!         Ok(0)
//!     }
//! }
//!
//! # async fn example() {
//! let tracker = PaginationTracker::new(
//!     Arc::new(OrdersFetcher),
//!     TrackerConfig::default(),
//!     InvalidationBus::new_shared(),
//! );
//!
//! tracker.sync_first_page(None);               // initial load / pull-to-refresh
//! tracker.ensure_next_page_is_synced();        // scroll trigger
//! # }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod fetcher;
pub mod tracker;

pub use config::TrackerConfig;
pub use context::{MainContext, MainContextPump};
pub use error::FetchError;
pub use fetcher::PageFetcher;
pub use tracker::{PaginationTracker, SyncCompletion, SyncCursor, SyncOutcome, TrackerState};
