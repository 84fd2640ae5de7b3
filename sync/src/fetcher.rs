//! The remote-fetch delegate boundary.

use crate::error::FetchError;
use async_trait::async_trait;

/// Delegate that performs the actual page fetch.
///
/// Supplied by the screen-specific view model. The implementor issues the
/// network request for `(page_number, page_size)` and persists the
/// received records into the local store *before* returning, so that by
/// the time the tracker advances its cursor every observing live query
/// has already been notified through the store's change events.
///
/// The returned value is the number of items the page contained; a count
/// smaller than `page_size` tells the tracker the remote data set is
/// exhausted.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, page_number: u32, page_size: u32) -> Result<usize, FetchError>;
}
