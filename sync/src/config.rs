//! Tracker configuration.

/// Paging parameters for a [`PaginationTracker`](crate::PaginationTracker).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Number of items requested per page
    pub page_size: u32,
    /// Page number of the first page
    pub first_page: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            page_size: 25,
            first_page: 1,
        }
    }
}

impl TrackerConfig {
    /// Default paging with a custom page size.
    pub fn with_page_size(page_size: u32) -> Self {
        Self {
            page_size,
            ..Self::default()
        }
    }
}
