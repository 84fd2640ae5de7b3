//! Error types for page synchronization.

use thiserror::Error;

/// A recoverable page-fetch failure.
///
/// The tracker surfaces these through completions and parks itself in
/// `IdleWithError`; it never retries on its own. Retry is a conscious
/// re-invocation by an external trigger (pull-to-refresh, an explicit
/// retry action, or the next scroll-driven `ensure_next_page_is_synced`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("network failure: {0}")]
    Network(String),

    #[error("remote rejected the request: {0}")]
    Rejected(String),

    #[error("persisting the fetched page failed: {0}")]
    Persistence(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = FetchError::Network("timeout".into());
        assert_eq!(err.to_string(), "network failure: timeout");

        let err = FetchError::Rejected("401".into());
        assert_eq!(err.to_string(), "remote rejected the request: 401");
    }
}
