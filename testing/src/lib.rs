//! # Commitflow Testing
//!
//! Testing utilities for the commitflow commit pipeline.
//!
//! This crate provides:
//! - In-memory doubles of every pipeline collaborator ([`mocks`])
//! - An `Account` aggregate with its events and stream builders ([`fixtures`])
//! - A fully wired pipeline over those doubles ([`harness`])
//!
//! ## Example
//!
//! ```ignore
//! use commitflow_testing::{CommitHarness, fixtures::AccountEvent};
//!
//! #[tokio::test]
//! async fn commit_is_published_once() {
//!     let harness = CommitHarness::new();
//!     let stream = harness.next_stream("acc-1", "c1", vec![AccountEvent::opened("ann")]);
//!
//!     harness.commit(stream, "cmd-1").await;
//!
//!     assert_eq!(harness.publisher.published().len(), 1);
//!     assert_eq!(harness.completion.success_count(), 1);
//! }
//! ```

/// Mock implementations of the pipeline collaborators
pub mod mocks;

/// Account domain fixtures
pub mod fixtures;

/// Wired pipeline for integration tests
pub mod harness;

// Re-export commonly used items
pub use harness::CommitHarness;
pub use mocks::{FixedClock, test_clock};

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Honors `RUST_LOG`, defaults to `warn`. Safe to call from every test.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use commitflow_core::environment::Clock;

    #[test]
    fn test_fixed_clock() {
        init_test_tracing();
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }
}
