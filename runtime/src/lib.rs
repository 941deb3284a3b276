//! # Commitflow Runtime
//!
//! The commit pipeline of the commitflow event-sourcing engine.
//!
//! Given the events a command produced for one aggregate, [`CommitEventService`]
//! persists them, reacts to the persistence outcome, keeps the aggregate cache in step
//! with the store, runs synchronizer hooks, publishes the events and reports the command
//! outcome.
//!
//! ## Core Components
//!
//! - **`CommitEventService`**: sequences the pipeline and produces the final notification
//! - **`ActionExecutor`**: bounded retry around every side-effecting step
//! - **`CacheRefresher`**: replay or re-fetch refresh of the aggregate cache
//! - **`RetryCommandService`**: re-submits commands after a version conflict
//! - **`ExecutedCommandService`**: logs and forwards command outcomes
//! - **`BusEventPublisher`**: publishes committed streams on a topic-based bus
//!
//! ## Example
//!
//! ```ignore
//! use commitflow_runtime::{CommitConfig, CommitEventService, RetryCommandService};
//! use std::sync::Arc;
//!
//! let retry_service = Arc::new(RetryCommandService::new());
//! let service = CommitEventService::builder()
//!     .event_store(store)
//!     .publisher(publisher)
//!     .memory_cache(cache)
//!     .aggregate_storage(storage)
//!     .type_registry(registry)
//!     .retry_trigger(retry_service.clone())
//!     .config(CommitConfig::from_toml_str(&config_text)?)
//!     .build()?;
//!
//! // Once the command executor exists
//! retry_service.set_command_executor(executor);
//!
//! service.commit_event(context).await;
//! ```

/// Cache refresh after commits and conflicts
pub mod cache_refresh;

/// The commit pipeline
pub mod commit;

/// Command outcome reporting
pub mod completion;

/// Pipeline configuration
pub mod config;

/// Prometheus metrics for observability
pub mod metrics;

/// Event bus publishing adapter
pub mod publish;

/// Bounded retry of pipeline steps
pub mod retry;

/// Command re-execution after version conflicts
pub mod retry_command;

/// Error types for the commit pipeline
pub mod error {
    use crate::config::ConfigError;
    use commitflow_core::event_store::EventStoreError;
    use thiserror::Error;

    /// Reasons a commit attempt is handed back to the outer retry.
    ///
    /// These never reach the command layer. They are logged by the action executor and
    /// count as a failed attempt.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum CommitError {
        /// A pre-persist synchronizer signalled a concurrency conflict
        #[error("Synchronizer signalled a concurrency conflict before persisting")]
        SynchronizerConcurrency,

        /// The store reported a duplicate commit but looking up the stored stream failed
        #[error("Failed to find the existing event stream of a duplicate commit: {0}")]
        FindExisting(#[source] EventStoreError),
    }

    /// Errors raised while assembling a [`CommitEventService`](crate::CommitEventService).
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum BuildError {
        /// A required collaborator was not provided
        #[error("Missing required collaborator: {0}")]
        MissingCollaborator(&'static str),

        /// The configuration is invalid
        #[error(transparent)]
        InvalidConfig(#[from] ConfigError),
    }
}

pub use cache_refresh::CacheRefresher;
pub use commit::{CommitEventService, CommitEventServiceBuilder, failure_kind};
pub use completion::ExecutedCommandService;
pub use config::{CommitConfig, ConfigError};
pub use error::{BuildError, CommitError};
pub use publish::BusEventPublisher;
pub use retry::{ActionExecutor, ExhaustedPolicy, RetryPolicy};
pub use retry_command::RetryCommandService;
