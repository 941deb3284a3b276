//! # Commitflow Core
//!
//! Core types and collaborator contracts for the commitflow commit pipeline.
//!
//! The commit pipeline takes the events a command produced for one aggregate and
//! persists them, keeps the aggregate cache consistent, runs synchronizer hooks,
//! publishes the events and reports the command outcome. This crate holds the data
//! model and the contracts of every collaborator the pipeline talks to; the pipeline
//! itself lives in `commitflow-runtime`.
//!
//! ## Data Model
//!
//! - [`EventStream`]: the ordered events of one commit attempt for one aggregate
//! - [`SerializedEvent`]: a single domain event, tagged with its kind
//! - [`AggregateRoot`]: in-memory, event-sourced entity
//! - [`EventProcessingContext`]: stream + aggregate + command for one commit attempt
//!
//! ## Collaborators
//!
//! | Contract | Role |
//! |---|---|
//! | [`EventStore`] | append / find streams |
//! | [`EventPublisher`] | publish committed streams |
//! | [`MemoryCache`] | shared aggregate cache |
//! | [`AggregateStorage`] | authoritative aggregate re-fetch |
//! | [`AggregateTypeRegistry`] | type code resolution |
//! | [`CommandRetryTrigger`] | re-execute a command after a version conflict |
//! | [`CommandCompletionSink`] | report command outcomes |
//! | [`SynchronizerRegistry`] | pre/post-persist hooks |

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

/// Aggregate roots, replay and type resolution
pub mod aggregate;

/// Aggregate cache and storage contracts
pub mod cache;

/// Commands, completion and retry contracts
pub mod command;

/// Per-attempt processing context
pub mod context;

/// Domain events
pub mod event;

/// Publishing contracts
pub mod event_bus;

/// Event store contract
pub mod event_store;

/// Event streams
pub mod event_stream;

/// Aggregate and commit identifiers, versions
pub mod stream;

/// Synchronizer hooks and dispatch
pub mod synchronizer;

pub use aggregate::{AggregateRoot, AggregateType, AggregateTypeRegistry, ReplayError, replay_events};
pub use cache::{AggregateStorage, MemoryCache, StorageError};
pub use command::{
    Command, CommandCompletionSink, CommandExecuteContext, CommandExecutor, CommandResult,
    CommandRetryTrigger, CommandStatus, ContextItems, ProcessingCommand,
};
pub use context::EventProcessingContext;
pub use event::{Event, EventError, SerializedEvent};
pub use event_bus::{EventBus, EventBusError, EventPublisher, PublishError};
pub use event_store::{AppendResult, EventStore, EventStoreError, StoreErrorKind};
pub use event_stream::{EventStream, EventStreamError};
pub use stream::{AggregateRootId, CommitId, Version};
pub use synchronizer::{EventSynchronizer, SynchronizeOutcome, SynchronizerError, SynchronizerRegistry};

/// Readable text of a caught panic payload.
///
/// Hooks and actions supplied by the application are run under `catch_unwind`; this
/// turns the payload into something a log line can carry.
#[must_use]
pub fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Environment module - time abstraction
///
/// Streams carry a timestamp; producing it through a trait keeps fixtures deterministic.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
