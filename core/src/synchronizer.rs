//! Synchronizer dispatch: cross-cutting hooks around persistence.
//!
//! A synchronizer is registered against an event kind tag (`SerializedEvent::event_type`)
//! and is invoked for every event of that kind:
//!
//! - `on_before_persisting` runs before the stream is appended. It can veto the commit,
//!   either with a concurrency signal (the attempt is abandoned silently and the outer
//!   retry takes over) or with a business rejection (the command fails).
//! - `on_after_persisted` runs after a successful append. Failures and panics are logged only.
//!
//! Dispatch order is stream order across events and registration order across the
//! synchronizers of one event kind. The first signal stops pre-persist dispatch.
//!
//! # Example
//!
//! ```
//! use commitflow_core::event::SerializedEvent;
//! use commitflow_core::synchronizer::{EventSynchronizer, SynchronizerError, SynchronizerRegistry};
//! use std::sync::Arc;
//!
//! struct UniqueEmail;
//!
//! impl EventSynchronizer for UniqueEmail {
//!     fn name(&self) -> &str {
//!         "UniqueEmail"
//!     }
//!
//!     fn on_before_persisting(&self, _event: &SerializedEvent) -> Result<(), SynchronizerError> {
//!         Ok(())
//!     }
//! }
//!
//! let mut registry = SynchronizerRegistry::new();
//! registry.register("UserRegistered.v1", Arc::new(UniqueEmail));
//! assert_eq!(registry.get_synchronizers("UserRegistered.v1").len(), 1);
//! ```

use crate::event::SerializedEvent;
use crate::event_stream::EventStream;
use crate::panic_message;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

/// Signals a synchronizer can raise.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SynchronizerError {
    /// Concurrent modification detected; the commit attempt should be re-run.
    #[error("Synchronizer concurrency conflict: {0}")]
    Concurrency(String),

    /// The event is rejected for business reasons.
    #[error("{kind}: {message}")]
    Rejected {
        /// Machine-readable rejection kind.
        kind: String,
        /// Human-readable message.
        message: String,
    },
}

impl SynchronizerError {
    /// Convenience constructor for [`SynchronizerError::Rejected`].
    #[must_use]
    pub fn rejected(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// A hook invoked before and after persistence of events of one kind.
///
/// Hooks run synchronously on the commit path: long-running I/O here delays the
/// commit of the stream.
pub trait EventSynchronizer: Send + Sync {
    /// Name used in log lines.
    fn name(&self) -> &str;

    /// Called before the stream containing `event` is persisted.
    ///
    /// # Errors
    ///
    /// - [`SynchronizerError::Concurrency`] abandons the attempt without notification
    /// - [`SynchronizerError::Rejected`] fails the command
    fn on_before_persisting(&self, event: &SerializedEvent) -> Result<(), SynchronizerError>;

    /// Called after the stream containing `event` was persisted.
    ///
    /// # Errors
    ///
    /// Errors and panics are logged by the dispatcher and otherwise ignored.
    fn on_after_persisted(&self, _event: &SerializedEvent) -> Result<(), SynchronizerError> {
        Ok(())
    }
}

/// Result of pre-persist synchronization. Decides whether persistence proceeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynchronizeOutcome {
    /// Every hook passed.
    Success,
    /// A hook signalled a concurrency conflict.
    ConcurrencyRejected,
    /// A hook rejected an event.
    Failed {
        /// Rejection kind.
        kind: String,
        /// Rejection message.
        message: String,
    },
}

type Synchronizers = SmallVec<[Arc<dyn EventSynchronizer>; 2]>;

/// Registry of synchronizers keyed by event kind tag.
#[derive(Default, Clone)]
pub struct SynchronizerRegistry {
    by_event_type: HashMap<String, Synchronizers>,
}

impl SynchronizerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a synchronizer for an event kind. Registration order is dispatch order.
    pub fn register(&mut self, event_type: impl Into<String>, synchronizer: Arc<dyn EventSynchronizer>) {
        self.by_event_type
            .entry(event_type.into())
            .or_default()
            .push(synchronizer);
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, event_type: impl Into<String>, synchronizer: Arc<dyn EventSynchronizer>) -> Self {
        self.register(event_type, synchronizer);
        self
    }

    /// Synchronizers for an event kind, in registration order.
    #[must_use]
    pub fn get_synchronizers(&self, event_type: &str) -> &[Arc<dyn EventSynchronizer>] {
        self.by_event_type
            .get(event_type)
            .map(|synchronizers| synchronizers.as_slice())
            .unwrap_or(&[])
    }

    /// Whether no synchronizer is registered at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_event_type.is_empty()
    }

    /// Run every pre-persist hook for the stream. Stops at the first signal.
    #[must_use]
    pub fn before_persisting(&self, stream: &EventStream) -> SynchronizeOutcome {
        for event in stream.events() {
            for synchronizer in self.get_synchronizers(&event.event_type) {
                match synchronizer.on_before_persisting(event) {
                    Ok(()) => {}
                    Err(SynchronizerError::Concurrency(reason)) => {
                        tracing::debug!(
                            synchronizer = synchronizer.name(),
                            stream = %stream,
                            reason = %reason,
                            "Synchronizer signalled a concurrency conflict"
                        );
                        return SynchronizeOutcome::ConcurrencyRejected;
                    }
                    Err(SynchronizerError::Rejected { kind, message }) => {
                        tracing::error!(
                            synchronizer = synchronizer.name(),
                            stream = %stream,
                            kind = %kind,
                            error = %message,
                            "Synchronizer rejected event before persisting"
                        );
                        return SynchronizeOutcome::Failed { kind, message };
                    }
                }
            }
        }
        SynchronizeOutcome::Success
    }

    /// Run every post-persist hook for the stream. Failures and panics are logged and skipped.
    pub fn after_persisted(&self, stream: &EventStream) {
        for event in stream.events() {
            for synchronizer in self.get_synchronizers(&event.event_type) {
                match panic::catch_unwind(AssertUnwindSafe(|| synchronizer.on_after_persisted(event))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::error!(
                            synchronizer = synchronizer.name(),
                            stream = %stream,
                            error = %e,
                            "Synchronizer failed after events were persisted"
                        );
                    }
                    Err(panic) => {
                        tracing::error!(
                            synchronizer = synchronizer.name(),
                            stream = %stream,
                            panic = panic_message(panic.as_ref()),
                            "Synchronizer panicked after events were persisted"
                        );
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for SynchronizerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.by_event_type
                    .iter()
                    .map(|(k, v)| (k, v.iter().map(|s| s.name().to_string()).collect::<Vec<_>>())),
            )
            .finish()
    }
}
