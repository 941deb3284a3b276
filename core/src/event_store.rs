//! Event store contract consumed by the commit pipeline.
//!
//! The store is the single source of truth. The pipeline only needs two operations
//! from it:
//!
//! - [`EventStore::append`]: append a whole stream atomically, checking the expected
//!   version (optimistic concurrency) and the commit id (duplicate detection)
//! - [`EventStore::find`]: look an already-persisted stream up by `(aggregate, commit)`
//!
//! # Outcomes
//!
//! A successful append is either a fresh write ([`AppendResult::Success`]) or a
//! recognized replay of a commit id that is already stored
//! ([`AppendResult::DuplicateCommit`]). Everything else is an [`EventStoreError`],
//! and [`EventStoreError::kind`] is the tag the pipeline branches on.
//!
//! # Example
//!
//! ```no_run
//! use commitflow_core::event_store::{AppendResult, EventStore, EventStoreError, StoreErrorKind};
//! use commitflow_core::event_stream::EventStream;
//!
//! async fn example<E: EventStore>(store: &E, stream: &EventStream) {
//!     match store.append(stream).await {
//!         Ok(AppendResult::Success) => { /* fresh write */ }
//!         Ok(AppendResult::DuplicateCommit) => {
//!             let existing = store.find(stream.aggregate_root_id(), stream.commit_id()).await;
//!         }
//!         Err(e) if e.kind() == StoreErrorKind::VersionConflict => { /* re-execute */ }
//!         Err(_) => { /* identity conflict or infrastructure fault */ }
//!     }
//! }
//! ```

use crate::event_stream::EventStream;
use crate::stream::{AggregateRootId, CommitId, Version};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Non-error outcomes of an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendResult {
    /// The stream was durably written.
    Success,
    /// A stream with the same `(aggregate, commit id)` was already stored. Nothing was written.
    DuplicateCommit,
}

/// Classification of [`EventStoreError`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Optimistic concurrency failure.
    VersionConflict,
    /// The aggregate already exists under a different lineage.
    IdentityConflict,
    /// Anything else: connectivity, serialization, ...
    Infrastructure,
}

/// Errors that can occur during event store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventStoreError {
    /// The stream's version does not follow the stored version.
    #[error("Version conflict on aggregate {aggregate_root_id}: expected version {expected}, found {actual}")]
    VersionConflict {
        /// The aggregate where the conflict occurred.
        aggregate_root_id: AggregateRootId,
        /// The version the stream expected to write.
        expected: Version,
        /// The current stored version.
        actual: Version,
    },

    /// A first stream was appended for an aggregate id that already exists.
    #[error("Aggregate {aggregate_root_id} already exists (type code {type_code})")]
    IdentityConflict {
        /// The duplicated aggregate id.
        aggregate_root_id: AggregateRootId,
        /// Type code of the rejected stream.
        type_code: i32,
    },

    /// Database connection or query error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl EventStoreError {
    /// The explicit kind tag the pipeline switches on.
    #[must_use]
    pub const fn kind(&self) -> StoreErrorKind {
        match self {
            Self::VersionConflict { .. } => StoreErrorKind::VersionConflict,
            Self::IdentityConflict { .. } => StoreErrorKind::IdentityConflict,
            Self::DatabaseError(_) | Self::SerializationError(_) => StoreErrorKind::Infrastructure,
        }
    }

    /// Label reported as the error kind in command notifications.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::VersionConflict { .. } => "VersionConflict",
            Self::IdentityConflict { .. } => "IdentityConflict",
            Self::DatabaseError(_) => "DatabaseError",
            Self::SerializationError(_) => "SerializationError",
        }
    }
}

/// Boxed future returned by [`EventStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EventStoreError>> + Send + 'a>>;

/// Durable, append-only storage of event streams.
///
/// # Guarantees expected by the pipeline
///
/// - At most one stream per `(aggregate_root_id, commit_id)` is ever stored; a repeated
///   append of a stored commit id answers [`AppendResult::DuplicateCommit`].
/// - A stream is only stored when its version is exactly the stored version + 1.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so the store can be shared as
/// `Arc<dyn EventStore>`.
pub trait EventStore: Send + Sync {
    /// Append a whole stream atomically.
    ///
    /// # Errors
    ///
    /// - `VersionConflict`: the stored version moved on
    /// - `IdentityConflict`: the aggregate id is already taken by another lineage
    /// - `DatabaseError` / `SerializationError`: infrastructure faults
    fn append<'a>(&'a self, stream: &'a EventStream) -> StoreFuture<'a, AppendResult>;

    /// Find a stored stream by aggregate id and commit id.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` / `SerializationError` on infrastructure faults.
    fn find<'a>(
        &'a self,
        aggregate_root_id: &'a AggregateRootId,
        commit_id: &'a CommitId,
    ) -> StoreFuture<'a, Option<EventStream>>;
}
