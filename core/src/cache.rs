//! In-memory aggregate cache and authoritative aggregate storage.
//!
//! The cache is a shared, concurrent key-value structure. The commit pipeline only
//! ever overwrites entries (`set`), and races between two writers for the same id are
//! resolved last-writer-wins. The storage is the authoritative source used to rebuild
//! an aggregate when the cache is known to be stale.

use crate::aggregate::{AggregateRoot, AggregateType};
use crate::stream::AggregateRootId;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Shared cache of reconstructed aggregates, keyed by aggregate id.
pub trait MemoryCache: Send + Sync {
    /// Read a cached aggregate.
    fn get(
        &self,
        aggregate_type: &AggregateType,
        aggregate_root_id: &AggregateRootId,
    ) -> Option<Arc<dyn AggregateRoot>>;

    /// Insert or overwrite the entry for `aggregate.unique_id()`.
    fn set(&self, aggregate: Arc<dyn AggregateRoot>);
}

/// Errors raised while loading an aggregate from storage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Reading the underlying event store failed.
    #[error("Failed to load aggregate {aggregate_root_id}: {reason}")]
    LoadFailed {
        /// Aggregate being loaded.
        aggregate_root_id: AggregateRootId,
        /// Underlying cause.
        reason: String,
    },

    /// No factory is known for the aggregate type.
    #[error("Unsupported aggregate type: {0}")]
    UnsupportedType(String),
}

/// Boxed future returned by [`AggregateStorage::get`].
pub type StorageFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Option<Box<dyn AggregateRoot>>, StorageError>> + Send + 'a>>;

/// Authoritative aggregate source (typically: replay everything in the event store).
pub trait AggregateStorage: Send + Sync {
    /// Load an aggregate. `Ok(None)` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if loading fails.
    fn get<'a>(
        &'a self,
        aggregate_type: &'a AggregateType,
        aggregate_root_id: &'a AggregateRootId,
    ) -> StorageFuture<'a>;
}
