//! Keeps the shared aggregate cache consistent with the event store.
//!
//! Both refresh modes are best effort. A failed refresh leaves a stale entry behind,
//! which is acceptable because the store stays authoritative and a stale aggregate
//! only ever leads to a version conflict on its next command.

use commitflow_core::aggregate::{AggregateRoot, AggregateTypeRegistry, replay_events};
use commitflow_core::cache::{AggregateStorage, MemoryCache};
use commitflow_core::context::EventProcessingContext;
use commitflow_core::event_stream::EventStream;
use commitflow_core::panic_message;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Publishes up-to-date aggregates into the [`MemoryCache`].
#[derive(Clone)]
pub struct CacheRefresher {
    cache: Arc<dyn MemoryCache>,
    storage: Arc<dyn AggregateStorage>,
    type_registry: Arc<dyn AggregateTypeRegistry>,
}

impl CacheRefresher {
    /// Create a refresher over a cache, its authoritative storage and the type registry.
    #[must_use]
    pub fn new(
        cache: Arc<dyn MemoryCache>,
        storage: Arc<dyn AggregateStorage>,
        type_registry: Arc<dyn AggregateTypeRegistry>,
    ) -> Self {
        Self {
            cache,
            storage,
            type_registry,
        }
    }

    /// Apply the freshly committed stream to the context's aggregate and cache the result.
    ///
    /// The replay runs on a copy of the context's aggregate, so the context keeps the
    /// pre-stream state even if the commit attempt is re-run. A panicking `apply_event`
    /// leaves the cache untouched.
    pub fn replay_refresh(&self, context: &EventProcessingContext) {
        let stream = context.event_stream();
        let mut aggregate = context.aggregate_root().boxed_clone();

        let replayed = panic::catch_unwind(AssertUnwindSafe(|| replay_events(aggregate.as_mut(), [stream])));

        match replayed {
            Ok(Ok(())) => {
                tracing::debug!(
                    aggregate_root_type = aggregate.type_name(),
                    aggregate_root_id = %aggregate.unique_id(),
                    aggregate_root_version = %aggregate.version(),
                    "Refreshed memory cache"
                );
                let aggregate: Arc<dyn AggregateRoot> = Arc::from(aggregate);
                self.cache.set(aggregate);
            }
            Ok(Err(e)) => {
                tracing::error!(
                    stream = %stream,
                    error = %e,
                    "Failed to refresh memory cache by event stream"
                );
            }
            Err(panic) => {
                tracing::error!(
                    stream = %stream,
                    panic = panic_message(panic.as_ref()),
                    "Aggregate panicked while replaying event stream, memory cache left untouched"
                );
            }
        }
    }

    /// Reload the aggregate from storage and overwrite the cached entry.
    pub async fn refetch_refresh(&self, stream: &EventStream) {
        let type_code = stream.aggregate_root_type_code();
        let Some(aggregate_type) = self.type_registry.resolve_type(type_code) else {
            tracing::error!(
                type_code,
                stream = %stream,
                "Could not find aggregate root type by aggregate root type code"
            );
            return;
        };

        match self
            .storage
            .get(&aggregate_type, stream.aggregate_root_id())
            .await
        {
            Ok(Some(aggregate)) => {
                tracing::debug!(
                    aggregate_root_type = %aggregate_type,
                    aggregate_root_id = %aggregate.unique_id(),
                    aggregate_root_version = %aggregate.version(),
                    "Refreshed memory cache from storage"
                );
                let aggregate: Arc<dyn AggregateRoot> = Arc::from(aggregate);
                self.cache.set(aggregate);
            }
            Ok(None) => {
                tracing::warn!(
                    stream = %stream,
                    "Aggregate not found in storage, memory cache left untouched"
                );
            }
            Err(e) => {
                tracing::error!(
                    stream = %stream,
                    error = %e,
                    "Failed to refresh memory cache from storage"
                );
            }
        }
    }
}

impl std::fmt::Debug for CacheRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRefresher").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use commitflow_core::event::{EventError, SerializedEvent};
    use commitflow_core::stream::{AggregateRootId, Version};
    use commitflow_testing::fixtures::{self, AccountEvent};
    use commitflow_testing::mocks::{
        InMemoryAggregateStorage, InMemoryEventStore, InMemoryMemoryCache, StaticTypeRegistry,
    };

    struct Setup {
        store: Arc<InMemoryEventStore>,
        storage: Arc<InMemoryAggregateStorage>,
        cache: Arc<InMemoryMemoryCache>,
        refresher: CacheRefresher,
    }

    fn setup(registry: StaticTypeRegistry) -> Setup {
        let store = Arc::new(InMemoryEventStore::new());
        let storage = Arc::new(fixtures::account_storage(Arc::clone(&store)));
        let cache = Arc::new(InMemoryMemoryCache::new());
        let refresher = CacheRefresher::new(
            Arc::clone(&cache) as Arc<dyn MemoryCache>,
            Arc::clone(&storage) as Arc<dyn AggregateStorage>,
            Arc::new(registry),
        );
        Setup {
            store,
            storage,
            cache,
            refresher,
        }
    }

    #[test]
    fn replay_refresh_caches_next_version() {
        let s = setup(fixtures::account_type_registry());
        let stream = fixtures::account_stream("acc-1", "c1", 1, vec![AccountEvent::opened("ann")]);
        let context = fixtures::context(stream, fixtures::new_account("acc-1"));

        s.refresher.replay_refresh(&context);

        let cached = s.cache.get_by_id(&AggregateRootId::new("acc-1")).unwrap();
        assert_eq!(cached.version(), Version::new(1));
        assert_eq!(context.aggregate_root().version(), Version::INITIAL);
    }

    #[test]
    fn replay_refresh_skips_out_of_order_stream() {
        let s = setup(fixtures::account_type_registry());
        let stream = fixtures::account_stream("acc-1", "c3", 3, vec![AccountEvent::deposited(5)]);
        let context = fixtures::context(stream, fixtures::new_account("acc-1"));

        s.refresher.replay_refresh(&context);

        assert_eq!(s.cache.set_count(), 0);
    }

    #[derive(Debug, Clone)]
    struct Brittle {
        id: AggregateRootId,
        version: Version,
    }

    impl AggregateRoot for Brittle {
        fn unique_id(&self) -> &AggregateRootId {
            &self.id
        }

        fn version(&self) -> Version {
            self.version
        }

        fn type_name(&self) -> &'static str {
            "Brittle"
        }

        fn apply_event(&mut self, _event: &SerializedEvent) -> Result<(), EventError> {
            panic!("corrupted state");
        }

        fn set_version(&mut self, version: Version) {
            self.version = version;
        }

        fn boxed_clone(&self) -> Box<dyn AggregateRoot> {
            Box::new(self.clone())
        }
    }

    #[test]
    fn replay_refresh_contains_panicking_aggregate() {
        let s = setup(fixtures::account_type_registry());
        let stream = fixtures::account_stream("acc-1", "c1", 1, vec![AccountEvent::opened("ann")]);
        let context = fixtures::context(
            stream,
            Brittle {
                id: AggregateRootId::new("acc-1"),
                version: Version::INITIAL,
            },
        );

        s.refresher.replay_refresh(&context);

        assert_eq!(s.cache.set_count(), 0);
        assert_eq!(context.aggregate_root().version(), Version::INITIAL);
    }

    #[tokio::test]
    async fn refetch_refresh_loads_from_storage() {
        let s = setup(fixtures::account_type_registry());
        s.store
            .seed(fixtures::account_stream("acc-1", "c1", 1, vec![AccountEvent::opened("ann")]));
        s.store
            .seed(fixtures::account_stream("acc-1", "c2", 2, vec![AccountEvent::deposited(10)]));

        let conflicting =
            fixtures::account_stream("acc-1", "c9", 2, vec![AccountEvent::deposited(1)]);
        s.refresher.refetch_refresh(&conflicting).await;

        let cached = s.cache.get_by_id(&AggregateRootId::new("acc-1")).unwrap();
        assert_eq!(cached.version(), Version::new(2));
        assert_eq!(s.storage.get_count(), 1);
    }

    #[tokio::test]
    async fn refetch_refresh_aborts_on_unknown_type_code() {
        let s = setup(StaticTypeRegistry::new());
        let stream = fixtures::account_stream("acc-1", "c1", 1, vec![AccountEvent::opened("ann")]);

        s.refresher.refetch_refresh(&stream).await;

        assert_eq!(s.storage.get_count(), 0);
        assert_eq!(s.cache.set_count(), 0);
    }
}
