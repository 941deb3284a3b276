//! A fully wired commit pipeline over in-memory collaborators.
//!
//! # Example
//!
//! ```ignore
//! use commitflow_testing::harness::CommitHarness;
//! use commitflow_testing::fixtures::AccountEvent;
//!
//! let harness = CommitHarness::new();
//! let stream = harness.next_stream("acc-1", "c1", vec![AccountEvent::opened("ann")]);
//! harness.commit(stream, "cmd-1").await;
//!
//! assert_eq!(harness.completion.success_count(), 1);
//! ```

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use crate::fixtures::{self, AccountEvent};
use crate::mocks::{
    InMemoryAggregateStorage, InMemoryEventStore, InMemoryMemoryCache, RecordingCompletionSink,
    RecordingExecuteContext, RecordingPublisher, RecordingRetryTrigger, TestCommand,
};
use commitflow_core::aggregate::AggregateTypeRegistry;
use commitflow_core::cache::{AggregateStorage, MemoryCache};
use commitflow_core::command::{CommandCompletionSink, CommandRetryTrigger, ProcessingCommand};
use commitflow_core::context::EventProcessingContext;
use commitflow_core::event_bus::EventPublisher;
use commitflow_core::event_store::EventStore;
use commitflow_core::event_stream::EventStream;
use commitflow_core::stream::AggregateRootId;
use commitflow_core::synchronizer::SynchronizerRegistry;
use commitflow_runtime::{CommitConfig, CommitEventService};
use std::sync::Arc;

/// Commit pipeline plus handles on every double it talks to.
pub struct CommitHarness {
    /// Event store
    pub store: Arc<InMemoryEventStore>,
    /// Authoritative storage over `store`
    pub storage: Arc<InMemoryAggregateStorage>,
    /// Aggregate cache
    pub cache: Arc<InMemoryMemoryCache>,
    /// Publisher
    pub publisher: Arc<RecordingPublisher>,
    /// Completion sink
    pub completion: Arc<RecordingCompletionSink>,
    /// Retry trigger (accepts by default)
    pub retry_trigger: Arc<RecordingRetryTrigger>,
    /// The pipeline under test
    pub service: CommitEventService,
}

impl CommitHarness {
    /// Default configuration, no synchronizer
    #[must_use]
    pub fn new() -> Self {
        Self::build(SynchronizerRegistry::new(), CommitConfig::default())
    }

    /// Default configuration with synchronizers
    #[must_use]
    pub fn with_synchronizers(synchronizers: SynchronizerRegistry) -> Self {
        Self::build(synchronizers, CommitConfig::default())
    }

    /// Custom configuration, no synchronizer
    #[must_use]
    pub fn with_config(config: CommitConfig) -> Self {
        Self::build(SynchronizerRegistry::new(), config)
    }

    /// Wire everything
    #[must_use]
    pub fn build(synchronizers: SynchronizerRegistry, config: CommitConfig) -> Self {
        let store = Arc::new(InMemoryEventStore::new());
        let storage = Arc::new(fixtures::account_storage(Arc::clone(&store)));
        let cache = Arc::new(InMemoryMemoryCache::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let completion = Arc::new(RecordingCompletionSink::new());
        let retry_trigger = Arc::new(RecordingRetryTrigger::new(true));
        let type_registry: Arc<dyn AggregateTypeRegistry> = Arc::new(fixtures::account_type_registry());

        let service = CommitEventService::builder()
            .event_store(Arc::clone(&store) as Arc<dyn EventStore>)
            .publisher(Arc::clone(&publisher) as Arc<dyn EventPublisher>)
            .synchronizers(Arc::new(synchronizers))
            .memory_cache(Arc::clone(&cache) as Arc<dyn MemoryCache>)
            .aggregate_storage(Arc::clone(&storage) as Arc<dyn AggregateStorage>)
            .type_registry(type_registry)
            .retry_trigger(Arc::clone(&retry_trigger) as Arc<dyn CommandRetryTrigger>)
            .completion_sink(Arc::clone(&completion) as Arc<dyn CommandCompletionSink>)
            .config(config)
            .build()
            .unwrap();

        Self {
            store,
            storage,
            cache,
            publisher,
            completion,
            retry_trigger,
            service,
        }
    }

    /// The stream that follows whatever the store holds for `id`
    #[must_use]
    pub fn next_stream(&self, id: &str, commit_id: &str, events: Vec<AccountEvent>) -> EventStream {
        let version = self
            .store
            .streams(&AggregateRootId::new(id))
            .last()
            .map_or(1, |stream| stream.version().value() + 1);
        fixtures::account_stream(id, commit_id, version, events)
    }

    /// Context for `stream`, with the account as the store knew it before the stream
    #[must_use]
    pub fn context(&self, stream: EventStream, command: ProcessingCommand) -> EventProcessingContext {
        let mut account = fixtures::new_account(stream.aggregate_root_id().as_str());
        let prior: Vec<EventStream> = self
            .store
            .streams(stream.aggregate_root_id())
            .into_iter()
            .filter(|stored| stored.version() < stream.version())
            .collect();
        commitflow_core::aggregate::replay_events(&mut account, &prior).unwrap();
        EventProcessingContext::new(stream, Arc::new(account), command)
    }

    /// Command `command_id` with a retry budget of 3, in a fresh execute context
    #[must_use]
    pub fn command(command_id: &str) -> ProcessingCommand {
        ProcessingCommand::new(
            Arc::new(TestCommand::new(command_id, 3)),
            Arc::new(RecordingExecuteContext::new()),
        )
    }

    /// Commit `stream` on behalf of `command_id`
    pub async fn commit(&self, stream: EventStream, command_id: &str) {
        let context = self.context(stream, Self::command(command_id));
        self.service.commit_event(context).await;
    }
}

impl Default for CommitHarness {
    fn default() -> Self {
        Self::new()
    }
}
