//! Integration tests for the commit pipeline
//!
//! Every test drives `CommitEventService::commit_event` over in-memory collaborators
//! and asserts on what the store, cache, publisher and command layer observed.

#![allow(clippy::unwrap_used, clippy::panic)]

use commitflow_core::command::{CommandExecuteContext, CommandExecutor, CommandStatus, ContextItems, ProcessingCommand};
use commitflow_core::event_store::{AppendResult, EventStoreError};
use commitflow_core::stream::{AggregateRootId, Version};
use commitflow_core::context::EventProcessingContext;
use commitflow_core::event::SerializedEvent;
use commitflow_core::synchronizer::{EventSynchronizer, SynchronizerError, SynchronizerRegistry};
use commitflow_core::{
    AggregateStorage, AggregateTypeRegistry, CommandCompletionSink, EventPublisher, EventStore, MemoryCache,
};
use commitflow_runtime::{
    BusEventPublisher, CommitConfig, CommitEventService, ExhaustedPolicy, RetryCommandService,
    failure_kind,
};
use commitflow_testing::fixtures::{self, AccountEvent};
use commitflow_testing::mocks::{
    InMemoryEventStore, InMemoryMemoryCache, RecordingCommandExecutor, RecordingCompletionSink,
    RecordingEventBus, RecordingExecuteContext, RecordingPublisher, ScriptedSynchronizer, TestCommand,
};
use commitflow_testing::{CommitHarness, init_test_tracing};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;
use tokio::sync::mpsc as async_mpsc;

fn opened() -> Vec<AccountEvent> {
    vec![AccountEvent::opened("ann")]
}

#[tokio::test]
async fn test_success_persists_refreshes_publishes_and_notifies_once() {
    init_test_tracing();
    let harness = CommitHarness::new();
    let stream = harness.next_stream("acc-1", "c1", opened());

    harness.commit(stream.clone(), "cmd-1").await;

    assert_eq!(harness.store.streams(&AggregateRootId::new("acc-1")), vec![stream.clone()]);
    assert_eq!(harness.cache.version_of("acc-1"), Some(Version::new(1)));
    assert_eq!(harness.publisher.published(), vec![stream]);

    let results = harness.completion.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, CommandStatus::Success);
    assert_eq!(results[0].command_id, "cmd-1");
    assert_eq!(results[0].aggregate_root_id, AggregateRootId::new("acc-1"));
}

#[tokio::test]
async fn test_consecutive_commits_advance_cache() {
    init_test_tracing();
    let harness = CommitHarness::new();

    let first = harness.next_stream("acc-1", "c1", opened());
    harness.commit(first, "cmd-1").await;
    let second = harness.next_stream("acc-1", "c2", vec![AccountEvent::deposited(25)]);
    harness.commit(second, "cmd-2").await;

    assert_eq!(harness.store.stream_count(), 2);
    assert_eq!(harness.cache.version_of("acc-1"), Some(Version::new(2)));
    assert_eq!(harness.completion.success_count(), 2);
    assert_eq!(fixtures::stored_account(&harness.store, "acc-1").balance(), 25);
}

#[tokio::test]
async fn test_duplicate_with_stored_stream_behaves_like_success() {
    init_test_tracing();
    let sync = Arc::new(ScriptedSynchronizer::new("audit"));
    let harness = CommitHarness::with_synchronizers(
        SynchronizerRegistry::new().with("AccountOpened.v1", sync.clone()),
    );
    let stream = fixtures::account_stream("acc-1", "c1", 1, opened());
    harness.store.seed(stream.clone());

    harness.commit(stream.clone(), "cmd-1").await;

    assert_eq!(harness.store.stream_count(), 1);
    assert_eq!(harness.publisher.published(), vec![stream]);
    assert_eq!(harness.completion.success_count(), 1);
    assert_eq!(harness.completion.failed_count(), 0);
    assert_eq!(sync.calls(), vec!["before:AccountOpened.v1", "after:AccountOpened.v1"]);
    // Only a fresh append replays into the cache
    assert_eq!(harness.cache.set_count(), 0);
}

#[tokio::test]
async fn test_append_reported_failed_after_write_resolves_as_duplicate() {
    init_test_tracing();
    let harness = CommitHarness::new();
    let stream = fixtures::account_stream("acc-1", "c1", 1, opened());
    // The first attempt wrote the stream but its answer was lost
    harness.store.seed(stream.clone());
    harness.store.fail_appends(1);

    harness.commit(stream, "cmd-1").await;

    assert_eq!(harness.store.append_calls(), 2);
    assert_eq!(harness.store.stream_count(), 1);
    assert_eq!(harness.publisher.published().len(), 1);
    assert_eq!(harness.completion.success_count(), 1);
}

#[tokio::test]
async fn test_duplicate_without_stored_stream_fails_without_publishing() {
    init_test_tracing();
    let harness = CommitHarness::new();
    harness.store.script_append(Ok(AppendResult::DuplicateCommit));
    let stream = harness.next_stream("acc-1", "c1", opened());

    harness.commit(stream, "cmd-1").await;

    assert_eq!(harness.publisher.publish_calls(), 0);
    assert_eq!(harness.store.find_calls(), 1);

    let results = harness.completion.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, CommandStatus::Failed);
    assert_eq!(
        results[0].error_kind.as_deref(),
        Some(failure_kind::DUPLICATE_COMMIT_WITHOUT_RECORD)
    );
    assert_eq!(
        results[0].error_message.as_deref(),
        Some(
            "Duplicate commit, but can't find the existing event stream from event store. \
             commit_id:c1, aggregate_root_id:acc-1, aggregate_root_type_code:1"
        )
    );
}

#[tokio::test]
async fn test_find_failure_is_retried_by_outer_attempt() {
    init_test_tracing();
    let harness = CommitHarness::new();
    let stream = fixtures::account_stream("acc-1", "c1", 1, opened());
    harness.store.seed(stream.clone());
    harness
        .store
        .script_find(Err(EventStoreError::DatabaseError("timeout".to_string())));

    harness.commit(stream, "cmd-1").await;

    assert_eq!(harness.store.find_calls(), 2);
    assert_eq!(harness.publisher.published().len(), 1);
    assert_eq!(harness.completion.results().len(), 1);
    assert_eq!(harness.completion.success_count(), 1);
}

#[tokio::test]
async fn test_version_conflict_refetches_cache_and_retries_command() {
    init_test_tracing();
    let harness = CommitHarness::new();
    harness.store.seed(fixtures::account_stream("acc-1", "c1", 1, opened()));
    harness
        .store
        .seed(fixtures::account_stream("acc-1", "c2", 2, vec![AccountEvent::deposited(10)]));

    // Computed against version 1, but version 2 is already stored
    let stale = fixtures::account_stream("acc-1", "c9", 2, vec![AccountEvent::deposited(3)]);
    harness.commit(stale, "cmd-9").await;

    assert_eq!(harness.storage.get_count(), 1);
    assert_eq!(harness.cache.set_count(), 1);
    assert_eq!(harness.cache.version_of("acc-1"), Some(Version::new(2)));

    let retried = harness.retry_trigger.retried();
    assert_eq!(retried.len(), 1);
    assert_eq!(retried[0].command().id(), "cmd-9");

    assert!(harness.completion.results().is_empty());
    assert_eq!(harness.publisher.publish_calls(), 0);
    assert_eq!(harness.store.stream_count(), 2);
}

#[tokio::test]
async fn test_version_conflict_out_of_retries_fails_citing_max() {
    init_test_tracing();
    let harness = CommitHarness::new();
    harness.retry_trigger.set_accept(false);
    harness.store.seed(fixtures::account_stream("acc-1", "c1", 1, opened()));

    let ahead = fixtures::account_stream("acc-1", "c9", 3, vec![AccountEvent::deposited(3)]);
    harness.commit(ahead, "cmd-9").await;

    assert_eq!(harness.retry_trigger.calls(), 1);
    let results = harness.completion.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, CommandStatus::Failed);
    assert_eq!(results[0].error_kind.as_deref(), Some(failure_kind::RETRY_LIMIT_EXCEEDED));
    assert_eq!(
        results[0].error_message.as_deref(),
        Some("TestCommand [id:cmd-9, aggregate_id:acc-1] retried count reached its max retry count 3.")
    );
}

#[tokio::test]
async fn test_identity_conflict_fails_without_retry() {
    init_test_tracing();
    let harness = CommitHarness::new();
    harness.store.seed(fixtures::account_stream("acc-1", "c1", 1, opened()));

    let reopen = fixtures::account_stream("acc-1", "c2", 1, vec![AccountEvent::opened("bob")]);
    harness.commit(reopen, "cmd-2").await;

    assert_eq!(harness.retry_trigger.calls(), 0);
    assert_eq!(harness.publisher.publish_calls(), 0);

    let results = harness.completion.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, CommandStatus::Failed);
    assert_eq!(results[0].error_kind.as_deref(), Some("IdentityConflict"));
    assert!(results[0].error_message.as_deref().unwrap().contains("acc-1"));
}

#[tokio::test]
async fn test_synchronizer_concurrency_signal_aborts_silently() {
    init_test_tracing();
    let sync = Arc::new(
        ScriptedSynchronizer::new("unique-owner")
            .failing_before(SynchronizerError::Concurrency("owner index busy".to_string())),
    );
    let harness = CommitHarness::with_synchronizers(
        SynchronizerRegistry::new().with("AccountOpened.v1", sync.clone()),
    );
    let stream = harness.next_stream("acc-1", "c1", opened());

    harness.commit(stream, "cmd-1").await;

    assert_eq!(harness.store.append_calls(), 0);
    assert!(harness.completion.results().is_empty());
    // One call per outer attempt
    assert_eq!(sync.before_calls(), 3);
}

#[tokio::test]
async fn test_synchronizer_rejection_fails_with_its_kind() {
    init_test_tracing();
    let sync = Arc::new(
        ScriptedSynchronizer::new("unique-owner")
            .failing_before(SynchronizerError::rejected("OwnerTaken", "ann already owns an account")),
    );
    let harness = CommitHarness::with_synchronizers(
        SynchronizerRegistry::new().with("AccountOpened.v1", sync.clone()),
    );
    let stream = harness.next_stream("acc-1", "c1", opened());

    harness.commit(stream, "cmd-1").await;

    assert_eq!(harness.store.append_calls(), 0);
    assert_eq!(sync.before_calls(), 1);

    let results = harness.completion.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, CommandStatus::Failed);
    assert_eq!(results[0].error_kind.as_deref(), Some("OwnerTaken"));
    assert_eq!(results[0].error_message.as_deref(), Some("ann already owns an account"));
}

#[tokio::test]
async fn test_post_persist_synchronizer_failure_keeps_success() {
    init_test_tracing();
    let sync = Arc::new(
        ScriptedSynchronizer::new("projection")
            .failing_after(SynchronizerError::rejected("ProjectionDown", "read model unavailable")),
    );
    let harness = CommitHarness::with_synchronizers(
        SynchronizerRegistry::new().with("Deposited.v1", sync.clone()),
    );
    let stream = harness.next_stream(
        "acc-1",
        "c1",
        vec![AccountEvent::opened("ann"), AccountEvent::deposited(5)],
    );

    harness.commit(stream, "cmd-1").await;

    assert_eq!(sync.after_calls(), 1);
    assert_eq!(harness.publisher.published().len(), 1);
    assert_eq!(harness.completion.results().len(), 1);
    assert_eq!(harness.completion.success_count(), 1);
}

/// Post-persist hook that panics on every event.
struct PanickingIndexer;

impl EventSynchronizer for PanickingIndexer {
    fn name(&self) -> &str {
        "panicking-indexer"
    }

    fn on_before_persisting(&self, _event: &SerializedEvent) -> Result<(), SynchronizerError> {
        Ok(())
    }

    fn on_after_persisted(&self, _event: &SerializedEvent) -> Result<(), SynchronizerError> {
        panic!("search index unreachable");
    }
}

#[tokio::test]
async fn test_post_persist_synchronizer_panic_keeps_success() {
    init_test_tracing();
    let harness = CommitHarness::with_synchronizers(
        SynchronizerRegistry::new().with("AccountOpened.v1", Arc::new(PanickingIndexer)),
    );
    let stream = harness.next_stream("acc-1", "c1", opened());

    harness.commit(stream.clone(), "cmd-1").await;

    assert_eq!(harness.store.append_calls(), 1);
    assert_eq!(harness.store.stream_count(), 1);
    assert_eq!(harness.publisher.published(), vec![stream]);
    assert_eq!(harness.completion.results().len(), 1);
    assert_eq!(harness.completion.success_count(), 1);
}

#[tokio::test]
async fn test_concurrent_deliveries_of_one_commit() {
    init_test_tracing();
    let harness = CommitHarness::new();
    harness.store.set_append_delay(Duration::from_millis(20));
    let stream = harness.next_stream("A1", "C1", opened());

    tokio::join!(
        harness.commit(stream.clone(), "cmd-1"),
        harness.commit(stream, "cmd-1"),
    );

    assert_eq!(harness.store.stream_count(), 1);
    assert_eq!(harness.completion.success_count(), 1);
    assert_eq!(harness.completion.results().len(), 1);
    assert_eq!(harness.publisher.published().len(), 1);
}

#[tokio::test]
async fn test_infrastructure_fault_is_retried_transparently() {
    init_test_tracing();
    let harness = CommitHarness::new();
    harness.store.fail_appends(2);
    let stream = harness.next_stream("acc-1", "c1", opened());

    harness.commit(stream, "cmd-1").await;

    assert_eq!(harness.store.append_calls(), 3);
    assert_eq!(harness.store.stream_count(), 1);
    assert_eq!(harness.completion.success_count(), 1);
}

#[tokio::test]
async fn test_persist_exhaustion_is_abandoned_by_default() {
    init_test_tracing();
    let harness = CommitHarness::new();
    harness.store.fail_appends(3);
    let stream = harness.next_stream("acc-1", "c1", opened());

    harness.commit(stream, "cmd-1").await;

    assert_eq!(harness.store.append_calls(), 3);
    assert_eq!(harness.store.stream_count(), 0);
    assert!(harness.completion.results().is_empty());
    assert_eq!(harness.publisher.publish_calls(), 0);
}

#[tokio::test]
async fn test_persist_exhaustion_notifies_when_configured() {
    init_test_tracing();
    let harness =
        CommitHarness::with_config(CommitConfig::default().with_on_exhausted(ExhaustedPolicy::NotifyFailed));
    harness.store.fail_appends(3);
    let stream = harness.next_stream("acc-1", "c1", opened());

    harness.commit(stream, "cmd-1").await;

    let results = harness.completion.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, CommandStatus::Failed);
    assert_eq!(results[0].error_kind.as_deref(), Some(failure_kind::COMMIT_ATTEMPTS_EXHAUSTED));
    assert!(
        results[0]
            .error_message
            .as_deref()
            .unwrap()
            .starts_with("PersistEvents failed after 3 attempts")
    );
}

#[tokio::test]
async fn test_commit_exhaustion_notifies_when_configured() {
    init_test_tracing();
    let sync = Arc::new(
        ScriptedSynchronizer::new("unique-owner")
            .failing_before(SynchronizerError::Concurrency("owner index busy".to_string())),
    );
    let harness = CommitHarness::build(
        SynchronizerRegistry::new().with("AccountOpened.v1", sync),
        CommitConfig::default().with_on_exhausted(ExhaustedPolicy::NotifyFailed),
    );
    let stream = harness.next_stream("acc-1", "c1", opened());

    harness.commit(stream, "cmd-1").await;

    let results = harness.completion.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].error_kind.as_deref(), Some(failure_kind::COMMIT_ATTEMPTS_EXHAUSTED));
    assert!(
        results[0]
            .error_message
            .as_deref()
            .unwrap()
            .starts_with("CommitEvents failed after 3 attempts")
    );
}

#[tokio::test]
async fn test_publish_exhaustion_is_never_reported() {
    init_test_tracing();
    let harness = CommitHarness::with_config(
        CommitConfig::default().with_on_exhausted(ExhaustedPolicy::NotifyFailed),
    );
    harness.publisher.fail_next(3);
    let stream = harness.next_stream("acc-1", "c1", opened());

    harness.commit(stream, "cmd-1").await;

    // The events are durable; reporting a failure would be wrong
    assert_eq!(harness.store.stream_count(), 1);
    assert_eq!(harness.publisher.publish_calls(), 3);
    assert!(harness.completion.results().is_empty());
}

#[tokio::test]
async fn test_publish_recovers_within_budget() {
    init_test_tracing();
    let harness = CommitHarness::new();
    harness.publisher.fail_next(2);
    let stream = harness.next_stream("acc-1", "c1", opened());

    harness.commit(stream, "cmd-1").await;

    assert_eq!(harness.publisher.publish_calls(), 3);
    assert_eq!(harness.publisher.published().len(), 1);
    assert_eq!(harness.completion.success_count(), 1);
}

#[tokio::test]
async fn test_context_items_reach_publisher_and_execute_context() {
    init_test_tracing();
    let harness = CommitHarness::new();
    let execute_context = Arc::new(RecordingExecuteContext::with_items(ContextItems::from([(
        "tenant".to_string(),
        "t-42".to_string(),
    )])));
    let command = ProcessingCommand::new(
        Arc::new(TestCommand::new("cmd-1", 3)),
        Arc::clone(&execute_context) as Arc<dyn CommandExecuteContext>,
    );
    let stream = harness.next_stream("acc-1", "c1", opened());

    harness.service.commit_event(harness.context(stream, command)).await;

    let items = harness.publisher.published_items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].get("tenant").map(String::as_str), Some("t-42"));

    let received = execute_context.results();
    assert_eq!(received.len(), 1);
    assert!(received[0].is_success());
}

/// Pipeline wired with the production retry service and bus publisher.
struct Wired {
    store: Arc<InMemoryEventStore>,
    bus_publisher: Arc<BusEventPublisher<RecordingEventBus>>,
    executor: Arc<RecordingCommandExecutor>,
    service: CommitEventService,
}

fn wired() -> anyhow::Result<Wired> {
    let store = Arc::new(InMemoryEventStore::new());
    let registry: Arc<dyn AggregateTypeRegistry> = Arc::new(fixtures::account_type_registry());
    let bus_publisher = Arc::new(BusEventPublisher::new(
        RecordingEventBus::new(),
        Arc::clone(&registry),
    ));
    let executor = Arc::new(RecordingCommandExecutor::new());
    let retry_service = Arc::new(RetryCommandService::new());
    retry_service.set_command_executor(Arc::clone(&executor) as Arc<dyn CommandExecutor>);

    let service = CommitEventService::builder()
        .event_store(Arc::clone(&store) as Arc<dyn EventStore>)
        .publisher(Arc::clone(&bus_publisher) as Arc<dyn EventPublisher>)
        .memory_cache(Arc::new(InMemoryMemoryCache::new()) as Arc<dyn MemoryCache>)
        .aggregate_storage(
            Arc::new(fixtures::account_storage(Arc::clone(&store))) as Arc<dyn AggregateStorage>
        )
        .type_registry(registry)
        .retry_trigger(retry_service)
        .build()?;

    Ok(Wired {
        store,
        bus_publisher,
        executor,
        service,
    })
}

#[tokio::test]
async fn test_wired_pipeline_publishes_on_aggregate_topic() -> anyhow::Result<()> {
    init_test_tracing();
    let wired = wired()?;
    let stream = fixtures::account_stream(
        "acc-1",
        "c1",
        1,
        vec![AccountEvent::opened("ann"), AccountEvent::deposited(5)],
    );

    wired
        .service
        .commit_event(fixtures::context(stream, fixtures::new_account("acc-1")))
        .await;

    let published = wired.bus_publisher.bus().published();
    assert_eq!(published.len(), 2);
    assert!(published.iter().all(|(topic, _)| topic == "account-events"));
    assert_eq!(published[0].1.metadata.as_ref().unwrap()["commit_id"], "c1");
    assert_eq!(wired.store.stream_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_wired_pipeline_resubmits_command_after_conflict() -> anyhow::Result<()> {
    init_test_tracing();
    let wired = wired()?;
    wired.store.seed(fixtures::account_stream("acc-1", "c1", 1, opened()));
    wired
        .store
        .seed(fixtures::account_stream("acc-1", "c2", 2, vec![AccountEvent::deposited(10)]));

    let stale = fixtures::account_stream("acc-1", "c9", 2, vec![AccountEvent::deposited(3)]);
    let mut account = fixtures::new_account("acc-1");
    commitflow_core::replay_events(&mut account, &wired.store.streams(&AggregateRootId::new("acc-1"))[..1])?;

    wired
        .service
        .commit_event(fixtures::context(stale, account))
        .await;

    let submitted = wired.executor.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].retried_count(), 1);
    assert!(wired.bus_publisher.bus().published().is_empty());
    Ok(())
}

/// Re-executes retried commands on another task and waits for that commit to finish.
struct Recommitter {
    requests: async_mpsc::UnboundedSender<ProcessingCommand>,
    finished: Mutex<mpsc::Receiver<()>>,
}

impl CommandExecutor for Recommitter {
    fn execute(&self, processing_command: ProcessingCommand) {
        self.requests.send(processing_command).unwrap();
        self.finished
            .lock()
            .unwrap()
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_retried_command_commits_while_conflicting_attempt_unwinds() -> anyhow::Result<()> {
    init_test_tracing();
    let store = Arc::new(InMemoryEventStore::new());
    store.seed(fixtures::account_stream("acc-1", "c1", 1, opened()));
    store.seed(fixtures::account_stream("acc-1", "c2", 2, vec![AccountEvent::deposited(10)]));

    let (requests, mut retried) = async_mpsc::unbounded_channel();
    let (finished_tx, finished_rx) = mpsc::channel();
    let retry_service = Arc::new(RetryCommandService::with_executor(Arc::new(Recommitter {
        requests,
        finished: Mutex::new(finished_rx),
    })));
    let completion = Arc::new(RecordingCompletionSink::new());

    let service = Arc::new(
        CommitEventService::builder()
            .event_store(Arc::clone(&store) as Arc<dyn EventStore>)
            .publisher(Arc::new(RecordingPublisher::new()) as Arc<dyn EventPublisher>)
            .memory_cache(Arc::new(InMemoryMemoryCache::new()) as Arc<dyn MemoryCache>)
            .aggregate_storage(
                Arc::new(fixtures::account_storage(Arc::clone(&store))) as Arc<dyn AggregateStorage>
            )
            .type_registry(Arc::new(fixtures::account_type_registry()))
            .retry_trigger(retry_service)
            .completion_sink(Arc::clone(&completion) as Arc<dyn CommandCompletionSink>)
            .build()?,
    );

    let worker = {
        let service = Arc::clone(&service);
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            if let Some(processing_command) = retried.recv().await {
                // Same commit id, computed against the refreshed version 2
                let stream =
                    fixtures::account_stream("acc-1", "c9", 3, vec![AccountEvent::deposited(3)]);
                let account = fixtures::stored_account(&store, "acc-1");
                let context = EventProcessingContext::new(stream, Arc::new(account), processing_command);
                service.commit_event(context).await;
                finished_tx.send(()).unwrap();
            }
        })
    };

    let stale = fixtures::account_stream("acc-1", "c9", 2, vec![AccountEvent::deposited(3)]);
    let mut account = fixtures::new_account("acc-1");
    commitflow_core::replay_events(&mut account, &store.streams(&AggregateRootId::new("acc-1"))[..1])?;
    service
        .commit_event(EventProcessingContext::new(stale, Arc::new(account), fixtures::processing_command("cmd-9", 3)))
        .await;

    tokio::time::timeout(Duration::from_secs(5), worker).await??;

    assert_eq!(store.stream_count(), 3);
    let results = completion.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, CommandStatus::Success);
    assert_eq!(results[0].command_id, "cmd-9");
    Ok(())
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn sequential_commits_keep_versions_contiguous(
            batches in prop::collection::vec(fixtures::deposits(), 1..6)
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                let harness = CommitHarness::new();
                harness.commit(harness.next_stream("acc-1", "open", opened()), "cmd-open").await;

                for (index, batch) in batches.iter().enumerate() {
                    let commit_id = format!("c{index}");
                    let stream = harness.next_stream("acc-1", &commit_id, batch.clone());
                    harness.commit(stream, &commit_id).await;
                }

                let expected = batches.len() as u64 + 1;
                let versions: Vec<u64> = harness
                    .store
                    .streams(&AggregateRootId::new("acc-1"))
                    .iter()
                    .map(|stream| stream.version().value())
                    .collect();

                prop_assert_eq!(versions, (1..=expected).collect::<Vec<_>>());
                prop_assert_eq!(harness.cache.version_of("acc-1"), Some(Version::new(expected)));
                prop_assert_eq!(harness.completion.success_count(), batches.len() + 1);
                Ok(())
            })?;
        }
    }
}
