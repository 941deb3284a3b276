//! In-memory collaborators for commit pipeline tests.
//!
//! Every double records what it was asked to do, so tests can assert on calls as well
//! as on state:
//! - [`InMemoryEventStore`]: version-checked, commit-id-deduplicating stream store
//! - [`InMemoryAggregateStorage`]: rebuilds aggregates by replaying the store
//! - [`InMemoryMemoryCache`]: `HashMap`-based aggregate cache
//! - [`RecordingPublisher`] / [`RecordingEventBus`]: capture published streams and events
//! - [`RecordingCompletionSink`], [`RecordingRetryTrigger`], [`RecordingCommandExecutor`]
//! - [`ScriptedSynchronizer`]: synchronizer with programmable failures

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only happens after a test already failed

use chrono::{DateTime, Utc};
use commitflow_core::aggregate::{AggregateRoot, AggregateType, AggregateTypeRegistry, replay_events};
use commitflow_core::cache::{AggregateStorage, MemoryCache, StorageError, StorageFuture};
use commitflow_core::command::{
    Command, CommandCompletionSink, CommandExecuteContext, CommandExecutor, CommandResult,
    CommandRetryTrigger, ContextItems, ProcessingCommand,
};
use commitflow_core::environment::Clock;
use commitflow_core::event::SerializedEvent;
use commitflow_core::event_bus::{EventBus, EventBusError, EventPublisher, PublishError, PublishFuture};
use commitflow_core::event_store::{AppendResult, EventStore, EventStoreError, StoreFuture};
use commitflow_core::event_stream::EventStream;
use commitflow_core::stream::{AggregateRootId, CommitId, Version};
use commitflow_core::synchronizer::{EventSynchronizer, SynchronizerError};
use std::collections::{HashMap, VecDeque};
use std::future::ready;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// Fixed clock for deterministic tests
///
/// Always returns the same time, making stream timestamps reproducible.
///
/// # Example
///
/// ```
/// use commitflow_testing::mocks::FixedClock;
/// use commitflow_core::environment::Clock;
/// use chrono::Utc;
///
/// let clock = FixedClock::new(Utc::now());
/// assert_eq!(clock.now(), clock.now());
/// ```
#[derive(Debug, Clone)]
pub struct FixedClock {
    time: DateTime<Utc>,
}

impl FixedClock {
    /// Create a new fixed clock with the given time
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self { time }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
    }
}

/// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
#[must_use]
#[allow(clippy::expect_used)]
pub fn test_clock() -> FixedClock {
    FixedClock::new(
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc),
    )
}

/// In-memory event store with the guarantees the pipeline relies on.
///
/// `append` is atomic per call:
/// - a stored commit id answers [`AppendResult::DuplicateCommit`]
/// - a version-1 stream for an existing aggregate is an identity conflict
/// - any other version that does not follow the stored one is a version conflict
///
/// Results can be scripted with [`script_append`](Self::script_append) /
/// [`script_find`](Self::script_find); scripted results are returned in order before
/// the real logic and leave the stored streams untouched.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<AggregateRootId, Vec<EventStream>>>,
    scripted_appends: Mutex<VecDeque<Result<AppendResult, EventStoreError>>>,
    scripted_finds: Mutex<VecDeque<Result<Option<EventStream>, EventStoreError>>>,
    append_delay: Mutex<Option<Duration>>,
    append_calls: AtomicUsize,
    find_calls: AtomicUsize,
}

impl InMemoryEventStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a stream without any check
    pub fn seed(&self, stream: EventStream) {
        let mut streams = self.streams.write().unwrap();
        let entry = streams.entry(stream.aggregate_root_id().clone()).or_default();
        entry.push(stream);
        entry.sort_by_key(EventStream::version);
    }

    /// Queue a result for the next unscripted `append`
    pub fn script_append(&self, result: Result<AppendResult, EventStoreError>) {
        self.scripted_appends.lock().unwrap().push_back(result);
    }

    /// Queue a result for the next unscripted `find`
    pub fn script_find(&self, result: Result<Option<EventStream>, EventStoreError>) {
        self.scripted_finds.lock().unwrap().push_back(result);
    }

    /// Make every `append` wait before touching the store
    pub fn set_append_delay(&self, delay: Duration) {
        *self.append_delay.lock().unwrap() = Some(delay);
    }

    /// Queue `count` infrastructure failures for `append`
    pub fn fail_appends(&self, count: usize) {
        for attempt in 0..count {
            self.script_append(Err(EventStoreError::DatabaseError(format!(
                "connection reset (scripted failure {attempt})"
            ))));
        }
    }

    /// Number of `append` calls
    #[must_use]
    pub fn append_calls(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }

    /// Number of `find` calls
    #[must_use]
    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    /// Stored streams of an aggregate, in version order
    #[must_use]
    pub fn streams(&self, aggregate_root_id: &AggregateRootId) -> Vec<EventStream> {
        self.streams
            .read()
            .unwrap()
            .get(aggregate_root_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Total number of stored streams
    #[must_use]
    pub fn stream_count(&self) -> usize {
        self.streams.read().unwrap().values().map(Vec::len).sum()
    }

    fn append_now(&self, stream: &EventStream) -> Result<AppendResult, EventStoreError> {
        if let Some(scripted) = self.scripted_appends.lock().unwrap().pop_front() {
            return scripted;
        }

        let mut streams = self.streams.write().unwrap();
        let stored = streams.entry(stream.aggregate_root_id().clone()).or_default();

        if stored.iter().any(|s| s.commit_id() == stream.commit_id()) {
            return Ok(AppendResult::DuplicateCommit);
        }

        let current = stored.last().map_or(Version::INITIAL, EventStream::version);
        if stream.version() == Version::new(1) && !current.is_initial() {
            return Err(EventStoreError::IdentityConflict {
                aggregate_root_id: stream.aggregate_root_id().clone(),
                type_code: stream.aggregate_root_type_code(),
            });
        }
        if stream.version() != current.next() {
            return Err(EventStoreError::VersionConflict {
                aggregate_root_id: stream.aggregate_root_id().clone(),
                expected: stream.version(),
                actual: current,
            });
        }

        stored.push(stream.clone());
        Ok(AppendResult::Success)
    }

    fn find_now(
        &self,
        aggregate_root_id: &AggregateRootId,
        commit_id: &CommitId,
    ) -> Result<Option<EventStream>, EventStoreError> {
        if let Some(scripted) = self.scripted_finds.lock().unwrap().pop_front() {
            return scripted;
        }

        Ok(self
            .streams
            .read()
            .unwrap()
            .get(aggregate_root_id)
            .and_then(|streams| streams.iter().find(|s| s.commit_id() == commit_id).cloned()))
    }
}

impl EventStore for InMemoryEventStore {
    fn append<'a>(&'a self, stream: &'a EventStream) -> StoreFuture<'a, AppendResult> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        let Some(delay) = *self.append_delay.lock().unwrap() else {
            return Box::pin(ready(self.append_now(stream)));
        };
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            self.append_now(stream)
        })
    }

    fn find<'a>(
        &'a self,
        aggregate_root_id: &'a AggregateRootId,
        commit_id: &'a CommitId,
    ) -> StoreFuture<'a, Option<EventStream>> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(ready(self.find_now(aggregate_root_id, commit_id)))
    }
}

/// Builds an empty aggregate of one type.
pub type AggregateFactory = Arc<dyn Fn(AggregateRootId) -> Box<dyn AggregateRoot> + Send + Sync>;

/// Aggregate storage that replays every stored stream of an [`InMemoryEventStore`].
pub struct InMemoryAggregateStorage {
    store: Arc<InMemoryEventStore>,
    factories: HashMap<i32, AggregateFactory>,
    get_count: AtomicUsize,
}

impl InMemoryAggregateStorage {
    /// Create a storage over a store, without any factory
    #[must_use]
    pub fn new(store: Arc<InMemoryEventStore>) -> Self {
        Self {
            store,
            factories: HashMap::new(),
            get_count: AtomicUsize::new(0),
        }
    }

    /// Register how to build an empty aggregate of a type code
    #[must_use]
    pub fn with_factory<F>(mut self, type_code: i32, factory: F) -> Self
    where
        F: Fn(AggregateRootId) -> Box<dyn AggregateRoot> + Send + Sync + 'static,
    {
        self.factories.insert(type_code, Arc::new(factory));
        self
    }

    /// Number of `get` calls
    #[must_use]
    pub fn get_count(&self) -> usize {
        self.get_count.load(Ordering::SeqCst)
    }

    fn load(
        &self,
        aggregate_type: &AggregateType,
        aggregate_root_id: &AggregateRootId,
    ) -> Result<Option<Box<dyn AggregateRoot>>, StorageError> {
        let factory = self
            .factories
            .get(&aggregate_type.code)
            .ok_or_else(|| StorageError::UnsupportedType(aggregate_type.name.clone()))?;

        let streams = self.store.streams(aggregate_root_id);
        if streams.is_empty() {
            return Ok(None);
        }

        let mut aggregate = factory(aggregate_root_id.clone());
        replay_events(aggregate.as_mut(), &streams).map_err(|e| StorageError::LoadFailed {
            aggregate_root_id: aggregate_root_id.clone(),
            reason: e.to_string(),
        })?;
        Ok(Some(aggregate))
    }
}

impl AggregateStorage for InMemoryAggregateStorage {
    fn get<'a>(
        &'a self,
        aggregate_type: &'a AggregateType,
        aggregate_root_id: &'a AggregateRootId,
    ) -> StorageFuture<'a> {
        self.get_count.fetch_add(1, Ordering::SeqCst);
        Box::pin(ready(self.load(aggregate_type, aggregate_root_id)))
    }
}

/// `HashMap`-based aggregate cache.
#[derive(Default)]
pub struct InMemoryMemoryCache {
    entries: RwLock<HashMap<AggregateRootId, Arc<dyn AggregateRoot>>>,
    set_count: AtomicUsize,
}

impl InMemoryMemoryCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached aggregate by id, whatever its type
    #[must_use]
    pub fn get_by_id(&self, aggregate_root_id: &AggregateRootId) -> Option<Arc<dyn AggregateRoot>> {
        self.entries.read().unwrap().get(aggregate_root_id).cloned()
    }

    /// Version of the cached aggregate
    #[must_use]
    pub fn version_of(&self, aggregate_root_id: &str) -> Option<Version> {
        self.get_by_id(&AggregateRootId::new(aggregate_root_id))
            .map(|aggregate| aggregate.version())
    }

    /// Number of `set` calls
    #[must_use]
    pub fn set_count(&self) -> usize {
        self.set_count.load(Ordering::SeqCst)
    }
}

impl MemoryCache for InMemoryMemoryCache {
    fn get(
        &self,
        aggregate_type: &AggregateType,
        aggregate_root_id: &AggregateRootId,
    ) -> Option<Arc<dyn AggregateRoot>> {
        self.get_by_id(aggregate_root_id)
            .filter(|aggregate| aggregate.type_name() == aggregate_type.name)
    }

    fn set(&self, aggregate: Arc<dyn AggregateRoot>) {
        self.set_count.fetch_add(1, Ordering::SeqCst);
        self.entries
            .write()
            .unwrap()
            .insert(aggregate.unique_id().clone(), aggregate);
    }
}

/// Type registry backed by a fixed map.
#[derive(Debug, Clone, Default)]
pub struct StaticTypeRegistry {
    types: HashMap<i32, AggregateType>,
}

impl StaticTypeRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type
    #[must_use]
    pub fn with(mut self, aggregate_type: AggregateType) -> Self {
        self.types.insert(aggregate_type.code, aggregate_type);
        self
    }
}

impl AggregateTypeRegistry for StaticTypeRegistry {
    fn resolve_type(&self, type_code: i32) -> Option<AggregateType> {
        self.types.get(&type_code).cloned()
    }
}

/// Publisher that captures every stream it is asked to publish.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(ContextItems, EventStream)>>,
    failures_remaining: AtomicUsize,
    publish_calls: AtomicUsize,
}

impl RecordingPublisher {
    /// Create a publisher that always succeeds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` publish calls
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Successfully published streams, in order
    #[must_use]
    pub fn published(&self) -> Vec<EventStream> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(_, stream)| stream.clone())
            .collect()
    }

    /// Context items passed along with each published stream
    #[must_use]
    pub fn published_items(&self) -> Vec<ContextItems> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(items, _)| items.clone())
            .collect()
    }

    /// Number of publish calls, failed ones included
    #[must_use]
    pub fn publish_calls(&self) -> usize {
        self.publish_calls.load(Ordering::SeqCst)
    }

    fn publish_now(&self, items: &ContextItems, stream: &EventStream) -> Result<(), PublishError> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PublishError::Other(format!("broker unavailable for {stream}")));
        }
        self.published
            .lock()
            .unwrap()
            .push((items.clone(), stream.clone()));
        Ok(())
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish<'a>(
        &'a self,
        items: &'a ContextItems,
        stream: &'a EventStream,
    ) -> PublishFuture<'a, PublishError> {
        Box::pin(ready(self.publish_now(items, stream)))
    }
}

/// Topic-based bus that captures `(topic, event)` pairs.
#[derive(Debug, Default)]
pub struct RecordingEventBus {
    published: Mutex<Vec<(String, SerializedEvent)>>,
    failures_remaining: AtomicUsize,
    fail_after: Mutex<Option<usize>>,
}

impl RecordingEventBus {
    /// Create a bus that always succeeds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` publish calls
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Let the next `passes` publish calls through, then fail exactly one
    pub fn fail_after(&self, passes: usize) {
        *self.fail_after.lock().unwrap() = Some(passes);
    }

    /// Successfully published events with their topic, in order
    #[must_use]
    pub fn published(&self) -> Vec<(String, SerializedEvent)> {
        self.published.lock().unwrap().clone()
    }

    fn publish_now(&self, topic: &str, event: &SerializedEvent) -> Result<(), EventBusError> {
        let scheduled = {
            let mut fail_after = self.fail_after.lock().unwrap();
            match *fail_after {
                Some(0) => {
                    *fail_after = None;
                    true
                }
                Some(passes) => {
                    *fail_after = Some(passes - 1);
                    false
                }
                None => false,
            }
        };
        let failing = scheduled
            || self
                .failures_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        if failing {
            return Err(EventBusError::PublishFailed {
                topic: topic.to_string(),
                reason: "scripted failure".to_string(),
            });
        }
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), event.clone()));
        Ok(())
    }
}

impl EventBus for RecordingEventBus {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        event: &'a SerializedEvent,
    ) -> PublishFuture<'a, EventBusError> {
        Box::pin(ready(self.publish_now(topic, event)))
    }
}

/// Completion sink that records every result.
#[derive(Debug, Default)]
pub struct RecordingCompletionSink {
    results: Mutex<Vec<CommandResult>>,
}

impl RecordingCompletionSink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded results, in notification order
    #[must_use]
    pub fn results(&self) -> Vec<CommandResult> {
        self.results.lock().unwrap().clone()
    }

    /// Number of successful results
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.results().iter().filter(|r| r.is_success()).count()
    }

    /// Number of failed results
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.results().iter().filter(|r| !r.is_success()).count()
    }
}

impl CommandCompletionSink for RecordingCompletionSink {
    fn notify_executed(
        &self,
        execute_context: &dyn CommandExecuteContext,
        command: &dyn Command,
        result: CommandResult,
    ) {
        self.results.lock().unwrap().push(result.clone());
        execute_context.on_command_executed(command, result);
    }
}

/// Retry trigger answering a fixed decision.
#[derive(Debug)]
pub struct RecordingRetryTrigger {
    accept: AtomicBool,
    retried: Mutex<Vec<ProcessingCommand>>,
}

impl RecordingRetryTrigger {
    /// Create a trigger that accepts (`true`) or refuses every retry
    #[must_use]
    pub const fn new(accept: bool) -> Self {
        Self {
            accept: AtomicBool::new(accept),
            retried: Mutex::new(Vec::new()),
        }
    }

    /// Change the decision
    pub fn set_accept(&self, accept: bool) {
        self.accept.store(accept, Ordering::SeqCst);
    }

    /// Number of `retry_command` calls
    #[must_use]
    pub fn calls(&self) -> usize {
        self.retried.lock().unwrap().len()
    }

    /// Commands passed to `retry_command`
    #[must_use]
    pub fn retried(&self) -> Vec<ProcessingCommand> {
        self.retried.lock().unwrap().clone()
    }
}

impl CommandRetryTrigger for RecordingRetryTrigger {
    fn retry_command(&self, processing_command: &ProcessingCommand) -> bool {
        self.retried.lock().unwrap().push(processing_command.clone());
        self.accept.load(Ordering::SeqCst)
    }
}

/// Command executor that records submissions instead of running them.
#[derive(Debug, Default)]
pub struct RecordingCommandExecutor {
    submitted: Mutex<Vec<ProcessingCommand>>,
}

impl RecordingCommandExecutor {
    /// Create an executor
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Submitted commands, in order
    #[must_use]
    pub fn submitted(&self) -> Vec<ProcessingCommand> {
        self.submitted.lock().unwrap().clone()
    }
}

impl CommandExecutor for RecordingCommandExecutor {
    fn execute(&self, processing_command: ProcessingCommand) {
        self.submitted.lock().unwrap().push(processing_command);
    }
}

/// Synchronizer with programmable failures.
///
/// Records the kind of every event it sees, prefixed with `before:` or `after:`.
#[derive(Debug)]
pub struct ScriptedSynchronizer {
    name: String,
    before_failure: Mutex<Option<SynchronizerError>>,
    after_failure: Mutex<Option<SynchronizerError>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedSynchronizer {
    /// Create a synchronizer that accepts everything
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            before_failure: Mutex::new(None),
            after_failure: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fail every pre-persist call with `error`
    #[must_use]
    pub fn failing_before(self, error: SynchronizerError) -> Self {
        *self.before_failure.lock().unwrap() = Some(error);
        self
    }

    /// Fail every post-persist call with `error`
    #[must_use]
    pub fn failing_after(self, error: SynchronizerError) -> Self {
        *self.after_failure.lock().unwrap() = Some(error);
        self
    }

    /// Recorded calls
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of pre-persist calls
    #[must_use]
    pub fn before_calls(&self) -> usize {
        self.calls().iter().filter(|c| c.starts_with("before:")).count()
    }

    /// Number of post-persist calls
    #[must_use]
    pub fn after_calls(&self) -> usize {
        self.calls().iter().filter(|c| c.starts_with("after:")).count()
    }
}

impl EventSynchronizer for ScriptedSynchronizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_before_persisting(&self, event: &SerializedEvent) -> Result<(), SynchronizerError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("before:{}", event.event_type));
        self.before_failure.lock().unwrap().clone().map_or(Ok(()), Err)
    }

    fn on_after_persisted(&self, event: &SerializedEvent) -> Result<(), SynchronizerError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("after:{}", event.event_type));
        self.after_failure.lock().unwrap().clone().map_or(Ok(()), Err)
    }
}

/// Minimal command.
#[derive(Debug, Clone)]
pub struct TestCommand {
    id: String,
    max_retry_count: u32,
}

impl TestCommand {
    /// Create a command with an id and a retry budget
    #[must_use]
    pub fn new(id: impl Into<String>, max_retry_count: u32) -> Self {
        Self {
            id: id.into(),
            max_retry_count,
        }
    }
}

impl Command for TestCommand {
    fn id(&self) -> &str {
        &self.id
    }

    fn command_type(&self) -> &'static str {
        "TestCommand"
    }

    fn max_retry_count(&self) -> u32 {
        self.max_retry_count
    }
}

/// Execute context that records the results it receives.
#[derive(Debug, Default)]
pub struct RecordingExecuteContext {
    items: ContextItems,
    results: Mutex<Vec<CommandResult>>,
}

impl RecordingExecuteContext {
    /// Create a context without items
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context carrying items
    #[must_use]
    pub fn with_items(items: ContextItems) -> Self {
        Self {
            items,
            results: Mutex::new(Vec::new()),
        }
    }

    /// Results received, in order
    #[must_use]
    pub fn results(&self) -> Vec<CommandResult> {
        self.results.lock().unwrap().clone()
    }
}

impl CommandExecuteContext for RecordingExecuteContext {
    fn items(&self) -> &ContextItems {
        &self.items
    }

    fn on_command_executed(&self, _command: &dyn Command, result: CommandResult) {
        self.results.lock().unwrap().push(result);
    }
}
