//! The commit pipeline.
//!
//! [`CommitEventService::commit_event`] takes the stream a command produced and drives
//! it through:
//!
//! ```text
//! pre-persist synchronizers
//!   └─ append (bounded retry)
//!        ├─ Appended         → replay cache → post-persist synchronizers → publish → Success
//!        ├─ Duplicate        → find stored stream
//!        │     ├─ found      → post-persist synchronizers → publish → Success
//!        │     └─ missing    → Failed
//!        ├─ VersionConflict  → re-fetch cache → retry command (or Failed when out of budget)
//!        └─ IdentityConflict → Failed
//! ```
//!
//! Every step returns its outcome as a value. The context is never mutated, so an
//! attempt can be re-run by the outer retry without leftovers from the previous one.
//!
//! The command layer hears about a commit exactly once, through the
//! [`CommandCompletionSink`]. When a retry budget runs out before a terminal branch is
//! reached, it hears nothing at all unless [`ExhaustedPolicy::NotifyFailed`] is configured.

use crate::cache_refresh::CacheRefresher;
use crate::completion::ExecutedCommandService;
use crate::config::CommitConfig;
use crate::error::{BuildError, CommitError};
use crate::metrics::CommitMetrics;
use crate::retry::{ActionExecutor, ExhaustedPolicy};
use commitflow_core::aggregate::AggregateTypeRegistry;
use commitflow_core::cache::{AggregateStorage, MemoryCache};
use commitflow_core::command::{CommandCompletionSink, CommandResult, CommandRetryTrigger, ProcessingCommand};
use commitflow_core::context::EventProcessingContext;
use commitflow_core::event_bus::EventPublisher;
use commitflow_core::event_store::{AppendResult, EventStore, EventStoreError, StoreErrorKind};
use commitflow_core::event_stream::EventStream;
use commitflow_core::stream::{AggregateRootId, CommitId, Version};
use commitflow_core::synchronizer::{SynchronizeOutcome, SynchronizerRegistry};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Error kinds reported by the pipeline itself (as opposed to kinds coming from
/// synchronizers or the store).
pub mod failure_kind {
    /// The store reported a duplicate commit but has no stream for it.
    pub const DUPLICATE_COMMIT_WITHOUT_RECORD: &str = "DuplicateCommitWithoutRecord";
    /// A version conflict happened and the command is out of retries.
    pub const RETRY_LIMIT_EXCEEDED: &str = "RetryLimitExceeded";
    /// A retry budget ran out before the commit reached a terminal outcome.
    pub const COMMIT_ATTEMPTS_EXHAUSTED: &str = "CommitAttemptsExhausted";
}

/// Classified result of one append.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PersistOutcome {
    Appended,
    Duplicate,
    VersionConflict,
    IdentityConflict { kind: String, message: String },
}

impl PersistOutcome {
    const fn label(&self) -> &'static str {
        match self {
            Self::Appended => "appended",
            Self::Duplicate => "duplicate",
            Self::VersionConflict => "version_conflict",
            Self::IdentityConflict { .. } => "identity_conflict",
        }
    }
}

/// A retried command reuses its commit id with a new version, so the version is part of the key.
type CommitKey = (AggregateRootId, CommitId, Version);

/// Marks a commit as in flight until dropped.
struct InFlight<'a> {
    commits: &'a Mutex<HashSet<CommitKey>>,
    key: CommitKey,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.commits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// Commits event streams and reports command outcomes.
///
/// One service is shared by every worker, and any number of `commit_event` calls may
/// run concurrently. Contention between writers of the same aggregate is resolved by
/// the store's version check alone. The only state kept is the set of streams in
/// flight, keyed by aggregate, commit id and version: a second delivery of a stream
/// that is still being processed is dropped, while a later re-delivery goes through
/// the duplicate-commit path. A command re-executed after a version conflict carries
/// the same commit id at a newer version and is never mistaken for a delivery.
///
/// # Example
///
/// ```rust,ignore
/// let service = CommitEventService::builder()
///     .event_store(store)
///     .publisher(publisher)
///     .memory_cache(cache)
///     .aggregate_storage(storage)
///     .type_registry(registry)
///     .retry_trigger(retry_service)
///     .build()?;
///
/// service.commit_event(context).await;
/// ```
pub struct CommitEventService {
    event_store: Arc<dyn EventStore>,
    publisher: Arc<dyn EventPublisher>,
    synchronizers: Arc<SynchronizerRegistry>,
    cache_refresher: CacheRefresher,
    retry_trigger: Arc<dyn CommandRetryTrigger>,
    completion_sink: Arc<dyn CommandCompletionSink>,
    executor: ActionExecutor,
    config: CommitConfig,
    in_flight: Mutex<HashSet<CommitKey>>,
}

impl CommitEventService {
    /// Start building a service.
    #[must_use]
    pub fn builder() -> CommitEventServiceBuilder {
        CommitEventServiceBuilder::default()
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &CommitConfig {
        &self.config
    }

    /// Commit the context's event stream.
    ///
    /// The outcome is only observable through the completion sink (and the store,
    /// cache and publisher side effects); nothing is returned.
    #[tracing::instrument(
        name = "commit_event",
        skip(self, context),
        fields(
            aggregate_root_id = %context.event_stream().aggregate_root_id(),
            commit_id = %context.event_stream().commit_id(),
            version = %context.event_stream().version(),
            command_id = context.processing_command().command().id(),
        )
    )]
    pub async fn commit_event(&self, context: EventProcessingContext) {
        let Some(_in_flight) = self.begin(context.event_stream()) else {
            tracing::warn!("Commit already in progress, dropping concurrent delivery");
            CommitMetrics::record_outcome("in_flight");
            return;
        };

        let committed = self
            .executor
            .try_action("CommitEvents", &self.config.commit, || self.commit_events(&context))
            .await;

        if committed.is_none() {
            self.on_exhausted(&context, "CommitEvents", self.config.commit.max_attempts);
        }
    }

    fn begin(&self, stream: &EventStream) -> Option<InFlight<'_>> {
        let key = (
            stream.aggregate_root_id().clone(),
            stream.commit_id().clone(),
            stream.version(),
        );
        let inserted = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());
        inserted.then_some(InFlight {
            commits: &self.in_flight,
            key,
        })
    }

    /// One commit attempt. `Err` hands the attempt back to the outer retry.
    async fn commit_events(&self, context: &EventProcessingContext) -> Result<(), CommitError> {
        CommitMetrics::record_attempt();
        let stream = context.event_stream();

        match self.synchronizers.before_persisting(stream) {
            SynchronizeOutcome::Success => {}
            SynchronizeOutcome::ConcurrencyRejected => {
                CommitMetrics::record_outcome("synchronizer_concurrency");
                return Err(CommitError::SynchronizerConcurrency);
            }
            SynchronizeOutcome::Failed { kind, message } => {
                CommitMetrics::record_outcome("synchronizer_rejected");
                self.notify_failed(context.processing_command(), stream, Some(kind), message);
                return Ok(());
            }
        }

        let Some(outcome) = self
            .executor
            .try_action("PersistEvents", &self.config.persist, || self.persist_events(stream))
            .await
        else {
            self.on_exhausted(context, "PersistEvents", self.config.persist.max_attempts);
            return Ok(());
        };

        CommitMetrics::record_outcome(outcome.label());

        match outcome {
            PersistOutcome::Appended => {
                self.cache_refresher.replay_refresh(context);
                self.synchronizers.after_persisted(stream);
                self.publish_events(context.processing_command(), stream).await;
            }
            PersistOutcome::Duplicate => {
                self.handle_duplicate(context).await?;
            }
            PersistOutcome::VersionConflict => {
                self.handle_version_conflict(context).await;
            }
            PersistOutcome::IdentityConflict { kind, message } => {
                tracing::error!(stream = %stream, error = %message, "Aggregate identity conflict");
                self.notify_failed(context.processing_command(), stream, Some(kind), message);
            }
        }

        Ok(())
    }

    /// Append the stream. Only infrastructure faults are errors; conflicts are outcomes.
    async fn persist_events(&self, stream: &EventStream) -> Result<PersistOutcome, EventStoreError> {
        let started = Instant::now();
        let result = self.event_store.append(stream).await;
        CommitMetrics::record_append(started.elapsed());

        match result {
            Ok(AppendResult::Success) => {
                tracing::debug!(stream = %stream, "Persisted event stream");
                Ok(PersistOutcome::Appended)
            }
            Ok(AppendResult::DuplicateCommit) => {
                tracing::debug!(stream = %stream, "Event stream already persisted");
                Ok(PersistOutcome::Duplicate)
            }
            Err(e) => match e.kind() {
                StoreErrorKind::VersionConflict => {
                    tracing::debug!(stream = %stream, error = %e, "Version conflict on append");
                    Ok(PersistOutcome::VersionConflict)
                }
                StoreErrorKind::IdentityConflict => Ok(PersistOutcome::IdentityConflict {
                    kind: e.kind_name().to_string(),
                    message: e.to_string(),
                }),
                StoreErrorKind::Infrastructure => Err(e),
            },
        }
    }

    async fn handle_duplicate(&self, context: &EventProcessingContext) -> Result<(), CommitError> {
        let stream = context.event_stream();
        let existing = self
            .event_store
            .find(stream.aggregate_root_id(), stream.commit_id())
            .await
            .map_err(CommitError::FindExisting)?;

        match existing {
            Some(existing) => {
                tracing::info!(
                    stream = %stream,
                    existing = %existing,
                    "Duplicate commit, completing with the stored event stream"
                );
                self.synchronizers.after_persisted(&existing);
                self.publish_events(context.processing_command(), &existing).await;
            }
            None => {
                let message = format!(
                    "Duplicate commit, but can't find the existing event stream from event store. commit_id:{}, aggregate_root_id:{}, aggregate_root_type_code:{}",
                    stream.commit_id(),
                    stream.aggregate_root_id(),
                    stream.aggregate_root_type_code(),
                );
                tracing::error!(stream = %stream, error = %message, "Duplicate commit without stored event stream");
                self.notify_failed(
                    context.processing_command(),
                    stream,
                    Some(failure_kind::DUPLICATE_COMMIT_WITHOUT_RECORD.to_string()),
                    message,
                );
            }
        }
        Ok(())
    }

    async fn handle_version_conflict(&self, context: &EventProcessingContext) {
        let stream = context.event_stream();
        self.cache_refresher.refetch_refresh(stream).await;

        let processing_command = context.processing_command();
        if self.retry_trigger.retry_command(processing_command) {
            return;
        }

        let command = processing_command.command();
        let message = format!(
            "{} [id:{}, aggregate_id:{}] retried count reached its max retry count {}.",
            command.command_type(),
            command.id(),
            stream.aggregate_root_id(),
            command.max_retry_count(),
        );
        self.notify_failed(
            processing_command,
            stream,
            Some(failure_kind::RETRY_LIMIT_EXCEEDED.to_string()),
            message,
        );
    }

    /// Publish, then report success. Nothing is reported if publishing is exhausted.
    async fn publish_events(&self, processing_command: &ProcessingCommand, stream: &EventStream) {
        let items = processing_command.execute_context().items();
        let published = self
            .executor
            .try_action("PublishEvents", &self.config.publish, || {
                self.publisher.publish(items, stream)
            })
            .await;

        if published.is_none() {
            tracing::error!(stream = %stream, "Giving up publishing committed event stream");
            return;
        }

        CommitMetrics::record_published();
        tracing::debug!(stream = %stream, "Published event stream");

        let result = CommandResult::success(
            processing_command.command().id(),
            stream.aggregate_root_id().clone(),
        );
        self.notify(processing_command, result);
    }

    fn on_exhausted(&self, context: &EventProcessingContext, action: &str, max_attempts: u32) {
        let stream = context.event_stream();
        match self.config.on_exhausted {
            ExhaustedPolicy::Abandon => {
                tracing::error!(
                    action,
                    stream = %stream,
                    "Commit abandoned, the command layer will not be notified"
                );
            }
            ExhaustedPolicy::NotifyFailed => {
                let message = format!(
                    "{action} failed after {} attempts. commit_id:{}, aggregate_root_id:{}",
                    max_attempts.max(1),
                    stream.commit_id(),
                    stream.aggregate_root_id(),
                );
                self.notify_failed(
                    context.processing_command(),
                    stream,
                    Some(failure_kind::COMMIT_ATTEMPTS_EXHAUSTED.to_string()),
                    message,
                );
            }
        }
    }

    fn notify_failed(
        &self,
        processing_command: &ProcessingCommand,
        stream: &EventStream,
        error_kind: Option<String>,
        error_message: String,
    ) {
        let result = CommandResult::failed(
            processing_command.command().id(),
            stream.aggregate_root_id().clone(),
            error_kind,
            error_message,
        );
        self.notify(processing_command, result);
    }

    fn notify(&self, processing_command: &ProcessingCommand, result: CommandResult) {
        self.completion_sink.notify_executed(
            processing_command.execute_context(),
            processing_command.command(),
            result,
        );
    }
}

impl std::fmt::Debug for CommitEventService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitEventService")
            .field("synchronizers", &self.synchronizers)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`CommitEventService`].
///
/// The store, publisher, cache, storage, type registry and retry trigger are required.
/// Synchronizers default to none, the completion sink to [`ExecutedCommandService`] and
/// the configuration to [`CommitConfig::default`].
#[derive(Default)]
pub struct CommitEventServiceBuilder {
    event_store: Option<Arc<dyn EventStore>>,
    publisher: Option<Arc<dyn EventPublisher>>,
    synchronizers: Option<Arc<SynchronizerRegistry>>,
    memory_cache: Option<Arc<dyn MemoryCache>>,
    aggregate_storage: Option<Arc<dyn AggregateStorage>>,
    type_registry: Option<Arc<dyn AggregateTypeRegistry>>,
    retry_trigger: Option<Arc<dyn CommandRetryTrigger>>,
    completion_sink: Option<Arc<dyn CommandCompletionSink>>,
    executor: Option<ActionExecutor>,
    config: Option<CommitConfig>,
}

impl CommitEventServiceBuilder {
    /// Set the event store.
    #[must_use]
    pub fn event_store(mut self, event_store: Arc<dyn EventStore>) -> Self {
        self.event_store = Some(event_store);
        self
    }

    /// Set the event publisher.
    #[must_use]
    pub fn publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Set the synchronizer registry.
    #[must_use]
    pub fn synchronizers(mut self, synchronizers: Arc<SynchronizerRegistry>) -> Self {
        self.synchronizers = Some(synchronizers);
        self
    }

    /// Set the shared aggregate cache.
    #[must_use]
    pub fn memory_cache(mut self, memory_cache: Arc<dyn MemoryCache>) -> Self {
        self.memory_cache = Some(memory_cache);
        self
    }

    /// Set the authoritative aggregate storage.
    #[must_use]
    pub fn aggregate_storage(mut self, aggregate_storage: Arc<dyn AggregateStorage>) -> Self {
        self.aggregate_storage = Some(aggregate_storage);
        self
    }

    /// Set the aggregate type registry.
    #[must_use]
    pub fn type_registry(mut self, type_registry: Arc<dyn AggregateTypeRegistry>) -> Self {
        self.type_registry = Some(type_registry);
        self
    }

    /// Set the command retry trigger.
    #[must_use]
    pub fn retry_trigger(mut self, retry_trigger: Arc<dyn CommandRetryTrigger>) -> Self {
        self.retry_trigger = Some(retry_trigger);
        self
    }

    /// Set the command completion sink.
    #[must_use]
    pub fn completion_sink(mut self, completion_sink: Arc<dyn CommandCompletionSink>) -> Self {
        self.completion_sink = Some(completion_sink);
        self
    }

    /// Set the action executor.
    #[must_use]
    pub const fn executor(mut self, executor: ActionExecutor) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn config(mut self, config: CommitConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the service.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::MissingCollaborator`] if a required collaborator is unset,
    /// or [`BuildError::InvalidConfig`] if the configuration does not validate.
    pub fn build(self) -> Result<CommitEventService, BuildError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let cache_refresher = CacheRefresher::new(
            self.memory_cache
                .ok_or(BuildError::MissingCollaborator("memory_cache"))?,
            self.aggregate_storage
                .ok_or(BuildError::MissingCollaborator("aggregate_storage"))?,
            self.type_registry
                .ok_or(BuildError::MissingCollaborator("type_registry"))?,
        );

        Ok(CommitEventService {
            event_store: self
                .event_store
                .ok_or(BuildError::MissingCollaborator("event_store"))?,
            publisher: self
                .publisher
                .ok_or(BuildError::MissingCollaborator("publisher"))?,
            synchronizers: self.synchronizers.unwrap_or_default(),
            cache_refresher,
            retry_trigger: self
                .retry_trigger
                .ok_or(BuildError::MissingCollaborator("retry_trigger"))?,
            completion_sink: self
                .completion_sink
                .unwrap_or_else(|| Arc::new(ExecutedCommandService::new())),
            executor: self.executor.unwrap_or_default(),
            config,
            in_flight: Mutex::new(HashSet::new()),
        })
    }
}
