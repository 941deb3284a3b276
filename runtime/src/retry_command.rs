//! Re-execution of commands after a version conflict.
//!
//! When the store rejects a stream because another writer got there first, the
//! command is handed back to the command executor. It then runs against the
//! now-current aggregate and produces a new stream with a new version. The number of
//! re-executions is bounded by the command's own `max_retry_count`.

use crate::metrics::CommandMetrics;
use commitflow_core::command::{CommandExecutor, CommandRetryTrigger, ProcessingCommand};
use std::sync::{Arc, OnceLock};

/// [`CommandRetryTrigger`] that re-submits commands to a [`CommandExecutor`].
///
/// The executor is usually built after the commit pipeline it feeds, so it can be
/// attached later with [`set_command_executor`](Self::set_command_executor).
#[derive(Default)]
pub struct RetryCommandService {
    executor: OnceLock<Arc<dyn CommandExecutor>>,
}

impl RetryCommandService {
    /// Create a service without executor.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            executor: OnceLock::new(),
        }
    }

    /// Create a service bound to an executor.
    #[must_use]
    pub fn with_executor(executor: Arc<dyn CommandExecutor>) -> Self {
        let service = Self::new();
        service.set_command_executor(executor);
        service
    }

    /// Attach the command executor. Only the first call has an effect.
    pub fn set_command_executor(&self, executor: Arc<dyn CommandExecutor>) {
        if self.executor.set(executor).is_err() {
            tracing::warn!("Command executor already set, ignoring replacement");
        }
    }
}

impl CommandRetryTrigger for RetryCommandService {
    fn retry_command(&self, processing_command: &ProcessingCommand) -> bool {
        if !processing_command.can_retry() {
            return false;
        }

        let Some(executor) = self.executor.get() else {
            tracing::error!(
                command_id = processing_command.command().id(),
                "No command executor configured, cannot retry command"
            );
            return false;
        };

        let next = processing_command.next_attempt();
        tracing::info!(
            command_id = next.command().id(),
            command_type = next.command().command_type(),
            retried_count = next.retried_count(),
            max_retry_count = next.command().max_retry_count(),
            "Retrying command after version conflict"
        );
        CommandMetrics::record_retry();
        executor.execute(next);
        true
    }
}

impl std::fmt::Debug for RetryCommandService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryCommandService")
            .field("has_executor", &self.executor.get().is_some())
            .finish()
    }
}
