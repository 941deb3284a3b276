//! Commands, their execution context and the completion/retry contracts.
//!
//! The commit pipeline never executes commands itself. It receives the command that
//! produced a stream (wrapped in a [`ProcessingCommand`]) and eventually reports one
//! [`CommandResult`] for it, or hands it back for re-execution after a version conflict.

use crate::stream::AggregateRootId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Free-form key/value items carried by a command's execution context.
pub type ContextItems = HashMap<String, String>;

/// A command as seen by the commit pipeline.
pub trait Command: Send + Sync + fmt::Debug {
    /// Unique command id.
    fn id(&self) -> &str;

    /// Command type name, used in messages.
    fn command_type(&self) -> &'static str;

    /// Maximum number of re-executions after version conflicts.
    fn max_retry_count(&self) -> u32;
}

/// Final status of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandStatus {
    /// Events were committed (or were already committed).
    Success,
    /// The command was rejected or could not be committed.
    Failed,
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "Success"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// The outcome reported to the command layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Id of the command.
    pub command_id: String,
    /// Final status.
    pub status: CommandStatus,
    /// Aggregate the command targeted.
    pub aggregate_root_id: AggregateRootId,
    /// Machine-readable kind of the failure, when known.
    pub error_kind: Option<String>,
    /// Human-readable failure message.
    pub error_message: Option<String>,
}

impl CommandResult {
    /// A successful outcome.
    #[must_use]
    pub fn success(command_id: impl Into<String>, aggregate_root_id: AggregateRootId) -> Self {
        Self {
            command_id: command_id.into(),
            status: CommandStatus::Success,
            aggregate_root_id,
            error_kind: None,
            error_message: None,
        }
    }

    /// A failed outcome.
    #[must_use]
    pub fn failed(
        command_id: impl Into<String>,
        aggregate_root_id: AggregateRootId,
        error_kind: Option<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            command_id: command_id.into(),
            status: CommandStatus::Failed,
            aggregate_root_id,
            error_kind,
            error_message: Some(error_message.into()),
        }
    }

    /// Whether the command succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == CommandStatus::Success
    }
}

/// Per-command execution context owned by the command layer.
pub trait CommandExecuteContext: Send + Sync {
    /// Items propagated to the publisher.
    fn items(&self) -> &ContextItems;

    /// Called once with the final result of the command.
    fn on_command_executed(&self, command: &dyn Command, result: CommandResult);
}

/// A command in flight, together with its execution context.
#[derive(Clone)]
pub struct ProcessingCommand {
    command: Arc<dyn Command>,
    execute_context: Arc<dyn CommandExecuteContext>,
    retried_count: u32,
}

impl ProcessingCommand {
    /// Wrap a command for its first execution.
    #[must_use]
    pub fn new(command: Arc<dyn Command>, execute_context: Arc<dyn CommandExecuteContext>) -> Self {
        Self {
            command,
            execute_context,
            retried_count: 0,
        }
    }

    /// The command.
    #[must_use]
    pub fn command(&self) -> &dyn Command {
        self.command.as_ref()
    }

    /// The execution context.
    #[must_use]
    pub fn execute_context(&self) -> &dyn CommandExecuteContext {
        self.execute_context.as_ref()
    }

    /// How many times the command was re-executed so far.
    #[must_use]
    pub const fn retried_count(&self) -> u32 {
        self.retried_count
    }

    /// Whether another re-execution is allowed by the command's retry budget.
    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.retried_count < self.command.max_retry_count()
    }

    /// The same command, counted as one more re-execution.
    #[must_use]
    pub fn next_attempt(&self) -> Self {
        Self {
            command: Arc::clone(&self.command),
            execute_context: Arc::clone(&self.execute_context),
            retried_count: self.retried_count + 1,
        }
    }
}

impl fmt::Debug for ProcessingCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingCommand")
            .field("command", &self.command)
            .field("retried_count", &self.retried_count)
            .finish_non_exhaustive()
    }
}

/// Terminal sink for command outcomes.
pub trait CommandCompletionSink: Send + Sync {
    /// Report the final result of a command.
    fn notify_executed(
        &self,
        execute_context: &dyn CommandExecuteContext,
        command: &dyn Command,
        result: CommandResult,
    );
}

/// Hands a command back for re-execution after a version conflict.
pub trait CommandRetryTrigger: Send + Sync {
    /// Returns `false` if the command's retry budget is exhausted.
    fn retry_command(&self, processing_command: &ProcessingCommand) -> bool;
}

/// Executes (or re-executes) commands.
pub trait CommandExecutor: Send + Sync {
    /// Submit a command for execution.
    fn execute(&self, processing_command: ProcessingCommand);
}
