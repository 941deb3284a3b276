//! Terminal reporting of command outcomes.

use crate::metrics::CommandMetrics;
use commitflow_core::command::{
    Command, CommandCompletionSink, CommandExecuteContext, CommandResult, CommandStatus,
};

/// Default [`CommandCompletionSink`]: logs the outcome and forwards it to the
/// command's execute context.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutedCommandService;

impl ExecutedCommandService {
    /// Create the service.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl CommandCompletionSink for ExecutedCommandService {
    fn notify_executed(
        &self,
        execute_context: &dyn CommandExecuteContext,
        command: &dyn Command,
        result: CommandResult,
    ) {
        match result.status {
            CommandStatus::Success => {
                tracing::debug!(
                    command_id = command.id(),
                    command_type = command.command_type(),
                    aggregate_root_id = %result.aggregate_root_id,
                    "Command executed"
                );
                CommandMetrics::record_result("success");
            }
            CommandStatus::Failed => {
                tracing::warn!(
                    command_id = command.id(),
                    command_type = command.command_type(),
                    aggregate_root_id = %result.aggregate_root_id,
                    error_kind = result.error_kind.as_deref().unwrap_or("-"),
                    error = result.error_message.as_deref().unwrap_or("-"),
                    "Command failed"
                );
                CommandMetrics::record_result("failed");
            }
        }
        execute_context.on_command_executed(command, result);
    }
}
