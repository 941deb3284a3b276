//! The per-attempt record handed to the commit pipeline.

use crate::aggregate::AggregateRoot;
use crate::command::ProcessingCommand;
use crate::event_stream::EventStream;
use std::fmt;
use std::sync::Arc;

/// Everything one commit attempt needs: the stream to commit, the aggregate as it was
/// before the stream, and the command that produced it.
///
/// Created once per attempt by the command-execution layer and consumed by
/// `CommitEventService::commit_event`. Outcomes are never written back into the
/// context; each pipeline step returns its own result value.
pub struct EventProcessingContext {
    event_stream: EventStream,
    aggregate_root: Arc<dyn AggregateRoot>,
    processing_command: ProcessingCommand,
}

impl EventProcessingContext {
    /// Bind a stream, its aggregate and its command.
    #[must_use]
    pub fn new(
        event_stream: EventStream,
        aggregate_root: Arc<dyn AggregateRoot>,
        processing_command: ProcessingCommand,
    ) -> Self {
        Self {
            event_stream,
            aggregate_root,
            processing_command,
        }
    }

    /// The stream being committed.
    #[must_use]
    pub const fn event_stream(&self) -> &EventStream {
        &self.event_stream
    }

    /// The aggregate before the stream is applied.
    #[must_use]
    pub fn aggregate_root(&self) -> &dyn AggregateRoot {
        self.aggregate_root.as_ref()
    }

    /// The command that produced the stream.
    #[must_use]
    pub const fn processing_command(&self) -> &ProcessingCommand {
        &self.processing_command
    }
}

impl fmt::Debug for EventProcessingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventProcessingContext")
            .field("event_stream", &self.event_stream.to_string())
            .field("aggregate_root", &self.aggregate_root)
            .field("processing_command", &self.processing_command)
            .finish()
    }
}
