//! Publishing contracts for committed event streams.
//!
//! Events flow from the event store (source of truth) to the publishing subsystem
//! only after they are durably committed:
//!
//! ```text
//! ┌─────────────────┐
//! │  1. Append to   │
//! │   event store   │◄─── Source of truth
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ 2. Publish the  │
//! │  whole stream   │◄─── At-least-once delivery
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ 3. Notify the   │
//! │  command layer  │
//! └─────────────────┘
//! ```
//!
//! Publishing is retried by the pipeline, so consumers see every stream at least once
//! and must deduplicate on the commit id.
//!
//! Two levels are defined:
//!
//! - [`EventPublisher`]: what the pipeline calls, one whole stream at a time
//! - [`EventBus`]: a topic-based transport; the runtime crate adapts any bus into a
//!   publisher using the `{aggregate-type}-events` topic convention

use crate::command::ContextItems;
use crate::event::SerializedEvent;
use crate::event_stream::EventStream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors from a topic-based event bus.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish an event to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Topic not found or invalid
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),
}

/// Errors from publishing a committed stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The underlying bus rejected an event.
    #[error(transparent)]
    Bus(#[from] EventBusError),

    /// The stream could not be encoded for transport.
    #[error("Failed to encode stream for publishing: {0}")]
    Encoding(String),

    /// Publisher-specific failure.
    #[error("Publish failed: {0}")]
    Other(String),
}

/// Boxed future returned by publishing operations.
pub type PublishFuture<'a, E> = Pin<Box<dyn Future<Output = Result<(), E>> + Send + 'a>>;

/// Sends committed streams to the publishing subsystem.
pub trait EventPublisher: Send + Sync {
    /// Publish one committed stream.
    ///
    /// `items` are the execute-context items of the command that produced the stream.
    ///
    /// # Errors
    ///
    /// Returns a [`PublishError`] if the stream could not be handed off.
    fn publish<'a>(
        &'a self,
        items: &'a ContextItems,
        stream: &'a EventStream,
    ) -> PublishFuture<'a, PublishError>;
}

/// Topic-based transport for single events.
pub trait EventBus: Send + Sync {
    /// Publish an event to a topic.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the publish operation fails.
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        event: &'a SerializedEvent,
    ) -> PublishFuture<'a, EventBusError>;
}
