//! Adapter from a topic-based [`EventBus`] to the stream-level [`EventPublisher`].
//!
//! # Topic Naming Convention
//!
//! Topics follow the pattern `{aggregate-type}-events`, lower-cased:
//! - `account-events` for streams of the `Account` aggregate
//! - `aggregate-{code}-events` when the type code is not registered
//!
//! Every event of a stream is published in stream order, with its metadata stamped
//! so consumers can deduplicate on `commit_id`:
//!
//! ```json
//! {
//!   "aggregate_root_id": "acc-1",
//!   "commit_id": "c1",
//!   "version": 3,
//!   "sequence": 0,
//!   "timestamp": "2025-01-01T00:00:00+00:00",
//!   "items": { "tenant": "t1" }
//! }
//! ```
//!
//! Existing object metadata is kept; the stamps are merged into it.
//!
//! # Delivery
//!
//! Delivery is at least once. When the bus fails on event *k* the whole stream is
//! published again on the next attempt, so events `0..k` reach the bus twice with
//! identical stamps. Consumers deduplicate on `(commit_id, sequence)`. A duplicate
//! commit re-publishes the stored stream the same way.

use commitflow_core::aggregate::AggregateTypeRegistry;
use commitflow_core::command::ContextItems;
use commitflow_core::event::SerializedEvent;
use commitflow_core::event_bus::{EventBus, EventPublisher, PublishError, PublishFuture};
use commitflow_core::event_stream::EventStream;
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// Publishes committed streams event by event on an [`EventBus`].
///
/// A failed publish may leave a prefix of the stream on the bus; see the module docs
/// for the redelivery contract.
pub struct BusEventPublisher<B> {
    bus: B,
    type_registry: Arc<dyn AggregateTypeRegistry>,
}

impl<B: EventBus> BusEventPublisher<B> {
    /// Create a publisher over a bus. The registry names topics.
    #[must_use]
    pub fn new(bus: B, type_registry: Arc<dyn AggregateTypeRegistry>) -> Self {
        Self { bus, type_registry }
    }

    /// The underlying bus.
    #[must_use]
    pub const fn bus(&self) -> &B {
        &self.bus
    }

    /// Topic a stream is published to.
    #[must_use]
    pub fn topic_for(&self, stream: &EventStream) -> String {
        let code = stream.aggregate_root_type_code();
        self.type_registry.resolve_type(code).map_or_else(
            || format!("aggregate-{code}-events"),
            |aggregate_type| format!("{}-events", aggregate_type.name.to_lowercase()),
        )
    }
}

fn stamp(event: &SerializedEvent, sequence: usize, items: &ContextItems, stream: &EventStream) -> SerializedEvent {
    let mut metadata = match &event.metadata {
        Some(Value::Object(map)) => map.clone(),
        Some(other) => {
            let mut map = Map::new();
            map.insert("payload".to_string(), other.clone());
            map
        }
        None => Map::new(),
    };
    metadata.insert("aggregate_root_id".to_string(), json!(stream.aggregate_root_id().as_str()));
    metadata.insert("commit_id".to_string(), json!(stream.commit_id().as_str()));
    metadata.insert("version".to_string(), json!(stream.version().value()));
    metadata.insert("sequence".to_string(), json!(sequence));
    metadata.insert("timestamp".to_string(), json!(stream.timestamp().to_rfc3339()));
    metadata.insert("items".to_string(), json!(items));

    SerializedEvent::new(
        event.event_type.clone(),
        event.data.clone(),
        Some(Value::Object(metadata)),
    )
}

impl<B: EventBus> EventPublisher for BusEventPublisher<B> {
    fn publish<'a>(
        &'a self,
        items: &'a ContextItems,
        stream: &'a EventStream,
    ) -> PublishFuture<'a, PublishError> {
        Box::pin(async move {
            let topic = self.topic_for(stream);
            for (sequence, event) in stream.events().iter().enumerate() {
                let stamped = stamp(event, sequence, items, stream);
                self.bus.publish(&topic, &stamped).await?;
            }
            tracing::debug!(topic = %topic, stream = %stream, "Published event stream");
            Ok(())
        })
    }
}
