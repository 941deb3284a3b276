//! The unit of commit: all events one command produced for one aggregate.

use crate::event::SerializedEvent;
use crate::stream::{AggregateRootId, CommitId, Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Errors raised when constructing an [`EventStream`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventStreamError {
    /// A stream must carry at least one event.
    #[error("Event stream for aggregate {0} has no events")]
    Empty(AggregateRootId),

    /// Stream versions start at 1.
    #[error("Event stream for aggregate {0} has version 0")]
    InitialVersion(AggregateRootId),
}

/// Ordered, non-empty sequence of events for one aggregate instance.
///
/// Immutable once constructed. Every retry of the same commit attempt reuses the same
/// stream (and therefore the same [`CommitId`]).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventStream {
    commit_id: CommitId,
    aggregate_root_id: AggregateRootId,
    aggregate_root_type_code: i32,
    version: Version,
    timestamp: DateTime<Utc>,
    events: Vec<SerializedEvent>,
    items: HashMap<String, String>,
}

impl EventStream {
    /// Build a stream.
    ///
    /// # Errors
    ///
    /// - [`EventStreamError::Empty`] if `events` is empty
    /// - [`EventStreamError::InitialVersion`] if `version` is 0
    pub fn new(
        commit_id: CommitId,
        aggregate_root_id: AggregateRootId,
        aggregate_root_type_code: i32,
        version: Version,
        timestamp: DateTime<Utc>,
        events: Vec<SerializedEvent>,
    ) -> Result<Self, EventStreamError> {
        if events.is_empty() {
            return Err(EventStreamError::Empty(aggregate_root_id));
        }
        if version.is_initial() {
            return Err(EventStreamError::InitialVersion(aggregate_root_id));
        }
        Ok(Self {
            commit_id,
            aggregate_root_id,
            aggregate_root_type_code,
            version,
            timestamp,
            events,
            items: HashMap::new(),
        })
    }

    /// Attach storage-level key/value items.
    #[must_use]
    pub fn with_items(mut self, items: HashMap<String, String>) -> Self {
        self.items = items;
        self
    }

    /// Commit id of the attempt that produced this stream.
    #[must_use]
    pub const fn commit_id(&self) -> &CommitId {
        &self.commit_id
    }

    /// Aggregate this stream belongs to.
    #[must_use]
    pub const fn aggregate_root_id(&self) -> &AggregateRootId {
        &self.aggregate_root_id
    }

    /// Integer tag of the aggregate type, resolved through the type registry.
    #[must_use]
    pub const fn aggregate_root_type_code(&self) -> i32 {
        self.aggregate_root_type_code
    }

    /// The version this stream moves the aggregate to.
    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// When the stream was produced.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Events in commit order.
    #[must_use]
    pub fn events(&self) -> &[SerializedEvent] {
        &self.events
    }

    /// Storage-level key/value items.
    #[must_use]
    pub const fn items(&self) -> &HashMap<String, String> {
        &self.items
    }

    /// Event kind tags in stream order.
    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.events.iter().map(|e| e.event_type.as_str())
    }
}

impl fmt::Display for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[aggregate_root_id={}, type_code={}, commit_id={}, version={}, events={}]",
            self.aggregate_root_id,
            self.aggregate_root_type_code,
            self.commit_id,
            self.version,
            self.event_types().collect::<Vec<_>>().join("|")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: &str) -> SerializedEvent {
        SerializedEvent::new(kind.to_string(), vec![1], None)
    }

    #[test]
    fn rejects_empty_stream() {
        let result = EventStream::new(
            CommitId::new("c1"),
            AggregateRootId::new("a1"),
            1,
            Version::new(1),
            Utc::now(),
            vec![],
        );
        assert_eq!(
            result,
            Err(EventStreamError::Empty(AggregateRootId::new("a1")))
        );
    }

    #[test]
    fn rejects_version_zero() {
        let result = EventStream::new(
            CommitId::new("c1"),
            AggregateRootId::new("a1"),
            1,
            Version::INITIAL,
            Utc::now(),
            vec![event("A.v1")],
        );
        assert!(matches!(result, Err(EventStreamError::InitialVersion(_))));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn display_lists_event_types_in_order() {
        let stream = EventStream::new(
            CommitId::new("c1"),
            AggregateRootId::new("a1"),
            7,
            Version::new(3),
            Utc::now(),
            vec![event("A.v1"), event("B.v1")],
        )
        .unwrap();

        assert_eq!(
            stream.to_string(),
            "[aggregate_root_id=a1, type_code=7, commit_id=c1, version=3, events=A.v1|B.v1]"
        );
    }
}
