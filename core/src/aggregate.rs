//! Aggregate roots, event-sourcing replay and the aggregate type registry.
//!
//! An aggregate root's state is derived by replaying its event streams in version
//! order. [`replay_events`] enforces that order: a stream is only applied when it
//! continues exactly from the aggregate's current version, so a replayed aggregate
//! can never move backwards.

use crate::event::{EventError, SerializedEvent};
use crate::event_stream::EventStream;
use crate::stream::{AggregateRootId, Version};
use std::fmt;
use thiserror::Error;

/// An in-memory, event-sourced entity.
///
/// Implementations are plain state holders: `apply_event` mutates state for one event,
/// and the version bookkeeping is done by [`replay_events`].
pub trait AggregateRoot: Send + Sync + fmt::Debug {
    /// The aggregate's unique id.
    fn unique_id(&self) -> &AggregateRootId;

    /// Version of the last stream applied (0 for a fresh aggregate).
    fn version(&self) -> Version;

    /// Runtime type name (used for cache keys and log lines).
    fn type_name(&self) -> &'static str;

    /// Apply one event to the state.
    ///
    /// # Errors
    ///
    /// Returns an [`EventError`] if the event cannot be decoded or is unknown.
    fn apply_event(&mut self, event: &SerializedEvent) -> Result<(), EventError>;

    /// Record the version reached after applying a stream.
    fn set_version(&mut self, version: Version);

    /// Clone into a fresh boxed instance.
    fn boxed_clone(&self) -> Box<dyn AggregateRoot>;
}

/// Errors raised by [`replay_events`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplayError {
    /// The stream belongs to a different aggregate.
    #[error("Stream for aggregate {stream} cannot be applied to aggregate {aggregate}")]
    AggregateIdMismatch {
        /// Id of the aggregate being replayed onto.
        aggregate: AggregateRootId,
        /// Id carried by the stream.
        stream: AggregateRootId,
    },

    /// The stream does not continue from the aggregate's current version.
    #[error("Cannot apply stream version {actual} to aggregate {aggregate_root_id}, expected version {expected}")]
    VersionMismatch {
        /// The aggregate being replayed onto.
        aggregate_root_id: AggregateRootId,
        /// The only stream version the aggregate accepts.
        expected: Version,
        /// The version carried by the stream.
        actual: Version,
    },

    /// An event in the stream could not be applied.
    #[error(transparent)]
    Event(#[from] EventError),
}

/// Replay streams onto an aggregate, in order.
///
/// Each stream must belong to the aggregate and carry version `aggregate.version() + 1`.
/// The aggregate's version is only advanced once every event of a stream was applied.
///
/// # Errors
///
/// Returns the first [`ReplayError`] encountered. Streams before the failing one stay applied.
pub fn replay_events<'a>(
    aggregate: &mut dyn AggregateRoot,
    streams: impl IntoIterator<Item = &'a EventStream>,
) -> Result<(), ReplayError> {
    for stream in streams {
        if stream.aggregate_root_id() != aggregate.unique_id() {
            return Err(ReplayError::AggregateIdMismatch {
                aggregate: aggregate.unique_id().clone(),
                stream: stream.aggregate_root_id().clone(),
            });
        }
        let expected = aggregate.version().next();
        if stream.version() != expected {
            return Err(ReplayError::VersionMismatch {
                aggregate_root_id: aggregate.unique_id().clone(),
                expected,
                actual: stream.version(),
            });
        }
        for event in stream.events() {
            aggregate.apply_event(event)?;
        }
        aggregate.set_version(stream.version());
    }
    Ok(())
}

/// A resolved aggregate type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AggregateType {
    /// Integer tag stored with every stream.
    pub code: i32,
    /// Runtime type name, matching [`AggregateRoot::type_name`].
    pub name: String,
}

impl AggregateType {
    /// Create a new aggregate type descriptor.
    #[must_use]
    pub fn new(code: i32, name: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
        }
    }
}

impl fmt::Display for AggregateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.code)
    }
}

/// Maps aggregate type codes to aggregate types.
pub trait AggregateTypeRegistry: Send + Sync {
    /// Resolve a type code. `None` if the code is unknown.
    fn resolve_type(&self, type_code: i32) -> Option<AggregateType>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::stream::CommitId;
    use proptest::prelude::*;

    #[derive(Clone, Debug)]
    struct Tally {
        id: AggregateRootId,
        version: Version,
        applied: Vec<String>,
    }

    impl AggregateRoot for Tally {
        fn unique_id(&self) -> &AggregateRootId {
            &self.id
        }
        fn version(&self) -> Version {
            self.version
        }
        fn type_name(&self) -> &'static str {
            "Tally"
        }
        fn apply_event(&mut self, event: &SerializedEvent) -> Result<(), EventError> {
            if event.event_type == "Poison.v1" {
                return Err(EventError::UnknownEventType(event.event_type.clone()));
            }
            self.applied.push(event.event_type.clone());
            Ok(())
        }
        fn set_version(&mut self, version: Version) {
            self.version = version;
        }
        fn boxed_clone(&self) -> Box<dyn AggregateRoot> {
            Box::new(self.clone())
        }
    }

    fn tally() -> Tally {
        Tally {
            id: AggregateRootId::new("t1"),
            version: Version::INITIAL,
            applied: Vec::new(),
        }
    }

    fn stream(id: &str, version: u64, kinds: &[&str]) -> EventStream {
        EventStream::new(
            CommitId::new(format!("c{version}")),
            AggregateRootId::new(id),
            1,
            Version::new(version),
            Utc::now(),
            kinds
                .iter()
                .map(|k| SerializedEvent::new((*k).to_string(), vec![], None))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn replays_consecutive_streams() {
        let mut t = tally();
        let s1 = stream("t1", 1, &["A.v1", "B.v1"]);
        let s2 = stream("t1", 2, &["C.v1"]);

        replay_events(&mut t, [&s1, &s2]).unwrap();

        assert_eq!(t.version, Version::new(2));
        assert_eq!(t.applied, vec!["A.v1", "B.v1", "C.v1"]);
    }

    #[test]
    fn rejects_gap_in_versions() {
        let mut t = tally();
        let s2 = stream("t1", 2, &["A.v1"]);

        let err = replay_events(&mut t, [&s2]).unwrap_err();

        assert_eq!(
            err,
            ReplayError::VersionMismatch {
                aggregate_root_id: AggregateRootId::new("t1"),
                expected: Version::new(1),
                actual: Version::new(2),
            }
        );
        assert!(t.applied.is_empty());
    }

    #[test]
    fn rejects_foreign_stream() {
        let mut t = tally();
        let other = stream("t2", 1, &["A.v1"]);

        let err = replay_events(&mut t, [&other]).unwrap_err();
        assert!(matches!(err, ReplayError::AggregateIdMismatch { .. }));
    }

    #[test]
    fn failed_event_does_not_advance_version() {
        let mut t = tally();
        let s1 = stream("t1", 1, &["A.v1", "Poison.v1"]);

        let err = replay_events(&mut t, [&s1]).unwrap_err();

        assert!(matches!(err, ReplayError::Event(EventError::UnknownEventType(_))));
        assert_eq!(t.version, Version::INITIAL);
    }

    proptest! {
        #[test]
        fn replay_never_moves_version_backwards(versions in prop::collection::vec(1u64..6, 1..12)) {
            let mut t = tally();
            for v in versions {
                let before = t.version;
                let s = stream("t1", v, &["A.v1"]);
                let applied = replay_events(&mut t, [&s]).is_ok();
                prop_assert!(t.version >= before);
                prop_assert_eq!(applied, v == before.value() + 1);
            }
        }
    }
}
