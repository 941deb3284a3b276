//! Aggregate identification, commit identification and versioning types.
//!
//! - [`AggregateRootId`] names one aggregate instance (one event stream).
//! - [`CommitId`] names one logical command attempt. Retries of the same attempt reuse
//!   the same commit id, which is what lets the store detect duplicate commits.
//! - [`Version`] is the optimistic-concurrency sequence number of a stream.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for identifier parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid identifier: {0}")]
pub struct ParseIdError(String);

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier without validation (trusted input).
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Convert into the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if s.is_empty() {
                    return Err(ParseIdError(format!("{} cannot be empty", $label)));
                }
                Ok(Self(s.to_string()))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Unique identifier of an aggregate root instance.
    ///
    /// Every event stream belongs to exactly one aggregate root, and the in-memory
    /// cache is keyed by this id.
    ///
    /// # Examples
    ///
    /// ```
    /// use commitflow_core::stream::AggregateRootId;
    ///
    /// let id = AggregateRootId::new("account-1");
    /// assert_eq!(id.as_str(), "account-1");
    ///
    /// let parsed: AggregateRootId = "account-2".parse().unwrap();
    /// assert_eq!(parsed, AggregateRootId::new("account-2"));
    /// ```
    AggregateRootId,
    "Aggregate root id"
);

string_id!(
    /// Identifier of one logical commit attempt.
    ///
    /// At most one stream per `(AggregateRootId, CommitId)` is ever durably appended.
    CommitId,
    "Commit id"
);

/// Stream version number for optimistic concurrency control.
///
/// Aggregates start at version 0 (nothing applied). The first stream of an aggregate
/// carries version 1, and an aggregate at version `n` accepts exactly the stream with
/// version `n + 1`.
///
/// # Examples
///
/// ```
/// use commitflow_core::stream::Version;
///
/// let v0 = Version::INITIAL;
/// assert_eq!(v0.next(), Version::new(1));
/// assert_eq!(Version::new(5).value(), 5);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// The version of an aggregate before any stream was applied.
    pub const INITIAL: Self = Self(0);

    /// Create a new `Version` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Get the next version (current + 1).
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Check if this is the initial version (0).
    #[must_use]
    pub const fn is_initial(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Version> for u64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

impl std::ops::Add<u64> for Version {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

/// Caller is responsible for not subtracting below 0.
impl std::ops::Sub<u64> for Version {
    type Output = Self;

    fn sub(self, rhs: u64) -> Self::Output {
        Self(self.0 - rhs)
    }
}
