//! Configuration of the commit pipeline.
//!
//! Each side-effecting step has its own [`RetryPolicy`]:
//!
//! - `commit`: the outermost attempt (synchronize → persist → react)
//! - `persist`: the append call
//! - `publish`: the publish call
//!
//! All three default to 3 attempts without delay.
//!
//! # Example
//!
//! ```
//! use commitflow_runtime::config::CommitConfig;
//! use commitflow_runtime::retry::ExhaustedPolicy;
//!
//! let config = CommitConfig::from_toml_str(r#"
//!     on_exhausted = "notify_failed"
//!
//!     [persist]
//!     max_attempts = 5
//!     initial_delay_ms = 20
//! "#).unwrap();
//!
//! assert_eq!(config.persist.max_attempts, 5);
//! assert_eq!(config.commit.max_attempts, 3);
//! assert_eq!(config.on_exhausted, ExhaustedPolicy::NotifyFailed);
//! ```

use crate::retry::{ExhaustedPolicy, RetryPolicy};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Configuration error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

/// Retry and exhaustion settings of the commit pipeline.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommitConfig {
    /// Policy of the outermost commit attempt
    pub commit: RetryPolicy,
    /// Policy of the append call
    pub persist: RetryPolicy,
    /// Policy of the publish call
    pub publish: RetryPolicy,
    /// Behavior when the outermost commit attempt is exhausted
    pub on_exhausted: ExhaustedPolicy,
}

impl CommitConfig {
    /// Set the policy of the outermost commit attempt
    #[must_use]
    pub fn with_commit_policy(mut self, policy: RetryPolicy) -> Self {
        self.commit = policy;
        self
    }

    /// Set the policy of the append call
    #[must_use]
    pub fn with_persist_policy(mut self, policy: RetryPolicy) -> Self {
        self.persist = policy;
        self
    }

    /// Set the policy of the publish call
    #[must_use]
    pub fn with_publish_policy(mut self, policy: RetryPolicy) -> Self {
        self.publish = policy;
        self
    }

    /// Set the exhaustion behavior
    #[must_use]
    pub const fn with_on_exhausted(mut self, on_exhausted: ExhaustedPolicy) -> Self {
        self.on_exhausted = on_exhausted;
        self
    }

    /// Parse a TOML document. Missing keys take their default value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML and
    /// [`ConfigError::Validation`] if the result is invalid.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: RawCommitConfig =
            toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let config = Self {
            commit: raw.commit.into_policy(),
            persist: raw.persist.into_policy(),
            publish: raw.publish.into_policy(),
            on_exhausted: raw.on_exhausted,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate every policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if a policy allows no attempt or has a
    /// multiplier below 1.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, policy) in [
            ("commit", &self.commit),
            ("persist", &self.persist),
            ("publish", &self.publish),
        ] {
            if policy.max_attempts == 0 {
                return Err(ConfigError::Validation(format!(
                    "{name}.max_attempts must be at least 1"
                )));
            }
            if policy.multiplier < 1.0 {
                return Err(ConfigError::Validation(format!(
                    "{name}.multiplier must be >= 1.0"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCommitConfig {
    #[serde(default)]
    commit: RawRetryPolicy,
    #[serde(default)]
    persist: RawRetryPolicy,
    #[serde(default)]
    publish: RawRetryPolicy,
    #[serde(default)]
    on_exhausted: ExhaustedPolicy,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRetryPolicy {
    max_attempts: Option<u32>,
    initial_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    multiplier: Option<f64>,
    #[serde(default)]
    jitter: bool,
}

impl RawRetryPolicy {
    fn into_policy(self) -> RetryPolicy {
        let mut builder = RetryPolicy::builder().jitter(self.jitter);
        if let Some(max_attempts) = self.max_attempts {
            builder = builder.max_attempts(max_attempts);
        }
        if let Some(ms) = self.initial_delay_ms {
            builder = builder.initial_delay(Duration::from_millis(ms));
        }
        if let Some(ms) = self.max_delay_ms {
            builder = builder.max_delay(Duration::from_millis(ms));
        }
        if let Some(multiplier) = self.multiplier {
            builder = builder.multiplier(multiplier);
        }
        builder.build()
    }
}
