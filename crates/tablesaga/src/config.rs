use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tablesaga_core::RetryPolicy;

use crate::error::ConfigError;
use crate::undo::{
    DEFAULT_UNDO_DELTA_BACKOFF, DEFAULT_UNDO_MAX_BACKOFF, DEFAULT_UNDO_TIMEOUT, UndoPolicy,
};

#[derive(Debug, Deserialize, Default)]
struct ConfigDocument {
    compensation: Option<CompensationSection>,
}

#[derive(Debug, Deserialize, Default)]
struct CompensationSection {
    #[serde(default, rename = "undo-timeout-ms")]
    undo_timeout_ms: Option<u64>,
    #[serde(default)]
    retry: Option<RetrySection>,
}

#[derive(Debug, Deserialize, Default)]
struct RetrySection {
    #[serde(default)]
    strategy: Option<RetryStrategy>,
    #[serde(default, rename = "delta-backoff-ms")]
    delta_backoff_ms: Option<u64>,
    #[serde(default, rename = "max-backoff-ms")]
    max_backoff_ms: Option<u64>,
    #[serde(default, rename = "max-attempts")]
    max_attempts: Option<u32>,
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
enum RetryStrategy {
    #[default]
    Exponential,
    Linear,
    None,
}

/// Settings for compensating writes, read from the `[compensation]` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationConfig {
    undo_timeout: Duration,
    retry_policy: RetryPolicy,
}

impl Default for CompensationConfig {
    fn default() -> Self {
        let policy = UndoPolicy::default();
        Self {
            undo_timeout: policy.timeout,
            retry_policy: policy.retry,
        }
    }
}

impl CompensationConfig {
    #[must_use]
    pub fn undo_timeout(&self) -> Duration {
        self.undo_timeout
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }

    #[must_use]
    pub fn undo_policy(&self) -> UndoPolicy {
        UndoPolicy::new(self.undo_timeout).with_retry(self.retry_policy)
    }
}

/// Parses compensation settings from a TOML document. Every key is optional.
///
/// # Errors
///
/// Returns an error if the document is not valid TOML or a value is out of range.
pub fn parse_config(source: &str) -> Result<CompensationConfig, ConfigError> {
    let document: ConfigDocument = toml::from_str(source)?;
    build_config(document.compensation.unwrap_or_default())
}

/// # Errors
///
/// Returns an error if the file cannot be read or its contents are invalid.
pub fn load_config(path: &Path) -> Result<CompensationConfig, ConfigError> {
    let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&source)
}

fn build_config(section: CompensationSection) -> Result<CompensationConfig, ConfigError> {
    let undo_timeout = section
        .undo_timeout_ms
        .map_or(DEFAULT_UNDO_TIMEOUT, Duration::from_millis);
    if undo_timeout.is_zero() {
        return Err(ConfigError::Invalid {
            field: "undo-timeout-ms",
            reason: "must be greater than zero".to_string(),
        });
    }

    let retry_policy = build_retry_policy(section.retry.unwrap_or_default())?;

    Ok(CompensationConfig {
        undo_timeout,
        retry_policy,
    })
}

fn build_retry_policy(retry: RetrySection) -> Result<RetryPolicy, ConfigError> {
    let delta_backoff = retry
        .delta_backoff_ms
        .map_or(DEFAULT_UNDO_DELTA_BACKOFF, Duration::from_millis);
    let max_backoff = retry
        .max_backoff_ms
        .map_or(DEFAULT_UNDO_MAX_BACKOFF, Duration::from_millis);
    let max_attempts = retry.max_attempts.unwrap_or(u32::MAX);

    if max_attempts == 0 {
        return Err(ConfigError::Invalid {
            field: "max-attempts",
            reason: "must allow at least one attempt".to_string(),
        });
    }

    match retry.strategy.unwrap_or_default() {
        RetryStrategy::None => Ok(RetryPolicy::NoRetry),
        RetryStrategy::Linear => Ok(RetryPolicy::Linear {
            delta_backoff,
            max_attempts,
        }),
        RetryStrategy::Exponential => {
            if delta_backoff > max_backoff {
                return Err(ConfigError::Invalid {
                    field: "delta-backoff-ms",
                    reason: format!(
                        "{}ms exceeds max-backoff-ms of {}ms",
                        delta_backoff.as_millis(),
                        max_backoff.as_millis()
                    ),
                });
            }
            Ok(RetryPolicy::Exponential {
                delta_backoff,
                max_backoff,
                max_attempts,
            })
        }
    }
}
