use std::fmt::Debug;
use std::path::PathBuf;

use tablesaga_core::{EntityKey, StoreError};
use thiserror::Error;

/// Error from an operation executed through a compensation scope.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScopeError {
    /// The store rejected the forward operation. Nothing was recorded for it.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("compensation scope has already been confirmed")]
    AlreadyConfirmed,

    #[error("compensation scope has already been disposed")]
    AlreadyDisposed,
}

/// Why an operation that ran could not be made compensable.
///
/// This is a warning: the forward write stands, it just cannot be undone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ClassificationWarning {
    #[error("prior state could not be read")]
    PreImageUnavailable {
        #[source]
        source: StoreError,
    },

    #[error("prior state was absent although the write required an existing entity")]
    PreImageMissing,

    #[error("the store returned no concurrency token for the written entity")]
    MissingConcurrencyToken,
}

/// Error from a failed compensating write.
#[derive(Debug, Clone, Error)]
#[error("compensation failed for '{key}' in table '{table}': {description}")]
pub struct CompensationError {
    pub table: String,
    pub key: EntityKey,
    /// Description of what the compensation was trying to do.
    pub description: String,
    #[source]
    pub error: StoreError,
}

/// Aggregate of every compensating write that failed during one teardown.
#[derive(Debug, Clone, Error)]
#[error("{} of {attempted} compensating action(s) failed", failures.len())]
pub struct CompensationFailed {
    /// Number of compensating actions that were attempted.
    pub attempted: usize,
    pub failures: Vec<CompensationError>,
}

/// Error from a unit of work run through [`scoped`](crate::scoped).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UnitOfWorkError<E: Debug> {
    /// The work failed and every recorded operation was compensated.
    #[error("unit of work failed; {compensated} operation(s) compensated")]
    WorkFailed {
        #[source]
        source: E,
        compensated: usize,
    },

    /// Compensation failed. The work error, if the work failed at all, is
    /// kept apart from the compensation failures.
    #[error("{compensation}")]
    CompensationFailed {
        work_error: Option<E>,
        #[source]
        compensation: CompensationFailed,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration at '{path}'")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error")]
    TomlParse(#[from] toml::de::Error),

    #[error("invalid configuration value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}
