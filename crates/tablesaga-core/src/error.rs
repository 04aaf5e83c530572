use thiserror::Error;

use crate::entity::EntityKey;

/// Failure reported by a table store adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("entity '{key}' not found in table '{table}'")]
    NotFound { table: String, key: EntityKey },

    #[error("entity '{key}' already exists in table '{table}'")]
    Conflict { table: String, key: EntityKey },

    #[error("concurrency token mismatch for entity '{key}' in table '{table}'")]
    PreconditionFailed { table: String, key: EntityKey },

    #[error("invalid request against table '{table}': {message}")]
    Validation { table: String, message: String },

    #[error("table '{table}' is throttling requests")]
    Throttled { table: String },

    #[error("request against table '{table}' timed out")]
    Timeout { table: String },

    #[error("table store unavailable: {message}")]
    Unavailable { message: String },
}

impl StoreError {
    /// Whether the store refused the write because of conflicting state,
    /// either an existing key or a stale concurrency token.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::PreconditionFailed { .. })
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
