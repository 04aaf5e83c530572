//! Compensating transactions over key-value table stores.
//!
//! A table store that only guarantees single-entity atomic writes cannot
//! roll back a multi-entity unit of work. A [`CompensationScope`] records,
//! for every write that succeeds through it, the inverse write that undoes
//! it. If the scope is not confirmed before teardown, the inverses are
//! replayed newest first.
//!
//! This is not isolation: every write is visible to other readers as soon as
//! it is applied, and undo is best effort. Inverse writes are conditional on
//! the concurrency token the forward write produced, so an entity changed by
//! someone else in the meantime is reported as a compensation failure rather
//! than overwritten.

mod action;
mod audit;
mod classifier;
mod config;
mod error;
mod registry;
mod scope;
mod undo;

pub use action::CompensatingAction;
pub use audit::{OperationRecord, OperationStatus, ScopeAuditLog};
pub use classifier::{
    Classification, InversePlan, Plan, PreImage, capture_pre_image, classify, plan,
};
pub use config::{CompensationConfig, load_config, parse_config};
pub use error::{
    ClassificationWarning, CompensationError, CompensationFailed, ConfigError, ScopeError,
    UnitOfWorkError,
};
pub use scope::{
    CompensationScope, Teardown, Tracked, UncompensableOperation, scoped, scoped_with_policy,
};
pub use undo::{
    DEFAULT_UNDO_DELTA_BACKOFF, DEFAULT_UNDO_MAX_BACKOFF, DEFAULT_UNDO_TIMEOUT, UndoExecutor,
    UndoPolicy, UndoReport,
};
