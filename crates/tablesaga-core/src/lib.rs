//! Entity contract and store port shared by the compensation engine and
//! table store adapters.
//!
//! A table store here offers single-entity atomic writes, point reads keyed
//! on partition and row key, same-partition batches, and optimistic
//! concurrency through opaque [`ETag`] tokens. Nothing more is assumed.

pub mod entity;
pub mod error;
pub mod operation;
pub mod options;
mod store;

pub use entity::{ETag, Entity, EntityKey, PropertyValue};
pub use error::{Result, StoreError};
pub use operation::{OperationKind, TableOperation, TableResult};
pub use options::{OperationContext, RequestOptions, RetryPolicy};
pub use store::TableStore;
