//! In-memory [`TableStore`](tablesaga_core::TableStore).
//!
//! Behaves like a partitioned table service: conditional writes checked
//! against concurrency tokens, same-partition all-or-nothing batches, and
//! fresh tokens on every write. Every call is recorded, and faults can be
//! injected per method, operation kind and key.

mod apply;
mod fault;
mod store;

pub use fault::{CallMethod, Fault};
pub use store::{MemoryTableStore, RecordedCall};

/// Largest number of operations accepted in one batch.
pub const MAX_BATCH_SIZE: usize = 100;
