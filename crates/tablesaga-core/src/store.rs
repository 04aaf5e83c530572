use crate::Result;
use crate::entity::{Entity, EntityKey};
use crate::operation::{TableOperation, TableResult};
use crate::options::{OperationContext, RequestOptions};

/// Port to a key-value table store.
///
/// Calls are synchronous from the caller's point of view. Every entity write
/// is atomic on its own; batches are all-or-nothing within one partition.
pub trait TableStore {
    /// # Errors
    ///
    /// Returns an error if the store rejects the operation or cannot be reached.
    fn execute(
        &self,
        table: &str,
        operation: &TableOperation,
        options: Option<&RequestOptions>,
        context: Option<&OperationContext>,
    ) -> Result<TableResult>;

    /// Point read by key. A missing entity is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read itself fails.
    fn retrieve(
        &self,
        table: &str,
        key: &EntityKey,
        options: Option<&RequestOptions>,
        context: Option<&OperationContext>,
    ) -> Result<Option<Entity>>;

    /// Executes all operations or none of them, returning one result per
    /// operation in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch is invalid or any operation in it fails.
    fn execute_batch(
        &self,
        table: &str,
        operations: &[TableOperation],
        options: Option<&RequestOptions>,
        context: Option<&OperationContext>,
    ) -> Result<Vec<TableResult>>;
}

impl<T: TableStore + ?Sized> TableStore for &T {
    fn execute(
        &self,
        table: &str,
        operation: &TableOperation,
        options: Option<&RequestOptions>,
        context: Option<&OperationContext>,
    ) -> Result<TableResult> {
        (**self).execute(table, operation, options, context)
    }

    fn retrieve(
        &self,
        table: &str,
        key: &EntityKey,
        options: Option<&RequestOptions>,
        context: Option<&OperationContext>,
    ) -> Result<Option<Entity>> {
        (**self).retrieve(table, key, options, context)
    }

    fn execute_batch(
        &self,
        table: &str,
        operations: &[TableOperation],
        options: Option<&RequestOptions>,
        context: Option<&OperationContext>,
    ) -> Result<Vec<TableResult>> {
        (**self).execute_batch(table, operations, options, context)
    }
}
