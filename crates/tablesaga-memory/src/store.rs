use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tablesaga_core::{
    Entity, EntityKey, OperationContext, OperationKind, RequestOptions, StoreError,
    TableOperation, TableResult, TableStore,
};
use tracing::debug;

use crate::apply::{ETagSequence, Rows, apply, validate_batch};
use crate::fault::{CallMethod, Fault};

/// One call received by the store, recorded whether it succeeded or not.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: CallMethod,
    pub table: String,
    pub kinds: Vec<OperationKind>,
    pub keys: Vec<EntityKey>,
    pub options: Option<RequestOptions>,
    pub context: Option<OperationContext>,
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, Rows>,
    etags: ETagSequence,
    calls: Vec<RecordedCall>,
    faults: Vec<Fault>,
}

impl State {
    fn take_fault(
        &mut self,
        method: CallMethod,
        kinds: &[OperationKind],
        keys: &[EntityKey],
    ) -> Option<StoreError> {
        let index = self
            .faults
            .iter()
            .position(|fault| fault.matches(method, kinds, keys))?;
        let error = self.faults[index].fire();
        if self.faults[index].is_spent() {
            self.faults.remove(index);
        }
        Some(error)
    }
}

#[derive(Debug, Default)]
pub struct MemoryTableStore {
    state: Mutex<State>,
}

impl MemoryTableStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `entity` unconditionally without recording a call and returns
    /// it with its issued token.
    pub fn seed(&self, table: &str, entity: Entity) -> Entity {
        let mut state = self.lock();
        let state = &mut *state;
        let rows = state.tables.entry(table.to_string()).or_default();
        let etag = state.etags.issue();
        let stored = entity.with_etag(etag);
        rows.insert(stored.key.clone(), stored.clone());
        stored
    }

    #[must_use]
    pub fn get(&self, table: &str, key: &EntityKey) -> Option<Entity> {
        self.lock()
            .tables
            .get(table)
            .and_then(|rows| rows.get(key).cloned())
    }

    /// All entities of `table` ordered by key.
    #[must_use]
    pub fn snapshot(&self, table: &str) -> Vec<Entity> {
        self.lock()
            .tables
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn inject(&self, fault: Fault) {
        self.lock().faults.push(fault);
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TableStore for MemoryTableStore {
    fn execute(
        &self,
        table: &str,
        operation: &TableOperation,
        options: Option<&RequestOptions>,
        context: Option<&OperationContext>,
    ) -> Result<TableResult, StoreError> {
        let kinds = [operation.kind()];
        let keys = [operation.key().clone()];
        let mut state = self.lock();
        state.calls.push(RecordedCall {
            method: CallMethod::Execute,
            table: table.to_string(),
            kinds: kinds.to_vec(),
            keys: keys.to_vec(),
            options: options.cloned(),
            context: context.cloned(),
        });

        if let Some(error) = state.take_fault(CallMethod::Execute, &kinds, &keys) {
            debug!(table, key = %keys[0], kind = %kinds[0], %error, "injected fault");
            return Err(error);
        }

        let state = &mut *state;
        let rows = state.tables.entry(table.to_string()).or_default();
        apply(table, rows, &mut state.etags, operation)
    }

    fn retrieve(
        &self,
        table: &str,
        key: &EntityKey,
        options: Option<&RequestOptions>,
        context: Option<&OperationContext>,
    ) -> Result<Option<Entity>, StoreError> {
        let kinds = [OperationKind::Retrieve];
        let keys = [key.clone()];
        let mut state = self.lock();
        state.calls.push(RecordedCall {
            method: CallMethod::Retrieve,
            table: table.to_string(),
            kinds: kinds.to_vec(),
            keys: keys.to_vec(),
            options: options.cloned(),
            context: context.cloned(),
        });

        if let Some(error) = state.take_fault(CallMethod::Retrieve, &kinds, &keys) {
            debug!(table, %key, %error, "injected fault");
            return Err(error);
        }

        Ok(state
            .tables
            .get(table)
            .and_then(|rows| rows.get(key).cloned()))
    }

    fn execute_batch(
        &self,
        table: &str,
        operations: &[TableOperation],
        options: Option<&RequestOptions>,
        context: Option<&OperationContext>,
    ) -> Result<Vec<TableResult>, StoreError> {
        let kinds: Vec<OperationKind> = operations.iter().map(TableOperation::kind).collect();
        let keys: Vec<EntityKey> = operations.iter().map(|op| op.key().clone()).collect();
        let mut state = self.lock();
        state.calls.push(RecordedCall {
            method: CallMethod::Batch,
            table: table.to_string(),
            kinds: kinds.clone(),
            keys: keys.clone(),
            options: options.cloned(),
            context: context.cloned(),
        });

        validate_batch(table, operations)?;

        if let Some(error) = state.take_fault(CallMethod::Batch, &kinds, &keys) {
            debug!(table, size = operations.len(), %error, "injected fault");
            return Err(error);
        }

        // Work on copies so a failing operation leaves the table untouched.
        let mut rows = state.tables.get(table).cloned().unwrap_or_default();
        let mut etags = state.etags.clone();
        let results = operations
            .iter()
            .map(|op| apply(table, &mut rows, &mut etags, op))
            .collect::<Result<Vec<_>, _>>()?;

        state.tables.insert(table.to_string(), rows);
        state.etags = etags;
        Ok(results)
    }
}
