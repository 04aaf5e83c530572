use std::fmt::Debug;
use std::time::Duration;

use tablesaga_core::{
    EntityKey, OperationContext, OperationKind, RequestOptions, TableOperation, TableResult,
    TableStore,
};
use tracing::{debug, error, warn};

use crate::action::CompensatingAction;
use crate::audit::ScopeAuditLog;
use crate::classifier::{Classification, capture_pre_image, plan};
use crate::config::CompensationConfig;
use crate::error::{ClassificationWarning, CompensationFailed, ScopeError, UnitOfWorkError};
use crate::registry::CompensationRegistry;
use crate::undo::{UndoExecutor, UndoPolicy};

/// An operation that was applied but will not be undone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UncompensableOperation {
    pub table: String,
    pub key: EntityKey,
    pub kind: OperationKind,
    pub reason: ClassificationWarning,
}

/// Result of an operation run through a scope, with any operation that
/// could not be made compensable.
#[derive(Debug, Clone, PartialEq)]
pub struct Tracked<T> {
    pub value: T,
    pub warnings: Vec<UncompensableOperation>,
}

impl<T> Tracked<T> {
    #[must_use]
    pub fn is_compensable(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

/// What the first teardown of a scope did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// The scope was confirmed; pending compensations were dropped.
    Committed { discarded: usize },
    /// The scope was not confirmed; every pending compensation succeeded.
    Compensated { compensated: usize },
    /// An earlier teardown already ran; nothing was done.
    AlreadyDisposed,
}

impl Teardown {
    #[must_use]
    pub fn compensated(&self) -> usize {
        match self {
            Self::Compensated { compensated } => *compensated,
            Self::Committed { .. } | Self::AlreadyDisposed => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeState {
    Open,
    Confirmed,
    Disposed { confirmed: bool },
}

/// Unit of work over a table store with compensation on teardown.
///
/// Every operation executed through the scope is applied immediately; its
/// inverse is recorded. Unless [`confirm`](Self::confirm) is called, the
/// first [`dispose`](Self::dispose) replays the recorded inverses newest
/// first.
///
/// Dropping an undisposed scope disposes it, but compensation failures are
/// then only visible as `tracing` error events. Call `dispose` or use
/// [`scoped`] to get them as values.
pub struct CompensationScope<'s, S: TableStore + ?Sized> {
    store: &'s S,
    policy: UndoPolicy,
    state: ScopeState,
    registry: CompensationRegistry,
    uncompensable: Vec<UncompensableOperation>,
    audit_log: ScopeAuditLog,
}

impl<'s, S: TableStore + ?Sized> CompensationScope<'s, S> {
    /// Opens a scope whose compensating writes are each bounded by `timeout`.
    #[must_use]
    pub fn open(store: &'s S, timeout: Duration) -> Self {
        Self::with_policy(store, UndoPolicy::new(timeout))
    }

    #[must_use]
    pub fn with_config(store: &'s S, config: &CompensationConfig) -> Self {
        Self::with_policy(store, config.undo_policy())
    }

    #[must_use]
    pub fn with_policy(store: &'s S, policy: UndoPolicy) -> Self {
        Self {
            store,
            policy,
            state: ScopeState::Open,
            registry: CompensationRegistry::default(),
            uncompensable: Vec::new(),
            audit_log: ScopeAuditLog::new(),
        }
    }

    /// Applies `operation` and records its inverse.
    ///
    /// Prior state needed for the inverse is read before the write. If the
    /// write fails, nothing is recorded and the store's error is returned.
    ///
    /// # Errors
    ///
    /// Returns `ScopeError::Store` if the store rejects the operation, or a
    /// misuse error if the scope is confirmed or disposed.
    pub fn execute(
        &mut self,
        table: &str,
        operation: &TableOperation,
        options: Option<&RequestOptions>,
        context: Option<&OperationContext>,
    ) -> Result<Tracked<TableResult>, ScopeError> {
        self.ensure_open()?;

        let record = self
            .audit_log
            .record_start(table, operation.key(), operation.kind());
        let pre_image = capture_pre_image(self.store, table, operation, context);

        let result = match self.store.execute(table, operation, options, context) {
            Ok(result) => result,
            Err(error) => {
                debug!(
                    table,
                    key = %operation.key(),
                    kind = %operation.kind(),
                    %error,
                    "forward operation failed"
                );
                self.audit_log.record_failure(record);
                return Err(error.into());
            }
        };

        let classification = plan(table, operation, pre_image).bind(&result);
        let warnings = self
            .track(table, operation, classification, context, record)
            .into_iter()
            .collect();

        Ok(Tracked {
            value: result,
            warnings,
        })
    }

    /// Applies `operations` as one all-or-nothing batch.
    ///
    /// Inverses for every operation are derived before the batch is
    /// submitted and recorded, in batch order, only once it succeeds.
    ///
    /// # Errors
    ///
    /// Returns `ScopeError::Store` if the store rejects the batch, or a
    /// misuse error if the scope is confirmed or disposed.
    pub fn execute_batch(
        &mut self,
        table: &str,
        operations: &[TableOperation],
        options: Option<&RequestOptions>,
        context: Option<&OperationContext>,
    ) -> Result<Tracked<Vec<TableResult>>, ScopeError> {
        self.ensure_open()?;

        let records: Vec<usize> = operations
            .iter()
            .map(|op| self.audit_log.record_start(table, op.key(), op.kind()))
            .collect();
        let plans: Vec<_> = operations
            .iter()
            .map(|op| plan(table, op, capture_pre_image(self.store, table, op, context)))
            .collect();

        let results = match self.store.execute_batch(table, operations, options, context) {
            Ok(results) => results,
            Err(error) => {
                debug!(table, size = operations.len(), %error, "batch failed");
                for record in records {
                    self.audit_log.record_failure(record);
                }
                return Err(error.into());
            }
        };

        let mut warnings = Vec::new();
        for (index, (operation, inverse_plan)) in operations.iter().zip(plans).enumerate() {
            let result = results.get(index).cloned().unwrap_or_default();
            let classification = inverse_plan.bind(&result);
            if let Some(warning) =
                self.track(table, operation, classification, context, records[index])
            {
                warnings.push(warning);
            }
        }

        Ok(Tracked {
            value: results,
            warnings,
        })
    }

    /// Marks the unit of work as successful; teardown will keep every effect.
    ///
    /// # Errors
    ///
    /// Returns `ScopeError::AlreadyConfirmed` on a second call and
    /// `ScopeError::AlreadyDisposed` after teardown.
    pub fn confirm(&mut self) -> Result<(), ScopeError> {
        match self.state {
            ScopeState::Open => {
                debug!(pending = self.registry.len(), "compensation scope confirmed");
                self.state = ScopeState::Confirmed;
                Ok(())
            }
            ScopeState::Confirmed => Err(ScopeError::AlreadyConfirmed),
            ScopeState::Disposed { .. } => Err(ScopeError::AlreadyDisposed),
        }
    }

    /// Tears the scope down.
    ///
    /// The first call either drops the pending compensations (confirmed) or
    /// replays all of them newest first, attempting every one even if some
    /// fail. The registry is empty afterwards either way. Later calls do
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns every failed compensating write once all have been attempted.
    pub fn dispose(&mut self) -> Result<Teardown, CompensationFailed> {
        let confirmed = match self.state {
            ScopeState::Disposed { .. } => return Ok(Teardown::AlreadyDisposed),
            ScopeState::Confirmed => true,
            ScopeState::Open => false,
        };
        self.state = ScopeState::Disposed { confirmed };
        let registry = std::mem::take(&mut self.registry);

        if confirmed {
            let discarded = registry.len();
            for record in registry.records() {
                self.audit_log.record_committed(record);
            }
            debug!(discarded, "confirmed scope disposed");
            return Ok(Teardown::Committed { discarded });
        }

        debug!(pending = registry.len(), "compensating unconfirmed scope");
        let report =
            UndoExecutor::new(self.store, &self.policy).drain(registry, &mut self.audit_log);
        report
            .into_result()
            .map(|compensated| Teardown::Compensated { compensated })
    }

    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        matches!(
            self.state,
            ScopeState::Confirmed | ScopeState::Disposed { confirmed: true }
        )
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        matches!(self.state, ScopeState::Disposed { .. })
    }

    /// Number of compensating actions waiting for teardown.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.registry.len()
    }

    /// Pending compensating actions in application order.
    pub fn pending_actions(&self) -> impl Iterator<Item = &CompensatingAction> {
        self.registry.actions()
    }

    #[must_use]
    pub fn uncompensable(&self) -> &[UncompensableOperation] {
        &self.uncompensable
    }

    #[must_use]
    pub fn audit_log(&self) -> &ScopeAuditLog {
        &self.audit_log
    }

    #[must_use]
    pub fn policy(&self) -> &UndoPolicy {
        &self.policy
    }

    fn ensure_open(&self) -> Result<(), ScopeError> {
        match self.state {
            ScopeState::Open => Ok(()),
            ScopeState::Confirmed => Err(ScopeError::AlreadyConfirmed),
            ScopeState::Disposed { .. } => Err(ScopeError::AlreadyDisposed),
        }
    }

    fn track(
        &mut self,
        table: &str,
        operation: &TableOperation,
        classification: Classification,
        context: Option<&OperationContext>,
        record: usize,
    ) -> Option<UncompensableOperation> {
        match classification {
            Classification::Compensate(action) => {
                let action = action.with_context(context.cloned());
                debug!(
                    table,
                    key = %action.key(),
                    forward = %action.forward_kind(),
                    inverse = %action.inverse_kind(),
                    pending = self.registry.len() + 1,
                    "recorded compensating action"
                );
                self.audit_log.record_applied(record, action.description());
                self.registry.push(action, record);
                None
            }
            Classification::ReadOnly => {
                self.audit_log.record_read_only(record);
                None
            }
            Classification::Uncompensable(reason) => {
                warn!(
                    table,
                    key = %operation.key(),
                    kind = %operation.kind(),
                    %reason,
                    "operation applied but cannot be compensated"
                );
                self.audit_log.record_uncompensable(record);
                let uncompensable = UncompensableOperation {
                    table: table.to_string(),
                    key: operation.key().clone(),
                    kind: operation.kind(),
                    reason,
                };
                self.uncompensable.push(uncompensable.clone());
                Some(uncompensable)
            }
        }
    }
}

impl<S: TableStore + ?Sized> Drop for CompensationScope<'_, S> {
    fn drop(&mut self) {
        if self.is_disposed() {
            return;
        }
        if self.state == ScopeState::Open && !self.registry.is_empty() {
            warn!(
                pending = self.registry.len(),
                "compensation scope dropped without dispose"
            );
        }
        if let Err(failed) = self.dispose() {
            for failure in &failed.failures {
                error!(
                    table = %failure.table,
                    key = %failure.key,
                    description = %failure.description,
                    error = %failure.error,
                    "compensation failed while dropping scope"
                );
            }
        }
    }
}

/// Runs `work` inside a fresh scope and tears it down afterwards.
///
/// `work` keeps its effects by calling [`CompensationScope::confirm`];
/// otherwise everything it did is compensated, whether it returned `Ok` or
/// `Err`.
///
/// # Errors
///
/// Returns `UnitOfWorkError::WorkFailed` if `work` failed and compensation
/// succeeded, and `UnitOfWorkError::CompensationFailed` if any compensating
/// write failed.
pub fn scoped<'s, S, T, E, F>(
    store: &'s S,
    timeout: Duration,
    work: F,
) -> Result<T, UnitOfWorkError<E>>
where
    S: TableStore + ?Sized,
    E: Debug,
    F: FnOnce(&mut CompensationScope<'s, S>) -> Result<T, E>,
{
    scoped_with_policy(store, UndoPolicy::new(timeout), work)
}

/// [`scoped`] with an explicit undo policy.
///
/// # Errors
///
/// See [`scoped`].
pub fn scoped_with_policy<'s, S, T, E, F>(
    store: &'s S,
    policy: UndoPolicy,
    work: F,
) -> Result<T, UnitOfWorkError<E>>
where
    S: TableStore + ?Sized,
    E: Debug,
    F: FnOnce(&mut CompensationScope<'s, S>) -> Result<T, E>,
{
    let mut scope = CompensationScope::with_policy(store, policy);
    let outcome = work(&mut scope);

    match (outcome, scope.dispose()) {
        (Ok(value), Ok(_)) => Ok(value),
        (Err(source), Ok(teardown)) => Err(UnitOfWorkError::WorkFailed {
            source,
            compensated: teardown.compensated(),
        }),
        (outcome, Err(compensation)) => Err(UnitOfWorkError::CompensationFailed {
            work_error: outcome.err(),
            compensation,
        }),
    }
}
