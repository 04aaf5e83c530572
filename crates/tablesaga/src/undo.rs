use std::collections::HashMap;
use std::time::Duration;

use tablesaga_core::{ETag, EntityKey, RequestOptions, RetryPolicy, TableResult, TableStore};
use tracing::{debug, warn};

use crate::action::CompensatingAction;
use crate::audit::ScopeAuditLog;
use crate::error::{CompensationError, CompensationFailed};
use crate::registry::CompensationRegistry;

pub const DEFAULT_UNDO_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_UNDO_DELTA_BACKOFF: Duration = Duration::from_millis(100);
pub const DEFAULT_UNDO_MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Tokens issued by inverse writes, keyed by the token each undone entity
/// held before the forward write.
type Successors = HashMap<(String, EntityKey, ETag), ETag>;

/// Execution options for compensating writes.
///
/// Independent of whatever governed the forward operations: each inverse
/// write is bounded by `timeout` and retried with exponential backoff for as
/// long as the timeout allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndoPolicy {
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl UndoPolicy {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            retry: RetryPolicy::Exponential {
                delta_backoff: DEFAULT_UNDO_DELTA_BACKOFF,
                max_backoff: DEFAULT_UNDO_MAX_BACKOFF,
                max_attempts: u32::MAX,
            },
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Options override passed with every compensating write.
    #[must_use]
    pub fn request_options(&self) -> RequestOptions {
        RequestOptions::default()
            .with_server_timeout(self.timeout)
            .with_maximum_execution_time(self.timeout)
            .with_retry_policy(self.retry)
    }
}

impl Default for UndoPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_TIMEOUT)
    }
}

/// Outcome of draining a registry.
#[derive(Debug, Default)]
pub struct UndoReport {
    pub compensated: usize,
    pub failures: Vec<CompensationError>,
}

impl UndoReport {
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.compensated + self.failures.len()
    }

    /// # Errors
    ///
    /// Returns the aggregated failures if any compensating write failed.
    pub fn into_result(self) -> Result<usize, CompensationFailed> {
        if self.failures.is_empty() {
            Ok(self.compensated)
        } else {
            Err(CompensationFailed {
                attempted: self.attempted(),
                failures: self.failures,
            })
        }
    }
}

/// Replays compensating actions one at a time against a store.
pub struct UndoExecutor<'s, S: TableStore + ?Sized> {
    store: &'s S,
    options: RequestOptions,
}

impl<'s, S: TableStore + ?Sized> UndoExecutor<'s, S> {
    #[must_use]
    pub fn new(store: &'s S, policy: &UndoPolicy) -> Self {
        Self {
            store,
            options: policy.request_options(),
        }
    }

    /// Runs a single compensating write.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the inverse write, including
    /// when the entity changed after the forward write and its token is stale.
    pub fn run(&self, action: &CompensatingAction) -> Result<TableResult, CompensationError> {
        debug!(
            table = action.table(),
            key = %action.key(),
            inverse = %action.inverse_kind(),
            "running compensating action"
        );
        action
            .run(self.store, &self.options)
            .map_err(|error| CompensationError {
                table: action.table().to_string(),
                key: action.key().clone(),
                description: action.description(),
                error,
            })
    }

    /// Replays every action newest first, continuing past failures.
    ///
    /// Undoing an action changes the entity's token, so older actions on the
    /// same entity that expect the token it held before are rebased onto the
    /// token the inverse write issued. A token changed by anyone else still
    /// fails the older inverse.
    pub(crate) fn drain(
        &self,
        registry: CompensationRegistry,
        audit_log: &mut ScopeAuditLog,
    ) -> UndoReport {
        let mut report = UndoReport::default();
        let mut successors = Successors::new();

        for entry in registry.into_reverse() {
            let action = rebase(entry.action, &successors);
            match self.run(&action) {
                Ok(result) => {
                    let issued = result
                        .etag
                        .or_else(|| result.entity.and_then(|entity| entity.etag));
                    if let (Some(prior), Some(issued)) = (action.prior_token(), issued) {
                        successors.insert(
                            (action.table().to_string(), action.key().clone(), prior.clone()),
                            issued,
                        );
                    }
                    audit_log.record_compensated(entry.record);
                    report.compensated += 1;
                }
                Err(failure) => {
                    warn!(
                        table = %failure.table,
                        key = %failure.key,
                        error = %failure.error,
                        "compensating action failed"
                    );
                    audit_log.record_compensation_failed(entry.record);
                    report.failures.push(failure);
                }
            }
        }

        report
    }
}

fn rebase(action: CompensatingAction, successors: &Successors) -> CompensatingAction {
    let successor = action.expected_token().and_then(|token| {
        successors.get(&(action.table().to_string(), action.key().clone(), token.clone()))
    });
    match successor {
        Some(token) => {
            debug!(
                table = action.table(),
                key = %action.key(),
                token = %token,
                "rebased compensating action onto token from a later undo"
            );
            action.with_expected_token(token.clone())
        }
        None => action,
    }
}
