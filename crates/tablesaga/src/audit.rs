use std::time::Instant;

use tablesaga_core::{EntityKey, OperationKind};

/// Status of a tracked operation in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationStatus {
    /// Forward operation was submitted and has not completed yet.
    Pending,
    /// Applied and compensable.
    Applied,
    /// Rejected by the store.
    Failed,
    /// Read-only; nothing to compensate.
    ReadOnly,
    /// Applied but no inverse could be derived.
    Uncompensable,
    /// Undone by its compensating action.
    Compensated,
    /// Its compensating action failed.
    CompensationFailed,
    /// Kept because the scope was confirmed.
    Committed,
}

/// Record of one forward operation run through a scope.
#[derive(Debug)]
pub struct OperationRecord {
    pub table: String,
    pub key: EntityKey,
    pub kind: OperationKind,
    pub status: OperationStatus,
    /// When the forward operation started.
    pub started_at: Instant,
    /// When the record last changed status.
    pub completed_at: Option<Instant>,
    pub compensation_description: Option<String>,
}

/// Audit log of every operation tracked by a scope.
#[derive(Debug, Default)]
pub struct ScopeAuditLog {
    records: Vec<OperationRecord>,
}

impl ScopeAuditLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a forward operation starting and return its index.
    pub(crate) fn record_start(
        &mut self,
        table: &str,
        key: &EntityKey,
        kind: OperationKind,
    ) -> usize {
        self.records.push(OperationRecord {
            table: table.to_string(),
            key: key.clone(),
            kind,
            status: OperationStatus::Pending,
            started_at: Instant::now(),
            completed_at: None,
            compensation_description: None,
        });
        self.records.len() - 1
    }

    pub(crate) fn record_applied(&mut self, index: usize, compensation_description: String) {
        if let Some(record) = self.set_status(index, OperationStatus::Applied) {
            record.compensation_description = Some(compensation_description);
        }
    }

    pub(crate) fn record_failure(&mut self, index: usize) {
        self.set_status(index, OperationStatus::Failed);
    }

    pub(crate) fn record_read_only(&mut self, index: usize) {
        self.set_status(index, OperationStatus::ReadOnly);
    }

    pub(crate) fn record_uncompensable(&mut self, index: usize) {
        self.set_status(index, OperationStatus::Uncompensable);
    }

    pub(crate) fn record_compensated(&mut self, index: usize) {
        self.set_status(index, OperationStatus::Compensated);
    }

    pub(crate) fn record_compensation_failed(&mut self, index: usize) {
        self.set_status(index, OperationStatus::CompensationFailed);
    }

    pub(crate) fn record_committed(&mut self, index: usize) {
        self.set_status(index, OperationStatus::Committed);
    }

    fn set_status(
        &mut self,
        index: usize,
        status: OperationStatus,
    ) -> Option<&mut OperationRecord> {
        let record = self.records.get_mut(index)?;
        record.status = status;
        record.completed_at = Some(Instant::now());
        Some(record)
    }

    #[must_use]
    pub fn records(&self) -> &[OperationRecord] {
        &self.records
    }

    /// Get a summary of the scope's operations for display.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        for record in &self.records {
            let status = match record.status {
                OperationStatus::Pending => "…",
                OperationStatus::Applied | OperationStatus::ReadOnly => "✓",
                OperationStatus::Failed => "✗",
                OperationStatus::Uncompensable => "!",
                OperationStatus::Compensated => "↩",
                OperationStatus::CompensationFailed => "⚠",
                OperationStatus::Committed => "●",
            };
            lines.push(format!(
                "{status} {} {} '{}'",
                record.kind, record.table, record.key
            ));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> EntityKey {
        EntityKey::new("p", "r")
    }

    #[test]
    fn new_audit_log_is_empty() {
        let log = ScopeAuditLog::new();
        assert!(log.records().is_empty());
    }

    #[test]
    fn record_start_adds_pending_record() {
        let mut log = ScopeAuditLog::new();
        let index = log.record_start("t", &key(), OperationKind::Insert);

        assert_eq!(index, 0);
        assert_eq!(log.records()[0].status, OperationStatus::Pending);
        assert!(log.records()[0].completed_at.is_none());
    }

    #[test]
    fn record_applied_sets_description() {
        let mut log = ScopeAuditLog::new();
        let index = log.record_start("t", &key(), OperationKind::Insert);
        log.record_applied(index, "delete 'p/r'".to_string());

        assert_eq!(log.records()[0].status, OperationStatus::Applied);
        assert!(log.records()[0].completed_at.is_some());
        assert_eq!(
            log.records()[0].compensation_description.as_deref(),
            Some("delete 'p/r'")
        );
    }

    #[test]
    fn status_updates_target_the_indexed_record() {
        let mut log = ScopeAuditLog::new();
        let first = log.record_start("t", &key(), OperationKind::Insert);
        let second = log.record_start("t", &key(), OperationKind::Merge);
        log.record_applied(first, "undo".to_string());
        log.record_applied(second, "undo".to_string());
        log.record_compensated(second);

        assert_eq!(log.records()[0].status, OperationStatus::Applied);
        assert_eq!(log.records()[1].status, OperationStatus::Compensated);
    }

    #[test]
    fn unknown_index_is_ignored() {
        let mut log = ScopeAuditLog::new();
        log.record_failure(7);
        assert!(log.records().is_empty());
    }

    #[test]
    fn summary_formats_all_records() {
        let mut log = ScopeAuditLog::new();
        let a = log.record_start("invoices", &key(), OperationKind::Insert);
        log.record_applied(a, "undo".to_string());
        log.record_compensated(a);
        let b = log.record_start("invoices", &key(), OperationKind::Merge);
        log.record_failure(b);
        let c = log.record_start("lines", &key(), OperationKind::Replace);
        log.record_applied(c, "undo".to_string());
        log.record_compensation_failed(c);

        let summary = log.summary();
        assert!(summary.contains("↩ insert invoices 'p/r'"));
        assert!(summary.contains("✗ merge invoices 'p/r'"));
        assert!(summary.contains("⚠ replace lines 'p/r'"));
    }
}
