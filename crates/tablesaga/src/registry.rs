use crate::action::CompensatingAction;

#[derive(Debug)]
pub(crate) struct RegistryEntry {
    pub(crate) action: CompensatingAction,
    /// Index of the audit record of the forward operation.
    pub(crate) record: usize,
}

/// Pending compensating actions in application order.
///
/// Appended in the order forward operations succeed and consumed newest
/// first, so a later write is undone before an earlier one it may depend on.
#[derive(Debug, Default)]
pub(crate) struct CompensationRegistry {
    entries: Vec<RegistryEntry>,
}

impl CompensationRegistry {
    pub(crate) fn push(&mut self, action: CompensatingAction, record: usize) {
        self.entries.push(RegistryEntry { action, record });
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn actions(&self) -> impl Iterator<Item = &CompensatingAction> {
        self.entries.iter().map(|entry| &entry.action)
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.iter().map(|entry| entry.record)
    }

    /// Consumes the registry, yielding entries newest first.
    pub(crate) fn into_reverse(self) -> impl Iterator<Item = RegistryEntry> {
        self.entries.into_iter().rev()
    }
}
