use tablesaga_core::{EntityKey, OperationKind, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMethod {
    Execute,
    Retrieve,
    Batch,
}

/// A failure the store returns instead of serving a matching call.
///
/// A fault fires once unless made persistent with [`Fault::always`].
#[derive(Debug, Clone)]
pub struct Fault {
    method: CallMethod,
    kind: Option<OperationKind>,
    key: Option<EntityKey>,
    error: StoreError,
    remaining: Option<usize>,
}

impl Fault {
    /// Fails `execute` calls for operations of `kind`.
    #[must_use]
    pub fn on_execute(kind: OperationKind, error: StoreError) -> Self {
        Self::new(CallMethod::Execute, Some(kind), error)
    }

    /// Fails point reads.
    #[must_use]
    pub fn on_retrieve(error: StoreError) -> Self {
        Self::new(CallMethod::Retrieve, None, error)
    }

    /// Fails whole batches.
    #[must_use]
    pub fn on_batch(error: StoreError) -> Self {
        Self::new(CallMethod::Batch, None, error)
    }

    fn new(method: CallMethod, kind: Option<OperationKind>, error: StoreError) -> Self {
        Self {
            method,
            kind,
            key: None,
            error,
            remaining: Some(1),
        }
    }

    /// Restricts the fault to calls touching `key`.
    #[must_use]
    pub fn for_key(mut self, key: EntityKey) -> Self {
        self.key = Some(key);
        self
    }

    #[must_use]
    pub fn times(mut self, count: usize) -> Self {
        self.remaining = Some(count);
        self
    }

    #[must_use]
    pub fn always(mut self) -> Self {
        self.remaining = None;
        self
    }

    pub(crate) fn matches(
        &self,
        method: CallMethod,
        kinds: &[OperationKind],
        keys: &[EntityKey],
    ) -> bool {
        self.method == method
            && self.kind.is_none_or(|kind| kinds.contains(&kind))
            && self.key.as_ref().is_none_or(|key| keys.contains(key))
    }

    /// Consumes one firing and returns the error to report.
    pub(crate) fn fire(&mut self) -> StoreError {
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }
        self.error.clone()
    }

    pub(crate) fn is_spent(&self) -> bool {
        self.remaining == Some(0)
    }
}
