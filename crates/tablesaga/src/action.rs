use tablesaga_core::{
    ETag, EntityKey, OperationContext, OperationKind, RequestOptions, StoreError, TableOperation,
    TableResult, TableStore,
};

/// Deferred inverse of one applied operation.
///
/// Holds a snapshot of everything the inverse write needs; later changes to
/// the caller's entities do not leak into it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompensatingAction {
    table: String,
    forward: OperationKind,
    inverse: TableOperation,
    /// Token the entity held before the forward write, when known.
    prior_token: Option<ETag>,
    context: Option<OperationContext>,
}

impl CompensatingAction {
    pub(crate) fn new(table: &str, forward: OperationKind, inverse: TableOperation) -> Self {
        Self {
            table: table.to_string(),
            forward,
            inverse,
            prior_token: None,
            context: None,
        }
    }

    #[must_use]
    pub(crate) fn with_prior_token(mut self, token: Option<ETag>) -> Self {
        self.prior_token = token.filter(|token| !token.is_any());
        self
    }

    /// Swaps the token the inverse write is conditioned on.
    #[must_use]
    pub(crate) fn with_expected_token(mut self, token: ETag) -> Self {
        if let Some(entity) = self.inverse.entity_mut() {
            entity.etag = Some(token);
        }
        self
    }

    #[must_use]
    pub(crate) fn with_context(mut self, context: Option<OperationContext>) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn key(&self) -> &EntityKey {
        self.inverse.key()
    }

    /// Kind of the forward operation this action undoes.
    #[must_use]
    pub fn forward_kind(&self) -> OperationKind {
        self.forward
    }

    #[must_use]
    pub fn inverse_kind(&self) -> OperationKind {
        self.inverse.kind()
    }

    #[must_use]
    pub fn inverse(&self) -> &TableOperation {
        &self.inverse
    }

    /// Token the entity held before the forward write.
    ///
    /// Once this action is undone, the entity is back at that state under
    /// the token the inverse write issued. Older actions expecting this token
    /// are rebased onto the new one.
    #[must_use]
    pub fn prior_token(&self) -> Option<&ETag> {
        self.prior_token.as_ref()
    }

    /// Token the inverse write is conditioned on; `None` for re-inserts.
    #[must_use]
    pub fn expected_token(&self) -> Option<&ETag> {
        self.inverse.entity().and_then(|entity| entity.etag.as_ref())
    }

    #[must_use]
    pub fn context(&self) -> Option<&OperationContext> {
        self.context.as_ref()
    }

    /// Human-readable description of what the inverse write does.
    #[must_use]
    pub fn description(&self) -> String {
        let key = self.key();
        match self.inverse_kind() {
            OperationKind::Delete => format!(
                "delete '{key}' from '{}' written by {}",
                self.table, self.forward
            ),
            OperationKind::Insert => format!("re-insert deleted '{key}' into '{}'", self.table),
            _ => format!(
                "restore prior state of '{key}' in '{}' overwritten by {}",
                self.table, self.forward
            ),
        }
    }

    pub(crate) fn run<S: TableStore + ?Sized>(
        &self,
        store: &S,
        options: &RequestOptions,
    ) -> Result<TableResult, StoreError> {
        store.execute(
            &self.table,
            &self.inverse,
            Some(options),
            self.context.as_ref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use tablesaga_core::Entity;

    use super::*;

    #[test]
    fn description_names_inverse_and_forward_kind() {
        let undo_insert = CompensatingAction::new(
            "invoices",
            OperationKind::Insert,
            TableOperation::Delete(Entity::new("2024", "0001")),
        );
        assert_eq!(
            undo_insert.description(),
            "delete '2024/0001' from 'invoices' written by insert"
        );

        let undo_delete = CompensatingAction::new(
            "invoices",
            OperationKind::Delete,
            TableOperation::Insert(Entity::new("2024", "0001")),
        );
        assert_eq!(
            undo_delete.description(),
            "re-insert deleted '2024/0001' into 'invoices'"
        );

        let undo_merge = CompensatingAction::new(
            "invoices",
            OperationKind::Merge,
            TableOperation::Replace(Entity::new("2024", "0001")),
        );
        assert_eq!(
            undo_merge.description(),
            "restore prior state of '2024/0001' in 'invoices' overwritten by merge"
        );
    }

    #[test]
    fn context_is_carried_with_the_action() {
        let context = OperationContext::default().with_client_request_id("req-1");
        let action = CompensatingAction::new(
            "t",
            OperationKind::Insert,
            TableOperation::Delete(Entity::new("p", "r")),
        )
        .with_context(Some(context.clone()));

        assert_eq!(action.context(), Some(&context));
    }

    #[test]
    fn expected_token_can_be_swapped_for_a_newer_one() {
        let action = CompensatingAction::new(
            "t",
            OperationKind::Merge,
            TableOperation::Replace(Entity::new("p", "r").with_etag(ETag::new("W/\"2\""))),
        )
        .with_prior_token(Some(ETag::new("W/\"1\"")));
        assert_eq!(action.expected_token(), Some(&ETag::new("W/\"2\"")));
        assert_eq!(action.prior_token(), Some(&ETag::new("W/\"1\"")));

        let rebased = action.with_expected_token(ETag::new("W/\"7\""));
        assert_eq!(rebased.expected_token(), Some(&ETag::new("W/\"7\"")));
    }

    #[test]
    fn wildcard_is_not_a_prior_token() {
        let action = CompensatingAction::new(
            "t",
            OperationKind::Delete,
            TableOperation::Insert(Entity::new("p", "r")),
        )
        .with_prior_token(Some(ETag::any()));

        assert_eq!(action.prior_token(), None);
        assert_eq!(action.expected_token(), None);
    }
}
