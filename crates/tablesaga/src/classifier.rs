//! Derivation of compensating actions.
//!
//! | Applied kind      | Inverse                                          |
//! |-------------------|--------------------------------------------------|
//! | Insert            | Delete the inserted entity                       |
//! | Delete            | Insert the entity supplied with the delete       |
//! | Merge, Replace    | Replace with the pre-image                       |
//! | InsertOrMerge,    | Replace with the pre-image if one existed,       |
//! | InsertOrReplace   | otherwise Delete the written entity              |
//! | Retrieve          | none                                             |
//!
//! Every inverse that overwrites or removes a stored entity carries the token
//! the forward write was answered with, so a later conflicting write makes
//! the inverse fail instead of being overwritten.
//!
//! The pre-image read happens before the forward write and is not isolated
//! from other writers: if someone else changes the entity between the read
//! and the write, the derived inverse restores the state the read saw.

use tablesaga_core::{
    ETag, Entity, OperationContext, OperationKind, StoreError, TableOperation, TableResult,
    TableStore,
};
use tracing::warn;

use crate::action::CompensatingAction;
use crate::error::ClassificationWarning;

/// State of an entity immediately before a write was applied to it.
#[derive(Debug, Clone, PartialEq)]
pub enum PreImage {
    /// The operation kind does not need prior state to be undone.
    NotRequired,
    /// The entity did not exist.
    Absent,
    Found(Entity),
    /// The diagnostic read failed; prior state is unknown.
    Unavailable(StoreError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Compensate(CompensatingAction),
    ReadOnly,
    Uncompensable(ClassificationWarning),
}

/// Inverse derived before the forward write, still missing the concurrency
/// token the write will issue.
#[derive(Debug, Clone, PartialEq)]
pub struct InversePlan {
    table: String,
    forward: OperationKind,
    inverse: TableOperation,
    needs_token: bool,
    prior_token: Option<ETag>,
}

impl InversePlan {
    /// Attaches the token from the forward write's result.
    ///
    /// # Errors
    ///
    /// Returns [`ClassificationWarning::MissingConcurrencyToken`] if the
    /// inverse is conditional and the result carries no token.
    pub fn bind(self, result: &TableResult) -> Result<CompensatingAction, ClassificationWarning> {
        let action = CompensatingAction::new(&self.table, self.forward, self.inverse)
            .with_prior_token(self.prior_token);
        if !self.needs_token {
            return Ok(action);
        }
        let token = result
            .etag
            .clone()
            .or_else(|| result.entity.as_ref().and_then(|e| e.etag.clone()))
            .ok_or(ClassificationWarning::MissingConcurrencyToken)?;
        Ok(action.with_expected_token(token))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    Inverse(InversePlan),
    ReadOnly,
    Uncompensable(ClassificationWarning),
}

impl Plan {
    #[must_use]
    pub fn bind(self, result: &TableResult) -> Classification {
        match self {
            Self::Inverse(plan) => match plan.bind(result) {
                Ok(action) => Classification::Compensate(action),
                Err(warning) => Classification::Uncompensable(warning),
            },
            Self::ReadOnly => Classification::ReadOnly,
            Self::Uncompensable(warning) => Classification::Uncompensable(warning),
        }
    }
}

/// Reads the prior state of the entity `operation` targets, if undoing the
/// operation depends on it.
///
/// The read uses the store's default options. A failing read does not stop
/// the caller from running the operation; it only makes it uncompensable.
pub fn capture_pre_image<S: TableStore + ?Sized>(
    store: &S,
    table: &str,
    operation: &TableOperation,
    context: Option<&OperationContext>,
) -> PreImage {
    if !operation.kind().requires_pre_image() {
        return PreImage::NotRequired;
    }

    match store.retrieve(table, operation.key(), None, context) {
        Ok(Some(entity)) => PreImage::Found(entity),
        Ok(None) => PreImage::Absent,
        Err(error) => {
            warn!(
                table,
                key = %operation.key(),
                kind = %operation.kind(),
                %error,
                "failed to read prior state"
            );
            PreImage::Unavailable(error)
        }
    }
}

/// Derives the inverse of `operation` from its prior state.
#[must_use]
pub fn plan(table: &str, operation: &TableOperation, pre_image: PreImage) -> Plan {
    let forward = operation.kind();
    let inverse = |inverse: TableOperation, needs_token: bool, prior_token: Option<ETag>| {
        Plan::Inverse(InversePlan {
            table: table.to_string(),
            forward,
            inverse,
            needs_token,
            prior_token,
        })
    };

    match operation {
        TableOperation::Retrieve(_) => Plan::ReadOnly,
        TableOperation::Insert(entity) => {
            inverse(TableOperation::Delete(entity.clone()), true, None)
        }
        TableOperation::Delete(entity) => inverse(
            TableOperation::Insert(entity.clone().without_etag()),
            false,
            entity.etag.clone(),
        ),
        TableOperation::Merge(_) | TableOperation::Replace(_) => match pre_image {
            PreImage::Found(prior) => {
                let prior_token = prior.etag.clone();
                inverse(TableOperation::Replace(prior), true, prior_token)
            }
            PreImage::Unavailable(source) => {
                Plan::Uncompensable(ClassificationWarning::PreImageUnavailable { source })
            }
            PreImage::Absent | PreImage::NotRequired => {
                Plan::Uncompensable(ClassificationWarning::PreImageMissing)
            }
        },
        TableOperation::InsertOrMerge(entity) | TableOperation::InsertOrReplace(entity) => {
            match pre_image {
                PreImage::Found(prior) => {
                    let prior_token = prior.etag.clone();
                    inverse(TableOperation::Replace(prior), true, prior_token)
                }
                PreImage::Absent => inverse(TableOperation::Delete(entity.clone()), true, None),
                PreImage::Unavailable(source) => {
                    Plan::Uncompensable(ClassificationWarning::PreImageUnavailable { source })
                }
                PreImage::NotRequired => {
                    Plan::Uncompensable(ClassificationWarning::PreImageMissing)
                }
            }
        }
    }
}

/// Produces the compensating action for an applied operation.
#[must_use]
pub fn classify(
    table: &str,
    operation: &TableOperation,
    pre_image: PreImage,
    result: &TableResult,
) -> Classification {
    plan(table, operation, pre_image).bind(result)
}
