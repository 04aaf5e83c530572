use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::{ETag, Entity, EntityKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    Insert,
    Delete,
    Merge,
    Replace,
    InsertOrMerge,
    InsertOrReplace,
    Retrieve,
}

impl OperationKind {
    /// Whether undoing this kind needs the entity's state from before the
    /// write was applied.
    #[must_use]
    pub fn requires_pre_image(self) -> bool {
        matches!(
            self,
            Self::Merge | Self::Replace | Self::InsertOrMerge | Self::InsertOrReplace
        )
    }

    #[must_use]
    pub fn is_read_only(self) -> bool {
        matches!(self, Self::Retrieve)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Insert => "insert",
            Self::Delete => "delete",
            Self::Merge => "merge",
            Self::Replace => "replace",
            Self::InsertOrMerge => "insert-or-merge",
            Self::InsertOrReplace => "insert-or-replace",
            Self::Retrieve => "retrieve",
        };
        write!(f, "{s}")
    }
}

/// A single table operation with its payload.
///
/// Writes carry the full entity. For [`TableOperation::Delete`] the entity
/// should hold every property that has to come back if the delete is undone,
/// since the store keeps nothing once it is gone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "kebab-case")]
pub enum TableOperation {
    Insert(Entity),
    Delete(Entity),
    Merge(Entity),
    Replace(Entity),
    InsertOrMerge(Entity),
    InsertOrReplace(Entity),
    Retrieve(EntityKey),
}

impl TableOperation {
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Insert(_) => OperationKind::Insert,
            Self::Delete(_) => OperationKind::Delete,
            Self::Merge(_) => OperationKind::Merge,
            Self::Replace(_) => OperationKind::Replace,
            Self::InsertOrMerge(_) => OperationKind::InsertOrMerge,
            Self::InsertOrReplace(_) => OperationKind::InsertOrReplace,
            Self::Retrieve(_) => OperationKind::Retrieve,
        }
    }

    #[must_use]
    pub fn key(&self) -> &EntityKey {
        match self {
            Self::Retrieve(key) => key,
            Self::Insert(entity)
            | Self::Delete(entity)
            | Self::Merge(entity)
            | Self::Replace(entity)
            | Self::InsertOrMerge(entity)
            | Self::InsertOrReplace(entity) => &entity.key,
        }
    }

    /// The entity a write operation targets; `None` for reads.
    #[must_use]
    pub fn entity(&self) -> Option<&Entity> {
        match self {
            Self::Retrieve(_) => None,
            Self::Insert(entity)
            | Self::Delete(entity)
            | Self::Merge(entity)
            | Self::Replace(entity)
            | Self::InsertOrMerge(entity)
            | Self::InsertOrReplace(entity) => Some(entity),
        }
    }

    #[must_use]
    pub fn entity_mut(&mut self) -> Option<&mut Entity> {
        match self {
            Self::Retrieve(_) => None,
            Self::Insert(entity)
            | Self::Delete(entity)
            | Self::Merge(entity)
            | Self::Replace(entity)
            | Self::InsertOrMerge(entity)
            | Self::InsertOrReplace(entity) => Some(entity),
        }
    }
}

/// Outcome of a successfully executed operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableResult {
    /// The entity as stored after the operation; for a retrieve, the entity
    /// read, if any.
    pub entity: Option<Entity>,
    /// Concurrency token issued by the store for the written entity.
    pub etag: Option<ETag>,
}

impl TableResult {
    #[must_use]
    pub fn written(entity: Entity, etag: ETag) -> Self {
        Self {
            entity: Some(entity),
            etag: Some(etag),
        }
    }

    #[must_use]
    pub fn deleted() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn retrieved(entity: Option<Entity>) -> Self {
        let etag = entity.as_ref().and_then(|e| e.etag.clone());
        Self { entity, etag }
    }
}
