use std::collections::{BTreeMap, HashSet};

use tablesaga_core::{
    ETag, Entity, EntityKey, OperationKind, StoreError, TableOperation, TableResult,
};

use crate::MAX_BATCH_SIZE;

pub(crate) type Rows = BTreeMap<EntityKey, Entity>;

/// Monotonic token source; a fresh token is issued for every write.
#[derive(Debug, Clone, Default)]
pub(crate) struct ETagSequence {
    next: u64,
}

impl ETagSequence {
    pub(crate) fn issue(&mut self) -> ETag {
        self.next += 1;
        ETag::new(format!("W/\"{}\"", self.next))
    }
}

pub(crate) fn apply(
    table: &str,
    rows: &mut Rows,
    etags: &mut ETagSequence,
    operation: &TableOperation,
) -> Result<TableResult, StoreError> {
    match operation {
        TableOperation::Retrieve(key) => Ok(TableResult::retrieved(rows.get(key).cloned())),
        TableOperation::Insert(entity) => {
            if rows.contains_key(&entity.key) {
                return Err(StoreError::Conflict {
                    table: table.to_string(),
                    key: entity.key.clone(),
                });
            }
            Ok(store(rows, etags, entity.clone()))
        }
        TableOperation::Delete(entity) => {
            check_precondition(table, rows, entity, OperationKind::Delete)?;
            rows.remove(&entity.key);
            Ok(TableResult::deleted())
        }
        TableOperation::Merge(entity) => {
            let current = check_precondition(table, rows, entity, OperationKind::Merge)?;
            Ok(store(rows, etags, merged(current, entity)))
        }
        TableOperation::Replace(entity) => {
            check_precondition(table, rows, entity, OperationKind::Replace)?;
            Ok(store(rows, etags, entity.clone()))
        }
        TableOperation::InsertOrMerge(entity) => {
            let next = match rows.get(&entity.key) {
                Some(current) => merged(current.clone(), entity),
                None => entity.clone(),
            };
            Ok(store(rows, etags, next))
        }
        TableOperation::InsertOrReplace(entity) => Ok(store(rows, etags, entity.clone())),
    }
}

/// Validates a batch before any operation in it is applied.
pub(crate) fn validate_batch(table: &str, operations: &[TableOperation]) -> Result<(), StoreError> {
    let invalid = |message: String| StoreError::Validation {
        table: table.to_string(),
        message,
    };

    let Some(first) = operations.first() else {
        return Err(invalid("batch contains no operations".to_string()));
    };

    if operations.len() > MAX_BATCH_SIZE {
        return Err(invalid(format!(
            "batch contains {} operations, at most {MAX_BATCH_SIZE} are allowed",
            operations.len()
        )));
    }

    if operations.len() > 1
        && operations
            .iter()
            .any(|op| op.kind() == OperationKind::Retrieve)
    {
        return Err(invalid(
            "a retrieve must be the only operation in a batch".to_string(),
        ));
    }

    let partition = &first.key().partition_key;
    let mut seen = HashSet::new();
    for op in operations {
        let key = op.key();
        if &key.partition_key != partition {
            return Err(invalid(format!(
                "batch spans partitions '{partition}' and '{}'",
                key.partition_key
            )));
        }
        if !seen.insert(&key.row_key) {
            return Err(invalid(format!("entity '{key}' appears more than once in batch")));
        }
    }

    Ok(())
}

fn store(rows: &mut Rows, etags: &mut ETagSequence, entity: Entity) -> TableResult {
    let etag = etags.issue();
    let stored = entity.with_etag(etag.clone());
    rows.insert(stored.key.clone(), stored.clone());
    TableResult::written(stored, etag)
}

fn merged(mut current: Entity, update: &Entity) -> Entity {
    for (name, value) in &update.properties {
        current.properties.insert(name.clone(), value.clone());
    }
    current
}

fn check_precondition(
    table: &str,
    rows: &Rows,
    entity: &Entity,
    kind: OperationKind,
) -> Result<Entity, StoreError> {
    let Some(token) = &entity.etag else {
        return Err(StoreError::Validation {
            table: table.to_string(),
            message: format!("{kind} of '{}' requires a concurrency token", entity.key),
        });
    };

    let Some(current) = rows.get(&entity.key) else {
        return Err(StoreError::NotFound {
            table: table.to_string(),
            key: entity.key.clone(),
        });
    };

    let stored = current.etag.clone().unwrap_or_else(ETag::any);
    if !token.permits(&stored) {
        return Err(StoreError::PreconditionFailed {
            table: table.to_string(),
            key: entity.key.clone(),
        });
    }

    Ok(current.clone())
}
