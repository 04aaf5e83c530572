//! Integration tests for all-or-nothing batches run through a scope.

use std::time::Duration;

use tablesaga::{CompensationScope, OperationStatus, ScopeError};
use tablesaga_core::{Entity, EntityKey, OperationKind, StoreError, TableOperation};
use tablesaga_memory::{CallMethod, Fault, MemoryTableStore};

const LINES: &str = "order_lines";
const TIMEOUT: Duration = Duration::from_secs(5);

fn line(order: &str, number: u32) -> Entity {
    Entity::new(order, format!("{number:03}"))
        .with_property("sku", format!("SKU-{number}"))
        .with_property("quantity", 1)
}

fn rows(store: &MemoryTableStore) -> Vec<Entity> {
    store
        .snapshot(LINES)
        .into_iter()
        .map(Entity::without_etag)
        .collect()
}

#[test]
fn unconfirmed_batch_is_undone_in_reverse_batch_order() -> anyhow::Result<()> {
    let store = MemoryTableStore::new();
    let batch: Vec<TableOperation> = (1..=3)
        .map(|n| TableOperation::Insert(line("o-1", n)))
        .collect();

    let mut scope = CompensationScope::open(&store, TIMEOUT);
    let tracked = scope.execute_batch(LINES, &batch, None, None)?;
    assert_eq!(tracked.value.len(), 3);
    assert!(tracked.is_compensable());
    assert_eq!(scope.pending(), 3);

    store.clear_calls();
    scope.dispose()?;

    let undone: Vec<String> = store
        .calls()
        .into_iter()
        .map(|call| call.keys[0].row_key.clone())
        .collect();
    assert_eq!(undone, vec!["003", "002", "001"]);
    assert!(store.snapshot(LINES).is_empty());
    Ok(())
}

#[test]
fn confirmed_batch_is_kept() -> anyhow::Result<()> {
    let store = MemoryTableStore::new();
    let batch: Vec<TableOperation> = (1..=2)
        .map(|n| TableOperation::Insert(line("o-1", n)))
        .collect();

    let mut scope = CompensationScope::open(&store, TIMEOUT);
    scope.execute_batch(LINES, &batch, None, None)?;
    scope.confirm()?;
    scope.dispose()?;

    assert_eq!(rows(&store), vec![line("o-1", 1), line("o-1", 2)]);
    Ok(())
}

#[test]
fn prior_state_is_read_before_the_batch_is_submitted() -> anyhow::Result<()> {
    let store = MemoryTableStore::new();
    store.seed(LINES, line("o-1", 1));
    let batch = vec![
        TableOperation::InsertOrMerge(Entity::new("o-1", "001").with_property("quantity", 4)),
        TableOperation::InsertOrReplace(line("o-1", 2)),
        TableOperation::Insert(line("o-1", 3)),
    ];

    let mut scope = CompensationScope::open(&store, TIMEOUT);
    scope.execute_batch(LINES, &batch, None, None)?;

    let methods: Vec<CallMethod> = store.calls().iter().map(|call| call.method).collect();
    assert_eq!(
        methods,
        vec![CallMethod::Retrieve, CallMethod::Retrieve, CallMethod::Batch]
    );
    scope.confirm()?;
    Ok(())
}

#[test]
fn mixed_batch_round_trips() -> anyhow::Result<()> {
    let store = MemoryTableStore::new();
    let first = store.seed(LINES, line("o-1", 1));
    let second = store.seed(LINES, line("o-1", 2));
    store.seed(LINES, line("o-1", 3));
    let before = rows(&store);
    let batch = vec![
        TableOperation::Merge(
            Entity::new("o-1", "001")
                .with_property("quantity", 9)
                .with_etag(first.etag.clone().expect("seeded token")),
        ),
        TableOperation::Delete(second),
        TableOperation::InsertOrMerge(Entity::new("o-1", "003").with_property("note", "gift")),
        TableOperation::InsertOrReplace(line("o-1", 4)),
        TableOperation::Insert(line("o-1", 5)),
    ];

    let mut scope = CompensationScope::open(&store, TIMEOUT);
    scope.execute_batch(LINES, &batch, None, None)?;
    assert_eq!(scope.pending(), 5);
    scope.dispose()?;

    assert_eq!(rows(&store), before);
    Ok(())
}

#[test]
fn rejected_batch_records_nothing_and_changes_nothing() -> anyhow::Result<()> {
    let store = MemoryTableStore::new();
    store.seed(LINES, line("o-1", 2));
    let before = rows(&store);
    let batch = vec![
        TableOperation::Insert(line("o-1", 1)),
        TableOperation::Insert(line("o-1", 2)),
    ];

    let mut scope = CompensationScope::open(&store, TIMEOUT);
    let err = scope
        .execute_batch(LINES, &batch, None, None)
        .expect_err("batch with a conflicting insert should fail");

    assert!(matches!(err, ScopeError::Store(ref e) if e.is_conflict()));
    assert_eq!(scope.pending(), 0);
    assert_eq!(rows(&store), before);
    assert!(
        scope
            .audit_log()
            .records()
            .iter()
            .all(|record| record.status == OperationStatus::Failed)
    );
    scope.dispose()?;
    assert_eq!(rows(&store), before);
    Ok(())
}

#[test]
fn batch_failure_keeps_earlier_operations_compensable() -> anyhow::Result<()> {
    let store = MemoryTableStore::new();
    store.inject(Fault::on_batch(StoreError::Throttled {
        table: LINES.to_string(),
    }));

    let mut scope = CompensationScope::open(&store, TIMEOUT);
    scope.execute(LINES, &TableOperation::Insert(line("o-1", 1)), None, None)?;
    let result = scope.execute_batch(
        LINES,
        &[TableOperation::Insert(line("o-2", 1))],
        None,
        None,
    );
    assert!(result.is_err());
    assert_eq!(scope.pending(), 1);

    scope.dispose()?;
    assert!(store.snapshot(LINES).is_empty());
    Ok(())
}

#[test]
fn cross_partition_batch_is_rejected() {
    let store = MemoryTableStore::new();
    let batch = vec![
        TableOperation::Insert(line("o-1", 1)),
        TableOperation::Insert(line("o-2", 1)),
    ];

    let mut scope = CompensationScope::open(&store, TIMEOUT);
    let err = scope
        .execute_batch(LINES, &batch, None, None)
        .expect_err("batch spanning partitions should fail");

    assert!(matches!(
        err,
        ScopeError::Store(StoreError::Validation { .. })
    ));
    assert!(store.snapshot(LINES).is_empty());
}

#[test]
fn batch_and_single_operations_unwind_together() -> anyhow::Result<()> {
    let store = MemoryTableStore::new();

    let mut scope = CompensationScope::open(&store, TIMEOUT);
    scope.execute(LINES, &TableOperation::Insert(line("o-1", 1)), None, None)?;
    scope.execute_batch(
        LINES,
        &[
            TableOperation::Insert(line("o-1", 2)),
            TableOperation::Insert(line("o-1", 3)),
        ],
        None,
        None,
    )?;
    scope.execute(LINES, &TableOperation::Insert(line("o-1", 4)), None, None)?;

    store.clear_calls();
    scope.dispose()?;

    let undone: Vec<(OperationKind, EntityKey)> = store
        .calls()
        .into_iter()
        .map(|call| (call.kinds[0], call.keys[0].clone()))
        .collect();
    let expected: Vec<(OperationKind, EntityKey)> = ["004", "003", "002", "001"]
        .into_iter()
        .map(|row| (OperationKind::Delete, EntityKey::new("o-1", row)))
        .collect();
    assert_eq!(undone, expected);
    Ok(())
}

#[test]
fn single_write_after_a_batch_unwinds_with_it() -> anyhow::Result<()> {
    let store = MemoryTableStore::new();
    store.seed(LINES, line("o-1", 9));
    let before = rows(&store);

    let mut scope = CompensationScope::open(&store, TIMEOUT);
    let tracked = scope.execute_batch(
        LINES,
        &[
            TableOperation::Insert(line("o-1", 1)),
            TableOperation::Insert(line("o-1", 2)),
            TableOperation::InsertOrMerge(Entity::new("o-1", "009").with_property("quantity", 3)),
        ],
        None,
        None,
    )?;
    let second = tracked.value[1]
        .entity
        .clone()
        .expect("batch insert returns the stored entity");
    scope.execute(
        LINES,
        &TableOperation::Merge(
            Entity::new("o-1", "002")
                .with_property("quantity", 5)
                .with_etag(second.etag.clone().expect("stored entity has a token")),
        ),
        None,
        None,
    )?;
    let ninth = store
        .get(LINES, &EntityKey::new("o-1", "009"))
        .expect("seeded line exists");
    scope.execute(LINES, &TableOperation::Delete(ninth), None, None)?;

    scope.dispose()?;

    assert_eq!(rows(&store), before);
    Ok(())
}
