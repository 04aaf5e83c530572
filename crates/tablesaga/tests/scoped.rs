//! Integration tests for running a unit of work as a block.

use std::time::Duration;

use tablesaga::{ScopeError, UndoPolicy, UnitOfWorkError, scoped, scoped_with_policy};
use tablesaga_core::{Entity, EntityKey, RetryPolicy, TableOperation, TableStore};
use tablesaga_memory::MemoryTableStore;

const USERS: &str = "users";
const TIMEOUT: Duration = Duration::from_secs(5);

fn user(id: &str) -> Entity {
    Entity::new("tenant", id).with_property("name", id)
}

#[test]
fn confirmed_work_keeps_its_effects() -> anyhow::Result<()> {
    let store = MemoryTableStore::new();

    let count = scoped(&store, TIMEOUT, |scope| -> Result<usize, ScopeError> {
        scope.execute(USERS, &TableOperation::Insert(user("u-1")), None, None)?;
        scope.execute(USERS, &TableOperation::Insert(user("u-2")), None, None)?;
        scope.confirm()?;
        Ok(scope.pending())
    })
    .map_err(|err| anyhow::anyhow!("{err}"))?;

    assert_eq!(count, 2);
    assert_eq!(store.snapshot(USERS).len(), 2);
    Ok(())
}

#[test]
fn unconfirmed_successful_work_is_compensated() -> anyhow::Result<()> {
    let store = MemoryTableStore::new();

    scoped(&store, TIMEOUT, |scope| -> Result<(), ScopeError> {
        scope.execute(USERS, &TableOperation::Insert(user("u-1")), None, None)?;
        Ok(())
    })
    .map_err(|err| anyhow::anyhow!("{err}"))?;

    assert!(store.snapshot(USERS).is_empty());
    Ok(())
}

#[test]
fn failed_work_is_compensated_and_reported() {
    let store = MemoryTableStore::new();

    let result = scoped(&store, TIMEOUT, |scope| -> Result<(), String> {
        scope
            .execute(USERS, &TableOperation::Insert(user("u-1")), None, None)
            .map_err(|e| e.to_string())?;
        Err("quota exceeded".to_string())
    });

    match result {
        Err(UnitOfWorkError::WorkFailed {
            source,
            compensated,
        }) => {
            assert_eq!(source, "quota exceeded");
            assert_eq!(compensated, 1);
        }
        other => panic!("expected WorkFailed, got {other:?}"),
    }
    assert!(store.snapshot(USERS).is_empty());
}

#[test]
fn store_error_inside_work_unwinds_earlier_writes() {
    let store = MemoryTableStore::new();
    store.seed(USERS, user("u-2"));

    let result = scoped(&store, TIMEOUT, |scope| -> Result<(), ScopeError> {
        scope.execute(USERS, &TableOperation::Insert(user("u-1")), None, None)?;
        scope.execute(USERS, &TableOperation::Insert(user("u-2")), None, None)?;
        scope.confirm()
    });

    assert!(matches!(
        result,
        Err(UnitOfWorkError::WorkFailed {
            source: ScopeError::Store(_),
            compensated: 1,
        })
    ));
    let remaining: Vec<String> = store
        .snapshot(USERS)
        .into_iter()
        .map(|e| e.key.row_key)
        .collect();
    assert_eq!(remaining, vec!["u-2".to_string()]);
}

#[test]
fn compensation_failure_keeps_the_work_error_apart() {
    let store = MemoryTableStore::new();
    let key = EntityKey::new("tenant", "u-1");

    let result = scoped(&store, TIMEOUT, |scope| -> Result<(), String> {
        scope
            .execute(USERS, &TableOperation::Insert(user("u-1")), None, None)
            .map_err(|e| e.to_string())?;
        let current = store.get(USERS, &key).ok_or("missing")?;
        store
            .execute(
                USERS,
                &TableOperation::Replace(user("u-1").with_etag(
                    current.etag.ok_or("no token")?,
                )),
                None,
                None,
            )
            .map_err(|e| e.to_string())?;
        Err("validation failed".to_string())
    });

    match result {
        Err(UnitOfWorkError::CompensationFailed {
            work_error,
            compensation,
        }) => {
            assert_eq!(work_error.as_deref(), Some("validation failed"));
            assert_eq!(compensation.failures.len(), 1);
            assert_eq!(compensation.failures[0].key, key);
        }
        other => panic!("expected CompensationFailed, got {other:?}"),
    }
}

#[test]
fn compensation_failure_after_successful_work_has_no_work_error() {
    let store = MemoryTableStore::new();
    let key = EntityKey::new("tenant", "u-1");

    let result = scoped(&store, TIMEOUT, |scope| -> Result<(), ScopeError> {
        scope.execute(USERS, &TableOperation::Insert(user("u-1")), None, None)?;
        let current = store.get(USERS, &key).ok_or(ScopeError::AlreadyDisposed)?;
        store.execute(
            USERS,
            &TableOperation::Delete(current),
            None,
            None,
        )?;
        Ok(())
    });

    assert!(matches!(
        result,
        Err(UnitOfWorkError::CompensationFailed {
            work_error: None,
            ..
        })
    ));
}

#[test]
fn explicit_policy_governs_undo_writes() -> anyhow::Result<()> {
    let store = MemoryTableStore::new();
    let policy = UndoPolicy::new(Duration::from_secs(2)).with_retry(RetryPolicy::NoRetry);

    scoped_with_policy(&store, policy, |scope| -> Result<(), ScopeError> {
        scope.execute(USERS, &TableOperation::Insert(user("u-1")), None, None)?;
        Ok(())
    })
    .map_err(|err| anyhow::anyhow!("{err}"))?;

    let undo = store.calls().pop().expect("an undo call was made");
    assert_eq!(undo.options, Some(policy.request_options()));
    Ok(())
}
