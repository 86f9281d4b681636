//! End-to-end lock acquisition scenarios
//!
//! These tests drive the public API the way the engine's access layer does:
//! build a hierarchy, call `ensure_sufficient_lock_held` for the access an
//! operation needs, and check the exact set of locks that results.

use canopy::{
    ensure_sufficient_lock_held, LockHierarchy, LockType, ResourceNode, TxnId,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const T1: TxnId = TxnId::new(1);
const T2: TxnId = TxnId::new(2);

fn three_levels() -> (LockHierarchy, Arc<ResourceNode>, Arc<ResourceNode>, Arc<ResourceNode>) {
    let hierarchy = LockHierarchy::new("db");
    let db = Arc::clone(hierarchy.root());
    let table = db.child("orders");
    let row = table.child("row-19");
    (hierarchy, db, table, row)
}

#[test]
fn cold_row_read_takes_the_full_intent_chain() {
    let (h, db, table, row) = three_levels();

    ensure_sufficient_lock_held(Some(T1), Some(&row), LockType::S).unwrap();

    // Root-to-leaf: IS on db, IS on table, S on row
    assert_eq!(
        h.manager().locks_held(T1),
        vec![
            (db.name().clone(), LockType::IS),
            (table.name().clone(), LockType::IS),
            (row.name().clone(), LockType::S),
        ]
    );
}

#[test]
fn read_request_over_a_write_intent_merges_into_six() {
    let (h, db, table, row) = three_levels();
    db.acquire(T1, LockType::IX).unwrap();
    table.acquire(T1, LockType::IX).unwrap();

    // The transaction intends to write rows and now also wants to read the
    // whole table
    ensure_sufficient_lock_held(Some(T1), Some(&table), LockType::S).unwrap();

    assert_eq!(table.explicit_type(T1), LockType::SIX);
    assert_eq!(db.explicit_type(T1), LockType::IX);
    // The rows need no locks of their own: SIX's shared half covers them
    assert_eq!(row.explicit_type(T1), LockType::NL);
    assert_eq!(row.effective_type(T1), LockType::S);
    assert_eq!(h.manager().locks_held(T1).len(), 2);
}

#[test]
fn inherited_read_coverage_makes_the_call_free() {
    let (h, _db, table, row) = three_levels();
    ensure_sufficient_lock_held(Some(T1), Some(&table), LockType::S).unwrap();

    let before = h.manager().operation_count();
    ensure_sufficient_lock_held(Some(T1), Some(&row), LockType::S).unwrap();

    assert_eq!(h.manager().operation_count(), before);
    assert_eq!(row.explicit_type(T1), LockType::NL);
    assert_eq!(row.effective_type(T1), LockType::S);
}

#[test]
fn write_request_upgrades_the_intent_chain() {
    let (_h, db, table, row) = three_levels();
    db.acquire(T1, LockType::IS).unwrap();
    table.acquire(T1, LockType::IS).unwrap();

    ensure_sufficient_lock_held(Some(T1), Some(&row), LockType::X).unwrap();

    assert_eq!(db.explicit_type(T1), LockType::IX);
    assert_eq!(table.explicit_type(T1), LockType::IX);
    assert_eq!(row.explicit_type(T1), LockType::X);
}

#[test]
fn exclusive_table_request_escalates_and_drops_row_locks() {
    let (h, db, table, row) = three_levels();
    // One row already read through the normal path
    ensure_sufficient_lock_held(Some(T1), Some(&row), LockType::S).unwrap();

    // Now the whole table is wanted exclusively
    ensure_sufficient_lock_held(Some(T1), Some(&table), LockType::X).unwrap();

    assert_eq!(db.explicit_type(T1), LockType::IX);
    assert_eq!(table.explicit_type(T1), LockType::X);
    assert_eq!(row.explicit_type(T1), LockType::NL);
    assert_eq!(row.effective_type(T1), LockType::X);
    assert_eq!(h.manager().locks_held(T1).len(), 2);
}

#[test]
fn repeated_requests_perform_zero_operations() {
    let (h, _db, _table, row) = three_levels();

    for request in [LockType::S, LockType::X] {
        ensure_sufficient_lock_held(Some(T1), Some(&row), request).unwrap();
        let before = h.manager().operation_count();
        ensure_sufficient_lock_held(Some(T1), Some(&row), request).unwrap();
        assert_eq!(h.manager().operation_count(), before, "{} again", request);
    }
}

#[test]
fn weaker_request_after_stronger_is_free() {
    let (h, _db, _table, row) = three_levels();
    ensure_sufficient_lock_held(Some(T1), Some(&row), LockType::X).unwrap();

    let before = h.manager().operation_count();
    ensure_sufficient_lock_held(Some(T1), Some(&row), LockType::S).unwrap();
    ensure_sufficient_lock_held(Some(T1), Some(&row), LockType::NL).unwrap();
    assert_eq!(h.manager().operation_count(), before);
}

#[test]
fn two_readers_share_the_hierarchy() {
    let (_h, db, table, _row) = three_levels();
    let row_a = table.child("row-1");
    let row_b = table.child("row-2");

    ensure_sufficient_lock_held(Some(T1), Some(&row_a), LockType::S).unwrap();
    ensure_sufficient_lock_held(Some(T2), Some(&row_b), LockType::S).unwrap();

    assert_eq!(db.explicit_type(T1), LockType::IS);
    assert_eq!(db.explicit_type(T2), LockType::IS);
    assert_eq!(row_a.effective_type(T1), LockType::S);
    assert_eq!(row_b.effective_type(T2), LockType::S);
}

#[test]
fn reader_and_writer_of_different_rows_share_the_table() {
    let (_h, _db, table, _row) = three_levels();
    let row_a = table.child("row-1");
    let row_b = table.child("row-2");

    ensure_sufficient_lock_held(Some(T1), Some(&row_a), LockType::S).unwrap();
    // IX and IS are compatible at the db and table; different rows never meet
    ensure_sufficient_lock_held(Some(T2), Some(&row_b), LockType::X).unwrap();

    assert_eq!(table.explicit_type(T1), LockType::IS);
    assert_eq!(table.explicit_type(T2), LockType::IX);
    assert_eq!(row_b.explicit_type(T2), LockType::X);
}

#[test]
fn writer_blocks_behind_a_table_reader_until_release() {
    let hierarchy = Arc::new(LockHierarchy::new("db"));
    let table = hierarchy.root().child("orders");
    ensure_sufficient_lock_held(Some(T1), Some(&table), LockType::S).unwrap();

    let writer = {
        let hierarchy = Arc::clone(&hierarchy);
        thread::spawn(move || {
            let row = hierarchy.root().child("orders").child("row-1");
            ensure_sufficient_lock_held(Some(T2), Some(&row), LockType::X)
        })
    };

    thread::sleep(Duration::from_millis(50));
    // T2's IX on the table is incompatible with T1's S and waits
    assert!(!writer.is_finished());

    // Release leaf-to-root
    table.release(T1).unwrap();
    hierarchy.root().release(T1).unwrap();

    writer.join().unwrap().unwrap();
    let row = hierarchy.root().child("orders").child("row-1");
    assert_eq!(row.explicit_type(T2), LockType::X);
}

#[test]
fn speculative_calls_without_a_transaction_do_nothing() {
    let (h, _db, _table, row) = three_levels();

    ensure_sufficient_lock_held(None, Some(&row), LockType::X).unwrap();
    ensure_sufficient_lock_held(Some(T1), None, LockType::X).unwrap();
    ensure_sufficient_lock_held(None, None, LockType::S).unwrap();

    assert_eq!(h.manager().operation_count(), 0);
}
