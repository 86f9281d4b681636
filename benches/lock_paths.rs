//! Lock acquisition path benchmarks
//!
//! Exercises the three orchestrator paths separately:
//! - `ensure_cold`: full intent-chain acquisition from an empty table
//! - `ensure_hot`: the short-circuit path, where effective coverage already
//!   satisfies the request and no lock operation runs
//! - `ensure_escalate`: intent-lock collapse of a populated subtree
//!
//! ## Running
//!
//! ```bash
//! cargo bench --bench lock_paths
//! ```

use canopy::{ensure_sufficient_lock_held, LockHierarchy, LockType, TxnId};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use std::sync::Arc;

const TXN: TxnId = TxnId::new(1);

fn bench_ensure_cold(c: &mut Criterion) {
    c.bench_function("ensure_cold/row_read", |b| {
        b.iter_batched(
            || {
                let hierarchy = LockHierarchy::new("db");
                let row = hierarchy.root().child("orders").child("row-1");
                (hierarchy, row)
            },
            |(hierarchy, row)| {
                ensure_sufficient_lock_held(Some(TXN), Some(&row), LockType::S).unwrap();
                black_box(hierarchy);
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_ensure_hot(c: &mut Criterion) {
    let hierarchy = LockHierarchy::new("db");
    let row = hierarchy.root().child("orders").child("row-1");
    ensure_sufficient_lock_held(Some(TXN), Some(&row), LockType::X).unwrap();

    c.bench_function("ensure_hot/satisfied_read", |b| {
        b.iter(|| {
            ensure_sufficient_lock_held(Some(TXN), black_box(Some(&row)), LockType::S).unwrap();
        })
    });
}

fn bench_ensure_escalate(c: &mut Criterion) {
    c.bench_function("ensure_escalate/collapse_32_rows", |b| {
        b.iter_batched(
            || {
                let hierarchy = LockHierarchy::new("db");
                let table = hierarchy.root().child("orders");
                for i in 0..32 {
                    let row = table.child(&format!("row-{}", i));
                    ensure_sufficient_lock_held(Some(TXN), Some(&row), LockType::S).unwrap();
                }
                (hierarchy, table)
            },
            |(hierarchy, table)| {
                ensure_sufficient_lock_held(Some(TXN), Some(&table), LockType::S).unwrap();
                black_box((hierarchy, Arc::clone(&table)));
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    bench_ensure_cold,
    bench_ensure_hot,
    bench_ensure_escalate
);
criterion_main!(benches);
