//! Lock manager: grant sets, wait queues, and blocking
//!
//! The manager is the sole owner of lock state and the sole serialization
//! point of the subsystem. Every resource has a grant set (at most one lock
//! per transaction) and a FIFO wait queue; a single table mutex serializes
//! all state transitions.
//!
//! Blocking model:
//! - A request that cannot be granted parks the calling thread on a
//!   per-request gate until a release makes it grantable.
//! - Plain acquires wait at the back of the queue. Promotions and atomic
//!   acquire-and-release wait at the front: the caller already holds a grant
//!   on the resource, and queueing behind strangers could deadlock the
//!   transaction against itself.
//! - All request validation happens before a caller can block, so a blocked
//!   request never fails once granted.
//!
//! No deadlock detection and no timeouts live here; callers that always
//! request ancestors before descendants (the orchestrator does) avoid the
//! ordering-induced deadlocks this layer would otherwise be exposed to.

use canopy_core::{Error, LockType, ResourceName, Result, TxnId};
use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Gate a queued request's thread parks on until the request is granted
struct Gate {
    granted: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    fn new() -> Arc<Self> {
        Arc::new(Gate {
            granted: Mutex::new(false),
            cond: Condvar::new(),
        })
    }

    fn wait(&self) {
        let mut granted = self.granted.lock();
        while !*granted {
            self.cond.wait(&mut granted);
        }
    }

    fn open(&self) {
        let mut granted = self.granted.lock();
        *granted = true;
        self.cond.notify_one();
    }
}

/// A request parked in a resource's wait queue
struct QueuedRequest {
    txn: TxnId,
    lock_type: LockType,
    /// Locks to release atomically once the request is granted. Empty for
    /// plain acquires; promotions carry their own resource here.
    releases: Vec<ResourceName>,
    gate: Arc<Gate>,
}

/// Per-resource lock state
#[derive(Default)]
struct ResourceEntry {
    /// Granted locks, at most one per transaction
    granted: Vec<(TxnId, LockType)>,
    /// FIFO wait queue
    queue: VecDeque<QueuedRequest>,
}

/// The manager's table, guarded by a single mutex
#[derive(Default)]
struct TableState {
    resources: HashMap<ResourceName, ResourceEntry>,
    /// Locks held per transaction, in acquisition order
    held: HashMap<TxnId, Vec<(ResourceName, LockType)>>,
}

impl TableState {
    fn lock_type_of(&self, txn: TxnId, name: &ResourceName) -> LockType {
        self.resources
            .get(name)
            .and_then(|entry| {
                entry
                    .granted
                    .iter()
                    .find(|(holder, _)| *holder == txn)
                    .map(|(_, lock_type)| *lock_type)
            })
            .unwrap_or(LockType::NL)
    }

    /// Is `lock_type` compatible with every grant on `name` held by a
    /// transaction other than `txn`?
    ///
    /// The requester's own grant is always ignored: promotions and
    /// acquire-and-release replace it as part of the same transition.
    fn compatible_with_granted(&self, name: &ResourceName, txn: TxnId, lock_type: LockType) -> bool {
        self.resources.get(name).map_or(true, |entry| {
            entry
                .granted
                .iter()
                .filter(|(holder, _)| *holder != txn)
                .all(|(_, held)| held.compatible(lock_type))
        })
    }
}

/// Coordinates all lock state for one resource hierarchy
///
/// All lock-affecting calls from all transactions funnel through one
/// `LockManager`. The manager never interprets the hierarchy; ancestor
/// discipline is the caller's concern (see the hierarchy and orchestrator
/// modules).
pub struct LockManager {
    table: Mutex<TableState>,

    /// Count of successful state mutations (grants, updates, releases)
    ///
    /// Consumed by engine instrumentation; also what the idempotence tests
    /// mean by "zero lock operations were performed".
    operations: AtomicU64,
}

impl LockManager {
    /// Create an empty lock manager
    pub fn new() -> Self {
        LockManager {
            table: Mutex::new(TableState::default()),
            operations: AtomicU64::new(0),
        }
    }

    /// Number of successful lock-state mutations since creation
    pub fn operation_count(&self) -> u64 {
        self.operations.load(Ordering::SeqCst)
    }

    /// The lock `txn` holds directly on `name`, or NL
    ///
    /// Re-reads the table on every call; nothing is cached across calls.
    pub fn lock_type(&self, txn: TxnId, name: &ResourceName) -> LockType {
        self.table.lock().lock_type_of(txn, name)
    }

    /// Every lock `txn` holds, in acquisition order
    pub fn locks_held(&self, txn: TxnId) -> Vec<(ResourceName, LockType)> {
        self.table
            .lock()
            .held
            .get(&txn)
            .cloned()
            .unwrap_or_default()
    }

    /// Acquire `lock_type` on `name` for `txn`
    ///
    /// Grants immediately when the wait queue is empty and the type is
    /// compatible with every other grant; otherwise parks at the back of the
    /// queue until a release makes the request grantable.
    ///
    /// # Errors
    /// - [`Error::InvalidLockRequest`] when `lock_type` is NL
    /// - [`Error::DuplicateLockRequest`] when `txn` already holds a lock here
    pub fn acquire(&self, txn: TxnId, name: ResourceName, lock_type: LockType) -> Result<()> {
        if lock_type == LockType::NL {
            return Err(Error::invalid(format!(
                "cannot acquire NL on {}: release the lock instead",
                name
            )));
        }

        let gate = {
            let mut state = self.table.lock();
            if state.lock_type_of(txn, &name) != LockType::NL {
                return Err(Error::DuplicateLockRequest {
                    txn,
                    resource: name,
                });
            }

            let queue_empty = state
                .resources
                .get(&name)
                .map_or(true, |entry| entry.queue.is_empty());
            if queue_empty && state.compatible_with_granted(&name, txn, lock_type) {
                self.insert_grant(&mut state, txn, name.clone(), lock_type);
                debug!(txn = %txn, resource = %name, lock = %lock_type, "lock granted");
                return Ok(());
            }

            let gate = Gate::new();
            state
                .resources
                .entry(name.clone())
                .or_default()
                .queue
                .push_back(QueuedRequest {
                    txn,
                    lock_type,
                    releases: Vec::new(),
                    gate: gate.clone(),
                });
            debug!(txn = %txn, resource = %name, lock = %lock_type, "lock request queued");
            gate
        };

        gate.wait();
        Ok(())
    }

    /// Atomically acquire (or replace) the lock on `name` and release every
    /// lock named in `releases`
    ///
    /// This is the primitive behind escalation and SIX promotion: the new
    /// coarse lock and the releases of the fine locks it covers must be one
    /// state transition, so no other transaction observes the gap.
    ///
    /// Compatibility is checked against other transactions' grants only. A
    /// request that must wait jumps to the front of the queue.
    ///
    /// # Errors
    /// - [`Error::InvalidLockRequest`] when `lock_type` is NL
    /// - [`Error::NoLockHeld`] when some release is not held
    /// - [`Error::DuplicateLockRequest`] when `txn` already holds a lock on
    ///   `name` and `name` is not among the releases
    pub fn acquire_and_release(
        &self,
        txn: TxnId,
        name: ResourceName,
        lock_type: LockType,
        releases: &[ResourceName],
    ) -> Result<()> {
        if lock_type == LockType::NL {
            return Err(Error::invalid(format!(
                "cannot acquire NL on {}: release the lock instead",
                name
            )));
        }

        let gate = {
            let mut state = self.table.lock();
            for release in releases {
                if state.lock_type_of(txn, release) == LockType::NL {
                    return Err(Error::NoLockHeld {
                        txn,
                        resource: release.clone(),
                    });
                }
            }
            if state.lock_type_of(txn, &name) != LockType::NL && !releases.contains(&name) {
                return Err(Error::DuplicateLockRequest {
                    txn,
                    resource: name,
                });
            }

            if state.compatible_with_granted(&name, txn, lock_type) {
                let wake = self.grant_with_releases(&mut state, txn, &name, lock_type, releases);
                debug!(
                    txn = %txn, resource = %name, lock = %lock_type,
                    released = releases.len(), "lock granted with releases"
                );
                drop(state);
                for gate in wake {
                    gate.open();
                }
                return Ok(());
            }

            let gate = Gate::new();
            state
                .resources
                .entry(name.clone())
                .or_default()
                .queue
                .push_front(QueuedRequest {
                    txn,
                    lock_type,
                    releases: releases.to_vec(),
                    gate: gate.clone(),
                });
            debug!(txn = %txn, resource = %name, lock = %lock_type, "acquire-and-release queued");
            gate
        };

        gate.wait();
        Ok(())
    }

    /// Release the lock `txn` holds on `name`
    ///
    /// Wakes queued requests on `name` in FIFO order, stopping at the first
    /// that still cannot be granted.
    ///
    /// # Errors
    /// - [`Error::NoLockHeld`] when nothing is held
    pub fn release(&self, txn: TxnId, name: ResourceName) -> Result<()> {
        let wake = {
            let mut state = self.table.lock();
            if state.lock_type_of(txn, &name) == LockType::NL {
                return Err(Error::NoLockHeld {
                    txn,
                    resource: name,
                });
            }
            self.remove_grant(&mut state, txn, &name);
            debug!(txn = %txn, resource = %name, "lock released");
            let mut wake = SmallVec::new();
            self.pump_queues(&mut state, name, &mut wake);
            wake
        };

        for gate in wake {
            gate.open();
        }
        Ok(())
    }

    /// Promote the lock `txn` holds on `name` to a strictly stronger type
    ///
    /// Updates in place (keeping the lock's position in the transaction's
    /// acquisition order) when the new type is compatible with every other
    /// grant; otherwise waits at the front of the queue.
    ///
    /// # Errors
    /// - [`Error::NoLockHeld`] when nothing is held
    /// - [`Error::DuplicateLockRequest`] when `new_type` equals the held type
    /// - [`Error::InvalidLockRequest`] when `new_type` does not substitute
    ///   the held type
    pub fn promote(&self, txn: TxnId, name: ResourceName, new_type: LockType) -> Result<()> {
        let gate = {
            let mut state = self.table.lock();
            let held = state.lock_type_of(txn, &name);
            if held == LockType::NL {
                return Err(Error::NoLockHeld {
                    txn,
                    resource: name,
                });
            }
            if new_type == held {
                return Err(Error::DuplicateLockRequest {
                    txn,
                    resource: name,
                });
            }
            if !new_type.substitutes(held) {
                return Err(Error::invalid(format!(
                    "cannot promote {} to {} on {}",
                    held, new_type, name
                )));
            }

            if state.compatible_with_granted(&name, txn, new_type) {
                self.update_grant(&mut state, txn, &name, new_type);
                debug!(txn = %txn, resource = %name, from = %held, to = %new_type, "lock promoted");
                return Ok(());
            }

            let gate = Gate::new();
            state
                .resources
                .entry(name.clone())
                .or_default()
                .queue
                .push_front(QueuedRequest {
                    txn,
                    lock_type: new_type,
                    releases: Vec::new(),
                    gate: gate.clone(),
                });
            debug!(txn = %txn, resource = %name, to = %new_type, "promotion queued");
            gate
        };

        gate.wait();
        Ok(())
    }

    // --- state transitions (table mutex held) ---

    fn insert_grant(
        &self,
        state: &mut TableState,
        txn: TxnId,
        name: ResourceName,
        lock_type: LockType,
    ) {
        state
            .resources
            .entry(name.clone())
            .or_default()
            .granted
            .push((txn, lock_type));
        state.held.entry(txn).or_default().push((name, lock_type));
        self.operations.fetch_add(1, Ordering::SeqCst);
    }

    fn update_grant(
        &self,
        state: &mut TableState,
        txn: TxnId,
        name: &ResourceName,
        new_type: LockType,
    ) {
        if let Some(entry) = state.resources.get_mut(name) {
            if let Some(grant) = entry.granted.iter_mut().find(|(holder, _)| *holder == txn) {
                grant.1 = new_type;
            }
        }
        if let Some(held) = state.held.get_mut(&txn) {
            if let Some(lock) = held.iter_mut().find(|(held_name, _)| held_name == name) {
                lock.1 = new_type;
            }
        }
        self.operations.fetch_add(1, Ordering::SeqCst);
    }

    fn remove_grant(&self, state: &mut TableState, txn: TxnId, name: &ResourceName) {
        let mut removed = false;
        if let Some(entry) = state.resources.get_mut(name) {
            let before = entry.granted.len();
            entry.granted.retain(|(holder, _)| *holder != txn);
            removed = entry.granted.len() != before;
            if entry.granted.is_empty() && entry.queue.is_empty() {
                state.resources.remove(name);
            }
        }
        if let Some(held) = state.held.get_mut(&txn) {
            held.retain(|(held_name, _)| held_name != name);
            if held.is_empty() {
                state.held.remove(&txn);
            }
        }
        if removed {
            self.operations.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Grant a request that holds the table mutex and was checked
    /// compatible: replace or insert the grant on `name`, release everything
    /// in `releases`, and collect gates of requests those releases unblock.
    fn grant_with_releases(
        &self,
        state: &mut TableState,
        txn: TxnId,
        name: &ResourceName,
        lock_type: LockType,
        releases: &[ResourceName],
    ) -> SmallVec<[Arc<Gate>; 4]> {
        if state.lock_type_of(txn, name) != LockType::NL {
            self.update_grant(state, txn, name, lock_type);
        } else {
            self.insert_grant(state, txn, name.clone(), lock_type);
        }

        let mut wake = SmallVec::new();
        for release in releases {
            if release == name {
                continue; // already replaced by the grant above
            }
            self.remove_grant(state, txn, release);
            self.pump_queues(state, release.clone(), &mut wake);
        }
        wake
    }

    /// Grant queued requests that have become compatible, front to back,
    /// starting at `name` and following the queues of any resources those
    /// grants release in turn.
    fn pump_queues(
        &self,
        state: &mut TableState,
        name: ResourceName,
        wake: &mut SmallVec<[Arc<Gate>; 4]>,
    ) {
        let mut pending: VecDeque<ResourceName> = VecDeque::new();
        pending.push_back(name);

        while let Some(name) = pending.pop_front() {
            loop {
                let front = state.resources.get(&name).and_then(|entry| {
                    entry
                        .queue
                        .front()
                        .map(|request| (request.txn, request.lock_type))
                });
                let Some((txn, lock_type)) = front else { break };
                if !state.compatible_with_granted(&name, txn, lock_type) {
                    break;
                }

                let Some(request) = state
                    .resources
                    .get_mut(&name)
                    .and_then(|entry| entry.queue.pop_front())
                else {
                    break;
                };
                if state.lock_type_of(txn, &name) != LockType::NL {
                    self.update_grant(state, txn, &name, lock_type);
                } else {
                    self.insert_grant(state, txn, name.clone(), lock_type);
                }
                for release in &request.releases {
                    if release == &name {
                        continue;
                    }
                    self.remove_grant(state, txn, release);
                    pending.push_back(release.clone());
                }
                debug!(txn = %txn, resource = %name, lock = %lock_type, "queued lock granted");
                wake.push(request.gate);
            }
        }
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
