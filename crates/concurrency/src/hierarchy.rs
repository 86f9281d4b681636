//! Resource hierarchy: the tree of lockable resources
//!
//! A [`LockHierarchy`] owns the root [`ResourceNode`] and the shared
//! [`LockManager`]. Nodes form the resource tree (database → table → page →
//! record); each node knows its name, its parent (a weak reference, for
//! traversal only) and memoizes its children.
//!
//! Nodes hold no lock state themselves. `explicit_type`/`effective_type`
//! re-read the manager on every call, and the mutating operations (acquire,
//! promote, escalate, release) delegate to it after enforcing the
//! multigranularity constraints the manager itself does not know about.

use crate::manager::LockManager;
use canopy_core::{Error, LockType, ResourceName, Result, TxnId};
use dashmap::DashMap;
use smallvec::SmallVec;
use std::sync::{Arc, Weak};

/// The tree of lockable resources for one engine instance
///
/// Owns every node reachable from the root; node parent links are weak, so
/// dropping the hierarchy drops the tree.
pub struct LockHierarchy {
    manager: Arc<LockManager>,
    root: Arc<ResourceNode>,
}

impl LockHierarchy {
    /// Create a hierarchy with a fresh lock manager and the given root
    /// resource name (conventionally the database)
    pub fn new(root: impl Into<String>) -> Self {
        Self::with_manager(Arc::new(LockManager::new()), root)
    }

    /// Create a hierarchy sharing an existing lock manager
    pub fn with_manager(manager: Arc<LockManager>, root: impl Into<String>) -> Self {
        let root = Arc::new(ResourceNode {
            manager: Arc::clone(&manager),
            name: ResourceName::root(root),
            parent: Weak::new(),
            children: DashMap::new(),
        });
        LockHierarchy { manager, root }
    }

    /// The root node
    pub fn root(&self) -> &Arc<ResourceNode> {
        &self.root
    }

    /// The lock manager all nodes delegate to
    pub fn manager(&self) -> &Arc<LockManager> {
        &self.manager
    }
}

/// One element of the resource tree, as seen by one transaction at a time
///
/// All accessors take the transaction explicitly; a node carries no ambient
/// transaction state.
pub struct ResourceNode {
    manager: Arc<LockManager>,
    name: ResourceName,
    parent: Weak<ResourceNode>,
    children: DashMap<String, Arc<ResourceNode>>,
}

impl ResourceNode {
    /// This node's hierarchical name
    pub fn name(&self) -> &ResourceName {
        &self.name
    }

    /// The parent node, or `None` at the root
    pub fn parent(&self) -> Option<Arc<ResourceNode>> {
        self.parent.upgrade()
    }

    /// The child node for `segment`, created on first use
    pub fn child(self: &Arc<Self>, segment: &str) -> Arc<ResourceNode> {
        self.children
            .entry(segment.to_string())
            .or_insert_with(|| {
                Arc::new(ResourceNode {
                    manager: Arc::clone(&self.manager),
                    name: self.name.child(segment),
                    parent: Arc::downgrade(self),
                    children: DashMap::new(),
                })
            })
            .clone()
    }

    /// The lock `txn` holds directly on this node, or NL
    pub fn explicit_type(&self, txn: TxnId) -> LockType {
        self.manager.lock_type(txn, &self.name)
    }

    /// The access `txn` actually has at this node once ancestor coverage is
    /// accounted for
    ///
    /// The explicit type wins when one is held. Otherwise coverage is
    /// inherited: an ancestor's effective S or X applies here unchanged, an
    /// ancestor's SIX grants S (its shared half covers the subtree), and
    /// intent types grant nothing below themselves.
    pub fn effective_type(&self, txn: TxnId) -> LockType {
        let explicit = self.explicit_type(txn);
        if explicit != LockType::NL {
            return explicit;
        }
        match self.parent() {
            None => LockType::NL,
            Some(parent) => match parent.effective_type(txn) {
                LockType::SIX => LockType::S,
                inherited if inherited.is_intent() => LockType::NL,
                inherited => inherited,
            },
        }
    }

    /// Does some strict ancestor hold SIX for `txn`?
    pub fn has_six_ancestor(&self, txn: TxnId) -> bool {
        let mut current = self.parent();
        while let Some(node) = current {
            if node.explicit_type(txn) == LockType::SIX {
                return true;
            }
            current = node.parent();
        }
        false
    }

    /// Acquire `lock_type` here for `txn`
    ///
    /// Enforces the ancestor-coverage invariant before delegating: the
    /// parent's explicit lock must be able to parent `lock_type`.
    ///
    /// # Errors
    /// - [`Error::InvalidLockRequest`] when the parent's lock cannot parent
    ///   the request
    /// - manager errors: duplicate acquire, acquiring NL
    pub fn acquire(&self, txn: TxnId, lock_type: LockType) -> Result<()> {
        if let Some(parent) = self.parent() {
            let parent_held = parent.explicit_type(txn);
            if !parent_held.can_parent(lock_type) {
                return Err(Error::invalid(format!(
                    "cannot acquire {} on {}: parent {} holds {}",
                    lock_type,
                    self.name,
                    parent.name(),
                    parent_held
                )));
            }
        }
        self.manager.acquire(txn, self.name.clone(), lock_type)
    }

    /// Release the lock `txn` holds here
    ///
    /// Rejected while `txn` still holds any descendant lock: releasing an
    /// ancestor first would orphan the descendants' required coverage.
    ///
    /// # Errors
    /// - [`Error::InvalidLockRequest`] when descendant locks remain
    /// - [`Error::NoLockHeld`] when nothing is held here
    pub fn release(&self, txn: TxnId) -> Result<()> {
        let descendants = self.held_descendant_locks(txn);
        if let Some((descendant, _)) = descendants.first() {
            return Err(Error::invalid(format!(
                "cannot release {} while {} still holds a lock on descendant {}",
                self.name, txn, descendant
            )));
        }
        self.manager.release(txn, self.name.clone())
    }

    /// Promote the lock `txn` holds here to `new_type`
    ///
    /// Promotion to SIX is composite: it is rejected under an ancestor SIX
    /// (the composite would be redundant), and it atomically releases the
    /// transaction's S/IS locks on descendants, which the shared half of SIX
    /// makes redundant. All other promotions delegate directly; the lattice
    /// checks live in the manager.
    pub fn promote(&self, txn: TxnId, new_type: LockType) -> Result<()> {
        if new_type != LockType::SIX {
            return self.manager.promote(txn, self.name.clone(), new_type);
        }

        if self.has_six_ancestor(txn) {
            return Err(Error::invalid(format!(
                "cannot promote {} to SIX: an ancestor already holds SIX",
                self.name
            )));
        }
        let held = self.explicit_type(txn);
        if held == LockType::NL {
            return Err(Error::NoLockHeld {
                txn,
                resource: self.name.clone(),
            });
        }
        if held == LockType::SIX {
            return Err(Error::DuplicateLockRequest {
                txn,
                resource: self.name.clone(),
            });
        }
        if !LockType::SIX.substitutes(held) {
            return Err(Error::invalid(format!(
                "cannot promote {} to SIX on {}",
                held, self.name
            )));
        }

        let mut releases: SmallVec<[ResourceName; 8]> = self
            .held_descendant_locks(txn)
            .into_iter()
            .filter(|(_, lock_type)| matches!(lock_type, LockType::S | LockType::IS))
            .map(|(name, _)| name)
            .collect();
        releases.push(self.name.clone());
        self.manager
            .acquire_and_release(txn, self.name.clone(), LockType::SIX, &releases)
    }

    /// Escalate `txn`'s intent lock here
    ///
    /// Collapses the transaction's locks on this node and on all of its
    /// descendants (transitively) into a single lock here: S when everything
    /// collapsed is read-only (IS/S), X otherwise. The descendant locks are
    /// released in the same state transition.
    ///
    /// # Errors
    /// - [`Error::NoLockHeld`] when nothing is held here
    /// - [`Error::InvalidLockRequest`] when the explicit lock is not an
    ///   intent type
    pub fn escalate(&self, txn: TxnId) -> Result<()> {
        let held = self.explicit_type(txn);
        if held == LockType::NL {
            return Err(Error::NoLockHeld {
                txn,
                resource: self.name.clone(),
            });
        }
        if !held.is_intent() {
            return Err(Error::invalid(format!(
                "cannot escalate {}: explicit lock {} is not an intent lock",
                self.name, held
            )));
        }

        let descendants = self.held_descendant_locks(txn);
        let all_read = std::iter::once(held)
            .chain(descendants.iter().map(|(_, lock_type)| *lock_type))
            .all(|lock_type| matches!(lock_type, LockType::IS | LockType::S));
        let target = if all_read { LockType::S } else { LockType::X };

        let mut releases: SmallVec<[ResourceName; 8]> = descendants
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        releases.push(self.name.clone());
        self.manager
            .acquire_and_release(txn, self.name.clone(), target, &releases)
    }

    /// Every lock `txn` holds on a strict descendant of this node
    fn held_descendant_locks(&self, txn: TxnId) -> Vec<(ResourceName, LockType)> {
        self.manager
            .locks_held(txn)
            .into_iter()
            .filter(|(name, _)| name.is_descendant_of(&self.name))
            .collect()
    }
}
