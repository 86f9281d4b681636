//! Declarative lock acquisition over the resource hierarchy
//!
//! Callers in the access layer say what access level they need at a node;
//! [`ensure_sufficient_lock_held`] computes and performs the minimal
//! sequence of acquire/promote/escalate operations, across the ancestor
//! chain and the node itself, that grants it. Higher layers should go
//! through this entry point instead of driving node operations directly.
//!
//! The algorithm is stateless: every decision re-reads the node's explicit
//! and effective types, so interleaving with other lock-affecting calls on
//! the same transaction stays correct. Ancestors are always brought up
//! before the node itself (root-to-leaf), which is what keeps an
//! intent-or-strong lock from ever being granted under missing ancestor
//! coverage.

use crate::hierarchy::ResourceNode;
use canopy_core::{LockType, Result, TxnId};
use std::sync::Arc;
use tracing::trace;

/// Ensure `txn` can perform actions requiring `request` at `node`
///
/// `request` must be S, X, or NL; anything else is a caller bug and panics.
/// An absent transaction or node makes the call a no-op, so it is safe to
/// call speculatively from code that may run outside a transaction.
///
/// The least permissive set of locks is taken:
/// - If the effective type already substitutes `request`, nothing happens.
/// - Explicit IX meeting a request for S merges into SIX: the transaction
///   keeps its write intent below and gains direct read coverage here.
/// - Any other explicit intent type means descendants hold locks; the node
///   is escalated (and promoted afterwards only when the collapsed lock is
///   still too weak for the request).
/// - Otherwise nothing is locked beneath the node, and it is acquired or
///   promoted directly to `request`.
///
/// In every mutating case the ancestor chain is fixed up first.
///
/// # Errors
/// Failures from the delegated acquire/promote/escalate primitives propagate
/// unmodified. With this case analysis they do not occur in normal use; one
/// surfacing indicates lock state mutated behind this layer's back.
pub fn ensure_sufficient_lock_held(
    txn: Option<TxnId>,
    node: Option<&Arc<ResourceNode>>,
    request: LockType,
) -> Result<()> {
    assert!(
        matches!(request, LockType::S | LockType::X | LockType::NL),
        "lock requests must be S, X, or NL, got {}",
        request
    );
    let (Some(txn), Some(node)) = (txn, node) else {
        return Ok(());
    };

    let effective = node.effective_type(txn);
    if effective.substitutes(request) {
        return Ok(());
    }
    let explicit = node.explicit_type(txn);
    trace!(
        txn = %txn, resource = %node.name(), request = %request,
        effective = %effective, explicit = %explicit, "insufficient lock, orchestrating"
    );

    // Read coverage on top of an existing write intent merges into SIX.
    // SIX needs nothing new from the ancestors (they already cover the IX
    // half), so the fixup below terminates immediately.
    if explicit == LockType::IX && request == LockType::S {
        ensure_ancestor_intent(txn, node.parent(), LockType::SIX)?;
        return node.promote(txn, LockType::SIX);
    }

    // Any other intent lock here means descendants hold locks for this
    // transaction; collapse them into one strong lock at this node rather
    // than leaving redundant fine-grained locks outstanding. A read-only
    // subtree collapses to S, so an X request may still need one promotion.
    if explicit.is_intent() {
        ensure_ancestor_intent(txn, node.parent(), request)?;
        node.escalate(txn)?;
        if !node.effective_type(txn).substitutes(request) {
            node.promote(txn, request)?;
        }
        return Ok(());
    }

    // Explicit NL, S, or X: no descendant holds a lock for this
    // transaction, so the node itself is locked directly.
    ensure_ancestor_intent(txn, node.parent(), request)?;
    apply_lock(txn, node, request)
}

/// Bring the ancestor chain up to the coverage `request` at a child of
/// `node` requires, root-to-leaf
///
/// Stops as soon as a node's explicit type already substitutes what is
/// required of it; by the tree structure its own ancestors are then already
/// satisfied too. A node explicitly holding S that would need IX gets the
/// composite SIX instead of holding both.
fn ensure_ancestor_intent(
    txn: TxnId,
    node: Option<Arc<ResourceNode>>,
    request: LockType,
) -> Result<()> {
    let Some(node) = node else {
        return Ok(());
    };
    let explicit = node.explicit_type(txn);
    let mut required = request.parent_lock();
    if explicit.substitutes(required) {
        return Ok(());
    }
    if explicit == LockType::S && required == LockType::IX {
        required = LockType::SIX;
    }
    ensure_ancestor_intent(txn, node.parent(), required)?;
    apply_lock(txn, &node, required)
}

/// Acquire `lock_type` when nothing is held at `node`, promote otherwise
///
/// Assumes the caller's case analysis guarantees `lock_type` is a valid
/// promotion target whenever a lock is already held.
fn apply_lock(txn: TxnId, node: &Arc<ResourceNode>, lock_type: LockType) -> Result<()> {
    if node.explicit_type(txn) == LockType::NL {
        node.acquire(txn, lock_type)
    } else {
        node.promote(txn, lock_type)
    }
}
