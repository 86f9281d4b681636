//! Lock-type lattice for multigranularity locking
//!
//! This module is the only place in the system that knows lock semantics.
//! Everything else (the lock manager, the resource hierarchy, the
//! orchestrator) consults these tables instead of hard-coding lattice facts.
//!
//! The six lock types form a non-total lattice:
//! - NL: no lock
//! - IS/IX: intent to take shared/exclusive locks somewhere below
//! - S/X: shared/exclusive access to this node and its whole subtree
//! - SIX: composite of S and IX (read here, write intent below)

use serde::{Deserialize, Serialize};
use std::fmt;

/// A lock type in the multigranularity protocol
///
/// `LockType` is a pure value: all relations between types are exposed as
/// total, side-effect-free functions on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockType {
    /// No lock
    NL,
    /// Intention shared: shared locks will be taken somewhere in the subtree
    IS,
    /// Intention exclusive: exclusive locks will be taken somewhere in the subtree
    IX,
    /// Shared access to this node and everything beneath it
    S,
    /// Shared access here plus intention exclusive beneath (S + IX)
    SIX,
    /// Exclusive access to this node and everything beneath it
    X,
}

impl LockType {
    /// Can two transactions hold `self` and `other` on the same resource at
    /// the same time?
    ///
    /// Compatibility is symmetric. NL is compatible with everything; X is
    /// compatible with nothing but NL.
    pub fn compatible(self, other: LockType) -> bool {
        use LockType::*;
        match (self, other) {
            (NL, _) | (_, NL) => true,
            (IS, X) | (X, IS) => false,
            (IS, _) | (_, IS) => true,
            (IX, IX) | (S, S) => true,
            _ => false,
        }
    }

    /// Does holding `self` satisfy a requirement of `want`?
    ///
    /// `a.substitutes(b)` holds exactly when every access granted by `b` is
    /// also granted by `a`. This is a partial order: S and IX are
    /// incomparable, SIX sits above both, X sits above everything.
    pub fn substitutes(self, want: LockType) -> bool {
        use LockType::*;
        match (self, want) {
            (_, NL) => true,
            (X, _) => true,
            (SIX, IS | IX | S | SIX) => true,
            (IS, IS) | (IX, IS | IX) | (S, S) => true,
            _ => false,
        }
    }

    /// The lock type every strict ancestor must (at least) hold before a
    /// transaction may take `self` on a node.
    ///
    /// SIX maps to NL: it is only ever produced in place, on top of a chain
    /// that already carries the coverage its S and IX components required.
    pub fn parent_lock(self) -> LockType {
        use LockType::*;
        match self {
            NL => NL,
            IS => IS,
            IX => IX,
            S => IS,
            X => IX,
            SIX => NL,
        }
    }

    /// Can a node holding `self` be the parent of a child lock of `child`?
    pub fn can_parent(self, child: LockType) -> bool {
        self.substitutes(child.parent_lock())
    }

    /// True for the intent types IS, IX, and SIX
    pub fn is_intent(self) -> bool {
        matches!(self, LockType::IS | LockType::IX | LockType::SIX)
    }
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LockType::NL => "NL",
            LockType::IS => "IS",
            LockType::IX => "IX",
            LockType::S => "S",
            LockType::SIX => "SIX",
            LockType::X => "X",
        };
        write!(f, "{}", name)
    }
}
