//! Core identity types
//!
//! This module defines the two identities every lock operation is keyed by:
//! - TxnId: opaque transaction identity
//! - ResourceName: hierarchical position of a lockable resource

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identity of a transaction
///
/// The engine's transaction layer assigns these; this subsystem never
/// interprets the value beyond equality. "No active transaction" is modeled
/// as `Option<TxnId>` at the API boundary, never as a sentinel value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxnId(u64);

impl TxnId {
    /// Wrap a raw transaction number
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw transaction number
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hierarchical name of a lockable resource
///
/// A path of segments from the root of the resource tree, e.g.
/// `database/orders/page-4/row-19`. Resources are nested: a lock on a name
/// covers (or announces intent over) everything beneath it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceName {
    segments: Vec<String>,
}

impl ResourceName {
    /// A root-level resource (depth 1)
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            segments: vec![name.into()],
        }
    }

    /// The name of a direct child of this resource
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// The name of this resource's parent, or `None` at the root
    pub fn parent(&self) -> Option<ResourceName> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Path segments from the root, in order
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of levels from the root (root resources have depth 1)
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// The final path segment
    pub fn leaf(&self) -> &str {
        // segments is never empty: root() starts at one segment and child()
        // only appends
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// Is `self` a strict descendant of `other`?
    ///
    /// A resource is not a descendant of itself.
    pub fn is_descendant_of(&self, other: &ResourceName) -> bool {
        self.segments.len() > other.segments.len()
            && self.segments[..other.segments.len()] == other.segments[..]
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_txn_id_roundtrip() {
        let txn = TxnId::new(42);
        assert_eq!(txn.as_u64(), 42);
        assert_eq!(txn.to_string(), "42");
        assert_eq!(txn, TxnId::new(42));
        assert_ne!(txn, TxnId::new(43));
    }

    #[test]
    fn test_resource_name_paths() {
        let db = ResourceName::root("database");
        let table = db.child("orders");
        let row = table.child("row-19");

        assert_eq!(db.depth(), 1);
        assert_eq!(row.depth(), 3);
        assert_eq!(row.leaf(), "row-19");
        assert_eq!(row.to_string(), "database/orders/row-19");
        assert_eq!(row.parent(), Some(table.clone()));
        assert_eq!(table.parent(), Some(db.clone()));
        assert_eq!(db.parent(), None);
    }

    #[test]
    fn test_descendant_relation_is_strict() {
        let db = ResourceName::root("database");
        let table = db.child("orders");
        let row = table.child("row-19");

        assert!(table.is_descendant_of(&db));
        assert!(row.is_descendant_of(&db));
        assert!(row.is_descendant_of(&table));
        assert!(!db.is_descendant_of(&db));
        assert!(!db.is_descendant_of(&table));
        assert!(!table.is_descendant_of(&row));
    }

    #[test]
    fn test_sibling_is_not_descendant() {
        let db = ResourceName::root("database");
        let orders = db.child("orders");
        let users = db.child("users");

        assert!(!orders.is_descendant_of(&users));
        assert!(!users.is_descendant_of(&orders));
    }

    #[test]
    fn test_prefix_segment_is_not_ancestor() {
        // "database/order" is not an ancestor of "database/orders/row-1"
        let db = ResourceName::root("database");
        let short = db.child("order");
        let row = db.child("orders").child("row-1");

        assert!(!row.is_descendant_of(&short));
    }
}
