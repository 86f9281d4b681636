//! Core types for Canopy
//!
//! This crate defines the foundational value types used throughout the
//! locking subsystem:
//! - LockType: the six-element multigranularity lock lattice
//! - TxnId: opaque transaction identity
//! - ResourceName: hierarchical resource identity
//! - Error: error type hierarchy
//!
//! Everything here is a pure value type: no lock state lives in this crate.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod lock_type;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
pub use lock_type::LockType;
pub use types::{ResourceName, TxnId};
