//! Key indexes over Metapath-selected nodes.
//!
//! An [`Index`] maps key tuples, computed by evaluating [`KeyField`] targets
//! against each indexed node, to the node that produced them. Index
//! constraints build on it to detect duplicate keys and dangling references.

pub mod constraint;
pub mod error;
pub mod index;
pub mod key_field;

pub use constraint::{Finding, FindingKind, IndexConstraint, IndexHasKeyConstraint};
pub use error::IndexError;
pub use index::Index;
pub use key_field::{IndexKey, KeyDefinition, KeyField};
