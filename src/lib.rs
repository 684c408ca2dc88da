//! Metapath query engine for Metaschema document trees.
//!
//! This facade re-exports the workspace crates:
//!
//! - [`node`]: the node-tree contract and an in-memory tree
//! - [`metapath`]: the type system, contexts, function library and evaluator
//! - [`constraint`]: key indexes and index constraints
//!
//! # Example
//!
//! ```ignore
//! use metaschema::{DynamicContext, Item, MetapathExpression, SimpleNode, StaticContext};
//! use std::sync::Arc;
//!
//! let doc = SimpleNode::document()
//!     .child(SimpleNode::assembly("catalog").flag("id", "c-1"))
//!     .build();
//! let statics = Arc::new(StaticContext::new());
//! let expr = MetapathExpression::compile("/catalog/@id", &statics)?;
//! let ids = expr.evaluate(Some(Item::Node(doc)), &DynamicContext::new(statics))?;
//! ```

pub use metaschema_constraint as constraint;
pub use metaschema_metapath as metapath;
pub use metaschema_node as node;

pub use metaschema_constraint::{
    Finding, FindingKind, Index, IndexConstraint, IndexError, IndexHasKeyConstraint, IndexKey,
    KeyField,
};
pub use metaschema_metapath::{
    ArrayItem, AtomicItem, DynamicContext, EvaluationResult, FunctionLibrary, Item, MapItem,
    MetapathError, MetapathExpression, ResultType, Sequence, StaticContext, TypeRegistry,
};
pub use metaschema_node::{MetapathNode, NodeKind, QName, SimpleNode};
