//! Metapath expression parser, type system and evaluator.
//!
//! Metapath is an XPath 3.1 flavored query language evaluated over
//! Metaschema document trees. This crate provides the pieces an evaluation
//! needs: the atomic type registry, the item and sequence model, static and
//! dynamic contexts, the built-in function library, and the parser and
//! tree-walking evaluator.
//!
//! # Key Types
//!
//! - [`MetapathExpression`]: A compiled, reusable expression
//! - [`Sequence`]: Evaluation result (atomic values, nodes, arrays, maps)
//! - [`StaticContext`] / [`DynamicContext`]: Compile-time and run-time environments
//! - [`FunctionLibrary`]: Function signatures keyed by namespace, name and arity
//! - [`TypeRegistry`]: Atomic type adapters used for parsing and casting
//!
//! # Example
//!
//! ```ignore
//! use metaschema_metapath::{DynamicContext, MetapathExpression, StaticContext};
//! use std::sync::Arc;
//!
//! let statics = Arc::new(StaticContext::new());
//! let expr = MetapathExpression::compile("for $i in 1 to 5 return $i * 2", &statics)?;
//! let result = expr.evaluate(None, &DynamicContext::new(statics))?;
//! ```

pub mod ast;
pub mod context;
pub mod datatype;
pub mod engine;
pub mod error;
pub mod expression;
pub mod functions;
pub mod operators;
pub mod parser;
pub mod types;

pub use ast::{Expression, ExpressionVisitor};
pub use context::{
    ARRAY_NS, DocumentLoader, DynamicContext, FN_NS, MAP_NS, META_NS, StaticContext,
};
pub use datatype::{DataTypeAdapter, TypeRegistry};
pub use engine::evaluate;
pub use error::MetapathError;
pub use expression::{EvaluationResult, MetapathExpression, ResultType};
pub use functions::{Argument, FunctionLibrary, FunctionSignature, ItemKind, Occurrence};
pub use parser::parse_expression;
pub use types::{ArrayItem, AtomicItem, CollectionValue, Item, MapItem, Sequence};

pub use metaschema_node::{MetapathNode, NodeKind, QName};
