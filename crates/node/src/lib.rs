//! Node-tree contract for Metapath evaluation.
//!
//! Metaschema documents are trees of *assemblies* (structured containers),
//! *fields* (valued leaves that may carry flags) and *flags* (named scalar
//! properties, the analogue of XML attributes), rooted at a *document* node.
//! The evaluator only sees these trees through [`MetapathNode`], so any
//! parsed representation can be queried once it implements the trait.
//!
//! [`SimpleNode`] is an in-memory implementation used by collaborators that
//! build trees programmatically, and by the test suites.

mod simple;

pub use simple::{NodeBuilder, SimpleNode};

use std::fmt;
use std::hash::Hash;

/// A namespace-qualified node name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    pub namespace: Option<String>,
    pub local: String,
}

impl QName {
    pub fn local(local: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local: local.into(),
        }
    }

    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            local: local.into(),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "Q{{{}}}{}", ns, self.local),
            None => f.write_str(&self.local),
        }
    }
}

/// The kind of a node in a Metaschema document tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Assembly,
    Field,
    Flag,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Document => "document",
            NodeKind::Assembly => "assembly",
            NodeKind::Field => "field",
            NodeKind::Flag => "flag",
        }
    }
}

/// A navigable position in a document tree.
///
/// `Eq`/`Hash` must reflect node identity, and `Ord` must reflect document
/// order (nodes of different trees may order arbitrarily but consistently).
pub trait MetapathNode:
    fmt::Debug + Clone + PartialEq + Eq + Hash + PartialOrd + Ord + Send + Sync + 'static
{
    fn node_kind(&self) -> NodeKind;

    /// The node's name. Documents are unnamed.
    fn name(&self) -> Option<QName>;

    /// The node's own text value. Only fields and flags carry one.
    fn value(&self) -> Option<String>;

    /// The name of the atomic data type of this node's value, e.g. `decimal`.
    /// Nodes without a declared type atomize to untyped values.
    fn data_type(&self) -> Option<String> {
        None
    }

    /// The flags of an assembly or field, in declaration order.
    fn flags(&self) -> Vec<Self>;

    /// The child assemblies and fields, in document order.
    fn children(&self) -> Vec<Self>;

    /// The containing node. `None` for documents and detached nodes.
    fn parent(&self) -> Option<Self>;

    /// The URI the document was loaded from. Only meaningful on documents.
    fn document_uri(&self) -> Option<String> {
        None
    }

    /// The base URI used to resolve relative references made from this node.
    fn base_uri(&self) -> Option<String> {
        self.root().document_uri()
    }

    /// The string value: the own value of fields and flags, or the
    /// concatenated values of all descendant fields for containers.
    fn string_value(&self) -> String {
        match self.node_kind() {
            NodeKind::Field | NodeKind::Flag => self.value().unwrap_or_default(),
            NodeKind::Document | NodeKind::Assembly => self
                .children()
                .iter()
                .map(|child| child.string_value())
                .collect(),
        }
    }

    /// Ancestors ordered from the parent outward.
    fn ancestors(&self) -> Vec<Self> {
        let mut result = Vec::new();
        let mut current = self.parent();
        while let Some(node) = current {
            current = node.parent();
            result.push(node);
        }
        result
    }

    fn ancestors_or_self(&self) -> Vec<Self> {
        let mut result = vec![self.clone()];
        result.extend(self.ancestors());
        result
    }

    /// The outermost ancestor-or-self node.
    fn root(&self) -> Self {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// All descendant assemblies and fields in document order (flags excluded).
    fn descendants(&self) -> Vec<Self> {
        let mut result = Vec::new();
        let mut stack: Vec<Self> = self.children().into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            stack.extend(node.children().into_iter().rev());
            result.push(node);
        }
        result
    }

    /// A path expression locating this node from its root, e.g.
    /// `/catalog[1]/group[2]/@id`.
    fn path(&self) -> String {
        let mut segments = Vec::new();
        for node in self.ancestors_or_self() {
            let Some(name) = node.name() else {
                continue;
            };
            let segment = match node.node_kind() {
                NodeKind::Flag => format!("@{name}"),
                _ => {
                    let position = node
                        .parent()
                        .map(|parent| {
                            parent
                                .children()
                                .iter()
                                .take_while(|sibling| *sibling != &node)
                                .filter(|sibling| sibling.name().as_ref() == Some(&name))
                                .count()
                                + 1
                        })
                        .unwrap_or(1);
                    format!("{name}[{position}]")
                }
            };
            segments.push(segment);
        }
        if segments.is_empty() {
            return "/".to_string();
        }
        segments.reverse();
        format!("/{}", segments.join("/"))
    }
}
