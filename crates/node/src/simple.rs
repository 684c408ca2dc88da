use crate::{MetapathNode, NodeKind, QName};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(1);

struct NodeData {
    tree: u64,
    position: usize,
    kind: NodeKind,
    name: Option<QName>,
    value: Option<String>,
    data_type: Option<String>,
    document_uri: Option<String>,
    parent: Weak<NodeData>,
    flags: Vec<SimpleNode>,
    children: Vec<SimpleNode>,
}

/// An immutable, reference-counted document tree.
///
/// Nodes hold a weak link to their parent, so navigation upward only works
/// while some handle to the tree's root is alive.
#[derive(Clone)]
pub struct SimpleNode(Arc<NodeData>);

impl SimpleNode {
    pub fn document() -> NodeBuilder {
        NodeBuilder::new(NodeKind::Document, None, None)
    }

    pub fn assembly(name: impl Into<String>) -> NodeBuilder {
        NodeBuilder::new(NodeKind::Assembly, Some(QName::local(name)), None)
    }

    pub fn field(name: impl Into<String>, value: impl Into<String>) -> NodeBuilder {
        NodeBuilder::new(
            NodeKind::Field,
            Some(QName::local(name)),
            Some(value.into()),
        )
    }

    pub fn flag(name: impl Into<String>, value: impl Into<String>) -> NodeBuilder {
        NodeBuilder::new(NodeKind::Flag, Some(QName::local(name)), Some(value.into()))
    }

    /// Position of this node in its tree's document order.
    pub fn position(&self) -> usize {
        self.0.position
    }
}

impl PartialEq for SimpleNode {
    fn eq(&self, other: &Self) -> bool {
        self.0.tree == other.0.tree && self.0.position == other.0.position
    }
}

impl Eq for SimpleNode {}

impl PartialOrd for SimpleNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SimpleNode {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.0.tree, self.0.position).cmp(&(other.0.tree, other.0.position))
    }
}

impl Hash for SimpleNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.tree.hash(state);
        self.0.position.hash(state);
    }
}

impl fmt::Debug for SimpleNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("SimpleNode");
        debug.field("kind", &self.0.kind);
        if let Some(name) = &self.0.name {
            debug.field("name", &name.local);
        }
        if let Some(value) = &self.0.value {
            debug.field("value", value);
        }
        debug.field("position", &self.0.position).finish()
    }
}

impl MetapathNode for SimpleNode {
    fn node_kind(&self) -> NodeKind {
        self.0.kind
    }

    fn name(&self) -> Option<QName> {
        self.0.name.clone()
    }

    fn value(&self) -> Option<String> {
        self.0.value.clone()
    }

    fn data_type(&self) -> Option<String> {
        self.0.data_type.clone()
    }

    fn flags(&self) -> Vec<Self> {
        self.0.flags.clone()
    }

    fn children(&self) -> Vec<Self> {
        self.0.children.clone()
    }

    fn parent(&self) -> Option<Self> {
        self.0.parent.upgrade().map(SimpleNode)
    }

    fn document_uri(&self) -> Option<String> {
        self.0.document_uri.clone()
    }
}

/// Builder for [`SimpleNode`] trees. Document order and tree identity are
/// assigned when [`NodeBuilder::build`] is called on the root.
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    kind: NodeKind,
    name: Option<QName>,
    value: Option<String>,
    data_type: Option<String>,
    document_uri: Option<String>,
    flags: Vec<NodeBuilder>,
    children: Vec<NodeBuilder>,
}

impl NodeBuilder {
    fn new(kind: NodeKind, name: Option<QName>, value: Option<String>) -> Self {
        Self {
            kind,
            name,
            value,
            data_type: None,
            document_uri: None,
            flags: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        if let Some(name) = &mut self.name {
            name.namespace = Some(namespace.into());
        }
        self
    }

    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.document_uri = Some(uri.into());
        self
    }

    /// Declares the atomic type of this node's value, e.g. `decimal`.
    pub fn data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    pub fn flag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.flags.push(SimpleNode::flag(name, value));
        self
    }

    pub fn typed_flag(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        data_type: impl Into<String>,
    ) -> Self {
        self.flags
            .push(SimpleNode::flag(name, value).data_type(data_type));
        self
    }

    pub fn child(mut self, child: NodeBuilder) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = NodeBuilder>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn build(self) -> SimpleNode {
        let tree = NEXT_TREE_ID.fetch_add(1, AtomicOrdering::Relaxed);
        let mut next_position = 0;
        SimpleNode(self.into_node(tree, &mut next_position, Weak::new()))
    }

    fn into_node(self, tree: u64, next_position: &mut usize, parent: Weak<NodeData>) -> Arc<NodeData> {
        let position = *next_position;
        *next_position += 1;
        let NodeBuilder {
            kind,
            name,
            value,
            data_type,
            document_uri,
            flags,
            children,
        } = self;
        Arc::new_cyclic(|this| {
            let flags = flags
                .into_iter()
                .map(|flag| SimpleNode(flag.into_node(tree, next_position, this.clone())))
                .collect();
            let children = children
                .into_iter()
                .map(|child| SimpleNode(child.into_node(tree, next_position, this.clone())))
                .collect();
            NodeData {
                tree,
                position,
                kind,
                name,
                value,
                data_type,
                document_uri,
                parent,
                flags,
                children,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> SimpleNode {
        SimpleNode::document()
            .uri("http://example.com/catalog.xml")
            .child(
                SimpleNode::assembly("catalog")
                    .flag("id", "c1")
                    .child(SimpleNode::field("title", "Controls"))
                    .child(
                        SimpleNode::assembly("group")
                            .flag("id", "g1")
                            .child(SimpleNode::field("title", "Access")),
                    )
                    .child(SimpleNode::assembly("group").flag("id", "g2")),
            )
            .build()
    }

    #[test]
    fn test_document_order() {
        let doc = catalog();
        let all: Vec<SimpleNode> = std::iter::once(doc.clone())
            .chain(doc.descendants())
            .collect();
        let mut sorted = all.clone();
        sorted.sort();
        assert_eq!(all, sorted);

        let catalog = &doc.children()[0];
        let flag = &catalog.flags()[0];
        let title = &catalog.children()[0];
        assert!(catalog < flag);
        assert!(flag < title);
    }

    #[test]
    fn test_navigation() {
        let doc = catalog();
        let group = doc.children()[0].children()[1].clone();
        assert_eq!(group.name(), Some(QName::local("group")));
        assert_eq!(group.ancestors().len(), 2);
        assert_eq!(group.root(), doc);
        assert_eq!(
            group.base_uri().as_deref(),
            Some("http://example.com/catalog.xml")
        );
        assert_eq!(group.flags()[0].parent(), Some(group.clone()));
    }

    #[test]
    fn test_string_value() {
        let doc = catalog();
        assert_eq!(doc.string_value(), "ControlsAccess");
        let flag = doc.children()[0].flags()[0].clone();
        assert_eq!(flag.string_value(), "c1");
    }

    #[test]
    fn test_path() {
        let doc = catalog();
        let second_group = doc.children()[0].children()[2].clone();
        assert_eq!(second_group.path(), "/catalog[1]/group[2]");
        assert_eq!(second_group.flags()[0].path(), "/catalog[1]/group[2]/@id");
        assert_eq!(doc.path(), "/");
    }

    #[test]
    fn test_separate_trees_are_distinct() {
        let first = SimpleNode::assembly("a").build();
        let second = SimpleNode::assembly("a").build();
        assert_ne!(first, second);
    }
}
