//! Index and index-has-key constraints.
//!
//! Constraint checking never stops at the first problem: every evaluation
//! failure, duplicate key or unresolved reference becomes a [`Finding`] and
//! checking continues with the next node.

use crate::error::IndexError;
use crate::index::Index;
use crate::key_field::{KeyDefinition, KeyField};
use metaschema_metapath::{DynamicContext, Item, MetapathExpression, StaticContext};
use metaschema_node::MetapathNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindingKind {
    /// A second node produced a key already in the index.
    DuplicateKey,
    /// A reference whose key is not in the index.
    MissingKey,
    /// The key of a node could not be computed.
    KeyEvaluation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Finding<N> {
    pub constraint: String,
    pub kind: FindingKind,
    pub node: N,
    pub message: String,
}

impl<N: MetapathNode> Finding<N> {
    fn new(constraint: &str, kind: FindingKind, node: &N, message: String) -> Self {
        log::debug!("[{constraint}] {}: {message}", node.path());
        Self {
            constraint: constraint.to_string(),
            kind,
            node: node.clone(),
            message,
        }
    }
}

/// Evaluates a constraint target and keeps the selected nodes.
fn select_nodes<N: MetapathNode>(
    target: &MetapathExpression,
    focus: &N,
    context: &DynamicContext<N>,
) -> Result<Vec<N>, IndexError> {
    let selected = target.evaluate(Some(Item::Node(focus.clone())), context)?;
    selected
        .items()?
        .iter()
        .map(|item| match item {
            Item::Node(node) => Ok(node.clone()),
            other => Err(IndexError::NonNodeTarget {
                target: target.text().to_string(),
                item_type: other.type_name().to_string(),
            }),
        })
        .collect()
}

/// Declares a named index over the nodes selected by `target`.
#[derive(Debug, Clone)]
pub struct IndexConstraint {
    name: String,
    target: MetapathExpression,
    key: KeyDefinition,
}

impl IndexConstraint {
    pub fn new<N: MetapathNode>(
        name: impl Into<String>,
        target: &str,
        key_fields: Vec<KeyField>,
        static_context: &StaticContext<N>,
    ) -> Result<Self, IndexError> {
        Ok(Self {
            name: name.into(),
            target: MetapathExpression::compile(target, static_context)?,
            key: KeyDefinition::new(key_fields, static_context)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &str {
        self.target.text()
    }

    pub fn key_fields(&self) -> impl Iterator<Item = &KeyField> {
        self.key.key_fields()
    }

    /// The nodes this constraint indexes, relative to `focus`.
    pub fn select_targets<N: MetapathNode>(
        &self,
        focus: &N,
        context: &DynamicContext<N>,
    ) -> Result<Vec<N>, IndexError> {
        select_nodes(&self.target, focus, context)
    }

    /// Indexes `nodes` in order. The first node to claim a key keeps it;
    /// later claimants are reported as duplicates. Nodes with an all-null key
    /// are skipped.
    pub fn build_index<N: MetapathNode>(
        &self,
        nodes: impl IntoIterator<Item = N>,
        context: &DynamicContext<N>,
    ) -> (Index<N>, Vec<Finding<N>>) {
        let mut index = Index::with_definition(self.key.clone());
        let mut findings = Vec::new();
        for node in nodes {
            let key = match index.to_key(&node, context) {
                Ok(key) => key,
                Err(err) => {
                    findings.push(Finding::new(&self.name, FindingKind::KeyEvaluation, &node, err.to_string()));
                    continue;
                }
            };
            if key.is_all_nulls() {
                log::debug!("[{}] {} has no key", self.name, node.path());
                continue;
            }
            if let Some(existing) = index.get(&key) {
                let message = format!(
                    "Index '{}' has duplicate key {} for items at paths '{}' and '{}'",
                    self.name,
                    key,
                    existing.path(),
                    node.path()
                );
                findings.push(Finding::new(&self.name, FindingKind::DuplicateKey, &node, message));
                continue;
            }
            index.put(node, key);
        }
        log::debug!(
            "Built index '{}' with {} entries and {} findings",
            self.name,
            index.len(),
            findings.len()
        );
        (index, findings)
    }
}

/// Requires every node selected by `target` to reference a key present in
/// the named index.
#[derive(Debug, Clone)]
pub struct IndexHasKeyConstraint {
    index_name: String,
    target: MetapathExpression,
    key: KeyDefinition,
}

impl IndexHasKeyConstraint {
    pub fn new<N: MetapathNode>(
        index_name: impl Into<String>,
        target: &str,
        key_fields: Vec<KeyField>,
        static_context: &StaticContext<N>,
    ) -> Result<Self, IndexError> {
        Ok(Self {
            index_name: index_name.into(),
            target: MetapathExpression::compile(target, static_context)?,
            key: KeyDefinition::new(key_fields, static_context)?,
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn select_targets<N: MetapathNode>(
        &self,
        focus: &N,
        context: &DynamicContext<N>,
    ) -> Result<Vec<N>, IndexError> {
        select_nodes(&self.target, focus, context)
    }

    /// Reports every node whose key is missing from `index`. Nodes with an
    /// all-null key reference nothing and pass.
    pub fn check_index_has_key<N: MetapathNode>(
        &self,
        index: &Index<N>,
        nodes: impl IntoIterator<Item = N>,
        context: &DynamicContext<N>,
    ) -> Vec<Finding<N>> {
        let mut findings = Vec::new();
        for node in nodes {
            match self.key.to_key(&node, context) {
                Ok(key) if key.is_all_nulls() || index.contains_key(&key) => {}
                Ok(key) => {
                    let message = format!(
                        "Key {} at path '{}' is not in index '{}'",
                        key,
                        node.path(),
                        self.index_name
                    );
                    findings.push(Finding::new(&self.index_name, FindingKind::MissingKey, &node, message));
                }
                Err(err) => {
                    findings.push(Finding::new(
                        &self.index_name,
                        FindingKind::KeyEvaluation,
                        &node,
                        err.to_string(),
                    ));
                }
            }
        }
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaschema_node::SimpleNode;
    use std::sync::Arc;

    fn catalog() -> SimpleNode {
        SimpleNode::document()
            .child(
                SimpleNode::assembly("catalog")
                    .child(
                        SimpleNode::assembly("control")
                            .flag("id", "ac-1")
                            .child(SimpleNode::assembly("link").flag("href", "#ac-2")),
                    )
                    .child(
                        SimpleNode::assembly("control")
                            .flag("id", "ac-2")
                            .child(SimpleNode::assembly("link").flag("href", "#ac-9")),
                    )
                    .child(SimpleNode::assembly("control").flag("id", "ac-1"))
                    .child(
                        SimpleNode::assembly("control")
                            .child(SimpleNode::field("id", "x"))
                            .child(SimpleNode::field("id", "y")),
                    )
                    .child(SimpleNode::assembly("control"))
                    .child(SimpleNode::assembly("link").flag("href", "https://example.com")),
            )
            .build()
    }

    fn setup() -> (Arc<StaticContext<SimpleNode>>, DynamicContext<SimpleNode>, SimpleNode) {
        let _ = env_logger::builder().is_test(true).try_init();
        let statics = Arc::new(StaticContext::new());
        let dynamic = DynamicContext::new(statics.clone());
        (statics, dynamic, catalog())
    }

    #[test]
    fn test_build_index_reports_duplicates() {
        let (statics, ctx, doc) = setup();
        let constraint =
            IndexConstraint::new("controls", "//control", vec![KeyField::new("@id")], &statics)
                .unwrap();
        assert_eq!(constraint.name(), "controls");
        assert_eq!(constraint.target(), "//control");

        let nodes = constraint.select_targets(&doc, &ctx).unwrap();
        assert_eq!(nodes.len(), 5);

        let (index, findings) = constraint.build_index(nodes.clone(), &ctx);
        assert_eq!(index.len(), 2);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, FindingKind::DuplicateKey);
        assert_eq!(findings[0].node, nodes[2]);
        assert!(findings[0].message.contains("/catalog[1]/control[1]"));
    }

    #[test]
    fn test_build_index_keeps_going_after_key_errors() {
        let (statics, ctx, doc) = setup();
        let constraint = IndexConstraint::new(
            "controls",
            "//control",
            vec![KeyField::new("(@id, id)[1]"), KeyField::new("id")],
            &statics,
        )
        .unwrap();
        let nodes = constraint.select_targets(&doc, &ctx).unwrap();
        let (index, findings) = constraint.build_index(nodes, &ctx);

        assert_eq!(index.len(), 2);
        let kinds: Vec<FindingKind> = findings.iter().map(|f| f.kind).collect();
        assert_eq!(kinds, [FindingKind::DuplicateKey, FindingKind::KeyEvaluation]);
    }

    #[test]
    fn test_index_has_key() {
        let (statics, ctx, doc) = setup();
        let controls =
            IndexConstraint::new("controls", "//control", vec![KeyField::new("@id")], &statics)
                .unwrap();
        let (index, _) = controls.build_index(controls.select_targets(&doc, &ctx).unwrap(), &ctx);

        let references = IndexHasKeyConstraint::new(
            "controls",
            "//link[starts-with(@href, '#')]",
            vec![KeyField::new("@href").with_pattern("#(.+)").unwrap()],
            &statics,
        )
        .unwrap();
        assert_eq!(references.index_name(), "controls");
        let links = references.select_targets(&doc, &ctx).unwrap();
        assert_eq!(links.len(), 2);

        let findings = references.check_index_has_key(&index, links, &ctx);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, FindingKind::MissingKey);
        assert!(findings[0].message.contains("'ac-9'"));
    }

    #[test]
    fn test_target_must_select_nodes() {
        let (statics, ctx, doc) = setup();
        let constraint =
            IndexConstraint::new("ids", "//control/@id ! string()", vec![KeyField::new(".")], &statics)
                .unwrap();
        let err = constraint.select_targets(&doc, &ctx).unwrap_err();
        assert!(matches!(err, IndexError::NonNodeTarget { .. }));
    }
}
