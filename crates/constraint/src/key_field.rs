//! Key fields and the keys they compute.

use crate::error::IndexError;
use metaschema_metapath::{DynamicContext, Item, MetapathExpression, StaticContext};
use metaschema_node::MetapathNode;
use regex::Regex;
use std::fmt;

/// One component of a key: a Metapath target evaluated relative to the
/// indexed node, optionally narrowed by a pattern with one capture group.
#[derive(Debug, Clone)]
pub struct KeyField {
    target: String,
    pattern: Option<KeyPattern>,
}

#[derive(Debug, Clone)]
struct KeyPattern {
    source: String,
    regex: Regex,
}

impl KeyField {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            pattern: None,
        }
    }

    /// Sets the pattern a key value must fully match. The pattern must
    /// declare exactly one capture group; its text becomes the key component.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, IndexError> {
        let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|err| {
            IndexError::InvalidKeyPattern {
                pattern: pattern.to_string(),
                message: err.to_string(),
            }
        })?;
        let groups = regex.captures_len() - 1;
        if groups != 1 {
            return Err(IndexError::InvalidKeyPattern {
                pattern: pattern.to_string(),
                message: format!("expected exactly one capture group, found {groups}"),
            });
        }
        self.pattern = Some(KeyPattern {
            source: pattern.to_string(),
            regex,
        });
        Ok(self)
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_ref().map(|pattern| pattern.source.as_str())
    }

    fn apply_pattern(&self, value: String) -> Result<Option<String>, IndexError> {
        let Some(pattern) = &self.pattern else {
            return Ok(Some(value));
        };
        let captures = pattern
            .regex
            .captures(&value)
            .ok_or_else(|| IndexError::PatternMismatch {
                pattern: pattern.source.clone(),
                value: value.clone(),
                target: self.target.clone(),
            })?;
        // an optional group that did not participate yields no value
        Ok(captures.get(1).map(|group| group.as_str().to_string()))
    }
}

/// A key tuple, one nullable component per key field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexKey(pub Vec<Option<String>>);

impl IndexKey {
    /// A key without any value is no key at all and is never indexed.
    pub fn is_all_nulls(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }

    pub fn components(&self) -> &[Option<String>] {
        &self.0
    }
}

impl From<Vec<Option<String>>> for IndexKey {
    fn from(components: Vec<Option<String>>) -> Self {
        Self(components)
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, component) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match component {
                Some(value) => write!(f, "'{value}'")?,
                None => f.write_str("null")?,
            }
        }
        f.write_str(")")
    }
}

/// Key fields with their targets compiled once against a static context.
#[derive(Debug, Clone)]
pub struct KeyDefinition {
    fields: Vec<(KeyField, MetapathExpression)>,
}

impl KeyDefinition {
    pub fn new<N: MetapathNode>(
        key_fields: Vec<KeyField>,
        static_context: &StaticContext<N>,
    ) -> Result<Self, IndexError> {
        let fields = key_fields
            .into_iter()
            .map(|field| {
                let target = MetapathExpression::compile(field.target(), static_context)?;
                Ok((field, target))
            })
            .collect::<Result<Vec<_>, IndexError>>()?;
        Ok(Self { fields })
    }

    pub fn key_fields(&self) -> impl Iterator<Item = &KeyField> {
        self.fields.iter().map(|(field, _)| field)
    }

    /// Computes the key of `node`: each target is evaluated with the node
    /// as focus and must select at most one item.
    pub fn to_key<N: MetapathNode>(
        &self,
        node: &N,
        context: &DynamicContext<N>,
    ) -> Result<IndexKey, IndexError> {
        self.fields
            .iter()
            .map(|(field, target)| key_component(field, target, node, context))
            .collect::<Result<Vec<_>, _>>()
            .map(IndexKey)
    }
}

fn key_component<N: MetapathNode>(
    field: &KeyField,
    target: &MetapathExpression,
    node: &N,
    context: &DynamicContext<N>,
) -> Result<Option<String>, IndexError> {
    let result = target.evaluate(Some(Item::Node(node.clone())), context)?;
    let items = result.items()?;
    let item = match &items[..] {
        [] => return Ok(None),
        [item] => item,
        _ => {
            return Err(IndexError::KeyCardinality {
                target: field.target().to_string(),
                count: items.len(),
            });
        }
    };
    let atomics = item.atomize(context.types())?;
    match &atomics[..] {
        [] => Ok(None),
        [value] => field.apply_pattern(value.as_string()),
        _ => Err(IndexError::KeyCardinality {
            target: field.target().to_string(),
            count: atomics.len(),
        }),
    }
}
