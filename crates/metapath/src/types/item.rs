use super::{ArrayItem, AtomicItem, MapItem, Sequence};
use crate::datatype::TypeRegistry;
use crate::error::MetapathError;
use metaschema_node::MetapathNode;

/// A single value: an atomic, a node, an array or a map.
#[derive(Debug, Clone)]
pub enum Item<N> {
    Atomic(AtomicItem),
    Node(N),
    Array(ArrayItem<N>),
    Map(MapItem<N>),
}

impl<N: MetapathNode> Item<N> {
    /// The name used when reporting this item in type errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Item::Atomic(atomic) => atomic.type_name(),
            Item::Node(node) => node.node_kind().as_str(),
            Item::Array(_) => "array",
            Item::Map(_) => "map",
        }
    }

    pub fn as_atomic(&self) -> Option<&AtomicItem> {
        match self {
            Item::Atomic(atomic) => Some(atomic),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&N> {
        match self {
            Item::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayItem<N>> {
        match self {
            Item::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapItem<N>> {
        match self {
            Item::Map(map) => Some(map),
            _ => None,
        }
    }

    /// The item itself, or for arrays and maps their recursively flattened
    /// members.
    pub fn flatten(&self) -> Result<Vec<Item<N>>, MetapathError> {
        match self {
            Item::Array(array) => array.flatten(),
            Item::Map(map) => {
                let mut result = Vec::new();
                for value in map.values() {
                    result.extend(value.flatten()?);
                }
                Ok(result)
            }
            other => Ok(vec![other.clone()]),
        }
    }

    /// Atomization. Nodes with a declared data type are parsed through the
    /// registry; all other nodes yield an untyped value.
    pub fn atomize(&self, types: &TypeRegistry) -> Result<Vec<AtomicItem>, MetapathError> {
        match self {
            Item::Atomic(atomic) => Ok(vec![atomic.clone()]),
            Item::Node(node) => Ok(vec![atomize_node(node, types)?]),
            Item::Array(array) => {
                let mut result = Vec::new();
                for member in array.flatten()? {
                    result.extend(member.atomize(types)?);
                }
                Ok(result)
            }
            Item::Map(_) => Err(MetapathError::dynamic_type(
                "maps cannot be atomized",
                "map",
            )),
        }
    }

    /// The string value used by `fn:string`.
    pub fn string_value(&self) -> Result<String, MetapathError> {
        match self {
            Item::Atomic(atomic) => Ok(atomic.as_string()),
            Item::Node(node) => Ok(node.string_value()),
            other => Err(MetapathError::dynamic_type(
                "no string value",
                other.type_name(),
            )),
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value, MetapathError> {
        match self {
            Item::Atomic(atomic) => Ok(atomic.to_json()),
            Item::Node(node) => Ok(serde_json::Value::String(node.string_value())),
            Item::Array(array) => array.to_json(),
            Item::Map(map) => map.to_json(),
        }
    }
}

fn atomize_node<N: MetapathNode>(node: &N, types: &TypeRegistry) -> Result<AtomicItem, MetapathError> {
    let text = node.string_value();
    match node.data_type().as_deref().and_then(|name| types.get(name)) {
        Some(adapter) => adapter.parse(&text),
        None => Ok(AtomicItem::UntypedAtomic(text)),
    }
}

/// Deep equality: atomics by value identity, nodes by identity, arrays and
/// maps member-wise.
impl<N: MetapathNode> PartialEq for Item<N> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Item::Atomic(a), Item::Atomic(b)) => a == b,
            (Item::Node(a), Item::Node(b)) => a == b,
            (Item::Array(a), Item::Array(b)) => a == b,
            (Item::Map(a), Item::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<N> From<AtomicItem> for Item<N> {
    fn from(atomic: AtomicItem) -> Self {
        Item::Atomic(atomic)
    }
}

/// A value held by an array member or a map entry: a single item or a
/// whole sequence.
#[derive(Debug, Clone)]
pub enum CollectionValue<N> {
    Item(Item<N>),
    Sequence(Sequence<N>),
}

impl<N: MetapathNode> CollectionValue<N> {
    /// Collapses single-item sequences to their item.
    pub fn from_sequence(sequence: Sequence<N>) -> Result<Self, MetapathError> {
        let items = sequence.items()?;
        Ok(match &items[..] {
            [item] => CollectionValue::Item(item.clone()),
            _ => CollectionValue::Sequence(sequence),
        })
    }

    pub fn as_sequence(&self) -> Sequence<N> {
        match self {
            CollectionValue::Item(item) => Sequence::of(item.clone()),
            CollectionValue::Sequence(sequence) => sequence.clone(),
        }
    }

    /// The value as a list of items without flattening arrays or maps.
    pub fn normalize_as_items(&self) -> Result<Vec<Item<N>>, MetapathError> {
        match self {
            CollectionValue::Item(item) => Ok(vec![item.clone()]),
            CollectionValue::Sequence(sequence) => Ok(sequence.items()?.to_vec()),
        }
    }

    /// The value as a list of items, recursively flattening arrays and maps.
    pub fn flatten(&self) -> Result<Vec<Item<N>>, MetapathError> {
        let mut result = Vec::new();
        for item in self.normalize_as_items()? {
            result.extend(item.flatten()?);
        }
        Ok(result)
    }

    pub fn to_json(&self) -> Result<serde_json::Value, MetapathError> {
        match self {
            CollectionValue::Item(item) => item.to_json(),
            CollectionValue::Sequence(sequence) => sequence.to_json(),
        }
    }
}

impl<N: MetapathNode> PartialEq for CollectionValue<N> {
    fn eq(&self, other: &Self) -> bool {
        match (self.normalize_as_items(), other.normalize_as_items()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

impl<N> From<Item<N>> for CollectionValue<N> {
    fn from(item: Item<N>) -> Self {
        CollectionValue::Item(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaschema_node::SimpleNode;
    use rust_decimal::Decimal;

    #[test]
    fn test_normalize_does_not_flatten_arrays() {
        let array: ArrayItem<SimpleNode> =
            ArrayItem::from_items(vec![Item::Atomic(AtomicItem::Integer(1))]);
        let value = CollectionValue::Item(Item::Array(array));
        assert_eq!(value.normalize_as_items().unwrap().len(), 1);
        assert!(value.normalize_as_items().unwrap()[0].as_array().is_some());
        assert!(value.flatten().unwrap()[0].as_atomic().is_some());
    }

    #[test]
    fn test_atomize_typed_nodes() {
        let types = TypeRegistry::builtin();
        let field = SimpleNode::field("amount", "12.50")
            .data_type("decimal")
            .build();
        let untyped = SimpleNode::field("note", "hello").build();

        let typed_value = Item::Node(field).atomize(&types).unwrap();
        assert_eq!(typed_value, vec![AtomicItem::decimal(Decimal::new(125, 1))]);
        assert!(matches!(typed_value[0], AtomicItem::Decimal(_)));

        let untyped_value = Item::Node(untyped).atomize(&types).unwrap();
        assert!(matches!(&untyped_value[0], AtomicItem::UntypedAtomic(s) if s == "hello"));
    }

    #[test]
    fn test_atomize_invalid_typed_node() {
        let types = TypeRegistry::builtin();
        let field = SimpleNode::field("when", "2023-02-29")
            .data_type("date")
            .build();
        assert!(matches!(
            Item::Node(field).atomize(&types),
            Err(MetapathError::ParseValue { .. })
        ));
    }

    #[test]
    fn test_maps_cannot_be_atomized() {
        let types = TypeRegistry::builtin();
        let map: Item<SimpleNode> = Item::Map(MapItem::new());
        assert!(matches!(
            map.atomize(&types),
            Err(MetapathError::DynamicType { .. })
        ));
    }
}
