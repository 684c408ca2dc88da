use super::{AtomicItem, Item};
use crate::datatype::TypeRegistry;
use crate::error::MetapathError;
use metaschema_node::MetapathNode;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

type ItemStream<N> = Box<dyn Iterator<Item = Item<N>> + Send>;

enum StreamState<N> {
    Pending(ItemStream<N>),
    Materialized(Arc<[Item<N>]>),
    Consumed,
}

#[derive(Clone)]
enum Repr<N> {
    Items(Arc<[Item<N>]>),
    Stream(Arc<Mutex<StreamState<N>>>),
}

/// An ordered, flat list of items.
///
/// A sequence is either backed by materialized items or by a one-shot
/// producer. A producer-backed sequence can be materialized with
/// [`Sequence::items`] any number of times, but [`Sequence::stream`] hands
/// out the producer itself and a second attempt to consume it fails with
/// [`MetapathError::SequenceConsumed`]. Clones share the producer.
#[derive(Clone)]
pub struct Sequence<N> {
    repr: Repr<N>,
}

impl<N: MetapathNode> Sequence<N> {
    pub fn empty() -> Self {
        Self::from_items(Vec::new())
    }

    pub fn of(item: Item<N>) -> Self {
        Self::from_items(vec![item])
    }

    pub fn from_atomic(atomic: AtomicItem) -> Self {
        Self::of(Item::Atomic(atomic))
    }

    pub fn from_items(items: Vec<Item<N>>) -> Self {
        Self {
            repr: Repr::Items(items.into()),
        }
    }

    pub fn from_nodes(nodes: impl IntoIterator<Item = N>) -> Self {
        Self::from_items(nodes.into_iter().map(Item::Node).collect())
    }

    /// A lazily produced sequence.
    pub fn from_stream<I>(items: I) -> Self
    where
        I: Iterator<Item = Item<N>> + Send + 'static,
    {
        Self {
            repr: Repr::Stream(Arc::new(Mutex::new(StreamState::Pending(Box::new(items))))),
        }
    }

    pub fn is_materialized(&self) -> bool {
        match &self.repr {
            Repr::Items(_) => true,
            Repr::Stream(state) => matches!(
                *state.lock().unwrap_or_else(PoisonError::into_inner),
                StreamState::Materialized(_)
            ),
        }
    }

    /// All items, materializing a pending producer.
    pub fn items(&self) -> Result<Arc<[Item<N>]>, MetapathError> {
        match &self.repr {
            Repr::Items(items) => Ok(Arc::clone(items)),
            Repr::Stream(state) => {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                match std::mem::replace(&mut *state, StreamState::Consumed) {
                    StreamState::Pending(producer) => {
                        let items: Arc<[Item<N>]> = producer.collect::<Vec<_>>().into();
                        *state = StreamState::Materialized(Arc::clone(&items));
                        Ok(items)
                    }
                    StreamState::Materialized(items) => {
                        *state = StreamState::Materialized(Arc::clone(&items));
                        Ok(items)
                    }
                    StreamState::Consumed => Err(MetapathError::SequenceConsumed),
                }
            }
        }
    }

    /// Consumes the sequence as an iterator. A pending producer is handed out
    /// once; afterwards the sequence is spent.
    pub fn stream(&self) -> Result<ItemStream<N>, MetapathError> {
        let items = match &self.repr {
            Repr::Items(items) => Arc::clone(items),
            Repr::Stream(state) => {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                match std::mem::replace(&mut *state, StreamState::Consumed) {
                    StreamState::Pending(producer) => return Ok(producer),
                    StreamState::Materialized(items) => {
                        *state = StreamState::Materialized(Arc::clone(&items));
                        items
                    }
                    StreamState::Consumed => return Err(MetapathError::SequenceConsumed),
                }
            }
        };
        Ok(Box::new((0..items.len()).map(move |i| items[i].clone())))
    }

    pub fn to_vec(&self) -> Result<Vec<Item<N>>, MetapathError> {
        Ok(self.items()?.to_vec())
    }

    pub fn len(&self) -> Result<usize, MetapathError> {
        Ok(self.items()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, MetapathError> {
        Ok(self.items()?.is_empty())
    }

    /// The first item. With `require_singleton`, more than one item is a
    /// cardinality error.
    pub fn first_item(&self, require_singleton: bool) -> Result<Option<Item<N>>, MetapathError> {
        let items = self.items()?;
        if require_singleton && items.len() > 1 {
            return Err(MetapathError::cardinality(
                "sequence",
                "zero or one",
                items.len(),
            ));
        }
        Ok(items.first().cloned())
    }

    pub fn exactly_one(&self, context: &str) -> Result<Item<N>, MetapathError> {
        let items = self.items()?;
        match &items[..] {
            [item] => Ok(item.clone()),
            _ => Err(MetapathError::cardinality(context, "exactly one", items.len())),
        }
    }

    /// Concatenates sequences into one flat sequence.
    pub fn concat(sequences: impl IntoIterator<Item = Sequence<N>>) -> Result<Self, MetapathError> {
        let mut result = Vec::new();
        for sequence in sequences {
            result.extend(sequence.items()?.iter().cloned());
        }
        Ok(Self::from_items(result))
    }

    /// `fn:data` over every item.
    pub fn atomize(&self, types: &TypeRegistry) -> Result<Vec<AtomicItem>, MetapathError> {
        let mut result = Vec::new();
        for item in self.items()?.iter() {
            result.extend(item.atomize(types)?);
        }
        Ok(result)
    }

    /// The effective boolean value.
    pub fn effective_boolean_value(&self) -> Result<bool, MetapathError> {
        let items = self.items()?;
        let first = match items.first() {
            None => return Ok(false),
            Some(Item::Node(_)) => return Ok(true),
            Some(first) => first,
        };
        if items.len() > 1 {
            return Err(MetapathError::dynamic_type(
                "effective boolean value of a sequence of more than one item starting with a non-node",
                first.type_name(),
            ));
        }
        match first {
            Item::Atomic(AtomicItem::Boolean(b)) => Ok(*b),
            Item::Atomic(atomic) if atomic.is_string_like() => Ok(!atomic.as_string().is_empty()),
            Item::Atomic(AtomicItem::Double(d)) => Ok(*d != 0.0 && !d.is_nan()),
            Item::Atomic(atomic) if atomic.is_numeric() => {
                Ok(atomic.as_decimal().is_some_and(|d| !d.is_zero()))
            }
            other => Err(MetapathError::dynamic_type(
                "no effective boolean value",
                other.type_name(),
            )),
        }
    }

    /// JSON form: a single item converts directly, anything else to an array.
    pub fn to_json(&self) -> Result<serde_json::Value, MetapathError> {
        let items = self.items()?;
        if let [item] = &items[..] {
            return item.to_json();
        }
        items
            .iter()
            .map(Item::to_json)
            .collect::<Result<Vec<_>, _>>()
            .map(serde_json::Value::Array)
    }
}

impl<N: MetapathNode> Default for Sequence<N> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<N: MetapathNode> From<Vec<Item<N>>> for Sequence<N> {
    fn from(items: Vec<Item<N>>) -> Self {
        Self::from_items(items)
    }
}

impl<N: MetapathNode> From<Item<N>> for Sequence<N> {
    fn from(item: Item<N>) -> Self {
        Self::of(item)
    }
}

impl<N: MetapathNode> PartialEq for Sequence<N> {
    fn eq(&self, other: &Self) -> bool {
        match (self.items(), other.items()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

impl<N: fmt::Debug> fmt::Debug for Sequence<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Items(items) => f.debug_list().entries(items.iter()).finish(),
            Repr::Stream(state) => match &*state.lock().unwrap_or_else(PoisonError::into_inner) {
                StreamState::Pending(_) => f.write_str("Sequence(<pending>)"),
                StreamState::Materialized(items) => f.debug_list().entries(items.iter()).finish(),
                StreamState::Consumed => f.write_str("Sequence(<consumed>)"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaschema_node::SimpleNode;

    fn ints(values: Vec<i64>) -> impl Iterator<Item = Item<SimpleNode>> + Send + 'static {
        values.into_iter().map(|v| Item::Atomic(AtomicItem::Integer(v)))
    }

    #[test]
    fn test_stream_consumed_once() {
        let seq = Sequence::from_stream(ints(vec![1, 2, 3]));
        assert!(!seq.is_materialized());
        let collected: Vec<_> = seq.stream().unwrap().collect();
        assert_eq!(collected.len(), 3);
        assert!(matches!(seq.stream(), Err(MetapathError::SequenceConsumed)));
        assert!(matches!(seq.items(), Err(MetapathError::SequenceConsumed)));
    }

    #[test]
    fn test_materialized_stream_can_be_reread() {
        let seq = Sequence::from_stream(ints(vec![1, 2]));
        let copy = seq.clone();
        assert_eq!(seq.len().unwrap(), 2);
        assert!(copy.is_materialized());
        assert_eq!(copy.stream().unwrap().count(), 2);
        assert_eq!(seq.stream().unwrap().count(), 2);
    }

    #[test]
    fn test_concat_flattens() {
        let a: Sequence<SimpleNode> = Sequence::from_items(ints(vec![1, 2]).collect());
        let b = Sequence::from_stream(ints(vec![3]));
        let joined = Sequence::concat([a, Sequence::empty(), b]).unwrap();
        assert_eq!(joined, Sequence::from_items(ints(vec![1, 2, 3]).collect()));
    }

    #[test]
    fn test_effective_boolean_value() {
        let ebv = |items: Vec<Item<SimpleNode>>| Sequence::from_items(items).effective_boolean_value();
        assert!(!ebv(vec![]).unwrap());
        assert!(ebv(vec![AtomicItem::string("x").into()]).unwrap());
        assert!(!ebv(vec![AtomicItem::string("").into()]).unwrap());
        assert!(!ebv(vec![AtomicItem::Integer(0).into()]).unwrap());
        assert!(!ebv(vec![AtomicItem::Double(f64::NAN).into()]).unwrap());
        assert!(ebv(vec![Item::Node(SimpleNode::assembly("a").build())]).unwrap());
        assert!(ebv(vec![AtomicItem::Integer(1).into(), AtomicItem::Integer(2).into()]).is_err());
    }

    #[test]
    fn test_first_item_cardinality() {
        let seq: Sequence<SimpleNode> = Sequence::from_items(ints(vec![1, 2]).collect());
        assert!(seq.first_item(false).unwrap().is_some());
        assert!(matches!(
            seq.first_item(true),
            Err(MetapathError::Cardinality { actual: 2, .. })
        ));
        assert!(seq.exactly_one("test").is_err());
    }
}
