use super::{AtomicItem, CollectionValue, Sequence};
use crate::datatype::temporal::{Date, DateTime, Duration};
use crate::error::MetapathError;
use indexmap::IndexMap;
use indexmap::map::Entry;
use metaschema_node::MetapathNode;
use rust_decimal::Decimal;

/// The identity of an atomic value when used as a map key or compared for
/// deduplication: its type class plus its canonical value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    String(String),
    Boolean(bool),
    Numeric(Decimal),
    /// Doubles with no exact decimal counterpart (NaN and infinities), by bit
    /// pattern.
    Double(u64),
    Date(Date),
    DateTime(DateTime),
    Duration(Duration),
}

/// How [`MapItem::merge`] treats a key present in more than one input map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateKeyPolicy {
    /// Fail with a duplicate key error.
    Reject,
    #[default]
    UseFirst,
    UseLast,
    UseAny,
    /// Concatenate the values into one sequence.
    Combine,
}

impl DuplicateKeyPolicy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "reject" => Some(Self::Reject),
            "use-first" => Some(Self::UseFirst),
            "use-last" => Some(Self::UseLast),
            "use-any" => Some(Self::UseAny),
            "combine" => Some(Self::Combine),
            _ => None,
        }
    }
}

/// An immutable, insertion-ordered map from atomic keys to values.
#[derive(Debug, Clone)]
pub struct MapItem<N> {
    entries: IndexMap<MapKey, (AtomicItem, CollectionValue<N>)>,
}

impl<N: MetapathNode> MapItem<N> {
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Builds a map, failing if two entries share a key.
    pub fn from_entries(
        entries: impl IntoIterator<Item = (AtomicItem, CollectionValue<N>)>,
    ) -> Result<Self, MetapathError> {
        let mut map = Self::new();
        for (key, value) in entries {
            let map_key = key.to_map_key();
            if map.entries.contains_key(&map_key) {
                return Err(MetapathError::DuplicateMapKey {
                    key: key.as_string(),
                });
            }
            map.entries.insert(map_key, (key, value));
        }
        Ok(map)
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &AtomicItem) -> Option<&CollectionValue<N>> {
        self.entries.get(&key.to_map_key()).map(|(_, value)| value)
    }

    pub fn contains(&self, key: &AtomicItem) -> bool {
        self.entries.contains_key(&key.to_map_key())
    }

    pub fn keys(&self) -> impl Iterator<Item = &AtomicItem> {
        self.entries.values().map(|(key, _)| key)
    }

    pub fn values(&self) -> impl Iterator<Item = &CollectionValue<N>> {
        self.entries.values().map(|(_, value)| value)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&AtomicItem, &CollectionValue<N>)> {
        self.entries.values().map(|(key, value)| (key, value))
    }

    /// A copy with `key` set. Existing keys keep their position; new keys
    /// are appended.
    pub fn put(&self, key: AtomicItem, value: CollectionValue<N>) -> Self {
        let mut map = self.clone();
        map.entries.insert(key.to_map_key(), (key, value));
        map
    }

    pub fn remove(&self, keys: &[AtomicItem]) -> Self {
        let mut map = self.clone();
        for key in keys {
            map.entries.shift_remove(&key.to_map_key());
        }
        map
    }

    /// Combines maps left to right, resolving shared keys with `policy`.
    pub fn merge(maps: &[MapItem<N>], policy: DuplicateKeyPolicy) -> Result<Self, MetapathError> {
        let mut result = Self::new();
        for map in maps {
            for (map_key, (key, value)) in &map.entries {
                let mut slot = match result.entries.entry(map_key.clone()) {
                    Entry::Vacant(slot) => {
                        slot.insert((key.clone(), value.clone()));
                        continue;
                    }
                    Entry::Occupied(slot) => slot,
                };
                let existing = &mut slot.get_mut().1;
                match policy {
                    DuplicateKeyPolicy::Reject => {
                        return Err(MetapathError::DuplicateMapKey {
                            key: key.as_string(),
                        });
                    }
                    DuplicateKeyPolicy::UseFirst | DuplicateKeyPolicy::UseAny => {}
                    DuplicateKeyPolicy::UseLast => *existing = value.clone(),
                    DuplicateKeyPolicy::Combine => {
                        let combined =
                            Sequence::concat([existing.as_sequence(), value.as_sequence()])?;
                        *existing = CollectionValue::Sequence(combined);
                    }
                }
            }
        }
        Ok(result)
    }

    pub fn to_json(&self) -> Result<serde_json::Value, MetapathError> {
        let mut object = serde_json::Map::with_capacity(self.entries.len());
        for (key, value) in self.entries.values() {
            object.insert(key.as_string(), value.to_json()?);
        }
        Ok(serde_json::Value::Object(object))
    }
}

impl<N: MetapathNode> Default for MapItem<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: MetapathNode> PartialEq for MapItem<N> {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self.entries.iter().all(|(key, (_, value))| {
                other
                    .entries
                    .get(key)
                    .is_some_and(|(_, other_value)| value == other_value)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Item;
    use metaschema_node::SimpleNode;

    fn value(s: &str) -> CollectionValue<SimpleNode> {
        CollectionValue::Item(Item::Atomic(AtomicItem::string(s)))
    }

    fn key(s: &str) -> AtomicItem {
        AtomicItem::string(s)
    }

    #[test]
    fn test_put_does_not_mutate() {
        let map: MapItem<SimpleNode> = MapItem::new().put(key("a"), value("1"));
        let updated = map.put(key("b"), value("2"));

        assert!(!map.contains(&key("b")));
        assert_eq!(map.size(), 1);
        assert!(updated.contains(&key("b")));
        assert_eq!(updated.get(&key("b")), Some(&value("2")));
    }

    #[test]
    fn test_put_preserves_order() {
        let map: MapItem<SimpleNode> = MapItem::new()
            .put(key("a"), value("1"))
            .put(key("b"), value("2"))
            .put(key("a"), value("3"));
        let keys: Vec<String> = map.keys().map(AtomicItem::as_string).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(map.get(&key("a")), Some(&value("3")));
    }

    #[test]
    fn test_numeric_keys_use_value_identity() {
        let map: MapItem<SimpleNode> =
            MapItem::new().put(AtomicItem::Integer(1), value("one"));
        assert!(map.contains(&AtomicItem::decimal(Decimal::new(10, 1))));
        assert!(map.contains(&AtomicItem::Double(1.0)));
        assert!(!map.contains(&key("1")));
    }

    #[test]
    fn test_date_keys_include_timezone_presence() {
        let local = AtomicItem::Date(Date::parse("2024-01-01").unwrap());
        let utc = AtomicItem::Date(Date::parse("2024-01-01Z").unwrap());
        let map: MapItem<SimpleNode> = MapItem::new().put(local.clone(), value("local"));
        assert!(map.contains(&local));
        assert!(!map.contains(&utc));
    }

    #[test]
    fn test_from_entries_rejects_duplicates() {
        let result: Result<MapItem<SimpleNode>, _> =
            MapItem::from_entries(vec![(key("a"), value("1")), (key("a"), value("2"))]);
        assert!(matches!(result, Err(MetapathError::DuplicateMapKey { .. })));
    }

    #[test]
    fn test_merge_policies() {
        let first: MapItem<SimpleNode> = MapItem::new()
            .put(key("a"), value("1"))
            .put(key("b"), value("2"));
        let second = MapItem::new()
            .put(key("b"), value("3"))
            .put(key("c"), value("4"));
        let maps = [first, second];

        let use_first = MapItem::merge(&maps, DuplicateKeyPolicy::UseFirst).unwrap();
        assert_eq!(use_first.size(), 3);
        assert_eq!(use_first.get(&key("b")), Some(&value("2")));

        let use_last = MapItem::merge(&maps, DuplicateKeyPolicy::UseLast).unwrap();
        assert_eq!(use_last.get(&key("b")), Some(&value("3")));

        let combined = MapItem::merge(&maps, DuplicateKeyPolicy::Combine).unwrap();
        let combined_b = combined.get(&key("b")).unwrap().as_sequence();
        assert_eq!(combined_b.len().unwrap(), 2);

        assert!(matches!(
            MapItem::merge(&maps, DuplicateKeyPolicy::Reject),
            Err(MetapathError::DuplicateMapKey { .. })
        ));
    }
}
