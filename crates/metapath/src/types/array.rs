use super::{CollectionValue, Item};
use crate::error::MetapathError;
use metaschema_node::MetapathNode;

/// An immutable, 1-indexed list of members. Every operation that changes the
/// array returns a new one.
#[derive(Debug, Clone)]
pub struct ArrayItem<N> {
    members: Vec<CollectionValue<N>>,
}

impl<N: MetapathNode> ArrayItem<N> {
    pub fn new() -> Self {
        Self {
            members: Vec::new(),
        }
    }

    pub fn from_members(members: Vec<CollectionValue<N>>) -> Self {
        Self { members }
    }

    /// One member per item.
    pub fn from_items(items: impl IntoIterator<Item = Item<N>>) -> Self {
        Self::from_members(items.into_iter().map(CollectionValue::Item).collect())
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> &[CollectionValue<N>] {
        &self.members
    }

    fn index(&self, position: i64, allow_end: bool) -> Result<usize, MetapathError> {
        let upper = if allow_end {
            self.members.len() + 1
        } else {
            self.members.len()
        };
        match usize::try_from(position) {
            Ok(p) if p >= 1 && p <= upper => Ok(p - 1),
            _ => Err(MetapathError::ArrayIndexOutOfBounds {
                index: position,
                size: self.members.len(),
            }),
        }
    }

    pub fn get(&self, position: i64) -> Result<&CollectionValue<N>, MetapathError> {
        let index = self.index(position, false)?;
        Ok(&self.members[index])
    }

    pub fn put(&self, position: i64, value: CollectionValue<N>) -> Result<Self, MetapathError> {
        let index = self.index(position, false)?;
        let mut members = self.members.clone();
        members[index] = value;
        Ok(Self::from_members(members))
    }

    pub fn append(&self, value: CollectionValue<N>) -> Self {
        let mut members = self.members.clone();
        members.push(value);
        Self::from_members(members)
    }

    /// Inserts before `position`; `size + 1` appends.
    pub fn insert_before(
        &self,
        position: i64,
        value: CollectionValue<N>,
    ) -> Result<Self, MetapathError> {
        let index = self.index(position, true)?;
        let mut members = self.members.clone();
        members.insert(index, value);
        Ok(Self::from_members(members))
    }

    /// Removes every listed position. Each must be in range.
    pub fn remove(&self, positions: &[i64]) -> Result<Self, MetapathError> {
        let mut doomed = Vec::with_capacity(positions.len());
        for &position in positions {
            doomed.push(self.index(position, false)?);
        }
        let members = self
            .members
            .iter()
            .enumerate()
            .filter(|(index, _)| !doomed.contains(index))
            .map(|(_, member)| member.clone())
            .collect();
        Ok(Self::from_members(members))
    }

    /// The members from `start`, optionally limited to `length` of them.
    pub fn subarray(&self, start: i64, length: Option<i64>) -> Result<Self, MetapathError> {
        let from = self.index(start, true)?;
        let to = match length {
            None => self.members.len(),
            Some(length) if length < 0 => {
                return Err(MetapathError::function(
                    "array:subarray",
                    format!("negative length {length}"),
                ));
            }
            Some(length) => usize::try_from(length)
                .ok()
                .and_then(|length| from.checked_add(length))
                .filter(|to| *to <= self.members.len())
                .ok_or(MetapathError::ArrayIndexOutOfBounds {
                    index: start.saturating_add(length),
                    size: self.members.len(),
                })?,
        };
        Ok(Self::from_members(self.members[from..to].to_vec()))
    }

    pub fn head(&self) -> Result<&CollectionValue<N>, MetapathError> {
        self.members.first().ok_or(MetapathError::EmptyArray)
    }

    pub fn tail(&self) -> Result<Self, MetapathError> {
        if self.members.is_empty() {
            return Err(MetapathError::EmptyArray);
        }
        Ok(Self::from_members(self.members[1..].to_vec()))
    }

    pub fn reverse(&self) -> Self {
        let mut members = self.members.clone();
        members.reverse();
        Self::from_members(members)
    }

    pub fn join(arrays: &[ArrayItem<N>]) -> Self {
        let total: usize = arrays.iter().map(|a| a.members.len()).sum();
        let mut members = Vec::with_capacity(total);
        for array in arrays {
            members.extend(array.members.iter().cloned());
        }
        Self::from_members(members)
    }

    /// All member items, recursively flattening nested arrays and maps.
    pub fn flatten(&self) -> Result<Vec<Item<N>>, MetapathError> {
        let mut result = Vec::new();
        for member in &self.members {
            result.extend(member.flatten()?);
        }
        Ok(result)
    }

    pub fn to_json(&self) -> Result<serde_json::Value, MetapathError> {
        self.members
            .iter()
            .map(CollectionValue::to_json)
            .collect::<Result<Vec<_>, _>>()
            .map(serde_json::Value::Array)
    }
}

impl<N: MetapathNode> Default for ArrayItem<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: MetapathNode> PartialEq for ArrayItem<N> {
    fn eq(&self, other: &Self) -> bool {
        self.members == other.members
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AtomicItem, Sequence};
    use metaschema_node::SimpleNode;

    fn int(i: i64) -> CollectionValue<SimpleNode> {
        CollectionValue::Item(Item::Atomic(AtomicItem::Integer(i)))
    }

    fn ints(values: &[i64]) -> ArrayItem<SimpleNode> {
        ArrayItem::from_members(values.iter().map(|v| int(*v)).collect())
    }

    #[test]
    fn test_array_operations() {
        let arr: ArrayItem<SimpleNode> = ArrayItem::new();
        assert!(arr.is_empty());

        let arr = arr.append(int(1)).append(int(2)).append(int(3));
        assert_eq!(arr.size(), 3);
        assert_eq!(arr.get(1).unwrap(), &int(1));
        assert_eq!(arr.get(3).unwrap(), &int(3));

        let updated = arr.put(2, int(20)).unwrap();
        assert_eq!(updated.get(2).unwrap(), &int(20));
        assert_eq!(arr.get(2).unwrap(), &int(2));
    }

    #[test]
    fn test_get_out_of_bounds() {
        let arr = ints(&[1, 2, 3]);
        assert!(matches!(
            arr.get(0),
            Err(MetapathError::ArrayIndexOutOfBounds { index: 0, size: 3 })
        ));
        assert!(matches!(
            arr.get(4),
            Err(MetapathError::ArrayIndexOutOfBounds { index: 4, size: 3 })
        ));
    }

    #[test]
    fn test_insert_before() {
        let arr = ints(&[1, 2, 3]);
        for position in 1..=3 {
            let inserted = arr.insert_before(position, int(99)).unwrap();
            assert_eq!(inserted.size(), 4);
            assert_eq!(inserted.get(position).unwrap(), &int(99));
        }
        let appended = arr.insert_before(4, int(4)).unwrap();
        assert_eq!(appended, ints(&[1, 2, 3, 4]));
        assert!(arr.insert_before(5, int(5)).is_err());
        assert!(arr.insert_before(0, int(0)).is_err());
    }

    #[test]
    fn test_remove_subarray_reverse() {
        let arr = ints(&[1, 2, 3, 4]);
        assert_eq!(arr.remove(&[2, 4]).unwrap(), ints(&[1, 3]));
        assert!(arr.remove(&[5]).is_err());

        assert_eq!(arr.subarray(2, None).unwrap(), ints(&[2, 3, 4]));
        assert_eq!(arr.subarray(2, Some(2)).unwrap(), ints(&[2, 3]));
        assert_eq!(arr.subarray(5, None).unwrap(), ints(&[]));
        assert!(arr.subarray(3, Some(3)).is_err());

        assert_eq!(arr.reverse(), ints(&[4, 3, 2, 1]));
    }

    #[test]
    fn test_head_tail_on_empty() {
        let empty: ArrayItem<SimpleNode> = ArrayItem::new();
        assert!(matches!(empty.head(), Err(MetapathError::EmptyArray)));
        assert!(matches!(empty.tail(), Err(MetapathError::EmptyArray)));

        let arr = ints(&[1, 2]);
        assert_eq!(arr.head().unwrap(), &int(1));
        assert_eq!(arr.tail().unwrap(), ints(&[2]));
    }

    #[test]
    fn test_flatten_nested() {
        let inner = ints(&[2, 3]);
        let arr = ArrayItem::from_members(vec![
            int(1),
            CollectionValue::Item(Item::Array(inner)),
            CollectionValue::Sequence(Sequence::from_items(vec![
                Item::Atomic(AtomicItem::Integer(4)),
                Item::Atomic(AtomicItem::Integer(5)),
            ])),
        ]);
        let flat: Vec<i64> = arr
            .flatten()
            .unwrap()
            .iter()
            .filter_map(|item| item.as_atomic().and_then(AtomicItem::as_i64))
            .collect();
        assert_eq!(flat, vec![1, 2, 3, 4, 5]);
    }
}
