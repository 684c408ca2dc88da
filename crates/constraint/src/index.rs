//! Key index: a lookup from key tuples to the nodes that produced them.

use crate::error::IndexError;
use crate::key_field::{IndexKey, KeyDefinition, KeyField};
use metaschema_metapath::{DynamicContext, StaticContext};
use metaschema_node::MetapathNode;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

#[derive(Debug, Clone)]
pub struct Index<N> {
    key: KeyDefinition,
    entries: HashMap<IndexKey, N>,
}

impl<N: MetapathNode> Index<N> {
    /// Creates an empty index, compiling the key-field targets.
    pub fn new(
        key_fields: Vec<KeyField>,
        static_context: &StaticContext<N>,
    ) -> Result<Self, IndexError> {
        Ok(Self::with_definition(KeyDefinition::new(key_fields, static_context)?))
    }

    pub fn with_definition(key: KeyDefinition) -> Self {
        Self {
            key,
            entries: HashMap::new(),
        }
    }

    pub fn key_fields(&self) -> impl Iterator<Item = &KeyField> {
        self.key.key_fields()
    }

    pub fn to_key(&self, node: &N, context: &DynamicContext<N>) -> Result<IndexKey, IndexError> {
        self.key.to_key(node, context)
    }

    /// Stores `node` under `key`, returning the node previously stored there.
    /// All-null keys are not stored.
    pub fn put(&mut self, node: N, key: IndexKey) -> Option<N> {
        if key.is_all_nulls() {
            log::debug!("Not indexing {} under an all-null key", node.path());
            return None;
        }
        self.entries.insert(key, node)
    }

    /// Computes the key of `node` and stores it.
    pub fn put_item(
        &mut self,
        node: N,
        context: &DynamicContext<N>,
    ) -> Result<Option<N>, IndexError> {
        let key = self.to_key(&node, context)?;
        Ok(self.put(node, key))
    }

    pub fn get(&self, key: &IndexKey) -> Option<&N> {
        self.entries.get(key)
    }

    /// Looks up the entry whose key equals the key computed for `node`.
    pub fn get_item(&self, node: &N, context: &DynamicContext<N>) -> Result<Option<&N>, IndexError> {
        let key = self.to_key(node, context)?;
        Ok(self.get(&key))
    }

    /// Stores `node` unless its key is already taken, in which case the
    /// existing entry is kept and `DuplicateKey` is returned. All-null keys
    /// are accepted without being stored.
    pub fn insert_unique(
        &mut self,
        node: N,
        context: &DynamicContext<N>,
    ) -> Result<IndexKey, IndexError> {
        let key = self.to_key(&node, context)?;
        if key.is_all_nulls() {
            return Ok(key);
        }
        match self.entries.entry(key.clone()) {
            Entry::Occupied(_) => Err(IndexError::DuplicateKey {
                key: key.to_string(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(node);
                Ok(key)
            }
        }
    }

    pub fn contains_key(&self, key: &IndexKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
