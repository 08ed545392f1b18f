use indexmap::IndexMap;

use crate::{
    error::{BridgeError, BridgeResult, ExcType},
    heap::Heap,
    value::{DictKey, Value},
};

/// An insertion-ordered Python dict.
///
/// Keys are stored alongside their hashable projection so that iteration
/// returns the original key values (e.g. `True` rather than `1`).
#[derive(Debug, Default, Clone)]
pub(crate) struct Dict {
    entries: IndexMap<DictKey, (Value, Value)>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &Value, heap: &Heap) -> BridgeResult<Option<&Value>> {
        let key = DictKey::from_value(key, heap)?;
        Ok(self.entries.get(&key).map(|(_, value)| value))
    }

    /// Looks up `key`, raising `KeyError` when absent.
    pub fn get_item(&self, key: &Value, heap: &Heap) -> BridgeResult<Value> {
        match self.get(key, heap)? {
            Some(value) => Ok(value.clone()),
            None => Err(BridgeError::exception(ExcType::KeyError, key.repr(heap))),
        }
    }

    /// Inserts with a key already hashed by the caller.
    ///
    /// Hashing needs the heap, which is mutably borrowed while the dict is
    /// being written, so the two steps are split.
    pub fn insert(&mut self, hashed: DictKey, key: Value, value: Value) {
        self.entries.insert(hashed, (key, value));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.values().map(|(key, value)| (key, value))
    }
}
