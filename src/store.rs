// 9.0: ordered key-value tables. values are held encoded so every read goes through the
// codec's byte round-trip, the same contract a persistent backend gives.
// 9.1 Staged is a write overlay: an operation reads through it, and its writes
// reach the table only when the whole operation succeeded.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::ops::Bound;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("encode failed: {0}")]
    Encode(String),

    #[error("decode failed: {0}")]
    Decode(String),
}

pub trait Codec<T> {
    fn encode(&self, value: &T) -> Result<Vec<u8>, StoreError>;
    fn decode(&self, bytes: &[u8]) -> Result<T, StoreError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T: Serialize + DeserializeOwned> Codec<T> for JsonCodec {
    fn encode(&self, value: &T) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(value).map_err(|e| StoreError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Decode(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

/// Composite key whose leading component scopes range scans.
pub trait PrefixKey: Ord + Clone {
    type Prefix: PartialEq;

    fn prefix(&self) -> &Self::Prefix;

    /// Smallest key that carries `prefix`.
    fn prefix_start(prefix: &Self::Prefix) -> Self;
}

#[derive(Debug, Clone)]
pub struct Table<K, V, C = JsonCodec> {
    entries: BTreeMap<K, Vec<u8>>,
    codec: C,
    _value: PhantomData<V>,
}

impl<K: Ord + Clone, V, C: Codec<V> + Default> Default for Table<K, V, C> {
    fn default() -> Self {
        Self::new(C::default())
    }
}

impl<K: Ord + Clone, V, C: Codec<V>> Table<K, V, C> {
    pub fn new(codec: C) -> Self {
        Self {
            entries: BTreeMap::new(),
            codec,
            _value: PhantomData,
        }
    }

    pub fn get(&self, key: &K) -> Result<Option<V>, StoreError> {
        self.entries
            .get(key)
            .map(|bytes| self.codec.decode(bytes))
            .transpose()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: K, value: &V) -> Result<(), StoreError> {
        let bytes = self.codec.encode(value)?;
        self.entries.insert(key, bytes);
        Ok(())
    }

    pub fn remove(&mut self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn range(
        &self,
        lower: Bound<K>,
        upper: Bound<K>,
        order: Order,
    ) -> Result<Vec<(K, V)>, StoreError> {
        let decode = |(k, bytes): (&K, &Vec<u8>)| self.codec.decode(bytes).map(|v| (k.clone(), v));
        let range = self.entries.range((lower, upper));
        match order {
            Order::Ascending => range.map(decode).collect(),
            Order::Descending => range.rev().map(decode).collect(),
        }
    }

    pub fn iter(&self, order: Order) -> Result<Vec<(K, V)>, StoreError> {
        self.range(Bound::Unbounded, Bound::Unbounded, order)
    }

    pub fn apply(&mut self, writes: BTreeMap<K, Option<Vec<u8>>>) {
        for (key, write) in writes {
            match write {
                Some(bytes) => {
                    self.entries.insert(key, bytes);
                }
                None => {
                    self.entries.remove(&key);
                }
            }
        }
    }

    fn raw(&self, key: &K) -> Option<&Vec<u8>> {
        self.entries.get(key)
    }
}

impl<K: PrefixKey, V, C: Codec<V>> Table<K, V, C> {
    pub fn prefix(&self, prefix: &K::Prefix, order: Order) -> Result<Vec<(K, V)>, StoreError> {
        let mut out = Vec::new();
        for (k, bytes) in self.entries.range(K::prefix_start(prefix)..) {
            if k.prefix() != prefix {
                break;
            }
            out.push((k.clone(), self.codec.decode(bytes)?));
        }
        if order == Order::Descending {
            out.reverse();
        }
        Ok(out)
    }
}

/// Pending writes over a borrowed table. `None` marks a delete.
#[derive(Debug)]
pub struct Staged<'a, K, V, C = JsonCodec> {
    base: &'a Table<K, V, C>,
    writes: BTreeMap<K, Option<Vec<u8>>>,
}

impl<'a, K: Clone, V, C> Clone for Staged<'a, K, V, C> {
    fn clone(&self) -> Self {
        Self {
            base: self.base,
            writes: self.writes.clone(),
        }
    }
}

impl<'a, K: Ord + Clone, V, C: Codec<V>> Staged<'a, K, V, C> {
    pub fn new(base: &'a Table<K, V, C>) -> Self {
        Self {
            base,
            writes: BTreeMap::new(),
        }
    }

    pub fn base(&self) -> &'a Table<K, V, C> {
        self.base
    }

    pub fn get(&self, key: &K) -> Result<Option<V>, StoreError> {
        let bytes = match self.writes.get(key) {
            Some(write) => write.as_ref(),
            None => self.base.raw(key),
        };
        bytes.map(|b| self.base.codec.decode(b)).transpose()
    }

    pub fn contains(&self, key: &K) -> bool {
        match self.writes.get(key) {
            Some(write) => write.is_some(),
            None => self.base.contains(key),
        }
    }

    pub fn insert(&mut self, key: K, value: &V) -> Result<(), StoreError> {
        let bytes = self.base.codec.encode(value)?;
        self.writes.insert(key, Some(bytes));
        Ok(())
    }

    pub fn remove(&mut self, key: &K) {
        self.writes.insert(key.clone(), None);
    }

    // merges base and pending writes inside the bounds
    pub fn range(
        &self,
        lower: Bound<K>,
        upper: Bound<K>,
        order: Order,
    ) -> Result<Vec<(K, V)>, StoreError> {
        let bounds = (lower, upper);
        let mut merged: BTreeMap<&K, &Vec<u8>> = self.base.entries.range(bounds.clone()).collect();
        for (key, write) in self.writes.range(bounds) {
            match write {
                Some(bytes) => {
                    merged.insert(key, bytes);
                }
                None => {
                    merged.remove(key);
                }
            }
        }

        let codec = &self.base.codec;
        let decode = |(k, bytes): (&K, &Vec<u8>)| codec.decode(bytes).map(|v| (k.clone(), v));
        match order {
            Order::Ascending => merged.into_iter().map(decode).collect(),
            Order::Descending => merged.into_iter().rev().map(decode).collect(),
        }
    }

    pub fn into_writes(self) -> BTreeMap<K, Option<Vec<u8>>> {
        self.writes
    }
}

impl<'a, K: PrefixKey, V, C: Codec<V>> Staged<'a, K, V, C> {
    pub fn prefix(&self, prefix: &K::Prefix, order: Order) -> Result<Vec<(K, V)>, StoreError> {
        let start = Bound::Included(K::prefix_start(prefix));
        let all = self.range(start, Bound::Unbounded, Order::Ascending)?;
        let mut out: Vec<(K, V)> =
            all.into_iter().take_while(|(k, _)| k.prefix() == prefix).collect();
        if order == Order::Descending {
            out.reverse();
        }
        Ok(out)
    }
}
