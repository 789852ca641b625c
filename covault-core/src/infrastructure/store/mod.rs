//! Generic idempotent multi-index in-process cache.
//!
//! No I/O happens here: this is the dedup/materialization cache every
//! handler reads and writes. Objects are immutable once authored, so a
//! repeated `store` of a held key is always a cache hit, never an update.

pub mod indexes;

pub use indexes::*;

use crate::foundation::{Hash32, Result, VaultError};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Names of the declared lookup dimensions.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum IndexName {
    EventId,
    Policy,
    Proposal,
    Author,
    Recipient,
    Kind,
    Identifier,
}

impl IndexName {
    pub const fn as_str(&self) -> &'static str {
        match self {
            IndexName::EventId => "event_id",
            IndexName::Policy => "policy",
            IndexName::Proposal => "proposal",
            IndexName::Author => "author",
            IndexName::Recipient => "recipient",
            IndexName::Kind => "kind",
            IndexName::Identifier => "identifier",
        }
    }
}

impl fmt::Display for IndexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform 32-byte index key. Non-hash values (strings, kind
/// discriminants, composites) are mapped in by hashing.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct IndexValue(Hash32);

impl IndexValue {
    pub fn new(value: Hash32) -> Self {
        Self(value)
    }

    pub fn composite(parts: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(&(part.len() as u32).to_le_bytes());
            hasher.update(part);
        }
        Self(*hasher.finalize().as_bytes())
    }
}

impl From<crate::foundation::EventId> for IndexValue {
    fn from(value: crate::foundation::EventId) -> Self {
        Self(*value.as_hash())
    }
}

impl From<crate::foundation::PolicyId> for IndexValue {
    fn from(value: crate::foundation::PolicyId) -> Self {
        Self(*value.as_hash())
    }
}

impl From<crate::foundation::PublicKey> for IndexValue {
    fn from(value: crate::foundation::PublicKey) -> Self {
        Self(*value.as_hash())
    }
}

impl From<crate::domain::EventKind> for IndexValue {
    fn from(value: crate::domain::EventKind) -> Self {
        Self::composite(&[b"kind", &value.as_u16().to_le_bytes()])
    }
}

impl From<&str> for IndexValue {
    fn from(value: &str) -> Self {
        Self::composite(&[b"str", value.as_bytes()])
    }
}

/// Implemented by every cacheable object: a stable primary key plus the
/// values it exposes under each declared index.
pub trait Indexed: Clone {
    fn primary_key(&self) -> IndexValue;
    fn index_values(&self, index: IndexName) -> Vec<IndexValue>;
}

pub struct ObjectStore<T: Indexed> {
    declared: &'static [IndexName],
    objects: HashMap<IndexValue, T>,
    indexes: HashMap<IndexName, HashMap<IndexValue, BTreeSet<IndexValue>>>,
}

impl<T: Indexed> ObjectStore<T> {
    pub fn new(declared: &'static [IndexName]) -> Self {
        let indexes = declared.iter().map(|name| (*name, HashMap::new())).collect();
        Self { declared, objects: HashMap::new(), indexes }
    }

    pub fn declared_indexes(&self) -> &'static [IndexName] {
        self.declared
    }

    fn buckets(&self, index: IndexName) -> Result<&HashMap<IndexValue, BTreeSet<IndexValue>>> {
        self.indexes.get(&index).ok_or(VaultError::UnknownIndex { index: index.as_str() })
    }

    /// Idempotent insert: first write wins by primary key. Returns whether
    /// the object was newly stored.
    pub fn store(&mut self, object: T) -> bool {
        let primary = object.primary_key();
        if self.objects.contains_key(&primary) {
            return false;
        }
        for index in self.declared {
            for value in object.index_values(*index) {
                self.indexes
                    .get_mut(index)
                    .expect("declared index")
                    .entry(value)
                    .or_default()
                    .insert(primary);
            }
        }
        self.objects.insert(primary, object);
        true
    }

    /// Returns the number of objects newly stored.
    pub fn store_many(&mut self, objects: impl IntoIterator<Item = T>) -> usize {
        let mut stored = 0;
        for object in objects {
            if self.store(object) {
                stored += 1;
            }
        }
        stored
    }

    /// Exactly-one accessor: the first object (by primary-key order) under
    /// the given index value.
    pub fn get(&self, value: impl Into<IndexValue>, index: IndexName) -> Result<Option<T>> {
        let buckets = self.buckets(index)?;
        let Some(bucket) = buckets.get(&value.into()) else {
            return Ok(None);
        };
        Ok(bucket.first().and_then(|primary| self.objects.get(primary)).cloned())
    }

    /// Every object under one index value.
    pub fn by_index(&self, value: impl Into<IndexValue>, index: IndexName) -> Result<Vec<T>> {
        let buckets = self.buckets(index)?;
        let Some(bucket) = buckets.get(&value.into()) else {
            return Ok(Vec::new());
        };
        Ok(bucket.iter().filter_map(|primary| self.objects.get(primary)).cloned().collect())
    }

    /// Batch lookup across several index values; always a (possibly empty)
    /// list, deduplicated by primary key.
    pub fn get_many(&self, values: impl IntoIterator<Item = impl Into<IndexValue>>, index: IndexName) -> Result<Vec<T>> {
        let buckets = self.buckets(index)?;
        let mut primaries: BTreeSet<IndexValue> = BTreeSet::new();
        for value in values {
            if let Some(bucket) = buckets.get(&value.into()) {
                primaries.extend(bucket.iter().copied());
            }
        }
        Ok(primaries.iter().filter_map(|primary| self.objects.get(primary)).cloned().collect())
    }

    pub fn all(&self) -> Vec<T> {
        self.objects.values().cloned().collect()
    }

    pub fn has(&self, value: impl Into<IndexValue>, index: IndexName) -> Result<bool> {
        Ok(self.buckets(index)?.contains_key(&value.into()))
    }

    /// The subset of `values` not present under `index`; the primitive every
    /// handler uses to avoid redundant fetch and decryption work.
    pub fn missing<V: Copy + Into<IndexValue>>(&self, values: &[V], index: IndexName) -> Result<Vec<V>> {
        let buckets = self.buckets(index)?;
        Ok(values.iter().copied().filter(|value| !buckets.contains_key(&(*value).into())).collect())
    }

    /// Removes one object by primary key, stripping it from every declared
    /// index and pruning now-empty buckets.
    pub fn remove_by_key(&mut self, primary: impl Into<IndexValue>) -> Option<T> {
        let primary = primary.into();
        let object = self.objects.remove(&primary)?;
        for index in self.declared {
            let buckets = self.indexes.get_mut(index).expect("declared index");
            for value in object.index_values(*index) {
                if let Some(bucket) = buckets.get_mut(&value) {
                    bucket.remove(&primary);
                    if bucket.is_empty() {
                        buckets.remove(&value);
                    }
                }
            }
        }
        Some(object)
    }

    pub fn remove(&mut self, object: &T) -> Option<T> {
        self.remove_by_key(object.primary_key())
    }

    pub fn remove_many(&mut self, primaries: impl IntoIterator<Item = impl Into<IndexValue>>) -> usize {
        let mut removed = 0;
        for primary in primaries {
            if self.remove_by_key(primary).is_some() {
                removed += 1;
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn clear(&mut self) {
        self.objects.clear();
        for buckets in self.indexes.values_mut() {
            buckets.clear();
        }
    }
}
