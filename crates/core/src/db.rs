//! Sorted in-memory state store.
//!
//! The store is split into column families, each one an ordered map from
//! [`ByteKey`] to an encoded value. Iteration within a family follows
//! [`ByteKey`] order, which is what range scans such as "every timer due at or
//! before now" rely on.

use std::collections::BTreeMap;
use std::ops::Bound;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::bytes::ByteKey;
use crate::error::{Error, Result};

/// Name of a column family in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnFamily(&'static str);

impl ColumnFamily {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        self.0
    }
}

/// Ordered key-value store backing the engine's state.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDb {
    families: BTreeMap<ColumnFamily, BTreeMap<ByteKey, Vec<u8>>>,
}

impl InMemoryDb {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode `value` and store it under `key`, replacing any previous value.
    ///
    /// # Errors
    /// Returns [`Error::EncodeFailed`] if the value cannot be encoded.
    pub fn put<T: Serialize>(&mut self, family: ColumnFamily, key: ByteKey, value: &T) -> Result<()> {
        let bytes = bincode::serde::encode_to_vec(value, bincode::config::standard())
            .map_err(|e| Error::encode_failed(family.name(), e.to_string()))?;
        tracing::trace!(family = family.name(), key = ?key, "put");
        self.families.entry(family).or_default().insert(key, bytes);
        Ok(())
    }

    /// Look up and decode the value stored under `key`.
    ///
    /// # Errors
    /// Returns [`Error::DecodeFailed`] if the stored bytes do not decode as `T`.
    pub fn get<T: DeserializeOwned>(&self, family: ColumnFamily, key: &ByteKey) -> Result<Option<T>> {
        self.families
            .get(&family)
            .and_then(|entries| entries.get(key))
            .map(|bytes| decode(family, bytes))
            .transpose()
    }

    #[must_use]
    pub fn contains(&self, family: ColumnFamily, key: &ByteKey) -> bool {
        self.families
            .get(&family)
            .is_some_and(|entries| entries.contains_key(key))
    }

    /// Remove `key`, returning whether it was present.
    pub fn delete(&mut self, family: ColumnFamily, key: &ByteKey) -> bool {
        let removed = self
            .families
            .get_mut(&family)
            .and_then(|entries| entries.remove(key))
            .is_some();
        tracing::trace!(family = family.name(), key = ?key, removed, "delete");
        removed
    }

    /// Decode every entry whose key is `<= upper`, in key order.
    ///
    /// # Errors
    /// Returns [`Error::DecodeFailed`] on the first entry that fails to decode.
    pub fn scan_up_to<T: DeserializeOwned>(
        &self,
        family: ColumnFamily,
        upper: &ByteKey,
    ) -> Result<Vec<(ByteKey, T)>> {
        self.range(family, Bound::Unbounded, Bound::Included(upper))
    }

    /// Decode every entry whose key starts with `prefix`, in key order.
    ///
    /// # Errors
    /// Returns [`Error::DecodeFailed`] on the first entry that fails to decode.
    pub fn scan_prefix<T: DeserializeOwned>(
        &self,
        family: ColumnFamily,
        prefix: &ByteKey,
    ) -> Result<Vec<(ByteKey, T)>> {
        let Some(entries) = self.families.get(&family) else {
            return Ok(Vec::new());
        };
        entries
            .range::<ByteKey, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, bytes)| decode(family, bytes).map(|value| (key.clone(), value)))
            .collect()
    }

    /// Number of entries in `family`.
    #[must_use]
    pub fn len(&self, family: ColumnFamily) -> usize {
        self.families.get(&family).map_or(0, BTreeMap::len)
    }

    #[must_use]
    pub fn is_empty(&self, family: ColumnFamily) -> bool {
        self.len(family) == 0
    }

    fn range<T: DeserializeOwned>(
        &self,
        family: ColumnFamily,
        lower: Bound<&ByteKey>,
        upper: Bound<&ByteKey>,
    ) -> Result<Vec<(ByteKey, T)>> {
        let Some(entries) = self.families.get(&family) else {
            return Ok(Vec::new());
        };
        entries
            .range::<ByteKey, _>((lower, upper))
            .map(|(key, bytes)| decode(family, bytes).map(|value| (key.clone(), value)))
            .collect()
    }
}

fn decode<T: DeserializeOwned>(family: ColumnFamily, bytes: &[u8]) -> Result<T> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| Error::decode_failed(family.name(), e.to_string()))
}
