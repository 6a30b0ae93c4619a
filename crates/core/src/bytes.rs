//! Ordered opaque byte keys.
//!
//! [`ByteKey`] is the key type of the engine's sorted state store. Keys compare
//! lexicographically as unsigned bytes; when one key is a strict prefix of the
//! other, the shorter key sorts first. Range scans over the store depend on this
//! being a strict total order.

use std::cmp::Ordering;
use std::fmt;

/// Compare two byte sequences in canonical key order.
///
/// Bytes are compared as unsigned values at the first differing index. On a
/// common prefix the shorter sequence is smaller; equal length and equal bytes
/// compare equal.
#[must_use]
pub fn compare(a: &[u8], b: &[u8]) -> Ordering {
    for (ours, theirs) in a.iter().zip(b.iter()) {
        match ours.cmp(theirs) {
            Ordering::Equal => {}
            decided => return decided,
        }
    }
    a.len().cmp(&b.len())
}

/// Immutable, arbitrary-length ordered byte sequence.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct ByteKey(Box<[u8]>);

impl ByteKey {
    /// The empty key. Sorts before every other key.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Copy `bytes` into a new key.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self(bytes.into())
    }

    /// Start building a composite key.
    #[must_use]
    pub fn builder() -> KeyBuilder {
        KeyBuilder::default()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this key begins with `prefix`.
    #[must_use]
    pub fn starts_with(&self, prefix: &ByteKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.0.into_vec()
    }
}

impl Ord for ByteKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(&self.0, &other.0)
    }
}

impl PartialOrd for ByteKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<Vec<u8>> for ByteKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into_boxed_slice())
    }
}

impl From<&[u8]> for ByteKey {
    fn from(bytes: &[u8]) -> Self {
        Self::from_slice(bytes)
    }
}

impl<const N: usize> From<[u8; N]> for ByteKey {
    fn from(bytes: [u8; N]) -> Self {
        Self::from_slice(&bytes)
    }
}

impl AsRef<[u8]> for ByteKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ByteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteKey(")?;
        for byte in self.0.iter() {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

/// Builder for composite keys whose byte order matches the order of their parts.
///
/// Integers are written big-endian; signed integers have their sign bit flipped
/// so negative values sort before positive ones.
#[derive(Debug, Default, Clone)]
pub struct KeyBuilder {
    buffer: Vec<u8>,
}

impl KeyBuilder {
    #[must_use]
    pub fn push_u8(mut self, value: u8) -> Self {
        self.buffer.push(value);
        self
    }

    #[must_use]
    pub fn push_u64(mut self, value: u64) -> Self {
        self.buffer.extend_from_slice(&value.to_be_bytes());
        self
    }

    #[must_use]
    pub fn push_i64(self, value: i64) -> Self {
        self.push_u64(u64::from_be_bytes(value.to_be_bytes()) ^ (1 << 63))
    }

    /// Append a string as a length-prefixed part.
    #[must_use]
    pub fn push_str(mut self, value: &str) -> Self {
        let length = u32::try_from(value.len()).unwrap_or(u32::MAX);
        self.buffer.extend_from_slice(&length.to_be_bytes());
        self.buffer.extend_from_slice(value.as_bytes());
        self
    }

    #[must_use]
    pub fn push_bytes(mut self, value: &[u8]) -> Self {
        self.buffer.extend_from_slice(value);
        self
    }

    #[must_use]
    pub fn build(self) -> ByteKey {
        ByteKey::from(self.buffer)
    }
}
