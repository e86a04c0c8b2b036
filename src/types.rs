//! Core types used throughout the peer cache.

use bytes::Bytes;
use std::fmt;

/// Node identifier on the hash ring.
///
/// For the HTTP transport this is the peer's base URL, e.g.
/// `http://10.0.0.2:8001`.
pub type NodeId = String;

/// Anything the eviction store can account for in bytes.
pub trait Weighted {
    /// Number of bytes this value occupies.
    fn weight(&self) -> usize;
}

/// An immutable view over cached bytes.
///
/// Cloning is cheap (reference counted) and no handle can mutate the
/// underlying bytes, so a value returned from the cache can never alter what
/// other callers observe.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ByteView {
    bytes: Bytes,
}

impl ByteView {
    /// Create a view that owns a private copy of `data`.
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self {
            bytes: Bytes::copy_from_slice(data),
        }
    }

    /// Length of the view in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the view is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Borrow the bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Copy the bytes out into an owned buffer.
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }

    /// The bytes as a cheap shared handle.
    pub fn bytes(&self) -> Bytes {
        self.bytes.clone()
    }
}

impl Weighted for ByteView {
    fn weight(&self) -> usize {
        self.bytes.len()
    }
}

impl From<Bytes> for ByteView {
    fn from(bytes: Bytes) -> Self {
        Self { bytes }
    }
}

impl From<&'static str> for ByteView {
    fn from(s: &'static str) -> Self {
        Self {
            bytes: Bytes::from_static(s.as_bytes()),
        }
    }
}

impl From<String> for ByteView {
    fn from(s: String) -> Self {
        Self {
            bytes: Bytes::from(s),
        }
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(v: Vec<u8>) -> Self {
        Self {
            bytes: Bytes::from(v),
        }
    }
}

impl AsRef<[u8]> for ByteView {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.bytes))
    }
}

impl fmt::Debug for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ByteView").field(&self.bytes).finish()
    }
}

/// Local storage statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of resident entries.
    pub entry_count: u64,
    /// Bytes accounted to resident entries (keys plus values).
    pub weighted_size: u64,
    /// Number of lookups that found a value.
    pub hits: u64,
    /// Number of lookups that found nothing.
    pub misses: u64,
    /// Number of entries evicted to stay within budget.
    pub evictions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_is_detached_from_source() {
        let mut source = b"value".to_vec();
        let view = ByteView::copy_from_slice(&source);
        source[0] = b'V';

        assert_eq!(view.as_slice(), b"value");
        assert_eq!(view.weight(), 5);
    }

    #[test]
    fn test_to_vec_returns_copy() {
        let view = ByteView::from("abc");
        let mut copy = view.to_vec();
        copy.push(b'd');

        assert_eq!(view.len(), 3);
        assert_eq!(view.to_string(), "abc");
    }
}
