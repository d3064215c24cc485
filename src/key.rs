use std::cmp::Ordering;
use std::fmt;

use bytemuck::{Pod, Zeroable};

/// Keys that can order entries in a [`HashTree`](crate::HashTree).
///
/// The tree hashes [`HashKey::hash_bytes`]; types whose bytes include unused
/// capacity should override it to return only the live bytes.
pub trait HashKey: Pod {
    /// Returns the bytes fed to the hash function.
    fn hash_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

macro_rules! impl_hash_key {
    ($($ty:ty),*) => {
        $(impl HashKey for $ty {})*
    };
}

impl_hash_key!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128, usize, isize);

impl<const N: usize> HashKey for [u8; N] {}

/// Error returned when a value does not fit an [`InlineStr`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{len} bytes do not fit in an inline string of capacity {capacity}")]
pub struct CapacityError {
    pub len: usize,
    pub capacity: usize,
}

/// Fixed-capacity byte string stored inline, usable as a tree key or value.
///
/// Holds at most `min(N, 255)` bytes. Unused capacity is zeroed and excluded
/// from hashing, comparison and display.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct InlineStr<const N: usize> {
    len: u8,
    bytes: [u8; N],
}

// SAFETY: `repr(C)` with only byte-aligned fields, so there is no padding and
// every bit pattern is a valid value.
unsafe impl<const N: usize> Zeroable for InlineStr<N> {}
unsafe impl<const N: usize> Pod for InlineStr<N> {}

impl<const N: usize> InlineStr<N> {
    /// Copies `value` into a new inline string.
    pub fn new(value: impl AsRef<[u8]>) -> Result<Self, CapacityError> {
        let value = value.as_ref();
        let capacity = N.min(u8::MAX as usize);
        if value.len() > capacity {
            return Err(CapacityError {
                len: value.len(),
                capacity,
            });
        }
        let mut bytes = [0u8; N];
        bytes[..value.len()].copy_from_slice(value);
        Ok(Self {
            len: value.len() as u8,
            bytes,
        })
    }

    /// Returns the live bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len()]
    }

    /// Returns the contents as UTF-8, if valid.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(self.as_bytes()).ok()
    }

    pub fn len(&self) -> usize {
        usize::from(self.len).min(N)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<const N: usize> HashKey for InlineStr<N> {
    fn hash_bytes(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl<const N: usize> Default for InlineStr<N> {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl<const N: usize> PartialEq for InlineStr<N> {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl<const N: usize> Eq for InlineStr<N> {}

impl<const N: usize> PartialOrd for InlineStr<N> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<const N: usize> Ord for InlineStr<N> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl<const N: usize> TryFrom<&str> for InlineStr<N> {
    type Error = CapacityError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl<const N: usize> fmt::Display for InlineStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.as_bytes()))
    }
}

impl<const N: usize> fmt::Debug for InlineStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(self.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_compares_live_bytes() {
        let a = InlineStr::<16>::new("Key 1").unwrap();
        let b = InlineStr::<16>::new("Key 10").unwrap();
        assert_eq!(a.as_str(), Some("Key 1"));
        assert_eq!(a.len(), 5);
        assert!(a < b);
        assert_eq!(a, InlineStr::<16>::try_from("Key 1").unwrap());
        assert_eq!(a.hash_bytes(), b"Key 1");
    }

    #[test]
    fn rejects_oversized_values() {
        let err = InlineStr::<4>::new("too long").unwrap_err();
        assert_eq!(err, CapacityError { len: 8, capacity: 4 });
    }

    #[test]
    fn primitive_keys_hash_their_bytes() {
        assert_eq!(7u32.hash_bytes(), &7u32.to_ne_bytes());
    }
}
