//! Core data structures for the dynarray project.
//!
//! This crate provides:
//! - [`DynArray`]: a growable array of plain-data elements, held on the heap or
//!   in a memory-mapped file with a fixed header.
//! - [`SubRange`]: a borrowed window over part of an array.
//! - [`hash`]: the 32-bit xxHash used to order tree entries.
//! - [`HashTree`]: a hash-ordered binary search tree whose nodes live in a
//!   single [`DynArray`] and link to each other by index, so a tree can be
//!   persisted and reopened like any other array.
//!
//! Element, key and value types must be [`bytemuck::Pod`]; [`InlineStr`]
//! covers short strings.

pub mod dyn_array;
pub mod hash;
pub mod hash_tree;
pub mod header;
pub mod key;
pub mod sort;
pub mod storage;
pub mod sub_range;

pub use dyn_array::{
    grown_capacity, ArrayParams, Comparator, DynArray, IndexError, IndexResult, DEFAULT_CAPACITY,
    DEFAULT_GROWTH,
};
pub use hash::{hash, TREE_SEED};
pub use hash_tree::{HashEntry, HashTree, KeyComparator, TreeParams};
pub use header::{FileHeader, FORMAT_VERSION, HEADER_SIZE, METADATA_SIZE};
pub use key::{CapacityError, HashKey, InlineStr};
pub use storage::{StoreError, StoreResult};
pub use sub_range::SubRange;
