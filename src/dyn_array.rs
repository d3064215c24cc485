use std::cmp::Ordering;
use std::fmt;
use std::mem;
use std::ops::{Index, IndexMut};
use std::path::{Path, PathBuf};

use bytemuck::Pod;
use thiserror::Error;

use crate::header::{FileHeader, METADATA_SIZE};
use crate::sort;
use crate::storage::{check_mappable, MappedFile, Storage, StoreError, StoreResult};
use crate::sub_range::SubRange;

/// Default growth multiplier.
pub const DEFAULT_GROWTH: f32 = 1.5;

/// Default initial capacity.
pub const DEFAULT_CAPACITY: usize = 10;

/// Element comparator used by sort and search.
pub type Comparator<T> = fn(&T, &T) -> Ordering;

/// Error returned when an index-based operation is outside the current bounds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("index {index} out of bounds for length {len}")]
pub struct IndexError {
    pub index: usize,
    pub len: usize,
}

/// Convenience alias for results produced by index-based operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Creation parameters for a [`DynArray`].
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayParams {
    /// Initial logical size; these elements start zeroed.
    pub size: usize,
    /// Growth multiplier, reset to [`DEFAULT_GROWTH`] unless greater than 1.0.
    pub growth: f32,
    /// Initial capacity, raised to `size` (and at least 1).
    pub capacity: usize,
    /// Backing file for a memory-mapped array.
    pub path: Option<PathBuf>,
}

impl Default for ArrayParams {
    fn default() -> Self {
        Self {
            size: 0,
            growth: DEFAULT_GROWTH,
            capacity: DEFAULT_CAPACITY,
            path: None,
        }
    }
}

impl ArrayParams {
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn with_growth(mut self, growth: f32) -> Self {
        self.growth = growth;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Backs the array with a memory-mapped file at `path`.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    fn normalized_growth(&self) -> f32 {
        if self.growth > 1.0 {
            self.growth
        } else {
            DEFAULT_GROWTH
        }
    }

    fn normalized_capacity(&self) -> usize {
        self.capacity.max(self.size).max(1)
    }
}

/// Computes the capacity needed to hold `required` elements.
///
/// Starting from `capacity` (or `required` when `capacity` is zero), each step
/// multiplies by `growth` and rounds down, advancing by at least one slot.
pub fn grown_capacity(capacity: usize, required: usize, growth: f32) -> usize {
    let mut capacity = if capacity == 0 { required } else { capacity };
    while required > capacity {
        let next = (capacity as f64 * f64::from(growth)).floor() as usize;
        capacity = next.max(capacity + 1);
    }
    capacity
}

/// Contiguous growable array of plain-data elements.
///
/// Capacity is managed explicitly: it grows by the configured multiplier when
/// an append needs more room and never shrinks unless
/// [`reduce_capacity`](DynArray::reduce_capacity) is called. When created with
/// a path the elements live in a memory-mapped file behind a [`FileHeader`].
pub struct DynArray<T: Pod> {
    storage: Storage<T>,
    size: usize,
    capacity: usize,
    growth: f32,
    compare: Option<Comparator<T>>,
    metadata: [u8; METADATA_SIZE],
}

impl<T: Pod> DynArray<T> {
    /// Creates an empty heap array with default parameters.
    pub fn new() -> Self {
        Self::heap(&ArrayParams::default())
    }

    /// Creates an array from `params`, mapping a file when a path is given.
    pub fn with_params(params: ArrayParams) -> StoreResult<Self> {
        let Some(path) = params.path.as_deref() else {
            return Ok(Self::heap(&params));
        };
        check_mappable::<T>()?;

        let capacity = params.normalized_capacity();
        let growth = params.normalized_growth();
        let metadata = [0u8; METADATA_SIZE];
        let header = FileHeader::new(mem::size_of::<T>(), params.size, capacity, growth, metadata);
        let mapped = MappedFile::create(path, &header)?;

        Ok(Self {
            storage: Storage::Mapped(mapped),
            size: params.size,
            capacity,
            growth,
            compare: None,
            metadata,
        })
    }

    /// Reopens an array previously persisted at `path`.
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        check_mappable::<T>()?;
        let (mapped, header) = MappedFile::open(path.as_ref(), mem::size_of::<T>())?;
        let growth = if header.growth > 1.0 {
            header.growth
        } else {
            DEFAULT_GROWTH
        };

        Ok(Self {
            storage: Storage::Mapped(mapped),
            size: header.size as usize,
            capacity: header.capacity as usize,
            growth,
            compare: None,
            metadata: header.metadata,
        })
    }

    fn heap(params: &ArrayParams) -> Self {
        let capacity = params.normalized_capacity();
        Self {
            storage: Storage::heap(capacity),
            size: params.size,
            capacity,
            growth: params.normalized_growth(),
            compare: None,
            metadata: [0u8; METADATA_SIZE],
        }
    }

    /// Sets the default comparator and returns the array for chaining.
    pub fn with_comparator(mut self, compare: Comparator<T>) -> Self {
        self.compare = Some(compare);
        self
    }

    /// Replaces the default comparator.
    pub fn set_comparator(&mut self, compare: Option<Comparator<T>>) {
        self.compare = compare;
    }

    pub fn comparator(&self) -> Option<Comparator<T>> {
        self.compare
    }

    /// Returns the number of live elements.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Returns the number of allocated element slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn growth(&self) -> f32 {
        self.growth
    }

    /// Returns the size of one element in bytes.
    pub fn element_size(&self) -> usize {
        mem::size_of::<T>()
    }

    /// Returns `true` for file-backed arrays.
    pub fn is_mapped(&self) -> bool {
        self.storage.mapped().is_some()
    }

    /// Returns the backing file path of a mapped array.
    pub fn path(&self) -> Option<&Path> {
        self.storage.mapped().map(MappedFile::path)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.storage.slots(self.capacity)[..self.size]
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        let size = self.size;
        &mut self.storage.slots_mut(self.capacity)[..size]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    /// Borrows the element at `index`.
    pub fn get(&self, index: usize) -> Option<&T> {
        let value = self.as_slice().get(index);
        if value.is_none() {
            tracing::debug!(index, len = self.size, "index out of range");
        }
        value
    }

    /// Mutably borrows the element at `index`.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        let len = self.size;
        let value = self.as_mut_slice().get_mut(index);
        if value.is_none() {
            tracing::debug!(index, len, "index out of range");
        }
        value
    }

    /// Overwrites the element at `index` with `value`.
    pub fn set(&mut self, index: usize, value: T) -> IndexResult<()> {
        let len = self.size;
        match self.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(IndexError { index, len }),
        }
    }

    /// Appends `value` and returns its index.
    pub fn append(&mut self, value: T) -> usize {
        self.append_all(std::slice::from_ref(&value));
        self.size - 1
    }

    /// Appends every element of `values`.
    pub fn append_all(&mut self, values: &[T]) {
        let start = self.size;
        self.reserve_for(start + values.len());
        self.size += values.len();
        self.as_mut_slice()[start..].copy_from_slice(values);
    }

    /// Appends every live element of `other`.
    pub fn append_array(&mut self, other: &DynArray<T>) {
        self.append_all(other.as_slice());
    }

    fn reserve_for(&mut self, required: usize) {
        if required <= self.capacity {
            return;
        }
        let capacity = grown_capacity(self.capacity, required, self.growth);
        tracing::trace!(from = self.capacity, to = capacity, required, "growing array");
        self.reallocate(capacity);
    }

    fn reallocate(&mut self, capacity: usize) {
        self.capacity = capacity;
        let header = self.file_header();
        self.storage.reallocate(&header);
    }

    /// Releases unused capacity so that `capacity == len`.
    pub fn reduce_capacity(&mut self) {
        if self.capacity > self.size {
            tracing::trace!(from = self.capacity, to = self.size, "reducing array capacity");
            self.reallocate(self.size);
        }
    }

    /// Resets the logical size to zero, keeping the allocation.
    pub fn clear(&mut self) {
        self.size = 0;
    }

    /// Shortens the array to `len` elements, keeping the allocation.
    pub fn truncate(&mut self, len: usize) {
        self.size = self.size.min(len);
    }

    /// Removes and returns the last element.
    pub fn pop(&mut self) -> Option<T> {
        let last = *self.as_slice().last()?;
        self.size -= 1;
        Some(last)
    }

    /// Visits elements in index order until `visitor` returns `false`.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&T) -> bool,
    {
        for value in self.iter() {
            if !visitor(value) {
                break;
            }
        }
    }

    /// Sorts with the default comparator. Returns `false` if none is set.
    pub fn sort(&mut self) -> bool {
        match self.compare {
            Some(compare) => {
                self.sort_by(compare);
                true
            }
            None => {
                tracing::debug!("sort skipped: no comparator");
                false
            }
        }
    }

    /// Sorts in place with `compare`.
    pub fn sort_by<F>(&mut self, compare: F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        sort::quick_sort(self.as_mut_slice(), compare);
    }

    /// Sorts with the default comparator, then binary-searches for `value`.
    pub fn search(&mut self, value: &T) -> Option<usize> {
        let compare = self.compare?;
        self.search_by(value, compare)
    }

    /// Sorts with `compare`, then binary-searches for `value`.
    ///
    /// On duplicates any matching index may be returned.
    pub fn search_by<F>(&mut self, value: &T, mut compare: F) -> Option<usize>
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        sort::quick_sort(self.as_mut_slice(), &mut compare);
        sort::binary_search(self.as_slice(), value, compare)
    }

    /// Reverses the element order in place.
    pub fn reverse(&mut self) {
        sort::reverse(self.as_mut_slice());
    }

    /// Returns an independent heap copy of the live elements.
    pub fn copy(&self) -> DynArray<T> {
        let params = ArrayParams::default()
            .with_size(self.size)
            .with_capacity(0)
            .with_growth(self.growth);
        let mut copy = Self::heap(&params);
        copy.as_mut_slice().copy_from_slice(self.as_slice());
        copy.compare = self.compare;
        copy.metadata = self.metadata;
        copy
    }

    /// Borrows `[min, max]` (inclusive) as a view sharing this array's storage.
    ///
    /// Returns `None` unless `min < max < len`. While the view lives the
    /// array is mutably borrowed, so it cannot grow underneath the view.
    pub fn subrange(&mut self, min: usize, max: usize) -> Option<SubRange<'_, T>> {
        if max <= min || max >= self.size {
            tracing::debug!(min, max, len = self.size, "invalid subrange");
            return None;
        }
        let compare = self.compare;
        let slots = &mut self.as_mut_slice()[min..=max];
        Some(SubRange::new(slots, min, compare))
    }

    /// Returns the metadata region reserved for higher layers.
    pub fn metadata(&self) -> &[u8; METADATA_SIZE] {
        &self.metadata
    }

    /// Copies `bytes` into the start of the metadata region, persisting it
    /// immediately for mapped arrays. Bytes beyond the region are ignored.
    pub fn set_metadata(&mut self, bytes: &[u8]) {
        let len = bytes.len().min(METADATA_SIZE);
        self.metadata[..len].copy_from_slice(&bytes[..len]);
        self.write_header();
    }

    /// Reads the header stored in the backing file of a mapped array.
    pub fn header(&self) -> Option<FileHeader> {
        self.storage.mapped().and_then(|mapped| mapped.read_header().ok())
    }

    fn file_header(&self) -> FileHeader {
        FileHeader::new(
            mem::size_of::<T>(),
            self.size,
            self.capacity,
            self.growth,
            self.metadata,
        )
    }

    fn write_header(&mut self) {
        let header = self.file_header();
        if let Some(mapped) = self.storage.mapped_mut() {
            mapped.write_header(&header);
        }
    }

    /// Writes the header and flushes mapped pages to the backing file.
    pub fn sync(&mut self) -> StoreResult<()> {
        self.write_header();
        match self.storage.mapped() {
            Some(mapped) => mapped.flush().map_err(|source| StoreError::Sync {
                path: mapped.path().to_path_buf(),
                source,
            }),
            None => Ok(()),
        }
    }
}

impl<T: Pod> Default for DynArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Pod> Drop for DynArray<T> {
    fn drop(&mut self) {
        self.write_header();
    }
}

impl<T: Pod> Index<usize> for DynArray<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.as_slice()[index]
    }
}

impl<T: Pod> IndexMut<usize> for DynArray<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.as_mut_slice()[index]
    }
}

impl<'a, T: Pod> IntoIterator for &'a DynArray<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: Pod + fmt::Debug> fmt::Debug for DynArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynArray")
            .field("len", &self.size)
            .field("capacity", &self.capacity)
            .field("growth", &self.growth)
            .field("path", &self.path())
            .field("values", &self.as_slice())
            .finish()
    }
}
