use std::cmp::Ordering;

use crate::dyn_array::{Comparator, IndexError, IndexResult};
use crate::sort;

/// Non-owning window over `[min, max]` of a [`DynArray`](crate::DynArray).
///
/// Reads and writes go straight to the parent's storage. The view holds the
/// parent's mutable borrow, so the parent cannot append, grow or be dropped
/// while the view exists, and a view has no way to extend itself.
pub struct SubRange<'a, T> {
    slots: &'a mut [T],
    offset: usize,
    compare: Option<Comparator<T>>,
}

impl<'a, T: Copy> SubRange<'a, T> {
    pub(crate) fn new(slots: &'a mut [T], offset: usize, compare: Option<Comparator<T>>) -> Self {
        Self {
            slots,
            offset,
            compare,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Index in the parent array of this view's first element.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn as_slice(&self) -> &[T] {
        &self.slots[..]
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.slots[..]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.slots.iter()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index)
    }

    /// Overwrites the element at view-relative `index`.
    pub fn set(&mut self, index: usize, value: T) -> IndexResult<()> {
        let len = self.slots.len();
        let slot = self.slots.get_mut(index).ok_or(IndexError { index, len })?;
        *slot = value;
        Ok(())
    }

    /// Sorts the viewed region with the parent's default comparator.
    pub fn sort(&mut self) -> bool {
        match self.compare {
            Some(compare) => {
                sort::quick_sort(&mut self.slots[..], compare);
                true
            }
            None => false,
        }
    }

    pub fn sort_by<F>(&mut self, compare: F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        sort::quick_sort(&mut self.slots[..], compare);
    }

    /// Sorts the viewed region, then binary-searches it for `value`.
    pub fn search(&mut self, value: &T) -> Option<usize> {
        let compare = self.compare?;
        self.search_by(value, compare)
    }

    pub fn search_by<F>(&mut self, value: &T, mut compare: F) -> Option<usize>
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        sort::quick_sort(&mut self.slots[..], &mut compare);
        sort::binary_search(&self.slots[..], value, compare)
    }

    pub fn reverse(&mut self) {
        sort::reverse(&mut self.slots[..]);
    }
}
