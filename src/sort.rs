//! In-place ordering algorithms shared by arrays and sub-range views.

use std::cmp::Ordering;

/// Sorts `values` with a Lomuto-partition quicksort, pivoting on the last
/// element of each range.
///
/// The pivot choice is deterministic, so already sorted or reversed input
/// degrades to O(n²) comparisons. Recursion always descends into the smaller
/// partition, which keeps the stack depth logarithmic.
pub fn quick_sort<T, F>(values: &mut [T], mut compare: F)
where
    F: FnMut(&T, &T) -> Ordering,
{
    if values.len() > 1 {
        sort_range(values, 0, values.len() - 1, &mut compare);
    }
}

fn sort_range<T, F>(values: &mut [T], mut low: usize, mut high: usize, compare: &mut F)
where
    F: FnMut(&T, &T) -> Ordering,
{
    while low < high {
        let pivot = partition(values, low, high, compare);
        if pivot - low < high - pivot {
            if pivot > low {
                sort_range(values, low, pivot - 1, compare);
            }
            low = pivot + 1;
        } else {
            sort_range(values, pivot + 1, high, compare);
            if pivot == 0 {
                return;
            }
            high = pivot - 1;
        }
    }
}

fn partition<T, F>(values: &mut [T], low: usize, high: usize, compare: &mut F) -> usize
where
    F: FnMut(&T, &T) -> Ordering,
{
    let mut store = low;
    for j in low..high {
        if compare(&values[j], &values[high]) == Ordering::Less {
            values.swap(store, j);
            store += 1;
        }
    }
    values.swap(store, high);
    store
}

/// Binary halving search over sorted `values`.
///
/// With duplicates the returned index is whichever match the halving lands
/// on first, not necessarily the lowest or highest.
pub fn binary_search<T, F>(values: &[T], value: &T, mut compare: F) -> Option<usize>
where
    F: FnMut(&T, &T) -> Ordering,
{
    if values.is_empty() {
        return None;
    }
    let (mut min, mut max) = (0, values.len() - 1);
    loop {
        if min == max {
            return (compare(value, &values[min]) == Ordering::Equal).then_some(min);
        }
        let mid = min + (max - min) / 2;
        match compare(value, &values[mid]) {
            Ordering::Equal => return Some(mid),
            Ordering::Less => max = mid,
            Ordering::Greater => min = mid + 1,
        }
    }
}

/// Reverses `values` by swapping `i` with `len - 1 - i` for the first half.
pub fn reverse<T>(values: &mut [T]) {
    let len = values.len();
    for i in 0..len / 2 {
        values.swap(i, len - 1 - i);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_with_duplicates() {
        let mut values = [8, 7, 6, 1, 0, 9, 2, 6, 0];
        quick_sort(&mut values, |a, b| a.cmp(b));
        assert_eq!(values, [0, 0, 1, 2, 6, 6, 7, 8, 9]);
    }

    #[test]
    fn sorts_descending_input_without_deep_recursion() {
        let mut values: Vec<u32> = (0..3_000).rev().collect();
        quick_sort(&mut values, |a, b| a.cmp(b));
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn sorts_trivial_slices() {
        let mut empty: [u8; 0] = [];
        quick_sort(&mut empty, |a, b| a.cmp(b));
        let mut one = [3];
        quick_sort(&mut one, |a, b| a.cmp(b));
        assert_eq!(one, [3]);
    }

    #[test]
    fn search_finds_every_present_value() {
        let values = [1, 3, 5, 7, 9, 11];
        for (index, value) in values.iter().enumerate() {
            assert_eq!(binary_search(&values, value, |a, b| a.cmp(b)), Some(index));
        }
        assert_eq!(binary_search(&values, &0, |a, b| a.cmp(b)), None);
        assert_eq!(binary_search(&values, &4, |a, b| a.cmp(b)), None);
        assert_eq!(binary_search(&values, &12, |a, b| a.cmp(b)), None);
    }

    #[test]
    fn search_lands_on_some_duplicate() {
        let values = [2, 2, 2, 2, 3];
        let found = binary_search(&values, &2, |a, b| a.cmp(b)).unwrap();
        assert_eq!(values[found], 2);
    }

    #[test]
    fn reverse_odd_and_even() {
        let mut odd = [1, 2, 3];
        reverse(&mut odd);
        assert_eq!(odd, [3, 2, 1]);
        let mut even = [1, 2, 3, 4];
        reverse(&mut even);
        assert_eq!(even, [4, 3, 2, 1]);
    }
}
