//! Generic model sort
//!
//! [`quick_sort`] orders any indexed collection it can only reach through a
//! [`SortModel`]: it never sees the elements, only the answers of `less` and
//! the effects of `swap`. Both may run arbitrary code and fail, so:
//!
//! - an error from either aborts the sort immediately and is returned;
//! - nothing assumes `less` is a consistent order. An inconsistent
//!   comparator yields an unspecified permutation, but every index passed to
//!   the model stays inside `[begin, end)`.
//!
//! The algorithm is an introsort: median-of-three quicksort recursing on the
//! smaller partition, insertion sort for short ranges, and heap sort once the
//! recursion gets deeper than `2 * log2(n)`.

use crate::error::VmResult;

/// Collection interface the sort works through
pub trait SortModel {
    /// Exchange the elements at `a` and `b`
    fn swap(&mut self, a: u32, b: u32) -> VmResult<()>;

    /// Whether the element at `a` orders before the element at `b`
    fn less(&mut self, a: u32, b: u32) -> VmResult<bool>;
}

/// Ranges this short are finished with insertion sort
const INSERTION_SORT_THRESHOLD: u32 = 6;

/// Sort the elements `[begin, end)` of `model`
pub fn quick_sort(model: &mut dyn SortModel, begin: u32, end: u32) -> VmResult<()> {
    debug_assert!(begin <= end, "invalid sort range");
    let len = end.saturating_sub(begin);
    if len <= 1 {
        return Ok(());
    }
    let depth_limit = 2 * (u32::BITS - len.leading_zeros());
    sort_range(model, begin, end, depth_limit)
}

fn sort_range(
    model: &mut dyn SortModel,
    mut begin: u32,
    mut end: u32,
    mut depth: u32,
) -> VmResult<()> {
    while end - begin > INSERTION_SORT_THRESHOLD {
        if depth == 0 {
            return heap_sort(model, begin, end);
        }
        depth -= 1;

        let pivot = partition(model, begin, end)?;
        // Recurse into the smaller side, loop on the larger one
        if pivot - begin < end - pivot - 1 {
            sort_range(model, begin, pivot, depth)?;
            begin = pivot + 1;
        } else {
            sort_range(model, pivot + 1, end, depth)?;
            end = pivot;
        }
    }
    insertion_sort(model, begin, end)
}

/// Partition `[begin, end)` around the median of its first, middle and last
/// elements. Returns the pivot's final index.
fn partition(model: &mut dyn SortModel, begin: u32, end: u32) -> VmResult<u32> {
    let mid = begin + (end - begin) / 2;
    let last = end - 1;

    if model.less(mid, begin)? {
        model.swap(mid, begin)?;
    }
    if model.less(last, mid)? {
        model.swap(last, mid)?;
        if model.less(mid, begin)? {
            model.swap(mid, begin)?;
        }
    }
    model.swap(begin, mid)?;

    let mut i = begin + 1;
    let mut j = last;
    loop {
        while i <= j && model.less(i, begin)? {
            i += 1;
        }
        while i <= j && model.less(begin, j)? {
            j -= 1;
        }
        if i >= j {
            break;
        }
        model.swap(i, j)?;
        i += 1;
        j -= 1;
    }

    if j != begin {
        model.swap(begin, j)?;
    }
    Ok(j)
}

fn insertion_sort(model: &mut dyn SortModel, begin: u32, end: u32) -> VmResult<()> {
    for i in begin.saturating_add(1)..end {
        let mut j = i;
        while j > begin && model.less(j, j - 1)? {
            model.swap(j, j - 1)?;
            j -= 1;
        }
    }
    Ok(())
}

fn heap_sort(model: &mut dyn SortModel, begin: u32, end: u32) -> VmResult<()> {
    let len = end - begin;
    for root in (0..len / 2).rev() {
        sift_down(model, begin, root, len)?;
    }
    for last in (1..len).rev() {
        model.swap(begin, begin + last)?;
        sift_down(model, begin, 0, last)?;
    }
    Ok(())
}

/// Restore the max-heap property below `root` in the heap of `len` elements
/// starting at `base`
fn sift_down(model: &mut dyn SortModel, base: u32, mut root: u32, len: u32) -> VmResult<()> {
    loop {
        let left = 2 * u64::from(root) + 1;
        if left >= u64::from(len) {
            return Ok(());
        }
        let mut child = left as u32;
        if child + 1 < len && model.less(base + child, base + child + 1)? {
            child += 1;
        }
        if !model.less(base + root, base + child)? {
            return Ok(());
        }
        model.swap(base + root, base + child)?;
        root = child;
    }
}
