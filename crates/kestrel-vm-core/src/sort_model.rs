//! Sort models for JS arrays
//!
//! Both models implement `Array.prototype.sort` ordering on top of
//! [`quick_sort`]:
//!
//! - missing elements (holes) order after everything;
//! - `undefined` orders after every other present value;
//! - with a comparator, `a < b` iff `ToNumber(compare(a, b)) < 0`;
//! - without one, both values are converted to strings and compared by
//!   UTF-16 code units.
//!
//! Comparators, getters and setters run arbitrary code that may allocate, so
//! every value the models hold across such a call sits in a handle
//! registered once, up front, in the sort's own scope.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::array_storage::{ArrayStorage, SizeType, StorageHandle};
use crate::convert::{to_display_string, to_number};
use crate::error::VmResult;
use crate::gc::GcRef;
use crate::handle::{GcScope, Handle, Marker, MutableHandle};
use crate::object::JsObject;
use crate::runtime::Runtime;
use crate::sort::{SortModel, quick_sort};
use crate::string::compare_utf16;
use crate::value::Value;

/// Native comparison callback. Returns a value whose sign orders the pair.
pub type NativeComparator =
    Rc<dyn Fn(&Runtime, Handle<'_, Value>, Handle<'_, Value>) -> VmResult<Value>>;

/// How a sort compares present, non-undefined elements
#[derive(Clone, Default)]
pub enum Comparator {
    /// Compare the elements' string forms
    #[default]
    Default,
    /// Call a native comparison function
    Native(NativeComparator),
}

impl Comparator {
    /// Wrap a native comparison function
    pub fn native<F>(compare: F) -> Self
    where
        F: Fn(&Runtime, Handle<'_, Value>, Handle<'_, Value>) -> VmResult<Value> + 'static,
    {
        Self::Native(Rc::new(compare))
    }
}

impl fmt::Debug for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparator::Default => write!(f, "Comparator::Default"),
            Comparator::Native(_) => write!(f, "Comparator::Native(..)"),
        }
    }
}

/// Order two present elements
fn less_values(
    rt: &Runtime,
    comparator: &Comparator,
    a: Handle<'_, Value>,
    b: Handle<'_, Value>,
) -> VmResult<bool> {
    if a.get().is_undefined() {
        return Ok(false);
    }
    if b.get().is_undefined() {
        return Ok(true);
    }

    match comparator {
        Comparator::Native(compare) => {
            let result = compare(rt, a, b)?;
            Ok(to_number(rt, result) < 0.0)
        }
        Comparator::Default => {
            let a = to_display_string(rt, a.get());
            let b = to_display_string(rt, b.get());
            Ok(compare_utf16(&a, &b) == Ordering::Less)
        }
    }
}

/// Sorts an object through its indexed property interface.
///
/// Reads see inherited elements and run getters; writes run setters or
/// create own properties; holes are moved with deletes. All handles the
/// model needs are registered in `scope` when it is built, and every
/// operation flushes back to that point.
pub struct StandardSortModel<'s, 'rt> {
    scope: &'s GcScope<'rt>,
    comparator: Comparator,
    obj: Handle<'s, GcRef<JsObject>>,
    a_value: MutableHandle<'s>,
    b_value: MutableHandle<'s>,
    marker: Marker,
}

impl<'s, 'rt> StandardSortModel<'s, 'rt> {
    /// Build a model for `obj`, registering its handles in `scope`
    pub fn new(scope: &'s GcScope<'rt>, obj: GcRef<JsObject>, comparator: Comparator) -> Self {
        let obj = scope.handle(obj);
        let a_value = scope.mutable_handle(Value::undefined());
        let b_value = scope.mutable_handle(Value::undefined());
        let marker = scope.create_marker();
        Self {
            scope,
            comparator,
            obj,
            a_value,
            b_value,
            marker,
        }
    }

    /// Load `obj[index]` into `slot`. Returns false for a hole.
    fn load(
        obj: Handle<'_, GcRef<JsObject>>,
        rt: &Runtime,
        index: u32,
        slot: &mut MutableHandle<'_>,
    ) -> VmResult<bool> {
        match JsObject::get_computed(obj, rt, index)? {
            Some(value) => {
                slot.set(value.into_inner());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Store `value` at `obj[index]`, or delete it when `present` is false
    fn store(
        obj: Handle<'_, GcRef<JsObject>>,
        rt: &Runtime,
        index: u32,
        present: bool,
        value: Handle<'_, Value>,
    ) -> VmResult<()> {
        if present {
            JsObject::put_computed(obj, rt, index, value)
        } else {
            JsObject::delete_computed(obj, rt, index).map(|_| ())
        }
    }
}

impl SortModel for StandardSortModel<'_, '_> {
    fn swap(&mut self, a: u32, b: u32) -> VmResult<()> {
        let scope = self.scope;
        let rt = scope.runtime();
        let _flush = scope.marker_guard_at(self.marker);

        let a_present = Self::load(self.obj, rt, a, &mut self.a_value)?;
        let b_present = Self::load(self.obj, rt, b, &mut self.b_value)?;

        Self::store(self.obj, rt, a, b_present, self.b_value.as_handle())?;
        Self::store(self.obj, rt, b, a_present, self.a_value.as_handle())
    }

    fn less(&mut self, a: u32, b: u32) -> VmResult<bool> {
        let scope = self.scope;
        let rt = scope.runtime();
        let _flush = scope.marker_guard_at(self.marker);

        if !JsObject::has_computed(rt, self.obj.get(), a) {
            return Ok(false);
        }
        if !JsObject::has_computed(rt, self.obj.get(), b) {
            return Ok(true);
        }

        // A getter may delete the other element; it then reads as undefined.
        if !Self::load(self.obj, rt, a, &mut self.a_value)? {
            self.a_value.set(Value::undefined());
        }
        if !Self::load(self.obj, rt, b, &mut self.b_value)? {
            self.b_value.set(Value::undefined());
        }

        less_values(
            rt,
            &self.comparator,
            self.a_value.as_handle(),
            self.b_value.as_handle(),
        )
    }
}

/// Sorts an [`ArrayStorage`] in place; empty slots are holes.
///
/// The size is re-read on every operation: indices at or past it read as
/// holes, and writing a present value there grows the storage.
pub struct StorageSortModel<'s, 'rt> {
    scope: &'s GcScope<'rt>,
    comparator: Comparator,
    storage: StorageHandle<'s>,
    a_value: MutableHandle<'s>,
    b_value: MutableHandle<'s>,
    marker: Marker,
}

impl<'s, 'rt> StorageSortModel<'s, 'rt> {
    /// Build a model for `storage`, registering its handles in `scope`
    pub fn new(
        scope: &'s GcScope<'rt>,
        storage: GcRef<ArrayStorage>,
        comparator: Comparator,
    ) -> Self {
        let storage = scope.mutable_handle(storage);
        let a_value = scope.mutable_handle(Value::empty());
        let b_value = scope.mutable_handle(Value::empty());
        let marker = scope.create_marker();
        Self {
            scope,
            comparator,
            storage,
            a_value,
            b_value,
            marker,
        }
    }

    /// The storage being sorted. Differs from the original cell if a write
    /// had to grow it.
    pub fn storage(&self) -> GcRef<ArrayStorage> {
        self.storage.get()
    }

    /// Element at `index`, or empty for a hole
    fn read(&self, rt: &Runtime, index: u32) -> Value {
        let cell = rt.get(self.storage.get());
        cell.as_slice()
            .get(index as usize)
            .copied()
            .unwrap_or(Value::empty())
    }

    fn write(&mut self, rt: &Runtime, index: u32, value: Handle<'_, Value>) -> VmResult<()> {
        let size = rt.get(self.storage.get()).size();
        if index >= size {
            if value.get().is_empty() {
                return Ok(());
            }
            ArrayStorage::resize(&mut self.storage, rt, index as SizeType + 1)?;
        }
        rt.get_mut(self.storage.get()).set(index, value.get());
        Ok(())
    }
}

impl SortModel for StorageSortModel<'_, '_> {
    fn swap(&mut self, a: u32, b: u32) -> VmResult<()> {
        let scope = self.scope;
        let rt = scope.runtime();
        let _flush = scope.marker_guard_at(self.marker);

        let a_value = self.read(rt, a);
        self.a_value.set(a_value);
        let b_value = self.read(rt, b);
        self.b_value.set(b_value);

        let (a_handle, b_handle) = (self.a_value.as_handle(), self.b_value.as_handle());
        self.write(rt, a, b_handle)?;
        self.write(rt, b, a_handle)
    }

    fn less(&mut self, a: u32, b: u32) -> VmResult<bool> {
        let scope = self.scope;
        let rt = scope.runtime();
        let _flush = scope.marker_guard_at(self.marker);

        let a_value = self.read(rt, a);
        if a_value.is_empty() {
            return Ok(false);
        }
        let b_value = self.read(rt, b);
        if b_value.is_empty() {
            return Ok(true);
        }
        self.a_value.set(a_value);
        self.b_value.set(b_value);

        less_values(
            rt,
            &self.comparator,
            self.a_value.as_handle(),
            self.b_value.as_handle(),
        )
    }
}

/// Sort elements `[0, len)` of `obj` in place
pub fn sort_object(
    rt: &Runtime,
    obj: Handle<'_, GcRef<JsObject>>,
    len: u32,
    comparator: Comparator,
) -> VmResult<()> {
    let scope = GcScope::new(rt);
    let mut model = StandardSortModel::new(&scope, obj.get(), comparator);
    quick_sort(&mut model, 0, len)
}

/// Sort the live elements of `storage` in place.
///
/// `storage` is rebound if the sort had to replace the cell, even when the
/// sort fails.
pub fn sort_storage(
    rt: &Runtime,
    storage: &mut StorageHandle<'_>,
    comparator: Comparator,
) -> VmResult<()> {
    let scope = GcScope::new(rt);
    let len = rt.get(storage.get()).size();
    let mut model = StorageSortModel::new(&scope, storage.get(), comparator);
    let result = quick_sort(&mut model, 0, len);
    storage.set(model.storage());
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_storage(rt: &Runtime, values: &[Option<i32>]) -> GcRef<ArrayStorage> {
        let storage = ArrayStorage::create_with_size(rt, values.len() as u32, values.len() as u32)
            .unwrap();
        let mut cell = rt.get_mut(storage);
        for (i, v) in values.iter().enumerate() {
            cell.set(i as u32, v.map_or(Value::empty(), Value::int32));
        }
        drop(cell);
        storage
    }

    fn ints(rt: &Runtime, storage: GcRef<ArrayStorage>) -> Vec<Option<i32>> {
        rt.get(storage)
            .iter()
            .map(|v| v.as_int32())
            .collect()
    }

    #[test]
    fn test_default_order_is_string_order() {
        let rt = Runtime::new();
        let scope = GcScope::new(&rt);
        let mut storage = scope.mutable_handle(int_storage(
            &rt,
            &[Some(10), Some(9), Some(1), Some(100)],
        ));

        sort_storage(&rt, &mut storage, Comparator::Default).unwrap();

        assert_eq!(
            ints(&rt, storage.get()),
            vec![Some(1), Some(10), Some(100), Some(9)]
        );
    }

    #[test]
    fn test_holes_and_undefined_sort_last() {
        let rt = Runtime::new();
        let scope = GcScope::new(&rt);
        let raw = int_storage(&rt, &[None, Some(3), None, Some(1), Some(2)]);
        rt.get_mut(raw).set(1, Value::undefined());
        let mut storage = scope.mutable_handle(raw);

        let numeric = Comparator::native(|rt, a, b| {
            Ok(Value::number(to_number(rt, a.get()) - to_number(rt, b.get())))
        });
        sort_storage(&rt, &mut storage, numeric).unwrap();

        let cell = rt.get(storage.get());
        assert_eq!(cell.at(0), Value::int32(1));
        assert_eq!(cell.at(1), Value::int32(2));
        assert!(cell.at(2).is_undefined());
        assert!(cell.at(3).is_empty());
        assert!(cell.at(4).is_empty());
    }

    #[test]
    fn test_standard_model_swaps_holes_with_deletes() {
        let rt = Runtime::new();
        let scope = GcScope::new(&rt);
        let obj = scope.handle(JsObject::create(&rt, None).unwrap());
        rt.get_mut(obj.get()).define_data(1, Value::int32(5), true);

        sort_object(&rt, obj, 3, Comparator::Default).unwrap();

        let cell = rt.get(obj.get());
        assert!(cell.own_property(0).is_some());
        assert!(cell.own_property(1).is_none());
        assert!(cell.own_property(2).is_none());
    }

    #[test]
    fn test_storage_model_reads_past_size_as_holes_and_grows_on_write() {
        let rt = Runtime::new();
        let scope = GcScope::new(&rt);
        let original = int_storage(&rt, &[Some(1), Some(2), Some(3), Some(4)]);
        let mut model = StorageSortModel::new(&scope, original, Comparator::Default);

        rt.get_mut(model.storage()).resize_within_capacity(2);

        // Index 3 is past the size: a hole that orders last
        assert!(model.less(0, 3).unwrap());
        assert!(!model.less(3, 0).unwrap());

        // Moving a present value past the size grows the storage in place
        model.swap(0, 3).unwrap();
        assert_eq!(model.storage(), original);
        assert_eq!(ints(&rt, model.storage()), vec![None, Some(2), None, Some(1)]);

        // Moving two holes past the size writes nothing
        rt.get_mut(model.storage()).resize_within_capacity(2);
        model.swap(2, 3).unwrap();
        assert_eq!(rt.get(model.storage()).size(), 2);

        // Past the capacity the storage is replaced
        model.swap(1, 5).unwrap();
        assert_ne!(model.storage(), original);
        let cell = rt.get(model.storage());
        assert!(cell.capacity() >= 6);
        assert_eq!(cell.size(), 6);
        assert_eq!(cell.at(5), Value::int32(2));
        assert!(cell.as_slice()[1..5].iter().all(|v| v.is_empty()));
    }

    #[test]
    fn test_sort_storage_rebinds_to_replacement_cell() {
        let rt = Runtime::new();
        let scope = GcScope::new(&rt);
        let mut storage = scope.mutable_handle(int_storage(&rt, &[Some(3), Some(1), Some(2)]));

        // On its first call the comparator truncates the storage to one
        // element and runs a full collection, which trims the capacity to 1.
        // Writing the second element back then needs a new cell.
        let target = Rc::new(std::cell::Cell::new(Some(storage.get())));
        let truncating = Comparator::native(move |rt, a, b| {
            if let Some(cell) = target.take() {
                rt.get_mut(cell).resize_within_capacity(1);
                rt.collect_garbage();
            }
            Ok(Value::number(to_number(rt, a.get()) - to_number(rt, b.get())))
        });
        sort_storage(&rt, &mut storage, truncating).unwrap();

        assert!(rt.gc_stats().last_trimmed > 0);
        let cell = rt.get(storage.get());
        assert_eq!(cell.capacity(), 2, "caller sees the replacement cell");
        assert_eq!(ints(&rt, storage.get()), vec![None, Some(3)]);
        drop(cell);
        assert_eq!(rt.handle_count(), 1);
    }
}
