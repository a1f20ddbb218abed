//! Array Sort Integration Tests
//!
//! Sorting objects and storage through the JS-semantics sort models,
//! including callbacks that allocate, throw, or run accessors.

use std::cell::Cell;
use std::rc::Rc;

use kestrel_vm_core::convert::to_number;
use kestrel_vm_core::gc::GcConfig;
use kestrel_vm_core::object::{NativeGetter, NativeSetter};
use kestrel_vm_core::{
    ArrayStorage, Comparator, GcRef, GcScope, Handle, JsObject, Property, Runtime, Value,
    VmError, sort_object, sort_storage,
};

fn string_of(rt: &Runtime, value: Value) -> String {
    rt.get(value.as_string().unwrap()).as_str().to_owned()
}

/// Compare by descending string length
fn by_length_descending() -> Comparator {
    Comparator::native(|rt, a, b| {
        let a = rt.get(a.get().as_string().unwrap()).len_utf16() as i32;
        let b = rt.get(b.get().as_string().unwrap()).len_utf16() as i32;
        Ok(Value::int32(b - a))
    })
}

fn numeric() -> Comparator {
    Comparator::native(|rt, a, b| {
        Ok(Value::number(to_number(rt, a.get()) - to_number(rt, b.get())))
    })
}

/// Counts comparator calls
fn counting(calls: Rc<Cell<usize>>) -> Comparator {
    Comparator::native(move |_rt, _a, _b| {
        calls.set(calls.get() + 1);
        Ok(Value::int32(0))
    })
}

/// Object with string elements at `[0, words.len())`
fn object_of_strings<'s>(
    scope: &'s GcScope<'_>,
    words: &[&str],
) -> Handle<'s, GcRef<JsObject>> {
    let rt = scope.runtime();
    let obj = scope.handle(JsObject::create(rt, None).unwrap());
    for (i, word) in words.iter().enumerate() {
        let value = scope.handle(rt.new_string(word).unwrap());
        JsObject::put_computed(obj, rt, i as u32, value).unwrap();
    }
    obj
}

fn object_strings(rt: &Runtime, obj: Handle<'_, GcRef<JsObject>>, len: u32) -> Vec<String> {
    (0..len)
        .map(|i| {
            let value = JsObject::get_computed(obj, rt, i).unwrap().unwrap().get();
            string_of(rt, value)
        })
        .collect()
}

// ============================================================================
// Object sort
// ============================================================================

#[test]
fn test_sort_object_by_length() {
    let rt = Runtime::new();
    let scope = GcScope::new(&rt);
    let obj = object_of_strings(&scope, &["bb", "a", "ccc"]);

    sort_object(&rt, obj, 3, by_length_descending()).unwrap();

    assert_eq!(object_strings(&rt, obj, 3), vec!["ccc", "bb", "a"]);
}

#[test]
fn test_sort_object_default_order() {
    let rt = Runtime::new();
    let scope = GcScope::new(&rt);
    let obj = object_of_strings(&scope, &["pear", "apple", "fig", "Banana"]);

    sort_object(&rt, obj, 4, Comparator::Default).unwrap();

    assert_eq!(
        object_strings(&rt, obj, 4),
        vec!["Banana", "apple", "fig", "pear"]
    );
}

#[test]
fn test_short_sorts_never_compare() {
    let rt = Runtime::new();
    let scope = GcScope::new(&rt);
    let calls = Rc::new(Cell::new(0));

    let obj = object_of_strings(&scope, &["only"]);
    sort_object(&rt, obj, 1, counting(calls.clone())).unwrap();
    sort_object(&rt, obj, 0, counting(calls.clone())).unwrap();

    let mut storage = scope.mutable_handle(ArrayStorage::create(&rt, 4).unwrap());
    sort_storage(&rt, &mut storage, counting(calls.clone())).unwrap();

    assert_eq!(calls.get(), 0);
}

#[test]
fn test_comparator_error_aborts_and_propagates() {
    let rt = Runtime::new();
    let scope = GcScope::new(&rt);
    let words: Vec<String> = (0..30).map(|i| format!("w{i}")).collect();
    let refs: Vec<&str> = words.iter().map(String::as_str).collect();
    let obj = object_of_strings(&scope, &refs);

    let calls = Rc::new(Cell::new(0));
    let seen = calls.clone();
    let failing = Comparator::native(move |rt, _a, _b| {
        seen.set(seen.get() + 1);
        if seen.get() == 5 {
            let thrown = rt.new_string("comparator exploded")?;
            return Err(rt.throw_value(thrown));
        }
        Ok(Value::int32(-1))
    });

    let err = sort_object(&rt, obj, 30, failing).unwrap_err();
    assert!(matches!(err, VmError::Exception));
    assert_eq!(calls.get(), 5, "no comparisons after the failure");

    rt.collect_garbage();
    let thrown = rt.take_thrown_value().unwrap();
    assert_eq!(string_of(&rt, thrown), "comparator exploded");
}

#[test]
fn test_comparator_result_is_converted_to_number() {
    let rt = Runtime::new();
    let scope = GcScope::new(&rt);
    let obj = scope.handle(JsObject::create(&rt, None).unwrap());
    for (i, n) in [3, 1, 2].into_iter().enumerate() {
        let v = scope.handle(Value::int32(n));
        JsObject::put_computed(obj, &rt, i as u32, v).unwrap();
    }

    // Returns "-1" / "1" as strings
    let stringly = Comparator::native(|rt, a, b| {
        let less = to_number(rt, a.get()) < to_number(rt, b.get());
        rt.new_string(if less { "-1" } else { "1" })
    });
    sort_object(&rt, obj, 3, stringly).unwrap();

    let values: Vec<_> = (0..3)
        .map(|i| JsObject::get_computed(obj, &rt, i).unwrap().unwrap().get())
        .collect();
    assert_eq!(values, vec![Value::int32(1), Value::int32(2), Value::int32(3)]);
}

#[test]
fn test_malformed_numeric_string_result_is_not_less() {
    let rt = Runtime::new();
    let scope = GcScope::new(&rt);
    let obj = scope.handle(JsObject::create(&rt, None).unwrap());
    for (i, n) in [3, 1, 2].into_iter().enumerate() {
        let v = scope.handle(Value::int32(n));
        JsObject::put_computed(obj, &rt, i as u32, v).unwrap();
    }

    // "+-1" converts to NaN, which never orders a before b
    let malformed = Comparator::native(|rt, _a, _b| rt.new_string("+-1"));
    sort_object(&rt, obj, 3, malformed).unwrap();

    let values: Vec<_> = (0..3)
        .map(|i| JsObject::get_computed(obj, &rt, i).unwrap().unwrap().get())
        .collect();
    assert_eq!(values, vec![Value::int32(3), Value::int32(1), Value::int32(2)]);
}

#[test]
fn test_holes_and_undefined_sort_last_in_objects() {
    let rt = Runtime::new();
    let scope = GcScope::new(&rt);
    let obj = scope.handle(JsObject::create(&rt, None).unwrap());
    {
        let mut cell = rt.get_mut(obj.get());
        cell.define_data(0, Value::undefined(), true);
        cell.define_data(2, Value::int32(5), true);
        cell.define_data(4, Value::int32(-1), true);
    }

    sort_object(&rt, obj, 6, numeric()).unwrap();

    let cell = rt.get(obj.get());
    let value_at = |i| match cell.own_property(i) {
        Some(Property::Data { value, .. }) => Some(*value),
        _ => None,
    };
    assert_eq!(value_at(0), Some(Value::int32(-1)));
    assert_eq!(value_at(1), Some(Value::int32(5)));
    assert_eq!(value_at(2), Some(Value::undefined()));
    assert_eq!(value_at(3), None);
    assert_eq!(value_at(4), None);
    assert_eq!(value_at(5), None);
}

#[test]
fn test_sort_reads_prototype_and_runs_accessors() {
    let rt = Runtime::new();
    let scope = GcScope::new(&rt);
    let proto = scope.handle(JsObject::create(&rt, None).unwrap());
    rt.get_mut(proto.get()).define_data(1, Value::int32(1), true);

    let obj = scope.handle(JsObject::create(&rt, Some(proto)).unwrap());
    // Element 0 is an accessor backed by a native cell
    let backing = Rc::new(Cell::new(9));
    let setter_calls = Rc::new(Cell::new(0));
    let source = backing.clone();
    let getter: NativeGetter =
        Rc::new(move |_rt: &Runtime, _this: Handle<'_, Value>| Ok(Value::int32(source.get())));
    let sink = backing.clone();
    let calls = setter_calls.clone();
    let setter: NativeSetter = Rc::new(
        move |_rt: &Runtime, _this: Handle<'_, Value>, value: Handle<'_, Value>| {
            sink.set(value.get().as_int32().unwrap_or(-1));
            calls.set(calls.get() + 1);
            Ok(())
        },
    );
    {
        let mut cell = rt.get_mut(obj.get());
        cell.define_accessor(0, Some(getter), Some(setter));
        cell.define_data(2, Value::int32(5), true);
    }

    sort_object(&rt, obj, 3, numeric()).unwrap();

    // [9 (accessor), 1 (inherited), 5] sorts to [1, 5, 9]
    assert_eq!(backing.get(), 1);
    assert!(setter_calls.get() >= 1);
    let cell = rt.get(obj.get());
    assert!(matches!(
        cell.own_property(1),
        Some(Property::Data { value, .. }) if *value == Value::int32(5)
    ));
    assert!(matches!(
        cell.own_property(2),
        Some(Property::Data { value, .. }) if *value == Value::int32(9)
    ));
    // The prototype is never written
    assert!(matches!(
        rt.get(proto.get()).own_property(1),
        Some(Property::Data { value, .. }) if *value == Value::int32(1)
    ));
}

/// The object a getter or setter was invoked on
fn receiver<'s>(scope: &'s GcScope<'_>, this: Handle<'_, Value>) -> Handle<'s, GcRef<JsObject>> {
    let rt = scope.runtime();
    scope.handle(rt.downcast::<JsObject>(this.get()).unwrap())
}

#[test]
fn test_getter_deleting_the_other_element_reads_undefined() {
    let rt = Runtime::new();
    let scope = GcScope::new(&rt);
    let obj = scope.handle(JsObject::create(&rt, None).unwrap());

    // Reading element 1 deletes element 0
    let getter_calls = Rc::new(Cell::new(0));
    let calls = getter_calls.clone();
    let getter: NativeGetter = Rc::new(move |rt: &Runtime, this: Handle<'_, Value>| {
        calls.set(calls.get() + 1);
        let scope = GcScope::new(rt);
        let obj = receiver(&scope, this);
        JsObject::delete_computed(obj, rt, 0)?;
        Ok(Value::int32(1))
    });
    {
        let mut cell = rt.get_mut(obj.get());
        cell.define_data(0, Value::int32(3), true);
        cell.define_accessor(1, Some(getter), None);
    }

    let compares = Rc::new(Cell::new(0));
    let handles_before = rt.handle_count();
    sort_object(&rt, obj, 2, counting(compares.clone())).unwrap();

    // less(1, 0) loads 1 first, so 0 is gone and reads as undefined: the
    // accessor's value orders first without consulting the comparator.
    assert_eq!(compares.get(), 0);
    assert!(getter_calls.get() >= 2);
    assert_eq!(rt.handle_count(), handles_before);
    let cell = rt.get(obj.get());
    assert!(matches!(
        cell.own_property(0),
        Some(Property::Data { value, .. }) if *value == Value::int32(1)
    ));
    assert!(cell.own_property(1).is_none());
    assert_eq!(cell.own_property_count(), 1);
}

#[test]
fn test_getter_reshaping_the_object_fails_cleanly() {
    let rt = Runtime::with_config(GcConfig::stress());
    let scope = GcScope::new(&rt);
    let obj = scope.handle(JsObject::create(&rt, None).unwrap());

    // Getter-only element 0 deletes element 3 and appends a new element past
    // the sorted range on every read
    let reads = Rc::new(Cell::new(0u32));
    let counter = reads.clone();
    let getter: NativeGetter = Rc::new(move |rt: &Runtime, this: Handle<'_, Value>| {
        let scope = GcScope::new(rt);
        let obj = receiver(&scope, this);
        JsObject::delete_computed(obj, rt, 3)?;
        let extra = scope.handle(rt.new_string("extra")?);
        JsObject::put_computed(obj, rt, 20 + counter.get(), extra)?;
        counter.set(counter.get() + 1);
        Ok(Value::int32(100))
    });
    {
        let mut cell = rt.get_mut(obj.get());
        cell.define_accessor(0, Some(getter), None);
        for i in 1..20 {
            cell.define_data(i, Value::int32(20 - i as i32), true);
        }
    }

    let handles_before = rt.handle_count();
    let err = sort_object(&rt, obj, 20, numeric()).unwrap_err();

    // Partitioning always moves the first element, which has no setter
    assert!(matches!(err, VmError::TypeError(_)));
    assert_eq!(rt.handle_count(), handles_before);
    assert!(reads.get() >= 1);
    let cell = rt.get(obj.get());
    assert!(cell.own_property(3).is_none());
    for k in 0..reads.get() {
        assert!(cell.own_property(20 + k).is_some(), "element {} was appended", 20 + k);
    }
}

#[test]
fn test_setter_growing_the_object_keeps_the_range_sorted() {
    let rt = Runtime::new();
    let scope = GcScope::new(&rt);
    let obj = scope.handle(JsObject::create(&rt, None).unwrap());

    // Element 0 is backed by a native cell; every write also appends an
    // element past the sorted range
    let backing = Rc::new(Cell::new(50));
    let appended = Rc::new(Cell::new(0u32));
    let source = backing.clone();
    let getter: NativeGetter =
        Rc::new(move |_rt: &Runtime, _this: Handle<'_, Value>| Ok(Value::int32(source.get())));
    let sink = backing.clone();
    let count = appended.clone();
    let setter: NativeSetter = Rc::new(
        move |rt: &Runtime, this: Handle<'_, Value>, value: Handle<'_, Value>| {
            sink.set(value.get().as_int32().unwrap_or(-1));
            let scope = GcScope::new(rt);
            let obj = receiver(&scope, this);
            JsObject::put_computed(obj, rt, 100 + count.get(), value)?;
            count.set(count.get() + 1);
            Ok(())
        },
    );
    let len = 12;
    {
        let mut cell = rt.get_mut(obj.get());
        cell.define_accessor(0, Some(getter), Some(setter));
        for i in 1..len {
            cell.define_data(i, Value::int32((i as i32 * 7) % 13), true);
        }
    }

    let handles_before = rt.handle_count();
    sort_object(&rt, obj, len, numeric()).unwrap();

    assert_eq!(rt.handle_count(), handles_before);
    assert!(appended.get() >= 1);
    let values: Vec<i32> = (0..len)
        .map(|i| {
            let v = JsObject::get_computed(obj, &rt, i).unwrap().unwrap().get();
            v.as_int32().unwrap()
        })
        .collect();
    let mut expected: Vec<i32> = (1..len as i32).map(|i| (i * 7) % 13).collect();
    expected.push(50);
    expected.sort_unstable();
    assert_eq!(values, expected);
    assert_eq!(
        rt.get(obj.get()).own_property_count(),
        len as usize + appended.get() as usize
    );
}

#[test]
fn test_read_only_element_fails_the_sort() {
    let rt = Runtime::new();
    let scope = GcScope::new(&rt);
    let obj = scope.handle(JsObject::create(&rt, None).unwrap());
    {
        let mut cell = rt.get_mut(obj.get());
        cell.define_data(0, Value::int32(2), false);
        cell.define_data(1, Value::int32(1), true);
    }

    let err = sort_object(&rt, obj, 2, numeric()).unwrap_err();
    assert!(matches!(err, VmError::TypeError(_)));
}

// ============================================================================
// Storage sort
// ============================================================================

#[test]
fn test_sort_storage_by_length() {
    let rt = Runtime::new();
    let scope = GcScope::new(&rt);
    let mut storage = scope.mutable_handle(ArrayStorage::create(&rt, 3).unwrap());
    for word in ["bb", "a", "ccc"] {
        let value = scope.handle(rt.new_string(word).unwrap());
        ArrayStorage::push_back(&mut storage, &rt, value).unwrap();
    }

    sort_storage(&rt, &mut storage, by_length_descending()).unwrap();

    let words: Vec<String> = rt
        .get(storage.get())
        .iter()
        .map(|v| string_of(&rt, v))
        .collect();
    assert_eq!(words, vec!["ccc", "bb", "a"]);
}

#[test]
fn test_sort_storage_matches_std_sort() {
    let rt = Runtime::new();
    let scope = GcScope::new(&rt);
    let mut storage = scope.mutable_handle(ArrayStorage::create(&rt, 0).unwrap());

    let mut expected = Vec::new();
    let mut state = 12345u32;
    for _ in 0..500 {
        state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
        let n = (state >> 16) as i32 % 1000 - 500;
        expected.push(n);
        let value = scope.handle(Value::int32(n));
        ArrayStorage::push_back(&mut storage, &rt, value).unwrap();
    }
    expected.sort_unstable();

    sort_storage(&rt, &mut storage, numeric()).unwrap();

    let sorted: Vec<i32> = rt
        .get(storage.get())
        .iter()
        .map(|v| v.as_int32().unwrap())
        .collect();
    assert_eq!(sorted, expected);
}

#[test]
fn test_sort_under_stress_collection() {
    let rt = Runtime::with_config(GcConfig::stress());
    let scope = GcScope::new(&rt);
    let obj = object_of_strings(&scope, &["delta", "alpha", "echo", "charlie", "bravo"]);

    // Allocates on every comparison, moving every live cell each time
    let allocating = Comparator::native(|rt, a, b| {
        let scope = GcScope::new(rt);
        let a_str = scope.handle(rt.new_string(&string_of(rt, a.get()))?);
        let b_str = scope.handle(rt.new_string(&string_of(rt, b.get()))?);
        let ordering = string_of(rt, a_str.get()).cmp(&string_of(rt, b_str.get()));
        Ok(Value::int32(ordering as i32))
    });
    sort_object(&rt, obj, 5, allocating).unwrap();

    assert_eq!(
        object_strings(&rt, obj, 5),
        vec!["alpha", "bravo", "charlie", "delta", "echo"]
    );
    assert!(rt.gc_stats().collections > 5);
}
