//! Plain objects with indexed properties
//!
//! Only the indexed ("computed") half of the property model exists here:
//! sparse integer keys mapping to data or accessor properties, plus a
//! prototype chain that lookups walk.

use std::fmt;
use std::mem::size_of;
use std::rc::Rc;

use kestrel_vm_gc::{Trace, Tracer};
use rustc_hash::FxHashMap;

use crate::error::{VmError, VmResult};
use crate::gc::GcRef;
use crate::handle::{Handle, PseudoHandle};
use crate::runtime::Runtime;
use crate::value::Value;

/// Native getter: receives the object the lookup started on
pub type NativeGetter = Rc<dyn Fn(&Runtime, Handle<'_, Value>) -> VmResult<Value>>;

/// Native setter: receives the object and the value being stored
pub type NativeSetter = Rc<dyn Fn(&Runtime, Handle<'_, Value>, Handle<'_, Value>) -> VmResult<()>>;

/// Fixed heap charge per object; the property table lives off-heap
const OBJECT_SIZE: usize = 16 + size_of::<FxHashMap<u32, Property>>();

/// An indexed property
///
/// Accessor closures are not traced, so they must not capture heap
/// references.
#[derive(Clone)]
pub enum Property {
    /// Plain value
    Data {
        /// Stored value
        value: Value,
        /// Whether assignment may replace the value
        writable: bool,
    },
    /// Getter and/or setter pair
    Accessor {
        /// Called on read; reads yield undefined without one
        getter: Option<NativeGetter>,
        /// Called on write; writes throw without one
        setter: Option<NativeSetter>,
    },
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Property::Data { value, writable } => f
                .debug_struct("Data")
                .field("value", value)
                .field("writable", writable)
                .finish(),
            Property::Accessor { getter, setter } => f
                .debug_struct("Accessor")
                .field("getter", &getter.is_some())
                .field("setter", &setter.is_some())
                .finish(),
        }
    }
}

/// A JavaScript object
pub struct JsObject {
    /// Null or an object
    prototype: Value,
    elements: FxHashMap<u32, Property>,
}

impl JsObject {
    fn new() -> Self {
        Self {
            prototype: Value::null(),
            elements: FxHashMap::default(),
        }
    }

    /// Allocate an empty object inheriting from `prototype`
    pub fn create(
        rt: &Runtime,
        prototype: Option<Handle<'_, GcRef<JsObject>>>,
    ) -> VmResult<GcRef<JsObject>> {
        let obj = rt.alloc(Self::new())?;
        // Read the prototype only after allocating; it may have moved.
        if let Some(prototype) = prototype {
            rt.get_mut(obj).set_prototype(Some(prototype.get()));
        }
        Ok(obj)
    }

    /// The prototype, if any
    pub fn prototype(&self) -> Option<GcRef<JsObject>> {
        self.prototype.as_cell_addr().map(GcRef::from_addr)
    }

    /// Replace the prototype
    pub fn set_prototype(&mut self, prototype: Option<GcRef<JsObject>>) {
        self.prototype = prototype.map_or(Value::null(), Value::from_cell);
    }

    /// Define (or redefine) an own data property
    pub fn define_data(&mut self, index: u32, value: Value, writable: bool) {
        self.elements
            .insert(index, Property::Data { value, writable });
    }

    /// Define (or redefine) an own accessor property
    pub fn define_accessor(
        &mut self,
        index: u32,
        getter: Option<NativeGetter>,
        setter: Option<NativeSetter>,
    ) {
        self.elements
            .insert(index, Property::Accessor { getter, setter });
    }

    /// Own property at `index`
    pub fn own_property(&self, index: u32) -> Option<&Property> {
        self.elements.get(&index)
    }

    /// Number of own indexed properties
    pub fn own_property_count(&self) -> usize {
        self.elements.len()
    }

    /// Find `index` on `obj` or its prototype chain
    fn lookup(rt: &Runtime, obj: GcRef<JsObject>, index: u32) -> Option<Property> {
        let mut current = Some(obj);
        while let Some(holder) = current {
            let cell = rt.get(holder);
            if let Some(property) = cell.elements.get(&index) {
                return Some(property.clone());
            }
            current = cell.prototype();
        }
        None
    }

    /// Whether `index` exists on `obj` or its prototype chain
    pub fn has_computed(rt: &Runtime, obj: GcRef<JsObject>, index: u32) -> bool {
        Self::lookup(rt, obj, index).is_some()
    }

    /// Read `obj[index]`, walking the prototype chain and invoking getters.
    ///
    /// Returns `None` when the property does not exist anywhere on the chain.
    pub fn get_computed<'rt>(
        obj: Handle<'_, GcRef<JsObject>>,
        rt: &'rt Runtime,
        index: u32,
    ) -> VmResult<Option<PseudoHandle<'rt, Value>>> {
        let value = match Self::lookup(rt, obj.get(), index) {
            None => return Ok(None),
            Some(Property::Data { value, .. }) => value,
            Some(Property::Accessor {
                getter: Some(getter),
                ..
            }) => getter(rt, obj.as_value())?,
            Some(Property::Accessor { getter: None, .. }) => Value::undefined(),
        };
        Ok(Some(rt.pseudo_handle(value)))
    }

    /// Assign `obj[index] = value`.
    ///
    /// Inherited setters are invoked; otherwise an own data property is
    /// created or updated. Read-only and getter-only properties throw.
    pub fn put_computed(
        obj: Handle<'_, GcRef<JsObject>>,
        rt: &Runtime,
        index: u32,
        value: Handle<'_, Value>,
    ) -> VmResult<()> {
        match Self::lookup(rt, obj.get(), index) {
            Some(Property::Accessor {
                setter: Some(setter),
                ..
            }) => setter(rt, obj.as_value(), value),
            Some(Property::Accessor { setter: None, .. }) => Err(VmError::type_error(format!(
                "Cannot assign to property '{index}' which has only a getter"
            ))),
            Some(Property::Data {
                writable: false, ..
            }) => Err(VmError::type_error(format!(
                "Cannot assign to read-only property '{index}'"
            ))),
            _ => {
                rt.get_mut(obj.get()).define_data(index, value.get(), true);
                Ok(())
            }
        }
    }

    /// Delete the own property `obj[index]`. Returns whether one existed.
    pub fn delete_computed(
        obj: Handle<'_, GcRef<JsObject>>,
        rt: &Runtime,
        index: u32,
    ) -> VmResult<bool> {
        Ok(rt.get_mut(obj.get()).elements.remove(&index).is_some())
    }

    /// Bytes this cell occupies in the heap
    pub(crate) fn heap_size(&self) -> usize {
        OBJECT_SIZE
    }
}

impl Trace for JsObject {
    fn trace(&mut self, tracer: &mut dyn Tracer) {
        self.prototype.trace(tracer);
        for property in self.elements.values_mut() {
            if let Property::Data { value, .. } = property {
                value.trace(tracer);
            }
        }
    }
}

impl fmt::Debug for JsObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsObject")
            .field("prototype", &self.prototype)
            .field("elements", &self.elements.len())
            .finish()
    }
}
