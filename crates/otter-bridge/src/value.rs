//! Value handles and their narrowed views
//!
//! A [`Value`] is an opaque reference into engine memory, tagged with the
//! kind the engine reported when the handle was first seen. Narrowing into
//! [`Object`], [`Array`], [`Function`] or [`RegExp`] is a reinterpretation
//! of the same reference, checked against that tag.

use bitflags::bitflags;
use otter_bridge_sys::*;
use std::cell::OnceCell;
use std::fmt;
use std::ops::Deref;
use std::ptr;
use std::sync::Arc;

use crate::engine::EngineInner;
use crate::error::{BridgeError, BridgeResult};

bitflags! {
    /// Property attribute bits, independently combinable.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PropertyAttribute: i32 {
        const READ_ONLY = K_BRIDGE_PROPERTY_ATTRIBUTE_READ_ONLY;
        const DONT_ENUM = K_BRIDGE_PROPERTY_ATTRIBUTE_DONT_ENUM;
        const DONT_DELETE = K_BRIDGE_PROPERTY_ATTRIBUTE_DONT_DELETE;
    }
}

impl PropertyAttribute {
    pub const NONE: Self = Self::empty();
}

bitflags! {
    /// Regular expression flag bits. `GLOBAL | MULTILINE` is `/.../gm`.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct RegExpFlags: i32 {
        const GLOBAL = K_BRIDGE_REGEXP_GLOBAL;
        const IGNORE_CASE = K_BRIDGE_REGEXP_IGNORE_CASE;
        const MULTILINE = K_BRIDGE_REGEXP_MULTILINE;
    }
}

impl RegExpFlags {
    pub const NONE: Self = Self::empty();
}

bitflags! {
    /// Cross-context access control for accessors.
    ///
    /// `PROHIBITS_OVERWRITING` keeps script from replacing the accessor with
    /// `__defineGetter__`/`__defineSetter__` on objects that carry it.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct AccessControl: i32 {
        const ALL_CAN_READ = K_BRIDGE_ACCESS_CONTROL_ALL_CAN_READ;
        const ALL_CAN_WRITE = K_BRIDGE_ACCESS_CONTROL_ALL_CAN_WRITE;
        const PROHIBITS_OVERWRITING = K_BRIDGE_ACCESS_CONTROL_PROHIBITS_OVERWRITING;
    }
}

impl AccessControl {
    pub const DEFAULT: Self = Self::empty();
}

/// The kind of value a handle refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    Object,
    Array,
    Function,
    RegExp,
    /// A kind this bridge has no view for (symbols, engine internals)
    Other,
}

impl ValueKind {
    pub fn from_raw(kind: BridgeValueKind) -> Self {
        match kind {
            K_BRIDGE_KIND_UNDEFINED => Self::Undefined,
            K_BRIDGE_KIND_NULL => Self::Null,
            K_BRIDGE_KIND_BOOLEAN => Self::Boolean,
            K_BRIDGE_KIND_NUMBER => Self::Number,
            K_BRIDGE_KIND_STRING => Self::String,
            K_BRIDGE_KIND_OBJECT => Self::Object,
            K_BRIDGE_KIND_ARRAY => Self::Array,
            K_BRIDGE_KIND_FUNCTION => Self::Function,
            K_BRIDGE_KIND_REGEXP => Self::RegExp,
            _ => Self::Other,
        }
    }

    /// Arrays, functions and regular expressions are objects too.
    pub fn is_object(self) -> bool {
        matches!(
            self,
            Self::Object | Self::Array | Self::Function | Self::RegExp
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::String => "string",
            Self::Object => "object",
            Self::Array => "array",
            Self::Function => "function",
            Self::RegExp => "regexp",
            Self::Other => "unknown",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An opaque handle to an engine value
///
/// The engine owns the underlying memory; the handle keeps the owning engine
/// alive but has no say over the value's own lifetime.
///
/// # Thread Safety
///
/// This type is `!Send` and `!Sync`: engine values belong to the thread that
/// runs the engine.
///
/// ```compile_fail
/// use otter_bridge::Engine;
/// use otter_bridge_memory::MemoryEngine;
///
/// let engine = Engine::new(MemoryEngine::new());
/// let value = engine.number(1.0).unwrap();
/// std::thread::spawn(move || value.to_number());
/// ```
#[derive(Clone)]
pub struct Value {
    raw: BridgeValueRef,
    kind: ValueKind,
    engine: Arc<EngineInner>,
}

impl Value {
    /// Wrap a raw reference, querying its kind once. Null yields `None`.
    pub(crate) fn from_raw(engine: &Arc<EngineInner>, raw: BridgeValueRef) -> Option<Self> {
        if raw.is_null() {
            return None;
        }
        // SAFETY: raw is non-null and was just produced by this engine
        let kind = ValueKind::from_raw(unsafe { engine.backend().value_kind(raw) });
        Some(Self {
            raw,
            kind,
            engine: engine.clone(),
        })
    }

    pub(crate) fn from_raw_or(
        engine: &Arc<EngineInner>,
        raw: BridgeValueRef,
        operation: &str,
    ) -> BridgeResult<Self> {
        Self::from_raw(engine, raw).ok_or_else(|| BridgeError::null_pointer(operation))
    }

    pub(crate) fn engine(&self) -> &Arc<EngineInner> {
        &self.engine
    }

    /// Whether `other` was produced by the same engine as this handle.
    /// Raw refs are only meaningful to the engine that made them.
    pub fn same_engine(&self, other: &Value) -> bool {
        Arc::ptr_eq(&self.engine, &other.engine)
    }

    fn backend(&self) -> &dyn RawEngine {
        self.engine.backend()
    }

    /// Get the raw value reference
    pub fn raw(&self) -> BridgeValueRef {
        self.raw
    }

    /// Get the kind tag recorded when this handle was created
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn is_undefined(&self) -> bool {
        self.kind == ValueKind::Undefined
    }

    pub fn is_null(&self) -> bool {
        self.kind == ValueKind::Null
    }

    pub fn is_object(&self) -> bool {
        self.kind.is_object()
    }

    pub fn is_array(&self) -> bool {
        self.kind == ValueKind::Array
    }

    pub fn is_function(&self) -> bool {
        self.kind == ValueKind::Function
    }

    pub fn is_regexp(&self) -> bool {
        self.kind == ValueKind::RegExp
    }

    /// Convert to boolean using the engine's truthiness rules
    pub fn to_boolean(&self) -> bool {
        // SAFETY: self.raw is valid for self.engine
        unsafe { self.backend().value_to_boolean(self.raw) }
    }

    /// Convert to number using the engine's coercion rules
    pub fn to_number(&self) -> f64 {
        // SAFETY: self.raw is valid for self.engine
        unsafe { self.backend().value_to_number(self.raw) }
    }

    /// Convert to a Rust string using the engine's coercion rules
    pub fn to_rust_string(&self) -> String {
        // SAFETY: self.raw is valid for self.engine
        unsafe { self.backend().value_to_string(self.raw) }
    }

    /// Script `===`. Handles from different engines are never equal.
    pub fn strict_equals(&self, other: &Value) -> bool {
        if !self.same_engine(other) {
            return false;
        }
        // SAFETY: both refs are valid for the same engine
        unsafe { self.backend().value_strict_equals(self.raw, other.raw) }
    }

    /// Narrow to an object view
    pub fn to_object(&self) -> BridgeResult<Object> {
        if !self.kind.is_object() {
            return Err(BridgeError::tag_mismatch("object", self.kind));
        }
        Ok(Object {
            value: self.clone(),
        })
    }

    /// Narrow to an array view
    pub fn to_array(&self) -> BridgeResult<Array> {
        if self.kind != ValueKind::Array {
            return Err(BridgeError::tag_mismatch("array", self.kind));
        }
        Ok(Array {
            object: Object {
                value: self.clone(),
            },
        })
    }

    /// Narrow to a function view
    pub fn to_function(&self) -> BridgeResult<Function> {
        if self.kind != ValueKind::Function {
            return Err(BridgeError::tag_mismatch("function", self.kind));
        }
        Ok(Function {
            object: Object {
                value: self.clone(),
            },
        })
    }

    /// Narrow to a regular expression view
    pub fn to_regexp(&self) -> BridgeResult<RegExp> {
        if self.kind != ValueKind::RegExp {
            return Err(BridgeError::tag_mismatch("regexp", self.kind));
        }
        Ok(RegExp {
            object: Object {
                value: self.clone(),
            },
            pattern: OnceCell::new(),
            flags: OnceCell::new(),
        })
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({}, {:?})", self.kind, self.raw)
    }
}

/// A script object (ECMA-262, 4.3.3)
///
/// Like [`Value`], object views stay on the engine's thread.
///
/// ```compile_fail
/// use otter_bridge::Engine;
/// use otter_bridge_memory::MemoryEngine;
///
/// let engine = Engine::new(MemoryEngine::new());
/// let object = engine.new_object().unwrap().to_object().unwrap();
/// std::thread::spawn(move || object.has_property("x"));
/// ```
#[derive(Clone)]
pub struct Object {
    value: Value,
}

impl Deref for Object {
    type Target = Value;

    fn deref(&self) -> &Value {
        &self.value
    }
}

impl Object {
    /// Get the underlying value handle
    pub fn as_value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    fn wrap(&self, raw: BridgeValueRef, operation: &str) -> BridgeResult<Value> {
        Value::from_raw_or(self.engine(), raw, operation)
    }

    /// Set a named property. Fails (returns false) on read-only properties,
    /// accessors without a setter, and values from another engine.
    pub fn set_property(&self, key: &str, value: &Value, attribs: PropertyAttribute) -> bool {
        if !self.same_engine(value) {
            return false;
        }
        // SAFETY: self and value are valid for this engine; key is a live slice
        unsafe {
            self.backend()
                .object_set_property(self.raw, key.as_bytes(), value.raw, attribs.bits())
        }
    }

    /// Get a named property, walking the prototype chain
    pub fn get_property(&self, key: &str) -> BridgeResult<Value> {
        // SAFETY: self.raw is valid; key is a live slice
        let raw = unsafe { self.backend().object_get_property(self.raw, key.as_bytes()) };
        self.wrap(raw, "object_get_property")
    }

    pub fn set_element(&self, index: u32, value: &Value) -> bool {
        if !self.same_engine(value) {
            return false;
        }
        // SAFETY: self and value are valid for this engine
        unsafe { self.backend().object_set_element(self.raw, index, value.raw) }
    }

    pub fn get_element(&self, index: u32) -> BridgeResult<Value> {
        // SAFETY: self.raw is valid
        let raw = unsafe { self.backend().object_get_element(self.raw, index) };
        self.wrap(raw, "object_get_element")
    }

    /// Attributes of an own property; `NONE` when absent
    pub fn get_property_attributes(&self, key: &str) -> PropertyAttribute {
        // SAFETY: self.raw is valid; key is a live slice
        let bits = unsafe {
            self.backend()
                .object_get_property_attributes(self.raw, key.as_bytes())
        };
        PropertyAttribute::from_bits_truncate(bits)
    }

    /// Sets a local property bypassing interceptors and overriding accessors
    /// or read-only properties.
    ///
    /// Host-internal bookkeeping only; script never reaches this path.
    pub fn force_set_property(&self, key: &str, value: &Value, attribs: PropertyAttribute) -> bool {
        if !self.same_engine(value) {
            return false;
        }
        // SAFETY: self and value are valid for this engine; key is a live slice
        unsafe {
            self.backend().object_force_set_property(
                self.raw,
                key.as_bytes(),
                value.raw,
                attribs.bits(),
            )
        }
    }

    pub fn has_property(&self, key: &str) -> bool {
        // SAFETY: self.raw is valid; key is a live slice
        unsafe { self.backend().object_has_property(self.raw, key.as_bytes()) }
    }

    pub fn delete_property(&self, key: &str) -> bool {
        // SAFETY: self.raw is valid; key is a live slice
        unsafe { self.backend().object_delete_property(self.raw, key.as_bytes()) }
    }

    /// Deletes a property bypassing interceptors and ignoring `DONT_DELETE`.
    pub fn force_delete_property(&self, key: &str) -> bool {
        // SAFETY: self.raw is valid; key is a live slice
        unsafe {
            self.backend()
                .object_force_delete_property(self.raw, key.as_bytes())
        }
    }

    pub fn has_element(&self, index: u32) -> bool {
        // SAFETY: self.raw is valid
        unsafe { self.backend().object_has_element(self.raw, index) }
    }

    pub fn delete_element(&self, index: u32) -> bool {
        // SAFETY: self.raw is valid
        unsafe { self.backend().object_delete_element(self.raw, index) }
    }

    /// Names of the enumerable properties of this object, including those of
    /// prototype objects: what a for-in loop over the object visits.
    pub fn property_names(&self) -> BridgeResult<Array> {
        // SAFETY: self.raw is valid
        let raw = unsafe { self.backend().object_get_property_names(self.raw) };
        self.wrap(raw, "object_get_property_names")?.to_array()
    }

    /// Like [`property_names`](Self::property_names) without prototype
    /// properties.
    pub fn own_property_names(&self) -> BridgeResult<Array> {
        // SAFETY: self.raw is valid
        let raw = unsafe { self.backend().object_get_own_property_names(self.raw) };
        self.wrap(raw, "object_get_own_property_names")?.to_array()
    }

    /// Get the prototype object; `None` at the end of the chain.
    pub fn prototype(&self) -> BridgeResult<Option<Object>> {
        // SAFETY: self.raw is valid
        let raw = unsafe { self.backend().object_get_prototype(self.raw) };
        let proto = self.wrap(raw, "object_get_prototype")?;
        if proto.is_null() {
            return Ok(None);
        }
        proto.to_object().map(Some)
    }

    pub fn set_prototype(&self, prototype: &Object) -> bool {
        if !self.same_engine(prototype) {
            return false;
        }
        // SAFETY: both refs are valid for this engine
        unsafe {
            self.backend()
                .object_set_prototype(self.raw, prototype.raw)
        }
    }

    /// Install an accessor backed by host callback slots. Either slot may be
    /// null.
    pub(crate) fn set_accessor(
        &self,
        key: &str,
        getter: BridgeCallbackRef,
        setter: BridgeCallbackRef,
        access_control: AccessControl,
        attribs: PropertyAttribute,
    ) -> bool {
        // SAFETY: self.raw is valid; slot pointers are pinned for the
        // engine's lifetime by the registry
        unsafe {
            self.backend().object_set_accessor(
                self.raw,
                key.as_bytes(),
                getter,
                setter,
                access_control.bits(),
                attribs.bits(),
            )
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object({:?})", self.raw)
    }
}

/// An instance of the built-in array constructor (ECMA-262, 15.4.2)
#[derive(Clone)]
pub struct Array {
    object: Object,
}

impl Deref for Array {
    type Target = Object;

    fn deref(&self) -> &Object {
        &self.object
    }
}

impl Array {
    pub fn length(&self) -> u32 {
        // SAFETY: tag check guarantees an array ref
        unsafe { self.backend().array_length(self.raw) }
    }

    /// Read every element in index order
    pub fn to_vec(&self) -> BridgeResult<Vec<Value>> {
        (0..self.length()).map(|i| self.get_element(i)).collect()
    }

    pub fn as_object(&self) -> &Object {
        &self.object
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Array({:?})", self.raw)
    }
}

/// A script function object (ECMA-262, 15.3)
#[derive(Clone)]
pub struct Function {
    object: Object,
}

impl Deref for Function {
    type Target = Object;

    fn deref(&self) -> &Object {
        &self.object
    }
}

impl Function {
    /// Call with an undefined receiver
    pub fn call(&self, args: &[&Value]) -> BridgeResult<Value> {
        self.invoke(ptr::null_mut(), args)
    }

    /// Call with `receiver` bound as `this`
    pub fn call_with_receiver(&self, receiver: &Object, args: &[&Value]) -> BridgeResult<Value> {
        if !self.same_engine(receiver) {
            return Err(BridgeError::engine_mismatch("function_call"));
        }
        self.invoke(receiver.raw, args)
    }

    fn invoke(&self, receiver: BridgeValueRef, args: &[&Value]) -> BridgeResult<Value> {
        if !args.iter().all(|v| self.same_engine(v)) {
            return Err(BridgeError::engine_mismatch("function_call"));
        }
        let argv: Vec<BridgeValueRef> = args.iter().map(|v| v.raw).collect();
        // SAFETY: function, receiver and arguments are valid for this engine
        let raw = unsafe { self.backend().function_call(self.raw, receiver, &argv) };
        Value::from_raw_or(self.engine(), raw, "function_call")
    }

    pub fn as_object(&self) -> &Object {
        &self.object
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({:?})", self.raw)
    }
}

/// A regular expression object
///
/// Pattern and flags are read from the engine at most once per view.
#[derive(Clone)]
pub struct RegExp {
    object: Object,
    pattern: OnceCell<String>,
    flags: OnceCell<RegExpFlags>,
}

impl Deref for RegExp {
    type Target = Object;

    fn deref(&self) -> &Object {
        &self.object
    }
}

impl RegExp {
    /// The `source` property: the pattern text.
    pub fn pattern(&self) -> &str {
        self.pattern.get_or_init(|| {
            // SAFETY: tag check guarantees a regexp ref
            unsafe { self.backend().regexp_pattern(self.raw) }
        })
    }

    pub fn flags(&self) -> RegExpFlags {
        *self.flags.get_or_init(|| {
            // SAFETY: tag check guarantees a regexp ref
            let bits = unsafe { self.backend().regexp_flags(self.raw) };
            RegExpFlags::from_bits_truncate(bits)
        })
    }

    pub fn as_object(&self) -> &Object {
        &self.object
    }
}

impl fmt::Debug for RegExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegExp({:?})", self.raw)
    }
}
