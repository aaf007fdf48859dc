//! Raw boundary types between host closures and an embedded script engine
//!
//! This crate provides the low-level, unsafe surface that a native engine
//! exposes to the bridge. Use the safe wrappers in `otter-bridge` for
//! higher-level access.
//!
//! Only plain data crosses this boundary: opaque pointers, integers and
//! byte buffers passed as (pointer, length). Nothing here is type-checked;
//! every `unsafe fn` documents the validity it expects from its caller.

#![allow(non_camel_case_types)]
#![allow(non_upper_case_globals)]

use std::ffi::c_void;
use std::os::raw::{c_char, c_int};

// Type aliases for engine-owned opaque pointers
pub type BridgeValueRef = *mut c_void;
pub type BridgeFrameRef = *mut c_void;
pub type BridgeReturnValueRef = *mut c_void;

/// Pointer to a host-owned callback slot, captured by the engine when a
/// function or accessor is created and handed back on every invocation.
pub type BridgeCallbackRef = *const c_void;

// Property attributes
pub type BridgePropertyAttributes = c_int;
pub const K_BRIDGE_PROPERTY_ATTRIBUTE_NONE: BridgePropertyAttributes = 0;
pub const K_BRIDGE_PROPERTY_ATTRIBUTE_READ_ONLY: BridgePropertyAttributes = 1 << 0;
pub const K_BRIDGE_PROPERTY_ATTRIBUTE_DONT_ENUM: BridgePropertyAttributes = 1 << 1;
pub const K_BRIDGE_PROPERTY_ATTRIBUTE_DONT_DELETE: BridgePropertyAttributes = 1 << 2;

// Accessor access control
pub type BridgeAccessControl = c_int;
pub const K_BRIDGE_ACCESS_CONTROL_DEFAULT: BridgeAccessControl = 0;
pub const K_BRIDGE_ACCESS_CONTROL_ALL_CAN_READ: BridgeAccessControl = 1 << 0;
pub const K_BRIDGE_ACCESS_CONTROL_ALL_CAN_WRITE: BridgeAccessControl = 1 << 1;
pub const K_BRIDGE_ACCESS_CONTROL_PROHIBITS_OVERWRITING: BridgeAccessControl = 1 << 2;

// Regular expression flags
pub type BridgeRegExpFlags = c_int;
pub const K_BRIDGE_REGEXP_NONE: BridgeRegExpFlags = 0;
pub const K_BRIDGE_REGEXP_GLOBAL: BridgeRegExpFlags = 1;
pub const K_BRIDGE_REGEXP_IGNORE_CASE: BridgeRegExpFlags = 2;
pub const K_BRIDGE_REGEXP_MULTILINE: BridgeRegExpFlags = 4;

// Value kinds, reported once per handle when the host first sees it
pub type BridgeValueKind = c_int;
pub const K_BRIDGE_KIND_UNDEFINED: BridgeValueKind = 0;
pub const K_BRIDGE_KIND_NULL: BridgeValueKind = 1;
pub const K_BRIDGE_KIND_BOOLEAN: BridgeValueKind = 2;
pub const K_BRIDGE_KIND_NUMBER: BridgeValueKind = 3;
pub const K_BRIDGE_KIND_STRING: BridgeValueKind = 4;
pub const K_BRIDGE_KIND_OBJECT: BridgeValueKind = 5;
pub const K_BRIDGE_KIND_ARRAY: BridgeValueKind = 6;
pub const K_BRIDGE_KIND_FUNCTION: BridgeValueKind = 7;
pub const K_BRIDGE_KIND_REGEXP: BridgeValueKind = 8;

// Dispatch status returned from the host entry points
pub type BridgeDispatchStatus = c_int;
/// The callback slot was tombstoned, empty, or of the wrong kind.
pub const K_BRIDGE_DISPATCH_NOT_HANDLED: BridgeDispatchStatus = 0;
pub const K_BRIDGE_DISPATCH_HANDLED: BridgeDispatchStatus = 1;
/// The property name buffer could not be decoded.
pub const K_BRIDGE_DISPATCH_BAD_NAME: BridgeDispatchStatus = -1;
/// The host closure panicked; the panic was contained on the host side.
pub const K_BRIDGE_DISPATCH_PANICKED: BridgeDispatchStatus = -2;

// Callback types
pub type BridgeFunctionCallback = Option<
    unsafe extern "C" fn(frame: BridgeFrameRef, callback: BridgeCallbackRef) -> BridgeDispatchStatus,
>;

pub type BridgeGetterCallback = Option<
    unsafe extern "C" fn(
        name: *const c_char,
        length: c_int,
        frame: BridgeFrameRef,
        callback: BridgeCallbackRef,
    ) -> BridgeDispatchStatus,
>;

pub type BridgeSetterCallback = Option<
    unsafe extern "C" fn(
        name: *const c_char,
        length: c_int,
        value: BridgeValueRef,
        frame: BridgeFrameRef,
        callback: BridgeCallbackRef,
    ) -> BridgeDispatchStatus,
>;

/// Host entry points the engine calls when script invokes a bound function
/// or touches a bound accessor property.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct BridgeDispatchTable {
    pub function: BridgeFunctionCallback,
    pub getter: BridgeGetterCallback,
    pub setter: BridgeSetterCallback,
}

/// The native engine capability consumed by the bridge.
///
/// Every reference passed in must have been produced by the same engine
/// instance and still be alive under the engine's own handle rules. Frame
/// references are only valid for the duration of the dispatch that
/// delivered them. Return value references are only valid for the frame
/// they were read from.
///
/// Implementations must not hold internal locks while calling through the
/// dispatch table: host closures re-enter the engine.
#[allow(clippy::missing_safety_doc)]
pub trait RawEngine: Send + Sync {
    /// Install the host entry points. Called once, before any other method.
    fn attach(&self, dispatch: BridgeDispatchTable);

    // Value kinds and primitives
    unsafe fn value_kind(&self, value: BridgeValueRef) -> BridgeValueKind;
    fn make_undefined(&self) -> BridgeValueRef;
    fn make_null(&self) -> BridgeValueRef;
    fn make_boolean(&self, value: bool) -> BridgeValueRef;
    fn make_number(&self, value: f64) -> BridgeValueRef;
    fn make_string(&self, bytes: &[u8]) -> BridgeValueRef;
    unsafe fn value_to_boolean(&self, value: BridgeValueRef) -> bool;
    unsafe fn value_to_number(&self, value: BridgeValueRef) -> f64;
    unsafe fn value_to_string(&self, value: BridgeValueRef) -> String;
    unsafe fn value_strict_equals(&self, a: BridgeValueRef, b: BridgeValueRef) -> bool;

    // Object creation
    fn new_object(&self) -> BridgeValueRef;
    fn new_array(&self, length: u32) -> BridgeValueRef;
    /// Returns null when the pattern is rejected; the engine raises the
    /// script exception on its own channel.
    fn new_regexp(&self, pattern: &[u8], flags: BridgeRegExpFlags) -> BridgeValueRef;
    /// Creates a function whose invocations dispatch to `callback`.
    fn new_function(&self, callback: BridgeCallbackRef) -> BridgeValueRef;

    // Named properties
    unsafe fn object_set_property(
        &self,
        object: BridgeValueRef,
        key: &[u8],
        value: BridgeValueRef,
        attributes: BridgePropertyAttributes,
    ) -> bool;
    unsafe fn object_get_property(&self, object: BridgeValueRef, key: &[u8]) -> BridgeValueRef;
    unsafe fn object_get_property_attributes(
        &self,
        object: BridgeValueRef,
        key: &[u8],
    ) -> BridgePropertyAttributes;
    unsafe fn object_force_set_property(
        &self,
        object: BridgeValueRef,
        key: &[u8],
        value: BridgeValueRef,
        attributes: BridgePropertyAttributes,
    ) -> bool;
    unsafe fn object_has_property(&self, object: BridgeValueRef, key: &[u8]) -> bool;
    unsafe fn object_delete_property(&self, object: BridgeValueRef, key: &[u8]) -> bool;
    unsafe fn object_force_delete_property(&self, object: BridgeValueRef, key: &[u8]) -> bool;

    // Indexed elements
    unsafe fn object_set_element(
        &self,
        object: BridgeValueRef,
        index: u32,
        value: BridgeValueRef,
    ) -> bool;
    unsafe fn object_get_element(&self, object: BridgeValueRef, index: u32) -> BridgeValueRef;
    unsafe fn object_has_element(&self, object: BridgeValueRef, index: u32) -> bool;
    unsafe fn object_delete_element(&self, object: BridgeValueRef, index: u32) -> bool;

    // Enumeration and prototypes
    unsafe fn object_get_property_names(&self, object: BridgeValueRef) -> BridgeValueRef;
    unsafe fn object_get_own_property_names(&self, object: BridgeValueRef) -> BridgeValueRef;
    unsafe fn object_get_prototype(&self, object: BridgeValueRef) -> BridgeValueRef;
    unsafe fn object_set_prototype(&self, object: BridgeValueRef, prototype: BridgeValueRef)
    -> bool;

    /// Installs an accessor property. Either callback may be null.
    unsafe fn object_set_accessor(
        &self,
        object: BridgeValueRef,
        key: &[u8],
        getter: BridgeCallbackRef,
        setter: BridgeCallbackRef,
        access_control: BridgeAccessControl,
        attributes: BridgePropertyAttributes,
    ) -> bool;

    // Arrays, regular expressions, functions
    unsafe fn array_length(&self, array: BridgeValueRef) -> u32;
    unsafe fn regexp_pattern(&self, regexp: BridgeValueRef) -> String;
    unsafe fn regexp_flags(&self, regexp: BridgeValueRef) -> BridgeRegExpFlags;
    /// Returns null when the call raised a script exception.
    unsafe fn function_call(
        &self,
        function: BridgeValueRef,
        receiver: BridgeValueRef,
        arguments: &[BridgeValueRef],
    ) -> BridgeValueRef;

    // Function call frames
    unsafe fn function_info_get(&self, frame: BridgeFrameRef, index: c_int) -> BridgeValueRef;
    unsafe fn function_info_length(&self, frame: BridgeFrameRef) -> c_int;
    unsafe fn function_info_callee(&self, frame: BridgeFrameRef) -> BridgeValueRef;
    unsafe fn function_info_this(&self, frame: BridgeFrameRef) -> BridgeValueRef;
    unsafe fn function_info_holder(&self, frame: BridgeFrameRef) -> BridgeValueRef;
    unsafe fn function_info_return_value(&self, frame: BridgeFrameRef) -> BridgeReturnValueRef;

    // Property getter frames
    unsafe fn getter_info_this(&self, frame: BridgeFrameRef) -> BridgeValueRef;
    unsafe fn getter_info_holder(&self, frame: BridgeFrameRef) -> BridgeValueRef;
    unsafe fn getter_info_return_value(&self, frame: BridgeFrameRef) -> BridgeReturnValueRef;

    // Property setter frames
    unsafe fn setter_info_this(&self, frame: BridgeFrameRef) -> BridgeValueRef;
    unsafe fn setter_info_holder(&self, frame: BridgeFrameRef) -> BridgeValueRef;

    // Return slots
    unsafe fn return_value_set(&self, slot: BridgeReturnValueRef, value: BridgeValueRef);
    unsafe fn return_value_set_boolean(&self, slot: BridgeReturnValueRef, value: bool);
    unsafe fn return_value_set_number(&self, slot: BridgeReturnValueRef, value: f64);
    unsafe fn return_value_set_int32(&self, slot: BridgeReturnValueRef, value: i32);
    unsafe fn return_value_set_uint32(&self, slot: BridgeReturnValueRef, value: u32);
    unsafe fn return_value_set_string(&self, slot: BridgeReturnValueRef, bytes: &[u8]);
    unsafe fn return_value_set_null(&self, slot: BridgeReturnValueRef);
    unsafe fn return_value_set_undefined(&self, slot: BridgeReturnValueRef);
}
