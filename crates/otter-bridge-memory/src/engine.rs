use otter_bridge_sys::*;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::os::raw::c_int;
use std::ptr;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::frame::{self, CallFrame, PropertyFrame};
use crate::heap::{
    self, FALSE, GetLookup, Heap, HeapValue, NULL, ObjectClass, Property, SetLookup, TRUE,
    UNDEFINED, from_ref, to_ref,
};
use crate::stats::MemoryStats;

/// A single-heap script engine that lives entirely in process memory
///
/// Implements the full [`RawEngine`] surface with plain data structures:
/// prototype chains, attributes, accessors dispatching into the host, array
/// elements and validated regular expressions. There is no parser and no
/// garbage collector; values stay allocated until the engine drops.
///
/// All state sits behind one lock that is released before any call through
/// the dispatch table, so host callbacks may re-enter the engine freely.
pub struct MemoryEngine {
    heap: Mutex<Heap>,
    dispatch: RwLock<BridgeDispatchTable>,
    stats: Arc<MemoryStats>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(Heap::new()),
            dispatch: RwLock::new(BridgeDispatchTable::default()),
            stats: Arc::new(MemoryStats::default()),
        }
    }

    /// Shared handle to this engine's counters; stays readable after the
    /// engine has been moved into a bridge.
    pub fn stats(&self) -> Arc<MemoryStats> {
        self.stats.clone()
    }

    fn heap(&self) -> MutexGuard<'_, Heap> {
        self.heap.lock()
    }

    fn table(&self) -> BridgeDispatchTable {
        *self.dispatch.read()
    }

    fn alloc(&self, value: HeapValue) -> BridgeValueRef {
        to_ref(self.heap().alloc(value))
    }

    fn new_object_of(&self, class: ObjectClass) -> usize {
        MemoryStats::bump(&self.stats.objects_created);
        self.heap().alloc_object(class)
    }

    /// Map a host status to the value a script would observe: the result on
    /// success, `undefined` when unhandled, null (an exception) on failure.
    fn settle(&self, status: BridgeDispatchStatus, result: usize) -> BridgeValueRef {
        MemoryStats::bump(&self.stats.dispatches);
        match status {
            K_BRIDGE_DISPATCH_HANDLED => to_ref(result),
            K_BRIDGE_DISPATCH_NOT_HANDLED => {
                MemoryStats::bump(&self.stats.unhandled_dispatches);
                to_ref(UNDEFINED)
            }
            _ => {
                MemoryStats::bump(&self.stats.failed_dispatches);
                trace!(status, "Host dispatch raised");
                ptr::null_mut()
            }
        }
    }

    fn invoke_getter(&self, key: &[u8], this: usize, holder: usize, getter: usize) -> BridgeValueRef {
        let Some(callback) = self.table().getter else {
            return to_ref(UNDEFINED);
        };
        let Ok(length) = c_int::try_from(key.len()) else {
            return ptr::null_mut();
        };

        let frame = PropertyFrame::new(this, holder);
        // SAFETY: key outlives the call; the frame stays on this stack frame
        let status = unsafe {
            callback(
                key.as_ptr().cast(),
                length,
                frame::frame_ref(&frame),
                heap::addr_to_callback(getter),
            )
        };
        self.settle(status, frame.result.get())
    }

    fn invoke_setter(
        &self,
        key: &[u8],
        value: usize,
        this: usize,
        holder: usize,
        setter: usize,
    ) -> bool {
        let Some(callback) = self.table().setter else {
            return false;
        };
        let Ok(length) = c_int::try_from(key.len()) else {
            return false;
        };

        let frame = PropertyFrame::new(this, holder);
        // SAFETY: key outlives the call; the frame stays on this stack frame
        let status = unsafe {
            callback(
                key.as_ptr().cast(),
                length,
                to_ref(value),
                frame::frame_ref(&frame),
                heap::addr_to_callback(setter),
            )
        };
        self.settle(status, UNDEFINED);
        status == K_BRIDGE_DISPATCH_HANDLED
    }

    fn names_array(&self, object: usize, include_prototypes: bool) -> BridgeValueRef {
        let mut heap = self.heap();
        if heap.object(object).is_none() {
            return ptr::null_mut();
        }
        let names = heap.enumerable_names(object, include_prototypes);
        let length = u32::try_from(names.len()).unwrap_or(u32::MAX);
        let array = heap.alloc_object(ObjectClass::Array { length });
        for (i, name) in (0..length).zip(names) {
            let value = heap.alloc(HeapValue::String(name));
            heap.set_element(array, i, value);
        }
        MemoryStats::bump(&self.stats.objects_created);
        to_ref(array)
    }

    fn write(&self, slot: BridgeReturnValueRef, value: HeapValue) {
        let index = self.heap().alloc(value);
        // SAFETY: the bridge only hands back slots read from a live frame
        unsafe { frame::write_result(slot, index) }
    }
}

fn index(raw: BridgeValueRef) -> usize {
    from_ref(raw).unwrap_or(UNDEFINED)
}

fn key_str(key: &[u8]) -> std::borrow::Cow<'_, str> {
    String::from_utf8_lossy(key)
}

impl RawEngine for MemoryEngine {
    fn attach(&self, dispatch: BridgeDispatchTable) {
        *self.dispatch.write() = dispatch;
    }

    unsafe fn value_kind(&self, value: BridgeValueRef) -> BridgeValueKind {
        self.heap().kind(index(value))
    }

    fn make_undefined(&self) -> BridgeValueRef {
        to_ref(UNDEFINED)
    }

    fn make_null(&self) -> BridgeValueRef {
        to_ref(NULL)
    }

    fn make_boolean(&self, value: bool) -> BridgeValueRef {
        to_ref(if value { TRUE } else { FALSE })
    }

    fn make_number(&self, value: f64) -> BridgeValueRef {
        self.alloc(HeapValue::Number(value))
    }

    fn make_string(&self, bytes: &[u8]) -> BridgeValueRef {
        to_ref(self.heap().alloc_string(bytes))
    }

    unsafe fn value_to_boolean(&self, value: BridgeValueRef) -> bool {
        self.heap().to_boolean(index(value))
    }

    unsafe fn value_to_number(&self, value: BridgeValueRef) -> f64 {
        self.heap().to_number(index(value))
    }

    unsafe fn value_to_string(&self, value: BridgeValueRef) -> String {
        self.heap().to_display(index(value))
    }

    unsafe fn value_strict_equals(&self, a: BridgeValueRef, b: BridgeValueRef) -> bool {
        self.heap().strict_equals(index(a), index(b))
    }

    fn new_object(&self) -> BridgeValueRef {
        to_ref(self.new_object_of(ObjectClass::Plain))
    }

    fn new_array(&self, length: u32) -> BridgeValueRef {
        to_ref(self.new_object_of(ObjectClass::Array { length }))
    }

    fn new_regexp(&self, pattern: &[u8], flags: BridgeRegExpFlags) -> BridgeValueRef {
        let Ok(source) = std::str::from_utf8(pattern) else {
            debug!("Rejected regular expression with non-UTF-8 source");
            return ptr::null_mut();
        };
        let matching_flags = heap::flags_to_string(flags, false);
        let compiled = regress::Regex::with_flags(source, regress::Flags::from(matching_flags.as_str()));
        if let Err(err) = compiled {
            debug!(pattern = source, error = %err, "Rejected regular expression");
            return ptr::null_mut();
        }

        let flags = flags
            & (K_BRIDGE_REGEXP_GLOBAL | K_BRIDGE_REGEXP_IGNORE_CASE | K_BRIDGE_REGEXP_MULTILINE);
        to_ref(self.new_object_of(ObjectClass::RegExp {
            source: source.to_string(),
            flags,
        }))
    }

    fn new_function(&self, callback: BridgeCallbackRef) -> BridgeValueRef {
        MemoryStats::bump(&self.stats.functions_created);
        let callback = heap::callback_to_addr(callback);
        to_ref(self.new_object_of(ObjectClass::Function { callback }))
    }

    unsafe fn object_set_property(
        &self,
        object: BridgeValueRef,
        key: &[u8],
        value: BridgeValueRef,
        attributes: BridgePropertyAttributes,
    ) -> bool {
        let (object, value, name) = (index(object), index(value), key_str(key));
        let mut heap = self.heap();
        let lookup = heap.lookup_set(object, &name);
        match lookup {
            SetLookup::Define => heap.define(object, &name, Property::Data { value, attributes }),
            SetLookup::Rejected => false,
            SetLookup::Setter { setter, holder } => {
                drop(heap);
                self.invoke_setter(key, value, object, holder, setter)
            }
        }
    }

    unsafe fn object_get_property(&self, object: BridgeValueRef, key: &[u8]) -> BridgeValueRef {
        let object = index(object);
        let lookup = self.heap().lookup_get(object, &key_str(key));
        match lookup {
            GetLookup::Value(value) => to_ref(value),
            GetLookup::Getter { getter: 0, .. } => to_ref(UNDEFINED),
            GetLookup::Getter { getter, holder } => self.invoke_getter(key, object, holder, getter),
        }
    }

    unsafe fn object_get_property_attributes(
        &self,
        object: BridgeValueRef,
        key: &[u8],
    ) -> BridgePropertyAttributes {
        self.heap()
            .own_property(index(object), &key_str(key))
            .map_or(K_BRIDGE_PROPERTY_ATTRIBUTE_NONE, |p| p.attributes())
    }

    unsafe fn object_force_set_property(
        &self,
        object: BridgeValueRef,
        key: &[u8],
        value: BridgeValueRef,
        attributes: BridgePropertyAttributes,
    ) -> bool {
        let value = index(value);
        self.heap()
            .define(index(object), &key_str(key), Property::Data { value, attributes })
    }

    unsafe fn object_has_property(&self, object: BridgeValueRef, key: &[u8]) -> bool {
        self.heap().has_property(index(object), &key_str(key))
    }

    unsafe fn object_delete_property(&self, object: BridgeValueRef, key: &[u8]) -> bool {
        self.heap().delete(index(object), &key_str(key), false)
    }

    unsafe fn object_force_delete_property(&self, object: BridgeValueRef, key: &[u8]) -> bool {
        self.heap().delete(index(object), &key_str(key), true)
    }

    unsafe fn object_set_element(
        &self,
        object: BridgeValueRef,
        element: u32,
        value: BridgeValueRef,
    ) -> bool {
        self.heap().set_element(index(object), element, index(value))
    }

    unsafe fn object_get_element(&self, object: BridgeValueRef, element: u32) -> BridgeValueRef {
        to_ref(self.heap().get_element(index(object), element))
    }

    unsafe fn object_has_element(&self, object: BridgeValueRef, element: u32) -> bool {
        self.heap().has_element(index(object), element)
    }

    unsafe fn object_delete_element(&self, object: BridgeValueRef, element: u32) -> bool {
        self.heap().delete_element(index(object), element)
    }

    unsafe fn object_get_property_names(&self, object: BridgeValueRef) -> BridgeValueRef {
        self.names_array(index(object), true)
    }

    unsafe fn object_get_own_property_names(&self, object: BridgeValueRef) -> BridgeValueRef {
        self.names_array(index(object), false)
    }

    unsafe fn object_get_prototype(&self, object: BridgeValueRef) -> BridgeValueRef {
        let heap = self.heap();
        match heap.object(index(object)) {
            Some(data) => to_ref(data.prototype.unwrap_or(NULL)),
            None => ptr::null_mut(),
        }
    }

    unsafe fn object_set_prototype(
        &self,
        object: BridgeValueRef,
        prototype: BridgeValueRef,
    ) -> bool {
        let prototype = match index(prototype) {
            NULL => None,
            proto => Some(proto),
        };
        self.heap().set_prototype(index(object), prototype)
    }

    unsafe fn object_set_accessor(
        &self,
        object: BridgeValueRef,
        key: &[u8],
        getter: BridgeCallbackRef,
        setter: BridgeCallbackRef,
        access_control: BridgeAccessControl,
        attributes: BridgePropertyAttributes,
    ) -> bool {
        let (object, name) = (index(object), key_str(key));
        let mut heap = self.heap();
        let locked = match heap.own_property(object, &name) {
            Some(Property::Accessor { access_control, .. }) => {
                access_control & K_BRIDGE_ACCESS_CONTROL_PROHIBITS_OVERWRITING != 0
            }
            Some(property) => property.attributes() & K_BRIDGE_PROPERTY_ATTRIBUTE_DONT_DELETE != 0,
            None => false,
        };
        if locked {
            debug!(property = %name, "Refusing to replace locked property with an accessor");
            return false;
        }

        let installed = heap.define(
            object,
            &name,
            Property::Accessor {
                getter: heap::callback_to_addr(getter),
                setter: heap::callback_to_addr(setter),
                access_control,
                attributes,
            },
        );
        if installed {
            MemoryStats::bump(&self.stats.accessors_installed);
        }
        installed
    }

    unsafe fn array_length(&self, array: BridgeValueRef) -> u32 {
        match self.heap().object(index(array)).map(|data| &data.class) {
            Some(ObjectClass::Array { length }) => *length,
            _ => 0,
        }
    }

    unsafe fn regexp_pattern(&self, regexp: BridgeValueRef) -> String {
        MemoryStats::bump(&self.stats.regexp_pattern_reads);
        match self.heap().object(index(regexp)).map(|data| &data.class) {
            Some(ObjectClass::RegExp { source, .. }) => source.clone(),
            _ => String::new(),
        }
    }

    unsafe fn regexp_flags(&self, regexp: BridgeValueRef) -> BridgeRegExpFlags {
        MemoryStats::bump(&self.stats.regexp_flags_reads);
        match self.heap().object(index(regexp)).map(|data| &data.class) {
            Some(ObjectClass::RegExp { flags, .. }) => *flags,
            _ => K_BRIDGE_REGEXP_NONE,
        }
    }

    unsafe fn function_call(
        &self,
        function: BridgeValueRef,
        receiver: BridgeValueRef,
        arguments: &[BridgeValueRef],
    ) -> BridgeValueRef {
        let callee = index(function);
        let target = match self.heap().object(callee).map(|data| &data.class) {
            Some(ObjectClass::Function { callback }) => *callback,
            _ => {
                debug!("Call target is not a function");
                return ptr::null_mut();
            }
        };
        let Some(dispatch) = self.table().function else {
            return to_ref(UNDEFINED);
        };

        let frame = CallFrame::new(
            callee,
            index(receiver),
            arguments.iter().copied().map(index).collect(),
        );
        // SAFETY: the frame stays on this stack frame for the call
        let status = unsafe { dispatch(frame::frame_ref(&frame), heap::addr_to_callback(target)) };
        self.settle(status, frame.result.get())
    }

    unsafe fn function_info_get(&self, frame: BridgeFrameRef, position: c_int) -> BridgeValueRef {
        // SAFETY: frame was produced by `function_call` and is still live
        let frame = unsafe { frame::frame_from::<CallFrame>(frame) };
        let argument = usize::try_from(position)
            .ok()
            .and_then(|i| frame.arguments.get(i).copied());
        to_ref(argument.unwrap_or(UNDEFINED))
    }

    unsafe fn function_info_length(&self, frame: BridgeFrameRef) -> c_int {
        // SAFETY: frame was produced by `function_call` and is still live
        let frame = unsafe { frame::frame_from::<CallFrame>(frame) };
        c_int::try_from(frame.arguments.len()).unwrap_or(c_int::MAX)
    }

    unsafe fn function_info_callee(&self, frame: BridgeFrameRef) -> BridgeValueRef {
        // SAFETY: frame was produced by `function_call` and is still live
        to_ref(unsafe { frame::frame_from::<CallFrame>(frame) }.callee)
    }

    unsafe fn function_info_this(&self, frame: BridgeFrameRef) -> BridgeValueRef {
        // SAFETY: frame was produced by `function_call` and is still live
        to_ref(unsafe { frame::frame_from::<CallFrame>(frame) }.this)
    }

    unsafe fn function_info_holder(&self, frame: BridgeFrameRef) -> BridgeValueRef {
        // SAFETY: frame was produced by `function_call` and is still live
        to_ref(unsafe { frame::frame_from::<CallFrame>(frame) }.holder)
    }

    unsafe fn function_info_return_value(&self, frame: BridgeFrameRef) -> BridgeReturnValueRef {
        // SAFETY: frame was produced by `function_call` and is still live
        frame::result_ref(&unsafe { frame::frame_from::<CallFrame>(frame) }.result)
    }

    unsafe fn getter_info_this(&self, frame: BridgeFrameRef) -> BridgeValueRef {
        // SAFETY: frame was produced by a property read and is still live
        to_ref(unsafe { frame::frame_from::<PropertyFrame>(frame) }.this)
    }

    unsafe fn getter_info_holder(&self, frame: BridgeFrameRef) -> BridgeValueRef {
        // SAFETY: frame was produced by a property read and is still live
        to_ref(unsafe { frame::frame_from::<PropertyFrame>(frame) }.holder)
    }

    unsafe fn getter_info_return_value(&self, frame: BridgeFrameRef) -> BridgeReturnValueRef {
        // SAFETY: frame was produced by a property read and is still live
        frame::result_ref(&unsafe { frame::frame_from::<PropertyFrame>(frame) }.result)
    }

    unsafe fn setter_info_this(&self, frame: BridgeFrameRef) -> BridgeValueRef {
        // SAFETY: frame was produced by a property write and is still live
        to_ref(unsafe { frame::frame_from::<PropertyFrame>(frame) }.this)
    }

    unsafe fn setter_info_holder(&self, frame: BridgeFrameRef) -> BridgeValueRef {
        // SAFETY: frame was produced by a property write and is still live
        to_ref(unsafe { frame::frame_from::<PropertyFrame>(frame) }.holder)
    }

    unsafe fn return_value_set(&self, slot: BridgeReturnValueRef, value: BridgeValueRef) {
        // SAFETY: slot was read from a live frame
        unsafe { frame::write_result(slot, index(value)) }
    }

    unsafe fn return_value_set_boolean(&self, slot: BridgeReturnValueRef, value: bool) {
        // SAFETY: slot was read from a live frame
        unsafe { frame::write_result(slot, if value { TRUE } else { FALSE }) }
    }

    unsafe fn return_value_set_number(&self, slot: BridgeReturnValueRef, value: f64) {
        self.write(slot, HeapValue::Number(value));
    }

    unsafe fn return_value_set_int32(&self, slot: BridgeReturnValueRef, value: i32) {
        self.write(slot, HeapValue::Number(f64::from(value)));
    }

    unsafe fn return_value_set_uint32(&self, slot: BridgeReturnValueRef, value: u32) {
        self.write(slot, HeapValue::Number(f64::from(value)));
    }

    unsafe fn return_value_set_string(&self, slot: BridgeReturnValueRef, bytes: &[u8]) {
        self.write(
            slot,
            HeapValue::String(String::from_utf8_lossy(bytes).into_owned()),
        );
    }

    unsafe fn return_value_set_null(&self, slot: BridgeReturnValueRef) {
        // SAFETY: slot was read from a live frame
        unsafe { frame::write_result(slot, NULL) }
    }

    unsafe fn return_value_set_undefined(&self, slot: BridgeReturnValueRef) {
        // SAFETY: slot was read from a live frame
        unsafe { frame::write_result(slot, UNDEFINED) }
    }
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}
