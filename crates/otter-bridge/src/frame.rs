//! Views over native invocation frames
//!
//! A frame view wraps the frame pointer the engine passed into a dispatch.
//! Views borrow the dispatch scope and cannot outlive the callback; the
//! engine reclaims the frame as soon as the host entry point returns.

use otter_bridge_sys::*;
use std::cell::OnceCell;
use std::ptr;
use std::sync::Arc;

use crate::engine::{Engine, EngineInner};
use crate::error::{BridgeError, BridgeResult};
use crate::value::{Function, Object, Value};

/// Write-only result channel of one invocation.
///
/// Only the last write before the callback returns is observed. Writing
/// nothing leaves the result `undefined`.
#[derive(Clone, Copy)]
pub struct ReturnValue<'a> {
    engine: &'a EngineInner,
    raw: BridgeReturnValueRef,
}

impl ReturnValue<'_> {
    /// Fails without writing when `value` came from another engine.
    pub fn set(&self, value: &Value) -> BridgeResult<()> {
        if !ptr::eq(self.engine, Arc::as_ptr(value.engine())) {
            return Err(BridgeError::engine_mismatch("return_value_set"));
        }
        // SAFETY: raw was read from the live frame; value belongs to this engine
        unsafe { self.engine.backend().return_value_set(self.raw, value.raw()) };
        Ok(())
    }

    pub fn set_boolean(&self, value: bool) {
        // SAFETY: raw was read from the live frame
        unsafe { self.engine.backend().return_value_set_boolean(self.raw, value) }
    }

    pub fn set_number(&self, value: f64) {
        // SAFETY: raw was read from the live frame
        unsafe { self.engine.backend().return_value_set_number(self.raw, value) }
    }

    pub fn set_int32(&self, value: i32) {
        // SAFETY: raw was read from the live frame
        unsafe { self.engine.backend().return_value_set_int32(self.raw, value) }
    }

    pub fn set_uint32(&self, value: u32) {
        // SAFETY: raw was read from the live frame
        unsafe { self.engine.backend().return_value_set_uint32(self.raw, value) }
    }

    /// Passed as (pointer, length); no terminator is added.
    pub fn set_string(&self, value: &str) {
        // SAFETY: raw was read from the live frame; value is a live slice
        unsafe {
            self.engine
                .backend()
                .return_value_set_string(self.raw, value.as_bytes())
        }
    }

    pub fn set_null(&self) {
        // SAFETY: raw was read from the live frame
        unsafe { self.engine.backend().return_value_set_null(self.raw) }
    }

    pub fn set_undefined(&self) {
        // SAFETY: raw was read from the live frame
        unsafe { self.engine.backend().return_value_set_undefined(self.raw) }
    }
}

/// Arguments, callee, receiver and holder of a function call
///
/// Frame views cannot leave the dispatching thread:
///
/// ```compile_fail
/// use otter_bridge::FunctionCallbackInfo;
///
/// fn assert_send<T: Send>() {}
/// assert_send::<FunctionCallbackInfo<'static>>();
/// ```
pub struct FunctionCallbackInfo<'a> {
    engine: &'a Arc<EngineInner>,
    frame: BridgeFrameRef,
    return_value: OnceCell<BridgeReturnValueRef>,
}

impl<'a> FunctionCallbackInfo<'a> {
    /// # Safety
    /// `frame` must be a live function-call frame of `engine` for `'a`.
    pub(crate) unsafe fn new(engine: &'a Arc<EngineInner>, frame: BridgeFrameRef) -> Self {
        Self {
            engine,
            frame,
            return_value: OnceCell::new(),
        }
    }

    /// A handle to the engine running this call
    pub fn engine(&self) -> Engine {
        Engine::from_inner(self.engine.clone())
    }

    /// Number of arguments passed
    pub fn length(&self) -> usize {
        // SAFETY: frame is live for 'a
        let len = unsafe { self.engine.backend().function_info_length(self.frame) };
        usize::try_from(len).unwrap_or(0)
    }

    /// The argument at `index`, or `None` past the end
    pub fn get(&self, index: usize) -> Option<Value> {
        if index >= self.length() {
            return None;
        }
        let index = i32::try_from(index).ok()?;
        // SAFETY: frame is live for 'a and index is in bounds
        let raw = unsafe { self.engine.backend().function_info_get(self.frame, index) };
        Value::from_raw(self.engine, raw)
    }

    /// Every argument, in order
    pub fn args(&self) -> Vec<Value> {
        (0..self.length()).filter_map(|i| self.get(i)).collect()
    }

    pub fn callee(&self) -> BridgeResult<Function> {
        // SAFETY: frame is live for 'a
        let raw = unsafe { self.engine.backend().function_info_callee(self.frame) };
        Value::from_raw_or(self.engine, raw, "function_info_callee")?.to_function()
    }

    /// The receiver (`this`); fails when the call had no object receiver
    pub fn this(&self) -> BridgeResult<Object> {
        // SAFETY: frame is live for 'a
        let raw = unsafe { self.engine.backend().function_info_this(self.frame) };
        Value::from_raw_or(self.engine, raw, "function_info_this")?.to_object()
    }

    /// The object on whose prototype chain the function was found
    pub fn holder(&self) -> BridgeResult<Object> {
        // SAFETY: frame is live for 'a
        let raw = unsafe { self.engine.backend().function_info_holder(self.frame) };
        Value::from_raw_or(self.engine, raw, "function_info_holder")?.to_object()
    }

    /// The call's return slot, resolved from the frame on first use
    pub fn return_value(&self) -> ReturnValue<'_> {
        let raw = *self.return_value.get_or_init(|| {
            // SAFETY: frame is live for 'a
            unsafe { self.engine.backend().function_info_return_value(self.frame) }
        });
        ReturnValue {
            engine: self.engine,
            raw,
        }
    }
}

/// Receiver and holder of a property read
pub struct GetterCallbackInfo<'a> {
    engine: &'a Arc<EngineInner>,
    frame: BridgeFrameRef,
    return_value: OnceCell<BridgeReturnValueRef>,
}

impl<'a> GetterCallbackInfo<'a> {
    /// # Safety
    /// `frame` must be a live getter frame of `engine` for `'a`.
    pub(crate) unsafe fn new(engine: &'a Arc<EngineInner>, frame: BridgeFrameRef) -> Self {
        Self {
            engine,
            frame,
            return_value: OnceCell::new(),
        }
    }

    pub fn engine(&self) -> Engine {
        Engine::from_inner(self.engine.clone())
    }

    pub fn this(&self) -> BridgeResult<Object> {
        // SAFETY: frame is live for 'a
        let raw = unsafe { self.engine.backend().getter_info_this(self.frame) };
        Value::from_raw_or(self.engine, raw, "getter_info_this")?.to_object()
    }

    pub fn holder(&self) -> BridgeResult<Object> {
        // SAFETY: frame is live for 'a
        let raw = unsafe { self.engine.backend().getter_info_holder(self.frame) };
        Value::from_raw_or(self.engine, raw, "getter_info_holder")?.to_object()
    }

    /// The read's result slot, resolved from the frame on first use
    pub fn return_value(&self) -> ReturnValue<'_> {
        let raw = *self.return_value.get_or_init(|| {
            // SAFETY: frame is live for 'a
            unsafe { self.engine.backend().getter_info_return_value(self.frame) }
        });
        ReturnValue {
            engine: self.engine,
            raw,
        }
    }
}

/// Receiver and holder of a property write. Setters produce no
/// script-visible result, so there is no return slot.
pub struct SetterCallbackInfo<'a> {
    engine: &'a Arc<EngineInner>,
    frame: BridgeFrameRef,
}

impl<'a> SetterCallbackInfo<'a> {
    /// # Safety
    /// `frame` must be a live setter frame of `engine` for `'a`.
    pub(crate) unsafe fn new(engine: &'a Arc<EngineInner>, frame: BridgeFrameRef) -> Self {
        Self { engine, frame }
    }

    pub fn engine(&self) -> Engine {
        Engine::from_inner(self.engine.clone())
    }

    pub fn this(&self) -> BridgeResult<Object> {
        // SAFETY: frame is live for 'a
        let raw = unsafe { self.engine.backend().setter_info_this(self.frame) };
        Value::from_raw_or(self.engine, raw, "setter_info_this")?.to_object()
    }

    pub fn holder(&self) -> BridgeResult<Object> {
        // SAFETY: frame is live for 'a
        let raw = unsafe { self.engine.backend().setter_info_holder(self.frame) };
        Value::from_raw_or(self.engine, raw, "setter_info_holder")?.to_object()
    }
}
