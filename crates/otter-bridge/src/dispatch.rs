//! Host entry points called by the native engine
//!
//! When script calls a bound function or touches a bound accessor, the
//! engine calls one of the three functions below with its frame pointer and
//! the callback slot pointer it captured at creation time. Each entry point
//! resolves the slot, refuses tombstoned or mismatched slots, rebuilds the
//! typed frame view and runs the host closure with no bridge lock held.
//!
//! Panics never unwind into the engine: they are caught here and reported
//! as `K_BRIDGE_DISPATCH_PANICKED`.

use otter_bridge_sys::*;
use std::any::Any;
use std::os::raw::{c_char, c_int};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{error, trace, warn};

use crate::engine::EngineInner;
use crate::error::{BridgeError, BridgeResult};
use crate::frame::{FunctionCallbackInfo, GetterCallbackInfo, SetterCallbackInfo};
use crate::registry::{CallbackSlot, HostCallback};
use crate::value::Value;

/// The entry points to install into a [`RawEngine`].
pub fn dispatch_table() -> BridgeDispatchTable {
    BridgeDispatchTable {
        function: Some(bridge_function_callback),
        getter: Some(bridge_getter_callback),
        setter: Some(bridge_setter_callback),
    }
}

/// Reconstruct a property name from a (pointer, length) buffer without
/// copying. The length is authoritative: the buffer need not be
/// terminated and may contain NUL bytes.
///
/// # Safety
/// When `length > 0`, `name` must point to `length` readable bytes that
/// outlive `'a`.
pub unsafe fn decode_name<'a>(name: *const c_char, length: c_int) -> BridgeResult<&'a str> {
    let len = usize::try_from(length)
        .map_err(|_| BridgeError::invalid_name(format!("negative length {}", length)))?;
    if len == 0 {
        return Ok("");
    }
    if name.is_null() {
        return Err(BridgeError::invalid_name(format!(
            "null buffer with length {}",
            len
        )));
    }

    // SAFETY: non-null and `len` readable bytes per caller contract
    let bytes = unsafe { std::slice::from_raw_parts(name.cast::<u8>(), len) };
    std::str::from_utf8(bytes).map_err(|e| BridgeError::invalid_name(e.to_string()))
}

/// Resolve a captured slot pointer to its engine and a clone of its closure.
///
/// # Safety
/// `callback` must be null or a slot pointer handed out by an engine that is
/// still alive.
unsafe fn resolve<'s>(
    callback: BridgeCallbackRef,
    expected: &'static str,
) -> Option<(&'s CallbackSlot, Arc<EngineInner>, HostCallback)> {
    if callback.is_null() {
        return None;
    }

    // SAFETY: slots are pinned in the engine's table until the engine drops
    let slot = unsafe { &*callback.cast::<CallbackSlot>() };
    let engine = slot.engine()?;

    let Some(host) = slot.load() else {
        engine.stats().record_rejected();
        warn!(
            engine = %engine.name(),
            template = slot.template_id(),
            kind = expected,
            "Refusing dispatch through disposed template"
        );
        return None;
    };

    if host.kind() != expected {
        engine.stats().record_rejected();
        warn!(
            engine = %engine.name(),
            template = slot.template_id(),
            expected,
            actual = host.kind(),
            "Refusing dispatch through mismatched callback slot"
        );
        return None;
    }

    if engine.config().trace_dispatch {
        trace!(engine = %engine.name(), template = slot.template_id(), kind = expected, "Dispatch");
    }
    Some((slot, engine, host))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}

/// Run a host closure, containing any panic.
fn contain(
    engine: &EngineInner,
    slot: &CallbackSlot,
    kind: &'static str,
    f: impl FnOnce(),
) -> BridgeDispatchStatus {
    engine.stats().record_invoked();
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => K_BRIDGE_DISPATCH_HANDLED,
        Err(payload) => {
            engine.stats().record_panicked();
            error!(
                engine = %engine.name(),
                template = slot.template_id(),
                kind,
                message = panic_message(payload.as_ref()),
                "Host callback panicked"
            );
            K_BRIDGE_DISPATCH_PANICKED
        }
    }
}

fn decode_or_report<'a>(
    engine: &EngineInner,
    slot: &CallbackSlot,
    name: *const c_char,
    length: c_int,
) -> Result<&'a str, BridgeDispatchStatus> {
    // SAFETY: the engine passes a buffer valid for the dispatch
    unsafe { decode_name(name, length) }.map_err(|err| {
        engine.stats().record_bad_name();
        warn!(
            engine = %engine.name(),
            template = slot.template_id(),
            error = %err,
            "Dropping accessor dispatch"
        );
        K_BRIDGE_DISPATCH_BAD_NAME
    })
}

/// Function-invoke entry point.
///
/// # Safety
/// `frame` must be a live function-call frame; `callback` a slot pointer
/// captured from [`FunctionTemplate::new_function`](crate::FunctionTemplate::new_function).
pub unsafe extern "C" fn bridge_function_callback(
    frame: BridgeFrameRef,
    callback: BridgeCallbackRef,
) -> BridgeDispatchStatus {
    // SAFETY: forwarded caller contract
    let Some((slot, engine, HostCallback::Function(function))) =
        (unsafe { resolve(callback, "function") })
    else {
        return K_BRIDGE_DISPATCH_NOT_HANDLED;
    };

    // SAFETY: frame is live for this dispatch
    let info = unsafe { FunctionCallbackInfo::new(&engine, frame) };
    contain(&engine, slot, "function", || function(&info))
}

/// Property-get entry point.
///
/// # Safety
/// `name` must point to `length` bytes; `frame` must be a live getter frame;
/// `callback` a getter slot pointer captured at accessor installation.
pub unsafe extern "C" fn bridge_getter_callback(
    name: *const c_char,
    length: c_int,
    frame: BridgeFrameRef,
    callback: BridgeCallbackRef,
) -> BridgeDispatchStatus {
    // SAFETY: forwarded caller contract
    let Some((slot, engine, HostCallback::Getter(getter))) =
        (unsafe { resolve(callback, "getter") })
    else {
        return K_BRIDGE_DISPATCH_NOT_HANDLED;
    };

    let name = match decode_or_report(&engine, slot, name, length) {
        Ok(name) => name,
        Err(status) => return status,
    };

    // SAFETY: frame is live for this dispatch
    let info = unsafe { GetterCallbackInfo::new(&engine, frame) };
    contain(&engine, slot, "getter", || getter(name, &info))
}

/// Property-set entry point.
///
/// # Safety
/// As [`bridge_getter_callback`], plus `value` must be a live value of the
/// same engine.
pub unsafe extern "C" fn bridge_setter_callback(
    name: *const c_char,
    length: c_int,
    value: BridgeValueRef,
    frame: BridgeFrameRef,
    callback: BridgeCallbackRef,
) -> BridgeDispatchStatus {
    // SAFETY: forwarded caller contract
    let Some((slot, engine, HostCallback::Setter(setter))) =
        (unsafe { resolve(callback, "setter") })
    else {
        return K_BRIDGE_DISPATCH_NOT_HANDLED;
    };

    let name = match decode_or_report(&engine, slot, name, length) {
        Ok(name) => name,
        Err(status) => return status,
    };

    let Some(value) = Value::from_raw(&engine, value) else {
        engine.stats().record_rejected();
        warn!(engine = %engine.name(), property = name, "Setter dispatched without a value");
        return K_BRIDGE_DISPATCH_NOT_HANDLED;
    };

    // SAFETY: frame is live for this dispatch
    let info = unsafe { SetterCallbackInfo::new(&engine, frame) };
    contain(&engine, slot, "setter", || setter(name, value, &info))
}
