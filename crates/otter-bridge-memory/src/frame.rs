//! Invocation frames handed to the host during a dispatch
//!
//! Frames live on the engine's stack for exactly one dispatch. The frame
//! pointer given to the host is the address of one of these structs, and the
//! return slot pointer is the address of its `result` cell.

use otter_bridge_sys::{BridgeFrameRef, BridgeReturnValueRef};
use std::cell::Cell;
use std::ffi::c_void;

use crate::heap::UNDEFINED;

/// A function call in progress
pub(crate) struct CallFrame {
    pub(crate) arguments: Vec<usize>,
    pub(crate) callee: usize,
    pub(crate) this: usize,
    pub(crate) holder: usize,
    pub(crate) result: Cell<usize>,
}

impl CallFrame {
    pub(crate) fn new(callee: usize, this: usize, arguments: Vec<usize>) -> Self {
        Self {
            arguments,
            callee,
            this,
            holder: this,
            result: Cell::new(UNDEFINED),
        }
    }
}

/// A property read or write in progress
pub(crate) struct PropertyFrame {
    pub(crate) this: usize,
    pub(crate) holder: usize,
    pub(crate) result: Cell<usize>,
}

impl PropertyFrame {
    pub(crate) fn new(this: usize, holder: usize) -> Self {
        Self {
            this,
            holder,
            result: Cell::new(UNDEFINED),
        }
    }
}

pub(crate) fn frame_ref<T>(frame: &T) -> BridgeFrameRef {
    (frame as *const T).cast_mut().cast::<c_void>()
}

pub(crate) fn result_ref(result: &Cell<usize>) -> BridgeReturnValueRef {
    result.as_ptr().cast::<c_void>()
}

/// # Safety
/// `frame` must come from [`frame_ref`] on a `T` still on the stack.
pub(crate) unsafe fn frame_from<'a, T>(frame: BridgeFrameRef) -> &'a T {
    // SAFETY: caller contract
    unsafe { &*frame.cast::<T>() }
}

/// # Safety
/// `slot` must come from [`result_ref`] on a frame still on the stack.
pub(crate) unsafe fn write_result(slot: BridgeReturnValueRef, index: usize) {
    // SAFETY: caller contract; frames are never shared across threads
    unsafe { slot.cast::<usize>().write(index) }
}
