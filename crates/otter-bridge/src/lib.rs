//! Safe bridge between Rust closures and an embedded script engine.
//!
//! This crate lets host code register function templates and object
//! templates (with getter/setter accessors) against an engine, and gives a
//! uniform handle-based view of the engine's objects, arrays, functions and
//! regular expressions. The engine itself is any implementation of
//! [`otter_bridge_sys::RawEngine`].
//!
//! # Example
//!
//! ```
//! use otter_bridge::{Accessor, Engine};
//! use otter_bridge_memory::MemoryEngine;
//!
//! let engine = Engine::new(MemoryEngine::new());
//!
//! let add = engine
//!     .new_function_template(|info| {
//!         let sum: f64 = info.args().iter().map(|v| v.to_number()).sum();
//!         info.return_value().set_number(sum);
//!     })
//!     .unwrap();
//! let function = add.new_function().unwrap();
//! let result = function
//!     .call(&[&engine.number(2.0).unwrap(), &engine.number(3.0).unwrap()])
//!     .unwrap();
//! assert_eq!(result.to_number(), 5.0);
//!
//! let point = engine.new_object_template().unwrap();
//! point.set_accessor(Accessor::new("x").getter(|_, info| info.return_value().set_int32(42)));
//! let object = point.new_object().unwrap();
//! assert_eq!(object.get_property("x").unwrap().to_number(), 42.0);
//! ```
//!
//! # Lifetimes
//!
//! ```text
//! Engine ──owns──> RawEngine backend
//!   │                 │ captures slot pointers
//!   └──owns──> Registry ──pins──> CallbackSlot ──holds──> host closure
//!                 ▲                    ▲
//!   Template ─────┘ (by id)            └── tombstoned on dispose
//! ```
//!
//! Templates refer back to their engine weakly; once disposed, or once the
//! engine is gone, instantiation yields `None` and dispatches through their
//! slots are refused.
//!
//! # Thread Safety
//!
//! Engines and templates are `Send + Sync`: registration, disposal and
//! instantiation may race freely. Values and frame views are `!Send` and
//! `!Sync`; they belong to the thread running the engine.

mod config;
mod dispatch;
mod engine;
mod error;
mod frame;
mod registry;
mod template;
mod value;

pub use config::EngineConfig;
pub use dispatch::{
    bridge_function_callback, bridge_getter_callback, bridge_setter_callback, decode_name,
    dispatch_table,
};
pub use engine::{DispatchStats, DispatchStatsSnapshot, Engine};
pub use error::{BridgeError, BridgeResult};
pub use frame::{FunctionCallbackInfo, GetterCallbackInfo, ReturnValue, SetterCallbackInfo};
pub use registry::{FunctionCallback, GetterCallback, SetterCallback};
pub use template::{Accessor, FunctionTemplate, ObjectTemplate};
pub use value::{
    AccessControl, Array, Function, Object, PropertyAttribute, RegExp, RegExpFlags, Value,
    ValueKind,
};

// Re-export the raw boundary for engine implementors
pub use otter_bridge_sys;
