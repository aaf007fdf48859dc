//! Per-engine template registry and callback slot table
//!
//! The registry maps monotonically increasing template ids to templates and
//! owns every callback slot the engine ever handed to native code. Slots are
//! `Arc`-pinned: their address is what native code captures, so they stay
//! allocated until the engine itself is dropped, long after the template
//! that filled them is disposed. Disposal only tombstones a slot.
//!
//! The slot table therefore only grows for the life of an engine: one slot
//! per function template, plus one per getter and one per setter for every
//! `set_accessor` call, including calls that replace an existing accessor.
//! A tombstoned slot keeps its `Arc` allocation but holds no closure.

use otter_bridge_sys::BridgeCallbackRef;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::{Arc, Weak};

use crate::engine::EngineInner;
use crate::frame::{FunctionCallbackInfo, GetterCallbackInfo, SetterCallbackInfo};
use crate::template::{FunctionTemplateInner, ObjectTemplateInner};
use crate::value::Value;

/// Host closure invoked when script calls a bound function
pub type FunctionCallback = Arc<dyn Fn(&FunctionCallbackInfo<'_>) + Send + Sync>;

/// Host closure invoked when script reads a bound accessor
pub type GetterCallback = Arc<dyn Fn(&str, &GetterCallbackInfo<'_>) + Send + Sync>;

/// Host closure invoked when script writes a bound accessor
pub type SetterCallback = Arc<dyn Fn(&str, Value, &SetterCallbackInfo<'_>) + Send + Sync>;

#[derive(Clone)]
pub(crate) enum HostCallback {
    Function(FunctionCallback),
    Getter(GetterCallback),
    Setter(SetterCallback),
}

impl HostCallback {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Function(_) => "function",
            Self::Getter(_) => "getter",
            Self::Setter(_) => "setter",
        }
    }
}

/// A stable-address cell holding one host closure until its template is
/// disposed.
pub(crate) struct CallbackSlot {
    template_id: u64,
    engine: Weak<EngineInner>,
    callback: RwLock<Option<HostCallback>>,
}

impl CallbackSlot {
    /// The pointer native code captures for this slot
    pub(crate) fn as_raw(self: &Arc<Self>) -> BridgeCallbackRef {
        Arc::as_ptr(self) as BridgeCallbackRef
    }

    pub(crate) fn template_id(&self) -> u64 {
        self.template_id
    }

    pub(crate) fn engine(&self) -> Option<Arc<EngineInner>> {
        self.engine.upgrade()
    }

    /// Clone the closure out so it runs without the slot lock held.
    pub(crate) fn load(&self) -> Option<HostCallback> {
        self.callback.read().clone()
    }

    /// Drop the closure. Later dispatches through this slot are refused.
    pub(crate) fn tombstone(&self) {
        self.callback.write().take();
    }
}

/// Engine-scoped id maps, counters and slot table, guarded as a unit by the
/// engine's registry lock.
#[derive(Default)]
pub(crate) struct Registry {
    next_function_id: u64,
    next_object_id: u64,
    function_templates: FxHashMap<u64, Arc<FunctionTemplateInner>>,
    object_templates: FxHashMap<u64, Arc<ObjectTemplateInner>>,
    slots: Vec<Arc<CallbackSlot>>,
}

impl Registry {
    pub(crate) fn live_templates(&self) -> usize {
        self.function_templates.len() + self.object_templates.len()
    }

    pub(crate) fn function_template_count(&self) -> usize {
        self.function_templates.len()
    }

    pub(crate) fn object_template_count(&self) -> usize {
        self.object_templates.len()
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Slots still holding a closure
    pub(crate) fn live_slot_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.load().is_some()).count()
    }

    /// Ids start at 1 and are never reused; 0 marks a disposed template.
    pub(crate) fn allocate_function_id(&mut self) -> u64 {
        self.next_function_id += 1;
        self.next_function_id
    }

    pub(crate) fn allocate_object_id(&mut self) -> u64 {
        self.next_object_id += 1;
        self.next_object_id
    }

    pub(crate) fn insert_function_template(&mut self, id: u64, inner: Arc<FunctionTemplateInner>) {
        self.function_templates.insert(id, inner);
    }

    pub(crate) fn insert_object_template(&mut self, id: u64, inner: Arc<ObjectTemplateInner>) {
        self.object_templates.insert(id, inner);
    }

    pub(crate) fn remove_function_template(&mut self, id: u64) -> bool {
        self.function_templates.remove(&id).is_some()
    }

    pub(crate) fn remove_object_template(&mut self, id: u64) -> bool {
        self.object_templates.remove(&id).is_some()
    }

    pub(crate) fn function_template(&self, id: u64) -> Option<Arc<FunctionTemplateInner>> {
        self.function_templates.get(&id).cloned()
    }

    pub(crate) fn object_template(&self, id: u64) -> Option<Arc<ObjectTemplateInner>> {
        self.object_templates.get(&id).cloned()
    }

    /// Allocate a pinned slot for `callback`, owned by the table until the
    /// engine is dropped.
    pub(crate) fn allocate_slot(
        &mut self,
        engine: &Arc<EngineInner>,
        template_id: u64,
        callback: HostCallback,
    ) -> Arc<CallbackSlot> {
        let slot = Arc::new(CallbackSlot {
            template_id,
            engine: Arc::downgrade(engine),
            callback: RwLock::new(Some(callback)),
        });
        self.slots.push(slot.clone());
        slot
    }
}
