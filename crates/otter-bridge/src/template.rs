//! Function and object templates
//!
//! A template owns host closures and produces engine values wired to them.
//! Each template serializes its own mutation, instantiation and disposal
//! behind a per-template lock; the engine-level id maps and slot table sit
//! behind the registry lock, always taken after a template lock.
//!
//! Disposal is idempotent and observable: once disposed, `id()` is 0,
//! instantiation yields `None`, and every callback slot the template ever
//! filled is tombstoned so native code can no longer reach its closures.

use indexmap::IndexMap;
use otter_bridge_sys::BridgeCallbackRef;
use parking_lot::Mutex;
use std::ptr;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use crate::engine::EngineInner;
use crate::error::{BridgeError, BridgeResult};
use crate::frame::{GetterCallbackInfo, SetterCallbackInfo};
use crate::registry::{CallbackSlot, FunctionCallback, GetterCallback, HostCallback, SetterCallback};
use crate::value::{AccessControl, Function, Object, PropertyAttribute, Value};

fn upgrade(engine: &Option<Weak<EngineInner>>) -> Option<Arc<EngineInner>> {
    engine.as_ref().and_then(Weak::upgrade)
}

fn slot_ptr(slot: &Option<Arc<CallbackSlot>>) -> BridgeCallbackRef {
    slot.as_ref().map_or(ptr::null(), CallbackSlot::as_raw)
}

pub(crate) struct FunctionTemplateInner {
    state: Mutex<FunctionTemplateState>,
}

struct FunctionTemplateState {
    /// 0 once disposed
    id: u64,
    engine: Option<Weak<EngineInner>>,
    slot: Arc<CallbackSlot>,
}

/// A host function descriptor; each instantiation is a script function that
/// calls the registered closure.
#[derive(Clone)]
pub struct FunctionTemplate {
    inner: Arc<FunctionTemplateInner>,
}

impl FunctionTemplate {
    pub(crate) fn register(
        engine: &Arc<EngineInner>,
        callback: FunctionCallback,
    ) -> BridgeResult<Self> {
        let mut registry = engine.registry();
        engine.check_template_limit(&registry)?;

        let id = registry.allocate_function_id();
        let slot = registry.allocate_slot(engine, id, HostCallback::Function(callback));
        let inner = Arc::new(FunctionTemplateInner {
            state: Mutex::new(FunctionTemplateState {
                id,
                engine: Some(Arc::downgrade(engine)),
                slot,
            }),
        });
        registry.insert_function_template(id, inner.clone());
        drop(registry);

        debug!(engine = %engine.name(), id, "Function template registered");
        Ok(Self { inner })
    }

    pub(crate) fn from_inner(inner: Arc<FunctionTemplateInner>) -> Self {
        Self { inner }
    }

    /// The registry id, or 0 once disposed
    pub fn id(&self) -> u64 {
        self.inner.state.lock().id
    }

    /// True once disposed, or once the owning engine is gone
    pub fn is_disposed(&self) -> bool {
        upgrade(&self.inner.state.lock().engine).is_none()
    }

    /// Detach from the engine and release the closure. Repeat calls are
    /// no-ops.
    pub fn dispose(&self) {
        let mut state = self.inner.state.lock();
        if state.id == 0 {
            return;
        }

        let id = std::mem::take(&mut state.id);
        if let Some(engine) = upgrade(&state.engine.take()) {
            engine.registry().remove_function_template(id);
            debug!(engine = %engine.name(), id, "Function template disposed");
        }
        state.slot.tombstone();
    }

    /// Create a script function bound to this template's closure.
    ///
    /// Returns `None` when the template is disposed: nothing is created and
    /// the closure is not touched.
    pub fn new_function(&self) -> Option<Function> {
        let state = self.inner.state.lock();
        let engine = upgrade(&state.engine)?;

        let raw = engine.backend().new_function(state.slot.as_raw());
        Value::from_raw(&engine, raw)?.to_function().ok()
    }
}

impl std::fmt::Debug for FunctionTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FunctionTemplate({})", self.id())
    }
}

/// A named property backed by host closures, ready to be added to an
/// [`ObjectTemplate`].
pub struct Accessor {
    name: String,
    getter: Option<GetterCallback>,
    setter: Option<SetterCallback>,
    access_control: AccessControl,
    attribs: PropertyAttribute,
}

impl Accessor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            getter: None,
            setter: None,
            access_control: AccessControl::DEFAULT,
            attribs: PropertyAttribute::NONE,
        }
    }

    pub fn getter<F>(mut self, getter: F) -> Self
    where
        F: Fn(&str, &GetterCallbackInfo<'_>) + Send + Sync + 'static,
    {
        self.getter = Some(Arc::new(getter));
        self
    }

    pub fn setter<F>(mut self, setter: F) -> Self
    where
        F: Fn(&str, Value, &SetterCallbackInfo<'_>) + Send + Sync + 'static,
    {
        self.setter = Some(Arc::new(setter));
        self
    }

    pub fn access_control(mut self, access_control: AccessControl) -> Self {
        self.access_control = access_control;
        self
    }

    pub fn attributes(mut self, attribs: PropertyAttribute) -> Self {
        self.attribs = attribs;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// An accessor as stored on its template, closures already pinned in slots
struct AccessorInfo {
    getter: Option<Arc<CallbackSlot>>,
    setter: Option<Arc<CallbackSlot>>,
    access_control: AccessControl,
    attribs: PropertyAttribute,
}

pub(crate) struct ObjectTemplateInner {
    state: Mutex<ObjectTemplateState>,
}

struct ObjectTemplateState {
    /// 0 once disposed
    id: u64,
    engine: Option<Weak<EngineInner>>,
    accessors: IndexMap<String, AccessorInfo>,
    /// Every slot ever filled, including those of replaced accessors that
    /// earlier instances still reference.
    slots: Vec<Arc<CallbackSlot>>,
}

impl ObjectTemplateState {
    fn install(&self, object: &Object) {
        for (name, info) in &self.accessors {
            let installed = object.set_accessor(
                name,
                slot_ptr(&info.getter),
                slot_ptr(&info.setter),
                info.access_control,
                info.attribs,
            );
            if !installed {
                warn!(template = self.id, accessor = %name, "Engine rejected accessor");
            }
        }
    }
}

/// An object shape descriptor: a set of accessors applied to each object it
/// creates or wraps.
#[derive(Clone)]
pub struct ObjectTemplate {
    inner: Arc<ObjectTemplateInner>,
}

impl ObjectTemplate {
    pub(crate) fn register(engine: &Arc<EngineInner>) -> BridgeResult<Self> {
        let mut registry = engine.registry();
        engine.check_template_limit(&registry)?;

        let id = registry.allocate_object_id();
        let inner = Arc::new(ObjectTemplateInner {
            state: Mutex::new(ObjectTemplateState {
                id,
                engine: Some(Arc::downgrade(engine)),
                accessors: IndexMap::new(),
                slots: Vec::new(),
            }),
        });
        registry.insert_object_template(id, inner.clone());
        drop(registry);

        debug!(engine = %engine.name(), id, "Object template registered");
        Ok(Self { inner })
    }

    pub(crate) fn from_inner(inner: Arc<ObjectTemplateInner>) -> Self {
        Self { inner }
    }

    /// The registry id, or 0 once disposed
    pub fn id(&self) -> u64 {
        self.inner.state.lock().id
    }

    /// True once disposed, or once the owning engine is gone
    pub fn is_disposed(&self) -> bool {
        upgrade(&self.inner.state.lock().engine).is_none()
    }

    /// Names of the accessors the next instance will receive
    pub fn accessor_names(&self) -> Vec<String> {
        self.inner.state.lock().accessors.keys().cloned().collect()
    }

    /// Add or replace an accessor; the last write for a name wins.
    ///
    /// Objects already created keep the accessors they were built with.
    /// Returns false when the template is disposed.
    pub fn set_accessor(&self, accessor: Accessor) -> bool {
        let mut state = self.inner.state.lock();
        let Some(engine) = upgrade(&state.engine) else {
            return false;
        };

        let id = state.id;
        let Accessor {
            name,
            getter,
            setter,
            access_control,
            attribs,
        } = accessor;

        let (getter, setter) = {
            let mut registry = engine.registry();
            let getter =
                getter.map(|g| registry.allocate_slot(&engine, id, HostCallback::Getter(g)));
            let setter =
                setter.map(|s| registry.allocate_slot(&engine, id, HostCallback::Setter(s)));
            (getter, setter)
        };
        state.slots.extend(getter.iter().chain(setter.iter()).cloned());

        debug!(engine = %engine.name(), template = id, accessor = %name, "Accessor set");
        state.accessors.insert(
            name,
            AccessorInfo {
                getter,
                setter,
                access_control,
                attribs,
            },
        );
        true
    }

    /// Create an object carrying the current accessor set.
    ///
    /// Returns `None` when the template is disposed.
    pub fn new_object(&self) -> Option<Object> {
        let state = self.inner.state.lock();
        let engine = upgrade(&state.engine)?;

        let raw = engine.backend().new_object();
        let object = Value::from_raw(&engine, raw)?.to_object().ok()?;
        state.install(&object);
        Some(object)
    }

    /// Install the current accessor set onto an object created elsewhere.
    ///
    /// Returns `Ok(false)` when the template is disposed and nothing was
    /// installed; fails when `value` is not an object or belongs to another
    /// engine.
    pub fn wrap_object(&self, value: &Value) -> BridgeResult<bool> {
        let object = value.to_object()?;
        let state = self.inner.state.lock();
        let Some(engine) = upgrade(&state.engine) else {
            return Ok(false);
        };
        if !Arc::ptr_eq(&engine, value.engine()) {
            return Err(BridgeError::engine_mismatch("wrap_object"));
        }
        state.install(&object);
        Ok(true)
    }

    /// Detach from the engine and release every accessor closure. Repeat
    /// calls are no-ops.
    pub fn dispose(&self) {
        let mut state = self.inner.state.lock();
        if state.id == 0 {
            return;
        }

        let id = std::mem::take(&mut state.id);
        if let Some(engine) = upgrade(&state.engine.take()) {
            engine.registry().remove_object_template(id);
            debug!(
                engine = %engine.name(),
                id,
                slots = state.slots.len(),
                "Object template disposed"
            );
        }
        for slot in state.slots.drain(..) {
            slot.tombstone();
        }
        state.accessors.clear();
    }
}

impl std::fmt::Debug for ObjectTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectTemplate({})", self.id())
    }
}
