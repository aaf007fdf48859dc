//! The bridge engine: a native engine backend plus its template registry

use otter_bridge_sys::RawEngine;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::config::EngineConfig;
use crate::dispatch;
use crate::error::{BridgeError, BridgeResult};
use crate::frame::FunctionCallbackInfo;
use crate::registry::Registry;
use crate::template::{FunctionTemplate, ObjectTemplate};
use crate::value::{Array, RegExpFlags, Value};

/// Dispatch counters for one engine
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Host closures invoked
    pub invoked: AtomicU64,
    /// Dispatches refused: tombstoned slot or wrong callback kind
    pub rejected: AtomicU64,
    /// Host closures that panicked
    pub panicked: AtomicU64,
    /// Accessor dispatches whose property name could not be decoded
    pub bad_names: AtomicU64,
}

impl DispatchStats {
    /// Get snapshot of current stats
    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            invoked: self.invoked.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            bad_names: self.bad_names.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_invoked(&self) {
        self.invoked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_panicked(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_bad_name(&self) {
        self.bad_names.fetch_add(1, Ordering::Relaxed);
    }
}

/// A point-in-time snapshot of dispatch statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStatsSnapshot {
    pub invoked: u64,
    pub rejected: u64,
    pub panicked: u64,
    pub bad_names: u64,
}

/// Shared engine state. Templates point back here weakly; values and
/// callback dispatches hold it strongly.
pub(crate) struct EngineInner {
    // Declared first so the backend, and every native object capturing slot
    // pointers, is dropped before the slot table in `registry`.
    backend: Box<dyn RawEngine>,
    registry: Mutex<Registry>,
    config: EngineConfig,
    stats: DispatchStats,
}

impl EngineInner {
    pub(crate) fn backend(&self) -> &dyn RawEngine {
        self.backend.as_ref()
    }

    pub(crate) fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock()
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    pub(crate) fn name(&self) -> &str {
        &self.config.name
    }

    /// Fails when one more template would exceed `max_templates`.
    pub(crate) fn check_template_limit(&self, registry: &Registry) -> BridgeResult<()> {
        match self.config.max_templates {
            Some(max) if registry.live_templates() >= max => Err(BridgeError::ResourceLimit(
                format!("engine '{}' already holds {} live templates", self.name(), max),
            )),
            _ => Ok(()),
        }
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        let registry = self.registry.get_mut();
        debug!(
            engine = %self.config.name,
            function_templates = registry.function_template_count(),
            object_templates = registry.object_template_count(),
            slots = registry.slot_count(),
            live_slots = registry.live_slot_count(),
            "Engine torn down"
        );
    }
}

/// A script execution environment as seen from the host
///
/// Owns the native backend and the per-engine template registry. Cloning
/// yields another handle to the same engine.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Create an engine over `backend` with default configuration
    pub fn new<B: RawEngine + 'static>(backend: B) -> Self {
        Self::with_config(backend, EngineConfig::default())
    }

    /// Create an engine over `backend` with the given configuration
    pub fn with_config<B: RawEngine + 'static>(backend: B, config: EngineConfig) -> Self {
        backend.attach(dispatch::dispatch_table());
        debug!(engine = %config.name, "Engine created");
        Self {
            inner: Arc::new(EngineInner {
                backend: Box::new(backend),
                registry: Mutex::new(Registry::default()),
                config,
                stats: DispatchStats::default(),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<EngineInner>) -> Self {
        Self { inner }
    }

    pub fn config(&self) -> &EngineConfig {
        self.inner.config()
    }

    pub fn stats(&self) -> DispatchStatsSnapshot {
        self.inner.stats().snapshot()
    }

    /// Create an empty object
    pub fn new_object(&self) -> BridgeResult<Value> {
        let raw = self.inner.backend().new_object();
        Value::from_raw_or(&self.inner, raw, "new_object")
    }

    /// Create an array with `length` empty slots
    pub fn new_array(&self, length: u32) -> BridgeResult<Array> {
        let raw = self.inner.backend().new_array(length);
        Value::from_raw_or(&self.inner, raw, "new_array")?.to_array()
    }

    /// Create a regular expression from a pattern and flags.
    ///
    /// `new_regexp("foo", RegExpFlags::GLOBAL | RegExpFlags::MULTILINE)` is
    /// equivalent to evaluating `/foo/gm`. A rejected pattern raises a script
    /// exception in the engine and surfaces here as `NullPointer`.
    pub fn new_regexp(&self, pattern: &str, flags: RegExpFlags) -> BridgeResult<Value> {
        let raw = self
            .inner
            .backend()
            .new_regexp(pattern.as_bytes(), flags.bits());
        Value::from_raw_or(&self.inner, raw, "new_regexp")
    }

    pub fn undefined(&self) -> BridgeResult<Value> {
        let raw = self.inner.backend().make_undefined();
        Value::from_raw_or(&self.inner, raw, "make_undefined")
    }

    pub fn null(&self) -> BridgeResult<Value> {
        let raw = self.inner.backend().make_null();
        Value::from_raw_or(&self.inner, raw, "make_null")
    }

    pub fn boolean(&self, value: bool) -> BridgeResult<Value> {
        let raw = self.inner.backend().make_boolean(value);
        Value::from_raw_or(&self.inner, raw, "make_boolean")
    }

    pub fn number(&self, value: f64) -> BridgeResult<Value> {
        let raw = self.inner.backend().make_number(value);
        Value::from_raw_or(&self.inner, raw, "make_number")
    }

    pub fn string(&self, value: &str) -> BridgeResult<Value> {
        let raw = self.inner.backend().make_string(value.as_bytes());
        Value::from_raw_or(&self.inner, raw, "make_string")
    }

    /// Register a function template whose instances call `callback`
    pub fn new_function_template<F>(&self, callback: F) -> BridgeResult<FunctionTemplate>
    where
        F: Fn(&FunctionCallbackInfo<'_>) + Send + Sync + 'static,
    {
        FunctionTemplate::register(&self.inner, Arc::new(callback))
    }

    /// Register an object template with no accessors
    pub fn new_object_template(&self) -> BridgeResult<ObjectTemplate> {
        ObjectTemplate::register(&self.inner)
    }

    /// Look up a live function template by id
    pub fn function_template(&self, id: u64) -> Option<FunctionTemplate> {
        self.inner
            .registry()
            .function_template(id)
            .map(FunctionTemplate::from_inner)
    }

    /// Look up a live object template by id
    pub fn object_template(&self, id: u64) -> Option<ObjectTemplate> {
        self.inner
            .registry()
            .object_template(id)
            .map(ObjectTemplate::from_inner)
    }

    pub fn function_template_count(&self) -> usize {
        self.inner.registry().function_template_count()
    }

    pub fn object_template_count(&self) -> usize {
        self.inner.registry().object_template_count()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Engine({})", self.inner.name())
    }
}
