//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::BridgeResult;

/// Settings for a bridge [`Engine`](crate::Engine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Label attached to log events emitted for this engine.
    /// Default: "bridge"
    pub name: String,

    /// Upper bound on live (undisposed) templates, function and object
    /// templates combined. `None` means unbounded.
    /// Default: None
    pub max_templates: Option<usize>,

    /// Emit a `trace` event for every dispatch into a host closure.
    /// Default: false
    pub trace_dispatch: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "bridge".to_string(),
            max_templates: None,
            trace_dispatch: false,
        }
    }
}

impl EngineConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> BridgeResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max_templates(mut self, max: usize) -> Self {
        self.max_templates = Some(max);
        self
    }

    pub fn with_trace_dispatch(mut self, enabled: bool) -> Self {
        self.trace_dispatch = enabled;
        self
    }
}
