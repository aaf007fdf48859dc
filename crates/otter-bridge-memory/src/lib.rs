//! In-process reference engine for `otter-bridge`
//!
//! [`MemoryEngine`] implements [`otter_bridge_sys::RawEngine`] without any
//! native library: objects, prototype chains, property attributes, accessor
//! properties, arrays and regular expressions are plain Rust data. It
//! exercises every dispatch path of the bridge and is what the bridge's own
//! tests and doc examples run on.
//!
//! ```
//! use otter_bridge::Engine;
//! use otter_bridge_memory::MemoryEngine;
//!
//! let backend = MemoryEngine::new();
//! let stats = backend.stats();
//! let engine = Engine::new(backend);
//!
//! engine.new_object().unwrap();
//! assert_eq!(stats.snapshot().objects_created, 1);
//! ```

mod engine;
mod frame;
mod heap;
mod stats;

pub use engine::MemoryEngine;
pub use stats::{MemoryStats, MemoryStatsSnapshot};
