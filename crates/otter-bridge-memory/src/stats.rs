use std::sync::atomic::{AtomicU64, Ordering};

/// Counters kept by [`MemoryEngine`](crate::MemoryEngine)
///
/// Tests use these to observe how often the bridge reaches into the engine.
#[derive(Debug, Default)]
pub struct MemoryStats {
    pub objects_created: AtomicU64,
    pub functions_created: AtomicU64,
    pub accessors_installed: AtomicU64,
    /// Reads of a regular expression's source text
    pub regexp_pattern_reads: AtomicU64,
    /// Reads of a regular expression's flag bits
    pub regexp_flags_reads: AtomicU64,
    /// Calls made through the host dispatch table
    pub dispatches: AtomicU64,
    /// Dispatches the host answered with `NOT_HANDLED`
    pub unhandled_dispatches: AtomicU64,
    /// Dispatches the host answered with `BAD_NAME` or `PANICKED`
    pub failed_dispatches: AtomicU64,
}

impl MemoryStats {
    pub fn snapshot(&self) -> MemoryStatsSnapshot {
        MemoryStatsSnapshot {
            objects_created: self.objects_created.load(Ordering::Relaxed),
            functions_created: self.functions_created.load(Ordering::Relaxed),
            accessors_installed: self.accessors_installed.load(Ordering::Relaxed),
            regexp_pattern_reads: self.regexp_pattern_reads.load(Ordering::Relaxed),
            regexp_flags_reads: self.regexp_flags_reads.load(Ordering::Relaxed),
            dispatches: self.dispatches.load(Ordering::Relaxed),
            unhandled_dispatches: self.unhandled_dispatches.load(Ordering::Relaxed),
            failed_dispatches: self.failed_dispatches.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStatsSnapshot {
    pub objects_created: u64,
    pub functions_created: u64,
    pub accessors_installed: u64,
    pub regexp_pattern_reads: u64,
    pub regexp_flags_reads: u64,
    pub dispatches: u64,
    pub unhandled_dispatches: u64,
    pub failed_dispatches: u64,
}
