//! Engine diagnostics sink
//!
//! Recoverable faults (invalid nodes, duplicate keys, buffer misuse, stalls)
//! never abort evaluation. They are logged through `log` and kept in a
//! bounded in-memory log so tools and tests can inspect them.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Default number of diagnostics retained before the oldest are dropped
pub const DEFAULT_DIAGNOSTIC_CAPACITY: usize = 256;

/// Category of a reported fault
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// Node or edge failed validation and was excluded
    InvalidNode,
    /// A store already held a value under the key being added
    DuplicateKey,
    /// A required store entry was not present
    MissingEntry,
    /// A pooled buffer was released with a stale or already-used token
    DoubleRelease,
    /// Buffers were still checked out when a pool was disposed
    LeakedBuffers,
    /// A map range read or write fell outside its backing page
    OutOfRange,
    /// Graph cycle or re-entrant node evaluation
    Cycle,
    /// Forced completion made no progress
    Stalled,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One reported fault
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

#[derive(Debug)]
struct DiagnosticLog {
    entries: VecDeque<Diagnostic>,
    counts: HashMap<DiagnosticKind, usize>,
    capacity: usize,
}

/// Shared, cloneable diagnostics sink
#[derive(Clone, Debug)]
pub struct Diagnostics {
    inner: Arc<Mutex<DiagnosticLog>>,
}

impl Diagnostics {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(DiagnosticLog {
                entries: VecDeque::with_capacity(capacity.min(64)),
                counts: HashMap::new(),
                capacity: capacity.max(1),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DiagnosticLog> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a fault and emit it as a warning
    pub fn report(&self, kind: DiagnosticKind, message: impl Into<String>) {
        let message = message.into();
        log::warn!("[{}] {}", kind, message);

        let mut log = self.lock();
        *log.counts.entry(kind).or_insert(0) += 1;
        if log.entries.len() >= log.capacity {
            log.entries.pop_front();
        }
        log.entries.push_back(Diagnostic { kind, message });
    }

    /// Total number of reports of `kind` since creation (not bounded by capacity)
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.lock().counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.lock().counts.values().sum()
    }

    /// Snapshot of the retained entries, oldest first
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.lock().entries.iter().cloned().collect()
    }

    pub fn clear(&self) {
        let mut log = self.lock();
        log.entries.clear();
        log.counts.clear();
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(DEFAULT_DIAGNOSTIC_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts_per_kind() {
        let diagnostics = Diagnostics::default();
        diagnostics.report(DiagnosticKind::DuplicateKey, "a");
        diagnostics.report(DiagnosticKind::DuplicateKey, "b");
        diagnostics.report(DiagnosticKind::Cycle, "c");

        assert_eq!(diagnostics.count(DiagnosticKind::DuplicateKey), 2);
        assert_eq!(diagnostics.count(DiagnosticKind::Cycle), 1);
        assert_eq!(diagnostics.count(DiagnosticKind::Stalled), 0);
        assert_eq!(diagnostics.total(), 3);
    }

    #[test]
    fn test_bounded_entries() {
        let diagnostics = Diagnostics::new(2);
        for i in 0..5 {
            diagnostics.report(DiagnosticKind::OutOfRange, format!("entry {}", i));
        }

        let entries = diagnostics.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "entry 3");
        assert_eq!(entries[1].message, "entry 4");
        // Counts keep the full history
        assert_eq!(diagnostics.count(DiagnosticKind::OutOfRange), 5);
    }

    #[test]
    fn test_clones_share_log() {
        let diagnostics = Diagnostics::default();
        let clone = diagnostics.clone();
        clone.report(DiagnosticKind::MissingEntry, "missing");
        assert_eq!(diagnostics.count(DiagnosticKind::MissingEntry), 1);

        diagnostics.clear();
        assert_eq!(clone.total(), 0);
    }
}
