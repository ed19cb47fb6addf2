//! Buffer Pool - reusable fixed-length buffers
//!
//! - Buffers are bucketed by exact length and reused after release
//! - Each checkout hands out a return token; releasing a token twice is
//!   detected through a per-slot generation counter
//! - A released buffer still shared elsewhere is never handed out again;
//!   its slot gets a fresh allocation instead

use std::collections::HashMap;
use std::sync::Arc;

use crate::awaitable::JobHandle;
use crate::core::{DiagnosticKind, Diagnostics};

/// Proof of checkout; pass back to [`BufferPool::release`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReturnToken {
    slot: u32,
    generation: u32,
}

impl ReturnToken {
    pub fn slot(&self) -> u32 {
        self.slot
    }
}

/// A slot in the pool
struct PoolSlot<T> {
    buffer: Arc<[T]>,
    /// Bumped on every release so stale tokens are rejected
    generation: u32,
    checked_out: bool,
}

/// Pool of `Arc<[T]>` buffers with free lists keyed by length
pub struct BufferPool<T> {
    label: &'static str,
    slots: Vec<PoolSlot<T>>,
    /// Map from buffer length -> free slot indices
    free: HashMap<usize, Vec<u32>>,
    checked_out: usize,
    diagnostics: Diagnostics,
}

fn allocate<T: Default>(len: usize) -> Arc<[T]> {
    (0..len).map(|_| T::default()).collect()
}

impl<T: Default + Send + Sync> BufferPool<T> {
    pub fn new(label: &'static str, diagnostics: Diagnostics) -> Self {
        Self {
            label,
            slots: Vec::new(),
            free: HashMap::new(),
            checked_out: 0,
            diagnostics,
        }
    }

    /// Check out a buffer of exactly `len` elements.
    ///
    /// Reused buffers keep their previous contents; callers overwrite them.
    pub fn checkout(&mut self, len: usize) -> (Arc<[T]>, ReturnToken) {
        let reused = self.free.get_mut(&len).and_then(|list| list.pop());

        let slot_idx = match reused {
            Some(idx) => {
                let slot = &mut self.slots[idx as usize];
                if Arc::strong_count(&slot.buffer) > 1 {
                    log::warn!(
                        "{} pool: buffer in slot {} still referenced after release, reallocating",
                        self.label,
                        idx
                    );
                    slot.buffer = allocate(len);
                }
                slot.checked_out = true;
                idx
            }
            None => {
                let idx = self.slots.len() as u32;
                self.slots.push(PoolSlot {
                    buffer: allocate(len),
                    generation: 0,
                    checked_out: true,
                });
                log::trace!("{} pool: allocated slot {} ({} elements)", self.label, idx, len);
                idx
            }
        };

        self.checked_out += 1;
        let slot = &self.slots[slot_idx as usize];
        (
            Arc::clone(&slot.buffer),
            ReturnToken { slot: slot_idx, generation: slot.generation },
        )
    }

    /// Return a checked-out buffer. Stale or repeated tokens are reported and ignored.
    pub fn release(&mut self, token: ReturnToken) -> bool {
        match self.slots.get_mut(token.slot as usize) {
            Some(slot) if slot.checked_out && slot.generation == token.generation => {
                slot.checked_out = false;
                slot.generation = slot.generation.wrapping_add(1);
                let len = slot.buffer.len();
                self.free.entry(len).or_default().push(token.slot);
                self.checked_out -= 1;
                true
            }
            _ => {
                self.diagnostics.report(
                    DiagnosticKind::DoubleRelease,
                    format!(
                        "{} pool: release of slot {} generation {} ignored",
                        self.label, token.slot, token.generation
                    ),
                );
                false
            }
        }
    }

    /// Number of buffers currently checked out
    pub fn checked_out(&self) -> usize {
        self.checked_out
    }

    /// Number of buffers waiting for reuse
    pub fn free_count(&self) -> usize {
        self.free.values().map(Vec::len).sum()
    }

    /// Total buffers ever allocated and still owned by the pool
    pub fn total_allocated(&self) -> usize {
        self.slots.len()
    }

    /// Wait for `pending` work, then drop every buffer.
    ///
    /// Buffers still checked out are force-freed and reported.
    pub fn dispose_all(&mut self, pending: &JobHandle) {
        pending.complete();
        if self.checked_out > 0 {
            self.diagnostics.report(
                DiagnosticKind::LeakedBuffers,
                format!(
                    "{} pool: {} buffers still checked out at dispose, force-freeing",
                    self.label, self.checked_out
                ),
            );
        }
        self.slots.clear();
        self.free.clear();
        self.checked_out = 0;
    }
}

impl<T> Drop for BufferPool<T> {
    fn drop(&mut self) {
        if self.checked_out > 0 {
            log::warn!(
                "{} pool dropped with {} buffers checked out",
                self.label,
                self.checked_out
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> BufferPool<u32> {
        BufferPool::new("test", Diagnostics::default())
    }

    #[test]
    fn test_checkout_and_reuse() {
        let mut pool = pool();
        let (buffer, token) = pool.checkout(16);
        assert_eq!(buffer.len(), 16);
        assert_eq!(pool.checked_out(), 1);
        let slot = token.slot();

        drop(buffer);
        assert!(pool.release(token));
        assert_eq!(pool.checked_out(), 0);
        assert_eq!(pool.free_count(), 1);

        let (again, token) = pool.checkout(16);
        assert_eq!(again.len(), 16);
        assert_eq!(token.slot(), slot);
        assert_eq!(pool.total_allocated(), 1);
    }

    #[test]
    fn test_lengths_are_bucketed() {
        let mut pool = pool();
        let (_a, token) = pool.checkout(8);
        pool.release(token);

        let (b, _) = pool.checkout(9);
        assert_eq!(b.len(), 9);
        assert_eq!(pool.total_allocated(), 2);
    }

    #[test]
    fn test_double_release_reported() {
        let diagnostics = Diagnostics::default();
        let mut pool: BufferPool<u32> = BufferPool::new("test", diagnostics.clone());
        let (_buffer, token) = pool.checkout(4);

        assert!(pool.release(token.clone()));
        assert!(!pool.release(token));
        assert_eq!(diagnostics.count(DiagnosticKind::DoubleRelease), 1);
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn test_stale_token_after_reuse_rejected() {
        let diagnostics = Diagnostics::default();
        let mut pool: BufferPool<u32> = BufferPool::new("test", diagnostics.clone());
        let (_a, first) = pool.checkout(4);
        pool.release(first.clone());
        let (_b, second) = pool.checkout(4);

        // Same slot, newer generation
        assert_eq!(first.slot(), second.slot());
        assert!(!pool.release(first));
        assert_eq!(pool.checked_out(), 1);
        assert!(pool.release(second));
    }

    #[test]
    fn test_shared_buffer_not_reused() {
        let mut pool = pool();
        let (held, token) = pool.checkout(4);
        pool.release(token);

        let (fresh, _) = pool.checkout(4);
        assert!(!Arc::ptr_eq(&held, &fresh));
    }

    #[test]
    fn test_dispose_all_reports_leaks() {
        let diagnostics = Diagnostics::default();
        let mut pool: BufferPool<u32> = BufferPool::new("test", diagnostics.clone());
        let (_a, _leaked) = pool.checkout(4);
        let (_b, returned) = pool.checkout(4);
        pool.release(returned);

        pool.dispose_all(&JobHandle::completed());
        assert_eq!(diagnostics.count(DiagnosticKind::LeakedBuffers), 1);
        assert_eq!(pool.checked_out(), 0);
        assert_eq!(pool.total_allocated(), 0);
    }
}
