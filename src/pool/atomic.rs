//! Lock-free f32 cell used as the element type of shared map pages

use std::sync::atomic::{AtomicU32, Ordering};

/// `f32` stored as raw bits in an `AtomicU32`.
///
/// Kernels write disjoint ranges with relaxed stores; visibility to readers
/// comes from the job signal's release/acquire pair, not from this type.
#[derive(Debug, Default)]
#[repr(transparent)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}
