//! Pooled buffers shared by every evaluation tree

pub mod atomic;
pub mod buffer_pool;
pub mod map_buffer;

pub use atomic::AtomicF32;
pub use buffer_pool::{BufferPool, ReturnToken};
pub use map_buffer::{remap_index, IndexAndResolution, MapView, SharedMapBuffer};

use crate::awaitable::JobHandle;
use crate::core::Diagnostics;

/// Engine-wide buffer pools
pub struct BufferPools {
    /// Pages backing every tree's [`SharedMapBuffer`]
    pub maps: BufferPool<AtomicF32>,
}

impl BufferPools {
    pub fn new(diagnostics: Diagnostics) -> Self {
        Self {
            maps: BufferPool::new("map", diagnostics),
        }
    }

    /// Force-free every pool after `pending` work finishes
    pub fn dispose_all(&mut self, pending: &JobHandle) {
        self.maps.dispose_all(pending);
    }
}
