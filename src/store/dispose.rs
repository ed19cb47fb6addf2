//! Staged disposal of stored values

use crate::pool::BufferPools;

/// A stored value that may own pooled buffers or in-flight kernels.
///
/// Disposal has two stages: wait for pending work, then hand buffers back
/// to the pools. Stores call the stages on every value they hold.
pub trait Disposable {
    /// True while a kernel may still write into this value's buffers
    fn has_pending_work(&self) -> bool {
        false
    }

    /// Block until pending work is finished
    fn complete_pending_work(&mut self) {}

    /// Return pooled buffers. Only called once pending work is finished.
    fn dispose_returned(&mut self, pools: &mut BufferPools) {
        let _ = pools;
    }

    /// Full barrier disposal: finish pending work, then return buffers
    fn dispose(&mut self, pools: &mut BufferPools) {
        self.complete_pending_work();
        self.dispose_returned(pools);
    }

    /// Staged disposal: return buffers only if nothing is pending.
    ///
    /// Returns true when the value was disposed.
    fn try_dispose(&mut self, pools: &mut BufferPools) -> bool {
        if self.has_pending_work() {
            return false;
        }
        self.dispose_returned(pools);
        true
    }
}
