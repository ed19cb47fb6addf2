//! Shared map buffer - paged storage for per-tree map data
//!
//! Every map a tree produces (grid coordinates, heights, masks, vertex
//! channels) is a square of `resolution * resolution` floats allocated out
//! of one [`SharedMapBuffer`]. Ranges are identified by a global start index
//! and never span pages, so every range is a contiguous slice of one page.

use std::sync::Arc;

use super::atomic::AtomicF32;
use super::buffer_pool::{BufferPool, ReturnToken};
use super::BufferPools;
use crate::core::{DiagnosticKind, Diagnostics};
use crate::store::Disposable;

/// Default page length in floats (a 256x256 map)
pub const DEFAULT_PAGE_SIZE: usize = 256 * 256;

/// Range of a square map inside a [`SharedMapBuffer`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IndexAndResolution {
    pub start_index: usize,
    pub resolution: u32,
    /// Always `resolution * resolution`
    pub length: usize,
}

impl IndexAndResolution {
    pub fn new(start_index: usize, resolution: u32) -> Self {
        let resolution = resolution.max(1);
        Self {
            start_index,
            resolution,
            length: resolution as usize * resolution as usize,
        }
    }

    /// One past the last index of the range
    pub fn end(&self) -> usize {
        self.start_index + self.length
    }

    pub fn overlaps(&self, other: &IndexAndResolution) -> bool {
        self.start_index < other.end() && other.start_index < self.end()
    }

    /// Local index into `self` matching local `index` of a map with `resolution`
    pub fn remap_from(&self, index: usize, resolution: u32) -> usize {
        remap_index(index, resolution, self.resolution)
    }
}

/// Map a local index of a `dest_resolution` map onto the nearest sample of a
/// `source_resolution` map covering the same square.
///
/// Both maps are treated as corner-aligned vertex grids; a resolution-1 map
/// is a single sample at the square's center. Identity when the
/// resolutions match, and always within `[0, source_resolution^2)`.
pub fn remap_index(dest_index: usize, dest_resolution: u32, source_resolution: u32) -> usize {
    let dest = dest_resolution.max(1) as usize;
    let source = source_resolution.max(1) as usize;
    let source_len = source * source;

    if dest == source {
        return dest_index.min(source_len - 1);
    }

    let x = dest_index % dest;
    let y = (dest_index / dest).min(dest - 1);

    let scale = |coord: usize| -> usize {
        if dest == 1 {
            (source - 1) / 2
        } else {
            let t = coord as f64 / (dest - 1) as f64;
            ((t * (source - 1) as f64).round() as usize).min(source - 1)
        }
    };

    scale(y) * source + scale(x)
}

/// Read/write window onto one range of a page
#[derive(Clone)]
pub struct MapView {
    page: Arc<[AtomicF32]>,
    offset: usize,
    len: usize,
    resolution: u32,
}

impl MapView {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn try_get(&self, index: usize) -> Option<f32> {
        if index < self.len {
            self.page.get(self.offset + index).map(AtomicF32::load)
        } else {
            None
        }
    }

    /// Read one value; out-of-range reads are skipped and yield 0.0
    #[inline]
    pub fn get(&self, index: usize) -> f32 {
        debug_assert!(index < self.len, "map read {} outside length {}", index, self.len);
        self.try_get(index).unwrap_or(0.0)
    }

    /// Read the sample nearest to local `index` of a map with `resolution`
    #[inline]
    pub fn sample(&self, index: usize, resolution: u32) -> f32 {
        self.get(remap_index(index, resolution, self.resolution))
    }

    /// Write one value; out-of-range writes are dropped
    #[inline]
    pub fn set(&self, index: usize, value: f32) {
        debug_assert!(index < self.len, "map write {} outside length {}", index, self.len);
        if index < self.len {
            if let Some(cell) = self.page.get(self.offset + index) {
                cell.store(value);
            }
        }
    }

    pub fn to_vec(&self) -> Vec<f32> {
        (0..self.len).map(|i| self.get(i)).collect()
    }
}

impl std::fmt::Debug for MapView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapView")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .field("resolution", &self.resolution)
            .finish()
    }
}

/// A pooled page plus the bookkeeping to hand out ranges from it
struct MapPage {
    start: usize,
    data: Arc<[AtomicF32]>,
    token: ReturnToken,
    used: usize,
}

impl MapPage {
    fn end(&self) -> usize {
        self.start + self.data.len()
    }
}

/// Append-only paged float storage for one tree
pub struct SharedMapBuffer {
    pages: Vec<MapPage>,
    page_size: usize,
    allocated: usize,
    diagnostics: Diagnostics,
}

impl SharedMapBuffer {
    pub fn new(page_size: usize, diagnostics: Diagnostics) -> Self {
        Self {
            pages: Vec::new(),
            page_size: page_size.max(1),
            allocated: 0,
            diagnostics,
        }
    }

    /// Reserve a fresh `resolution * resolution` range
    pub fn allocate(&mut self, pool: &mut BufferPool<AtomicF32>, resolution: u32) -> IndexAndResolution {
        let length = IndexAndResolution::new(0, resolution).length;

        if let Some(page) = self.pages.last_mut() {
            if page.used + length <= page.data.len() {
                let range = IndexAndResolution::new(page.start + page.used, resolution);
                page.used += length;
                self.allocated += length;
                return range;
            }
        }

        let start = self.pages.last().map(MapPage::end).unwrap_or(0);
        let (data, token) = pool.checkout(self.page_size.max(length));
        log::trace!(
            "Map buffer page {} at {} ({} floats)",
            self.pages.len(),
            start,
            data.len()
        );
        self.pages.push(MapPage { start, data, token, used: length });
        self.allocated += length;
        IndexAndResolution::new(start, resolution)
    }

    /// View of an allocated range, or `None` (reported) when the range is not
    /// wholly inside one page's allocated region
    pub fn view(&self, range: &IndexAndResolution) -> Option<MapView> {
        let page_idx = self.pages.partition_point(|p| p.start <= range.start_index);
        let page = page_idx.checked_sub(1).and_then(|i| self.pages.get(i));

        match page {
            Some(page) if range.end() <= page.start + page.used => Some(MapView {
                page: Arc::clone(&page.data),
                offset: range.start_index - page.start,
                len: range.length,
                resolution: range.resolution,
            }),
            _ => {
                self.diagnostics.report(
                    DiagnosticKind::OutOfRange,
                    format!(
                        "map range {}..{} is outside the allocated pages",
                        range.start_index,
                        range.end()
                    ),
                );
                None
            }
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Floats handed out across all pages
    pub fn allocated_len(&self) -> usize {
        self.allocated
    }
}

impl Disposable for SharedMapBuffer {
    fn dispose_returned(&mut self, pools: &mut BufferPools) {
        for page in self.pages.drain(..) {
            let MapPage { data, token, .. } = page;
            drop(data);
            pools.maps.release(token);
        }
        self.allocated = 0;
    }
}

impl Drop for SharedMapBuffer {
    fn drop(&mut self) {
        if !self.pages.is_empty() {
            log::warn!("Map buffer dropped with {} pages not returned to the pool", self.pages.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pools() -> BufferPools {
        BufferPools::new(Diagnostics::default())
    }

    #[test]
    fn test_remap_identity() {
        for i in 0..25 {
            assert_eq!(remap_index(i, 5, 5), i);
        }
    }

    #[test]
    fn test_remap_stays_in_range() {
        for (dest, source) in [(5u32, 3u32), (3, 5), (1, 9), (9, 1), (17, 4), (2, 2), (64, 7)] {
            let source_len = (source * source) as usize;
            for i in 0..(dest * dest) as usize {
                assert!(remap_index(i, dest, source) < source_len, "{} {} {}", i, dest, source);
            }
        }
    }

    #[test]
    fn test_remap_corners_align() {
        // 5x5 onto 3x3: corners map to corners, center to center
        assert_eq!(remap_index(0, 5, 3), 0);
        assert_eq!(remap_index(4, 5, 3), 2);
        assert_eq!(remap_index(20, 5, 3), 6);
        assert_eq!(remap_index(24, 5, 3), 8);
        assert_eq!(remap_index(12, 5, 3), 4);
        // Single-sample destination reads the source center
        assert_eq!(remap_index(0, 1, 5), 12);
        // Single-sample source is read everywhere
        assert_eq!(remap_index(7, 4, 1), 0);
    }

    #[test]
    fn test_allocations_are_disjoint() {
        let mut pools = pools();
        let mut buffer = SharedMapBuffer::new(64, Diagnostics::default());
        let ranges: Vec<_> = [3u32, 5, 8, 2, 7, 1, 4]
            .iter()
            .map(|&r| buffer.allocate(&mut pools.maps, r))
            .collect();

        for (i, a) in ranges.iter().enumerate() {
            assert_eq!(a.length, (a.resolution * a.resolution) as usize);
            for b in &ranges[i + 1..] {
                assert!(!a.overlaps(b), "{:?} overlaps {:?}", a, b);
            }
            assert!(buffer.view(a).is_some());
        }
        buffer.dispose_returned(&mut pools);
        assert_eq!(pools.maps.checked_out(), 0);
    }

    #[test]
    fn test_oversized_range_gets_own_page() {
        let mut pools = pools();
        let mut buffer = SharedMapBuffer::new(16, Diagnostics::default());
        let small = buffer.allocate(&mut pools.maps, 2);
        let large = buffer.allocate(&mut pools.maps, 10);
        assert_eq!(buffer.page_count(), 2);

        let view = buffer.view(&large).unwrap();
        assert_eq!(view.len(), 100);
        view.set(99, 7.0);
        assert_eq!(view.get(99), 7.0);
        assert!(!small.overlaps(&large));
        buffer.dispose_returned(&mut pools);
    }

    #[test]
    fn test_views_share_storage() {
        let mut pools = pools();
        let mut buffer = SharedMapBuffer::new(64, Diagnostics::default());
        let range = buffer.allocate(&mut pools.maps, 3);

        let writer = buffer.view(&range).unwrap();
        let reader = buffer.view(&range).unwrap();
        writer.set(4, 2.5);
        assert_eq!(reader.get(4), 2.5);
        assert_eq!(reader.try_get(9), None);
        drop((writer, reader));
        buffer.dispose_returned(&mut pools);
    }

    #[test]
    fn test_view_reads_from_start_index() {
        let mut pools = pools();
        let mut buffer = SharedMapBuffer::new(64, Diagnostics::default());
        let first = buffer.allocate(&mut pools.maps, 2);
        let second = buffer.allocate(&mut pools.maps, 3);
        assert_eq!(second.start_index, 4);

        let a = buffer.view(&first).unwrap();
        let b = buffer.view(&second).unwrap();
        for i in 0..a.len() {
            a.set(i, 1.0);
        }
        b.set(0, 5.0);
        assert_eq!(a.get(3), 1.0);
        assert_eq!(b.get(0), 5.0);
        assert_eq!(b.get(1), 0.0);
        assert_eq!(b.len(), 9);
        drop((a, b));
        buffer.dispose_returned(&mut pools);
    }

    #[test]
    fn test_unallocated_range_reported() {
        let diagnostics = Diagnostics::default();
        let mut pools = pools();
        let mut buffer = SharedMapBuffer::new(64, diagnostics.clone());
        buffer.allocate(&mut pools.maps, 2);

        assert!(buffer.view(&IndexAndResolution::new(2, 4)).is_none());
        assert_eq!(diagnostics.count(DiagnosticKind::OutOfRange), 1);
        buffer.dispose_returned(&mut pools);
    }
}
