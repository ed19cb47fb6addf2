//! Level of detail helpers for the chunk quadtree
//!
//! Every quadtree level doubles the chunk size: a chunk at lod `n` covers the
//! same square as its four children at lod `n - 1`. A chunk splits while a
//! viewer is closer than half its size.

/// World size of a chunk at `lod`
///
/// # Examples
/// ```
/// use terragraph::streaming::lod::chunk_size_at_lod;
///
/// assert_eq!(chunk_size_at_lod(64.0, 0), 64.0);
/// assert_eq!(chunk_size_at_lod(64.0, 1), 128.0);
/// assert_eq!(chunk_size_at_lod(64.0, 4), 1024.0);
/// ```
pub fn chunk_size_at_lod(base_size: f32, lod: u32) -> f32 {
    base_size * (1u64 << lod.min(62)) as f32
}

/// Viewer distance below which a chunk of `chunk_size` splits
///
/// # Examples
/// ```
/// use terragraph::streaming::lod::split_distance;
///
/// assert_eq!(split_distance(1000.0), 500.0);
/// ```
pub fn split_distance(chunk_size: f32) -> f32 {
    chunk_size * 0.5
}

/// Whether a chunk at `lod` and `distance` from the nearest viewer splits
///
/// # Examples
/// ```
/// use terragraph::streaming::lod::should_split;
///
/// assert!(should_split(499.0, 1000.0, 1));
/// assert!(!should_split(500.0, 1000.0, 1));
/// assert!(!should_split(0.0, 1000.0, 0)); // finest level never splits
/// ```
pub fn should_split(distance: f32, chunk_size: f32, lod: u32) -> bool {
    lod > 0 && distance < split_distance(chunk_size)
}

/// Lod the quadtree settles at for a viewer `distance` away, below `root_lod`
///
/// # Examples
/// ```
/// use terragraph::streaming::lod::lod_for_distance;
///
/// assert_eq!(lod_for_distance(0.0, 64.0, 4), 0);
/// assert_eq!(lod_for_distance(40.0, 64.0, 4), 0);
/// assert_eq!(lod_for_distance(100.0, 64.0, 4), 1);
/// assert_eq!(lod_for_distance(200.0, 64.0, 4), 2);
/// assert_eq!(lod_for_distance(10_000.0, 64.0, 4), 4);
/// ```
pub fn lod_for_distance(distance: f32, base_size: f32, root_lod: u32) -> u32 {
    let mut lod = root_lod;
    while should_split(distance, chunk_size_at_lod(base_size, lod), lod) {
        lod -= 1;
    }
    lod
}
