//! Spatial point generation
//!
//! Point generator nodes place objects cell by cell on a fixed grid. Cells
//! are generated on demand when a region is queried, cached for the life of
//! the engine, and optionally snapped to the terrain by evaluating a
//! single-sample tree at each point.

pub mod generator;
pub mod instance;
pub mod manager;
pub mod sampling;
pub mod transform;

pub use generator::{PointGenerator, HEIGHT_PORT};
pub use instance::{PointInstance, PointInstanceId, PointKey};
pub use manager::{PointBatch, PointContext, PointManager, PointQuery};
pub use sampling::HeightSample;
pub use transform::{cell_of, hash_3d, PointRegion, PointTransform, MAX_CELL_RADIUS};
