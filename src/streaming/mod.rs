//! Quadtree chunk streaming around viewers

pub mod lod;
pub mod sink;
pub mod controller;

pub use lod::{chunk_size_at_lod, lod_for_distance, should_split, split_distance};
pub use sink::{ChunkSink, RecordingSink, SinkEntry};
pub use controller::{ChunkController, ChunkNode, ChunkState};
