//! Terragraph - node-graph terrain generation with quadtree streaming

pub mod core;
pub mod math;
pub mod pool;
pub mod store;
pub mod awaitable;
pub mod graph;
pub mod points;
pub mod terrain;
pub mod streaming;

pub use graph::{GraphDescription, NodeGraph, NodeRegistry};
pub use streaming::{ChunkController, ChunkSink};
pub use terrain::{ChunkData, EngineConfig, MeshSettings, StreamingConfig, TerrainConfiguration, TerrainEngine};
