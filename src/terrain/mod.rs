//! Chunk generation from node graphs

pub mod config;
pub mod chunk_data;
pub mod engine;
pub mod export;

pub use config::{EngineConfig, GenerationMode, MeshSettings, StreamingConfig, TerrainConfiguration};
pub use chunk_data::{ChunkData, TerrainVertex, TextureLayer};
pub use engine::{EngineStats, TerrainEngine};
pub use export::{ExportRequest, ExportedMap};
