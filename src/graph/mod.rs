//! Node graphs and their resumable evaluation
//!
//! A [`NodeGraph`] is authored (in code or from a [`GraphDescription`]),
//! amplified with helper nodes, and compiled into an immutable
//! [`CompiledGraph`]. Each request evaluates a subset of it inside a
//! [`TreeData`], polled until its outputs are cached.

pub mod branch;
pub mod compile;
pub mod description;
#[allow(clippy::module_inception)]
pub mod graph;
pub mod node;
pub mod nodes;
pub mod port;
pub mod presets;
pub mod tree;
pub mod value;

pub use branch::{BranchData, EngineServices, OutputKey, Pull, TrunkStore, ValueRangeCache};
pub use compile::{CompiledGraph, CompiledNode, InputLookup, InputSource};
pub use description::{GraphDescription, NodeRegistry};
pub use graph::{Amplifier, Edge, NodeGraph};
pub use node::{NodeId, NodeKind, NodeProcessor, OutputRole};
pub use port::{PortDirection, PortSpec, ValueKind};
pub use tree::{TreeData, TreeId, TreeState, TreeStore};
pub use value::{GraphValue, GridData, HeightData, MaskData, PointsData, ValueRange, VertexData};
