//! Node type and processor traits

use std::fmt;

use serde::{Deserialize, Serialize};

use super::branch::BranchData;
use super::graph::Amplifier;
use super::port::PortSpec;
use crate::points::PointGenerator;

/// Index of a node within its graph
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a node contributes to a finished chunk
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputRole {
    /// Produces the chunk mesh
    Height,
    /// Produces a named texture layer
    Texture,
}

/// A node type: its ports, parameters and how to evaluate it.
///
/// One `NodeKind` is shared by every tree; per-tree state lives in the
/// processor returned by [`create_processor`](NodeKind::create_processor).
pub trait NodeKind: Send + Sync + 'static {
    fn type_name(&self) -> &'static str;

    fn ports(&self) -> &'static [PortSpec];

    fn create_processor(&self, node: NodeId) -> Box<dyn NodeProcessor>;

    /// Insert helper nodes before compilation. Runs once per graph.
    fn amplify(&self, node: NodeId, amplifier: &mut Amplifier<'_>) {
        let _ = (node, amplifier);
    }

    fn point_generator(&self) -> Option<&dyn PointGenerator> {
        None
    }

    fn output_role(&self) -> Option<OutputRole> {
        None
    }
}

/// Per-tree evaluation state of one node.
///
/// The tree drives each processor through three phases:
/// `set_input_values` until it returns true, then `process` until it
/// returns true, then a single `cache_output_values`.
pub trait NodeProcessor: Send {
    /// Pull input values; false while any required input is still pending
    fn set_input_values(&mut self, branch: &mut BranchData<'_>) -> bool;

    /// Schedule or poll kernels; false while work is in flight
    fn process(&mut self, branch: &mut BranchData<'_>) -> bool;

    /// Publish finished values on output ports
    fn cache_output_values(&mut self, branch: &mut BranchData<'_>);
}
