//! Node port declarations

use serde::{Deserialize, Serialize};

/// Kind of value flowing along an edge
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// World-space XZ sample positions
    Grid,
    /// Scalar height map
    Height,
    /// Scalar 0..1 mask map
    Mask,
    /// Mesh vertex channels
    Vertices,
    /// Reference to a point generator
    Points,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

/// Static description of one port on a node type
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortSpec {
    pub name: &'static str,
    pub direction: PortDirection,
    pub kind: ValueKind,
    /// Inputs only: node is invalid when this is left unconnected
    pub required: bool,
}

impl PortSpec {
    pub const fn input(name: &'static str, kind: ValueKind) -> Self {
        Self { name, direction: PortDirection::Input, kind, required: true }
    }

    pub const fn optional_input(name: &'static str, kind: ValueKind) -> Self {
        Self { name, direction: PortDirection::Input, kind, required: false }
    }

    pub const fn output(name: &'static str, kind: ValueKind) -> Self {
        Self { name, direction: PortDirection::Output, kind, required: false }
    }

    pub fn is_input(&self) -> bool {
        self.direction == PortDirection::Input
    }
}

/// Ports of one node split by direction, in declaration order
#[derive(Clone, Debug, Default)]
pub struct PortTable {
    pub inputs: Vec<PortSpec>,
    pub outputs: Vec<PortSpec>,
}

impl PortTable {
    pub fn from_specs(specs: &[PortSpec]) -> Self {
        let (inputs, outputs) = specs.iter().copied().partition(|p| p.is_input());
        Self { inputs, outputs }
    }

    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|p| p.name == name)
    }

    pub fn output_index(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|p| p.name == name)
    }
}
