use serde::{Deserialize, Serialize};

use super::ops::{BinaryOp, UnaryOp};

/// One scalar step of a fused elementwise body. Operands refer to earlier
/// entries of [`FusedSubgraph::nodes`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FusedNode {
    /// The element being processed.
    Input,
    Constant {
        value: f32,
    },
    Unary {
        op: UnaryOp,
        input: usize,
    },
    Binary {
        op: BinaryOp,
        lhs: usize,
        rhs: usize,
    },
    Clamp {
        input: usize,
        low: usize,
        high: usize,
    },
}

/// Elementwise subgraph carried by a fused-unary node, in topological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedSubgraph {
    pub nodes: Vec<FusedNode>,
    pub output: usize,
}

impl FusedSubgraph {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            output: 0,
        }
    }

    fn push(&mut self, node: FusedNode) -> usize {
        self.nodes.push(node);
        self.output = self.nodes.len() - 1;
        self.output
    }

    pub fn input(&mut self) -> usize {
        self.push(FusedNode::Input)
    }

    pub fn constant(&mut self, value: f32) -> usize {
        self.push(FusedNode::Constant { value })
    }

    pub fn unary(&mut self, op: UnaryOp, input: usize) -> usize {
        self.push(FusedNode::Unary { op, input })
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: usize, rhs: usize) -> usize {
        self.push(FusedNode::Binary { op, lhs, rhs })
    }

    pub fn clamp(&mut self, input: usize, low: usize, high: usize) -> usize {
        self.push(FusedNode::Clamp { input, low, high })
    }

    /// Last pushed node becomes the result unless overridden here.
    pub fn with_output(mut self, output: usize) -> Self {
        self.output = output;
        self
    }
}

impl Default for FusedSubgraph {
    fn default() -> Self {
        Self::new()
    }
}
