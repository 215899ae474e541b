use nnvm::ir::{NodeId, OpKind};
use nnvm::GraphError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmitError {
    /// The graph or its binding is malformed; raised before any instruction
    /// is written.
    #[error("node {node}: {source}")]
    Graph {
        node: NodeId,
        #[source]
        source: GraphError,
    },
    /// A node is valid but does not fit the instruction encoding.
    #[error("node {node} ({kind}) cannot be encoded: {detail}")]
    Encoding {
        node: NodeId,
        kind: OpKind,
        detail: String,
    },
    #[error("manifest serialization failed: {0}")]
    Manifest(#[from] serde_json::Error),
}

impl EmitError {
    pub fn node(&self) -> Option<NodeId> {
        match self {
            EmitError::Graph { node, .. } | EmitError::Encoding { node, .. } => Some(*node),
            EmitError::Manifest(_) => None,
        }
    }
}

pub type EmitResult<T> = Result<T, EmitError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("truncated input at byte {offset}")]
    Truncated { offset: usize },
    #[error("unknown opcode {opcode:#04x} at byte {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },
    #[error("unknown tensor function {code:#06x} at byte {offset}")]
    UnknownFunction { code: u16, offset: usize },
    #[error("invalid {field} at byte {offset}")]
    InvalidField { field: &'static str, offset: usize },
    #[error("malformed container: {0}")]
    Container(String),
}
