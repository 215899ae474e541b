use thiserror::Error;

use crate::ir::{ConnectorId, NodeId, OpKind};
use crate::tensor::DataType;

/// Failure raised by a kernel. Kernels never write partial garbage silently;
/// any of these aborts the pass that invoked them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KernelError {
    #[error("{op} does not support data type {dtype}")]
    UnsupportedType { op: &'static str, dtype: DataType },
    #[error("{op} is not implemented: {reason}")]
    Unsupported { op: &'static str, reason: String },
    #[error("{op}: shape mismatch: {detail}")]
    ShapeMismatch { op: &'static str, detail: String },
    #[error("{op}: index {index} out of bounds for axis of size {size}")]
    IndexOutOfBounds {
        op: &'static str,
        index: i64,
        size: usize,
    },
    #[error("{op}: invalid argument: {detail}")]
    InvalidArgument { op: &'static str, detail: String },
}

impl KernelError {
    pub fn unsupported_type(op: &'static str, dtype: DataType) -> Self {
        KernelError::UnsupportedType { op, dtype }
    }

    pub fn unsupported(op: &'static str, reason: impl Into<String>) -> Self {
        KernelError::Unsupported {
            op,
            reason: reason.into(),
        }
    }

    pub fn shape(op: &'static str, detail: impl Into<String>) -> Self {
        KernelError::ShapeMismatch {
            op,
            detail: detail.into(),
        }
    }

    pub fn invalid(op: &'static str, detail: impl Into<String>) -> Self {
        KernelError::InvalidArgument {
            op,
            detail: detail.into(),
        }
    }
}

pub type KernelResult<T> = Result<T, KernelError>;

/// The graph handed to a pass is malformed. These are integration errors and
/// are never recovered from.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("connector {0} has no memory binding")]
    UnboundConnector(ConnectorId),
    #[error("unknown connector {0}")]
    UnknownConnector(ConnectorId),
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("node {node} ({kind}) expects {expected} {role}, found {found}")]
    Arity {
        node: NodeId,
        kind: OpKind,
        role: &'static str,
        expected: String,
        found: usize,
    },
    #[error("connector {connector} is bound as {bound} {bound_shape:?} but declared {declared} {declared_shape:?}")]
    BindingMismatch {
        connector: ConnectorId,
        declared: DataType,
        declared_shape: Vec<usize>,
        bound: DataType,
        bound_shape: Vec<usize>,
    },
    #[error("node {node} ({kind}): {detail}")]
    InvalidNode {
        node: NodeId,
        kind: OpKind,
        detail: String,
    },
    #[error("cannot infer output of {kind}: {detail}")]
    ShapeInference { kind: OpKind, detail: String },
    #[error("no evaluator registered for {0}")]
    MissingEvaluator(OpKind),
    #[error("evaluator for {0} registered twice")]
    DuplicateEvaluator(OpKind),
    #[error("memory plan: {0}")]
    Memory(String),
}

pub type GraphResult<T> = Result<T, GraphError>;
