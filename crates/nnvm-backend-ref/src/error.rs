use nnvm::ir::{NodeId, OpKind};
use nnvm::{GraphError, KernelError};
use thiserror::Error;

/// What went wrong inside a single node.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalCause {
    #[error(transparent)]
    Kernel(#[from] KernelError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// A pass aborted at `node`. The attribute dump is captured eagerly so the
/// error outlives the graph.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("evaluation of node {node} `{name}` ({kind} {attributes}) failed: {source}")]
pub struct EvalError {
    pub node: NodeId,
    pub name: String,
    pub kind: OpKind,
    pub attributes: String,
    #[source]
    pub source: EvalCause,
}

impl EvalError {
    pub fn new(node: &nnvm::ir::Node, source: impl Into<EvalCause>) -> Self {
        Self {
            node: node.id,
            name: node.name.clone(),
            kind: node.kind(),
            attributes: node.op.describe_attributes(),
            source: source.into(),
        }
    }

    pub fn kernel_error(&self) -> Option<&KernelError> {
        match &self.source {
            EvalCause::Kernel(err) => Some(err),
            EvalCause::Graph(_) => None,
        }
    }

    pub fn graph_error(&self) -> Option<&GraphError> {
        match &self.source {
            EvalCause::Graph(err) => Some(err),
            EvalCause::Kernel(_) => None,
        }
    }
}

pub type EvalResult<T> = Result<T, EvalError>;
