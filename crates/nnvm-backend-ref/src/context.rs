use nnvm::ir::{ConnectorId, Graph, Node};
use nnvm::schedule::{BufferAllocation, MemoryBinding, MemoryPool};
use nnvm::{GraphError, KernelResult, TensorView, TensorViewMut};

use crate::error::EvalCause;
use crate::options::EvaluateOptions;

/// Everything an evaluator closure may touch while running one node.
pub struct EvalContext<'a> {
    pub graph: &'a Graph,
    pub binding: &'a dyn MemoryBinding,
    pub pool: &'a mut MemoryPool,
    pub options: &'a EvaluateOptions,
}

impl<'a> EvalContext<'a> {
    pub fn allocation(&self, connector: ConnectorId) -> Result<&'a BufferAllocation, GraphError> {
        self.binding
            .memory_at(connector)
            .ok_or(GraphError::UnboundConnector(connector))
    }

    /// Resolves the node's operands and hands their views to `kernel`.
    pub fn with_tensors<R>(
        &mut self,
        node: &Node,
        kernel: impl FnOnce(&[TensorView<'_>], &mut TensorViewMut<'_>) -> KernelResult<R>,
    ) -> Result<R, EvalCause> {
        let inputs = node
            .inputs
            .iter()
            .map(|connector| self.allocation(*connector))
            .collect::<Result<Vec<_>, _>>()?;
        let output_id = node.outputs.first().copied().ok_or_else(|| GraphError::InvalidNode {
            node: node.id,
            kind: node.kind(),
            detail: "node has no output to write".to_string(),
        })?;
        let output = self.allocation(output_id)?;
        let buffers = self.pool.node_buffers(&inputs, output)?;
        Ok(buffers.with_views(&inputs, output, kernel)?)
    }
}
