use crate::error::{GraphError, GraphResult};
use crate::ir::{Graph, Node};

use super::MemoryBinding;

/// Checks `node` against its kind's arity and that every connector it touches
/// is bound with the declared type and shape.
pub fn validate_node(graph: &Graph, binding: &dyn MemoryBinding, node: &Node) -> GraphResult<()> {
    let kind = node.kind();
    for (role, arity, found) in [
        ("inputs", kind.input_arity(), node.inputs.len()),
        ("outputs", kind.output_arity(), node.outputs.len()),
    ] {
        if !arity.accepts(found) {
            return Err(GraphError::Arity {
                node: node.id,
                kind,
                role,
                expected: arity.to_string(),
                found,
            });
        }
    }
    for id in node.inputs.iter().chain(node.outputs.iter()) {
        let connector = graph.connector(*id)?;
        let alloc = binding.memory_at(*id).ok_or(GraphError::UnboundConnector(*id))?;
        if alloc.dtype() != connector.dtype || alloc.shape != connector.shape {
            return Err(GraphError::BindingMismatch {
                connector: *id,
                declared: connector.dtype,
                declared_shape: connector.shape.to_vec(),
                bound: alloc.dtype(),
                bound_shape: alloc.shape.to_vec(),
            });
        }
        if alloc.strides.len() != alloc.shape.len() {
            return Err(GraphError::Memory(format!(
                "connector {id} is bound with {} strides for rank {}",
                alloc.strides.len(),
                alloc.shape.len()
            )));
        }
    }
    Ok(())
}
