use nnvm::ir::Node;

use crate::error::EmitResult;
use crate::instruction::TensorFunction;

use super::EmitContext;

pub(super) fn emit_gather(node: &Node, axis: usize, ctx: &mut EmitContext<'_>) -> EmitResult<()> {
    let axis = ctx.small(axis, "axis")?;
    let (inputs, output) = ctx.node_operands(node)?;
    let &[input, indices] = inputs.as_slice() else {
        return Err(ctx.arity_error(inputs.len()));
    };
    ctx.text.tensor(TensorFunction::Gather {
        input,
        indices,
        output,
        axis,
    });
    Ok(())
}

pub(super) fn emit_gather_nd(node: &Node, batch_dims: usize, ctx: &mut EmitContext<'_>) -> EmitResult<()> {
    let batch_dims = ctx.small(batch_dims, "batch_dims")?;
    let (inputs, output) = ctx.node_operands(node)?;
    let &[input, indices] = inputs.as_slice() else {
        return Err(ctx.arity_error(inputs.len()));
    };
    ctx.text.tensor(TensorFunction::GatherNd {
        input,
        indices,
        output,
        batch_dims,
    });
    Ok(())
}
