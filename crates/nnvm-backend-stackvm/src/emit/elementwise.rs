use nnvm::ir::{BinaryOp, Node, UnaryOp, ValueRange};

use crate::error::EmitResult;
use crate::instruction::TensorFunction;

use super::EmitContext;

pub(super) fn emit_binary(
    node: &Node,
    op: BinaryOp,
    activation: ValueRange,
    ctx: &mut EmitContext<'_>,
) -> EmitResult<()> {
    let (inputs, output) = ctx.node_operands(node)?;
    let &[lhs, rhs] = inputs.as_slice() else {
        return Err(ctx.arity_error(inputs.len()));
    };
    ctx.text.tensor(TensorFunction::Binary {
        op,
        lhs,
        rhs,
        output,
        activation,
    });
    Ok(())
}

pub(super) fn emit_unary(node: &Node, op: UnaryOp, ctx: &mut EmitContext<'_>) -> EmitResult<()> {
    let (inputs, output) = ctx.node_operands(node)?;
    let &[input] = inputs.as_slice() else {
        return Err(ctx.arity_error(inputs.len()));
    };
    ctx.text.tensor(TensorFunction::Unary { op, input, output });
    Ok(())
}

pub(super) fn emit_clamp(node: &Node, ctx: &mut EmitContext<'_>) -> EmitResult<()> {
    let (inputs, output) = ctx.node_operands(node)?;
    let &[input, low, high] = inputs.as_slice() else {
        return Err(ctx.arity_error(inputs.len()));
    };
    ctx.text.tensor(TensorFunction::Clamp {
        input,
        low,
        high,
        output,
    });
    Ok(())
}

/// The NNIL body was compiled during validation with a builder of its own.
pub(super) fn emit_fused_unary(node: &Node, ctx: &mut EmitContext<'_>) -> EmitResult<()> {
    let body = ctx.fused_body()?;
    ctx.word(body.len(), "nnil body length")?;
    let (inputs, output) = ctx.node_operands(node)?;
    let &[input] = inputs.as_slice() else {
        return Err(ctx.arity_error(inputs.len()));
    };
    ctx.text.tensor(TensorFunction::FusedUnary { input, output, body });
    Ok(())
}
