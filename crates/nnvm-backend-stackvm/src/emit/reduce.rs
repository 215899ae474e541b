use nnvm::ir::{Node, ReduceOp, ReduceWindow2dAttrs};

use crate::error::EmitResult;
use crate::instruction::{TensorFunction, WindowParams};

use super::EmitContext;

pub(super) fn emit_reduce(
    node: &Node,
    op: ReduceOp,
    axes: &[usize],
    init_value: f32,
    keep_dims: bool,
    ctx: &mut EmitContext<'_>,
) -> EmitResult<()> {
    let (inputs, output) = ctx.node_operands(node)?;
    let &[input] = inputs.as_slice() else {
        return Err(ctx.arity_error(inputs.len()));
    };
    let axes = ctx.dims(axes)?;
    ctx.text.tensor(TensorFunction::Reduce {
        op,
        input,
        output,
        axes,
        init_value,
        keep_dims,
    });
    Ok(())
}

pub(super) fn emit_reduce_window2d(
    node: &Node,
    attrs: &ReduceWindow2dAttrs,
    ctx: &mut EmitContext<'_>,
) -> EmitResult<()> {
    let (inputs, output) = ctx.node_operands(node)?;
    let &[input] = inputs.as_slice() else {
        return Err(ctx.arity_error(inputs.len()));
    };
    let params = WindowParams {
        op: attrs.op,
        init_value: attrs.init_value,
        filter_h: ctx.word(attrs.filter_h, "filter_h")?,
        filter_w: ctx.word(attrs.filter_w, "filter_w")?,
        stride_h: ctx.word(attrs.stride_h, "stride_h")?,
        stride_w: ctx.word(attrs.stride_w, "stride_w")?,
        dilation_h: ctx.word(attrs.dilation_h, "dilation_h")?,
        dilation_w: ctx.word(attrs.dilation_w, "dilation_w")?,
        paddings: ctx.paddings(&[attrs.padding_h, attrs.padding_w])?,
        activation: attrs.activation,
    };
    ctx.text.tensor(TensorFunction::ReduceWindow2d { input, output, params });
    Ok(())
}
