use nnvm::ir::{Conv2dAttrs, Node, ValueRange};

use crate::error::EmitResult;
use crate::instruction::{ConvParams, TensorFunction};

use super::EmitContext;

/// Shared by conv2d and its transpose; the records differ only in code.
pub(super) fn emit_conv2d(
    node: &Node,
    attrs: &Conv2dAttrs,
    transpose: bool,
    ctx: &mut EmitContext<'_>,
) -> EmitResult<()> {
    let (inputs, output) = ctx.node_operands(node)?;
    let &[input, weights, bias] = inputs.as_slice() else {
        return Err(ctx.arity_error(inputs.len()));
    };
    let params = ConvParams {
        groups: ctx.word(attrs.groups, "groups")?,
        stride_h: ctx.word(attrs.stride_h, "stride_h")?,
        stride_w: ctx.word(attrs.stride_w, "stride_w")?,
        dilation_h: ctx.word(attrs.dilation_h, "dilation_h")?,
        dilation_w: ctx.word(attrs.dilation_w, "dilation_w")?,
        paddings: ctx.paddings(&[attrs.padding_h, attrs.padding_w])?,
        activation: attrs.activation,
    };
    let function = if transpose {
        TensorFunction::Conv2dTranspose {
            input,
            weights,
            bias,
            output,
            params,
        }
    } else {
        TensorFunction::Conv2d {
            input,
            weights,
            bias,
            output,
            params,
        }
    };
    ctx.text.tensor(function);
    Ok(())
}

pub(super) fn emit_matmul(node: &Node, activation: ValueRange, ctx: &mut EmitContext<'_>) -> EmitResult<()> {
    let (inputs, output) = ctx.node_operands(node)?;
    let &[lhs, rhs, bias] = inputs.as_slice() else {
        return Err(ctx.arity_error(inputs.len()));
    };
    ctx.text.tensor(TensorFunction::Matmul {
        lhs,
        rhs,
        bias,
        output,
        activation,
    });
    Ok(())
}
