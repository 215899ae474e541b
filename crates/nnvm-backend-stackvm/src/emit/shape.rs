use nnvm::ir::{Node, PadMode, ResizeMode};
use nnvm::tensor::Padding;

use crate::error::EmitResult;
use crate::instruction::TensorFunction;

use super::EmitContext;

pub(super) fn emit_pad(
    node: &Node,
    paddings: &[Padding],
    mode: PadMode,
    pad_value: f32,
    ctx: &mut EmitContext<'_>,
) -> EmitResult<()> {
    let (inputs, output) = ctx.node_operands(node)?;
    let &[input] = inputs.as_slice() else {
        return Err(ctx.arity_error(inputs.len()));
    };
    let paddings = ctx.paddings(paddings)?;
    ctx.text.tensor(TensorFunction::Pad {
        input,
        output,
        paddings,
        mode,
        pad_value,
    });
    Ok(())
}

pub(super) fn emit_slice(
    node: &Node,
    begin: &[i32],
    end: &[i32],
    strides: &[i32],
    ctx: &mut EmitContext<'_>,
) -> EmitResult<()> {
    let (inputs, output) = ctx.node_operands(node)?;
    let &[input] = inputs.as_slice() else {
        return Err(ctx.arity_error(inputs.len()));
    };
    let begin = ctx.ints(begin)?;
    let end = ctx.ints(end)?;
    let strides = ctx.ints(strides)?;
    ctx.text.tensor(TensorFunction::Slice {
        input,
        output,
        begin,
        end,
        strides,
    });
    Ok(())
}

pub(super) fn emit_transpose(node: &Node, perm: &[usize], ctx: &mut EmitContext<'_>) -> EmitResult<()> {
    let (inputs, output) = ctx.node_operands(node)?;
    let &[input] = inputs.as_slice() else {
        return Err(ctx.arity_error(inputs.len()));
    };
    let perm = ctx.dims(perm)?;
    ctx.text.tensor(TensorFunction::Transpose { input, output, perm });
    Ok(())
}

pub(super) fn emit_concat(node: &Node, axis: usize, ctx: &mut EmitContext<'_>) -> EmitResult<()> {
    ctx.small(node.inputs.len(), "concat input count")?;
    let axis = ctx.small(axis, "axis")?;
    let (inputs, output) = ctx.node_operands(node)?;
    ctx.text.tensor(TensorFunction::Concat { inputs, output, axis });
    Ok(())
}

/// Nothing to emit when the output aliases the input in row-major layout.
pub(super) fn emit_bitcast(node: &Node, ctx: &mut EmitContext<'_>) -> EmitResult<()> {
    let (Some(source), Some(target)) = (node.inputs.first(), node.outputs.first()) else {
        return Err(ctx.arity_error(node.inputs.len()));
    };
    if ctx.allocation(*source)?.aliases_row_major(ctx.allocation(*target)?) {
        return Ok(());
    }
    let (inputs, output) = ctx.node_operands(node)?;
    let &[input] = inputs.as_slice() else {
        return Err(ctx.arity_error(inputs.len()));
    };
    ctx.text.tensor(TensorFunction::Bitcast { input, output });
    Ok(())
}

pub(super) fn emit_batch_to_space(
    node: &Node,
    block_h: usize,
    block_w: usize,
    crops: [Padding; 2],
    ctx: &mut EmitContext<'_>,
) -> EmitResult<()> {
    let (inputs, output) = ctx.node_operands(node)?;
    let &[input] = inputs.as_slice() else {
        return Err(ctx.arity_error(inputs.len()));
    };
    let block_h = ctx.word(block_h, "block_h")?;
    let block_w = ctx.word(block_w, "block_w")?;
    let crops = ctx.paddings(&crops)?;
    ctx.text.tensor(TensorFunction::BatchToSpace {
        input,
        output,
        block_h,
        block_w,
        crops,
    });
    Ok(())
}

pub(super) fn emit_resize_image(
    node: &Node,
    mode: ResizeMode,
    new_size: [usize; 2],
    align_corners: bool,
    half_pixel_centers: bool,
    ctx: &mut EmitContext<'_>,
) -> EmitResult<()> {
    let (inputs, output) = ctx.node_operands(node)?;
    let &[input] = inputs.as_slice() else {
        return Err(ctx.arity_error(inputs.len()));
    };
    let new_size = [ctx.word(new_size[0], "height")?, ctx.word(new_size[1], "width")?];
    ctx.text.tensor(TensorFunction::ResizeImage {
        mode,
        input,
        output,
        new_size,
        align_corners,
        half_pixel_centers,
    });
    Ok(())
}
