//! One evaluator per operator kind. Each only resolves attributes and operand
//! views and forwards them to `nnvm_kernels`.

use nnvm::ir::{Node, OpKind, Operation, ResizeMode};
use nnvm::nnil::compile_fused_body;
use nnvm::GraphError;
use nnvm_kernels as kernels;

use crate::context::EvalContext;
use crate::error::EvalCause;
use crate::registry::{EvaluatorFn, EvaluatorRegistryBuilder};

type EvalStep = Result<(), EvalCause>;

fn mismatch(node: &Node, expected: OpKind) -> EvalCause {
    EvalCause::Graph(GraphError::InvalidNode {
        node: node.id,
        kind: node.kind(),
        detail: format!("dispatched to the {expected} evaluator"),
    })
}

/// Registers the reference evaluator for every [`OpKind`].
pub fn register_neutral_evaluators(builder: &mut EvaluatorRegistryBuilder) -> Result<(), GraphError> {
    let table: [(OpKind, EvaluatorFn); 26] = [
        (OpKind::Input, eval_noop),
        (OpKind::Output, eval_noop),
        (OpKind::Constant, eval_noop),
        (OpKind::Ignore, eval_noop),
        (OpKind::Binary, eval_binary),
        (OpKind::Unary, eval_unary),
        (OpKind::Conv2d, eval_conv2d),
        (OpKind::Conv2dTranspose, eval_conv2d_transpose),
        (OpKind::Matmul, eval_matmul),
        (OpKind::Pad, eval_pad),
        (OpKind::Slice, eval_slice),
        (OpKind::Transpose, eval_transpose),
        (OpKind::Concat, eval_concat),
        (OpKind::Reduce, eval_reduce),
        (OpKind::ReduceWindow2d, eval_reduce_window2d),
        (OpKind::Quantize, eval_quantize),
        (OpKind::Dequantize, eval_dequantize),
        (OpKind::ResizeImage, eval_resize_image),
        (OpKind::Gather, eval_gather),
        (OpKind::GatherNd, eval_gather_nd),
        (OpKind::Bitcast, eval_bitcast),
        (OpKind::Clamp, eval_clamp),
        (OpKind::Convert, eval_convert),
        (OpKind::FusedUnary, eval_fused_unary),
        (OpKind::BatchToSpace, eval_batch_to_space),
        (OpKind::TableLookup1d, eval_table_lookup1d),
    ];
    for (kind, evaluator) in table {
        builder.register(kind, evaluator)?;
    }
    Ok(())
}

/// Binding-only nodes carry no computation.
fn eval_noop(_: &Node, _: &mut EvalContext<'_>) -> EvalStep {
    Ok(())
}

fn eval_binary(node: &Node, ctx: &mut EvalContext<'_>) -> EvalStep {
    let Operation::Binary { op, activation } = node.op else {
        return Err(mismatch(node, OpKind::Binary));
    };
    ctx.with_tensors(node, |inputs, output| {
        kernels::binary(op, &inputs[0], &inputs[1], output, activation)
    })
}

fn eval_unary(node: &Node, ctx: &mut EvalContext<'_>) -> EvalStep {
    let Operation::Unary { op } = node.op else {
        return Err(mismatch(node, OpKind::Unary));
    };
    ctx.with_tensors(node, |inputs, output| kernels::unary(op, &inputs[0], output))
}

fn eval_conv2d(node: &Node, ctx: &mut EvalContext<'_>) -> EvalStep {
    let Operation::Conv2d(attrs) = &node.op else {
        return Err(mismatch(node, OpKind::Conv2d));
    };
    ctx.with_tensors(node, |inputs, output| {
        kernels::conv2d(&inputs[0], &inputs[1], &inputs[2], output, attrs)
    })
}

fn eval_conv2d_transpose(node: &Node, ctx: &mut EvalContext<'_>) -> EvalStep {
    let Operation::Conv2dTranspose(attrs) = &node.op else {
        return Err(mismatch(node, OpKind::Conv2dTranspose));
    };
    ctx.with_tensors(node, |inputs, output| {
        kernels::conv2d_transpose(&inputs[0], &inputs[1], &inputs[2], output, attrs)
    })
}

fn eval_matmul(node: &Node, ctx: &mut EvalContext<'_>) -> EvalStep {
    let Operation::Matmul { activation } = node.op else {
        return Err(mismatch(node, OpKind::Matmul));
    };
    ctx.with_tensors(node, |inputs, output| {
        kernels::matmul(&inputs[0], &inputs[1], &inputs[2], output, activation)
    })
}

fn eval_pad(node: &Node, ctx: &mut EvalContext<'_>) -> EvalStep {
    let Operation::Pad {
        paddings,
        mode,
        pad_value,
    } = &node.op
    else {
        return Err(mismatch(node, OpKind::Pad));
    };
    ctx.with_tensors(node, |inputs, output| {
        kernels::pad(&inputs[0], output, paddings, *mode, *pad_value)
    })
}

fn eval_slice(node: &Node, ctx: &mut EvalContext<'_>) -> EvalStep {
    let Operation::Slice { begin, end, strides } = &node.op else {
        return Err(mismatch(node, OpKind::Slice));
    };
    ctx.with_tensors(node, |inputs, output| {
        kernels::slice(&inputs[0], output, begin, end, strides)
    })
}

fn eval_transpose(node: &Node, ctx: &mut EvalContext<'_>) -> EvalStep {
    let Operation::Transpose { perm } = &node.op else {
        return Err(mismatch(node, OpKind::Transpose));
    };
    ctx.with_tensors(node, |inputs, output| kernels::transpose(&inputs[0], output, perm))
}

fn eval_concat(node: &Node, ctx: &mut EvalContext<'_>) -> EvalStep {
    let Operation::Concat { axis } = node.op else {
        return Err(mismatch(node, OpKind::Concat));
    };
    ctx.with_tensors(node, |inputs, output| kernels::concat(inputs, output, axis))
}

fn eval_reduce(node: &Node, ctx: &mut EvalContext<'_>) -> EvalStep {
    let Operation::Reduce {
        op,
        axes,
        init_value,
        keep_dims,
    } = &node.op
    else {
        return Err(mismatch(node, OpKind::Reduce));
    };
    ctx.with_tensors(node, |inputs, output| {
        kernels::reduce(*op, &inputs[0], output, axes, *init_value, *keep_dims)
    })
}

fn eval_reduce_window2d(node: &Node, ctx: &mut EvalContext<'_>) -> EvalStep {
    let Operation::ReduceWindow2d(attrs) = &node.op else {
        return Err(mismatch(node, OpKind::ReduceWindow2d));
    };
    ctx.with_tensors(node, |inputs, output| kernels::reduce_window2d(&inputs[0], output, attrs))
}

fn eval_quantize(node: &Node, ctx: &mut EvalContext<'_>) -> EvalStep {
    let Operation::Quantize { param } = node.op else {
        return Err(mismatch(node, OpKind::Quantize));
    };
    ctx.with_tensors(node, |inputs, output| kernels::quantize(&inputs[0], output, param))
}

fn eval_dequantize(node: &Node, ctx: &mut EvalContext<'_>) -> EvalStep {
    let Operation::Dequantize { param } = node.op else {
        return Err(mismatch(node, OpKind::Dequantize));
    };
    ctx.with_tensors(node, |inputs, output| kernels::dequantize(&inputs[0], output, param))
}

fn eval_resize_image(node: &Node, ctx: &mut EvalContext<'_>) -> EvalStep {
    let Operation::ResizeImage {
        mode,
        new_size,
        align_corners,
        half_pixel_centers,
    } = node.op
    else {
        return Err(mismatch(node, OpKind::ResizeImage));
    };
    ctx.with_tensors(node, |inputs, output| match mode {
        ResizeMode::Bilinear => {
            kernels::resize_bilinear(&inputs[0], output, new_size, align_corners, half_pixel_centers)
        }
        ResizeMode::NearestNeighbor => {
            kernels::resize_nearest(&inputs[0], output, new_size, align_corners, half_pixel_centers)
        }
    })
}

fn eval_gather(node: &Node, ctx: &mut EvalContext<'_>) -> EvalStep {
    let Operation::Gather { axis } = node.op else {
        return Err(mismatch(node, OpKind::Gather));
    };
    ctx.with_tensors(node, |inputs, output| kernels::gather(&inputs[0], &inputs[1], output, axis))
}

fn eval_gather_nd(node: &Node, ctx: &mut EvalContext<'_>) -> EvalStep {
    let Operation::GatherNd { batch_dims } = node.op else {
        return Err(mismatch(node, OpKind::GatherNd));
    };
    ctx.with_tensors(node, |inputs, output| {
        kernels::gather_nd(&inputs[0], &inputs[1], output, batch_dims)
    })
}

/// A bitcast aliased in row-major layout already holds the right bytes.
fn eval_bitcast(node: &Node, ctx: &mut EvalContext<'_>) -> EvalStep {
    let (Some(input), Some(output)) = (node.inputs.first(), node.outputs.first()) else {
        return Err(mismatch(node, OpKind::Bitcast));
    };
    if ctx.allocation(*input)?.aliases_row_major(ctx.allocation(*output)?) {
        return Ok(());
    }
    ctx.with_tensors(node, |inputs, output| kernels::bitcast(&inputs[0], output))
}

fn eval_clamp(node: &Node, ctx: &mut EvalContext<'_>) -> EvalStep {
    ctx.with_tensors(node, |inputs, output| {
        kernels::clamp(&inputs[0], &inputs[1], &inputs[2], output)
    })
}

fn eval_convert(node: &Node, ctx: &mut EvalContext<'_>) -> EvalStep {
    ctx.with_tensors(node, |inputs, output| kernels::convert(&inputs[0], output))
}

/// The subgraph is compiled into a private body per node.
fn eval_fused_unary(node: &Node, ctx: &mut EvalContext<'_>) -> EvalStep {
    let Operation::FusedUnary { subgraph } = &node.op else {
        return Err(mismatch(node, OpKind::FusedUnary));
    };
    let body = compile_fused_body(node.id, subgraph)?;
    ctx.with_tensors(node, |inputs, output| {
        kernels::nnil_unary_method(&inputs[0], output, &body)
    })
}

fn eval_batch_to_space(node: &Node, ctx: &mut EvalContext<'_>) -> EvalStep {
    let Operation::BatchToSpace {
        block_h,
        block_w,
        crop_h,
        crop_w,
    } = node.op
    else {
        return Err(mismatch(node, OpKind::BatchToSpace));
    };
    ctx.with_tensors(node, |inputs, output| {
        kernels::batch_to_space(&inputs[0], output, block_h, block_w, crop_h, crop_w)
    })
}

fn eval_table_lookup1d(node: &Node, ctx: &mut EvalContext<'_>) -> EvalStep {
    ctx.with_tensors(node, |inputs, output| {
        kernels::table_lookup1d(&inputs[0], &inputs[1], output)
    })
}
