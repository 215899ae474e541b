use nnvm::ir::{reduced_shape, ReduceOp, ReduceWindow2dAttrs};
use nnvm::tensor::{default_strides, linear_offset, windowed_output_size, IndexIter};
use nnvm::{DataType, KernelError, KernelResult, TensorView, TensorViewMut};
use smallvec::SmallVec;

use crate::util::{expect_dtype, expect_shape, rank4};

#[inline]
fn combine(op: ReduceOp, acc: f32, value: f32) -> f32 {
    match op {
        ReduceOp::Mean | ReduceOp::Sum => acc + value,
        ReduceOp::Min => libm::fminf(acc, value),
        ReduceOp::Max => libm::fmaxf(acc, value),
        ReduceOp::Prod => acc * value,
    }
}

/// Folds `input` over `axes` starting from `init_value`. With `keep_dims`
/// the reduced axes stay as size 1, otherwise they are dropped; the values
/// are the same either way.
pub fn reduce(
    op: ReduceOp,
    input: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    axes: &[usize],
    init_value: f32,
    keep_dims: bool,
) -> KernelResult<()> {
    expect_dtype("reduce", input.dtype(), DataType::Float32)?;
    expect_dtype("reduce", output.dtype(), DataType::Float32)?;
    let rank = input.rank();
    if let Some(axis) = axes.iter().find(|axis| **axis >= rank) {
        return Err(KernelError::shape(
            "reduce",
            format!("axis {axis} out of range for rank {rank}"),
        ));
    }
    if let Some((position, axis)) = axes
        .iter()
        .enumerate()
        .find(|(position, axis)| axes[..*position].contains(*axis))
    {
        return Err(KernelError::shape(
            "reduce",
            format!("axis {axis} repeated at position {position} of {axes:?}"),
        ));
    }
    let out_shape = reduced_shape(input.shape(), axes, keep_dims);
    expect_shape("reduce", output.shape(), &out_shape)?;

    // accumulate over the keep_dims shape so both layouts share one walk
    let kept = reduced_shape(input.shape(), axes, true);
    let kept_strides = default_strides(&kept);
    let mut acc = vec![init_value; kept.iter().product::<usize>()];
    let mut reduced_count = 1usize;
    for axis in axes {
        reduced_count *= input.shape()[*axis];
    }

    for index in IndexIter::new(input.shape()) {
        let mut slot: SmallVec<[usize; 4]> = index.clone();
        for axis in axes {
            slot[*axis] = 0;
        }
        let position = linear_offset(&slot, &kept_strides);
        acc[position] = combine(op, acc[position], input.read::<f32>(&index));
    }

    if op == ReduceOp::Mean && reduced_count > 0 {
        for value in &mut acc {
            *value /= reduced_count as f32;
        }
    }

    for (position, index) in IndexIter::new(&out_shape).enumerate() {
        output.write(&index, acc[position]);
    }
    Ok(())
}

/// Sliding-window reduce over the H and W axes of an NCHW tensor. Mean
/// divides by the number of in-bounds taps.
pub fn reduce_window2d(
    input: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    attrs: &ReduceWindow2dAttrs,
) -> KernelResult<()> {
    const OP: &str = "reduce_window2d";
    expect_dtype(OP, input.dtype(), DataType::Float32)?;
    expect_dtype(OP, output.dtype(), DataType::Float32)?;
    let [n, c, h, w] = rank4(OP, input.shape(), "input")?;
    let out_h = windowed_output_size(h, attrs.filter_h, attrs.stride_h, attrs.dilation_h, attrs.padding_h)
        .ok_or_else(|| KernelError::shape(OP, "window does not fit the input height"))?;
    let out_w = windowed_output_size(w, attrs.filter_w, attrs.stride_w, attrs.dilation_w, attrs.padding_w)
        .ok_or_else(|| KernelError::shape(OP, "window does not fit the input width"))?;
    expect_shape(OP, output.shape(), &[n, c, out_h, out_w])?;

    for batch in 0..n {
        for channel in 0..c {
            for oy in 0..out_h {
                let origin_y = (oy * attrs.stride_h) as i64 - attrs.padding_h.before as i64;
                for ox in 0..out_w {
                    let origin_x = (ox * attrs.stride_w) as i64 - attrs.padding_w.before as i64;
                    let mut acc = attrs.init_value;
                    let mut taps = 0usize;
                    for ky in 0..attrs.filter_h {
                        let iy = origin_y + (ky * attrs.dilation_h) as i64;
                        if iy < 0 || iy >= h as i64 {
                            continue;
                        }
                        for kx in 0..attrs.filter_w {
                            let ix = origin_x + (kx * attrs.dilation_w) as i64;
                            if ix < 0 || ix >= w as i64 {
                                continue;
                            }
                            let value = input.read::<f32>(&[batch, channel, iy as usize, ix as usize]);
                            acc = combine(attrs.op, acc, value);
                            taps += 1;
                        }
                    }
                    if attrs.op == ReduceOp::Mean && taps > 0 {
                        acc /= taps as f32;
                    }
                    output.write(&[batch, channel, oy, ox], attrs.activation.apply(acc));
                }
            }
        }
    }
    Ok(())
}
