use smallvec::smallvec;

use crate::error::{GraphError, GraphResult};
use crate::tensor::{broadcast_shape, windowed_output_size, Dims, Padding};

use super::ops::{OpKind, Operation};

fn fail(kind: OpKind, detail: impl Into<String>) -> GraphError {
    GraphError::ShapeInference {
        kind,
        detail: detail.into(),
    }
}

fn operand(kind: OpKind, shapes: &[Dims], index: usize) -> GraphResult<&Dims> {
    shapes
        .get(index)
        .ok_or_else(|| fail(kind, format!("missing operand {index}")))
}

fn rank4(kind: OpKind, shape: &Dims, what: &str) -> GraphResult<[usize; 4]> {
    match shape.as_slice() {
        [n, c, h, w] => Ok([*n, *c, *h, *w]),
        other => Err(fail(kind, format!("{what} must be rank 4, got {other:?}"))),
    }
}

fn padded(kind: OpKind, size: usize, padding: Padding) -> GraphResult<usize> {
    let value = size as i64 + padding.sum();
    if value < 0 {
        return Err(fail(kind, format!("padding {padding:?} exceeds extent {size}")));
    }
    Ok(value as usize)
}

fn window(
    kind: OpKind,
    size: usize,
    filter: usize,
    stride: usize,
    dilation: usize,
    padding: Padding,
) -> GraphResult<usize> {
    windowed_output_size(size, filter, stride, dilation, padding).ok_or_else(|| {
        fail(
            kind,
            format!("window {filter} (stride {stride}, dilation {dilation}) does not fit extent {size}"),
        )
    })
}

/// Output shape of a single-output operator from its operand shapes.
pub fn infer_output_shape(op: &Operation, shapes: &[Dims]) -> GraphResult<Dims> {
    let kind = op.kind();
    match op {
        Operation::Input
        | Operation::Output
        | Operation::Constant { .. }
        | Operation::Ignore
        | Operation::Bitcast => Err(fail(kind, "output shape must be given explicitly")),
        Operation::Binary { .. } => {
            let lhs = operand(kind, shapes, 0)?;
            let rhs = operand(kind, shapes, 1)?;
            broadcast_shape(lhs, rhs)
                .ok_or_else(|| fail(kind, format!("{lhs:?} and {rhs:?} do not broadcast")))
        }
        Operation::Unary { .. }
        | Operation::Quantize { .. }
        | Operation::Dequantize { .. }
        | Operation::Clamp
        | Operation::Convert
        | Operation::FusedUnary { .. }
        | Operation::TableLookup1d => Ok(operand(kind, shapes, 0)?.clone()),
        Operation::Conv2d(attrs) => {
            let [n, _, h, w] = rank4(kind, operand(kind, shapes, 0)?, "input")?;
            let [oc, _, kh, kw] = rank4(kind, operand(kind, shapes, 1)?, "weights")?;
            Ok(smallvec![
                n,
                oc,
                window(kind, h, kh, attrs.stride_h, attrs.dilation_h, attrs.padding_h)?,
                window(kind, w, kw, attrs.stride_w, attrs.dilation_w, attrs.padding_w)?
            ])
        }
        Operation::Conv2dTranspose(attrs) => {
            let [n, _, h, w] = rank4(kind, operand(kind, shapes, 0)?, "input")?;
            let [oc, _, kh, kw] = rank4(kind, operand(kind, shapes, 1)?, "weights")?;
            let extent = |size: usize, filter: usize, stride: usize, dilation: usize, pad: Padding| {
                let full = (size as i64 - 1) * stride as i64 + (filter as i64 - 1) * dilation as i64 + 1;
                let value = full - pad.sum();
                if size == 0 || value <= 0 {
                    Err(fail(kind, format!("transposed extent of {size} is empty")))
                } else {
                    Ok(value as usize)
                }
            };
            Ok(smallvec![
                n,
                oc,
                extent(h, kh, attrs.stride_h, attrs.dilation_h, attrs.padding_h)?,
                extent(w, kw, attrs.stride_w, attrs.dilation_w, attrs.padding_w)?
            ])
        }
        Operation::Matmul { .. } => {
            let a = operand(kind, shapes, 0)?;
            let b = operand(kind, shapes, 1)?;
            match (a.as_slice(), b.as_slice()) {
                ([m, k0], [k1, n]) if k0 == k1 => Ok(smallvec![*m, *n]),
                _ => Err(fail(kind, format!("cannot multiply {a:?} by {b:?}"))),
            }
        }
        Operation::Pad { paddings, .. } => {
            let input = operand(kind, shapes, 0)?;
            if paddings.len() != input.len() {
                return Err(fail(kind, "one padding per axis required"));
            }
            input
                .iter()
                .zip(paddings.iter())
                .map(|(dim, pad)| padded(kind, *dim, *pad))
                .collect()
        }
        Operation::Slice {
            begin,
            end,
            strides,
        } => {
            let input = operand(kind, shapes, 0)?;
            if begin.len() != input.len() || end.len() != input.len() || strides.len() != input.len() {
                return Err(fail(kind, "begin/end/strides must match input rank"));
            }
            let mut out = Dims::new();
            for axis in 0..input.len() {
                out.push(slice_extent(begin[axis], end[axis], strides[axis]).ok_or_else(|| {
                    fail(kind, format!("stride 0 on axis {axis}"))
                })?);
            }
            Ok(out)
        }
        Operation::Transpose { perm } => {
            let input = operand(kind, shapes, 0)?;
            if perm.len() != input.len() || perm.iter().any(|axis| *axis >= input.len()) {
                return Err(fail(kind, format!("invalid permutation {perm:?}")));
            }
            Ok(perm.iter().map(|axis| input[*axis]).collect())
        }
        Operation::Concat { axis } => {
            let first = operand(kind, shapes, 0)?;
            if *axis >= first.len() {
                return Err(fail(kind, format!("axis {axis} out of range")));
            }
            let mut out = first.clone();
            out[*axis] = 0;
            for shape in shapes {
                if shape.len() != first.len()
                    || shape
                        .iter()
                        .zip(first.iter())
                        .enumerate()
                        .any(|(d, (a, b))| d != *axis && a != b)
                {
                    return Err(fail(kind, format!("{shape:?} does not concat with {first:?}")));
                }
                out[*axis] += shape[*axis];
            }
            Ok(out)
        }
        Operation::Reduce {
            axes, keep_dims, ..
        } => {
            let input = operand(kind, shapes, 0)?;
            if axes.iter().any(|axis| *axis >= input.len()) {
                return Err(fail(kind, format!("axes {axes:?} out of range")));
            }
            if axes.iter().enumerate().any(|(position, axis)| axes[..position].contains(axis)) {
                return Err(fail(kind, format!("axes {axes:?} repeat an axis")));
            }
            Ok(reduced_shape(input, axes, *keep_dims))
        }
        Operation::ReduceWindow2d(attrs) => {
            let [n, c, h, w] = rank4(kind, operand(kind, shapes, 0)?, "input")?;
            Ok(smallvec![
                n,
                c,
                window(kind, h, attrs.filter_h, attrs.stride_h, attrs.dilation_h, attrs.padding_h)?,
                window(kind, w, attrs.filter_w, attrs.stride_w, attrs.dilation_w, attrs.padding_w)?
            ])
        }
        Operation::ResizeImage { new_size, .. } => {
            let [n, c, _, _] = rank4(kind, operand(kind, shapes, 0)?, "input")?;
            Ok(smallvec![n, c, new_size[0], new_size[1]])
        }
        Operation::Gather { axis } => {
            let input = operand(kind, shapes, 0)?;
            let indices = operand(kind, shapes, 1)?;
            if *axis >= input.len() {
                return Err(fail(kind, format!("axis {axis} out of range")));
            }
            let mut out: Dims = input[..*axis].iter().copied().collect();
            out.extend(indices.iter().copied());
            out.extend(input[axis + 1..].iter().copied());
            Ok(out)
        }
        Operation::GatherNd { batch_dims } => {
            let input = operand(kind, shapes, 0)?;
            let indices = operand(kind, shapes, 1)?;
            let Some((&depth, prefix)) = indices.split_last() else {
                return Err(fail(kind, "indices must have rank >= 1"));
            };
            if *batch_dims > prefix.len() || batch_dims + depth > input.len() {
                return Err(fail(
                    kind,
                    format!("indices {indices:?} with batch_dims {batch_dims} cannot index {input:?}"),
                ));
            }
            let mut out: Dims = prefix.iter().copied().collect();
            out.extend(input[batch_dims + depth..].iter().copied());
            Ok(out)
        }
        Operation::BatchToSpace {
            block_h,
            block_w,
            crop_h,
            crop_w,
        } => {
            let [n, c, h, w] = rank4(kind, operand(kind, shapes, 0)?, "input")?;
            let block = block_h * block_w;
            if block == 0 || n % block != 0 {
                return Err(fail(kind, format!("batch {n} is not divisible by block {block}")));
            }
            let crop = |size: usize, pad: Padding| -> GraphResult<usize> {
                let value = size as i64 - pad.sum();
                if value < 0 || pad.before < 0 || pad.after < 0 {
                    return Err(fail(kind, format!("invalid crop {pad:?} for extent {size}")));
                }
                Ok(value as usize)
            };
            Ok(smallvec![
                n / block,
                c,
                crop(h * block_h, *crop_h)?,
                crop(w * block_w, *crop_w)?
            ])
        }
    }
}

/// Number of elements a strided slice selects on one axis.
pub fn slice_extent(begin: i32, end: i32, stride: i32) -> Option<usize> {
    if stride == 0 {
        return None;
    }
    let span = if stride > 0 {
        end as i64 - begin as i64
    } else {
        begin as i64 - end as i64
    };
    let step = (stride as i64).abs();
    Some(if span <= 0 {
        0
    } else {
        ((span + step - 1) / step) as usize
    })
}

pub fn reduced_shape(input: &[usize], axes: &[usize], keep_dims: bool) -> Dims {
    input
        .iter()
        .enumerate()
        .filter_map(|(axis, dim)| {
            if !axes.contains(&axis) {
                Some(*dim)
            } else if keep_dims {
                Some(1)
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Conv2dAttrs, ReduceOp};

    fn dims(values: &[usize]) -> Dims {
        values.iter().copied().collect()
    }

    #[test]
    fn conv_output_follows_window_geometry() {
        let attrs = Conv2dAttrs {
            padding_h: Padding::new(1, 1),
            padding_w: Padding::new(1, 1),
            stride_h: 2,
            stride_w: 2,
            ..Conv2dAttrs::default()
        };
        let shape = infer_output_shape(
            &Operation::Conv2d(attrs),
            &[dims(&[1, 3, 8, 8]), dims(&[4, 3, 3, 3]), dims(&[4])],
        )
        .expect("infer");
        assert_eq!(shape.as_slice(), &[1, 4, 4, 4]);

        let shape = infer_output_shape(
            &Operation::Conv2dTranspose(attrs),
            &[dims(&[1, 4, 4, 4]), dims(&[3, 4, 3, 3]), dims(&[3])],
        )
        .expect("infer");
        assert_eq!(shape.as_slice(), &[1, 3, 7, 7]);
    }

    #[test]
    fn reduce_keep_dims_controls_rank() {
        let op = |keep_dims| Operation::Reduce {
            op: ReduceOp::Sum,
            axes: vec![1],
            init_value: 0.0,
            keep_dims,
        };
        let input = [dims(&[2, 3, 4])];
        assert_eq!(infer_output_shape(&op(true), &input).expect("keep").as_slice(), &[2, 1, 4]);
        assert_eq!(infer_output_shape(&op(false), &input).expect("drop").as_slice(), &[2, 4]);
    }

    #[test]
    fn reduce_rejects_repeated_axes() {
        let op = Operation::Reduce {
            op: ReduceOp::Mean,
            axes: vec![1, 1],
            init_value: 0.0,
            keep_dims: false,
        };
        let err = infer_output_shape(&op, &[dims(&[2, 3])]).unwrap_err();
        assert!(matches!(err, GraphError::ShapeInference { kind: OpKind::Reduce, .. }), "{err:?}");
    }

    #[test]
    fn gather_nd_shape_combines_prefix_and_block() {
        let shape = infer_output_shape(
            &Operation::GatherNd { batch_dims: 0 },
            &[dims(&[2, 2]), dims(&[2, 1])],
        )
        .expect("infer");
        assert_eq!(shape.as_slice(), &[2, 2]);
    }

    #[test]
    fn slice_extent_handles_negative_strides() {
        assert_eq!(slice_extent(0, 5, 2), Some(3));
        assert_eq!(slice_extent(4, -1, -1), Some(5));
        assert_eq!(slice_extent(3, 3, 1), Some(0));
        assert_eq!(slice_extent(0, 3, 0), None);
    }
}
