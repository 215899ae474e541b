//! Index-driven selection. Every index is validated before the first byte is
//! copied, so a bad index never reads outside the source and leaves the output
//! untouched. Negative indices are out of bounds.

use nnvm::tensor::{default_strides, linear_offset, IndexIter};
use nnvm::{DataType, Dims, KernelError, KernelResult, TensorView, TensorViewMut};
use smallvec::smallvec;

use crate::util::{expect_dtype, expect_shape};

fn checked_index(op: &'static str, value: i32, size: usize) -> KernelResult<usize> {
    if value < 0 || value as usize >= size {
        return Err(KernelError::IndexOutOfBounds {
            op,
            index: value as i64,
            size,
        });
    }
    Ok(value as usize)
}

/// `output = input` with `axis` replaced by the full index tensor:
/// `out[pre.., idx.., post..] = input[pre.., indices[idx..], post..]`.
pub fn gather(
    input: &TensorView<'_>,
    indices: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    axis: usize,
) -> KernelResult<()> {
    const OP: &str = "gather";
    expect_dtype(OP, indices.dtype(), DataType::Int32)?;
    expect_dtype(OP, output.dtype(), input.dtype())?;
    if axis >= input.rank() {
        return Err(KernelError::shape(OP, format!("axis {axis} out of range for rank {}", input.rank())));
    }
    let mut expected = Dims::new();
    expected.extend_from_slice(&input.shape()[..axis]);
    expected.extend_from_slice(indices.shape());
    expected.extend_from_slice(&input.shape()[axis + 1..]);
    expect_shape(OP, output.shape(), &expected)?;

    let extent = input.shape()[axis];
    let resolved = indices
        .to_vec::<i32>()
        .into_iter()
        .map(|value| checked_index(OP, value, extent))
        .collect::<KernelResult<Vec<_>>>()?;

    let index_rank = indices.rank();
    let index_strides = default_strides(indices.shape());
    let mut source: Dims = smallvec![0; input.rank()];
    for index in IndexIter::new(&expected) {
        source[..axis].copy_from_slice(&index[..axis]);
        let position = linear_offset(&index[axis..axis + index_rank], &index_strides);
        source[axis] = resolved[position];
        source[axis + 1..].copy_from_slice(&index[axis + index_rank..]);
        output.copy_element(&index, input.element_bytes(&source));
    }
    Ok(())
}

/// Output shape of gather_nd: batch prefix, the index tensor's middle axes,
/// then the input axes not addressed by an index tuple.
pub fn gather_nd_shape(input: &[usize], indices: &[usize], batch_dims: usize) -> KernelResult<Dims> {
    const OP: &str = "gather_nd";
    let Some((&tuple, middle)) = indices.split_last() else {
        return Err(KernelError::shape(OP, "indices must have rank >= 1"));
    };
    if batch_dims >= indices.len() || batch_dims + tuple > input.len() {
        return Err(KernelError::shape(
            OP,
            format!("indices {indices:?} with batch_dims {batch_dims} do not address input {input:?}"),
        ));
    }
    if input[..batch_dims] != indices[..batch_dims] {
        return Err(KernelError::shape(OP, "batch dimensions differ between input and indices"));
    }
    let mut shape = Dims::new();
    shape.extend_from_slice(middle);
    shape.extend_from_slice(&input[batch_dims + tuple..]);
    Ok(shape)
}

/// Each output position splits into three zones: the batch prefix (shared by
/// indices and input), the index-tensor axes, and the trailing block copied
/// straight into the remaining input axes.
pub fn gather_nd(
    input: &TensorView<'_>,
    indices: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    batch_dims: usize,
) -> KernelResult<()> {
    const OP: &str = "gather_nd";
    expect_dtype(OP, indices.dtype(), DataType::Int32)?;
    expect_dtype(OP, output.dtype(), input.dtype())?;
    let expected = gather_nd_shape(input.shape(), indices.shape(), batch_dims)?;
    expect_shape(OP, output.shape(), &expected)?;

    let last_axis = indices.rank() - 1;
    let tuple = indices.shape()[last_axis];
    for index in IndexIter::new(indices.shape()) {
        let axis = batch_dims + index[last_axis];
        checked_index(OP, indices.read::<i32>(&index), input.shape()[axis])?;
    }

    let mut index_at: Dims = smallvec![0; indices.rank()];
    let mut source: Dims = smallvec![0; input.rank()];
    for index in IndexIter::new(&expected) {
        // zone 1 + 2: the index-tensor coordinate
        index_at[..last_axis].copy_from_slice(&index[..last_axis]);
        source[..batch_dims].copy_from_slice(&index[..batch_dims]);
        for component in 0..tuple {
            index_at[last_axis] = component;
            source[batch_dims + component] = indices.read::<i32>(&index_at) as usize;
        }
        // zone 3: trailing block
        source[batch_dims + tuple..].copy_from_slice(&index[last_axis..]);
        output.copy_element(&index, input.element_bytes(&source));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{i32_bytes, read_i32};

    #[test]
    fn gather_replaces_the_axis_with_the_index_shape() {
        let data = i32_bytes(&[0, 1, 2, 10, 11, 12]);
        let idx = i32_bytes(&[2, 0, 1, 1]);
        let input = TensorView::contiguous(DataType::Int32, &data, &[2, 3]).expect("input");
        let indices = TensorView::contiguous(DataType::Int32, &idx, &[2, 2]).expect("indices");
        let mut out = vec![0u8; 8 * 4];
        {
            let mut output = TensorViewMut::contiguous(DataType::Int32, &mut out, &[2, 2, 2]).expect("out");
            gather(&input, &indices, &mut output, 1).expect("gather");
        }
        assert_eq!(read_i32(&out), vec![2, 0, 1, 1, 12, 10, 11, 11]);
    }

    #[test]
    fn gather_nd_selects_rows() {
        let data = i32_bytes(&[1, 2, 3, 4]);
        let idx = i32_bytes(&[1, 0]);
        let input = TensorView::contiguous(DataType::Int32, &data, &[2, 2]).expect("input");
        let indices = TensorView::contiguous(DataType::Int32, &idx, &[2, 1]).expect("indices");
        let shape = gather_nd_shape(input.shape(), indices.shape(), 0).expect("shape");
        assert_eq!(shape.as_slice(), &[2, 2]);
        let mut out = vec![0u8; 16];
        {
            let mut output = TensorViewMut::contiguous(DataType::Int32, &mut out, &shape).expect("out");
            gather_nd(&input, &indices, &mut output, 0).expect("gather_nd");
        }
        assert_eq!(read_i32(&out), vec![3, 4, 1, 2]);
    }

    #[test]
    fn gather_nd_with_batch_dims_gathers_scalars() {
        // input [2, 3], one full tuple per batch row
        let data = i32_bytes(&[0, 1, 2, 10, 11, 12]);
        let idx = i32_bytes(&[2, 0]);
        let input = TensorView::contiguous(DataType::Int32, &data, &[2, 3]).expect("input");
        let indices = TensorView::contiguous(DataType::Int32, &idx, &[2, 1]).expect("indices");
        let shape = gather_nd_shape(input.shape(), indices.shape(), 1).expect("shape");
        assert_eq!(shape.as_slice(), &[2]);
        let mut out = vec![0u8; 8];
        {
            let mut output = TensorViewMut::contiguous(DataType::Int32, &mut out, &shape).expect("out");
            gather_nd(&input, &indices, &mut output, 1).expect("gather_nd");
        }
        assert_eq!(read_i32(&out), vec![2, 10]);
    }

    #[test]
    fn out_of_bounds_indices_fail_before_writing() {
        let data = i32_bytes(&[1, 2, 3]);
        let input = TensorView::contiguous(DataType::Int32, &data, &[3]).expect("input");
        for bad in [3, -1] {
            let idx = i32_bytes(&[0, bad]);
            let indices = TensorView::contiguous(DataType::Int32, &idx, &[2]).expect("indices");
            let mut out = vec![0xaau8; 8];
            {
                let mut output = TensorViewMut::contiguous(DataType::Int32, &mut out, &[2]).expect("out");
                let err = gather(&input, &indices, &mut output, 0).unwrap_err();
                assert_eq!(
                    err,
                    KernelError::IndexOutOfBounds {
                        op: "gather",
                        index: bad as i64,
                        size: 3
                    }
                );
            }
            assert!(out.iter().all(|b| *b == 0xaa));
        }
    }

    #[test]
    fn gather_nd_rejects_out_of_range_tuples_before_writing() {
        let data = i32_bytes(&[1, 2, 3, 4, 5, 6]);
        let input = TensorView::contiguous(DataType::Int32, &data, &[2, 3]).expect("input");
        // (tuple, offending component, size of the axis it indexes)
        let cases = [([0, 1, 1, 3], 3, 3), ([-1, 0, 0, 0], -1, 2)];
        for (tuple, bad, size) in cases {
            let idx = i32_bytes(&tuple);
            let indices = TensorView::contiguous(DataType::Int32, &idx, &[2, 2]).expect("indices");
            let mut out = vec![0xaau8; 8];
            {
                let mut output = TensorViewMut::contiguous(DataType::Int32, &mut out, &[2]).expect("out");
                let err = gather_nd(&input, &indices, &mut output, 0).unwrap_err();
                assert_eq!(
                    err,
                    KernelError::IndexOutOfBounds {
                        op: "gather_nd",
                        index: bad as i64,
                        size
                    }
                );
            }
            assert!(out.iter().all(|b| *b == 0xaa));
        }
    }
}
