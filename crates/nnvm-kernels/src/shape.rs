//! Data-movement kernels. They copy raw element bytes, so every data type is
//! supported and byte widths are preserved.

use nnvm::ir::{slice_extent, PadMode};
use nnvm::tensor::{write_scalar_f64, IndexIter, Padding};
use nnvm::{Dims, KernelError, KernelResult, TensorView, TensorViewMut};
use smallvec::smallvec;

use crate::util::{expect_dtype, expect_shape, rank4};

fn padded_source(index: i64, size: usize, mode: PadMode) -> Option<usize> {
    let n = size as i64;
    if (0..n).contains(&index) {
        return Some(index as usize);
    }
    if n == 0 {
        return None;
    }
    let mapped = match mode {
        PadMode::Constant => return None,
        PadMode::Edge => index.clamp(0, n - 1),
        PadMode::Reflect => {
            if n == 1 {
                0
            } else {
                let period = 2 * (n - 1);
                let folded = index.rem_euclid(period);
                if folded < n {
                    folded
                } else {
                    period - folded
                }
            }
        }
        PadMode::Symmetric => {
            let period = 2 * n;
            let folded = index.rem_euclid(period);
            if folded < n {
                folded
            } else {
                period - 1 - folded
            }
        }
    };
    Some(mapped as usize)
}

/// Pads (or, with negative amounts, crops) every axis.
pub fn pad(
    input: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    paddings: &[Padding],
    mode: PadMode,
    pad_value: f32,
) -> KernelResult<()> {
    const OP: &str = "pad";
    expect_dtype(OP, output.dtype(), input.dtype())?;
    if paddings.len() != input.rank() {
        return Err(KernelError::shape(
            OP,
            format!("{} paddings for rank {}", paddings.len(), input.rank()),
        ));
    }
    let mut expected: Dims = Dims::new();
    for (dim, padding) in input.shape().iter().zip(paddings) {
        let size = *dim as i64 + padding.sum();
        if size < 0 {
            return Err(KernelError::shape(OP, format!("padding {padding:?} exceeds extent {dim}")));
        }
        expected.push(size as usize);
    }
    expect_shape(OP, output.shape(), &expected)?;

    let width = input.dtype().size_in_bytes();
    let mut fill = vec![0u8; width];
    write_scalar_f64(input.dtype(), &mut fill, pad_value as f64);

    let mut source: Dims = smallvec![0; input.rank()];
    for index in IndexIter::new(&expected) {
        let mut inside = true;
        for axis in 0..index.len() {
            let shifted = index[axis] as i64 - paddings[axis].before as i64;
            match padded_source(shifted, input.shape()[axis], mode) {
                Some(pos) => source[axis] = pos,
                None => {
                    inside = false;
                    break;
                }
            }
        }
        if inside {
            output.copy_element(&index, input.element_bytes(&source));
        } else {
            output.copy_element(&index, &fill);
        }
    }
    Ok(())
}

/// Strided slice; `begin`/`end` are resolved, per-axis positions and strides
/// may be negative.
pub fn slice(
    input: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    begin: &[i32],
    end: &[i32],
    strides: &[i32],
) -> KernelResult<()> {
    const OP: &str = "slice";
    expect_dtype(OP, output.dtype(), input.dtype())?;
    let rank = input.rank();
    if begin.len() != rank || end.len() != rank || strides.len() != rank {
        return Err(KernelError::shape(OP, "begin/end/strides must match input rank"));
    }
    let mut expected = Dims::new();
    for axis in 0..rank {
        let extent = slice_extent(begin[axis], end[axis], strides[axis])
            .ok_or_else(|| KernelError::invalid(OP, format!("zero stride on axis {axis}")))?;
        if extent > 0 {
            let first = begin[axis] as i64;
            let last = first + (extent as i64 - 1) * strides[axis] as i64;
            let size = input.shape()[axis] as i64;
            for position in [first, last] {
                if position < 0 || position >= size {
                    return Err(KernelError::IndexOutOfBounds {
                        op: OP,
                        index: position,
                        size: size as usize,
                    });
                }
            }
        }
        expected.push(extent);
    }
    expect_shape(OP, output.shape(), &expected)?;

    let mut source: Dims = smallvec![0; rank];
    for index in IndexIter::new(&expected) {
        for axis in 0..rank {
            source[axis] = (begin[axis] as i64 + index[axis] as i64 * strides[axis] as i64) as usize;
        }
        output.copy_element(&index, input.element_bytes(&source));
    }
    Ok(())
}

/// `output[i] = input[perm-applied i]`, i.e. `output.shape[d] = input.shape[perm[d]]`.
pub fn transpose(input: &TensorView<'_>, output: &mut TensorViewMut<'_>, perm: &[usize]) -> KernelResult<()> {
    const OP: &str = "transpose";
    expect_dtype(OP, output.dtype(), input.dtype())?;
    let rank = input.rank();
    let mut seen = vec![false; rank];
    if perm.len() != rank || perm.iter().any(|axis| *axis >= rank || std::mem::replace(&mut seen[*axis], true)) {
        return Err(KernelError::invalid(OP, format!("invalid permutation {perm:?} for rank {rank}")));
    }
    let expected: Dims = perm.iter().map(|axis| input.shape()[*axis]).collect();
    expect_shape(OP, output.shape(), &expected)?;

    let mut source: Dims = smallvec![0; rank];
    for index in IndexIter::new(&expected) {
        for (out_axis, in_axis) in perm.iter().enumerate() {
            source[*in_axis] = index[out_axis];
        }
        output.copy_element(&index, input.element_bytes(&source));
    }
    Ok(())
}

pub fn concat(inputs: &[TensorView<'_>], output: &mut TensorViewMut<'_>, axis: usize) -> KernelResult<()> {
    const OP: &str = "concat";
    let Some(first) = inputs.first() else {
        return Err(KernelError::invalid(OP, "no inputs"));
    };
    if axis >= first.rank() {
        return Err(KernelError::shape(OP, format!("axis {axis} out of range")));
    }
    let mut expected: Dims = first.shape().iter().copied().collect();
    expected[axis] = 0;
    for input in inputs {
        expect_dtype(OP, input.dtype(), output.dtype())?;
        let compatible = input.rank() == first.rank()
            && input
                .shape()
                .iter()
                .zip(first.shape())
                .enumerate()
                .all(|(d, (a, b))| d == axis || a == b);
        if !compatible {
            return Err(KernelError::shape(
                OP,
                format!("{:?} does not concat with {:?}", input.shape(), first.shape()),
            ));
        }
        expected[axis] += input.shape()[axis];
    }
    expect_shape(OP, output.shape(), &expected)?;

    let mut offset = 0usize;
    for input in inputs {
        for index in IndexIter::new(input.shape()) {
            let mut target = index.clone();
            target[axis] += offset;
            output.copy_element(&target, input.element_bytes(&index));
        }
        offset += input.shape()[axis];
    }
    Ok(())
}

/// Reinterprets the row-major bytes of `input` under the output's type and
/// shape. Total byte size must match.
pub fn bitcast(input: &TensorView<'_>, output: &mut TensorViewMut<'_>) -> KernelResult<()> {
    const OP: &str = "bitcast";
    let in_bytes = input.element_count() * input.dtype().size_in_bytes();
    let out_width = output.dtype().size_in_bytes();
    let out_bytes = output.element_count() * out_width;
    if in_bytes != out_bytes {
        return Err(KernelError::shape(
            OP,
            format!("{in_bytes} input bytes cannot be viewed as {out_bytes} output bytes"),
        ));
    }
    let data = input.to_contiguous_bytes();
    let shape: Dims = output.shape().iter().copied().collect();
    for (index, chunk) in IndexIter::new(&shape).zip(data.chunks_exact(out_width)) {
        output.copy_element(&index, chunk);
    }
    Ok(())
}

/// NCHW batch-to-space: spreads `block_h * block_w` batch groups over the
/// spatial axes, then crops.
pub fn batch_to_space(
    input: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    block_h: usize,
    block_w: usize,
    crop_h: Padding,
    crop_w: Padding,
) -> KernelResult<()> {
    const OP: &str = "batch_to_space";
    expect_dtype(OP, output.dtype(), input.dtype())?;
    let [n, c, h, w] = rank4(OP, input.shape(), "input")?;
    let block = block_h * block_w;
    if block == 0 || n % block != 0 {
        return Err(KernelError::shape(OP, format!("batch {n} not divisible by block {block}")));
    }
    if crop_h.before < 0 || crop_h.after < 0 || crop_w.before < 0 || crop_w.after < 0 {
        return Err(KernelError::invalid(OP, "crops must be non-negative"));
    }
    let out_n = n / block;
    let out_h = (h * block_h) as i64 - crop_h.sum();
    let out_w = (w * block_w) as i64 - crop_w.sum();
    if out_h < 0 || out_w < 0 {
        return Err(KernelError::shape(OP, "crops exceed the expanded extent"));
    }
    let expected = [out_n, c, out_h as usize, out_w as usize];
    expect_shape(OP, output.shape(), &expected)?;

    for index in IndexIter::new(&expected) {
        let (b, ch, y, x) = (index[0], index[1], index[2], index[3]);
        let py = y + crop_h.before as usize;
        let px = x + crop_w.before as usize;
        let in_batch = ((py % block_h) * block_w + (px % block_w)) * out_n + b;
        let source = [in_batch, ch, py / block_h, px / block_w];
        output.copy_element(&index, input.element_bytes(&source));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nnvm::DataType;

    use crate::test_util::{f32_bytes, i32_bytes, read_f32, read_i32};

    #[test]
    fn pad_modes_mirror_differently() {
        let data = i32_bytes(&[1, 2, 3]);
        let input = TensorView::contiguous(DataType::Int32, &data, &[3]).expect("input");
        let check = |mode, expected: &[i32]| {
            let mut out = vec![0u8; 7 * 4];
            {
                let mut output = TensorViewMut::contiguous(DataType::Int32, &mut out, &[7]).expect("out");
                pad(&input, &mut output, &[Padding::new(2, 2)], mode, 9.0).expect("pad");
            }
            assert_eq!(read_i32(&out), expected, "{mode:?}");
        };
        check(PadMode::Constant, &[9, 9, 1, 2, 3, 9, 9]);
        check(PadMode::Reflect, &[3, 2, 1, 2, 3, 2, 1]);
        check(PadMode::Symmetric, &[2, 1, 1, 2, 3, 3, 2]);
        check(PadMode::Edge, &[1, 1, 1, 2, 3, 3, 3]);
    }

    #[test]
    fn negative_padding_crops() {
        let data = f32_bytes(&[1.0, 2.0, 3.0, 4.0]);
        let input = TensorView::contiguous(DataType::Float32, &data, &[4]).expect("input");
        let mut out = vec![0u8; 12];
        {
            let mut output = TensorViewMut::contiguous(DataType::Float32, &mut out, &[3]).expect("out");
            pad(&input, &mut output, &[Padding::new(-2, 1)], PadMode::Constant, 0.0).expect("pad");
        }
        assert_eq!(read_f32(&out), vec![3.0, 4.0, 0.0]);
    }

    #[test]
    fn slice_with_negative_stride_reverses() {
        let data = i32_bytes(&[0, 1, 2, 3, 4, 5]);
        let input = TensorView::contiguous(DataType::Int32, &data, &[2, 3]).expect("input");
        let mut out = vec![0u8; 12];
        {
            let mut output = TensorViewMut::contiguous(DataType::Int32, &mut out, &[1, 3]).expect("out");
            slice(&input, &mut output, &[1, 2], &[2, -1], &[1, -1]).expect("slice");
        }
        assert_eq!(read_i32(&out), vec![5, 4, 3]);
    }

    #[test]
    fn slice_out_of_range_is_an_error() {
        let data = i32_bytes(&[0, 1, 2]);
        let input = TensorView::contiguous(DataType::Int32, &data, &[3]).expect("input");
        let mut out = vec![0u8; 8];
        let mut output = TensorViewMut::contiguous(DataType::Int32, &mut out, &[2]).expect("out");
        assert!(matches!(
            slice(&input, &mut output, &[2], &[4], &[1]),
            Err(KernelError::IndexOutOfBounds { index: 3, .. })
        ));
    }

    #[test]
    fn transpose_and_concat_move_bytes() {
        let data: Vec<u8> = (0u8..6).collect();
        let input = TensorView::contiguous(DataType::UInt8, &data, &[2, 3]).expect("input");
        let mut out = vec![0u8; 6];
        {
            let mut output = TensorViewMut::contiguous(DataType::UInt8, &mut out, &[3, 2]).expect("out");
            transpose(&input, &mut output, &[1, 0]).expect("transpose");
        }
        assert_eq!(out, vec![0, 3, 1, 4, 2, 5]);

        let extra = vec![9u8, 9];
        let extra = TensorView::contiguous(DataType::UInt8, &extra, &[2, 1]).expect("extra");
        let mut joined = vec![0u8; 8];
        {
            let mut output = TensorViewMut::contiguous(DataType::UInt8, &mut joined, &[2, 4]).expect("out");
            concat(&[input, extra], &mut output, 1).expect("concat");
        }
        assert_eq!(joined, vec![0, 1, 2, 9, 3, 4, 5, 9]);
    }

    #[test]
    fn bitcast_reinterprets_bytes() {
        let data = f32_bytes(&[1.0]);
        let input = TensorView::contiguous(DataType::Float32, &data, &[1]).expect("input");
        let mut out = vec![0u8; 4];
        {
            let mut output = TensorViewMut::contiguous(DataType::UInt8, &mut out, &[4]).expect("out");
            bitcast(&input, &mut output).expect("bitcast");
        }
        assert_eq!(out, 1.0f32.to_le_bytes().to_vec());
    }

    #[test]
    fn batch_to_space_interleaves_blocks() {
        // 4 batches of 1x1x1 -> one 2x2 image
        let data = i32_bytes(&[1, 2, 3, 4]);
        let input = TensorView::contiguous(DataType::Int32, &data, &[4, 1, 1, 1]).expect("input");
        let mut out = vec![0u8; 16];
        {
            let mut output = TensorViewMut::contiguous(DataType::Int32, &mut out, &[1, 1, 2, 2]).expect("out");
            batch_to_space(&input, &mut output, 2, 2, Padding::zero(), Padding::zero()).expect("b2s");
        }
        assert_eq!(read_i32(&out), vec![1, 2, 3, 4]);
    }
}
