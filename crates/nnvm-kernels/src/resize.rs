//! NCHW image resize with TFLite-compatible coordinate transforms.

use nnvm::tensor::IndexIter;
use nnvm::{DataType, KernelError, KernelResult, TensorView, TensorViewMut};

use crate::util::{expect_dtype, expect_shape, rank4};

#[inline]
fn axis_scale(input: usize, output: usize, align_corners: bool) -> f32 {
    if align_corners && output > 1 {
        (input as f32 - 1.0) / (output as f32 - 1.0)
    } else {
        input as f32 / output as f32
    }
}

/// Source coordinate plus its clamped lower/upper neighbours.
#[inline]
fn interpolation_values(value: usize, scale: f32, half_pixel_centers: bool, input: usize) -> (f32, usize, usize) {
    let scaled = if half_pixel_centers {
        (value as f32 + 0.5) * scale - 0.5
    } else {
        value as f32 * scale
    };
    let lower = libm::floorf(scaled).max(0.0) as usize;
    let upper = (libm::ceilf(scaled) as i64).clamp(0, input as i64 - 1) as usize;
    (scaled, lower.min(input - 1), upper)
}

#[inline]
fn nearest_source(value: usize, scale: f32, input: usize, align_corners: bool, half_pixel_centers: bool) -> usize {
    let offset = if half_pixel_centers { 0.5 } else { 0.0 };
    let scaled = (value as f32 + offset) * scale;
    let rounded = if align_corners {
        libm::roundf(scaled)
    } else {
        libm::floorf(scaled)
    };
    let mut index = (rounded as i64).min(input as i64 - 1);
    if half_pixel_centers {
        index = index.max(0);
    }
    index.max(0) as usize
}

fn check_geometry(
    op: &'static str,
    input: &TensorView<'_>,
    output: &TensorViewMut<'_>,
    new_size: [usize; 2],
    align_corners: bool,
    half_pixel_centers: bool,
) -> KernelResult<[usize; 4]> {
    if align_corners && half_pixel_centers {
        return Err(KernelError::unsupported(op, "align_corners with half_pixel_centers"));
    }
    let shape = rank4(op, input.shape(), "input")?;
    if shape[2] == 0 || shape[3] == 0 {
        return Err(KernelError::shape(op, "input image is empty"));
    }
    expect_shape(op, output.shape(), &[shape[0], shape[1], new_size[0], new_size[1]])?;
    Ok(shape)
}

pub fn resize_bilinear(
    input: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    new_size: [usize; 2],
    align_corners: bool,
    half_pixel_centers: bool,
) -> KernelResult<()> {
    const OP: &str = "resize_bilinear";
    expect_dtype(OP, input.dtype(), DataType::Float32)?;
    expect_dtype(OP, output.dtype(), DataType::Float32)?;
    let [_, _, in_h, in_w] = check_geometry(OP, input, output, new_size, align_corners, half_pixel_centers)?;
    let scale_h = axis_scale(in_h, new_size[0], align_corners);
    let scale_w = axis_scale(in_w, new_size[1], align_corners);

    let out_shape = [input.shape()[0], input.shape()[1], new_size[0], new_size[1]];
    for index in IndexIter::new(&out_shape) {
        let (b, c) = (index[0], index[1]);
        let (in_y, y0, y1) = interpolation_values(index[2], scale_h, half_pixel_centers, in_h);
        let (in_x, x0, x1) = interpolation_values(index[3], scale_w, half_pixel_centers, in_w);
        let dy = in_y - y0 as f32;
        let dx = in_x - x0 as f32;
        let value = input.read::<f32>(&[b, c, y0, x0]) * (1.0 - dy) * (1.0 - dx)
            + input.read::<f32>(&[b, c, y1, x0]) * dy * (1.0 - dx)
            + input.read::<f32>(&[b, c, y0, x1]) * (1.0 - dy) * dx
            + input.read::<f32>(&[b, c, y1, x1]) * dy * dx;
        output.write(&index, value);
    }
    Ok(())
}

/// Nearest-neighbour resize; copies element bytes so any data type works.
pub fn resize_nearest(
    input: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    new_size: [usize; 2],
    align_corners: bool,
    half_pixel_centers: bool,
) -> KernelResult<()> {
    const OP: &str = "resize_nearest";
    expect_dtype(OP, output.dtype(), input.dtype())?;
    let [_, _, in_h, in_w] = check_geometry(OP, input, output, new_size, align_corners, half_pixel_centers)?;
    let scale_h = axis_scale(in_h, new_size[0], align_corners);
    let scale_w = axis_scale(in_w, new_size[1], align_corners);

    let out_shape = [input.shape()[0], input.shape()[1], new_size[0], new_size[1]];
    for index in IndexIter::new(&out_shape) {
        let y = nearest_source(index[2], scale_h, in_h, align_corners, half_pixel_centers);
        let x = nearest_source(index[3], scale_w, in_w, align_corners, half_pixel_centers);
        output.copy_element(&index, input.element_bytes(&[index[0], index[1], y, x]));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{f32_bytes, read_f32};

    fn bilinear(values: &[f32], in_hw: [usize; 2], out_hw: [usize; 2], align: bool, half: bool) -> Vec<f32> {
        let bytes = f32_bytes(values);
        let input = TensorView::contiguous(DataType::Float32, &bytes, &[1, 1, in_hw[0], in_hw[1]]).expect("input");
        let mut out = vec![0u8; out_hw[0] * out_hw[1] * 4];
        {
            let mut output =
                TensorViewMut::contiguous(DataType::Float32, &mut out, &[1, 1, out_hw[0], out_hw[1]]).expect("out");
            resize_bilinear(&input, &mut output, out_hw, align, half).expect("resize");
        }
        read_f32(&out)
    }

    #[test]
    fn bilinear_upsamples_a_row() {
        // scale 0.5: sources 0, 0.5, 1, 1.5 (upper clamped to 1)
        assert_eq!(bilinear(&[0.0, 4.0], [1, 2], [1, 4], false, false), vec![0.0, 2.0, 4.0, 4.0]);
        // align corners: scale 1/3
        let aligned = bilinear(&[0.0, 3.0], [1, 2], [1, 4], true, false);
        for (got, want) in aligned.iter().zip([0.0, 1.0, 2.0, 3.0]) {
            assert!((got - want).abs() < 1e-5, "{got} vs {want}");
        }
        // half pixel: sources -0.25, 0.25, 0.75, 1.25
        assert_eq!(bilinear(&[0.0, 4.0], [1, 2], [1, 4], false, true), vec![0.0, 1.0, 3.0, 4.0]);
    }

    #[test]
    fn nearest_copies_bytes_for_any_type() {
        let data = vec![1u8, 2, 3, 4];
        let input = TensorView::contiguous(DataType::UInt8, &data, &[1, 1, 2, 2]).expect("input");
        let mut out = vec![0u8; 16];
        {
            let mut output = TensorViewMut::contiguous(DataType::UInt8, &mut out, &[1, 1, 4, 4]).expect("out");
            resize_nearest(&input, &mut output, [4, 4], false, false).expect("resize");
        }
        assert_eq!(out, vec![1, 1, 2, 2, 1, 1, 2, 2, 3, 3, 4, 4, 3, 3, 4, 4]);
    }

    #[test]
    fn nearest_align_corners_rounds() {
        let data = vec![10u8, 20, 30];
        let input = TensorView::contiguous(DataType::UInt8, &data, &[1, 1, 1, 3]).expect("input");
        let mut out = vec![0u8; 2];
        {
            let mut output = TensorViewMut::contiguous(DataType::UInt8, &mut out, &[1, 1, 1, 2]).expect("out");
            resize_nearest(&input, &mut output, [1, 2], true, false).expect("resize");
        }
        assert_eq!(out, vec![10, 30]);
    }
}
