use nnvm::ir::{Conv2dAttrs, ValueRange};
use nnvm::tensor::{windowed_output_size, Padding};
use nnvm::{DataType, KernelError, KernelResult, TensorView, TensorViewMut};

use crate::util::{expect_dtype, expect_shape, rank4};

struct ConvGeometry {
    batch: usize,
    in_c: usize,
    in_h: usize,
    in_w: usize,
    out_c: usize,
    kernel_h: usize,
    kernel_w: usize,
    group_in: usize,
    group_out: usize,
}

fn geometry(
    op: &'static str,
    input: &TensorView<'_>,
    weights: &TensorView<'_>,
    bias: &TensorView<'_>,
    output: &TensorViewMut<'_>,
    attrs: &Conv2dAttrs,
) -> KernelResult<ConvGeometry> {
    for dtype in [input.dtype(), weights.dtype(), bias.dtype(), output.dtype()] {
        expect_dtype(op, dtype, DataType::Float32)?;
    }
    let [batch, in_c, in_h, in_w] = rank4(op, input.shape(), "input")?;
    let [out_c, group_in, kernel_h, kernel_w] = rank4(op, weights.shape(), "weights")?;
    let groups = attrs.groups;
    if groups == 0 || in_c % groups != 0 || out_c % groups != 0 || in_c / groups != group_in {
        return Err(KernelError::shape(
            op,
            format!(
                "{groups} groups do not split {in_c} input / {out_c} output channels with weights {:?}",
                weights.shape()
            ),
        ));
    }
    if bias.shape() != [out_c] {
        return Err(KernelError::shape(
            op,
            format!("bias must be [{out_c}], got {:?}", bias.shape()),
        ));
    }
    if attrs.stride_h == 0 || attrs.stride_w == 0 || attrs.dilation_h == 0 || attrs.dilation_w == 0 {
        return Err(KernelError::invalid(op, "strides and dilations must be positive"));
    }
    Ok(ConvGeometry {
        batch,
        in_c,
        in_h,
        in_w,
        out_c,
        kernel_h,
        kernel_w,
        group_in,
        group_out: out_c / groups,
    })
}

/// Grouped, strided, dilated cross-correlation over NCHW input with OIHW
/// weights. Bias seeds the accumulator; the activation clamps the sum.
pub fn conv2d(
    input: &TensorView<'_>,
    weights: &TensorView<'_>,
    bias: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    attrs: &Conv2dAttrs,
) -> KernelResult<()> {
    const OP: &str = "conv2d";
    let g = geometry(OP, input, weights, bias, output, attrs)?;
    let out_h = windowed_output_size(g.in_h, g.kernel_h, attrs.stride_h, attrs.dilation_h, attrs.padding_h)
        .ok_or_else(|| KernelError::shape(OP, "kernel does not fit the input height"))?;
    let out_w = windowed_output_size(g.in_w, g.kernel_w, attrs.stride_w, attrs.dilation_w, attrs.padding_w)
        .ok_or_else(|| KernelError::shape(OP, "kernel does not fit the input width"))?;
    expect_shape(OP, output.shape(), &[g.batch, g.out_c, out_h, out_w])?;

    for n in 0..g.batch {
        for oc in 0..g.out_c {
            let group = oc / g.group_out;
            let bias_value = bias.read::<f32>(&[oc]);
            for oy in 0..out_h {
                let origin_y = (oy * attrs.stride_h) as i64 - attrs.padding_h.before as i64;
                for ox in 0..out_w {
                    let origin_x = (ox * attrs.stride_w) as i64 - attrs.padding_w.before as i64;
                    let mut acc = bias_value;
                    for ic_in_group in 0..g.group_in {
                        let ic = group * g.group_in + ic_in_group;
                        for ky in 0..g.kernel_h {
                            let iy = origin_y + (ky * attrs.dilation_h) as i64;
                            if iy < 0 || iy >= g.in_h as i64 {
                                continue;
                            }
                            for kx in 0..g.kernel_w {
                                let ix = origin_x + (kx * attrs.dilation_w) as i64;
                                if ix < 0 || ix >= g.in_w as i64 {
                                    continue;
                                }
                                let x = input.read::<f32>(&[n, ic, iy as usize, ix as usize]);
                                let wv = weights.read::<f32>(&[oc, ic_in_group, ky, kx]);
                                acc += x * wv;
                            }
                        }
                    }
                    output.write(&[n, oc, oy, ox], attrs.activation.apply(acc));
                }
            }
        }
    }
    Ok(())
}

/// Adjoint of [`conv2d`]: every input pixel scatters its weighted taps into
/// the output, which is then offset by bias and clamped.
pub fn conv2d_transpose(
    input: &TensorView<'_>,
    weights: &TensorView<'_>,
    bias: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    attrs: &Conv2dAttrs,
) -> KernelResult<()> {
    const OP: &str = "conv2d_transpose";
    let g = geometry(OP, input, weights, bias, output, attrs)?;
    let extent = |size: usize, filter: usize, stride: usize, dilation: usize, pad: Padding| {
        let full = (size as i64 - 1) * stride as i64 + (filter as i64 - 1) * dilation as i64 + 1;
        let value = full - pad.sum();
        if size == 0 || value <= 0 {
            Err(KernelError::shape(OP, format!("transposed extent of {size} is empty")))
        } else {
            Ok(value as usize)
        }
    };
    let expected = [
        g.batch,
        g.out_c,
        extent(g.in_h, g.kernel_h, attrs.stride_h, attrs.dilation_h, attrs.padding_h)?,
        extent(g.in_w, g.kernel_w, attrs.stride_w, attrs.dilation_w, attrs.padding_w)?,
    ];
    expect_shape(OP, output.shape(), &expected)?;
    let [out_n, out_c, out_h, out_w] = expected;

    let mut acc = vec![0f32; out_n * out_c * out_h * out_w];
    let at = |n: usize, c: usize, y: usize, x: usize| ((n * out_c + c) * out_h + y) * out_w + x;

    for n in 0..g.batch {
        for ic in 0..g.in_c {
            let group = ic / g.group_in;
            let ic_in_group = ic % g.group_in;
            for iy in 0..g.in_h {
                let origin_y = (iy * attrs.stride_h) as i64 - attrs.padding_h.before as i64;
                for ix in 0..g.in_w {
                    let origin_x = (ix * attrs.stride_w) as i64 - attrs.padding_w.before as i64;
                    let x = input.read::<f32>(&[n, ic, iy, ix]);
                    for oc_in_group in 0..g.group_out {
                        let oc = group * g.group_out + oc_in_group;
                        for ky in 0..g.kernel_h {
                            let oy = origin_y + (ky * attrs.dilation_h) as i64;
                            if oy < 0 || oy >= out_h as i64 {
                                continue;
                            }
                            for kx in 0..g.kernel_w {
                                let ox = origin_x + (kx * attrs.dilation_w) as i64;
                                if ox < 0 || ox >= out_w as i64 {
                                    continue;
                                }
                                let wv = weights.read::<f32>(&[oc, ic_in_group, ky, kx]);
                                acc[at(n, oc, oy as usize, ox as usize)] += x * wv;
                            }
                        }
                    }
                }
            }
        }
    }

    for n in 0..out_n {
        for oc in 0..out_c {
            let bias_value = bias.read::<f32>(&[oc]);
            for oy in 0..out_h {
                for ox in 0..out_w {
                    let value = acc[at(n, oc, oy, ox)] + bias_value;
                    output.write(&[n, oc, oy, ox], attrs.activation.apply(value));
                }
            }
        }
    }
    Ok(())
}

/// `(M, K) x (K, N) + bias(N)`, clamped by `activation`.
pub fn matmul(
    lhs: &TensorView<'_>,
    rhs: &TensorView<'_>,
    bias: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    activation: ValueRange,
) -> KernelResult<()> {
    const OP: &str = "matmul";
    for dtype in [lhs.dtype(), rhs.dtype(), bias.dtype(), output.dtype()] {
        expect_dtype(OP, dtype, DataType::Float32)?;
    }
    let (m, k, n) = match (lhs.shape(), rhs.shape()) {
        ([m, k0], [k1, n]) if k0 == k1 => (*m, *k0, *n),
        (a, b) => {
            return Err(KernelError::shape(
                OP,
                format!("cannot multiply {a:?} by {b:?}"),
            ))
        }
    };
    if bias.shape() != [n] {
        return Err(KernelError::shape(OP, format!("bias must be [{n}], got {:?}", bias.shape())));
    }
    expect_shape(OP, output.shape(), &[m, n])?;

    for row in 0..m {
        for col in 0..n {
            let mut acc = 0f32;
            for i in 0..k {
                acc += lhs.read::<f32>(&[row, i]) * rhs.read::<f32>(&[i, col]);
            }
            let value = acc + bias.read::<f32>(&[col]);
            output.write(&[row, col], activation.apply(value));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nnvm::tensor::Padding;

    use crate::test_util::{f32_bytes, read_f32};

    #[test]
    fn conv2d_same_padding_box_filter() {
        let input = f32_bytes(&(1..=9).map(|v| v as f32).collect::<Vec<_>>());
        let weights = f32_bytes(&[1.0; 9]);
        let bias = f32_bytes(&[0.5]);
        let input = TensorView::contiguous(DataType::Float32, &input, &[1, 1, 3, 3]).expect("input");
        let weights = TensorView::contiguous(DataType::Float32, &weights, &[1, 1, 3, 3]).expect("w");
        let bias = TensorView::contiguous(DataType::Float32, &bias, &[1]).expect("b");
        let attrs = Conv2dAttrs {
            padding_h: Padding::new(1, 1),
            padding_w: Padding::new(1, 1),
            ..Conv2dAttrs::default()
        };
        let mut out = vec![0u8; 36];
        {
            let mut output = TensorViewMut::contiguous(DataType::Float32, &mut out, &[1, 1, 3, 3]).expect("out");
            conv2d(&input, &weights, &bias, &mut output, &attrs).expect("conv");
        }
        assert_eq!(
            read_f32(&out),
            vec![12.5, 21.5, 16.5, 27.5, 45.5, 33.5, 24.5, 39.5, 28.5]
        );
    }

    #[test]
    fn depthwise_conv_keeps_channels_apart() {
        let input = f32_bytes(&[1.0, 2.0, 3.0, 4.0, 10.0, 20.0, 30.0, 40.0]);
        let weights = f32_bytes(&[1.0, 1.0, 1.0, 1.0, -1.0, 0.0, 0.0, 1.0]);
        let bias = f32_bytes(&[0.0, 0.0]);
        let input = TensorView::contiguous(DataType::Float32, &input, &[1, 2, 2, 2]).expect("input");
        let weights = TensorView::contiguous(DataType::Float32, &weights, &[2, 1, 2, 2]).expect("w");
        let bias = TensorView::contiguous(DataType::Float32, &bias, &[2]).expect("b");
        let attrs = Conv2dAttrs {
            groups: 2,
            ..Conv2dAttrs::default()
        };
        let mut out = vec![0u8; 8];
        {
            let mut output = TensorViewMut::contiguous(DataType::Float32, &mut out, &[1, 2, 1, 1]).expect("out");
            conv2d(&input, &weights, &bias, &mut output, &attrs).expect("conv");
        }
        assert_eq!(read_f32(&out), vec![10.0, 30.0]);
    }

    #[test]
    fn transpose_conv_scatters_with_stride() {
        let input = f32_bytes(&[1.0, 2.0]);
        let weights = f32_bytes(&[1.0, 10.0]);
        let bias = f32_bytes(&[1.0]);
        let input = TensorView::contiguous(DataType::Float32, &input, &[1, 1, 1, 2]).expect("input");
        let weights = TensorView::contiguous(DataType::Float32, &weights, &[1, 1, 1, 2]).expect("w");
        let bias = TensorView::contiguous(DataType::Float32, &bias, &[1]).expect("b");
        let attrs = Conv2dAttrs {
            stride_w: 2,
            ..Conv2dAttrs::default()
        };
        let mut out = vec![0u8; 16];
        {
            let mut output = TensorViewMut::contiguous(DataType::Float32, &mut out, &[1, 1, 1, 4]).expect("out");
            conv2d_transpose(&input, &weights, &bias, &mut output, &attrs).expect("deconv");
        }
        assert_eq!(read_f32(&out), vec![2.0, 11.0, 3.0, 21.0]);
    }

    #[test]
    fn transpose_conv_rejects_a_missized_output() {
        let input = f32_bytes(&[1.0, 2.0]);
        let weights = f32_bytes(&[1.0, 10.0]);
        let bias = f32_bytes(&[1.0]);
        let input = TensorView::contiguous(DataType::Float32, &input, &[1, 1, 1, 2]).expect("input");
        let weights = TensorView::contiguous(DataType::Float32, &weights, &[1, 1, 1, 2]).expect("w");
        let bias = TensorView::contiguous(DataType::Float32, &bias, &[1]).expect("b");
        let attrs = Conv2dAttrs {
            stride_w: 2,
            ..Conv2dAttrs::default()
        };
        let mut out = vec![0u8; 36];
        let err = {
            let mut output = TensorViewMut::contiguous(DataType::Float32, &mut out, &[1, 1, 3, 3]).expect("out");
            conv2d_transpose(&input, &weights, &bias, &mut output, &attrs).unwrap_err()
        };
        assert!(matches!(err, KernelError::ShapeMismatch { .. }), "{err:?}");
        assert_eq!(out, vec![0u8; 36]);
    }

    #[test]
    fn matmul_adds_bias_and_clamps() {
        let a = f32_bytes(&[1.0, 2.0, 3.0, 4.0]);
        let b = f32_bytes(&[1.0, -1.0, 1.0, -1.0]);
        let bias = f32_bytes(&[0.5, 0.5]);
        let a = TensorView::contiguous(DataType::Float32, &a, &[2, 2]).expect("a");
        let b = TensorView::contiguous(DataType::Float32, &b, &[2, 2]).expect("b");
        let bias = TensorView::contiguous(DataType::Float32, &bias, &[2]).expect("bias");
        let mut out = vec![0u8; 16];
        {
            let mut output = TensorViewMut::contiguous(DataType::Float32, &mut out, &[2, 2]).expect("out");
            matmul(&a, &b, &bias, &mut output, ValueRange::relu()).expect("matmul");
        }
        assert_eq!(read_f32(&out), vec![3.5, 0.0, 7.5, 0.0]);
    }
}
