//! Value-range kernels: quantize, dequantize, convert, clamp and the u8
//! table lookup.

use nnvm::ir::QuantParam;
use nnvm::tensor::IndexIter;
use nnvm::{DataType, KernelError, KernelResult, TensorView, TensorViewMut};

use crate::elementwise::round_half_even;
use crate::util::{expect_dtype, expect_shape};

fn quantized_target(dtype: DataType) -> bool {
    matches!(
        dtype,
        DataType::UInt8
            | DataType::Int8
            | DataType::QuantUInt8
            | DataType::QuantInt8
            | DataType::Int16
            | DataType::UInt16
            | DataType::Int32
    )
}

/// Affine quantization of one value into the range of `dtype`.
#[inline]
pub fn quantize_value(value: f32, param: QuantParam, dtype: DataType) -> f64 {
    let (low, high) = dtype.value_range();
    let scaled = round_half_even(value / param.scale + param.zero_point as f32) as f64;
    if scaled.is_nan() {
        return param.zero_point as f64;
    }
    scaled.clamp(low, high)
}

/// `q = clamp(round_half_even(x / scale + zero_point))`.
pub fn quantize(input: &TensorView<'_>, output: &mut TensorViewMut<'_>, param: QuantParam) -> KernelResult<()> {
    const OP: &str = "quantize";
    expect_dtype(OP, input.dtype(), DataType::Float32)?;
    if !quantized_target(output.dtype()) {
        return Err(KernelError::unsupported_type(OP, output.dtype()));
    }
    if !(param.scale.is_finite() && param.scale != 0.0) {
        return Err(KernelError::invalid(OP, format!("scale {} is not usable", param.scale)));
    }
    expect_shape(OP, output.shape(), input.shape())?;
    let dtype = output.dtype();
    for index in IndexIter::new(input.shape()) {
        let value = quantize_value(input.read::<f32>(&index), param, dtype);
        output.write_f64(&index, value);
    }
    Ok(())
}

/// `real = (q - zero_point) * scale`, reading `q` at the input's own type.
pub fn dequantize(input: &TensorView<'_>, output: &mut TensorViewMut<'_>, param: QuantParam) -> KernelResult<()> {
    const OP: &str = "dequantize";
    if !input.dtype().is_integer() {
        return Err(KernelError::unsupported_type(OP, input.dtype()));
    }
    expect_dtype(OP, output.dtype(), DataType::Float32)?;
    expect_shape(OP, output.shape(), input.shape())?;
    for index in IndexIter::new(input.shape()) {
        let q = input.read_f64(&index);
        let real = ((q - param.zero_point as f64) as f32) * param.scale;
        output.write(&index, real);
    }
    Ok(())
}

/// Numeric conversion between any two data types. Float to integer truncates
/// toward zero and saturates.
pub fn convert(input: &TensorView<'_>, output: &mut TensorViewMut<'_>) -> KernelResult<()> {
    expect_shape("convert", output.shape(), input.shape())?;
    for index in IndexIter::new(input.shape()) {
        let value = input.read_f64(&index);
        output.write_f64(&index, value);
    }
    Ok(())
}

/// Clamps `input` to the scalar bounds held in the first element of `low`
/// and `high`.
pub fn clamp(
    input: &TensorView<'_>,
    low: &TensorView<'_>,
    high: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
) -> KernelResult<()> {
    const OP: &str = "clamp";
    expect_dtype(OP, output.dtype(), input.dtype())?;
    expect_dtype(OP, low.dtype(), input.dtype())?;
    expect_dtype(OP, high.dtype(), input.dtype())?;
    expect_shape(OP, output.shape(), input.shape())?;
    match input.dtype() {
        DataType::Float32 => {
            let (low, high) = (low.first::<f32>()?, high.first::<f32>()?);
            for index in IndexIter::new(input.shape()) {
                let value = input.read::<f32>(&index);
                output.write(&index, libm::fminf(libm::fmaxf(value, low), high));
            }
        }
        DataType::Int32 => {
            let (low, high) = (low.first::<i32>()?, high.first::<i32>()?);
            for index in IndexIter::new(input.shape()) {
                let value = input.read::<i32>(&index);
                output.write(&index, value.max(low).min(high));
            }
        }
        other => return Err(KernelError::unsupported_type(OP, other)),
    }
    Ok(())
}

/// `output[i] = table[input[i]]` over a 256-entry byte table.
pub fn table_lookup1d(
    input: &TensorView<'_>,
    table: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
) -> KernelResult<()> {
    const OP: &str = "table_lookup1d";
    if input.dtype().storage() != DataType::UInt8 {
        return Err(KernelError::unsupported_type(OP, input.dtype()));
    }
    expect_dtype(OP, output.dtype(), input.dtype())?;
    if table.dtype().storage() != DataType::UInt8 || table.element_count() != 256 {
        return Err(KernelError::shape(
            OP,
            format!("table must hold 256 u8 entries, got {:?} {}", table.shape(), table.dtype()),
        ));
    }
    expect_shape(OP, output.shape(), input.shape())?;
    let entries = table.to_contiguous_bytes();
    for index in IndexIter::new(input.shape()) {
        let key = input.read::<u8>(&index);
        output.write(&index, entries[key as usize]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{f32_bytes, i32_bytes, read_f32, read_i32};

    fn run_quantize(values: &[f32], param: QuantParam, dtype: DataType) -> Vec<u8> {
        let bytes = f32_bytes(values);
        let input = TensorView::contiguous(DataType::Float32, &bytes, &[values.len()]).expect("input");
        let mut out = vec![0u8; values.len() * dtype.size_in_bytes()];
        {
            let mut output = TensorViewMut::contiguous(dtype, &mut out, &[values.len()]).expect("out");
            quantize(&input, &mut output, param).expect("quantize");
        }
        out
    }

    #[test]
    fn quantize_rounds_half_to_even_and_saturates() {
        let param = QuantParam::new(0.5, 10);
        let out = run_quantize(&[0.25, 0.75, -100.0, 100.0], param, DataType::UInt8);
        // 0.25/0.5 + 10 = 10.5 -> 10, 0.75/0.5 + 10 = 11.5 -> 12
        assert_eq!(out, vec![10, 12, 0, 255]);
        let out = run_quantize(&[1000.0, -1000.0], QuantParam::new(1.0, 0), DataType::Int8);
        assert_eq!(out, vec![127, (-128i8) as u8]);
    }

    #[test]
    fn dequantize_reads_the_input_type() {
        let q = i32_bytes(&[-3, 0, 7]);
        let input = TensorView::contiguous(DataType::Int32, &q, &[3]).expect("input");
        let mut out = vec![0u8; 12];
        {
            let mut output = TensorViewMut::contiguous(DataType::Float32, &mut out, &[3]).expect("out");
            dequantize(&input, &mut output, QuantParam::new(0.25, 1)).expect("dequantize");
        }
        assert_eq!(read_f32(&out), vec![-1.0, -0.25, 1.5]);
    }

    #[test]
    fn round_trip_is_within_one_step_and_idempotent() {
        let param = QuantParam::new(0.1, 128);
        let values: Vec<f32> = (0..50).map(|v| -12.0 + v as f32 * 0.49).collect();
        let first = run_quantize(&values, param, DataType::QuantUInt8);

        let deq = |q: &[u8]| -> Vec<f32> {
            let input = TensorView::contiguous(DataType::QuantUInt8, q, &[q.len()]).expect("input");
            let mut out = vec![0u8; q.len() * 4];
            {
                let mut output = TensorViewMut::contiguous(DataType::Float32, &mut out, &[q.len()]).expect("out");
                dequantize(&input, &mut output, param).expect("dequantize");
            }
            read_f32(&out)
        };
        let restored = deq(&first);
        for (x, y) in values.iter().zip(&restored) {
            assert!((x - y).abs() <= param.scale + 1e-5, "{x} vs {y}");
        }
        let second = run_quantize(&restored, param, DataType::QuantUInt8);
        assert_eq!(first, second);
    }

    #[test]
    fn convert_truncates_and_saturates() {
        let bytes = f32_bytes(&[-1.7, 2.9, 300.0, -5.0]);
        let input = TensorView::contiguous(DataType::Float32, &bytes, &[4]).expect("input");
        let mut out = vec![0u8; 4];
        {
            let mut output = TensorViewMut::contiguous(DataType::UInt8, &mut out, &[4]).expect("out");
            convert(&input, &mut output).expect("convert");
        }
        assert_eq!(out, vec![0, 2, 255, 0]);
    }

    #[test]
    fn clamp_uses_the_first_bound_element() {
        let data = i32_bytes(&[-5, 0, 5, 10]);
        let low = i32_bytes(&[-1, 99]);
        let high = i32_bytes(&[6]);
        let input = TensorView::contiguous(DataType::Int32, &data, &[4]).expect("input");
        let low = TensorView::contiguous(DataType::Int32, &low, &[2]).expect("low");
        let high = TensorView::contiguous(DataType::Int32, &high, &[1]).expect("high");
        let mut out = vec![0u8; 16];
        {
            let mut output = TensorViewMut::contiguous(DataType::Int32, &mut out, &[4]).expect("out");
            clamp(&input, &low, &high, &mut output).expect("clamp");
        }
        assert_eq!(read_i32(&out), vec![-1, 0, 5, 6]);
    }

    #[test]
    fn table_lookup_maps_every_byte() {
        let table: Vec<u8> = (0..=255u8).map(|v| v.wrapping_mul(3)).collect();
        let data = vec![0u8, 1, 100, 255];
        let input = TensorView::contiguous(DataType::UInt8, &data, &[2, 2]).expect("input");
        let table = TensorView::contiguous(DataType::UInt8, &table, &[256]).expect("table");
        let mut out = vec![0u8; 4];
        {
            let mut output = TensorViewMut::contiguous(DataType::UInt8, &mut out, &[2, 2]).expect("out");
            table_lookup1d(&input, &table, &mut output).expect("lookup");
        }
        assert_eq!(out, vec![0, 3, 44, 253]);
    }
}
