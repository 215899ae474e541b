use nnvm::ir::{BinaryOp, UnaryOp, ValueRange};
use nnvm::tensor::{broadcast_shape, IndexIter};
use nnvm::{DataType, KernelError, KernelResult, TensorView, TensorViewMut};

use crate::util::{expect_dtype, expect_shape};

/// Round half to even, the rounding TFLite and TensorFlow use.
#[inline]
pub fn round_half_even(value: f32) -> f32 {
    let floor_val = libm::floorf(value);
    let diff = value - floor_val;
    if diff < 0.5 || (diff == 0.5 && (floor_val as i64) % 2 == 0) {
        floor_val
    } else {
        floor_val + 1.0
    }
}

#[inline]
pub fn unary_f32(op: UnaryOp, a: f32) -> f32 {
    match op {
        UnaryOp::Abs => libm::fabsf(a),
        UnaryOp::Ceil => libm::ceilf(a),
        UnaryOp::Cos => libm::cosf(a),
        UnaryOp::Exp => libm::expf(a),
        UnaryOp::Floor => libm::floorf(a),
        UnaryOp::Log => libm::logf(a),
        UnaryOp::Neg => -a,
        UnaryOp::Round => round_half_even(a),
        UnaryOp::Rsqrt => 1.0 / libm::sqrtf(a),
        UnaryOp::Sin => libm::sinf(a),
        UnaryOp::Sqrt => libm::sqrtf(a),
        UnaryOp::Square => a * a,
        UnaryOp::Tanh => libm::tanhf(a),
    }
}

#[inline]
pub fn binary_f32(op: BinaryOp, a: f32, b: f32) -> f32 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Min => libm::fminf(a, b),
        BinaryOp::Max => libm::fmaxf(a, b),
        BinaryOp::Pow => libm::powf(a, b),
        BinaryOp::FloorDiv => libm::floorf(a / b),
        BinaryOp::FloorMod => a - libm::floorf(a / b) * b,
    }
}

pub fn binary_i32(op: BinaryOp, a: i32, b: i32) -> KernelResult<i32> {
    let needs_divisor = matches!(op, BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::FloorMod);
    if needs_divisor && b == 0 {
        return Err(KernelError::invalid("binary", "integer divide by zero"));
    }
    Ok(match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div => a.wrapping_div(b),
        BinaryOp::Min => a.min(b),
        BinaryOp::Max => a.max(b),
        BinaryOp::Pow => {
            if b < 0 {
                return Err(KernelError::invalid("binary", "negative integer exponent"));
            }
            a.wrapping_pow(b as u32)
        }
        BinaryOp::FloorDiv => floor_div_i32(a, b),
        BinaryOp::FloorMod => a.wrapping_sub(floor_div_i32(a, b).wrapping_mul(b)),
    })
}

fn floor_div_i32(a: i32, b: i32) -> i32 {
    let q = a.wrapping_div(b);
    if a.wrapping_rem(b) != 0 && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

/// Broadcasting binary op with a fused activation clamp.
pub fn binary(
    op: BinaryOp,
    lhs: &TensorView<'_>,
    rhs: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    activation: ValueRange,
) -> KernelResult<()> {
    let dtype = lhs.dtype();
    expect_dtype("binary", rhs.dtype(), dtype)?;
    expect_dtype("binary", output.dtype(), dtype)?;
    let out_shape = broadcast_shape(lhs.shape(), rhs.shape()).ok_or_else(|| {
        KernelError::shape(
            "binary",
            format!("{:?} and {:?} do not broadcast", lhs.shape(), rhs.shape()),
        )
    })?;
    expect_shape("binary", output.shape(), &out_shape)?;
    let lhs = lhs.broadcast_to(&out_shape)?;
    let rhs = rhs.broadcast_to(&out_shape)?;

    match dtype {
        DataType::Float32 => {
            for index in IndexIter::new(&out_shape) {
                let value = binary_f32(op, lhs.read::<f32>(&index), rhs.read::<f32>(&index));
                output.write(&index, activation.apply(value));
            }
        }
        DataType::Int32 => {
            for index in IndexIter::new(&out_shape) {
                let value = binary_i32(op, lhs.read::<i32>(&index), rhs.read::<i32>(&index))?;
                output.write(&index, activation.apply_i32(value));
            }
        }
        other => return Err(KernelError::unsupported_type("binary", other)),
    }
    Ok(())
}

pub fn unary(op: UnaryOp, input: &TensorView<'_>, output: &mut TensorViewMut<'_>) -> KernelResult<()> {
    expect_dtype("unary", input.dtype(), DataType::Float32)?;
    expect_dtype("unary", output.dtype(), DataType::Float32)?;
    expect_shape("unary", output.shape(), input.shape())?;
    for index in IndexIter::new(input.shape()) {
        output.write(&index, unary_f32(op, input.read::<f32>(&index)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{f32_bytes, i32_bytes, read_f32, read_i32};

    #[test]
    fn round_is_bankers_rounding() {
        assert_eq!(round_half_even(0.5), 0.0);
        assert_eq!(round_half_even(1.5), 2.0);
        assert_eq!(round_half_even(2.5), 2.0);
        assert_eq!(round_half_even(-0.5), 0.0);
        assert_eq!(round_half_even(-1.5), -2.0);
        assert_eq!(round_half_even(2.6), 3.0);
        assert_eq!(round_half_even(-2.4), -2.0);
    }

    #[test]
    fn binary_broadcasts_and_clamps() {
        let a = f32_bytes(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = f32_bytes(&[10.0, -10.0, 0.5]);
        let lhs = TensorView::contiguous(DataType::Float32, &a, &[2, 3]).expect("lhs");
        let rhs = TensorView::contiguous(DataType::Float32, &b, &[3]).expect("rhs");
        let mut out = vec![0u8; 24];
        let mut output = TensorViewMut::contiguous(DataType::Float32, &mut out, &[2, 3]).expect("out");
        binary(BinaryOp::Mul, &lhs, &rhs, &mut output, ValueRange::relu6()).expect("mul");
        assert_eq!(read_f32(&out), vec![6.0, 0.0, 1.5, 6.0, 0.0, 3.0]);
    }

    #[test]
    fn binary_rejects_incompatible_shapes() {
        let a = f32_bytes(&[0.0; 6]);
        let b = f32_bytes(&[0.0; 2]);
        let lhs = TensorView::contiguous(DataType::Float32, &a, &[2, 3]).expect("lhs");
        let rhs = TensorView::contiguous(DataType::Float32, &b, &[2]).expect("rhs");
        let mut out = vec![0u8; 24];
        let mut output = TensorViewMut::contiguous(DataType::Float32, &mut out, &[2, 3]).expect("out");
        let err = binary(BinaryOp::Add, &lhs, &rhs, &mut output, ValueRange::full()).unwrap_err();
        assert!(matches!(err, KernelError::ShapeMismatch { .. }));
    }

    #[test]
    fn integer_floor_division_rounds_down() {
        let a = i32_bytes(&[7, -7, 7, -7]);
        let b = i32_bytes(&[2, 2, -2, -2]);
        let lhs = TensorView::contiguous(DataType::Int32, &a, &[4]).expect("lhs");
        let rhs = TensorView::contiguous(DataType::Int32, &b, &[4]).expect("rhs");
        let mut out = vec![0u8; 16];
        {
            let mut output = TensorViewMut::contiguous(DataType::Int32, &mut out, &[4]).expect("out");
            binary(BinaryOp::FloorDiv, &lhs, &rhs, &mut output, ValueRange::full()).expect("div");
        }
        assert_eq!(read_i32(&out), vec![3, -4, -4, 3]);
        {
            let mut output = TensorViewMut::contiguous(DataType::Int32, &mut out, &[4]).expect("out");
            binary(BinaryOp::FloorMod, &lhs, &rhs, &mut output, ValueRange::full()).expect("mod");
        }
        assert_eq!(read_i32(&out), vec![1, 1, -1, -1]);
    }

    #[test]
    fn integer_division_by_zero_fails() {
        assert!(binary_i32(BinaryOp::Div, 1, 0).is_err());
        assert_eq!(binary_i32(BinaryOp::Div, i32::MIN, -1), Ok(i32::MIN));
    }

    #[test]
    fn unary_rejects_integer_inputs() {
        let a = i32_bytes(&[1]);
        let input = TensorView::contiguous(DataType::Int32, &a, &[1]).expect("input");
        let mut out = vec![0u8; 4];
        let mut output = TensorViewMut::contiguous(DataType::Int32, &mut out, &[1]).expect("out");
        assert!(matches!(
            unary(UnaryOp::Abs, &input, &mut output),
            Err(KernelError::UnsupportedType { .. })
        ));
    }
}
