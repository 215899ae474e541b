use nnvm::ir::{BinaryOp, UnaryOp, ValueRange};
use nnvm::tensor::{broadcast_shape, default_strides, IndexIter};
use nnvm::{DataType, TensorView, TensorViewMut};
use nnvm_kernels::{binary, binary_f32, unary, unary_f32};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn to_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn from_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Pairs of broadcast-compatible shapes: each axis of `rhs` is the same
/// extent as `lhs` or 1, and `rhs` may drop leading axes.
fn broadcast_pair() -> impl Strategy<Value = (Vec<usize>, Vec<usize>)> {
    prop::collection::vec((1usize..4, any::<bool>()), 1..4).prop_flat_map(|axes| {
        let lhs: Vec<usize> = axes.iter().map(|(dim, _)| *dim).collect();
        let rhs: Vec<usize> = axes.iter().map(|(dim, keep)| if *keep { *dim } else { 1 }).collect();
        let rank = rhs.len();
        (Just(lhs), Just(rhs), 0..rank).prop_map(|(lhs, rhs, drop)| (lhs, rhs[drop..].to_vec()))
    })
}

fn ops() -> impl Strategy<Value = BinaryOp> {
    prop::sample::select(vec![
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::Min,
        BinaryOp::Max,
    ])
}

fn expand(values: &[f32], shape: &[usize], target: &[usize]) -> Vec<f32> {
    let strides = default_strides(shape);
    let lead = target.len() - shape.len();
    IndexIter::new(target)
        .map(|index| {
            let offset: usize = shape
                .iter()
                .enumerate()
                .map(|(axis, dim)| if *dim == 1 { 0 } else { index[lead + axis] * strides[axis] })
                .sum();
            values[offset]
        })
        .collect()
}

proptest! {
    #[test]
    fn broadcast_binary_matches_scalar_reference(
        (lhs_shape, rhs_shape) in broadcast_pair(),
        op in ops(),
        seed in any::<u64>(),
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let lhs_len: usize = lhs_shape.iter().product();
        let rhs_len: usize = rhs_shape.iter().product();
        let lhs_values: Vec<f32> = (0..lhs_len).map(|_| rng.gen_range(-8.0..8.0)).collect();
        let rhs_values: Vec<f32> = (0..rhs_len).map(|_| rng.gen_range(-8.0..8.0)).collect();

        let out_shape = broadcast_shape(&lhs_shape, &rhs_shape).expect("broadcastable");
        let lhs_bytes = to_bytes(&lhs_values);
        let rhs_bytes = to_bytes(&rhs_values);
        let lhs = TensorView::contiguous(DataType::Float32, &lhs_bytes, &lhs_shape).expect("lhs");
        let rhs = TensorView::contiguous(DataType::Float32, &rhs_bytes, &rhs_shape).expect("rhs");
        let mut out = vec![0u8; out_shape.iter().product::<usize>() * 4];
        {
            let mut output = TensorViewMut::contiguous(DataType::Float32, &mut out, &out_shape).expect("out");
            binary(op, &lhs, &rhs, &mut output, ValueRange::full()).expect("binary");
        }

        let a = expand(&lhs_values, &lhs_shape, &out_shape);
        let b = expand(&rhs_values, &rhs_shape, &out_shape);
        let expected: Vec<f32> = a.iter().zip(&b).map(|(x, y)| binary_f32(op, *x, *y)).collect();
        prop_assert_eq!(from_bytes(&out), expected);
    }
}

#[test]
fn unary_matches_scalar_function_for_seeded_inputs() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let values: Vec<f32> = (0..64).map(|_| rng.gen_range(0.1..4.0)).collect();
    let bytes = to_bytes(&values);
    let input = TensorView::contiguous(DataType::Float32, &bytes, &[4, 16]).expect("input");
    for op in UnaryOp::ALL {
        let mut out = vec![0u8; bytes.len()];
        {
            let mut output = TensorViewMut::contiguous(DataType::Float32, &mut out, &[4, 16]).expect("out");
            unary(*op, &input, &mut output).expect("unary");
        }
        let expected: Vec<f32> = values.iter().map(|v| unary_f32(*op, *v)).collect();
        assert_eq!(from_bytes(&out), expected, "{op}");
    }
}
