//! Small graphs that together exercise every operator kind, with seeded
//! inputs.

use std::collections::BTreeSet;

use anyhow::Result;
use nnvm::ir::{
    BinaryOp, Conv2dAttrs, ConnectorId, FusedSubgraph, Graph, GraphBuilder, OpKind, Operation, PadMode,
    QuantParam, ReduceOp, ReduceWindow2dAttrs, ResizeMode, UnaryOp, ValueRange,
};
use nnvm::tensor::{element_count, Padding};
use nnvm::DataType;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub struct Fixture {
    pub name: &'static str,
    pub graph: Graph,
    /// Row-major bytes per graph input, in declaration order.
    pub inputs: Vec<Vec<u8>>,
}

pub fn f32_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn i32_bytes(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn bytes_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

pub fn bytes_i32(bytes: &[u8]) -> Vec<i32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

pub fn random_f32(rng: &mut StdRng, count: usize, low: f32, high: f32) -> Vec<f32> {
    (0..count).map(|_| rng.gen_range(low..high)).collect()
}

/// Every fixture, in a stable order.
pub fn all() -> Result<Vec<Fixture>> {
    Ok(vec![
        binary_broadcast()?,
        binary_int32()?,
        unary_all()?,
        conv2d()?,
        conv2d_grouped()?,
        conv2d_transpose()?,
        matmul()?,
        pad_modes()?,
        slice_transpose_concat()?,
        reduce()?,
        reduce_window2d()?,
        quantize_round_trip()?,
        resize_image()?,
        gather()?,
        gather_nd()?,
        bitcast()?,
        clamp()?,
        convert()?,
        fused_unary()?,
        batch_to_space()?,
        table_lookup1d()?,
        ignore()?,
    ])
}

pub fn covered_kinds(fixtures: &[Fixture]) -> BTreeSet<OpKind> {
    fixtures
        .iter()
        .flat_map(|fixture| fixture.graph.nodes().iter().map(|node| node.kind()))
        .collect()
}

fn float_input(
    builder: &mut GraphBuilder,
    rng: &mut StdRng,
    inputs: &mut Vec<Vec<u8>>,
    name: &str,
    shape: &[usize],
) -> ConnectorId {
    inputs.push(f32_bytes(&random_f32(rng, element_count(shape), -2.0, 2.0)));
    builder.input(name, DataType::Float32, shape)
}

fn random_constant(
    builder: &mut GraphBuilder,
    rng: &mut StdRng,
    name: &str,
    shape: &[usize],
) -> Result<ConnectorId> {
    let values = random_f32(rng, element_count(shape), -1.0, 1.0);
    Ok(builder.constant_f32(name, shape, &values)?)
}

fn binary(op: BinaryOp, activation: ValueRange) -> Operation {
    Operation::Binary { op, activation }
}

fn binary_broadcast() -> Result<Fixture> {
    let mut rng = StdRng::seed_from_u64(1);
    let mut builder = GraphBuilder::new();
    let mut inputs = Vec::new();
    let x = float_input(&mut builder, &mut rng, &mut inputs, "x", &[2, 3]);
    let bias = builder.constant_f32("bias", &[1, 3], &[0.5, -1.0, 2.0])?;
    let sum = builder.emit("sum", binary(BinaryOp::Add, ValueRange::relu()), &[x, bias], DataType::Float32)?;
    let prod = builder.emit("prod", binary(BinaryOp::Mul, ValueRange::full()), &[sum, x], DataType::Float32)?;
    let scale = builder.constant_f32("scale", &[], &[3.0])?;
    let ratio = builder.emit("ratio", binary(BinaryOp::Div, ValueRange::relu6()), &[prod, scale], DataType::Float32)?;
    builder.output("y", ratio)?;
    builder.output("sum_out", sum)?;
    Ok(Fixture {
        name: "binary_broadcast",
        graph: builder.finish(),
        inputs,
    })
}

fn binary_int32() -> Result<Fixture> {
    let mut builder = GraphBuilder::new();
    let x = builder.input("x", DataType::Int32, &[4]);
    let d = builder.constant_i32("d", &[4], &[2, 2, -4, -4])?;
    let quotient = builder.emit("q", binary(BinaryOp::FloorDiv, ValueRange::full()), &[x, d], DataType::Int32)?;
    let remainder = builder.emit("r", binary(BinaryOp::FloorMod, ValueRange::full()), &[x, d], DataType::Int32)?;
    let larger = builder.emit("m", binary(BinaryOp::Max, ValueRange::full()), &[x, d], DataType::Int32)?;
    builder.output("q_out", quotient)?;
    builder.output("r_out", remainder)?;
    builder.output("m_out", larger)?;
    Ok(Fixture {
        name: "binary_int32",
        graph: builder.finish(),
        inputs: vec![i32_bytes(&[7, -7, 9, -9])],
    })
}

/// Every unary op over a strictly positive operand.
fn unary_all() -> Result<Fixture> {
    let mut rng = StdRng::seed_from_u64(2);
    let mut builder = GraphBuilder::new();
    let mut inputs = Vec::new();
    let x = float_input(&mut builder, &mut rng, &mut inputs, "x", &[3, 4]);
    let magnitude = builder.emit("abs", Operation::Unary { op: UnaryOp::Abs }, &[x], DataType::Float32)?;
    let offset = builder.constant_f32("offset", &[1], &[0.5])?;
    let positive = builder.emit(
        "positive",
        binary(BinaryOp::Add, ValueRange::full()),
        &[magnitude, offset],
        DataType::Float32,
    )?;
    for op in UnaryOp::ALL {
        let y = builder.emit(op.name(), Operation::Unary { op: *op }, &[positive], DataType::Float32)?;
        builder.output(format!("{}_out", op.name()), y)?;
    }
    Ok(Fixture {
        name: "unary_all",
        graph: builder.finish(),
        inputs,
    })
}

fn conv2d() -> Result<Fixture> {
    let mut rng = StdRng::seed_from_u64(3);
    let mut builder = GraphBuilder::new();
    let mut inputs = Vec::new();
    let x = float_input(&mut builder, &mut rng, &mut inputs, "x", &[1, 2, 5, 5]);
    let weights = random_constant(&mut builder, &mut rng, "w", &[3, 2, 3, 3])?;
    let bias = random_constant(&mut builder, &mut rng, "b", &[3])?;
    let attrs = Conv2dAttrs {
        padding_h: Padding::new(1, 1),
        padding_w: Padding::new(1, 1),
        stride_h: 2,
        stride_w: 2,
        activation: ValueRange::relu6(),
        ..Conv2dAttrs::default()
    };
    let y = builder.emit("conv", Operation::Conv2d(attrs), &[x, weights, bias], DataType::Float32)?;
    builder.output("y", y)?;
    Ok(Fixture {
        name: "conv2d",
        graph: builder.finish(),
        inputs,
    })
}

fn conv2d_grouped() -> Result<Fixture> {
    let mut rng = StdRng::seed_from_u64(4);
    let mut builder = GraphBuilder::new();
    let mut inputs = Vec::new();
    let x = float_input(&mut builder, &mut rng, &mut inputs, "x", &[1, 4, 6, 6]);
    let weights = random_constant(&mut builder, &mut rng, "w", &[4, 2, 3, 3])?;
    let bias = random_constant(&mut builder, &mut rng, "b", &[4])?;
    let attrs = Conv2dAttrs {
        groups: 2,
        padding_h: Padding::new(2, 2),
        padding_w: Padding::new(1, 2),
        dilation_h: 2,
        dilation_w: 2,
        ..Conv2dAttrs::default()
    };
    let y = builder.emit("conv", Operation::Conv2d(attrs), &[x, weights, bias], DataType::Float32)?;
    builder.output("y", y)?;
    Ok(Fixture {
        name: "conv2d_grouped",
        graph: builder.finish(),
        inputs,
    })
}

fn conv2d_transpose() -> Result<Fixture> {
    let mut rng = StdRng::seed_from_u64(5);
    let mut builder = GraphBuilder::new();
    let mut inputs = Vec::new();
    let x = float_input(&mut builder, &mut rng, &mut inputs, "x", &[1, 2, 3, 3]);
    let weights = random_constant(&mut builder, &mut rng, "w", &[3, 2, 3, 3])?;
    let bias = random_constant(&mut builder, &mut rng, "b", &[3])?;
    let attrs = Conv2dAttrs {
        padding_h: Padding::new(1, 1),
        padding_w: Padding::new(1, 1),
        stride_h: 2,
        stride_w: 2,
        ..Conv2dAttrs::default()
    };
    let y = builder.emit(
        "deconv",
        Operation::Conv2dTranspose(attrs),
        &[x, weights, bias],
        DataType::Float32,
    )?;
    builder.output("y", y)?;
    Ok(Fixture {
        name: "conv2d_transpose",
        graph: builder.finish(),
        inputs,
    })
}

fn matmul() -> Result<Fixture> {
    let mut rng = StdRng::seed_from_u64(6);
    let mut builder = GraphBuilder::new();
    let mut inputs = Vec::new();
    let x = float_input(&mut builder, &mut rng, &mut inputs, "x", &[2, 3]);
    let weights = random_constant(&mut builder, &mut rng, "w", &[3, 4])?;
    let bias = random_constant(&mut builder, &mut rng, "b", &[4])?;
    let y = builder.emit(
        "fc",
        Operation::Matmul {
            activation: ValueRange::new(-1.0, 1.0),
        },
        &[x, weights, bias],
        DataType::Float32,
    )?;
    builder.output("y", y)?;
    Ok(Fixture {
        name: "matmul",
        graph: builder.finish(),
        inputs,
    })
}

fn pad_modes() -> Result<Fixture> {
    let mut rng = StdRng::seed_from_u64(7);
    let mut builder = GraphBuilder::new();
    let mut inputs = Vec::new();
    let x = float_input(&mut builder, &mut rng, &mut inputs, "x", &[1, 1, 3, 3]);
    let spatial = |h: Padding, w: Padding| vec![Padding::zero(), Padding::zero(), h, w];
    let cases = [
        ("constant", PadMode::Constant, spatial(Padding::new(-1, 1), Padding::new(1, 0))),
        ("reflect", PadMode::Reflect, spatial(Padding::new(1, 1), Padding::new(2, 2))),
        ("symmetric", PadMode::Symmetric, spatial(Padding::new(2, 1), Padding::new(0, 3))),
        ("edge", PadMode::Edge, spatial(Padding::new(1, 2), Padding::new(2, 1))),
    ];
    for (name, mode, paddings) in cases {
        let y = builder.emit(
            name,
            Operation::Pad {
                paddings,
                mode,
                pad_value: 9.0,
            },
            &[x],
            DataType::Float32,
        )?;
        builder.output(format!("{name}_out"), y)?;
    }
    Ok(Fixture {
        name: "pad_modes",
        graph: builder.finish(),
        inputs,
    })
}

fn slice_transpose_concat() -> Result<Fixture> {
    let mut rng = StdRng::seed_from_u64(8);
    let mut builder = GraphBuilder::new();
    let mut inputs = Vec::new();
    let x = float_input(&mut builder, &mut rng, &mut inputs, "x", &[4, 5]);
    let cube = float_input(&mut builder, &mut rng, &mut inputs, "cube", &[2, 3, 4]);
    let forward = builder.emit(
        "forward",
        Operation::Slice {
            begin: vec![1, 0],
            end: vec![4, 5],
            strides: vec![1, 2],
        },
        &[x],
        DataType::Float32,
    )?;
    let backward = builder.emit(
        "backward",
        Operation::Slice {
            begin: vec![3, 4],
            end: vec![0, 0],
            strides: vec![-1, -2],
        },
        &[x],
        DataType::Float32,
    )?;
    let flipped = builder.emit("flipped", Operation::Transpose { perm: vec![1, 0] }, &[forward], DataType::Float32)?;
    let extra = random_constant(&mut builder, &mut rng, "extra", &[3, 2])?;
    let joined = builder.emit(
        "joined",
        Operation::Concat { axis: 1 },
        &[flipped, backward, extra],
        DataType::Float32,
    )?;
    let rotated = builder.emit(
        "rotated",
        Operation::Transpose { perm: vec![2, 0, 1] },
        &[cube],
        DataType::Float32,
    )?;
    builder.output("joined_out", joined)?;
    builder.output("rotated_out", rotated)?;
    Ok(Fixture {
        name: "slice_transpose_concat",
        graph: builder.finish(),
        inputs,
    })
}

fn reduce() -> Result<Fixture> {
    let mut rng = StdRng::seed_from_u64(9);
    let mut builder = GraphBuilder::new();
    let mut inputs = Vec::new();
    let x = float_input(&mut builder, &mut rng, &mut inputs, "x", &[2, 3, 4]);
    let cases = [
        ("sum", ReduceOp::Sum, vec![1], 0.0, true),
        ("max", ReduceOp::Max, vec![0, 2], f32::NEG_INFINITY, false),
        ("mean", ReduceOp::Mean, vec![0, 1, 2], 0.0, false),
        ("prod", ReduceOp::Prod, vec![2], 1.0, true),
        ("min", ReduceOp::Min, vec![0], f32::INFINITY, false),
    ];
    for (name, op, axes, init_value, keep_dims) in cases {
        let y = builder.emit(
            name,
            Operation::Reduce {
                op,
                axes,
                init_value,
                keep_dims,
            },
            &[x],
            DataType::Float32,
        )?;
        builder.output(format!("{name}_out"), y)?;
    }
    Ok(Fixture {
        name: "reduce",
        graph: builder.finish(),
        inputs,
    })
}

fn reduce_window2d() -> Result<Fixture> {
    let mut rng = StdRng::seed_from_u64(10);
    let mut builder = GraphBuilder::new();
    let mut inputs = Vec::new();
    let x = float_input(&mut builder, &mut rng, &mut inputs, "x", &[1, 2, 4, 4]);
    let max_pool = ReduceWindow2dAttrs::pool(ReduceOp::Max, 2, 2);
    let avg_pool = ReduceWindow2dAttrs {
        padding_h: Padding::new(1, 1),
        padding_w: Padding::new(1, 1),
        activation: ValueRange::relu(),
        ..ReduceWindow2dAttrs::pool(ReduceOp::Mean, 3, 1)
    };
    let max = builder.emit("max_pool", Operation::ReduceWindow2d(max_pool), &[x], DataType::Float32)?;
    let avg = builder.emit("avg_pool", Operation::ReduceWindow2d(avg_pool), &[x], DataType::Float32)?;
    builder.output("max_out", max)?;
    builder.output("avg_out", avg)?;
    Ok(Fixture {
        name: "reduce_window2d",
        graph: builder.finish(),
        inputs,
    })
}

fn quantize_round_trip() -> Result<Fixture> {
    let mut builder = GraphBuilder::new();
    let x = builder.input("x", DataType::Float32, &[8]);
    let unsigned = QuantParam::new(0.05, 128);
    let signed = QuantParam::new(0.1, -3);
    let q = builder.emit("q", Operation::Quantize { param: unsigned }, &[x], DataType::QuantUInt8)?;
    let dq = builder.emit("dq", Operation::Dequantize { param: unsigned }, &[q], DataType::Float32)?;
    let qs = builder.emit("qs", Operation::Quantize { param: signed }, &[x], DataType::QuantInt8)?;
    let dqs = builder.emit("dqs", Operation::Dequantize { param: signed }, &[qs], DataType::Float32)?;
    builder.output("q_out", q)?;
    builder.output("dq_out", dq)?;
    builder.output("dqs_out", dqs)?;
    let values = [-7.0, -1.234, -0.025, 0.0, 0.025, 0.075, 3.3, 42.0];
    Ok(Fixture {
        name: "quantize_round_trip",
        graph: builder.finish(),
        inputs: vec![f32_bytes(&values)],
    })
}

fn resize_image() -> Result<Fixture> {
    let mut rng = StdRng::seed_from_u64(11);
    let mut builder = GraphBuilder::new();
    let mut inputs = Vec::new();
    let x = float_input(&mut builder, &mut rng, &mut inputs, "x", &[1, 2, 3, 3]);
    let cases = [
        ("bilinear_half_pixel", ResizeMode::Bilinear, [5, 4], false, true),
        ("bilinear_corners", ResizeMode::Bilinear, [4, 4], true, false),
        ("nearest_half_pixel", ResizeMode::NearestNeighbor, [6, 6], false, true),
        ("nearest_corners", ResizeMode::NearestNeighbor, [5, 2], true, false),
    ];
    for (name, mode, new_size, align_corners, half_pixel_centers) in cases {
        let y = builder.emit(
            name,
            Operation::ResizeImage {
                mode,
                new_size,
                align_corners,
                half_pixel_centers,
            },
            &[x],
            DataType::Float32,
        )?;
        builder.output(format!("{name}_out"), y)?;
    }
    Ok(Fixture {
        name: "resize_image",
        graph: builder.finish(),
        inputs,
    })
}

fn gather() -> Result<Fixture> {
    let mut rng = StdRng::seed_from_u64(12);
    let mut builder = GraphBuilder::new();
    let mut inputs = Vec::new();
    let x = float_input(&mut builder, &mut rng, &mut inputs, "x", &[4, 3]);
    let rows = builder.constant_i32("rows", &[2, 2], &[3, 0, 1, 1])?;
    let cols = builder.constant_i32("cols", &[2], &[2, 0])?;
    let by_row = builder.emit("by_row", Operation::Gather { axis: 0 }, &[x, rows], DataType::Float32)?;
    let by_col = builder.emit("by_col", Operation::Gather { axis: 1 }, &[x, cols], DataType::Float32)?;
    builder.output("rows_out", by_row)?;
    builder.output("cols_out", by_col)?;
    Ok(Fixture {
        name: "gather",
        graph: builder.finish(),
        inputs,
    })
}

fn gather_nd() -> Result<Fixture> {
    let mut builder = GraphBuilder::new();
    let x = builder.input("x", DataType::Float32, &[2, 2]);
    let batched = builder.input("batched", DataType::Float32, &[2, 3]);
    let rows = builder.constant_i32("rows", &[2, 1], &[1, 0])?;
    let picks = builder.constant_i32("picks", &[2, 1], &[2, 0])?;
    let points = builder.constant_i32("points", &[3, 2], &[0, 1, 1, 1, 1, 0])?;
    let by_row = builder.emit("by_row", Operation::GatherNd { batch_dims: 0 }, &[x, rows], DataType::Float32)?;
    let by_batch = builder.emit(
        "by_batch",
        Operation::GatherNd { batch_dims: 1 },
        &[batched, picks],
        DataType::Float32,
    )?;
    let by_point = builder.emit("by_point", Operation::GatherNd { batch_dims: 0 }, &[x, points], DataType::Float32)?;
    builder.output("rows_out", by_row)?;
    builder.output("batch_out", by_batch)?;
    builder.output("points_out", by_point)?;
    Ok(Fixture {
        name: "gather_nd",
        graph: builder.finish(),
        inputs: vec![
            f32_bytes(&[1.0, 2.0, 3.0, 4.0]),
            f32_bytes(&[1.0, 2.0, 3.0, 10.0, 20.0, 30.0]),
        ],
    })
}

/// One aliased intermediate bitcast and one copying output bitcast.
fn bitcast() -> Result<Fixture> {
    let mut rng = StdRng::seed_from_u64(13);
    let mut builder = GraphBuilder::new();
    let mut inputs = Vec::new();
    let x = float_input(&mut builder, &mut rng, &mut inputs, "x", &[2, 3]);
    let neg = builder.emit("neg", Operation::Unary { op: UnaryOp::Neg }, &[x], DataType::Float32)?;
    let flat = builder.emit_shaped("flat", Operation::Bitcast, &[neg], DataType::Float32, &[6])?;
    let abs = builder.emit("abs", Operation::Unary { op: UnaryOp::Abs }, &[flat], DataType::Float32)?;
    let bits = builder.emit_shaped("bits", Operation::Bitcast, &[abs], DataType::Int32, &[3, 2])?;
    builder.output("y", bits)?;
    Ok(Fixture {
        name: "bitcast",
        graph: builder.finish(),
        inputs,
    })
}

fn clamp() -> Result<Fixture> {
    let mut rng = StdRng::seed_from_u64(14);
    let mut builder = GraphBuilder::new();
    let mut inputs = Vec::new();
    let x = float_input(&mut builder, &mut rng, &mut inputs, "x", &[6]);
    let low = builder.constant_f32("low", &[1], &[-0.5])?;
    let high = builder.constant_f32("high", &[1], &[0.75])?;
    let y = builder.emit("clamp", Operation::Clamp, &[x, low, high], DataType::Float32)?;
    builder.output("y", y)?;
    Ok(Fixture {
        name: "clamp",
        graph: builder.finish(),
        inputs,
    })
}

fn convert() -> Result<Fixture> {
    let mut builder = GraphBuilder::new();
    let x = builder.input("x", DataType::Float32, &[6]);
    let to_int = builder.emit("to_int", Operation::Convert, &[x], DataType::Int32)?;
    let to_byte = builder.emit("to_byte", Operation::Convert, &[x], DataType::UInt8)?;
    let back = builder.emit("back", Operation::Convert, &[to_int], DataType::Float32)?;
    builder.output("int_out", to_int)?;
    builder.output("byte_out", to_byte)?;
    builder.output("back_out", back)?;
    Ok(Fixture {
        name: "convert",
        graph: builder.finish(),
        inputs: vec![f32_bytes(&[-300.0, -1.5, 0.0, 2.5, 254.9, 1e6])],
    })
}

/// `clamp(tanh(x * 0.5) + 1, 0.2, 1.5)`.
fn fused_unary() -> Result<Fixture> {
    let mut rng = StdRng::seed_from_u64(15);
    let mut builder = GraphBuilder::new();
    let mut inputs = Vec::new();
    let x = float_input(&mut builder, &mut rng, &mut inputs, "x", &[2, 4]);
    let mut subgraph = FusedSubgraph::new();
    let input = subgraph.input();
    let half = subgraph.constant(0.5);
    let scaled = subgraph.binary(BinaryOp::Mul, input, half);
    let squashed = subgraph.unary(UnaryOp::Tanh, scaled);
    let one = subgraph.constant(1.0);
    let shifted = subgraph.binary(BinaryOp::Add, squashed, one);
    let low = subgraph.constant(0.2);
    let high = subgraph.constant(1.5);
    subgraph.clamp(shifted, low, high);
    let y = builder.emit("fused", Operation::FusedUnary { subgraph }, &[x], DataType::Float32)?;
    builder.output("y", y)?;
    Ok(Fixture {
        name: "fused_unary",
        graph: builder.finish(),
        inputs,
    })
}

fn batch_to_space() -> Result<Fixture> {
    let mut rng = StdRng::seed_from_u64(16);
    let mut builder = GraphBuilder::new();
    let mut inputs = Vec::new();
    let x = float_input(&mut builder, &mut rng, &mut inputs, "x", &[4, 1, 2, 3]);
    let y = builder.emit(
        "b2s",
        Operation::BatchToSpace {
            block_h: 2,
            block_w: 2,
            crop_h: Padding::new(0, 1),
            crop_w: Padding::new(1, 0),
        },
        &[x],
        DataType::Float32,
    )?;
    builder.output("y", y)?;
    Ok(Fixture {
        name: "batch_to_space",
        graph: builder.finish(),
        inputs,
    })
}

fn table_lookup1d() -> Result<Fixture> {
    let mut builder = GraphBuilder::new();
    let x = builder.input("x", DataType::UInt8, &[8]);
    let table: Vec<u8> = (0..=255u8).map(|i| i.wrapping_mul(7).wrapping_add(3)).collect();
    let table = builder.constant("table", DataType::UInt8, &[256], table)?;
    let y = builder.emit("lookup", Operation::TableLookup1d, &[x, table], DataType::UInt8)?;
    builder.output("y", y)?;
    Ok(Fixture {
        name: "table_lookup1d",
        graph: builder.finish(),
        inputs: vec![vec![0, 1, 2, 17, 128, 200, 254, 255]],
    })
}

/// An ignored consumer next to a live one.
fn ignore() -> Result<Fixture> {
    let mut builder = GraphBuilder::new();
    let x = builder.input("x", DataType::Float32, &[3]);
    let neg = builder.emit("neg", Operation::Unary { op: UnaryOp::Neg }, &[x], DataType::Float32)?;
    let unused = builder.emit("unused", Operation::Unary { op: UnaryOp::Exp }, &[x], DataType::Float32)?;
    builder.add_node("drop", Operation::Ignore, &[unused], &[])?;
    builder.output("y", neg)?;
    Ok(Fixture {
        name: "ignore",
        graph: builder.finish(),
        inputs: vec![f32_bytes(&[1.0, -2.0, 0.5])],
    })
}
