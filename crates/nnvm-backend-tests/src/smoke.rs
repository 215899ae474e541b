use nnvm::ir::{BinaryOp, GraphBuilder, OpKind, Operation, PadMode, ValueRange};
use nnvm::tensor::Padding;
use nnvm::DataType;

use crate::fixtures::{self, bytes_f32, bytes_i32, f32_bytes, i32_bytes};
use crate::runner::GraphRunner;

pub fn matmul_matches_expected<R: GraphRunner>(runner: &R) {
    let mut builder = GraphBuilder::new();
    let a = builder.input("a", DataType::Float32, &[2, 2]);
    let b = builder
        .constant_f32("b", &[2, 2], &[5.0, 6.0, 7.0, 8.0])
        .expect("constant b");
    let bias = builder.constant_f32("bias", &[2], &[0.0, 0.0]).expect("constant bias");
    let y = builder
        .emit(
            "mm",
            Operation::Matmul {
                activation: ValueRange::full(),
            },
            &[a, b, bias],
            DataType::Float32,
        )
        .expect("matmul");
    builder.output("y", y).expect("output");
    let outputs = runner
        .run(&builder.finish(), &[f32_bytes(&[1.0, 2.0, 3.0, 4.0])])
        .expect("run");
    assert_eq!(bytes_f32(&outputs[0]), vec![19.0, 22.0, 43.0, 50.0]);
}

pub fn fused_activation_clamps_binary_result<R: GraphRunner>(runner: &R) {
    let mut builder = GraphBuilder::new();
    let x = builder.input("x", DataType::Float32, &[4]);
    let shift = builder.constant_f32("shift", &[1], &[3.0]).expect("constant");
    let y = builder
        .emit(
            "add",
            Operation::Binary {
                op: BinaryOp::Add,
                activation: ValueRange::relu6(),
            },
            &[x, shift],
            DataType::Float32,
        )
        .expect("add");
    builder.output("y", y).expect("output");
    let outputs = runner
        .run(&builder.finish(), &[f32_bytes(&[-5.0, -1.0, 2.0, 9.0])])
        .expect("run");
    assert_eq!(bytes_f32(&outputs[0]), vec![0.0, 2.0, 5.0, 6.0]);
}

pub fn reflect_pad_mirrors_interior<R: GraphRunner>(runner: &R) {
    let mut builder = GraphBuilder::new();
    let x = builder.input("x", DataType::Int32, &[3]);
    let y = builder
        .emit(
            "pad",
            Operation::Pad {
                paddings: vec![Padding::new(2, 2)],
                mode: PadMode::Reflect,
                pad_value: 0.0,
            },
            &[x],
            DataType::Int32,
        )
        .expect("pad");
    builder.output("y", y).expect("output");
    let outputs = runner.run(&builder.finish(), &[i32_bytes(&[1, 2, 3])]).expect("run");
    assert_eq!(bytes_i32(&outputs[0]), vec![3, 2, 1, 2, 3, 2, 1]);
}

pub fn gather_selects_rows<R: GraphRunner>(runner: &R) {
    let mut builder = GraphBuilder::new();
    let x = builder.input("x", DataType::Float32, &[3, 2]);
    let indices = builder.constant_i32("indices", &[2], &[2, 0]).expect("indices");
    let y = builder
        .emit("gather", Operation::Gather { axis: 0 }, &[x, indices], DataType::Float32)
        .expect("gather");
    builder.output("y", y).expect("output");
    let outputs = runner
        .run(&builder.finish(), &[f32_bytes(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])])
        .expect("run");
    assert_eq!(bytes_f32(&outputs[0]), vec![5.0, 6.0, 1.0, 2.0]);
}

pub fn batch_to_space_interleaves_blocks<R: GraphRunner>(runner: &R) {
    let mut builder = GraphBuilder::new();
    let x = builder.input("x", DataType::Float32, &[4, 1, 1, 1]);
    let y = builder
        .emit(
            "b2s",
            Operation::BatchToSpace {
                block_h: 2,
                block_w: 2,
                crop_h: Padding::zero(),
                crop_w: Padding::zero(),
            },
            &[x],
            DataType::Float32,
        )
        .expect("batch_to_space");
    builder.output("y", y).expect("output");
    let outputs = runner
        .run(&builder.finish(), &[f32_bytes(&[1.0, 2.0, 3.0, 4.0])])
        .expect("run");
    assert_eq!(bytes_f32(&outputs[0]), vec![1.0, 2.0, 3.0, 4.0]);
}

pub fn table_lookup_maps_bytes<R: GraphRunner>(runner: &R) {
    let mut builder = GraphBuilder::new();
    let x = builder.input("x", DataType::UInt8, &[4]);
    let table: Vec<u8> = (0..=255u8).rev().collect();
    let table = builder
        .constant("table", DataType::UInt8, &[256], table)
        .expect("table");
    let y = builder
        .emit("lookup", Operation::TableLookup1d, &[x, table], DataType::UInt8)
        .expect("lookup");
    builder.output("y", y).expect("output");
    let outputs = runner.run(&builder.finish(), &[vec![0, 1, 128, 255]]).expect("run");
    assert_eq!(outputs[0], vec![255, 254, 127, 0]);
}

pub fn rejects_wrong_input_count<R: GraphRunner>(runner: &R) {
    let mut builder = GraphBuilder::new();
    let x = builder.input("x", DataType::Float32, &[1]);
    builder.output("y", x).expect("output");
    let result = runner.run(&builder.finish(), &[]);
    assert!(result.is_err(), "{} accepted a missing input", runner.name());
}

/// Runs every fixture and checks each output has its connector's byte size.
pub fn fixtures_produce_sized_outputs<R: GraphRunner>(runner: &R) {
    let fixtures = fixtures::all().expect("fixtures");
    let covered = fixtures::covered_kinds(&fixtures);
    for kind in OpKind::ALL {
        assert!(covered.contains(kind), "no fixture covers {kind:?}");
    }
    for fixture in &fixtures {
        let outputs = runner
            .run(&fixture.graph, &fixture.inputs)
            .unwrap_or_else(|err| panic!("{} failed on {}: {err:#}", runner.name(), fixture.name));
        let connectors = fixture.graph.output_connectors();
        assert_eq!(outputs.len(), connectors.len(), "{}", fixture.name);
        for (output, connector) in outputs.iter().zip(&connectors) {
            let expected = fixture.graph.connector(*connector).expect("connector").byte_len();
            assert_eq!(output.len(), expected, "{}: {connector}", fixture.name);
        }
    }
}
