use nnvm::ir::{Graph, GraphBuilder, OpKind, Operation};
use nnvm::{DataType, KernelError};
use nnvm_backend_ref::EvalError;
use nnvm_backend_tests::fixtures::{self, f32_bytes};
use nnvm_backend_tests::runner::{EvaluatorRunner, GraphRunner, StackvmRunner};
use nnvm_backend_tests::vm::{StackVm, VmError};
use proptest::prelude::*;

#[test]
fn fixtures_cover_every_operator_kind() {
    let fixtures = fixtures::all().expect("fixtures");
    let covered = fixtures::covered_kinds(&fixtures);
    let missing: Vec<OpKind> = OpKind::ALL
        .iter()
        .copied()
        .filter(|kind| !covered.contains(kind))
        .collect();
    assert!(missing.is_empty(), "uncovered kinds: {missing:?}");
}

#[test]
fn evaluator_and_stackvm_agree_bitwise() {
    let evaluator = EvaluatorRunner::neutral().expect("evaluator");
    let stackvm = StackvmRunner::new();
    for fixture in fixtures::all().expect("fixtures") {
        let expected = evaluator
            .run(&fixture.graph, &fixture.inputs)
            .unwrap_or_else(|err| panic!("evaluator failed on {}: {err:#}", fixture.name));
        let actual = stackvm
            .run(&fixture.graph, &fixture.inputs)
            .unwrap_or_else(|err| panic!("stackvm failed on {}: {err:#}", fixture.name));
        assert_eq!(expected.len(), actual.len(), "{}", fixture.name);
        for (index, (lhs, rhs)) in expected.iter().zip(&actual).enumerate() {
            assert_eq!(lhs, rhs, "{} output {index} differs", fixture.name);
        }
    }
}

#[test]
fn every_scheduled_node_emits_at_most_one_record() {
    let stackvm = StackvmRunner::new();
    for fixture in fixtures::all().expect("fixtures") {
        let module = stackvm.emit(&fixture.graph).expect("emit");
        let program = nnvm_backend_stackvm::decode_text(module.text()).expect("decode");
        let records = program
            .iter()
            .filter(|instruction| matches!(instruction, nnvm_backend_stackvm::Instruction::Tensor(_)))
            .count();
        let computing = fixture
            .graph
            .nodes()
            .iter()
            .filter(|node| {
                !matches!(
                    node.op,
                    Operation::Input | Operation::Output | Operation::Constant { .. } | Operation::Ignore
                )
            })
            .count();
        assert!(records <= computing, "{}: {records} records for {computing} nodes", fixture.name);
    }
}

#[test]
fn vm_rejects_truncated_text() {
    let fixture = fixtures::all()
        .expect("fixtures")
        .into_iter()
        .find(|fixture| fixture.name == "matmul")
        .expect("matmul fixture");
    let module = StackvmRunner::new().emit(&fixture.graph).expect("emit");
    let mut sections = module.sections.clone();
    for section in &mut sections {
        if section.name == nnvm_backend_stackvm::module::TEXT_SECTION {
            section.body.truncate(section.body.len() - 1);
        }
    }
    let truncated = nnvm_backend_stackvm::StackvmModule { sections, ..module };
    assert!(matches!(StackVm::load(&truncated), Err(VmError::Decode(_))));
}

fn gather_with_bad_row() -> (Graph, nnvm::ir::NodeId) {
    let mut builder = GraphBuilder::new();
    let x = builder.input("x", DataType::Float32, &[4, 3]);
    let rows = builder.constant_i32("rows", &[2], &[1, 7]).expect("rows");
    let picked = builder
        .emit("by_row", Operation::Gather { axis: 0 }, &[x, rows], DataType::Float32)
        .expect("gather");
    builder.output("rows_out", picked).expect("output");
    let graph = builder.finish();
    let producer = graph.connector(picked).expect("connector").producer.expect("producer");
    (graph, producer)
}

#[test]
fn out_of_range_gather_index_aborts_both_passes() {
    let (graph, gather) = gather_with_bad_row();
    let inputs = vec![f32_bytes(&[0.5; 12])];
    let bad_index = KernelError::IndexOutOfBounds {
        op: "gather",
        index: 7,
        size: 4,
    };

    let err = EvaluatorRunner::neutral()
        .expect("evaluator")
        .run(&graph, &inputs)
        .unwrap_err();
    let eval = err.downcast_ref::<EvalError>().expect("evaluator error");
    assert_eq!(eval.node, gather);
    assert_eq!(eval.name, "by_row");
    assert_eq!(eval.kind, OpKind::Gather);
    assert_eq!(eval.kernel_error(), Some(&bad_index));

    let err = StackvmRunner::new().run(&graph, &inputs).unwrap_err();
    match err.downcast_ref::<VmError>() {
        Some(VmError::Kernel { function, source, .. }) => {
            assert_eq!(*function, "gather");
            assert_eq!(source, &bad_index);
        }
        other => panic!("expected a gather kernel failure, got {other:?}"),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn backends_agree_on_random_unary_inputs(values in prop::collection::vec(-4.0f32..4.0, 12)) {
        let mut fixture = fixtures::all()
            .expect("fixtures")
            .into_iter()
            .find(|fixture| fixture.name == "unary_all")
            .expect("unary fixture");
        fixture.inputs = vec![f32_bytes(&values)];
        let expected = EvaluatorRunner::neutral()
            .expect("evaluator")
            .run(&fixture.graph, &fixture.inputs)
            .expect("evaluator run");
        let actual = StackvmRunner::new()
            .run(&fixture.graph, &fixture.inputs)
            .expect("stackvm run");
        prop_assert_eq!(expected, actual);
    }
}
