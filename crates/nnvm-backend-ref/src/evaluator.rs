use nnvm::ir::{Graph, Node, NodeId, OpKind, Operation};
use nnvm::schedule::{
    validate_node, BufferAllocation, MemoryBinding, MemoryLocation, MemoryPool, MemoryRange, ScheduleResult,
};
use nnvm::{DataType, GraphError};
use tracing::{debug, trace, warn};

use crate::context::EvalContext;
use crate::error::{EvalError, EvalResult};
use crate::options::EvaluateOptions;
use crate::registry::EvaluatorRegistry;

/// Walks a scheduled graph and runs every node through its registered
/// evaluator. The order is taken as given.
#[derive(Debug, Clone)]
pub struct Evaluator {
    registry: EvaluatorRegistry,
    options: EvaluateOptions,
}

impl Evaluator {
    pub fn new(registry: EvaluatorRegistry) -> Self {
        Self::with_options(registry, EvaluateOptions::default())
    }

    pub fn with_options(registry: EvaluatorRegistry, options: EvaluateOptions) -> Self {
        Self { registry, options }
    }

    /// Evaluator over the reference kernels.
    pub fn neutral() -> Result<Self, GraphError> {
        Ok(Self::new(EvaluatorRegistry::neutral()?))
    }

    pub fn registry(&self) -> &EvaluatorRegistry {
        &self.registry
    }

    pub fn options(&self) -> &EvaluateOptions {
        &self.options
    }

    /// Every scheduled node is validated before any memory is touched; the
    /// first failing node aborts the pass.
    #[tracing::instrument(skip_all, fields(nodes = order.len()))]
    pub fn run(
        &self,
        graph: &Graph,
        binding: &dyn MemoryBinding,
        pool: &mut MemoryPool,
        order: &[NodeId],
    ) -> EvalResult<()> {
        let mut nodes = Vec::with_capacity(order.len());
        for id in order {
            let node = graph.node(*id).map_err(|err| orphan_error(*id, err))?;
            validate_node(graph, binding, node).map_err(|err| EvalError::new(node, err))?;
            let evaluator = self.registry.get(node.kind()).map_err(|err| EvalError::new(node, err))?;
            nodes.push((node, evaluator));
        }

        let mut ctx = EvalContext {
            graph,
            binding,
            pool,
            options: &self.options,
        };
        for (node, evaluator) in nodes {
            debug!(node = %node.id, name = %node.name, kind = %node.kind(), "evaluate");
            trace!(inputs = ?node.inputs, outputs = ?node.outputs, attributes = %node.op.describe_attributes());
            evaluator(node, &mut ctx).map_err(|err| EvalError::new(node, err))?;
            if ctx.options.check_finite {
                check_finite(&ctx, node);
            }
        }
        Ok(())
    }

    /// Evaluates `schedule.order()` in `pool`.
    pub fn run_schedule(&self, graph: &Graph, schedule: &ScheduleResult, pool: &mut MemoryPool) -> EvalResult<()> {
        self.run(graph, schedule, pool, schedule.order())
    }

    /// Evaluates a node whose inputs are all constants and returns its output
    /// bytes in row-major order. The graph itself is left untouched.
    pub fn constant_fold(&self, graph: &Graph, id: NodeId) -> EvalResult<Vec<u8>> {
        let node = graph.node(id).map_err(|err| orphan_error(id, err))?;
        let fail = |err: GraphError| EvalError::new(node, err);
        if node.outputs.len() != 1 {
            return Err(fail(GraphError::InvalidNode {
                node: node.id,
                kind: node.kind(),
                detail: "only single-output nodes fold".to_string(),
            }));
        }

        let mut schedule = ScheduleResult::new(vec![id]);
        let mut rdata = 0usize;
        let mut constants = Vec::with_capacity(node.inputs.len());
        for input in &node.inputs {
            let connector = graph.connector(*input).map_err(fail)?;
            let producer = connector.producer.map(|producer| graph.node(producer)).transpose().map_err(fail)?;
            let Some(Node {
                op: Operation::Constant { data },
                ..
            }) = producer
            else {
                return Err(fail(GraphError::InvalidNode {
                    node: node.id,
                    kind: node.kind(),
                    detail: format!("input {input} is not a constant"),
                }));
            };
            let alloc = contiguous(MemoryLocation::Rdata, rdata, connector.dtype, &connector.shape);
            rdata += alloc.range.size;
            schedule.bind(*input, alloc.clone());
            constants.push((alloc, data));
        }
        let output = graph.connector(node.outputs[0]).map_err(fail)?;
        let out_alloc = contiguous(MemoryLocation::Data, 0, output.dtype, &output.shape);
        schedule.bind(output.id, out_alloc.clone());

        let mut pool = MemoryPool::for_schedule(&schedule);
        for (alloc, data) in &constants {
            pool.write(alloc, data).map_err(fail)?;
        }
        self.run(graph, &schedule, &mut pool, &[id])?;
        pool.read(&out_alloc).map_err(fail)
    }
}

fn contiguous(location: MemoryLocation, start: usize, dtype: DataType, shape: &[usize]) -> BufferAllocation {
    let size = shape.iter().product::<usize>() * dtype.size_in_bytes();
    BufferAllocation::contiguous(
        MemoryRange {
            location,
            dtype,
            start,
            size,
        },
        shape,
    )
}

fn orphan_error(id: NodeId, err: GraphError) -> EvalError {
    EvalError {
        node: id,
        name: String::new(),
        kind: OpKind::Ignore,
        attributes: String::new(),
        source: err.into(),
    }
}

fn check_finite(ctx: &EvalContext<'_>, node: &Node) {
    for output in &node.outputs {
        let Some(alloc) = ctx.binding.memory_at(*output) else {
            continue;
        };
        if alloc.dtype() != DataType::Float32 {
            continue;
        }
        let Ok(view) = ctx.pool.view(alloc) else {
            continue;
        };
        let bad = view.to_vec::<f32>().iter().filter(|value| !value.is_finite()).count();
        if bad > 0 {
            warn!(node = %node.id, name = %node.name, connector = %output, count = bad, "non-finite values in output");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nnvm::ir::{BinaryOp, GraphBuilder, ValueRange};
    use nnvm::schedule::plan_memory;

    fn f32_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn add_graph() -> (Graph, nnvm::ir::ConnectorId, nnvm::ir::ConnectorId) {
        let mut builder = GraphBuilder::new();
        let x = builder.input("x", DataType::Float32, &[2]);
        let c = builder.constant_f32("c", &[2], &[10.0, 20.0]).expect("c");
        let sum = builder
            .emit(
                "sum",
                Operation::Binary {
                    op: BinaryOp::Add,
                    activation: ValueRange::full(),
                },
                &[x, c],
                DataType::Float32,
            )
            .expect("sum");
        builder.output("y", sum).expect("output");
        (builder.finish(), x, sum)
    }

    #[test]
    fn run_evaluates_in_schedule_order() {
        let (graph, x, sum) = add_graph();
        let schedule = plan_memory(&graph).expect("plan");
        let mut pool = MemoryPool::with_constants(&graph, &schedule).expect("pool");
        let x_alloc = schedule.memory_at(x).expect("x bound").clone();
        pool.write(&x_alloc, &f32_bytes(&[1.0, 2.0])).expect("write");

        let evaluator = Evaluator::neutral().expect("evaluator");
        evaluator.run_schedule(&graph, &schedule, &mut pool).expect("run");
        let out = pool.read(schedule.memory_at(sum).expect("sum bound")).expect("read");
        assert_eq!(out, f32_bytes(&[11.0, 22.0]));
    }

    #[test]
    fn run_dispatches_through_the_supplied_registry() {
        fn untouched(_: &Node, _: &mut EvalContext<'_>) -> Result<(), crate::error::EvalCause> {
            Ok(())
        }
        let mut builder = EvaluatorRegistry::builder();
        for kind in OpKind::ALL {
            builder.register(*kind, untouched).expect("register");
        }
        let evaluator = Evaluator::new(builder.finish().expect("registry"));

        let (graph, _, sum) = add_graph();
        let schedule = plan_memory(&graph).expect("plan");
        let mut pool = MemoryPool::with_constants(&graph, &schedule).expect("pool");
        let out_alloc = schedule.memory_at(sum).expect("bound").clone();
        pool.write(&out_alloc, &f32_bytes(&[7.0, 7.0])).expect("seed");
        evaluator.run_schedule(&graph, &schedule, &mut pool).expect("run");
        assert_eq!(pool.read(&out_alloc).expect("read"), f32_bytes(&[7.0, 7.0]));
    }

    #[test]
    fn bitcast_onto_a_strided_alias_still_copies() {
        let mut builder = GraphBuilder::new();
        let x = builder.input("x", DataType::Float32, &[2, 3]);
        let view = builder
            .emit_shaped("view", Operation::Bitcast, &[x], DataType::Float32, &[3, 2])
            .expect("bitcast");
        builder.output("y", view).expect("output");
        let graph = builder.finish();
        let producer = graph.connector(view).expect("connector").producer.expect("producer");

        // same bytes, but the output walks them column-major
        let x_alloc = contiguous(MemoryLocation::Data, 0, DataType::Float32, &[2, 3]);
        let view_alloc = BufferAllocation {
            range: x_alloc.range,
            shape: [3, 2].into_iter().collect(),
            strides: [1, 3].into_iter().collect(),
        };
        let mut schedule = ScheduleResult::new(vec![producer]);
        schedule.bind(x, x_alloc.clone());
        schedule.bind(view, view_alloc);
        let mut pool = MemoryPool::for_schedule(&schedule);
        pool.write(&x_alloc, &f32_bytes(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0])).expect("write");

        Evaluator::neutral()
            .expect("evaluator")
            .run_schedule(&graph, &schedule, &mut pool)
            .expect("run");
        assert_eq!(
            pool.read(&x_alloc).expect("read"),
            f32_bytes(&[0.0, 2.0, 4.0, 1.0, 3.0, 5.0])
        );
    }

    #[test]
    fn unbound_connector_aborts_before_any_write() {
        let (graph, x, sum) = add_graph();
        let mut schedule = plan_memory(&graph).expect("plan");
        let out_alloc = schedule.memory_at(sum).expect("bound").clone();
        schedule.unbind(x);
        let mut pool = MemoryPool::with_constants(&graph, &schedule).expect("pool");
        pool.write(&out_alloc, &f32_bytes(&[7.0, 7.0])).expect("seed");

        let evaluator = Evaluator::neutral().expect("evaluator");
        let err = evaluator.run_schedule(&graph, &schedule, &mut pool).unwrap_err();
        assert_eq!(err.graph_error(), Some(&GraphError::UnboundConnector(x)));
        assert_eq!(err.kind, OpKind::Input);
        assert_eq!(pool.read(&out_alloc).expect("read"), f32_bytes(&[7.0, 7.0]));
    }

    #[test]
    fn constant_fold_matches_full_evaluation() {
        let mut builder = GraphBuilder::new();
        let a = builder.constant_f32("a", &[3], &[1.0, -2.0, 3.0]).expect("a");
        let b = builder.constant_f32("b", &[3], &[4.0, 5.0, -6.0]).expect("b");
        let product = builder
            .emit(
                "product",
                Operation::Binary {
                    op: BinaryOp::Mul,
                    activation: ValueRange::relu(),
                },
                &[a, b],
                DataType::Float32,
            )
            .expect("mul");
        builder.output("y", product).expect("output");
        let graph = builder.finish();
        let producer = graph.connector(product).expect("connector").producer.expect("producer");

        let evaluator = Evaluator::neutral().expect("evaluator");
        let folded = evaluator.constant_fold(&graph, producer).expect("fold");

        let schedule = plan_memory(&graph).expect("plan");
        let mut pool = MemoryPool::with_constants(&graph, &schedule).expect("pool");
        evaluator.run_schedule(&graph, &schedule, &mut pool).expect("run");
        let full = pool.read(schedule.memory_at(product).expect("bound")).expect("read");
        assert_eq!(folded, full);
        assert_eq!(folded, f32_bytes(&[4.0, 0.0, 0.0]));
    }

    #[test]
    fn constant_fold_rejects_runtime_inputs() {
        let (graph, _, sum) = add_graph();
        let producer = graph.connector(sum).expect("connector").producer.expect("producer");
        let evaluator = Evaluator::neutral().expect("evaluator");
        let err = evaluator.constant_fold(&graph, producer).unwrap_err();
        assert!(matches!(err.graph_error(), Some(GraphError::InvalidNode { .. })));
    }
}
