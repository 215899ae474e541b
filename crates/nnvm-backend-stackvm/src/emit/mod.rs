mod conv;
mod elementwise;
mod gather;
mod quant;
mod reduce;
mod shape;

use std::collections::BTreeMap;

use nnvm::ir::{ConnectorId, Graph, Node, NodeId, OpKind, Operation};
use nnvm::nnil::{compile_fused_subgraph, NnilBuilder};
use nnvm::schedule::{validate_node, BufferAllocation, MemoryBinding, MemoryLocation, MemoryPool};
use nnvm::tensor::Padding;
use nnvm::GraphError;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::builder::OpBuilder;
use crate::decode::disassemble;
use crate::error::{EmitError, EmitResult};
use crate::instruction::TensorOperand;
use crate::module::{
    Manifest, ManifestBinding, Section, StackvmModule, MANIFEST_SECTION, RDATA_SECTION,
    STACKVM_MODULE_TYPE, TEXT_SECTION,
};
use crate::options::EmitOptions;

/// Lowers a scheduled graph into a [`StackvmModule`].
pub struct StackvmModuleBuilder<'a> {
    name: String,
    binding: &'a dyn MemoryBinding,
    options: EmitOptions,
}

impl<'a> StackvmModuleBuilder<'a> {
    pub fn new(name: impl Into<String>, binding: &'a dyn MemoryBinding) -> Self {
        Self {
            name: name.into(),
            binding,
            options: EmitOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EmitOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &EmitOptions {
        &self.options
    }

    /// Emits `order` as given. Every node is validated (and fused bodies
    /// compiled) before the first instruction is written.
    #[tracing::instrument(skip_all, fields(module = %self.name, nodes = order.len()))]
    pub fn build(&self, graph: &Graph, order: &[NodeId]) -> EmitResult<StackvmModule> {
        let mut nodes = Vec::with_capacity(order.len());
        let mut fused_bodies = BTreeMap::new();
        for id in order {
            let node = graph.node(*id).map_err(|source| EmitError::Graph { node: *id, source })?;
            validate_node(graph, self.binding, node).map_err(|source| EmitError::Graph { node: *id, source })?;
            if let Operation::FusedUnary { subgraph } = &node.op {
                let mut nnil = NnilBuilder::new();
                compile_fused_subgraph(node.id, subgraph, &mut nnil)
                    .map_err(|source| EmitError::Graph { node: *id, source })?;
                fused_bodies.insert(node.id, nnil.finish());
            }
            nodes.push(node);
        }

        let mut ctx = EmitContext {
            binding: self.binding,
            text: OpBuilder::new(),
            fused_bodies,
            node: NodeId(0),
            kind: OpKind::Ignore,
            shape_regs: 0,
            padding_regs: 0,
        };
        for node in &nodes {
            ctx.begin(node);
            debug!(node = %node.id, name = %node.name, kind = %node.kind(), offset = ctx.text.position(), "emit");
            emit_node(node, &mut ctx)?;
        }
        debug!(instructions = ctx.text.instruction_count(), bytes = ctx.text.position(), "text emitted");
        let text = ctx.text.finish();

        let rdata = self.rdata(&nodes)?;
        let manifest = self.manifest(&nodes)?;
        if self.options.dump_disassembly {
            match disassemble(&text) {
                Ok(listing) => debug!(module = %self.name, "disassembly\n{listing}"),
                Err(err) => warn!(module = %self.name, error = %err, "emitted text does not decode"),
            }
        }

        Ok(StackvmModule {
            name: self.name.clone(),
            module_type: STACKVM_MODULE_TYPE.to_string(),
            sections: vec![
                Section {
                    name: TEXT_SECTION.to_string(),
                    body: text,
                },
                Section {
                    name: RDATA_SECTION.to_string(),
                    body: rdata,
                },
                Section {
                    name: MANIFEST_SECTION.to_string(),
                    body: serde_json::to_vec_pretty(&manifest)?,
                },
            ],
        })
    }

    fn bound(&self, node: &Node, connector: ConnectorId) -> EmitResult<&'a BufferAllocation> {
        self.binding.memory_at(connector).ok_or(EmitError::Graph {
            node: node.id,
            source: GraphError::UnboundConnector(connector),
        })
    }

    /// Constant payloads laid out at their scheduled `Rdata` offsets.
    fn rdata(&self, nodes: &[&Node]) -> EmitResult<Vec<u8>> {
        let mut constants = Vec::new();
        let mut size = 0usize;
        for node in nodes {
            let Operation::Constant { data } = &node.op else {
                continue;
            };
            for output in &node.outputs {
                let alloc = self.bound(node, *output)?;
                if alloc.range.location != MemoryLocation::Rdata {
                    return Err(EmitError::Graph {
                        node: node.id,
                        source: GraphError::Memory(format!(
                            "constant {output} is bound in {} instead of rdata",
                            alloc.range.location
                        )),
                    });
                }
                size = size.max(alloc.range.end());
                constants.push((node.id, alloc, data));
            }
        }

        let mut pool = MemoryPool::new([0, 0, size, 0]);
        for (node, alloc, data) in constants {
            pool.write(alloc, data).map_err(|source| EmitError::Graph { node, source })?;
        }
        Ok(pool.arena(MemoryLocation::Rdata).to_vec())
    }

    fn manifest(&self, nodes: &[&Node]) -> EmitResult<Manifest> {
        let mut manifest = Manifest {
            name: self.name.clone(),
            ..Manifest::default()
        };
        for node in nodes {
            for connector in node.inputs.iter().chain(node.outputs.iter()) {
                let range = self.bound(node, *connector)?.range;
                let slot = &mut manifest.pool_sizes[range.location.index()];
                *slot = (*slot).max(range.end());
            }
            let (list, connectors) = match node.kind() {
                OpKind::Input => (&mut manifest.inputs, &node.outputs),
                OpKind::Output => (&mut manifest.outputs, &node.inputs),
                _ => continue,
            };
            for connector in connectors {
                list.push(ManifestBinding {
                    name: node.name.clone(),
                    connector: *connector,
                    allocation: self.bound(node, *connector)?.clone(),
                });
            }
        }
        Ok(manifest)
    }
}

/// Per-module emission state. Registers are numbered from zero again for
/// every node since a tensor record consumes them immediately.
pub(super) struct EmitContext<'a> {
    binding: &'a dyn MemoryBinding,
    pub(super) text: OpBuilder,
    fused_bodies: BTreeMap<NodeId, Vec<u8>>,
    node: NodeId,
    kind: OpKind,
    shape_regs: usize,
    padding_regs: usize,
}

impl<'a> EmitContext<'a> {
    fn begin(&mut self, node: &Node) {
        self.node = node.id;
        self.kind = node.kind();
        self.shape_regs = 0;
        self.padding_regs = 0;
    }

    pub(super) fn encoding_error(&self, detail: impl Into<String>) -> EmitError {
        EmitError::Encoding {
            node: self.node,
            kind: self.kind,
            detail: detail.into(),
        }
    }

    pub(super) fn graph_error(&self, source: GraphError) -> EmitError {
        EmitError::Graph {
            node: self.node,
            source,
        }
    }

    pub(super) fn allocation(&self, connector: ConnectorId) -> EmitResult<&'a BufferAllocation> {
        self.binding
            .memory_at(connector)
            .ok_or_else(|| self.graph_error(GraphError::UnboundConnector(connector)))
    }

    pub(super) fn fused_body(&mut self) -> EmitResult<Vec<u8>> {
        self.fused_bodies
            .remove(&self.node)
            .ok_or_else(|| self.encoding_error("fused body was not compiled"))
    }

    pub(super) fn small(&self, value: usize, field: &str) -> EmitResult<u8> {
        u8::try_from(value).map_err(|_| self.encoding_error(format!("{field} {value} does not fit in u8")))
    }

    pub(super) fn word(&self, value: usize, field: &str) -> EmitResult<u32> {
        u32::try_from(value).map_err(|_| self.encoding_error(format!("{field} {value} does not fit in u32")))
    }

    fn int(&self, value: usize) -> EmitResult<i32> {
        i32::try_from(value).map_err(|_| self.encoding_error(format!("{value} does not fit in i32")))
    }

    /// Stores `values` in the next shape register.
    pub(super) fn ints(&mut self, values: &[i32]) -> EmitResult<u8> {
        let reg = self.small(self.shape_regs, "shape register")?;
        self.small(values.len(), "register rank")?;
        self.shape_regs += 1;
        self.text.stshape(reg, values);
        Ok(reg)
    }

    pub(super) fn dims(&mut self, values: &[usize]) -> EmitResult<u8> {
        let ints = values
            .iter()
            .map(|value| self.int(*value))
            .collect::<EmitResult<SmallVec<[i32; 4]>>>()?;
        self.ints(&ints)
    }

    /// Stores `paddings` in the next paddings register.
    pub(super) fn paddings(&mut self, paddings: &[Padding]) -> EmitResult<u8> {
        let reg = self.small(self.padding_regs, "paddings register")?;
        self.small(paddings.len(), "paddings rank")?;
        self.padding_regs += 1;
        self.text.stpaddings(reg, paddings);
        Ok(reg)
    }

    /// Pushes the address of `connector` and stores its shape and strides.
    pub(super) fn operand(&mut self, connector: ConnectorId) -> EmitResult<TensorOperand> {
        let alloc = self.allocation(connector)?;
        let offset = self.word(alloc.range.start, "buffer offset")?;
        self.text.lea_buffer(alloc.range.location, offset);
        let shape = self.dims(&alloc.shape)?;
        let strides = self.dims(&alloc.strides)?;
        trace!(connector = %connector, location = %alloc.range.location, offset, shape = ?alloc.shape, strides = ?alloc.strides, "operand");
        Ok(TensorOperand {
            dtype: alloc.dtype(),
            shape,
            strides,
        })
    }

    /// Pushes every input and then the output of `node`.
    pub(super) fn node_operands(&mut self, node: &Node) -> EmitResult<(Vec<TensorOperand>, TensorOperand)> {
        let inputs = node
            .inputs
            .iter()
            .map(|input| self.operand(*input))
            .collect::<EmitResult<Vec<_>>>()?;
        let output = node
            .outputs
            .first()
            .ok_or_else(|| self.encoding_error("node has no output"))?;
        let output = self.operand(*output)?;
        Ok((inputs, output))
    }

    pub(super) fn arity_error(&self, found: usize) -> EmitError {
        self.encoding_error(format!("unexpected operand count {found}"))
    }
}

/// One arm per operator; adding an [`Operation`] variant fails to compile
/// until it is handled here.
fn emit_node(node: &Node, ctx: &mut EmitContext<'_>) -> EmitResult<()> {
    match &node.op {
        Operation::Input | Operation::Output | Operation::Constant { .. } | Operation::Ignore => Ok(()),
        Operation::Binary { op, activation } => elementwise::emit_binary(node, *op, *activation, ctx),
        Operation::Unary { op } => elementwise::emit_unary(node, *op, ctx),
        Operation::Clamp => elementwise::emit_clamp(node, ctx),
        Operation::FusedUnary { .. } => elementwise::emit_fused_unary(node, ctx),
        Operation::Conv2d(attrs) => conv::emit_conv2d(node, attrs, false, ctx),
        Operation::Conv2dTranspose(attrs) => conv::emit_conv2d(node, attrs, true, ctx),
        Operation::Matmul { activation } => conv::emit_matmul(node, *activation, ctx),
        Operation::Pad {
            paddings,
            mode,
            pad_value,
        } => shape::emit_pad(node, paddings, *mode, *pad_value, ctx),
        Operation::Slice { begin, end, strides } => shape::emit_slice(node, begin, end, strides, ctx),
        Operation::Transpose { perm } => shape::emit_transpose(node, perm, ctx),
        Operation::Concat { axis } => shape::emit_concat(node, *axis, ctx),
        Operation::Bitcast => shape::emit_bitcast(node, ctx),
        Operation::BatchToSpace {
            block_h,
            block_w,
            crop_h,
            crop_w,
        } => shape::emit_batch_to_space(node, *block_h, *block_w, [*crop_h, *crop_w], ctx),
        Operation::ResizeImage {
            mode,
            new_size,
            align_corners,
            half_pixel_centers,
        } => shape::emit_resize_image(node, *mode, *new_size, *align_corners, *half_pixel_centers, ctx),
        Operation::Reduce {
            op,
            axes,
            init_value,
            keep_dims,
        } => reduce::emit_reduce(node, *op, axes, *init_value, *keep_dims, ctx),
        Operation::ReduceWindow2d(attrs) => reduce::emit_reduce_window2d(node, attrs, ctx),
        Operation::Gather { axis } => gather::emit_gather(node, *axis, ctx),
        Operation::GatherNd { batch_dims } => gather::emit_gather_nd(node, *batch_dims, ctx),
        Operation::Quantize { param } => quant::emit_quantize(node, *param, false, ctx),
        Operation::Dequantize { param } => quant::emit_quantize(node, *param, true, ctx),
        Operation::Convert => quant::emit_convert(node, ctx),
        Operation::TableLookup1d => quant::emit_table_lookup1d(node, ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode_text;
    use crate::instruction::{Instruction, TensorFunction};
    use nnvm::ir::{BinaryOp, FusedSubgraph, GraphBuilder, UnaryOp, ValueRange};
    use nnvm::nnil::compile_fused_body;
    use nnvm::schedule::plan_memory;
    use nnvm::DataType;

    fn f32_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn add_graph() -> (Graph, ConnectorId) {
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
        (builder.finish(), x)
    }

    fn operand_stores(location: MemoryLocation, reg: u8) -> Vec<Instruction> {
        vec![
            Instruction::LeaBuffer { location, offset: 0 },
            Instruction::LdcI4(2),
            Instruction::StShape { reg, rank: 1 },
            Instruction::LdcI4(1),
            Instruction::StShape { reg: reg + 1, rank: 1 },
        ]
    }

    fn operand(reg: u8) -> TensorOperand {
        TensorOperand {
            dtype: DataType::Float32,
            shape: reg,
            strides: reg + 1,
        }
    }

    #[test]
    fn binary_node_lowers_to_operand_stores_and_one_record() {
        let (graph, _) = add_graph();
        let schedule = plan_memory(&graph).expect("plan");
        let module = StackvmModuleBuilder::new("add", &schedule)
            .build(&graph, schedule.order())
            .expect("build");

        let mut expected = operand_stores(MemoryLocation::Input, 0);
        expected.extend(operand_stores(MemoryLocation::Rdata, 2));
        expected.extend(operand_stores(MemoryLocation::Output, 4));
        expected.push(Instruction::Tensor(TensorFunction::Binary {
            op: BinaryOp::Add,
            lhs: operand(0),
            rhs: operand(2),
            output: operand(4),
            activation: ValueRange::full(),
        }));
        assert_eq!(decode_text(module.text()).expect("decode"), expected);
        assert_eq!(module.module_type, STACKVM_MODULE_TYPE);
        assert_eq!(module.rdata(), f32_bytes(&[10.0, 20.0]).as_slice());

        let manifest = module.manifest().expect("manifest");
        assert_eq!(manifest.pool_sizes, [8, 8, 8, 0]);
        assert_eq!(manifest.inputs.len(), 1);
        assert_eq!(manifest.inputs[0].name, "x");
        assert_eq!(manifest.outputs[0].name, "y");
    }

    #[test]
    fn malformed_graph_fails_before_emission() {
        let (graph, x) = add_graph();
        let mut schedule = plan_memory(&graph).expect("plan");
        schedule.unbind(x);
        let err = StackvmModuleBuilder::new("add", &schedule)
            .build(&graph, schedule.order())
            .unwrap_err();
        assert!(matches!(
            err,
            EmitError::Graph {
                source: GraphError::UnboundConnector(connector),
                ..
            } if connector == x
        ));
    }

    #[test]
    fn aliased_bitcast_emits_nothing() {
        let mut builder = GraphBuilder::new();
        let x = builder.input("x", DataType::Float32, &[2, 3]);
        let neg = builder
            .emit("neg", Operation::Unary { op: UnaryOp::Neg }, &[x], DataType::Float32)
            .expect("neg");
        let flat = builder
            .emit_shaped("flat", Operation::Bitcast, &[neg], DataType::Float32, &[6])
            .expect("bitcast");
        let abs = builder
            .emit("abs", Operation::Unary { op: UnaryOp::Abs }, &[flat], DataType::Float32)
            .expect("abs");
        builder.output("y", abs).expect("output");
        let graph = builder.finish();
        let schedule = plan_memory(&graph).expect("plan");

        let module = StackvmModuleBuilder::new("reshape", &schedule)
            .build(&graph, schedule.order())
            .expect("build");
        let records = decode_text(module.text())
            .expect("decode")
            .into_iter()
            .filter(|instruction| matches!(instruction, Instruction::Tensor(_)))
            .count();
        assert_eq!(records, 2);
    }

    #[test]
    fn bitcast_onto_a_strided_alias_emits_a_copy() {
        let mut builder = GraphBuilder::new();
        let x = builder.input("x", DataType::Float32, &[2, 3]);
        let view = builder
            .emit_shaped("view", Operation::Bitcast, &[x], DataType::Float32, &[3, 2])
            .expect("bitcast");
        builder.output("y", view).expect("output");
        let graph = builder.finish();
        let producer = graph.connector(view).expect("connector").producer.expect("producer");

        let range = nnvm::schedule::MemoryRange {
            location: MemoryLocation::Data,
            dtype: DataType::Float32,
            start: 0,
            size: 24,
        };
        let mut schedule = nnvm::schedule::ScheduleResult::new(vec![producer]);
        schedule.bind(x, BufferAllocation::contiguous(range, &[2, 3]));
        schedule.bind(
            view,
            BufferAllocation {
                range,
                shape: [3, 2].into_iter().collect(),
                strides: [1, 3].into_iter().collect(),
            },
        );

        let module = StackvmModuleBuilder::new("view", &schedule)
            .build(&graph, schedule.order())
            .expect("build");
        let records: Vec<_> = decode_text(module.text())
            .expect("decode")
            .into_iter()
            .filter(|instruction| matches!(instruction, Instruction::Tensor(_)))
            .collect();
        assert!(
            matches!(records.as_slice(), [Instruction::Tensor(TensorFunction::Bitcast { .. })]),
            "{records:?}"
        );
    }

    #[test]
    fn fused_unary_embeds_compiled_body() {
        let mut subgraph = FusedSubgraph::new();
        let input = subgraph.input();
        let half = subgraph.constant(0.5);
        subgraph.binary(BinaryOp::Mul, input, half);
        let mut builder = GraphBuilder::new();
        let x = builder.input("x", DataType::Float32, &[4]);
        let y = builder
            .emit(
                "fused",
                Operation::FusedUnary {
                    subgraph: subgraph.clone(),
                },
                &[x],
                DataType::Float32,
            )
            .expect("fused");
        builder.output("y", y).expect("output");
        let graph = builder.finish();
        let schedule = plan_memory(&graph).expect("plan");
        let fused = graph.connector(y).expect("y").producer.expect("producer");

        let module = StackvmModuleBuilder::new("fused", &schedule)
            .build(&graph, schedule.order())
            .expect("build");
        let body = decode_text(module.text())
            .expect("decode")
            .into_iter()
            .find_map(|instruction| match instruction {
                Instruction::Tensor(TensorFunction::FusedUnary { body, .. }) => Some(body),
                _ => None,
            })
            .expect("fused record");
        assert_eq!(body, compile_fused_body(fused, &subgraph).expect("compile"));
    }
}
