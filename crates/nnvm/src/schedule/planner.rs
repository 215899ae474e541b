use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::{GraphError, GraphResult};
use crate::ir::{ConnectorId, Graph, NodeId, OpKind};

use super::{BufferAllocation, MemoryLocation, MemoryRange, ScheduleResult};

/// Byte alignment of every planned range.
pub const ALIGNMENT: usize = 8;

/// Steps (positions in the schedule) between which a connector must stay
/// resident, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveRange {
    pub start: usize,
    pub end: usize,
}

impl LiveRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

fn align(value: usize) -> usize {
    value.div_ceil(ALIGNMENT) * ALIGNMENT
}

#[derive(Debug, Clone, Copy)]
struct Block {
    start: usize,
    size: usize,
    end: usize,
}

/// First-fit allocator for the data arena.
#[derive(Debug, Default)]
struct DataArena {
    blocks: Vec<Block>,
}

impl DataArena {
    fn release(&mut self, step: usize) {
        self.blocks.retain(|block| block.end >= step);
    }

    fn allocate(&mut self, size: usize, end: usize) -> usize {
        let size = align(size);
        let mut cursor = 0usize;
        let mut insert_at = self.blocks.len();
        for (index, block) in self.blocks.iter().enumerate() {
            if block.start >= cursor && block.start - cursor >= size {
                insert_at = index;
                break;
            }
            cursor = cursor.max(align(block.start + block.size));
        }
        self.blocks.insert(
            insert_at,
            Block {
                start: cursor,
                size,
                end,
            },
        );
        cursor
    }

    fn extend(&mut self, start: usize, end: usize) {
        if let Some(block) = self.blocks.iter_mut().find(|block| block.start == start) {
            block.end = block.end.max(end);
        }
    }
}

fn compute_live_ranges(
    graph: &Graph,
    order: &[NodeId],
) -> GraphResult<HashMap<ConnectorId, LiveRange>> {
    let mut ranges: HashMap<ConnectorId, LiveRange> = HashMap::new();
    for (step, node_id) in order.iter().enumerate() {
        let node = graph.node(*node_id)?;
        for input in &node.inputs {
            match ranges.get_mut(input) {
                Some(range) => range.end = range.end.max(step),
                None => {
                    return Err(GraphError::Memory(format!(
                        "connector {input} is consumed by {} before it is produced",
                        node.id
                    )))
                }
            }
        }
        for output in &node.outputs {
            ranges.insert(*output, LiveRange::new(step, step));
        }
    }
    Ok(ranges)
}

/// Plans memory for the graph's insertion order.
pub fn plan_memory(graph: &Graph) -> GraphResult<ScheduleResult> {
    plan_memory_with(graph, &graph.topological_order())
}

/// Assigns every connector produced in `order` a range. Inputs, outputs and
/// constants get their own arenas; intermediates share the data arena with
/// live-range reuse, and bitcast results alias their source.
pub fn plan_memory_with(graph: &Graph, order: &[NodeId]) -> GraphResult<ScheduleResult> {
    let live = compute_live_ranges(graph, order)?;
    let graph_outputs: HashSet<ConnectorId> = graph.output_connectors().into_iter().collect();

    let mut schedule = ScheduleResult::new(order.to_vec());
    let mut cursors = [0usize; 4];
    let mut arena = DataArena::default();
    // alias root (data start offset) for every aliased data range
    let mut data_roots: HashMap<ConnectorId, usize> = HashMap::new();

    for (step, node_id) in order.iter().enumerate() {
        let node = graph.node(*node_id)?;
        arena.release(step);

        for output in &node.outputs {
            let connector = graph.connector(*output)?;
            let size = connector.byte_len();
            let end = live.get(output).map(|range| range.end).unwrap_or(step);

            let location = match node.kind() {
                OpKind::Input => Some(MemoryLocation::Input),
                OpKind::Constant => Some(MemoryLocation::Rdata),
                _ if graph_outputs.contains(output) => Some(MemoryLocation::Output),
                OpKind::Bitcast => None,
                _ => Some(MemoryLocation::Data),
            };

            let range = match location {
                Some(MemoryLocation::Data) => {
                    let start = arena.allocate(size, end);
                    data_roots.insert(*output, start);
                    MemoryRange {
                        location: MemoryLocation::Data,
                        dtype: connector.dtype,
                        start,
                        size,
                    }
                }
                Some(location) => {
                    let start = cursors[location.index()];
                    cursors[location.index()] = align(start + size);
                    MemoryRange {
                        location,
                        dtype: connector.dtype,
                        start,
                        size,
                    }
                }
                None => {
                    let source = node.inputs.first().copied().ok_or_else(|| {
                        GraphError::Memory(format!("bitcast {} has no input", node.id))
                    })?;
                    let source_range = schedule
                        .allocations
                        .get(&source)
                        .map(|alloc| alloc.range)
                        .ok_or(GraphError::UnboundConnector(source))?;
                    if source_range.size == size {
                        if let Some(root) = data_roots.get(&source).copied() {
                            arena.extend(root, end);
                            data_roots.insert(*output, root);
                        }
                        MemoryRange {
                            dtype: connector.dtype,
                            ..source_range
                        }
                    } else {
                        let start = arena.allocate(size, end);
                        data_roots.insert(*output, start);
                        MemoryRange {
                            location: MemoryLocation::Data,
                            dtype: connector.dtype,
                            start,
                            size,
                        }
                    }
                }
            };

            debug!(
                connector = %output,
                location = %range.location,
                start = range.start,
                size = range.size,
                "planned buffer"
            );
            schedule.bind(*output, BufferAllocation::contiguous(range, &connector.shape));
        }
    }

    Ok(schedule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{GraphBuilder, Operation, UnaryOp};
    use crate::schedule::MemoryBinding;
    use crate::tensor::DataType;

    fn unary(op: UnaryOp) -> Operation {
        Operation::Unary { op }
    }

    #[test]
    fn chained_intermediates_reuse_freed_ranges() {
        let mut builder = GraphBuilder::new();
        let x = builder.input("x", DataType::Float32, &[16]);
        let a = builder.emit("a", unary(UnaryOp::Neg), &[x], DataType::Float32).expect("a");
        let b = builder.emit("b", unary(UnaryOp::Abs), &[a], DataType::Float32).expect("b");
        let c = builder.emit("c", unary(UnaryOp::Exp), &[b], DataType::Float32).expect("c");
        let d = builder.emit("d", unary(UnaryOp::Sin), &[c], DataType::Float32).expect("d");
        builder.output("out", d).expect("out");
        let graph = builder.finish();

        let plan = plan_memory(&graph).expect("plan");
        let range = |id| plan.memory_at(id).expect("bound").range;
        assert_eq!(range(x).location, MemoryLocation::Input);
        assert_eq!(range(d).location, MemoryLocation::Output);
        assert!(!range(a).overlaps(&range(b)));
        assert!(!range(b).overlaps(&range(c)));
        // `a` is dead once `b` is written, so `c` can take its place
        assert_eq!(range(a).start, range(c).start);
        assert!(plan.usage(MemoryLocation::Data) <= 128);
    }

    #[test]
    fn bitcast_aliases_its_source() {
        let mut builder = GraphBuilder::new();
        let x = builder.input("x", DataType::Float32, &[2, 3]);
        let n = builder.emit("n", unary(UnaryOp::Neg), &[x], DataType::Float32).expect("n");
        let r = builder
            .emit_shaped("r", Operation::Bitcast, &[n], DataType::Float32, &[6])
            .expect("r");
        let e = builder.emit("e", unary(UnaryOp::Exp), &[r], DataType::Float32).expect("e");
        builder.output("out", e).expect("out");
        let graph = builder.finish();

        let plan = plan_memory(&graph).expect("plan");
        let source = plan.memory_at(n).expect("n").range;
        let alias = plan.memory_at(r).expect("r");
        assert_eq!(alias.range, source);
        assert_eq!(alias.shape.as_slice(), &[6]);
    }

    #[test]
    fn consuming_before_producing_is_rejected() {
        let mut builder = GraphBuilder::new();
        let x = builder.input("x", DataType::Float32, &[4]);
        let y = builder.emit("y", unary(UnaryOp::Neg), &[x], DataType::Float32).expect("y");
        builder.output("out", y).expect("out");
        let graph = builder.finish();

        let reversed: Vec<NodeId> = graph.topological_order().into_iter().rev().collect();
        assert!(matches!(
            plan_memory_with(&graph, &reversed),
            Err(GraphError::Memory(_))
        ));
    }
}
