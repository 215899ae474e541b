use std::borrow::Cow;

use crate::error::{GraphError, GraphResult, KernelResult};
use crate::ir::{Graph, OpKind, Operation};
use crate::tensor::{IndexIter, TensorView, TensorViewMut};

use super::{BufferAllocation, MemoryBinding, MemoryLocation, MemoryRange, ScheduleResult};

/// Backing storage for every memory location. Owned by the caller of a pass;
/// the passes only borrow it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryPool {
    arenas: [Vec<u8>; 4],
}

/// Byte slices of one node's operands, ready to be wrapped in views.
pub struct NodeBuffers<'a> {
    inputs: Vec<Cow<'a, [u8]>>,
    output: &'a mut [u8],
}

impl<'a> NodeBuffers<'a> {
    /// Builds the typed views for `inputs`/`output` and runs `f` on them.
    pub fn with_views<R>(
        self,
        inputs: &[&BufferAllocation],
        output: &BufferAllocation,
        f: impl FnOnce(&[TensorView<'_>], &mut TensorViewMut<'_>) -> KernelResult<R>,
    ) -> KernelResult<R> {
        let NodeBuffers {
            inputs: input_bytes,
            output: output_bytes,
        } = self;
        let mut views = Vec::with_capacity(input_bytes.len());
        for (bytes, alloc) in input_bytes.iter().zip(inputs.iter()) {
            views.push(TensorView::new(
                alloc.range.dtype,
                bytes,
                &alloc.shape,
                &alloc.strides,
            )?);
        }
        let mut out = TensorViewMut::new(
            output.range.dtype,
            output_bytes,
            &output.shape,
            &output.strides,
        )?;
        f(&views, &mut out)
    }
}

impl MemoryPool {
    pub fn new(sizes: [usize; 4]) -> Self {
        Self {
            arenas: sizes.map(|size| vec![0u8; size]),
        }
    }

    pub fn for_schedule(schedule: &ScheduleResult) -> Self {
        Self::new(schedule.usages())
    }

    /// Pool sized for `schedule` with every constant already in place.
    pub fn with_constants(graph: &Graph, schedule: &ScheduleResult) -> GraphResult<Self> {
        let mut pool = Self::for_schedule(schedule);
        pool.load_constants(graph, schedule)?;
        Ok(pool)
    }

    pub fn load_constants(&mut self, graph: &Graph, binding: &dyn MemoryBinding) -> GraphResult<()> {
        for node in graph.nodes_of_kind(OpKind::Constant) {
            let Operation::Constant { data } = &node.op else {
                continue;
            };
            for output in &node.outputs {
                let alloc = binding
                    .memory_at(*output)
                    .ok_or(GraphError::UnboundConnector(*output))?;
                self.write(alloc, data)?;
            }
        }
        Ok(())
    }

    pub fn arena(&self, location: MemoryLocation) -> &[u8] {
        &self.arenas[location.index()]
    }

    pub fn arena_mut(&mut self, location: MemoryLocation) -> &mut [u8] {
        &mut self.arenas[location.index()]
    }

    fn span(&self, range: &MemoryRange) -> GraphResult<std::ops::Range<usize>> {
        let arena = &self.arenas[range.location.index()];
        if range.end() > arena.len() {
            return Err(GraphError::Memory(format!(
                "{} range {}..{} exceeds arena of {} bytes",
                range.location,
                range.start,
                range.end(),
                arena.len()
            )));
        }
        Ok(range.start..range.end())
    }

    pub fn bytes(&self, range: &MemoryRange) -> GraphResult<&[u8]> {
        let span = self.span(range)?;
        Ok(&self.arenas[range.location.index()][span])
    }

    pub fn bytes_mut(&mut self, range: &MemoryRange) -> GraphResult<&mut [u8]> {
        let span = self.span(range)?;
        Ok(&mut self.arenas[range.location.index()][span])
    }

    pub fn view(&self, alloc: &BufferAllocation) -> GraphResult<TensorView<'_>> {
        TensorView::new(alloc.range.dtype, self.bytes(&alloc.range)?, &alloc.shape, &alloc.strides)
            .map_err(|err| GraphError::Memory(err.to_string()))
    }

    /// Stores row-major `data` through the allocation's strides.
    pub fn write(&mut self, alloc: &BufferAllocation, data: &[u8]) -> GraphResult<()> {
        let width = alloc.range.dtype.size_in_bytes();
        let count: usize = alloc.shape.iter().product();
        if data.len() != count * width {
            return Err(GraphError::Memory(format!(
                "{} bytes written into {}-element {} buffer",
                data.len(),
                count,
                alloc.range.dtype
            )));
        }
        let bytes = self.bytes_mut(&alloc.range)?;
        let mut view = TensorViewMut::new(alloc.range.dtype, bytes, &alloc.shape, &alloc.strides)
            .map_err(|err| GraphError::Memory(err.to_string()))?;
        for (index, chunk) in IndexIter::new(&alloc.shape).zip(data.chunks_exact(width)) {
            view.copy_element(&index, chunk);
        }
        Ok(())
    }

    /// Row-major copy of the allocation's logical contents.
    pub fn read(&self, alloc: &BufferAllocation) -> GraphResult<Vec<u8>> {
        Ok(self.view(alloc)?.to_contiguous_bytes())
    }

    /// Borrows input ranges immutably and the output range mutably. An input
    /// overlapping the output is snapshotted first so the kernel never reads
    /// bytes it is overwriting.
    pub fn node_buffers(
        &mut self,
        inputs: &[&BufferAllocation],
        output: &BufferAllocation,
    ) -> GraphResult<NodeBuffers<'_>> {
        let out_range = output.range;
        let out_span = self.span(&out_range)?;
        let mut staged: Vec<Option<Vec<u8>>> = Vec::with_capacity(inputs.len());
        for alloc in inputs {
            let span = self.span(&alloc.range)?;
            staged.push(if alloc.range.overlaps(&out_range) {
                Some(self.arenas[alloc.range.location.index()][span].to_vec())
            } else {
                None
            });
        }

        let mut shared: [&[u8]; 4] = [&[]; 4];
        let mut head: &[u8] = &[];
        let mut tail: &[u8] = &[];
        let mut out_bytes: &mut [u8] = &mut [];
        for (index, arena) in self.arenas.iter_mut().enumerate() {
            if index == out_range.location.index() {
                let (before, rest) = arena.split_at_mut(out_span.start);
                let (target, after) = rest.split_at_mut(out_span.end - out_span.start);
                head = before;
                tail = after;
                out_bytes = target;
            } else {
                shared[index] = arena.as_slice();
            }
        }

        let mut input_bytes = Vec::with_capacity(inputs.len());
        for (alloc, staged) in inputs.iter().zip(staged) {
            let range = alloc.range;
            let bytes = match staged {
                Some(copy) => Cow::Owned(copy),
                None if range.size == 0 => Cow::Borrowed(&[][..]),
                None if range.location == out_range.location => {
                    if range.end() <= out_span.start {
                        Cow::Borrowed(&head[range.start..range.end()])
                    } else {
                        let offset = out_span.end;
                        Cow::Borrowed(&tail[range.start - offset..range.end() - offset])
                    }
                }
                None => Cow::Borrowed(&shared[range.location.index()][range.start..range.end()]),
            };
            input_bytes.push(bytes);
        }

        Ok(NodeBuffers {
            inputs: input_bytes,
            output: out_bytes,
        })
    }
}
