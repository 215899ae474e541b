//! Reference interpreter for stackvm modules.
//!
//! Executes `.text` against a [`MemoryPool`] laid out from the module
//! manifest. Tensor records are served by `nnvm-kernels`, the same library
//! the evaluator uses, so any divergence between the two backends points at
//! the emitter or the encoding.

use std::collections::BTreeMap;

use nnvm::ir::{Conv2dAttrs, ResizeMode, ReduceWindow2dAttrs};
use nnvm::schedule::{BufferAllocation, MemoryLocation, MemoryPool, MemoryRange};
use nnvm::tensor::{max_offset, Padding};
use nnvm::{Dims, GraphError, KernelError, KernelResult, TensorView, TensorViewMut};
use nnvm_backend_stackvm::{
    DecodeError, Instruction, InstructionReader, Manifest, StackvmModule, TensorFunction, STACKVM_MODULE_TYPE,
};
use nnvm_kernels as kernels;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error)]
pub enum VmError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("{function} at byte {offset} failed: {source}")]
    Kernel {
        offset: usize,
        function: &'static str,
        #[source]
        source: KernelError,
    },
    #[error("stack underflow at byte {offset}")]
    StackUnderflow { offset: usize },
    #[error("byte {offset}: expected {expected} on the stack")]
    StackType { offset: usize, expected: &'static str },
    #[error("byte {offset}: {file} register {reg} is not set")]
    MissingRegister {
        offset: usize,
        file: &'static str,
        reg: u8,
    },
    #[error("byte {offset}: {detail}")]
    Malformed { offset: usize, detail: String },
    #[error("module has no boundary named `{0}`")]
    UnknownBinding(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Value {
    Int(i32),
    Float(f32),
    Address(MemoryLocation, usize),
}

/// A decoded module ready to run against pools it hands out.
#[derive(Debug, Clone)]
pub struct StackVm {
    manifest: Manifest,
    program: Vec<(usize, Instruction)>,
    rdata: Vec<u8>,
}

impl StackVm {
    pub fn load(module: &StackvmModule) -> Result<Self, VmError> {
        if module.module_type != STACKVM_MODULE_TYPE {
            return Err(VmError::Malformed {
                offset: 0,
                detail: format!("module type `{}`", module.module_type),
            });
        }
        let program = InstructionReader::new(module.text()).collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            manifest: module.manifest()?,
            program,
            rdata: module.rdata().to_vec(),
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Fresh pool sized from the manifest with `.rdata` in place.
    pub fn pool(&self) -> Result<MemoryPool, VmError> {
        let mut pool = MemoryPool::new(self.manifest.pool_sizes);
        let arena = pool.arena_mut(MemoryLocation::Rdata);
        if self.rdata.len() > arena.len() {
            return Err(VmError::Malformed {
                offset: 0,
                detail: format!("{} rdata bytes for a {}-byte arena", self.rdata.len(), arena.len()),
            });
        }
        arena[..self.rdata.len()].copy_from_slice(&self.rdata);
        Ok(pool)
    }

    pub fn write_input(&self, pool: &mut MemoryPool, name: &str, data: &[u8]) -> Result<(), VmError> {
        let binding = self
            .manifest
            .inputs
            .iter()
            .find(|binding| binding.name == name)
            .ok_or_else(|| VmError::UnknownBinding(name.to_string()))?;
        Ok(pool.write(&binding.allocation, data)?)
    }

    pub fn read_output(&self, pool: &MemoryPool, name: &str) -> Result<Vec<u8>, VmError> {
        let binding = self
            .manifest
            .outputs
            .iter()
            .find(|binding| binding.name == name)
            .ok_or_else(|| VmError::UnknownBinding(name.to_string()))?;
        Ok(pool.read(&binding.allocation)?)
    }

    #[tracing::instrument(skip_all, fields(module = %self.manifest.name, instructions = self.program.len()))]
    pub fn run(&self, pool: &mut MemoryPool) -> Result<(), VmError> {
        let mut machine = Machine::default();
        for (offset, instruction) in &self.program {
            machine.step(*offset, instruction, pool)?;
        }
        if !machine.stack.is_empty() {
            return Err(VmError::Malformed {
                offset: self.program.last().map_or(0, |(offset, _)| *offset),
                detail: format!("{} values left on the stack", machine.stack.len()),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Machine {
    stack: Vec<Value>,
    shapes: BTreeMap<u8, Vec<i32>>,
    paddings: BTreeMap<u8, Vec<Padding>>,
}

/// Register contents a record refers to, resolved before the kernel runs.
#[derive(Debug, Default)]
struct Attributes {
    ints: Vec<Vec<i32>>,
    paddings: Vec<Padding>,
}

impl Attributes {
    fn ints(&self, index: usize) -> &[i32] {
        self.ints.get(index).map_or(&[][..], Vec::as_slice)
    }

    fn usizes(&self, index: usize, op: &'static str) -> KernelResult<Vec<usize>> {
        self.ints(index)
            .iter()
            .map(|value| {
                usize::try_from(*value).map_err(|_| KernelError::invalid(op, format!("negative value {value}")))
            })
            .collect()
    }

    fn spatial_paddings(&self, op: &'static str) -> KernelResult<(Padding, Padding)> {
        match self.paddings.as_slice() {
            &[h, w] => Ok((h, w)),
            other => Err(KernelError::invalid(op, format!("{} padding pairs, expected 2", other.len()))),
        }
    }
}

impl Machine {
    fn pop(&mut self, offset: usize) -> Result<Value, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow { offset })
    }

    fn pop_int(&mut self, offset: usize) -> Result<i32, VmError> {
        match self.pop(offset)? {
            Value::Int(value) => Ok(value),
            _ => Err(VmError::StackType {
                offset,
                expected: "int",
            }),
        }
    }

    fn pop_ints(&mut self, offset: usize, count: usize) -> Result<Vec<i32>, VmError> {
        let mut values = (0..count)
            .map(|_| self.pop_int(offset))
            .collect::<Result<Vec<_>, _>>()?;
        values.reverse();
        Ok(values)
    }

    fn pop_address(&mut self, offset: usize) -> Result<(MemoryLocation, usize), VmError> {
        match self.pop(offset)? {
            Value::Address(location, start) => Ok((location, start)),
            _ => Err(VmError::StackType {
                offset,
                expected: "address",
            }),
        }
    }

    fn register(&self, offset: usize, reg: u8) -> Result<&[i32], VmError> {
        self.shapes
            .get(&reg)
            .map(Vec::as_slice)
            .ok_or(VmError::MissingRegister {
                offset,
                file: "shape",
                reg,
            })
    }

    fn dims(&self, offset: usize, reg: u8) -> Result<Dims, VmError> {
        self.register(offset, reg)?
            .iter()
            .map(|value| {
                usize::try_from(*value).map_err(|_| VmError::Malformed {
                    offset,
                    detail: format!("negative dimension {value} in s{reg}"),
                })
            })
            .collect()
    }

    fn step(&mut self, offset: usize, instruction: &Instruction, pool: &mut MemoryPool) -> Result<(), VmError> {
        match instruction {
            Instruction::Nop => {}
            Instruction::LdcI4(value) => self.stack.push(Value::Int(*value)),
            Instruction::LdcR4(value) => self.stack.push(Value::Float(*value)),
            Instruction::LeaBuffer { location, offset: start } => {
                self.stack.push(Value::Address(*location, *start as usize));
            }
            Instruction::StShape { reg, rank } => {
                let values = self.pop_ints(offset, *rank as usize)?;
                self.shapes.insert(*reg, values);
            }
            Instruction::StPaddings { reg, rank } => {
                let values = self.pop_ints(offset, 2 * *rank as usize)?;
                let pairs = values
                    .chunks_exact(2)
                    .map(|pair| Padding::new(pair[0], pair[1]))
                    .collect();
                self.paddings.insert(*reg, pairs);
            }
            Instruction::Tensor(function) => self.tensor(offset, function, pool)?,
        }
        Ok(())
    }

    fn attributes(&self, offset: usize, function: &TensorFunction) -> Result<Attributes, VmError> {
        let (shape_regs, padding_reg) = match function {
            TensorFunction::Slice {
                begin, end, strides, ..
            } => (vec![*begin, *end, *strides], None),
            TensorFunction::Transpose { perm, .. } => (vec![*perm], None),
            TensorFunction::Reduce { axes, .. } => (vec![*axes], None),
            TensorFunction::Pad { paddings, .. } => (Vec::new(), Some(*paddings)),
            TensorFunction::Conv2d { params, .. } | TensorFunction::Conv2dTranspose { params, .. } => {
                (Vec::new(), Some(params.paddings))
            }
            TensorFunction::ReduceWindow2d { params, .. } => (Vec::new(), Some(params.paddings)),
            TensorFunction::BatchToSpace { crops, .. } => (Vec::new(), Some(*crops)),
            _ => (Vec::new(), None),
        };
        let ints = shape_regs
            .into_iter()
            .map(|reg| self.register(offset, reg).map(<[i32]>::to_vec))
            .collect::<Result<Vec<_>, _>>()?;
        let paddings = match padding_reg {
            Some(reg) => self
                .paddings
                .get(&reg)
                .cloned()
                .ok_or(VmError::MissingRegister {
                    offset,
                    file: "paddings",
                    reg,
                })?,
            None => Vec::new(),
        };
        Ok(Attributes { ints, paddings })
    }

    fn tensor(&mut self, offset: usize, function: &TensorFunction, pool: &mut MemoryPool) -> Result<(), VmError> {
        let descriptors = function.operands();
        let mut addresses = (0..descriptors.len())
            .map(|_| self.pop_address(offset))
            .collect::<Result<Vec<_>, _>>()?;
        addresses.reverse();

        let mut allocs = Vec::with_capacity(descriptors.len());
        for (operand, (location, start)) in descriptors.iter().zip(addresses) {
            let shape = self.dims(offset, operand.shape)?;
            let strides = self.dims(offset, operand.strides)?;
            if shape.len() != strides.len() {
                return Err(VmError::Malformed {
                    offset,
                    detail: format!("rank {} shape with {} strides", shape.len(), strides.len()),
                });
            }
            let size = max_offset(&shape, &strides).map_or(0, |last| (last + 1) * operand.dtype.size_in_bytes());
            allocs.push(BufferAllocation {
                range: MemoryRange {
                    location,
                    dtype: operand.dtype,
                    start,
                    size,
                },
                shape,
                strides,
            });
        }
        let Some((output, inputs)) = allocs.split_last() else {
            return Err(VmError::Malformed {
                offset,
                detail: "tensor record without operands".to_string(),
            });
        };
        let inputs: Vec<&BufferAllocation> = inputs.iter().collect();
        let attributes = self.attributes(offset, function)?;
        trace!(offset, function = function.name(), operands = allocs.len(), "tensor");

        pool.node_buffers(&inputs, output)?
            .with_views(&inputs, output, |views, out| run_function(function, &attributes, views, out))
            .map_err(|source| VmError::Kernel {
                offset,
                function: function.name(),
                source,
            })
    }
}

fn operand<'v, 'a>(views: &'v [TensorView<'a>], index: usize, op: &'static str) -> KernelResult<&'v TensorView<'a>> {
    views
        .get(index)
        .ok_or_else(|| KernelError::invalid(op, format!("missing operand {index}")))
}

fn run_function(
    function: &TensorFunction,
    attributes: &Attributes,
    views: &[TensorView<'_>],
    out: &mut TensorViewMut<'_>,
) -> KernelResult<()> {
    let op = function.name();
    let input = |index: usize| operand(views, index, op);
    match function {
        TensorFunction::Binary { op: binary, activation, .. } => {
            kernels::binary(*binary, input(0)?, input(1)?, out, *activation)
        }
        TensorFunction::Unary { op: unary, .. } => kernels::unary(*unary, input(0)?, out),
        TensorFunction::Conv2d { params, .. } | TensorFunction::Conv2dTranspose { params, .. } => {
            let (padding_h, padding_w) = attributes.spatial_paddings(op)?;
            let attrs = Conv2dAttrs {
                groups: params.groups as usize,
                padding_h,
                padding_w,
                stride_h: params.stride_h as usize,
                stride_w: params.stride_w as usize,
                dilation_h: params.dilation_h as usize,
                dilation_w: params.dilation_w as usize,
                activation: params.activation,
            };
            if matches!(function, TensorFunction::Conv2d { .. }) {
                kernels::conv2d(input(0)?, input(1)?, input(2)?, out, &attrs)
            } else {
                kernels::conv2d_transpose(input(0)?, input(1)?, input(2)?, out, &attrs)
            }
        }
        TensorFunction::Matmul { activation, .. } => {
            kernels::matmul(input(0)?, input(1)?, input(2)?, out, *activation)
        }
        TensorFunction::Pad { mode, pad_value, .. } => {
            kernels::pad(input(0)?, out, &attributes.paddings, *mode, *pad_value)
        }
        TensorFunction::Slice { .. } => kernels::slice(
            input(0)?,
            out,
            attributes.ints(0),
            attributes.ints(1),
            attributes.ints(2),
        ),
        TensorFunction::Transpose { .. } => kernels::transpose(input(0)?, out, &attributes.usizes(0, op)?),
        TensorFunction::Concat { axis, .. } => kernels::concat(views, out, *axis as usize),
        TensorFunction::Reduce {
            op: reduce,
            init_value,
            keep_dims,
            ..
        } => kernels::reduce(
            *reduce,
            input(0)?,
            out,
            &attributes.usizes(0, op)?,
            *init_value,
            *keep_dims,
        ),
        TensorFunction::ReduceWindow2d { params, .. } => {
            let (padding_h, padding_w) = attributes.spatial_paddings(op)?;
            let attrs = ReduceWindow2dAttrs {
                op: params.op,
                init_value: params.init_value,
                filter_h: params.filter_h as usize,
                filter_w: params.filter_w as usize,
                stride_h: params.stride_h as usize,
                stride_w: params.stride_w as usize,
                dilation_h: params.dilation_h as usize,
                dilation_w: params.dilation_w as usize,
                padding_h,
                padding_w,
                activation: params.activation,
            };
            kernels::reduce_window2d(input(0)?, out, &attrs)
        }
        TensorFunction::Quantize { param, .. } => kernels::quantize(input(0)?, out, *param),
        TensorFunction::Dequantize { param, .. } => kernels::dequantize(input(0)?, out, *param),
        TensorFunction::ResizeImage {
            mode,
            new_size,
            align_corners,
            half_pixel_centers,
            ..
        } => {
            let new_size = [new_size[0] as usize, new_size[1] as usize];
            match mode {
                ResizeMode::Bilinear => {
                    kernels::resize_bilinear(input(0)?, out, new_size, *align_corners, *half_pixel_centers)
                }
                ResizeMode::NearestNeighbor => {
                    kernels::resize_nearest(input(0)?, out, new_size, *align_corners, *half_pixel_centers)
                }
            }
        }
        TensorFunction::Gather { axis, .. } => kernels::gather(input(0)?, input(1)?, out, *axis as usize),
        TensorFunction::GatherNd { batch_dims, .. } => {
            kernels::gather_nd(input(0)?, input(1)?, out, *batch_dims as usize)
        }
        TensorFunction::Bitcast { .. } => kernels::bitcast(input(0)?, out),
        TensorFunction::Clamp { .. } => kernels::clamp(input(0)?, input(1)?, input(2)?, out),
        TensorFunction::Convert { .. } => kernels::convert(input(0)?, out),
        TensorFunction::FusedUnary { body, .. } => kernels::nnil_unary_method(input(0)?, out, body),
        TensorFunction::BatchToSpace { block_h, block_w, .. } => {
            let (crop_h, crop_w) = attributes.spatial_paddings(op)?;
            kernels::batch_to_space(input(0)?, out, *block_h as usize, *block_w as usize, crop_h, crop_w)
        }
        TensorFunction::TableLookup1d { .. } => kernels::table_lookup1d(input(0)?, input(1)?, out),
    }
}
