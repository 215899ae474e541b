use std::fmt;

use nnvm::ir::{BinaryOp, PadMode, QuantParam, ReduceOp, ResizeMode, UnaryOp, ValueRange};
use nnvm::schedule::MemoryLocation;
use nnvm::DataType;

use crate::opcode::*;
use crate::writer::SectionWriter;

/// Element type plus the shape and strides registers of one operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorOperand {
    pub dtype: DataType,
    pub shape: u8,
    pub strides: u8,
}

/// Scalar attributes shared by `conv2d` and `conv2d_transpose`. `paddings` is
/// a paddings register holding the height and width pairs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvParams {
    pub groups: u32,
    pub stride_h: u32,
    pub stride_w: u32,
    pub dilation_h: u32,
    pub dilation_w: u32,
    pub paddings: u8,
    pub activation: ValueRange,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowParams {
    pub op: ReduceOp,
    pub init_value: f32,
    pub filter_h: u32,
    pub filter_w: u32,
    pub stride_h: u32,
    pub stride_w: u32,
    pub dilation_h: u32,
    pub dilation_w: u32,
    pub paddings: u8,
    pub activation: ValueRange,
}

/// Record following a `TENSOR` opcode. Register fields name shape registers
/// unless documented as paddings registers.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorFunction {
    Binary {
        op: BinaryOp,
        lhs: TensorOperand,
        rhs: TensorOperand,
        output: TensorOperand,
        activation: ValueRange,
    },
    Unary {
        op: UnaryOp,
        input: TensorOperand,
        output: TensorOperand,
    },
    Conv2d {
        input: TensorOperand,
        weights: TensorOperand,
        bias: TensorOperand,
        output: TensorOperand,
        params: ConvParams,
    },
    Conv2dTranspose {
        input: TensorOperand,
        weights: TensorOperand,
        bias: TensorOperand,
        output: TensorOperand,
        params: ConvParams,
    },
    Matmul {
        lhs: TensorOperand,
        rhs: TensorOperand,
        bias: TensorOperand,
        output: TensorOperand,
        activation: ValueRange,
    },
    /// `paddings` is a paddings register.
    Pad {
        input: TensorOperand,
        output: TensorOperand,
        paddings: u8,
        mode: PadMode,
        pad_value: f32,
    },
    Slice {
        input: TensorOperand,
        output: TensorOperand,
        begin: u8,
        end: u8,
        strides: u8,
    },
    Transpose {
        input: TensorOperand,
        output: TensorOperand,
        perm: u8,
    },
    Concat {
        inputs: Vec<TensorOperand>,
        output: TensorOperand,
        axis: u8,
    },
    Reduce {
        op: ReduceOp,
        input: TensorOperand,
        output: TensorOperand,
        axes: u8,
        init_value: f32,
        keep_dims: bool,
    },
    ReduceWindow2d {
        input: TensorOperand,
        output: TensorOperand,
        params: WindowParams,
    },
    Quantize {
        input: TensorOperand,
        output: TensorOperand,
        param: QuantParam,
    },
    Dequantize {
        input: TensorOperand,
        output: TensorOperand,
        param: QuantParam,
    },
    ResizeImage {
        mode: ResizeMode,
        input: TensorOperand,
        output: TensorOperand,
        new_size: [u32; 2],
        align_corners: bool,
        half_pixel_centers: bool,
    },
    Gather {
        input: TensorOperand,
        indices: TensorOperand,
        output: TensorOperand,
        axis: u8,
    },
    GatherNd {
        input: TensorOperand,
        indices: TensorOperand,
        output: TensorOperand,
        batch_dims: u8,
    },
    Bitcast {
        input: TensorOperand,
        output: TensorOperand,
    },
    Clamp {
        input: TensorOperand,
        low: TensorOperand,
        high: TensorOperand,
        output: TensorOperand,
    },
    Convert {
        input: TensorOperand,
        output: TensorOperand,
    },
    /// `body` is a complete NNIL program ending in `ret`.
    FusedUnary {
        input: TensorOperand,
        output: TensorOperand,
        body: Vec<u8>,
    },
    /// `crops` is a paddings register holding the height and width pairs.
    BatchToSpace {
        input: TensorOperand,
        output: TensorOperand,
        block_h: u32,
        block_w: u32,
        crops: u8,
    },
    TableLookup1d {
        input: TensorOperand,
        table: TensorOperand,
        output: TensorOperand,
    },
}

impl TensorFunction {
    pub fn code(&self) -> u16 {
        match self {
            TensorFunction::Binary { .. } => FN_BINARY,
            TensorFunction::Unary { .. } => FN_UNARY,
            TensorFunction::Conv2d { .. } => FN_CONV2D,
            TensorFunction::Conv2dTranspose { .. } => FN_CONV2D_TRANSPOSE,
            TensorFunction::Matmul { .. } => FN_MATMUL,
            TensorFunction::Pad { .. } => FN_PAD,
            TensorFunction::Slice { .. } => FN_SLICE,
            TensorFunction::Transpose { .. } => FN_TRANSPOSE,
            TensorFunction::Concat { .. } => FN_CONCAT,
            TensorFunction::Reduce { .. } => FN_REDUCE,
            TensorFunction::ReduceWindow2d { .. } => FN_REDUCE_WINDOW2D,
            TensorFunction::Quantize { .. } => FN_QUANTIZE,
            TensorFunction::Dequantize { .. } => FN_DEQUANTIZE,
            TensorFunction::ResizeImage { .. } => FN_RESIZE_IMAGE,
            TensorFunction::Gather { .. } => FN_GATHER,
            TensorFunction::GatherNd { .. } => FN_GATHER_ND,
            TensorFunction::Bitcast { .. } => FN_BITCAST,
            TensorFunction::Clamp { .. } => FN_CLAMP,
            TensorFunction::Convert { .. } => FN_CONVERT,
            TensorFunction::FusedUnary { .. } => FN_FUSED_UNARY,
            TensorFunction::BatchToSpace { .. } => FN_BATCH_TO_SPACE,
            TensorFunction::TableLookup1d { .. } => FN_TABLE_LOOKUP1D,
        }
    }

    pub fn name(&self) -> &'static str {
        function_name(self.code()).unwrap_or("unknown")
    }

    /// Operand descriptors in push order; the output is always last.
    pub fn operands(&self) -> Vec<TensorOperand> {
        match self {
            TensorFunction::Binary { lhs, rhs, output, .. } => vec![*lhs, *rhs, *output],
            TensorFunction::Conv2d {
                input,
                weights,
                bias,
                output,
                ..
            }
            | TensorFunction::Conv2dTranspose {
                input,
                weights,
                bias,
                output,
                ..
            } => vec![*input, *weights, *bias, *output],
            TensorFunction::Matmul { lhs, rhs, bias, output, .. } => vec![*lhs, *rhs, *bias, *output],
            TensorFunction::Concat { inputs, output, .. } => {
                inputs.iter().copied().chain(std::iter::once(*output)).collect()
            }
            TensorFunction::Gather { input, indices, output, .. }
            | TensorFunction::GatherNd { input, indices, output, .. } => vec![*input, *indices, *output],
            TensorFunction::Clamp { input, low, high, output } => vec![*input, *low, *high, *output],
            TensorFunction::TableLookup1d { input, table, output } => vec![*input, *table, *output],
            TensorFunction::Unary { input, output, .. }
            | TensorFunction::Pad { input, output, .. }
            | TensorFunction::Slice { input, output, .. }
            | TensorFunction::Transpose { input, output, .. }
            | TensorFunction::Reduce { input, output, .. }
            | TensorFunction::ReduceWindow2d { input, output, .. }
            | TensorFunction::Quantize { input, output, .. }
            | TensorFunction::Dequantize { input, output, .. }
            | TensorFunction::ResizeImage { input, output, .. }
            | TensorFunction::Bitcast { input, output }
            | TensorFunction::Convert { input, output }
            | TensorFunction::FusedUnary { input, output, .. }
            | TensorFunction::BatchToSpace { input, output, .. } => vec![*input, *output],
        }
    }

    pub fn encode(&self, writer: &mut SectionWriter) {
        writer.write_u16(self.code());
        match self {
            TensorFunction::Binary {
                op,
                lhs,
                rhs,
                output,
                activation,
            } => {
                writer.write_u8(op.code());
                write_operands(writer, &[*lhs, *rhs, *output]);
                write_range(writer, *activation);
            }
            TensorFunction::Unary { op, input, output } => {
                writer.write_u8(op.code());
                write_operands(writer, &[*input, *output]);
            }
            TensorFunction::Conv2d {
                input,
                weights,
                bias,
                output,
                params,
            }
            | TensorFunction::Conv2dTranspose {
                input,
                weights,
                bias,
                output,
                params,
            } => {
                write_operands(writer, &[*input, *weights, *bias, *output]);
                for value in [
                    params.groups,
                    params.stride_h,
                    params.stride_w,
                    params.dilation_h,
                    params.dilation_w,
                ] {
                    writer.write_u32(value);
                }
                writer.write_u8(params.paddings);
                write_range(writer, params.activation);
            }
            TensorFunction::Matmul {
                lhs,
                rhs,
                bias,
                output,
                activation,
            } => {
                write_operands(writer, &[*lhs, *rhs, *bias, *output]);
                write_range(writer, *activation);
            }
            TensorFunction::Pad {
                input,
                output,
                paddings,
                mode,
                pad_value,
            } => {
                write_operands(writer, &[*input, *output]);
                writer.write_u8(*paddings);
                writer.write_u8(mode.code());
                writer.write_f32(*pad_value);
            }
            TensorFunction::Slice {
                input,
                output,
                begin,
                end,
                strides,
            } => {
                write_operands(writer, &[*input, *output]);
                writer.write_u8(*begin);
                writer.write_u8(*end);
                writer.write_u8(*strides);
            }
            TensorFunction::Transpose { input, output, perm } => {
                write_operands(writer, &[*input, *output]);
                writer.write_u8(*perm);
            }
            TensorFunction::Concat { inputs, output, axis } => {
                // the input count is bounded by the emitter
                writer.write_u8(inputs.len() as u8);
                write_operands(writer, inputs);
                write_operands(writer, &[*output]);
                writer.write_u8(*axis);
            }
            TensorFunction::Reduce {
                op,
                input,
                output,
                axes,
                init_value,
                keep_dims,
            } => {
                writer.write_u8(op.code());
                write_operands(writer, &[*input, *output]);
                writer.write_u8(*axes);
                writer.write_f32(*init_value);
                writer.write_bool(*keep_dims);
            }
            TensorFunction::ReduceWindow2d { input, output, params } => {
                writer.write_u8(params.op.code());
                write_operands(writer, &[*input, *output]);
                writer.write_f32(params.init_value);
                for value in [
                    params.filter_h,
                    params.filter_w,
                    params.stride_h,
                    params.stride_w,
                    params.dilation_h,
                    params.dilation_w,
                ] {
                    writer.write_u32(value);
                }
                writer.write_u8(params.paddings);
                write_range(writer, params.activation);
            }
            TensorFunction::Quantize { input, output, param }
            | TensorFunction::Dequantize { input, output, param } => {
                write_operands(writer, &[*input, *output]);
                writer.write_f32(param.scale);
                writer.write_i32(param.zero_point);
            }
            TensorFunction::ResizeImage {
                mode,
                input,
                output,
                new_size,
                align_corners,
                half_pixel_centers,
            } => {
                writer.write_u8(mode.code());
                write_operands(writer, &[*input, *output]);
                writer.write_u32(new_size[0]);
                writer.write_u32(new_size[1]);
                writer.write_bool(*align_corners);
                writer.write_bool(*half_pixel_centers);
            }
            TensorFunction::Gather {
                input,
                indices,
                output,
                axis,
            } => {
                write_operands(writer, &[*input, *indices, *output]);
                writer.write_u8(*axis);
            }
            TensorFunction::GatherNd {
                input,
                indices,
                output,
                batch_dims,
            } => {
                write_operands(writer, &[*input, *indices, *output]);
                writer.write_u8(*batch_dims);
            }
            TensorFunction::Bitcast { input, output } | TensorFunction::Convert { input, output } => {
                write_operands(writer, &[*input, *output]);
            }
            TensorFunction::Clamp {
                input,
                low,
                high,
                output,
            } => write_operands(writer, &[*input, *low, *high, *output]),
            TensorFunction::FusedUnary { input, output, body } => {
                write_operands(writer, &[*input, *output]);
                // bodies are bounded by the emitter
                writer.write_u32(body.len() as u32);
                writer.write_bytes(body);
            }
            TensorFunction::BatchToSpace {
                input,
                output,
                block_h,
                block_w,
                crops,
            } => {
                write_operands(writer, &[*input, *output]);
                writer.write_u32(*block_h);
                writer.write_u32(*block_w);
                writer.write_u8(*crops);
            }
            TensorFunction::TableLookup1d { input, table, output } => {
                write_operands(writer, &[*input, *table, *output]);
            }
        }
    }
}

fn write_operands(writer: &mut SectionWriter, operands: &[TensorOperand]) {
    for operand in operands {
        writer.write_u8(operand.dtype.tag());
        writer.write_u8(operand.shape);
        writer.write_u8(operand.strides);
    }
}

fn write_range(writer: &mut SectionWriter, range: ValueRange) {
    writer.write_f32(range.min);
    writer.write_f32(range.max);
}

/// One `.text` instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Nop,
    LdcI4(i32),
    LdcR4(f32),
    LeaBuffer { location: MemoryLocation, offset: u32 },
    StShape { reg: u8, rank: u8 },
    StPaddings { reg: u8, rank: u8 },
    Tensor(TensorFunction),
}

impl Instruction {
    pub fn opcode(&self) -> u8 {
        match self {
            Instruction::Nop => OP_NOP,
            Instruction::LdcI4(_) => OP_LDC_I4,
            Instruction::LdcR4(_) => OP_LDC_R4,
            Instruction::LeaBuffer { .. } => OP_LEA_BUFFER,
            Instruction::StShape { .. } => OP_STSHAPE,
            Instruction::StPaddings { .. } => OP_STPADDINGS,
            Instruction::Tensor(_) => OP_TENSOR,
        }
    }

    pub fn encode(&self, writer: &mut SectionWriter) {
        writer.write_u8(self.opcode());
        match self {
            Instruction::Nop => {}
            Instruction::LdcI4(value) => writer.write_i32(*value),
            Instruction::LdcR4(value) => writer.write_f32(*value),
            Instruction::LeaBuffer { location, offset } => {
                writer.write_u8(location.tag());
                writer.write_u32(*offset);
            }
            Instruction::StShape { reg, rank } | Instruction::StPaddings { reg, rank } => {
                writer.write_u8(*reg);
                writer.write_u8(*rank);
            }
            Instruction::Tensor(function) => function.encode(writer),
        }
    }
}

impl fmt::Display for TensorOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[s{}/s{}]", self.dtype, self.shape, self.strides)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = opcode_name(self.opcode()).unwrap_or("?");
        match self {
            Instruction::Nop => f.write_str(name),
            Instruction::LdcI4(value) => write!(f, "{name} {value}"),
            Instruction::LdcR4(value) => write!(f, "{name} {value:?}"),
            Instruction::LeaBuffer { location, offset } => write!(f, "{name} {location}+{offset}"),
            Instruction::StShape { reg, rank } => write!(f, "{name} s{reg}, {rank}"),
            Instruction::StPaddings { reg, rank } => write!(f, "{name} p{reg}, {rank}"),
            Instruction::Tensor(function) => {
                write!(f, "{name} {}", function.name())?;
                for operand in function.operands() {
                    write!(f, " {operand}")?;
                }
                Ok(())
            }
        }
    }
}
