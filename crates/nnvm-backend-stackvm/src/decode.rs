//! Decoding of `.text` back into [`Instruction`] records.

use std::fmt::Write as _;

use nnvm::ir::{BinaryOp, PadMode, QuantParam, ReduceOp, ResizeMode, UnaryOp, ValueRange};
use nnvm::schedule::MemoryLocation;
use nnvm::DataType;

use crate::error::DecodeError;
use crate::instruction::{ConvParams, Instruction, TensorFunction, TensorOperand, WindowParams};
use crate::opcode::*;

/// Little-endian cursor over a section body.
#[derive(Debug, Clone)]
pub struct SectionReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> SectionReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(DecodeError::Truncated { offset: self.pos })?;
        let bytes = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        let offset = self.pos;
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(DecodeError::InvalidField { field: "bool", offset }),
        }
    }

    fn coded<T>(&mut self, field: &'static str, decode: impl FnOnce(u8) -> Option<T>) -> Result<T, DecodeError> {
        let offset = self.pos;
        decode(self.read_u8()?).ok_or(DecodeError::InvalidField { field, offset })
    }

    fn operand(&mut self) -> Result<TensorOperand, DecodeError> {
        Ok(TensorOperand {
            dtype: self.coded("dtype", DataType::from_tag)?,
            shape: self.read_u8()?,
            strides: self.read_u8()?,
        })
    }

    fn range(&mut self) -> Result<ValueRange, DecodeError> {
        Ok(ValueRange::new(self.read_f32()?, self.read_f32()?))
    }
}

/// Iterates `(byte offset, instruction)` pairs of a `.text` body.
pub struct InstructionReader<'a> {
    reader: SectionReader<'a>,
    failed: bool,
}

impl<'a> InstructionReader<'a> {
    pub fn new(text: &'a [u8]) -> Self {
        Self {
            reader: SectionReader::new(text),
            failed: false,
        }
    }

    fn decode(&mut self) -> Result<Instruction, DecodeError> {
        let r = &mut self.reader;
        let offset = r.position();
        let opcode = r.read_u8()?;
        Ok(match opcode {
            OP_NOP => Instruction::Nop,
            OP_LDC_I4 => Instruction::LdcI4(r.read_i32()?),
            OP_LDC_R4 => Instruction::LdcR4(r.read_f32()?),
            OP_LEA_BUFFER => Instruction::LeaBuffer {
                location: r.coded("location", MemoryLocation::from_tag)?,
                offset: r.read_u32()?,
            },
            OP_STSHAPE => Instruction::StShape {
                reg: r.read_u8()?,
                rank: r.read_u8()?,
            },
            OP_STPADDINGS => Instruction::StPaddings {
                reg: r.read_u8()?,
                rank: r.read_u8()?,
            },
            OP_TENSOR => Instruction::Tensor(decode_function(r)?),
            _ => return Err(DecodeError::UnknownOpcode { opcode, offset }),
        })
    }
}

impl Iterator for InstructionReader<'_> {
    type Item = Result<(usize, Instruction), DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.reader.is_empty() {
            return None;
        }
        let offset = self.reader.position();
        let item = self.decode().map(|instruction| (offset, instruction));
        self.failed = item.is_err();
        Some(item)
    }
}

pub fn decode_text(text: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
    InstructionReader::new(text)
        .map(|item| item.map(|(_, instruction)| instruction))
        .collect()
}

/// One instruction per line, prefixed with its byte offset.
pub fn disassemble(text: &[u8]) -> Result<String, DecodeError> {
    let mut out = String::new();
    for item in InstructionReader::new(text) {
        let (offset, instruction) = item?;
        // writing into a String cannot fail
        let _ = writeln!(out, "{offset:06x}: {instruction}");
    }
    Ok(out)
}

fn conv_params(r: &mut SectionReader<'_>) -> Result<ConvParams, DecodeError> {
    Ok(ConvParams {
        groups: r.read_u32()?,
        stride_h: r.read_u32()?,
        stride_w: r.read_u32()?,
        dilation_h: r.read_u32()?,
        dilation_w: r.read_u32()?,
        paddings: r.read_u8()?,
        activation: r.range()?,
    })
}

fn decode_function(r: &mut SectionReader<'_>) -> Result<TensorFunction, DecodeError> {
    let offset = r.position();
    let code = r.read_u16()?;
    Ok(match code {
        FN_BINARY => TensorFunction::Binary {
            op: r.coded("binary op", BinaryOp::from_code)?,
            lhs: r.operand()?,
            rhs: r.operand()?,
            output: r.operand()?,
            activation: r.range()?,
        },
        FN_UNARY => TensorFunction::Unary {
            op: r.coded("unary op", UnaryOp::from_code)?,
            input: r.operand()?,
            output: r.operand()?,
        },
        FN_CONV2D => TensorFunction::Conv2d {
            input: r.operand()?,
            weights: r.operand()?,
            bias: r.operand()?,
            output: r.operand()?,
            params: conv_params(r)?,
        },
        FN_CONV2D_TRANSPOSE => TensorFunction::Conv2dTranspose {
            input: r.operand()?,
            weights: r.operand()?,
            bias: r.operand()?,
            output: r.operand()?,
            params: conv_params(r)?,
        },
        FN_MATMUL => TensorFunction::Matmul {
            lhs: r.operand()?,
            rhs: r.operand()?,
            bias: r.operand()?,
            output: r.operand()?,
            activation: r.range()?,
        },
        FN_PAD => TensorFunction::Pad {
            input: r.operand()?,
            output: r.operand()?,
            paddings: r.read_u8()?,
            mode: r.coded("pad mode", PadMode::from_code)?,
            pad_value: r.read_f32()?,
        },
        FN_SLICE => TensorFunction::Slice {
            input: r.operand()?,
            output: r.operand()?,
            begin: r.read_u8()?,
            end: r.read_u8()?,
            strides: r.read_u8()?,
        },
        FN_TRANSPOSE => TensorFunction::Transpose {
            input: r.operand()?,
            output: r.operand()?,
            perm: r.read_u8()?,
        },
        FN_CONCAT => {
            let count = r.read_u8()?;
            let inputs = (0..count).map(|_| r.operand()).collect::<Result<Vec<_>, _>>()?;
            TensorFunction::Concat {
                inputs,
                output: r.operand()?,
                axis: r.read_u8()?,
            }
        }
        FN_REDUCE => TensorFunction::Reduce {
            op: r.coded("reduce op", ReduceOp::from_code)?,
            input: r.operand()?,
            output: r.operand()?,
            axes: r.read_u8()?,
            init_value: r.read_f32()?,
            keep_dims: r.read_bool()?,
        },
        FN_REDUCE_WINDOW2D => {
            let op = r.coded("reduce op", ReduceOp::from_code)?;
            let input = r.operand()?;
            let output = r.operand()?;
            TensorFunction::ReduceWindow2d {
                input,
                output,
                params: WindowParams {
                    op,
                    init_value: r.read_f32()?,
                    filter_h: r.read_u32()?,
                    filter_w: r.read_u32()?,
                    stride_h: r.read_u32()?,
                    stride_w: r.read_u32()?,
                    dilation_h: r.read_u32()?,
                    dilation_w: r.read_u32()?,
                    paddings: r.read_u8()?,
                    activation: r.range()?,
                },
            }
        }
        FN_QUANTIZE => TensorFunction::Quantize {
            input: r.operand()?,
            output: r.operand()?,
            param: QuantParam::new(r.read_f32()?, r.read_i32()?),
        },
        FN_DEQUANTIZE => TensorFunction::Dequantize {
            input: r.operand()?,
            output: r.operand()?,
            param: QuantParam::new(r.read_f32()?, r.read_i32()?),
        },
        FN_RESIZE_IMAGE => TensorFunction::ResizeImage {
            mode: r.coded("resize mode", ResizeMode::from_code)?,
            input: r.operand()?,
            output: r.operand()?,
            new_size: [r.read_u32()?, r.read_u32()?],
            align_corners: r.read_bool()?,
            half_pixel_centers: r.read_bool()?,
        },
        FN_GATHER => TensorFunction::Gather {
            input: r.operand()?,
            indices: r.operand()?,
            output: r.operand()?,
            axis: r.read_u8()?,
        },
        FN_GATHER_ND => TensorFunction::GatherNd {
            input: r.operand()?,
            indices: r.operand()?,
            output: r.operand()?,
            batch_dims: r.read_u8()?,
        },
        FN_BITCAST => TensorFunction::Bitcast {
            input: r.operand()?,
            output: r.operand()?,
        },
        FN_CLAMP => TensorFunction::Clamp {
            input: r.operand()?,
            low: r.operand()?,
            high: r.operand()?,
            output: r.operand()?,
        },
        FN_CONVERT => TensorFunction::Convert {
            input: r.operand()?,
            output: r.operand()?,
        },
        FN_FUSED_UNARY => {
            let input = r.operand()?;
            let output = r.operand()?;
            let len = r.read_u32()? as usize;
            TensorFunction::FusedUnary {
                input,
                output,
                body: r.read_bytes(len)?.to_vec(),
            }
        }
        FN_BATCH_TO_SPACE => TensorFunction::BatchToSpace {
            input: r.operand()?,
            output: r.operand()?,
            block_h: r.read_u32()?,
            block_w: r.read_u32()?,
            crops: r.read_u8()?,
        },
        FN_TABLE_LOOKUP1D => TensorFunction::TableLookup1d {
            input: r.operand()?,
            table: r.operand()?,
            output: r.operand()?,
        },
        _ => return Err(DecodeError::UnknownFunction { code, offset }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::SectionWriter;

    fn operand(dtype: DataType, reg: u8) -> TensorOperand {
        TensorOperand {
            dtype,
            shape: reg,
            strides: reg + 1,
        }
    }

    #[test]
    fn decodes_what_was_encoded() {
        let program = vec![
            Instruction::Nop,
            Instruction::LdcI4(-7),
            Instruction::LdcR4(0.25),
            Instruction::LeaBuffer {
                location: MemoryLocation::Rdata,
                offset: 64,
            },
            Instruction::StShape { reg: 2, rank: 3 },
            Instruction::StPaddings { reg: 0, rank: 2 },
            Instruction::Tensor(TensorFunction::Concat {
                inputs: vec![operand(DataType::Float32, 0), operand(DataType::Float32, 2)],
                output: operand(DataType::Float32, 4),
                axis: 1,
            }),
            Instruction::Tensor(TensorFunction::FusedUnary {
                input: operand(DataType::Float32, 0),
                output: operand(DataType::Float32, 2),
                body: vec![0x03, 0x0f],
            }),
            Instruction::Tensor(TensorFunction::ReduceWindow2d {
                input: operand(DataType::Float32, 0),
                output: operand(DataType::Float32, 2),
                params: WindowParams {
                    op: ReduceOp::Max,
                    init_value: f32::NEG_INFINITY,
                    filter_h: 2,
                    filter_w: 2,
                    stride_h: 2,
                    stride_w: 2,
                    dilation_h: 1,
                    dilation_w: 1,
                    paddings: 0,
                    activation: ValueRange::relu6(),
                },
            }),
        ];
        let mut writer = SectionWriter::new();
        for instruction in &program {
            instruction.encode(&mut writer);
        }
        assert_eq!(decode_text(writer.as_bytes()).expect("decode"), program);
    }

    #[test]
    fn rejects_unknown_opcode_and_truncation() {
        assert_eq!(
            decode_text(&[OP_NOP, 0xee]),
            Err(DecodeError::UnknownOpcode {
                opcode: 0xee,
                offset: 1
            })
        );
        assert_eq!(
            decode_text(&[OP_LDC_I4, 1, 2]),
            Err(DecodeError::Truncated { offset: 1 })
        );
        let mut writer = SectionWriter::new();
        writer.write_u8(OP_TENSOR);
        writer.write_u16(0x7777);
        assert!(matches!(
            decode_text(writer.as_bytes()),
            Err(DecodeError::UnknownFunction { code: 0x7777, .. })
        ));
    }

    #[test]
    fn disassembly_lists_offsets() {
        let mut writer = SectionWriter::new();
        Instruction::LdcI4(3).encode(&mut writer);
        Instruction::StShape { reg: 0, rank: 1 }.encode(&mut writer);
        let listing = disassemble(writer.as_bytes()).expect("listing");
        assert_eq!(listing, "000000: ldc.i4 3\n000005: stshape s0, 1\n");
    }
}
