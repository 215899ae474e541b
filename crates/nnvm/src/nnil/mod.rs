//! NNIL: the per-element stack bytecode carried by fused-unary nodes.
//!
//! Layout: one opcode byte, optionally followed by a little-endian `f32`
//! immediate. Unary and binary opcodes embed `UnaryOp::code()` and
//! `BinaryOp::code()`, the same codes the stack VM uses for whole-tensor
//! unary and binary records.

use thiserror::Error;

use crate::error::{GraphError, GraphResult};
use crate::ir::{BinaryOp, FusedNode, FusedSubgraph, OpKind, UnaryOp};
use crate::ir::NodeId;

pub const OP_NOP: u8 = 0x00;
pub const OP_DUP: u8 = 0x01;
pub const OP_POP: u8 = 0x02;
pub const OP_LDA_0: u8 = 0x03;
pub const OP_LDC_R4: u8 = 0x04;
pub const OP_CLAMP: u8 = 0x05;
pub const OP_STA_0: u8 = 0x06;
pub const OP_RET: u8 = 0x0f;
pub const OP_UNARY_BASE: u8 = 0x20;
pub const OP_BINARY_BASE: u8 = 0x40;

const UNARY_SLOTS: u8 = 0x20;
const BINARY_SLOTS: u8 = 0x20;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NnilInstruction {
    Nop,
    Dup,
    Pop,
    /// Push the current input element.
    Lda0,
    /// Pop into the element's output slot.
    Sta0,
    LdcR4(f32),
    Unary(UnaryOp),
    Binary(BinaryOp),
    /// Pops `high`, `low`, `x`; pushes `x` clamped to `[low, high]`.
    Clamp,
    /// Ends the body. The result is the output slot if `sta_0` ran, else the
    /// top of the stack.
    Ret,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NnilError {
    #[error("unknown nnil opcode {opcode:#04x} at byte {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },
    #[error("truncated nnil immediate at byte {offset}")]
    Truncated { offset: usize },
}

/// Append-only NNIL writer over a private buffer.
#[derive(Debug, Default)]
pub struct NnilBuilder {
    body: Vec<u8>,
}

impl NnilBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, instruction: NnilInstruction) {
        match instruction {
            NnilInstruction::Nop => self.body.push(OP_NOP),
            NnilInstruction::Dup => self.body.push(OP_DUP),
            NnilInstruction::Pop => self.body.push(OP_POP),
            NnilInstruction::Lda0 => self.body.push(OP_LDA_0),
            NnilInstruction::Sta0 => self.body.push(OP_STA_0),
            NnilInstruction::LdcR4(value) => {
                self.body.push(OP_LDC_R4);
                self.body.extend_from_slice(&value.to_le_bytes());
            }
            NnilInstruction::Unary(op) => self.body.push(OP_UNARY_BASE + op.code()),
            NnilInstruction::Binary(op) => self.body.push(OP_BINARY_BASE + op.code()),
            NnilInstruction::Clamp => self.body.push(OP_CLAMP),
            NnilInstruction::Ret => self.body.push(OP_RET),
        }
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        self.body
    }
}

/// Decodes an NNIL body one instruction at a time.
pub struct NnilReader<'a> {
    body: &'a [u8],
    position: usize,
}

impl<'a> NnilReader<'a> {
    pub fn new(body: &'a [u8]) -> Self {
        Self { body, position: 0 }
    }

    fn decode(&mut self) -> Result<NnilInstruction, NnilError> {
        let offset = self.position;
        let opcode = self.body[offset];
        self.position += 1;
        let instruction = match opcode {
            OP_NOP => NnilInstruction::Nop,
            OP_DUP => NnilInstruction::Dup,
            OP_POP => NnilInstruction::Pop,
            OP_LDA_0 => NnilInstruction::Lda0,
            OP_STA_0 => NnilInstruction::Sta0,
            OP_LDC_R4 => {
                let raw = self
                    .body
                    .get(self.position..self.position + 4)
                    .ok_or(NnilError::Truncated { offset })?;
                self.position += 4;
                NnilInstruction::LdcR4(f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
            }
            OP_CLAMP => NnilInstruction::Clamp,
            OP_RET => NnilInstruction::Ret,
            code if (OP_UNARY_BASE..OP_UNARY_BASE + UNARY_SLOTS).contains(&code) => {
                UnaryOp::from_code(code - OP_UNARY_BASE)
                    .map(NnilInstruction::Unary)
                    .ok_or(NnilError::UnknownOpcode { opcode, offset })?
            }
            code if (OP_BINARY_BASE..OP_BINARY_BASE + BINARY_SLOTS).contains(&code) => {
                BinaryOp::from_code(code - OP_BINARY_BASE)
                    .map(NnilInstruction::Binary)
                    .ok_or(NnilError::UnknownOpcode { opcode, offset })?
            }
            _ => return Err(NnilError::UnknownOpcode { opcode, offset }),
        };
        Ok(instruction)
    }
}

impl Iterator for NnilReader<'_> {
    type Item = Result<NnilInstruction, NnilError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.body.len() {
            return None;
        }
        let item = self.decode();
        if item.is_err() {
            self.position = self.body.len();
        }
        Some(item)
    }
}

pub fn decode_body(body: &[u8]) -> Result<Vec<NnilInstruction>, NnilError> {
    NnilReader::new(body).collect()
}

/// Compiles a fused subgraph into `builder` by post-order walk from its
/// output, terminated by `ret`.
pub fn compile_fused_subgraph(
    node: NodeId,
    subgraph: &FusedSubgraph,
    builder: &mut NnilBuilder,
) -> GraphResult<()> {
    if subgraph.output >= subgraph.nodes.len() {
        return Err(invalid(node, format!("output {} is not a subgraph node", subgraph.output)));
    }
    emit_node(node, subgraph, subgraph.output, builder)?;
    builder.emit(NnilInstruction::Ret);
    Ok(())
}

/// Convenience wrapper returning a fresh body.
pub fn compile_fused_body(node: NodeId, subgraph: &FusedSubgraph) -> GraphResult<Vec<u8>> {
    let mut builder = NnilBuilder::new();
    compile_fused_subgraph(node, subgraph, &mut builder)?;
    Ok(builder.finish())
}

fn invalid(node: NodeId, detail: String) -> GraphError {
    GraphError::InvalidNode {
        node,
        kind: OpKind::FusedUnary,
        detail,
    }
}

fn emit_node(
    node: NodeId,
    subgraph: &FusedSubgraph,
    index: usize,
    builder: &mut NnilBuilder,
) -> GraphResult<()> {
    // operands must precede their users, which also bounds the recursion
    let operand = |operand: usize| {
        if operand < index {
            Ok(operand)
        } else {
            Err(invalid(
                node,
                format!("subgraph node {index} uses later node {operand}"),
            ))
        }
    };
    match subgraph.nodes[index] {
        FusedNode::Input => builder.emit(NnilInstruction::Lda0),
        FusedNode::Constant { value } => builder.emit(NnilInstruction::LdcR4(value)),
        FusedNode::Unary { op, input } => {
            emit_node(node, subgraph, operand(input)?, builder)?;
            builder.emit(NnilInstruction::Unary(op));
        }
        FusedNode::Binary { op, lhs, rhs } => {
            emit_node(node, subgraph, operand(lhs)?, builder)?;
            emit_node(node, subgraph, operand(rhs)?, builder)?;
            builder.emit(NnilInstruction::Binary(op));
        }
        FusedNode::Clamp { input, low, high } => {
            emit_node(node, subgraph, operand(input)?, builder)?;
            emit_node(node, subgraph, operand(low)?, builder)?;
            emit_node(node, subgraph, operand(high)?, builder)?;
            builder.emit(NnilInstruction::Clamp);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_post_order() {
        // relu6(x * 2 + 1)
        let mut graph = FusedSubgraph::new();
        let x = graph.input();
        let two = graph.constant(2.0);
        let scaled = graph.binary(BinaryOp::Mul, x, two);
        let one = graph.constant(1.0);
        let shifted = graph.binary(BinaryOp::Add, scaled, one);
        let low = graph.constant(0.0);
        let high = graph.constant(6.0);
        graph.clamp(shifted, low, high);

        let body = compile_fused_body(NodeId(0), &graph).expect("compile");
        let decoded = decode_body(&body).expect("decode");
        assert_eq!(
            decoded,
            vec![
                NnilInstruction::Lda0,
                NnilInstruction::LdcR4(2.0),
                NnilInstruction::Binary(BinaryOp::Mul),
                NnilInstruction::LdcR4(1.0),
                NnilInstruction::Binary(BinaryOp::Add),
                NnilInstruction::LdcR4(0.0),
                NnilInstruction::LdcR4(6.0),
                NnilInstruction::Clamp,
                NnilInstruction::Ret,
            ]
        );
    }

    #[test]
    fn forward_references_are_rejected() {
        let graph = FusedSubgraph {
            nodes: vec![FusedNode::Unary {
                op: UnaryOp::Neg,
                input: 0,
            }],
            output: 0,
        };
        assert!(matches!(
            compile_fused_body(NodeId(3), &graph),
            Err(GraphError::InvalidNode { .. })
        ));
    }

    #[test]
    fn reader_reports_bad_opcodes() {
        assert_eq!(
            decode_body(&[OP_LDA_0, 0xee]),
            Err(NnilError::UnknownOpcode {
                opcode: 0xee,
                offset: 1
            })
        );
        assert_eq!(
            decode_body(&[OP_LDC_R4, 0, 0]),
            Err(NnilError::Truncated { offset: 0 })
        );
    }
}
