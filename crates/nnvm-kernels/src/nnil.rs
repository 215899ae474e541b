use nnvm::nnil::{decode_body, NnilInstruction};
use nnvm::tensor::IndexIter;
use nnvm::{DataType, KernelError, KernelResult, TensorView, TensorViewMut};
use smallvec::SmallVec;

use crate::elementwise::{binary_f32, unary_f32};
use crate::util::{expect_dtype, expect_shape};

const OP: &str = "nnil_unary_method";

pub type Stack = SmallVec<[f32; 8]>;

fn pop(stack: &mut Stack, position: usize) -> KernelResult<f32> {
    stack
        .pop()
        .ok_or_else(|| KernelError::invalid(OP, format!("stack underflow at instruction {position}")))
}

/// Runs a decoded body for one element.
pub fn eval_element(program: &[NnilInstruction], input: f32, stack: &mut Stack) -> KernelResult<f32> {
    stack.clear();
    let mut slot = None;
    for (position, instruction) in program.iter().enumerate() {
        match *instruction {
            NnilInstruction::Nop => {}
            NnilInstruction::Dup => {
                let top = pop(stack, position)?;
                stack.push(top);
                stack.push(top);
            }
            NnilInstruction::Pop => {
                pop(stack, position)?;
            }
            NnilInstruction::Lda0 => stack.push(input),
            NnilInstruction::Sta0 => slot = Some(pop(stack, position)?),
            NnilInstruction::LdcR4(value) => stack.push(value),
            NnilInstruction::Unary(op) => {
                let a = pop(stack, position)?;
                stack.push(unary_f32(op, a));
            }
            NnilInstruction::Binary(op) => {
                let b = pop(stack, position)?;
                let a = pop(stack, position)?;
                stack.push(binary_f32(op, a, b));
            }
            NnilInstruction::Clamp => {
                let high = pop(stack, position)?;
                let low = pop(stack, position)?;
                let x = pop(stack, position)?;
                stack.push(libm::fminf(libm::fmaxf(x, low), high));
            }
            NnilInstruction::Ret => {
                return match slot {
                    Some(value) => Ok(value),
                    None => pop(stack, position),
                };
            }
        }
    }
    Err(KernelError::invalid(OP, "body does not end with ret"))
}

/// Applies an NNIL body to every element of a `Float32` tensor.
pub fn nnil_unary_method(input: &TensorView<'_>, output: &mut TensorViewMut<'_>, body: &[u8]) -> KernelResult<()> {
    expect_dtype(OP, input.dtype(), DataType::Float32)?;
    expect_dtype(OP, output.dtype(), DataType::Float32)?;
    expect_shape(OP, output.shape(), input.shape())?;
    let program = decode_body(body).map_err(|err| KernelError::invalid(OP, err.to_string()))?;
    let mut stack = Stack::new();
    for index in IndexIter::new(input.shape()) {
        let value = eval_element(&program, input.read::<f32>(&index), &mut stack)?;
        output.write(&index, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nnvm::ir::{BinaryOp, FusedSubgraph, NodeId, UnaryOp};
    use nnvm::nnil::{compile_fused_body, NnilBuilder};

    use crate::test_util::{f32_bytes, read_f32};

    #[test]
    fn compiled_subgraph_matches_direct_evaluation() {
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

        let values = [-3.0, 0.0, 1.0, 4.0];
        let bytes = f32_bytes(&values);
        let input = TensorView::contiguous(DataType::Float32, &bytes, &[4]).expect("input");
        let mut out = vec![0u8; 16];
        {
            let mut output = TensorViewMut::contiguous(DataType::Float32, &mut out, &[4]).expect("out");
            nnil_unary_method(&input, &mut output, &body).expect("run");
        }
        assert_eq!(read_f32(&out), vec![0.0, 1.0, 3.0, 6.0]);
    }

    #[test]
    fn subtraction_pops_rhs_first() {
        let mut builder = NnilBuilder::new();
        builder.emit(NnilInstruction::LdcR4(10.0));
        builder.emit(NnilInstruction::Lda0);
        builder.emit(NnilInstruction::Binary(BinaryOp::Sub));
        builder.emit(NnilInstruction::Dup);
        builder.emit(NnilInstruction::Unary(UnaryOp::Neg));
        builder.emit(NnilInstruction::Sta0);
        builder.emit(NnilInstruction::Ret);
        let program = decode_body(&builder.finish()).expect("decode");
        let mut stack = Stack::new();
        assert_eq!(eval_element(&program, 3.0, &mut stack).expect("eval"), -7.0);
    }

    #[test]
    fn malformed_bodies_are_errors() {
        let mut stack = Stack::new();
        let underflow = [NnilInstruction::Binary(BinaryOp::Add), NnilInstruction::Ret];
        assert!(eval_element(&underflow, 1.0, &mut stack).is_err());
        let unterminated = [NnilInstruction::Lda0];
        assert!(eval_element(&unterminated, 1.0, &mut stack).is_err());
    }
}
