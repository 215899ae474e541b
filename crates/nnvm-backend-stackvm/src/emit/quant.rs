use nnvm::ir::{Node, QuantParam};

use crate::error::EmitResult;
use crate::instruction::TensorFunction;

use super::EmitContext;

pub(super) fn emit_quantize(
    node: &Node,
    param: QuantParam,
    dequantize: bool,
    ctx: &mut EmitContext<'_>,
) -> EmitResult<()> {
    let (inputs, output) = ctx.node_operands(node)?;
    let &[input] = inputs.as_slice() else {
        return Err(ctx.arity_error(inputs.len()));
    };
    let function = if dequantize {
        TensorFunction::Dequantize { input, output, param }
    } else {
        TensorFunction::Quantize { input, output, param }
    };
    ctx.text.tensor(function);
    Ok(())
}

pub(super) fn emit_convert(node: &Node, ctx: &mut EmitContext<'_>) -> EmitResult<()> {
    let (inputs, output) = ctx.node_operands(node)?;
    let &[input] = inputs.as_slice() else {
        return Err(ctx.arity_error(inputs.len()));
    };
    ctx.text.tensor(TensorFunction::Convert { input, output });
    Ok(())
}

pub(super) fn emit_table_lookup1d(node: &Node, ctx: &mut EmitContext<'_>) -> EmitResult<()> {
    let (inputs, output) = ctx.node_operands(node)?;
    let &[input, table] = inputs.as_slice() else {
        return Err(ctx.arity_error(inputs.len()));
    };
    ctx.text.tensor(TensorFunction::TableLookup1d { input, table, output });
    Ok(())
}
