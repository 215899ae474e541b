use nnvm::{DataType, KernelError, KernelResult};

pub(crate) fn expect_dtype(op: &'static str, actual: DataType, expected: DataType) -> KernelResult<()> {
    if actual != expected {
        return Err(KernelError::unsupported_type(op, actual));
    }
    Ok(())
}

pub(crate) fn expect_same_width(op: &'static str, lhs: DataType, rhs: DataType) -> KernelResult<()> {
    if lhs.size_in_bytes() != rhs.size_in_bytes() {
        return Err(KernelError::invalid(
            op,
            format!("element widths differ: {lhs} vs {rhs}"),
        ));
    }
    Ok(())
}

pub(crate) fn expect_shape(op: &'static str, actual: &[usize], expected: &[usize]) -> KernelResult<()> {
    if actual != expected {
        return Err(KernelError::shape(
            op,
            format!("output shape {actual:?} but expected {expected:?}"),
        ));
    }
    Ok(())
}

pub(crate) fn rank4(op: &'static str, shape: &[usize], what: &str) -> KernelResult<[usize; 4]> {
    match shape {
        [n, c, h, w] => Ok([*n, *c, *h, *w]),
        other => Err(KernelError::shape(
            op,
            format!("{what} must be rank 4 (NCHW), got {other:?}"),
        )),
    }
}
