//! Reference kernels for every nnvm operator.
//!
//! Each kernel reads strided [`TensorView`](nnvm::TensorView)s and writes into
//! a caller-sized [`TensorViewMut`](nnvm::TensorViewMut). Kernels never
//! allocate output storage and report configuration or geometry problems as
//! [`KernelError`](nnvm::KernelError).

pub mod conv;
pub mod elementwise;
pub mod gather;
pub mod nnil;
pub mod quant;
pub mod reduce;
pub mod resize;
pub mod shape;

mod util;

#[cfg(test)]
mod test_util;

pub use conv::{conv2d, conv2d_transpose, matmul};
pub use elementwise::{binary, binary_f32, binary_i32, round_half_even, unary, unary_f32};
pub use gather::{gather, gather_nd, gather_nd_shape};
pub use nnil::nnil_unary_method;
pub use quant::{clamp, convert, dequantize, quantize, quantize_value, table_lookup1d};
pub use reduce::{reduce, reduce_window2d};
pub use resize::{resize_bilinear, resize_nearest};
pub use shape::{batch_to_space, bitcast, concat, pad, slice, transpose};
