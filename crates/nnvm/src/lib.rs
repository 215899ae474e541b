//! Core types of the nnvm operator execution engine: tensor views over raw
//! bytes, the graph IR, memory binding and the NNIL bytecode used by fused
//! elementwise nodes.

pub mod env;
pub mod error;
pub mod ir;
pub mod nnil;
pub mod schedule;
pub mod tensor;

pub use error::{GraphError, GraphResult, KernelError, KernelResult};
pub use tensor::{DataType, Dims, Element, TensorView, TensorViewMut};
