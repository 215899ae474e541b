mod fused;
mod graph;
mod infer;
mod ops;

pub use fused::{FusedNode, FusedSubgraph};
pub use graph::{Connector, ConnectorId, Graph, GraphBuilder, Node, NodeId};
pub use infer::{infer_output_shape, reduced_shape, slice_extent};
pub use ops::{
    Arity, BinaryOp, Conv2dAttrs, OpKind, Operation, PadMode, QuantParam, ReduceOp,
    ReduceWindow2dAttrs, ResizeMode, UnaryOp, ValueRange,
};
