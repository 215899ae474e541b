use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, GraphResult};
use crate::tensor::{DataType, Dims};

use super::infer::infer_output_shape;
use super::ops::{OpKind, Operation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectorId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for ConnectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Typed, shaped edge carrying one tensor value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connector {
    pub id: ConnectorId,
    pub name: String,
    pub dtype: DataType,
    pub shape: Dims,
    pub producer: Option<NodeId>,
    pub consumers: Vec<NodeId>,
}

impl Connector {
    pub fn byte_len(&self) -> usize {
        self.shape.iter().product::<usize>() * self.dtype.size_in_bytes()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub op: Operation,
    pub inputs: Vec<ConnectorId>,
    pub outputs: Vec<ConnectorId>,
}

impl Node {
    pub fn kind(&self) -> OpKind {
        self.op.kind()
    }
}

/// Dataflow graph of operators. Nodes are stored in insertion order, which
/// the builder keeps topological.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    nodes: Vec<Node>,
    connectors: Vec<Connector>,
}

impl Graph {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn connectors(&self) -> &[Connector] {
        &self.connectors
    }

    pub fn node(&self, id: NodeId) -> GraphResult<&Node> {
        self.nodes
            .get(id.0 as usize)
            .ok_or(GraphError::UnknownNode(id))
    }

    pub fn connector(&self, id: ConnectorId) -> GraphResult<&Connector> {
        self.connectors
            .get(id.0 as usize)
            .ok_or(GraphError::UnknownConnector(id))
    }

    /// Insertion order, which is a valid schedule for builder-made graphs.
    pub fn topological_order(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|node| node.id).collect()
    }

    pub fn nodes_of_kind(&self, kind: OpKind) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(move |node| node.kind() == kind)
    }

    /// Connectors produced by input nodes, in declaration order.
    pub fn input_connectors(&self) -> Vec<ConnectorId> {
        self.nodes_of_kind(OpKind::Input)
            .flat_map(|node| node.outputs.iter().copied())
            .collect()
    }

    /// Connectors consumed by output nodes, in declaration order.
    pub fn output_connectors(&self) -> Vec<ConnectorId> {
        self.nodes_of_kind(OpKind::Output)
            .flat_map(|node| node.inputs.iter().copied())
            .collect()
    }
}

/// Stand-in for an importer: appends nodes in topological order and infers
/// output shapes.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    graph: Graph,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn new_connector(&mut self, name: String, dtype: DataType, shape: Dims) -> ConnectorId {
        let id = ConnectorId(self.graph.connectors.len() as u32);
        self.graph.connectors.push(Connector {
            id,
            name,
            dtype,
            shape,
            producer: None,
            consumers: Vec::new(),
        });
        id
    }

    /// Appends a node with explicitly typed outputs. Inputs must already exist.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        op: Operation,
        inputs: &[ConnectorId],
        outputs: &[(DataType, Dims)],
    ) -> GraphResult<NodeId> {
        for input in inputs {
            self.graph.connector(*input)?;
        }
        let name = name.into();
        let id = NodeId(self.graph.nodes.len() as u32);
        let mut output_ids = Vec::with_capacity(outputs.len());
        for (index, (dtype, shape)) in outputs.iter().enumerate() {
            let connector_name = if outputs.len() == 1 {
                name.clone()
            } else {
                format!("{name}:{index}")
            };
            let connector = self.new_connector(connector_name, *dtype, shape.clone());
            self.graph.connectors[connector.0 as usize].producer = Some(id);
            output_ids.push(connector);
        }
        for input in inputs {
            self.graph.connectors[input.0 as usize].consumers.push(id);
        }
        self.graph.nodes.push(Node {
            id,
            name,
            op,
            inputs: inputs.to_vec(),
            outputs: output_ids,
        });
        Ok(id)
    }

    /// Appends a single-output node whose shape is inferred from its inputs.
    pub fn emit(
        &mut self,
        name: impl Into<String>,
        op: Operation,
        inputs: &[ConnectorId],
        dtype: DataType,
    ) -> GraphResult<ConnectorId> {
        let mut operand_shapes = Vec::with_capacity(inputs.len());
        for input in inputs {
            operand_shapes.push(self.graph.connector(*input)?.shape.clone());
        }
        let shape = infer_output_shape(&op, &operand_shapes)?;
        self.emit_shaped(name, op, inputs, dtype, &shape)
    }

    pub fn emit_shaped(
        &mut self,
        name: impl Into<String>,
        op: Operation,
        inputs: &[ConnectorId],
        dtype: DataType,
        shape: &[usize],
    ) -> GraphResult<ConnectorId> {
        let node = self.add_node(name, op, inputs, &[(dtype, shape.iter().copied().collect())])?;
        Ok(self.graph.nodes[node.0 as usize].outputs[0])
    }

    pub fn input(&mut self, name: impl Into<String>, dtype: DataType, shape: &[usize]) -> ConnectorId {
        let node = NodeId(self.graph.nodes.len() as u32);
        let name = name.into();
        let connector = self.new_connector(name.clone(), dtype, shape.iter().copied().collect());
        self.graph.connectors[connector.0 as usize].producer = Some(node);
        self.graph.nodes.push(Node {
            id: node,
            name,
            op: Operation::Input,
            inputs: Vec::new(),
            outputs: vec![connector],
        });
        connector
    }

    pub fn constant(
        &mut self,
        name: impl Into<String>,
        dtype: DataType,
        shape: &[usize],
        data: Vec<u8>,
    ) -> GraphResult<ConnectorId> {
        let expected = shape.iter().product::<usize>() * dtype.size_in_bytes();
        if data.len() != expected {
            return Err(GraphError::ShapeInference {
                kind: OpKind::Constant,
                detail: format!("{} bytes supplied for {expected}-byte tensor", data.len()),
            });
        }
        self.emit_shaped(name, Operation::Constant { data }, &[], dtype, shape)
    }

    pub fn constant_f32(
        &mut self,
        name: impl Into<String>,
        shape: &[usize],
        values: &[f32],
    ) -> GraphResult<ConnectorId> {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.constant(name, DataType::Float32, shape, data)
    }

    pub fn constant_i32(
        &mut self,
        name: impl Into<String>,
        shape: &[usize],
        values: &[i32],
    ) -> GraphResult<ConnectorId> {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.constant(name, DataType::Int32, shape, data)
    }

    pub fn output(&mut self, name: impl Into<String>, input: ConnectorId) -> GraphResult<NodeId> {
        self.add_node(name, Operation::Output, &[input], &[])
    }

    pub fn connector(&self, id: ConnectorId) -> GraphResult<&Connector> {
        self.graph.connector(id)
    }

    pub fn finish(self) -> Graph {
        self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, ValueRange};

    #[test]
    fn builder_records_producers_and_consumers() {
        let mut builder = GraphBuilder::new();
        let a = builder.input("a", DataType::Float32, &[2, 3]);
        let b = builder.input("b", DataType::Float32, &[3]);
        let sum = builder
            .emit(
                "sum",
                Operation::Binary {
                    op: BinaryOp::Add,
                    activation: ValueRange::full(),
                },
                &[a, b],
                DataType::Float32,
            )
            .expect("emit");
        builder.output("out", sum).expect("output");
        let graph = builder.finish();

        let sum_conn = graph.connector(sum).expect("connector");
        assert_eq!(sum_conn.shape.as_slice(), &[2, 3]);
        assert_eq!(sum_conn.producer, Some(NodeId(2)));
        assert_eq!(graph.connector(a).expect("a").consumers, vec![NodeId(2)]);
        assert_eq!(graph.input_connectors(), vec![a, b]);
        assert_eq!(graph.output_connectors(), vec![sum]);
    }

    #[test]
    fn constants_must_match_their_shape() {
        let mut builder = GraphBuilder::new();
        let err = builder
            .constant("c", DataType::Float32, &[2], vec![0; 4])
            .unwrap_err();
        assert!(matches!(err, GraphError::ShapeInference { .. }));
    }

    #[test]
    fn unknown_inputs_are_rejected() {
        let mut builder = GraphBuilder::new();
        let err = builder
            .emit(
                "neg",
                Operation::Unary {
                    op: crate::ir::UnaryOp::Neg,
                },
                &[ConnectorId(7)],
                DataType::Float32,
            )
            .unwrap_err();
        assert_eq!(err, GraphError::UnknownConnector(ConnectorId(7)));
    }
}
