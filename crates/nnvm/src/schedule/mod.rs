//! Memory binding between connectors and concrete byte ranges.
//!
//! The production scheduler lives outside this crate; [`plan_memory`] is a
//! sequential reference planner good enough for simulation and tests.

mod planner;
mod pool;
mod validate;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ir::{ConnectorId, NodeId};
use crate::tensor::{default_strides, is_default_layout, DataType, Dims};

pub use planner::{plan_memory, plan_memory_with, LiveRange, ALIGNMENT};
pub use pool::{MemoryPool, NodeBuffers};
pub use validate::validate_node;

/// Arena a range lives in. Tags are shared with the bytecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryLocation {
    Input,
    Output,
    Rdata,
    Data,
}

impl MemoryLocation {
    pub const ALL: [MemoryLocation; 4] = [
        MemoryLocation::Input,
        MemoryLocation::Output,
        MemoryLocation::Rdata,
        MemoryLocation::Data,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        MemoryLocation::ALL.get(tag as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            MemoryLocation::Input => "input",
            MemoryLocation::Output => "output",
            MemoryLocation::Rdata => "rdata",
            MemoryLocation::Data => "data",
        }
    }
}

impl fmt::Display for MemoryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Byte range inside one arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryRange {
    pub location: MemoryLocation,
    pub dtype: DataType,
    pub start: usize,
    pub size: usize,
}

impl MemoryRange {
    pub fn end(&self) -> usize {
        self.start + self.size
    }

    pub fn overlaps(&self, other: &MemoryRange) -> bool {
        self.location == other.location
            && self.size > 0
            && other.size > 0
            && self.start < other.end()
            && other.start < self.end()
    }
}

/// What the binding hands out for a connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferAllocation {
    pub range: MemoryRange,
    pub shape: Dims,
    /// In elements.
    pub strides: Dims,
}

impl BufferAllocation {
    pub fn contiguous(range: MemoryRange, shape: &[usize]) -> Self {
        Self {
            range,
            shape: shape.iter().copied().collect(),
            strides: default_strides(shape),
        }
    }

    pub fn dtype(&self) -> DataType {
        self.range.dtype
    }

    /// Both allocations cover the same bytes in row-major order, so a bitcast
    /// from one to the other leaves memory as it is.
    pub fn aliases_row_major(&self, other: &BufferAllocation) -> bool {
        self.range.location == other.range.location
            && self.range.start == other.range.start
            && self.range.size == other.range.size
            && is_default_layout(&self.shape, &self.strides)
            && is_default_layout(&other.shape, &other.strides)
    }
}

/// Lookup from connector to its assigned buffer.
pub trait MemoryBinding {
    fn memory_at(&self, connector: ConnectorId) -> Option<&BufferAllocation>;
}

/// Concrete binding table plus the order it was planned for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleResult {
    allocations: BTreeMap<ConnectorId, BufferAllocation>,
    usage: [usize; 4],
    order: Vec<NodeId>,
}

impl ScheduleResult {
    pub fn new(order: Vec<NodeId>) -> Self {
        Self {
            allocations: BTreeMap::new(),
            usage: [0; 4],
            order,
        }
    }

    /// Records `allocation` for `connector`; arena sizes grow to cover it.
    pub fn bind(&mut self, connector: ConnectorId, allocation: BufferAllocation) {
        let slot = &mut self.usage[allocation.range.location.index()];
        *slot = (*slot).max(allocation.range.end());
        self.allocations.insert(connector, allocation);
    }

    pub fn unbind(&mut self, connector: ConnectorId) -> Option<BufferAllocation> {
        self.allocations.remove(&connector)
    }

    pub fn usage(&self, location: MemoryLocation) -> usize {
        self.usage[location.index()]
    }

    pub fn usages(&self) -> [usize; 4] {
        self.usage
    }

    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn allocations(&self) -> impl Iterator<Item = (ConnectorId, &BufferAllocation)> {
        self.allocations.iter().map(|(id, alloc)| (*id, alloc))
    }
}

impl MemoryBinding for ScheduleResult {
    fn memory_at(&self, connector: ConnectorId) -> Option<&BufferAllocation> {
        self.allocations.get(&connector)
    }
}
