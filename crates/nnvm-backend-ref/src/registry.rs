//! Operator kind to evaluator table.
//!
//! The table is assembled once through [`EvaluatorRegistry::builder`] and is
//! immutable afterwards. [`EvaluatorRegistryBuilder::finish`] refuses to hand
//! out a table that leaves any [`OpKind`] uncovered.

use std::collections::BTreeMap;
use std::fmt;

use nnvm::ir::{Node, OpKind};
use nnvm::GraphError;

use crate::context::EvalContext;
use crate::error::EvalCause;

pub type EvaluatorFn = fn(&Node, &mut EvalContext<'_>) -> Result<(), EvalCause>;

#[derive(Clone)]
pub struct EvaluatorRegistry {
    table: BTreeMap<OpKind, EvaluatorFn>,
}

impl EvaluatorRegistry {
    pub fn builder() -> EvaluatorRegistryBuilder {
        EvaluatorRegistryBuilder::default()
    }

    /// Registry covering every operator with the reference kernels.
    pub fn neutral() -> Result<Self, GraphError> {
        let mut builder = Self::builder();
        crate::evaluators::register_neutral_evaluators(&mut builder)?;
        builder.finish()
    }

    pub fn get(&self, kind: OpKind) -> Result<EvaluatorFn, GraphError> {
        self.table
            .get(&kind)
            .copied()
            .ok_or(GraphError::MissingEvaluator(kind))
    }

    pub fn kinds(&self) -> impl Iterator<Item = OpKind> + '_ {
        self.table.keys().copied()
    }
}

impl fmt::Debug for EvaluatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluatorRegistry")
            .field("kinds", &self.table.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Default)]
pub struct EvaluatorRegistryBuilder {
    table: BTreeMap<OpKind, EvaluatorFn>,
}

impl EvaluatorRegistryBuilder {
    pub fn register(&mut self, kind: OpKind, evaluator: EvaluatorFn) -> Result<&mut Self, GraphError> {
        if self.table.insert(kind, evaluator).is_some() {
            return Err(GraphError::DuplicateEvaluator(kind));
        }
        Ok(self)
    }

    pub fn is_registered(&self, kind: OpKind) -> bool {
        self.table.contains_key(&kind)
    }

    pub fn finish(self) -> Result<EvaluatorRegistry, GraphError> {
        if let Some(missing) = OpKind::ALL.iter().find(|kind| !self.table.contains_key(kind)) {
            return Err(GraphError::MissingEvaluator(*missing));
        }
        Ok(EvaluatorRegistry { table: self.table })
    }
}
