//! Reference evaluator: runs a scheduled nnvm graph node by node through an
//! immutable table of evaluators backed by `nnvm-kernels`.

mod context;
mod error;
mod evaluator;
mod evaluators;
mod options;
mod registry;

pub use context::EvalContext;
pub use error::{EvalCause, EvalError, EvalResult};
pub use evaluator::Evaluator;
pub use evaluators::register_neutral_evaluators;
pub use options::EvaluateOptions;
pub use registry::{EvaluatorFn, EvaluatorRegistry, EvaluatorRegistryBuilder};
