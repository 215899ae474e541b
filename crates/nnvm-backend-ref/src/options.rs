use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluateOptions {
    /// Warn when a `Float32` node output contains NaN or infinity.
    pub check_finite: bool,
}

impl Default for EvaluateOptions {
    fn default() -> Self {
        Self {
            check_finite: nnvm::env::check_finite_enabled(),
        }
    }
}
