use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitOptions {
    /// Log the `.text` listing at `debug` once a module is built.
    pub dump_disassembly: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            dump_disassembly: nnvm::env::dump_stackvm_enabled(),
        }
    }
}
