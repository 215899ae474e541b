//! Bytecode emitter for the nnvm stack VM.
//!
//! [`StackvmModuleBuilder`] walks a scheduled graph and lowers each node into
//! register stores plus one tensor-function record. Emission never touches
//! tensor values; constants are copied verbatim into `.rdata`.

pub mod builder;
pub mod decode;
mod emit;
pub mod error;
pub mod instruction;
pub mod module;
pub mod opcode;
mod options;
pub mod writer;

pub use builder::OpBuilder;
pub use decode::{decode_text, disassemble, InstructionReader, SectionReader};
pub use emit::StackvmModuleBuilder;
pub use error::{DecodeError, EmitError, EmitResult};
pub use instruction::{ConvParams, Instruction, TensorFunction, TensorOperand, WindowParams};
pub use module::{Manifest, ManifestBinding, Section, StackvmModule, STACKVM_MODULE_TYPE};
pub use options::EmitOptions;
pub use writer::SectionWriter;
