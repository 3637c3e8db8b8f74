pub mod decode;
pub mod disasm;
pub mod emit;
pub mod ir;
pub mod op;
pub mod verify;

pub use ir::{CompiledProgram, Constant, Parameter, ProcDefinition};
pub use op::Opcode;
