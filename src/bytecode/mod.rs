pub mod build_error;
pub mod builder;
pub mod disasm;
pub mod ir;
pub mod op;
pub mod verify;

pub use build_error::BuildError;
pub use builder::ProgramBuilder;
pub use ir::Program;
pub use op::{Bytecode, Opcode};
