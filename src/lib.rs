//! # Vesper
//!
//! A small accumulator/stack bytecode virtual machine.
//!
//! Programs are flat instruction streams. Each instruction is an opcode
//! plus one 8-bit operand. Functions are labeled regions of the same
//! stream, addressed by a function-table index. Arguments are passed on
//! the data stack and become the first slots of the callee frame.
//!
//! ## Layout
//!
//! - [`bytecode`] - instruction encoding, program building, verification
//!   and disassembly.
//! - [`runtime`] - registers, stacks and the dispatch loop.
//! - [`frontend`] - hex formatting used by the diagnostic dumps.

pub mod bytecode;
pub mod frontend;
pub mod runtime;

pub use bytecode::{BuildError, Bytecode, Opcode, Program, ProgramBuilder};
pub use runtime::{ErrorKind, Register, RuntimeError, Vm, VmConfig};
