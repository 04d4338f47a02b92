use serde::{Deserialize, Serialize};
use std::fmt;

use crate::runtime::runtime_error::RuntimeError;

// =============================================================================
// OPCODE - instruction tags
// =============================================================================

/// Operation performed by a single instruction.
///
/// The discriminant is the tag byte of the raw two-byte encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    // accumulator arithmetic
    Add = 0,
    AddImm = 1,

    // frame access
    Load = 2,
    Store = 3,
    ZeroAcc = 4,

    // ==========================================================================
    // Calling convention
    // ==========================================================================
    /// Duplicate a frame slot as a new outgoing argument.
    Arg = 5,
    /// Push an immediate as a new outgoing argument.
    ArgImm = 6,
    /// Operand is a function-table index.
    Call = 7,
    /// Operand is the number of callee slots left live for the caller.
    Ret = 8,
}

impl Opcode {
    pub const ALL: [Opcode; 9] = [
        Opcode::Add,
        Opcode::AddImm,
        Opcode::Load,
        Opcode::Store,
        Opcode::ZeroAcc,
        Opcode::Arg,
        Opcode::ArgImm,
        Opcode::Call,
        Opcode::Ret,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Add => "ADD",
            Opcode::AddImm => "ADD_IMM",
            Opcode::Load => "LOAD",
            Opcode::Store => "STORE",
            Opcode::ZeroAcc => "ZERO_ACC",
            Opcode::Arg => "ARG",
            Opcode::ArgImm => "ARG_IMM",
            Opcode::Call => "CALL",
            Opcode::Ret => "RET",
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = RuntimeError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Opcode::ALL
            .get(tag as usize)
            .copied()
            .ok_or(RuntimeError::UnknownOpcode(tag))
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

// =============================================================================
// BYTECODE - one encoded instruction
// =============================================================================

/// An opcode plus its 8-bit operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bytecode {
    pub op: Opcode,
    pub arg: u8,
}

impl Bytecode {
    pub const fn new(op: Opcode, arg: u8) -> Self {
        Self { op, arg }
    }

    pub fn encode(self) -> [u8; 2] {
        [self.op as u8, self.arg]
    }

    pub fn decode(bytes: [u8; 2]) -> Result<Self, RuntimeError> {
        Ok(Self {
            op: Opcode::try_from(bytes[0])?,
            arg: bytes[1],
        })
    }
}

impl fmt::Display for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op, self.arg)
    }
}
