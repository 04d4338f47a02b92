use serde::{Deserialize, Serialize};
use std::fmt;

/// One machine word.
///
/// Every opcode currently reads it as a signed 32-bit integer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Register(i32);

impl Register {
    pub const ZERO: Register = Register(0);

    pub const fn new(value: i32) -> Self {
        Register(value)
    }

    pub const fn i32(self) -> i32 {
        self.0
    }

    /// Native-endian bytes, as held in memory.
    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_ne_bytes()
    }

    pub fn wrapping_add(self, rhs: i32) -> Self {
        Register(self.0.wrapping_add(rhs))
    }
}

impl From<i32> for Register {
    fn from(value: i32) -> Self {
        Register(value)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Register i32({})>", self.0)
    }
}
