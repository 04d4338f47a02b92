use crate::bytecode::build_error::BuildError;
use crate::bytecode::verify::check_program;
use crate::bytecode::Bytecode;
use serde::{Deserialize, Serialize};

/// Most functions a program can hold: CALL addresses them with one byte.
pub const MAX_FUNCTIONS: usize = u8::MAX as usize + 1;

/// Fails once a table already holding `count` functions cannot take another.
pub fn ensure_function_room(count: usize) -> Result<(), BuildError> {
    if count >= MAX_FUNCTIONS {
        return Err(BuildError::FunctionTableFull(count));
    }
    Ok(())
}

/// CALL operand for a function index.
pub fn call_operand(index: usize) -> Result<u8, BuildError> {
    u8::try_from(index).map_err(|_| BuildError::FunctionTableFull(index))
}

/// A finalized bytecode program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    /// Linear instruction stream. Function bodies live inline.
    pub code: Vec<Bytecode>,

    /// Function index -> first instruction index.
    pub functions: Vec<usize>,

    /// Function index -> declared local slot count
    /// (excluding incoming arguments and return slots).
    pub frame_sizes: Vec<usize>,

    /// Function index -> label name. Only used for diagnostics.
    pub names: Vec<String>,

    /// Instruction index execution starts from.
    pub entry: usize,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    /// Register a function starting at the current end of the code buffer.
    pub fn register_function(&mut self, name: &str, frame_size: usize) -> Result<usize, BuildError> {
        ensure_function_room(self.functions.len())?;

        let index = self.functions.len();
        self.functions.push(self.code.len());
        self.frame_sizes.push(frame_size);
        self.names.push(name.to_string());
        Ok(index)
    }

    pub fn function_name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, BuildError> {
        Ok(postcard::to_allocvec(self)?)
    }

    /// Decode a program and run the static checks on it.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BuildError> {
        let program: Program = postcard::from_bytes(bytes)?;
        check_program(&program)?;
        Ok(program)
    }
}
