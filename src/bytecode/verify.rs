use thiserror::Error;

use crate::bytecode::ir::MAX_FUNCTIONS;
use crate::bytecode::{Opcode, Program};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("CALL at ip={ip} targets function {index}, but only {count} are registered")]
    CallTargetOutOfRange { ip: usize, index: usize, count: usize },

    #[error("function {function} starts at {start}, past the end of the code ({len})")]
    FunctionOutOfRange {
        function: usize,
        start: usize,
        len: usize,
    },

    #[error("function table has {functions} entries but frame table has {frames}")]
    FrameTableMismatch { functions: usize, frames: usize },

    #[error("function table has {functions} entries but name table has {names}")]
    NameTableMismatch { functions: usize, names: usize },

    #[error("{0} functions registered, CALL can only address 256")]
    TooManyFunctions(usize),

    #[error("entry point {entry} is past the end of the code ({len})")]
    EntryOutOfRange { entry: usize, len: usize },
}

/// Static checks over a finalized program.
///
/// Only looks at tables and operands; stack discipline depends on the
/// path taken at run time and is checked by the VM instead.
pub fn check_program(program: &Program) -> Result<(), VerifyError> {
    let len = program.code.len();
    let count = program.functions.len();

    if program.frame_sizes.len() != count {
        return Err(VerifyError::FrameTableMismatch {
            functions: count,
            frames: program.frame_sizes.len(),
        });
    }

    if program.names.len() != count {
        return Err(VerifyError::NameTableMismatch {
            functions: count,
            names: program.names.len(),
        });
    }

    if count > MAX_FUNCTIONS {
        return Err(VerifyError::TooManyFunctions(count));
    }

    if program.entry > len {
        return Err(VerifyError::EntryOutOfRange {
            entry: program.entry,
            len,
        });
    }

    for (function, &start) in program.functions.iter().enumerate() {
        if start >= len {
            return Err(VerifyError::FunctionOutOfRange {
                function,
                start,
                len,
            });
        }
    }

    for (ip, bc) in program.code.iter().enumerate() {
        if bc.op == Opcode::Call && bc.arg as usize >= count {
            return Err(VerifyError::CallTargetOutOfRange {
                ip,
                index: bc.arg as usize,
                count,
            });
        }
    }

    Ok(())
}
