use thiserror::Error;

/// Broad class of a [`RuntimeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The program itself is malformed.
    Integrity,
    /// A well-formed instruction broke frame or call-stack bookkeeping.
    StackDiscipline,
    /// A configured safety limit was hit.
    Limit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("unknown opcode tag 0x{0:02x}")]
    UnknownOpcode(u8),

    #[error("raw bytecode length {0} is not a whole number of instructions")]
    TruncatedBytecode(usize),

    #[error("call to function {index} but only {count} functions are registered")]
    UnknownFunction { index: usize, count: usize },

    #[error("return with an empty call stack")]
    CallStackUnderflow,

    #[error("instruction pointer {ip} is outside the code buffer (length {len})")]
    InstructionOutOfRange { ip: usize, len: usize },

    #[error("frame offset {offset} is outside the current frame (base {base}, top {top})")]
    FrameOutOfBounds {
        offset: usize,
        base: usize,
        top: usize,
    },

    #[error("call with {pending} pending arguments but only {available} slots above the frame base")]
    ArgumentUnderflow { pending: usize, available: usize },

    #[error("return keeps {live} slots past {top} but the stack only holds {len}")]
    ReturnOutOfBounds { live: usize, top: usize, len: usize },

    #[error("call depth limit exceeded ({0}) - possible infinite recursion")]
    CallDepthExceeded(usize),

    #[error("stack size limit exceeded ({0})")]
    StackOverflow(usize),

    #[error("execution step limit exceeded ({0})")]
    StepLimitExceeded(usize),
}

impl RuntimeError {
    pub fn kind(&self) -> ErrorKind {
        use RuntimeError::*;
        match self {
            UnknownOpcode(_)
            | TruncatedBytecode(_)
            | UnknownFunction { .. }
            | CallStackUnderflow
            | InstructionOutOfRange { .. } => ErrorKind::Integrity,

            FrameOutOfBounds { .. } | ArgumentUnderflow { .. } | ReturnOutOfBounds { .. } => {
                ErrorKind::StackDiscipline
            }

            CallDepthExceeded(_) | StackOverflow(_) | StepLimitExceeded(_) => ErrorKind::Limit,
        }
    }
}
