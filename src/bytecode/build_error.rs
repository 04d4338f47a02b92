use thiserror::Error;

use crate::bytecode::verify::VerifyError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("call to undefined label '{0}'")]
    UnknownLabel(String),

    #[error("label '{0}' is already defined")]
    DuplicateLabel(String),

    /// A label was opened while another one was still open
    #[error("label '{inner}' opened inside label '{outer}'")]
    NestedLabel { outer: String, inner: String },

    #[error("end_label without a matching begin_label")]
    NoOpenLabel,

    #[error("label '{0}' was never closed")]
    UnclosedLabel(String),

    /// Function indices have to fit the 8-bit CALL operand
    #[error("function table is full ({0} entries)")]
    FunctionTableFull(usize),

    #[error("invalid program: {0}")]
    Invalid(#[from] VerifyError),

    #[error("malformed program encoding: {0}")]
    Decode(String),
}

impl From<postcard::Error> for BuildError {
    fn from(e: postcard::Error) -> Self {
        BuildError::Decode(e.to_string())
    }
}
