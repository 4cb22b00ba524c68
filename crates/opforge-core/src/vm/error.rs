//! Runtime errors for the reference executor

use thiserror::Error;

use crate::codegen::Op;

/// A runtime error raised while executing a compiled unit
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecError {
    #[error("value stack underflow")]
    StackUnderflow,

    #[error("division by zero")]
    DivisionByZero,

    #[error("null reference")]
    NullReference,

    #[error("{operation} expected {expected}, got {got}")]
    TypeError {
        expected: &'static str,
        got: &'static str,
        operation: &'static str,
    },

    #[error("expected {expected} arguments, got {got}")]
    ArityMismatch { expected: usize, got: usize },

    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: i64, len: usize },

    /// The reference executor covers the instruction subset the selector
    /// emits for value code; the pointer-flavored instructions are not
    /// executable here
    #[error("instruction {0} is not supported by the reference executor")]
    UnsupportedOp(Op),

    #[error("malformed operand for {0}")]
    BadOperand(Op),

    #[error("invalid branch target")]
    InvalidTarget,

    #[error("callee '{0}' has no host implementation")]
    MissingHost(String),

    #[error("execution ran past the end of the unit")]
    MissingReturn,

    #[error("field '{0}' is not usable here")]
    InvalidField(String),
}

/// Result type for executor operations
pub type ExecResult<T> = Result<T, ExecError>;
