//! Code generation error types
//!
//! Every failure is a synchronous hard error raised at the point of
//! detection: a malformed tree must never produce a silently-wrong
//! instruction stream. Nothing here is caught and retried internally.

use thiserror::Error;

use crate::sig::CallConv;
use crate::types::ValueType;

/// A code generation error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodegenError {
    // ===== Structural =====
    #[error("label '{0}' declared twice")]
    LabelDeclaredTwice(String),

    #[error("can't mark label '{0}' twice")]
    LabelMarkedTwice(String),

    #[error("label '{0}' not marked")]
    LabelNotMarked(String),

    #[error("branch to unbound label '{0}'")]
    UnboundLabel(String),

    /// A sink target was allocated but its position never fixed
    #[error("branch target allocated but never marked")]
    UnmarkedTarget,

    #[error("repeated case in switch")]
    RepeatedCase,

    #[error("all cases should have the same type")]
    MixedCaseTypes,

    // ===== Type mismatch =====
    #[error("return type mismatch: {found} != {expected}")]
    ReturnTypeMismatch {
        expected: ValueType,
        found: ValueType,
    },

    #[error("unsupported assignment target")]
    InvalidAssignTarget,

    #[error("can't take the address of this expression")]
    InvalidAddressOf,

    #[error("field '{0}' access shape doesn't match the descriptor")]
    FieldShapeMismatch(String),

    #[error("operand type mismatch: {left} vs {right}")]
    OperandTypeMismatch { left: ValueType, right: ValueType },

    // ===== Unsupported operation =====
    #[error("can't handle immediate type {0}")]
    UnsupportedImmediate(ValueType),

    #[error("can't load indirect value of type {0}")]
    UnsupportedIndirectLoad(ValueType),

    #[error("can't store indirect value of type {0}")]
    UnsupportedIndirectStore(ValueType),

    #[error("not implemented cast to {0}")]
    UnsupportedConversion(ValueType),

    #[error("can't handle calling convention {0:?}")]
    UnsupportedCallConv(CallConv),

    #[error("static call shouldn't have this")]
    StaticCallWithReceiver,

    #[error("instance call should have this")]
    InstanceCallWithoutReceiver,

    #[error("tail call must wrap a call expression")]
    InvalidTailCall,

    #[error("switch over string cases is not supported")]
    StringSwitch,

    #[error("argument index {0} out of range")]
    ArgumentOutOfRange(usize),
}

/// Result type for code generation operations
pub type CodegenResult<T> = Result<T, CodegenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_identify_the_construct() {
        let err = CodegenError::LabelDeclaredTwice("exit".to_string());
        assert_eq!(err.to_string(), "label 'exit' declared twice");

        let err = CodegenError::ReturnTypeMismatch {
            expected: ValueType::I32,
            found: ValueType::F32,
        };
        assert_eq!(err.to_string(), "return type mismatch: f32 != i32");

        let err = CodegenError::UnsupportedIndirectLoad(ValueType::Str);
        assert_eq!(err.to_string(), "can't load indirect value of type str");
    }
}
