//! Instruction set of the target stack machine
//!
//! Opcodes carry no operands themselves; the operand travels alongside
//! through the sink's typed emit calls. The compact constant/argument/local
//! forms exist because the machine encodes them more densely than the
//! general indexed forms.

use crate::ast::{BinOp, UnOp};
use std::fmt;

/// Target machine operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Op {
    // ===== Constants =====
    /// Push a null reference
    LoadNull,

    /// Push the int32 constant -1
    LoadConstM1,
    /// Push the int32 constant 0
    LoadConst0,
    LoadConst1,
    LoadConst2,
    LoadConst3,
    LoadConst4,
    LoadConst5,
    LoadConst6,
    LoadConst7,
    /// Push the int32 constant 8
    LoadConst8,

    /// Push an int32 constant; operand: i32
    LoadConstI32,
    /// Push an int64 constant; operand: i64
    LoadConstI64,
    /// Push a float constant; operand: f32
    LoadConstF32,
    /// Push a string literal; operand: string
    LoadStr,

    /// Push a type handle; operand: type
    LoadToken,
    /// Resolve the type handle on the stack into a type descriptor
    ResolveToken,

    /// Reinterpret the top of stack at native pointer width
    ConvNative,

    // ===== Arguments =====
    LoadArg0,
    LoadArg1,
    LoadArg2,
    LoadArg3,
    /// General argument load; operand: i32 index
    LoadArg,
    /// Push the address of an argument slot; operand: i32 index
    LoadArgAddr,
    /// Store into an argument slot; operand: i32 index
    StoreArg,

    // ===== Locals =====
    LoadLocal0,
    LoadLocal1,
    LoadLocal2,
    LoadLocal3,
    /// General local load; operand: local slot
    LoadLocal,
    /// Store into a local slot; operand: local slot
    StoreLocal,

    // ===== Fields =====
    /// Pop an instance, push the field value; operand: field
    LoadField,
    /// Pop an instance, push the field address; operand: field
    LoadFieldAddr,
    /// Push a static field value; operand: field
    LoadStaticField,
    /// Pop value then instance, store; operand: field
    StoreField,
    /// Pop a value, store into a static field; operand: field
    StoreStaticField,

    // ===== Arrays =====
    /// Pop a length, push a new array; operand: element type
    NewArray,
    /// Pop index then array, push the element as int32
    LoadElemI32,
    /// Pop value, index, array; store the element; operand: element type
    StoreElem,

    // ===== Indirect loads (by pointee type) =====
    LoadIndI8,
    /// Unsigned byte load, widened to int32
    LoadIndU8,
    LoadIndI16,
    LoadIndU16,
    LoadIndI32,
    LoadIndU32,
    LoadIndI64,
    LoadIndF32,
    LoadIndF64,

    // ===== Indirect stores (sign-normalized pointee) =====
    StoreIndI8,
    StoreIndI16,
    StoreIndI32,
    StoreIndI64,
    StoreIndF32,
    StoreIndF64,

    // ===== Arithmetic and bitwise =====
    Add,
    Sub,
    Mul,
    Div,
    DivUn,
    Rem,
    RemUn,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    ShrUn,
    Neg,
    BitNot,

    // ===== Comparison (push int32 0/1) =====
    CmpEq,
    CmpLt,
    CmpLtUn,
    CmpGt,
    CmpGtUn,

    // ===== Conversions =====
    ConvI8,
    ConvI16,
    ConvI32,
    ConvI64,
    ConvU8,
    ConvU16,
    ConvU32,
    ConvU64,
    ConvF32,
    ConvF64,

    /// Checked reference cast; operand: target type
    CastRef,

    // ===== Control flow =====
    /// Unconditional branch; operand: target
    Branch,
    /// Pop a condition, branch when non-zero; operand: target
    BranchIfTrue,
    /// Pop a condition, branch when zero; operand: target
    BranchIfFalse,
    /// Pop an int32 index, branch into the target table when in range;
    /// operand: target list
    Switch,

    /// Prefix: the following call is in tail position
    TailPrefix,
    /// Call a callee; operand: callee
    Call,
    /// Return from the unit
    Ret,

    // ===== Stack =====
    /// Pop and discard the top of stack
    Pop,
    /// Duplicate the top of stack
    Dup,
}

impl Op {
    /// Returns a human-readable name for the opcode
    pub const fn name(self) -> &'static str {
        match self {
            Op::LoadNull => "LOAD_NULL",
            Op::LoadConstM1 => "LOAD_CONST_M1",
            Op::LoadConst0 => "LOAD_CONST_0",
            Op::LoadConst1 => "LOAD_CONST_1",
            Op::LoadConst2 => "LOAD_CONST_2",
            Op::LoadConst3 => "LOAD_CONST_3",
            Op::LoadConst4 => "LOAD_CONST_4",
            Op::LoadConst5 => "LOAD_CONST_5",
            Op::LoadConst6 => "LOAD_CONST_6",
            Op::LoadConst7 => "LOAD_CONST_7",
            Op::LoadConst8 => "LOAD_CONST_8",
            Op::LoadConstI32 => "LOAD_CONST_I32",
            Op::LoadConstI64 => "LOAD_CONST_I64",
            Op::LoadConstF32 => "LOAD_CONST_F32",
            Op::LoadStr => "LOAD_STR",
            Op::LoadToken => "LOAD_TOKEN",
            Op::ResolveToken => "RESOLVE_TOKEN",
            Op::ConvNative => "CONV_NATIVE",
            Op::LoadArg0 => "LOAD_ARG_0",
            Op::LoadArg1 => "LOAD_ARG_1",
            Op::LoadArg2 => "LOAD_ARG_2",
            Op::LoadArg3 => "LOAD_ARG_3",
            Op::LoadArg => "LOAD_ARG",
            Op::LoadArgAddr => "LOAD_ARG_ADDR",
            Op::StoreArg => "STORE_ARG",
            Op::LoadLocal0 => "LOAD_LOCAL_0",
            Op::LoadLocal1 => "LOAD_LOCAL_1",
            Op::LoadLocal2 => "LOAD_LOCAL_2",
            Op::LoadLocal3 => "LOAD_LOCAL_3",
            Op::LoadLocal => "LOAD_LOCAL",
            Op::StoreLocal => "STORE_LOCAL",
            Op::LoadField => "LOAD_FIELD",
            Op::LoadFieldAddr => "LOAD_FIELD_ADDR",
            Op::LoadStaticField => "LOAD_STATIC_FIELD",
            Op::StoreField => "STORE_FIELD",
            Op::StoreStaticField => "STORE_STATIC_FIELD",
            Op::NewArray => "NEW_ARRAY",
            Op::LoadElemI32 => "LOAD_ELEM_I32",
            Op::StoreElem => "STORE_ELEM",
            Op::LoadIndI8 => "LOAD_IND_I8",
            Op::LoadIndU8 => "LOAD_IND_U8",
            Op::LoadIndI16 => "LOAD_IND_I16",
            Op::LoadIndU16 => "LOAD_IND_U16",
            Op::LoadIndI32 => "LOAD_IND_I32",
            Op::LoadIndU32 => "LOAD_IND_U32",
            Op::LoadIndI64 => "LOAD_IND_I64",
            Op::LoadIndF32 => "LOAD_IND_F32",
            Op::LoadIndF64 => "LOAD_IND_F64",
            Op::StoreIndI8 => "STORE_IND_I8",
            Op::StoreIndI16 => "STORE_IND_I16",
            Op::StoreIndI32 => "STORE_IND_I32",
            Op::StoreIndI64 => "STORE_IND_I64",
            Op::StoreIndF32 => "STORE_IND_F32",
            Op::StoreIndF64 => "STORE_IND_F64",
            Op::Add => "ADD",
            Op::Sub => "SUB",
            Op::Mul => "MUL",
            Op::Div => "DIV",
            Op::DivUn => "DIV_UN",
            Op::Rem => "REM",
            Op::RemUn => "REM_UN",
            Op::And => "AND",
            Op::Or => "OR",
            Op::Xor => "XOR",
            Op::Shl => "SHL",
            Op::Shr => "SHR",
            Op::ShrUn => "SHR_UN",
            Op::Neg => "NEG",
            Op::BitNot => "BIT_NOT",
            Op::CmpEq => "CMP_EQ",
            Op::CmpLt => "CMP_LT",
            Op::CmpLtUn => "CMP_LT_UN",
            Op::CmpGt => "CMP_GT",
            Op::CmpGtUn => "CMP_GT_UN",
            Op::ConvI8 => "CONV_I8",
            Op::ConvI16 => "CONV_I16",
            Op::ConvI32 => "CONV_I32",
            Op::ConvI64 => "CONV_I64",
            Op::ConvU8 => "CONV_U8",
            Op::ConvU16 => "CONV_U16",
            Op::ConvU32 => "CONV_U32",
            Op::ConvU64 => "CONV_U64",
            Op::ConvF32 => "CONV_F32",
            Op::ConvF64 => "CONV_F64",
            Op::CastRef => "CAST_REF",
            Op::Branch => "BRANCH",
            Op::BranchIfTrue => "BRANCH_IF_TRUE",
            Op::BranchIfFalse => "BRANCH_IF_FALSE",
            Op::Switch => "SWITCH",
            Op::TailPrefix => "TAIL_PREFIX",
            Op::Call => "CALL",
            Op::Ret => "RET",
            Op::Pop => "POP",
            Op::Dup => "DUP",
        }
    }

    /// Compact constant-load form for the int32 literal space {-1..=8}
    pub const fn compact_const(value: i32) -> Option<Op> {
        match value {
            -1 => Some(Op::LoadConstM1),
            0 => Some(Op::LoadConst0),
            1 => Some(Op::LoadConst1),
            2 => Some(Op::LoadConst2),
            3 => Some(Op::LoadConst3),
            4 => Some(Op::LoadConst4),
            5 => Some(Op::LoadConst5),
            6 => Some(Op::LoadConst6),
            7 => Some(Op::LoadConst7),
            8 => Some(Op::LoadConst8),
            _ => None,
        }
    }

    /// Compact argument-load form for slots 0..=3
    pub const fn compact_arg(index: usize) -> Option<Op> {
        match index {
            0 => Some(Op::LoadArg0),
            1 => Some(Op::LoadArg1),
            2 => Some(Op::LoadArg2),
            3 => Some(Op::LoadArg3),
            _ => None,
        }
    }

    /// Compact local-load form for slots 0..=3
    pub const fn compact_local(index: u32) -> Option<Op> {
        match index {
            0 => Some(Op::LoadLocal0),
            1 => Some(Op::LoadLocal1),
            2 => Some(Op::LoadLocal2),
            3 => Some(Op::LoadLocal3),
            _ => None,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Instruction sequence for a binary operator
///
/// Signedness is decided by the left operand's static type. The operators
/// without a native machine form (`!= <= >=`) are synthesized as a strict
/// compare followed by compare-to-zero.
pub(crate) const fn binary_sequence(op: BinOp, signed: bool) -> &'static [Op] {
    match op {
        BinOp::Add => &[Op::Add],
        BinOp::Sub => &[Op::Sub],
        BinOp::Mul => &[Op::Mul],
        BinOp::Div => {
            if signed {
                &[Op::Div]
            } else {
                &[Op::DivUn]
            }
        }
        BinOp::Rem => {
            if signed {
                &[Op::Rem]
            } else {
                &[Op::RemUn]
            }
        }
        BinOp::Eq => &[Op::CmpEq],
        BinOp::Ne => &[Op::CmpEq, Op::LoadConst0, Op::CmpEq],
        BinOp::Lt => {
            if signed {
                &[Op::CmpLt]
            } else {
                &[Op::CmpLtUn]
            }
        }
        BinOp::Gt => {
            if signed {
                &[Op::CmpGt]
            } else {
                &[Op::CmpGtUn]
            }
        }
        BinOp::Le => {
            if signed {
                &[Op::CmpGt, Op::LoadConst0, Op::CmpEq]
            } else {
                &[Op::CmpGtUn, Op::LoadConst0, Op::CmpEq]
            }
        }
        BinOp::Ge => {
            if signed {
                &[Op::CmpLt, Op::LoadConst0, Op::CmpEq]
            } else {
                &[Op::CmpLtUn, Op::LoadConst0, Op::CmpEq]
            }
        }
        BinOp::And => &[Op::And],
        BinOp::Or => &[Op::Or],
        BinOp::Xor => &[Op::Xor],
        BinOp::Shl => &[Op::Shl],
        BinOp::Shr => {
            if signed {
                &[Op::Shr]
            } else {
                &[Op::ShrUn]
            }
        }
    }
}

/// Instruction sequence for a unary operator
pub(crate) const fn unary_sequence(op: UnOp) -> &'static [Op] {
    match op {
        UnOp::BitNot => &[Op::BitNot],
        UnOp::Neg => &[Op::Neg],
        UnOp::Not => &[Op::LoadConst0, Op::CmpEq],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_names() {
        assert_eq!(Op::Add.name(), "ADD");
        assert_eq!(Op::LoadArg0.name(), "LOAD_ARG_0");
        assert_eq!(Op::BranchIfFalse.name(), "BRANCH_IF_FALSE");
        assert_eq!(Op::Switch.to_string(), "SWITCH");
    }

    #[test]
    fn compact_forms() {
        assert_eq!(Op::compact_const(-1), Some(Op::LoadConstM1));
        assert_eq!(Op::compact_const(8), Some(Op::LoadConst8));
        assert_eq!(Op::compact_const(9), None);
        assert_eq!(Op::compact_arg(3), Some(Op::LoadArg3));
        assert_eq!(Op::compact_arg(4), None);
        assert_eq!(Op::compact_local(0), Some(Op::LoadLocal0));
    }

    #[test]
    fn signed_selection() {
        assert_eq!(binary_sequence(BinOp::Div, true), &[Op::Div]);
        assert_eq!(binary_sequence(BinOp::Div, false), &[Op::DivUn]);
        assert_eq!(binary_sequence(BinOp::Add, false), &[Op::Add]);
        assert_eq!(binary_sequence(BinOp::Shr, false), &[Op::ShrUn]);
    }

    #[test]
    fn synthesized_comparisons() {
        assert_eq!(
            binary_sequence(BinOp::Ne, true),
            &[Op::CmpEq, Op::LoadConst0, Op::CmpEq]
        );
        assert_eq!(
            binary_sequence(BinOp::Le, false),
            &[Op::CmpGtUn, Op::LoadConst0, Op::CmpEq]
        );
        assert_eq!(unary_sequence(UnOp::Not), &[Op::LoadConst0, Op::CmpEq]);
    }
}
