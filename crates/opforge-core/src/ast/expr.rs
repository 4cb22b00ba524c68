//! Expression nodes and their static type inference

use super::Local;
use crate::sig::{Callee, FieldDesc};
use crate::types::ValueType;
use crate::value::Value;

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    /// Addition (+)
    Add,
    /// Subtraction (-)
    Sub,
    /// Multiplication (*)
    Mul,
    /// Division (/), signed or unsigned by left operand type
    Div,
    /// Remainder (%), signed or unsigned by left operand type
    Rem,
    /// Equal (==)
    Eq,
    /// Not equal (!=), synthesized as equal-then-negate
    Ne,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=), synthesized
    Le,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=), synthesized
    Ge,
    /// Bitwise AND (&)
    And,
    /// Bitwise OR (|)
    Or,
    /// Bitwise XOR (^)
    Xor,
    /// Shift left (<<)
    Shl,
    /// Shift right (>>), signed or unsigned by left operand type
    Shr,
}

impl BinOp {
    /// Returns the symbol representation of the operator
    pub const fn as_str(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
        }
    }

    /// True for the operators whose result is a truth value
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    /// Bitwise complement (~)
    BitNot,
    /// Arithmetic negation (-)
    Neg,
    /// Logical negation (!), synthesized as compare-to-zero
    Not,
}

impl UnOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            UnOp::BitNot => "~",
            UnOp::Neg => "-",
            UnOp::Not => "!",
        }
    }
}

/// Receiver discipline of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// No implicit receiver allowed
    Static,
    /// Implicit receiver required
    Instance,
    /// Invocation through a delegate value; lowered like an instance call
    Delegate,
}

/// An expression node
///
/// A closed variant set: the instruction selector matches exhaustively, so
/// adding a node kind forces every consumer to handle it.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Constant; its value type is the runtime type of the literal, except
    /// type descriptors which are values of the type-of-types
    Imm(Value),

    /// Typed null constant
    Null(ValueType),

    /// Parameter-slot read
    Arg { index: usize, ty: ValueType },

    /// Local-slot read
    Local(Local),

    /// Instance or static field read; static iff no instance expression
    Field {
        instance: Option<Box<Expr>>,
        field: FieldDesc,
    },

    /// Array element read
    ArrayElem { array: Box<Expr>, index: Box<Expr> },

    /// Pointer dereference; the value type is the pointee type
    Indirect(Box<Expr>),

    /// Address of a field access or argument reference
    AddressOf(Box<Expr>),

    /// Reinterpretation or conversion; explicit casts emit a conversion
    Cast {
        expr: Box<Expr>,
        target: ValueType,
        explicit: bool,
    },

    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },

    Unary { op: UnOp, operand: Box<Expr> },

    /// Call through a callee descriptor
    Call {
        callee: Callee,
        kind: CallKind,
        receiver: Option<Box<Expr>>,
        args: Vec<Expr>,
        /// Emit the tail-call prefix before the call instruction
        tail: bool,
    },

    /// Return-position call: lowers the wrapped call, then an immediate
    /// return
    CallTail(Box<Expr>),

    /// Fixed-size array construction with positional initializers
    NewArray {
        elem_ty: ValueType,
        values: Vec<Expr>,
    },
}

impl Expr {
    /// Immediate constant
    pub fn imm(value: Value) -> Expr {
        Expr::Imm(value)
    }

    /// 32-bit integer immediate
    pub fn imm_i32(value: i32) -> Expr {
        Expr::Imm(Value::I32(value))
    }

    /// Parameter reference
    pub fn arg(index: usize, ty: ValueType) -> Expr {
        Expr::Arg { index, ty }
    }

    /// Local reference
    pub fn local(local: &Local) -> Expr {
        Expr::Local(local.clone())
    }

    pub fn binary(left: Expr, op: BinOp, right: Expr) -> Expr {
        Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnOp, operand: Expr) -> Expr {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn cast(expr: Expr, target: ValueType) -> Expr {
        Expr::Cast {
            expr: Box::new(expr),
            target,
            explicit: true,
        }
    }

    /// Reinterpreting cast: changes the static type, emits nothing
    pub fn cast_implicit(expr: Expr, target: ValueType) -> Expr {
        Expr::Cast {
            expr: Box::new(expr),
            target,
            explicit: false,
        }
    }

    /// Static field read
    pub fn static_field(field: &FieldDesc) -> Expr {
        Expr::Field {
            instance: None,
            field: field.clone(),
        }
    }

    /// Instance field read
    pub fn field(instance: Expr, field: &FieldDesc) -> Expr {
        Expr::Field {
            instance: Some(Box::new(instance)),
            field: field.clone(),
        }
    }

    pub fn array_elem(array: Expr, index: Expr) -> Expr {
        Expr::ArrayElem {
            array: Box::new(array),
            index: Box::new(index),
        }
    }

    /// Static call (no implicit receiver)
    pub fn call_static(callee: &Callee, args: Vec<Expr>) -> Expr {
        Expr::Call {
            callee: callee.clone(),
            kind: CallKind::Static,
            receiver: None,
            args,
            tail: false,
        }
    }

    /// Instance call: receiver first, then arguments
    pub fn call_instance(callee: &Callee, receiver: Expr, args: Vec<Expr>) -> Expr {
        Expr::Call {
            callee: callee.clone(),
            kind: CallKind::Instance,
            receiver: Some(Box::new(receiver)),
            args,
            tail: false,
        }
    }

    /// Delegate invocation; lowered like an instance call
    pub fn call_delegate(callee: &Callee, receiver: Expr, args: Vec<Expr>) -> Expr {
        Expr::Call {
            callee: callee.clone(),
            kind: CallKind::Delegate,
            receiver: Some(Box::new(receiver)),
            args,
            tail: false,
        }
    }

    /// Return-position static call with the tail prefix
    pub fn call_tail(callee: &Callee, args: Vec<Expr>) -> Expr {
        Expr::CallTail(Box::new(Expr::Call {
            callee: callee.clone(),
            kind: CallKind::Static,
            receiver: None,
            args,
            tail: true,
        }))
    }

    /// Static value type of this expression
    ///
    /// Pure inference: no code is emitted and no slot is bound.
    pub fn ty(&self) -> ValueType {
        match self {
            Expr::Imm(value) => value.ty(),
            Expr::Null(ty) => ty.clone(),
            Expr::Arg { ty, .. } => ty.clone(),
            Expr::Local(local) => local.ty().clone(),
            Expr::Field { field, .. } => field.ty().clone(),
            Expr::ArrayElem { array, .. } => array
                .ty()
                .element()
                .cloned()
                .unwrap_or(ValueType::Unknown),
            Expr::Indirect(pointer) => pointer
                .ty()
                .pointee()
                .cloned()
                .unwrap_or(ValueType::Unknown),
            Expr::AddressOf(inner) => ValueType::Ptr(Box::new(inner.ty())),
            Expr::Cast { target, .. } => target.clone(),
            Expr::Binary { left, op, .. } => {
                if op.is_comparison() {
                    ValueType::Bool
                } else {
                    left.ty()
                }
            }
            Expr::Unary { op, operand } => {
                if *op == UnOp::Not {
                    ValueType::Bool
                } else {
                    operand.ty()
                }
            }
            Expr::Call { callee, .. } => callee.ret().clone(),
            Expr::CallTail(inner) => inner.ty(),
            Expr::NewArray { elem_ty, .. } => ValueType::Array(Box::new(elem_ty.clone())),
        }
    }

    /// The immediate child expressions, left to right
    pub fn children(&self) -> Vec<&Expr> {
        let mut children = Vec::new();
        self.for_each_child(&mut |child| children.push(child));
        children
    }

    /// Visits the immediate child expressions, left to right
    pub fn for_each_child<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        match self {
            Expr::Imm(_) | Expr::Null(_) | Expr::Arg { .. } | Expr::Local(_) => {}
            Expr::Field { instance, .. } => {
                if let Some(instance) = instance {
                    f(instance);
                }
            }
            Expr::ArrayElem { array, index } => {
                f(array);
                f(index);
            }
            Expr::Indirect(inner) | Expr::AddressOf(inner) | Expr::CallTail(inner) => f(inner),
            Expr::Cast { expr, .. } => f(expr),
            Expr::Binary { left, right, .. } => {
                f(left);
                f(right);
            }
            Expr::Unary { operand, .. } => f(operand),
            Expr::Call { receiver, args, .. } => {
                if let Some(receiver) = receiver {
                    f(receiver);
                }
                for arg in args {
                    f(arg);
                }
            }
            Expr::NewArray { values, .. } => {
                for value in values {
                    f(value);
                }
            }
        }
    }

    /// In-place rewrite of the immediate child expressions
    ///
    /// The structural hook for tree transformations; no core pass needs it,
    /// but callers building optimization passes do.
    pub fn replace_children(&mut self, f: &mut dyn FnMut(&mut Expr)) {
        match self {
            Expr::Imm(_) | Expr::Null(_) | Expr::Arg { .. } | Expr::Local(_) => {}
            Expr::Field { instance, .. } => {
                if let Some(instance) = instance {
                    f(instance);
                }
            }
            Expr::ArrayElem { array, index } => {
                f(array);
                f(index);
            }
            Expr::Indirect(inner) | Expr::AddressOf(inner) | Expr::CallTail(inner) => f(inner),
            Expr::Cast { expr, .. } => f(expr),
            Expr::Binary { left, right, .. } => {
                f(left);
                f(right);
            }
            Expr::Unary { operand, .. } => f(operand),
            Expr::Call { receiver, args, .. } => {
                if let Some(receiver) = receiver {
                    f(receiver);
                }
                for arg in args {
                    f(arg);
                }
            }
            Expr::NewArray { values, .. } => {
                for value in values {
                    f(value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inference_basics() {
        assert_eq!(Expr::imm_i32(5).ty(), ValueType::I32);
        assert_eq!(
            Expr::imm(Value::Type(ValueType::I32)).ty(),
            ValueType::TypeToken
        );
        assert_eq!(Expr::Null(ValueType::Str).ty(), ValueType::Str);
        assert_eq!(Expr::arg(0, ValueType::U16).ty(), ValueType::U16);
    }

    #[test]
    fn inference_compound() {
        let add = Expr::binary(Expr::imm_i32(1), BinOp::Add, Expr::imm_i32(2));
        assert_eq!(add.ty(), ValueType::I32);

        let cmp = Expr::binary(Expr::imm_i32(1), BinOp::Lt, Expr::imm_i32(2));
        assert_eq!(cmp.ty(), ValueType::Bool);

        let not = Expr::unary(UnOp::Not, cmp);
        assert_eq!(not.ty(), ValueType::Bool);

        let neg = Expr::unary(UnOp::Neg, Expr::imm(Value::F32(1.0)));
        assert_eq!(neg.ty(), ValueType::F32);
    }

    #[test]
    fn inference_memory_shapes() {
        let ptr = Expr::arg(0, ValueType::Ptr(Box::new(ValueType::U16)));
        assert_eq!(Expr::Indirect(Box::new(ptr.clone())).ty(), ValueType::U16);
        assert_eq!(
            Expr::AddressOf(Box::new(Expr::arg(1, ValueType::I32))).ty(),
            ValueType::Ptr(Box::new(ValueType::I32))
        );

        let arr = Expr::NewArray {
            elem_ty: ValueType::I32,
            values: vec![Expr::imm_i32(1)],
        };
        assert_eq!(arr.ty(), ValueType::Array(Box::new(ValueType::I32)));
        assert_eq!(
            Expr::array_elem(arr, Expr::imm_i32(0)).ty(),
            ValueType::I32
        );
    }

    #[test]
    fn child_traversal_order() {
        let e = Expr::binary(Expr::imm_i32(1), BinOp::Add, Expr::imm_i32(2));
        let mut seen = Vec::new();
        e.for_each_child(&mut |child| {
            if let Expr::Imm(Value::I32(v)) = child {
                seen.push(*v);
            }
        });
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(e.children().len(), 2);
        assert!(matches!(e.children()[0], Expr::Imm(Value::I32(1))));
    }

    #[test]
    fn replace_children_rewrites_in_place() {
        let mut e = Expr::binary(Expr::imm_i32(1), BinOp::Add, Expr::imm_i32(2));
        e.replace_children(&mut |child| {
            if let Expr::Imm(Value::I32(v)) = child {
                *child = Expr::imm_i32(*v * 10);
            }
        });
        let Expr::Binary { left, right, .. } = &e else {
            panic!("expected binary node");
        };
        assert!(matches!(**left, Expr::Imm(Value::I32(10))));
        assert!(matches!(**right, Expr::Imm(Value::I32(20))));
    }
}
