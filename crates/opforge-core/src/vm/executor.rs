//! Reference executor for compiled units
//!
//! A small interpreter over the recorded instruction list, covering the
//! subset the selector emits for value code: constants, arguments, locals,
//! arithmetic, comparisons, conversions, branches, the dense switch, calls
//! into host callees, fields, arrays and returns. Comparison results are
//! machine int32 0/1 so the synthesized negate sequences compose. The
//! pointer-flavored instructions are reported as unsupported.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::error::{ExecError, ExecResult};
use super::unit::{Instr, Operand, Program};
use crate::codegen::Op;
use crate::value::Value;

/// Runs a finalized program against a set of arguments
pub struct Executor<'a> {
    program: &'a Program,
    stack: Vec<Value>,
    locals: Vec<Value>,
    args: Vec<Value>,
}

impl<'a> Executor<'a> {
    pub fn new(program: &'a Program) -> Executor<'a> {
        let locals = program
            .locals
            .iter()
            .map(Value::default_of)
            .collect();
        Executor {
            program,
            stack: Vec::new(),
            locals,
            args: Vec::new(),
        }
    }

    /// Executes the program to its return instruction
    pub fn run(mut self, args: &[Value]) -> ExecResult<Value> {
        if args.len() != self.program.params.len() {
            return Err(ExecError::ArityMismatch {
                expected: self.program.params.len(),
                got: args.len(),
            });
        }
        self.args = args.to_vec();

        let mut pc = 0usize;
        while let Some(instr) = self.program.instrs.get(pc) {
            pc += 1;
            match self.step(instr)? {
                Flow::Next => {}
                Flow::Jump(next) => pc = next,
                Flow::Return(value) => return Ok(value),
            }
        }
        Err(ExecError::MissingReturn)
    }

    #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
    fn step(&mut self, instr: &Instr) -> ExecResult<Flow> {
        match instr.op {
            // ===== Constants =====
            Op::LoadNull => self.stack.push(Value::Null),
            Op::LoadConstM1 => self.stack.push(Value::I32(-1)),
            Op::LoadConst0 => self.stack.push(Value::I32(0)),
            Op::LoadConst1 => self.stack.push(Value::I32(1)),
            Op::LoadConst2 => self.stack.push(Value::I32(2)),
            Op::LoadConst3 => self.stack.push(Value::I32(3)),
            Op::LoadConst4 => self.stack.push(Value::I32(4)),
            Op::LoadConst5 => self.stack.push(Value::I32(5)),
            Op::LoadConst6 => self.stack.push(Value::I32(6)),
            Op::LoadConst7 => self.stack.push(Value::I32(7)),
            Op::LoadConst8 => self.stack.push(Value::I32(8)),
            Op::LoadConstI32 => {
                let v = operand_i32(instr)?;
                self.stack.push(Value::I32(v));
            }
            Op::LoadConstI64 => {
                let Operand::I64(v) = instr.operand else {
                    return Err(ExecError::BadOperand(instr.op));
                };
                self.stack.push(Value::I64(v));
            }
            Op::LoadConstF32 => {
                let Operand::F32(v) = instr.operand else {
                    return Err(ExecError::BadOperand(instr.op));
                };
                self.stack.push(Value::F32(v));
            }
            Op::LoadStr => {
                let Operand::Str(s) = &instr.operand else {
                    return Err(ExecError::BadOperand(instr.op));
                };
                self.stack.push(Value::Str(s.clone()));
            }
            Op::LoadToken => {
                let Operand::Type(ty) = &instr.operand else {
                    return Err(ExecError::BadOperand(instr.op));
                };
                self.stack.push(Value::Type(ty.clone()));
            }
            // The token on the stack already carries the descriptor
            Op::ResolveToken => {}
            Op::ConvNative => {
                let v = self.pop()?;
                let widened = v.as_i64().ok_or(ExecError::TypeError {
                    expected: "integer",
                    got: v.kind_name(),
                    operation: "CONV_NATIVE",
                })?;
                self.stack.push(Value::ISize(widened));
            }

            // ===== Arguments =====
            Op::LoadArg0 => self.load_arg(0)?,
            Op::LoadArg1 => self.load_arg(1)?,
            Op::LoadArg2 => self.load_arg(2)?,
            Op::LoadArg3 => self.load_arg(3)?,
            Op::LoadArg => {
                let index = operand_index(instr)?;
                self.load_arg(index)?;
            }
            Op::StoreArg => {
                let index = operand_index(instr)?;
                let value = self.pop()?;
                let len = self.args.len();
                let slot = self
                    .args
                    .get_mut(index)
                    .ok_or(ExecError::IndexOutOfBounds {
                        index: index as i64,
                        len,
                    })?;
                *slot = value;
            }

            // ===== Locals =====
            Op::LoadLocal0 => self.load_local(0)?,
            Op::LoadLocal1 => self.load_local(1)?,
            Op::LoadLocal2 => self.load_local(2)?,
            Op::LoadLocal3 => self.load_local(3)?,
            Op::LoadLocal => {
                let Operand::Slot(slot) = instr.operand else {
                    return Err(ExecError::BadOperand(instr.op));
                };
                self.load_local(slot.0 as usize)?;
            }
            Op::StoreLocal => {
                let Operand::Slot(slot) = instr.operand else {
                    return Err(ExecError::BadOperand(instr.op));
                };
                let value = self.pop()?;
                let len = self.locals.len();
                let entry =
                    self.locals
                        .get_mut(slot.0 as usize)
                        .ok_or(ExecError::IndexOutOfBounds {
                            index: i64::from(slot.0),
                            len,
                        })?;
                *entry = value;
            }

            // ===== Fields =====
            Op::LoadStaticField => {
                let Operand::Field(field) = &instr.operand else {
                    return Err(ExecError::BadOperand(instr.op));
                };
                let value = field
                    .load_static()
                    .ok_or_else(|| ExecError::InvalidField(field.name().to_string()))?;
                self.stack.push(value);
            }
            Op::StoreStaticField => {
                let Operand::Field(field) = &instr.operand else {
                    return Err(ExecError::BadOperand(instr.op));
                };
                let value = self.pop()?;
                if !field.store_static(value) {
                    return Err(ExecError::InvalidField(field.name().to_string()));
                }
            }
            Op::LoadField => {
                let Operand::Field(field) = &instr.operand else {
                    return Err(ExecError::BadOperand(instr.op));
                };
                let instance = self.pop()?;
                let map = as_object(&instance)?;
                let value = map
                    .borrow()
                    .get(field.name())
                    .cloned()
                    .unwrap_or_else(|| Value::default_of(field.ty()));
                self.stack.push(value);
            }
            Op::StoreField => {
                let Operand::Field(field) = &instr.operand else {
                    return Err(ExecError::BadOperand(instr.op));
                };
                let value = self.pop()?;
                let instance = self.pop()?;
                let map = as_object(&instance)?;
                map.borrow_mut().insert(field.name().to_string(), value);
            }

            // ===== Arrays =====
            Op::NewArray => {
                let Operand::Type(elem_ty) = &instr.operand else {
                    return Err(ExecError::BadOperand(instr.op));
                };
                let len = self.pop_index()?;
                let items = vec![Value::default_of(elem_ty); len];
                self.stack.push(Value::Array(Rc::new(RefCell::new(items))));
            }
            Op::LoadElemI32 => {
                let index = self.pop_index()?;
                let array = self.pop()?;
                let items = as_array(&array)?;
                let items = items.borrow();
                let value = items.get(index).cloned().ok_or(ExecError::IndexOutOfBounds {
                    index: index as i64,
                    len: items.len(),
                })?;
                self.stack.push(value);
            }
            Op::StoreElem => {
                let value = self.pop()?;
                let index = self.pop_index()?;
                let array = self.pop()?;
                let items = as_array(&array)?;
                let mut items = items.borrow_mut();
                let len = items.len();
                let entry = items
                    .get_mut(index)
                    .ok_or(ExecError::IndexOutOfBounds {
                        index: index as i64,
                        len,
                    })?;
                *entry = value;
            }

            // ===== Pointer-flavored instructions =====
            Op::LoadArgAddr
            | Op::LoadFieldAddr
            | Op::LoadIndI8
            | Op::LoadIndU8
            | Op::LoadIndI16
            | Op::LoadIndU16
            | Op::LoadIndI32
            | Op::LoadIndU32
            | Op::LoadIndI64
            | Op::LoadIndF32
            | Op::LoadIndF64
            | Op::StoreIndI8
            | Op::StoreIndI16
            | Op::StoreIndI32
            | Op::StoreIndI64
            | Op::StoreIndF32
            | Op::StoreIndF64
            | Op::CastRef => return Err(ExecError::UnsupportedOp(instr.op)),

            // ===== Arithmetic =====
            Op::Add
            | Op::Sub
            | Op::Mul
            | Op::Div
            | Op::DivUn
            | Op::Rem
            | Op::RemUn
            | Op::And
            | Op::Or
            | Op::Xor
            | Op::Shl
            | Op::Shr
            | Op::ShrUn => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.stack.push(numeric_binary(instr.op, &a, &b)?);
            }
            Op::Neg => {
                let v = self.pop()?;
                let negated = match v {
                    Value::F32(x) => Value::F32(-x),
                    Value::F64(x) => Value::F64(-x),
                    other => {
                        let x = widened(&other, "NEG")?;
                        renarrow(&other, x.wrapping_neg())
                    }
                };
                self.stack.push(negated);
            }
            Op::BitNot => {
                let v = self.pop()?;
                let x = widened(&v, "BIT_NOT")?;
                self.stack.push(renarrow(&v, !x));
            }

            // ===== Comparison =====
            Op::CmpEq | Op::CmpLt | Op::CmpLtUn | Op::CmpGt | Op::CmpGtUn => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.stack.push(Value::I32(i32::from(compare(instr.op, &a, &b))));
            }

            // ===== Conversions =====
            Op::ConvI8
            | Op::ConvI16
            | Op::ConvI32
            | Op::ConvI64
            | Op::ConvU8
            | Op::ConvU16
            | Op::ConvU32
            | Op::ConvU64
            | Op::ConvF32
            | Op::ConvF64 => {
                let v = self.pop()?;
                self.stack.push(convert(instr.op, &v)?);
            }

            // ===== Control flow =====
            Op::Branch => {
                return Ok(Flow::Jump(self.target(instr)?));
            }
            Op::BranchIfTrue => {
                let cond = self.pop()?;
                if cond.is_truthy() {
                    return Ok(Flow::Jump(self.target(instr)?));
                }
            }
            Op::BranchIfFalse => {
                let cond = self.pop()?;
                if !cond.is_truthy() {
                    return Ok(Flow::Jump(self.target(instr)?));
                }
            }
            Op::Switch => {
                let Operand::Targets(table) = &instr.operand else {
                    return Err(ExecError::BadOperand(instr.op));
                };
                let selector = self.pop()?;
                let index = selector.as_i64().ok_or(ExecError::TypeError {
                    expected: "integer",
                    got: selector.kind_name(),
                    operation: "SWITCH",
                })?;
                if index >= 0 && (index as usize) < table.len() {
                    let target = table[index as usize];
                    let position = self
                        .program
                        .targets
                        .get(target.0 as usize)
                        .copied()
                        .ok_or(ExecError::InvalidTarget)?;
                    return Ok(Flow::Jump(position));
                }
                // Out of range: fall through to the trailing default branch
            }

            // Tail position is advisory for the interpreter
            Op::TailPrefix => {}

            Op::Call => {
                let Operand::Callee(callee) = &instr.operand else {
                    return Err(ExecError::BadOperand(instr.op));
                };
                let consumed = callee.params().len() + usize::from(callee.has_receiver());
                if self.stack.len() < consumed {
                    return Err(ExecError::StackUnderflow);
                }
                let split = self.stack.len() - consumed;
                let argv: Vec<Value> = self.stack.split_off(split);
                let result = callee
                    .invoke(&argv)
                    .ok_or_else(|| ExecError::MissingHost(callee.name().to_string()))?;
                if *callee.ret() != crate::types::ValueType::Void {
                    self.stack.push(result);
                }
            }

            Op::Ret => {
                let value = if self.program.ret == crate::types::ValueType::Void {
                    Value::Null
                } else {
                    self.pop()?
                };
                return Ok(Flow::Return(value));
            }

            // ===== Stack =====
            Op::Pop => {
                self.pop()?;
            }
            Op::Dup => {
                let top = self.pop()?;
                self.stack.push(top.clone());
                self.stack.push(top);
            }
        }
        Ok(Flow::Next)
    }

    fn pop(&mut self) -> ExecResult<Value> {
        self.stack.pop().ok_or(ExecError::StackUnderflow)
    }

    #[allow(clippy::cast_sign_loss)]
    fn pop_index(&mut self) -> ExecResult<usize> {
        let v = self.pop()?;
        let index = v.as_i64().ok_or(ExecError::TypeError {
            expected: "integer",
            got: v.kind_name(),
            operation: "index",
        })?;
        if index < 0 {
            return Err(ExecError::IndexOutOfBounds {
                index,
                len: 0,
            });
        }
        Ok(index as usize)
    }

    #[allow(clippy::cast_possible_wrap)]
    fn load_arg(&mut self, index: usize) -> ExecResult<()> {
        let value = self
            .args
            .get(index)
            .cloned()
            .ok_or(ExecError::IndexOutOfBounds {
                index: index as i64,
                len: self.args.len(),
            })?;
        self.stack.push(value);
        Ok(())
    }

    #[allow(clippy::cast_possible_wrap)]
    fn load_local(&mut self, index: usize) -> ExecResult<()> {
        let value = self
            .locals
            .get(index)
            .cloned()
            .ok_or(ExecError::IndexOutOfBounds {
                index: index as i64,
                len: self.locals.len(),
            })?;
        self.stack.push(value);
        Ok(())
    }

    fn target(&self, instr: &Instr) -> ExecResult<usize> {
        let Operand::Target(target) = instr.operand else {
            return Err(ExecError::BadOperand(instr.op));
        };
        self.program
            .targets
            .get(target.0 as usize)
            .copied()
            .ok_or(ExecError::InvalidTarget)
    }
}

enum Flow {
    Next,
    Jump(usize),
    Return(Value),
}

fn operand_i32(instr: &Instr) -> ExecResult<i32> {
    match instr.operand {
        Operand::I32(v) => Ok(v),
        _ => Err(ExecError::BadOperand(instr.op)),
    }
}

#[allow(clippy::cast_sign_loss)]
fn operand_index(instr: &Instr) -> ExecResult<usize> {
    let v = operand_i32(instr)?;
    if v < 0 {
        return Err(ExecError::BadOperand(instr.op));
    }
    Ok(v as usize)
}

fn as_object(value: &Value) -> ExecResult<Rc<RefCell<HashMap<String, Value>>>> {
    match value {
        Value::Obj(map) => Ok(map.clone()),
        Value::Null => Err(ExecError::NullReference),
        other => Err(ExecError::TypeError {
            expected: "object",
            got: other.kind_name(),
            operation: "field access",
        }),
    }
}

fn as_array(value: &Value) -> ExecResult<Rc<RefCell<Vec<Value>>>> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::Null => Err(ExecError::NullReference),
        other => Err(ExecError::TypeError {
            expected: "array",
            got: other.kind_name(),
            operation: "element access",
        }),
    }
}

fn widened(value: &Value, operation: &'static str) -> ExecResult<i64> {
    value.as_i64().ok_or(ExecError::TypeError {
        expected: "integer",
        got: value.kind_name(),
        operation,
    })
}

/// Narrows a widened integer result back to the left operand's machine class
#[allow(clippy::cast_possible_truncation)]
fn renarrow(model: &Value, result: i64) -> Value {
    match model {
        Value::I64(_) | Value::U64(_) | Value::ISize(_) | Value::USize(_) => Value::I64(result),
        _ => Value::I32(result as i32),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_possible_wrap)]
fn numeric_binary(op: Op, a: &Value, b: &Value) -> ExecResult<Value> {
    // Floats take the float path; everything else runs widened
    if matches!(a, Value::F32(_) | Value::F64(_)) || matches!(b, Value::F32(_) | Value::F64(_)) {
        let x = a.as_f64().ok_or(ExecError::TypeError {
            expected: "number",
            got: a.kind_name(),
            operation: op.name(),
        })?;
        let y = b.as_f64().ok_or(ExecError::TypeError {
            expected: "number",
            got: b.kind_name(),
            operation: op.name(),
        })?;
        let r = match op {
            Op::Add => x + y,
            Op::Sub => x - y,
            Op::Mul => x * y,
            Op::Div => x / y,
            Op::Rem => x % y,
            _ => {
                return Err(ExecError::TypeError {
                    expected: "integer",
                    got: "float",
                    operation: op.name(),
                })
            }
        };
        return Ok(match a {
            Value::F32(_) => Value::F32(r as f32),
            _ => Value::F64(r),
        });
    }

    let x = widened(a, op.name())?;
    let y = widened(b, op.name())?;
    let r = match op {
        Op::Add => x.wrapping_add(y),
        Op::Sub => x.wrapping_sub(y),
        Op::Mul => x.wrapping_mul(y),
        Op::Div => {
            if y == 0 {
                return Err(ExecError::DivisionByZero);
            }
            x.wrapping_div(y)
        }
        Op::Rem => {
            if y == 0 {
                return Err(ExecError::DivisionByZero);
            }
            x.wrapping_rem(y)
        }
        Op::DivUn => {
            if y == 0 {
                return Err(ExecError::DivisionByZero);
            }
            ((x as u64) / (y as u64)) as i64
        }
        Op::RemUn => {
            if y == 0 {
                return Err(ExecError::DivisionByZero);
            }
            ((x as u64) % (y as u64)) as i64
        }
        Op::And => x & y,
        Op::Or => x | y,
        Op::Xor => x ^ y,
        Op::Shl => x.wrapping_shl(y as u32 & 63),
        Op::Shr => x.wrapping_shr(y as u32 & 63),
        Op::ShrUn => ((x as u64).wrapping_shr(y as u32 & 63)) as i64,
        _ => {
            return Err(ExecError::BadOperand(op));
        }
    };
    Ok(renarrow(a, r))
}

fn compare(op: Op, a: &Value, b: &Value) -> bool {
    match op {
        Op::CmpEq => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        Op::CmpLt => numeric_lt(a, b),
        Op::CmpGt => numeric_lt(b, a),
        Op::CmpLtUn => unsigned_lt(a, b),
        Op::CmpGtUn => unsigned_lt(b, a),
        _ => false,
    }
}

fn numeric_lt(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::F32(_) | Value::F64(_), _) | (_, Value::F32(_) | Value::F64(_)) => {
            matches!((a.as_f64(), b.as_f64()), (Some(x), Some(y)) if x < y)
        }
        _ => matches!((a.as_i64(), b.as_i64()), (Some(x), Some(y)) if x < y),
    }
}

fn unsigned_lt(a: &Value, b: &Value) -> bool {
    matches!((a.as_u64(), b.as_u64()), (Some(x), Some(y)) if x < y)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_possible_wrap)]
fn convert(op: Op, value: &Value) -> ExecResult<Value> {
    let widened = match value {
        Value::F32(v) => f64::from(*v) as i64,
        Value::F64(v) => *v as i64,
        other => other.as_i64().ok_or(ExecError::TypeError {
            expected: "number",
            got: other.kind_name(),
            operation: op.name(),
        })?,
    };
    Ok(match op {
        Op::ConvI8 => Value::I32(i32::from(widened as i8)),
        Op::ConvI16 => Value::I32(i32::from(widened as i16)),
        Op::ConvI32 => Value::I32(widened as i32),
        Op::ConvI64 => Value::I64(widened),
        Op::ConvU8 => Value::I32(i32::from(widened as u8)),
        Op::ConvU16 => Value::I32(i32::from(widened as u16)),
        Op::ConvU32 => Value::I32((widened as u32) as i32),
        Op::ConvU64 => Value::I64(widened),
        Op::ConvF32 => Value::F32(value.as_f64().unwrap_or(widened as f64) as f32),
        Op::ConvF64 => Value::F64(value.as_f64().unwrap_or(widened as f64)),
        _ => return Err(ExecError::BadOperand(op)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::InstructionSink;
    use crate::types::ValueType;
    use crate::vm::UnitBuilder;

    #[test]
    fn straight_line_arithmetic() {
        let builder = UnitBuilder::new("forty_two").returns(ValueType::I32);
        let mut unit = builder.begin();
        unit.emit_i32(Op::LoadConstI32, 40);
        unit.emit(Op::LoadConst2);
        unit.emit(Op::Add);
        unit.emit(Op::Ret);
        let compiled = builder.finish(unit).unwrap();
        assert_eq!(compiled.invoke(&[]).unwrap(), Value::I32(42));
    }

    #[test]
    fn arity_is_checked() {
        let builder = UnitBuilder::new("id")
            .param(ValueType::I32)
            .returns(ValueType::I32);
        let mut unit = builder.begin();
        unit.emit(Op::LoadArg0);
        unit.emit(Op::Ret);
        let compiled = builder.finish(unit).unwrap();
        assert_eq!(
            compiled.invoke(&[]).unwrap_err(),
            ExecError::ArityMismatch {
                expected: 1,
                got: 0
            }
        );
    }

    #[test]
    fn division_by_zero_fails() {
        let builder = UnitBuilder::new("div").returns(ValueType::I32);
        let mut unit = builder.begin();
        unit.emit(Op::LoadConst1);
        unit.emit(Op::LoadConst0);
        unit.emit(Op::Div);
        unit.emit(Op::Ret);
        let compiled = builder.finish(unit).unwrap();
        assert_eq!(compiled.invoke(&[]).unwrap_err(), ExecError::DivisionByZero);
    }

    #[test]
    fn unsigned_division_differs_from_signed() {
        assert_eq!(
            numeric_binary(Op::Div, &Value::I32(-2), &Value::I32(2)).unwrap(),
            Value::I32(-1)
        );
        let r = numeric_binary(Op::DivUn, &Value::I32(-2), &Value::I32(2)).unwrap();
        // -2 as unsigned is huge; the quotient is not -1
        assert_ne!(r, Value::I32(-1));
    }

    #[test]
    fn conversions_narrow() {
        assert_eq!(convert(Op::ConvU8, &Value::I32(300)).unwrap(), Value::I32(44));
        assert_eq!(convert(Op::ConvI8, &Value::I32(255)).unwrap(), Value::I32(-1));
        assert_eq!(
            convert(Op::ConvF64, &Value::I32(3)).unwrap(),
            Value::F64(3.0)
        );
    }

    #[test]
    fn pointer_instructions_are_unsupported() {
        let builder = UnitBuilder::new("ind")
            .param(ValueType::ISize)
            .returns(ValueType::I32);
        let mut unit = builder.begin();
        unit.emit(Op::LoadArg0);
        unit.emit(Op::LoadIndI32);
        unit.emit(Op::Ret);
        let compiled = builder.finish(unit).unwrap();
        assert_eq!(
            compiled.invoke(&[Value::ISize(0)]).unwrap_err(),
            ExecError::UnsupportedOp(Op::LoadIndI32)
        );
    }

    #[test]
    fn missing_return_is_detected() {
        let builder = UnitBuilder::new("fallthrough").returns(ValueType::Void);
        let mut unit = builder.begin();
        unit.emit(Op::LoadConst0);
        unit.emit(Op::Pop);
        let compiled = builder.finish(unit).unwrap();
        assert_eq!(compiled.invoke(&[]).unwrap_err(), ExecError::MissingReturn);
    }
}
