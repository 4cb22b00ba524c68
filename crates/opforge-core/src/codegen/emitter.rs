//! Fluent verifying front-end
//!
//! A builder-style API that emits directly into a sink, with no
//! intermediate tree, mirroring every emission onto the operand-type
//! stack. The
//! shadow stack is what makes the front-end "verifying": operand kinds are
//! checked as calls are made, and signedness for the sign-sensitive opcodes
//! is taken from the type the stack says is on the left.
//!
//! Speculative code shapes are inspected through [`Emitter::capture`],
//! which runs a sequence against a cloned stack and a discarding sink; the
//! live unit cannot be disturbed by construction.

use super::error::{CodegenError, CodegenResult};
use super::label::Label;
use super::opcode::{binary_sequence, unary_sequence, Op};
use super::sink::{DiscardSink, InstructionSink, SlotId};
use super::typestack::TypeStack;
use crate::ast::{BinOp, UnOp};
use crate::sig::{CallConv, Callee, FieldDesc};
use crate::types::ValueType;
use crate::value::Value;

/// A local slot declared through the fluent front-end
#[derive(Debug, Clone)]
pub struct LocalSlot {
    slot: SlotId,
    ty: ValueType,
}

impl LocalSlot {
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn ty(&self) -> &ValueType {
        &self.ty
    }
}

/// Largest contiguous range the fluent switch lowers as a jump table
const DENSE_SPAN_LIMIT: i64 = 4096;

/// The verifying emitter
pub struct Emitter<S: InstructionSink> {
    sink: S,
    stack: TypeStack,
    labels: Vec<Label>,
    params: Vec<ValueType>,
    ret_ty: ValueType,
    check_types: bool,
}

impl<S: InstructionSink> Emitter<S> {
    pub fn new(sink: S, params: Vec<ValueType>, ret_ty: ValueType) -> Emitter<S> {
        Emitter {
            sink,
            stack: TypeStack::new(),
            labels: Vec::new(),
            params,
            ret_ty,
            check_types: true,
        }
    }

    /// Disables operand-kind checking; the shadow stack is still kept
    #[must_use]
    pub fn without_type_checks(mut self) -> Self {
        self.check_types = false;
        self
    }

    /// The live operand-type stack
    pub fn stack(&self) -> &TypeStack {
        &self.stack
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    // ===== Constants =====

    /// Pushes an int32 constant in its most compact encoding
    pub fn push_i32(&mut self, value: i32) {
        match Op::compact_const(value) {
            Some(op) => self.sink.emit(op),
            None => self.sink.emit_i32(Op::LoadConstI32, value),
        }
        self.stack.push(ValueType::I32);
    }

    pub fn push_i64(&mut self, value: i64) {
        self.sink.emit_i64(Op::LoadConstI64, value);
        self.stack.push(ValueType::I64);
    }

    pub fn push_f32(&mut self, value: f32) {
        self.sink.emit_f32(Op::LoadConstF32, value);
        self.stack.push(ValueType::F32);
    }

    pub fn push_str(&mut self, value: &str) {
        self.sink.emit_str(Op::LoadStr, value);
        self.stack.push(ValueType::Str);
    }

    /// Pushes an arbitrary constant, selecting the immediate lowering by
    /// its type
    #[allow(clippy::cast_possible_truncation)]
    pub fn push(&mut self, value: &Value) -> CodegenResult<()> {
        match value.ty().signed_normalized() {
            ValueType::I8 | ValueType::I16 | ValueType::I32 | ValueType::Bool => {
                let v = value.as_i64().unwrap_or(0) as i32;
                match Op::compact_const(v) {
                    Some(op) => self.sink.emit(op),
                    None => self.sink.emit_i32(Op::LoadConstI32, v),
                }
            }
            ValueType::I64 => self.sink.emit_i64(Op::LoadConstI64, value.as_i64().unwrap_or(0)),
            ValueType::ISize => {
                let v = value.as_i64().unwrap_or(0);
                if cfg!(target_pointer_width = "64") {
                    self.sink.emit_i64(Op::LoadConstI64, v);
                } else {
                    self.sink.emit_i32(Op::LoadConstI32, v as i32);
                }
                self.sink.emit(Op::ConvNative);
            }
            ValueType::F32 => {
                if let Value::F32(v) = value {
                    self.sink.emit_f32(Op::LoadConstF32, *v);
                }
            }
            ValueType::Str => {
                if let Value::Str(s) = value {
                    self.sink.emit_str(Op::LoadStr, s);
                }
            }
            ValueType::TypeToken => {
                if let Value::Type(ty) = value {
                    self.sink.emit_type(Op::LoadToken, ty);
                    self.sink.emit(Op::ResolveToken);
                }
            }
            other => return Err(CodegenError::UnsupportedImmediate(other)),
        }
        self.stack.push(value.ty());
        Ok(())
    }

    pub fn push_null(&mut self, ty: ValueType) {
        self.sink.emit(Op::LoadNull);
        self.stack.push(ty);
    }

    // ===== Arguments and locals =====

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn load_arg(&mut self, index: usize) -> CodegenResult<()> {
        let ty = self
            .params
            .get(index)
            .cloned()
            .ok_or(CodegenError::ArgumentOutOfRange(index))?;
        match Op::compact_arg(index) {
            Some(op) => self.sink.emit(op),
            None => self.sink.emit_i32(Op::LoadArg, index as i32),
        }
        self.stack.push(ty);
        Ok(())
    }

    /// Declares a machine local of the given type
    pub fn declare_local(&mut self, ty: ValueType) -> LocalSlot {
        let slot = self.sink.alloc_slot(&ty);
        LocalSlot { slot, ty }
    }

    pub fn load_local(&mut self, local: &LocalSlot) {
        match Op::compact_local(local.slot.0) {
            Some(op) => self.sink.emit(op),
            None => self.sink.emit_slot(Op::LoadLocal, local.slot),
        }
        self.stack.push(local.ty.clone());
    }

    pub fn store_local(&mut self, local: &LocalSlot) -> CodegenResult<()> {
        let top = self.stack.pop();
        if self.check_types && !top.stack_compatible(&local.ty) {
            return Err(CodegenError::OperandTypeMismatch {
                left: local.ty.clone(),
                right: top,
            });
        }
        self.sink.emit_slot(Op::StoreLocal, local.slot);
        Ok(())
    }

    // ===== Fields =====

    pub fn load_static_field(&mut self, field: &FieldDesc) -> CodegenResult<()> {
        if !field.is_static() {
            return Err(CodegenError::FieldShapeMismatch(field.name().to_string()));
        }
        self.sink.emit_field(Op::LoadStaticField, field);
        self.stack.push(field.ty().clone());
        Ok(())
    }

    pub fn store_static_field(&mut self, field: &FieldDesc) -> CodegenResult<()> {
        if !field.is_static() {
            return Err(CodegenError::FieldShapeMismatch(field.name().to_string()));
        }
        let top = self.stack.pop();
        if self.check_types && !top.stack_compatible(field.ty()) {
            return Err(CodegenError::OperandTypeMismatch {
                left: field.ty().clone(),
                right: top,
            });
        }
        self.sink.emit_field(Op::StoreStaticField, field);
        Ok(())
    }

    // ===== Operators =====

    /// Emits a binary operation; signedness comes from the shadow stack's
    /// left operand
    pub fn binary_op(&mut self, op: BinOp) -> CodegenResult<()> {
        let right = self.stack.pop();
        let left = self.stack.pop();
        // Shift counts are int32 whatever the shifted value's width
        let shift = matches!(op, BinOp::Shl | BinOp::Shr);
        if self.check_types && !shift && !left.stack_compatible(&right) {
            return Err(CodegenError::OperandTypeMismatch { left, right });
        }
        let signed = left.is_signed();
        for step in binary_sequence(op, signed) {
            self.sink.emit(*step);
        }
        self.stack.push(if op.is_comparison() {
            ValueType::Bool
        } else {
            left
        });
        Ok(())
    }

    pub fn unary_op(&mut self, op: UnOp) {
        let operand = self.stack.pop();
        for step in unary_sequence(op) {
            self.sink.emit(*step);
        }
        self.stack.push(if op == UnOp::Not {
            ValueType::Bool
        } else {
            operand
        });
    }

    // ===== Calls =====

    /// Pops the receiver (if any) and arguments, emits the call, pushes the
    /// result type
    pub fn call(&mut self, callee: &Callee) -> CodegenResult<()> {
        if callee.convention() != CallConv::Standard {
            return Err(CodegenError::UnsupportedCallConv(callee.convention()));
        }
        let consumed = callee.params().len() + usize::from(callee.has_receiver());
        self.stack.pop_n(consumed);
        self.sink.emit_callee(Op::Call, callee);
        if *callee.ret() != ValueType::Void {
            self.stack.push(callee.ret().clone());
        }
        Ok(())
    }

    // ===== Control flow =====

    /// Defines a label bound to a fresh sink target
    pub fn define_label(&mut self, name: impl Into<String>) -> Label {
        let label = Label::bound(name, self.sink.alloc_target());
        self.labels.push(label.clone());
        label
    }

    /// Fixes the label's position here; marking twice is a hard error
    pub fn mark_label(&mut self, label: &Label) -> CodegenResult<()> {
        label.mark()?;
        let target = label
            .target()
            .ok_or_else(|| CodegenError::UnboundLabel(label.name().to_string()))?;
        self.sink.mark_target(target);
        Ok(())
    }

    pub fn branch(&mut self, label: &Label) -> CodegenResult<()> {
        let target = label
            .target()
            .ok_or_else(|| CodegenError::UnboundLabel(label.name().to_string()))?;
        self.sink.emit_target(Op::Branch, target);
        Ok(())
    }

    pub fn branch_if_true(&mut self, label: &Label) -> CodegenResult<()> {
        self.stack.pop();
        let target = label
            .target()
            .ok_or_else(|| CodegenError::UnboundLabel(label.name().to_string()))?;
        self.sink.emit_target(Op::BranchIfTrue, target);
        Ok(())
    }

    pub fn branch_if_false(&mut self, label: &Label) -> CodegenResult<()> {
        self.stack.pop();
        let target = label
            .target()
            .ok_or_else(|| CodegenError::UnboundLabel(label.name().to_string()))?;
        self.sink.emit_target(Op::BranchIfFalse, target);
        Ok(())
    }

    /// Returns from the unit, checking the declared return type
    pub fn ret(&mut self) -> CodegenResult<()> {
        if self.ret_ty != ValueType::Void {
            let top = self.stack.pop();
            if self.check_types && !top.stack_compatible(&self.ret_ty) {
                return Err(CodegenError::ReturnTypeMismatch {
                    expected: self.ret_ty.clone(),
                    found: top,
                });
            }
        }
        self.sink.emit(Op::Ret);
        Ok(())
    }

    // ===== Stack manipulation =====

    /// Pops and discards the machine value on top of the stack
    pub fn discard(&mut self) {
        self.stack.pop();
        self.sink.emit(Op::Pop);
    }

    pub fn dup(&mut self) {
        let top = self.stack.pop();
        self.stack.push(top.clone());
        self.stack.push(top);
        self.sink.emit(Op::Dup);
    }

    // ===== Switch =====

    /// Multi-way branch over the int32 selector on top of the stack
    ///
    /// Same policy as the tree compiler: a dense jump table when the value
    /// span allows it, a linear compare-and-branch chain otherwise. `case`
    /// runs once per case value, `default` once, each with fall-through to
    /// the end of the switch.
    #[allow(clippy::cast_sign_loss)]
    pub fn switch_cases(
        &mut self,
        values: &[i32],
        mut case: impl FnMut(&mut Self, i32) -> CodegenResult<()>,
        default: impl FnOnce(&mut Self) -> CodegenResult<()>,
    ) -> CodegenResult<()> {
        for i in 0..values.len() {
            for j in (i + 1)..values.len() {
                if values[i] == values[j] {
                    return Err(CodegenError::RepeatedCase);
                }
            }
        }

        let end_label = self.define_label("EndCases");
        let default_label = self.define_label("Default");

        if values.is_empty() {
            // Nothing consumes the selector; discard it
            self.discard();
        } else {
            let min = values.iter().copied().fold(i32::MAX, i32::min);
            let max = values.iter().copied().fold(i32::MIN, i32::max);
            let span = i64::from(max) - i64::from(min) + 1;

            if span <= DENSE_SPAN_LIMIT {
                let mut table: Vec<Label> = vec![default_label.clone(); span as usize];
                for &value in values {
                    let offset = (i64::from(value) - i64::from(min)) as usize;
                    table[offset] = self.define_label(format!("Case_{value}"));
                }

                self.push_i32(min);
                self.binary_op(BinOp::Sub)?;
                let targets: Vec<_> = table
                    .iter()
                    .map(|label| {
                        label
                            .target()
                            .ok_or_else(|| CodegenError::UnboundLabel(label.name().to_string()))
                    })
                    .collect::<CodegenResult<_>>()?;
                self.stack.pop();
                self.sink.emit_targets(Op::Switch, &targets);
                self.branch(&default_label)?;

                for &value in values {
                    let offset = (i64::from(value) - i64::from(min)) as usize;
                    let label = table[offset].clone();
                    self.mark_label(&label)?;
                    case(self, value)?;
                    self.branch(&end_label)?;
                }
            } else {
                let temp = self.declare_local(ValueType::I32);
                self.store_local(&temp)?;
                for &value in values {
                    let skip = self.define_label(format!("LabelCase{value}"));
                    self.load_local(&temp);
                    self.push_i32(value);
                    self.binary_op(BinOp::Eq)?;
                    self.branch_if_false(&skip)?;
                    case(self, value)?;
                    self.branch(&end_label)?;
                    self.mark_label(&skip)?;
                }
            }
        }

        self.mark_label(&default_label)?;
        default(self)?;
        self.mark_label(&end_label)
    }

    // ===== Capture =====

    /// Runs a speculative emission sequence and returns the resulting
    /// operand-type stack
    ///
    /// The sequence sees a clone of the live stack and a sink that discards
    /// everything, so neither the live stack nor the live unit can change.
    pub fn capture<F>(&self, f: F) -> CodegenResult<TypeStack>
    where
        F: FnOnce(&mut Emitter<DiscardSink>) -> CodegenResult<()>,
    {
        let mut speculative = Emitter {
            sink: DiscardSink::new(),
            stack: self.stack.clone(),
            labels: Vec::new(),
            params: self.params.clone(),
            ret_ty: self.ret_ty.clone(),
            check_types: self.check_types,
        };
        f(&mut speculative)?;
        Ok(speculative.stack)
    }

    // ===== Finalization =====

    /// Checks every defined label was marked, resets the shadow stack, and
    /// hands the sink back
    pub fn finalize(mut self) -> CodegenResult<S> {
        for label in &self.labels {
            if !label.is_marked() {
                return Err(CodegenError::LabelNotMarked(label.name().to_string()));
            }
        }
        self.stack.clear();
        Ok(self.sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::UnitBuilder;

    #[test]
    fn fluent_adder() {
        let builder = UnitBuilder::new("adder")
            .param(ValueType::I32)
            .param(ValueType::I32)
            .returns(ValueType::I32);
        let mut emitter = Emitter::new(
            builder.begin(),
            builder.params().to_vec(),
            builder.ret_ty().clone(),
        );
        emitter.load_arg(0).unwrap();
        emitter.load_arg(1).unwrap();
        emitter.binary_op(BinOp::Add).unwrap();
        emitter.ret().unwrap();

        let compiled = builder.finish(emitter.finalize().unwrap()).unwrap();
        assert_eq!(
            compiled.invoke(&[Value::I32(1), Value::I32(2)]).unwrap(),
            Value::I32(3)
        );
    }

    #[test]
    fn fluent_switch() {
        let builder = UnitBuilder::new("switcher")
            .param(ValueType::I32)
            .returns(ValueType::I32);
        let mut emitter = Emitter::new(
            builder.begin(),
            builder.params().to_vec(),
            builder.ret_ty().clone(),
        );
        let local = emitter.declare_local(ValueType::I32);
        emitter.push_i32(-33);
        emitter.store_local(&local).unwrap();

        emitter.load_arg(0).unwrap();
        emitter
            .switch_cases(
                &[0, 2, 3],
                |e, value| {
                    e.push_i32(value);
                    e.store_local(&local)
                },
                |e| {
                    e.push_i32(-99);
                    e.store_local(&local)
                },
            )
            .unwrap();
        emitter.load_local(&local);
        emitter.ret().unwrap();

        let compiled = builder.finish(emitter.finalize().unwrap()).unwrap();
        let expected = [-99, 0, -99, 2, 3, -99];
        for (input, expected) in [-1, 0, 1, 2, 3, 4].into_iter().zip(expected) {
            assert_eq!(
                compiled.invoke(&[Value::I32(input)]).unwrap(),
                Value::I32(expected),
                "selector {input}"
            );
        }
    }

    #[test]
    fn capture_leaves_live_state_untouched() {
        let builder = UnitBuilder::new("cap").returns(ValueType::I32);
        let mut emitter = Emitter::new(builder.begin(), Vec::new(), ValueType::I32);
        emitter.push_i32(1);

        let instrs_before = format!("{:?}", emitter.sink().instrs());
        let stack_before = emitter.stack().len();

        let speculative = emitter
            .capture(|inner| {
                inner.push_i32(5);
                inner.push_i32(6);
                inner.binary_op(BinOp::Add)
            })
            .unwrap();
        assert_eq!(speculative.len(), 2);
        assert_eq!(speculative.peek(), Some(&ValueType::I32));

        assert_eq!(format!("{:?}", emitter.sink().instrs()), instrs_before);
        assert_eq!(emitter.stack().len(), stack_before);

        emitter.ret().unwrap();
        let compiled = builder.finish(emitter.finalize().unwrap()).unwrap();
        assert_eq!(compiled.invoke(&[]).unwrap(), Value::I32(1));
    }

    #[test]
    fn finalize_requires_marked_labels() {
        let builder = UnitBuilder::new("unmarked").returns(ValueType::Void);
        let mut emitter = Emitter::new(builder.begin(), Vec::new(), ValueType::Void);
        let never = emitter.define_label("never");
        emitter.branch(&never).unwrap();
        emitter.ret().unwrap();
        assert_eq!(
            emitter.finalize().unwrap_err(),
            CodegenError::LabelNotMarked("never".to_string())
        );
    }

    #[test]
    fn forward_branches_resolve() {
        let builder = UnitBuilder::new("branchy").returns(ValueType::I32);
        let mut emitter = Emitter::new(builder.begin(), Vec::new(), ValueType::I32);
        let skip = emitter.define_label("skip");
        emitter.push_i32(0);
        emitter.branch_if_true(&skip).unwrap();
        emitter.push_i32(42);
        emitter.ret().unwrap();
        emitter.mark_label(&skip).unwrap();
        emitter.push_i32(7);
        emitter.ret().unwrap();

        let compiled = builder.finish(emitter.finalize().unwrap()).unwrap();
        assert_eq!(compiled.invoke(&[]).unwrap(), Value::I32(42));
    }

    #[test]
    fn operand_kind_mismatch_is_detected() {
        let mut emitter = Emitter::new(DiscardSink::new(), Vec::new(), ValueType::I32);
        emitter.push_i32(1);
        emitter.push_i64(2);
        assert_eq!(
            emitter.binary_op(BinOp::Add).unwrap_err(),
            CodegenError::OperandTypeMismatch {
                left: ValueType::I32,
                right: ValueType::I64,
            }
        );
    }

    #[test]
    fn unchecked_mode_skips_verification() {
        let mut emitter =
            Emitter::new(DiscardSink::new(), Vec::new(), ValueType::I32).without_type_checks();
        emitter.push_i32(1);
        emitter.push_i64(2);
        assert!(emitter.binary_op(BinOp::Add).is_ok());
    }

    #[test]
    fn return_type_is_checked() {
        let mut emitter = Emitter::new(DiscardSink::new(), Vec::new(), ValueType::I32);
        emitter.push_str("x");
        assert_eq!(
            emitter.ret().unwrap_err(),
            CodegenError::ReturnTypeMismatch {
                expected: ValueType::I32,
                found: ValueType::Str,
            }
        );
    }

    #[test]
    fn signedness_comes_from_the_shadow_stack() {
        let builder = UnitBuilder::new("udiv").returns(ValueType::U32);
        let mut emitter = Emitter::new(builder.begin(), Vec::new(), ValueType::U32);
        emitter.push(&Value::U32(8)).unwrap();
        emitter.push(&Value::U32(2)).unwrap();
        emitter.binary_op(BinOp::Div).unwrap();
        let ops: Vec<Op> = emitter.sink().instrs().iter().map(|i| i.op).collect();
        assert!(ops.contains(&Op::DivUn));
        assert!(!ops.contains(&Op::Div));
    }

    #[test]
    fn declared_locals_track_types() {
        let mut emitter = Emitter::new(DiscardSink::new(), Vec::new(), ValueType::Void);
        let local = emitter.declare_local(ValueType::F32);
        emitter.push_i32(1);
        assert_eq!(
            emitter.store_local(&local).unwrap_err(),
            CodegenError::OperandTypeMismatch {
                left: ValueType::F32,
                right: ValueType::I32,
            }
        );
    }

    #[test]
    fn static_fields_through_the_emitter() {
        let field = crate::sig::FieldDesc::new_static("level", ValueType::I32);
        let builder = UnitBuilder::new("statics").returns(ValueType::I32);
        let mut emitter = Emitter::new(builder.begin(), Vec::new(), ValueType::I32);
        emitter.push_i32(5);
        emitter.store_static_field(&field).unwrap();
        emitter.load_static_field(&field).unwrap();
        emitter.ret().unwrap();

        let compiled = builder.finish(emitter.finalize().unwrap()).unwrap();
        assert_eq!(compiled.invoke(&[]).unwrap(), Value::I32(5));
        assert_eq!(field.load_static(), Some(Value::I32(5)));
    }
}
