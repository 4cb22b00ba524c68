//! Code units: the concrete instruction sink and its finalized form
//!
//! A `CodeUnit` records instructions as an enum list with a target table:
//! branch targets are allocated ids that acquire a position when marked, so
//! forward branches need no patching pass. Finalization resolves the table
//! and produces an immutable `Program`.

use std::rc::Rc;

use crate::codegen::{
    CodegenError, CodegenResult, InstructionSink, Op, SlotId, TargetId,
};
use crate::sig::{Callee, FieldDesc};
use crate::types::ValueType;

/// Operand of a recorded instruction
#[derive(Debug, Clone)]
pub enum Operand {
    None,
    I32(i32),
    I64(i64),
    F32(f32),
    Str(Rc<str>),
    Slot(SlotId),
    Callee(Callee),
    Field(FieldDesc),
    Type(ValueType),
    Target(TargetId),
    Targets(Vec<TargetId>),
}

/// One recorded instruction
#[derive(Debug, Clone)]
pub struct Instr {
    pub op: Op,
    pub operand: Operand,
}

/// A unit under construction; the in-crate instruction sink
#[derive(Debug)]
pub struct CodeUnit {
    name: String,
    params: Vec<ValueType>,
    ret: ValueType,
    instrs: Vec<Instr>,
    /// Target id -> instruction index, filled in by `mark_target`
    targets: Vec<Option<usize>>,
    locals: Vec<ValueType>,
}

impl CodeUnit {
    fn new(name: String, params: Vec<ValueType>, ret: ValueType) -> CodeUnit {
        CodeUnit {
            name,
            params,
            ret,
            instrs: Vec::new(),
            targets: Vec::new(),
            locals: Vec::new(),
        }
    }

    /// Number of recorded instructions
    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    pub fn instrs(&self) -> &[Instr] {
        &self.instrs
    }

    fn record(&mut self, op: Op, operand: Operand) {
        self.instrs.push(Instr { op, operand });
    }
}

impl InstructionSink for CodeUnit {
    #[allow(clippy::cast_possible_truncation)]
    fn alloc_target(&mut self) -> TargetId {
        let id = TargetId(self.targets.len() as u32);
        self.targets.push(None);
        id
    }

    fn mark_target(&mut self, target: TargetId) {
        if let Some(entry) = self.targets.get_mut(target.0 as usize) {
            *entry = Some(self.instrs.len());
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn alloc_slot(&mut self, ty: &ValueType) -> SlotId {
        let id = SlotId(self.locals.len() as u32);
        self.locals.push(ty.clone());
        id
    }

    fn emit(&mut self, op: Op) {
        self.record(op, Operand::None);
    }

    fn emit_i32(&mut self, op: Op, value: i32) {
        self.record(op, Operand::I32(value));
    }

    fn emit_i64(&mut self, op: Op, value: i64) {
        self.record(op, Operand::I64(value));
    }

    fn emit_f32(&mut self, op: Op, value: f32) {
        self.record(op, Operand::F32(value));
    }

    fn emit_str(&mut self, op: Op, value: &str) {
        self.record(op, Operand::Str(Rc::from(value)));
    }

    fn emit_slot(&mut self, op: Op, slot: SlotId) {
        self.record(op, Operand::Slot(slot));
    }

    fn emit_callee(&mut self, op: Op, callee: &Callee) {
        self.record(op, Operand::Callee(callee.clone()));
    }

    fn emit_field(&mut self, op: Op, field: &FieldDesc) {
        self.record(op, Operand::Field(field.clone()));
    }

    fn emit_type(&mut self, op: Op, ty: &ValueType) {
        self.record(op, Operand::Type(ty.clone()));
    }

    fn emit_target(&mut self, op: Op, target: TargetId) {
        self.record(op, Operand::Target(target));
    }

    fn emit_targets(&mut self, op: Op, targets: &[TargetId]) {
        self.record(op, Operand::Targets(targets.to_vec()));
    }
}

/// A finalized unit: instructions plus the resolved target table
#[derive(Debug)]
pub struct Program {
    pub(crate) name: String,
    pub(crate) params: Vec<ValueType>,
    pub(crate) ret: ValueType,
    pub(crate) instrs: Vec<Instr>,
    pub(crate) targets: Vec<usize>,
    pub(crate) locals: Vec<ValueType>,
}

impl Program {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[ValueType] {
        &self.params
    }

    pub fn ret(&self) -> &ValueType {
        &self.ret
    }

    pub fn instrs(&self) -> &[Instr] {
        &self.instrs
    }
}

/// Declares a callable unit, hands out its sink and finalizes it
///
/// The builder holds the declared shape: name, ordered parameter types and
/// the return type. `begin` yields a fresh `CodeUnit` to compile into;
/// `finish` resolves branch targets and seals the unit.
#[derive(Debug, Clone)]
pub struct UnitBuilder {
    name: String,
    params: Vec<ValueType>,
    ret: ValueType,
}

impl UnitBuilder {
    pub fn new(name: impl Into<String>) -> UnitBuilder {
        UnitBuilder {
            name: name.into(),
            params: Vec::new(),
            ret: ValueType::Void,
        }
    }

    #[must_use]
    pub fn returns(mut self, ty: ValueType) -> Self {
        self.ret = ty;
        self
    }

    #[must_use]
    pub fn param(mut self, ty: ValueType) -> Self {
        self.params.push(ty);
        self
    }

    pub fn ret_ty(&self) -> &ValueType {
        &self.ret
    }

    pub fn params(&self) -> &[ValueType] {
        &self.params
    }

    /// A fresh sink for this unit
    pub fn begin(&self) -> CodeUnit {
        CodeUnit::new(self.name.clone(), self.params.clone(), self.ret.clone())
    }

    /// Resolves branch targets and seals the unit
    ///
    /// A target that was allocated but never marked is a hard error: a
    /// branch would have nowhere to land.
    pub fn finish(&self, unit: CodeUnit) -> CodegenResult<super::CompiledUnit> {
        let mut targets = Vec::with_capacity(unit.targets.len());
        for entry in &unit.targets {
            targets.push(entry.ok_or(CodegenError::UnmarkedTarget)?);
        }
        Ok(super::CompiledUnit::from_program(Program {
            name: unit.name,
            params: unit.params,
            ret: unit.ret,
            instrs: unit.instrs,
            targets,
            locals: unit.locals,
        }))
    }
}
