//! Tree-to-bytecode compiler
//!
//! A syntax-directed instruction selector: each node kind lowers to one or
//! more target instructions, chosen purely from static value types.
//! Evaluation order is depth-first and left-to-right for every multi-operand
//! construct; that order is an observable contract because it fixes the
//! side-effect order of sub-expressions.
//!
//! The compiler runs in two emission modes. With a sink it emits real
//! machine instructions; without one it produces only the textual trace,
//! and labels stay in their delayed state for the whole compile.

use std::collections::HashMap;

use super::error::{CodegenError, CodegenResult};
use super::label::Label;
use super::opcode::{binary_sequence, unary_sequence, Op};
use super::sink::{InstructionSink, SlotId};
use crate::ast::{BinOp, CallKind, Expr, Local, Stmt, SwitchCase};
use crate::sig::{CallConv, Callee, FieldDesc};
use crate::types::ValueType;
use crate::value::Value;

/// Switch lowering policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwitchStrategy {
    /// Dense jump table for integral spans up to the limit, linear chain
    /// otherwise
    #[default]
    Auto,
    /// Always the linear compare-and-branch chain
    LinearChain,
}

/// Largest contiguous range lowered as a dense jump table
const DENSE_SPAN_LIMIT: i128 = 4096;

/// The instruction selector
pub struct Compiler<'a> {
    sink: Option<&'a mut dyn InstructionSink>,
    ret_ty: ValueType,
    trace: bool,
    lines: Vec<String>,
    /// Local slot bindings, cached per compile (and therefore per sink)
    locals: HashMap<usize, SlotId>,
    /// Every label this compile knows about; all must be marked by the end
    labels: Vec<Label>,
    strategy: SwitchStrategy,
    switch_tmp: u32,
}

impl<'a> Compiler<'a> {
    /// A compiler emitting into a real instruction sink
    pub fn new(ret_ty: ValueType, sink: &'a mut dyn InstructionSink) -> Compiler<'a> {
        Compiler {
            sink: Some(sink),
            ret_ty,
            trace: false,
            lines: Vec::new(),
            locals: HashMap::new(),
            labels: Vec::new(),
            strategy: SwitchStrategy::Auto,
            switch_tmp: 0,
        }
    }

    /// A trace-only compiler: no machine, just the textual listing
    pub fn trace_only(ret_ty: ValueType) -> Compiler<'a> {
        Compiler {
            sink: None,
            ret_ty,
            trace: true,
            lines: Vec::new(),
            locals: HashMap::new(),
            labels: Vec::new(),
            strategy: SwitchStrategy::Auto,
            switch_tmp: 0,
        }
    }

    /// Records the textual trace alongside real emission
    #[must_use]
    pub fn with_trace(mut self) -> Self {
        self.trace = true;
        self
    }

    #[must_use]
    pub fn with_switch_strategy(mut self, strategy: SwitchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Compiles a statement tree into the sink and/or trace
    ///
    /// Two passes: first every label reachable from the tree is collected
    /// and bound (forward branches need an allocated target), then the tree
    /// is lowered. Finishing with an unmarked label is a hard error.
    pub fn compile(&mut self, root: &Stmt) -> CodegenResult<()> {
        self.bind_labels(root)?;
        self.stmt(root)?;
        for label in &self.labels {
            if !label.is_marked() {
                return Err(CodegenError::LabelNotMarked(label.name().to_string()));
            }
        }
        Ok(())
    }

    /// The trace lines produced so far
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    // ===== Label management =====

    fn bind_labels(&mut self, root: &Stmt) -> CodegenResult<()> {
        fn note(list: &mut Vec<Label>, label: &Label) {
            if !list.iter().any(|known| known.handle_eq(label)) {
                list.push(label.clone());
            }
        }

        let mut collected: Vec<Label> = Vec::new();
        let mut duplicate: Option<String> = None;
        let mut seen_marks: Vec<Label> = Vec::new();

        root.for_each_stmt(&mut |stmt| match stmt {
            Stmt::Mark(label) => {
                if seen_marks.iter().any(|known| known.handle_eq(label)) {
                    if duplicate.is_none() {
                        duplicate = Some(label.name().to_string());
                    }
                } else {
                    seen_marks.push(label.clone());
                }
                note(&mut collected, label);
            }
            Stmt::Goto(label)
            | Stmt::GotoIfTrue { label, .. }
            | Stmt::GotoIfFalse { label, .. } => note(&mut collected, label),
            _ => {}
        });

        if let Some(name) = duplicate {
            return Err(CodegenError::LabelDeclaredTwice(name));
        }

        for label in &collected {
            let target = self.sink.as_deref_mut().map(|sink| sink.alloc_target());
            label.begin_compile(target);
        }
        self.labels = collected;
        Ok(())
    }

    fn new_label(&mut self, name: String) -> Label {
        let label = match self.sink.as_deref_mut() {
            Some(sink) => Label::bound(name, sink.alloc_target()),
            None => Label::new(name),
        };
        self.labels.push(label.clone());
        label
    }

    fn mark(&mut self, label: &Label) -> CodegenResult<()> {
        label.mark()?;
        if self.trace {
            self.lines.push(format!("Label_{}:;", label.name()));
        }
        if let Some(target) = label.target() {
            if let Some(sink) = self.sink.as_deref_mut() {
                sink.mark_target(target);
            }
        }
        Ok(())
    }

    // ===== Emission helpers =====

    fn emit(&mut self, op: Op) {
        if self.trace {
            self.lines.push(format!("  {op}"));
        }
        if let Some(sink) = self.sink.as_deref_mut() {
            sink.emit(op);
        }
    }

    fn emit_i32(&mut self, op: Op, value: i32) {
        if self.trace {
            self.lines.push(format!("  {op} {value}"));
        }
        if let Some(sink) = self.sink.as_deref_mut() {
            sink.emit_i32(op, value);
        }
    }

    fn emit_i64(&mut self, op: Op, value: i64) {
        if self.trace {
            self.lines.push(format!("  {op} {value}"));
        }
        if let Some(sink) = self.sink.as_deref_mut() {
            sink.emit_i64(op, value);
        }
    }

    fn emit_f32(&mut self, op: Op, value: f32) {
        if self.trace {
            self.lines.push(format!("  {op} {value}"));
        }
        if let Some(sink) = self.sink.as_deref_mut() {
            sink.emit_f32(op, value);
        }
    }

    fn emit_str(&mut self, op: Op, value: &str) {
        if self.trace {
            self.lines.push(format!("  {op} {value}"));
        }
        if let Some(sink) = self.sink.as_deref_mut() {
            sink.emit_str(op, value);
        }
    }

    fn emit_field(&mut self, op: Op, field: &FieldDesc) {
        if self.trace {
            self.lines.push(format!("  {op} {field}"));
        }
        if let Some(sink) = self.sink.as_deref_mut() {
            sink.emit_field(op, field);
        }
    }

    fn emit_callee(&mut self, op: Op, callee: &Callee) {
        if self.trace {
            self.lines.push(format!("  {op} {callee}"));
        }
        if let Some(sink) = self.sink.as_deref_mut() {
            sink.emit_callee(op, callee);
        }
    }

    fn emit_type(&mut self, op: Op, ty: &ValueType) {
        if self.trace {
            self.lines.push(format!("  {op} {ty}"));
        }
        if let Some(sink) = self.sink.as_deref_mut() {
            sink.emit_type(op, ty);
        }
    }

    fn emit_branch(&mut self, op: Op, label: &Label) -> CodegenResult<()> {
        if self.trace {
            self.lines.push(format!("  {op} {}", label.name()));
        }
        if self.sink.is_some() {
            let target = label
                .target()
                .ok_or_else(|| CodegenError::UnboundLabel(label.name().to_string()))?;
            if let Some(sink) = self.sink.as_deref_mut() {
                sink.emit_target(op, target);
            }
        }
        Ok(())
    }

    fn emit_switch(&mut self, table: &[Label]) -> CodegenResult<()> {
        if self.trace {
            let names: Vec<&str> = table.iter().map(|label| label.name()).collect();
            self.lines.push(format!("  {} {}", Op::Switch, names.join(",")));
        }
        if self.sink.is_some() {
            let mut targets = Vec::with_capacity(table.len());
            for label in table {
                targets.push(
                    label
                        .target()
                        .ok_or_else(|| CodegenError::UnboundLabel(label.name().to_string()))?,
                );
            }
            if let Some(sink) = self.sink.as_deref_mut() {
                sink.emit_targets(Op::Switch, &targets);
            }
        }
        Ok(())
    }

    /// Slot for a local, allocated on first use against this compile's sink
    fn local_slot(&mut self, local: &Local) -> Option<SlotId> {
        if let Some(&slot) = self.locals.get(&local.id()) {
            return Some(slot);
        }
        let sink = self.sink.as_deref_mut()?;
        let slot = sink.alloc_slot(local.ty());
        self.locals.insert(local.id(), slot);
        Some(slot)
    }

    fn emit_local_op(&mut self, op: Op, local: &Local) {
        let slot = self.local_slot(local);
        if self.trace {
            self.lines.push(format!("  {op} {}", local.name()));
        }
        if let Some(slot) = slot {
            if let Some(sink) = self.sink.as_deref_mut() {
                sink.emit_slot(op, slot);
            }
        }
    }

    fn load_local(&mut self, local: &Local) {
        if let Some(slot) = self.local_slot(local) {
            if let Some(op) = Op::compact_local(slot.0) {
                self.emit(op);
                return;
            }
        }
        self.emit_local_op(Op::LoadLocal, local);
    }

    // ===== Statements =====

    fn stmt(&mut self, stmt: &Stmt) -> CodegenResult<()> {
        match stmt {
            Stmt::Block(stmts) => {
                for stmt in stmts {
                    self.stmt(stmt)?;
                }
                Ok(())
            }

            Stmt::Comment(text) => {
                if self.trace {
                    self.lines.push(format!("; {text}"));
                }
                Ok(())
            }

            Stmt::Empty => Ok(()),

            Stmt::Mark(label) => self.mark(label),

            Stmt::Goto(label) => self.emit_branch(Op::Branch, label),

            Stmt::GotoIfTrue { label, cond } => {
                self.expr(cond)?;
                self.emit_branch(Op::BranchIfTrue, label)
            }

            Stmt::GotoIfFalse { label, cond } => {
                self.expr(cond)?;
                self.emit_branch(Op::BranchIfFalse, label)
            }

            Stmt::Expr(expr) => {
                let ty = expr.ty();
                self.expr(expr)?;
                if ty != ValueType::Void {
                    self.emit(Op::Pop);
                }
                Ok(())
            }

            Stmt::Return(expr) => {
                let found = expr.as_ref().map_or(ValueType::Void, Expr::ty);
                if found != self.ret_ty {
                    return Err(CodegenError::ReturnTypeMismatch {
                        expected: self.ret_ty.clone(),
                        found,
                    });
                }
                if let Some(expr) = expr {
                    self.expr(expr)?;
                }
                self.emit(Op::Ret);
                Ok(())
            }

            Stmt::IfElse {
                cond,
                then_body,
                else_body,
            } => {
                let after_then = self.new_label("AfterIf".to_string());
                self.expr(cond)?;
                self.emit_branch(Op::BranchIfFalse, &after_then)?;
                self.stmt(then_body)?;
                match else_body {
                    Some(else_body) => {
                        let after_else = self.new_label("AfterElse".to_string());
                        self.emit_branch(Op::Branch, &after_else)?;
                        self.mark(&after_then)?;
                        self.stmt(else_body)?;
                        self.mark(&after_else)
                    }
                    None => self.mark(&after_then),
                }
            }

            Stmt::Assign { target, value } => self.assign(target, value),

            Stmt::Switch {
                selector,
                cases,
                default,
            } => self.switch(selector, cases, default.as_deref()),
        }
    }

    fn assign(&mut self, target: &Expr, value: &Expr) -> CodegenResult<()> {
        match target {
            Expr::Local(local) => {
                self.expr(value)?;
                self.emit_local_op(Op::StoreLocal, local);
                Ok(())
            }

            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            Expr::Arg { index, .. } => {
                self.expr(value)?;
                self.emit_i32(Op::StoreArg, *index as i32);
                Ok(())
            }

            Expr::Field {
                instance: Some(instance),
                field,
            } => {
                check_field_shape(field, false)?;
                self.expr(instance)?;
                self.expr(value)?;
                self.emit_field(Op::StoreField, field);
                Ok(())
            }

            Expr::Field {
                instance: None,
                field,
            } => {
                check_field_shape(field, true)?;
                self.expr(value)?;
                self.emit_field(Op::StoreStaticField, field);
                Ok(())
            }

            Expr::ArrayElem { array, index } => {
                self.expr(array)?;
                self.expr(index)?;
                self.expr(value)?;
                let elem = array.ty().element().cloned().unwrap_or(ValueType::Unknown);
                self.emit_type(Op::StoreElem, &elem);
                Ok(())
            }

            Expr::Indirect(pointer) => {
                let pointee = pointer
                    .ty()
                    .pointee()
                    .cloned()
                    .unwrap_or(ValueType::Unknown)
                    .signed_normalized();
                let op = match pointee {
                    ValueType::I8 | ValueType::Bool => Op::StoreIndI8,
                    ValueType::I16 => Op::StoreIndI16,
                    ValueType::I32 => Op::StoreIndI32,
                    ValueType::I64 => Op::StoreIndI64,
                    ValueType::F32 => Op::StoreIndF32,
                    ValueType::F64 => Op::StoreIndF64,
                    other => return Err(CodegenError::UnsupportedIndirectStore(other)),
                };
                self.expr(pointer)?;
                self.expr(value)?;
                self.emit(op);
                Ok(())
            }

            _ => Err(CodegenError::InvalidAssignTarget),
        }
    }

    // ===== Expressions =====

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn expr(&mut self, expr: &Expr) -> CodegenResult<()> {
        match expr {
            Expr::Imm(value) => self.immediate(value),

            Expr::Null(_) => {
                self.emit(Op::LoadNull);
                Ok(())
            }

            Expr::Arg { index, .. } => {
                match Op::compact_arg(*index) {
                    Some(op) => self.emit(op),
                    None => self.emit_i32(Op::LoadArg, *index as i32),
                }
                Ok(())
            }

            Expr::Local(local) => {
                self.load_local(local);
                Ok(())
            }

            Expr::Field {
                instance: Some(instance),
                field,
            } => {
                check_field_shape(field, false)?;
                self.expr(instance)?;
                self.emit_field(Op::LoadField, field);
                Ok(())
            }

            Expr::Field {
                instance: None,
                field,
            } => {
                check_field_shape(field, true)?;
                self.emit_field(Op::LoadStaticField, field);
                Ok(())
            }

            Expr::ArrayElem { array, index } => {
                self.expr(array)?;
                self.expr(index)?;
                self.emit(Op::LoadElemI32);
                Ok(())
            }

            Expr::Indirect(pointer) => self.indirect_load(pointer),

            Expr::AddressOf(inner) => self.address_of(inner),

            Expr::Cast {
                expr: inner,
                target,
                explicit,
            } => {
                self.expr(inner)?;
                if *explicit {
                    self.conv_to(target)?;
                }
                Ok(())
            }

            Expr::Binary { left, op, right } => {
                let signed = left.ty().is_signed();
                self.expr(left)?;
                self.expr(right)?;
                for step in binary_sequence(*op, signed) {
                    self.emit(*step);
                }
                Ok(())
            }

            Expr::Unary { op, operand } => {
                self.expr(operand)?;
                for step in unary_sequence(*op) {
                    self.emit(*step);
                }
                Ok(())
            }

            Expr::Call {
                callee,
                kind,
                receiver,
                args,
                tail,
            } => self.call(callee, *kind, receiver.as_deref(), args, *tail),

            Expr::CallTail(inner) => {
                if !matches!(**inner, Expr::Call { .. }) {
                    return Err(CodegenError::InvalidTailCall);
                }
                self.expr(inner)?;
                self.emit(Op::Ret);
                Ok(())
            }

            Expr::NewArray { elem_ty, values } => self.new_array(elem_ty, values),
        }
    }

    /// Immediate lowering: the most compact representation that holds the
    /// literal
    #[allow(clippy::cast_possible_truncation)]
    fn immediate(&mut self, value: &Value) -> CodegenResult<()> {
        match value.ty().signed_normalized() {
            ValueType::I8 | ValueType::I16 | ValueType::I32 | ValueType::Bool => {
                let v = value.as_i64().unwrap_or(0) as i32;
                match Op::compact_const(v) {
                    Some(op) => self.emit(op),
                    None => self.emit_i32(Op::LoadConstI32, v),
                }
                Ok(())
            }

            ValueType::I64 => {
                self.emit_i64(Op::LoadConstI64, value.as_i64().unwrap_or(0));
                Ok(())
            }

            // Pointer-sized constants pick the host width, then reinterpret
            ValueType::ISize => {
                let v = value.as_i64().unwrap_or(0);
                if cfg!(target_pointer_width = "64") {
                    self.emit_i64(Op::LoadConstI64, v);
                } else {
                    self.emit_i32(Op::LoadConstI32, v as i32);
                }
                self.emit(Op::ConvNative);
                Ok(())
            }

            ValueType::F32 => {
                if let Value::F32(v) = value {
                    self.emit_f32(Op::LoadConstF32, *v);
                }
                Ok(())
            }

            ValueType::Str => {
                if let Value::Str(s) = value {
                    self.emit_str(Op::LoadStr, s);
                }
                Ok(())
            }

            // Never a direct type-constant load: token, then resolution
            ValueType::TypeToken => {
                if let Value::Type(ty) = value {
                    self.emit_type(Op::LoadToken, ty);
                    self.emit(Op::ResolveToken);
                }
                Ok(())
            }

            other => Err(CodegenError::UnsupportedImmediate(other)),
        }
    }

    fn indirect_load(&mut self, pointer: &Expr) -> CodegenResult<()> {
        let pointee = pointer
            .ty()
            .pointee()
            .cloned()
            .unwrap_or(ValueType::Unknown);
        let op = match pointee {
            ValueType::U8 => Op::LoadIndU8,
            ValueType::U16 => Op::LoadIndU16,
            ValueType::U32 => Op::LoadIndU32,
            ValueType::I8 => Op::LoadIndI8,
            ValueType::I16 => Op::LoadIndI16,
            ValueType::I32 => Op::LoadIndI32,
            ValueType::I64 | ValueType::U64 => Op::LoadIndI64,
            ValueType::F32 => Op::LoadIndF32,
            ValueType::F64 => Op::LoadIndF64,
            other => return Err(CodegenError::UnsupportedIndirectLoad(other)),
        };
        self.expr(pointer)?;
        self.emit(op);
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn address_of(&mut self, inner: &Expr) -> CodegenResult<()> {
        match inner {
            Expr::Field {
                instance: Some(instance),
                field,
            } => {
                check_field_shape(field, false)?;
                self.expr(instance)?;
                self.emit_field(Op::LoadFieldAddr, field);
                Ok(())
            }
            Expr::Arg { index, .. } => {
                self.emit_i32(Op::LoadArgAddr, *index as i32);
                Ok(())
            }
            _ => Err(CodegenError::InvalidAddressOf),
        }
    }

    /// Conversion opcode for an explicit cast target
    fn conv_to(&mut self, target: &ValueType) -> CodegenResult<()> {
        match target {
            ValueType::I8 => self.emit(Op::ConvI8),
            ValueType::I16 => self.emit(Op::ConvI16),
            ValueType::I32 => self.emit(Op::ConvI32),
            ValueType::I64 => self.emit(Op::ConvI64),
            ValueType::U8 => self.emit(Op::ConvU8),
            ValueType::U16 => self.emit(Op::ConvU16),
            ValueType::U32 => self.emit(Op::ConvU32),
            ValueType::U64 => self.emit(Op::ConvU64),
            ValueType::F32 => self.emit(Op::ConvF32),
            ValueType::F64 => self.emit(Op::ConvF64),
            ValueType::Bool => self.emit(Op::ConvI8),
            ValueType::Ptr(_) | ValueType::ByRef(_) => self.emit(Op::ConvNative),
            // Enums convert as their underlying integer type
            ValueType::Enum { underlying, .. } => return self.conv_to(underlying),
            ValueType::Str | ValueType::TypeToken | ValueType::Array(_) | ValueType::Ref(_) => {
                self.emit_type(Op::CastRef, target);
            }
            ValueType::Void | ValueType::ISize | ValueType::USize | ValueType::Unknown => {
                return Err(CodegenError::UnsupportedConversion(target.clone()))
            }
        }
        Ok(())
    }

    fn call(
        &mut self,
        callee: &Callee,
        kind: CallKind,
        receiver: Option<&Expr>,
        args: &[Expr],
        tail: bool,
    ) -> CodegenResult<()> {
        match kind {
            CallKind::Static => {
                if callee.has_receiver() {
                    return Err(CodegenError::StaticCallWithReceiver);
                }
                if callee.convention() != CallConv::Standard {
                    return Err(CodegenError::UnsupportedCallConv(callee.convention()));
                }
                for arg in args {
                    self.expr(arg)?;
                }
            }
            CallKind::Instance | CallKind::Delegate => {
                if !callee.has_receiver() {
                    return Err(CodegenError::InstanceCallWithoutReceiver);
                }
                if callee.convention() != CallConv::Standard {
                    return Err(CodegenError::UnsupportedCallConv(callee.convention()));
                }
                let receiver = receiver.ok_or(CodegenError::InstanceCallWithoutReceiver)?;
                self.expr(receiver)?;
                for arg in args {
                    self.expr(arg)?;
                }
            }
        }
        if tail {
            self.emit(Op::TailPrefix);
        }
        self.emit_callee(Op::Call, callee);
        Ok(())
    }

    /// Array construction through a synthesized temporary local
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn new_array(&mut self, elem_ty: &ValueType, values: &[Expr]) -> CodegenResult<()> {
        let array_ty = ValueType::Array(Box::new(elem_ty.clone()));
        let temp = Local::new("$temp_array", array_ty);

        self.immediate(&Value::I32(values.len() as i32))?;
        self.emit_type(Op::NewArray, elem_ty);
        self.emit_local_op(Op::StoreLocal, &temp);
        for (position, value) in values.iter().enumerate() {
            let target =
                Expr::array_elem(Expr::local(&temp), Expr::imm_i32(position as i32));
            self.assign(&target, value)?;
        }
        self.load_local(&temp);
        Ok(())
    }

    // ===== Switch lowering =====

    fn switch(
        &mut self,
        selector: &Expr,
        cases: &[SwitchCase],
        default: Option<&Stmt>,
    ) -> CodegenResult<()> {
        for i in 0..cases.len() {
            for j in (i + 1)..cases.len() {
                if cases[i].value == cases[j].value {
                    return Err(CodegenError::RepeatedCase);
                }
            }
        }

        let end_label = self.new_label("EndCases".to_string());
        let default_label = self.new_label("Default".to_string());

        if !cases.is_empty() {
            let common = cases[0].value.ty();
            if cases.iter().any(|case| case.value.ty() != common) {
                return Err(CodegenError::MixedCaseTypes);
            }
            if common == ValueType::Str {
                return Err(CodegenError::StringSwitch);
            }

            let dense = self.strategy == SwitchStrategy::Auto && common.is_integer() && {
                let (min, max) = case_bounds(cases);
                i128::from(max) - i128::from(min) + 1 <= DENSE_SPAN_LIMIT
            };

            if dense {
                self.switch_dense(selector, cases, &common, &default_label, &end_label)?;
            } else {
                self.switch_chain(selector, cases, &common, &default_label, &end_label)?;
            }
        }

        self.mark(&default_label)?;
        if let Some(default) = default {
            self.stmt(default)?;
        }
        self.mark(&end_label)
    }

    /// Constant-time indexed jump over a contiguous value range
    ///
    /// One table slot per integer in `[min, max]`, defaulting to the
    /// default-case label; explicit cases override their slot.
    fn switch_dense(
        &mut self,
        selector: &Expr,
        cases: &[SwitchCase],
        common: &ValueType,
        default_label: &Label,
        end_label: &Label,
    ) -> CodegenResult<()> {
        let (min, max) = case_bounds(cases);
        let span = usize::try_from(i128::from(max) - i128::from(min) + 1).unwrap_or(0);

        let mut table: Vec<Label> = vec![default_label.clone(); span];
        for case in cases {
            let value = case.value.as_i64().unwrap_or(0);
            let offset = usize::try_from(value - min).unwrap_or(0);
            table[offset] = self.new_label(format!("Case_{value}"));
        }

        // selector - min, rebased onto the table
        let rebased = Expr::binary(
            selector.clone(),
            BinOp::Sub,
            Expr::cast(Expr::Imm(Value::I64(min)), common.clone()),
        );
        self.expr(&rebased)?;
        self.emit_switch(&table)?;
        self.emit_branch(Op::Branch, default_label)?;

        for case in cases {
            let value = case.value.as_i64().unwrap_or(0);
            let offset = usize::try_from(value - min).unwrap_or(0);
            let case_label = table[offset].clone();
            self.mark(&case_label)?;
            self.stmt(&case.body)?;
            self.emit_branch(Op::Branch, end_label)?;
        }
        Ok(())
    }

    /// Linear compare-and-branch chain through a synthesized temporary
    fn switch_chain(
        &mut self,
        selector: &Expr,
        cases: &[SwitchCase],
        common: &ValueType,
        _default_label: &Label,
        end_label: &Label,
    ) -> CodegenResult<()> {
        let temp = Local::new(format!("SwitchVarLocal{}", self.switch_tmp), common.clone());
        self.switch_tmp += 1;

        self.assign(&Expr::local(&temp), selector)?;
        for case in cases {
            let skip = self.new_label(format!("LabelCase{}", case.value));
            let cond = Expr::binary(
                Expr::local(&temp),
                BinOp::Eq,
                Expr::Imm(case.value.clone()),
            );
            self.expr(&cond)?;
            self.emit_branch(Op::BranchIfFalse, &skip)?;
            self.stmt(&case.body)?;
            self.emit_branch(Op::Branch, end_label)?;
            self.mark(&skip)?;
        }
        Ok(())
    }
}

fn check_field_shape(field: &FieldDesc, wants_static: bool) -> CodegenResult<()> {
    if field.is_static() == wants_static {
        Ok(())
    } else {
        Err(CodegenError::FieldShapeMismatch(field.name().to_string()))
    }
}

fn case_bounds(cases: &[SwitchCase]) -> (i64, i64) {
    let mut min = i64::MAX;
    let mut max = i64::MIN;
    for case in cases {
        let value = case.value.as_i64().unwrap_or(0);
        min = min.min(value);
        max = max.max(value);
    }
    (min, max)
}
