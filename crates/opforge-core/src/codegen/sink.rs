//! The instruction sink interface
//!
//! The sink is the external facility that actually accepts instructions for
//! a unit under construction. The generator only ever drives this narrow
//! vertical interface; it never inspects sink internals. A sink also owns
//! the machine-side resources the generator allocates: branch targets and
//! local slots.

use super::opcode::Op;
use crate::sig::{Callee, FieldDesc};
use crate::types::ValueType;

/// A machine branch target owned by a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(pub u32);

/// A machine local slot owned by a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub u32);

/// Primitive emission interface of the target machine
pub trait InstructionSink {
    /// Allocates a fresh, unmarked branch target
    fn alloc_target(&mut self) -> TargetId;

    /// Fixes a target's position at the current end of the stream
    fn mark_target(&mut self, target: TargetId);

    /// Allocates a local slot of the given type
    fn alloc_slot(&mut self, ty: &ValueType) -> SlotId;

    fn emit(&mut self, op: Op);
    fn emit_i32(&mut self, op: Op, value: i32);
    fn emit_i64(&mut self, op: Op, value: i64);
    fn emit_f32(&mut self, op: Op, value: f32);
    fn emit_str(&mut self, op: Op, value: &str);
    fn emit_slot(&mut self, op: Op, slot: SlotId);
    fn emit_callee(&mut self, op: Op, callee: &Callee);
    fn emit_field(&mut self, op: Op, field: &FieldDesc);
    fn emit_type(&mut self, op: Op, ty: &ValueType);
    fn emit_target(&mut self, op: Op, target: TargetId);
    fn emit_targets(&mut self, op: Op, targets: &[TargetId]);
}

/// A sink that allocates resources but drops every emission
///
/// This is the emission context for capture/dry-run analysis: running a
/// speculative sequence against a `DiscardSink` cannot disturb the live
/// unit, by construction.
#[derive(Debug, Default)]
pub struct DiscardSink {
    next_target: u32,
    next_slot: u32,
}

impl DiscardSink {
    pub fn new() -> DiscardSink {
        DiscardSink::default()
    }
}

impl InstructionSink for DiscardSink {
    fn alloc_target(&mut self) -> TargetId {
        let id = TargetId(self.next_target);
        self.next_target += 1;
        id
    }

    fn mark_target(&mut self, _target: TargetId) {}

    fn alloc_slot(&mut self, _ty: &ValueType) -> SlotId {
        let id = SlotId(self.next_slot);
        self.next_slot += 1;
        id
    }

    fn emit(&mut self, _op: Op) {}
    fn emit_i32(&mut self, _op: Op, _value: i32) {}
    fn emit_i64(&mut self, _op: Op, _value: i64) {}
    fn emit_f32(&mut self, _op: Op, _value: f32) {}
    fn emit_str(&mut self, _op: Op, _value: &str) {}
    fn emit_slot(&mut self, _op: Op, _slot: SlotId) {}
    fn emit_callee(&mut self, _op: Op, _callee: &Callee) {}
    fn emit_field(&mut self, _op: Op, _field: &FieldDesc) {}
    fn emit_type(&mut self, _op: Op, _ty: &ValueType) {}
    fn emit_target(&mut self, _op: Op, _target: TargetId) {}
    fn emit_targets(&mut self, _op: Op, _targets: &[TargetId]) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discard_sink_still_allocates() {
        let mut sink = DiscardSink::new();
        assert_eq!(sink.alloc_target(), TargetId(0));
        assert_eq!(sink.alloc_target(), TargetId(1));
        assert_eq!(sink.alloc_slot(&ValueType::I32), SlotId(0));
        sink.emit(Op::Add);
        sink.emit_i32(Op::LoadConstI32, 42);
    }
}
