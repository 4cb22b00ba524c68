//! Code generation: instruction set, sinks, labels, the operand-type
//! stack, the tree compiler and the fluent verifying emitter

pub mod compiler;
pub mod emitter;
pub mod error;
pub mod label;
pub mod opcode;
pub mod sink;
pub mod typestack;

pub use compiler::{Compiler, SwitchStrategy};
pub use emitter::{Emitter, LocalSlot};
pub use error::{CodegenError, CodegenResult};
pub use label::Label;
pub use opcode::Op;
pub use sink::{DiscardSink, InstructionSink, SlotId, TargetId};
pub use typestack::TypeStack;
