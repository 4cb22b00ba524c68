//! Opforge Core - Safety-checked bytecode generation
//!
//! This crate compiles a small typed expression/statement tree into
//! instructions for a stack-based virtual machine, optionally verifying the
//! emitted sequence through a shadow operand-type stack as it is produced:
//! - Types: the semantic value-type model driving opcode selection
//! - AST: typed expression and statement nodes with static inference
//! - Codegen: instruction set, sinks, labels, the operand-type stack, the
//!   tree compiler and the fluent verifying emitter
//! - VM: the callable-unit builder and a reference executor

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Semantic value types
pub mod types;

/// Constant and runtime values
pub mod value;

/// Callee and field descriptors
pub mod sig;

/// Typed expression and statement trees
pub mod ast;

/// Code generation
pub mod codegen;

/// Callable units and the reference executor
pub mod vm;

/// Test utilities - helpers for compiling and invoking trees
pub mod testutil;

/// Convenience re-export of the tree compiler
pub use codegen::Compiler;

/// Convenience re-export of the fluent verifying emitter
pub use codegen::Emitter;

/// Convenience re-export of the unit builder
pub use vm::UnitBuilder;

/// Convenience re-export of the semantic type model
pub use types::ValueType;

/// Convenience re-export of constant values
pub use value::Value;
