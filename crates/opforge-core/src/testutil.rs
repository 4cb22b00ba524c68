//! Test utilities
//!
//! Common helpers for compiling a statement tree into a callable unit and
//! invoking it, plus the trace-only path. Exposed as a public module so
//! integration tests and downstream crates can reuse them.

use crate::ast::Stmt;
use crate::codegen::Compiler;
use crate::types::ValueType;
use crate::value::Value;
use crate::vm::{CompiledUnit, UnitBuilder};

/// Result type for test helpers
pub type TestResult<T> = Result<T, String>;

/// Compiles a statement tree into a sealed unit
///
/// # Errors
/// Returns an error if code generation or finalization fails
pub fn compile_unit(
    name: &str,
    params: &[ValueType],
    ret: &ValueType,
    body: &Stmt,
) -> TestResult<CompiledUnit> {
    let mut builder = UnitBuilder::new(name).returns(ret.clone());
    for param in params {
        builder = builder.param(param.clone());
    }
    let mut unit = builder.begin();
    Compiler::new(ret.clone(), &mut unit)
        .compile(body)
        .map_err(|e| format!("Codegen error: {e}"))?;
    builder
        .finish(unit)
        .map_err(|e| format!("Finalize error: {e}"))
}

/// Compiles and invokes in one step
///
/// # Errors
/// Returns an error if compilation or execution fails
pub fn run_unit(
    params: &[ValueType],
    ret: &ValueType,
    body: &Stmt,
    args: &[Value],
) -> TestResult<Value> {
    let unit = compile_unit("test", params, ret, body)?;
    unit.invoke(args).map_err(|e| format!("Runtime error: {e}"))
}

/// Compiles, invokes and expects a widened integer result
///
/// # Errors
/// Returns an error if evaluation fails or the result is not integral
pub fn run_int(
    params: &[ValueType],
    ret: &ValueType,
    body: &Stmt,
    args: &[Value],
) -> TestResult<i64> {
    let value = run_unit(params, ret, body, args)?;
    value
        .as_i64()
        .ok_or_else(|| format!("Expected integer, got {}", value.kind_name()))
}

/// Compiles a tree in trace-only mode and returns the listing
///
/// # Errors
/// Returns an error if code generation fails
pub fn trace_stmt(ret: &ValueType, body: &Stmt) -> TestResult<Vec<String>> {
    let mut compiler = Compiler::trace_only(ret.clone());
    compiler
        .compile(body)
        .map_err(|e| format!("Codegen error: {e}"))?;
    Ok(compiler.into_lines())
}
