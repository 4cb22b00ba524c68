//! Callable units and the reference executor
//!
//! The unit builder is the collaborator that turns a declared signature
//! into an instruction sink and, after compilation, seals the sink into an
//! invocable unit. The executor interprets sealed units so generated code
//! can be exercised end-to-end.

pub mod error;
pub mod executor;
pub mod unit;

pub use error::{ExecError, ExecResult};
pub use executor::Executor;
pub use unit::{CodeUnit, Instr, Operand, Program, UnitBuilder};

use std::rc::Rc;

use crate::value::Value;

/// A sealed, invocable unit
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    program: Rc<Program>,
}

impl CompiledUnit {
    pub(crate) fn from_program(program: Program) -> CompiledUnit {
        CompiledUnit {
            program: Rc::new(program),
        }
    }

    pub fn name(&self) -> &str {
        self.program.name()
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Invokes the unit with the given arguments
    pub fn invoke(&self, args: &[Value]) -> ExecResult<Value> {
        Executor::new(&self.program).run(args)
    }
}
