//! Typed expression and statement trees
//!
//! Nodes form an immutable tree built by the caller (or synthesized by the
//! lowering passes). Every expression reports a semantic value type that is
//! computable without emitting any code; statements are untyped. Handles
//! (`Local`, labels) are shared reference objects: identity is the handle,
//! never the name.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::types::ValueType;

/// Expression nodes
pub mod expr;

/// Statement nodes
pub mod stmt;

pub use expr::{BinOp, CallKind, Expr, UnOp};
pub use stmt::{Stmt, SwitchCase};

static NEXT_LOCAL_ID: AtomicUsize = AtomicUsize::new(0);

struct LocalInner {
    id: usize,
    name: String,
    ty: ValueType,
}

/// A named local variable
///
/// The handle carries only name and declared type; the binding to a concrete
/// machine slot is resolved lazily by each compilation, so the same `Local`
/// can be compiled against different sinks and obtain a distinct slot in
/// each.
#[derive(Clone)]
pub struct Local(Rc<LocalInner>);

impl Local {
    pub fn new(name: impl Into<String>, ty: ValueType) -> Local {
        Local(Rc::new(LocalInner {
            id: NEXT_LOCAL_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            ty,
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn ty(&self) -> &ValueType {
        &self.0.ty
    }

    /// Stable identity used as the slot-cache key
    pub fn id(&self) -> usize {
        self.0.id
    }

    pub fn handle_eq(&self, other: &Local) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Local {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Local({}: {})", self.0.name, self.0.ty)
    }
}
