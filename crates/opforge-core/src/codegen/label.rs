//! Lazily-bound branch targets
//!
//! A label can exist before any machine target has been allocated for it:
//! trace-only compilations have no machine to bind to, so their labels stay
//! in the `Delayed` state for the whole compile. When a real sink is
//! present, the label is `Bound` to a sink target before emission begins.
//! Marking fixes the label's position in the instruction stream and may
//! happen exactly once per compilation.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use super::error::CodegenError;
use super::sink::TargetId;

/// Binding state of a label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    /// No machine target exists (trace-only compile)
    Delayed,
    /// Bound to a sink-owned target
    Bound(TargetId),
}

struct LabelInner {
    name: String,
    binding: Cell<Binding>,
    marked: Cell<bool>,
}

/// A named, possibly-unbound branch target
///
/// Labels are shared handles: two labels with the same name are independent
/// identities unless the same handle is reused. Cloning preserves identity.
#[derive(Clone)]
pub struct Label(Rc<LabelInner>);

impl Label {
    /// A label with no machine target yet
    pub fn new(name: impl Into<String>) -> Label {
        Label(Rc::new(LabelInner {
            name: name.into(),
            binding: Cell::new(Binding::Delayed),
            marked: Cell::new(false),
        }))
    }

    /// A label bound to a sink target at creation
    pub fn bound(name: impl Into<String>, target: TargetId) -> Label {
        let label = Label::new(name);
        label.0.binding.set(Binding::Bound(target));
        label
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// The bound machine target, if any
    pub fn target(&self) -> Option<TargetId> {
        match self.0.binding.get() {
            Binding::Delayed => None,
            Binding::Bound(target) => Some(target),
        }
    }

    pub fn is_marked(&self) -> bool {
        self.0.marked.get()
    }

    /// Fixes the label's position; fails when called twice
    pub fn mark(&self) -> Result<(), CodegenError> {
        if self.0.marked.get() {
            return Err(CodegenError::LabelMarkedTwice(self.0.name.clone()));
        }
        self.0.marked.set(true);
        Ok(())
    }

    /// Resets the label for a fresh compilation and installs its binding
    ///
    /// The same tree can be compiled repeatedly (trace first, then a real
    /// sink); each compile rebinds the labels it collected.
    pub(crate) fn begin_compile(&self, target: Option<TargetId>) {
        self.0.marked.set(false);
        self.0.binding.set(match target {
            Some(target) => Binding::Bound(target),
            None => Binding::Delayed,
        });
    }

    /// Handle identity
    pub fn handle_eq(&self, other: &Label) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Label({})", self.0.name)?;
        if let Some(target) = self.target() {
            write!(f, "@{}", target.0)?;
        }
        if self.is_marked() {
            write!(f, " marked")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delayed_until_bound() {
        let label = Label::new("exit");
        assert_eq!(label.target(), None);
        label.begin_compile(Some(TargetId(4)));
        assert_eq!(label.target(), Some(TargetId(4)));
    }

    #[test]
    fn mark_twice_fails() {
        let label = Label::new("loop");
        assert!(label.mark().is_ok());
        assert!(matches!(
            label.mark(),
            Err(CodegenError::LabelMarkedTwice(name)) if name == "loop"
        ));
    }

    #[test]
    fn same_name_distinct_identity() {
        let a = Label::new("x");
        let b = Label::new("x");
        assert!(!a.handle_eq(&b));
        assert!(a.handle_eq(&a.clone()));
    }

    #[test]
    fn begin_compile_resets_marking() {
        let label = Label::bound("body", TargetId(0));
        label.mark().unwrap();
        label.begin_compile(Some(TargetId(9)));
        assert!(!label.is_marked());
        assert!(label.mark().is_ok());
    }
}
