//! Callee and field descriptors
//!
//! These stand in for the hosting runtime's reflection surface: the code
//! generator only needs a callee's shape (parameter types, return type,
//! whether it takes an implicit receiver, calling convention) and a field's
//! name and type. Descriptors are cheap shared handles; identity is the
//! handle, not the name.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::types::ValueType;
use crate::value::Value;

/// Calling convention of a callee
///
/// Only `Standard` is supported by the generator; the variant exists so the
/// unsupported-convention failure path stays representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallConv {
    Standard,
    VarArg,
}

/// Host implementation invoked by the test executor
pub type HostFn = Rc<dyn Fn(&[Value]) -> Value>;

struct CalleeInner {
    name: String,
    params: Vec<ValueType>,
    ret: ValueType,
    has_receiver: bool,
    conv: CallConv,
    host: Option<HostFn>,
}

/// A callable target: shape plus an optional host implementation
#[derive(Clone)]
pub struct Callee(Rc<CalleeInner>);

impl Callee {
    fn build(
        name: impl Into<String>,
        params: Vec<ValueType>,
        ret: ValueType,
        has_receiver: bool,
        conv: CallConv,
        host: Option<HostFn>,
    ) -> Callee {
        Callee(Rc::new(CalleeInner {
            name: name.into(),
            params,
            ret,
            has_receiver,
            conv,
            host,
        }))
    }

    /// A free function (no implicit receiver)
    pub fn function(
        name: impl Into<String>,
        params: Vec<ValueType>,
        ret: ValueType,
        host: impl Fn(&[Value]) -> Value + 'static,
    ) -> Callee {
        let host: HostFn = Rc::new(host);
        Callee::build(name, params, ret, false, CallConv::Standard, Some(host))
    }

    /// A method with an implicit receiver; the host closure receives the
    /// receiver as its first argument
    pub fn method(
        name: impl Into<String>,
        params: Vec<ValueType>,
        ret: ValueType,
        host: impl Fn(&[Value]) -> Value + 'static,
    ) -> Callee {
        let host: HostFn = Rc::new(host);
        Callee::build(name, params, ret, true, CallConv::Standard, Some(host))
    }

    /// A bare declaration with an explicit convention and no implementation
    pub fn declared(
        name: impl Into<String>,
        params: Vec<ValueType>,
        ret: ValueType,
        has_receiver: bool,
        conv: CallConv,
    ) -> Callee {
        Callee::build(name, params, ret, has_receiver, conv, None)
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn params(&self) -> &[ValueType] {
        &self.0.params
    }

    pub fn ret(&self) -> &ValueType {
        &self.0.ret
    }

    /// Whether the callee takes an implicit receiver ("this")
    pub fn has_receiver(&self) -> bool {
        self.0.has_receiver
    }

    pub fn convention(&self) -> CallConv {
        self.0.conv
    }

    /// Runs the host implementation, if one was provided
    pub fn invoke(&self, args: &[Value]) -> Option<Value> {
        self.0.host.as_ref().map(|f| f(args))
    }

    /// Handle identity
    pub fn handle_eq(&self, other: &Callee) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Callee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callee")
            .field("name", &self.0.name)
            .field("params", &self.0.params)
            .field("ret", &self.0.ret)
            .field("has_receiver", &self.0.has_receiver)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Callee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.name)
    }
}

struct FieldInner {
    name: String,
    ty: ValueType,
    /// Backing cell for static fields; instance fields live on objects
    statics: Option<RefCell<Value>>,
}

/// A field descriptor, instance or static
#[derive(Clone)]
pub struct FieldDesc(Rc<FieldInner>);

impl FieldDesc {
    /// An instance field (storage lives on the object)
    pub fn instance(name: impl Into<String>, ty: ValueType) -> FieldDesc {
        FieldDesc(Rc::new(FieldInner {
            name: name.into(),
            ty,
            statics: None,
        }))
    }

    /// A static field with its own zero-initialized backing cell
    pub fn new_static(name: impl Into<String>, ty: ValueType) -> FieldDesc {
        let initial = Value::default_of(&ty);
        FieldDesc(Rc::new(FieldInner {
            name: name.into(),
            ty,
            statics: Some(RefCell::new(initial)),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn ty(&self) -> &ValueType {
        &self.0.ty
    }

    pub fn is_static(&self) -> bool {
        self.0.statics.is_some()
    }

    /// Reads the static backing cell
    pub fn load_static(&self) -> Option<Value> {
        self.0.statics.as_ref().map(|cell| cell.borrow().clone())
    }

    /// Writes the static backing cell; returns false for instance fields
    pub fn store_static(&self, value: Value) -> bool {
        match &self.0.statics {
            Some(cell) => {
                *cell.borrow_mut() = value;
                true
            }
            None => false,
        }
    }

    /// Handle identity
    pub fn handle_eq(&self, other: &FieldDesc) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for FieldDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDesc")
            .field("name", &self.0.name)
            .field("ty", &self.0.ty)
            .field("is_static", &self.is_static())
            .finish()
    }
}

impl fmt::Display for FieldDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_field_storage() {
        let field = FieldDesc::new_static("counter", ValueType::I32);
        assert!(field.is_static());
        assert_eq!(field.load_static(), Some(Value::I32(0)));
        assert!(field.store_static(Value::I32(7)));
        assert_eq!(field.load_static(), Some(Value::I32(7)));
    }

    #[test]
    fn instance_field_has_no_storage() {
        let field = FieldDesc::instance("x", ValueType::F32);
        assert!(!field.is_static());
        assert_eq!(field.load_static(), None);
        assert!(!field.store_static(Value::F32(1.0)));
    }

    #[test]
    fn handles_are_identity() {
        let a = FieldDesc::instance("x", ValueType::I32);
        let b = FieldDesc::instance("x", ValueType::I32);
        assert!(!a.handle_eq(&b));
        assert!(a.handle_eq(&a.clone()));
    }

    #[test]
    fn callee_shape() {
        let add = Callee::function(
            "add",
            vec![ValueType::I32, ValueType::I32],
            ValueType::I32,
            |args| {
                let a = args[0].as_i64().unwrap();
                let b = args[1].as_i64().unwrap();
                Value::I32((a + b) as i32)
            },
        );
        assert!(!add.has_receiver());
        assert_eq!(add.convention(), CallConv::Standard);
        assert_eq!(
            add.invoke(&[Value::I32(2), Value::I32(3)]),
            Some(Value::I32(5))
        );
    }
}
