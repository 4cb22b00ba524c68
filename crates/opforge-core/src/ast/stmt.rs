//! Statement nodes

use super::expr::Expr;
use crate::codegen::label::Label;
use crate::value::Value;

/// One case of a switch statement
#[derive(Debug, Clone)]
pub struct SwitchCase {
    /// Case key; all keys in one switch must be distinct and share a type
    pub value: Value,
    pub body: Stmt,
}

impl SwitchCase {
    pub fn new(value: Value, body: Stmt) -> SwitchCase {
        SwitchCase { value, body }
    }
}

/// A statement node
#[derive(Debug, Clone)]
pub enum Stmt {
    /// Statement sequence
    Block(Vec<Stmt>),

    /// Store into a local, argument, field, array element or pointee
    Assign { target: Expr, value: Expr },

    /// Return from the unit; the expression type must equal the unit's
    /// declared return type (absent iff the unit returns no value)
    Return(Option<Expr>),

    IfElse {
        cond: Expr,
        then_body: Box<Stmt>,
        else_body: Option<Box<Stmt>>,
    },

    Switch {
        selector: Expr,
        cases: Vec<SwitchCase>,
        default: Option<Box<Stmt>>,
    },

    /// Unconditional branch
    Goto(Label),

    GotoIfTrue { label: Label, cond: Expr },

    GotoIfFalse { label: Label, cond: Expr },

    /// Fixes the label's position at this point in the instruction stream
    Mark(Label),

    /// Trace-only comment; emits nothing on the machine
    Comment(String),

    Empty,

    /// Expression evaluated for effect; a non-void result is discarded
    Expr(Expr),
}

impl Stmt {
    pub fn block(stmts: Vec<Stmt>) -> Stmt {
        Stmt::Block(stmts)
    }

    pub fn assign(target: Expr, value: Expr) -> Stmt {
        Stmt::Assign { target, value }
    }

    pub fn ret(expr: Expr) -> Stmt {
        Stmt::Return(Some(expr))
    }

    pub fn ret_void() -> Stmt {
        Stmt::Return(None)
    }

    pub fn if_then(cond: Expr, then_body: Stmt) -> Stmt {
        Stmt::IfElse {
            cond,
            then_body: Box::new(then_body),
            else_body: None,
        }
    }

    pub fn if_else(cond: Expr, then_body: Stmt, else_body: Stmt) -> Stmt {
        Stmt::IfElse {
            cond,
            then_body: Box::new(then_body),
            else_body: Some(Box::new(else_body)),
        }
    }

    pub fn switch(selector: Expr, cases: Vec<SwitchCase>, default: Option<Stmt>) -> Stmt {
        Stmt::Switch {
            selector,
            cases,
            default: default.map(Box::new),
        }
    }

    pub fn comment(text: impl Into<String>) -> Stmt {
        Stmt::Comment(text.into())
    }

    /// The immediate child statements, in source order
    ///
    /// Switch case bodies and the default body are children.
    pub fn children(&self) -> Vec<&Stmt> {
        match self {
            Stmt::Block(stmts) => stmts.iter().collect(),
            Stmt::IfElse {
                then_body,
                else_body,
                ..
            } => {
                let mut children = vec![then_body.as_ref()];
                if let Some(else_body) = else_body {
                    children.push(else_body.as_ref());
                }
                children
            }
            Stmt::Switch { cases, default, .. } => {
                let mut children: Vec<&Stmt> = cases.iter().map(|case| &case.body).collect();
                if let Some(default) = default {
                    children.push(default.as_ref());
                }
                children
            }
            _ => Vec::new(),
        }
    }

    /// Visits this statement and every descendant statement, pre-order
    ///
    /// Switch case bodies and the default body are descendants.
    pub fn for_each_stmt<'a>(&'a self, f: &mut dyn FnMut(&'a Stmt)) {
        f(self);
        match self {
            Stmt::Block(stmts) => {
                for stmt in stmts {
                    stmt.for_each_stmt(f);
                }
            }
            Stmt::IfElse {
                then_body,
                else_body,
                ..
            } => {
                then_body.for_each_stmt(f);
                if let Some(else_body) = else_body {
                    else_body.for_each_stmt(f);
                }
            }
            Stmt::Switch { cases, default, .. } => {
                for case in cases {
                    case.body.for_each_stmt(f);
                }
                if let Some(default) = default {
                    default.for_each_stmt(f);
                }
            }
            Stmt::Assign { .. }
            | Stmt::Return(_)
            | Stmt::Goto(_)
            | Stmt::GotoIfTrue { .. }
            | Stmt::GotoIfFalse { .. }
            | Stmt::Mark(_)
            | Stmt::Comment(_)
            | Stmt::Empty
            | Stmt::Expr(_) => {}
        }
    }

    /// Visits the expressions held directly by this statement
    pub fn for_each_expr(&self, f: &mut dyn FnMut(&Expr)) {
        match self {
            Stmt::Assign { target, value } => {
                f(target);
                f(value);
            }
            Stmt::Return(Some(expr)) => f(expr),
            Stmt::IfElse { cond, .. } => f(cond),
            Stmt::Switch { selector, .. } => f(selector),
            Stmt::GotoIfTrue { cond, .. } | Stmt::GotoIfFalse { cond, .. } => f(cond),
            Stmt::Expr(expr) => f(expr),
            Stmt::Block(_)
            | Stmt::Return(None)
            | Stmt::Goto(_)
            | Stmt::Mark(_)
            | Stmt::Comment(_)
            | Stmt::Empty => {}
        }
    }

    /// In-place rewrite of the immediate child statements
    pub fn replace_children(&mut self, f: &mut dyn FnMut(&mut Stmt)) {
        match self {
            Stmt::Block(stmts) => {
                for stmt in stmts {
                    f(stmt);
                }
            }
            Stmt::IfElse {
                then_body,
                else_body,
                ..
            } => {
                f(then_body);
                if let Some(else_body) = else_body {
                    f(else_body);
                }
            }
            Stmt::Switch { cases, default, .. } => {
                for case in cases {
                    f(&mut case.body);
                }
                if let Some(default) = default {
                    f(default);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::expr::Expr;

    #[test]
    fn walks_nested_statements() {
        let inner = Stmt::block(vec![Stmt::Empty, Stmt::comment("note")]);
        let tree = Stmt::if_else(Expr::imm_i32(1), inner, Stmt::Empty);

        let mut count = 0;
        tree.for_each_stmt(&mut |_| count += 1);
        // if-else + block + empty + comment + else-empty
        assert_eq!(count, 5);
    }

    #[test]
    fn children_cover_branch_bodies() {
        let tree = Stmt::if_else(Expr::imm_i32(1), Stmt::Empty, Stmt::comment("else"));
        let children = tree.children();
        assert_eq!(children.len(), 2);
        assert!(matches!(children[1], Stmt::Comment(_)));

        let tree = Stmt::switch(
            Expr::imm_i32(0),
            vec![
                SwitchCase::new(Value::I32(0), Stmt::Empty),
                SwitchCase::new(Value::I32(1), Stmt::Empty),
            ],
            Some(Stmt::Empty),
        );
        assert_eq!(tree.children().len(), 3);
        assert!(Stmt::ret_void().children().is_empty());
    }

    #[test]
    fn walks_switch_bodies() {
        let tree = Stmt::switch(
            Expr::imm_i32(0),
            vec![SwitchCase::new(Value::I32(0), Stmt::Empty)],
            Some(Stmt::comment("default")),
        );
        let mut comments = 0;
        tree.for_each_stmt(&mut |stmt| {
            if matches!(stmt, Stmt::Comment(_)) {
                comments += 1;
            }
        });
        assert_eq!(comments, 1);
    }
}
