//! Integration tests for the code generation pipeline
//!
//! End-to-end scenarios driving the public surface: statement trees compiled
//! into callable units, the fluent verifying emitter, and the textual trace.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use opforge_core::ast::{BinOp, Expr, Local, Stmt, SwitchCase};
use opforge_core::codegen::{CodegenError, Compiler, Emitter, Label, SwitchStrategy};
use opforge_core::sig::{Callee, FieldDesc};
use opforge_core::testutil::{run_int, run_unit, trace_stmt};
use opforge_core::types::ValueType;
use opforge_core::value::Value;
use opforge_core::vm::{CompiledUnit, UnitBuilder};

fn compile_switcher(strategy: SwitchStrategy, body: &Stmt) -> CompiledUnit {
    let builder = UnitBuilder::new("switcher")
        .param(ValueType::I32)
        .returns(ValueType::I32);
    let mut unit = builder.begin();
    Compiler::new(ValueType::I32, &mut unit)
        .with_switch_strategy(strategy)
        .compile(body)
        .unwrap();
    builder.finish(unit).unwrap()
}

#[test]
fn adder_round_trips_with_integer_wrapping() {
    let body = Stmt::ret(Expr::binary(
        Expr::arg(0, ValueType::I32),
        BinOp::Add,
        Expr::arg(1, ValueType::I32),
    ));
    let params = [ValueType::I32, ValueType::I32];

    for (a, b) in [(1, 2), (-5, 7), (100, -100)] {
        assert_eq!(
            run_int(&params, &ValueType::I32, &body, &[Value::I32(a), Value::I32(b)]).unwrap(),
            i64::from(a + b)
        );
    }

    // Results wrap at the declared 32-bit width
    assert_eq!(
        run_int(
            &params,
            &ValueType::I32,
            &body,
            &[Value::I32(i32::MAX), Value::I32(1)]
        )
        .unwrap(),
        i64::from(i32::MIN)
    );
}

#[test]
fn switch_selects_cases_and_default_on_both_paths() {
    let result = Local::new("value", ValueType::I32);
    let store = |v: i32| Stmt::assign(Expr::local(&result), Expr::imm_i32(v));
    let body = Stmt::block(vec![
        Stmt::assign(Expr::local(&result), Expr::imm_i32(-33)),
        Stmt::switch(
            Expr::arg(0, ValueType::I32),
            vec![
                SwitchCase::new(Value::I32(0), store(0)),
                SwitchCase::new(Value::I32(2), store(2)),
                SwitchCase::new(Value::I32(3), store(3)),
            ],
            Some(store(-99)),
        ),
        Stmt::ret(Expr::local(&result)),
    ]);

    let dense = compile_switcher(SwitchStrategy::Auto, &body);
    let chain = compile_switcher(SwitchStrategy::LinearChain, &body);

    let expected = [-99, 0, -99, 2, 3, -99];
    for (input, expected) in [-1, 0, 1, 2, 3, 4].into_iter().zip(expected) {
        assert_eq!(
            dense.invoke(&[Value::I32(input)]).unwrap(),
            Value::I32(expected),
            "dense, selector {input}"
        );
        assert_eq!(
            chain.invoke(&[Value::I32(input)]).unwrap(),
            Value::I32(expected),
            "chain, selector {input}"
        );
    }

    // Both paths also agree far outside the case range
    for input in [i32::MIN, -4096, 4096, i32::MAX] {
        assert_eq!(
            dense.invoke(&[Value::I32(input)]).unwrap(),
            chain.invoke(&[Value::I32(input)]).unwrap(),
            "selector {input}"
        );
    }
}

#[test]
fn unmarked_label_fails_both_compile_paths() {
    let exit = Label::new("exit");
    let body = Stmt::block(vec![Stmt::Goto(exit), Stmt::ret_void()]);

    let mut compiler = Compiler::trace_only(ValueType::Void);
    assert_eq!(
        compiler.compile(&body).unwrap_err(),
        CodegenError::LabelNotMarked("exit".to_string())
    );

    let builder = UnitBuilder::new("unmarked");
    let mut unit = builder.begin();
    assert_eq!(
        Compiler::new(ValueType::Void, &mut unit)
            .compile(&body)
            .unwrap_err(),
        CodegenError::LabelNotMarked("exit".to_string())
    );
}

#[test]
fn field_assignment_evaluates_instance_before_value() {
    let order = Rc::new(RefCell::new(Vec::new()));
    let x = FieldDesc::instance("x", ValueType::I32);
    let target = Rc::new(RefCell::new(HashMap::new()));

    let make = {
        let order = order.clone();
        let target = target.clone();
        Callee::function(
            "make",
            vec![],
            ValueType::Ref("Point".to_string()),
            move |_| {
                order.borrow_mut().push("instance");
                Value::Obj(target.clone())
            },
        )
    };
    let produce = {
        let order = order.clone();
        Callee::function("produce", vec![], ValueType::I32, move |_| {
            order.borrow_mut().push("value");
            Value::I32(5)
        })
    };

    let body = Stmt::block(vec![
        Stmt::assign(
            Expr::field(Expr::call_static(&make, vec![]), &x),
            Expr::call_static(&produce, vec![]),
        ),
        Stmt::ret_void(),
    ]);
    run_unit(&[], &ValueType::Void, &body, &[]).unwrap();

    assert_eq!(*order.borrow(), vec!["instance", "value"]);
    assert_eq!(target.borrow().get("x"), Some(&Value::I32(5)));
}

#[test]
fn trace_lists_instructions_comments_and_labels() {
    let a = Expr::arg(0, ValueType::I32);
    let body = Stmt::block(vec![
        Stmt::comment("absolute value"),
        Stmt::if_else(
            Expr::binary(a.clone(), BinOp::Lt, Expr::imm_i32(0)),
            Stmt::ret(Expr::unary(opforge_core::ast::UnOp::Neg, a.clone())),
            Stmt::ret(a),
        ),
    ]);
    let lines = trace_stmt(&ValueType::I32, &body).unwrap();
    assert_eq!(
        lines,
        vec![
            "; absolute value",
            "  LOAD_ARG_0",
            "  LOAD_CONST_0",
            "  CMP_LT",
            "  BRANCH_IF_FALSE AfterIf",
            "  LOAD_ARG_0",
            "  NEG",
            "  RET",
            "  BRANCH AfterElse",
            "Label_AfterIf:;",
            "  LOAD_ARG_0",
            "  RET",
            "Label_AfterElse:;",
        ]
    );
}

#[test]
fn fluent_and_tree_front_ends_agree() {
    // a * 2 + b, once as a tree and once through the emitter
    let tree_body = Stmt::ret(Expr::binary(
        Expr::binary(Expr::arg(0, ValueType::I32), BinOp::Mul, Expr::imm_i32(2)),
        BinOp::Add,
        Expr::arg(1, ValueType::I32),
    ));
    let params = [ValueType::I32, ValueType::I32];

    let builder = UnitBuilder::new("fluent")
        .param(ValueType::I32)
        .param(ValueType::I32)
        .returns(ValueType::I32);
    let mut emitter = Emitter::new(
        builder.begin(),
        builder.params().to_vec(),
        builder.ret_ty().clone(),
    );
    emitter.load_arg(0).unwrap();
    emitter.push_i32(2);
    emitter.binary_op(BinOp::Mul).unwrap();
    emitter.load_arg(1).unwrap();
    emitter.binary_op(BinOp::Add).unwrap();
    emitter.ret().unwrap();
    let fluent = builder.finish(emitter.finalize().unwrap()).unwrap();

    for (a, b) in [(0, 0), (3, 4), (-7, 1)] {
        let from_tree = run_int(
            &params,
            &ValueType::I32,
            &tree_body,
            &[Value::I32(a), Value::I32(b)],
        )
        .unwrap();
        let from_fluent = fluent.invoke(&[Value::I32(a), Value::I32(b)]).unwrap();
        assert_eq!(from_fluent, Value::I32(i32::try_from(from_tree).unwrap()));
    }
}

#[test]
fn capture_inspects_a_path_without_disturbing_the_unit() {
    let builder = UnitBuilder::new("speculate")
        .param(ValueType::I32)
        .returns(ValueType::I32);
    let mut emitter = Emitter::new(
        builder.begin(),
        builder.params().to_vec(),
        builder.ret_ty().clone(),
    );
    emitter.load_arg(0).unwrap();

    // Size up a speculative continuation before committing to anything
    let shape = emitter
        .capture(|e| {
            e.push_i32(10);
            e.binary_op(BinOp::Mul)
        })
        .unwrap();
    assert_eq!(shape.len(), 1);
    assert_eq!(shape.peek(), Some(&ValueType::I32));
    assert_eq!(emitter.stack().len(), 1);

    emitter.ret().unwrap();
    let compiled = builder.finish(emitter.finalize().unwrap()).unwrap();
    assert_eq!(compiled.invoke(&[Value::I32(7)]).unwrap(), Value::I32(7));
}
