//! The literal input/output scenarios (spec.md §8 "Scenarios with literal
//! inputs"), run the way a consumer of the published API would: through
//! [`dojo_compiler::compile`] and [`dojo_compiler::vm::call_value`] only,
//! never reaching into the crate's internals.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use dojo_compiler::compile;
use dojo_compiler::vm::value::Value;
use dojo_compiler::vm::{call_value, Globals, VmError};

fn run(source: &str) -> Value {
    compile(source, None).unwrap_or_else(|e| panic!("{source}: {e}")).call(None).unwrap_or_else(|e| panic!("{source}: {e}"))
}

fn run_with(source: &str, globals: HashMap<String, Value>) -> Value {
    compile(source, None)
        .unwrap_or_else(|e| panic!("{source}: {e}"))
        .call(Some(globals))
        .unwrap_or_else(|e| panic!("{source}: {e}"))
}

fn list_of(values: Vec<i64>) -> Value {
    Value::List(Rc::new(RefCell::new(values.into_iter().map(Value::Int).collect())))
}

#[test]
fn scenario_1_constants_and_precedence() {
    assert_eq!(run("42+2"), Value::Int(44));
    assert_eq!(run("2+3*4"), Value::Int(14));
    assert_eq!(run("(2+3)*4"), Value::Int(20));
}

#[test]
fn scenario_2_closure_upgrade_through_nested_function() {
    let result = run("seq=/:(x=0; /: x=x+1); s=seq(); [s(),s(),s()]");
    assert_eq!(result, list_of(vec![1, 2, 3]));
}

#[test]
fn scenario_3_short_circuit_and() {
    let calls = Rc::new(RefCell::new(0));
    let make_counter = |calls: Rc<RefCell<i32>>| {
        Value::Native(Rc::new(move |_args: &[Value], _kwargs: &[(String, Value)], _g: &Globals| {
            *calls.borrow_mut() += 1;
            Ok(Value::Bool(true))
        }))
    };

    let mut g = HashMap::new();
    g.insert("f".to_string(), make_counter(calls.clone()));
    assert_eq!(run_with("2+2==5 and f()", g), Value::Bool(false));
    assert_eq!(*calls.borrow(), 0, "f must not be called once the left side is already false");

    let calls = Rc::new(RefCell::new(0));
    let mut g = HashMap::new();
    g.insert("f".to_string(), make_counter(calls.clone()));
    assert_eq!(run_with("2+2==4 and f()", g), Value::Bool(true));
    assert_eq!(*calls.borrow(), 1);
}

#[test]
fn scenario_4_lf_sensitivity() {
    assert_eq!(run("4\n-2"), Value::Int(-2));
    assert_eq!(run("4-2"), Value::Int(2));
}

#[test]
fn scenario_5_pipe_partial_and_compose_over_a_range() {
    let filter = Value::Native(Rc::new(|args: &[Value], _kwargs: &[(String, Value)], globals: &Globals| {
        let [predicate, iterable] = args else {
            return Err(VmError::TypeMismatch("a predicate and an iterable", "wrong arity"));
        };
        let mut kept = Vec::new();
        for item in iterable.to_vec()? {
            if call_value(predicate, vec![item.clone()], Vec::new(), globals)?.truthy() {
                kept.push(item);
            }
        }
        Ok(Value::List(Rc::new(RefCell::new(kept))))
    }));
    let list_builtin = Value::Native(Rc::new(|args: &[Value], _kwargs: &[(String, Value)], _g: &Globals| {
        let [iterable] = args else {
            return Err(VmError::TypeMismatch("a single iterable", "wrong arity"));
        };
        Ok(Value::List(Rc::new(RefCell::new(iterable.to_vec()?))))
    }));

    let mut g = HashMap::new();
    g.insert("filter".to_string(), filter);
    g.insert("list".to_string(), list_builtin);

    let result = run_with("1..20 |> filter{/x:x%2==0} |> list", g);
    assert_eq!(result, list_of(vec![2, 4, 6, 8, 10, 12, 14, 16, 18]));
}

#[test]
fn scenario_6_recursion_and_boolean_fibonacci() {
    assert_eq!(run("def fib(n): n<=2 and 1 or fib(n-1)+fib(n-2); fib(10)"), Value::Int(55));
}

#[test]
fn set_subscript_lowering_matches_the_chosen_codegen_form() {
    assert_eq!(run("a=[1,2,3,4]; a[2]=42; a"), list_of(vec![1, 2, 42, 4]));
}

#[test]
fn determinism_across_repeated_calls() {
    let program = compile("a=2; a*10", None).unwrap();
    assert_eq!(program.call(None).unwrap(), Value::Int(20));
    assert_eq!(program.call(None).unwrap(), Value::Int(20));
}
