//! Unit tests for interpreter components

use std::rc::Rc;
use std::sync::Arc;

use bytecode_system::{BinaryOp, CodeBuilder, CodeObject, CompareOp, Opcode};
use core_types::{ExcKind, Namespace, Value};
use interpreter::{
    ops, ConfigError, Environment, Function, GeneratorOutcome, GeneratorState, Interpreter,
    InterpreterConfig, RunError, ValueStack, VmError, DEFAULT_RECURSION_LIMIT,
};

fn function(code: Arc<CodeObject>, globals: &Namespace) -> Value {
    Value::object(Function::new(code, globals.clone()))
}

fn raised_kind(result: Result<Value, RunError>) -> ExcKind {
    result
        .unwrap_err()
        .exception()
        .map(|exc| exc.kind())
        .expect("a language-level exception")
}

// ============================================================================
// Interpreter Tests
// ============================================================================

#[test]
fn test_run_module_binds_names() {
    // x = 6 * 7
    // return x
    let mut b = CodeBuilder::module("<module>", 1);
    b.line(1);
    b.load_const(6i64);
    b.load_const(7i64);
    b.emit(Opcode::Binary(BinaryOp::Mul));
    b.store_name("x");
    b.line(2);
    b.load_name("x");
    b.emit(Opcode::Return);

    let globals = Namespace::new();
    let mut interp = Interpreter::new();
    let result = interp.run_module(&b.build().unwrap(), &globals).unwrap();
    assert_eq!(result, Value::Int(42));
    assert_eq!(globals.get("x"), Some(Value::Int(42)));
    assert!(interp.current_frame().is_none());
}

#[test]
fn test_module_defines_and_calls_function() {
    // def double(n): return n + n
    let mut inner = CodeBuilder::function("double", 1).param("n");
    inner.line(1);
    inner.load_fast("n");
    inner.load_fast("n");
    inner.emit(Opcode::Binary(BinaryOp::Add));
    inner.emit(Opcode::Return);

    // result = double(21)
    let mut b = CodeBuilder::module("<module>", 1);
    b.line(1);
    b.make_function(inner.build().unwrap());
    b.store_name("double");
    b.line(2);
    b.load_name("double");
    b.load_const(21i64);
    b.emit(Opcode::Call(1));
    b.store_name("result");
    b.line(3);
    b.return_none();

    let globals = Namespace::new();
    let mut interp = Interpreter::new();
    interp.run_module(&b.build().unwrap(), &globals).unwrap();
    assert_eq!(globals.get("result"), Some(Value::Int(42)));
}

#[test]
fn test_unbound_local() {
    let mut b = CodeBuilder::function("early", 1);
    b.line(2);
    b.load_fast("a");
    b.emit(Opcode::Return);
    let f = function(b.build().unwrap(), &Namespace::new());
    let mut interp = Interpreter::new();
    assert_eq!(raised_kind(interp.call(&f, vec![])), ExcKind::UnboundLocalError);
}

#[test]
fn test_missing_global() {
    let mut b = CodeBuilder::function("lookup", 1);
    b.line(2);
    b.load_global("nowhere");
    b.emit(Opcode::Return);
    let f = function(b.build().unwrap(), &Namespace::new());
    let mut interp = Interpreter::new();
    assert_eq!(raised_kind(interp.call(&f, vec![])), ExcKind::NameError);
}

#[test]
fn test_unpack_and_compare() {
    // a, b = (1, 2)
    // return a < b
    let mut b = CodeBuilder::function("pair", 1);
    b.line(2);
    b.load_const(1i64);
    b.load_const(2i64);
    b.emit(Opcode::BuildTuple(2));
    b.emit(Opcode::UnpackSequence(2));
    b.store_fast("a");
    b.store_fast("b");
    b.line(3);
    b.load_fast("a");
    b.load_fast("b");
    b.emit(Opcode::Compare(CompareOp::Lt));
    b.emit(Opcode::Return);
    let f = function(b.build().unwrap(), &Namespace::new());
    let mut interp = Interpreter::new();
    assert_eq!(interp.call(&f, vec![]).unwrap(), Value::Bool(true));
}

#[test]
fn test_recursion_limit_from_config() {
    let globals = Namespace::new();
    // def down(): return down()
    let mut b = CodeBuilder::function("down", 1);
    b.line(2);
    b.load_global("down");
    b.emit(Opcode::Call(0));
    b.emit(Opcode::Return);
    let down = function(b.build().unwrap(), &globals);
    globals.insert("down", down.clone());

    let config = InterpreterConfig::new().with_recursion_limit(10);
    let mut interp = Interpreter::with_config(config).unwrap();
    assert_eq!(raised_kind(interp.call(&down, vec![])), ExcKind::RecursionError);
    assert!(interp.current_frame().is_none());
    globals.remove("down");
}

#[test]
fn test_generator_creation_at_recursion_limit() {
    let globals = Namespace::new();
    // def gen(): yield 1
    let mut g = CodeBuilder::generator("gen", 1);
    g.line(2);
    g.load_const(1i64);
    g.emit(Opcode::Yield);
    g.emit(Opcode::Pop);
    g.return_none();
    globals.insert("gen", function(g.build().unwrap(), &globals));

    // def outer(): return gen()
    let mut b = CodeBuilder::function("outer", 10);
    b.line(11);
    b.load_global("gen");
    b.emit(Opcode::Call(0));
    b.emit(Opcode::Return);
    let outer = function(b.build().unwrap(), &globals);

    let config = InterpreterConfig::new().with_recursion_limit(1);
    let mut interp = Interpreter::with_config(config).unwrap();
    let created = interp.call(&outer, vec![]).unwrap();
    let generator = created.downcast::<interpreter::Generator>().unwrap();
    assert_eq!(generator.state(), GeneratorState::Created);
    globals.remove("gen");
}

#[test]
fn test_stack_underflow_is_fatal() {
    let mut b = CodeBuilder::function("broken", 1);
    b.emit(Opcode::Pop);
    b.return_none();
    let f = function(b.build().unwrap(), &Namespace::new());
    let mut interp = Interpreter::new();
    let err = interp.call(&f, vec![]).unwrap_err();
    assert!(matches!(err, RunError::Fatal(VmError::StackUnderflow)));
}

// ============================================================================
// Generator Tests
// ============================================================================

/// def echo():
///     received = yield 1
///     yield received
fn echo() -> Arc<CodeObject> {
    let mut b = CodeBuilder::generator("echo", 1);
    b.line(2);
    b.load_const(1i64);
    b.emit(Opcode::Yield);
    b.store_fast("received");
    b.line(3);
    b.load_fast("received");
    b.emit(Opcode::Yield);
    b.emit(Opcode::Pop);
    b.return_none();
    b.build().unwrap()
}

#[test]
fn test_generator_state_machine() {
    let mut interp = Interpreter::new();
    let gen_fn = function(echo(), &Namespace::new());
    let generator = interp
        .call(&gen_fn, vec![])
        .unwrap()
        .downcast::<interpreter::Generator>()
        .unwrap();
    assert_eq!(generator.state(), GeneratorState::Created);
    assert!(!generator.frame().is_started());

    let first = generator.resume(&mut interp, Value::from("ignored")).unwrap();
    assert!(matches!(first, GeneratorOutcome::Yielded(Value::Int(1))));
    assert_eq!(generator.state(), GeneratorState::Suspended);

    let second = generator.resume(&mut interp, Value::from("echoed")).unwrap();
    assert!(matches!(second, GeneratorOutcome::Yielded(ref v) if *v == Value::from("echoed")));

    let last = generator.resume(&mut interp, Value::None).unwrap();
    assert!(matches!(last, GeneratorOutcome::Exhausted(Value::None)));
    assert_eq!(generator.state(), GeneratorState::Exhausted);
    assert!(generator.is_finished());
    assert!(generator.state().is_terminal());

    let again = generator.resume(&mut interp, Value::None).unwrap();
    assert!(matches!(again, GeneratorOutcome::Exhausted(Value::None)));
}

#[test]
fn test_next_builtin_raises_stop_iteration_when_exhausted() {
    let globals = Namespace::new();
    globals.insert("echo", function(echo(), &globals));

    // it = echo(); next(it); next(it); next(it)
    let mut b = CodeBuilder::function("drain", 10);
    b.line(11);
    b.load_global("echo");
    b.emit(Opcode::Call(0));
    b.store_fast("it");
    for _ in 0..3 {
        b.load_global("next");
        b.load_fast("it");
        b.emit(Opcode::Call(1));
        b.emit(Opcode::Pop);
    }
    b.return_none();
    let drain = function(b.build().unwrap(), &globals);

    let mut interp = Interpreter::new();
    assert_eq!(raised_kind(interp.call(&drain, vec![])), ExcKind::StopIteration);
    globals.remove("echo");
}

// ============================================================================
// Value Stack Tests
// ============================================================================

#[test]
fn test_value_stack_order() {
    let mut stack = ValueStack::with_capacity(4);
    assert!(stack.is_empty());
    for i in 0..5 {
        stack.push(Value::Int(i));
    }
    assert_eq!(stack.len(), 5);
    assert_eq!(stack.peek(0).unwrap(), &Value::Int(4));
    assert_eq!(stack.peek(4).unwrap(), &Value::Int(0));
    assert_eq!(stack.peek(5), Err(VmError::StackUnderflow));

    let top_two = stack.pop_n(2).unwrap();
    assert_eq!(top_two, vec![Value::Int(3), Value::Int(4)]);
    stack.truncate(1);
    assert_eq!(stack.pop().unwrap(), Value::Int(0));
    assert_eq!(stack.pop(), Err(VmError::StackUnderflow));
}

// ============================================================================
// Environment Tests
// ============================================================================

fn names(list: &[&str]) -> Rc<[Rc<str>]> {
    list.iter().map(|n| Rc::from(*n)).collect()
}

#[test]
fn test_fast_environment_binds_by_slot() {
    let globals = Namespace::new();
    let builtins = Namespace::new();
    builtins.insert("len", Value::Int(0));
    let mut env = Environment::fast(
        names(&["a", "b"]),
        vec![None, None],
        globals.clone(),
        builtins,
    );

    env.bind("a", Value::Int(1));
    assert_eq!(env.load_fast(0), Some(Value::Int(1)));
    assert_eq!(env.lookup("a"), Ok(Value::Int(1)));
    assert!(env.lookup("b").is_err());
    assert_eq!(env.lookup("len"), Ok(Value::Int(0)));

    // Names without a slot fall through to globals.
    env.bind("elsewhere", Value::Int(2));
    assert_eq!(globals.get("elsewhere"), Some(Value::Int(2)));

    assert!(env.delete_fast(0));
    assert!(!env.delete_fast(0));
    assert!(env.delete("a").is_err());
}

#[test]
fn test_view_follows_slots_and_writes_back() {
    let mut env = Environment::fast(
        names(&["a"]),
        vec![Some(Value::Int(1))],
        Namespace::new(),
        Namespace::new(),
    );
    assert!(!env.is_materialized());
    let view = env.materialize_locals();
    assert!(env.is_materialized());
    assert_eq!(view.get("a"), Some(Value::Int(1)));

    env.store_fast(0, Value::Int(2));
    env.refresh_view();
    assert_eq!(view.get("a"), Some(Value::Int(2)));

    view.remove("a");
    env.sync_back_from_locals();
    assert_eq!(env.load_fast(0), None);
}

// ============================================================================
// Configuration Tests
// ============================================================================

#[test]
fn test_config_builder() {
    let config = InterpreterConfig::default()
        .with_stack_capacity(64)
        .with_finalize_eagerly(false);
    assert_eq!(config.recursion_limit, DEFAULT_RECURSION_LIMIT);
    assert_eq!(config.stack_capacity, 64);
    assert!(!config.finalize_eagerly);
}

#[test]
fn test_zero_recursion_limit_rejected() {
    let config = InterpreterConfig::new().with_recursion_limit(0);
    assert_eq!(
        Interpreter::with_config(config).unwrap_err(),
        ConfigError::ZeroRecursionLimit
    );
}

// ============================================================================
// Operator Tests
// ============================================================================

#[test]
fn test_integer_division_rounds_toward_negative_infinity() {
    let div = |a, b| ops::binary(BinaryOp::FloorDiv, &Value::Int(a), &Value::Int(b)).unwrap();
    let rem = |a, b| ops::binary(BinaryOp::Mod, &Value::Int(a), &Value::Int(b)).unwrap();
    assert_eq!(div(7, 2), Value::Int(3));
    assert_eq!(div(-7, 2), Value::Int(-4));
    assert_eq!(div(7, -2), Value::Int(-4));
    assert_eq!(rem(-7, 2), Value::Int(1));
    assert_eq!(rem(7, -2), Value::Int(-1));
}

#[test]
fn test_division_by_zero_raises() {
    for op in [BinaryOp::Div, BinaryOp::FloorDiv, BinaryOp::Mod] {
        let err = ops::binary(op, &Value::Int(1), &Value::Int(0)).unwrap_err();
        assert_eq!(err.exception().unwrap().kind(), ExcKind::ZeroDivisionError);
    }
}

#[test]
fn test_membership_and_length() {
    let items = Value::tuple(vec![Value::Int(1), Value::from("two")]);
    assert!(ops::compare(CompareOp::In, &Value::from("two"), &items).unwrap());
    assert!(ops::compare(CompareOp::NotIn, &Value::Int(3), &items).unwrap());
    assert_eq!(ops::length(&items).unwrap(), 2);
    assert_eq!(
        ops::length(&Value::Int(1)).unwrap_err().exception().unwrap().kind(),
        ExcKind::TypeError
    );
}

#[test]
fn test_mismatched_operands() {
    let err = ops::binary(BinaryOp::Sub, &Value::from("a"), &Value::Int(1)).unwrap_err();
    assert_eq!(err.exception().unwrap().kind(), ExcKind::TypeError);
    assert_eq!(
        ops::binary(BinaryOp::Mul, &Value::from("ab"), &Value::Int(2)).unwrap(),
        Value::from("abab")
    );
}
