//! Generator resumption, throw, close and implicit finalization

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use bytecode_system::{BinaryOp, CodeBuilder, CodeObject, Constant, HandlerKind, Opcode, RaiseForm};
use core_types::{ExcKind, ExceptionObject, Namespace, Value};
use interpreter::{
    Generator, GeneratorOutcome, GeneratorState, Interpreter, InterpreterConfig, NativeFunction,
    VmError,
};
use pretty_assertions::assert_eq;

use crate::support::{ev, function, traced, Recorder};

/// def g():
///     try:
///         yield True
///     finally:
///         pass
fn try_finally_generator() -> Arc<CodeObject> {
    let mut b = CodeBuilder::generator("g", 2);
    b.line(3);
    b.emit(Opcode::Nop);
    b.line(4);
    let start = b.here();
    b.load_const(true);
    b.emit(Opcode::Yield);
    b.emit(Opcode::Pop);
    let end = b.here();
    b.load_const(Constant::None);
    b.line(6);
    let target = b.here();
    b.emit(Opcode::Nop);
    b.emit(Opcode::EndFinally);
    let body_end = b.here();
    b.handler(HandlerKind::Finally, (start, end), (target, body_end), 0);
    b.return_none();
    b.build().unwrap()
}

/// def f():
///     try:
///         gen = g()
///         gen.next()
///         <leave>        # gen.close() or del gen
///     except:
///         pass
fn driver(leave: impl FnOnce(&mut CodeBuilder)) -> Arc<CodeObject> {
    let mut b = CodeBuilder::function("f", 8);
    let after = b.label();
    b.line(9);
    b.emit(Opcode::Nop);
    b.line(10);
    let start = b.here();
    b.load_global("g");
    b.emit(Opcode::Call(0));
    b.store_fast("gen");
    b.line(11);
    b.load_fast("gen");
    b.load_attr("next");
    b.emit(Opcode::Call(0));
    b.emit(Opcode::Pop);
    b.line(12);
    leave(&mut b);
    let end = b.here();
    b.emit_jump(Opcode::Jump, after);
    b.line(13);
    let target = b.here();
    b.emit(Opcode::Nop);
    b.line(14);
    b.emit(Opcode::PopExcept);
    let body_end = b.here();
    b.handler(HandlerKind::Except, (start, end), (target, body_end), 0);
    b.bind(after);
    b.return_none();
    b.build().unwrap()
}

fn close_explicitly(b: &mut CodeBuilder) {
    b.load_fast("gen");
    b.load_attr("close");
    b.emit(Opcode::Call(0));
    b.emit(Opcode::Pop);
}

fn drop_handle(b: &mut CodeBuilder) {
    let slot = b.local("gen");
    b.emit(Opcode::DeleteFast(slot));
}

fn globals_with_generator() -> Namespace {
    let globals = Namespace::new();
    globals.insert("g", function(try_finally_generator(), &globals));
    globals
}

fn first_run() -> Vec<(String, u32, &'static str)> {
    vec![
        ev("f", 8, "call"),
        ev("f", 9, "line"),
        ev("f", 10, "line"),
        ev("f", 11, "line"),
        ev("g", 2, "call"),
        ev("g", 3, "line"),
        ev("g", 4, "line"),
        ev("g", 4, "return"),
        ev("f", 12, "line"),
    ]
}

fn finalization() -> Vec<(String, u32, &'static str)> {
    vec![
        ev("g", 4, "call"),
        ev("g", 4, "exception"),
        ev("g", 6, "line"),
        ev("g", 6, "return"),
    ]
}

#[test]
fn test_trace_generator_close() {
    let globals = globals_with_generator();
    let f = function(driver(close_explicitly), &globals);
    let recorder = Recorder::new();
    let mut interp = traced(&recorder);
    interp.call(&f, vec![]).unwrap();

    let mut expected = first_run();
    expected.extend(finalization());
    expected.push(ev("f", 12, "return"));
    assert_eq!(recorder.events(), expected);
}

#[test]
fn test_trace_generator_finalisation() {
    let globals = globals_with_generator();
    let f = function(driver(drop_handle), &globals);
    let recorder = Recorder::new();
    let mut interp = traced(&recorder);
    interp.call(&f, vec![]).unwrap();

    let mut expected = first_run();
    expected.extend(finalization());
    expected.push(ev("f", 12, "return"));
    assert_eq!(recorder.events(), expected);
    assert!(!interp.has_pending_finalizers());
}

#[test]
fn test_deferred_finalisation_runs_after_operation() {
    let globals = globals_with_generator();
    let f = function(driver(drop_handle), &globals);
    let recorder = Recorder::new();
    let config = InterpreterConfig::new().with_finalize_eagerly(false);
    let mut interp = Interpreter::with_config(config).unwrap();
    interp.set_global_tracer(Some(recorder.tracer()));
    interp.call(&f, vec![]).unwrap();

    let mut expected = first_run();
    expected.push(ev("f", 12, "return"));
    expected.extend(finalization());
    assert_eq!(recorder.events(), expected);
    assert!(!interp.has_pending_finalizers());
}

fn start(interp: &mut Interpreter, code: Arc<CodeObject>) -> Rc<Generator> {
    let gen_fn = function(code, &Namespace::new());
    let value = interp.call(&gen_fn, vec![]).unwrap();
    value.downcast::<Generator>().expect("generator functions return generators")
}

#[test]
fn test_send_and_exhaustion() {
    // def echo():
    //     got = yield "first"
    //     return got
    let mut b = CodeBuilder::generator("echo", 1);
    b.line(2);
    b.load_const("first");
    b.emit(Opcode::Yield);
    b.store_fast("got");
    b.line(3);
    b.load_fast("got");
    b.emit(Opcode::Return);

    let mut interp = Interpreter::new();
    let gen = start(&mut interp, b.build().unwrap());
    assert_eq!(gen.state(), GeneratorState::Created);
    assert!(!gen.frame().is_started());

    match gen.resume(&mut interp, Value::from("ignored")).unwrap() {
        GeneratorOutcome::Yielded(value) => assert_eq!(value, Value::from("first")),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(gen.state(), GeneratorState::Suspended);
    assert!(gen.frame().back().is_none());

    match gen.resume(&mut interp, Value::Int(7)).unwrap() {
        GeneratorOutcome::Exhausted(value) => assert_eq!(value, Value::Int(7)),
        other => panic!("unexpected {:?}", other),
    }
    assert!(gen.is_finished());
    assert!(gen.frame().is_finished());

    match gen.resume(&mut interp, Value::Int(8)).unwrap() {
        GeneratorOutcome::Exhausted(value) => assert!(value.is_none()),
        other => panic!("unexpected {:?}", other),
    }
}

/// def gen():
///     try:
///         yield 1
///     except ValueError:
///         yield 2
fn catching_generator() -> Arc<CodeObject> {
    let mut b = CodeBuilder::generator("catching", 1);
    let after = b.label();
    let no_match = b.label();
    b.line(2);
    b.emit(Opcode::Nop);
    b.line(3);
    let start = b.here();
    b.load_const(1i64);
    b.emit(Opcode::Yield);
    b.emit(Opcode::Pop);
    let end = b.here();
    b.emit_jump(Opcode::Jump, after);
    b.line(4);
    let target = b.here();
    b.load_global("ValueError");
    b.emit_jump(Opcode::JumpIfNotExcMatch, no_match);
    b.line(5);
    b.load_const(2i64);
    b.emit(Opcode::Yield);
    b.emit(Opcode::Pop);
    b.emit(Opcode::PopExcept);
    b.emit_jump(Opcode::Jump, after);
    b.bind(no_match);
    b.emit(Opcode::Raise(RaiseForm::Reraise));
    let body_end = b.here();
    b.handler(HandlerKind::Except, (start, end), (target, body_end), 0);
    b.bind(after);
    b.line(6);
    b.return_none();
    b.build().unwrap()
}

#[test]
fn test_throw_is_traced_as_new_raise() {
    let recorder = Recorder::new();
    let mut interp = traced(&recorder);
    let gen = start(&mut interp, catching_generator());

    assert!(matches!(
        gen.resume(&mut interp, Value::None).unwrap(),
        GeneratorOutcome::Yielded(Value::Int(1))
    ));
    let error = ExceptionObject::new(ExcKind::ValueError, vec![]);
    assert!(matches!(
        gen.throw(&mut interp, error).unwrap(),
        GeneratorOutcome::Yielded(Value::Int(2))
    ));
    gen.close(&mut interp).unwrap();
    assert_eq!(gen.state(), GeneratorState::Exhausted);

    assert_eq!(
        recorder.events_for("catching"),
        vec![
            (1, "call"),
            (2, "line"),
            (3, "line"),
            (3, "return"),
            (3, "call"),
            (3, "exception"),
            (4, "line"),
            (5, "line"),
            (5, "return"),
            (5, "call"),
            (5, "exception"),
            (5, "return"),
        ]
    );
}

#[test]
fn test_uncaught_throw_errors_the_generator() {
    let mut interp = Interpreter::new();
    let gen = start(&mut interp, catching_generator());
    gen.resume(&mut interp, Value::None).unwrap();

    let error = ExceptionObject::new(ExcKind::KeyError, vec![]);
    match gen.throw(&mut interp, error.clone()).unwrap() {
        GeneratorOutcome::Errored(exc) => assert!(Rc::ptr_eq(&exc, &error)),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(gen.state(), GeneratorState::Errored);

    let again = ExceptionObject::new(ExcKind::KeyError, vec![]);
    match gen.throw(&mut interp, again.clone()).unwrap() {
        GeneratorOutcome::Errored(exc) => assert!(Rc::ptr_eq(&exc, &again)),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_close_reports_ignored_generator_exit() {
    // try:
    //     yield 1
    // finally:
    //     yield 2
    let mut b = CodeBuilder::generator("stubborn", 1);
    b.line(2);
    let start_label = b.here();
    b.load_const(1i64);
    b.emit(Opcode::Yield);
    b.emit(Opcode::Pop);
    let end = b.here();
    b.load_const(Constant::None);
    b.line(4);
    let target = b.here();
    b.load_const(2i64);
    b.emit(Opcode::Yield);
    b.emit(Opcode::Pop);
    b.emit(Opcode::EndFinally);
    let body_end = b.here();
    b.handler(HandlerKind::Finally, (start_label, end), (target, body_end), 0);
    b.line(5);
    b.return_none();

    let mut interp = Interpreter::new();
    let gen = start(&mut interp, b.build().unwrap());
    gen.resume(&mut interp, Value::None).unwrap();
    let err = gen.close(&mut interp).unwrap_err();
    let exc = err.exception().unwrap();
    assert_eq!(exc.kind(), ExcKind::RuntimeError);
    assert_eq!(exc.message(), "generator ignored GeneratorExit");
    assert_eq!(gen.state(), GeneratorState::Suspended);
}

#[test]
fn test_close_unstarted_generator() {
    let recorder = Recorder::new();
    let mut interp = traced(&recorder);
    let gen = start(&mut interp, try_finally_generator());
    gen.close(&mut interp).unwrap();
    assert_eq!(gen.state(), GeneratorState::Exhausted);
    assert_eq!(
        recorder.events_for("g"),
        vec![(2, "call"), (2, "exception"), (2, "return")]
    );

    gen.close(&mut interp).unwrap();
    assert_eq!(recorder.events_for("g").len(), 3);
}

#[test]
fn test_resume_while_running_is_refused() {
    let observed = Rc::new(RefCell::new(Vec::new()));
    let sink = observed.clone();
    let reenter = NativeFunction::new("reenter", move |interp, args| {
        let gen = args[0].downcast::<Generator>().expect("reenter receives a generator");
        sink.borrow_mut().push(gen.state());
        let refused = matches!(
            gen.resume(interp, Value::None),
            Err(VmError::AlreadyRunning)
        );
        sink.borrow_mut().push(gen.state());
        Ok(Value::Bool(refused))
    });

    // def selfish():
    //     yield reenter(me)
    let globals = Namespace::new();
    globals.insert("reenter", Value::object(reenter));
    let mut b = CodeBuilder::generator("selfish", 1);
    b.line(2);
    b.load_global("reenter");
    b.load_global("me");
    b.emit(Opcode::Call(1));
    b.emit(Opcode::Yield);
    b.emit(Opcode::Pop);
    b.line(3);
    b.return_none();
    let gen_fn = function(b.build().unwrap(), &globals);

    let mut interp = Interpreter::new();
    let me = interp.call(&gen_fn, vec![]).unwrap();
    globals.insert("me", me.clone());
    let gen = me.downcast::<Generator>().unwrap();

    assert!(matches!(
        gen.resume(&mut interp, Value::None).unwrap(),
        GeneratorOutcome::Yielded(Value::Bool(true))
    ));
    assert_eq!(
        *observed.borrow(),
        vec![GeneratorState::Running, GeneratorState::Running]
    );
    assert_eq!(gen.state(), GeneratorState::Suspended);
    globals.remove("me");
}

#[test]
fn test_for_loop_over_generator() {
    // def count():
    //     yield 1
    //     yield 2
    let globals = Namespace::new();
    let mut g = CodeBuilder::generator("count", 1);
    g.line(2);
    g.load_const(1i64);
    g.emit(Opcode::Yield);
    g.emit(Opcode::Pop);
    g.line(3);
    g.load_const(2i64);
    g.emit(Opcode::Yield);
    g.emit(Opcode::Pop);
    g.line(4);
    g.return_none();
    globals.insert("count", function(g.build().unwrap(), &globals));

    // def consume():
    //     total = 0
    //     for x in count():
    //         total = total + x
    //     return total
    let mut b = CodeBuilder::function("consume", 10);
    let done = b.label();
    b.line(11);
    b.load_const(0i64);
    b.store_fast("total");
    b.line(12);
    b.load_global("count");
    b.emit(Opcode::Call(0));
    b.emit(Opcode::GetIter);
    let head = b.here();
    b.emit_jump(Opcode::ForIter, done);
    b.store_fast("x");
    b.line(13);
    b.load_fast("total");
    b.load_fast("x");
    b.emit(Opcode::Binary(BinaryOp::Add));
    b.store_fast("total");
    b.emit_jump(Opcode::Jump, head);
    b.line(14);
    b.bind(done);
    b.load_fast("total");
    b.emit(Opcode::Return);
    let consume = function(b.build().unwrap(), &globals);

    let recorder = Recorder::new();
    let mut interp = traced(&recorder);
    assert_eq!(interp.call(&consume, vec![]).unwrap(), Value::Int(3));
    assert_eq!(
        recorder.events_for("count"),
        vec![
            (1, "call"),
            (2, "line"),
            (2, "return"),
            (2, "call"),
            (3, "line"),
            (3, "return"),
            (3, "call"),
            (4, "line"),
            (4, "return"),
        ]
    );
    assert!(recorder
        .events()
        .iter()
        .all(|(_, _, event)| *event != "exception"));
}

#[test]
fn test_finalisation_outside_try_block_is_traced() {
    // def plain():
    //     yield 1
    let mut b = CodeBuilder::generator("plain", 1);
    b.line(2);
    b.load_const(1i64);
    b.emit(Opcode::Yield);
    b.emit(Opcode::Pop);
    b.return_none();

    let recorder = Recorder::new();
    let mut interp = traced(&recorder);
    let gen = start(&mut interp, b.build().unwrap());
    gen.resume(&mut interp, Value::None).unwrap();
    drop(gen);
    assert!(interp.has_pending_finalizers());

    interp.run_finalizers();
    assert!(!interp.has_pending_finalizers());
    assert_eq!(
        recorder.events_for("plain"),
        vec![
            (1, "call"),
            (2, "line"),
            (2, "return"),
            (2, "call"),
            (2, "exception"),
            (2, "return"),
        ]
    );
}

#[test]
fn test_dropping_interpreter_runs_pending_finally() {
    let cleanups = Rc::new(Cell::new(0));
    let counter = cleanups.clone();
    let globals = Namespace::new();
    globals.insert(
        "cleanup",
        Value::object(NativeFunction::new("cleanup", move |_, _| {
            counter.set(counter.get() + 1);
            Ok(Value::None)
        })),
    );

    // def tidy():
    //     try:
    //         yield 1
    //     finally:
    //         cleanup()
    let mut b = CodeBuilder::generator("tidy", 1);
    b.line(3);
    let start_label = b.here();
    b.load_const(1i64);
    b.emit(Opcode::Yield);
    b.emit(Opcode::Pop);
    let end = b.here();
    b.load_const(Constant::None);
    b.line(5);
    let target = b.here();
    b.load_global("cleanup");
    b.emit(Opcode::Call(0));
    b.emit(Opcode::Pop);
    b.emit(Opcode::EndFinally);
    let body_end = b.here();
    b.handler(HandlerKind::Finally, (start_label, end), (target, body_end), 0);
    b.return_none();
    let tidy = function(b.build().unwrap(), &globals);

    let mut interp = Interpreter::new();
    let gen = interp
        .call(&tidy, vec![])
        .unwrap()
        .downcast::<Generator>()
        .unwrap();
    gen.resume(&mut interp, Value::None).unwrap();
    drop(gen);
    assert!(interp.has_pending_finalizers());
    assert_eq!(cleanups.get(), 0);

    drop(interp);
    assert_eq!(cleanups.get(), 1);
}
