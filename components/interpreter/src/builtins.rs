//! The builtins namespace.
//!
//! Introspection and tracing hooks (`settrace`, `gettrace`, `_getframe`,
//! `exc_info`, `locals`, `globals`), the iteration helpers (`iter`, `next`,
//! `len`) and every built-in exception class.

use core_types::{ExcKind, ExceptionObject, Namespace, Value};
use strum::IntoEnumIterator;

use crate::error::raise;
use crate::frame::{exception_triple, frame_value};
use crate::function::NativeFunction;
use crate::iter::make_iter;
use crate::{ops, Interpreter, RunError, RunResult};

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::None)
}

fn require(name: &str, args: &[Value], min: usize, max: usize) -> RunResult<()> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let message = if min == max {
        format!("{}() takes exactly {} arguments ({} given)", name, min, args.len())
    } else {
        format!(
            "{}() takes {} to {} arguments ({} given)",
            name,
            min,
            max,
            args.len()
        )
    };
    Err(raise(ExcKind::TypeError, message))
}

fn settrace(interp: &mut Interpreter, args: Vec<Value>) -> RunResult<Value> {
    require("settrace", &args, 1, 1)?;
    let tracer = arg(&args, 0);
    interp.set_global_tracer((!tracer.is_none()).then_some(tracer));
    Ok(Value::None)
}

fn gettrace(interp: &mut Interpreter, args: Vec<Value>) -> RunResult<Value> {
    require("gettrace", &args, 0, 0)?;
    Ok(interp.global_tracer().unwrap_or(Value::None))
}

fn getframe(interp: &mut Interpreter, args: Vec<Value>) -> RunResult<Value> {
    require("_getframe", &args, 0, 1)?;
    let depth = match args.first() {
        None => 0,
        Some(value) => value
            .as_int()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| raise(ExcKind::ValueError, "depth must be a non-negative integer"))?,
    };
    interp
        .visible_frame(depth)
        .map(|frame| frame_value(&frame))
        .ok_or_else(|| raise(ExcKind::ValueError, "call stack is not deep enough"))
}

fn exc_info(interp: &mut Interpreter, args: Vec<Value>) -> RunResult<Value> {
    require("exc_info", &args, 0, 0)?;
    Ok(match interp.exc_info() {
        Some(exc) => exception_triple(&exc),
        None => Value::tuple(vec![Value::None, Value::None, Value::None]),
    })
}

fn locals(interp: &mut Interpreter, args: Vec<Value>) -> RunResult<Value> {
    require("locals", &args, 0, 0)?;
    Ok(interp
        .visible_frame(0)
        .map(|frame| Value::Dict(frame.locals_view()))
        .unwrap_or(Value::None))
}

fn globals(interp: &mut Interpreter, args: Vec<Value>) -> RunResult<Value> {
    require("globals", &args, 0, 0)?;
    Ok(interp
        .visible_frame(0)
        .map(|frame| Value::Dict(frame.globals_view()))
        .unwrap_or(Value::None))
}

fn next(interp: &mut Interpreter, args: Vec<Value>) -> RunResult<Value> {
    require("next", &args, 1, 2)?;
    match interp.next_item(&args[0])? {
        Some(item) => Ok(item),
        None if args.len() == 2 => Ok(arg(&args, 1)),
        None => Err(RunError::Raise(ExceptionObject::new(
            ExcKind::StopIteration,
            Vec::new(),
        ))),
    }
}

fn iter(_: &mut Interpreter, args: Vec<Value>) -> RunResult<Value> {
    require("iter", &args, 1, 1)?;
    make_iter(arg(&args, 0))
}

fn len(_: &mut Interpreter, args: Vec<Value>) -> RunResult<Value> {
    require("len", &args, 1, 1)?;
    let n = ops::length(&args[0])?;
    Ok(Value::Int(i64::try_from(n).unwrap_or(i64::MAX)))
}

/// Build a fresh builtins namespace.
pub(crate) fn namespace() -> Namespace {
    let ns = Namespace::new();
    let natives: [(&str, fn(&mut Interpreter, Vec<Value>) -> RunResult<Value>); 9] = [
        ("settrace", settrace),
        ("gettrace", gettrace),
        ("_getframe", getframe),
        ("exc_info", exc_info),
        ("locals", locals),
        ("globals", globals),
        ("next", next),
        ("iter", iter),
        ("len", len),
    ];
    for (name, func) in natives {
        ns.insert(name, Value::object(NativeFunction::new(name, func)));
    }
    ns.insert("None", Value::None);
    ns.insert("True", Value::Bool(true));
    ns.insert("False", Value::Bool(false));
    for kind in ExcKind::iter() {
        ns.insert(kind.name(), Value::ExceptionType(kind));
    }
    ns
}
