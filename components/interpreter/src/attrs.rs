//! Attribute access on interpreter-owned objects.
//!
//! Frames, generators, functions, code objects and exceptions expose a
//! fixed set of attributes to bytecode. Only a frame's `f_lineno` and
//! `f_trace` are writable.

use std::rc::Rc;

use core_types::{ExcKind, Value};

use crate::error::{raise, to_exception};
use crate::frame::{frame_value, traceback_value, Frame};
use crate::function::{CodeValue, Function, NativeFunction};
use crate::generator::Generator;
use crate::{Interpreter, RunError, RunResult};

fn no_attribute(target: &Value, name: &str) -> RunError {
    raise(
        ExcKind::AttributeError,
        format!("'{}' object has no attribute '{}'", target.type_name(), name),
    )
}

fn read_only(target: &Value, name: &str) -> RunError {
    raise(
        ExcKind::AttributeError,
        format!(
            "attribute '{}' of '{}' objects is not writable",
            name,
            target.type_name()
        ),
    )
}

const FRAME_ATTRS: &[&str] = &[
    "f_lineno",
    "f_back",
    "f_code",
    "f_locals",
    "f_globals",
    "f_builtins",
    "f_trace",
    "f_exc_info",
    "f_exc_type",
    "f_exc_value",
    "f_exc_traceback",
];

fn optional(value: Option<Value>) -> Value {
    value.unwrap_or(Value::None)
}

fn frame_attr(frame: &Rc<Frame>, name: &str) -> Option<Value> {
    let exc_info = || frame.exc_info();
    Some(match name {
        "f_lineno" => Value::Int(i64::from(frame.current_line())),
        "f_back" => optional(frame.back_visible().as_ref().map(frame_value)),
        "f_code" => Value::object(Rc::new(CodeValue(frame.code().clone()))),
        "f_locals" => Value::Dict(frame.locals_view()),
        "f_globals" => Value::Dict(frame.globals_view()),
        "f_builtins" => Value::Dict(frame.env().borrow().builtins().clone()),
        "f_trace" => optional(frame.trace_fn()),
        "f_exc_info" => optional(frame.exception_state()),
        "f_exc_type" => optional(exc_info().map(|e| Value::ExceptionType(e.kind()))),
        "f_exc_value" => optional(exc_info().map(Value::Exception)),
        "f_exc_traceback" => optional(exc_info().map(|e| traceback_value(&e))),
        _ => return None,
    })
}

fn generator_method(generator: &Rc<Generator>, name: &str) -> Option<Value> {
    let gen = Rc::clone(generator);
    let method = match name {
        "next" => NativeFunction::new("next", move |interp, _| gen.send(interp, Value::None)),
        "send" => NativeFunction::new("send", move |interp, args| {
            let value = args.into_iter().next().unwrap_or(Value::None);
            gen.send(interp, value)
        }),
        "throw" => NativeFunction::new("throw", move |interp, args| {
            let mut args = args.into_iter();
            let first = args.next().unwrap_or(Value::None);
            let exc = match (first, args.next()) {
                (Value::ExceptionType(_), Some(Value::Exception(instance))) => instance,
                (first, _) => to_exception(first)?,
            };
            gen.throw_value(interp, exc)
        }),
        "close" => NativeFunction::new("close", move |interp, _| {
            gen.close(interp)?;
            Ok(Value::None)
        }),
        _ => return None,
    };
    Some(Value::object(method))
}

impl Interpreter {
    /// `target.name`.
    pub(crate) fn get_attr(&mut self, target: &Value, name: &str) -> RunResult<Value> {
        let found = if let Some(frame) = target.downcast::<Frame>() {
            frame_attr(&frame, name)
        } else if let Some(generator) = target.downcast::<Generator>() {
            match name {
                "gi_running" => Some(Value::Bool(generator.is_running())),
                "gi_frame" => Some(if generator.is_finished() {
                    Value::None
                } else {
                    frame_value(generator.frame())
                }),
                _ => generator_method(&generator, name),
            }
        } else if let Some(function) = target.downcast::<Function>() {
            match name {
                "__name__" => Some(Value::from(function.name())),
                "func_code" | "__code__" => {
                    Some(Value::object(Rc::new(CodeValue(function.code().clone()))))
                }
                "func_globals" => Some(Value::Dict(function.globals().clone())),
                _ => None,
            }
        } else if let Some(native) = target.downcast::<NativeFunction>() {
            (name == "__name__").then(|| Value::from(native.name()))
        } else if let Some(code) = target.downcast::<CodeValue>() {
            let code = &code.0;
            match name {
                "co_name" => Some(Value::from(code.name())),
                "co_firstlineno" => Some(Value::Int(i64::from(code.first_line()))),
                "co_argcount" => Some(Value::Int(i64::from(code.argcount()))),
                "co_varnames" => Some(Value::tuple(
                    code.varnames().iter().map(|n| Value::from(n.as_str())).collect(),
                )),
                _ => None,
            }
        } else {
            match (target, name) {
                (Value::Exception(exc), "args") => Some(Value::tuple(exc.args().to_vec())),
                (Value::Exception(exc), "message") => Some(Value::from(exc.message())),
                (Value::ExceptionType(kind), "__name__") => Some(Value::from(kind.name())),
                _ => None,
            }
        };
        found.ok_or_else(|| no_attribute(target, name))
    }

    /// `target.name = value`.
    pub(crate) fn set_attr(&mut self, target: &Value, name: &str, value: Value) -> RunResult<()> {
        let Some(frame) = target.downcast::<Frame>() else {
            return Err(no_attribute(target, name));
        };
        match name {
            "f_lineno" => {
                let line = value
                    .as_int()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| raise(ExcKind::ValueError, "lineno must be an integer"))?;
                frame.set_line(line).map_err(RunError::Fatal)
            }
            "f_trace" => {
                if value.is_none() {
                    frame.clear_trace_fn();
                } else {
                    frame.set_trace_fn(value);
                }
                Ok(())
            }
            _ if FRAME_ATTRS.contains(&name) => Err(read_only(target, name)),
            _ => Err(no_attribute(target, name)),
        }
    }

    /// `del target.name`.
    pub(crate) fn del_attr(&mut self, target: &Value, name: &str) -> RunResult<()> {
        match target.downcast::<Frame>() {
            Some(frame) if name == "f_trace" => {
                frame.clear_trace_fn();
                Ok(())
            }
            Some(_) if FRAME_ATTRS.contains(&name) => Err(read_only(target, name)),
            Some(_) => Err(no_attribute(target, name)),
            None => Err(no_attribute(target, name)),
        }
    }
}
