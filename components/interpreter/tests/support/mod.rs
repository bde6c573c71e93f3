//! Shared fixtures: a recording tracer and small code-building helpers.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use bytecode_system::CodeObject;
use core_types::{Namespace, Value};
use interpreter::{Frame, FrameRef, Function, Interpreter, NativeFunction, RunResult};

/// `(code name, line, event)` as seen by the tracer.
pub type Event = (String, u32, &'static str);

type Hook = dyn Fn(&mut Interpreter, &FrameRef, &'static str, &Value) -> RunResult<()>;

fn event_name(name: &str) -> &'static str {
    match name {
        "call" => "call",
        "line" => "line",
        "return" => "return",
        "exception" => "exception",
        _ => "unknown",
    }
}

/// Records every event it receives. The global tracer answers each `call`
/// with a local tracer that shares the same log.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Rc<RefCell<Vec<Event>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A global tracer that only records.
    pub fn tracer(&self) -> Value {
        self.tracer_with(|_, _, _, _| Ok(()))
    }

    /// A global tracer that records, then runs `hook`.
    pub fn tracer_with(
        &self,
        hook: impl Fn(&mut Interpreter, &FrameRef, &'static str, &Value) -> RunResult<()> + 'static,
    ) -> Value {
        let hook: Rc<Hook> = Rc::new(hook);
        let events = self.events.clone();
        let record = Rc::new(move |interp: &mut Interpreter, args: Vec<Value>| -> RunResult<()> {
            let frame = args[0]
                .downcast::<Frame>()
                .expect("trace callbacks receive a frame");
            let event = event_name(args[1].as_str().unwrap_or(""));
            events
                .borrow_mut()
                .push((frame.code().name().to_string(), frame.current_line(), event));
            (*hook)(interp, &frame, event, &args[2])
        });

        let local_record = record.clone();
        let local = Value::object(NativeFunction::new("local_tracer", move |interp, args| {
            (*local_record)(interp, args)?;
            Ok(Value::None)
        }));
        Value::object(NativeFunction::new("global_tracer", move |interp, args| {
            (*record)(interp, args)?;
            Ok(local.clone())
        }))
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    /// Events of one code object as `(line, event)`.
    pub fn events_for(&self, code: &str) -> Vec<(u32, &'static str)> {
        self.events
            .borrow()
            .iter()
            .filter(|(name, _, _)| name == code)
            .map(|(_, line, event)| (*line, *event))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }
}

pub fn ev(code: &str, line: u32, event: &'static str) -> Event {
    (code.to_string(), line, event)
}

pub fn function(code: Arc<CodeObject>, globals: &Namespace) -> Value {
    Value::object(Function::new(code, globals.clone()))
}

/// Interpreter with `recorder` installed as the global tracer.
pub fn traced(recorder: &Recorder) -> Interpreter {
    let mut interp = Interpreter::new();
    interp.set_global_tracer(Some(recorder.tracer()));
    interp
}
