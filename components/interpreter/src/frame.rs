//! Activation records.
//!
//! A [`Frame`] is shared (`Rc`) between the interpreter's call chain,
//! generators, tracebacks and trace callbacks, so every mutable field uses
//! interior mutability. Borrows are never held across a call back into the
//! interpreter.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use bytecode_system::{CodeObject, HandlerKind};
use core_types::{ExceptionRef, Namespace, Object, TracebackEntry, Value};

use crate::environment::Environment;
use crate::stack::ValueStack;
use crate::VmError;

/// Shared handle to a frame.
pub type FrameRef = Rc<Frame>;

/// An `except` body in progress: the exception it displaced from
/// `exc_info` and the stack slot holding the caught exception.
#[derive(Debug)]
struct HandledSlot {
    saved: Option<ExceptionRef>,
    slot: usize,
}

/// One activation record.
pub struct Frame {
    code: Arc<CodeObject>,
    env: RefCell<Environment>,
    stack: RefCell<ValueStack>,
    ip: Cell<u32>,
    lasti: Cell<Option<u32>>,
    line: Cell<u32>,
    back: RefCell<Weak<Frame>>,
    exc_info: RefCell<Option<ExceptionRef>>,
    handled: RefCell<Vec<HandledSlot>>,
    trace_fn: RefCell<Option<Value>>,
    hidden: bool,
    finished: Cell<bool>,
    at_line_event: Cell<bool>,
}

impl Frame {
    /// Create a frame that has not executed anything yet.
    ///
    /// The frame is hidden when `hidden` is set or its code carries the
    /// `HIDDEN` flag.
    pub fn make(
        code: Arc<CodeObject>,
        env: Environment,
        back: Option<&FrameRef>,
        hidden: bool,
        stack_capacity: usize,
    ) -> FrameRef {
        let hidden = hidden || code.is_hidden();
        let line = code.first_line();
        Rc::new(Self {
            code,
            env: RefCell::new(env),
            stack: RefCell::new(ValueStack::with_capacity(stack_capacity)),
            ip: Cell::new(0),
            lasti: Cell::new(None),
            line: Cell::new(line),
            back: RefCell::new(back.map(Rc::downgrade).unwrap_or_default()),
            exc_info: RefCell::new(None),
            handled: RefCell::new(Vec::new()),
            trace_fn: RefCell::new(None),
            hidden,
            finished: Cell::new(false),
            at_line_event: Cell::new(false),
        })
    }

    /// The code being executed.
    pub fn code(&self) -> &Arc<CodeObject> {
        &self.code
    }

    /// Source line the frame is at.
    ///
    /// Stable between instructions: it only moves when execution reaches
    /// the start of a line. Before the first instruction it is the code's
    /// first line.
    pub fn current_line(&self) -> u32 {
        self.line.get()
    }

    /// Offset of the next instruction to execute.
    pub fn ip(&self) -> u32 {
        self.ip.get()
    }

    /// Offset of the instruction executed last, or `None` before the first.
    pub fn lasti(&self) -> Option<u32> {
        self.lasti.get()
    }

    /// Returns whether the frame has started executing.
    pub fn is_started(&self) -> bool {
        self.lasti.get().is_some()
    }

    /// Returns whether the frame is hidden from tracing and introspection.
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Returns whether the frame has returned or raised out.
    pub fn is_finished(&self) -> bool {
        self.finished.get()
    }

    /// The caller, if it is still alive.
    pub fn back(&self) -> Option<FrameRef> {
        self.back.borrow().upgrade()
    }

    /// The nearest caller that is not hidden.
    pub fn back_visible(&self) -> Option<FrameRef> {
        let mut current = self.back();
        while let Some(frame) = current {
            if !frame.is_hidden() {
                return Some(frame);
            }
            current = frame.back();
        }
        None
    }

    /// Move the frame to the first instruction of `line`.
    ///
    /// Only allowed while the frame is stopped at a `line` trace event.
    ///
    /// # Errors
    ///
    /// [`VmError::IllegalLineJump`] when the frame is not at a line event,
    /// no instruction starts `line`, the frame is inside a `finally` body,
    /// the jump would enter or leave a handler body, or the operand stack
    /// depth at the target differs from the current one. The frame is left
    /// untouched.
    pub fn set_line(&self, line: u32) -> Result<(), VmError> {
        let illegal = |reason| VmError::IllegalLineJump { line, reason };
        if !self.at_line_event.get() {
            return Err(illegal("only allowed from a line trace event"));
        }
        let target = self
            .code
            .line_table()
            .first_offset_of(line)
            .ok_or_else(|| illegal("no code starts at that line"))?;
        let current = self.ip.get();
        let handlers = self.code.handlers();
        if handlers
            .iter()
            .any(|h| h.kind == HandlerKind::Finally && h.in_body(current))
        {
            return Err(illegal("cannot jump from inside a finally block"));
        }
        if handlers
            .iter()
            .any(|h| h.in_body(current) != h.in_body(target))
        {
            return Err(illegal("cannot jump into or out of an exception handler"));
        }
        let flow = self.code.flow()?;
        if flow.depth_at(target) != Some(self.stack_len() as u32) {
            return Err(illegal("operand stack depth differs at the target"));
        }
        self.ip.set(target);
        self.line.set(line);
        Ok(())
    }

    /// The visible locals mapping, materialized on first use.
    pub fn locals_view(&self) -> Namespace {
        self.env.borrow_mut().materialize_locals()
    }

    /// Returns whether the locals mapping has been materialized.
    pub fn has_locals_view(&self) -> bool {
        self.env.borrow().is_materialized()
    }

    /// The globals mapping.
    pub fn globals_view(&self) -> Namespace {
        self.env.borrow().globals().clone()
    }

    /// The exception this frame is currently handling, if any.
    pub fn exc_info(&self) -> Option<ExceptionRef> {
        self.exc_info.borrow().clone()
    }

    /// The `(type, value, traceback)` triple of the exception being
    /// handled, or `None`.
    pub fn exception_state(&self) -> Option<Value> {
        self.exc_info().map(|exc| exception_triple(&exc))
    }

    /// The local trace function.
    pub fn trace_fn(&self) -> Option<Value> {
        self.trace_fn.borrow().clone()
    }

    /// Install or replace the local trace function.
    pub fn set_trace_fn(&self, callback: Value) {
        *self.trace_fn.borrow_mut() = Some(callback);
    }

    /// Remove the local trace function.
    pub fn clear_trace_fn(&self) {
        self.trace_fn.borrow_mut().take();
    }

    pub(crate) fn env(&self) -> &RefCell<Environment> {
        &self.env
    }

    pub(crate) fn set_back(&self, back: Option<&FrameRef>) {
        *self.back.borrow_mut() = back.map(Rc::downgrade).unwrap_or_default();
    }

    pub(crate) fn set_ip(&self, ip: u32) {
        self.ip.set(ip);
    }

    pub(crate) fn set_lasti(&self, lasti: u32) {
        self.lasti.set(Some(lasti));
    }

    pub(crate) fn set_current_line(&self, line: u32) {
        self.line.set(line);
    }

    pub(crate) fn set_at_line_event(&self, at: bool) {
        self.at_line_event.set(at);
    }

    pub(crate) fn push(&self, value: Value) {
        self.stack.borrow_mut().push(value);
    }

    pub(crate) fn pop(&self) -> Result<Value, VmError> {
        self.stack.borrow_mut().pop()
    }

    pub(crate) fn pop_n(&self, n: usize) -> Result<Vec<Value>, VmError> {
        self.stack.borrow_mut().pop_n(n)
    }

    pub(crate) fn peek(&self, n: usize) -> Result<Value, VmError> {
        self.stack.borrow().peek(n).cloned()
    }

    pub(crate) fn stack_len(&self) -> usize {
        self.stack.borrow().len()
    }

    /// Cut the stack to `depth`, abandoning every `except` body whose
    /// caught exception lived above it.
    pub(crate) fn unwind_to(&self, depth: usize) {
        self.stack.borrow_mut().truncate(depth);
        let mut handled = self.handled.borrow_mut();
        while handled.last().is_some_and(|h| h.slot >= depth) {
            if let Some(entry) = handled.pop() {
                *self.exc_info.borrow_mut() = entry.saved;
            }
        }
    }

    /// Enter an `except` body for `exc`, whose value sits at `slot`.
    pub(crate) fn enter_except(&self, exc: ExceptionRef, slot: usize) {
        let saved = self.exc_info.replace(Some(exc));
        self.handled.borrow_mut().push(HandledSlot { saved, slot });
    }

    pub(crate) fn finish(&self) {
        self.finished.set(true);
        self.stack.borrow_mut().clear();
        self.handled.borrow_mut().clear();
    }
}

/// Carry a frame as a value.
pub fn frame_value(frame: &FrameRef) -> Value {
    Value::Object(frame.clone())
}

/// Render a traceback as a tuple of `(frame, line)` tuples.
pub fn traceback_value(exc: &ExceptionRef) -> Value {
    Value::tuple(
        exc.traceback()
            .into_iter()
            .map(|e| Value::tuple(vec![e.frame, Value::Int(i64::from(e.line))]))
            .collect(),
    )
}

/// Parse a traceback rendered by [`traceback_value`].
pub(crate) fn parse_traceback(value: &Value) -> Option<Vec<TracebackEntry>> {
    let Value::Tuple(items) = value else {
        return None;
    };
    items
        .iter()
        .map(|item| match item {
            Value::Tuple(pair) if pair.len() == 2 => Some(TracebackEntry {
                frame: pair[0].clone(),
                line: u32::try_from(pair[1].as_int()?).ok()?,
            }),
            _ => None,
        })
        .collect()
}

/// The `(type, value, traceback)` triple passed to `exception` events.
pub fn exception_triple(exc: &ExceptionRef) -> Value {
    Value::tuple(vec![
        Value::ExceptionType(exc.kind()),
        Value::Exception(exc.clone()),
        traceback_value(exc),
    ])
}

impl Object for Frame {
    fn type_name(&self) -> &'static str {
        "frame"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("code", &self.code.name())
            .field("ip", &self.ip.get())
            .field("line", &self.line.get())
            .field("hidden", &self.hidden)
            .field("finished", &self.finished.get())
            .finish()
    }
}
