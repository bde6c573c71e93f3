//! Dispatch loop.
//!
//! Executes one frame until it returns, yields or raises out, consulting
//! the trace dispatcher at the four checkpoints: on entry (`call`), before
//! each source line (`line`), when a new exception reaches the frame
//! (`exception`) and on exit (`return`).

use bytecode_system::{Constant, HandlerKind, Opcode, RaiseForm};
use core_types::{ExcKind, ExceptionRef, TracebackEntry, Value};
use tracing::trace;

use crate::error::{raise, to_exception};
use crate::frame::{exception_triple, frame_value, parse_traceback, FrameRef};
use crate::function::{CodeValue, Function};
use crate::iter::make_iter;
use crate::ops;
use crate::trace::{LineWindow, TraceEvent};
use crate::vm::yield_outside_generator;
use crate::{Interpreter, RunError, RunResult, VmError};

/// How control enters a frame.
#[derive(Debug)]
pub(crate) enum Entry {
    /// First entry, or a generator resumed without a value to deliver
    Start,
    /// Resume a suspended generator, pushing the sent value
    Send(Value),
    /// Raise at the suspension point
    Throw(ExceptionRef),
}

/// How a frame stopped running normally.
#[derive(Debug)]
pub(crate) enum FrameExit {
    Return(Value),
    Yield(Value),
}

/// Result of one instruction.
enum Flow {
    Next,
    Return(Value),
    Yield(Value),
    /// Continue propagating an exception without reporting it again
    Reraise(ExceptionRef),
}

fn constant_value(constant: &Constant) -> Value {
    match constant {
        Constant::None => Value::None,
        Constant::Bool(b) => Value::Bool(*b),
        Constant::Int(n) => Value::Int(*n),
        Constant::Float(f) => Value::Float(*f),
        Constant::Str(s) => Value::Str(s.as_ref().into()),
        Constant::Tuple(items) => Value::tuple(items.iter().map(constant_value).collect()),
        Constant::Code(code) => Value::object(std::rc::Rc::new(CodeValue(code.clone()))),
    }
}

fn operand_error(frame: &FrameRef, what: &str, index: u32) -> VmError {
    VmError::MalformedCode(format!(
        "{} index {} out of range in '{}'",
        what,
        index,
        frame.code().name()
    ))
}

fn name_of(frame: &FrameRef, index: u32) -> Result<&str, VmError> {
    frame
        .code()
        .names()
        .get(index as usize)
        .map(String::as_str)
        .ok_or_else(|| operand_error(frame, "name", index))
}

fn varname_of(frame: &FrameRef, index: u32) -> Result<&str, VmError> {
    frame
        .code()
        .varnames()
        .get(index as usize)
        .map(String::as_str)
        .ok_or_else(|| operand_error(frame, "local", index))
}

fn constant_of(frame: &FrameRef, index: u32) -> Result<&Constant, VmError> {
    frame
        .code()
        .constants()
        .get(index as usize)
        .ok_or_else(|| operand_error(frame, "constant", index))
}

fn exc_matches(exc: &Value, class: &Value) -> bool {
    match (exc, class) {
        (Value::Exception(e), Value::ExceptionType(kind)) => e.matches(*kind),
        (_, Value::Tuple(classes)) => classes.iter().any(|c| exc_matches(exc, c)),
        _ => false,
    }
}

impl Interpreter {
    /// Run `frame` until it returns, yields or raises out.
    ///
    /// The frame is linked to the current top of the call chain for the
    /// duration of the run.
    pub(crate) fn execute(&mut self, frame: &FrameRef, entry: Entry) -> RunResult<FrameExit> {
        frame.set_back(self.frames.last());
        self.frames.push(frame.clone());
        trace!(code = frame.code().name(), depth = self.frames.len(), "enter frame");

        let result = self.run_frame(frame, entry);

        self.frames.pop();
        match &result {
            Ok(FrameExit::Yield(_)) => frame.set_back(None),
            _ => frame.finish(),
        }
        trace!(
            code = frame.code().name(),
            ok = result.is_ok(),
            "leave frame"
        );
        result
    }

    fn run_frame(&mut self, frame: &FrameRef, entry: Entry) -> RunResult<FrameExit> {
        // A failing call event leaves the frame immediately, without a
        // return event.
        self.trace_event(frame, TraceEvent::Call, Value::None)?;

        match entry {
            Entry::Start => {}
            Entry::Send(value) => frame.push(value),
            Entry::Throw(exc) => self.unwind(frame, exc, true)?,
        }

        let mut window = LineWindow::default();
        loop {
            let flow = match self.step(frame, &mut window) {
                Ok(flow) => flow,
                Err(RunError::Raise(exc)) => {
                    self.unwind(frame, exc, true)?;
                    Flow::Next
                }
                Err(fatal) => return Err(fatal),
            };
            match flow {
                Flow::Next => {}
                Flow::Return(value) => {
                    self.trace_event(frame, TraceEvent::Return, value.clone())?;
                    return Ok(FrameExit::Return(value));
                }
                Flow::Yield(value) => {
                    self.trace_event(frame, TraceEvent::Return, value.clone())?;
                    return Ok(FrameExit::Yield(value));
                }
                Flow::Reraise(exc) => self.unwind(frame, exc, false)?,
            }
            if self.config.finalize_eagerly && self.has_pending_finalizers() {
                self.run_finalizers();
            }
        }
    }

    /// Line checkpoint, fetch, execute.
    fn step(&mut self, frame: &FrameRef, window: &mut LineWindow) -> RunResult<Flow> {
        let offset = frame.ip();
        frame.set_lasti(offset);
        let check = window.check(frame.code().line_table(), offset);
        if let Some(line) = check.entered {
            frame.set_current_line(line);
        }
        if check.due {
            self.trace_event(frame, TraceEvent::Line, Value::None)?;
        }

        // The line callback may have moved the frame; the window follows it
        // without firing again.
        let moved = frame.ip();
        if moved != offset {
            window.check(frame.code().line_table(), moved);
        }
        let offset = moved;
        window.settle(offset);
        frame.set_lasti(offset);
        let op = frame
            .code()
            .instruction(offset)
            .ok_or(VmError::InvalidOffset(offset))?;
        frame.set_ip(offset + 1);
        self.exec(frame, op)
    }

    /// Record `exc` in the frame and transfer control to the innermost
    /// handler covering the last instruction.
    ///
    /// `fresh` marks an exception this frame has not seen yet: it gets a
    /// traceback entry and an `exception` event. Without a handler the
    /// frame exits: `return` fires with `None` and the exception (or one
    /// raised by that callback) is returned.
    fn unwind(&mut self, frame: &FrameRef, exc: ExceptionRef, fresh: bool) -> RunResult<()> {
        let mut exc = exc;
        if fresh {
            let line = frame
                .lasti()
                .map_or(frame.current_line(), |at| frame.code().line_table().line_for(at));
            exc.push_traceback(TracebackEntry {
                frame: frame_value(frame),
                line,
            });
            match self.trace_event(frame, TraceEvent::Exception, exception_triple(&exc)) {
                Ok(()) => {}
                Err(RunError::Raise(replacement)) => exc = replacement,
                Err(fatal) => return Err(fatal),
            }
        }

        let handler = frame
            .lasti()
            .and_then(|at| frame.code().handler_for(at).copied());
        match handler {
            Some(handler) => {
                trace!(
                    code = frame.code().name(),
                    target = handler.target,
                    "exception handled"
                );
                frame.unwind_to(handler.stack_depth as usize);
                let slot = frame.stack_len();
                frame.push(Value::Exception(exc.clone()));
                if handler.kind == HandlerKind::Except {
                    frame.enter_except(exc, slot);
                }
                frame.set_ip(handler.target);
                Ok(())
            }
            None => {
                self.trace_event(frame, TraceEvent::Return, Value::None)?;
                Err(RunError::Raise(exc))
            }
        }
    }

    fn exec(&mut self, frame: &FrameRef, op: Opcode) -> RunResult<Flow> {
        match op {
            Opcode::Nop => {}
            Opcode::LoadConst(i) => frame.push(constant_value(constant_of(frame, i)?)),
            Opcode::LoadFast(i) => {
                let value = frame.env().borrow().load_fast(i as usize);
                match value {
                    Some(value) => frame.push(value),
                    None => {
                        return Err(raise(
                            ExcKind::UnboundLocalError,
                            format!(
                                "local variable '{}' referenced before assignment",
                                varname_of(frame, i)?
                            ),
                        ))
                    }
                }
            }
            Opcode::StoreFast(i) => {
                let value = frame.pop()?;
                varname_of(frame, i)?;
                frame.env().borrow_mut().store_fast(i as usize, value);
            }
            Opcode::DeleteFast(i) => {
                let name = varname_of(frame, i)?;
                if !frame.env().borrow_mut().delete_fast(i as usize) {
                    return Err(raise(
                        ExcKind::UnboundLocalError,
                        format!("local variable '{}' referenced before assignment", name),
                    ));
                }
            }
            Opcode::LoadName(i) => {
                let name = name_of(frame, i)?;
                let value = frame.env().borrow().lookup(name);
                frame.push(value.map_err(|e| raise(ExcKind::NameError, e.to_string()))?);
            }
            Opcode::StoreName(i) => {
                let value = frame.pop()?;
                frame.env().borrow_mut().bind(name_of(frame, i)?, value);
            }
            Opcode::DeleteName(i) => {
                let name = name_of(frame, i)?;
                let deleted = frame.env().borrow_mut().delete(name);
                deleted.map_err(|e| raise(ExcKind::NameError, e.to_string()))?;
            }
            Opcode::LoadGlobal(i) => {
                let name = name_of(frame, i)?;
                let value = frame.env().borrow().lookup_global(name);
                frame.push(value.map_err(|_| {
                    raise(
                        ExcKind::NameError,
                        format!("global name '{}' is not defined", name),
                    )
                })?);
            }
            Opcode::StoreGlobal(i) => {
                let value = frame.pop()?;
                let globals = frame.globals_view();
                globals.insert(name_of(frame, i)?, value);
            }
            Opcode::LoadAttr(i) => {
                let target = frame.pop()?;
                let value = self.get_attr(&target, name_of(frame, i)?)?;
                frame.push(value);
            }
            Opcode::StoreAttr(i) => {
                let target = frame.pop()?;
                let value = frame.pop()?;
                self.set_attr(&target, name_of(frame, i)?, value)?;
            }
            Opcode::DeleteAttr(i) => {
                let target = frame.pop()?;
                self.del_attr(&target, name_of(frame, i)?)?;
            }
            Opcode::BinarySubscr => {
                let key = frame.pop()?;
                let container = frame.pop()?;
                frame.push(ops::subscript(&container, &key)?);
            }
            Opcode::StoreSubscr => {
                let key = frame.pop()?;
                let container = frame.pop()?;
                let value = frame.pop()?;
                ops::store_subscript(&container, &key, value)?;
            }
            Opcode::Pop => {
                frame.pop()?;
            }
            Opcode::Dup => frame.push(frame.peek(0)?),
            Opcode::Rot2 => {
                let top = frame.pop()?;
                let below = frame.pop()?;
                frame.push(top);
                frame.push(below);
            }
            Opcode::Binary(op) => {
                let rhs = frame.pop()?;
                let lhs = frame.pop()?;
                frame.push(ops::binary(op, &lhs, &rhs)?);
            }
            Opcode::UnaryNot => {
                let value = frame.pop()?;
                frame.push(Value::Bool(!value.is_truthy()));
            }
            Opcode::UnaryNeg => {
                let value = frame.pop()?;
                frame.push(ops::negate(&value)?);
            }
            Opcode::Compare(op) => {
                let rhs = frame.pop()?;
                let lhs = frame.pop()?;
                frame.push(Value::Bool(ops::compare(op, &lhs, &rhs)?));
            }
            Opcode::BuildTuple(n) => {
                let items = frame.pop_n(n as usize)?;
                frame.push(Value::tuple(items));
            }
            Opcode::BuildList(n) => {
                let items = frame.pop_n(n as usize)?;
                frame.push(Value::list(items));
            }
            Opcode::UnpackSequence(n) => {
                let items = ops::sequence_items(&frame.pop()?)?;
                if items.len() != n as usize {
                    return Err(raise(
                        ExcKind::ValueError,
                        format!("expected {} values to unpack, got {}", n, items.len()),
                    ));
                }
                for item in items.into_iter().rev() {
                    frame.push(item);
                }
            }
            Opcode::Jump(target) => frame.set_ip(target),
            Opcode::PopJumpIfFalse(target) => {
                if !frame.pop()?.is_truthy() {
                    frame.set_ip(target);
                }
            }
            Opcode::PopJumpIfTrue(target) => {
                if frame.pop()?.is_truthy() {
                    frame.set_ip(target);
                }
            }
            Opcode::GetIter => {
                let iterable = frame.pop()?;
                frame.push(make_iter(iterable)?);
            }
            Opcode::ForIter(target) => {
                let iterator = frame.peek(0)?;
                match self.next_item(&iterator)? {
                    Some(item) => frame.push(item),
                    None => {
                        frame.pop()?;
                        frame.set_ip(target);
                    }
                }
            }
            Opcode::MakeFunction(i) => {
                let code = constant_of(frame, i)?
                    .as_code()
                    .ok_or_else(|| VmError::MalformedCode(format!("constant {} is not code", i)))?
                    .clone();
                frame.push(Value::object(Function::new(code, frame.globals_view())));
            }
            Opcode::Call(argc) => {
                let args = frame.pop_n(argc as usize)?;
                let callable = frame.pop()?;
                let result = self.call_value(&callable, args)?;
                frame.push(result);
            }
            Opcode::Return => return Ok(Flow::Return(frame.pop()?)),
            Opcode::Yield => {
                if !frame.code().is_generator() {
                    return Err(yield_outside_generator(frame.code()).into());
                }
                return Ok(Flow::Yield(frame.pop()?));
            }
            Opcode::Raise(form) => return self.raise_op(frame, form),
            Opcode::JumpIfNotExcMatch(target) => {
                let class = frame.pop()?;
                if !exc_matches(&frame.peek(0)?, &class) {
                    frame.set_ip(target);
                }
            }
            Opcode::PopExcept => {
                let depth = frame.stack_len().checked_sub(1).ok_or(VmError::StackUnderflow)?;
                frame.unwind_to(depth);
            }
            Opcode::EndFinally => match frame.pop()? {
                Value::None => {}
                Value::Exception(exc) => return Ok(Flow::Reraise(exc)),
                other => {
                    return Err(VmError::MalformedCode(format!(
                        "finally block ended with a {} marker",
                        other.type_name()
                    ))
                    .into())
                }
            },
        }
        Ok(Flow::Next)
    }

    fn raise_op(&mut self, frame: &FrameRef, form: RaiseForm) -> RunResult<Flow> {
        match form {
            RaiseForm::New => {
                let exc = to_exception(frame.pop()?)?;
                exc.set_traceback(Vec::new());
                Err(RunError::Raise(exc))
            }
            RaiseForm::Reraise => match self.exc_info() {
                Some(exc) => Ok(Flow::Reraise(exc)),
                None => Err(raise(
                    ExcKind::RuntimeError,
                    "No active exception to reraise",
                )),
            },
            RaiseForm::WithTraceback => {
                let tb = frame.pop()?;
                let exc = to_exception(frame.pop()?)?;
                if let Some(entries) = parse_traceback(&tb) {
                    exc.set_traceback(entries);
                }
                Ok(Flow::Reraise(exc))
            }
        }
    }
}
