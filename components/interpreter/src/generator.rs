//! Generator coroutines.
//!
//! A generator owns one frame and resumes it through the dispatch loop. The
//! frame itself is the continuation: `yield` leaves the operand stack and
//! the instruction pointer in place.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use core_types::{ExcKind, ExceptionObject, ExceptionRef, Object, Value};
use strum::IntoStaticStr;
use tracing::{debug, warn};

use crate::dispatch::{Entry, FrameExit};
use crate::error::raise;
use crate::frame::FrameRef;
use crate::{Interpreter, RunError, RunResult, VmError};

/// Lifecycle of a generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
pub enum GeneratorState {
    /// Built but never resumed
    Created,
    /// Stopped at a `yield`
    Suspended,
    /// Its frame is executing
    Running,
    /// Returned (terminal)
    Exhausted,
    /// Raised out (terminal)
    Errored,
}

impl GeneratorState {
    /// Returns whether no further resumption can run code.
    pub fn is_terminal(self) -> bool {
        matches!(self, GeneratorState::Exhausted | GeneratorState::Errored)
    }
}

/// What a single resumption produced.
#[derive(Debug, Clone)]
pub enum GeneratorOutcome {
    /// The frame yielded a value and is suspended
    Yielded(Value),
    /// The frame returned
    Exhausted(Value),
    /// The frame raised out
    Errored(ExceptionRef),
}

/// Frame plus state; the part the finalization queue keeps alive.
pub(crate) struct GeneratorCore {
    frame: FrameRef,
    state: Cell<GeneratorState>,
}

impl GeneratorCore {
    fn run(&self, interp: &mut Interpreter, entry: Entry) -> Result<GeneratorOutcome, VmError> {
        let entry = match (self.state.get(), entry) {
            (GeneratorState::Running, _) => return Err(VmError::AlreadyRunning),
            (GeneratorState::Exhausted | GeneratorState::Errored, Entry::Throw(exc)) => {
                return Ok(GeneratorOutcome::Errored(exc));
            }
            (GeneratorState::Exhausted | GeneratorState::Errored, _) => {
                return Ok(GeneratorOutcome::Exhausted(Value::None));
            }
            (GeneratorState::Created, Entry::Send(_)) => Entry::Start,
            (_, entry) => entry,
        };

        self.transition(GeneratorState::Running);
        let (state, outcome) = match interp.execute(&self.frame, entry) {
            Ok(FrameExit::Yield(value)) => {
                (GeneratorState::Suspended, Ok(GeneratorOutcome::Yielded(value)))
            }
            Ok(FrameExit::Return(value)) => {
                (GeneratorState::Exhausted, Ok(GeneratorOutcome::Exhausted(value)))
            }
            Err(RunError::Raise(exc)) => (GeneratorState::Errored, Ok(GeneratorOutcome::Errored(exc))),
            Err(RunError::Fatal(err)) => (GeneratorState::Errored, Err(err)),
        };
        self.transition(state);
        outcome
    }

    fn close(&self, interp: &mut Interpreter) -> RunResult<()> {
        if self.state.get().is_terminal() {
            return Ok(());
        }
        let exit = ExceptionObject::new(ExcKind::GeneratorExit, Vec::new());
        match self.run(interp, Entry::Throw(exit))? {
            GeneratorOutcome::Yielded(_) => {
                Err(raise(ExcKind::RuntimeError, "generator ignored GeneratorExit"))
            }
            GeneratorOutcome::Exhausted(_) => Ok(()),
            GeneratorOutcome::Errored(exc)
                if exc.matches(ExcKind::GeneratorExit) || exc.matches(ExcKind::StopIteration) =>
            {
                self.state.set(GeneratorState::Exhausted);
                Ok(())
            }
            GeneratorOutcome::Errored(exc) => Err(RunError::Raise(exc)),
        }
    }

    /// Returns whether dropping the last handle must close the generator.
    fn needs_finalizing(&self) -> bool {
        self.state.get() == GeneratorState::Suspended
    }

    fn transition(&self, to: GeneratorState) {
        let from: &'static str = self.state.replace(to).into();
        let to: &'static str = to.into();
        debug!(code = self.frame.code().name(), from, to, "generator state");
    }
}

/// Generators whose last handle was dropped while suspended, waiting to be
/// closed by their interpreter.
#[derive(Default)]
pub(crate) struct FinalizerQueue {
    pending: RefCell<VecDeque<Rc<GeneratorCore>>>,
}

impl FinalizerQueue {
    fn push(&self, core: Rc<GeneratorCore>) {
        self.pending.borrow_mut().push_back(core);
    }

    fn pop(&self) -> Option<Rc<GeneratorCore>> {
        self.pending.borrow_mut().pop_front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }
}

impl fmt::Debug for FinalizerQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinalizerQueue")
            .field("pending", &self.pending.borrow().len())
            .finish()
    }
}

/// A generator coroutine.
///
/// Dropping the last handle to a suspended generator queues it with its
/// interpreter, which closes it at the next safe point or when the
/// interpreter itself is dropped.
pub struct Generator {
    core: Rc<GeneratorCore>,
    queue: Weak<FinalizerQueue>,
}

impl Generator {
    pub(crate) fn new(frame: FrameRef, queue: &Rc<FinalizerQueue>) -> Rc<Self> {
        Rc::new(Self {
            core: Rc::new(GeneratorCore {
                frame,
                state: Cell::new(GeneratorState::Created),
            }),
            queue: Rc::downgrade(queue),
        })
    }

    /// Current state.
    pub fn state(&self) -> GeneratorState {
        self.core.state.get()
    }

    /// Returns whether the generator can no longer run.
    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Returns whether the generator's frame is executing.
    pub fn is_running(&self) -> bool {
        self.state() == GeneratorState::Running
    }

    /// The generator's frame.
    pub fn frame(&self) -> &FrameRef {
        &self.core.frame
    }

    /// Resume with `value` as the result of the pending `yield`.
    ///
    /// A generator that has not started ignores `value`; a finished one
    /// reports `Exhausted(None)` without running.
    ///
    /// # Errors
    ///
    /// [`VmError::AlreadyRunning`] when called from inside the generator's
    /// own execution; the state is left unchanged. Other interpreter faults
    /// inside the frame are passed through.
    pub fn resume(&self, interp: &mut Interpreter, value: Value) -> Result<GeneratorOutcome, VmError> {
        self.core.run(interp, Entry::Send(value))
    }

    /// Raise `exc` at the suspension point.
    ///
    /// The raise is traced as a new exception in the generator's frame. A
    /// finished generator reports `Errored(exc)` without running.
    pub fn throw(&self, interp: &mut Interpreter, exc: ExceptionRef) -> Result<GeneratorOutcome, VmError> {
        self.core.run(interp, Entry::Throw(exc))
    }

    /// Finalize: throw `GeneratorExit` in and wait for the frame to leave.
    ///
    /// No-op on a finished generator.
    ///
    /// # Errors
    ///
    /// `RuntimeError` if the generator yields again, or whatever other
    /// exception it raises while unwinding.
    pub fn close(&self, interp: &mut Interpreter) -> RunResult<()> {
        self.core.close(interp)
    }

    /// Language-level `next()`/`send()`: the yielded value, or
    /// `StopIteration` once the generator has finished.
    pub(crate) fn send(&self, interp: &mut Interpreter, value: Value) -> RunResult<Value> {
        outcome_value(self.resume(interp, value)?)
    }

    /// Language-level `throw()`.
    pub(crate) fn throw_value(&self, interp: &mut Interpreter, exc: ExceptionRef) -> RunResult<Value> {
        outcome_value(self.throw(interp, exc)?)
    }
}

fn outcome_value(outcome: GeneratorOutcome) -> RunResult<Value> {
    match outcome {
        GeneratorOutcome::Yielded(value) => Ok(value),
        GeneratorOutcome::Exhausted(_) => Err(RunError::Raise(ExceptionObject::new(
            ExcKind::StopIteration,
            Vec::new(),
        ))),
        GeneratorOutcome::Errored(exc) => Err(RunError::Raise(exc)),
    }
}

impl Drop for Generator {
    fn drop(&mut self) {
        if !self.core.needs_finalizing() {
            return;
        }
        if let Some(queue) = self.queue.upgrade() {
            debug!(code = self.core.frame.code().name(), "generator queued for finalization");
            queue.push(Rc::clone(&self.core));
        }
    }
}

impl Object for Generator {
    fn type_name(&self) -> &'static str {
        "generator"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generator")
            .field("code", &self.core.frame.code().name())
            .field("state", &self.state())
            .finish()
    }
}

impl Interpreter {
    /// Close every generator queued for finalization.
    ///
    /// Errors raised while closing are logged and dropped.
    pub fn run_finalizers(&mut self) {
        if self.draining {
            return;
        }
        self.draining = true;
        while let Some(core) = self.finalizers.pop() {
            if let Err(err) = core.close(self) {
                match err {
                    RunError::Raise(exc) => {
                        warn!(code = core.frame.code().name(), error = %exc, "exception ignored while finalizing generator");
                    }
                    RunError::Fatal(fault) => {
                        warn!(code = core.frame.code().name(), error = %fault, "fault while finalizing generator");
                    }
                }
            }
        }
        self.draining = false;
    }

    /// Returns whether generators are waiting to be finalized.
    pub fn has_pending_finalizers(&self) -> bool {
        !self.finalizers.is_empty()
    }
}
