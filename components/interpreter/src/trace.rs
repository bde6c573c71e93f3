//! Trace dispatcher.
//!
//! Decides at every checkpoint whether a trace callback fires and which
//! one: `call` events always go to the interpreter-wide tracer, every other
//! event goes to the frame's local tracer, and local tracers only fire while
//! an interpreter-wide tracer is installed. Callbacks follow the
//! `(frame, event, arg) -> next_callback_or_none` convention.

use bytecode_system::LineTable;
use core_types::Value;
use strum::IntoStaticStr;
use tracing::debug;

use crate::frame::{frame_value, FrameRef};
use crate::{Interpreter, RunError, RunResult};

/// The four trace events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum TraceEvent {
    /// A frame starts or resumes running; `arg` is `None`
    Call,
    /// A new source line is about to run; `arg` is `None`
    Line,
    /// A frame returns, yields or raises out; `arg` is the value or `None`
    Return,
    /// A newly raised exception passes through the frame; `arg` is the
    /// `(type, value, traceback)` triple
    Exception,
}

impl TraceEvent {
    /// Event name as passed to callbacks.
    ///
    /// # Examples
    ///
    /// ```
    /// use interpreter::TraceEvent;
    ///
    /// assert_eq!(TraceEvent::Exception.as_str(), "exception");
    /// ```
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Interpreter-wide tracing state.
#[derive(Debug, Default)]
pub struct TracingContext {
    global: Option<Value>,
    active: bool,
}

impl TracingContext {
    /// The interpreter-wide tracer.
    pub fn global(&self) -> Option<&Value> {
        self.global.as_ref()
    }

    /// Install or remove the interpreter-wide tracer.
    pub fn set_global(&mut self, tracer: Option<Value>) {
        self.global = tracer;
    }

    /// Returns whether a tracer is installed.
    pub fn is_enabled(&self) -> bool {
        self.global.is_some()
    }

    /// Returns whether a callback is currently running.
    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// Tracks which source-line run the dispatch loop is in.
///
/// A `line` checkpoint is due when the next offset starts its run or lies
/// before the previously executed offset. The window starts empty on every
/// entry into a frame, so the first instruction of a fresh frame is always
/// due while a resumed frame, which restarts mid-line, is not.
#[derive(Debug, Default)]
pub(crate) struct LineWindow {
    lower: u32,
    upper: u32,
    prev: Option<u32>,
}

/// Outcome of [`LineWindow::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LineCheck {
    /// The line of the run just entered, if the offset left the window.
    pub(crate) entered: Option<u32>,
    /// Whether a `line` event is due.
    pub(crate) due: bool,
}

impl LineWindow {
    /// Classify `offset` against the current run.
    pub(crate) fn check(&mut self, table: &LineTable, offset: u32) -> LineCheck {
        let mut entered = None;
        if offset < self.lower || offset >= self.upper {
            let bounds = table.bounds(offset);
            self.lower = bounds.lower;
            self.upper = bounds.upper;
            entered = Some(bounds.line);
        }
        let backwards = self.prev.is_some_and(|prev| offset < prev);
        LineCheck {
            entered,
            due: offset == self.lower || backwards,
        }
    }

    /// Record the offset about to execute.
    pub(crate) fn settle(&mut self, offset: u32) {
        self.prev = Some(offset);
    }
}

impl Interpreter {
    /// Install or remove the interpreter-wide tracer.
    pub fn set_global_tracer(&mut self, tracer: Option<Value>) {
        match &tracer {
            Some(_) => debug!("global tracer installed"),
            None => debug!("global tracer removed"),
        }
        self.tracing.set_global(tracer);
    }

    /// The interpreter-wide tracer.
    pub fn global_tracer(&self) -> Option<Value> {
        self.tracing.global().cloned()
    }

    /// Tracing state.
    pub fn tracing(&self) -> &TracingContext {
        &self.tracing
    }

    /// Deliver `event` for `frame`, if anybody listens.
    ///
    /// A callback that raises switches tracing off (both the global tracer
    /// and the frame's local tracer) and its exception is returned.
    pub(crate) fn trace_event(
        &mut self,
        frame: &FrameRef,
        event: TraceEvent,
        arg: Value,
    ) -> RunResult<()> {
        if frame.is_hidden() || self.tracing.active {
            return Ok(());
        }
        let callback = match (event, self.tracing.global(), frame.trace_fn()) {
            (_, None, _) => return Ok(()),
            (TraceEvent::Call, Some(global), _) => global.clone(),
            (_, Some(_), Some(local)) => local,
            (_, Some(_), None) => return Ok(()),
        };

        frame.env().borrow_mut().refresh_view();
        self.tracing.active = true;
        frame.set_at_line_event(event == TraceEvent::Line);
        let result = self.call_value(
            &callback,
            vec![frame_value(frame), Value::from(event.as_str()), arg],
        );
        frame.set_at_line_event(false);
        self.tracing.active = false;
        frame.env().borrow_mut().sync_back_from_locals();

        match result {
            Ok(Value::None) => Ok(()),
            Ok(next) => {
                frame.set_trace_fn(next);
                Ok(())
            }
            Err(RunError::Raise(exc)) => {
                debug!(event = event.as_str(), error = %exc, "trace callback raised, tracing disabled");
                self.tracing.set_global(None);
                frame.clear_trace_fn();
                Err(RunError::Raise(exc))
            }
            Err(fatal) => Err(fatal),
        }
    }
}
