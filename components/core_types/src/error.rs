//! Language-level exception types.
//!
//! Exceptions raised by executing code are ordinary values: an
//! [`ExceptionObject`] carries its class ([`ExcKind`]), its constructor
//! arguments and the traceback accumulated while it propagates. They are
//! distinct from interpreter-internal faults, which never reach user
//! handlers and live in the interpreter crate.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use strum::{EnumIter, EnumString, IntoStaticStr};

use crate::Value;

/// Built-in exception classes.
///
/// The hierarchy follows the usual dynamic-language layout: everything
/// derives from `BaseException`, ordinary errors derive from `Exception`,
/// and the control-flow sentinels (`GeneratorExit`, `KeyboardInterrupt`,
/// `SystemExit`) sit directly under `BaseException` so that a handler for
/// `Exception` does not swallow them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumString, IntoStaticStr)]
pub enum ExcKind {
    /// Root of the hierarchy
    BaseException,
    /// Generator finalization sentinel, thrown by `close()`
    GeneratorExit,
    /// Interrupt request from the host
    KeyboardInterrupt,
    /// Interpreter exit request
    SystemExit,
    /// Base of all ordinary errors
    Exception,
    /// Iterator exhaustion
    StopIteration,
    /// Base of numeric errors
    ArithmeticError,
    /// Division or modulo by zero
    ZeroDivisionError,
    /// Numeric result out of range
    OverflowError,
    /// Base of index and key errors
    LookupError,
    /// Sequence index out of range
    IndexError,
    /// Mapping key missing
    KeyError,
    /// Name lookup failure
    NameError,
    /// Fast local read before assignment
    UnboundLocalError,
    /// Operation applied to an unsupported type
    TypeError,
    /// Right type, wrong value
    ValueError,
    /// Attribute lookup failure
    AttributeError,
    /// Generic runtime failure
    RuntimeError,
    /// Call depth exceeded the configured limit
    RecursionError,
}

impl ExcKind {
    /// Returns the direct base class, or `None` for `BaseException`.
    pub fn parent(self) -> Option<ExcKind> {
        use ExcKind::*;
        match self {
            BaseException => None,
            GeneratorExit | KeyboardInterrupt | SystemExit | Exception => Some(BaseException),
            StopIteration | ArithmeticError | LookupError | NameError | TypeError | ValueError
            | AttributeError | RuntimeError => Some(Exception),
            ZeroDivisionError | OverflowError => Some(ArithmeticError),
            IndexError | KeyError => Some(LookupError),
            UnboundLocalError => Some(NameError),
            RecursionError => Some(RuntimeError),
        }
    }

    /// Returns whether `self` is `other` or derives from it.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_types::ExcKind;
    ///
    /// assert!(ExcKind::ZeroDivisionError.is_subclass_of(ExcKind::ArithmeticError));
    /// assert!(ExcKind::ZeroDivisionError.is_subclass_of(ExcKind::BaseException));
    /// assert!(!ExcKind::Exception.is_subclass_of(ExcKind::ValueError));
    /// ```
    pub fn is_subclass_of(self, other: ExcKind) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == other {
                return true;
            }
            current = kind.parent();
        }
        false
    }

    /// The class name as it appears in messages and in the builtins scope.
    pub fn name(self) -> &'static str {
        self.into()
    }
}

impl fmt::Display for ExcKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One step of a traceback: the frame an exception passed through and the
/// line that frame was executing at the time.
#[derive(Clone)]
pub struct TracebackEntry {
    /// The frame, carried as an opaque object value
    pub frame: Value,
    /// Source line being executed in that frame
    pub line: u32,
}

impl fmt::Debug for TracebackEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracebackEntry")
            .field("frame", &self.frame.type_name())
            .field("line", &self.line)
            .finish()
    }
}

/// Shared handle to an exception instance.
///
/// Identity matters: re-raising must propagate the *same* object so that
/// tracing can tell a re-raise from a new raise.
pub type ExceptionRef = Rc<ExceptionObject>;

/// A language-level exception instance.
pub struct ExceptionObject {
    kind: ExcKind,
    args: Vec<Value>,
    traceback: RefCell<Vec<TracebackEntry>>,
}

impl ExceptionObject {
    /// Create an exception with arbitrary constructor arguments.
    pub fn new(kind: ExcKind, args: Vec<Value>) -> ExceptionRef {
        Rc::new(Self {
            kind,
            args,
            traceback: RefCell::new(Vec::new()),
        })
    }

    /// Create an exception carrying a single message argument.
    pub fn with_message(kind: ExcKind, message: impl Into<String>) -> ExceptionRef {
        let message: String = message.into();
        Self::new(kind, vec![Value::Str(message.into())])
    }

    /// The exception's class.
    pub fn kind(&self) -> ExcKind {
        self.kind
    }

    /// Constructor arguments.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Message text: the sole argument rendered as a string, or the
    /// arguments joined with `", "`.
    pub fn message(&self) -> String {
        match self.args.as_slice() {
            [] => String::new(),
            [only] => only.to_string(),
            many => many
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Returns whether a handler for `kind` catches this exception.
    pub fn matches(&self, kind: ExcKind) -> bool {
        self.kind.is_subclass_of(kind)
    }

    /// Snapshot of the traceback, outermost step last.
    pub fn traceback(&self) -> Vec<TracebackEntry> {
        self.traceback.borrow().clone()
    }

    /// Record that the exception passed through another frame.
    pub fn push_traceback(&self, entry: TracebackEntry) {
        self.traceback.borrow_mut().push(entry);
    }

    /// Replace the traceback wholesale (used by traceback-carrying raises).
    pub fn set_traceback(&self, entries: Vec<TracebackEntry>) {
        *self.traceback.borrow_mut() = entries;
    }
}

impl fmt::Debug for ExceptionObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceptionObject")
            .field("kind", &self.kind)
            .field("args", &self.args)
            .field("traceback_len", &self.traceback.borrow().len())
            .finish()
    }
}

impl fmt::Display for ExceptionObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = self.message();
        if message.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.kind, message)
        }
    }
}
