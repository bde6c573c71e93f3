//! Interpreter fault and propagation types.

use bytecode_system::CodeError;
use core_types::{ExcKind, ExceptionObject, ExceptionRef, Value};
use thiserror::Error;

/// Interpreter-internal faults.
///
/// These never reach language-level handlers: they abort the current
/// top-level operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    /// Pop from an empty operand stack
    #[error("operand stack underflow")]
    StackUnderflow,
    /// The instruction pointer left the instruction sequence
    #[error("instruction offset {0} is outside the code")]
    InvalidOffset(u32),
    /// The code object violates an interpreter assumption
    #[error("malformed code: {0}")]
    MalformedCode(String),
    /// `set_line` refused the requested jump
    #[error("cannot jump to line {line}: {reason}")]
    IllegalLineJump {
        /// Requested line
        line: u32,
        /// Which rule the jump breaks
        reason: &'static str,
    },
    /// A generator was resumed while it was already executing
    #[error("generator already executing")]
    AlreadyRunning,
}

impl From<CodeError> for VmError {
    fn from(err: CodeError) -> Self {
        VmError::MalformedCode(err.to_string())
    }
}

/// Why execution stopped abnormally.
#[derive(Debug, Clone)]
pub enum RunError {
    /// A language-level exception is propagating
    Raise(ExceptionRef),
    /// An interpreter fault
    Fatal(VmError),
}

impl From<VmError> for RunError {
    fn from(err: VmError) -> Self {
        RunError::Fatal(err)
    }
}

impl RunError {
    /// The propagating exception, if this is a language-level error.
    pub fn exception(&self) -> Option<&ExceptionRef> {
        match self {
            RunError::Raise(exc) => Some(exc),
            RunError::Fatal(_) => None,
        }
    }
}

/// Result of any operation that may raise or fault.
pub type RunResult<T> = Result<T, RunError>;

/// Build a language-level error with a message.
pub(crate) fn raise(kind: ExcKind, message: impl Into<String>) -> RunError {
    RunError::Raise(ExceptionObject::with_message(kind, message))
}

/// Turn the operand of a `raise` or `throw` into an exception instance:
/// instances are used as they are, classes are instantiated.
pub(crate) fn to_exception(value: Value) -> RunResult<ExceptionRef> {
    match value {
        Value::Exception(exc) => Ok(exc),
        Value::ExceptionType(kind) => Ok(ExceptionObject::new(kind, Vec::new())),
        other => Err(raise(
            ExcKind::TypeError,
            format!(
                "exceptions must derive from BaseException, not {}",
                other.type_name()
            ),
        )),
    }
}
