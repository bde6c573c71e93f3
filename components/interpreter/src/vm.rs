//! Interpreter instance: owns the call chain, the tracing context, the
//! builtins and the generator finalization queue.

use std::rc::Rc;
use std::sync::Arc;

use bytecode_system::{CodeFlags, CodeObject};
use core_types::{ExcKind, ExceptionObject, ExceptionRef, Namespace, Value};
use tracing::debug;

use crate::builtins;
use crate::config::{ConfigError, InterpreterConfig};
use crate::dispatch::{Entry, FrameExit};
use crate::environment::Environment;
use crate::error::raise;
use crate::frame::{Frame, FrameRef};
use crate::function::{Function, NativeFunction};
use crate::generator::{FinalizerQueue, Generator};
use crate::trace::TracingContext;
use crate::{RunError, RunResult, VmError};

/// One interpreter: a single logical thread of execution.
///
/// # Examples
///
/// ```
/// use bytecode_system::{BinaryOp, CodeBuilder, Opcode};
/// use core_types::{Namespace, Value};
/// use interpreter::Interpreter;
///
/// let mut b = CodeBuilder::module("<module>", 1);
/// b.line(1);
/// b.load_const(6i64);
/// b.load_const(7i64);
/// b.emit(Opcode::Binary(BinaryOp::Mul));
/// b.store_name("answer");
/// b.return_none();
/// let code = b.build().unwrap();
///
/// let mut interp = Interpreter::new();
/// let globals = Namespace::new();
/// interp.run_module(&code, &globals).unwrap();
/// assert_eq!(globals.get("answer"), Some(Value::Int(42)));
/// ```
pub struct Interpreter {
    pub(crate) config: InterpreterConfig,
    builtins: Namespace,
    pub(crate) tracing: TracingContext,
    pub(crate) frames: Vec<FrameRef>,
    pub(crate) finalizers: Rc<FinalizerQueue>,
    pub(crate) draining: bool,
}

impl Interpreter {
    /// Create an interpreter with the default configuration.
    pub fn new() -> Self {
        Self::build(InterpreterConfig::default())
    }

    /// Create an interpreter with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn with_config(config: InterpreterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: InterpreterConfig) -> Self {
        Self {
            config,
            builtins: builtins::namespace(),
            tracing: TracingContext::default(),
            frames: Vec::new(),
            finalizers: Rc::new(FinalizerQueue::default()),
            draining: false,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// The builtins namespace shared by every frame.
    pub fn builtins(&self) -> &Namespace {
        &self.builtins
    }

    /// The innermost frame of the real call chain, hidden or not.
    pub fn current_frame(&self) -> Option<FrameRef> {
        self.frames.last().cloned()
    }

    /// The visible frame `depth` levels up the call chain (`0` is the
    /// innermost), skipping hidden frames.
    pub fn visible_frame(&self, depth: usize) -> Option<FrameRef> {
        self.frames
            .iter()
            .rev()
            .filter(|frame| !frame.is_hidden())
            .nth(depth)
            .cloned()
    }

    /// The exception currently being handled: the innermost non-empty
    /// `exc_info` along the call chain.
    pub fn exc_info(&self) -> Option<ExceptionRef> {
        self.frames.iter().rev().find_map(|frame| frame.exc_info())
    }

    /// Run module-level code with `globals` serving as both locals and
    /// globals.
    ///
    /// # Errors
    ///
    /// [`RunError::Raise`] for an uncaught exception, [`RunError::Fatal`]
    /// for an interpreter fault.
    pub fn run_module(&mut self, code: &Arc<CodeObject>, globals: &Namespace) -> RunResult<Value> {
        let env = Environment::mapped(globals.clone(), globals.clone(), self.builtins.clone());
        let frame = Frame::make(
            code.clone(),
            env,
            self.frames.last(),
            false,
            self.config.stack_capacity,
        );
        let result = self.execute(&frame, Entry::Start);
        self.finish_operation();
        match result? {
            FrameExit::Return(value) => Ok(value),
            FrameExit::Yield(_) => Err(yield_outside_generator(code).into()),
        }
    }

    /// Call any callable value from the host.
    ///
    /// # Errors
    ///
    /// `TypeError` when the value is not callable, or whatever the callee
    /// raises.
    pub fn call(&mut self, callable: &Value, args: Vec<Value>) -> RunResult<Value> {
        let result = self.call_value(callable, args);
        self.finish_operation();
        result
    }

    /// Call a callable value: a bytecode function, a native function or an
    /// exception class.
    pub fn call_value(&mut self, callable: &Value, args: Vec<Value>) -> RunResult<Value> {
        if let Some(function) = callable.downcast::<Function>() {
            return self.call_function(&function, args);
        }
        if let Some(native) = callable.downcast::<NativeFunction>() {
            return native.invoke(self, args);
        }
        match callable {
            Value::ExceptionType(kind) => Ok(Value::Exception(ExceptionObject::new(*kind, args))),
            other => Err(raise(
                ExcKind::TypeError,
                format!("'{}' object is not callable", other.type_name()),
            )),
        }
    }

    /// Call a bytecode function. Generator functions return a new
    /// generator without running any code.
    pub fn call_function(&mut self, function: &Function, args: Vec<Value>) -> RunResult<Value> {
        let code = function.code();
        // Creating a generator runs no frame.
        if !code.is_generator() && self.frames.len() >= self.config.recursion_limit {
            return Err(raise(
                ExcKind::RecursionError,
                "maximum recursion depth exceeded",
            ));
        }
        let env = self.bind_arguments(function, args)?;
        let frame = Frame::make(
            code.clone(),
            env,
            self.frames.last(),
            false,
            self.config.stack_capacity,
        );
        if code.is_generator() {
            debug!(code = code.name(), "generator created");
            return Ok(Value::object(Generator::new(frame, &self.finalizers)));
        }
        match self.execute(&frame, Entry::Start)? {
            FrameExit::Return(value) => Ok(value),
            FrameExit::Yield(_) => Err(yield_outside_generator(code).into()),
        }
    }

    fn bind_arguments(&self, function: &Function, args: Vec<Value>) -> RunResult<Environment> {
        let code = function.code();
        let argcount = code.argcount() as usize;
        let varargs = code.flags().contains(CodeFlags::VARARGS);
        if args.len() < argcount || (!varargs && args.len() > argcount) {
            let expected = if varargs { "at least" } else { "exactly" };
            return Err(raise(
                ExcKind::TypeError,
                format!(
                    "{}() takes {} {} argument{} ({} given)",
                    code.name(),
                    expected,
                    argcount,
                    if argcount == 1 { "" } else { "s" },
                    args.len()
                ),
            ));
        }

        let mut args = args;
        let extra = args.split_off(argcount);
        let mut bound: Vec<Option<Value>> = args.into_iter().map(Some).collect();
        if varargs {
            bound.push(Some(Value::tuple(extra)));
        }

        let globals = function.globals().clone();
        if code.is_optimized() {
            let names: Rc<[Rc<str>]> = code.varnames().iter().map(|n| Rc::from(n.as_str())).collect();
            bound.resize(names.len(), None);
            Ok(Environment::fast(names, bound, globals, self.builtins.clone()))
        } else {
            let locals = Namespace::new();
            for (name, value) in code.varnames().iter().zip(bound) {
                if let Some(value) = value {
                    locals.insert(name.as_str(), value);
                }
            }
            Ok(Environment::mapped(locals, globals, self.builtins.clone()))
        }
    }

    /// End of a host-initiated operation: close generators dropped during
    /// it once the call chain is empty.
    fn finish_operation(&mut self) {
        if self.frames.is_empty() {
            self.run_finalizers();
        }
    }
}

pub(crate) fn yield_outside_generator(code: &CodeObject) -> VmError {
    VmError::MalformedCode(format!("yield outside generator in '{}'", code.name()))
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Interpreter {
    /// Generators still queued get their `finally` bodies run.
    fn drop(&mut self) {
        self.run_finalizers();
    }
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("config", &self.config)
            .field("depth", &self.frames.len())
            .field("tracing", &self.tracing)
            .field("finalizers", &self.finalizers)
            .finish()
    }
}
