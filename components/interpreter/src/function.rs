//! Callable objects.

use std::any::Any;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use bytecode_system::CodeObject;
use core_types::{Namespace, Object, Value};

use crate::{Interpreter, RunResult};

/// A function defined by bytecode: code plus the globals it closes over.
pub struct Function {
    code: Arc<CodeObject>,
    globals: Namespace,
}

impl Function {
    /// Bind `code` to `globals`.
    pub fn new(code: Arc<CodeObject>, globals: Namespace) -> Rc<Self> {
        Rc::new(Self { code, globals })
    }

    /// The function's code.
    pub fn code(&self) -> &Arc<CodeObject> {
        &self.code
    }

    /// The globals the function runs against.
    pub fn globals(&self) -> &Namespace {
        &self.globals
    }

    /// The function's name.
    pub fn name(&self) -> &str {
        self.code.name()
    }
}

impl Object for Function {
    fn type_name(&self) -> &'static str {
        "function"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {}>", self.name())
    }
}

/// Signature of host-implemented callables.
pub type NativeFn = dyn Fn(&mut Interpreter, Vec<Value>) -> RunResult<Value>;

/// A callable implemented in Rust: builtins, bound generator methods and
/// trace callbacks supplied by the embedder.
pub struct NativeFunction {
    name: String,
    func: Box<NativeFn>,
}

impl NativeFunction {
    /// Wrap a closure.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_types::Value;
    /// use interpreter::{Interpreter, NativeFunction};
    ///
    /// let double = NativeFunction::new("double", |_, args| {
    ///     Ok(Value::Int(args[0].as_int().unwrap_or(0) * 2))
    /// });
    /// let mut interp = Interpreter::new();
    /// let result = interp.call_value(&Value::object(double), vec![Value::Int(21)]);
    /// assert_eq!(result.ok(), Some(Value::Int(42)));
    /// ```
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&mut Interpreter, Vec<Value>) -> RunResult<Value> + 'static,
    ) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            func: Box::new(func),
        })
    }

    /// The callable's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn invoke(&self, interp: &mut Interpreter, args: Vec<Value>) -> RunResult<Value> {
        (self.func)(interp, args)
    }
}

impl Object for NativeFunction {
    fn type_name(&self) -> &'static str {
        "builtin_function_or_method"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<built-in function {}>", self.name)
    }
}

/// A code object exposed as a value (`f_code`, `func_code`).
pub struct CodeValue(pub Arc<CodeObject>);

impl Object for CodeValue {
    fn type_name(&self) -> &'static str {
        "code"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl fmt::Debug for CodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<code object {}>", self.0.name())
    }
}
