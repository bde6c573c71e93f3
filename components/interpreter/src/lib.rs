//! Frame execution core
//!
//! This crate runs code objects built by `bytecode_system`:
//! - Frames with lazily materialized local views and a weak caller link
//! - Line, call, return and exception trace events with per-frame tracers
//! - Jumping a suspended or traced frame to another line
//! - Resumable generators with send, throw, close and implicit finalization
//! - Exception propagation with tracebacks and per-frame `exc_info`
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use bytecode_system::CodeBuilder;
//! use core_types::{Namespace, Value};
//! use interpreter::{Interpreter, NativeFunction};
//!
//! let mut b = CodeBuilder::module("<module>", 1);
//! b.line(1);
//! b.load_const(1i64);
//! b.store_name("x");
//! b.line(2);
//! b.return_none();
//! let code = b.build().unwrap();
//!
//! let events = Rc::new(RefCell::new(Vec::new()));
//! let sink = events.clone();
//! let local = Value::object(NativeFunction::new("local", move |_, args| {
//!     sink.borrow_mut().push(args[1].to_string());
//!     Ok(Value::None)
//! }));
//! let sink = events.clone();
//! let global = NativeFunction::new("global", move |_, args| {
//!     sink.borrow_mut().push(args[1].to_string());
//!     Ok(local.clone())
//! });
//!
//! let mut interp = Interpreter::new();
//! interp.set_global_tracer(Some(Value::object(global)));
//! interp.run_module(&code, &Namespace::new()).unwrap();
//! assert_eq!(*events.borrow(), ["call", "line", "line", "return"]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod attrs;
mod builtins;
pub mod config;
mod dispatch;
pub mod environment;
pub mod error;
pub mod frame;
pub mod function;
pub mod generator;
pub mod iter;
pub mod ops;
pub mod stack;
pub mod trace;
pub mod vm;

// Re-export main types at crate root
pub use config::{ConfigError, InterpreterConfig, DEFAULT_RECURSION_LIMIT, DEFAULT_STACK_CAPACITY};
pub use environment::{Environment, NameNotFound};
pub use error::{RunError, RunResult, VmError};
pub use frame::{exception_triple, frame_value, traceback_value, Frame, FrameRef};
pub use function::{CodeValue, Function, NativeFn, NativeFunction};
pub use generator::{Generator, GeneratorOutcome, GeneratorState};
pub use iter::SeqIterator;
pub use stack::ValueStack;
pub use trace::{TraceEvent, TracingContext};
pub use vm::Interpreter;
