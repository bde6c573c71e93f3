//! Core value types and exception objects for the frame execution core.
//!
//! This crate provides the leaf types every other component builds on:
//! the runtime value representation, language-level exception objects,
//! the shared name-to-value mapping used for scopes, and the trait through
//! which interpreter-owned objects (frames, functions, generators) are
//! carried inside values.
//!
//! # Overview
//!
//! - [`Value`] - Tagged representation of runtime values
//! - [`ExcKind`] - Built-in exception classes and their hierarchy
//! - [`ExceptionObject`] - A raised (or raisable) exception instance
//! - [`TracebackEntry`] - One (frame, line) step of an exception's traceback
//! - [`Namespace`] - Shared, ordered name-to-value mapping
//! - [`Object`] - Trait for interpreter-owned heap objects
//!
//! # Examples
//!
//! ```
//! use core_types::{ExcKind, ExceptionObject, Value};
//!
//! let num = Value::Int(42);
//! assert!(num.is_truthy());
//! assert_eq!(num.type_name(), "int");
//!
//! let error = ExceptionObject::with_message(ExcKind::ValueError, "bad value");
//! assert!(error.matches(ExcKind::Exception));
//! assert!(!ExcKind::GeneratorExit.is_subclass_of(ExcKind::Exception));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;
mod namespace;
mod object;
mod value;

pub use error::{ExcKind, ExceptionObject, ExceptionRef, TracebackEntry};
pub use namespace::Namespace;
pub use object::{Object, ObjectRef};
pub use value::Value;
