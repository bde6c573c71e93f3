//! Interpreter-owned heap objects carried inside values.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// An object whose concrete type lives outside this crate.
///
/// Frames, functions and generators are defined by the interpreter, yet they
/// must travel through the operand stack like any other value. They do so as
/// `Value::Object(Rc<dyn Object>)` and are recovered with
/// [`Value::downcast`](crate::Value::downcast).
pub trait Object: fmt::Debug + 'static {
    /// Type name reported by introspection and in error messages.
    fn type_name(&self) -> &'static str;

    /// Borrowing downcast hook.
    fn as_any(&self) -> &dyn Any;

    /// Owning downcast hook.
    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
}

/// Shared handle to an interpreter-owned object.
pub type ObjectRef = Rc<dyn Object>;
