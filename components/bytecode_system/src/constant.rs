//! Compile-time constants stored in a code object's pool.

use std::fmt;
use std::sync::Arc;

use crate::CodeObject;

/// A constant-pool entry.
///
/// Constants are immutable and thread-safe so that a [`CodeObject`] can be
/// shared freely; the interpreter converts them to runtime values on load.
#[derive(Clone)]
pub enum Constant {
    /// The none singleton
    None,
    /// Boolean literal
    Bool(bool),
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
    /// String literal
    Str(Arc<str>),
    /// Tuple of constants
    Tuple(Vec<Constant>),
    /// Nested code, consumed by `MakeFunction`
    Code(Arc<CodeObject>),
}

impl Constant {
    /// Build a string constant.
    pub fn str(s: &str) -> Constant {
        Constant::Str(Arc::from(s))
    }

    /// The nested code object, if this is a code constant.
    pub fn as_code(&self) -> Option<&Arc<CodeObject>> {
        match self {
            Constant::Code(code) => Some(code),
            _ => None,
        }
    }
}

impl fmt::Debug for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::None => f.write_str("None"),
            Constant::Bool(b) => write!(f, "{b}"),
            Constant::Int(i) => write!(f, "{i}"),
            Constant::Float(x) => write!(f, "{x:?}"),
            Constant::Str(s) => write!(f, "{s:?}"),
            Constant::Tuple(items) => f.debug_list().entries(items).finish(),
            Constant::Code(code) => write!(f, "<code {}>", code.name()),
        }
    }
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Constant::None, Constant::None) => true,
            (Constant::Bool(a), Constant::Bool(b)) => a == b,
            (Constant::Int(a), Constant::Int(b)) => a == b,
            (Constant::Float(a), Constant::Float(b)) => a.to_bits() == b.to_bits(),
            (Constant::Str(a), Constant::Str(b)) => a == b,
            (Constant::Tuple(a), Constant::Tuple(b)) => a == b,
            (Constant::Code(a), Constant::Code(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<i64> for Constant {
    fn from(i: i64) -> Self {
        Constant::Int(i)
    }
}

impl From<bool> for Constant {
    fn from(b: bool) -> Self {
        Constant::Bool(b)
    }
}

impl From<f64> for Constant {
    fn from(x: f64) -> Self {
        Constant::Float(x)
    }
}

impl From<&str> for Constant {
    fn from(s: &str) -> Self {
        Constant::str(s)
    }
}
