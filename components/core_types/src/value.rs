//! Runtime value representation.
//!
//! This module provides the `Value` enum that represents everything the
//! operand stack and the scopes can hold.

use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::{ExcKind, ExceptionRef, Namespace, Object, ObjectRef};

/// Represents any runtime value.
///
/// Immediate values (`None`, booleans, small integers, floats) are stored
/// inline; everything else is reference counted so that pushing and popping
/// never deep-copies.
///
/// # Examples
///
/// ```
/// use core_types::Value;
///
/// let none = Value::None;
/// let number = Value::Int(42);
/// let text = Value::from("hello");
///
/// assert!(!none.is_truthy());
/// assert!(number.is_truthy());
/// assert_eq!(text.type_name(), "str");
/// ```
#[derive(Clone)]
pub enum Value {
    /// The `None` singleton
    None,
    /// Boolean
    Bool(bool),
    /// Machine-width integer
    Int(i64),
    /// Arbitrary precision integer (produced on `Int` overflow)
    BigInt(Rc<BigInt>),
    /// IEEE 754 double
    Float(f64),
    /// Immutable string
    Str(Rc<str>),
    /// Immutable sequence
    Tuple(Rc<[Value]>),
    /// Mutable sequence
    List(Rc<RefCell<Vec<Value>>>),
    /// Mutable string-keyed mapping
    Dict(Namespace),
    /// Exception instance
    Exception(ExceptionRef),
    /// Exception class (callable to build an instance)
    ExceptionType(ExcKind),
    /// Interpreter-owned object (frame, function, generator, ...)
    Object(ObjectRef),
}

impl Value {
    /// Wrap an interpreter-owned object.
    pub fn object<T: Object>(object: Rc<T>) -> Value {
        Value::Object(object)
    }

    /// Recover a concrete interpreter-owned object.
    ///
    /// Returns `None` when the value is not an object or holds a different
    /// concrete type.
    pub fn downcast<T: Object>(&self) -> Option<Rc<T>> {
        match self {
            Value::Object(object) => Rc::clone(object).into_any().downcast::<T>().ok(),
            _ => None,
        }
    }

    /// Build a tuple value.
    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(items.into())
    }

    /// Build a list value.
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    /// Returns whether this is `None`.
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Truth value used by conditional jumps and `not`.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_types::Value;
    ///
    /// assert!(!Value::None.is_truthy());
    /// assert!(!Value::Int(0).is_truthy());
    /// assert!(!Value::from("").is_truthy());
    /// assert!(Value::Float(0.5).is_truthy());
    /// assert!(!Value::tuple(vec![]).is_truthy());
    /// ```
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::BigInt(n) => !n.is_zero(),
            Value::Float(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Dict(ns) => !ns.is_empty(),
            Value::Exception(_) | Value::ExceptionType(_) | Value::Object(_) => true,
        }
    }

    /// Type name as reported by introspection and error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) | Value::BigInt(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Tuple(_) => "tuple",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Exception(e) => e.kind().name(),
            Value::ExceptionType(_) => "type",
            Value::Object(o) => o.type_name(),
        }
    }

    /// Integer view of the value, if it has one that fits in an `i64`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::BigInt(n) => n.to_i64(),
            _ => None,
        }
    }

    /// String view of the value, if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Identity comparison (`is`): same immediate value or same allocation.
    pub fn is(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => Rc::ptr_eq(a, b),
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b),
            (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => a.ptr_eq(b),
            (Value::Exception(a), Value::Exception(b)) => Rc::ptr_eq(a, b),
            (Value::ExceptionType(a), Value::ExceptionType(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Int(n) => f.debug_tuple("Int").field(n).finish(),
            Value::BigInt(n) => f.debug_tuple("BigInt").field(n).finish(),
            Value::Float(n) => f.debug_tuple("Float").field(n).finish(),
            Value::Str(s) => f.debug_tuple("Str").field(s).finish(),
            Value::Tuple(items) => f.debug_tuple("Tuple").field(items).finish(),
            Value::List(items) => f.debug_tuple("List").field(&items.borrow()).finish(),
            Value::Dict(ns) => f.debug_tuple("Dict").field(ns).finish(),
            Value::Exception(e) => f.debug_tuple("Exception").field(&e.to_string()).finish(),
            Value::ExceptionType(k) => f.debug_tuple("ExceptionType").field(k).finish(),
            Value::Object(o) => fmt::Debug::fmt(&**o, f),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::Int(a), Value::BigInt(b)) | (Value::BigInt(b), Value::Int(a)) => {
                BigInt::from(*a) == **b
            }
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Dict(a), Value::Dict(b)) => a.ptr_eq(b) || a.entries() == b.entries(),
            (Value::Exception(a), Value::Exception(b)) => Rc::ptr_eq(a, b),
            (Value::ExceptionType(a), Value::ExceptionType(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}

impl From<BigInt> for Value {
    /// Narrows back to `Int` whenever the result fits.
    fn from(n: BigInt) -> Self {
        match n.to_i64() {
            Some(small) => Value::Int(small),
            None => Value::BigInt(Rc::new(n)),
        }
    }
}

impl From<ExceptionRef> for Value {
    fn from(e: ExceptionRef) -> Self {
        Value::Exception(e)
    }
}

/// String conversion (`str()`).
///
/// # Examples
///
/// ```
/// use core_types::Value;
///
/// assert_eq!(Value::None.to_string(), "None");
/// assert_eq!(Value::Bool(true).to_string(), "True");
/// assert_eq!(Value::Float(2.0).to_string(), "2.0");
/// assert_eq!(Value::tuple(vec![Value::Int(1), Value::from("a")]).to_string(), "(1, 'a')");
/// ```
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(n) => write!(f, "{}", n),
            Value::BigInt(n) => write!(f, "{}", n),
            Value::Float(n) => {
                if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e16 {
                    write!(f, "{:.1}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Str(s) => write!(f, "{}", s),
            Value::Tuple(items) => {
                write!(f, "(")?;
                write_items(f, items)?;
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Value::List(items) => {
                write!(f, "[")?;
                write_items(f, &items.borrow())?;
                write!(f, "]")
            }
            Value::Dict(ns) => {
                write!(f, "{{")?;
                for (i, (key, value)) in ns.entries().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "'{}': ", key)?;
                    write_item(f, value)?;
                }
                write!(f, "}}")
            }
            Value::Exception(e) => write!(f, "{}", e.message()),
            Value::ExceptionType(k) => write!(f, "<class '{}'>", k),
            Value::Object(o) => write!(f, "<{} object>", o.type_name()),
        }
    }
}

fn write_items(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write_item(f, item)?;
    }
    Ok(())
}

fn write_item(f: &mut fmt::Formatter<'_>, item: &Value) -> fmt::Result {
    match item {
        Value::Str(s) => write!(f, "'{}'", s),
        other => write!(f, "{}", other),
    }
}
