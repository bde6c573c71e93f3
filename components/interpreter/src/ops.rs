//! Arithmetic, comparison and container operations on values.
//!
//! Integer arithmetic stays in `i64` while it can and promotes to
//! arbitrary precision on overflow.

use std::cmp::Ordering;

use bytecode_system::{BinaryOp, CompareOp};
use core_types::{ExcKind, Value};
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::error::raise;
use crate::RunResult;

enum Num {
    Int(i64),
    Big(BigInt),
    Float(f64),
}

fn num(value: &Value) -> Option<Num> {
    match value {
        Value::Bool(b) => Some(Num::Int(i64::from(*b))),
        Value::Int(n) => Some(Num::Int(*n)),
        Value::BigInt(n) => Some(Num::Big((**n).clone())),
        Value::Float(f) => Some(Num::Float(*f)),
        _ => None,
    }
}

impl Num {
    fn to_big(&self) -> Option<BigInt> {
        match self {
            Num::Int(n) => Some(BigInt::from(*n)),
            Num::Big(n) => Some(n.clone()),
            Num::Float(_) => None,
        }
    }

    fn to_float(&self) -> f64 {
        match self {
            Num::Int(n) => *n as f64,
            Num::Big(n) => n.to_f64().unwrap_or(f64::INFINITY),
            Num::Float(f) => *f,
        }
    }

    fn is_float(&self) -> bool {
        matches!(self, Num::Float(_))
    }

    fn is_zero(&self) -> bool {
        match self {
            Num::Int(n) => *n == 0,
            Num::Big(n) => n.is_zero(),
            Num::Float(f) => *f == 0.0,
        }
    }
}

fn unsupported(op: &str, a: &Value, b: &Value) -> crate::RunError {
    raise(
        ExcKind::TypeError,
        format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op,
            a.type_name(),
            b.type_name()
        ),
    )
}

fn symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::FloorDiv => "//",
        BinaryOp::Mod => "%",
    }
}

/// Apply a binary operator.
///
/// # Examples
///
/// ```
/// use bytecode_system::BinaryOp;
/// use core_types::Value;
/// use interpreter::ops::binary;
///
/// assert_eq!(binary(BinaryOp::FloorDiv, &Value::Int(-7), &Value::Int(2)).ok(), Some(Value::Int(-4)));
/// assert_eq!(binary(BinaryOp::Mod, &Value::Int(-7), &Value::Int(2)).ok(), Some(Value::Int(1)));
/// ```
pub fn binary(op: BinaryOp, a: &Value, b: &Value) -> RunResult<Value> {
    if let (Some(x), Some(y)) = (num(a), num(b)) {
        return numeric(op, x, y);
    }
    match (op, a, b) {
        (BinaryOp::Add, Value::Str(x), Value::Str(y)) => Ok(Value::from(format!("{}{}", x, y))),
        (BinaryOp::Add, Value::Tuple(x), Value::Tuple(y)) => {
            Ok(Value::tuple(x.iter().chain(y.iter()).cloned().collect()))
        }
        (BinaryOp::Add, Value::List(x), Value::List(y)) => {
            let items = x.borrow().iter().chain(y.borrow().iter()).cloned().collect();
            Ok(Value::list(items))
        }
        (BinaryOp::Mul, seq, Value::Int(n)) | (BinaryOp::Mul, Value::Int(n), seq) => {
            repeat(seq, *n).ok_or_else(|| unsupported("*", a, b))
        }
        _ => Err(unsupported(symbol(op), a, b)),
    }
}

fn repeat(seq: &Value, times: i64) -> Option<Value> {
    let times = usize::try_from(times).unwrap_or(0);
    match seq {
        Value::Str(s) => Some(Value::from(s.repeat(times))),
        Value::Tuple(items) => Some(Value::tuple(repeat_items(items, times))),
        Value::List(items) => Some(Value::list(repeat_items(&items.borrow(), times))),
        _ => None,
    }
}

fn repeat_items(items: &[Value], times: usize) -> Vec<Value> {
    std::iter::repeat(items).take(times).flatten().cloned().collect()
}

fn numeric(op: BinaryOp, x: Num, y: Num) -> RunResult<Value> {
    if matches!(op, BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod) && y.is_zero() {
        let message = match op {
            BinaryOp::Div => "division by zero",
            _ => "integer division or modulo by zero",
        };
        return Err(raise(ExcKind::ZeroDivisionError, message));
    }
    if op == BinaryOp::Div || x.is_float() || y.is_float() {
        return Ok(Value::Float(float_op(op, x.to_float(), y.to_float())));
    }
    if let (Num::Int(a), Num::Int(b)) = (&x, &y) {
        if let Some(result) = small_op(op, *a, *b) {
            return Ok(Value::Int(result));
        }
    }
    match (x.to_big(), y.to_big()) {
        (Some(a), Some(b)) => Ok(Value::from(big_op(op, a, b))),
        _ => Ok(Value::Float(float_op(op, x.to_float(), y.to_float()))),
    }
}

fn small_op(op: BinaryOp, a: i64, b: i64) -> Option<i64> {
    match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::FloorDiv => {
            let (q, r) = (a.checked_div(b)?, a.checked_rem(b)?);
            Some(if r != 0 && (r < 0) != (b < 0) { q - 1 } else { q })
        }
        BinaryOp::Mod => {
            let r = a.checked_rem(b)?;
            Some(if r != 0 && (r < 0) != (b < 0) { r + b } else { r })
        }
        BinaryOp::Div => None,
    }
}

fn big_op(op: BinaryOp, a: BigInt, b: BigInt) -> BigInt {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::FloorDiv | BinaryOp::Div => {
            let (q, r) = (&a / &b, &a % &b);
            if !r.is_zero() && r.is_negative() != b.is_negative() {
                q - 1
            } else {
                q
            }
        }
        BinaryOp::Mod => {
            let r = &a % &b;
            if !r.is_zero() && r.is_negative() != b.is_negative() {
                r + b
            } else {
                r
            }
        }
    }
}

fn float_op(op: BinaryOp, a: f64, b: f64) -> f64 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::FloorDiv => (a / b).floor(),
        BinaryOp::Mod => {
            let r = a % b;
            if r != 0.0 && (r < 0.0) != (b < 0.0) {
                r + b
            } else {
                r
            }
        }
    }
}

/// Arithmetic negation.
pub fn negate(value: &Value) -> RunResult<Value> {
    match num(value) {
        Some(Num::Int(n)) => Ok(n
            .checked_neg()
            .map(Value::Int)
            .unwrap_or_else(|| Value::from(-BigInt::from(n)))),
        Some(Num::Big(n)) => Ok(Value::from(-n)),
        Some(Num::Float(f)) => Ok(Value::Float(-f)),
        None => Err(raise(
            ExcKind::TypeError,
            format!("bad operand type for unary -: '{}'", value.type_name()),
        )),
    }
}

/// Evaluate a comparison.
pub fn compare(op: CompareOp, a: &Value, b: &Value) -> RunResult<bool> {
    match op {
        CompareOp::Is => Ok(a.is(b)),
        CompareOp::IsNot => Ok(!a.is(b)),
        CompareOp::Eq => Ok(a == b),
        CompareOp::Ne => Ok(a != b),
        CompareOp::In => contains(b, a),
        CompareOp::NotIn => contains(b, a).map(|found| !found),
        CompareOp::Lt => Ok(order(a, b)? == Ordering::Less),
        CompareOp::Le => Ok(order(a, b)? != Ordering::Greater),
        CompareOp::Gt => Ok(order(a, b)? == Ordering::Greater),
        CompareOp::Ge => Ok(order(a, b)? != Ordering::Less),
    }
}

fn order(a: &Value, b: &Value) -> RunResult<Ordering> {
    if let (Some(x), Some(y)) = (num(a), num(b)) {
        let ordering = match (x.to_big(), y.to_big()) {
            (Some(p), Some(q)) => Some(p.cmp(&q)),
            _ => x.to_float().partial_cmp(&y.to_float()),
        };
        return Ok(ordering.unwrap_or(Ordering::Equal));
    }
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        (Value::Tuple(x), Value::Tuple(y)) => order_items(x, y),
        (Value::List(x), Value::List(y)) => order_items(&x.borrow(), &y.borrow()),
        _ => Err(raise(
            ExcKind::TypeError,
            format!(
                "unorderable types: {}() and {}()",
                a.type_name(),
                b.type_name()
            ),
        )),
    }
}

fn order_items(x: &[Value], y: &[Value]) -> RunResult<Ordering> {
    for (p, q) in x.iter().zip(y) {
        if p != q {
            return order(p, q);
        }
    }
    Ok(x.len().cmp(&y.len()))
}

/// Membership test: `item in container`.
pub fn contains(container: &Value, item: &Value) -> RunResult<bool> {
    match container {
        Value::Tuple(items) => Ok(items.iter().any(|v| v == item)),
        Value::List(items) => Ok(items.borrow().iter().any(|v| v == item)),
        Value::Dict(ns) => Ok(item.as_str().is_some_and(|key| ns.contains(key))),
        Value::Str(s) => match item {
            Value::Str(needle) => Ok(s.contains(&**needle)),
            _ => Err(raise(
                ExcKind::TypeError,
                "'in <string>' requires string as left operand",
            )),
        },
        _ => Err(raise(
            ExcKind::TypeError,
            format!("argument of type '{}' is not iterable", container.type_name()),
        )),
    }
}

fn index(len: usize, key: &Value, what: &str) -> RunResult<usize> {
    let n = key.as_int().ok_or_else(|| {
        raise(
            ExcKind::TypeError,
            format!("{} indices must be integers, not {}", what, key.type_name()),
        )
    })?;
    let resolved = if n < 0 { n + len as i64 } else { n };
    usize::try_from(resolved)
        .ok()
        .filter(|&i| i < len)
        .ok_or_else(|| raise(ExcKind::IndexError, format!("{} index out of range", what)))
}

fn dict_key(key: &Value) -> RunResult<&str> {
    key.as_str().ok_or_else(|| {
        raise(
            ExcKind::TypeError,
            format!("dict keys must be strings, not {}", key.type_name()),
        )
    })
}

/// `container[key]`.
pub fn subscript(container: &Value, key: &Value) -> RunResult<Value> {
    match container {
        Value::Tuple(items) => Ok(items[index(items.len(), key, "tuple")?].clone()),
        Value::List(items) => {
            let items = items.borrow();
            Ok(items[index(items.len(), key, "list")?].clone())
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let at = index(chars.len(), key, "string")?;
            Ok(Value::from(chars[at].to_string()))
        }
        Value::Dict(ns) => {
            let name = dict_key(key)?;
            ns.get(name)
                .ok_or_else(|| raise(ExcKind::KeyError, name.to_string()))
        }
        _ => Err(raise(
            ExcKind::TypeError,
            format!("'{}' object is not subscriptable", container.type_name()),
        )),
    }
}

/// `container[key] = value`.
pub fn store_subscript(container: &Value, key: &Value, value: Value) -> RunResult<()> {
    match container {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let at = index(items.len(), key, "list assignment")?;
            items[at] = value;
            Ok(())
        }
        Value::Dict(ns) => {
            ns.insert(dict_key(key)?, value);
            Ok(())
        }
        _ => Err(raise(
            ExcKind::TypeError,
            format!(
                "'{}' object does not support item assignment",
                container.type_name()
            ),
        )),
    }
}

/// The items of a tuple or list, for unpacking.
pub fn sequence_items(value: &Value) -> RunResult<Vec<Value>> {
    match value {
        Value::Tuple(items) => Ok(items.to_vec()),
        Value::List(items) => Ok(items.borrow().clone()),
        _ => Err(raise(
            ExcKind::TypeError,
            format!("'{}' object is not iterable", value.type_name()),
        )),
    }
}

/// `len(value)`.
pub fn length(value: &Value) -> RunResult<usize> {
    match value {
        Value::Str(s) => Ok(s.chars().count()),
        Value::Tuple(items) => Ok(items.len()),
        Value::List(items) => Ok(items.borrow().len()),
        Value::Dict(ns) => Ok(ns.len()),
        _ => Err(raise(
            ExcKind::TypeError,
            format!("object of type '{}' has no len()", value.type_name()),
        )),
    }
}
