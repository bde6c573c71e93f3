//! Iteration protocol for `GetIter`/`ForIter` and the `iter`/`next`
//! builtins.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use core_types::{ExcKind, Object, Value};

use crate::error::raise;
use crate::generator::{Generator, GeneratorOutcome};
use crate::{Interpreter, RunError, RunResult};

/// Iterator over a tuple, list or string snapshot.
///
/// Lists are read live: items appended during iteration are visited.
pub struct SeqIterator {
    items: Value,
    index: Cell<usize>,
}

impl SeqIterator {
    fn new(items: Value) -> Rc<Self> {
        Rc::new(Self {
            items,
            index: Cell::new(0),
        })
    }

    fn next_item(&self) -> Option<Value> {
        let at = self.index.get();
        let item = match &self.items {
            Value::Tuple(items) => items.get(at).cloned(),
            Value::List(items) => items.borrow().get(at).cloned(),
            _ => None,
        };
        if item.is_some() {
            self.index.set(at + 1);
        }
        item
    }
}

impl Object for SeqIterator {
    fn type_name(&self) -> &'static str {
        "iterator"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl fmt::Debug for SeqIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeqIterator")
            .field("index", &self.index.get())
            .finish()
    }
}

/// `iter(value)`.
pub(crate) fn make_iter(value: Value) -> RunResult<Value> {
    let items = match &value {
        Value::Tuple(_) | Value::List(_) => value.clone(),
        Value::Str(s) => Value::tuple(s.chars().map(|c| Value::from(c.to_string())).collect()),
        Value::Dict(ns) => Value::tuple(ns.keys().into_iter().map(Value::Str).collect()),
        Value::Object(_)
            if value.downcast::<Generator>().is_some()
                || value.downcast::<SeqIterator>().is_some() =>
        {
            return Ok(value);
        }
        _ => {
            return Err(raise(
                ExcKind::TypeError,
                format!("'{}' object is not iterable", value.type_name()),
            ))
        }
    };
    Ok(Value::object(SeqIterator::new(items)))
}

impl Interpreter {
    /// Advance an iterator: `Some(item)`, or `None` once exhausted.
    ///
    /// A generator that raises `StopIteration` counts as exhausted.
    pub(crate) fn next_item(&mut self, iterator: &Value) -> RunResult<Option<Value>> {
        if let Some(seq) = iterator.downcast::<SeqIterator>() {
            return Ok(seq.next_item());
        }
        if let Some(generator) = iterator.downcast::<Generator>() {
            return match generator.resume(self, Value::None)? {
                GeneratorOutcome::Yielded(value) => Ok(Some(value)),
                GeneratorOutcome::Exhausted(_) => Ok(None),
                GeneratorOutcome::Errored(exc) if exc.matches(ExcKind::StopIteration) => Ok(None),
                GeneratorOutcome::Errored(exc) => Err(RunError::Raise(exc)),
            };
        }
        Err(raise(
            ExcKind::TypeError,
            format!("'{}' object is not an iterator", iterator.type_name()),
        ))
    }
}
