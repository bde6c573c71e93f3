//! Shared name-to-value mapping.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::Value;

/// An ordered, shared, mutable mapping from names to values.
///
/// Cloning a `Namespace` clones the handle, not the contents: globals,
/// builtins and materialized locals views are all shared this way, so a
/// write through one handle is visible through every other.
///
/// # Examples
///
/// ```
/// use core_types::{Namespace, Value};
///
/// let globals = Namespace::new();
/// let alias = globals.clone();
/// globals.insert("x", Value::Int(1));
/// assert_eq!(alias.get("x"), Some(Value::Int(1)));
/// assert!(alias.ptr_eq(&globals));
/// ```
#[derive(Clone, Default)]
pub struct Namespace {
    entries: Rc<RefCell<IndexMap<Rc<str>, Value>>>,
}

impl Namespace {
    /// Create an empty namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a name.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.entries.borrow().get(name).cloned()
    }

    /// Bind a name, replacing any previous value.
    pub fn insert(&self, name: impl Into<Rc<str>>, value: Value) {
        self.entries.borrow_mut().insert(name.into(), value);
    }

    /// Remove a binding, returning the old value if there was one.
    pub fn remove(&self, name: &str) -> Option<Value> {
        self.entries.borrow_mut().shift_remove(name)
    }

    /// Returns whether the name is bound.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.borrow().contains_key(name)
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Returns whether there are no bindings.
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Bound names in insertion order.
    pub fn keys(&self) -> Vec<Rc<str>> {
        self.entries.borrow().keys().cloned().collect()
    }

    /// Snapshot of every binding in insertion order.
    pub fn entries(&self) -> Vec<(Rc<str>, Value)> {
        self.entries
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Returns whether both handles refer to the same mapping.
    pub fn ptr_eq(&self, other: &Namespace) -> bool {
        Rc::ptr_eq(&self.entries, &other.entries)
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Keys only: values may refer back to this namespace.
        f.debug_set().entries(self.entries.borrow().keys()).finish()
    }
}
