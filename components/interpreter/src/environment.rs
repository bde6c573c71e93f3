//! Name bindings for one frame: locals, globals and builtins.

use std::rc::Rc;

use core_types::{Namespace, Value};
use thiserror::Error;

/// A name lookup or deletion found no binding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("name '{0}' is not defined")]
pub struct NameNotFound(pub String);

#[derive(Debug)]
enum Locals {
    /// Optimized code: one slot per local, plus the visible mapping once
    /// somebody asked for it
    Fast {
        names: Rc<[Rc<str>]>,
        slots: Vec<Option<Value>>,
        view: Option<Namespace>,
    },
    /// Module-level code: the mapping is the storage
    Mapped(Namespace),
}

/// The three-scope environment of a frame.
///
/// Lookups search locals, then globals, then builtins.
#[derive(Debug)]
pub struct Environment {
    locals: Locals,
    globals: Namespace,
    builtins: Namespace,
}

impl Environment {
    /// Environment for optimized code: locals live in `slots`, named by
    /// `names` index for index.
    pub fn fast(
        names: Rc<[Rc<str>]>,
        slots: Vec<Option<Value>>,
        globals: Namespace,
        builtins: Namespace,
    ) -> Self {
        Self {
            locals: Locals::Fast {
                names,
                slots,
                view: None,
            },
            globals,
            builtins,
        }
    }

    /// Environment for non-optimized code whose locals are a mapping.
    pub fn mapped(locals: Namespace, globals: Namespace, builtins: Namespace) -> Self {
        Self {
            locals: Locals::Mapped(locals),
            globals,
            builtins,
        }
    }

    /// The globals mapping.
    pub fn globals(&self) -> &Namespace {
        &self.globals
    }

    /// The builtins mapping.
    pub fn builtins(&self) -> &Namespace {
        &self.builtins
    }

    /// Search locals, globals, builtins.
    pub fn lookup(&self, name: &str) -> Result<Value, NameNotFound> {
        let local = match &self.locals {
            Locals::Fast { names, slots, .. } => names
                .iter()
                .position(|n| &**n == name)
                .and_then(|i| slots[i].clone()),
            Locals::Mapped(ns) => ns.get(name),
        };
        match local {
            Some(value) => Ok(value),
            None => self.lookup_global(name),
        }
    }

    /// Search globals, then builtins.
    pub fn lookup_global(&self, name: &str) -> Result<Value, NameNotFound> {
        self.globals
            .get(name)
            .or_else(|| self.builtins.get(name))
            .ok_or_else(|| NameNotFound(name.to_string()))
    }

    /// Bind a local by name.
    pub fn bind(&mut self, name: &str, value: Value) {
        match &mut self.locals {
            Locals::Fast { names, slots, .. } => {
                if let Some(i) = names.iter().position(|n| &**n == name) {
                    slots[i] = Some(value);
                } else {
                    self.globals.insert(name, value);
                }
            }
            Locals::Mapped(ns) => ns.insert(name, value),
        }
    }

    /// Unbind a local by name.
    pub fn delete(&mut self, name: &str) -> Result<(), NameNotFound> {
        let removed = match &mut self.locals {
            Locals::Fast { names, slots, .. } => names
                .iter()
                .position(|n| &**n == name)
                .and_then(|i| slots[i].take()),
            Locals::Mapped(ns) => ns.remove(name),
        };
        removed.map(drop).ok_or_else(|| NameNotFound(name.to_string()))
    }

    /// Read a fast slot. `None` when unbound or out of range.
    pub fn load_fast(&self, index: usize) -> Option<Value> {
        match &self.locals {
            Locals::Fast { slots, .. } => slots.get(index).cloned().flatten(),
            Locals::Mapped(_) => None,
        }
    }

    /// Write a fast slot.
    pub fn store_fast(&mut self, index: usize, value: Value) {
        if let Locals::Fast { slots, .. } = &mut self.locals {
            if let Some(slot) = slots.get_mut(index) {
                *slot = Some(value);
            }
        }
    }

    /// Unbind a fast slot, returning whether it was bound.
    pub fn delete_fast(&mut self, index: usize) -> bool {
        match &mut self.locals {
            Locals::Fast { slots, .. } => slots
                .get_mut(index)
                .and_then(Option::take)
                .is_some(),
            Locals::Mapped(_) => false,
        }
    }

    /// Returns whether the visible locals mapping exists.
    ///
    /// Always true for mapped locals.
    pub fn is_materialized(&self) -> bool {
        match &self.locals {
            Locals::Fast { view, .. } => view.is_some(),
            Locals::Mapped(_) => true,
        }
    }

    /// The visible locals mapping, created on first request and refreshed
    /// from the fast slots on every request.
    ///
    /// The same mapping is returned for the lifetime of the frame.
    pub fn materialize_locals(&mut self) -> Namespace {
        if let Locals::Fast { view, .. } = &mut self.locals {
            view.get_or_insert_with(Namespace::new);
        }
        self.refresh_view();
        match &self.locals {
            Locals::Fast { view, .. } => view.clone().unwrap_or_default(),
            Locals::Mapped(ns) => ns.clone(),
        }
    }

    /// Copy the fast slots into the visible mapping, if it exists.
    pub fn refresh_view(&mut self) {
        if let Locals::Fast {
            names,
            slots,
            view: Some(view),
        } = &self.locals
        {
            for (name, slot) in names.iter().zip(slots) {
                match slot {
                    Some(value) => view.insert(name.clone(), value.clone()),
                    None => {
                        view.remove(name);
                    }
                }
            }
        }
    }

    /// Copy edits made through the visible mapping back into the fast
    /// slots. No-op when the mapping was never materialized.
    pub fn sync_back_from_locals(&mut self) {
        if let Locals::Fast {
            names,
            slots,
            view: Some(view),
        } = &mut self.locals
        {
            for (name, slot) in names.iter().zip(slots.iter_mut()) {
                *slot = view.get(name);
            }
        }
    }
}
