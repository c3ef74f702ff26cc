//! Chained name→value scopes for the treewalk backend.
//!
//! A scope maps names to runtime values and optionally points at its parent,
//! forming a singly-linked chain with the globals at the root. Scopes are
//! shared (`Rc<RefCell<_>>`) because closures privately retain the scope
//! they captured while the execution stack walks in and out of it; parent
//! links are plain `Rc` clones, kept alive by whichever closure or call
//! frame still needs them.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;

use crate::value::RuntimeValue;

/// Shared handle to one scope.
pub type EnvRef = Rc<RefCell<Environment>>;

/// One scope in the chain.
#[derive(Debug, Default)]
pub struct Environment {
    values: AHashMap<String, RuntimeValue>,
    parent: Option<EnvRef>,
}

impl Environment {
    /// Creates a root (global) scope.
    #[must_use]
    pub fn root() -> EnvRef {
        Rc::new(RefCell::new(Self::default()))
    }

    /// Creates a scope whose lookups fall through to `parent`.
    #[must_use]
    pub fn child(parent: &EnvRef) -> EnvRef {
        Rc::new(RefCell::new(Self {
            values: AHashMap::new(),
            parent: Some(Rc::clone(parent)),
        }))
    }

    /// Binds `name` in this scope, overwriting any existing binding here.
    /// The name is copied; this and string concatenation are the only
    /// string copies the treewalk backend makes.
    pub fn define(&mut self, name: &str, value: RuntimeValue) {
        self.values.insert(name.to_owned(), value);
    }

    /// Reads `name` from the nearest enclosing scope that binds it.
    #[must_use]
    pub fn get(env: &EnvRef, name: &str) -> Option<RuntimeValue> {
        let mut current = Rc::clone(env);
        loop {
            if let Some(value) = current.borrow().values.get(name) {
                return Some(value.clone());
            }
            let parent = current.borrow().parent.clone()?;
            current = parent;
        }
    }

    /// Mutates the nearest enclosing binding of `name`. Returns `false` when
    /// no scope in the chain binds it (an undefined-variable error at the
    /// call site).
    #[must_use]
    pub fn assign(env: &EnvRef, name: &str, value: RuntimeValue) -> bool {
        let mut current = Rc::clone(env);
        loop {
            if let Some(slot) = current.borrow_mut().values.get_mut(name) {
                *slot = value;
                return true;
            }
            let Some(parent) = current.borrow().parent.clone() else {
                return false;
            };
            current = parent;
        }
    }

    /// Reads `name` from the scope exactly `depth` parents up.
    ///
    /// The resolver guarantees the binding exists there; `None` indicates a
    /// resolver/interpreter disagreement, which callers surface as an
    /// undefined variable rather than a panic.
    #[must_use]
    pub fn get_at(env: &EnvRef, depth: usize, name: &str) -> Option<RuntimeValue> {
        let scope = Self::ancestor(env, depth)?;
        let value = scope.borrow().values.get(name).cloned();
        value
    }

    /// Writes `name` in the scope exactly `depth` parents up.
    #[must_use]
    pub fn assign_at(env: &EnvRef, depth: usize, name: &str, value: RuntimeValue) -> bool {
        let Some(scope) = Self::ancestor(env, depth) else {
            return false;
        };
        let result = match scope.borrow_mut().values.get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        };
        result
    }

    fn ancestor(env: &EnvRef, depth: usize) -> Option<EnvRef> {
        let mut current = Rc::clone(env);
        for _ in 0..depth {
            let parent = current.borrow().parent.clone()?;
            current = parent;
        }
        Some(current)
    }
}
