//! Two-pass lexical scoping (spec.md §4.3).
//!
//! A [`LexicalContext`] mirrors function nesting while the parser walks the
//! token stream. Reads and writes of the same name can happen in either
//! order relative to the enclosing function's own reads of it, so the
//! upgrade from `local` to `exported` has to be visible through every
//! [`Variable`] handed out earlier -- hence the `Rc<Cell<Scope>>` rather
//! than a plain enum copied into each AST node.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// Storage scope of a resolved name (spec.md §3 "Variable").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Local,
    Exported,
    Closure,
    Global,
}

/// A name bound in some [`LexicalContext`], shared by every AST node that
/// references it. Mutating `scope` (via [`VarCell::set_scope`]) is visible
/// to every clone, which is how a read from a nested function upgrades a
/// variable the parser already emitted a [`GetVariable`](crate::ast::Node)
/// for.
#[derive(Debug)]
pub struct VarCell {
    pub name: String,
    scope: Cell<Scope>,
}

impl VarCell {
    fn new(name: impl Into<String>, scope: Scope) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            scope: Cell::new(scope),
        })
    }

    pub fn scope(&self) -> Scope {
        self.scope.get()
    }

    fn set_scope(&self, scope: Scope) {
        self.scope.set(scope);
    }
}

/// A resolved name: shared handle into the [`LexicalContext`] that owns it.
pub type Variable = Rc<VarCell>;

struct ContextInner {
    parent: Option<LexicalContext>,
    order: RefCell<Vec<String>>,
    variables: RefCell<HashMap<String, Variable>>,
}

/// A lexical scope, one per program and one per function body. Cheaply
/// cloned (it's a reference-counted handle): clones all observe the same
/// underlying variable map, matching the original's single mutable
/// dictionary per scope.
#[derive(Clone)]
pub struct LexicalContext(Rc<ContextInner>);

impl LexicalContext {
    /// The outermost context, representing the program itself. Its `local`
    /// variables are emitted as the root code object's own fast locals
    /// (spec.md §3 LexicalContext invariants).
    pub fn root() -> Self {
        Self(Rc::new(ContextInner {
            parent: None,
            order: RefCell::new(Vec::new()),
            variables: RefCell::new(HashMap::new()),
        }))
    }

    /// Open a child context for a function body, pre-registering `args` as
    /// `local` (spec.md §4.3 `push`).
    pub fn push(&self, args: &[String]) -> Self {
        let child = Self(Rc::new(ContextInner {
            parent: Some(self.clone()),
            order: RefCell::new(Vec::new()),
            variables: RefCell::new(HashMap::new()),
        }));
        for arg in args {
            child.ensure(arg, Scope::Local);
        }
        child
    }

    /// Define (or redefine) `name` in this context at `scope`, discarding
    /// any prior binding -- used both for pre-registering parameters and for
    /// a `closure` view created by [`request`](Self::request).
    pub fn ensure(&self, name: &str, scope: Scope) -> Variable {
        let var = VarCell::new(name, scope);
        let mut variables = self.0.variables.borrow_mut();
        if variables.insert(name.to_string(), var.clone()).is_none() {
            self.0.order.borrow_mut().push(name.to_string());
        }
        var
    }

    fn lookup_here(&self, name: &str) -> Option<Variable> {
        self.0.variables.borrow().get(name).cloned()
    }

    /// Resolve `name`, starting in this context. `level` counts how many
    /// contexts we have walked up from the original requester; a `local`
    /// found at `level > 0` is upgraded to `exported` in place (spec.md
    /// §4.3 `request`).
    fn request_at(&self, name: &str, level: usize) -> Variable {
        if let Some(var) = self.lookup_here(name) {
            if level > 0 && var.scope() == Scope::Local {
                var.set_scope(Scope::Exported);
            }
            return var;
        }

        match &self.0.parent {
            Some(parent) => {
                let found = parent.request_at(name, level + 1);
                match found.scope() {
                    Scope::Exported | Scope::Closure => self.ensure(name, Scope::Closure),
                    scope => VarCell::new(name, scope),
                }
            }
            None => VarCell::new(name, Scope::Global),
        }
    }

    /// Find which context owns `name`, upgrading ancestors as needed
    /// (spec.md §4.3 `request`). Never mutates the `global` case -- a
    /// `global` variable is never stored in any context map.
    pub fn request(&self, name: &str) -> Variable {
        self.request_at(name, 0)
    }

    /// As [`request`](Self::request), but a never-seen (`global`) name
    /// becomes a fresh `local` binding in this context (spec.md §4.3
    /// `assign`) -- this is how plain assignment introduces a name.
    pub fn assign(&self, name: &str) -> Variable {
        let var = self.request(name);
        if var.scope() == Scope::Global {
            return self.ensure(name, Scope::Local);
        }
        var
    }

    /// Names bound in this context at `scope`, in first-use order (spec.md
    /// §4.3 `varnames`); consumed by the emitter to build `cellvars` and
    /// the `Function`/`Program` node's `cell`/`free` lists.
    pub fn varnames(&self, scope: Scope) -> Vec<String> {
        let order = self.0.order.borrow();
        let variables = self.0.variables.borrow();
        order
            .iter()
            .filter(|name| {
                variables
                    .get(*name)
                    .map(|v| v.scope() == scope)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_of_unseen_name_becomes_local() {
        let root = LexicalContext::root();
        let var = root.assign("a");
        assert_eq!(var.scope(), Scope::Local);
        assert_eq!(root.varnames(Scope::Local), vec!["a".to_string()]);
    }

    #[test]
    fn request_from_unrelated_context_is_global() {
        let root = LexicalContext::root();
        let var = root.request("nowhere");
        assert_eq!(var.scope(), Scope::Global);
        assert!(root.varnames(Scope::Global).is_empty());
    }

    #[test]
    fn nested_read_upgrades_local_to_exported_and_closure() {
        let root = LexicalContext::root();
        root.assign("x");
        let inner = root.push(&[]);
        let var = inner.request("x");
        assert_eq!(var.scope(), Scope::Closure);
        assert_eq!(root.varnames(Scope::Exported), vec!["x".to_string()]);
        assert_eq!(inner.varnames(Scope::Closure), vec!["x".to_string()]);
    }

    #[test]
    fn deeper_nesting_forwards_closure_through_intermediate_context() {
        let root = LexicalContext::root();
        root.assign("x");
        let middle = root.push(&[]);
        let inner = middle.push(&[]);
        let var = inner.request("x");
        assert_eq!(var.scope(), Scope::Closure);
        assert_eq!(middle.varnames(Scope::Closure), vec!["x".to_string()]);
        assert_eq!(inner.varnames(Scope::Closure), vec!["x".to_string()]);
        assert_eq!(root.varnames(Scope::Exported), vec!["x".to_string()]);
    }

    #[test]
    fn args_are_preregistered_local() {
        let root = LexicalContext::root();
        let inner = root.push(&["n".to_string()]);
        assert_eq!(inner.request("n").scope(), Scope::Local);
    }
}
