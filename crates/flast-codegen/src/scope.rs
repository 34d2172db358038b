// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Scoped symbol table for function lowering.
//!
//! One `ScopeStack` is created per function and a scope is pushed for each
//! block, so `let` bindings die with their block. Lookup walks from the
//! innermost scope outward; declaring a name that already exists in the
//! innermost scope is an error.

use cranelift::prelude::EntityRef;
use cranelift_frontend::Variable;
use flast_ast::types::TypeDesc;
use flast_ast::Span;

/// A declared local: name, declared type, backing frontend variable,
/// mutability, and initialization state.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub ty: TypeDesc,
    pub var: Variable,
    pub mutable: bool,
    pub initialized: bool,
    pub span: Span,
}

/// One lexical scope: an insertion-ordered name → symbol map.
#[derive(Debug, Default)]
struct Scope {
    symbols: Vec<Symbol>,
}

impl Scope {
    fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.name == name)
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        self.symbols.iter_mut().find(|s| s.name == name)
    }
}

/// A stack of scopes.
#[derive(Debug)]
pub struct ScopeStack {
    scopes: Vec<Scope>,
}

impl ScopeStack {
    /// A fresh stack with the function's parameter scope.
    pub fn new() -> Self {
        Self { scopes: vec![Scope::default()] }
    }

    pub fn push(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn pop(&mut self) {
        debug_assert!(self.scopes.len() > 1, "cannot pop the function scope");
        self.scopes.pop();
    }

    /// Declare a symbol in the innermost scope. Fails when the name is
    /// already declared there; shadowing an outer scope is allowed.
    pub fn declare(&mut self, symbol: Symbol) -> Result<(), Symbol> {
        let scope = self.scopes.last_mut().expect("scope stack is never empty");
        if let Some(existing) = scope.get(&symbol.name) {
            return Err(existing.clone());
        }
        scope.symbols.push(symbol);
        Ok(())
    }

    /// Look a name up from the innermost scope outward.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        self.scopes.iter_mut().rev().find_map(|s| s.get_mut(name))
    }
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flast_ast::types::TypeTag;

    fn sym(name: &str, index: usize) -> Symbol {
        Symbol {
            name: name.to_string(),
            ty: TypeDesc::simple(TypeTag::I32),
            var: Variable::new(index),
            mutable: true,
            initialized: true,
            span: Span::new(0, 0),
        }
    }

    #[test]
    fn lookup_walks_outward() {
        let mut scopes = ScopeStack::new();
        scopes.declare(sym("outer", 0)).unwrap();
        scopes.push();
        scopes.declare(sym("inner", 1)).unwrap();

        assert!(scopes.lookup("outer").is_some());
        assert!(scopes.lookup("inner").is_some());
        scopes.pop();
        assert!(scopes.lookup("inner").is_none());
    }

    #[test]
    fn duplicate_in_same_scope_fails() {
        let mut scopes = ScopeStack::new();
        scopes.declare(sym("x", 0)).unwrap();
        assert!(scopes.declare(sym("x", 1)).is_err());
    }

    #[test]
    fn shadowing_outer_scope_is_allowed() {
        let mut scopes = ScopeStack::new();
        scopes.declare(sym("x", 0)).unwrap();
        scopes.push();
        scopes.declare(sym("x", 1)).unwrap();
        assert_eq!(scopes.lookup("x").unwrap().var, Variable::new(1));
        scopes.pop();
        assert_eq!(scopes.lookup("x").unwrap().var, Variable::new(0));
    }
}
