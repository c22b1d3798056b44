//! Nested scopes and the symbol table (`spec.md` §3, §4.1).
//!
//! Modeled on the teacher's `scope.py` (`ScopeManager`/`Scope`/`Symbol`):
//! a tree of scopes rooted at "global", declare-then-lookup, local index
//! assignment on declaration. Rust can't hold `parent: &Scope` borrows
//! while also mutating children, so the tree is realized as a flat arena
//! (`Vec<ScopeData>`) addressed by `ScopeId`, the way the teacher's own
//! `Namespaces` (`namespace.rs`) stores frames in a flat `Vec` addressed by
//! `NamespaceId` rather than a pointer chain.

use ahash::AHashMap;

use crate::position::Position;
use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Parameter,
    Function,
    Builtin,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub ty: Type,
    pub kind: SymbolKind,
    pub pos: Option<Position>,
    pub is_global: bool,
    /// Assigned when declared in a non-global scope (`spec.md` §3).
    pub local_index: Option<u32>,
}

#[derive(Debug)]
struct ScopeData {
    parent: Option<ScopeId>,
    name: String,
    symbols: AHashMap<String, Symbol>,
    local_count: u32,
}

/// Owns every scope created during analysis and tracks the current one.
#[derive(Debug)]
pub struct ScopeTree {
    scopes: Vec<ScopeData>,
    global: ScopeId,
    current: ScopeId,
}

impl ScopeTree {
    #[must_use]
    pub fn new() -> Self {
        let global = ScopeData {
            parent: None,
            name: "global".to_owned(),
            symbols: AHashMap::new(),
            local_count: 0,
        };
        Self {
            scopes: vec![global],
            global: ScopeId(0),
            current: ScopeId(0),
        }
    }

    #[must_use]
    pub fn global(&self) -> ScopeId {
        self.global
    }

    #[must_use]
    pub fn current(&self) -> ScopeId {
        self.current
    }

    #[must_use]
    pub fn is_global_scope(&self, scope: ScopeId) -> bool {
        scope == self.global
    }

    /// Pushes a fresh child scope of `current` and makes it current.
    pub fn enter_scope(&mut self, name: impl Into<String>) -> ScopeId {
        let parent = self.current;
        let id = ScopeId(self.scopes.len());
        self.scopes.push(ScopeData {
            parent: Some(parent),
            name: name.into(),
            symbols: AHashMap::new(),
            local_count: 0,
        });
        self.current = id;
        id
    }

    /// Restores `current` to the given scope's parent.
    ///
    /// # Panics
    /// Panics if `scope` is the global scope (mirrors `scope.py`'s
    /// `ScopeManager.exit_scope` refusing to pop past the bottom frame).
    pub fn exit_scope(&mut self, scope: ScopeId) {
        let parent = self.scopes[scope.0]
            .parent
            .expect("cannot exit the global scope");
        self.current = parent;
    }

    /// Declares `symbol` in `scope`. Non-global variables/parameters get
    /// the next local index in that scope.
    ///
    /// # Errors
    /// Returns the already-declared `Symbol`'s position on redeclaration
    /// (`spec.md` §3: "redeclaration in the same scope is an error").
    pub fn declare(&mut self, scope: ScopeId, mut symbol: Symbol) -> Result<(), Option<Position>> {
        let data = &mut self.scopes[scope.0];
        if let Some(existing) = data.symbols.get(&symbol.name) {
            return Err(existing.pos);
        }
        if matches!(symbol.kind, SymbolKind::Variable | SymbolKind::Parameter) && !symbol.is_global {
            symbol.local_index = Some(data.local_count);
            data.local_count += 1;
        }
        data.symbols.insert(symbol.name.clone(), symbol);
        Ok(())
    }

    /// Looks up `name` starting at `scope` and walking up to the global
    /// scope (lexical shadowing: the nearest enclosing declaration wins).
    #[must_use]
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<&Symbol> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let data = &self.scopes[id.0];
            if let Some(sym) = data.symbols.get(name) {
                return Some(sym);
            }
            current = data.parent;
        }
        None
    }

    #[must_use]
    pub fn lookup_local(&self, scope: ScopeId, name: &str) -> Option<&Symbol> {
        self.scopes[scope.0].symbols.get(name)
    }

    #[must_use]
    pub fn local_count(&self, scope: ScopeId) -> u32 {
        self.scopes[scope.0].local_count
    }

    #[must_use]
    pub fn name(&self, scope: ScopeId) -> &str {
        &self.scopes[scope.0].name
    }
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, ty: Type, is_global: bool) -> Symbol {
        Symbol {
            name: name.to_owned(),
            ty,
            kind: SymbolKind::Variable,
            pos: None,
            is_global,
            local_index: None,
        }
    }

    #[test]
    fn redeclaration_in_same_scope_is_rejected() {
        let mut tree = ScopeTree::new();
        let g = tree.global();
        tree.declare(g, var("a", Type::Integer, true)).unwrap();
        let err = tree.declare(g, var("a", Type::Boolean, true));
        assert!(err.is_err());
    }

    #[test]
    fn shadowing_across_scopes_is_allowed() {
        let mut tree = ScopeTree::new();
        let g = tree.global();
        tree.declare(g, var("a", Type::Integer, true)).unwrap();
        let child = tree.enter_scope("block");
        tree.declare(child, var("a", Type::Boolean, false)).unwrap();
        assert_eq!(tree.lookup(child, "a").unwrap().ty, Type::Boolean);
        tree.exit_scope(child);
        assert_eq!(tree.lookup(tree.current(), "a").unwrap().ty, Type::Integer);
    }

    #[test]
    fn local_indices_assigned_in_declaration_order() {
        let mut tree = ScopeTree::new();
        let g = tree.global();
        let child = tree.enter_scope("fn");
        tree.declare(child, var("x", Type::Integer, false)).unwrap();
        tree.declare(child, var("y", Type::Integer, false)).unwrap();
        assert_eq!(tree.lookup(child, "x").unwrap().local_index, Some(0));
        assert_eq!(tree.lookup(child, "y").unwrap().local_index, Some(1));
        let _ = g;
    }

    #[test]
    #[should_panic(expected = "cannot exit the global scope")]
    fn exiting_global_scope_panics() {
        let mut tree = ScopeTree::new();
        let g = tree.global();
        tree.exit_scope(g);
    }
}
