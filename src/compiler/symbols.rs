use std::collections::HashMap;

use crate::parser::DeclId;

/// Nested scopes mapping names to their declarations
#[derive(Debug, Clone)]
pub struct SymbolTable {
    /// Stack of nested scopes, innermost last
    scopes: Vec<HashMap<String, DeclId>>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// Creates a table with a single, global scope
    pub fn new() -> Self {
        SymbolTable {
            scopes: vec![HashMap::new()],
        }
    }

    /// Enters a new nested scope
    pub fn open_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Leaves the innermost scope; the last remaining scope is cleared instead
    pub fn close_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        } else if let Some(global) = self.scopes.last_mut() {
            global.clear();
        }
    }

    /// Binds a name in the innermost scope
    pub fn insert(&mut self, name: impl Into<String>, decl: DeclId) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), decl);
        }
    }

    /// Finds the innermost declaration of a name
    pub fn lookup(&self, name: &str) -> Option<DeclId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    /// True if the innermost scope already declares the name
    pub fn contains_in_top(&self, name: &str) -> bool {
        self.scopes
            .last()
            .is_some_and(|scope| scope.contains_key(name))
    }

    /// Number of open scopes
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}
