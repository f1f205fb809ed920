//! Alias to record-column mapping for one query part.

use std::collections::HashMap;

use crate::error::{ExecError, Result};

/// Logical kind of a bound variable.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SymbolType {
    /// A matched or created vertex.
    Node,
    /// A single relationship or a variable-length relationship.
    Relationship,
    /// A scalar or list produced by an expression.
    Constant,
    /// A named path (`p = (a)-->(b)`).
    NamedPath,
    /// A query parameter (`$name`).
    Parameter,
}

/// Where a variable was introduced.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SymbolScope {
    /// Introduced by this query part.
    Local,
    /// Carried in from an enclosing query part.
    Argument,
    /// Derived from an argument within this part.
    DerivedArgument,
}

/// One symbol table entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SymbolNode {
    /// Record column index.
    pub id: usize,
    /// Logical kind.
    pub ty: SymbolType,
    /// Scope.
    pub scope: SymbolScope,
}

/// Dense, 0-based alias to column mapping.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, SymbolNode>,
    aliases: Vec<String>,
}

impl SymbolTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `alias` at the next free column and returns that column.
    /// Re-registering an alias returns its existing column.
    pub fn add(&mut self, alias: &str, ty: SymbolType, scope: SymbolScope) -> usize {
        if let Some(node) = self.symbols.get(alias) {
            return node.id;
        }
        let id = self.aliases.len();
        self.symbols
            .insert(alias.to_string(), SymbolNode { id, ty, scope });
        self.aliases.push(alias.to_string());
        id
    }

    /// Looks up an alias.
    pub fn get(&self, alias: &str) -> Option<&SymbolNode> {
        self.symbols.get(alias)
    }

    /// Column of `alias`, or an input error naming `context`.
    pub fn column(&self, alias: &str, context: &str) -> Result<usize> {
        self.symbols
            .get(alias)
            .map(|node| node.id)
            .ok_or_else(|| ExecError::input(format!("unknown variable '{alias}' referenced in {context}")))
    }

    /// Alias bound to a column.
    pub fn alias_of(&self, column: usize) -> Option<&str> {
        self.aliases.get(column).map(String::as_str)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    /// True when no symbols are registered.
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// Symbols in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SymbolNode)> {
        self.aliases
            .iter()
            .filter_map(move |alias| self.symbols.get(alias).map(|node| (alias.as_str(), node)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_are_dense_and_stable() {
        let mut table = SymbolTable::new();
        assert_eq!(table.add("n", SymbolType::Node, SymbolScope::Local), 0);
        assert_eq!(table.add("r", SymbolType::Relationship, SymbolScope::Local), 1);
        assert_eq!(table.add("n", SymbolType::Node, SymbolScope::Local), 0);
        assert_eq!(table.len(), 2);
        assert_eq!(table.alias_of(1), Some("r"));
        let cols: Vec<_> = table.iter().map(|(alias, node)| (alias.to_string(), node.id)).collect();
        assert_eq!(cols, vec![("n".to_string(), 0), ("r".to_string(), 1)]);
    }

    #[test]
    fn unknown_alias_is_an_input_error() {
        let table = SymbolTable::new();
        let err = table.column("x", "RETURN").unwrap_err();
        assert_eq!(err.code(), "INPUT_ERROR");
    }
}
