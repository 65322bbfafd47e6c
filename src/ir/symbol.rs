//! Generation-checked symbol handles.
//!
//! IR nodes never point at each other directly. A call names its target by a
//! [`Symbol`], a field access names the field by a [`Symbol`], and so on. The
//! [`SymbolTable`] resolves a handle to the entry describing the declaration.
//! When a lowering removes a declaration it unbinds the symbol, which bumps the
//! entry's generation so that any handle still floating around in the tree
//! fails to resolve instead of silently naming something else.

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

use super::id::FileId;
use crate::intern::Name;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol {
    pub index: u32,
    pub generation: u32,
}

impl core::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum SymbolKind {
    Function,
    Constructor,
    Class,
    Field,
    Property,
    AnonymousInitializer,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Internal,
    Private,
}

/// Where the declaration a symbol refers to lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Linkage {
    /// Declared in a file of the module being compiled
    File(FileId),
    /// Declared outside of the module. These are never bound to a
    /// declaration in the tree and are tolerated by validation.
    External,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolEntry {
    pub name: Name,
    pub kind: SymbolKind,
    pub visibility: Visibility,
    pub linkage: Linkage,
    pub generation: u32,
    pub bound: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolError {
    #[error("symbol {0} does not exist")]
    OutOfRange(Symbol),
    #[error("symbol {symbol} is stale, `{name}` is now at generation {current}")]
    Stale {
        symbol: Symbol,
        name: Name,
        current: u32,
    },
    #[error("symbol {symbol} (`{name}`) is not bound to a declaration")]
    Unbound { symbol: Symbol, name: Name },
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolTable {
    entries: Vec<SymbolEntry>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(
        &mut self,
        name: Name,
        kind: SymbolKind,
        visibility: Visibility,
        linkage: Linkage,
    ) -> Symbol {
        let index = self.entries.len() as u32;

        self.entries.push(SymbolEntry {
            name,
            kind,
            visibility,
            linkage,
            generation: 0,
            bound: true,
        });

        Symbol {
            index,
            generation: 0,
        }
    }

    /// Looks up the entry of a symbol. Fails for stale handles and for
    /// symbols whose declaration has been removed.
    pub fn resolve(&self, symbol: Symbol) -> Result<&SymbolEntry, SymbolError> {
        let entry = self
            .entries
            .get(symbol.index as usize)
            .ok_or(SymbolError::OutOfRange(symbol))?;

        if entry.generation != symbol.generation {
            return Err(SymbolError::Stale {
                symbol,
                name: entry.name,
                current: entry.generation,
            });
        }

        if !entry.bound {
            return Err(SymbolError::Unbound {
                symbol,
                name: entry.name,
            });
        }

        Ok(entry)
    }

    /// Best effort name lookup that also works for stale handles, used when
    /// printing.
    pub fn name_of(&self, symbol: Symbol) -> Option<Name> {
        self.entries.get(symbol.index as usize).map(|e| e.name)
    }

    pub fn is_bound(&self, symbol: Symbol) -> bool {
        self.resolve(symbol).is_ok()
    }

    /// Marks the declaration behind `symbol` as removed. Every outstanding
    /// handle becomes stale.
    pub fn unbind(&mut self, symbol: Symbol) -> Result<(), SymbolError> {
        self.resolve(symbol)?;

        let entry = &mut self.entries[symbol.index as usize];
        entry.bound = false;
        entry.generation += 1;

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Index;

    fn table_with_function() -> (SymbolTable, Symbol) {
        let mut table = SymbolTable::new();
        let symbol = table.declare(
            Name::new("compute"),
            SymbolKind::Function,
            Visibility::Public,
            Linkage::File(FileId::new(0)),
        );
        (table, symbol)
    }

    #[test]
    fn declared_symbols_resolve() {
        let (table, symbol) = table_with_function();

        let entry = table.resolve(symbol).unwrap();
        assert_eq!(entry.name, Name::new("compute"));
        assert!(table.is_bound(symbol));
    }

    #[test]
    fn unbinding_makes_handles_stale() {
        let (mut table, symbol) = table_with_function();

        table.unbind(symbol).unwrap();

        assert!(matches!(
            table.resolve(symbol),
            Err(SymbolError::Stale { current: 1, .. })
        ));
        assert!(table.unbind(symbol).is_err());
        assert_eq!(table.name_of(symbol), Some(Name::new("compute")));
    }

    #[test]
    fn unknown_symbols_are_out_of_range() {
        let (table, _) = table_with_function();

        let bogus = Symbol {
            index: 10,
            generation: 0,
        };
        assert_eq!(table.resolve(bogus), Err(SymbolError::OutOfRange(bogus)));
    }
}
