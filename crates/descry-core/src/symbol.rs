//! Symbols and the bidirectional symbol table.

use std::collections::{BTreeMap, HashMap};

use bitflags::bitflags;
use thiserror::Error;

use crate::Address;

bitflags! {
    /// Symbol kind mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct SymbolKind: u32 {
        const DATA        = 0x0000_0001;
        const STRING      = 0x0000_0002;
        const POINTER     = 0x0000_0004;
        const TABLE       = 0x0000_0008;
        const TABLE_ITEM  = 0x0000_0010;

        const CODE        = 0x0000_0100;
        const FUNCTION    = 0x0000_0200;

        const IMPORT      = 0x0001_0000;
        const EXPORT      = 0x0002_0000;
        const ENTRY_POINT = 0x0004_0000;

        /// Locked symbols resist automatic erasure during redisassembly.
        const LOCKED      = 0x8000_0000;
    }
}

impl SymbolKind {
    /// Returns true for code-flavoured kinds.
    pub fn is_code(&self) -> bool {
        self.intersects(Self::CODE | Self::FUNCTION)
    }

    /// Returns true for data-flavoured kinds.
    pub fn is_data(&self) -> bool {
        self.intersects(
            Self::DATA | Self::STRING | Self::POINTER | Self::TABLE | Self::TABLE_ITEM,
        )
    }
}

/// A named, kinded anchor at an address.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Symbol {
    pub address: Address,
    pub name: String,
    pub kind: SymbolKind,
    /// Caller-defined tag, carried through unchanged.
    pub tag: u32,
}

impl Symbol {
    /// Creates a new symbol.
    pub fn new(address: Address, name: impl Into<String>, kind: SymbolKind, tag: u32) -> Self {
        Self {
            address,
            name: name.into(),
            kind,
            tag,
        }
    }

    /// Returns true if this symbol resists automatic erasure.
    pub fn is_locked(&self) -> bool {
        self.kind.contains(SymbolKind::LOCKED)
    }

    /// Returns true if this symbol marks a function start.
    pub fn is_function(&self) -> bool {
        self.kind.contains(SymbolKind::FUNCTION)
    }

    /// Returns true for code-flavoured symbols.
    pub fn is_code(&self) -> bool {
        self.kind.is_code()
    }

    /// Returns true for data-flavoured symbols.
    pub fn is_data(&self) -> bool {
        self.kind.is_data()
    }
}

/// Symbol table errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SymbolError {
    /// The name is already bound to a different address.
    #[error("symbol name {0:?} is already in use")]
    DuplicateName(String),

    /// The symbol at this address is locked.
    #[error("symbol at {0:#x} is locked")]
    Locked(Address),

    /// No symbol at this address.
    #[error("no symbol at {0:#x}")]
    NotFound(Address),
}

/// Name/address bidirectional symbol index.
///
/// Name uniqueness is enforced; the caller owns the deterministic renaming
/// scheme applied on collision.
#[derive(Debug, Default)]
pub struct SymbolTable {
    by_address: BTreeMap<Address, Symbol>,
    by_name: HashMap<String, Address>,
}

impl SymbolTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces a symbol at `address`.
    ///
    /// A locked symbol already present at the address wins silently. A name
    /// bound to a different address is rejected with `DuplicateName`.
    pub fn create(
        &mut self,
        address: Address,
        name: impl Into<String>,
        kind: SymbolKind,
        tag: u32,
    ) -> Result<(), SymbolError> {
        let name = name.into();

        if let Some(existing) = self.by_address.get(&address) {
            if existing.is_locked() && !kind.contains(SymbolKind::LOCKED) {
                return Ok(());
            }
        }

        if let Some(&owner) = self.by_name.get(&name) {
            if owner != address {
                return Err(SymbolError::DuplicateName(name));
            }
        }

        if let Some(old) = self.by_address.remove(&address) {
            self.by_name.remove(&old.name);
        }

        self.by_name.insert(name.clone(), address);
        self.by_address
            .insert(address, Symbol::new(address, name, kind, tag));
        Ok(())
    }

    /// Looks up a symbol by address.
    pub fn by_address(&self, address: Address) -> Option<&Symbol> {
        self.by_address.get(&address)
    }

    /// Looks up a symbol by name.
    pub fn by_name(&self, name: &str) -> Option<&Symbol> {
        self.by_name
            .get(name)
            .and_then(|address| self.by_address.get(address))
    }

    /// Returns true if a symbol exists at `address`.
    pub fn contains(&self, address: Address) -> bool {
        self.by_address.contains_key(&address)
    }

    /// Returns true if `name` is bound.
    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Removes the symbol at `address`; locked symbols refuse.
    pub fn erase(&mut self, address: Address) -> Result<Symbol, SymbolError> {
        let symbol = self
            .by_address
            .remove(&address)
            .ok_or(SymbolError::NotFound(address))?;

        if symbol.is_locked() {
            self.by_address.insert(address, symbol);
            return Err(SymbolError::Locked(address));
        }

        self.by_name.remove(&symbol.name);
        Ok(symbol)
    }

    /// Removes the symbol at `address` even when locked.
    pub fn erase_forced(&mut self, address: Address) -> Option<Symbol> {
        let symbol = self.by_address.remove(&address)?;
        self.by_name.remove(&symbol.name);
        Some(symbol)
    }

    /// Renames the symbol at `address`.
    pub fn rename(&mut self, address: Address, name: impl Into<String>) -> Result<(), SymbolError> {
        let name = name.into();

        if let Some(&owner) = self.by_name.get(&name) {
            if owner != address {
                return Err(SymbolError::DuplicateName(name));
            }
            return Ok(());
        }

        let symbol = self
            .by_address
            .get_mut(&address)
            .ok_or(SymbolError::NotFound(address))?;

        self.by_name.remove(&symbol.name);
        symbol.name = name.clone();
        self.by_name.insert(name, address);
        Ok(())
    }

    /// Iterates symbols in address order.
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.by_address.values()
    }

    /// Number of symbols.
    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    /// Returns true if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}
