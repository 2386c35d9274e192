//! Directed, kinded cross-references between addresses.

use std::collections::{HashMap, HashSet};

use crate::Address;

/// Reference kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReferenceKind {
    Jump,
    Call,
    Read,
    Write,
    /// Decoder-precomputed reachable address.
    Target,
}

impl ReferenceKind {
    /// Returns true for control-flow edges.
    pub fn is_code(&self) -> bool {
        matches!(self, Self::Jump | Self::Call | Self::Target)
    }

    /// Returns true for data access edges.
    pub fn is_data(&self) -> bool {
        matches!(self, Self::Read | Self::Write)
    }
}

/// A directed edge between two addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reference {
    pub from: Address,
    pub to: Address,
    pub kind: ReferenceKind,
}

/// Bidirectional reference graph.
///
/// Every forward edge `from -> to` is mirrored by a reverse entry, so both
/// "what does this instruction reach" and "who refers to this address" are
/// O(1) lookups. Duplicate edges are ignored.
#[derive(Debug, Default)]
pub struct ReferenceTable {
    forward: HashMap<Address, Vec<Address>>,
    forward_edges: HashMap<Address, Vec<Reference>>,
    reverse: HashMap<Address, Vec<Reference>>,
    seen: HashSet<Reference>,
}

impl ReferenceTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the edge `from -> to`; both directions are updated together.
    pub fn push(&mut self, from: Address, to: Address, kind: ReferenceKind) {
        let reference = Reference { from, to, kind };

        if !self.seen.insert(reference) {
            return;
        }

        let targets = self.forward.entry(from).or_default();
        if !targets.contains(&to) {
            targets.push(to);
        }

        self.forward_edges.entry(from).or_default().push(reference);
        self.reverse.entry(to).or_default().push(reference);
    }

    /// Addresses reachable from `from`.
    pub fn targets(&self, from: Address) -> &[Address] {
        self.forward.get(&from).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Edges leaving `from`, with their kinds.
    pub fn edges_from(&self, from: Address) -> &[Reference] {
        self.forward_edges
            .get(&from)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// References pointing at `to`.
    pub fn references(&self, to: Address) -> &[Reference] {
        self.reverse.get(&to).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct addresses reachable from `from`.
    pub fn target_count(&self, from: Address) -> usize {
        self.forward.get(&from).map(Vec::len).unwrap_or(0)
    }

    /// Number of references pointing at `to`.
    pub fn reference_count(&self, to: Address) -> usize {
        self.reverse.get(&to).map(Vec::len).unwrap_or(0)
    }

    /// Returns true if anything points at `to`.
    pub fn is_referenced(&self, to: Address) -> bool {
        self.reverse.contains_key(&to)
    }

    /// Returns true if `to` is the destination of a jump or branch edge.
    pub fn is_jump_target(&self, to: Address) -> bool {
        self.references(to)
            .iter()
            .any(|r| matches!(r.kind, ReferenceKind::Jump))
    }

    /// Iterates all referenced addresses.
    pub fn referenced_addresses(&self) -> impl Iterator<Item = Address> + '_ {
        self.reverse.keys().copied()
    }

    /// Total edge count.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Returns true if the table holds no edges.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Drops every edge.
    pub fn clear(&mut self) {
        self.forward.clear();
        self.forward_edges.clear();
        self.reverse.clear();
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bidirectional_consistency() {
        let mut table = ReferenceTable::new();
        table.push(0x1000, 0x2000, ReferenceKind::Call);
        table.push(0x1010, 0x2000, ReferenceKind::Jump);

        assert_eq!(table.targets(0x1000), &[0x2000]);
        assert_eq!(table.reference_count(0x2000), 2);

        for r in table.references(0x2000) {
            assert!(table.targets(r.from).contains(&r.to));
        }
    }

    #[test]
    fn test_duplicate_edges_ignored() {
        let mut table = ReferenceTable::new();
        table.push(0x1000, 0x2000, ReferenceKind::Jump);
        table.push(0x1000, 0x2000, ReferenceKind::Jump);

        assert_eq!(table.len(), 1);
        assert_eq!(table.reference_count(0x2000), 1);

        // Same edge with a different kind is a new reference.
        table.push(0x1000, 0x2000, ReferenceKind::Read);
        assert_eq!(table.len(), 2);
        assert_eq!(table.target_count(0x1000), 1);
    }

    #[test]
    fn test_jump_target_query() {
        let mut table = ReferenceTable::new();
        table.push(0x1000, 0x2000, ReferenceKind::Call);
        table.push(0x1010, 0x3000, ReferenceKind::Jump);

        assert!(!table.is_jump_target(0x2000));
        assert!(table.is_jump_target(0x3000));
        assert!(!table.is_jump_target(0x4000));
    }
}
