//! Refcounted instruction store with a bounded working set.
//!
//! The cache guarantees at most one live instruction object per address.
//! Handles are shared-ownership: `erase` drops the cache's reference but any
//! outstanding handle keeps the object alive until its own release. Entries
//! whose only owner is the cache are eviction candidates; when the candidate
//! pool exceeds the watermark the oldest candidates are dropped until half
//! the watermark is reclaimed.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use thiserror::Error;

use descry_core::{Address, Instruction};

/// Default candidate-pool watermark.
pub const DEFAULT_WATERMARK: usize = 1024;

/// Cache errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CacheError {
    /// No entry at this address.
    #[error("no cached instruction at {0:#x}")]
    Missing(Address),
}

/// Shared handle to a cached instruction.
///
/// Cloning the handle increments the reference count; dropping (or calling
/// [`release`]) decrements it. The instruction stays alive as long as either
/// the cache or any handle holds it.
///
/// [`release`]: CachedInstruction::release
#[derive(Debug, Clone)]
pub struct CachedInstruction(Rc<RefCell<Instruction>>);

impl CachedInstruction {
    /// Immutably borrows the instruction.
    pub fn borrow(&self) -> Ref<'_, Instruction> {
        self.0.borrow()
    }

    /// Mutably borrows the instruction.
    pub fn borrow_mut(&self) -> RefMut<'_, Instruction> {
        self.0.borrow_mut()
    }

    /// The instruction's address.
    pub fn address(&self) -> Address {
        self.0.borrow().address
    }

    /// Explicit release; equivalent to dropping the handle.
    pub fn release(self) {}
}

/// Address-keyed instruction store.
#[derive(Debug)]
pub struct InstructionCache {
    entries: HashMap<Address, Rc<RefCell<Instruction>>>,
    /// Insertion order, scanned oldest-first when trimming. May hold stale
    /// addresses after `erase`; those are skipped.
    order: VecDeque<Address>,
    watermark: usize,
}

impl InstructionCache {
    /// Creates a cache with the default watermark.
    pub fn new() -> Self {
        Self::with_watermark(DEFAULT_WATERMARK)
    }

    /// Creates a cache with a custom candidate-pool watermark.
    pub fn with_watermark(watermark: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            watermark: watermark.max(1),
        }
    }

    /// Creates an entry with a fresh instruction at `address` and returns a
    /// handle to it. An existing entry at the same address is replaced.
    pub fn allocate(&mut self, address: Address) -> CachedInstruction {
        let cell = Rc::new(RefCell::new(Instruction::new(address)));
        if self.entries.insert(address, Rc::clone(&cell)).is_none() {
            self.order.push_back(address);
        }
        self.trim();
        CachedInstruction(cell)
    }

    /// Stores the instruction behind `handle`, sharing ownership with it.
    /// Re-storing an address the handle already backs is a no-op.
    pub fn store(&mut self, handle: &CachedInstruction) {
        let address = handle.address();
        if self.entries.insert(address, Rc::clone(&handle.0)).is_none() {
            self.order.push_back(address);
        }
        self.trim();
    }

    /// Retrieves the entry at `address`, incrementing its reference count.
    pub fn load(&self, address: Address) -> Result<CachedInstruction, CacheError> {
        self.entries
            .get(&address)
            .map(|cell| CachedInstruction(Rc::clone(cell)))
            .ok_or(CacheError::Missing(address))
    }

    /// Returns true if an entry exists at `address`.
    pub fn contains(&self, address: Address) -> bool {
        self.entries.contains_key(&address)
    }

    /// Drops the entry unconditionally. Outstanding handles stay valid; the
    /// instruction is destroyed on the last release.
    pub fn erase(&mut self, address: Address) {
        self.entries.remove(&address);
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Outstanding handle count for the entry at `address`.
    pub fn reference_count(&self, address: Address) -> usize {
        self.entries
            .get(&address)
            .map(|cell| Rc::strong_count(cell) - 1)
            .unwrap_or(0)
    }

    /// Number of entries eligible for eviction (no outstanding handles).
    pub fn candidate_count(&self) -> usize {
        self.entries
            .values()
            .filter(|cell| Rc::strong_count(cell) == 1)
            .count()
    }

    fn trim(&mut self) {
        let mut candidates = self.candidate_count();
        if candidates <= self.watermark {
            return;
        }

        let target = self.watermark / 2;
        let mut keep = VecDeque::with_capacity(self.order.len());

        while let Some(address) = self.order.pop_front() {
            if candidates <= target {
                keep.push_back(address);
                continue;
            }

            match self.entries.get(&address) {
                Some(cell) if Rc::strong_count(cell) == 1 => {
                    self.entries.remove(&address);
                    candidates -= 1;
                }
                Some(_) => keep.push_back(address),
                None => {} // stale after erase
            }
        }

        self.order = keep;
    }
}

impl Default for InstructionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_load() {
        let mut cache = InstructionCache::new();

        let handle = cache.allocate(0x1000);
        handle.borrow_mut().size = 2;

        assert!(cache.contains(0x1000));
        assert_eq!(cache.reference_count(0x1000), 1);

        let second = cache.load(0x1000).unwrap();
        assert_eq!(second.borrow().size, 2);
        assert_eq!(cache.reference_count(0x1000), 2);

        second.release();
        assert_eq!(cache.reference_count(0x1000), 1);
    }

    #[test]
    fn test_load_missing() {
        let cache = InstructionCache::new();
        assert!(matches!(
            cache.load(0x1234),
            Err(CacheError::Missing(0x1234))
        ));
    }

    #[test]
    fn test_erase_keeps_outstanding_handles_valid() {
        let mut cache = InstructionCache::new();

        let handle = cache.allocate(0x1000);
        handle.borrow_mut().mnemonic = "nop".into();

        cache.erase(0x1000);
        assert!(!cache.contains(0x1000));
        assert!(cache.load(0x1000).is_err());

        // The handle still reads the object it was loaned.
        assert_eq!(handle.borrow().mnemonic, "nop");
    }

    #[test]
    fn test_eviction_trims_oldest_candidates() {
        let mut cache = InstructionCache::with_watermark(8);

        for i in 0..9u64 {
            // Handles dropped immediately: every entry is a candidate.
            cache.allocate(0x1000 + i);
        }

        // Nine candidates exceeded the watermark of eight; trimmed to four.
        assert_eq!(cache.len(), 4);
        assert!(!cache.contains(0x1000));
        assert!(cache.contains(0x1008));
    }

    #[test]
    fn test_active_entries_immune_to_eviction() {
        let mut cache = InstructionCache::with_watermark(4);

        let pinned = cache.allocate(0x1000);
        for i in 1..=5u64 {
            cache.allocate(0x1000 + i);
        }

        assert!(cache.contains(0x1000));
        assert_eq!(pinned.borrow().address, 0x1000);
    }
}
