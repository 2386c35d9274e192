//! The listing document: an address-sorted heterogeneous item sequence.
//!
//! Items are ordered by `(address, kind)` where the kind discriminant is the
//! equal-address tiebreak; duplicates are rejected. The document owns the
//! symbol table, the instruction cache, segments, comments, and the cursor.
//! Mutations emit change events carrying `(address, kind, index, action)`,
//! never item references.

use std::collections::{BTreeSet, HashMap};

use descry_core::{
    Address, Offset, Reference, ReferenceKind, ReferenceTable, Segment, SegmentKind, Symbol,
    SymbolKind, SymbolTable,
};

use crate::cache::{CachedInstruction, InstructionCache};

/// Listing item discriminator; declaration order is the equal-address rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ListingItemKind {
    Segment,
    Empty,
    Info,
    Function,
    Symbol,
    Instruction,
}

/// One line of the listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingItem {
    pub address: Address,
    pub kind: ListingItemKind,
}

impl ListingItem {
    fn key(&self) -> (Address, ListingItemKind) {
        (self.address, self.kind)
    }
}

/// What happened to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Inserted,
    Removed,
    Changed,
}

/// Change event payload.
#[derive(Debug, Clone, Copy)]
pub struct DocumentChanged {
    pub address: Address,
    pub kind: ListingItemKind,
    pub index: usize,
    pub action: ChangeAction,
}

/// Position of the user-visible cursor in the listing.
#[derive(Debug, Default, Clone, Copy)]
pub struct ListingCursor {
    position: usize,
}

impl ListingCursor {
    /// Current item index.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Moves the cursor to `index`.
    pub fn move_to(&mut self, index: usize) {
        self.position = index;
    }
}

type ChangeListener = Box<dyn FnMut(&DocumentChanged)>;

/// The address-sorted listing plus its side indexes.
pub struct ListingDocument {
    items: Vec<ListingItem>,
    segments: Vec<Segment>,
    /// Function start addresses, sorted.
    functions: Vec<Address>,
    symbols: SymbolTable,
    cache: InstructionCache,
    comments: HashMap<Address, String>,
    auto_comments: HashMap<Address, BTreeSet<String>>,
    infos: HashMap<Address, String>,
    entry: Option<Address>,
    cursor: ListingCursor,
    listeners: Vec<ChangeListener>,
    notifying: bool,
}

impl ListingDocument {
    /// Creates an empty document.
    pub fn new() -> Self {
        Self::with_cache(InstructionCache::new())
    }

    /// Creates an empty document around a preconfigured cache.
    pub fn with_cache(cache: InstructionCache) -> Self {
        Self {
            items: Vec::new(),
            segments: Vec::new(),
            functions: Vec::new(),
            symbols: SymbolTable::new(),
            cache,
            comments: HashMap::new(),
            auto_comments: HashMap::new(),
            infos: HashMap::new(),
            entry: None,
            cursor: ListingCursor::default(),
            listeners: Vec::new(),
            notifying: false,
        }
    }

    /// Registers a change observer.
    ///
    /// Observers must not call mutating document APIs from the callback;
    /// development builds assert on it.
    pub fn on_changed(&mut self, listener: impl FnMut(&DocumentChanged) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    // ---- segments -------------------------------------------------------

    /// Publishes a segment; idempotent by `(name, address)`.
    pub fn segment(
        &mut self,
        name: impl Into<String>,
        offset: Offset,
        address: Address,
        size: u64,
        kind: SegmentKind,
    ) {
        let name = name.into();

        if self
            .segments
            .iter()
            .any(|s| s.name == name && s.address == address)
        {
            return;
        }

        let position = self
            .segments
            .partition_point(|s| s.address <= address);
        self.segments
            .insert(position, Segment::new(name, offset, address, size, kind));
        self.insert_sorted(address, ListingItemKind::Segment);
    }

    /// The segment containing `address`.
    pub fn segment_at(&self, address: Address) -> Option<&Segment> {
        self.segments.iter().find(|s| s.contains(address))
    }

    /// All published segments, in address order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    // ---- symbols --------------------------------------------------------

    /// Creates a symbol and its listing item. A `None` name derives the
    /// deterministic `<prefix>_<hex>` default.
    pub fn symbol(&mut self, address: Address, name: Option<&str>, kind: SymbolKind, tag: u32) {
        self.create_symbol(address, name, kind, tag);
    }

    /// Creates a locked symbol.
    pub fn lock(&mut self, address: Address, name: Option<&str>, kind: SymbolKind, tag: u32) {
        self.create_symbol(address, name, kind | SymbolKind::LOCKED, tag);
    }

    /// Creates a function symbol and a `Function` item.
    pub fn function(&mut self, address: Address, name: Option<&str>, tag: u32) {
        self.create_symbol(
            address,
            name,
            SymbolKind::FUNCTION | SymbolKind::CODE,
            tag,
        );
    }

    /// Creates a locked function symbol.
    pub fn lock_function(&mut self, address: Address, name: &str, tag: u32) {
        self.create_symbol(
            address,
            Some(name),
            SymbolKind::FUNCTION | SymbolKind::CODE | SymbolKind::LOCKED,
            tag,
        );
    }

    /// Creates a pointer symbol.
    pub fn pointer(&mut self, address: Address, tag: u32) {
        self.create_symbol(
            address,
            None,
            SymbolKind::POINTER | SymbolKind::DATA,
            tag,
        );
    }

    /// Creates an address-table symbol; `tag` carries the entry count.
    pub fn table(&mut self, address: Address, tag: u32) {
        self.create_symbol(address, None, SymbolKind::TABLE | SymbolKind::DATA, tag);
    }

    /// Creates a table-entry symbol; `tag` carries the entry index.
    pub fn table_item(&mut self, address: Address, tag: u32) {
        self.create_symbol(
            address,
            None,
            SymbolKind::TABLE_ITEM | SymbolKind::DATA,
            tag,
        );
    }

    /// Marks the program entry: a locked function symbol named `start`.
    pub fn entry(&mut self, address: Address, tag: u32) {
        self.create_symbol(
            address,
            Some("start"),
            SymbolKind::FUNCTION
                | SymbolKind::CODE
                | SymbolKind::ENTRY_POINT
                | SymbolKind::LOCKED,
            tag,
        );
        self.entry = Some(address);
    }

    /// Removes the symbol and its listing item; locked symbols are kept
    /// silently.
    pub fn erase_symbol(&mut self, address: Address) {
        let item_kind = match self.symbols.by_address(address) {
            Some(symbol) if symbol.is_locked() => return,
            Some(symbol) => Self::item_kind_for(symbol),
            None => return,
        };

        if self.symbols.erase(address).is_ok() {
            if item_kind == ListingItemKind::Function {
                if let Ok(position) = self.functions.binary_search(&address) {
                    self.functions.remove(position);
                }
            }
            self.remove_sorted(address, item_kind);
        }
    }

    /// The symbol at `address`.
    pub fn symbol_at(&self, address: Address) -> Option<&Symbol> {
        self.symbols.by_address(address)
    }

    /// The symbol named `name`.
    pub fn symbol_by_name(&self, name: &str) -> Option<&Symbol> {
        self.symbols.by_name(name)
    }

    /// The underlying symbol table.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Renames the symbol at `address`, keeping name uniqueness.
    pub fn rename(&mut self, address: Address, name: &str) {
        let unique = self.unique_name(name, address);
        let _ = self.symbols.rename(address, unique);
    }

    /// Function start addresses in order.
    pub fn functions(&self) -> &[Address] {
        &self.functions
    }

    /// Returns true if a function starts at `address`.
    pub fn has_function_at(&self, address: Address) -> bool {
        self.functions.binary_search(&address).is_ok()
    }

    // ---- instructions ---------------------------------------------------

    /// Allocates a cache entry for `address` and hands back the handle the
    /// decoder fills.
    pub fn allocate_instruction(&mut self, address: Address) -> CachedInstruction {
        self.cache.allocate(address)
    }

    /// Attaches a decoded instruction: stores it in the cache, inserts the
    /// `Instruction` item, and appends the trailing `Empty` separator after
    /// a control-flow terminator.
    pub fn instruction(&mut self, handle: &CachedInstruction) {
        let (address, terminator, end) = {
            let instr = handle.borrow();
            (instr.address, instr.is_terminator(), instr.end_address())
        };

        self.cache.store(handle);
        self.insert_sorted(address, ListingItemKind::Instruction);

        if terminator
            && self.item(end, ListingItemKind::Function).is_none()
            && self.item(end, ListingItemKind::Segment).is_none()
        {
            self.insert_sorted(end, ListingItemKind::Empty);
        }
    }

    /// Refreshes the cache entry without touching listing order.
    pub fn update(&mut self, handle: &CachedInstruction) {
        let address = handle.address();
        self.cache.store(handle);

        if let Some(index) = self.index_of(address, ListingItemKind::Instruction) {
            self.emit(DocumentChanged {
                address,
                kind: ListingItemKind::Instruction,
                index,
                action: ChangeAction::Changed,
            });
        }
    }

    /// Loads the cached instruction at `address`.
    pub fn instruction_at(&self, address: Address) -> Option<CachedInstruction> {
        self.cache.load(address).ok()
    }

    /// The instruction cache.
    pub fn cache(&self) -> &InstructionCache {
        &self.cache
    }

    /// Addresses of all `Instruction` items, in listing order.
    pub fn instruction_addresses(&self) -> impl Iterator<Item = Address> + '_ {
        self.items
            .iter()
            .filter(|item| item.kind == ListingItemKind::Instruction)
            .map(|item| item.address)
    }

    // ---- comments and info ----------------------------------------------

    /// Sets the user comment at `address`.
    pub fn comment(&mut self, address: Address, text: impl Into<String>) {
        self.comments.insert(address, text.into());
        self.touch(address);
    }

    /// Adds an automatic comment at `address`; duplicates collapse.
    pub fn auto_comment(&mut self, address: Address, text: impl Into<String>) {
        self.auto_comments
            .entry(address)
            .or_default()
            .insert(text.into());
        self.touch(address);
    }

    /// Attaches free-form info text and its `Info` item.
    pub fn info(&mut self, address: Address, text: impl Into<String>) {
        self.infos.insert(address, text.into());
        self.insert_sorted(address, ListingItemKind::Info);
    }

    /// The user comment at `address`.
    pub fn comment_at(&self, address: Address) -> Option<&str> {
        self.comments.get(&address).map(String::as_str)
    }

    /// Automatic comments at `address`.
    pub fn auto_comments_at(&self, address: Address) -> impl Iterator<Item = &str> {
        self.auto_comments
            .get(&address)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Info text at `address`.
    pub fn info_at(&self, address: Address) -> Option<&str> {
        self.infos.get(&address).map(String::as_str)
    }

    // ---- lookup and navigation ------------------------------------------

    /// The item at `(address, kind)`, if present.
    pub fn item(&self, address: Address, kind: ListingItemKind) -> Option<&ListingItem> {
        self.index_of(address, kind).map(|index| &self.items[index])
    }

    /// The item at a listing index.
    pub fn item_at(&self, index: usize) -> Option<&ListingItem> {
        self.items.get(index)
    }

    /// Index of the `(address, kind)` item.
    pub fn index_of(&self, address: Address, kind: ListingItemKind) -> Option<usize> {
        self.items
            .binary_search_by(|item| item.key().cmp(&(address, kind)))
            .ok()
    }

    /// Number of listing items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the listing is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates items in listing order.
    pub fn iter(&self) -> impl Iterator<Item = &ListingItem> {
        self.items.iter()
    }

    /// The start address of the function containing `address`.
    pub fn function_start(&self, address: Address) -> Option<Address> {
        let position = self.functions.partition_point(|&f| f <= address);
        if position == 0 {
            None
        } else {
            Some(self.functions[position - 1])
        }
    }

    /// Call edges leaving the body of the function containing `address`.
    pub fn calls(&self, address: Address, references: &ReferenceTable) -> Vec<Reference> {
        let Some(start) = self.function_start(address) else {
            return Vec::new();
        };

        let position = self.functions.partition_point(|&f| f <= start);
        let end = self
            .functions
            .get(position)
            .copied()
            .unwrap_or(Address::MAX);

        let first = self
            .items
            .partition_point(|item| item.key() < (start, ListingItemKind::Segment));

        self.items[first..]
            .iter()
            .take_while(|item| item.address < end)
            .filter(|item| item.kind == ListingItemKind::Instruction)
            .flat_map(|item| references.edges_from(item.address))
            .filter(|r| r.kind == ReferenceKind::Call)
            .copied()
            .collect()
    }

    /// The program entry address, if marked.
    pub fn entry_point(&self) -> Option<Address> {
        self.entry
    }

    /// Read access to the cursor.
    pub fn cursor(&self) -> &ListingCursor {
        &self.cursor
    }

    /// Write access to the cursor.
    pub fn cursor_mut(&mut self) -> &mut ListingCursor {
        &mut self.cursor
    }

    /// Parks the cursor on the entry point's listing item.
    pub fn move_to_entry(&mut self) {
        let Some(entry) = self.entry else { return };

        let index = self
            .index_of(entry, ListingItemKind::Function)
            .or_else(|| self.index_of(entry, ListingItemKind::Symbol))
            .or_else(|| self.index_of(entry, ListingItemKind::Instruction))
            .unwrap_or(0);
        self.cursor.move_to(index);
    }

    // ---- internals ------------------------------------------------------

    fn item_kind_for(symbol: &Symbol) -> ListingItemKind {
        if symbol.is_function() {
            ListingItemKind::Function
        } else {
            ListingItemKind::Symbol
        }
    }

    fn prefix_for(kind: SymbolKind) -> &'static str {
        if kind.contains(SymbolKind::FUNCTION) {
            "sub"
        } else if kind.contains(SymbolKind::TABLE) {
            "tbl"
        } else if kind.contains(SymbolKind::TABLE_ITEM) {
            "tbl_item"
        } else if kind.contains(SymbolKind::STRING) {
            "str"
        } else if kind.contains(SymbolKind::POINTER) {
            "ptr"
        } else if kind.is_code() {
            "loc"
        } else {
            "data"
        }
    }

    /// Deterministic collision scheme: `<base>`, then `<base>_<hex>`, then
    /// `_2`, `_3`, ...
    fn unique_name(&self, base: &str, address: Address) -> String {
        let free = |name: &str| match self.symbols.by_name(name) {
            None => true,
            Some(symbol) => symbol.address == address,
        };

        if free(base) {
            return base.to_string();
        }

        let hexed = format!("{}_{:x}", base, address);
        if free(&hexed) {
            return hexed;
        }

        let mut counter = 2u32;
        loop {
            let candidate = format!("{}_{}", hexed, counter);
            if free(&candidate) {
                return candidate;
            }
            counter += 1;
        }
    }

    fn create_symbol(
        &mut self,
        address: Address,
        name: Option<&str>,
        kind: SymbolKind,
        tag: u32,
    ) {
        debug_assert!(!self.notifying, "document mutated from a change observer");

        if let Some(existing) = self.symbols.by_address(address) {
            if existing.is_locked() && !kind.contains(SymbolKind::LOCKED) {
                return;
            }

            let old_item = Self::item_kind_for(existing);
            self.symbols.erase_forced(address);
            if old_item == ListingItemKind::Function {
                if let Ok(position) = self.functions.binary_search(&address) {
                    self.functions.remove(position);
                }
            }
            self.remove_sorted(address, old_item);
        }

        let base = match name {
            Some(name) => name.to_string(),
            None => format!("{}_{:x}", Self::prefix_for(kind), address),
        };
        let unique = self.unique_name(&base, address);

        // Cannot collide anymore: the slot is empty and the name is free.
        let created = self.symbols.create(address, unique, kind, tag).is_ok();
        debug_assert!(created);

        let item_kind = if kind.contains(SymbolKind::FUNCTION) {
            if let Err(position) = self.functions.binary_search(&address) {
                self.functions.insert(position, address);
            }
            ListingItemKind::Function
        } else {
            ListingItemKind::Symbol
        };

        self.insert_sorted(address, item_kind);
    }

    fn insert_sorted(&mut self, address: Address, kind: ListingItemKind) -> bool {
        debug_assert!(!self.notifying, "document mutated from a change observer");

        let item = ListingItem { address, kind };
        match self
            .items
            .binary_search_by(|existing| existing.key().cmp(&item.key()))
        {
            Ok(_) => false,
            Err(index) => {
                self.items.insert(index, item);
                self.emit(DocumentChanged {
                    address,
                    kind,
                    index,
                    action: ChangeAction::Inserted,
                });
                true
            }
        }
    }

    fn remove_sorted(&mut self, address: Address, kind: ListingItemKind) {
        debug_assert!(!self.notifying, "document mutated from a change observer");

        if let Some(index) = self.index_of(address, kind) {
            self.items.remove(index);
            self.emit(DocumentChanged {
                address,
                kind,
                index,
                action: ChangeAction::Removed,
            });
        }
    }

    fn touch(&mut self, address: Address) {
        if let Some(index) = self.index_of(address, ListingItemKind::Instruction) {
            self.emit(DocumentChanged {
                address,
                kind: ListingItemKind::Instruction,
                index,
                action: ChangeAction::Changed,
            });
        }
    }

    fn emit(&mut self, change: DocumentChanged) {
        self.notifying = true;
        for listener in self.listeners.iter_mut() {
            listener(&change);
        }
        self.notifying = false;
    }
}

impl Default for ListingDocument {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use descry_core::InstructionType;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn is_sorted(document: &ListingDocument) -> bool {
        document
            .iter()
            .zip(document.iter().skip(1))
            .all(|(a, b)| a.key() < b.key())
    }

    #[test]
    fn test_equal_address_rank_order() {
        let mut document = ListingDocument::new();

        document.segment(".text", 0, 0x1000, 0x100, SegmentKind::CODE);
        document.function(0x1000, None, 0);
        document.info(0x1000, "reset vector");

        let kinds: Vec<_> = document.iter().map(|item| item.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ListingItemKind::Segment,
                ListingItemKind::Info,
                ListingItemKind::Function,
            ]
        );
        assert!(is_sorted(&document));
    }

    #[test]
    fn test_duplicate_items_rejected() {
        let mut document = ListingDocument::new();
        document.function(0x1000, Some("main"), 0);
        document.function(0x1000, Some("main"), 0);

        assert_eq!(document.len(), 1);
        assert_eq!(document.functions(), &[0x1000]);
    }

    #[test]
    fn test_name_collision_scheme() {
        let mut document = ListingDocument::new();
        document.function(0x1000, Some("foo"), 0);
        document.function(0x2000, Some("foo"), 0);
        document.function(0x3000, Some("foo"), 0);

        assert_eq!(document.symbol_at(0x1000).unwrap().name, "foo");
        assert_eq!(document.symbol_at(0x2000).unwrap().name, "foo_2000");
        assert_eq!(document.symbol_at(0x3000).unwrap().name, "foo_3000");
        assert!(document.symbol_by_name("foo_2000").is_some());
    }

    #[test]
    fn test_instruction_inserts_empty_after_terminator() {
        let mut document = ListingDocument::new();

        let handle = document.allocate_instruction(0x1000);
        {
            let mut instr = handle.borrow_mut();
            instr.size = 1;
            instr.mnemonic = "ret".into();
            instr.kind = InstructionType::Ret;
        }
        document.instruction(&handle);

        assert!(document.item(0x1000, ListingItemKind::Instruction).is_some());
        assert!(document.item(0x1001, ListingItemKind::Empty).is_some());
    }

    #[test]
    fn test_no_empty_before_function_header() {
        let mut document = ListingDocument::new();
        document.function(0x1001, None, 0);

        let handle = document.allocate_instruction(0x1000);
        {
            let mut instr = handle.borrow_mut();
            instr.size = 1;
            instr.kind = InstructionType::Ret;
            instr.mnemonic = "ret".into();
        }
        document.instruction(&handle);

        assert!(document.item(0x1001, ListingItemKind::Empty).is_none());
    }

    #[test]
    fn test_erase_symbol_respects_lock() {
        let mut document = ListingDocument::new();
        document.lock(0x1000, Some("keep"), SymbolKind::DATA, 0);
        document.symbol(0x2000, None, SymbolKind::DATA, 0);

        document.erase_symbol(0x1000);
        document.erase_symbol(0x2000);

        assert!(document.symbol_at(0x1000).is_some());
        assert!(document.symbol_at(0x2000).is_none());
        assert!(document.item(0x2000, ListingItemKind::Symbol).is_none());
    }

    #[test]
    fn test_change_events() {
        let mut document = ListingDocument::new();
        let events: Rc<RefCell<Vec<(Address, ChangeAction)>>> = Rc::new(RefCell::new(Vec::new()));

        let sink = Rc::clone(&events);
        document.on_changed(move |change| {
            sink.borrow_mut().push((change.address, change.action));
        });

        document.symbol(0x1000, None, SymbolKind::DATA, 0);
        document.erase_symbol(0x1000);

        let seen = events.borrow();
        assert_eq!(
            *seen,
            vec![
                (0x1000, ChangeAction::Inserted),
                (0x1000, ChangeAction::Removed),
            ]
        );
    }

    #[test]
    fn test_function_start_and_cursor() {
        let mut document = ListingDocument::new();
        document.segment(".text", 0, 0x1000, 0x100, SegmentKind::CODE);
        document.entry(0x1000, 0);
        document.function(0x1050, None, 0);

        assert_eq!(document.function_start(0x1010), Some(0x1000));
        assert_eq!(document.function_start(0x1050), Some(0x1050));
        assert_eq!(document.function_start(0x0FFF), None);

        document.move_to_entry();
        let item = document.item_at(document.cursor().position()).unwrap();
        assert_eq!(item.address, 0x1000);
        assert_eq!(item.kind, ListingItemKind::Function);
        assert_eq!(document.entry_point(), Some(0x1000));
    }

    #[test]
    fn test_comments_attach_to_addresses() {
        let mut document = ListingDocument::new();
        document.comment(0x1000, "checked manually");
        document.auto_comment(0x1000, "jump table entry");
        document.auto_comment(0x1000, "jump table entry");

        assert_eq!(document.comment_at(0x1000), Some("checked manually"));
        assert_eq!(document.auto_comments_at(0x1000).count(), 1);
    }
}
