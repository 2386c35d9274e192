//! Property-based tests for listing and reference invariants.
//!
//! Random mutation sequences must preserve:
//! - strict `(address, kind)` ordering of the listing
//! - forward/reverse consistency of the reference table
//! - symbol/name bidirectionality under collisions and erasure

use proptest::prelude::*;

use descry_core::{InstructionType, ReferenceKind, ReferenceTable, SegmentKind, SymbolKind};
use descry_engine::{ListingDocument, ListingItemKind};

#[derive(Debug, Clone)]
enum Op {
    Symbol(u64),
    Function(u64),
    Instruction(u64),
    Info(u64),
    Erase(u64),
    Segment(u64),
}

fn arb_op() -> impl Strategy<Value = Op> {
    let addr = 0x1000u64..0x1080;
    prop_oneof![
        addr.clone().prop_map(Op::Symbol),
        addr.clone().prop_map(Op::Function),
        addr.clone().prop_map(Op::Instruction),
        addr.clone().prop_map(Op::Info),
        addr.clone().prop_map(Op::Erase),
        addr.prop_map(Op::Segment),
    ]
}

fn apply(document: &mut ListingDocument, op: &Op) {
    match op {
        Op::Symbol(address) => document.symbol(*address, None, SymbolKind::DATA, 0),
        Op::Function(address) => document.function(*address, Some("dup"), 0),
        Op::Instruction(address) => {
            let handle = document.allocate_instruction(*address);
            {
                let mut instr = handle.borrow_mut();
                instr.size = 1;
                instr.kind = InstructionType::Nop;
                instr.mnemonic = "nop".into();
            }
            document.instruction(&handle);
        }
        Op::Info(address) => document.info(*address, "note"),
        Op::Erase(address) => document.erase_symbol(*address),
        Op::Segment(address) => document.segment(
            format!("seg_{:x}", address),
            0,
            *address,
            0x10,
            SegmentKind::CODE,
        ),
    }
}

proptest! {
    #[test]
    fn listing_order_is_strict_under_mutation(ops in prop::collection::vec(arb_op(), 1..64)) {
        let mut document = ListingDocument::new();
        for op in &ops {
            apply(&mut document, op);

            let keys: Vec<_> = document.iter().map(|i| (i.address, i.kind)).collect();
            for pair in keys.windows(2) {
                prop_assert!(pair[0] < pair[1], "order violated after {:?}: {:?}", op, pair);
            }
        }
    }

    #[test]
    fn symbols_and_items_stay_consistent(ops in prop::collection::vec(arb_op(), 1..64)) {
        let mut document = ListingDocument::new();
        for op in &ops {
            apply(&mut document, op);
        }

        // Every symbol has exactly one matching listing item.
        for symbol in document.symbols().iter() {
            let kind = if symbol.is_function() {
                ListingItemKind::Function
            } else {
                ListingItemKind::Symbol
            };
            prop_assert!(
                document.item(symbol.address, kind).is_some(),
                "symbol {:?} has no item",
                symbol.name
            );
            prop_assert_eq!(
                document.symbol_by_name(&symbol.name).map(|s| s.address),
                Some(symbol.address)
            );
        }

        // Every function item is backed by a function symbol.
        for item in document.iter().filter(|i| i.kind == ListingItemKind::Function) {
            prop_assert!(document
                .symbol_at(item.address)
                .is_some_and(|s| s.is_function()));
        }
    }

    #[test]
    fn reference_table_is_bidirectional(
        edges in prop::collection::vec(
            (0x0u64..0x40, 0x0u64..0x40, 0u8..5),
            0..128,
        )
    ) {
        let kind_of = |k: u8| match k {
            0 => ReferenceKind::Jump,
            1 => ReferenceKind::Call,
            2 => ReferenceKind::Read,
            3 => ReferenceKind::Write,
            _ => ReferenceKind::Target,
        };

        let mut table = ReferenceTable::new();
        for (from, to, k) in &edges {
            table.push(*from, *to, kind_of(*k));
        }

        // Reverse entries are mirrored in the forward direction.
        let mut total_reverse = 0;
        for to in table.referenced_addresses() {
            for r in table.references(to) {
                prop_assert_eq!(r.to, to);
                prop_assert!(table.targets(r.from).contains(&r.to));
                prop_assert!(table.edges_from(r.from).contains(r));
                total_reverse += 1;
            }
        }
        prop_assert_eq!(total_reverse, table.len());

        // Duplicate pushes collapsed: every stored edge is unique.
        let mut seen = std::collections::HashSet::new();
        for to in table.referenced_addresses() {
            for r in table.references(to) {
                prop_assert!(seen.insert(*r), "duplicate edge {:?}", r);
            }
        }
    }
}
