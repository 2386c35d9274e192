//! Basic-block boundaries derived from the listing.

use descry_core::{Address, InstructionType, ReferenceTable};

use crate::document::ListingDocument;

/// A maximal straight-line run of instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicBlock {
    pub id: u32,
    /// Address of the first instruction.
    pub start: Address,
    /// One past the last instruction.
    pub end: Address,
}

impl BasicBlock {
    /// Size of the block in bytes.
    pub fn size(&self) -> u64 {
        self.end - self.start
    }

    /// Containment test.
    pub fn contains(&self, address: Address) -> bool {
        address >= self.start && address < self.end
    }
}

/// Scans the sorted instruction stream and splits at every function start
/// and every jump/branch-target reference; terminators and conditional
/// branches end the running block, as do gaps in the address stream.
pub fn compute(document: &ListingDocument, references: &ReferenceTable) -> Vec<BasicBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<(Address, Address)> = None;

    let mut close = |current: &mut Option<(Address, Address)>, blocks: &mut Vec<BasicBlock>| {
        if let Some((start, end)) = current.take() {
            blocks.push(BasicBlock {
                id: blocks.len() as u32,
                start,
                end,
            });
        }
    };

    for address in document.instruction_addresses() {
        let Some(handle) = document.instruction_at(address) else {
            continue;
        };
        let (end, kind) = {
            let instr = handle.borrow();
            (instr.end_address(), instr.kind)
        };

        let is_leader = match current {
            None => true,
            Some((_, running_end)) => {
                running_end != address
                    || document.has_function_at(address)
                    || references.is_jump_target(address)
            }
        };

        if is_leader {
            close(&mut current, &mut blocks);
            current = Some((address, end));
        } else {
            current = current.map(|(start, _)| (start, end));
        }

        let ends_block = kind.is_terminator()
            || matches!(
                kind,
                InstructionType::ConditionalJump | InstructionType::Branch
            );
        if ends_block {
            close(&mut current, &mut blocks);
        }
    }

    close(&mut current, &mut blocks);
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use descry_core::ReferenceKind;

    fn push_instruction(
        document: &mut ListingDocument,
        address: Address,
        size: usize,
        kind: InstructionType,
    ) {
        let handle = document.allocate_instruction(address);
        {
            let mut instr = handle.borrow_mut();
            instr.size = size;
            instr.kind = kind;
            instr.mnemonic = "i".into();
        }
        document.instruction(&handle);
    }

    #[test]
    fn test_straight_line_is_one_block() {
        let mut document = ListingDocument::new();
        push_instruction(&mut document, 0x1000, 1, InstructionType::Nop);
        push_instruction(&mut document, 0x1001, 1, InstructionType::Nop);
        push_instruction(&mut document, 0x1002, 1, InstructionType::Ret);

        let blocks = compute(&document, &ReferenceTable::new());
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].start, 0x1000);
        assert_eq!(blocks[0].end, 0x1003);
    }

    #[test]
    fn test_jump_target_splits() {
        let mut document = ListingDocument::new();
        push_instruction(&mut document, 0x1000, 2, InstructionType::ConditionalJump);
        push_instruction(&mut document, 0x1002, 1, InstructionType::Nop);
        push_instruction(&mut document, 0x1003, 1, InstructionType::Ret);

        let mut references = ReferenceTable::new();
        references.push(0x1000, 0x1003, ReferenceKind::Jump);

        let blocks = compute(&document, &references);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[1], BasicBlock { id: 1, start: 0x1002, end: 0x1003 });
        assert_eq!(blocks[2].start, 0x1003);
    }

    #[test]
    fn test_function_start_and_gap_split() {
        let mut document = ListingDocument::new();
        push_instruction(&mut document, 0x1000, 1, InstructionType::Nop);
        document.function(0x1001, None, 0);
        push_instruction(&mut document, 0x1001, 1, InstructionType::Nop);
        // Gap: next instruction is not contiguous.
        push_instruction(&mut document, 0x2000, 1, InstructionType::Ret);

        let blocks = compute(&document, &ReferenceTable::new());
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].end, 0x1001);
        assert_eq!(blocks[1].start, 0x1001);
        assert_eq!(blocks[2].start, 0x2000);
    }
}
