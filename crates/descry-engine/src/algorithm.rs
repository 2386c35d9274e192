//! The disassembly algorithm: state handlers driving decode and follow-up
//! analysis.
//!
//! Dispatch is an exhaustive match over the closed state set. Handlers may
//! only see addresses that passed segment validation; the decode handler
//! applies the stricter code-segment and offset checks itself.

use descry_core::{Address, InstructionType, Operand, ReferenceKind, SymbolKind};
use descry_disasm::DecodeError;

use crate::cache::CachedInstruction;
use crate::disassembler::Disassembler;
use crate::state_machine::{State, StateId};

/// Mnemonic used for undecodable bytes.
const INVALID_MNEMONIC: &str = "db";

/// Upper bound on address-table enumeration.
const ADDRESS_TABLE_MAX: usize = 512;

impl Disassembler {
    pub(crate) fn dispatch(&mut self, state: State) {
        match state.id {
            StateId::Decode => self.decode_state(&state),
            StateId::Jump => self.jump_state(&state),
            StateId::Call => self.call_state(&state),
            StateId::Branch => self.branch_state(&state),
            StateId::BranchMemory => self.branch_memory_state(&state),
            StateId::AddressTable => self.address_table_state(&state),
            StateId::Memory => self.memory_state(&state),
            StateId::Pointer => self.pointer_state(&state),
            StateId::Immediate => self.immediate_state(&state),
        }
    }

    // ---- decode ---------------------------------------------------------

    fn decode_state(&mut self, state: &State) {
        let address = state.address;

        if !self.can_decode(address) {
            return;
        }

        // A code interpretation supersedes a stale unlocked data symbol.
        if let Some(symbol) = self.document.symbol_at(address) {
            if !symbol.is_locked() && !symbol.is_code() {
                self.document.erase_symbol(address);
            }
        }

        let handle = self.document.allocate_instruction(address);
        let result = {
            let view = self.loader.view(address);
            self.assembler.decode(&view, &mut handle.borrow_mut())
        };

        match result {
            Err(error) => self.on_decode_failed(&handle, &error),
            Ok(()) => {
                debug_assert!(handle.borrow().size > 0);

                self.assembler.on_decoded(&mut handle.borrow_mut());
                self.document.instruction(&handle);
                self.walk_operands(&handle);

                let (terminator, end) = {
                    let instr = handle.borrow();
                    (instr.is_terminator(), instr.end_address())
                };
                if !terminator {
                    self.states.enqueue(StateId::Decode, end, address);
                }
            }
        }
    }

    fn on_decode_failed(&mut self, handle: &CachedInstruction, error: &DecodeError) {
        let address = {
            let mut instr = handle.borrow_mut();
            instr.kind = InstructionType::Invalid;
            // Whatever the decoder managed to fill, an invalid instruction
            // occupies exactly one byte.
            instr.size = 1;
            instr.mnemonic = INVALID_MNEMONIC.into();
            instr.operands.clear();
            instr.targets.clear();
            instr.address
        };

        self.document.instruction(handle);
        self.sink
            .problem(&format!("decode failed @ {:#x}: {}", address, error));
    }

    /// Decoding preconditions: bytes available, inside a code segment, and
    /// an address the loader can translate.
    fn can_decode(&mut self, address: Address) -> bool {
        let stale = match &self.current_segment {
            Some(segment) => !segment.contains(address),
            None => true,
        };
        if stale {
            self.current_segment = self.document.segment_at(address).cloned();
        }

        match &self.current_segment {
            Some(segment) if segment.is_code() => {}
            _ => return false,
        }

        if self.loader.offset(address).is_none() {
            return false;
        }

        !self.loader.view(address).eob()
    }

    /// The operand walker: turns decoded operands into follow-up work.
    fn walk_operands(&mut self, handle: &CachedInstruction) {
        let from = handle.address();
        let mut meta = Vec::new();
        let mut work = Vec::new();

        {
            let instr = handle.borrow();
            let pointer_size = self.assembler.bits().pointer_size() as u8;
            meta.extend(instr.targets.iter().copied());

            for op in &instr.operands {
                match op {
                    Operand::Memory { address, size } => {
                        if instr.kind.is_control_flow() {
                            work.push((StateId::BranchMemory, *address));
                        } else if *size == pointer_size {
                            work.push((StateId::Pointer, *address));
                        } else {
                            work.push((StateId::Memory, *address));
                        }
                    }
                    Operand::Immediate { value, target, .. } => {
                        let id = if *target {
                            match instr.kind {
                                InstructionType::Jump | InstructionType::ConditionalJump => {
                                    StateId::Jump
                                }
                                InstructionType::Call | InstructionType::ConditionalCall => {
                                    StateId::Call
                                }
                                InstructionType::Branch => StateId::Branch,
                                _ => StateId::Immediate,
                            }
                        } else {
                            StateId::Immediate
                        };
                        work.push((id, *value));
                    }
                    _ => {}
                }
            }
        }

        for target in meta {
            self.push_target(target, from);
        }
        for (id, address) in work {
            self.states.enqueue(id, address, from);
        }
    }

    // ---- control flow ---------------------------------------------------

    fn jump_state(&mut self, state: &State) {
        let target = state.address;
        self.references
            .push(state.source, target, ReferenceKind::Jump);

        let in_code = self
            .document
            .segment_at(target)
            .is_some_and(|s| s.is_code());

        if in_code {
            let unknown = self
                .document
                .symbol_at(target)
                .map_or(true, |s| !s.is_code());
            if unknown {
                self.document.symbol(target, None, SymbolKind::CODE, 0);
            }
            self.states.enqueue(StateId::Decode, target, target);
        } else if self.document.symbol_at(target).is_none() {
            self.document.symbol(target, None, SymbolKind::DATA, 0);
        }
    }

    fn call_state(&mut self, state: &State) {
        let target = state.address;
        self.references
            .push(state.source, target, ReferenceKind::Call);

        let in_code = self
            .document
            .segment_at(target)
            .is_some_and(|s| s.is_code());

        if in_code {
            let promoted = self
                .document
                .symbol_at(target)
                .is_some_and(|s| s.is_function());
            if !promoted {
                self.document.function(target, None, 0);
            }
            self.states.enqueue(StateId::Decode, target, target);
        } else if self.document.symbol_at(target).is_none() {
            self.document.symbol(target, None, SymbolKind::DATA, 0);
        }
    }

    /// Architecture-classified generic branch: a jump edge whose source
    /// keeps its fallthrough.
    fn branch_state(&mut self, state: &State) {
        self.jump_state(state);
    }

    fn branch_memory_state(&mut self, state: &State) {
        let cell = state.address;

        // Two or more consecutive in-segment pointers make a dispatch
        // table; a lone cell resolves through the pointer state.
        if self.count_table_entries(cell) >= 2 {
            self.states
                .enqueue(StateId::AddressTable, cell, state.source);
        } else {
            self.states.enqueue(StateId::Pointer, cell, state.source);
        }
    }

    fn address_table_state(&mut self, state: &State) {
        let base = state.address;
        let endianness = self.assembler.endianness();
        let bits = self.assembler.bits();
        let stride = bits.pointer_size();

        let mut entries = Vec::new();
        {
            let view = self.loader.view(base);
            while entries.len() < ADDRESS_TABLE_MAX {
                match view.read_pointer(entries.len() * stride, endianness, bits) {
                    Ok(value) if self.document.segment_at(value).is_some() => {
                        entries.push(value)
                    }
                    _ => break,
                }
            }
        }

        if entries.len() < 2 {
            self.states.enqueue(StateId::Pointer, base, state.source);
            return;
        }

        self.document.table(base, entries.len() as u32);
        self.document.auto_comment(
            state.source,
            format!("dispatch table @ {:#x}, {} entries", base, entries.len()),
        );

        for (index, value) in entries.iter().enumerate() {
            let cell = base + (index * stride) as u64;
            if index > 0 {
                self.document.table_item(cell, index as u32);
            }
            self.references.push(state.source, cell, ReferenceKind::Read);

            let in_code = self
                .document
                .segment_at(*value)
                .is_some_and(|s| s.is_code());
            if in_code {
                self.states.enqueue(StateId::Jump, *value, state.source);
            } else {
                self.states.enqueue(StateId::Memory, *value, state.source);
            }
        }
    }

    // ---- data -----------------------------------------------------------

    fn memory_state(&mut self, state: &State) {
        let cell = state.address;
        let kind = self.access_kind(state.source, cell);
        self.references.push(state.source, cell, kind);

        if self.document.symbol_at(cell).is_none() {
            self.document.symbol(cell, None, SymbolKind::DATA, 0);
        }
    }

    fn pointer_state(&mut self, state: &State) {
        let cell = state.address;
        let endianness = self.assembler.endianness();
        let bits = self.assembler.bits();

        let value = {
            let view = self.loader.view(cell);
            view.read_pointer(0, endianness, bits).ok()
        };

        let Some(value) = value else {
            // Nothing to dereference (unmapped or truncated): plain data.
            self.states.enqueue(StateId::Memory, cell, state.source);
            return;
        };

        match self.document.segment_at(value) {
            Some(segment) if segment.is_code() => {
                let kind = self.access_kind(state.source, cell);
                self.references.push(state.source, cell, kind);
                self.document.pointer(cell, 0);
                self.states.enqueue(StateId::Jump, value, state.source);
            }
            Some(_) => {
                let kind = self.access_kind(state.source, cell);
                self.references.push(state.source, cell, kind);
                self.document.pointer(cell, 0);
                self.states.enqueue(StateId::Memory, value, state.source);
            }
            None => {
                // The cell's content is not an address; treat the cell as
                // ordinary data.
                self.states.enqueue(StateId::Memory, cell, state.source);
            }
        }
    }

    fn immediate_state(&mut self, state: &State) {
        // Validation already established the value lands in a segment;
        // everything else was vetoed before dispatch.
        self.states
            .enqueue(StateId::Memory, state.address, state.source);
    }

    // ---- helpers --------------------------------------------------------

    /// Read/write classification from the source instruction's operand
    /// position: a direct memory destination is a write, anything else a
    /// read. Control flow through a cell always reads it.
    fn access_kind(&self, source: Address, cell: Address) -> ReferenceKind {
        if let Some(handle) = self.document.instruction_at(source) {
            let instr = handle.borrow();
            if instr.kind.is_control_flow() {
                return ReferenceKind::Read;
            }

            for (index, op) in instr.operands.iter().enumerate() {
                if matches!(op, Operand::Memory { address, .. } if *address == cell) {
                    return if index == 0 {
                        ReferenceKind::Write
                    } else {
                        ReferenceKind::Read
                    };
                }
            }
        }

        ReferenceKind::Read
    }

    fn count_table_entries(&self, base: Address) -> usize {
        let endianness = self.assembler.endianness();
        let bits = self.assembler.bits();
        let stride = bits.pointer_size();

        let view = self.loader.view(base);
        let mut count = 0;

        while count < ADDRESS_TABLE_MAX {
            match view.read_pointer(count * stride, endianness, bits) {
                Ok(value) if self.document.segment_at(value).is_some() => count += 1,
                _ => break,
            }
        }

        count
    }
}
