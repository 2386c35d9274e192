//! The disassembler facade: owns the engine parts and runs to quiescence.

use std::collections::HashSet;

use descry_core::{Address, ReferenceKind, ReferenceTable, Segment};
use descry_disasm::Assembler;
use descry_formats::Loader;

use crate::analyzer::{Analyzer, AnalyzerContext};
use crate::basic_blocks::{self, BasicBlock};
use crate::document::{ListingDocument, ListingItemKind};
use crate::report::{LogSink, ReportSink};
use crate::signatures::SignatureDatabase;
use crate::state_machine::{State, StateId, StateMachine};

/// Recursive-descent disassembler.
///
/// Construction publishes the loader's segments and entry symbol into the
/// document; [`disassemble`] then drains the state machine, validates
/// control-flow targets, runs the post-quiescence hooks, and computes basic
/// blocks. Everything stays queryable between runs, and a second run without
/// intervening mutation is a no-op.
///
/// [`disassemble`]: Disassembler::disassemble
pub struct Disassembler {
    pub(crate) loader: Box<dyn Loader>,
    pub(crate) assembler: Box<dyn Assembler>,
    pub(crate) document: ListingDocument,
    pub(crate) references: ReferenceTable,
    pub(crate) states: StateMachine,
    pub(crate) sink: Box<dyn ReportSink>,
    /// Containment cache for the hot segment-kind check.
    pub(crate) current_segment: Option<Segment>,
    analyzer: Option<Box<dyn Analyzer>>,
    signatures: Option<Box<dyn SignatureDatabase>>,
    blocks: Vec<BasicBlock>,
    busy: bool,
    busy_listeners: Vec<Box<dyn FnMut(bool)>>,
    analyzed: bool,
    reported_missing: HashSet<Address>,
    reported_unreachable: HashSet<Address>,
}

impl Disassembler {
    /// Creates a disassembler logging through the `log` facade.
    pub fn new(loader: Box<dyn Loader>, assembler: Box<dyn Assembler>) -> Self {
        Self::with_sink(loader, assembler, Box::new(LogSink))
    }

    /// Creates a disassembler with an explicit report sink.
    pub fn with_sink(
        loader: Box<dyn Loader>,
        assembler: Box<dyn Assembler>,
        mut sink: Box<dyn ReportSink>,
    ) -> Self {
        if loader.assembler_id() != assembler.id() {
            sink.problem(&format!(
                "loader requests assembler {:?} but {:?} is bound",
                loader.assembler_id(),
                assembler.id()
            ));
        }

        let mut document = ListingDocument::new();
        for segment in loader.segments() {
            document.segment(
                segment.name.clone(),
                segment.offset,
                segment.address,
                segment.size,
                segment.kind,
            );
        }
        document.entry(loader.entry_point(), 0);

        Self {
            loader,
            assembler,
            document,
            references: ReferenceTable::new(),
            states: StateMachine::new(),
            sink,
            current_segment: None,
            analyzer: None,
            signatures: None,
            blocks: Vec::new(),
            busy: false,
            busy_listeners: Vec::new(),
            analyzed: false,
            reported_missing: HashSet::new(),
            reported_unreachable: HashSet::new(),
        }
    }

    /// Installs the post-quiescence analyzer.
    pub fn set_analyzer(&mut self, analyzer: Box<dyn Analyzer>) {
        self.analyzer = Some(analyzer);
    }

    /// Installs the signature database searched after analysis.
    pub fn set_signatures(&mut self, signatures: Box<dyn SignatureDatabase>) {
        self.signatures = Some(signatures);
    }

    /// Runs to quiescence. Idempotent: a second call without intervening
    /// mutation leaves the document unchanged.
    pub fn disassemble(&mut self) {
        self.sink.status("Disassembling...");

        let seeds: Vec<Address> = self.document.functions().to_vec();
        for address in seeds {
            self.states.enqueue(StateId::Decode, address, address);
        }

        self.run_queue();
        self.run_analyzer();
        self.run_signatures();
        self.compute_basic_blocks();
        self.document.move_to_entry();
    }

    /// Records a `Target` edge and schedules decoding when `target` falls
    /// in a code segment.
    pub fn push_target(&mut self, target: Address, from: Address) {
        self.references.push(from, target, ReferenceKind::Target);

        if self
            .document
            .segment_at(target)
            .is_some_and(|s| s.is_code())
        {
            self.states.enqueue(StateId::Decode, target, target);
        }
    }

    /// The listing document.
    pub fn document(&self) -> &ListingDocument {
        &self.document
    }

    /// Mutable access to the document, for user edits between runs.
    pub fn document_mut(&mut self) -> &mut ListingDocument {
        &mut self.document
    }

    /// The cross-reference table.
    pub fn references(&self) -> &ReferenceTable {
        &self.references
    }

    /// Basic blocks from the last [`compute_basic_blocks`] pass.
    ///
    /// [`compute_basic_blocks`]: Disassembler::compute_basic_blocks
    pub fn basic_blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    /// True while the work queue is draining.
    pub fn busy(&self) -> bool {
        self.busy
    }

    /// Number of queued work items.
    pub fn pending_work(&self) -> usize {
        self.states.pending()
    }

    /// Registers a busy-transition observer.
    pub fn on_busy_changed(&mut self, listener: impl FnMut(bool) + 'static) {
        self.busy_listeners.push(Box::new(listener));
    }

    /// Drops all pending work. In-flight partial results stay queryable.
    pub fn cancel(&mut self) {
        self.states.cancel();
    }

    /// Re-derives basic-block boundaries from the current listing and
    /// reference state.
    pub fn compute_basic_blocks(&mut self) {
        self.blocks = basic_blocks::compute(&self.document, &self.references);
    }

    // ---- internals ------------------------------------------------------

    fn run_queue(&mut self) {
        if self.states.is_empty() {
            return;
        }

        self.set_busy(true);
        while let Some(state) = self.states.next() {
            if self.validate_state(&state) {
                self.dispatch(state);
            }
        }
        self.set_busy(false);

        self.validate_targets();
    }

    /// A state item is valid only when its address falls inside a segment.
    fn validate_state(&self, state: &State) -> bool {
        self.document.segment_at(state.address).is_some()
    }

    fn set_busy(&mut self, busy: bool) {
        if self.busy == busy {
            return;
        }

        self.busy = busy;
        for listener in self.busy_listeners.iter_mut() {
            listener(busy);
        }
    }

    /// Reports every control-flow instruction that ended up with no
    /// resolved target. Runs at quiescence because targets resolve through
    /// queued follow-up states.
    fn validate_targets(&mut self) {
        let addresses: Vec<Address> = self.document.instruction_addresses().collect();

        for address in addresses {
            if self.reported_missing.contains(&address) {
                continue;
            }

            let Some(handle) = self.document.instruction_at(address) else {
                continue;
            };
            let (kind, mnemonic) = {
                let instr = handle.borrow();
                (instr.kind, instr.mnemonic.clone())
            };

            if !kind.is_control_flow() {
                continue;
            }

            let resolved = self
                .references
                .edges_from(address)
                .iter()
                .any(|r| r.kind.is_code());
            if !resolved {
                self.reported_missing.insert(address);
                self.sink.problem(&format!(
                    "no targets found for {:?} @ {:#x}",
                    mnemonic, address
                ));
            }
        }

        // Declared functions whose first instruction never materialized.
        let functions: Vec<Address> = self.document.functions().to_vec();
        for address in functions {
            if self.reported_unreachable.contains(&address)
                || self
                    .document
                    .item(address, ListingItemKind::Instruction)
                    .is_some()
            {
                continue;
            }

            self.reported_unreachable.insert(address);
            let name = self
                .document
                .symbol_at(address)
                .map(|s| s.name.clone())
                .unwrap_or_default();
            self.sink
                .problem(&format!("unreachable function {:?} @ {:#x}", name, address));
        }
    }

    fn run_analyzer(&mut self) {
        let Some(mut analyzer) = self.analyzer.take() else {
            return;
        };

        // Fixed point: a pass that adds no listing items and queues no new
        // work ends the loop.
        loop {
            let items_before = self.document.len();

            {
                let mut ctx = AnalyzerContext {
                    document: &mut self.document,
                    references: &self.references,
                    sink: self.sink.as_mut(),
                };

                if !self.analyzed {
                    self.analyzed = true;
                    ctx.sink.status("Analyzing...");
                    analyzer.analyze(&mut ctx);
                } else {
                    ctx.sink.status("Analyzing (fast)...");
                    analyzer.analyze_fast(&mut ctx);
                }
            }

            self.run_queue();

            if self.document.len() == items_before && self.states.is_empty() {
                break;
            }
        }

        self.analyzer = Some(analyzer);
    }

    fn run_signatures(&mut self) {
        let Some(signatures) = self.signatures.take() else {
            return;
        };

        let segments: Vec<Segment> = self
            .document
            .segments()
            .iter()
            .filter(|s| s.is_code())
            .cloned()
            .collect();

        for segment in segments {
            let view = self.loader.view(segment.address);
            if view.eob() {
                continue;
            }

            let mut matches = Vec::new();
            signatures.search(&view, &mut |m| matches.push(m));

            for m in matches {
                let address = segment.address + m.offset as u64;
                if self.document.has_function_at(address) {
                    self.document.lock_function(address, &m.name, 0);
                }
            }
        }

        self.signatures = Some(signatures);
    }
}
