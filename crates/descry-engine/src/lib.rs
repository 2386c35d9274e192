//! # descry-engine
//!
//! The recursive-descent disassembly engine. An address-keyed state machine
//! schedules instruction decoding and operand follow-up; results land in an
//! address-sorted [`ListingDocument`] kept consistent with a symbol table, a
//! reference table, and a refcounted [`InstructionCache`]. The
//! [`Disassembler`] facade owns the pieces, runs the queue to quiescence,
//! and hands the result to post-analysis hooks.
//!
//! The engine is single-threaded cooperative: between two state transitions
//! every structure is fully consistent and queryable.

pub mod analyzer;
pub mod basic_blocks;
pub mod cache;
pub mod disassembler;
pub mod document;
pub mod report;
pub mod signatures;
pub mod state_machine;

mod algorithm;

pub use analyzer::{Analyzer, AnalyzerContext};
pub use basic_blocks::BasicBlock;
pub use cache::{CacheError, CachedInstruction, InstructionCache};
pub use disassembler::Disassembler;
pub use document::{
    ChangeAction, DocumentChanged, ListingCursor, ListingDocument, ListingItem, ListingItemKind,
};
pub use report::{LogSink, MemorySink, ReportSink};
pub use signatures::{SignatureDatabase, SignatureMatch};
pub use state_machine::{State, StateId, StateMachine};
