//! # descry-disasm
//!
//! Architecture plug-in interface for the descry engine: the [`Assembler`]
//! trait binds raw bytes to a typed instruction, and backends implement it
//! per architecture. The crate ships a 32-bit x86 subset backend behind the
//! `x86` feature.

pub mod error;
pub mod traits;

#[cfg(feature = "x86")]
pub mod x86;

pub use error::DecodeError;
pub use traits::{Assembler, AssemblerFlags};

#[cfg(feature = "x86")]
pub use x86::X86Assembler;
