//! The assembler capability interface.

use bitflags::bitflags;

use descry_core::{Bitness, BufferView, Endianness, Instruction};

use crate::DecodeError;

bitflags! {
    /// Architecture capability mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AssemblerFlags: u32 {
        /// The architecture can drive an emulator. Reserved; the engine
        /// exposes the hook but never exercises it.
        const CAN_EMULATE = 0x0000_0001;
    }
}

/// Architecture-specific single-instruction decoder.
///
/// An assembler communicates with the engine only through the instruction it
/// fills: size, mnemonic, operands, classification, and any precomputed
/// reachable addresses. It never touches the listing document or the work
/// queue.
pub trait Assembler {
    /// Stable identifier matched against `Loader::assembler_id`.
    fn id(&self) -> &'static str;

    /// Byte order of the target.
    fn endianness(&self) -> Endianness;

    /// Word width of the target.
    fn bits(&self) -> Bitness;

    /// Capability mask.
    fn flags(&self) -> AssemblerFlags {
        AssemblerFlags::empty()
    }

    /// Decodes one instruction from the start of `view`.
    ///
    /// `instruction` arrives anchored at the right address with every other
    /// field reset. On success `instruction.size` is greater than zero; an
    /// error means the bytes do not decode and the engine will fabricate an
    /// invalid one-byte instruction instead.
    fn decode(&self, view: &BufferView, instruction: &mut Instruction)
        -> Result<(), DecodeError>;

    /// Post-decode hook for operand annotation or control-flow
    /// reclassification. Default: nothing.
    fn on_decoded(&self, _instruction: &mut Instruction) {}
}
