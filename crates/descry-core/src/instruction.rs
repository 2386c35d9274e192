//! Typed instruction representation.

use crate::{Address, Operand};

/// High-level instruction classification.
///
/// The engine only interprets control-flow kinds; everything else is carried
/// through for listing output and analysis passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InstructionType {
    /// Bytes did not decode.
    Invalid,
    /// No particular classification.
    None,
    Nop,
    /// Execution stops here (hlt, trap, ...).
    Stop,
    Jump,
    ConditionalJump,
    Call,
    ConditionalCall,
    Ret,
    Compare,
    /// Architecture-classified generic branch.
    Branch,
    Push,
    Pop,
    Load,
    Store,
}

impl InstructionType {
    /// Returns true for types that end a basic block and suppress
    /// fallthrough decoding.
    pub fn is_terminator(&self) -> bool {
        matches!(self, Self::Stop | Self::Jump | Self::Ret)
    }

    /// Returns true for any jump flavour.
    pub fn is_jump(&self) -> bool {
        matches!(self, Self::Jump | Self::ConditionalJump)
    }

    /// Returns true for any call flavour.
    pub fn is_call(&self) -> bool {
        matches!(self, Self::Call | Self::ConditionalCall)
    }

    /// Returns true for types whose operands name code destinations.
    pub fn is_control_flow(&self) -> bool {
        self.is_jump() || self.is_call() || matches!(self, Self::Branch)
    }

    /// Returns true for the conditional flavours.
    pub fn is_conditional(&self) -> bool {
        matches!(self, Self::ConditionalJump | Self::ConditionalCall)
    }
}

/// A decoded instruction.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Instruction {
    /// Virtual address of this instruction.
    pub address: Address,
    /// Size in bytes.
    pub size: usize,
    /// Architecture-specific instruction id.
    pub id: u32,
    /// Mnemonic string ("mov", "jmp", ...).
    pub mnemonic: String,
    /// Classification.
    pub kind: InstructionType,
    /// Operands, destination first.
    pub operands: Vec<Operand>,
    /// Addresses the decoder already determined are reachable from here,
    /// beyond what the operands express (delay slots, dispatch tables).
    pub targets: Vec<Address>,
}

impl Instruction {
    /// Creates an undecoded instruction anchored at `address`.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            size: 0,
            id: 0,
            mnemonic: String::new(),
            kind: InstructionType::None,
            operands: Vec::new(),
            targets: Vec::new(),
        }
    }

    /// Resets every field except the address, for re-decoding in place.
    pub fn reset(&mut self) {
        let address = self.address;
        *self = Self::new(address);
    }

    /// Returns the end address (address + size).
    pub fn end_address(&self) -> Address {
        self.address + self.size as u64
    }

    /// Returns the first operand flagged as a control-flow target.
    pub fn target_operand(&self) -> Option<&Operand> {
        self.operands.iter().find(|op| op.is_target())
    }

    /// Adds a precomputed reachable address.
    pub fn push_target(&mut self, target: Address) {
        if !self.targets.contains(&target) {
            self.targets.push(target);
        }
    }

    /// Returns true if this instruction terminates a basic block.
    pub fn is_terminator(&self) -> bool {
        self.kind.is_terminator()
    }

    /// Returns true for any jump flavour.
    pub fn is_jump(&self) -> bool {
        self.kind.is_jump()
    }

    /// Returns true for any call flavour.
    pub fn is_call(&self) -> bool {
        self.kind.is_call()
    }

    /// Returns true if the bytes failed to decode.
    pub fn is_invalid(&self) -> bool {
        matches!(self.kind, InstructionType::Invalid)
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010x}  {}", self.address, self.mnemonic)?;

        for (i, op) in self.operands.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, " {}", op)?;
        }

        Ok(())
    }
}
