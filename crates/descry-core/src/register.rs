//! Architecture-agnostic register representation.

/// Register class (general purpose, stack pointer, etc.).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegisterClass {
    /// General purpose register.
    General,
    /// Stack pointer.
    StackPointer,
    /// Program counter / instruction pointer.
    ProgramCounter,
    /// Flags / status register.
    Flags,
    /// Other special registers.
    Other,
}

/// A register, identified by class and an architecture-specific id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Register {
    /// The class of register.
    pub class: RegisterClass,
    /// Architecture-specific register id.
    pub id: u16,
    /// Size of the register in bits.
    pub size: u16,
}

impl Register {
    /// Creates a new register.
    pub fn new(class: RegisterClass, id: u16, size: u16) -> Self {
        Self { class, id, size }
    }

    /// Creates a general purpose register.
    pub fn general(id: u16, size: u16) -> Self {
        Self::new(RegisterClass::General, id, size)
    }
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.class {
            RegisterClass::General => write!(f, "r{}", self.id),
            RegisterClass::StackPointer => write!(f, "sp"),
            RegisterClass::ProgramCounter => write!(f, "pc"),
            RegisterClass::Flags => write!(f, "flags"),
            RegisterClass::Other => write!(f, "reg{}", self.id),
        }
    }
}
