//! 32-bit x86 subset decoder.
//!
//! Covers the control-flow core plus enough data movement to exercise the
//! engine: direct and conditional jumps, calls, branches through memory,
//! direct memory loads/stores, immediates, and stack traffic. Unhandled
//! opcodes decode to an error and surface as invalid instructions.

use descry_core::{
    Bitness, BufferView, Endianness, Instruction, InstructionType, Operand, Register,
};

use crate::traits::{Assembler, AssemblerFlags};
use crate::DecodeError;

const OPERAND_SIZE: u8 = 4;

/// Condition-code mnemonic suffixes, indexed by the opcode's low nibble.
const CONDITION_SUFFIX: [&str; 16] = [
    "o", "no", "b", "ae", "e", "ne", "be", "a", "s", "ns", "p", "np", "l", "ge", "le", "g",
];

/// 32-bit x86 subset decoder.
pub struct X86Assembler;

impl X86Assembler {
    /// Creates a new decoder.
    pub fn new() -> Self {
        Self
    }

    fn read_rel8(
        view: &BufferView,
        address: u64,
        offset: usize,
        next: u64,
    ) -> Result<u64, DecodeError> {
        let rel = view
            .read_u8(offset)
            .map_err(|_| DecodeError::truncated(address, offset + 1, view.len()))?
            as i8;
        Ok(next.wrapping_add(rel as i64 as u64))
    }

    fn read_rel32(
        view: &BufferView,
        address: u64,
        offset: usize,
        next: u64,
    ) -> Result<u64, DecodeError> {
        let rel = view
            .read_u32(offset, Endianness::Little)
            .map_err(|_| DecodeError::truncated(address, offset + 4, view.len()))?
            as i32;
        Ok(next.wrapping_add(rel as i64 as u64))
    }

    fn read_imm32(view: &BufferView, address: u64, offset: usize) -> Result<u64, DecodeError> {
        view.read_u32(offset, Endianness::Little)
            .map(u64::from)
            .map_err(|_| DecodeError::truncated(address, offset + 4, view.len()))
    }
}

impl Default for X86Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler for X86Assembler {
    fn id(&self) -> &'static str {
        "x86"
    }

    fn endianness(&self) -> Endianness {
        Endianness::Little
    }

    fn bits(&self) -> Bitness {
        Bitness::Bits32
    }

    fn flags(&self) -> AssemblerFlags {
        AssemblerFlags::empty()
    }

    fn decode(
        &self,
        view: &BufferView,
        instruction: &mut Instruction,
    ) -> Result<(), DecodeError> {
        let address = instruction.address;
        let opcode = view
            .read_u8(0)
            .map_err(|_| DecodeError::truncated(address, 1, 0))?;

        match opcode {
            0x90 => {
                instruction.size = 1;
                instruction.mnemonic = "nop".into();
                instruction.kind = InstructionType::Nop;
            }

            0xC3 => {
                instruction.size = 1;
                instruction.mnemonic = "ret".into();
                instruction.kind = InstructionType::Ret;
            }

            0xCC => {
                instruction.size = 1;
                instruction.mnemonic = "int3".into();
                instruction.kind = InstructionType::Stop;
            }

            0xF4 => {
                instruction.size = 1;
                instruction.mnemonic = "hlt".into();
                instruction.kind = InstructionType::Stop;
            }

            // jmp rel8
            0xEB => {
                instruction.size = 2;
                let target = Self::read_rel8(view, address, 1, address.wrapping_add(2))?;
                instruction.mnemonic = "jmp".into();
                instruction.kind = InstructionType::Jump;
                instruction.operands.push(Operand::target(target, 1));
            }

            // jmp rel32
            0xE9 => {
                instruction.size = 5;
                let target = Self::read_rel32(view, address, 1, address.wrapping_add(5))?;
                instruction.mnemonic = "jmp".into();
                instruction.kind = InstructionType::Jump;
                instruction
                    .operands
                    .push(Operand::target(target, OPERAND_SIZE));
            }

            // jcc rel8
            0x70..=0x7F => {
                instruction.size = 2;
                let target = Self::read_rel8(view, address, 1, address.wrapping_add(2))?;
                instruction.mnemonic =
                    format!("j{}", CONDITION_SUFFIX[(opcode & 0x0F) as usize]);
                instruction.kind = InstructionType::ConditionalJump;
                instruction.operands.push(Operand::target(target, 1));
            }

            // call rel32
            0xE8 => {
                instruction.size = 5;
                let target = Self::read_rel32(view, address, 1, address.wrapping_add(5))?;
                instruction.mnemonic = "call".into();
                instruction.kind = InstructionType::Call;
                instruction
                    .operands
                    .push(Operand::target(target, OPERAND_SIZE));
            }

            // Group 5: jmp/call through a direct memory cell. Nothing is
            // committed until the whole encoding checks out.
            0xFF => {
                let modrm = view
                    .read_u8(1)
                    .map_err(|_| DecodeError::truncated(address, 2, view.len()))?;

                let (mnemonic, kind) = match modrm {
                    // call [disp32]
                    0x15 => ("call", InstructionType::Call),
                    // jmp [disp32]
                    0x25 => ("jmp", InstructionType::Jump),
                    _ => {
                        return Err(DecodeError::invalid_encoding(
                            address,
                            format!("unsupported group-5 modrm {:#04x}", modrm),
                        ))
                    }
                };

                let cell = Self::read_imm32(view, address, 2)?;
                instruction.size = 6;
                instruction.mnemonic = mnemonic.into();
                instruction.kind = kind;
                instruction.operands.push(Operand::mem(cell, OPERAND_SIZE));
            }

            // mov eax, [moffs32]
            0xA1 => {
                instruction.size = 5;
                let cell = Self::read_imm32(view, address, 1)?;
                instruction.mnemonic = "mov".into();
                instruction.kind = InstructionType::Load;
                instruction
                    .operands
                    .push(Operand::reg(Register::general(0, 32), OPERAND_SIZE));
                instruction.operands.push(Operand::mem(cell, OPERAND_SIZE));
            }

            // mov [moffs32], eax
            0xA3 => {
                instruction.size = 5;
                let cell = Self::read_imm32(view, address, 1)?;
                instruction.mnemonic = "mov".into();
                instruction.kind = InstructionType::Store;
                instruction.operands.push(Operand::mem(cell, OPERAND_SIZE));
                instruction
                    .operands
                    .push(Operand::reg(Register::general(0, 32), OPERAND_SIZE));
            }

            // mov r32, imm32
            0xB8..=0xBF => {
                instruction.size = 5;
                let value = Self::read_imm32(view, address, 1)?;
                instruction.mnemonic = "mov".into();
                instruction.kind = InstructionType::Load;
                instruction.operands.push(Operand::reg(
                    Register::general((opcode - 0xB8) as u16, 32),
                    OPERAND_SIZE,
                ));
                instruction
                    .operands
                    .push(Operand::imm(value, OPERAND_SIZE));
            }

            // push r32
            0x50..=0x57 => {
                instruction.size = 1;
                instruction.mnemonic = "push".into();
                instruction.kind = InstructionType::Push;
                instruction.operands.push(Operand::reg(
                    Register::general((opcode - 0x50) as u16, 32),
                    OPERAND_SIZE,
                ));
            }

            // pop r32
            0x58..=0x5F => {
                instruction.size = 1;
                instruction.mnemonic = "pop".into();
                instruction.kind = InstructionType::Pop;
                instruction.operands.push(Operand::reg(
                    Register::general((opcode - 0x58) as u16, 32),
                    OPERAND_SIZE,
                ));
            }

            // cmp eax, imm32
            0x3D => {
                instruction.size = 5;
                let value = Self::read_imm32(view, address, 1)?;
                instruction.mnemonic = "cmp".into();
                instruction.kind = InstructionType::Compare;
                instruction
                    .operands
                    .push(Operand::reg(Register::general(0, 32), OPERAND_SIZE));
                instruction
                    .operands
                    .push(Operand::imm(value, OPERAND_SIZE));
            }

            // Two-byte escape: jcc rel32.
            0x0F => {
                let second = view
                    .read_u8(1)
                    .map_err(|_| DecodeError::truncated(address, 2, view.len()))?;

                if !(0x80..=0x8F).contains(&second) {
                    return Err(DecodeError::unknown_opcode(address, &[opcode, second]));
                }

                instruction.size = 6;
                let target = Self::read_rel32(view, address, 2, address.wrapping_add(6))?;
                instruction.mnemonic =
                    format!("j{}", CONDITION_SUFFIX[(second & 0x0F) as usize]);
                instruction.kind = InstructionType::ConditionalJump;
                instruction
                    .operands
                    .push(Operand::target(target, OPERAND_SIZE));
            }

            _ => return Err(DecodeError::unknown_opcode(address, &[opcode])),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8], address: u64) -> Result<Instruction, DecodeError> {
        let mut instruction = Instruction::new(address);
        X86Assembler::new().decode(&BufferView::new(bytes), &mut instruction)?;
        Ok(instruction)
    }

    #[test]
    fn test_single_byte_ops() {
        let nop = decode(&[0x90], 0x1000).unwrap();
        assert_eq!(nop.mnemonic, "nop");
        assert_eq!(nop.size, 1);
        assert_eq!(nop.kind, InstructionType::Nop);

        let ret = decode(&[0xC3], 0x1000).unwrap();
        assert_eq!(ret.kind, InstructionType::Ret);
        assert!(ret.is_terminator());
    }

    #[test]
    fn test_jmp_rel8() {
        // jmp +3 from 0x1000: next is 0x1002, target 0x1005.
        let jmp = decode(&[0xEB, 0x03], 0x1000).unwrap();
        assert_eq!(jmp.kind, InstructionType::Jump);
        assert_eq!(jmp.target_operand().unwrap().address(), Some(0x1005));

        // Backward jump.
        let back = decode(&[0xEB, 0xFC], 0x1000).unwrap();
        assert_eq!(back.target_operand().unwrap().address(), Some(0x0FFE));
    }

    #[test]
    fn test_call_rel32() {
        // call +0xFFB from 0x1000: next 0x1005, target 0x2000.
        let call = decode(&[0xE8, 0xFB, 0x0F, 0x00, 0x00], 0x1000).unwrap();
        assert_eq!(call.kind, InstructionType::Call);
        assert_eq!(call.size, 5);
        assert_eq!(call.target_operand().unwrap().address(), Some(0x2000));
        assert!(!call.is_terminator());
    }

    #[test]
    fn test_jcc_mnemonics() {
        let je = decode(&[0x74, 0x10], 0x1000).unwrap();
        assert_eq!(je.mnemonic, "je");
        assert_eq!(je.kind, InstructionType::ConditionalJump);

        let jne32 = decode(&[0x0F, 0x85, 0x00, 0x01, 0x00, 0x00], 0x1000).unwrap();
        assert_eq!(jne32.mnemonic, "jne");
        assert_eq!(jne32.size, 6);
        assert_eq!(jne32.target_operand().unwrap().address(), Some(0x1106));
    }

    #[test]
    fn test_branch_through_memory() {
        let jmp = decode(&[0xFF, 0x25, 0x00, 0x30, 0x00, 0x00], 0x1000).unwrap();
        assert_eq!(jmp.kind, InstructionType::Jump);
        assert!(jmp.target_operand().is_none());
        assert_eq!(jmp.operands[0], Operand::mem(0x3000, 4));
    }

    #[test]
    fn test_direct_memory_access() {
        let load = decode(&[0xA1, 0x00, 0x20, 0x00, 0x00], 0x1000).unwrap();
        assert_eq!(load.kind, InstructionType::Load);
        assert_eq!(load.operands[1], Operand::mem(0x2000, 4));

        let store = decode(&[0xA3, 0x00, 0x20, 0x00, 0x00], 0x1000).unwrap();
        assert_eq!(store.kind, InstructionType::Store);
        assert_eq!(store.operands[0], Operand::mem(0x2000, 4));
    }

    #[test]
    fn test_unknown_and_truncated() {
        assert!(matches!(
            decode(&[0x06], 0x1000),
            Err(DecodeError::UnknownOpcode { .. })
        ));
        assert!(matches!(
            decode(&[0xE9, 0x01], 0x1000),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_group5_bad_modrm_commits_nothing() {
        let mut instruction = Instruction::new(0x1000);
        let err = X86Assembler::new()
            .decode(
                &BufferView::new(&[0xFF, 0x00, 0x00, 0x00, 0x00, 0x00]),
                &mut instruction,
            )
            .unwrap_err();

        assert!(matches!(err, DecodeError::InvalidEncoding { .. }));
        assert_eq!(instruction.size, 0);
        assert!(instruction.operands.is_empty());
    }
}
