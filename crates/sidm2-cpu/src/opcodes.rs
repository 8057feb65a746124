//! Table-driven opcode metadata for the NMOS 6502.
//!
//! One table is shared by the interpreter, the static instruction decoder
//! used for relocation scanning, and the assembler.

use std::fmt;

/// Instruction mnemonics of the documented instruction set.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    Adc, And, Asl, Bcc, Bcs, Beq, Bit, Bmi, Bne, Bpl, Brk, Bvc, Bvs, Clc,
    Cld, Cli, Clv, Cmp, Cpx, Cpy, Dec, Dex, Dey, Eor, Inc, Inx, Iny, Jmp,
    Jsr, Lda, Ldx, Ldy, Lsr, Nop, Ora, Pha, Php, Pla, Plp, Rol, Ror, Rti,
    Rts, Sbc, Sec, Sed, Sei, Sta, Stx, Sty, Tax, Tay, Tsx, Txa, Txs, Tya,
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = format!("{self:?}").to_ascii_uppercase();
        f.write_str(&name)
    }
}

/// Operand addressing modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressingMode {
    /// No operand.
    Implied,
    /// Operates on the accumulator.
    Accumulator,
    /// `#$nn`
    Immediate,
    /// `$nn`
    ZeroPage,
    /// `$nn,X`
    ZeroPageX,
    /// `$nn,Y`
    ZeroPageY,
    /// `$nnnn`
    Absolute,
    /// `$nnnn,X`
    AbsoluteX,
    /// `$nnnn,Y`
    AbsoluteY,
    /// `($nnnn)` (JMP only)
    Indirect,
    /// `($nn,X)`
    IndexedIndirect,
    /// `($nn),Y`
    IndirectIndexed,
    /// Signed 8-bit branch displacement.
    Relative,
}

impl AddressingMode {
    /// Number of operand bytes following the opcode.
    pub const fn operand_len(self) -> usize {
        match self {
            AddressingMode::Implied | AddressingMode::Accumulator => 0,
            AddressingMode::Absolute
            | AddressingMode::AbsoluteX
            | AddressingMode::AbsoluteY
            | AddressingMode::Indirect => 2,
            _ => 1,
        }
    }

    /// Whether the operand is a full 16-bit address (and therefore a
    /// relocation candidate). Immediates and zero-page operands never are.
    pub const fn has_absolute_operand(self) -> bool {
        matches!(
            self,
            AddressingMode::Absolute
                | AddressingMode::AbsoluteX
                | AddressingMode::AbsoluteY
                | AddressingMode::Indirect
        )
    }

    /// Whether the mode indexes a 16-bit base address.
    pub const fn is_indexed_absolute(self) -> bool {
        matches!(self, AddressingMode::AbsoluteX | AddressingMode::AbsoluteY)
    }
}

/// Static metadata for one opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    /// Opcode byte.
    pub byte: u8,
    /// Mnemonic.
    pub mnemonic: Mnemonic,
    /// Addressing mode.
    pub mode: AddressingMode,
    /// Base cycle count.
    pub cycles: u8,
    /// Whether crossing a page while indexing costs one extra cycle.
    pub page_penalty: bool,
}

impl Opcode {
    /// Total instruction length including the opcode byte.
    pub const fn len(&self) -> usize {
        1 + self.mode.operand_len()
    }
}

use AddressingMode::*;
use Mnemonic::*;

type OpDef = (u8, Mnemonic, AddressingMode, u8, bool);

#[rustfmt::skip]
const DEFINITIONS: &[OpDef] = &[
    (0x69, Adc, Immediate, 2, false), (0x65, Adc, ZeroPage, 3, false),
    (0x75, Adc, ZeroPageX, 4, false), (0x6D, Adc, Absolute, 4, false),
    (0x7D, Adc, AbsoluteX, 4, true), (0x79, Adc, AbsoluteY, 4, true),
    (0x61, Adc, IndexedIndirect, 6, false), (0x71, Adc, IndirectIndexed, 5, true),

    (0x29, And, Immediate, 2, false), (0x25, And, ZeroPage, 3, false),
    (0x35, And, ZeroPageX, 4, false), (0x2D, And, Absolute, 4, false),
    (0x3D, And, AbsoluteX, 4, true), (0x39, And, AbsoluteY, 4, true),
    (0x21, And, IndexedIndirect, 6, false), (0x31, And, IndirectIndexed, 5, true),

    (0x0A, Asl, Accumulator, 2, false), (0x06, Asl, ZeroPage, 5, false),
    (0x16, Asl, ZeroPageX, 6, false), (0x0E, Asl, Absolute, 6, false),
    (0x1E, Asl, AbsoluteX, 7, false),

    (0x90, Bcc, Relative, 2, false), (0xB0, Bcs, Relative, 2, false),
    (0xF0, Beq, Relative, 2, false), (0x30, Bmi, Relative, 2, false),
    (0xD0, Bne, Relative, 2, false), (0x10, Bpl, Relative, 2, false),
    (0x50, Bvc, Relative, 2, false), (0x70, Bvs, Relative, 2, false),

    (0x24, Bit, ZeroPage, 3, false), (0x2C, Bit, Absolute, 4, false),

    (0x00, Brk, Implied, 7, false),

    (0x18, Clc, Implied, 2, false), (0xD8, Cld, Implied, 2, false),
    (0x58, Cli, Implied, 2, false), (0xB8, Clv, Implied, 2, false),

    (0xC9, Cmp, Immediate, 2, false), (0xC5, Cmp, ZeroPage, 3, false),
    (0xD5, Cmp, ZeroPageX, 4, false), (0xCD, Cmp, Absolute, 4, false),
    (0xDD, Cmp, AbsoluteX, 4, true), (0xD9, Cmp, AbsoluteY, 4, true),
    (0xC1, Cmp, IndexedIndirect, 6, false), (0xD1, Cmp, IndirectIndexed, 5, true),

    (0xE0, Cpx, Immediate, 2, false), (0xE4, Cpx, ZeroPage, 3, false),
    (0xEC, Cpx, Absolute, 4, false),
    (0xC0, Cpy, Immediate, 2, false), (0xC4, Cpy, ZeroPage, 3, false),
    (0xCC, Cpy, Absolute, 4, false),

    (0xC6, Dec, ZeroPage, 5, false), (0xD6, Dec, ZeroPageX, 6, false),
    (0xCE, Dec, Absolute, 6, false), (0xDE, Dec, AbsoluteX, 7, false),
    (0xCA, Dex, Implied, 2, false), (0x88, Dey, Implied, 2, false),

    (0x49, Eor, Immediate, 2, false), (0x45, Eor, ZeroPage, 3, false),
    (0x55, Eor, ZeroPageX, 4, false), (0x4D, Eor, Absolute, 4, false),
    (0x5D, Eor, AbsoluteX, 4, true), (0x59, Eor, AbsoluteY, 4, true),
    (0x41, Eor, IndexedIndirect, 6, false), (0x51, Eor, IndirectIndexed, 5, true),

    (0xE6, Inc, ZeroPage, 5, false), (0xF6, Inc, ZeroPageX, 6, false),
    (0xEE, Inc, Absolute, 6, false), (0xFE, Inc, AbsoluteX, 7, false),
    (0xE8, Inx, Implied, 2, false), (0xC8, Iny, Implied, 2, false),

    (0x4C, Jmp, Absolute, 3, false), (0x6C, Jmp, Indirect, 5, false),
    (0x20, Jsr, Absolute, 6, false),

    (0xA9, Lda, Immediate, 2, false), (0xA5, Lda, ZeroPage, 3, false),
    (0xB5, Lda, ZeroPageX, 4, false), (0xAD, Lda, Absolute, 4, false),
    (0xBD, Lda, AbsoluteX, 4, true), (0xB9, Lda, AbsoluteY, 4, true),
    (0xA1, Lda, IndexedIndirect, 6, false), (0xB1, Lda, IndirectIndexed, 5, true),

    (0xA2, Ldx, Immediate, 2, false), (0xA6, Ldx, ZeroPage, 3, false),
    (0xB6, Ldx, ZeroPageY, 4, false), (0xAE, Ldx, Absolute, 4, false),
    (0xBE, Ldx, AbsoluteY, 4, true),

    (0xA0, Ldy, Immediate, 2, false), (0xA4, Ldy, ZeroPage, 3, false),
    (0xB4, Ldy, ZeroPageX, 4, false), (0xAC, Ldy, Absolute, 4, false),
    (0xBC, Ldy, AbsoluteX, 4, true),

    (0x4A, Lsr, Accumulator, 2, false), (0x46, Lsr, ZeroPage, 5, false),
    (0x56, Lsr, ZeroPageX, 6, false), (0x4E, Lsr, Absolute, 6, false),
    (0x5E, Lsr, AbsoluteX, 7, false),

    (0xEA, Nop, Implied, 2, false),

    (0x09, Ora, Immediate, 2, false), (0x05, Ora, ZeroPage, 3, false),
    (0x15, Ora, ZeroPageX, 4, false), (0x0D, Ora, Absolute, 4, false),
    (0x1D, Ora, AbsoluteX, 4, true), (0x19, Ora, AbsoluteY, 4, true),
    (0x01, Ora, IndexedIndirect, 6, false), (0x11, Ora, IndirectIndexed, 5, true),

    (0x48, Pha, Implied, 3, false), (0x08, Php, Implied, 3, false),
    (0x68, Pla, Implied, 4, false), (0x28, Plp, Implied, 4, false),

    (0x2A, Rol, Accumulator, 2, false), (0x26, Rol, ZeroPage, 5, false),
    (0x36, Rol, ZeroPageX, 6, false), (0x2E, Rol, Absolute, 6, false),
    (0x3E, Rol, AbsoluteX, 7, false),

    (0x6A, Ror, Accumulator, 2, false), (0x66, Ror, ZeroPage, 5, false),
    (0x76, Ror, ZeroPageX, 6, false), (0x6E, Ror, Absolute, 6, false),
    (0x7E, Ror, AbsoluteX, 7, false),

    (0x40, Rti, Implied, 6, false), (0x60, Rts, Implied, 6, false),

    (0xE9, Sbc, Immediate, 2, false), (0xE5, Sbc, ZeroPage, 3, false),
    (0xF5, Sbc, ZeroPageX, 4, false), (0xED, Sbc, Absolute, 4, false),
    (0xFD, Sbc, AbsoluteX, 4, true), (0xF9, Sbc, AbsoluteY, 4, true),
    (0xE1, Sbc, IndexedIndirect, 6, false), (0xF1, Sbc, IndirectIndexed, 5, true),

    (0x38, Sec, Implied, 2, false), (0xF8, Sed, Implied, 2, false),
    (0x78, Sei, Implied, 2, false),

    (0x85, Sta, ZeroPage, 3, false), (0x95, Sta, ZeroPageX, 4, false),
    (0x8D, Sta, Absolute, 4, false), (0x9D, Sta, AbsoluteX, 5, false),
    (0x99, Sta, AbsoluteY, 5, false), (0x81, Sta, IndexedIndirect, 6, false),
    (0x91, Sta, IndirectIndexed, 6, false),

    (0x86, Stx, ZeroPage, 3, false), (0x96, Stx, ZeroPageY, 4, false),
    (0x8E, Stx, Absolute, 4, false),
    (0x84, Sty, ZeroPage, 3, false), (0x94, Sty, ZeroPageX, 4, false),
    (0x8C, Sty, Absolute, 4, false),

    (0xAA, Tax, Implied, 2, false), (0xA8, Tay, Implied, 2, false),
    (0xBA, Tsx, Implied, 2, false), (0x8A, Txa, Implied, 2, false),
    (0x9A, Txs, Implied, 2, false), (0x98, Tya, Implied, 2, false),
];

const fn build_table() -> [Option<Opcode>; 256] {
    let mut table = [None; 256];
    let mut i = 0;
    while i < DEFINITIONS.len() {
        let (byte, mnemonic, mode, cycles, page_penalty) = DEFINITIONS[i];
        table[byte as usize] = Some(Opcode {
            byte,
            mnemonic,
            mode,
            cycles,
            page_penalty,
        });
        i += 1;
    }
    table
}

static OPCODE_TABLE: [Option<Opcode>; 256] = build_table();

/// Metadata for an opcode byte; `None` for undocumented opcodes.
#[inline]
pub fn opcode(byte: u8) -> Option<Opcode> {
    OPCODE_TABLE[byte as usize]
}

/// Opcode byte for a mnemonic/mode pair, if the combination exists.
pub fn encode(mnemonic: Mnemonic, mode: AddressingMode) -> Option<u8> {
    DEFINITIONS
        .iter()
        .find(|(_, m, md, _, _)| *m == mnemonic && *md == mode)
        .map(|(byte, ..)| *byte)
}

/// A statically decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// Offset of the opcode byte in the decoded buffer.
    pub offset: usize,
    /// Opcode metadata.
    pub opcode: Opcode,
    /// Raw operand (zero-extended for one-byte operands).
    pub operand: u16,
}

impl Instruction {
    /// Instruction length in bytes.
    pub fn len(&self) -> usize {
        self.opcode.len()
    }

    /// Offset of the first operand byte.
    pub fn operand_offset(&self) -> usize {
        self.offset + 1
    }
}

/// Decode the instruction at `offset`, or `None` for undocumented opcodes
/// and instructions truncated by the end of the buffer.
pub fn decode_instruction(bytes: &[u8], offset: usize) -> Option<Instruction> {
    let opcode = opcode(*bytes.get(offset)?)?;
    let operand = match opcode.mode.operand_len() {
        0 => 0,
        1 => *bytes.get(offset + 1)? as u16,
        _ => u16::from_le_bytes([*bytes.get(offset + 1)?, *bytes.get(offset + 2)?]),
    };
    Some(Instruction {
        offset,
        opcode,
        operand,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_instruction_set_is_complete() {
        let count = (0..=255u8).filter(|b| opcode(*b).is_some()).count();
        assert_eq!(count, 151);
    }

    #[test]
    fn encode_is_inverse_of_table() {
        for byte in 0..=255u8 {
            if let Some(op) = opcode(byte) {
                assert_eq!(encode(op.mnemonic, op.mode), Some(byte));
            }
        }
        assert_eq!(encode(Sta, Immediate), None);
    }

    #[test]
    fn decoder_reports_operands_and_lengths() {
        let code = [0xB9, 0x0C, 0x19, 0xA9, 0x05, 0x60];
        let first = decode_instruction(&code, 0).unwrap();
        assert_eq!(first.opcode.mnemonic, Lda);
        assert_eq!(first.opcode.mode, AbsoluteY);
        assert_eq!(first.operand, 0x190C);
        assert_eq!(first.len(), 3);

        let second = decode_instruction(&code, 3).unwrap();
        assert_eq!(second.opcode.mode, Immediate);
        assert_eq!(second.operand, 0x05);

        assert!(decode_instruction(&code[..2], 0).is_none());
        assert!(decode_instruction(&[0x02], 0).is_none());
    }
}
