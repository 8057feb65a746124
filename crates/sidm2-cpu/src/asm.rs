//! Label-based 6502 assembler.
//!
//! Builds position-dependent machine code for a given base address and
//! records, for every operand or data byte that refers back into the
//! assembled block, a [`Relocation`]. Moving the block to another base is
//! then a single pass over those records.

use std::collections::BTreeMap;

use sidm2_common::Address;
use thiserror::Error;

use crate::opcodes::{AddressingMode, Mnemonic, encode};

/// How a relocated site encodes its address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelocationKind {
    /// 16-bit little-endian operand of an instruction with this mode.
    Operand(AddressingMode),
    /// 16-bit little-endian data word (pointer table entry, vector).
    DataWord,
    /// Low byte of `target` (immediate operand or split pointer table).
    LowByte {
        /// Full address whose low byte is stored.
        target: Address,
    },
    /// High byte of `target`.
    HighByte {
        /// Full address whose high byte is stored.
        target: Address,
    },
}

/// A site in an image holding (part of) an address that points into the
/// image itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Relocation {
    /// Offset of the first byte of the encoded address.
    pub site: usize,
    /// Encoding.
    pub kind: RelocationKind,
}

/// Operand target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Label plus byte offset; relocated.
    Label(&'static str, u16),
    /// Fixed address outside the block (I/O, zero page pointers); never
    /// relocated.
    Fixed(u16),
}

/// Label target without offset.
pub const fn label(name: &'static str) -> Target {
    Target::Label(name, 0)
}

/// Fixed absolute target.
pub const fn fixed(addr: u16) -> Target {
    Target::Fixed(addr)
}

/// Errors reported by [`Assembler::finish`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AsmError {
    /// A label was referenced but never defined.
    #[error("undefined label `{0}`")]
    UndefinedLabel(&'static str),

    /// A label was defined twice.
    #[error("label `{0}` defined twice")]
    DuplicateLabel(&'static str),

    /// The mnemonic has no encoding in that mode.
    #[error("{mnemonic} has no {mode:?} encoding")]
    InvalidMode {
        /// Mnemonic.
        mnemonic: Mnemonic,
        /// Requested mode.
        mode: AddressingMode,
    },

    /// Branch target further than -128..127 bytes away.
    #[error("branch to `{label}` out of range ({distance} bytes)")]
    BranchOutOfRange {
        /// Target label.
        label: &'static str,
        /// Distance from the next instruction.
        distance: i32,
    },

    /// Code already extends past a requested padding offset.
    #[error("cannot pad to offset {target:#06x}: already at {current:#06x}")]
    Overlap {
        /// Requested offset.
        target: usize,
        /// Current emission offset.
        current: usize,
    },

    /// Assembled code runs past `$FFFF`.
    #[error("code exceeds the address space")]
    AddressOverflow,
}

#[derive(Debug, Clone, Copy)]
enum FixupKind {
    Word(Option<AddressingMode>),
    Low,
    High,
    Branch,
}

#[derive(Debug, Clone, Copy)]
struct Fixup {
    site: usize,
    label: &'static str,
    offset: u16,
    kind: FixupKind,
}

/// Assembler output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembled {
    /// Base address the code was assembled for.
    pub base: Address,
    /// Machine code and inline data.
    pub bytes: Vec<u8>,
    /// Label offsets relative to `base`.
    pub labels: BTreeMap<&'static str, usize>,
    /// Every site that refers back into the block.
    pub relocations: Vec<Relocation>,
}

impl Assembled {
    /// Absolute address of a label.
    pub fn address_of(&self, label: &str) -> Option<Address> {
        self.labels
            .get(label)
            .map(|off| self.base.wrapping_add(*off as u16))
    }
}

/// Incremental assembler.
///
/// Emission methods never fail; problems are collected and reported by
/// [`Assembler::finish`].
#[derive(Debug, Clone)]
pub struct Assembler {
    base: Address,
    bytes: Vec<u8>,
    labels: BTreeMap<&'static str, usize>,
    fixups: Vec<Fixup>,
    errors: Vec<AsmError>,
}

impl Assembler {
    /// Start assembling at `base`.
    pub fn new(base: Address) -> Self {
        Self {
            base,
            bytes: Vec::new(),
            labels: BTreeMap::new(),
            fixups: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Current emission offset.
    pub fn here(&self) -> usize {
        self.bytes.len()
    }

    /// Bind `name` to the current offset.
    pub fn label(&mut self, name: &'static str) -> &mut Self {
        let here = self.here();
        self.define(name, here)
    }

    /// Bind `name` to an arbitrary offset (data blocks laid out later).
    pub fn define(&mut self, name: &'static str, offset: usize) -> &mut Self {
        if self.labels.insert(name, offset).is_some() {
            self.errors.push(AsmError::DuplicateLabel(name));
        }
        self
    }

    fn opcode(&mut self, mnemonic: Mnemonic, mode: AddressingMode) {
        match encode(mnemonic, mode) {
            Some(byte) => self.bytes.push(byte),
            None => {
                self.errors.push(AsmError::InvalidMode { mnemonic, mode });
                self.bytes.push(0xEA);
            }
        }
    }

    fn target_word(&mut self, target: Target, kind: FixupKind) {
        match target {
            Target::Fixed(addr) => self.bytes.extend_from_slice(&addr.to_le_bytes()),
            Target::Label(label, offset) => {
                self.fixups.push(Fixup {
                    site: self.here(),
                    label,
                    offset,
                    kind,
                });
                self.bytes.extend_from_slice(&[0, 0]);
            }
        }
    }

    /// Implied-mode instruction.
    pub fn implied(&mut self, mnemonic: Mnemonic) -> &mut Self {
        self.opcode(mnemonic, AddressingMode::Implied);
        self
    }

    /// Accumulator-mode shift/rotate.
    pub fn acc(&mut self, mnemonic: Mnemonic) -> &mut Self {
        self.opcode(mnemonic, AddressingMode::Accumulator);
        self
    }

    /// `#value`
    pub fn imm(&mut self, mnemonic: Mnemonic, value: u8) -> &mut Self {
        self.opcode(mnemonic, AddressingMode::Immediate);
        self.bytes.push(value);
        self
    }

    /// `#<label`
    pub fn imm_lo(&mut self, mnemonic: Mnemonic, target: &'static str) -> &mut Self {
        self.opcode(mnemonic, AddressingMode::Immediate);
        self.half(target, FixupKind::Low)
    }

    /// `#>label`
    pub fn imm_hi(&mut self, mnemonic: Mnemonic, target: &'static str) -> &mut Self {
        self.opcode(mnemonic, AddressingMode::Immediate);
        self.half(target, FixupKind::High)
    }

    fn half(&mut self, label: &'static str, kind: FixupKind) -> &mut Self {
        self.fixups.push(Fixup {
            site: self.here(),
            label,
            offset: 0,
            kind,
        });
        self.bytes.push(0);
        self
    }

    /// `$zp`
    pub fn zp(&mut self, mnemonic: Mnemonic, addr: u8) -> &mut Self {
        self.opcode(mnemonic, AddressingMode::ZeroPage);
        self.bytes.push(addr);
        self
    }

    /// `$zp,X`
    pub fn zpx(&mut self, mnemonic: Mnemonic, addr: u8) -> &mut Self {
        self.opcode(mnemonic, AddressingMode::ZeroPageX);
        self.bytes.push(addr);
        self
    }

    /// `($zp),Y`
    pub fn indy(&mut self, mnemonic: Mnemonic, addr: u8) -> &mut Self {
        self.opcode(mnemonic, AddressingMode::IndirectIndexed);
        self.bytes.push(addr);
        self
    }

    fn absolute(&mut self, mnemonic: Mnemonic, mode: AddressingMode, target: Target) -> &mut Self {
        self.opcode(mnemonic, mode);
        self.target_word(target, FixupKind::Word(Some(mode)));
        self
    }

    /// `$nnnn`
    pub fn abs(&mut self, mnemonic: Mnemonic, target: Target) -> &mut Self {
        self.absolute(mnemonic, AddressingMode::Absolute, target)
    }

    /// `$nnnn,X`
    pub fn absx(&mut self, mnemonic: Mnemonic, target: Target) -> &mut Self {
        self.absolute(mnemonic, AddressingMode::AbsoluteX, target)
    }

    /// `$nnnn,Y`
    pub fn absy(&mut self, mnemonic: Mnemonic, target: Target) -> &mut Self {
        self.absolute(mnemonic, AddressingMode::AbsoluteY, target)
    }

    /// `JMP ($nnnn)`
    pub fn jmp_indirect(&mut self, target: Target) -> &mut Self {
        self.absolute(Mnemonic::Jmp, AddressingMode::Indirect, target)
    }

    /// `JMP label`
    pub fn jmp(&mut self, label: &'static str) -> &mut Self {
        self.abs(Mnemonic::Jmp, Target::Label(label, 0))
    }

    /// `JSR label`
    pub fn jsr(&mut self, label: &'static str) -> &mut Self {
        self.abs(Mnemonic::Jsr, Target::Label(label, 0))
    }

    /// Conditional branch to a label.
    pub fn branch(&mut self, mnemonic: Mnemonic, label: &'static str) -> &mut Self {
        self.opcode(mnemonic, AddressingMode::Relative);
        self.fixups.push(Fixup {
            site: self.here(),
            label,
            offset: 0,
            kind: FixupKind::Branch,
        });
        self.bytes.push(0);
        self
    }

    /// Raw bytes.
    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(data);
        self
    }

    /// Little-endian data word.
    pub fn word(&mut self, target: Target) -> &mut Self {
        self.target_word(target, FixupKind::Word(None));
        self
    }

    /// Zero-fill up to `offset`.
    pub fn pad_to(&mut self, offset: usize) -> &mut Self {
        if offset < self.here() {
            self.errors.push(AsmError::Overlap {
                target: offset,
                current: self.here(),
            });
        } else {
            self.bytes.resize(offset, 0);
        }
        self
    }

    /// Resolve fixups and produce the image.
    pub fn finish(mut self) -> Result<Assembled, AsmError> {
        if let Some(err) = self.errors.first() {
            return Err(err.clone());
        }
        if self.base.get() as usize + self.bytes.len() > 0x1_0000 {
            return Err(AsmError::AddressOverflow);
        }

        let mut relocations = Vec::with_capacity(self.fixups.len());
        for fixup in &self.fixups {
            let offset = *self
                .labels
                .get(fixup.label)
                .ok_or(AsmError::UndefinedLabel(fixup.label))?;
            let target = self
                .base
                .wrapping_add(offset as u16)
                .wrapping_add(fixup.offset);
            match fixup.kind {
                FixupKind::Word(mode) => {
                    self.bytes[fixup.site..fixup.site + 2].copy_from_slice(&target.get().to_le_bytes());
                    let kind = match mode {
                        Some(mode) => RelocationKind::Operand(mode),
                        None => RelocationKind::DataWord,
                    };
                    relocations.push(Relocation {
                        site: fixup.site,
                        kind,
                    });
                }
                FixupKind::Low => {
                    self.bytes[fixup.site] = target.lo();
                    relocations.push(Relocation {
                        site: fixup.site,
                        kind: RelocationKind::LowByte { target },
                    });
                }
                FixupKind::High => {
                    self.bytes[fixup.site] = target.hi();
                    relocations.push(Relocation {
                        site: fixup.site,
                        kind: RelocationKind::HighByte { target },
                    });
                }
                FixupKind::Branch => {
                    let next = fixup.site as i32 + 1;
                    let distance = offset as i32 - next;
                    if !(-128..=127).contains(&distance) {
                        return Err(AsmError::BranchOutOfRange {
                            label: fixup.label,
                            distance,
                        });
                    }
                    self.bytes[fixup.site] = distance as i8 as u8;
                }
            }
        }
        relocations.sort_by_key(|r| r.site);

        Ok(Assembled {
            base: self.base,
            bytes: self.bytes,
            labels: self.labels,
            relocations,
        })
    }
}
