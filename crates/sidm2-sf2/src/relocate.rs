//! Moving machine code to another load address.
//!
//! Every image-internal reference is described by a [`Relocation`]
//! record. Assembled templates carry their records from the assembler;
//! foreign player code is scanned once by [`scan_code`] and its split
//! pointer tables are added by [`split_pointer_table`]. Applying the
//! records is a single pass that never looks at the bytes around a site.

use std::collections::BTreeMap;

use sidm2_common::{Address, MemoryImage};
use sidm2_cpu::{AddressingMode, Instruction, Mnemonic, Relocation, RelocationKind, decode_instruction};

/// Source and destination of a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    /// Address the block was built for.
    pub from: Address,
    /// Block length; only references into `from..from + len` move.
    pub len: usize,
    /// New base address.
    pub to: Address,
}

impl Move {
    /// New address of `addr`, or `None` when it lies outside the block.
    pub fn translate(&self, addr: u16) -> Option<u16> {
        let offset = Address(addr).offset_from(self.from)?;
        (offset < self.len).then(|| self.to.wrapping_add(offset as u16).get())
    }
}

/// Rewrite every recorded site for a move. Returns the number of sites
/// changed.
pub fn apply(bytes: &mut [u8], relocations: &[Relocation], motion: Move) -> usize {
    let mut changed = 0;
    for relocation in relocations {
        let site = relocation.site;
        match relocation.kind {
            RelocationKind::Operand(_) | RelocationKind::DataWord => {
                let Some(word) = bytes.get(site..site + 2) else {
                    tracing::warn!(site, "relocation site past the end of the block");
                    continue;
                };
                let old = u16::from_le_bytes([word[0], word[1]]);
                if let Some(new) = motion.translate(old) {
                    bytes[site..site + 2].copy_from_slice(&new.to_le_bytes());
                    changed += 1;
                }
            }
            RelocationKind::LowByte { target } | RelocationKind::HighByte { target } => {
                let Some(new) = motion.translate(target.get()) else {
                    continue;
                };
                let Some(byte) = bytes.get_mut(site) else {
                    tracing::warn!(site, "relocation site past the end of the block");
                    continue;
                };
                *byte = match relocation.kind {
                    RelocationKind::LowByte { .. } => Address(new).lo(),
                    _ => Address(new).hi(),
                };
                changed += 1;
            }
        }
    }
    changed
}

fn is_immediate_load(insn: &Instruction) -> bool {
    insn.opcode.mode == AddressingMode::Immediate
        && matches!(insn.opcode.mnemonic, Mnemonic::Lda | Mnemonic::Ldx | Mnemonic::Ldy)
}

fn is_direct_store(insn: &Instruction) -> bool {
    matches!(insn.opcode.mode, AddressingMode::ZeroPage | AddressingMode::Absolute)
        && matches!(insn.opcode.mnemonic, Mnemonic::Sta | Mnemonic::Stx | Mnemonic::Sty)
}

/// `LDA #<addr; STA ptr; LDA #>addr; STA ptr+1` with `addr` inside the
/// image. `ptr` is a zero page pointer or a vector such as `$0314`.
fn pointer_pair(window: &[Instruction], image: &MemoryImage) -> Option<[Relocation; 2]> {
    let [lo, lo_store, hi, hi_store] = window else {
        return None;
    };
    let shape = is_immediate_load(lo)
        && is_direct_store(lo_store)
        && is_immediate_load(hi)
        && is_direct_store(hi_store)
        && hi_store.operand == lo_store.operand.wrapping_add(1);
    if !shape {
        return None;
    }
    let target = Address::from_le_bytes(lo.operand as u8, hi.operand as u8);
    image.contains(target).then_some([
        Relocation {
            site: lo.operand_offset(),
            kind: RelocationKind::LowByte { target },
        },
        Relocation {
            site: hi.operand_offset(),
            kind: RelocationKind::HighByte { target },
        },
    ])
}

/// Follow control flow from `entries` and record every absolute operand
/// and immediate pointer pair that refers into the image.
///
/// Decoding stops at `RTS`, `RTI`, `BRK`, unconditional jumps and
/// undocumented opcodes; `JSR`, `JMP` and branch targets inside the image
/// are queued. Bytes never reached are treated as data and left alone.
pub fn scan_code(image: &MemoryImage, entries: &[Address]) -> Vec<Relocation> {
    let bytes = image.bytes();
    let mut visited = vec![false; bytes.len()];
    let mut found: BTreeMap<usize, Relocation> = BTreeMap::new();
    let mut queue: Vec<usize> = entries.iter().filter_map(|a| image.offset_of(*a)).collect();

    while let Some(start) = queue.pop() {
        let mut offset = start;
        let mut window: Vec<Instruction> = Vec::with_capacity(4);
        while offset < bytes.len() && !visited[offset] {
            let Some(insn) = decode_instruction(bytes, offset) else {
                break;
            };
            visited[offset] = true;
            let mode = insn.opcode.mode;

            if mode.has_absolute_operand() && image.contains(Address(insn.operand)) {
                let site = insn.operand_offset();
                found.insert(site, Relocation {
                    site,
                    kind: RelocationKind::Operand(mode),
                });
            }

            if window.len() == 4 {
                window.remove(0);
            }
            window.push(insn);
            if let Some(pair) = pointer_pair(&window, image) {
                for relocation in pair {
                    found.insert(relocation.site, relocation);
                }
            }

            let target = image.offset_of(Address(insn.operand));
            match (insn.opcode.mnemonic, mode) {
                (Mnemonic::Jmp, AddressingMode::Absolute) => {
                    queue.extend(target);
                    break;
                }
                (Mnemonic::Jmp, _) | (Mnemonic::Rts | Mnemonic::Rti | Mnemonic::Brk, _) => break,
                (Mnemonic::Jsr, _) => queue.extend(target),
                (_, AddressingMode::Relative) => {
                    let next = offset + insn.len();
                    let displaced = next as i64 + i64::from(insn.operand as u8 as i8);
                    if (0..bytes.len() as i64).contains(&displaced) {
                        queue.push(displaced as usize);
                    }
                }
                _ => {}
            }
            offset += insn.len();
        }
    }

    tracing::debug!(
        sites = found.len(),
        reached = visited.iter().filter(|v| **v).count(),
        "scanned player code"
    );
    found.into_values().collect()
}

/// Records for a pointer table stored as `count` low bytes at `lo` and
/// `count` high bytes at `hi`. Entries pointing outside the image are
/// skipped.
pub fn split_pointer_table(image: &MemoryImage, lo: Address, hi: Address, count: usize) -> Vec<Relocation> {
    let (Some(lo_at), Some(hi_at)) = (image.offset_of(lo), image.offset_of(hi)) else {
        return Vec::new();
    };
    let bytes = image.bytes();
    (0..count)
        .filter_map(|i| {
            let (l, h) = (*bytes.get(lo_at + i)?, *bytes.get(hi_at + i)?);
            let target = Address::from_le_bytes(l, h);
            image.contains(target).then_some([
                Relocation {
                    site: lo_at + i,
                    kind: RelocationKind::LowByte { target },
                },
                Relocation {
                    site: hi_at + i,
                    kind: RelocationKind::HighByte { target },
                },
            ])
        })
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidm2_cpu::Assembler;
    use sidm2_cpu::Mnemonic::*;
    use sidm2_cpu::asm::{fixed, label};

    fn sample() -> MemoryImage {
        let mut a = Assembler::new(Address(0x2000));
        a.jmp("init")
            .label("init")
            .imm_lo(Lda, "data")
            .zp(Sta, 0xFB)
            .imm_hi(Lda, "data")
            .zp(Sta, 0xFC)
            .imm(Ldx, 0)
            .label("loop")
            .absx(Lda, label("data"))
            .abs(Sta, fixed(0xD418))
            .implied(Inx)
            .imm(Cpx, 3)
            .branch(Bne, "loop")
            .jsr("tail")
            .implied(Rts)
            .label("tail")
            .abs(Inc, label("data"))
            .implied(Rts)
            // looks like code, never reached
            .bytes(&[0xAD, 0x00, 0x20])
            .label("data")
            .bytes(&[1, 2, 3]);
        let asm = a.finish().unwrap();
        MemoryImage::new(asm.base, asm.bytes)
    }

    #[test]
    fn scan_matches_the_assembler() {
        let mut a = Assembler::new(Address(0x2000));
        a.jmp("end").label("end").abs(Lda, label("end")).implied(Rts);
        let asm = a.finish().unwrap();
        let image = MemoryImage::new(asm.base, asm.bytes.clone());
        let mut scanned = scan_code(&image, &[Address(0x2000)]);
        let mut recorded = asm.relocations.clone();
        scanned.sort_by_key(|r| r.site);
        recorded.sort_by_key(|r| r.site);
        assert_eq!(scanned, recorded);
    }

    #[test]
    fn scan_finds_operands_and_pointer_pairs_but_not_data() {
        let image = sample();
        let relocations = scan_code(&image, &[Address(0x2000)]);
        let kinds: Vec<_> = relocations.iter().map(|r| r.kind).collect();
        assert!(kinds.contains(&RelocationKind::Operand(AddressingMode::AbsoluteX)));
        assert!(kinds.iter().any(|k| matches!(k, RelocationKind::LowByte { .. })));
        assert!(kinds.iter().any(|k| matches!(k, RelocationKind::HighByte { .. })));
        // JMP init, LDA data,X, JSR tail, INC data, two pointer halves;
        // STA $D418 stays, unreached LDA stays
        assert_eq!(relocations.len(), 6);
        let unreached_operand = image.len() - 5;
        assert!(relocations.iter().all(|r| r.site != unreached_operand));
    }

    #[test]
    fn moved_code_points_at_its_new_home() {
        let image = sample();
        let relocations = scan_code(&image, &[Address(0x2000)]);
        let mut bytes = image.bytes().to_vec();
        let motion = Move {
            from: Address(0x2000),
            len: bytes.len(),
            to: Address(0x3480),
        };
        assert_eq!(apply(&mut bytes, &relocations, motion), 6);
        assert_eq!(&bytes[0..3], &[0x4C, 0x83, 0x34]);
        // D418 untouched
        assert!(bytes.windows(3).any(|w| w == [0x8D, 0x18, 0xD4]));
    }

    #[test]
    fn foreign_references_are_not_moved() {
        let mut bytes = vec![0x4C, 0x00, 0x90];
        let relocations = [Relocation {
            site: 1,
            kind: RelocationKind::Operand(AddressingMode::Absolute),
        }];
        let motion = Move {
            from: Address(0x1000),
            len: 3,
            to: Address(0x2000),
        };
        assert_eq!(apply(&mut bytes, &relocations, motion), 0);
        assert_eq!(bytes, [0x4C, 0x00, 0x90]);
    }

    #[test]
    fn split_tables_skip_outside_entries() {
        let mut bytes = vec![0u8; 0x20];
        bytes[0x10..0x13].copy_from_slice(&[0x05, 0x00, 0x1F]);
        bytes[0x13..0x16].copy_from_slice(&[0x10, 0xC0, 0x10]);
        let image = MemoryImage::new(Address(0x1000), bytes);
        let records = split_pointer_table(&image, Address(0x1010), Address(0x1013), 3);
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].kind, RelocationKind::LowByte {
            target: Address(0x1005)
        });
    }
}
