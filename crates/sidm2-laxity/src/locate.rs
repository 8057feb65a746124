//! Table block resolution.
//!
//! Three tiers, tried in order:
//!
//! 1. the jump table signature plus a code read of the standard waveform
//!    array address,
//! 2. indexed table reads observed while running the player,
//! 3. indexed table reads found by decoding the image at every offset.
//!
//! Tiers 2 and 3 look for the wave array pair (`b` and `b + 50`) and
//! confirm the derived displacement with reads of both voice pointer
//! tables.

use std::collections::BTreeSet;

use sidm2_common::{Address, Diagnostics, Fault, MemoryImage, Stage};
use sidm2_cpu::{Emulator, Mnemonic, decode_instruction};
use sidm2_psid::SidHeader;

use crate::error::{ExtractionError, Result};
use crate::extract::{ExtractConfig, sid_program};
use crate::layout::{LayoutResolution, Np21Layout, WAVE_ROWS, offsets};

const JMP_ABSOLUTE: u8 = 0x4C;

fn is_table_read(mnemonic: Mnemonic) -> bool {
    use Mnemonic::*;
    matches!(mnemonic, Lda | Ldx | Ldy | Adc | And | Cmp | Eor | Ora | Sbc)
}

/// Base operands of indexed absolute reads decodable at any offset of the
/// first `len` bytes, restricted to operands inside the image.
pub(crate) fn scan_table_reads(image: &MemoryImage, len: usize) -> BTreeSet<u16> {
    let bytes = &image.bytes()[..len.min(image.len())];
    (0..bytes.len())
        .filter_map(|offset| decode_instruction(bytes, offset))
        .filter(|insn| insn.opcode.mode.is_indexed_absolute() && is_table_read(insn.opcode.mnemonic))
        .map(|insn| insn.operand)
        .filter(|operand| image.contains(Address(*operand)))
        .collect()
}

fn observe_table_reads(
    header: &SidHeader,
    image: &MemoryImage,
    config: &ExtractConfig,
) -> std::result::Result<BTreeSet<u16>, Fault> {
    let program = sid_program(header, image);
    let mut emulator = Emulator::load(&program, config.emulator.clone());
    let mut reads = BTreeSet::new();
    for _ in 0..config.observe_frames.max(1) {
        emulator.run_frame_observed(&mut |_| {}, &mut |executed| {
            if executed.opcode.mode.is_indexed_absolute()
                && is_table_read(executed.opcode.mnemonic)
                && image.contains(Address(executed.operand))
            {
                reads.insert(executed.operand);
            }
        })?;
    }
    Ok(reads)
}

fn has_jump_signature(image: &MemoryImage, layout: &Np21Layout) -> bool {
    [offsets::INIT_JUMP, offsets::PLAY_JUMP].iter().all(|&offset| {
        let at = layout.code(offset);
        image.read_u8(at) == Some(JMP_ABSOLUTE)
            && image
                .read_u16_le(at.wrapping_add(1))
                .is_some_and(|target| image.contains(Address(target)))
    })
}

fn static_layout(image: &MemoryImage) -> Option<Np21Layout> {
    let layout = Np21Layout::standard(image.load());
    if !has_jump_signature(image, &layout) || !layout.fits(image) {
        return None;
    }
    let code = scan_table_reads(image, offsets::WAVE_NOTE_OFFSETS as usize);
    code.contains(&layout.table(offsets::WAVE_WAVEFORMS).get())
        .then_some(layout)
}

/// Find the lowest wave array pair confirmed by voice pointer reads.
pub(crate) fn layout_from_reads(image: &MemoryImage, reads: &BTreeSet<u16>) -> Option<Np21Layout> {
    let standard = i32::from(image.load().get()) + i32::from(offsets::WAVE_NOTE_OFFSETS);
    reads
        .iter()
        .filter(|&&base| {
            base.checked_add(WAVE_ROWS as u16)
                .is_some_and(|second| reads.contains(&second))
        })
        .find_map(|&base| {
            let layout = Np21Layout::shifted(image.load(), i32::from(base) - standard);
            let voices_read = [offsets::VOICE_POINTERS_LO, offsets::VOICE_POINTERS_HI]
                .iter()
                .all(|&offset| reads.contains(&layout.table(offset).get()));
            (voices_read && layout.fits(image)).then_some(layout)
        })
}

/// Resolve the table block, recording which tier succeeded.
pub(crate) fn locate(
    header: &SidHeader,
    image: &MemoryImage,
    config: &ExtractConfig,
    diagnostics: &mut Diagnostics,
) -> Result<(Np21Layout, LayoutResolution)> {
    if let Some(layout) = static_layout(image) {
        return Ok((layout, LayoutResolution::Static));
    }

    match observe_table_reads(header, image, config) {
        Ok(reads) => {
            if let Some(layout) = layout_from_reads(image, &reads) {
                return Ok((layout, LayoutResolution::Observed {
                    shift: layout.shift,
                }));
            }
            tracing::debug!(reads = reads.len(), "no table pair among observed reads");
        }
        Err(fault) => diagnostics.info(
            Stage::Extraction,
            Some(fault.address()),
            format!("layout observation aborted: {fault}"),
        ),
    }

    let reads = scan_table_reads(image, image.len());
    if let Some(layout) = layout_from_reads(image, &reads) {
        return Ok((layout, LayoutResolution::Scanned {
            shift: layout.shift,
        }));
    }

    Err(ExtractionError::LayoutNotFound { load: image.load() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Np21Fixture;

    fn resolve(fixture: Np21Fixture) -> (LayoutResolution, Diagnostics) {
        let (header, image) = fixture.build();
        let mut diagnostics = Diagnostics::new();
        let (_, resolution) =
            locate(&header, &image, &ExtractConfig::default(), &mut diagnostics).unwrap();
        (resolution, diagnostics)
    }

    #[test]
    fn reference_player_resolves_statically() {
        assert_eq!(resolve(Np21Fixture::reference()).0, LayoutResolution::Static);
    }

    #[test]
    fn shifted_tables_are_observed() {
        let (resolution, _) = resolve(Np21Fixture::reference().with_shifted_tables());
        assert_eq!(resolution, LayoutResolution::Observed { shift: 0x40 });
    }

    #[test]
    fn broken_signature_is_observed() {
        let (resolution, _) = resolve(Np21Fixture::reference().with_broken_signature());
        assert_eq!(resolution, LayoutResolution::Observed { shift: 0 });
    }

    #[test]
    fn faulting_player_falls_back_to_scan() {
        let (header, mut image) = Np21Fixture::reference()
            .with_broken_signature()
            .with_shifted_tables()
            .build();
        // JAM at the init entry
        let init = header.init.offset_from(image.load()).unwrap();
        image.bytes_mut()[init] = 0x02;

        let mut diagnostics = Diagnostics::new();
        let (layout, resolution) =
            locate(&header, &image, &ExtractConfig::default(), &mut diagnostics).unwrap();
        assert_eq!(resolution, LayoutResolution::Scanned { shift: 0x40 });
        assert_eq!(layout.shift, 0x40);
        assert!(diagnostics.mentions("observation aborted"));
    }

    #[test]
    fn unrelated_code_is_not_a_layout() {
        let image = MemoryImage::new(Address(0x1000), vec![0x60; 0x1000]);
        let header = SidHeader::new(Address(0x1000), Address(0x1000), Address(0x1000));
        let err = locate(&header, &image, &ExtractConfig::default(), &mut Diagnostics::new())
            .unwrap_err();
        assert_eq!(
            err,
            ExtractionError::LayoutNotFound {
                load: Address(0x1000)
            }
        );
    }
}
