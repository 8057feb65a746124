//! Packing target models into loadable images.
//!
//! Three ways to produce an image:
//!
//! * [`pack`] fills a table driver template and moves it to the requested
//!   load address;
//! * [`pack_laxity_aware`] relocates the original player code and puts the
//!   target model's tables back in the player's own format;
//! * [`wrap_generic`] puts an unmodified foreign player behind a header.
//!
//! All of them produce the same 128 byte prologue, so [`self_check`] and
//! [`crate::read_header`] work on every image.

use sidm2_common::{Address, Diagnostics, MemoryImage, Stage};
use sidm2_cpu::{Emulator, EmulatorConfig, Mnemonic, SidProgram, decode_instruction};
use sidm2_laxity::layout::{SEQUENCE_SLOTS, offsets};
use sidm2_laxity::{SourceModel, native};
use sidm2_psid::{STRING_FIELD_LEN, SidHeader, encode_string};

use crate::driver::{DriverTemplate, assemble_wrapper, bytes};
use crate::error::{PackError, Result};
use crate::layout::{
    Block, CODE, DriverLayout, METADATA, ORDERLIST_CAPACITY, SEQUENCE_CAPACITY, TargetDriver,
    header,
};
use crate::model::{
    FILTER_ROWS, INSTRUMENT_COLUMNS, INSTRUMENT_SLOTS, MAX_SEQUENCES, Metadata, PULSE_ROWS,
    TargetEvent, TargetModel, TargetOrderEntry, TargetSequence, WAVE_ROWS,
};
use crate::read::entry_points;
use crate::relocate::{self, Move};
use crate::transform::{MAX_TRANSPOSE, MIN_TRANSPOSE, source_tables};

fn check_fits(load: Address, len: usize) -> Result<()> {
    if usize::from(load.get()) + len > 0x1_0000 {
        return Err(PackError::AddressOutOfRange { address: load });
    }
    Ok(())
}

fn write_metadata(bytes: &mut [u8], metadata: &Metadata) {
    for (i, text) in [&metadata.name, &metadata.author, &metadata.released]
        .into_iter()
        .enumerate()
    {
        let at = METADATA + i * STRING_FIELD_LEN;
        bytes[at..at + STRING_FIELD_LEN].copy_from_slice(&encode_string(text));
    }
}

/// Encode one voice's orderlist: transpose markers only where the
/// transpose changes, then the loop marker.
pub(crate) fn encode_orderlist(
    voice: usize,
    entries: &[TargetOrderEntry],
    sequences: usize,
) -> Result<Vec<u8>> {
    if entries.is_empty() {
        return Err(PackError::InvalidModel(format!(
            "voice {} orderlist is empty",
            voice + 1
        )));
    }
    let mut out = Vec::with_capacity(entries.len() + 1);
    let mut transpose = 0i8;
    for entry in entries {
        if !(MIN_TRANSPOSE..=MAX_TRANSPOSE).contains(&entry.transpose) {
            return Err(PackError::InvalidModel(format!(
                "voice {} transpose {} outside {MIN_TRANSPOSE}..={MAX_TRANSPOSE}",
                voice + 1,
                entry.transpose
            )));
        }
        if usize::from(entry.sequence) >= sequences {
            return Err(PackError::InvalidModel(format!(
                "voice {} references missing sequence {}",
                voice + 1,
                entry.sequence
            )));
        }
        if entry.transpose != transpose {
            out.push(bytes::TRANSPOSE_BIAS.wrapping_add_signed(entry.transpose));
            transpose = entry.transpose;
        }
        out.push(entry.sequence);
    }
    out.push(bytes::ORDER_LOOP);
    if out.len() > ORDERLIST_CAPACITY {
        return Err(PackError::CapacityExceeded {
            block: "orderlist",
            needed: out.len(),
            capacity: ORDERLIST_CAPACITY,
        });
    }
    Ok(out)
}

/// Encode one sequence. A sequence without a timed event would stall the
/// driver, so it gets a leading hold and a warning.
pub(crate) fn encode_sequence(
    index: usize,
    sequence: &TargetSequence,
    diagnostics: &mut Diagnostics,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(sequence.events.len() * 2 + 2);
    let timed = sequence
        .events
        .iter()
        .take_while(|e| **e != TargetEvent::End)
        .any(|e| e.is_timed());
    if !timed {
        diagnostics.warn(
            Stage::Packing,
            None,
            format!("sequence {index} has no timed event; hold inserted"),
        );
        out.push(bytes::HOLD);
    }
    for event in &sequence.events {
        match *event {
            TargetEvent::Note(note) => {
                if note >= 0x60 {
                    diagnostics.warn(
                        Stage::Packing,
                        None,
                        format!("sequence {index} note {note:#04x} clamped"),
                    );
                }
                out.push(note.min(0x5F));
            }
            TargetEvent::Gate(crate::model::Gate::On) => out.push(bytes::GATE_ON),
            TargetEvent::Gate(crate::model::Gate::Off) => out.push(bytes::GATE_OFF),
            TargetEvent::SetParameter(kind, value) => {
                out.extend_from_slice(&[bytes::PARAMETER | kind.code(), value]);
            }
            TargetEvent::Hold => out.push(bytes::HOLD),
            TargetEvent::End => break,
        }
    }
    out.push(bytes::END);
    out
}

/// Pack a model into a table driver image loaded at `load`.
///
/// Non-fatal adjustments (inserted holds, clamped notes) are recorded in
/// `diagnostics`.
pub fn pack(
    model: &TargetModel,
    template: &DriverTemplate,
    load: Address,
    diagnostics: &mut Diagnostics,
) -> Result<MemoryImage> {
    let layout = template.layout;
    let template_len = layout.template_len();
    if template.image.len() < template_len {
        return Err(PackError::TemplateTooSmall {
            len: template.image.len(),
            needed: template_len,
        });
    }
    if model.sequences.len() > MAX_SEQUENCES {
        return Err(PackError::CapacityExceeded {
            block: Block::SequencePointers.name(),
            needed: model.sequences.len(),
            capacity: MAX_SEQUENCES,
        });
    }

    let mut data = Vec::new();
    let mut starts = Vec::with_capacity(model.sequences.len());
    for (i, sequence) in model.sequences.iter().enumerate() {
        starts.push(data.len());
        data.extend(encode_sequence(i, sequence, diagnostics));
    }
    if data.len() > SEQUENCE_CAPACITY {
        return Err(PackError::CapacityExceeded {
            block: Block::Sequences.name(),
            needed: data.len(),
            capacity: SEQUENCE_CAPACITY,
        });
    }
    check_fits(load, template_len + data.len())?;

    let mut out = template.image.bytes()[..template_len].to_vec();
    let moved = relocate::apply(
        &mut out,
        &template.relocations,
        Move {
            from: template.image.load(),
            len: template.extent(),
            to: load,
        },
    );

    out[header::SPEED] = model.speed.max(1);
    out[header::SEQUENCE_COUNT] = model.sequences.len() as u8;
    write_metadata(&mut out, &model.metadata);

    for (voice, entries) in model.orderlists.iter().enumerate() {
        let encoded = encode_orderlist(voice, entries, model.sequences.len())?;
        let at = layout.orderlists + voice * ORDERLIST_CAPACITY;
        out[at..at + ORDERLIST_CAPACITY].fill(0);
        out[at..at + encoded.len()].copy_from_slice(&encoded);
    }

    let pointers = layout.sequence_pointers;
    out[pointers..pointers + DriverLayout::capacity(Block::SequencePointers)].fill(0);
    for (i, start) in starts.iter().enumerate() {
        let address = load.wrapping_add((layout.sequences + start) as u16);
        out[pointers + i] = address.lo();
        out[pointers + MAX_SEQUENCES + i] = address.hi();
    }

    for (slot, instrument) in model.instruments.iter().enumerate() {
        for (col, value) in instrument.to_columns().into_iter().enumerate() {
            out[layout.instruments + col * INSTRUMENT_SLOTS + slot] = value;
        }
    }
    debug_assert!(INSTRUMENT_COLUMNS * INSTRUMENT_SLOTS <= DriverLayout::capacity(Block::Instruments));

    for (row, pair) in model.wave.iter().enumerate() {
        out[layout.wave + row * 2] = pair.waveform;
        out[layout.wave + row * 2 + 1] = pair.note_offset;
    }
    debug_assert_eq!(WAVE_ROWS * 2, DriverLayout::capacity(Block::Wave));

    for (row, values) in model.pulse.iter().enumerate() {
        for (col, value) in values.iter().enumerate() {
            out[layout.pulse + col * PULSE_ROWS + row] = *value;
        }
    }
    for (row, values) in model.filter.iter().enumerate() {
        for (col, value) in values.iter().enumerate() {
            out[layout.filter + col * FILTER_ROWS + row] = *value;
        }
    }

    out.extend_from_slice(&data);
    tracing::debug!(
        driver = %template.driver,
        load = %load,
        len = out.len(),
        relocated = moved,
        sequences = model.sequences.len(),
        "packed table driver image"
    );
    Ok(MemoryImage::new(load, out))
}

/// Relocate the original player to `load + $80`, write the model's
/// tables into it in the player's own format and prepend a header.
///
/// Sequences and orderlists stay as the player stored them; only the
/// table block reflects `model`.
pub fn pack_laxity_aware(
    model: &TargetModel,
    source: &SourceModel,
    sid: &SidHeader,
    image: &MemoryImage,
    load: Address,
) -> Result<MemoryImage> {
    let player_base = load.wrapping_add(CODE as u16);
    check_fits(load, CODE + image.len())?;

    let layout = source.layout;
    let mut entries = vec![sid.init];
    if !sid.is_irq_driven() {
        entries.push(sid.play);
    }
    for offset in [offsets::INIT_JUMP, offsets::PLAY_JUMP] {
        let at = layout.code(offset);
        let is_jump = image
            .offset_of(at)
            .and_then(|o| decode_instruction(image.bytes(), o))
            .is_some_and(|insn| insn.opcode.mnemonic == Mnemonic::Jmp);
        if is_jump {
            entries.push(at);
        }
    }

    let mut relocations = relocate::scan_code(image, &entries);
    relocations.extend(relocate::split_pointer_table(
        image,
        layout.table(offsets::VOICE_POINTERS_LO),
        layout.table(offsets::VOICE_POINTERS_HI),
        3,
    ));
    relocations.extend(relocate::split_pointer_table(
        image,
        layout.table(offsets::SEQUENCE_POINTERS_LO),
        layout.table(offsets::SEQUENCE_POINTERS_HI),
        SEQUENCE_SLOTS,
    ));

    let motion = Move {
        from: image.load(),
        len: image.len(),
        to: player_base,
    };
    let mut player = image.bytes().to_vec();
    let moved = relocate::apply(&mut player, &relocations, motion);
    let mut player = MemoryImage::new(player_base, player);

    let tables = source_tables(model, source);
    let rebased = layout.rebased(player_base);
    native::write_speed(&mut player, &rebased, tables.speed.max(1))?;
    native::write_instruments(&mut player, &rebased, &tables.instruments)?;
    native::write_wave_table(&mut player, &rebased, &tables.wave)?;
    native::write_pulse_table(&mut player, &rebased, &tables.pulse)?;
    native::write_filter_table(&mut player, &rebased, &tables.filter)?;

    let init = motion
        .translate(sid.init.get())
        .map(Address)
        .ok_or(PackError::AddressOutOfRange { address: sid.init })?;
    let play = if sid.is_irq_driven() {
        None
    } else {
        Some(
            motion
                .translate(sid.play.get())
                .map(Address)
                .ok_or(PackError::AddressOutOfRange { address: sid.play })?,
        )
    };

    let mut out = assemble_wrapper(load, TargetDriver::LaxityAware, init, play, tables.speed.max(1))?;
    write_metadata(&mut out, &model.metadata);
    out.extend_from_slice(player.bytes());
    tracing::debug!(
        load = %load,
        sites = relocations.len(),
        relocated = moved,
        "packed laxity-aware image"
    );
    Ok(MemoryImage::new(load, out))
}

/// Put an unmodified player behind a header, immediately below its load
/// address.
pub fn wrap_generic(sid: &SidHeader, image: &MemoryImage, metadata: &Metadata) -> Result<MemoryImage> {
    let base = image
        .load()
        .get()
        .checked_sub(CODE as u16)
        .map(Address)
        .ok_or(PackError::AddressOutOfRange {
            address: image.load(),
        })?;
    let play = (!sid.is_irq_driven()).then_some(sid.play);
    let mut out = assemble_wrapper(base, TargetDriver::Driver11, sid.init, play, 1)?;
    write_metadata(&mut out, metadata);
    out.extend_from_slice(image.bytes());
    tracing::debug!(base = %base, irq = play.is_none(), "wrapped foreign player");
    Ok(MemoryImage::new(base, out))
}

/// Run a packed image for `frames` frames and fail on any fault.
pub fn self_check(image: &MemoryImage, frames: u32, config: &EmulatorConfig) -> Result<()> {
    let (init, play) = entry_points(image)?;
    let program = SidProgram {
        image: image.clone(),
        init,
        play,
        subtune: 0,
    };
    let trace = Emulator::trace(&program, frames, config);
    match trace.fault() {
        Some(fault) => Err(PackError::SelfCheck {
            fault: fault.clone(),
            load: image.load(),
        }),
        None => {
            tracing::debug!(load = %image.load(), frames, "self-check passed");
            Ok(())
        }
    }
}

/// Image as a PRG file: little-endian load address, then the bytes.
pub fn to_prg(image: &MemoryImage) -> Vec<u8> {
    let mut out = Vec::with_capacity(image.len() + 2);
    out.push(image.load().lo());
    out.push(image.load().hi());
    out.extend_from_slice(image.bytes());
    out
}

/// Read a PRG file.
pub fn from_prg(data: &[u8]) -> Result<MemoryImage> {
    match data {
        [lo, hi, rest @ ..] if !rest.is_empty() => {
            let load = Address::from_le_bytes(*lo, *hi);
            check_fits(load, rest.len())?;
            Ok(MemoryImage::new(load, rest.to_vec()))
        }
        _ => Err(PackError::NotATargetImage {
            address: Address::ZERO,
            reason: format!("{} bytes is too short for a PRG file", data.len()),
        }),
    }
}
