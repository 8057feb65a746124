//! Reading packed target images back into models.

use sidm2_common::{Address, MemoryImage};
use sidm2_psid::{STRING_FIELD_LEN, SidHeader, decode_string};

use crate::driver::bytes;
use crate::error::{PackError, Result};
use crate::layout::{
    CODE, DriverLayout, HeaderFlags, MAGIC, METADATA, ORDERLIST_CAPACITY, TABLE_POINTER_ORDER,
    TargetDriver, header,
};
use crate::model::{
    FILTER_ROWS, INSTRUMENT_COLUMNS, INSTRUMENT_SLOTS, MAX_SEQUENCES, Metadata, PULSE_ROWS,
    ParameterKind, TargetEvent, TargetInstrument, TargetModel, TargetOrderEntry, TargetSequence,
    WavePair,
};

/// Decoded image prologue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetHeader {
    /// Driver variant.
    pub driver: TargetDriver,
    /// Format version.
    pub version: u8,
    /// Header flags.
    pub flags: HeaderFlags,
    /// Frames per tick.
    pub speed: u8,
    /// Number of sequences (table drivers only).
    pub sequence_count: u8,
    /// Table pointers in [`TABLE_POINTER_ORDER`]; a wrapper stores the
    /// player address first and zeros after it.
    pub table_pointers: [Address; 8],
    /// Display strings.
    pub metadata: Metadata,
}

fn not_target(image: &MemoryImage, offset: usize, reason: impl Into<String>) -> PackError {
    PackError::NotATargetImage {
        address: image.address_of(offset),
        reason: reason.into(),
    }
}

/// Decode the 128 byte prologue.
pub fn read_header(image: &MemoryImage) -> Result<TargetHeader> {
    let b = image.bytes();
    if b.len() < CODE {
        return Err(not_target(image, 0, "shorter than the header"));
    }
    if b[0] != 0x4C || b[header::MAGIC..header::MAGIC + 2] != MAGIC {
        return Err(not_target(image, header::MAGIC, "missing header magic"));
    }
    let driver = TargetDriver::from_id(b[header::DRIVER]).ok_or_else(|| {
        not_target(
            image,
            header::DRIVER,
            format!("unknown driver id {:#04x}", b[header::DRIVER]),
        )
    })?;
    let table_pointers = std::array::from_fn(|i| {
        let at = header::TABLE_POINTERS + i * 2;
        Address::from_le_bytes(b[at], b[at + 1])
    });
    let field = |i: usize| {
        let at = METADATA + i * STRING_FIELD_LEN;
        decode_string(&b[at..at + STRING_FIELD_LEN])
    };
    Ok(TargetHeader {
        driver,
        version: b[header::VERSION],
        flags: HeaderFlags::from_bits_truncate(b[header::FLAGS]),
        speed: b[header::SPEED],
        sequence_count: b[header::SEQUENCE_COUNT],
        table_pointers,
        metadata: Metadata {
            name: field(0),
            author: field(1),
            released: field(2),
        },
    })
}

/// Whether the bytes carry a target image prologue.
pub fn is_target_image(image: &MemoryImage) -> bool {
    read_header(image).is_ok()
}

/// Init and play addresses; play is zero for IRQ-driven wrapped players.
pub fn entry_points(image: &MemoryImage) -> Result<(Address, Address)> {
    let header = read_header(image)?;
    let play = if header.flags.contains(HeaderFlags::IRQ_DRIVEN) {
        Address::ZERO
    } else {
        image.load().wrapping_add(3)
    };
    Ok((image.load(), play))
}

/// Container header for exporting an image: init at the base, play at
/// base + 3 (or IRQ-driven), strings from the metadata block.
pub fn export_header(image: &MemoryImage) -> Result<SidHeader> {
    let header = read_header(image)?;
    let (init, play) = entry_points(image)?;
    let metadata = header.metadata;
    Ok(SidHeader::new(image.load(), init, play).with_strings(
        metadata.name,
        metadata.author,
        metadata.released,
    ))
}

fn decode_orderlist(image: &MemoryImage, at: usize) -> Result<Vec<TargetOrderEntry>> {
    let list = &image.bytes()[at..at + ORDERLIST_CAPACITY];
    let mut entries = Vec::new();
    let mut transpose = 0i8;
    for &byte in list {
        match byte {
            bytes::ORDER_LOOP => return Ok(entries),
            0x80.. => transpose = byte.wrapping_sub(bytes::TRANSPOSE_BIAS) as i8,
            sequence => entries.push(TargetOrderEntry {
                transpose,
                sequence,
            }),
        }
    }
    Err(not_target(image, at, "orderlist without loop marker"))
}

fn decode_sequence(image: &MemoryImage, at: usize) -> Result<TargetSequence> {
    let b = image.bytes();
    let mut events = Vec::new();
    let mut offset = at;
    loop {
        let Some(&byte) = b.get(offset) else {
            return Err(not_target(image, at, "sequence runs past the image"));
        };
        offset += 1;
        let event = match byte {
            0x00..=0x5F => TargetEvent::Note(byte),
            bytes::GATE_ON => TargetEvent::Gate(crate::model::Gate::On),
            bytes::GATE_OFF => TargetEvent::Gate(crate::model::Gate::Off),
            bytes::HOLD => TargetEvent::Hold,
            bytes::END => {
                events.push(TargetEvent::End);
                return Ok(TargetSequence { events });
            }
            _ => {
                let kind = byte
                    .checked_sub(bytes::PARAMETER)
                    .and_then(ParameterKind::from_code)
                    .ok_or_else(|| {
                        not_target(image, offset - 1, format!("unknown sequence byte {byte:#04x}"))
                    })?;
                let value = *b
                    .get(offset)
                    .ok_or_else(|| not_target(image, at, "sequence runs past the image"))?;
                offset += 1;
                TargetEvent::SetParameter(kind, value)
            }
        };
        events.push(event);
    }
}

/// Read a table driver image back into a model. Inverse of
/// [`crate::pack`].
pub fn read_target_model(image: &MemoryImage) -> Result<(TargetDriver, TargetModel)> {
    let header = read_header(image)?;
    if header.flags.contains(HeaderFlags::WRAPPED) {
        return Err(not_target(
            image,
            header::FLAGS,
            "image wraps a foreign player and has no target tables",
        ));
    }
    let layout: DriverLayout = header
        .driver
        .layout()
        .ok_or_else(|| not_target(image, header::DRIVER, "driver has no table layout"))?;
    if image.len() < layout.template_len() {
        return Err(not_target(image, 0, "image shorter than its table layout"));
    }
    if usize::from(header.sequence_count) > MAX_SEQUENCES {
        return Err(not_target(image, header::SEQUENCE_COUNT, "too many sequences"));
    }
    debug_assert_eq!(TABLE_POINTER_ORDER.len(), header.table_pointers.len());

    let b = image.bytes();
    let mut model = TargetModel::empty();
    model.speed = header.speed;
    model.metadata = header.metadata;

    for (slot, instrument) in model.instruments.iter_mut().enumerate() {
        let columns: [u8; INSTRUMENT_COLUMNS] =
            std::array::from_fn(|col| b[layout.instruments + col * INSTRUMENT_SLOTS + slot]);
        *instrument = TargetInstrument::from_columns(columns);
    }
    for (row, pair) in model.wave.iter_mut().enumerate() {
        *pair = WavePair {
            waveform: b[layout.wave + row * 2],
            note_offset: b[layout.wave + row * 2 + 1],
        };
    }
    for (row, values) in model.pulse.iter_mut().enumerate() {
        *values = std::array::from_fn(|col| b[layout.pulse + col * PULSE_ROWS + row]);
    }
    for (row, values) in model.filter.iter_mut().enumerate() {
        *values = std::array::from_fn(|col| b[layout.filter + col * FILTER_ROWS + row]);
    }

    for (voice, list) in model.orderlists.iter_mut().enumerate() {
        *list = decode_orderlist(image, layout.orderlists + voice * ORDERLIST_CAPACITY)?;
    }

    for i in 0..usize::from(header.sequence_count) {
        let pointer = Address::from_le_bytes(
            b[layout.sequence_pointers + i],
            b[layout.sequence_pointers + MAX_SEQUENCES + i],
        );
        let at = image
            .offset_of(pointer)
            .ok_or_else(|| not_target(image, layout.sequence_pointers + i, "sequence pointer outside the image"))?;
        model.sequences.push(decode_sequence(image, at)?);
    }

    Ok((header.driver, model))
}

/// The foreign player behind a wrapper header.
pub fn unwrap_player(image: &MemoryImage) -> Option<MemoryImage> {
    let header = read_header(image).ok()?;
    header.flags.contains(HeaderFlags::WRAPPED).then(|| {
        MemoryImage::new(
            image.load().wrapping_add(CODE as u16),
            image.bytes()[CODE..].to_vec(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::assemble_wrapper;

    #[test]
    fn rejects_images_without_magic() {
        let image = MemoryImage::new(Address(0x1000), vec![0x4C; 0x100]);
        let err = read_header(&image).unwrap_err();
        assert_eq!(err.address(), Some(Address(0x1006)));
        assert!(!is_target_image(&image));
    }

    #[test]
    fn wrapped_images_expose_their_player() {
        let mut bytes = assemble_wrapper(
            Address(0x0F80),
            TargetDriver::Driver11,
            Address(0x1000),
            Some(Address(0x1003)),
            2,
        )
        .unwrap();
        bytes.extend_from_slice(&[0x60, 0x00, 0x00, 0x60]);
        let image = MemoryImage::new(Address(0x0F80), bytes);

        let header = read_header(&image).unwrap();
        assert_eq!(header.speed, 2);
        assert_eq!(header.table_pointers[0], Address(0x1000));
        assert_eq!(entry_points(&image).unwrap(), (Address(0x0F80), Address(0x0F83)));

        let player = unwrap_player(&image).unwrap();
        assert_eq!(player.load(), Address(0x1000));
        assert_eq!(player.bytes(), [0x60, 0x00, 0x00, 0x60]);
        assert!(read_target_model(&image).is_err());
    }

    #[test]
    fn unknown_sequence_bytes_are_reported() {
        let image = MemoryImage::new(Address(0x2000), vec![0x30, 0x90, 0xFF]);
        let err = decode_sequence(&image, 0).unwrap_err();
        assert_eq!(err.address(), Some(Address(0x2001)));
    }

    #[test]
    fn orderlist_markers_set_the_transpose() {
        let mut bytes = vec![0u8; ORDERLIST_CAPACITY];
        bytes[..5].copy_from_slice(&[0xA2, 3, 0x9F, 4, 0xFF]);
        let image = MemoryImage::new(Address(0x2000), bytes);
        assert_eq!(decode_orderlist(&image, 0).unwrap(), [
            TargetOrderEntry { transpose: 2, sequence: 3 },
            TargetOrderEntry { transpose: -1, sequence: 4 },
        ]);
    }
}
