//! Table and music data decoding for a resolved layout.

use sidm2_common::{Address, Diagnostics, MemoryImage, Stage};

use crate::error::{ExtractionError, Result};
use crate::layout::{
    COMMAND_COUNT, FILTER_ROWS, INSTRUMENT_COUNT, INSTRUMENT_ROW_LEN, LayoutResolution,
    Np21Layout, PULSE_ROWS, SEQUENCE_SLOTS, TABLE_ROW_LEN, WAVE_ROWS, offsets,
};
use crate::model::{
    Command, OrderEntry, OrderList, SourceEvent, SourceInstrument, SourceModel, SourceSequence,
    TableRow, WAVE_JUMP, WaveTable,
};

/// Orderlists longer than this are cut.
pub const MAX_ORDER_ENTRIES: usize = 128;

/// Orderlist terminator (transpose position).
pub const ORDER_END: u8 = 0xFF;

/// Decode everything reachable from the table block.
pub(crate) fn decode_model(
    image: &MemoryImage,
    layout: Np21Layout,
    resolution: LayoutResolution,
    mut diagnostics: Diagnostics,
) -> Result<SourceModel> {
    let tables = Tables { image, layout };

    let mut speed = tables.read("speed", offsets::SPEED, 1)?[0];
    if speed == 0 {
        diagnostics.warn(
            Stage::Extraction,
            Some(layout.table(offsets::SPEED)),
            "speed 0 replaced by 1",
        );
        speed = 1;
    }

    let instruments = decode_instruments(&tables, &mut diagnostics)?;
    let wave = decode_wave(&tables, &mut diagnostics)?;
    let pulse = decode_rows::<PULSE_ROWS>(&tables, "pulse", offsets::PULSE_TABLE)?;
    let pulse = clamp_pulse_links(pulse, layout, &mut diagnostics);
    let filter = decode_rows::<FILTER_ROWS>(&tables, "filter", offsets::FILTER_TABLE)?;

    let raw = tables.read("command", offsets::COMMANDS, COMMAND_COUNT * 2)?;
    let commands: [Command; COMMAND_COUNT] = std::array::from_fn(|i| Command {
        opcode: raw[i * 2],
        params: raw[i * 2 + 1],
    });

    let mut orderlists: [OrderList; 3] = Default::default();
    let mut dangling = [false; 3];
    for (voice, list) in orderlists.iter_mut().enumerate() {
        let pointer = tables.pointer(
            "voice pointer",
            offsets::VOICE_POINTERS_LO,
            offsets::VOICE_POINTERS_HI,
            voice,
        )?;
        if !image.contains(pointer) {
            diagnostics.warn(
                Stage::Extraction,
                Some(pointer),
                format!("voice {} orderlist pointer outside the image; voice left silent", voice + 1),
            );
            dangling[voice] = true;
            continue;
        }
        *list = decode_orderlist(image, pointer, &mut diagnostics);
        if list.entries.is_empty() {
            diagnostics.warn(
                Stage::Extraction,
                Some(pointer),
                format!("voice {} orderlist is empty; voice left silent", voice + 1),
            );
            dangling[voice] = true;
        }
    }

    let referenced = orderlists
        .iter()
        .flat_map(|l| l.entries.iter())
        .map(|e| e.sequence as usize)
        .max();
    let mut sequences = Vec::new();
    if let Some(last) = referenced {
        for slot in 0..=last {
            let used = orderlists
                .iter()
                .any(|l| l.entries.iter().any(|e| e.sequence as usize == slot));
            let pointer = tables.pointer(
                "sequence pointer",
                offsets::SEQUENCE_POINTERS_LO,
                offsets::SEQUENCE_POINTERS_HI,
                slot,
            )?;
            if image.contains(pointer) {
                sequences.push(decode_sequence(image, pointer, &mut diagnostics));
            } else {
                if used {
                    diagnostics.warn(
                        Stage::Extraction,
                        Some(pointer),
                        format!("sequence {slot} pointer outside the image; treated as empty"),
                    );
                }
                sequences.push(SourceSequence::empty());
            }
        }
    }

    if dangling.iter().any(|d| *d) {
        let silent = sequences.len() as u8;
        sequences.push(SourceSequence::empty());
        for (voice, list) in orderlists.iter_mut().enumerate() {
            if dangling[voice] {
                list.address = None;
                list.entries = vec![OrderEntry {
                    transpose: 0,
                    sequence: silent,
                }];
            }
        }
    }

    tracing::debug!(
        %resolution,
        speed,
        sequences = sequences.len(),
        warnings = diagnostics.warnings().count(),
        "decoded NewPlayer v21 tables"
    );

    Ok(SourceModel {
        layout,
        resolution,
        speed,
        instruments,
        wave,
        pulse,
        filter,
        commands,
        orderlists,
        sequences,
        diagnostics,
    })
}

struct Tables<'a> {
    image: &'a MemoryImage,
    layout: Np21Layout,
}

impl<'a> Tables<'a> {
    fn read(&self, table: &'static str, offset: u16, len: usize) -> Result<&'a [u8]> {
        let address = self.layout.table(offset);
        self.image
            .slice(address, len)
            .ok_or(ExtractionError::TableOutOfRange { table, address })
    }

    fn pointer(&self, table: &'static str, lo: u16, hi: u16, index: usize) -> Result<Address> {
        let lo = self.read(table, lo + index as u16, 1)?[0];
        let hi = self.read(table, hi + index as u16, 1)?[0];
        Ok(Address::from_le_bytes(lo, hi))
    }
}

fn clamp_index(
    value: u8,
    rows: usize,
    what: &str,
    address: Address,
    diagnostics: &mut Diagnostics,
) -> u8 {
    let last = (rows - 1) as u8;
    if value > last {
        diagnostics.warn(
            Stage::Extraction,
            Some(address),
            format!("{what} {value} beyond table end, clamped to {last}"),
        );
        last
    } else {
        value
    }
}

fn decode_instruments(
    tables: &Tables<'_>,
    diagnostics: &mut Diagnostics,
) -> Result<[SourceInstrument; INSTRUMENT_COUNT]> {
    let raw = tables.read(
        "instrument",
        offsets::INSTRUMENTS,
        INSTRUMENT_COUNT * INSTRUMENT_ROW_LEN,
    )?;
    let mut instruments = [SourceInstrument::default(); INSTRUMENT_COUNT];
    for (i, (slot, row)) in instruments
        .iter_mut()
        .zip(raw.chunks_exact(INSTRUMENT_ROW_LEN))
        .enumerate()
    {
        let mut bytes = [0u8; INSTRUMENT_ROW_LEN];
        bytes.copy_from_slice(row);
        let mut instrument = SourceInstrument::from_row(&bytes);
        let at = tables
            .layout
            .table(offsets::INSTRUMENTS + (i * INSTRUMENT_ROW_LEN) as u16);
        instrument.wave_index = clamp_index(
            instrument.wave_index,
            WAVE_ROWS,
            &format!("instrument {i} wave index"),
            at,
            diagnostics,
        );
        instrument.pulse_index = clamp_index(
            instrument.pulse_index,
            PULSE_ROWS,
            &format!("instrument {i} pulse index"),
            at,
            diagnostics,
        );
        instrument.filter_index = clamp_index(
            instrument.filter_index,
            FILTER_ROWS,
            &format!("instrument {i} filter index"),
            at,
            diagnostics,
        );
        *slot = instrument;
    }
    Ok(instruments)
}

fn decode_wave(tables: &Tables<'_>, diagnostics: &mut Diagnostics) -> Result<WaveTable> {
    let mut wave = WaveTable::default();
    wave.note_offsets
        .copy_from_slice(tables.read("wave", offsets::WAVE_NOTE_OFFSETS, WAVE_ROWS)?);
    wave.waveforms
        .copy_from_slice(tables.read("wave", offsets::WAVE_WAVEFORMS, WAVE_ROWS)?);
    for row in 0..WAVE_ROWS {
        if wave.waveforms[row] == WAVE_JUMP {
            let at = tables
                .layout
                .table(offsets::WAVE_NOTE_OFFSETS + row as u16);
            wave.note_offsets[row] = clamp_index(
                wave.note_offsets[row],
                WAVE_ROWS,
                &format!("wave row {row} jump target"),
                at,
                diagnostics,
            );
        }
    }
    Ok(wave)
}

fn decode_rows<const N: usize>(
    tables: &Tables<'_>,
    name: &'static str,
    offset: u16,
) -> Result<[TableRow; N]> {
    let raw = tables.read(name, offset, N * TABLE_ROW_LEN)?;
    Ok(std::array::from_fn(|i| {
        [
            raw[i * TABLE_ROW_LEN],
            raw[i * TABLE_ROW_LEN + 1],
            raw[i * TABLE_ROW_LEN + 2],
        ]
    }))
}

fn clamp_pulse_links(
    mut pulse: [TableRow; PULSE_ROWS],
    layout: Np21Layout,
    diagnostics: &mut Diagnostics,
) -> [TableRow; PULSE_ROWS] {
    for (i, row) in pulse.iter_mut().enumerate() {
        let at = layout.table(offsets::PULSE_TABLE + (i * TABLE_ROW_LEN) as u16);
        row[2] = clamp_index(
            row[2],
            PULSE_ROWS,
            &format!("pulse row {i} next row"),
            at,
            diagnostics,
        );
    }
    pulse
}

/// Decode an orderlist starting at `start` (which must be in the image).
pub(crate) fn decode_orderlist(
    image: &MemoryImage,
    start: Address,
    diagnostics: &mut Diagnostics,
) -> OrderList {
    let mut entries = Vec::new();
    let mut at = start;
    loop {
        if entries.len() == MAX_ORDER_ENTRIES {
            diagnostics.warn(
                Stage::Extraction,
                Some(start),
                format!("orderlist longer than {MAX_ORDER_ENTRIES} entries, cut"),
            );
            break;
        }
        let (Some(transpose), Some(sequence)) =
            (image.read_u8(at), image.read_u8(at.wrapping_add(1)))
        else {
            if image.read_u8(at) != Some(ORDER_END) {
                diagnostics.warn(
                    Stage::Extraction,
                    Some(start),
                    "orderlist runs into the end of the image",
                );
            }
            break;
        };
        if transpose == ORDER_END {
            break;
        }
        let sequence = clamp_index(
            sequence,
            SEQUENCE_SLOTS,
            "orderlist sequence index",
            at,
            diagnostics,
        );
        entries.push(OrderEntry {
            transpose: transpose as i8,
            sequence,
        });
        at = at.wrapping_add(2);
    }
    OrderList {
        address: Some(start),
        entries,
    }
}

/// Decode a sequence starting at `start` (which must be in the image).
pub(crate) fn decode_sequence(
    image: &MemoryImage,
    start: Address,
    diagnostics: &mut Diagnostics,
) -> SourceSequence {
    let mut events = Vec::new();
    let mut at = start;
    loop {
        let Some(byte) = image.read_u8(at) else {
            diagnostics.info(
                Stage::Extraction,
                Some(start),
                "sequence runs into the end of the image without an end marker",
            );
            break;
        };
        match SourceEvent::from_byte(byte) {
            Some(SourceEvent::End) => {
                events.push(SourceEvent::End);
                break;
            }
            Some(SourceEvent::Instrument(i)) => {
                let i = clamp_index(i, INSTRUMENT_COUNT, "instrument", at, diagnostics);
                events.push(SourceEvent::Instrument(i));
            }
            Some(event) => events.push(event),
            None => diagnostics.warn(
                Stage::Extraction,
                Some(at),
                format!("unknown sequence byte ${byte:02X} skipped"),
            ),
        }
        at = at.wrapping_add(1);
        if at == Address::ZERO {
            break;
        }
    }
    SourceSequence {
        address: Some(start),
        events,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_at(load: u16, bytes: &[u8]) -> MemoryImage {
        MemoryImage::new(Address(load), bytes.to_vec())
    }

    #[test]
    fn orderlist_stops_at_terminator() {
        let image = image_at(0x2000, &[0x00, 0x01, 0xFE, 0x02, 0xFF, 0x00]);
        let mut diagnostics = Diagnostics::new();
        let list = decode_orderlist(&image, Address(0x2000), &mut diagnostics);
        assert_eq!(
            list.entries,
            vec![
                OrderEntry {
                    transpose: 0,
                    sequence: 1
                },
                OrderEntry {
                    transpose: -2,
                    sequence: 2
                },
            ]
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn orderlist_sequence_index_is_clamped() {
        let image = image_at(0x2000, &[0x00, 0x40, 0xFF]);
        let mut diagnostics = Diagnostics::new();
        let list = decode_orderlist(&image, Address(0x2000), &mut diagnostics);
        assert_eq!(list.entries[0].sequence, 31);
        assert!(diagnostics.mentions("clamped to 31"));
    }

    #[test]
    fn sequence_skips_unknown_bytes() {
        let image = image_at(0x3000, &[0xA1, 0x83, 0x30, 0x65, 0x7E, 0xFF, 0x30]);
        let mut diagnostics = Diagnostics::new();
        let seq = decode_sequence(&image, Address(0x3000), &mut diagnostics);
        assert_eq!(
            seq.events,
            vec![
                SourceEvent::Instrument(1),
                SourceEvent::Duration(3),
                SourceEvent::Note(0x30),
                SourceEvent::Release,
                SourceEvent::End,
            ]
        );
        assert_eq!(diagnostics.warnings().count(), 1);
        assert_eq!(diagnostics.entries()[0].address, Some(Address(0x3003)));
    }

    #[test]
    fn unterminated_sequence_stops_at_image_end() {
        let image = image_at(0x3000, &[0x30, 0x7F]);
        let mut diagnostics = Diagnostics::new();
        let seq = decode_sequence(&image, Address(0x3000), &mut diagnostics);
        assert_eq!(seq.events, vec![SourceEvent::Note(0x30), SourceEvent::Tie]);
    }

    #[test]
    fn high_instrument_numbers_are_clamped() {
        let image = image_at(0x3000, &[0xAC, 0xFF]);
        let mut diagnostics = Diagnostics::new();
        let seq = decode_sequence(&image, Address(0x3000), &mut diagnostics);
        assert_eq!(seq.events[0], SourceEvent::Instrument(7));
        assert_eq!(diagnostics.warnings().count(), 1);
    }
}
