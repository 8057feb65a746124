//! Writers for the player's own table layout.
//!
//! Each writer is the inverse of the matching decoder: writing a decoded
//! table back into the image it came from leaves the image unchanged.
//! Writers never grow the image; a table that does not fit is an error.

use sidm2_common::MemoryImage;

use crate::error::{ExtractionError, Result};
use crate::layout::{
    COMMAND_COUNT, FILTER_ROWS, INSTRUMENT_COUNT, INSTRUMENT_ROW_LEN, Np21Layout, PULSE_ROWS,
    TABLE_ROW_LEN, offsets,
};
use crate::model::{Command, SourceInstrument, TableRow, WaveTable};

/// Instrument bytes owned by the writer; the vibrato bytes after them are
/// left as found.
const MAPPED_INSTRUMENT_BYTES: usize = 6;

fn put(
    image: &mut MemoryImage,
    layout: &Np21Layout,
    table: &'static str,
    offset: u16,
    data: &[u8],
) -> Result<()> {
    let address = layout.table(offset);
    let start = image
        .offset_of(address)
        .filter(|start| start + data.len() <= image.len())
        .ok_or(ExtractionError::TableOutOfRange { table, address })?;
    image.bytes_mut()[start..start + data.len()].copy_from_slice(data);
    Ok(())
}

/// Write the frames-per-tick byte.
pub fn write_speed(image: &mut MemoryImage, layout: &Np21Layout, speed: u8) -> Result<()> {
    put(image, layout, "speed", offsets::SPEED, &[speed])
}

/// Write the mapped fields of all instruments.
pub fn write_instruments(
    image: &mut MemoryImage,
    layout: &Np21Layout,
    instruments: &[SourceInstrument; INSTRUMENT_COUNT],
) -> Result<()> {
    for (i, instrument) in instruments.iter().enumerate() {
        let row = instrument.to_row();
        let offset = offsets::INSTRUMENTS + (i * INSTRUMENT_ROW_LEN) as u16;
        put(
            image,
            layout,
            "instrument",
            offset,
            &row[..MAPPED_INSTRUMENT_BYTES],
        )?;
    }
    Ok(())
}

/// Write both wave arrays.
pub fn write_wave_table(image: &mut MemoryImage, layout: &Np21Layout, wave: &WaveTable) -> Result<()> {
    put(
        image,
        layout,
        "wave",
        offsets::WAVE_NOTE_OFFSETS,
        &wave.note_offsets,
    )?;
    put(image, layout, "wave", offsets::WAVE_WAVEFORMS, &wave.waveforms)
}

fn write_rows(
    image: &mut MemoryImage,
    layout: &Np21Layout,
    table: &'static str,
    offset: u16,
    rows: &[TableRow],
) -> Result<()> {
    let flat: Vec<u8> = rows.iter().flatten().copied().collect();
    debug_assert_eq!(flat.len(), rows.len() * TABLE_ROW_LEN);
    put(image, layout, table, offset, &flat)
}

/// Write the pulse table.
pub fn write_pulse_table(
    image: &mut MemoryImage,
    layout: &Np21Layout,
    pulse: &[TableRow; PULSE_ROWS],
) -> Result<()> {
    write_rows(image, layout, "pulse", offsets::PULSE_TABLE, pulse)
}

/// Write the filter table.
pub fn write_filter_table(
    image: &mut MemoryImage,
    layout: &Np21Layout,
    filter: &[TableRow; FILTER_ROWS],
) -> Result<()> {
    write_rows(image, layout, "filter", offsets::FILTER_TABLE, filter)
}

/// Write the command table.
pub fn write_commands(
    image: &mut MemoryImage,
    layout: &Np21Layout,
    commands: &[Command; COMMAND_COUNT],
) -> Result<()> {
    let flat: Vec<u8> = commands.iter().flat_map(|c| [c.opcode, c.params]).collect();
    put(image, layout, "command", offsets::COMMANDS, &flat)
}
