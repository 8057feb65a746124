//! Decoded source model.

use sidm2_common::{Address, Diagnostics};

use crate::layout::{
    COMMAND_COUNT, FILTER_ROWS, INSTRUMENT_COUNT, INSTRUMENT_ROW_LEN, LayoutResolution,
    Np21Layout, PULSE_ROWS, TABLE_ROW_LEN, WAVE_ROWS,
};

/// Waveform value marking a wave table jump row; the note offset column
/// then holds the target row.
pub const WAVE_JUMP: u8 = 0x7F;

/// One instrument row as stored by the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceInstrument {
    /// Attack/decay register value.
    pub attack_decay: u8,
    /// Sustain/release register value.
    pub sustain_release: u8,
    /// First wave table row.
    pub wave_index: u8,
    /// Pulse table row.
    pub pulse_index: u8,
    /// Filter table row (0 = filter untouched).
    pub filter_index: u8,
    /// Player flags.
    pub flags: u8,
    /// Vibrato bytes; not used by the target format.
    pub vibrato: [u8; 2],
}

impl SourceInstrument {
    /// Decode a stored row.
    pub fn from_row(row: &[u8; INSTRUMENT_ROW_LEN]) -> Self {
        Self {
            attack_decay: row[0],
            sustain_release: row[1],
            wave_index: row[2],
            pulse_index: row[3],
            filter_index: row[4],
            flags: row[5],
            vibrato: [row[6], row[7]],
        }
    }

    /// Encode as a stored row.
    pub fn to_row(&self) -> [u8; INSTRUMENT_ROW_LEN] {
        [
            self.attack_decay,
            self.sustain_release,
            self.wave_index,
            self.pulse_index,
            self.filter_index,
            self.flags,
            self.vibrato[0],
            self.vibrato[1],
        ]
    }
}

/// The dual-array wave table: all note offsets, then all waveforms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveTable {
    /// Note offset per row (bit 7 set = absolute note).
    pub note_offsets: [u8; WAVE_ROWS],
    /// Waveform/control value per row, or [`WAVE_JUMP`].
    pub waveforms: [u8; WAVE_ROWS],
}

impl Default for WaveTable {
    fn default() -> Self {
        Self {
            note_offsets: [0; WAVE_ROWS],
            waveforms: [0; WAVE_ROWS],
        }
    }
}

/// A pulse or filter row.
pub type TableRow = [u8; TABLE_ROW_LEN];

/// A command table entry: opcode plus two nibble-packed parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Command {
    /// Effect opcode.
    pub opcode: u8,
    /// Packed parameters, first in the high nibble.
    pub params: u8,
}

impl Command {
    /// High-nibble parameter.
    pub const fn first(&self) -> u8 {
        self.params >> 4
    }

    /// Low-nibble parameter.
    pub const fn second(&self) -> u8 {
        self.params & 0x0F
    }
}

/// Sequence event as encoded by the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceEvent {
    /// `$00-$5F`: play a note for the current duration.
    Note(u8),
    /// `$7E`: gate off for the current duration.
    Release,
    /// `$7F`: keep the current note for the current duration.
    Tie,
    /// `$80-$9F`: set duration in ticks.
    Duration(u8),
    /// `$A0-$BF`: select instrument.
    Instrument(u8),
    /// `$C0-$DF`: run command table entry.
    Command(u8),
    /// `$FF`: end of sequence.
    End,
}

impl SourceEvent {
    /// Whether the event consumes sequencer time.
    pub const fn is_timed(&self) -> bool {
        matches!(
            self,
            SourceEvent::Note(_) | SourceEvent::Release | SourceEvent::Tie
        )
    }

    /// Decode one sequence byte; `None` for bytes with no meaning.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00..=0x5F => Some(SourceEvent::Note(byte)),
            0x7E => Some(SourceEvent::Release),
            0x7F => Some(SourceEvent::Tie),
            0x80..=0x9F => Some(SourceEvent::Duration(byte & 0x1F)),
            0xA0..=0xBF => Some(SourceEvent::Instrument(byte & 0x1F)),
            0xC0..=0xDF => Some(SourceEvent::Command(byte & 0x1F)),
            0xFF => Some(SourceEvent::End),
            _ => None,
        }
    }

    /// Encode as a sequence byte.
    pub const fn to_byte(&self) -> u8 {
        match *self {
            SourceEvent::Note(n) => n & 0x7F,
            SourceEvent::Release => 0x7E,
            SourceEvent::Tie => 0x7F,
            SourceEvent::Duration(d) => 0x80 | (d & 0x1F),
            SourceEvent::Instrument(i) => 0xA0 | (i & 0x1F),
            SourceEvent::Command(c) => 0xC0 | (c & 0x1F),
            SourceEvent::End => 0xFF,
        }
    }
}

/// Encode events as player bytes.
pub fn encode_sequence(events: &[SourceEvent]) -> Vec<u8> {
    events.iter().map(SourceEvent::to_byte).collect()
}

/// Decoded sequence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceSequence {
    /// Where it was read from; `None` for sequences substituted for
    /// dangling pointers.
    pub address: Option<Address>,
    /// Events in order. Ends with [`SourceEvent::End`] unless the data ran
    /// into the end of the image.
    pub events: Vec<SourceEvent>,
}

impl SourceSequence {
    /// A sequence holding only `End`.
    pub fn empty() -> Self {
        Self {
            address: None,
            events: vec![SourceEvent::End],
        }
    }
}

/// Orderlist entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderEntry {
    /// Semitone transpose applied to the sequence.
    pub transpose: i8,
    /// Sequence index.
    pub sequence: u8,
}

/// Per-voice orderlist. Playback loops to the first entry after the last.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderList {
    /// Where it was read from; `None` when substituted.
    pub address: Option<Address>,
    /// Entries before the terminator.
    pub entries: Vec<OrderEntry>,
}

/// Everything decoded from one NewPlayer v21 image.
///
/// Produced once by [`crate::extract`] and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceModel {
    /// Resolved table block position.
    pub layout: Np21Layout,
    /// Which tier found the layout.
    pub resolution: LayoutResolution,
    /// Frames per sequencer tick.
    pub speed: u8,
    /// The instrument rows.
    pub instruments: [SourceInstrument; INSTRUMENT_COUNT],
    /// Wave table.
    pub wave: WaveTable,
    /// Pulse table rows (value, speed, next row).
    pub pulse: [TableRow; PULSE_ROWS],
    /// Filter table rows (cutoff, resonance/routing, mode/volume).
    pub filter: [TableRow; FILTER_ROWS],
    /// Command table.
    pub commands: [Command; COMMAND_COUNT],
    /// One orderlist per voice.
    pub orderlists: [OrderList; 3],
    /// Sequences indexed by orderlist entries.
    pub sequences: Vec<SourceSequence>,
    /// Findings recorded during extraction.
    pub diagnostics: Diagnostics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_meaningful_byte_round_trips() {
        for byte in 0..=255u8 {
            if let Some(event) = SourceEvent::from_byte(byte) {
                assert_eq!(event.to_byte(), byte, "byte {byte:#04x}");
            }
        }
        assert_eq!(SourceEvent::from_byte(0x60), None);
        assert_eq!(SourceEvent::from_byte(0xE0), None);
    }

    #[test]
    fn command_nibbles() {
        let cmd = Command {
            opcode: 1,
            params: 0x3A,
        };
        assert_eq!((cmd.first(), cmd.second()), (3, 10));
    }

    #[test]
    fn instrument_rows_round_trip() {
        let row = [0x09, 0xA0, 0x04, 0x02, 0x00, 0x40, 0x11, 0x22];
        assert_eq!(SourceInstrument::from_row(&row).to_row(), row);
    }
}
