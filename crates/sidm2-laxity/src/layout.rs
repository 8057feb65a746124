//! NewPlayer v21 memory layout.
//!
//! The player keeps all of its tables in one contiguous block at fixed
//! offsets from the load address. Some builds move the whole block by a
//! constant amount; [`Np21Layout::shift`] captures that.

use std::fmt;

use sidm2_common::{Address, MemoryImage};

/// Table offsets relative to the load address (unshifted).
pub mod offsets {
    /// `JMP init`
    pub const INIT_JUMP: u16 = 0x000;
    /// `JMP play`
    pub const PLAY_JUMP: u16 = 0x003;
    /// Wave table: note offsets (first array).
    pub const WAVE_NOTE_OFFSETS: u16 = 0x8DA;
    /// Wave table: waveforms (second array).
    pub const WAVE_WAVEFORMS: u16 = 0x90C;
    /// Frames per sequencer tick.
    pub const SPEED: u16 = 0x93E;
    /// Voice orderlist pointers, low bytes.
    pub const VOICE_POINTERS_LO: u16 = 0x940;
    /// Voice orderlist pointers, high bytes.
    pub const VOICE_POINTERS_HI: u16 = 0x943;
    /// Sequence pointers, low bytes.
    pub const SEQUENCE_POINTERS_LO: u16 = 0x946;
    /// Sequence pointers, high bytes.
    pub const SEQUENCE_POINTERS_HI: u16 = 0x966;
    /// Filter table, row-major.
    pub const FILTER_TABLE: u16 = 0x986;
    /// Pulse table, row-major.
    pub const PULSE_TABLE: u16 = 0x9B6;
    /// Instruments, row-major.
    pub const INSTRUMENTS: u16 = 0x9E6;
    /// Command table.
    pub const COMMANDS: u16 = 0xA26;
    /// First byte after the tables (orderlists and sequences follow).
    pub const MUSIC_DATA: u16 = 0xA66;
}

/// Entries per wave array.
pub const WAVE_ROWS: usize = 50;
/// Sequence pointer slots.
pub const SEQUENCE_SLOTS: usize = 32;
/// Pulse table rows.
pub const PULSE_ROWS: usize = 16;
/// Filter table rows.
pub const FILTER_ROWS: usize = 16;
/// Bytes per pulse/filter row.
pub const TABLE_ROW_LEN: usize = 3;
/// Instruments stored by the player.
pub const INSTRUMENT_COUNT: usize = 8;
/// Bytes per instrument row.
pub const INSTRUMENT_ROW_LEN: usize = 8;
/// Command table entries.
pub const COMMAND_COUNT: usize = 32;

/// Resolved table block position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Np21Layout {
    /// Player load address.
    pub load: Address,
    /// Byte displacement of the table block from its standard position.
    pub shift: i32,
}

impl Np21Layout {
    /// Standard layout at `load`.
    pub const fn standard(load: Address) -> Self {
        Self { load, shift: 0 }
    }

    /// Layout with the table block displaced by `shift` bytes.
    pub const fn shifted(load: Address, shift: i32) -> Self {
        Self { load, shift }
    }

    /// Same layout for a copy of the player loaded elsewhere.
    pub const fn rebased(self, load: Address) -> Self {
        Self { load, ..self }
    }

    /// Address of a table given its standard offset.
    pub const fn table(&self, offset: u16) -> Address {
        self.load.wrapping_add(offset).wrapping_offset(self.shift)
    }

    /// Address of a code-relative location (jump table), never shifted.
    pub const fn code(&self, offset: u16) -> Address {
        self.load.wrapping_add(offset)
    }

    /// End of the region that holds player code and variables.
    pub const fn code_end(&self) -> Address {
        self.table(offsets::WAVE_NOTE_OFFSETS)
    }

    /// Whether the whole table block lies inside `image`.
    pub fn fits(&self, image: &MemoryImage) -> bool {
        let start = self.table(offsets::WAVE_NOTE_OFFSETS);
        let last = self.table(offsets::MUSIC_DATA - 1);
        start >= image.load() && last >= start && image.contains(last)
    }
}

/// How the layout was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutResolution {
    /// Jump table signature and a read of the standard waveform array.
    Static,
    /// Table reads observed while emulating the player.
    Observed {
        /// Detected displacement.
        shift: i32,
    },
    /// Table reads found by scanning the code for indexed operands.
    Scanned {
        /// Detected displacement.
        shift: i32,
    },
}

impl fmt::Display for LayoutResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutResolution::Static => f.write_str("static layout"),
            LayoutResolution::Observed { shift } => write!(f, "observed layout (shift {shift:+})"),
            LayoutResolution::Scanned { shift } => write!(f, "scanned layout (shift {shift:+})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shifted_tables_move_together() {
        let layout = Np21Layout::shifted(Address(0x1000), 0x40);
        assert_eq!(layout.table(offsets::WAVE_WAVEFORMS), Address(0x194C));
        assert_eq!(layout.code(offsets::PLAY_JUMP), Address(0x1003));
        assert_eq!(layout.code_end(), Address(0x191A));
    }

    #[test]
    fn fits_requires_the_whole_block() {
        let layout = Np21Layout::standard(Address(0x1000));
        assert!(layout.fits(&MemoryImage::zeroed(Address(0x1000), 0xA66)));
        assert!(!layout.fits(&MemoryImage::zeroed(Address(0x1000), 0xA65)));
        assert!(!Np21Layout::shifted(Address(0x1000), -0x900).fits(&MemoryImage::zeroed(Address(0x1000), 0xA66)));
    }
}
