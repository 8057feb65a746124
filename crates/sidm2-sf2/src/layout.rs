//! Fixed block layout of packed target images.
//!
//! Every image starts with a jump table, a 26 byte header and a 96 byte
//! metadata block. What follows depends on the driver: the table drivers
//! place their code, variables and table blocks at fixed offsets; the
//! Laxity-aware driver places the original player right after the
//! metadata.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::model::{FILTER_ROWS, INSTRUMENT_COLUMNS, INSTRUMENT_SLOTS, MAX_SEQUENCES, PULSE_ROWS, WAVE_ROWS};

/// Header magic, stored big-endian at [`HEADER`].
pub const MAGIC: [u8; 2] = [0x13, 0x37];
/// Header format version.
pub const FORMAT_VERSION: u8 = 1;

/// `JMP init`
pub const INIT_JUMP: usize = 0x0000;
/// `JMP play` (or `RTS` for IRQ-driven wrapped players)
pub const PLAY_JUMP: usize = 0x0003;
/// Header block.
pub const HEADER: usize = 0x0006;
/// Metadata block: name, author, released (32 bytes each).
pub const METADATA: usize = 0x0020;
/// Driver code, or the wrapped player.
pub const CODE: usize = 0x0080;

/// Header field offsets relative to the image base.
pub mod header {
    /// Magic, 2 bytes.
    pub const MAGIC: usize = 0x06;
    /// Driver id.
    pub const DRIVER: usize = 0x08;
    /// Format version.
    pub const VERSION: usize = 0x09;
    /// [`super::HeaderFlags`].
    pub const FLAGS: usize = 0x0A;
    /// Frames per tick.
    pub const SPEED: usize = 0x0B;
    /// Number of sequences.
    pub const SEQUENCE_COUNT: usize = 0x0C;
    /// Eight little-endian table pointer words.
    pub const TABLE_POINTERS: usize = 0x0E;
}

/// Order of the table pointer words in the header.
pub const TABLE_POINTER_ORDER: [Block; 8] = [
    Block::Orderlists,
    Block::SequencePointers,
    Block::Instruments,
    Block::Wave,
    Block::Pulse,
    Block::Filter,
    Block::Sequences,
    Block::Frequencies,
];

bitflags! {
    /// Header flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HeaderFlags: u8 {
        /// The image wraps an unmodified foreign player.
        const WRAPPED = 0x01;
        /// The wrapped player installs its own interrupt; `+3` is `RTS`.
        const IRQ_DRIVEN = 0x02;
    }
}

/// Supported target encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetDriver {
    /// Table driver with sequence data last.
    Driver11,
    /// The original NewPlayer v21 code, relocated behind a header.
    LaxityAware,
    /// Table driver with instruments and wave table ahead of the
    /// orderlists.
    Np20,
}

impl TargetDriver {
    /// Id stored in the header.
    pub const fn id(self) -> u8 {
        match self {
            TargetDriver::Driver11 => 0x11,
            TargetDriver::Np20 => 0x20,
            TargetDriver::LaxityAware => 0x21,
        }
    }

    /// Driver for a header id.
    pub const fn from_id(id: u8) -> Option<Self> {
        match id {
            0x11 => Some(TargetDriver::Driver11),
            0x20 => Some(TargetDriver::Np20),
            0x21 => Some(TargetDriver::LaxityAware),
            _ => None,
        }
    }

    /// Block layout of a table driver; `None` for the Laxity-aware
    /// wrapper, which keeps the player's own layout.
    pub const fn layout(self) -> Option<DriverLayout> {
        match self {
            TargetDriver::Driver11 => Some(DriverLayout::DRIVER11),
            TargetDriver::Np20 => Some(DriverLayout::NP20),
            TargetDriver::LaxityAware => None,
        }
    }
}

impl fmt::Display for TargetDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TargetDriver::Driver11 => "driver11",
            TargetDriver::LaxityAware => "laxity",
            TargetDriver::Np20 => "np20",
        };
        f.write_str(name)
    }
}

/// Table blocks of a table driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Block {
    /// Driver variables.
    Variables,
    /// Note frequencies, 96 low bytes then 96 high bytes.
    Frequencies,
    /// Three orderlists of [`ORDERLIST_CAPACITY`] bytes.
    Orderlists,
    /// Sequence pointers, 128 low bytes then 128 high bytes.
    SequencePointers,
    /// Instruments, column-major.
    Instruments,
    /// Wave table, interleaved pairs.
    Wave,
    /// Pulse table, column-major.
    Pulse,
    /// Filter table, column-major.
    Filter,
    /// Sequence data.
    Sequences,
}

impl Block {
    /// Name used in errors.
    pub const fn name(self) -> &'static str {
        match self {
            Block::Variables => "variables",
            Block::Frequencies => "frequency table",
            Block::Orderlists => "orderlists",
            Block::SequencePointers => "sequence pointers",
            Block::Instruments => "instruments",
            Block::Wave => "wave table",
            Block::Pulse => "pulse table",
            Block::Filter => "filter table",
            Block::Sequences => "sequence data",
        }
    }
}

/// Bytes per voice orderlist, terminator included.
pub const ORDERLIST_CAPACITY: usize = 0x40;
/// Bytes reserved for driver code.
pub const CODE_CAPACITY: usize = 0x580;
/// Bytes reserved for driver variables.
pub const VARIABLES_LEN: usize = 0x80;
/// Bytes reserved for sequence data.
pub const SEQUENCE_CAPACITY: usize = 0x3000;

/// Offsets of the table blocks relative to the image base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DriverLayout {
    /// Driver variables.
    pub variables: usize,
    /// Frequency table.
    pub frequencies: usize,
    /// Orderlists.
    pub orderlists: usize,
    /// Sequence pointers.
    pub sequence_pointers: usize,
    /// Instruments.
    pub instruments: usize,
    /// Wave table.
    pub wave: usize,
    /// Pulse table.
    pub pulse: usize,
    /// Filter table.
    pub filter: usize,
    /// Sequence data.
    pub sequences: usize,
}

impl DriverLayout {
    /// Driver 11.
    pub const DRIVER11: DriverLayout = DriverLayout {
        variables: 0x0600,
        frequencies: 0x0680,
        orderlists: 0x0740,
        sequence_pointers: 0x0800,
        instruments: 0x0900,
        wave: 0x09C0,
        pulse: 0x0AC0,
        filter: 0x0B80,
        sequences: 0x0C40,
    };

    /// NP20.
    pub const NP20: DriverLayout = DriverLayout {
        variables: 0x0600,
        frequencies: 0x0680,
        instruments: 0x0740,
        wave: 0x0800,
        orderlists: 0x0900,
        sequence_pointers: 0x09C0,
        pulse: 0x0AC0,
        filter: 0x0B80,
        sequences: 0x0C40,
    };

    /// Offset of a block.
    pub const fn offset(&self, block: Block) -> usize {
        match block {
            Block::Variables => self.variables,
            Block::Frequencies => self.frequencies,
            Block::Orderlists => self.orderlists,
            Block::SequencePointers => self.sequence_pointers,
            Block::Instruments => self.instruments,
            Block::Wave => self.wave,
            Block::Pulse => self.pulse,
            Block::Filter => self.filter,
            Block::Sequences => self.sequences,
        }
    }

    /// Size of a block.
    pub const fn capacity(block: Block) -> usize {
        match block {
            Block::Variables => VARIABLES_LEN,
            Block::Frequencies => 2 * sidm2_common::sid::NOTE_COUNT,
            Block::Orderlists => 3 * ORDERLIST_CAPACITY,
            Block::SequencePointers => 2 * MAX_SEQUENCES,
            Block::Instruments => INSTRUMENT_SLOTS * INSTRUMENT_COLUMNS,
            Block::Wave => WAVE_ROWS * 2,
            Block::Pulse => PULSE_ROWS * 3,
            Block::Filter => FILTER_ROWS * 3,
            Block::Sequences => SEQUENCE_CAPACITY,
        }
    }

    /// Length of the template: everything before the sequence data.
    pub const fn template_len(&self) -> usize {
        self.sequences
    }
}
