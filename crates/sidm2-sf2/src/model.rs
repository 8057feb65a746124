//! Target (SF2-style) data model.
//!
//! Everything here is explicit where the source format is implicit:
//! instruments are column-major with 32 slots, the wave table holds
//! interleaved pairs, and sequences carry their own gate events.

use std::fmt;

use serde::{Deserialize, Serialize};
use sidm2_common::Diagnostics;
use sidm2_common::sid::WAVE_TRIANGLE;

/// Instrument slots.
pub const INSTRUMENT_SLOTS: usize = 32;
/// Columns per instrument.
pub const INSTRUMENT_COLUMNS: usize = 6;
/// Wave table rows.
pub const WAVE_ROWS: usize = 128;
/// Pulse table rows.
pub const PULSE_ROWS: usize = 64;
/// Filter table rows.
pub const FILTER_ROWS: usize = 64;
/// Sequences addressable by an orderlist.
pub const MAX_SEQUENCES: usize = 128;
/// First wave row not taken from the source.
pub const DEFAULT_WAVE_ROW: u8 = 50;

/// One instrument in target column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetInstrument {
    /// Attack/decay.
    pub attack_decay: u8,
    /// Sustain/release.
    pub sustain_release: u8,
    /// Driver flags.
    pub flags: u8,
    /// Filter table row (0 = untouched).
    pub filter_index: u8,
    /// Pulse table row.
    pub pulse_index: u8,
    /// First wave table row.
    pub wave_index: u8,
}

impl TargetInstrument {
    /// Neutral instrument for unused slots: no attack, full sustain,
    /// triangle wave row.
    pub const DEFAULT: TargetInstrument = TargetInstrument {
        attack_decay: 0x00,
        sustain_release: 0xF0,
        flags: 0,
        filter_index: 0,
        pulse_index: 0,
        wave_index: DEFAULT_WAVE_ROW,
    };

    /// Values in column order.
    pub const fn to_columns(self) -> [u8; INSTRUMENT_COLUMNS] {
        [
            self.attack_decay,
            self.sustain_release,
            self.flags,
            self.filter_index,
            self.pulse_index,
            self.wave_index,
        ]
    }

    /// Build from values in column order.
    pub const fn from_columns(c: [u8; INSTRUMENT_COLUMNS]) -> Self {
        Self {
            attack_decay: c[0],
            sustain_release: c[1],
            flags: c[2],
            filter_index: c[3],
            pulse_index: c[4],
            wave_index: c[5],
        }
    }
}

impl Default for TargetInstrument {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// One interleaved wave table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WavePair {
    /// Control register value, or the jump marker.
    pub waveform: u8,
    /// Note offset, absolute note (bit 7), or jump target row.
    pub note_offset: u8,
}

impl WavePair {
    /// Triangle, no offset.
    pub const DEFAULT: WavePair = WavePair {
        waveform: WAVE_TRIANGLE,
        note_offset: 0,
    };
}

impl Default for WavePair {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Single-value parameter carried by a `SetParameter` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ParameterKind {
    /// Instrument slot for following notes.
    Instrument = 0,
    /// Ticks per timed event minus one.
    Duration = 1,
    /// Vibrato depth.
    VibratoDepth = 2,
    /// Vibrato speed.
    VibratoSpeed = 3,
    /// First arpeggio interval.
    ArpeggioFirst = 4,
    /// Second arpeggio interval.
    ArpeggioSecond = 5,
    /// Pulse width change per frame.
    PulseSpeed = 6,
    /// Pulse sweep depth.
    PulseDepth = 7,
    /// Filter cutoff (high nibble of `$D416`).
    FilterCutoff = 8,
    /// Filter resonance (high nibble of `$D417`).
    FilterResonance = 9,
    /// Envelope attack nibble.
    Attack = 10,
    /// Envelope decay nibble.
    Decay = 11,
}

impl ParameterKind {
    /// All kinds in code order.
    pub const ALL: [ParameterKind; 12] = [
        ParameterKind::Instrument,
        ParameterKind::Duration,
        ParameterKind::VibratoDepth,
        ParameterKind::VibratoSpeed,
        ParameterKind::ArpeggioFirst,
        ParameterKind::ArpeggioSecond,
        ParameterKind::PulseSpeed,
        ParameterKind::PulseDepth,
        ParameterKind::FilterCutoff,
        ParameterKind::FilterResonance,
        ParameterKind::Attack,
        ParameterKind::Decay,
    ];

    /// Code used in sequence bytes.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Kind for a code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Gate transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gate {
    /// Start the envelope.
    On,
    /// Release the envelope.
    Off,
}

/// A target sequence event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetEvent {
    /// Play a note; timed.
    Note(u8),
    /// Explicit gate change; untimed.
    Gate(Gate),
    /// Set one parameter; untimed.
    SetParameter(ParameterKind, u8),
    /// Let the current state run for one step; timed.
    Hold,
    /// End of sequence.
    End,
}

impl TargetEvent {
    /// Whether the event consumes a step of time.
    pub const fn is_timed(self) -> bool {
        matches!(self, TargetEvent::Note(_) | TargetEvent::Hold)
    }
}

/// A target sequence, always terminated by [`TargetEvent::End`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TargetSequence {
    /// Events in play order.
    pub events: Vec<TargetEvent>,
}

/// One orderlist step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetOrderEntry {
    /// Semitones added to notes of the sequence.
    pub transpose: i8,
    /// Sequence index.
    pub sequence: u8,
}

/// Display strings carried in the metadata block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// Tune title.
    pub name: String,
    /// Composer.
    pub author: String,
    /// Release/copyright line.
    pub released: String,
}

/// Complete target model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetModel {
    /// Frames per tick (at least 1).
    pub speed: u8,
    /// Instrument slots.
    pub instruments: [TargetInstrument; INSTRUMENT_SLOTS],
    /// Wave table.
    pub wave: [WavePair; WAVE_ROWS],
    /// Pulse rows (value, speed, next).
    pub pulse: [[u8; 3]; PULSE_ROWS],
    /// Filter rows (cutoff, resonance/routing, mode/volume).
    pub filter: [[u8; 3]; FILTER_ROWS],
    /// Per-voice orderlists; each loops to its start.
    pub orderlists: [Vec<TargetOrderEntry>; 3],
    /// Sequences referenced by the orderlists.
    pub sequences: Vec<TargetSequence>,
    /// Display strings.
    pub metadata: Metadata,
    /// Findings from every stage that produced this model.
    pub diagnostics: Diagnostics,
}

impl TargetModel {
    /// Model with default tables and no music.
    pub fn empty() -> Self {
        Self {
            speed: 1,
            instruments: [TargetInstrument::DEFAULT; INSTRUMENT_SLOTS],
            wave: [WavePair::DEFAULT; WAVE_ROWS],
            pulse: [[0; 3]; PULSE_ROWS],
            filter: [[0; 3]; FILTER_ROWS],
            orderlists: Default::default(),
            sequences: Vec::new(),
            metadata: Metadata::default(),
            diagnostics: Diagnostics::new(),
        }
    }

    /// Same model without diagnostics, for structural comparison.
    pub fn without_diagnostics(&self) -> Self {
        Self {
            diagnostics: Diagnostics::new(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_codes_round_trip() {
        for kind in ParameterKind::ALL {
            assert_eq!(ParameterKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(ParameterKind::from_code(12), None);
    }

    #[test]
    fn default_instrument_is_audible_and_safe() {
        let cols = TargetInstrument::DEFAULT.to_columns();
        assert_eq!(cols, [0x00, 0xF0, 0, 0, 0, DEFAULT_WAVE_ROW]);
        assert_eq!(TargetInstrument::from_columns(cols), TargetInstrument::DEFAULT);
    }
}
