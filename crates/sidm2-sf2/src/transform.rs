//! Source model to target model.
//!
//! A pure mapping: no emulation and no I/O. The table conversions are
//! exact bijections on the rows the source defines; gate inference is a
//! heuristic and documented as such on [`GateInference`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sidm2_common::Stage;
use sidm2_laxity::layout::{INSTRUMENT_COUNT, INSTRUMENT_ROW_LEN, WAVE_ROWS as SOURCE_WAVE_ROWS};
use sidm2_laxity::{Command, SourceEvent, SourceInstrument, SourceModel, WaveTable};

use crate::error::TransformationError;
use crate::model::{
    FILTER_ROWS, Gate, INSTRUMENT_COLUMNS, INSTRUMENT_SLOTS, MAX_SEQUENCES, Metadata,
    PULSE_ROWS, ParameterKind, TargetEvent, TargetInstrument, TargetModel, TargetOrderEntry,
    TargetSequence, WAVE_ROWS, WavePair,
};

/// Source row byte feeding each target column.
pub const COLUMN_SOURCES: [usize; INSTRUMENT_COLUMNS] = [0, 1, 5, 4, 3, 2];

/// Lowest transpose an orderlist marker can carry.
pub const MIN_TRANSPOSE: i8 = -32;
/// Highest transpose an orderlist marker can carry.
pub const MAX_TRANSPOSE: i8 = 94;

/// Gate inference tuning.
///
/// The source format starts a note by playing it and releases it only
/// through an explicit release event or the next note. Inference walks each
/// sequence once with a `gate_is_on` flag: every note gets a `Gate(On)`,
/// a note arriving while the gate is on is preceded by `Gate(Off)` (a
/// re-trigger) unless the previous note was short enough to count as
/// legato, and a gate still on at the end of the sequence is closed.
/// Legato and staccato are indistinguishable in the source encoding, so
/// this is an approximation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GateInference {
    /// Notes lasting fewer ticks than this are followed legato. 0 disables
    /// legato detection: every note re-triggers.
    pub legato_threshold: u8,
}

impl GateInference {
    fn is_legato(&self, previous_ticks: u16) -> bool {
        previous_ticks < u16::from(self.legato_threshold)
    }
}

/// Transformation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Gate inference tuning.
    pub gate: GateInference,
}

/// Permute a source instrument row into target columns.
pub fn permute_instrument(row: &[u8; INSTRUMENT_ROW_LEN]) -> [u8; INSTRUMENT_COLUMNS] {
    COLUMN_SOURCES.map(|source| row[source])
}

/// Inverse of [`permute_instrument`] for the mapped bytes; unmapped bytes
/// of `row` are left alone.
pub fn unpermute_instrument(columns: &[u8; INSTRUMENT_COLUMNS], row: &mut [u8; INSTRUMENT_ROW_LEN]) {
    for (column, &source) in COLUMN_SOURCES.iter().enumerate() {
        row[source] = columns[column];
    }
}

/// Zip the dual-array wave table into interleaved pairs, padding with
/// triangle rows.
pub fn interleave_wave(wave: &WaveTable) -> [WavePair; WAVE_ROWS] {
    let mut pairs = [WavePair::DEFAULT; WAVE_ROWS];
    for (row, pair) in pairs.iter_mut().take(SOURCE_WAVE_ROWS).enumerate() {
        *pair = WavePair {
            waveform: wave.waveforms[row],
            note_offset: wave.note_offsets[row],
        };
    }
    pairs
}

/// Split interleaved pairs back into the dual arrays (first 50 rows).
pub fn unzip_wave(pairs: &[WavePair; WAVE_ROWS]) -> WaveTable {
    let mut wave = WaveTable::default();
    for (row, pair) in pairs.iter().take(SOURCE_WAVE_ROWS).enumerate() {
        wave.waveforms[row] = pair.waveform;
        wave.note_offsets[row] = pair.note_offset;
    }
    wave
}

/// Parameters a super-command expands to, high nibble first.
pub fn decompose(command: Command) -> Option<[(ParameterKind, u8); 2]> {
    use ParameterKind::*;
    let kinds = match command.opcode {
        0x01 => [VibratoDepth, VibratoSpeed],
        0x02 => [ArpeggioFirst, ArpeggioSecond],
        0x03 => [PulseSpeed, PulseDepth],
        0x04 => [FilterCutoff, FilterResonance],
        0x05 => [Attack, Decay],
        _ => return None,
    };
    Some([(kinds[0], command.first()), (kinds[1], command.second())])
}

/// Gate inference over one sequence.
pub fn infer_gates(
    events: &[SourceEvent],
    commands: &[Command],
    inference: GateInference,
    mut dropped: impl FnMut(u8, Command),
) -> TargetSequence {
    let mut out = Vec::with_capacity(events.len() * 2 + 2);
    let mut gate_is_on = false;
    let mut duration: u8 = 0;
    let mut previous_ticks: Option<u16> = None;

    for &event in events {
        match event {
            SourceEvent::Note(pitch) => {
                let legato = previous_ticks.is_some_and(|ticks| inference.is_legato(ticks));
                if gate_is_on && !legato {
                    out.push(TargetEvent::Gate(Gate::Off));
                }
                out.push(TargetEvent::Gate(Gate::On));
                out.push(TargetEvent::Note(pitch));
                gate_is_on = true;
                previous_ticks = Some(u16::from(duration) + 1);
            }
            SourceEvent::Release => {
                if gate_is_on {
                    out.push(TargetEvent::Gate(Gate::Off));
                }
                gate_is_on = false;
                previous_ticks = None;
                out.push(TargetEvent::Hold);
            }
            SourceEvent::Tie => {
                if let Some(ticks) = previous_ticks.as_mut() {
                    *ticks += u16::from(duration) + 1;
                }
                out.push(TargetEvent::Hold);
            }
            SourceEvent::Duration(d) => {
                duration = d;
                out.push(TargetEvent::SetParameter(ParameterKind::Duration, d));
            }
            SourceEvent::Instrument(i) => {
                out.push(TargetEvent::SetParameter(ParameterKind::Instrument, i));
            }
            SourceEvent::Command(index) => {
                let command = commands.get(usize::from(index)).copied().unwrap_or_default();
                match decompose(command) {
                    Some(params) => out.extend(
                        params.map(|(kind, value)| TargetEvent::SetParameter(kind, value)),
                    ),
                    None => dropped(index, command),
                }
            }
            SourceEvent::End => break,
        }
    }

    if gate_is_on {
        out.push(TargetEvent::Gate(Gate::Off));
    }
    out.push(TargetEvent::End);
    TargetSequence { events: out }
}

fn pad_rows<const N: usize>(rows: &[[u8; 3]]) -> [[u8; 3]; N] {
    let mut padded = [[0; 3]; N];
    for (dst, src) in padded.iter_mut().zip(rows) {
        *dst = *src;
    }
    padded
}

/// Map a decoded source model onto the target model.
///
/// Source diagnostics are carried over; transformation findings are
/// appended.
pub fn transform(
    source: SourceModel,
    metadata: Metadata,
    config: &TransformConfig,
) -> Result<TargetModel, TransformationError> {
    if source.sequences.len() > MAX_SEQUENCES {
        return Err(TransformationError::TooManySequences {
            count: source.sequences.len(),
        });
    }
    let mut diagnostics = source.diagnostics;

    let mut instruments = [TargetInstrument::DEFAULT; INSTRUMENT_SLOTS];
    for (slot, instrument) in instruments.iter_mut().zip(&source.instruments) {
        *slot = TargetInstrument::from_columns(permute_instrument(&instrument.to_row()));
    }

    let mut reported = BTreeSet::new();
    let sequences: Vec<TargetSequence> = source
        .sequences
        .iter()
        .map(|sequence| {
            infer_gates(&sequence.events, &source.commands, config.gate, |index, command| {
                if reported.insert(index) {
                    diagnostics.warn(
                        Stage::Transformation,
                        sequence.address,
                        format!(
                            "command {index} (opcode {:#04x}) has no target equivalent; dropped",
                            command.opcode
                        ),
                    );
                }
            })
        })
        .collect();

    let mut orderlists: [Vec<TargetOrderEntry>; 3] = Default::default();
    for (voice, (list, target)) in source.orderlists.iter().zip(&mut orderlists).enumerate() {
        for entry in &list.entries {
            let index = usize::from(entry.sequence);
            if index >= sequences.len() {
                return Err(TransformationError::MissingSequence {
                    voice: voice + 1,
                    index,
                });
            }
            let transpose = entry.transpose.clamp(MIN_TRANSPOSE, MAX_TRANSPOSE);
            if transpose != entry.transpose {
                diagnostics.warn(
                    Stage::Transformation,
                    list.address,
                    format!(
                        "voice {} transpose {} clamped to {transpose}",
                        voice + 1,
                        entry.transpose
                    ),
                );
            }
            target.push(TargetOrderEntry {
                transpose,
                sequence: entry.sequence,
            });
        }
    }

    // an empty orderlist would leave the driver scanning for a sequence
    let mut sequences = sequences;
    let mut silent = None;
    for (voice, list) in orderlists.iter_mut().enumerate() {
        if !list.is_empty() {
            continue;
        }
        let index = match silent {
            Some(index) => index,
            None if sequences.len() < MAX_SEQUENCES => {
                sequences.push(TargetSequence {
                    events: vec![TargetEvent::Hold, TargetEvent::End],
                });
                let index = (sequences.len() - 1) as u8;
                silent = Some(index);
                index
            }
            None => {
                return Err(TransformationError::TooManySequences {
                    count: sequences.len() + 1,
                });
            }
        };
        diagnostics.warn(
            Stage::Transformation,
            None,
            format!("voice {} has an empty orderlist; silent sequence {index} used", voice + 1),
        );
        list.push(TargetOrderEntry {
            transpose: 0,
            sequence: index,
        });
    }

    tracing::debug!(
        sequences = sequences.len(),
        dropped_commands = reported.len(),
        "transformed source model"
    );

    Ok(TargetModel {
        speed: source.speed.max(1),
        instruments,
        wave: interleave_wave(&source.wave),
        pulse: pad_rows::<PULSE_ROWS>(&source.pulse),
        filter: pad_rows::<FILTER_ROWS>(&source.filter),
        orderlists,
        sequences,
        metadata,
        diagnostics,
    })
}

/// Source-format tables recovered from a target model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTables {
    /// Frames per tick.
    pub speed: u8,
    /// Instrument rows; unmapped bytes come from the original.
    pub instruments: [SourceInstrument; INSTRUMENT_COUNT],
    /// Wave table.
    pub wave: WaveTable,
    /// Pulse rows.
    pub pulse: [[u8; 3]; sidm2_laxity::layout::PULSE_ROWS],
    /// Filter rows.
    pub filter: [[u8; 3]; sidm2_laxity::layout::FILTER_ROWS],
}

/// Inverse of the table part of [`transform`]. `original` supplies the
/// bytes the target model does not carry (vibrato).
pub fn source_tables(model: &TargetModel, original: &SourceModel) -> SourceTables {
    let instruments = std::array::from_fn(|slot| {
        let mut row = original.instruments[slot].to_row();
        unpermute_instrument(&model.instruments[slot].to_columns(), &mut row);
        SourceInstrument::from_row(&row)
    });
    SourceTables {
        speed: model.speed,
        instruments,
        wave: unzip_wave(&model.wave),
        pulse: pad_rows(&model.pulse),
        filter: pad_rows(&model.filter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sidm2_laxity::testing::Np21Fixture;
    use sidm2_laxity::{OrderEntry, OrderList, SourceEvent as S, extract};
    use TargetEvent as T;

    const ON: TargetEvent = T::Gate(Gate::On);
    const OFF: TargetEvent = T::Gate(Gate::Off);

    fn reference_model() -> SourceModel {
        let (header, image) = Np21Fixture::reference().build();
        extract(&header, &image).unwrap()
    }

    fn gates(events: &[SourceEvent]) -> Vec<TargetEvent> {
        infer_gates(events, &[], GateInference::default(), |_, _| {}).events
    }

    proptest! {
        #[test]
        fn wave_interleave_is_a_bijection(
            offsets in prop::collection::vec(any::<u8>(), SOURCE_WAVE_ROWS),
            forms in prop::collection::vec(any::<u8>(), SOURCE_WAVE_ROWS),
        ) {
            let mut wave = WaveTable::default();
            wave.note_offsets.copy_from_slice(&offsets);
            wave.waveforms.copy_from_slice(&forms);

            let pairs = interleave_wave(&wave);
            prop_assert_eq!(&unzip_wave(&pairs), &wave);
            prop_assert!(pairs[SOURCE_WAVE_ROWS..].iter().all(|p| *p == WavePair::DEFAULT));
            for (row, pair) in pairs.iter().take(SOURCE_WAVE_ROWS).enumerate() {
                prop_assert_eq!(pair.waveform, forms[row]);
                prop_assert_eq!(pair.note_offset, offsets[row]);
            }
        }

        #[test]
        fn instrument_permutation_is_a_bijection(row in prop::array::uniform8(any::<u8>())) {
            let columns = permute_instrument(&row);
            let mut back = [0u8; INSTRUMENT_ROW_LEN];
            back[6] = row[6];
            back[7] = row[7];
            unpermute_instrument(&columns, &mut back);
            prop_assert_eq!(back, row);
        }
    }

    #[test]
    fn every_mapped_field_has_one_column() {
        let mut seen = COLUMN_SOURCES;
        seen.sort_unstable();
        assert_eq!(seen, [0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn instrument_fields_land_in_named_columns() {
        let row = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];
        let target = TargetInstrument::from_columns(permute_instrument(&row));
        assert_eq!(target.attack_decay, 0x11);
        assert_eq!(target.sustain_release, 0x22);
        assert_eq!(target.wave_index, 0x33);
        assert_eq!(target.pulse_index, 0x44);
        assert_eq!(target.filter_index, 0x55);
        assert_eq!(target.flags, 0x66);
    }

    #[test]
    fn reference_instrument_keeps_its_pitch_and_timbre() {
        // instrument 1 starts at wave row 3: pulse wave, one octave up
        let target =
            transform(reference_model(), Metadata::default(), &TransformConfig::default()).unwrap();
        let row = usize::from(target.instruments[1].wave_index);
        assert_eq!(row, 3);
        assert_eq!(target.wave[row].waveform, 0x21);
        assert_eq!(target.wave[row].note_offset, 0x0C);
        // jump rows keep their target in the note column
        assert_eq!(target.wave[5].waveform, sidm2_laxity::WAVE_JUMP);
        assert_eq!(target.wave[5].note_offset, 4);
    }

    #[test]
    fn commands_split_into_nibbles() {
        let cmd = Command {
            opcode: 0x01,
            params: 0x34,
        };
        assert_eq!(
            decompose(cmd),
            Some([(ParameterKind::VibratoDepth, 3), (ParameterKind::VibratoSpeed, 4)])
        );
        assert_eq!(decompose(Command { opcode: 0x06, params: 0x11 }), None);
        assert_eq!(decompose(Command { opcode: 0x00, params: 0 }), None);
    }

    #[test]
    fn repeated_notes_retrigger() {
        assert_eq!(
            gates(&[S::Note(10), S::Note(12), S::End]),
            vec![ON, T::Note(10), OFF, ON, T::Note(12), OFF, T::End]
        );
    }

    #[test]
    fn release_and_tie_are_holds() {
        assert_eq!(
            gates(&[S::Duration(3), S::Note(10), S::Tie, S::Release, S::Note(5), S::End]),
            vec![
                T::SetParameter(ParameterKind::Duration, 3),
                ON,
                T::Note(10),
                T::Hold,
                OFF,
                T::Hold,
                ON,
                T::Note(5),
                OFF,
                T::End,
            ]
        );
    }

    #[test]
    fn missing_terminator_is_added() {
        assert_eq!(gates(&[S::Release]), vec![T::Hold, T::End]);
        assert_eq!(gates(&[]), vec![T::End]);
    }

    #[test]
    fn short_notes_are_legato_below_threshold() {
        let inference = GateInference { legato_threshold: 2 };
        let events = [S::Duration(0), S::Note(1), S::Note(2), S::Duration(4), S::Note(3), S::Note(4), S::End];
        let sequence = infer_gates(&events, &[], inference, |_, _| {});
        assert_eq!(
            sequence.events,
            vec![
                T::SetParameter(ParameterKind::Duration, 0),
                ON,
                T::Note(1),
                ON,
                T::Note(2),
                T::SetParameter(ParameterKind::Duration, 4),
                ON,
                T::Note(3),
                OFF,
                ON,
                T::Note(4),
                OFF,
                T::End,
            ]
        );
    }

    #[test]
    fn unknown_commands_are_dropped_once_with_a_warning() {
        let mut model = reference_model();
        model.sequences[0].events.insert(0, S::Command(3));
        model.sequences[1].events.insert(0, S::Command(3));
        let before = model.diagnostics.warnings().count();
        let target = transform(model, Metadata::default(), &TransformConfig::default()).unwrap();
        assert_eq!(target.diagnostics.warnings().count(), before + 1);
        assert!(target.diagnostics.mentions("command 3 (opcode 0x06)"));
        assert_eq!(target.sequences[0].events[0], T::SetParameter(ParameterKind::Instrument, 0));
    }

    #[test]
    fn tables_are_padded_with_defaults() {
        let target =
            transform(reference_model(), Metadata::default(), &TransformConfig::default()).unwrap();
        assert!(target.instruments[8..].iter().all(|i| *i == TargetInstrument::DEFAULT));
        assert!(target.pulse[16..].iter().all(|r| *r == [0; 3]));
        assert_eq!(target.filter[1], [0x40, 0xF1, 0x1F]);
        assert!(target.sequences.iter().all(|s| s.events.last() == Some(&T::End)));
        assert_eq!(target.speed, 2);
    }

    #[test]
    fn source_tables_invert_the_mapping() {
        let model = reference_model();
        let target = transform(model.clone(), Metadata::default(), &TransformConfig::default())
            .unwrap();
        let tables = source_tables(&target, &model);
        assert_eq!(tables.instruments, model.instruments);
        assert_eq!(tables.wave, model.wave);
        assert_eq!(tables.pulse, model.pulse);
        assert_eq!(tables.filter, model.filter);
        assert_eq!(tables.speed, model.speed);
    }

    #[test]
    fn missing_sequence_is_an_invariant_violation() {
        let mut model = reference_model();
        model.orderlists[2] = OrderList {
            address: None,
            entries: vec![OrderEntry {
                transpose: 0,
                sequence: 99,
            }],
        };
        let err = transform(model, Metadata::default(), &TransformConfig::default()).unwrap_err();
        assert_eq!(err, TransformationError::MissingSequence { voice: 3, index: 99 });
    }

    #[test]
    fn extreme_transpose_is_clamped() {
        let mut model = reference_model();
        model.orderlists[0].entries[0].transpose = -60;
        let target = transform(model, Metadata::default(), &TransformConfig::default()).unwrap();
        assert_eq!(target.orderlists[0][0].transpose, MIN_TRANSPOSE);
        assert!(target.diagnostics.mentions("clamped to -32"));
    }

    #[test]
    fn empty_orderlists_share_a_silent_sequence() {
        let mut model = reference_model();
        let count = model.sequences.len();
        model.orderlists[1].entries.clear();
        model.orderlists[2].entries.clear();
        let target = transform(model, Metadata::default(), &TransformConfig::default()).unwrap();
        assert_eq!(target.sequences.len(), count + 1);
        assert_eq!(target.sequences[count].events, [T::Hold, T::End]);
        assert_eq!(target.orderlists[1], target.orderlists[2]);
        assert_eq!(target.orderlists[1][0].sequence as usize, count);
        assert!(target.diagnostics.mentions("voice 3 has an empty orderlist"));
    }
}
