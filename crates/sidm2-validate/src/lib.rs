//! Accuracy validation of converted SID players.
//!
//! Both programs run through the same emulator for the same number of
//! frames; the cumulative register state at the end of every frame is
//! compared. Frame, voice, register and filter accuracies are combined
//! into a weighted overall score.
//!
//! ```no_run
//! use sidm2_cpu::{EmulatorConfig, SidProgram};
//!
//! # fn run(original: SidProgram, candidate: SidProgram) {
//! let report = sidm2_validate::validate(&original, &candidate, 300, &EmulatorConfig::default());
//! println!("{report}");
//! assert!(report.overall <= 100.0);
//! # }
//! ```

#![warn(missing_docs)]

mod report;

pub use report::{AccuracyReport, FrameMismatch, RegisterDiff};

use sidm2_common::sid::{
    ATTACK_DECAY, CONTROL, FILTER_REGISTERS, FREQ_HI, FREQ_LO, PW_HI, PW_LO, REGISTER_COUNT,
    SUSTAIN_RELEASE, voice_register,
};
use sidm2_common::{RegisterSnapshot, Trace};
use sidm2_cpu::{Emulator, EmulatorConfig, SidProgram};

/// Default number of frames compared.
pub const DEFAULT_FRAMES: u32 = 300;
/// Mismatching frames listed in a report.
pub const MAX_REPORTED_MISMATCHES: usize = 16;

/// Voice register groups; a group matches when all its registers match.
const VOICE_GROUPS: [&[u8]; 4] = [
    &[FREQ_LO, FREQ_HI],
    &[CONTROL],
    &[ATTACK_DECAY, SUSTAIN_RELEASE],
    &[PW_LO, PW_HI],
];

fn percent(hits: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        hits as f64 * 100.0 / total as f64
    }
}

/// Run both programs and compare their traces.
pub fn validate(
    original: &SidProgram,
    candidate: &SidProgram,
    frames: u32,
    config: &EmulatorConfig,
) -> AccuracyReport {
    let a = Emulator::trace(original, frames, config);
    let b = Emulator::trace(candidate, frames, config);
    compare_traces(&a, &b)
}

/// Compare two finished traces.
pub fn compare_traces(original: &Trace, candidate: &Trace) -> AccuracyReport {
    let a = original.register_snapshots();
    let b = candidate.register_snapshots();
    let compared = a.len().min(b.len());
    let pairs: Vec<(&RegisterSnapshot, &RegisterSnapshot)> = a.iter().zip(&b).collect();

    let mut register_hits = [0usize; REGISTER_COUNT];
    let mut group_hits = [[0usize; VOICE_GROUPS.len()]; 3];
    let mut matching = 0;
    let mut mismatches = Vec::new();
    for (frame, (x, y)) in pairs.iter().enumerate() {
        for reg in 0..REGISTER_COUNT {
            if x[reg] == y[reg] {
                register_hits[reg] += 1;
            }
        }
        for (voice, hits) in group_hits.iter_mut().enumerate() {
            for (group, regs) in VOICE_GROUPS.iter().enumerate() {
                let same = regs.iter().all(|&r| {
                    let reg = usize::from(voice_register(voice, r));
                    x[reg] == y[reg]
                });
                if same {
                    hits[group] += 1;
                }
            }
        }
        if x == y {
            matching += 1;
        } else if mismatches.len() < MAX_REPORTED_MISMATCHES {
            let registers = (0..REGISTER_COUNT)
                .filter(|&reg| x[reg] != y[reg])
                .map(|reg| RegisterDiff {
                    register: reg as u8,
                    original: x[reg],
                    candidate: y[reg],
                })
                .collect();
            mismatches.push(FrameMismatch { frame, registers });
        }
    }

    let (frame_accuracy, voice_accuracy, register_accuracy, filter_accuracy) = if compared == 0 {
        // nothing to compare: equal lengths agree, anything else does not
        let score = if a.len() == b.len() { 100.0 } else { 0.0 };
        (score, [score; 3], score, score)
    } else {
        let voices = group_hits.map(|hits| {
            hits.iter().map(|&h| percent(h, compared)).sum::<f64>() / hits.len() as f64
        });
        let registers = register_hits
            .iter()
            .map(|&h| percent(h, compared))
            .sum::<f64>()
            / REGISTER_COUNT as f64;
        let filter = FILTER_REGISTERS
            .iter()
            .map(|&r| percent(register_hits[usize::from(r)], compared))
            .sum::<f64>()
            / FILTER_REGISTERS.len() as f64;
        (percent(matching, compared), voices, registers, filter)
    };
    let overall =
        AccuracyReport::weighted(frame_accuracy, &voice_accuracy, register_accuracy, filter_accuracy);

    let faults: Vec<String> = [original.fault(), candidate.fault()]
        .into_iter()
        .zip(["original", "candidate"])
        .filter_map(|(fault, side)| fault.map(|f| format!("{side}: {f}")))
        .collect();
    if a.len() != b.len() {
        tracing::warn!(
            original = a.len(),
            candidate = b.len(),
            "trace lengths differ; scoring the common prefix"
        );
    }
    for fault in &faults {
        tracing::warn!(%fault, "trace truncated");
    }
    tracing::debug!(overall, frame_accuracy, compared, "traces compared");

    AccuracyReport {
        frames_requested: original.frames_requested().max(candidate.frames_requested()),
        original_frames: a.len(),
        candidate_frames: b.len(),
        compared_frames: compared,
        matching_frames: matching,
        frame_accuracy,
        voice_accuracy,
        register_accuracy,
        filter_accuracy,
        overall,
        truncated: original.is_truncated() || candidate.is_truncated(),
        faults,
        mismatches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;
    use sidm2_common::{Address, Fault, RegisterWrite};

    fn trace_of(frames: &[&[(u8, u8)]]) -> Trace {
        let mut trace = Trace::new(frames.len() as u32);
        for (frame, writes) in frames.iter().enumerate() {
            let start = trace.writes().len();
            for &(register, value) in writes.iter() {
                trace.push(RegisterWrite {
                    frame: frame as u32,
                    cycle: 0,
                    register,
                    value,
                });
            }
            trace.close_frame(start);
        }
        trace
    }

    #[test]
    fn self_comparison_is_perfect() {
        let trace = trace_of(&[&[(0, 1), (4, 0x41)], &[(1, 2)], &[(0x18, 0x0F)]]);
        let report = compare_traces(&trace, &trace);
        assert_abs_diff_eq!(report.frame_accuracy, 100.0);
        assert_abs_diff_eq!(report.overall, 100.0);
        assert!(report.mismatches.is_empty());
        assert!(!report.truncated);
    }

    #[test]
    fn one_wrong_control_value_costs_one_frame() {
        let a = trace_of(&[&[(4, 0x41)], &[(4, 0x40)], &[], &[]]);
        let b = trace_of(&[&[(4, 0x41)], &[(4, 0x41)], &[(4, 0x40)], &[]]);
        let report = compare_traces(&a, &b);
        assert_eq!(report.matching_frames, 3);
        assert_abs_diff_eq!(report.frame_accuracy, 75.0);
        // voice 1 control group: 3 of 4 frames; others perfect
        assert_abs_diff_eq!(report.voice_accuracy[0], (100.0 * 3.0 + 75.0) / 4.0);
        assert_abs_diff_eq!(report.voice_accuracy[1], 100.0);
        assert_abs_diff_eq!(report.filter_accuracy, 100.0);
        assert_eq!(report.mismatches.len(), 1);
        assert_eq!(report.mismatches[0].frame, 1);
        assert_eq!(report.mismatches[0].registers, [RegisterDiff {
            register: 4,
            original: 0x40,
            candidate: 0x41,
        }]);
    }

    #[test]
    fn shorter_trace_limits_the_comparison() {
        let a = trace_of(&[&[(0, 1)], &[], &[]]);
        let mut b = trace_of(&[&[(0, 1)]]);
        b.halt(Fault::ExecutionAtZero {
            frame: 1,
            from: Address(0x1234),
        });
        let report = compare_traces(&a, &b);
        assert_eq!(report.compared_frames, 1);
        assert_abs_diff_eq!(report.frame_accuracy, 100.0);
        assert!(report.truncated);
        assert_eq!(report.faults.len(), 1);
        assert!(report.faults[0].starts_with("candidate"));
    }

    #[test]
    fn nothing_compared_scores_by_length() {
        let empty = Trace::new(0);
        assert_abs_diff_eq!(compare_traces(&empty, &empty).overall, 100.0);
        let one = trace_of(&[&[]]);
        assert_abs_diff_eq!(compare_traces(&one, &empty).overall, 0.0);
    }

    proptest! {
        #[test]
        fn scores_stay_in_range(
            a in prop::collection::vec(prop::collection::vec((0u8..25, any::<u8>()), 0..6), 0..12),
            b in prop::collection::vec(prop::collection::vec((0u8..25, any::<u8>()), 0..6), 0..12),
        ) {
            let a: Vec<&[(u8, u8)]> = a.iter().map(Vec::as_slice).collect();
            let b: Vec<&[(u8, u8)]> = b.iter().map(Vec::as_slice).collect();
            let report = compare_traces(&trace_of(&a), &trace_of(&b));
            for score in [
                report.overall,
                report.frame_accuracy,
                report.register_accuracy,
                report.filter_accuracy,
                report.voice_accuracy[0],
                report.voice_accuracy[1],
                report.voice_accuracy[2],
            ] {
                prop_assert!((0.0..=100.0).contains(&score));
            }
            let same = compare_traces(&trace_of(&a), &trace_of(&a));
            prop_assert_eq!(same.frame_accuracy, 100.0);
        }
    }
}
