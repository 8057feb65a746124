//! Accuracy report types.

use std::fmt;

use serde::{Deserialize, Serialize};
use sidm2_common::sid::register_name;

/// One register that differs in a mismatching frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterDiff {
    /// Register index `0..25`.
    pub register: u8,
    /// Value in the original trace.
    pub original: u8,
    /// Value in the candidate trace.
    pub candidate: u8,
}

/// A frame whose register state differs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMismatch {
    /// Frame index.
    pub frame: usize,
    /// Differing registers in index order.
    pub registers: Vec<RegisterDiff>,
}

impl fmt::Display for FrameMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame {}:", self.frame)?;
        for diff in &self.registers {
            write!(
                f,
                " {}={:02X}/{:02X}",
                register_name(diff.register),
                diff.original,
                diff.candidate
            )?;
        }
        Ok(())
    }
}

/// Result of comparing two register traces. All scores are percentages
/// in `[0, 100]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyReport {
    /// Frames each run was asked for.
    pub frames_requested: u32,
    /// Frames completed by the original.
    pub original_frames: usize,
    /// Frames completed by the candidate.
    pub candidate_frames: usize,
    /// Frames compared: the shorter of the two.
    pub compared_frames: usize,
    /// Frames whose complete register state matched.
    pub matching_frames: usize,
    /// `matching_frames / compared_frames`.
    pub frame_accuracy: f64,
    /// Per-voice mean of the frequency, control, envelope and pulse width
    /// group match rates.
    pub voice_accuracy: [f64; 3],
    /// Mean per-register match rate over all 25 registers.
    pub register_accuracy: f64,
    /// Mean match rate of the filter and volume registers.
    pub filter_accuracy: f64,
    /// Weighted total.
    pub overall: f64,
    /// Whether either run stopped early.
    pub truncated: bool,
    /// Why runs stopped early, original first.
    pub faults: Vec<String>,
    /// The first mismatching frames.
    pub mismatches: Vec<FrameMismatch>,
}

impl AccuracyReport {
    /// Weight of the frame accuracy in [`AccuracyReport::overall`].
    pub const FRAME_WEIGHT: f64 = 0.40;
    /// Weight of the mean voice accuracy.
    pub const VOICE_WEIGHT: f64 = 0.30;
    /// Weight of the register accuracy.
    pub const REGISTER_WEIGHT: f64 = 0.20;
    /// Weight of the filter accuracy.
    pub const FILTER_WEIGHT: f64 = 0.10;

    /// Weighted total of the sub-scores, clamped to `[0, 100]`.
    pub fn weighted(
        frame: f64,
        voices: &[f64; 3],
        register: f64,
        filter: f64,
    ) -> f64 {
        let voice = voices.iter().sum::<f64>() / voices.len() as f64;
        (Self::FRAME_WEIGHT * frame
            + Self::VOICE_WEIGHT * voice
            + Self::REGISTER_WEIGHT * register
            + Self::FILTER_WEIGHT * filter)
            .clamp(0.0, 100.0)
    }

    /// Whether the candidate reaches both thresholds.
    pub fn passes(&self, min_overall: f64, min_frame_accuracy: f64) -> bool {
        self.overall >= min_overall && self.frame_accuracy >= min_frame_accuracy
    }
}

impl fmt::Display for AccuracyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "overall {:.2}%  frames {:.2}% ({}/{})  registers {:.2}%  filter {:.2}%",
            self.overall,
            self.frame_accuracy,
            self.matching_frames,
            self.compared_frames,
            self.register_accuracy,
            self.filter_accuracy
        )?;
        writeln!(
            f,
            "voices {:.2}% / {:.2}% / {:.2}%",
            self.voice_accuracy[0], self.voice_accuracy[1], self.voice_accuracy[2]
        )?;
        if self.original_frames != self.candidate_frames {
            writeln!(
                f,
                "trace lengths differ: original {}, candidate {}",
                self.original_frames, self.candidate_frames
            )?;
        }
        for fault in &self.faults {
            writeln!(f, "truncated: {fault}")?;
        }
        for mismatch in &self.mismatches {
            writeln!(f, "{mismatch}")?;
        }
        Ok(())
    }
}
