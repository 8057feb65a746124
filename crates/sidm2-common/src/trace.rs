//! SID register write traces.

use serde::{Deserialize, Serialize};

use crate::Fault;
use crate::sid::REGISTER_COUNT;

/// A single store to a SID register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegisterWrite {
    /// Frame the write happened in (init writes belong to frame 0).
    pub frame: u32,
    /// CPU cycle inside the frame.
    pub cycle: u32,
    /// Register index `0..25`.
    pub register: u8,
    /// Value written.
    pub value: u8,
}

/// Complete register state after a frame.
pub type RegisterSnapshot = [u8; REGISTER_COUNT];

/// Append-only log of register writes with a per-frame index.
///
/// A trace is built by one emulation run and is read-only afterwards.
/// When the run faulted the trace is truncated at the faulting frame and
/// [`Trace::fault`] says why.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Trace {
    writes: Vec<RegisterWrite>,
    /// Start offset into `writes` for each completed frame.
    frame_offsets: Vec<usize>,
    frames_requested: u32,
    fault: Option<Fault>,
}

impl Trace {
    /// Empty trace expecting `frames_requested` frames.
    pub fn new(frames_requested: u32) -> Self {
        Self {
            writes: Vec::new(),
            frame_offsets: Vec::with_capacity(frames_requested as usize),
            frames_requested,
            fault: None,
        }
    }

    /// Record a write belonging to the frame currently being built.
    pub fn push(&mut self, write: RegisterWrite) {
        self.writes.push(write);
    }

    /// Close the current frame. `frame_start` is the number of writes that
    /// were recorded before the frame began.
    pub fn close_frame(&mut self, frame_start: usize) {
        self.frame_offsets.push(frame_start.min(self.writes.len()));
    }

    /// Mark the trace as truncated by a fault. Writes recorded for the
    /// unfinished frame are discarded.
    pub fn halt(&mut self, fault: Fault) {
        let keep = self.completed_write_count();
        self.writes.truncate(keep);
        self.fault = Some(fault);
    }

    /// Number of writes belonging to completed frames.
    fn completed_write_count(&self) -> usize {
        self.writes
            .iter()
            .take_while(|w| (w.frame as usize) < self.frame_offsets.len())
            .count()
    }

    /// All writes in recording order.
    pub fn writes(&self) -> &[RegisterWrite] {
        &self.writes
    }

    /// Writes of one completed frame.
    pub fn frame_writes(&self, frame: usize) -> &[RegisterWrite] {
        let Some(&start) = self.frame_offsets.get(frame) else {
            return &[];
        };
        let end = self
            .frame_offsets
            .get(frame + 1)
            .copied()
            .unwrap_or(self.writes.len());
        &self.writes[start..end]
    }

    /// Number of writes per completed frame.
    pub fn writes_per_frame(&self) -> Vec<usize> {
        (0..self.frames_completed())
            .map(|f| self.frame_writes(f).len())
            .collect()
    }

    /// Number of frames that completed.
    pub fn frames_completed(&self) -> usize {
        self.frame_offsets.len()
    }

    /// Number of frames the caller asked for.
    pub fn frames_requested(&self) -> u32 {
        self.frames_requested
    }

    /// Fault that stopped the run early, if any.
    pub fn fault(&self) -> Option<&Fault> {
        self.fault.as_ref()
    }

    /// Whether fewer frames completed than requested.
    pub fn is_truncated(&self) -> bool {
        self.fault.is_some() || self.frames_completed() < self.frames_requested as usize
    }

    /// Cumulative register state at the end of every completed frame,
    /// starting from an all-zero chip.
    pub fn register_snapshots(&self) -> Vec<RegisterSnapshot> {
        let mut state = [0u8; REGISTER_COUNT];
        (0..self.frames_completed())
            .map(|frame| {
                for write in self.frame_writes(frame) {
                    if let Some(slot) = state.get_mut(write.register as usize) {
                        *slot = write.value;
                    }
                }
                state
            })
            .collect()
    }
}
