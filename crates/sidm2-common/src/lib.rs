//! Shared data model for the SIDM2 conversion core.
//!
//! Every pipeline stage (container parser, extractor, transformation,
//! packer, validator) exchanges the types defined here:
//!
//! - [`Address`] - a 6502 address, kept distinct from plain byte offsets
//! - [`MemoryImage`] - a loadable byte buffer with its load address
//! - [`RegisterWrite`] / [`Trace`] - the per-frame SID register log
//! - [`Diagnostics`] - non-fatal findings carried forward between stages
//!
//! All of these are produced once by a single stage and only read
//! afterwards, so independent files can be processed in parallel without
//! any shared mutable state.

#![warn(missing_docs)]

mod address;
mod diagnostics;
mod fault;
mod image;
pub mod sid;
mod trace;

pub use address::Address;
pub use diagnostics::{Diagnostic, Diagnostics, Severity, Stage};
pub use fault::Fault;
pub use image::MemoryImage;
pub use trace::{RegisterSnapshot, RegisterWrite, Trace};

// ============================================================================
// Common Constants
// ============================================================================

/// CPU cycles per PAL frame (312 raster lines x 63 cycles).
pub const PAL_CYCLES_PER_FRAME: u32 = 19_656;

/// CPU cycles per NTSC frame (263 raster lines x 65 cycles).
pub const NTSC_CYCLES_PER_FRAME: u32 = 17_095;

/// PAL frame rate in Hz.
pub const FRAME_RATE_PAL: u32 = 50;

/// NTSC frame rate in Hz.
pub const FRAME_RATE_NTSC: u32 = 60;

/// Number of voices on one SID chip.
pub const VOICE_COUNT: usize = 3;
