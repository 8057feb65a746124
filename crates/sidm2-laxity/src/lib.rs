//! Laxity NewPlayer v21 extraction.
//!
//! Locates the player's table block inside a container image, decodes
//! instruments, wave/pulse/filter tables, the command table, orderlists
//! and sequences into a [`SourceModel`], and writes tables back in the
//! player's own layout.
//!
//! ```no_run
//! use sidm2_laxity::extract;
//!
//! let bytes = std::fs::read("tune.sid").unwrap();
//! let (header, image) = sidm2_psid::parse(&bytes).unwrap();
//! let model = extract(&header, &image).unwrap();
//! println!("{} sequences, speed {}", model.sequences.len(), model.speed);
//! for d in model.diagnostics.warnings() {
//!     println!("{d}");
//! }
//! ```

#![warn(missing_docs)]

mod decode;
mod error;
mod extract;
pub mod layout;
mod locate;
mod model;
pub mod native;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use decode::{MAX_ORDER_ENTRIES, ORDER_END};
pub use error::{ExtractionError, Result};
pub use extract::{ExtractConfig, extract, extract_with, sid_program};
pub use layout::{LayoutResolution, Np21Layout};
pub use model::{
    Command, OrderEntry, OrderList, SourceEvent, SourceInstrument, SourceModel, SourceSequence,
    TableRow, WAVE_JUMP, WaveTable, encode_sequence,
};
