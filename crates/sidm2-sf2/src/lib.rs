//! SF2-style target model, transformation and packing.
//!
//! [`transform`] turns an extracted NewPlayer v21 [`SourceModel`] into a
//! [`TargetModel`]; [`pack`] writes the model into a relocatable table
//! driver, [`pack_laxity_aware`] keeps the original player and rewrites
//! its tables, and [`read_target_model`] reads a packed image back.
//!
//! ```no_run
//! use sidm2_common::{Address, Diagnostics};
//! use sidm2_sf2::{DriverTemplate, Metadata, TargetDriver, TransformConfig, pack, transform};
//!
//! # fn run(source: sidm2_laxity::SourceModel) -> Result<(), Box<dyn std::error::Error>> {
//! let model = transform(source, Metadata::default(), &TransformConfig::default())?;
//! let template = DriverTemplate::assemble(TargetDriver::Driver11)?;
//! let mut diagnostics = Diagnostics::new();
//! let image = pack(&model, &template, Address(0x1000), &mut diagnostics)?;
//! std::fs::write("tune.prg", sidm2_sf2::to_prg(&image))?;
//! # Ok(())
//! # }
//! ```
//!
//! [`SourceModel`]: sidm2_laxity::SourceModel

#![warn(missing_docs)]

pub mod driver;
mod error;
pub mod layout;
mod model;
mod pack;
mod read;
pub mod relocate;
mod transform;

pub use driver::{DriverTemplate, TEMPLATE_BASE, assemble_wrapper};
pub use error::{PackError, Result, TransformationError};
pub use layout::{Block, DriverLayout, HeaderFlags, TargetDriver};
pub use model::{
    DEFAULT_WAVE_ROW, FILTER_ROWS, Gate, INSTRUMENT_COLUMNS, INSTRUMENT_SLOTS, MAX_SEQUENCES,
    Metadata, PULSE_ROWS, ParameterKind, TargetEvent, TargetInstrument, TargetModel,
    TargetOrderEntry, TargetSequence, WAVE_ROWS, WavePair,
};
pub use pack::{from_prg, pack, pack_laxity_aware, self_check, to_prg, wrap_generic};
pub use read::{
    TargetHeader, entry_points, export_header, is_target_image, read_header, read_target_model,
    unwrap_player,
};
pub use transform::{
    COLUMN_SOURCES, GateInference, MAX_TRANSPOSE, MIN_TRANSPOSE, SourceTables, TransformConfig,
    decompose, infer_gates, interleave_wave, permute_instrument, source_tables, transform,
    unpermute_instrument, unzip_wave,
};
