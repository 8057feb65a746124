//! SIDM2 conversion core.
//!
//! Converts Laxity NewPlayer v21 tunes in PSID/RSID containers into
//! SF2-style driver images, exports packed images back to PSID, and scores
//! any conversion against its original by emulating both and comparing
//! SID register state frame by frame.
//!
//! # Operations
//! - [`convert`]: container (or packed PRG) in, packed image out
//! - [`export_back`]: packed PRG in, PSID out
//! - [`trace`]: register write trace of any input
//! - [`score`]: [`AccuracyReport`] for an original/candidate pair
//!
//! Every call takes an explicit [`ConversionConfig`]; there is no global
//! state, so files can be converted in parallel.
//!
//! # Quick start
//! ```no_run
//! use sidm2::{ConversionConfig, DriverSelector, convert, score};
//!
//! let config = ConversionConfig::default();
//! let original = std::fs::read("tune.sid").unwrap();
//! let converted = convert(&original, DriverSelector::Auto, &config).unwrap();
//! for warning in converted.diagnostics.warnings() {
//!     eprintln!("{warning}");
//! }
//! let exported = sidm2::export_back(&converted.to_prg()).unwrap();
//! let report = score(&original, &exported, None, &config).unwrap();
//! println!("{report}");
//! ```

#![warn(missing_docs)]

mod config;
mod detect;
mod error;
mod pipeline;

pub use config::ConversionConfig;
pub use detect::{DriverSelector, Input, SourceFormat, detect};
pub use error::{ConversionError, Result};
pub use pipeline::{Conversion, ConversionContext, convert, export_back, score, trace};

pub use sidm2_common::{Address, Diagnostic, Diagnostics, Fault, MemoryImage, Stage, Trace};
pub use sidm2_cpu::{EmulatorConfig, VideoStandard};
pub use sidm2_sf2::{PackError, TargetDriver};
pub use sidm2_validate::AccuracyReport;
