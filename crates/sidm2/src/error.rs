//! Conversion errors.

use sidm2_common::{Address, Stage};
use sidm2_laxity::ExtractionError;
use sidm2_psid::FormatError;
use sidm2_sf2::{PackError, TargetDriver, TransformationError};
use thiserror::Error;

use crate::detect::SourceFormat;

/// Result alias for the conversion pipeline.
pub type Result<T> = std::result::Result<T, ConversionError>;

/// A fatal error for one input file.
///
/// [`ConversionError::stage`] and [`ConversionError::address`] locate the
/// failure well enough to reproduce it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    /// Malformed container.
    #[error("container: {0}")]
    Format(#[from] FormatError),
    /// Source tables could not be located.
    #[error("extraction: {0}")]
    Extraction(#[from] ExtractionError),
    /// Internal invariant violation in the transformation.
    #[error("transformation: {0}")]
    Transformation(#[from] TransformationError),
    /// Packing, relocation, self-check or target decoding failed.
    #[error("packing: {0}")]
    Pack(#[from] PackError),
    /// The requested driver cannot encode this source.
    #[error("driver selection: a {format} source cannot be converted with the {driver} driver")]
    UnsupportedSource {
        /// Detected source format.
        format: SourceFormat,
        /// Requested driver.
        driver: TargetDriver,
    },
}

impl ConversionError {
    /// Pipeline stage that failed.
    pub fn stage(&self) -> Stage {
        match self {
            ConversionError::Format(_) => Stage::Container,
            ConversionError::Extraction(_) => Stage::Extraction,
            ConversionError::Transformation(_) | ConversionError::UnsupportedSource { .. } => {
                Stage::Transformation
            }
            ConversionError::Pack(_) => Stage::Packing,
        }
    }

    /// Address involved in the failure, when there is one.
    pub fn address(&self) -> Option<Address> {
        match self {
            ConversionError::Format(err) => err.address(),
            ConversionError::Extraction(err) => Some(err.address()),
            ConversionError::Transformation(_) | ConversionError::UnsupportedSource { .. } => None,
            ConversionError::Pack(err) => err.address(),
        }
    }

    /// Byte offset into the input file, for container errors.
    pub fn offset(&self) -> Option<usize> {
        match self {
            ConversionError::Format(err) => err.offset(),
            _ => None,
        }
    }
}
