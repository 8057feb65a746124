//! Error types for source extraction.

use sidm2_common::Address;
use thiserror::Error;

/// Convenient result alias for extraction.
pub type Result<T> = std::result::Result<T, ExtractionError>;

/// Failure to locate or decode the player tables.
///
/// Out-of-range pointers and indices are not errors: they degrade to empty
/// sequences or clamped indices with a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    /// None of the resolution tiers found the table block.
    #[error("no NewPlayer v21 table layout found in image at {load}")]
    LayoutNotFound {
        /// Image load address.
        load: Address,
    },
    /// A table lies (partly) outside the image.
    #[error("{table} table at {address} lies outside the image")]
    TableOutOfRange {
        /// Table name.
        table: &'static str,
        /// Table start address.
        address: Address,
    },
}

impl ExtractionError {
    /// Address involved in the error.
    pub fn address(&self) -> Address {
        match self {
            ExtractionError::LayoutNotFound { load } => *load,
            ExtractionError::TableOutOfRange { address, .. } => *address,
        }
    }
}
