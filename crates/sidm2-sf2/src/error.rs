//! Error types for transformation and packing.

use sidm2_common::{Address, Fault};
use sidm2_cpu::AsmError;
use sidm2_laxity::ExtractionError;
use thiserror::Error;

use crate::layout::TargetDriver;

/// Result alias for packing and reading target images.
pub type Result<T> = std::result::Result<T, PackError>;

/// Internal invariant violations of the transformation.
///
/// A decoded source model never triggers these; they indicate a model
/// assembled by hand or a defect upstream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformationError {
    /// An orderlist entry points past the sequence list.
    #[error("voice {voice} orderlist references missing sequence {index}")]
    MissingSequence {
        /// Voice number (1-based).
        voice: usize,
        /// Referenced sequence index.
        index: usize,
    },
    /// The target format addresses at most 128 sequences.
    #[error("{count} sequences exceed the target limit of 128")]
    TooManySequences {
        /// Sequence count.
        count: usize,
    },
}

/// Failure to build, relocate, verify or read a target image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackError {
    /// The template does not cover its fixed table blocks.
    #[error("template of {len} bytes is smaller than its layout ({needed} bytes)")]
    TemplateTooSmall {
        /// Template length.
        len: usize,
        /// Bytes the layout requires.
        needed: usize,
    },
    /// A block of the model does not fit its fixed slot.
    #[error("{block} needs {needed} bytes, capacity is {capacity}")]
    CapacityExceeded {
        /// Block name.
        block: &'static str,
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        capacity: usize,
    },
    /// The packed image would not fit the 64 KiB address space, or a load
    /// address is unusable.
    #[error("address {address} out of range")]
    AddressOutOfRange {
        /// Offending address.
        address: Address,
    },
    /// The packed binary faulted while being re-emulated.
    #[error("self-check of image at {load} failed: {fault}")]
    SelfCheck {
        /// Fault raised during the check.
        fault: Fault,
        /// Load address of the checked image.
        load: Address,
    },
    /// The bytes are not a packed target image.
    #[error("not a target image at {address}: {reason}")]
    NotATargetImage {
        /// Address where decoding stopped.
        address: Address,
        /// What was wrong.
        reason: String,
    },
    /// The model breaks an invariant the writers rely on.
    #[error("invalid target model: {0}")]
    InvalidModel(String),
    /// A driver template failed to assemble.
    #[error("driver template: {0}")]
    Template(#[from] AsmError),
    /// The driver keeps the player's own tables and has no template.
    #[error("driver {driver} has no table template")]
    NoTemplate {
        /// Requested driver.
        driver: TargetDriver,
    },
    /// Writing a table back into relocated player code failed.
    #[error("player tables: {0}")]
    NativeTable(#[from] ExtractionError),
}

impl PackError {
    /// Address involved in the error, when there is one.
    pub fn address(&self) -> Option<Address> {
        match self {
            PackError::AddressOutOfRange { address } => Some(*address),
            PackError::SelfCheck { fault, .. } => Some(fault.address()),
            PackError::NotATargetImage { address, .. } => Some(*address),
            PackError::NativeTable(err) => Some(err.address()),
            _ => None,
        }
    }
}
