//! Error types for container parsing.

use sidm2_common::Address;
use thiserror::Error;

/// Convenient result alias for container operations.
pub type Result<T> = std::result::Result<T, FormatError>;

/// Malformed or unsupported container.
///
/// Always fatal for the file it was raised for.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// The file does not start with `PSID` or `RSID`.
    #[error("not a PSID/RSID file (magic {found:02X?})")]
    BadMagic {
        /// The first four bytes.
        found: [u8; 4],
    },
    /// The buffer ends before a required field or the data block.
    #[error("truncated container: needed {needed} bytes, got {actual}")]
    Truncated {
        /// Bytes required to continue.
        needed: usize,
        /// Bytes available.
        actual: usize,
    },
    /// An entry point lies outside the loaded image.
    #[error("{field} address {address} outside image {load}..${end:04X}")]
    InconsistentAddresses {
        /// Header field (`init` or `play`).
        field: &'static str,
        /// Declared address.
        address: Address,
        /// Image load address.
        load: Address,
        /// One past the last image byte.
        end: u32,
    },
    /// Header version outside 1..=4.
    #[error("unsupported container version {version}")]
    UnsupportedVersion {
        /// Declared version.
        version: u16,
    },
    /// The data block starts inside the header.
    #[error("data offset {offset:#06x} lies inside the {header_len} byte header")]
    BadDataOffset {
        /// Declared data offset.
        offset: u16,
        /// Header length for the declared version.
        header_len: usize,
    },
    /// The data block holds no bytes after the load address.
    #[error("container holds no program data")]
    EmptyImage,
}

impl FormatError {
    /// Address involved in the error, if any.
    pub fn address(&self) -> Option<Address> {
        match self {
            FormatError::InconsistentAddresses { address, .. } => Some(*address),
            _ => None,
        }
    }

    /// Byte offset into the file involved in the error, if any.
    pub fn offset(&self) -> Option<usize> {
        match self {
            FormatError::Truncated { actual, .. } => Some(*actual),
            FormatError::BadMagic { .. } => Some(0),
            FormatError::BadDataOffset { .. } => Some(0x06),
            _ => None,
        }
    }
}
