//! PSID/RSID container support.
//!
//! [`parse`] turns a `.sid` file into a [`SidHeader`] and a
//! [`MemoryImage`](sidm2_common::MemoryImage) mapped at the effective load
//! address; [`write_psid`] produces a PSID v2 file from the same pair.
//!
//! ```
//! use sidm2_psid::{FormatError, parse};
//!
//! assert!(matches!(parse(&[0u8; 10]), Err(FormatError::Truncated { .. })));
//! ```

#![warn(missing_docs)]

pub mod error;
mod header;
mod parser;
mod writer;

pub use error::{FormatError, Result};
pub use header::{
    Clock, HEADER_V1_LEN, HEADER_V2_LEN, Magic, STRING_FIELD_LEN, SidHeader, decode_string,
    encode_string,
};
pub use parser::{is_sid_container, parse};
pub use writer::write_psid;
