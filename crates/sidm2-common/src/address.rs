//! 16-bit 6502 address newtype.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An address in the 64 KiB 6502 address space.
///
/// Offsets into a [`crate::MemoryImage`] are plain `usize`; converting
/// between the two always goes through the image's load address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub u16);

impl Address {
    /// Zero page start; executing here is always a fault.
    pub const ZERO: Address = Address(0);

    /// Build an address from little-endian bytes.
    #[inline]
    pub const fn from_le_bytes(lo: u8, hi: u8) -> Self {
        Address(u16::from_le_bytes([lo, hi]))
    }

    /// Raw value.
    #[inline]
    pub const fn get(self) -> u16 {
        self.0
    }

    /// Low byte.
    #[inline]
    pub const fn lo(self) -> u8 {
        self.0 as u8
    }

    /// High byte.
    #[inline]
    pub const fn hi(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Add an offset, wrapping around the 64 KiB space.
    #[inline]
    pub const fn wrapping_add(self, offset: u16) -> Self {
        Address(self.0.wrapping_add(offset))
    }

    /// Add a signed delta, wrapping around the 64 KiB space.
    #[inline]
    pub const fn wrapping_offset(self, delta: i32) -> Self {
        Address((self.0 as i32).wrapping_add(delta) as u16)
    }

    /// Byte offset of `self` relative to `base`, if `self >= base`.
    #[inline]
    pub fn offset_from(self, base: Address) -> Option<usize> {
        self.0.checked_sub(base.0).map(usize::from)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:04X}", self.0)
    }
}

impl From<u16> for Address {
    fn from(value: u16) -> Self {
        Address(value)
    }
}

impl From<Address> for u16 {
    fn from(value: Address) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_from_rejects_lower_addresses() {
        let base = Address(0x1000);
        assert_eq!(Address(0x1010).offset_from(base), Some(0x10));
        assert_eq!(Address(0x0FFF).offset_from(base), None);
    }

    #[test]
    fn wrapping_offset_crosses_the_top_of_memory() {
        assert_eq!(Address(0xFFF0).wrapping_offset(0x20), Address(0x0010));
        assert_eq!(Address(0x0010).wrapping_offset(-0x20), Address(0xFFF0));
    }

    #[test]
    fn display_uses_dollar_hex() {
        assert_eq!(Address(0xD418).to_string(), "$D418");
    }
}
