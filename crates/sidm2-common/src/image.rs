//! Loadable memory images.

use crate::Address;

/// Size of the 6502 address space.
const ADDRESS_SPACE: usize = 0x1_0000;

/// A byte buffer mapped at a load address.
///
/// The image never extends past `$FFFF`; constructors truncate anything
/// beyond the end of the address space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryImage {
    load: Address,
    bytes: Vec<u8>,
}

impl MemoryImage {
    /// Create an image, truncating data that would run past `$FFFF`.
    pub fn new(load: Address, mut bytes: Vec<u8>) -> Self {
        let max_len = ADDRESS_SPACE - load.get() as usize;
        bytes.truncate(max_len);
        Self { load, bytes }
    }

    /// Create a zero-filled image of `len` bytes.
    pub fn zeroed(load: Address, len: usize) -> Self {
        Self::new(load, vec![0; len])
    }

    /// Address of the first byte.
    #[inline]
    pub fn load(&self) -> Address {
        self.load
    }

    /// Number of bytes in the image.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the image holds no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// One past the last mapped address, as a 32-bit value so an image
    /// ending exactly at `$FFFF` stays representable.
    #[inline]
    pub fn end(&self) -> u32 {
        self.load.get() as u32 + self.bytes.len() as u32
    }

    /// Whether `addr` lies in `[load, load + len)`.
    #[inline]
    pub fn contains(&self, addr: Address) -> bool {
        addr >= self.load && (addr.get() as u32) < self.end()
    }

    /// Offset of `addr` inside the image.
    #[inline]
    pub fn offset_of(&self, addr: Address) -> Option<usize> {
        if self.contains(addr) {
            addr.offset_from(self.load)
        } else {
            None
        }
    }

    /// Address of the byte at `offset` (which may equal `len()`).
    #[inline]
    pub fn address_of(&self, offset: usize) -> Address {
        self.load.wrapping_add(offset as u16)
    }

    /// Raw bytes.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Mutable raw bytes.
    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Consume the image, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Read one byte at an absolute address.
    pub fn read_u8(&self, addr: Address) -> Option<u8> {
        self.offset_of(addr).map(|off| self.bytes[off])
    }

    /// Read a little-endian word at an absolute address.
    pub fn read_u16_le(&self, addr: Address) -> Option<u16> {
        let lo = self.read_u8(addr)?;
        let hi = self.read_u8(addr.wrapping_add(1))?;
        Some(u16::from_le_bytes([lo, hi]))
    }

    /// Borrow `len` bytes starting at an absolute address.
    pub fn slice(&self, addr: Address, len: usize) -> Option<&[u8]> {
        let start = self.offset_of(addr)?;
        self.bytes.get(start..start.checked_add(len)?)
    }

    /// Borrow `len` bytes starting at an offset.
    pub fn slice_at(&self, offset: usize, len: usize) -> Option<&[u8]> {
        self.bytes.get(offset..offset.checked_add(len)?)
    }

    /// Write bytes at an offset, growing the image (zero-filled) when needed.
    ///
    /// Returns `false` when the write would cross the end of the address
    /// space.
    pub fn write_at(&mut self, offset: usize, data: &[u8]) -> bool {
        let end = offset + data.len();
        if self.load.get() as usize + end > ADDRESS_SPACE {
            return false;
        }
        if end > self.bytes.len() {
            self.bytes.resize(end, 0);
        }
        self.bytes[offset..end].copy_from_slice(data);
        true
    }

    /// Resize the image, zero-filling new bytes.
    pub fn resize(&mut self, len: usize) {
        let max_len = ADDRESS_SPACE - self.load.get() as usize;
        self.bytes.resize(len.min(max_len), 0);
    }

    /// Re-map the image at a different load address without touching
    /// its contents.
    pub fn rebase(&mut self, load: Address) {
        self.load = load;
        let max_len = ADDRESS_SPACE - load.get() as usize;
        self.bytes.truncate(max_len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_is_half_open() {
        let image = MemoryImage::new(Address(0x1000), vec![0; 0x100]);
        assert!(image.contains(Address(0x1000)));
        assert!(image.contains(Address(0x10FF)));
        assert!(!image.contains(Address(0x1100)));
        assert!(!image.contains(Address(0x0FFF)));
    }

    #[test]
    fn image_is_truncated_at_top_of_memory() {
        let image = MemoryImage::new(Address(0xFFF0), vec![0xAA; 0x40]);
        assert_eq!(image.len(), 0x10);
        assert_eq!(image.end(), 0x1_0000);
        assert!(image.contains(Address(0xFFFF)));
    }

    #[test]
    fn reads_are_bounds_checked() {
        let image = MemoryImage::new(Address(0x2000), vec![0x34, 0x12, 0x99]);
        assert_eq!(image.read_u16_le(Address(0x2000)), Some(0x1234));
        assert_eq!(image.read_u16_le(Address(0x2002)), None);
        assert_eq!(image.slice(Address(0x2001), 2), Some(&[0x12, 0x99][..]));
        assert_eq!(image.slice(Address(0x2001), 3), None);
    }

    #[test]
    fn write_at_grows_the_image() {
        let mut image = MemoryImage::zeroed(Address(0x1000), 4);
        assert!(image.write_at(6, &[1, 2]));
        assert_eq!(image.bytes(), &[0, 0, 0, 0, 0, 0, 1, 2]);
        assert!(!MemoryImage::zeroed(Address(0xFFFE), 0).write_at(0, &[1, 2, 3]));
    }
}
