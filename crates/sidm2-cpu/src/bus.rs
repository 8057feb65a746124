//! Memory bus with the SID I/O page mapped in.

use sidm2_common::sid;
use sidm2_common::{Address, MemoryImage};

const MEMORY_SIZE: usize = 0x1_0000;

/// Memory access trait used by [`crate::Cpu`].
///
/// Implementations decide how RAM and memory-mapped I/O are wired.
pub trait Bus {
    /// Read a byte.
    fn read(&mut self, addr: u16) -> u8;

    /// Write a byte.
    fn write(&mut self, addr: u16, value: u8);
}

/// Flat 64 KiB RAM with the SID page (`$D400-$D7FF`) intercepted.
///
/// Stores to the SID page never reach RAM; they are queued as
/// `(register, value)` pairs until the emulator drains them and stamps
/// them with frame and cycle. Reads from the page return 0, which is
/// what write-only registers float to for every player we care about.
pub struct SidBus {
    memory: Box<[u8; MEMORY_SIZE]>,
    pending: Vec<(u8, u8)>,
}

impl SidBus {
    /// Zeroed memory, no pending writes.
    pub fn new() -> Self {
        Self {
            memory: Box::new([0; MEMORY_SIZE]),
            pending: Vec::new(),
        }
    }

    /// Copy an image into RAM at its load address.
    pub fn load_image(&mut self, image: &MemoryImage) {
        let start = image.load().get() as usize;
        let end = (start + image.len()).min(MEMORY_SIZE);
        self.memory[start..end].copy_from_slice(&image.bytes()[..end - start]);
    }

    /// Write bytes directly to RAM, bypassing the I/O page.
    pub fn poke_slice(&mut self, addr: Address, data: &[u8]) {
        let start = addr.get() as usize;
        let end = (start + data.len()).min(MEMORY_SIZE);
        self.memory[start..end].copy_from_slice(&data[..end - start]);
    }

    /// Raw RAM byte (no I/O side effects).
    pub fn peek(&self, addr: u16) -> u8 {
        self.memory[addr as usize]
    }

    /// Raw RAM word, little-endian, wrapping at `$FFFF`.
    pub fn peek_word(&self, addr: u16) -> u16 {
        u16::from_le_bytes([self.peek(addr), self.peek(addr.wrapping_add(1))])
    }

    /// Entire RAM.
    pub fn memory(&self) -> &[u8] {
        &self.memory[..]
    }

    /// Take the SID writes queued since the last call.
    pub fn drain_writes(&mut self) -> std::vec::Drain<'_, (u8, u8)> {
        self.pending.drain(..)
    }

    fn is_sid_page(addr: u16) -> bool {
        (sid::SID_BASE.get() as u32..sid::SID_PAGE_END).contains(&(addr as u32))
    }
}

impl Default for SidBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for SidBus {
    #[inline]
    fn read(&mut self, addr: u16) -> u8 {
        if Self::is_sid_page(addr) {
            0
        } else {
            self.memory[addr as usize]
        }
    }

    #[inline]
    fn write(&mut self, addr: u16, value: u8) {
        if Self::is_sid_page(addr) {
            if let Some(reg) = sid::register_for_address(Address(addr)) {
                self.pending.push((reg, value));
            }
            return;
        }
        self.memory[addr as usize] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sid_writes_are_queued_not_stored() {
        let mut bus = SidBus::new();
        bus.write(0xD418, 0x0F);
        bus.write(0xD41B, 0x55);
        bus.write(0x1000, 0x42);

        assert_eq!(bus.read(0xD418), 0);
        assert_eq!(bus.peek(0xD418), 0);
        assert_eq!(bus.read(0x1000), 0x42);
        let writes: Vec<_> = bus.drain_writes().collect();
        assert_eq!(writes, vec![(0x18, 0x0F)]);
        assert_eq!(bus.drain_writes().count(), 0);
    }

    #[test]
    fn load_image_maps_at_load_address() {
        let mut bus = SidBus::new();
        bus.load_image(&MemoryImage::new(Address(0xFFFE), vec![0x34, 0x12]));
        assert_eq!(bus.peek_word(0xFFFE), 0x1234);
    }
}
