//! Container metadata.

use serde::{Deserialize, Serialize};
use sidm2_common::Address;

/// Size of a version 1 header.
pub const HEADER_V1_LEN: usize = 0x76;

/// Size of a version 2+ header.
pub const HEADER_V2_LEN: usize = 0x7C;

/// Length of each display string field.
pub const STRING_FIELD_LEN: usize = 32;

/// Container flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Magic {
    /// `PSID`: player called from a plain environment.
    Psid,
    /// `RSID`: player expects a real C64 environment.
    Rsid,
}

impl Magic {
    /// Four-byte tag.
    pub const fn tag(self) -> &'static [u8; 4] {
        match self {
            Magic::Psid => b"PSID",
            Magic::Rsid => b"RSID",
        }
    }

    /// Recognise a tag.
    pub fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"PSID" => Some(Magic::Psid),
            b"RSID" => Some(Magic::Rsid),
            _ => None,
        }
    }
}

/// Video clock declared in the v2 flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Clock {
    /// Not specified.
    Unknown,
    /// 50 Hz.
    Pal,
    /// 60 Hz.
    Ntsc,
    /// Plays on both.
    Any,
}

impl Clock {
    const SHIFT: u16 = 2;
    const MASK: u16 = 0b11 << Self::SHIFT;

    fn from_flags(flags: u16) -> Self {
        match (flags & Self::MASK) >> Self::SHIFT {
            1 => Clock::Pal,
            2 => Clock::Ntsc,
            3 => Clock::Any,
            _ => Clock::Unknown,
        }
    }

    fn bits(self) -> u16 {
        let raw = match self {
            Clock::Unknown => 0,
            Clock::Pal => 1,
            Clock::Ntsc => 2,
            Clock::Any => 3,
        };
        raw << Self::SHIFT
    }
}

/// Parsed container header.
///
/// Addresses are already resolved: an embedded load address has been read
/// from the data block and a zero init address replaced by `load`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidHeader {
    /// Container flavour.
    pub magic: Magic,
    /// Header version (1-4).
    pub version: u16,
    /// Offset of the data block in the file.
    pub data_offset: u16,
    /// Effective load address.
    pub load: Address,
    /// Whether the load address was taken from the first two data bytes.
    pub embedded_load: bool,
    /// Effective init address.
    pub init: Address,
    /// Play address; [`Address::ZERO`] when the player installs its own IRQ.
    pub play: Address,
    /// Number of subtunes.
    pub songs: u16,
    /// Default subtune, 1-based.
    pub start_song: u16,
    /// Per-subtune speed bits (0 = vertical blank, 1 = CIA timer).
    pub speed: u32,
    /// Title.
    pub name: String,
    /// Composer.
    pub author: String,
    /// Release/copyright line.
    pub released: String,
    /// v2+ flags word (0 for v1).
    pub flags: u16,
    /// Relocation start page (v2+).
    pub start_page: u8,
    /// Relocation page count (v2+).
    pub page_length: u8,
    /// Second SID address byte (v3+).
    pub second_sid: u8,
    /// Third SID address byte (v4).
    pub third_sid: u8,
}

impl SidHeader {
    /// Minimal PSID v2 header for a single-subtune PAL player.
    pub fn new(load: Address, init: Address, play: Address) -> Self {
        Self {
            magic: Magic::Psid,
            version: 2,
            data_offset: HEADER_V2_LEN as u16,
            load,
            embedded_load: true,
            init,
            play,
            songs: 1,
            start_song: 1,
            speed: 0,
            name: String::new(),
            author: String::new(),
            released: String::new(),
            flags: Clock::Pal.bits(),
            start_page: 0,
            page_length: 0,
            second_sid: 0,
            third_sid: 0,
        }
    }

    /// Set the display strings.
    pub fn with_strings(
        mut self,
        name: impl Into<String>,
        author: impl Into<String>,
        released: impl Into<String>,
    ) -> Self {
        self.name = name.into();
        self.author = author.into();
        self.released = released.into();
        self
    }

    /// Default subtune as the 0-based index passed to init.
    pub fn start_subtune(&self) -> u8 {
        self.start_song.saturating_sub(1).min(u8::MAX as u16) as u8
    }

    /// Declared video clock.
    pub fn clock(&self) -> Clock {
        Clock::from_flags(self.flags)
    }

    /// Replace the clock bits in the flags word.
    pub fn set_clock(&mut self, clock: Clock) {
        self.flags = (self.flags & !Clock::MASK) | clock.bits();
    }

    /// Whether the player is driven by its own IRQ handler.
    pub fn is_irq_driven(&self) -> bool {
        self.play == Address::ZERO
    }
}

/// Decode a NUL-padded Latin-1 string field.
pub fn decode_string(field: &[u8]) -> String {
    field
        .iter()
        .take_while(|b| **b != 0)
        .map(|&b| b as char)
        .collect()
}

/// Encode a string as a NUL-padded Latin-1 field; characters outside
/// Latin-1 become `?`, overflow is cut.
pub fn encode_string(text: &str) -> [u8; STRING_FIELD_LEN] {
    let mut field = [0u8; STRING_FIELD_LEN];
    for (slot, ch) in field.iter_mut().zip(text.chars()) {
        *slot = u8::try_from(u32::from(ch)).unwrap_or(b'?');
    }
    field
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_bits_round_trip() {
        let mut header = SidHeader::new(Address(0x1000), Address(0x1000), Address(0x1003));
        assert_eq!(header.clock(), Clock::Pal);
        header.set_clock(Clock::Ntsc);
        assert_eq!(header.clock(), Clock::Ntsc);
        assert_eq!(header.flags & !Clock::MASK, 0);
    }

    #[test]
    fn strings_are_latin1() {
        let field = encode_string("Jürgen");
        assert_eq!(field[1], 0xFC);
        assert_eq!(decode_string(&field), "Jürgen");
        assert_eq!(encode_string("日本")[0], b'?');
    }
}
