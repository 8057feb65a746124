//! PSID/RSID parser producing a [`SidHeader`] and the program image.

use sidm2_common::{Address, MemoryImage};

use crate::error::{FormatError, Result};
use crate::header::{HEADER_V1_LEN, HEADER_V2_LEN, Magic, SidHeader, decode_string};

/// Parse a container. Every field is length-checked before it is read.
pub fn parse(data: &[u8]) -> Result<(SidHeader, MemoryImage)> {
    SidParser { data }.parse()
}

/// Whether `data` starts with a recognised container tag.
pub fn is_sid_container(data: &[u8]) -> bool {
    data.get(0..4).and_then(Magic::from_tag).is_some()
}

struct SidParser<'a> {
    data: &'a [u8],
}

impl<'a> SidParser<'a> {
    fn parse(&self) -> Result<(SidHeader, MemoryImage)> {
        self.ensure_range(0, HEADER_V1_LEN)?;

        let tag = &self.data[0..4];
        let magic = Magic::from_tag(tag).ok_or(FormatError::BadMagic {
            found: [tag[0], tag[1], tag[2], tag[3]],
        })?;

        let version = self.read_u16(0x04)?;
        if !(1..=4).contains(&version) {
            return Err(FormatError::UnsupportedVersion { version });
        }
        if version >= 2 {
            self.ensure_range(0, HEADER_V2_LEN)?;
        }

        let data_offset = self.read_u16(0x06)?;
        let declared_load = self.read_u16(0x08)?;
        let declared_init = self.read_u16(0x0A)?;
        let play = Address(self.read_u16(0x0C)?);
        let songs = self.read_u16(0x0E)?;
        let start_song = self.read_u16(0x10)?;
        let speed = self.read_u32(0x12)?;
        let name = decode_string(self.slice(0x16, 32)?);
        let author = decode_string(self.slice(0x36, 32)?);
        let released = decode_string(self.slice(0x56, 32)?);

        let (flags, start_page, page_length, second_sid, third_sid) = if version >= 2 {
            (
                self.read_u16(0x76)?,
                self.read_u8(0x78)?,
                self.read_u8(0x79)?,
                self.read_u8(0x7A)?,
                self.read_u8(0x7B)?,
            )
        } else {
            (0, 0, 0, 0, 0)
        };

        let header_len = if version >= 2 { HEADER_V2_LEN } else { HEADER_V1_LEN };
        if usize::from(data_offset) < header_len {
            return Err(FormatError::BadDataOffset {
                offset: data_offset,
                header_len,
            });
        }
        let mut payload_start = data_offset as usize;
        self.ensure_range(payload_start, 0)?;
        let embedded_load = declared_load == 0;
        let load = if embedded_load {
            let lo = self.read_u8(payload_start)?;
            let hi = self.read_u8(payload_start + 1)?;
            payload_start += 2;
            Address::from_le_bytes(lo, hi)
        } else {
            Address(declared_load)
        };

        let payload = &self.data[payload_start..];
        if payload.is_empty() {
            return Err(FormatError::EmptyImage);
        }
        let image = MemoryImage::new(load, payload.to_vec());
        if image.len() < payload.len() {
            tracing::warn!(
                %load,
                dropped = payload.len() - image.len(),
                "program data runs past $FFFF, truncated"
            );
        }

        let init = if declared_init == 0 {
            load
        } else {
            Address(declared_init)
        };
        check_entry(&image, "init", init)?;
        if play != Address::ZERO {
            check_entry(&image, "play", play)?;
        }

        let header = SidHeader {
            magic,
            version,
            data_offset,
            load,
            embedded_load,
            init,
            play,
            songs,
            start_song,
            speed,
            name,
            author,
            released,
            flags,
            start_page,
            page_length,
            second_sid,
            third_sid,
        };
        tracing::debug!(
            name = %header.name,
            %load,
            %init,
            %play,
            len = image.len(),
            "parsed {magic:?} v{version}"
        );
        Ok((header, image))
    }

    fn ensure_range(&self, offset: usize, len: usize) -> Result<()> {
        let needed = offset.saturating_add(len);
        if needed > self.data.len() {
            Err(FormatError::Truncated {
                needed,
                actual: self.data.len(),
            })
        } else {
            Ok(())
        }
    }

    fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        self.ensure_range(offset, len)?;
        Ok(&self.data[offset..offset + len])
    }

    fn read_u8(&self, offset: usize) -> Result<u8> {
        Ok(self.slice(offset, 1)?[0])
    }

    fn read_u16(&self, offset: usize) -> Result<u16> {
        let bytes = self.slice(offset, 2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&self, offset: usize) -> Result<u32> {
        let bytes = self.slice(offset, 4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

fn check_entry(image: &MemoryImage, field: &'static str, address: Address) -> Result<()> {
    if image.contains(address) {
        Ok(())
    } else {
        Err(FormatError::InconsistentAddresses {
            field,
            address,
            load: image.load(),
            end: image.end(),
        })
    }
}
