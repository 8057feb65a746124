//! PSID v2 writer.

use sidm2_common::MemoryImage;

use crate::header::{HEADER_V2_LEN, SidHeader, encode_string};

/// Serialise a header and program image as a PSID v2 file.
///
/// The load address is always embedded in the data block (header load
/// field 0), version and data offset are forced to v2 values, and the
/// image's own load address wins over `header.load`.
pub fn write_psid(header: &SidHeader, image: &MemoryImage) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_V2_LEN + 2 + image.len());
    out.extend_from_slice(header.magic.tag());
    out.extend_from_slice(&2u16.to_be_bytes());
    out.extend_from_slice(&(HEADER_V2_LEN as u16).to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&header.init.get().to_be_bytes());
    out.extend_from_slice(&header.play.get().to_be_bytes());
    out.extend_from_slice(&header.songs.max(1).to_be_bytes());
    out.extend_from_slice(&header.start_song.max(1).to_be_bytes());
    out.extend_from_slice(&header.speed.to_be_bytes());
    out.extend_from_slice(&encode_string(&header.name));
    out.extend_from_slice(&encode_string(&header.author));
    out.extend_from_slice(&encode_string(&header.released));
    out.extend_from_slice(&header.flags.to_be_bytes());
    out.push(header.start_page);
    out.push(header.page_length);
    out.push(0);
    out.push(0);
    debug_assert_eq!(out.len(), HEADER_V2_LEN);

    out.extend_from_slice(&image.load().get().to_le_bytes());
    out.extend_from_slice(image.bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;
    use sidm2_common::Address;

    #[test]
    fn written_file_parses_back() {
        let header = SidHeader::new(Address(0x1000), Address(0x1000), Address(0x1003))
            .with_strings("Tune", "Composer", "2024 Group");
        let image = MemoryImage::new(Address(0x1000), vec![0x60; 32]);
        let bytes = write_psid(&header, &image);

        let (parsed, parsed_image) = parse(&bytes).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed_image, image);
    }
}
