use sidm2_psid::{FormatError, HEADER_V1_LEN, HEADER_V2_LEN, parse};

#[test]
fn every_prefix_of_a_valid_file_fails_cleanly() {
    let mut file = vec![0u8; HEADER_V2_LEN];
    file[0..4].copy_from_slice(b"RSID");
    file[4..6].copy_from_slice(&2u16.to_be_bytes());
    file[6..8].copy_from_slice(&(HEADER_V2_LEN as u16).to_be_bytes());
    file.extend_from_slice(&[0x00, 0x10, 0x60]);

    assert!(parse(&file).is_ok());
    for len in 0..file.len() {
        let result = parse(&file[..len]);
        assert!(
            matches!(
                result,
                Err(FormatError::Truncated { .. }) | Err(FormatError::EmptyImage)
            ),
            "prefix of {len} bytes gave {result:?}"
        );
    }
}

#[test]
fn garbage_never_panics() {
    let mut seed = 0x1234_5678u32;
    for len in [0usize, 3, 10, 117, 118, 124, 200, 600] {
        for _ in 0..64 {
            let data: Vec<u8> = (0..len)
                .map(|_| {
                    seed ^= seed << 13;
                    seed ^= seed >> 17;
                    seed ^= seed << 5;
                    seed as u8
                })
                .collect();
            let _ = parse(&data);
        }
    }
}

#[test]
fn version_one_header_is_accepted() {
    let mut file = vec![0u8; 0x76];
    file[0..4].copy_from_slice(b"PSID");
    file[4..6].copy_from_slice(&1u16.to_be_bytes());
    file[6..8].copy_from_slice(&0x76u16.to_be_bytes());
    file[8..10].copy_from_slice(&0x1000u16.to_be_bytes());
    file[12..14].copy_from_slice(&0x1003u16.to_be_bytes());
    file.extend_from_slice(&[0x60; 6]);

    let (header, image) = parse(&file).unwrap();
    assert_eq!(header.version, 1);
    assert_eq!(header.flags, 0);
    assert_eq!(image.len(), 6);
}

#[test]
fn unknown_version_is_rejected() {
    let mut file = vec![0u8; HEADER_V2_LEN + 4];
    file[0..4].copy_from_slice(b"PSID");
    file[4..6].copy_from_slice(&9u16.to_be_bytes());
    assert_eq!(
        parse(&file),
        Err(FormatError::UnsupportedVersion { version: 9 })
    );
}

#[test]
fn data_offset_inside_the_header_is_rejected() {
    let mut file = vec![0u8; HEADER_V2_LEN];
    file[0..4].copy_from_slice(b"PSID");
    file[4..6].copy_from_slice(&2u16.to_be_bytes());
    file[8..10].copy_from_slice(&0x5350u16.to_be_bytes());
    file.extend_from_slice(&[0x60; 8]);

    for offset in [0u16, 0x76, 0x7B] {
        file[6..8].copy_from_slice(&offset.to_be_bytes());
        let err = parse(&file).unwrap_err();
        assert_eq!(
            err,
            FormatError::BadDataOffset {
                offset,
                header_len: HEADER_V2_LEN
            }
        );
        assert_eq!(err.offset(), Some(0x06));
    }

    // version 1 headers end earlier
    file[4..6].copy_from_slice(&1u16.to_be_bytes());
    file[6..8].copy_from_slice(&0x10u16.to_be_bytes());
    assert_eq!(
        parse(&file),
        Err(FormatError::BadDataOffset {
            offset: 0x10,
            header_len: HEADER_V1_LEN
        })
    );
}
