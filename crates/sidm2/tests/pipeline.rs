use sidm2::{
    Address, ConversionConfig, ConversionError, DriverSelector, MemoryImage, SourceFormat, Stage,
    TargetDriver, convert, detect, export_back, score, trace,
};
use sidm2_cpu::asm::{fixed, label};
use sidm2_cpu::{Assembler, Mnemonic::*};
use sidm2_laxity::testing::Np21Fixture;
use sidm2_psid::{SidHeader, write_psid};

/// A player the extractor does not recognize: one frequency byte per frame
/// from a four-entry table.
fn generic_psid() -> Vec<u8> {
    let mut asm = Assembler::new(Address(0x1000));
    asm.label("init")
        .imm(Lda, 0)
        .abs(Sta, label("pos"))
        .imm(Lda, 0x0F)
        .abs(Sta, fixed(0xD418))
        .imm(Lda, 0x11)
        .abs(Sta, fixed(0xD404))
        .implied(Rts)
        .label("play")
        .abs(Ldx, label("pos"))
        .absx(Lda, label("notes"))
        .abs(Sta, fixed(0xD401))
        .implied(Inx)
        .imm(Cpx, 4)
        .branch(Bne, "store")
        .imm(Ldx, 0)
        .label("store")
        .abs(Stx, label("pos"))
        .implied(Rts)
        .label("pos")
        .bytes(&[0])
        .label("notes")
        .bytes(&[0x10, 0x20, 0x30, 0x40]);
    let out = asm.finish().unwrap();
    let header = SidHeader::new(
        out.base,
        out.address_of("init").unwrap(),
        out.address_of("play").unwrap(),
    )
    .with_strings("Plain", "Nobody", "2024");
    write_psid(&header, &MemoryImage::new(out.base, out.bytes))
}

#[test]
fn laxity_reference_converts_with_high_accuracy() {
    let config = ConversionConfig::default();
    let original = Np21Fixture::reference().to_psid();

    let converted = convert(&original, DriverSelector::Auto, &config).unwrap();
    assert_eq!(converted.source, SourceFormat::Laxity);
    assert_eq!(converted.driver, TargetDriver::LaxityAware);
    assert!(!converted.wrapped);

    let exported = export_back(&converted.to_prg()).unwrap();
    let report = score(&original, &exported, None, &config).unwrap();
    assert!(report.overall >= 95.0, "{report}");
    assert!(report.frame_accuracy >= 99.0, "{report}");
}

#[test]
fn exported_table_driver_round_trips_exactly() {
    let config = ConversionConfig::default();
    let original = Np21Fixture::reference().to_psid();

    let first = convert(&original, DriverSelector::Fixed(TargetDriver::Driver11), &config).unwrap();
    let psid1 = export_back(&first.to_prg()).unwrap();
    assert_eq!(
        detect(&psid1, &config).unwrap(),
        SourceFormat::Sf2Exported(TargetDriver::Driver11)
    );

    let second = convert(&psid1, DriverSelector::Auto, &config).unwrap();
    assert_eq!(second.driver, TargetDriver::Driver11);
    assert_eq!(second.image, first.image);
    let psid2 = export_back(&second.to_prg()).unwrap();
    assert_eq!(psid2, psid1);

    let report = score(&psid1, &psid2, None, &config).unwrap();
    assert_eq!(report.frame_accuracy, 100.0);
    assert_eq!(report.overall, 100.0);
}

#[test]
fn table_driver_conversion_plays_at_another_load_address() {
    let config = ConversionConfig {
        target_load: Address(0x4000),
        ..ConversionConfig::default()
    };
    let original = Np21Fixture::reference().to_psid();
    let converted = convert(&original, DriverSelector::Fixed(TargetDriver::Np20), &config).unwrap();
    assert_eq!(converted.image.load(), Address(0x4000));

    let packed = trace(&converted.to_prg(), 100, &config).unwrap();
    assert!(packed.fault().is_none());
    assert_eq!(packed.frames_completed(), 100);
    assert!(!packed.writes().is_empty());
}

#[test]
fn truncated_container_fails_in_the_container_stage() {
    let mut bytes = b"PSID".to_vec();
    bytes.extend_from_slice(&[0, 2, 0, 0x7C, 0x10, 0]);
    let err = convert(&bytes, DriverSelector::Auto, &ConversionConfig::default()).unwrap_err();
    assert!(matches!(err, ConversionError::Format(_)), "{err}");
    assert_eq!(err.stage(), Stage::Container);
    assert!(err.to_string().starts_with("container:"));
}

#[test]
fn dangling_voice_still_converts() {
    let config = ConversionConfig::default();
    let original = Np21Fixture::reference()
        .with_dangling_voice(1, Address(0xC000))
        .to_psid();
    for selector in [
        DriverSelector::Auto,
        DriverSelector::Fixed(TargetDriver::Driver11),
    ] {
        let converted = convert(&original, selector, &config).unwrap();
        assert!(
            converted
                .diagnostics
                .warnings()
                .any(|d| d.message.contains("voice 2")),
            "{selector:?}"
        );
    }
}

#[test]
fn unknown_player_is_wrapped_unchanged() {
    let config = ConversionConfig::default();
    let original = generic_psid();
    assert_eq!(detect(&original, &config).unwrap(), SourceFormat::GenericSid);

    let converted = convert(&original, DriverSelector::Auto, &config).unwrap();
    assert!(converted.wrapped);
    assert_eq!(converted.driver, TargetDriver::Driver11);
    assert_eq!(converted.image.load(), Address(0x0F80));

    let extraction = converted
        .diagnostics
        .entries()
        .iter()
        .find(|d| d.stage == Stage::Extraction)
        .unwrap();
    assert_eq!(extraction.address, Some(Address(0x1000)));
    assert!(extraction.message.contains("no NewPlayer v21 table layout"));

    let exported = export_back(&converted.to_prg()).unwrap();
    let report = score(&original, &exported, Some(40), &config).unwrap();
    assert_eq!(report.frame_accuracy, 100.0);
}

#[test]
fn truncated_laxity_image_records_why_it_was_wrapped() {
    let (header, image) = Np21Fixture::reference().build();
    let cut = MemoryImage::new(image.load(), image.bytes()[..0x900].to_vec());
    let original = write_psid(&header, &cut);

    let converted = convert(&original, DriverSelector::Auto, &ConversionConfig::default()).unwrap();
    assert_eq!(converted.source, SourceFormat::GenericSid);
    assert!(converted.wrapped);
    let stages: Vec<Stage> = converted.diagnostics.entries().iter().map(|d| d.stage).collect();
    assert_eq!(stages, [Stage::Extraction, Stage::Transformation]);
    assert_eq!(
        converted.diagnostics.entries()[0].address,
        Some(image.load())
    );
}

#[test]
fn laxity_aware_request_reports_the_extraction_failure() {
    let err = convert(
        &generic_psid(),
        DriverSelector::Fixed(TargetDriver::LaxityAware),
        &ConversionConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, ConversionError::Extraction(_)), "{err}");
    assert_eq!(err.stage(), Stage::Extraction);
    assert_eq!(err.address(), Some(Address(0x1000)));
}

#[test]
fn unknown_player_cannot_be_forced_into_a_table_driver() {
    let err = convert(
        &generic_psid(),
        DriverSelector::Fixed(TargetDriver::Np20),
        &ConversionConfig::default(),
    )
    .unwrap_err();
    assert_eq!(
        err,
        ConversionError::UnsupportedSource {
            format: SourceFormat::GenericSid,
            driver: TargetDriver::Np20,
        }
    );
    assert_eq!(err.stage(), Stage::Transformation);
}

#[test]
fn exported_table_driver_cannot_become_laxity_aware() {
    let config = ConversionConfig::default();
    let first = convert(
        &Np21Fixture::reference().to_psid(),
        DriverSelector::Fixed(TargetDriver::Driver11),
        &config,
    )
    .unwrap();
    let psid = export_back(&first.to_prg()).unwrap();
    let err = convert(&psid, DriverSelector::Fixed(TargetDriver::LaxityAware), &config).unwrap_err();
    assert!(matches!(
        err,
        ConversionError::UnsupportedSource {
            format: SourceFormat::Sf2Exported(TargetDriver::Driver11),
            ..
        }
    ));
}

#[test]
fn traces_are_deterministic() {
    let config = ConversionConfig::default();
    let original = Np21Fixture::reference().to_psid();
    let a = trace(&original, 120, &config).unwrap();
    let b = trace(&original, 120, &config).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.frames_completed(), 120);
}

#[test]
fn self_comparison_is_perfect() {
    let config = ConversionConfig::default();
    let original = Np21Fixture::reference().with_shifted_tables().to_psid();
    let report = score(&original, &original, Some(64), &config).unwrap();
    assert_eq!(report.frame_accuracy, 100.0);
    assert!(report.mismatches.is_empty());
}
