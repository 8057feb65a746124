use std::fs;

use sidm2::{ConversionConfig, DriverSelector, TargetDriver};
use sidm2_cli::batch;
use sidm2_cli::commands::{convert_file, export_file, load_config, score_files, trace_file};
use sidm2_laxity::testing::Np21Fixture;

#[test]
fn convert_export_and_score_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("tune.sid");
    fs::write(&input, Np21Fixture::reference().to_psid()).unwrap();
    let config = ConversionConfig::default();

    let prg = dir.path().join("out/tune.prg");
    let done = convert_file(
        &input,
        &prg,
        DriverSelector::Fixed(TargetDriver::Driver11),
        false,
        &config,
    )
    .unwrap();
    assert!(done.report.is_none());
    assert_eq!(fs::read(&prg).unwrap(), done.conversion.to_prg());

    let sid = dir.path().join("back.sid");
    export_file(&prg, &sid).unwrap();
    assert!(fs::read(&sid).unwrap().starts_with(b"PSID"));

    let report = score_files(&sid, &sid, Some(30), &config).unwrap();
    assert_eq!(report.frame_accuracy, 100.0);

    let trace = trace_file(&sid, 10, &config).unwrap();
    assert_eq!(trace.frames_completed(), 10);
}

#[test]
fn config_file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, r#"{ "validation_frames": 64 }"#).unwrap();
    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.validation_frames, 64);
    assert_eq!(config.self_check_frames, 50);

    fs::write(&path, "not json").unwrap();
    assert!(load_config(Some(&path)).is_err());
}

#[test]
fn batch_keeps_going_past_bad_files() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    fs::create_dir(input.path().join("nested")).unwrap();
    fs::write(input.path().join("a.sid"), Np21Fixture::reference().to_psid()).unwrap();
    fs::write(
        input.path().join("nested/b.sid"),
        Np21Fixture::reference().with_shifted_tables().to_psid(),
    )
    .unwrap();
    fs::write(input.path().join("broken.sid"), b"PSID\0\x02").unwrap();
    fs::write(input.path().join("notes.txt"), b"ignored").unwrap();

    let summary = batch::run(
        input.path(),
        output.path(),
        DriverSelector::Auto,
        true,
        Some(2),
        &ConversionConfig::default(),
    )
    .unwrap();

    assert_eq!(summary.converted, 2);
    assert_eq!(summary.failed, 1);
    let paths: Vec<&str> = summary.files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, ["a.sid", "broken.sid", "nested/b.sid"]);

    let broken = &summary.files[1];
    assert_eq!(broken.stage.as_deref(), Some("container"));
    assert!(output.path().join("a.prg").exists());
    assert!(output.path().join("nested/b.prg").exists());
    assert!(summary.files[0].overall.is_some_and(|o| o >= 95.0));
}
