//! Single-file subcommands.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sidm2::{AccuracyReport, ConversionConfig, DriverSelector, Trace};
use sidm2_common::sid::register_name;

/// Read settings from a JSON file, or take the defaults.
pub fn load_config(path: Option<&Path>) -> Result<ConversionConfig> {
    let Some(path) = path else {
        return Ok(ConversionConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))
}

/// Outcome of converting one file.
#[derive(Debug)]
pub struct Converted {
    /// Where the PRG went.
    pub output: PathBuf,
    /// Conversion result.
    pub conversion: sidm2::Conversion,
    /// Score against the input, when requested.
    pub report: Option<AccuracyReport>,
}

/// Convert `input` and write the PRG image to `output`.
pub fn convert_file(
    input: &Path,
    output: &Path,
    selector: DriverSelector,
    validate: bool,
    config: &ConversionConfig,
) -> Result<Converted> {
    let bytes = read(input)?;
    let conversion = sidm2::convert(&bytes, selector, config)
        .with_context(|| format!("converting {}", input.display()))?;
    let prg = conversion.to_prg();
    write(output, &prg)?;

    let report = if validate {
        let exported = sidm2::export_back(&prg)
            .with_context(|| format!("exporting {}", output.display()))?;
        Some(sidm2::score(&bytes, &exported, None, config)?)
    } else {
        None
    };
    Ok(Converted {
        output: output.to_path_buf(),
        conversion,
        report,
    })
}

/// Export a packed PRG to PSID.
pub fn export_file(input: &Path, output: &Path) -> Result<()> {
    let prg = read(input)?;
    let sid = sidm2::export_back(&prg).with_context(|| format!("exporting {}", input.display()))?;
    write(output, &sid)
}

/// Emulate `input` for `frames` frames.
pub fn trace_file(input: &Path, frames: u32, config: &ConversionConfig) -> Result<Trace> {
    let bytes = read(input)?;
    Ok(sidm2::trace(&bytes, frames, config)?)
}

/// Score `candidate` against `original`.
pub fn score_files(
    original: &Path,
    candidate: &Path,
    frames: Option<u32>,
    config: &ConversionConfig,
) -> Result<AccuracyReport> {
    let a = read(original)?;
    let b = read(candidate)?;
    Ok(sidm2::score(&a, &b, frames, config)?)
}

/// One line per frame: `frame: reg=value ...`.
pub fn format_trace(trace: &Trace) -> String {
    let mut out = String::new();
    for frame in 0..trace.frames_completed() {
        let _ = write!(out, "{frame:5}:");
        for w in trace.frame_writes(frame) {
            let _ = write!(out, " {}={:02X}", register_name(w.register), w.value);
        }
        out.push('\n');
    }
    if let Some(fault) = trace.fault() {
        let _ = writeln!(out, "halted: {fault}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_is_the_default() {
        assert_eq!(load_config(None).unwrap(), ConversionConfig::default());
    }

    #[test]
    fn empty_trace_formats_to_nothing() {
        assert_eq!(format_trace(&Trace::new(0)), "");
    }
}
