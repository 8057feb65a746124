//! Directory conversion on a rayon worker pool.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use sidm2::{ConversionConfig, ConversionError, DriverSelector};
use walkdir::WalkDir;

use crate::commands::convert_file;

/// Per-file line of the batch summary.
#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    /// Input path relative to the scanned directory.
    pub path: String,
    /// Detected source format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Driver used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Warnings recorded during conversion.
    pub warnings: Vec<String>,
    /// Overall accuracy, when validated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall: Option<f64>,
    /// Frame accuracy, when validated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_accuracy: Option<f64>,
    /// Failing stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Whole-run summary.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    /// Files converted.
    pub converted: usize,
    /// Files that failed.
    pub failed: usize,
    /// One entry per file, sorted by path.
    pub files: Vec<BatchEntry>,
}

fn is_sid_file(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase());
    matches!(ext.as_deref(), Some("sid") | Some("psid") | Some("rsid"))
}

/// SID files under `dir`, in path order.
pub fn collect_inputs(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_sid_file(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

fn convert_one(
    input: &Path,
    dir: &Path,
    out_dir: &Path,
    selector: DriverSelector,
    validate: bool,
    config: &ConversionConfig,
) -> BatchEntry {
    let relative = input.strip_prefix(dir).unwrap_or(input);
    let output = out_dir.join(relative).with_extension("prg");
    let mut entry = BatchEntry {
        path: relative.display().to_string(),
        source: None,
        driver: None,
        warnings: Vec::new(),
        overall: None,
        frame_accuracy: None,
        stage: None,
        error: None,
    };
    match convert_file(input, &output, selector, validate, config) {
        Ok(done) => {
            entry.source = Some(done.conversion.source.to_string());
            entry.driver = Some(done.conversion.driver.to_string());
            entry.warnings = done
                .conversion
                .diagnostics
                .warnings()
                .map(|d| d.to_string())
                .collect();
            if let Some(report) = done.report {
                entry.overall = Some(report.overall);
                entry.frame_accuracy = Some(report.frame_accuracy);
            }
        }
        Err(err) => {
            tracing::warn!(path = %input.display(), "{err:#}");
            entry.stage = err
                .downcast_ref::<ConversionError>()
                .map(|e| e.stage().to_string());
            entry.error = Some(format!("{err:#}"));
        }
    }
    entry
}

/// Convert every SID file under `dir` into `out_dir`.
///
/// Files are independent; one failure never stops the run.
pub fn run(
    dir: &Path,
    out_dir: &Path,
    selector: DriverSelector,
    validate: bool,
    jobs: Option<usize>,
    config: &ConversionConfig,
) -> Result<BatchSummary> {
    let inputs = collect_inputs(dir);
    tracing::info!(dir = %dir.display(), files = inputs.len(), "batch conversion");

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(jobs) = jobs {
        builder = builder.num_threads(jobs);
    }
    let pool = builder.build().context("starting worker pool")?;
    let files: Vec<BatchEntry> = pool.install(|| {
        inputs
            .par_iter()
            .map(|input| convert_one(input, dir, out_dir, selector, validate, config))
            .collect()
    });

    let failed = files.iter().filter(|f| f.error.is_some()).count();
    Ok(BatchSummary {
        converted: files.len() - failed,
        failed,
        files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_sid_extensions() {
        assert!(is_sid_file(Path::new("a/Tune.SID")));
        assert!(is_sid_file(Path::new("b.rsid")));
        assert!(!is_sid_file(Path::new("c.prg")));
        assert!(!is_sid_file(Path::new("noext")));
    }
}
