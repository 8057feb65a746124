//! Extraction entry points.

use serde::{Deserialize, Serialize};
use sidm2_common::{Diagnostics, MemoryImage, Stage};
use sidm2_cpu::{EmulatorConfig, SidProgram};
use sidm2_psid::SidHeader;

use crate::decode::decode_model;
use crate::error::Result;
use crate::layout::offsets;
use crate::locate::locate;
use crate::model::SourceModel;

/// Extraction settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Limits for the observation run.
    pub emulator: EmulatorConfig,
    /// Frames played while observing table reads.
    pub observe_frames: u32,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            emulator: EmulatorConfig::default(),
            observe_frames: 32,
        }
    }
}

/// Locate and decode the player tables with default settings.
pub fn extract(header: &SidHeader, image: &MemoryImage) -> Result<SourceModel> {
    extract_with(header, image, &ExtractConfig::default())
}

/// Locate and decode the player tables.
///
/// Only a missing layout is fatal. Dangling pointers and out-of-range
/// indices are repaired and reported in [`SourceModel::diagnostics`].
pub fn extract_with(
    header: &SidHeader,
    image: &MemoryImage,
    config: &ExtractConfig,
) -> Result<SourceModel> {
    let mut diagnostics = Diagnostics::new();
    let (layout, resolution) = locate(header, image, config, &mut diagnostics)?;
    diagnostics.info(
        Stage::Extraction,
        Some(layout.table(offsets::WAVE_NOTE_OFFSETS)),
        format!("tables found by {resolution}"),
    );
    decode_model(image, layout, resolution, diagnostics)
}

/// The container's program as the emulator runs it.
pub fn sid_program(header: &SidHeader, image: &MemoryImage) -> SidProgram {
    SidProgram {
        image: image.clone(),
        init: header.init,
        play: header.play,
        subtune: header.start_subtune(),
    }
}
