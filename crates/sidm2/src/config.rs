//! Conversion settings.

use serde::{Deserialize, Serialize};
use sidm2_common::Address;
use sidm2_cpu::EmulatorConfig;
use sidm2_laxity::ExtractConfig;
use sidm2_sf2::TransformConfig;

/// Everything a conversion, trace or score run can be tuned with.
///
/// Passed explicitly into every top-level call; missing fields in a
/// serialized config take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Emulation limits shared by extraction, self-check and scoring.
    pub emulator: EmulatorConfig,
    /// Frames observed when the table layout has to be found by
    /// execution.
    pub observe_frames: u32,
    /// Load address of table driver and Laxity-aware images.
    pub target_load: Address,
    /// Emit packed images without re-emulating them first.
    pub skip_self_check: bool,
    /// Frames played by the self-check after init.
    pub self_check_frames: u32,
    /// Frames compared by [`crate::score`] when the caller passes none.
    pub validation_frames: u32,
    /// Transformation tuning.
    pub transform: TransformConfig,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            emulator: EmulatorConfig::default(),
            observe_frames: ExtractConfig::default().observe_frames,
            target_load: Address(0x1000),
            skip_self_check: false,
            self_check_frames: 50,
            validation_frames: sidm2_validate::DEFAULT_FRAMES,
            transform: TransformConfig::default(),
        }
    }
}

impl ConversionConfig {
    /// Extraction settings derived from this config.
    pub fn extract_config(&self) -> ExtractConfig {
        ExtractConfig {
            emulator: self.emulator.clone(),
            observe_frames: self.observe_frames,
        }
    }
}
