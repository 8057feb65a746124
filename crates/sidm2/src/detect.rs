//! Input loading, source detection and driver selection.

use std::fmt;

use serde::{Deserialize, Serialize};
use sidm2_common::MemoryImage;
use sidm2_cpu::SidProgram;
use sidm2_laxity::{ExtractionError, SourceModel, extract_with};
use sidm2_psid::{SidHeader, is_sid_container, parse};
use sidm2_sf2::{HeaderFlags, TargetDriver, TargetModel, export_header, from_prg, read_header, read_target_model};

use crate::config::ConversionConfig;
use crate::error::Result;

/// What kind of player an input holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceFormat {
    /// Laxity NewPlayer v21.
    Laxity,
    /// A table driver image exported back to a container.
    Sf2Exported(TargetDriver),
    /// Anything else: played as-is, never decoded.
    GenericSid,
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Laxity => f.write_str("laxity"),
            SourceFormat::Sf2Exported(driver) => write!(f, "sf2-{driver}"),
            SourceFormat::GenericSid => f.write_str("generic"),
        }
    }
}

/// Which target encoding to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DriverSelector {
    /// Pick from the detected source format.
    #[default]
    Auto,
    /// Always use this driver.
    Fixed(TargetDriver),
}

/// A loaded input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    /// Container header; synthesized from the image prologue for PRG
    /// inputs.
    pub header: SidHeader,
    /// Program image.
    pub image: MemoryImage,
}

impl Input {
    /// Read a PSID/RSID container or a packed PRG image.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if is_sid_container(bytes) {
            let (header, image) = parse(bytes)?;
            return Ok(Self { header, image });
        }
        let image = from_prg(bytes)?;
        let header = export_header(&image)?;
        Ok(Self { header, image })
    }

    /// Program for the emulator, starting the default subtune.
    pub fn program(&self) -> SidProgram {
        sidm2_laxity::sid_program(&self.header, &self.image)
    }
}

/// Input decoded as far as its format allows. A generic input keeps the
/// reason extraction gave up.
#[derive(Debug, Clone)]
pub(crate) enum Classified {
    Laxity(SourceModel),
    Sf2(TargetDriver, TargetModel),
    Generic(ExtractionError),
}

impl Classified {
    pub(crate) fn format(&self) -> SourceFormat {
        match self {
            Classified::Laxity(_) => SourceFormat::Laxity,
            Classified::Sf2(driver, _) => SourceFormat::Sf2Exported(*driver),
            Classified::Generic(_) => SourceFormat::GenericSid,
        }
    }
}

pub(crate) fn classify(input: &Input, config: &ConversionConfig) -> Classified {
    if let Ok(header) = read_header(&input.image) {
        if !header.flags.contains(HeaderFlags::WRAPPED) {
            match read_target_model(&input.image) {
                Ok((driver, model)) => return Classified::Sf2(driver, model),
                Err(err) => tracing::debug!(%err, "target header present but tables unreadable"),
            }
        }
    }
    match extract_with(&input.header, &input.image, &config.extract_config()) {
        Ok(source) => Classified::Laxity(source),
        Err(err) => {
            tracing::debug!(%err, "not a NewPlayer v21 image");
            Classified::Generic(err)
        }
    }
}

/// Detect the source format of a container or PRG file.
pub fn detect(bytes: &[u8], config: &ConversionConfig) -> Result<SourceFormat> {
    let input = Input::from_bytes(bytes)?;
    Ok(classify(&input, config).format())
}
