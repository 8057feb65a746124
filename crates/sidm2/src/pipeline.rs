//! The four top-level operations.

use sidm2_common::{Diagnostics, MemoryImage, Stage, Trace};
use sidm2_cpu::Emulator;
use sidm2_psid::write_psid;
use sidm2_sf2::{
    DriverTemplate, Metadata, PackError, TargetDriver, export_header, from_prg, pack,
    pack_laxity_aware, self_check, to_prg, transform, wrap_generic,
};
use sidm2_validate::{AccuracyReport, validate};

use crate::config::ConversionConfig;
use crate::detect::{Classified, DriverSelector, Input, SourceFormat, classify};
use crate::error::{ConversionError, Result};

/// A converted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    /// Detected source format.
    pub source: SourceFormat,
    /// Driver of the produced image.
    pub driver: TargetDriver,
    /// Whether the image wraps the source player unchanged.
    pub wrapped: bool,
    /// Packed image.
    pub image: MemoryImage,
    /// Findings from every stage.
    pub diagnostics: Diagnostics,
}

impl Conversion {
    /// The image as a PRG file.
    pub fn to_prg(&self) -> Vec<u8> {
        to_prg(&self.image)
    }
}

/// Shared state of one conversion. Holds only the caller's settings and
/// the diagnostics collected so far; the source model and driver template
/// are handed from stage to stage as locals inside [`ConversionContext::convert`].
#[derive(Debug)]
pub struct ConversionContext<'a> {
    config: &'a ConversionConfig,
    diagnostics: Diagnostics,
}

impl<'a> ConversionContext<'a> {
    /// Fresh context.
    pub fn new(config: &'a ConversionConfig) -> Self {
        Self {
            config,
            diagnostics: Diagnostics::new(),
        }
    }

    /// Settings in use.
    pub fn config(&self) -> &ConversionConfig {
        self.config
    }

    /// Findings so far.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    fn template(driver: TargetDriver) -> Result<DriverTemplate> {
        Ok(DriverTemplate::assemble(driver)?)
    }

    fn check(&self, image: &MemoryImage) -> Result<()> {
        if self.config.skip_self_check {
            tracing::warn!(load = %image.load(), "self-check skipped");
            return Ok(());
        }
        self_check(image, self.config.self_check_frames, &self.config.emulator)?;
        Ok(())
    }

    /// Convert a loaded input. This is the single place where source
    /// format and driver selection meet.
    pub fn convert(mut self, input: &Input, selector: DriverSelector) -> Result<Conversion> {
        let config = self.config;
        let classified = classify(input, config);
        let format = classified.format();
        let metadata = Metadata {
            name: input.header.name.clone(),
            author: input.header.author.clone(),
            released: input.header.released.clone(),
        };
        tracing::info!(%format, ?selector, "converting");

        let unsupported = |driver| ConversionError::UnsupportedSource { format, driver };
        let (driver, wrapped, image) = match (classified, selector) {
            (Classified::Laxity(source), selector) => {
                let mut model = transform(source.clone(), metadata, &config.transform)?;
                self.diagnostics.extend(std::mem::take(&mut model.diagnostics));
                match selector {
                    DriverSelector::Auto | DriverSelector::Fixed(TargetDriver::LaxityAware) => {
                        let image = pack_laxity_aware(
                            &model,
                            &source,
                            &input.header,
                            &input.image,
                            config.target_load,
                        )?;
                        (TargetDriver::LaxityAware, false, image)
                    }
                    DriverSelector::Fixed(driver) => {
                        let template = Self::template(driver)?;
                        let image = pack(&model, &template, config.target_load, &mut self.diagnostics)?;
                        (driver, false, image)
                    }
                }
            }
            (Classified::Sf2(_, _), DriverSelector::Fixed(TargetDriver::LaxityAware)) => {
                return Err(unsupported(TargetDriver::LaxityAware));
            }
            (Classified::Sf2(found, mut model), selector) => {
                let driver = match selector {
                    DriverSelector::Fixed(driver) => driver,
                    DriverSelector::Auto => found,
                };
                if model.metadata == Metadata::default() {
                    model.metadata = metadata;
                }
                let template = Self::template(driver)?;
                let image = pack(&model, &template, config.target_load, &mut self.diagnostics)?;
                (driver, false, image)
            }
            (Classified::Generic(err), DriverSelector::Auto) => {
                self.diagnostics
                    .info(Stage::Extraction, Some(err.address()), err.to_string());
                self.diagnostics.info(
                    Stage::Transformation,
                    Some(input.image.load()),
                    "unrecognized player wrapped unchanged",
                );
                let image = wrap_generic(&input.header, &input.image, &metadata)?;
                (TargetDriver::Driver11, true, image)
            }
            (Classified::Generic(err), DriverSelector::Fixed(TargetDriver::LaxityAware)) => {
                return Err(err.into());
            }
            (Classified::Generic(_), DriverSelector::Fixed(driver)) => {
                return Err(unsupported(driver));
            }
        };

        self.check(&image)?;
        tracing::info!(
            %format,
            %driver,
            load = %image.load(),
            len = image.len(),
            warnings = self.diagnostics.warnings().count(),
            "converted"
        );
        Ok(Conversion {
            source: format,
            driver,
            wrapped,
            image,
            diagnostics: self.diagnostics,
        })
    }
}

/// Convert a PSID/RSID (or packed PRG) file.
pub fn convert(bytes: &[u8], selector: DriverSelector, config: &ConversionConfig) -> Result<Conversion> {
    let input = Input::from_bytes(bytes)?;
    ConversionContext::new(config).convert(&input, selector)
}

/// Turn a packed PRG image back into a PSID file.
pub fn export_back(prg: &[u8]) -> std::result::Result<Vec<u8>, PackError> {
    let image = from_prg(prg)?;
    let header = export_header(&image)?;
    tracing::debug!(load = %image.load(), play = %header.play, "exporting packed image");
    Ok(write_psid(&header, &image))
}

/// Emulate a container or packed image for `frames` frames.
pub fn trace(bytes: &[u8], frames: u32, config: &ConversionConfig) -> Result<Trace> {
    let input = Input::from_bytes(bytes)?;
    Ok(Emulator::trace(&input.program(), frames, &config.emulator))
}

/// Compare two files frame by frame. `frames` defaults to
/// [`ConversionConfig::validation_frames`].
pub fn score(
    original: &[u8],
    candidate: &[u8],
    frames: Option<u32>,
    config: &ConversionConfig,
) -> Result<AccuracyReport> {
    let a = Input::from_bytes(original)?;
    let b = Input::from_bytes(candidate)?;
    let frames = frames.unwrap_or(config.validation_frames);
    Ok(validate(&a.program(), &b.program(), frames, &config.emulator))
}
