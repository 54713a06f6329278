//! Pipeline configuration.
//!
//! Deserializable from JSON so batch jobs can carry their settings in a
//! sidecar file; every field has a default matching the standard capture
//! profile (81 frames downscaled to 81x81, full 256-color palette, 4 cs
//! per frame, looping forever).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    downscale::ScaleFilter,
    error::{LoopshotError, LoopshotResult},
    quantize::QuantizerKind,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PipelineConfig {
    /// Exact number of frames a batch must contain.
    pub frame_count: usize,
    pub target_width: u32,
    pub target_height: u32,
    pub filter: ScaleFilter,
    pub quantizer: QuantizerKind,
    pub max_colors: usize,
    pub dither: bool,
    pub delay_cs: u16,
    pub loop_forever: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_count: 81,
            target_width: 81,
            target_height: 81,
            filter: ScaleFilter::Bilinear,
            quantizer: QuantizerKind::MedianCut,
            max_colors: 256,
            dither: false,
            delay_cs: 4,
            loop_forever: true,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> LoopshotResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            LoopshotError::validation(format!("read config {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            LoopshotError::validation(format!("parse config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> LoopshotResult<()> {
        if self.frame_count == 0 {
            return Err(LoopshotError::validation("frame_count must be non-zero"));
        }
        if self.target_width == 0 || self.target_height == 0 {
            return Err(LoopshotError::validation(
                "target dimensions must be non-zero",
            ));
        }
        if self.target_width > u16::MAX as u32 || self.target_height > u16::MAX as u32 {
            return Err(LoopshotError::validation(
                "target dimensions must fit in u16 for GIF output",
            ));
        }
        if self.max_colors == 0 || self.max_colors > 256 {
            return Err(LoopshotError::validation(format!(
                "max_colors must be in 1..=256, got {}",
                self.max_colors
            )));
        }
        Ok(())
    }
}
