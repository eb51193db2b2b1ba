//! Export configuration
//!
//! Options come from a TOML file, then environment overrides. Every field
//! has a default so an empty file (or no file) is valid.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::OverlayError;
use crate::fonts::DEFAULT_FAMILY;

pub const ENV_FONTS_DIR: &str = "PDF_OVERLAY_FONTS_DIR";
pub const ENV_DEFAULT_FONT: &str = "PDF_OVERLAY_DEFAULT_FONT";

/// Settings shared by the compositor, the exporter and the renderer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportOptions {
    /// Directory scanned for `<family>.ttf` / `<family>.otf`
    pub fonts_dir: Option<PathBuf>,
    /// Face substituted when a family cannot be resolved
    pub default_font: String,
    /// Baseline distance as a multiple of the font size
    pub line_height: f64,
    /// Box width, as a fraction of the page width, for annotations without one
    pub default_box_fraction: f64,
    /// Commit finished pages when a multi-page export is cancelled
    pub allow_partial: bool,
    /// Extra raster scale applied on top of the zoom factor
    pub dpi_scale: f64,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            fonts_dir: None,
            default_font: DEFAULT_FAMILY.to_string(),
            line_height: 1.2,
            default_box_fraction: 1.0 / 3.0,
            allow_partial: false,
            dpi_scale: 2.0,
        }
    }
}

impl ExportOptions {
    /// Load options from a TOML file
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError::Config`] if the file cannot be read, is not
    /// valid TOML, or holds out-of-range values.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, OverlayError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            OverlayError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(s: &str) -> Result<Self, OverlayError> {
        let options: Self = toml::from_str(s)
            .map_err(|e| OverlayError::Config(format!("Failed to parse TOML configuration: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    /// Apply `PDF_OVERLAY_*` environment variables
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_FONTS_DIR).filter(|v| !v.trim().is_empty()) {
            self.fonts_dir = Some(PathBuf::from(dir));
        }
        if let Some(font) = lookup(ENV_DEFAULT_FONT).filter(|v| !v.trim().is_empty()) {
            self.default_font = font;
        }
        self
    }

    pub fn validate(&self) -> Result<(), OverlayError> {
        if !(self.line_height.is_finite() && self.line_height > 0.0) {
            return Err(OverlayError::Config(format!(
                "line_height must be positive, got {}",
                self.line_height
            )));
        }
        if !(self.default_box_fraction > 0.0 && self.default_box_fraction <= 1.0) {
            return Err(OverlayError::Config(format!(
                "default_box_fraction must be in (0, 1], got {}",
                self.default_box_fraction
            )));
        }
        if !(self.dpi_scale.is_finite() && self.dpi_scale > 0.0) {
            return Err(OverlayError::Config(format!(
                "dpi_scale must be positive, got {}",
                self.dpi_scale
            )));
        }
        Ok(())
    }
}
