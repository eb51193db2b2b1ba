//! Coordinate transformation between preview pixels and PDF points
//!
//! Pixel space: origin top-left, Y grows downward, measured on the preview
//! image. Point space: default PDF user space, origin bottom-left, offset by
//! the lower-left corner of the page's visible box. Overlay text is written
//! straight into the page content stream, so every mapping below flips Y.

use serde::{Deserialize, Serialize};

use crate::geometry::PageGeometry;

/// Pixel size of the preview image the annotations were captured on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DisplaySize {
    pub width: f64,
    /// Absent in single-axis sessions; the Y scale then follows X
    #[serde(default)]
    pub height: Option<f64>,
}

impl DisplaySize {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height: Some(height),
        }
    }

    pub fn width_only(width: f64) -> Self {
        Self {
            width,
            height: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        positive(self.width) && self.height.map_or(true, positive)
    }
}

/// Points per pixel on each axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactors {
    pub x: f64,
    pub y: f64,
}

impl ScaleFactors {
    /// `None` when the display size cannot anchor a scale
    pub fn derive(display: DisplaySize, geometry: &PageGeometry) -> Option<Self> {
        if !display.is_valid() || !geometry.is_valid() {
            return None;
        }
        let x = geometry.width_points / display.width;
        let y = match display.height {
            Some(height) => geometry.height_points / height,
            None => x,
        };
        Some(Self { x, y })
    }

    /// Single factor for lengths that are not tied to an axis (font size)
    pub fn uniform(&self) -> f64 {
        (self.x + self.y) / 2.0
    }
}

/// Map a top-left pixel position to point space (bottom-left origin).
///
/// The returned Y is the top edge of the box, not a baseline.
pub fn pixel_to_point(px: f64, py: f64, scale: ScaleFactors, geometry: &PageGeometry) -> (f64, f64) {
    let point_x = geometry.x0 + px * scale.x;
    let point_y = geometry.y0 + geometry.height_points - py * scale.y;
    (point_x, point_y)
}

/// Inverse of [`pixel_to_point`]
pub fn point_to_pixel(
    point_x: f64,
    point_y: f64,
    scale: ScaleFactors,
    geometry: &PageGeometry,
) -> (f64, f64) {
    let px = (point_x - geometry.x0) / scale.x;
    let py = (geometry.y0 + geometry.height_points - point_y) / scale.y;
    (px, py)
}

/// Point size for a pixel font size; never below 1pt
pub fn font_size_to_points(font_px: f64, scale: ScaleFactors) -> f64 {
    (font_px * scale.uniform()).max(1.0)
}
