//! Text annotation model
//!
//! One canonical value for a user-placed text box. Everything the editor does
//! interactively (drag, resize, inline edit) ends up mutating one of these.

use serde::{Deserialize, Serialize};

use crate::error::SkipReason;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

impl Alignment {
    /// Parse an alignment name; anything unrecognised is left-aligned.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "center" | "centre" => Alignment::Center,
            "right" => Alignment::Right,
            _ => Alignment::Left,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
        }
    }
}

/// RGB color with components normalized to [0, 1]
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct RgbColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl RgbColor {
    pub const BLACK: RgbColor = RgbColor {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    /// Parse hex color string (e.g., "#FF0000" or "ff0000")
    pub fn from_hex(color: &str) -> Result<Self, String> {
        let hex = color.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(format!("expected #RRGGBB, got '{}'", color));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16)
                .map(|v| v as f32 / 255.0)
                .map_err(|e| format!("invalid color '{}': {}", color, e))
        };
        Ok(Self {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }

    pub fn to_hex(&self) -> String {
        let byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!("#{:02X}{:02X}{:02X}", byte(self.r), byte(self.g), byte(self.b))
    }
}

/// A text overlay in pixel space.
///
/// `x`, `y`, `box_width` and `font_size` are all measured in the pixel space of
/// the preview image that was on screen when the box was placed; the matching
/// display size travels next to the list in [`crate::compositor::PageOverlay`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextAnnotation {
    pub content: String,
    pub x: f64,
    pub y: f64,
    /// Wrap/alignment width; `None` means "use the configured page fraction"
    #[serde(default)]
    pub box_width: Option<f64>,
    pub font_family: String,
    pub font_size: f64,
    pub color: RgbColor,
    #[serde(default)]
    pub alignment: Alignment,
}

impl TextAnnotation {
    pub fn new(content: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            content: content.into(),
            x,
            y,
            box_width: None,
            font_family: crate::fonts::DEFAULT_FAMILY.to_string(),
            font_size: 12.0,
            color: RgbColor::BLACK,
            alignment: Alignment::Left,
        }
    }

    /// First geometric problem that makes this annotation unplaceable
    pub fn validate(&self) -> Result<(), SkipReason> {
        for (field, value) in [("x", self.x), ("y", self.y), ("font_size", self.font_size)] {
            if !value.is_finite() {
                return Err(SkipReason::NonFinite { field });
            }
        }
        if let Some(width) = self.box_width {
            if !width.is_finite() {
                return Err(SkipReason::NonFinite { field: "box_width" });
            }
            if width <= 0.0 {
                return Err(SkipReason::NonPositiveBoxWidth(width));
            }
        }
        if self.x < 0.0 || self.y < 0.0 {
            return Err(SkipReason::NegativePosition {
                x: self.x,
                y: self.y,
            });
        }
        if self.font_size <= 0.0 {
            return Err(SkipReason::NonPositiveFontSize(self.font_size));
        }
        Ok(())
    }
}

fn default_font() -> String {
    "helv".to_string()
}

fn default_size() -> f64 {
    12.0
}

fn default_color() -> String {
    "#000000".to_string()
}

fn default_align() -> String {
    "left".to_string()
}

/// The record an editor hands over at save time:
/// `text, font, size, color ("#RRGGBB"), x, y, align, box_width`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnnotationRecord {
    pub text: String,
    #[serde(default = "default_font")]
    pub font: String,
    #[serde(default = "default_size")]
    pub size: f64,
    #[serde(default = "default_color")]
    pub color: String,
    pub x: f64,
    pub y: f64,
    #[serde(default = "default_align")]
    pub align: String,
    #[serde(default)]
    pub box_width: Option<f64>,
}

impl From<AnnotationRecord> for TextAnnotation {
    fn from(record: AnnotationRecord) -> Self {
        let color = RgbColor::from_hex(&record.color).unwrap_or_else(|e| {
            tracing::warn!("{}; drawing '{}' in black", e, record.text);
            RgbColor::BLACK
        });
        Self {
            content: record.text,
            x: record.x,
            y: record.y,
            box_width: record.box_width,
            font_family: record.font,
            font_size: record.size,
            color,
            alignment: Alignment::from_name(&record.align),
        }
    }
}

impl From<&TextAnnotation> for AnnotationRecord {
    fn from(annotation: &TextAnnotation) -> Self {
        Self {
            text: annotation.content.clone(),
            font: annotation.font_family.clone(),
            size: annotation.font_size,
            color: annotation.color.to_hex(),
            x: annotation.x,
            y: annotation.y,
            align: annotation.alignment.as_str().to_string(),
            box_width: annotation.box_width,
        }
    }
}
