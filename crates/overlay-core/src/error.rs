use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Fatal export failures. Anything that only affects one annotation is a
/// [`SkipReason`] instead and never surfaces here.
#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("Document unreadable: {0}")]
    DocumentUnreadable(String),

    #[error("Destination {path} is not writable: {message}")]
    DestinationUnwritable { path: PathBuf, message: String },

    #[error("Export cancelled after {pages_composed} page(s)")]
    Cancelled { pages_composed: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid session file: {0}")]
    InvalidSession(String),
}

impl OverlayError {
    pub(crate) fn unreadable(err: impl std::fmt::Display) -> Self {
        OverlayError::DocumentUnreadable(err.to_string())
    }

    pub(crate) fn unwritable(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        OverlayError::DestinationUnwritable {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Why a single annotation was left out of the output.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum SkipReason {
    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },

    #[error("position ({x}, {y}) is negative")]
    NegativePosition { x: f64, y: f64 },

    #[error("font size {0} must be positive")]
    NonPositiveFontSize(f64),

    #[error("box width {0} must be positive")]
    NonPositiveBoxWidth(f64),

    #[error("display size {width}x{height:?} cannot anchor a scale factor")]
    InvalidDisplaySize { width: f64, height: Option<f64> },
}
