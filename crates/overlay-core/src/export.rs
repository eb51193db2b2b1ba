//! Exporting annotated pages to a file
//!
//! The whole output is built in memory, then written through a temporary
//! file next to the destination and renamed into place. A failed or
//! cancelled export leaves the destination as it was.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::cancel::CancellationToken;
use crate::compositor::{Compositor, PageOverlay};
use crate::config::ExportOptions;
use crate::error::{OverlayError, SkipReason};

/// An annotation left out of the output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedAnnotation {
    pub page_index: u32,
    /// Position in the page's annotation list
    pub index: usize,
    pub reason: SkipReason,
}

/// A family that was drawn with a substitute face
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FontFallback {
    pub page_index: u32,
    pub index: usize,
    pub requested: String,
    pub substituted: String,
}

/// Outcome of a successful export
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportReport {
    pub pages_composed: usize,
    pub annotations_drawn: usize,
    pub skipped: Vec<SkippedAnnotation>,
    pub font_fallbacks: Vec<FontFallback>,
    /// Set when cancellation stopped a partial-allowed export early
    pub cancelled: bool,
}

impl ExportReport {
    pub(crate) fn skip(&mut self, page_index: u32, index: usize, reason: SkipReason) {
        tracing::warn!(page_index, index, "Skipping annotation: {}", reason);
        self.skipped.push(SkippedAnnotation {
            page_index,
            index,
            reason,
        });
    }

    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.font_fallbacks.is_empty() && !self.cancelled
    }
}

/// Draw one page's annotations onto `source` and write the result to
/// `destination`.
///
/// # Errors
///
/// - [`OverlayError::DocumentUnreadable`] if `source` cannot be read or
///   parsed, or has no page `overlay.page_index`
/// - [`OverlayError::DestinationUnwritable`] if the output cannot be written
pub fn export_annotated_page(
    source: &Path,
    destination: &Path,
    overlay: &PageOverlay,
    options: &ExportOptions,
) -> Result<ExportReport, OverlayError> {
    export_annotated_pages(
        source,
        destination,
        std::slice::from_ref(overlay),
        options,
        &CancellationToken::new(),
    )
}

/// Multi-page export; pages are processed in list order and `cancel` is
/// checked before each one.
pub fn export_annotated_pages(
    source: &Path,
    destination: &Path,
    overlays: &[PageOverlay],
    options: &ExportOptions,
    cancel: &CancellationToken,
) -> Result<ExportReport, OverlayError> {
    tracing::info!(
        "Exporting {} page overlay(s) from {} to {}",
        overlays.len(),
        source.display(),
        destination.display()
    );

    let source_bytes = read_source(source)?;
    let composed = Compositor::new(options.clone()).compose(&source_bytes, overlays, cancel)?;
    write_atomically(destination, &composed.bytes)?;

    tracing::info!(
        "Wrote {} ({} bytes, {} annotation(s) drawn, {} skipped)",
        destination.display(),
        composed.bytes.len(),
        composed.report.annotations_drawn,
        composed.report.skipped.len()
    );
    Ok(composed.report)
}

fn read_source(source: &Path) -> Result<Vec<u8>, OverlayError> {
    fs::read(source).map_err(|e| {
        OverlayError::DocumentUnreadable(format!("{}: {}", source.display(), e))
    })
}

fn write_atomically(destination: &Path, bytes: &[u8]) -> Result<(), OverlayError> {
    let parent = match destination.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut file =
        NamedTempFile::new_in(parent).map_err(|e| OverlayError::unwritable(destination, e))?;
    file.write_all(bytes)
        .and_then(|()| file.as_file().sync_all())
        .map_err(|e| OverlayError::unwritable(destination, e))?;
    file.persist(destination)
        .map_err(|e| OverlayError::unwritable(destination, e.error))?;
    Ok(())
}
