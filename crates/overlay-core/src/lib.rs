//! Text overlays for PDF pages
//!
//! Annotations are placed on a rasterized preview in pixel space and later
//! drawn onto the original page in PDF points. The pieces:
//! - `render`: preview image plus the geometry it was produced from
//! - `session`: the editor state that produces annotations
//! - `coords` / `layout`: pixel to point mapping, wrapping and alignment
//! - `compositor` / `export`: drawing onto the source document and writing it out

pub mod annotation;
pub mod cancel;
pub mod compositor;
pub mod config;
pub mod coords;
pub mod error;
pub mod export;
pub mod fonts;
pub mod geometry;
pub mod layout;
pub mod render;
pub mod session;

pub use annotation::{Alignment, AnnotationRecord, RgbColor, TextAnnotation};
pub use cancel::CancellationToken;
pub use compositor::{ComposedDocument, Compositor, PageOverlay};
pub use config::ExportOptions;
pub use coords::{DisplaySize, ScaleFactors};
pub use error::{OverlayError, SkipReason};
pub use export::{
    export_annotated_page, export_annotated_pages, ExportReport, FontFallback, SkippedAnnotation,
};
pub use geometry::PageGeometry;
pub use render::{BlankRasterizer, PageRenderer, Rasterizer, RenderedPage};
pub use session::{EditSession, SessionFile, TextStyle};

#[cfg(feature = "pdfium")]
pub use render::PdfiumRasterizer;

/// Parse PDF bytes and return page count
pub fn page_count(bytes: &[u8]) -> Result<u32, OverlayError> {
    let doc = lopdf::Document::load_mem(bytes).map_err(OverlayError::unreadable)?;
    Ok(doc.get_pages().len() as u32)
}

/// Parse a 1-based page list like "1-3, 5" into sorted, unique 0-based indices
pub fn parse_page_list(input: &str) -> Result<Vec<u32>, OverlayError> {
    use std::collections::BTreeSet;

    let invalid = |msg: String| OverlayError::Config(format!("Invalid page list: {}", msg));
    let page_number = |s: &str| -> Result<u32, OverlayError> {
        match s.trim().parse::<u32>() {
            Ok(0) | Err(_) => Err(invalid(format!("'{}' is not a page number", s.trim()))),
            Ok(n) => Ok(n),
        }
    };

    let mut pages = BTreeSet::new();
    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some((start, end)) = part.split_once('-') {
            let start = page_number(start)?;
            let end = page_number(end)?;
            if start > end {
                return Err(invalid(format!("start {} > end {}", start, end)));
            }
            pages.extend((start..=end).map(|p| p - 1));
        } else {
            pages.insert(page_number(part)? - 1);
        }
    }

    Ok(pages.into_iter().collect())
}
