//! Overlay compositor
//!
//! Draws annotations into the content stream of their target page. The
//! original content is wrapped in `q ... Q` so graphics state it leaves
//! behind cannot leak into the overlay. Fonts are registered in a copy of the
//! page's resources, never in a dictionary another page may share.

use std::collections::{HashMap, HashSet};

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use serde::{Deserialize, Serialize};

use crate::annotation::{RgbColor, TextAnnotation};
use crate::cancel::CancellationToken;
use crate::config::ExportOptions;
use crate::coords::{font_size_to_points, pixel_to_point, DisplaySize, ScaleFactors};
use crate::error::{OverlayError, SkipReason};
use crate::export::{ExportReport, FontFallback};
use crate::fonts::{self, encoding, FontResolver, ResolvedFont};
use crate::geometry::{inherited, page_object_id, PageGeometry};
use crate::layout::{layout_text, PlacedLine, TextBox};

const RESOURCE_PREFIX: &str = "OvlF";

/// Annotations for one page, with the display size they were captured at
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageOverlay {
    /// 0-based
    pub page_index: u32,
    pub display: DisplaySize,
    /// Page rectangle captured with the preview; read from the source when absent
    #[serde(default)]
    pub geometry: Option<PageGeometry>,
    /// Drawn in order, later entries on top
    pub annotations: Vec<TextAnnotation>,
}

impl PageOverlay {
    pub fn new(page_index: u32, display: DisplaySize) -> Self {
        Self {
            page_index,
            display,
            geometry: None,
            annotations: Vec::new(),
        }
    }

    pub fn with_annotations(mut self, annotations: Vec<TextAnnotation>) -> Self {
        self.annotations = annotations;
        self
    }
}

/// Output bytes plus what happened to each annotation
#[derive(Debug, Clone)]
pub struct ComposedDocument {
    pub bytes: Vec<u8>,
    pub report: ExportReport,
}

pub struct Compositor {
    options: ExportOptions,
    fonts: FontResolver,
}

impl Compositor {
    pub fn new(options: ExportOptions) -> Self {
        let fonts = FontResolver::new(options.fonts_dir.clone(), &options.default_font);
        Self { options, fonts }
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Draw every overlay onto `source`, pages strictly in list order.
    ///
    /// Only an unreadable source (or a page index it does not have) and
    /// cancellation without `allow_partial` are errors. When nothing gets
    /// drawn the source bytes come back untouched.
    pub fn compose(
        &self,
        source: &[u8],
        overlays: &[PageOverlay],
        cancel: &CancellationToken,
    ) -> Result<ComposedDocument, OverlayError> {
        self.compose_with_progress(source, overlays, cancel, |_, _| {})
    }

    /// [`Compositor::compose`], calling `on_page(done, total)` after each
    /// finished page
    pub fn compose_with_progress(
        &self,
        source: &[u8],
        overlays: &[PageOverlay],
        cancel: &CancellationToken,
        mut on_page: impl FnMut(usize, usize),
    ) -> Result<ComposedDocument, OverlayError> {
        let mut doc = Document::load_mem(source).map_err(OverlayError::unreadable)?;
        for overlay in overlays {
            page_object_id(&doc, overlay.page_index)?;
        }

        let mut report = ExportReport::default();
        let mut font_objects = FontObjects::default();
        let mut modified = false;

        for overlay in overlays {
            if cancel.is_cancelled() {
                if !self.options.allow_partial {
                    return Err(OverlayError::Cancelled {
                        pages_composed: report.pages_composed,
                    });
                }
                tracing::warn!(
                    "Export cancelled, keeping {} finished page(s)",
                    report.pages_composed
                );
                report.cancelled = true;
                break;
            }

            let span = tracing::info_span!("compose_page", page = overlay.page_index);
            let _enter = span.enter();
            modified |= self.compose_page(&mut doc, overlay, &mut font_objects, &mut report)?;
            report.pages_composed += 1;
            on_page(report.pages_composed, overlays.len());
        }

        if !modified {
            tracing::debug!("No overlay content drawn, returning source unchanged");
            return Ok(ComposedDocument {
                bytes: source.to_vec(),
                report,
            });
        }

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .map_err(|e| OverlayError::unwritable("<memory>", e))?;

        tracing::info!(
            pages = report.pages_composed,
            drawn = report.annotations_drawn,
            skipped = report.skipped.len(),
            "Composed overlay document"
        );
        Ok(ComposedDocument { bytes, report })
    }

    /// Returns whether anything was drawn on the page
    fn compose_page(
        &self,
        doc: &mut Document,
        overlay: &PageOverlay,
        font_objects: &mut FontObjects,
        report: &mut ExportReport,
    ) -> Result<bool, OverlayError> {
        let page_index = overlay.page_index;
        let page_id = page_object_id(doc, page_index)?;

        let geometry = match overlay.geometry {
            Some(geometry) if geometry.is_valid() => geometry,
            _ => PageGeometry::from_document(doc, page_index)?,
        };
        if geometry.rotation != 0 {
            tracing::warn!(
                "Page {} is rotated {} degrees; annotations are mapped as unrotated",
                page_index,
                geometry.rotation
            );
        }

        let Some(scale) = ScaleFactors::derive(overlay.display, &geometry) else {
            let reason = SkipReason::InvalidDisplaySize {
                width: overlay.display.width,
                height: overlay.display.height,
            };
            for index in 0..overlay.annotations.len() {
                report.skip(page_index, index, reason.clone());
            }
            return Ok(false);
        };
        tracing::debug!(sx = scale.x, sy = scale.y, "Derived scale factors");

        let mut page_fonts = PageFonts::new(existing_font_names(doc, page_id));
        let mut operations = Vec::new();

        for (index, annotation) in overlay.annotations.iter().enumerate() {
            if let Err(reason) = annotation.validate() {
                report.skip(page_index, index, reason);
                continue;
            }

            let resolution = self.fonts.resolve(&annotation.font_family);
            if resolution.fallback {
                report.font_fallbacks.push(FontFallback {
                    page_index,
                    index,
                    requested: annotation.font_family.clone(),
                    substituted: resolution.font.base_font_name().to_string(),
                });
            }

            let font_pt = font_size_to_points(annotation.font_size, scale);
            let lines = self.place_lines(annotation, &resolution.font, font_pt, scale, &geometry);
            if lines.is_empty() {
                tracing::debug!(index, "Annotation has no visible text");
                continue;
            }

            let font_id = font_objects.object_for(doc, &resolution.font);
            let resource = page_fonts.name_for(font_id);
            operations.extend(text_operations(&resource, font_pt, annotation.color, &lines));
            report.annotations_drawn += 1;
            tracing::debug!(
                index,
                font = resolution.font.base_font_name(),
                lines = lines.len(),
                "Placed annotation"
            );
        }

        if operations.is_empty() {
            return Ok(false);
        }

        install_fonts(doc, page_id, page_fonts.assigned)?;
        append_overlay(doc, page_id, operations)?;
        Ok(true)
    }

    fn place_lines(
        &self,
        annotation: &TextAnnotation,
        font: &ResolvedFont,
        font_pt: f64,
        scale: ScaleFactors,
        geometry: &PageGeometry,
    ) -> Vec<PlacedLine> {
        let (x, top) = pixel_to_point(annotation.x, annotation.y, scale, geometry);
        let width = match annotation.box_width {
            Some(width) => width * scale.x,
            None => geometry.width_points * self.options.default_box_fraction,
        };
        let text_box = TextBox {
            x,
            top,
            width,
            font_size: font_pt,
            line_height: self.options.line_height,
        };

        let mut lines = layout_text(&annotation.content, &text_box, annotation.alignment, |s| {
            font.text_width(s, font_pt)
        });
        lines.retain(|line| !line.text.is_empty());
        lines
    }
}

/// One font object per face per document, shared by every page
#[derive(Default)]
struct FontObjects {
    by_key: HashMap<String, ObjectId>,
}

impl FontObjects {
    fn object_for(&mut self, doc: &mut Document, font: &ResolvedFont) -> ObjectId {
        let key = font.cache_key();
        if let Some(id) = self.by_key.get(&key) {
            return *id;
        }
        let id = fonts::add_font_objects(doc, font);
        self.by_key.insert(key, id);
        id
    }
}

/// Resource names handed out on one page
struct PageFonts {
    taken: HashSet<Vec<u8>>,
    assigned: Vec<(String, ObjectId)>,
    next: usize,
}

impl PageFonts {
    fn new(taken: HashSet<Vec<u8>>) -> Self {
        Self {
            taken,
            assigned: Vec::new(),
            next: 0,
        }
    }

    fn name_for(&mut self, font_id: ObjectId) -> String {
        if let Some((name, _)) = self.assigned.iter().find(|(_, id)| *id == font_id) {
            return name.clone();
        }
        let name = loop {
            self.next += 1;
            let candidate = format!("{}{}", RESOURCE_PREFIX, self.next);
            if !self.taken.contains(candidate.as_bytes()) {
                break candidate;
            }
        };
        self.assigned.push((name.clone(), font_id));
        name
    }
}

fn resolve_dict(doc: &Document, obj: &Object) -> Option<Dictionary> {
    match obj {
        Object::Dictionary(dict) => Some(dict.clone()),
        Object::Reference(id) => doc.get_dictionary(*id).ok().cloned(),
        _ => None,
    }
}

/// The page's effective resources, inherited ones included
fn effective_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    doc.get_dictionary(page_id)
        .ok()
        .and_then(|page| inherited(doc, page, b"Resources"))
        .and_then(|obj| resolve_dict(doc, obj))
        .unwrap_or_else(Dictionary::new)
}

fn existing_font_names(doc: &Document, page_id: ObjectId) -> HashSet<Vec<u8>> {
    effective_resources(doc, page_id)
        .get(b"Font")
        .ok()
        .and_then(|obj| resolve_dict(doc, obj))
        .map(|fonts| fonts.iter().map(|(name, _)| name.clone()).collect())
        .unwrap_or_default()
}

fn page_dict_mut(doc: &mut Document, page_id: ObjectId) -> Result<&mut Dictionary, OverlayError> {
    doc.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(OverlayError::unreadable)
}

/// Write the page's resources back inline with the new fonts added
fn install_fonts(
    doc: &mut Document,
    page_id: ObjectId,
    assigned: Vec<(String, ObjectId)>,
) -> Result<(), OverlayError> {
    let mut resources = effective_resources(doc, page_id);
    let mut font_dict = resources
        .get(b"Font")
        .ok()
        .and_then(|obj| resolve_dict(doc, obj))
        .unwrap_or_else(Dictionary::new);

    for (name, font_id) in assigned {
        font_dict.set(name, Object::Reference(font_id));
    }
    resources.set("Font", Object::Dictionary(font_dict));

    page_dict_mut(doc, page_id)?.set("Resources", Object::Dictionary(resources));
    Ok(())
}

/// `[q-stream, original..., overlay-stream]`; the overlay restores the
/// original's state with `Q` before drawing
fn append_overlay(
    doc: &mut Document,
    page_id: ObjectId,
    operations: Vec<Operation>,
) -> Result<(), OverlayError> {
    let mut wrapped = Vec::with_capacity(operations.len() + 3);
    wrapped.push(Operation::new("Q", vec![]));
    wrapped.push(Operation::new("q", vec![]));
    wrapped.extend(operations);
    wrapped.push(Operation::new("Q", vec![]));
    // streams are concatenated when read, keep the leading Q a separate token
    let mut overlay = b"\n".to_vec();
    overlay.extend(
        Content {
            operations: wrapped,
        }
        .encode()
        .map_err(|e| OverlayError::unwritable("<memory>", e))?,
    );

    let existing = doc
        .get_dictionary(page_id)
        .ok()
        .and_then(|page| page.get(b"Contents").ok())
        .cloned();

    let mut contents = Vec::new();
    match existing {
        Some(Object::Reference(id)) => match doc.get_object(id) {
            Ok(Object::Array(items)) => contents.extend(items.iter().cloned()),
            _ => contents.push(Object::Reference(id)),
        },
        Some(Object::Array(items)) => contents.extend(items),
        Some(_) => tracing::warn!("Ignoring malformed /Contents on page object {:?}", page_id),
        None => {}
    }

    let prefix_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let overlay_id = doc.add_object(Stream::new(Dictionary::new(), overlay));
    contents.insert(0, Object::Reference(prefix_id));
    contents.push(Object::Reference(overlay_id));

    page_dict_mut(doc, page_id)?.set("Contents", Object::Array(contents));
    Ok(())
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

/// `BT /F size Tf r g b rg (1 0 0 1 x y Tm <hex> Tj)* ET`
fn text_operations(
    resource: &str,
    font_pt: f64,
    color: RgbColor,
    lines: &[PlacedLine],
) -> Vec<Operation> {
    let mut ops = Vec::with_capacity(lines.len() * 2 + 4);
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new(
        "Tf",
        vec![Object::Name(resource.as_bytes().to_vec()), real(font_pt)],
    ));
    ops.push(Operation::new(
        "rg",
        vec![
            Object::Real(color.r),
            Object::Real(color.g),
            Object::Real(color.b),
        ],
    ));
    for line in lines {
        ops.push(Operation::new(
            "Tm",
            vec![
                1.into(),
                0.into(),
                0.into(),
                1.into(),
                real(line.x),
                real(line.baseline),
            ],
        ));
        ops.push(Operation::new(
            "Tj",
            vec![Object::String(
                encoding::encode(&line.text),
                StringFormat::Hexadecimal,
            )],
        ));
    }
    ops.push(Operation::new("ET", vec![]));
    ops
}
