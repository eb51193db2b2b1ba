//! Editing session
//!
//! Holds what an editor front end mutates while the user works on a page:
//! the current style, the placed boxes in z-order, the selection and the
//! display size the boxes are measured in. Export works on a
//! [`EditSession::snapshot`], never on the live session.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::annotation::{Alignment, AnnotationRecord, RgbColor, TextAnnotation};
use crate::compositor::PageOverlay;
use crate::coords::DisplaySize;
use crate::error::OverlayError;
use crate::fonts::DEFAULT_FAMILY;
use crate::geometry::PageGeometry;
use crate::render::RenderedPage;

/// Palette offered by the editor
pub const DEFAULT_COLORS: [&str; 7] = [
    "#000000", "#FF0000", "#0000FF", "#008000", "#FFA500", "#800080", "#808080",
];

pub const NEW_BOX_WIDTH: f64 = 250.0;
pub const NEW_BOX_HEIGHT: f64 = 40.0;
pub const MIN_BOX_WIDTH: f64 = 30.0;
pub const MIN_BOX_HEIGHT: f64 = 20.0;

/// Style applied to new boxes and to the selected one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    pub font_family: String,
    pub font_size: f64,
    pub color: RgbColor,
    pub alignment: Alignment,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_family: DEFAULT_FAMILY.to_string(),
            font_size: 12.0,
            color: RgbColor::BLACK,
            alignment: Alignment::Left,
        }
    }
}

/// An annotation plus the on-screen height of its box
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedBox {
    pub annotation: TextAnnotation,
    pub height: f64,
}

impl PlacedBox {
    pub fn width(&self) -> f64 {
        self.annotation.box_width.unwrap_or(NEW_BOX_WIDTH)
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        let a = &self.annotation;
        x >= a.x && x <= a.x + self.width() && y >= a.y && y <= a.y + self.height
    }
}

#[derive(Debug, Clone)]
pub struct EditSession {
    page_index: u32,
    display: DisplaySize,
    geometry: Option<PageGeometry>,
    style: TextStyle,
    boxes: Vec<PlacedBox>,
    selected: Option<usize>,
}

impl EditSession {
    pub fn new(page_index: u32, display: DisplaySize) -> Self {
        Self {
            page_index,
            display,
            geometry: None,
            style: TextStyle::default(),
            boxes: Vec::new(),
            selected: None,
        }
    }

    /// Session anchored to a freshly rendered preview
    pub fn for_rendered_page(page_index: u32, page: &RenderedPage) -> Self {
        Self {
            geometry: Some(page.geometry),
            ..Self::new(page_index, page.display_size())
        }
    }

    pub fn page_index(&self) -> u32 {
        self.page_index
    }

    pub fn display(&self) -> DisplaySize {
        self.display
    }

    pub fn style(&self) -> &TextStyle {
        &self.style
    }

    /// Boxes in z-order, bottom first
    pub fn boxes(&self) -> &[PlacedBox] {
        &self.boxes
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected(&self) -> Option<&PlacedBox> {
        self.selected.and_then(|i| self.boxes.get(i))
    }

    fn selected_mut(&mut self) -> Option<&mut PlacedBox> {
        self.selected.and_then(|i| self.boxes.get_mut(i))
    }

    /// Place an empty box with the current style and select it
    pub fn add_box_at(&mut self, x: f64, y: f64) -> usize {
        let annotation = TextAnnotation {
            box_width: Some(NEW_BOX_WIDTH),
            font_family: self.style.font_family.clone(),
            font_size: self.style.font_size,
            color: self.style.color,
            alignment: self.style.alignment,
            ..TextAnnotation::new("", x.max(0.0), y.max(0.0))
        };
        self.boxes.push(PlacedBox {
            annotation,
            height: NEW_BOX_HEIGHT,
        });
        let index = self.boxes.len() - 1;
        self.selected = Some(index);
        index
    }

    /// Topmost box under the point
    pub fn hit_test(&self, x: f64, y: f64) -> Option<usize> {
        self.boxes.iter().rposition(|b| b.contains(x, y))
    }

    /// Select the box at `index`, or clear the selection with `None`.
    /// An out-of-range index clears it too.
    pub fn select(&mut self, index: Option<usize>) -> Option<&PlacedBox> {
        self.selected = index.filter(|i| *i < self.boxes.len());
        self.selected()
    }

    /// Click handling: select whatever is under the point
    pub fn select_at(&mut self, x: f64, y: f64) -> Option<&PlacedBox> {
        let hit = self.hit_test(x, y);
        self.select(hit)
    }

    /// Make `style` current and apply it to the selected box
    pub fn apply_style(&mut self, style: TextStyle) {
        if let Some(placed) = self.selected_mut() {
            let a = &mut placed.annotation;
            a.font_family = style.font_family.clone();
            a.font_size = style.font_size;
            a.color = style.color;
            a.alignment = style.alignment;
        }
        self.style = style;
    }

    pub fn set_alignment(&mut self, alignment: Alignment) {
        self.style.alignment = alignment;
        if let Some(placed) = self.selected_mut() {
            placed.annotation.alignment = alignment;
        }
    }

    /// Pick one of [`DEFAULT_COLORS`] for the style and the selected box
    pub fn set_palette_color(&mut self, index: usize) -> bool {
        let Some(color) = DEFAULT_COLORS
            .get(index)
            .and_then(|hex| RgbColor::from_hex(hex).ok())
        else {
            return false;
        };
        self.style.color = color;
        if let Some(placed) = self.selected_mut() {
            placed.annotation.color = color;
        }
        true
    }

    pub fn set_text(&mut self, text: impl Into<String>) -> bool {
        match self.selected_mut() {
            Some(placed) => {
                placed.annotation.content = text.into();
                true
            }
            None => false,
        }
    }

    /// Drag the selected box; it stops at the page's top-left edge
    pub fn move_selected(&mut self, dx: f64, dy: f64) -> bool {
        match self.selected_mut() {
            Some(placed) => {
                let a = &mut placed.annotation;
                a.x = (a.x + dx).max(0.0);
                a.y = (a.y + dy).max(0.0);
                true
            }
            None => false,
        }
    }

    /// Resize the selected box, never below 30x20 px
    pub fn resize_selected(&mut self, width: f64, height: f64) -> bool {
        match self.selected_mut() {
            Some(placed) => {
                placed.annotation.box_width = Some(width.max(MIN_BOX_WIDTH));
                placed.height = height.max(MIN_BOX_HEIGHT);
                true
            }
            None => false,
        }
    }

    pub fn remove_selected(&mut self) -> Option<PlacedBox> {
        let index = self.selected.take()?;
        (index < self.boxes.len()).then(|| self.boxes.remove(index))
    }

    /// The preview was re-rendered at another size: rescale every box so it
    /// stays over the same page content.
    pub fn set_display(&mut self, new_display: DisplaySize) -> bool {
        if !new_display.is_valid() || !self.display.is_valid() {
            tracing::warn!("Ignoring display change to {:?}", new_display);
            return false;
        }

        let fx = new_display.width / self.display.width;
        let fy = match (new_display.height, self.display.height) {
            (Some(new), Some(old)) => new / old,
            _ => fx,
        };
        let font_factor = (fx + fy) / 2.0;

        for placed in &mut self.boxes {
            let a = &mut placed.annotation;
            a.x *= fx;
            a.y *= fy;
            a.box_width = a.box_width.map(|w| w * fx);
            a.font_size *= font_factor;
            placed.height *= fy;
        }
        self.display = new_display;
        true
    }

    /// Copy of the current state for export
    pub fn snapshot(&self) -> PageOverlay {
        PageOverlay {
            page_index: self.page_index,
            display: self.display,
            geometry: self.geometry,
            annotations: self.boxes.iter().map(|b| b.annotation.clone()).collect(),
        }
    }

    pub fn to_session_file(&self) -> SessionFile {
        SessionFile {
            page_index: self.page_index,
            display_img_width: self.display.width,
            display_img_height: self.display.height,
            page_rect: self.geometry.map(|g| {
                [g.x0, g.y0, g.x0 + g.width_points, g.y0 + g.height_points]
            }),
            texts: self
                .boxes
                .iter()
                .map(|b| AnnotationRecord::from(&b.annotation))
                .collect(),
        }
    }

    pub fn from_session_file(file: SessionFile) -> Self {
        let overlay = file.into_overlay();
        Self {
            page_index: overlay.page_index,
            display: overlay.display,
            geometry: overlay.geometry,
            style: TextStyle::default(),
            boxes: overlay
                .annotations
                .into_iter()
                .map(|annotation| PlacedBox {
                    annotation,
                    height: NEW_BOX_HEIGHT,
                })
                .collect(),
            selected: None,
        }
    }
}

/// On-disk form of a session: the editor's save-time records plus the
/// display size they were measured at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionFile {
    #[serde(default)]
    pub page_index: u32,
    pub display_img_width: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_img_height: Option<f64>,
    /// `[x0, y0, x1, y1]` in points
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_rect: Option<[f64; 4]>,
    #[serde(default)]
    pub texts: Vec<AnnotationRecord>,
}

impl SessionFile {
    pub fn from_json(json: &str) -> Result<Self, OverlayError> {
        serde_json::from_str(json).map_err(|e| OverlayError::InvalidSession(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, OverlayError> {
        let json = fs::read_to_string(path)
            .map_err(|e| OverlayError::InvalidSession(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, OverlayError> {
        serde_json::to_string_pretty(self).map_err(|e| OverlayError::InvalidSession(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<(), OverlayError> {
        let json = self.to_json()?;
        fs::write(path, json).map_err(|e| OverlayError::unwritable(path, e))
    }

    pub fn into_overlay(self) -> PageOverlay {
        PageOverlay {
            page_index: self.page_index,
            display: DisplaySize {
                width: self.display_img_width,
                height: self.display_img_height,
            },
            geometry: self.page_rect.map(PageGeometry::from_rect),
            annotations: self.texts.into_iter().map(TextAnnotation::from).collect(),
        }
    }
}
