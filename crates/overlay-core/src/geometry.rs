//! Page geometry in PDF points
//!
//! Reads the visible box of a page once per export. The box is what a
//! rasterizer shows on screen, so it is what the pixel space is anchored to.

use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::{Deserialize, Serialize};

use crate::error::OverlayError;

/// US Letter, used when a page carries no usable box at all
const LETTER: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Guard against cyclic /Parent chains in malformed files
const MAX_TREE_DEPTH: usize = 32;

/// Immutable page rectangle in points (1/72 inch), origin bottom-left
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PageGeometry {
    /// Lower-left corner of the visible box
    #[serde(default)]
    pub x0: f64,
    #[serde(default)]
    pub y0: f64,
    pub width_points: f64,
    pub height_points: f64,
    /// Page rotation in degrees (0, 90, 180, 270)
    #[serde(default)]
    pub rotation: i32,
}

impl PageGeometry {
    pub fn new(width_points: f64, height_points: f64) -> Self {
        Self {
            x0: 0.0,
            y0: 0.0,
            width_points,
            height_points,
            rotation: 0,
        }
    }

    /// Build from a `[x0, y0, x1, y1]` rectangle, normalizing corner order
    pub fn from_rect(rect: [f64; 4]) -> Self {
        let [ax, ay, bx, by] = rect;
        Self {
            x0: ax.min(bx),
            y0: ay.min(by),
            width_points: (bx - ax).abs(),
            height_points: (by - ay).abs(),
            rotation: 0,
        }
    }

    /// Geometry of the page at `page_index` (0-based)
    pub fn from_document(doc: &Document, page_index: u32) -> Result<Self, OverlayError> {
        let page_id = page_object_id(doc, page_index)?;
        let page_dict = doc.get_dictionary(page_id).map_err(|e| {
            OverlayError::DocumentUnreadable(format!("page {} is not a dictionary: {}", page_index, e))
        })?;

        let rect = inherited(doc, page_dict, b"CropBox")
            .and_then(|obj| parse_box(doc, obj))
            .or_else(|| inherited(doc, page_dict, b"MediaBox").and_then(|obj| parse_box(doc, obj)))
            .unwrap_or(LETTER);

        let rotation = inherited(doc, page_dict, b"Rotate")
            .and_then(|obj| obj.as_i64().ok())
            .map(|angle| normalize_rotation(angle as i32))
            .unwrap_or(0);

        Ok(Self {
            rotation,
            ..Self::from_rect(rect)
        })
    }

    pub fn is_valid(&self) -> bool {
        self.width_points.is_finite()
            && self.height_points.is_finite()
            && self.width_points > 0.0
            && self.height_points > 0.0
    }
}

/// Geometry of every page, in page order
pub fn document_geometries(bytes: &[u8]) -> Result<Vec<PageGeometry>, OverlayError> {
    let doc = Document::load_mem(bytes).map_err(OverlayError::unreadable)?;
    let page_count = doc.get_pages().len() as u32;
    (0..page_count)
        .map(|index| PageGeometry::from_document(&doc, index))
        .collect()
}

/// Resolve a 0-based page index to its object id
pub fn page_object_id(doc: &Document, page_index: u32) -> Result<ObjectId, OverlayError> {
    let pages = doc.get_pages();
    let page_number = page_index.checked_add(1);
    page_number.and_then(|n| pages.get(&n).copied()).ok_or_else(|| {
        OverlayError::DocumentUnreadable(format!(
            "page index {} out of range (page_count={})",
            page_index,
            pages.len()
        ))
    })
}

/// Look up an inheritable page attribute, walking up the page tree
pub(crate) fn inherited<'a>(
    doc: &'a Document,
    page_dict: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Object> {
    let mut dict = page_dict;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        let parent_id = dict.get(b"Parent").ok()?.as_reference().ok()?;
        dict = doc.get_dictionary(parent_id).ok()?;
    }
    None
}

/// Parse a box array [x1, y1, x2, y2], following an indirect reference
fn parse_box(doc: &Document, obj: &Object) -> Option<[f64; 4]> {
    let array = match obj {
        Object::Reference(id) => doc.get_object(*id).ok()?.as_array().ok()?,
        other => other.as_array().ok()?,
    };
    if array.len() != 4 {
        return None;
    }

    let mut result = [0.0; 4];
    for (slot, value) in result.iter_mut().zip(array) {
        *slot = match value {
            Object::Integer(n) => *n as f64,
            Object::Real(n) => *n as f64,
            _ => return None,
        };
    }
    if (result[2] - result[0]).abs() < f64::EPSILON || (result[3] - result[1]).abs() < f64::EPSILON
    {
        return None;
    }
    Some(result)
}

/// Normalize rotation to 0, 90, 180, or 270
fn normalize_rotation(angle: i32) -> i32 {
    angle.rem_euclid(360)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn doc_with_pages(page_dicts: Vec<Dictionary>, pages_extra: Dictionary) -> Document {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::new();
        for mut page in page_dicts {
            page.set("Type", "Page");
            page.set("Parent", Object::Reference(pages_id));
            kids.push(Object::Reference(doc.add_object(page)));
        }
        let mut pages = dictionary! {
            "Type" => "Pages",
            "Count" => kids.len() as i64,
            "Kids" => kids,
        };
        for (key, value) in pages_extra.iter() {
            pages.set(key.clone(), value.clone());
        }
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));
        doc
    }

    #[test]
    fn test_normalize_rotation() {
        assert_eq!(normalize_rotation(0), 0);
        assert_eq!(normalize_rotation(450), 90);
        assert_eq!(normalize_rotation(-90), 270);
    }

    #[test]
    fn test_reads_media_box() {
        let doc = doc_with_pages(
            vec![dictionary! {
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }],
            Dictionary::new(),
        );
        let geometry = PageGeometry::from_document(&doc, 0).unwrap();
        assert_eq!(geometry, PageGeometry::new(595.0, 842.0));
    }

    #[test]
    fn test_crop_box_wins_over_media_box() {
        let doc = doc_with_pages(
            vec![dictionary! {
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "CropBox" => vec![36.into(), 36.into(), 576.into(), 756.into()],
            }],
            Dictionary::new(),
        );
        let geometry = PageGeometry::from_document(&doc, 0).unwrap();
        assert_eq!(geometry.x0, 36.0);
        assert_eq!(geometry.y0, 36.0);
        assert_eq!(geometry.width_points, 540.0);
        assert_eq!(geometry.height_points, 720.0);
    }

    #[test]
    fn test_inherits_media_box_and_rotation_from_parent() {
        let doc = doc_with_pages(
            vec![Dictionary::new()],
            dictionary! {
                "MediaBox" => vec![0.into(), 0.into(), 300.into(), 400.into()],
                "Rotate" => 90,
            },
        );
        let geometry = PageGeometry::from_document(&doc, 0).unwrap();
        assert_eq!(geometry.width_points, 300.0);
        assert_eq!(geometry.height_points, 400.0);
        assert_eq!(geometry.rotation, 90);
    }

    #[test]
    fn test_missing_box_defaults_to_letter() {
        let doc = doc_with_pages(vec![Dictionary::new()], Dictionary::new());
        let geometry = PageGeometry::from_document(&doc, 0).unwrap();
        assert_eq!(geometry, PageGeometry::new(612.0, 792.0));
    }

    #[test]
    fn test_page_index_out_of_range() {
        let doc = doc_with_pages(vec![Dictionary::new()], Dictionary::new());
        let err = PageGeometry::from_document(&doc, 1).unwrap_err();
        assert!(matches!(err, OverlayError::DocumentUnreadable(_)));
    }

    #[test]
    fn test_max_page_index_is_unreadable() {
        let doc = doc_with_pages(vec![Dictionary::new()], Dictionary::new());
        assert!(matches!(
            page_object_id(&doc, u32::MAX),
            Err(OverlayError::DocumentUnreadable(_))
        ));
        assert!(matches!(
            PageGeometry::from_document(&doc, u32::MAX),
            Err(OverlayError::DocumentUnreadable(_))
        ));
    }

    #[test]
    fn test_document_geometries_in_page_order() {
        let mut doc = doc_with_pages(
            vec![
                dictionary! { "MediaBox" => vec![0.into(), 0.into(), 100.into(), 200.into()] },
                dictionary! { "MediaBox" => vec![0.into(), 0.into(), 300.into(), 400.into()] },
            ],
            Dictionary::new(),
        );
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();

        let geometries = document_geometries(&bytes).unwrap();
        assert_eq!(
            geometries,
            vec![PageGeometry::new(100.0, 200.0), PageGeometry::new(300.0, 400.0)]
        );
    }

    #[test]
    fn test_from_rect_normalizes_corners() {
        let geometry = PageGeometry::from_rect([100.0, 200.0, 0.0, 0.0]);
        assert_eq!(geometry, PageGeometry::new(100.0, 200.0));
    }
}
