//! Outline (TrueType/OpenType) font files
//!
//! A face is parsed once with ttf-parser; only the metrics the compositor
//! needs are kept next to the raw bytes that get embedded.

use std::path::Path;
use std::sync::Arc;

use super::encoding;

/// Everything needed to measure and embed one outline face
#[derive(Debug)]
pub struct OutlineFont {
    /// PostScript-safe name used for /BaseFont and /FontName
    pub postscript_name: String,
    pub data: Arc<Vec<u8>>,
    /// CFF-flavoured OpenType ("OTTO") goes into /FontFile3, glyf into /FontFile2
    pub is_cff: bool,
    /// Advance widths for WinAnsi codes 32..=255, in 1/1000 em
    pub widths: Vec<u16>,
    pub ascent: i32,
    pub descent: i32,
    pub cap_height: i32,
    pub bbox: [i32; 4],
    pub italic: bool,
    pub fixed_pitch: bool,
}

pub const FIRST_CHAR: u8 = 32;
pub const LAST_CHAR: u8 = 255;

impl OutlineFont {
    pub fn load(path: &Path) -> Result<Self, String> {
        let data = std::fs::read(path).map_err(|e| format!("{}: {}", path.display(), e))?;
        let fallback_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Embedded".to_string());
        Self::from_bytes(data, &fallback_name)
    }

    pub fn from_bytes(data: Vec<u8>, fallback_name: &str) -> Result<Self, String> {
        let face = ttf_parser::Face::parse(&data, 0).map_err(|e| e.to_string())?;

        let units = f64::from(face.units_per_em().max(1));
        let to_pdf = |v: i32| (f64::from(v) * 1000.0 / units).round() as i32;

        let missing_width = face
            .glyph_index(' ')
            .and_then(|id| face.glyph_hor_advance(id))
            .unwrap_or(0);

        let widths = (FIRST_CHAR..=LAST_CHAR)
            .map(|code| {
                let advance = encoding::decode_byte(code)
                    .and_then(|c| face.glyph_index(c))
                    .and_then(|id| face.glyph_hor_advance(id))
                    .unwrap_or(missing_width);
                to_pdf(i32::from(advance)).max(0) as u16
            })
            .collect();

        let bbox = face.global_bounding_box();
        let postscript_name = face
            .names()
            .into_iter()
            .find(|n| n.name_id == ttf_parser::name_id::POST_SCRIPT_NAME)
            .and_then(|n| n.to_string())
            .map(|name| sanitize_name(&name))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| sanitize_name(fallback_name));

        let ascent = to_pdf(i32::from(face.ascender()));
        let descent = to_pdf(i32::from(face.descender()));
        let cap_height = face
            .capital_height()
            .map(|h| to_pdf(i32::from(h)))
            .unwrap_or(ascent);
        let bbox = [
            to_pdf(i32::from(bbox.x_min)),
            to_pdf(i32::from(bbox.y_min)),
            to_pdf(i32::from(bbox.x_max)),
            to_pdf(i32::from(bbox.y_max)),
        ];
        let italic = face.is_italic();
        let fixed_pitch = face.is_monospaced();

        Ok(Self {
            postscript_name,
            is_cff: data.starts_with(b"OTTO"),
            data: Arc::new(data),
            widths,
            ascent,
            descent,
            cap_height,
            bbox,
            italic,
            fixed_pitch,
        })
    }

    /// Advance width of one WinAnsi code, in 1/1000 em
    pub fn glyph_width(&self, code: u8) -> u16 {
        if code < FIRST_CHAR {
            return 0;
        }
        self.widths
            .get((code - FIRST_CHAR) as usize)
            .copied()
            .unwrap_or(0)
    }

    /// FontDescriptor /Flags
    pub fn descriptor_flags(&self) -> i64 {
        const FIXED_PITCH: i64 = 1;
        const NONSYMBOLIC: i64 = 1 << 5;
        const ITALIC: i64 = 1 << 6;

        let mut flags = NONSYMBOLIC;
        if self.fixed_pitch {
            flags |= FIXED_PITCH;
        }
        if self.italic {
            flags |= ITALIC;
        }
        flags
    }
}

/// Strip characters a PDF name should not carry
fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_graphic() && !"()<>[]{}/%#".contains(*c))
        .collect()
}
