//! Font resolution and metrics
//!
//! A requested family resolves, in order, to an outline file from the
//! configured fonts directory, then to one of the standard Type1 faces, and
//! finally to the default face. Resolution never fails; a substitution is
//! reported so the caller can surface it.

pub mod embed;
pub mod encoding;
pub mod outline;
pub mod standard;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub use embed::add_font_objects;
pub use outline::OutlineFont;
pub use standard::StandardFont;

/// Family used when nothing else is configured
pub const DEFAULT_FAMILY: &str = "Helvetica";

const OUTLINE_EXTENSIONS: [&str; 2] = ["ttf", "otf"];

/// A face the compositor can measure and write
#[derive(Debug, Clone)]
pub enum ResolvedFont {
    Standard(StandardFont),
    Outline(Arc<OutlineFont>),
}

impl ResolvedFont {
    pub fn base_font_name(&self) -> &str {
        match self {
            ResolvedFont::Standard(font) => font.base_font_name(),
            ResolvedFont::Outline(font) => &font.postscript_name,
        }
    }

    /// Identity used to share one font object between annotations
    pub fn cache_key(&self) -> String {
        match self {
            ResolvedFont::Standard(font) => format!("std:{}", font.base_font_name()),
            ResolvedFont::Outline(font) => {
                format!("ttf:{}:{:p}", font.postscript_name, Arc::as_ptr(&font.data))
            }
        }
    }

    fn glyph_width(&self, code: u8) -> u16 {
        match self {
            ResolvedFont::Standard(font) => font.glyph_width(code),
            ResolvedFont::Outline(font) => font.glyph_width(code),
        }
    }

    /// Width of `text` in points at `size`
    pub fn text_width(&self, text: &str, size: f64) -> f64 {
        let units: u32 = encoding::encode(text)
            .into_iter()
            .map(|code| u32::from(self.glyph_width(code)))
            .sum();
        f64::from(units) * size / 1000.0
    }
}

/// Outcome of resolving one family name
#[derive(Debug, Clone)]
pub struct FontResolution {
    pub font: ResolvedFont,
    /// Set when the requested family could not be honoured
    pub fallback: bool,
}

/// Resolves family names; outline files are parsed once and cached
#[derive(Debug)]
pub struct FontResolver {
    fonts_dir: Option<PathBuf>,
    default_font: StandardFont,
    outline_cache: Mutex<HashMap<String, Option<Arc<OutlineFont>>>>,
}

impl FontResolver {
    pub fn new(fonts_dir: Option<PathBuf>, default_family: &str) -> Self {
        let default_font = StandardFont::from_family(default_family).unwrap_or_else(|| {
            tracing::warn!(
                "Default font '{}' is not a standard face, using {}",
                default_family,
                DEFAULT_FAMILY
            );
            StandardFont::Helvetica
        });
        Self {
            fonts_dir,
            default_font,
            outline_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn default_font(&self) -> StandardFont {
        self.default_font
    }

    pub fn resolve(&self, family: &str) -> FontResolution {
        if let Some(font) = self.outline(family) {
            tracing::debug!("Font '{}' resolved to outline {}", family, font.postscript_name);
            return FontResolution {
                font: ResolvedFont::Outline(font),
                fallback: false,
            };
        }

        if let Some(font) = StandardFont::from_family(family) {
            tracing::debug!("Font '{}' resolved to {}", family, font.base_font_name());
            return FontResolution {
                font: ResolvedFont::Standard(font),
                fallback: false,
            };
        }

        tracing::warn!(
            "Font '{}' not found, substituting {}",
            family,
            self.default_font.base_font_name()
        );
        FontResolution {
            font: ResolvedFont::Standard(self.default_font),
            fallback: true,
        }
    }

    fn outline(&self, family: &str) -> Option<Arc<OutlineFont>> {
        let dir = self.fonts_dir.as_deref()?;
        let key = normalize_family(family);
        if key.is_empty() {
            return None;
        }

        if let Ok(cache) = self.outline_cache.lock() {
            if let Some(cached) = cache.get(&key) {
                return cached.clone();
            }
        }

        let loaded = find_font_file(dir, &key).and_then(|path| match OutlineFont::load(&path) {
            Ok(font) => Some(Arc::new(font)),
            Err(e) => {
                tracing::warn!("Ignoring unreadable font file {}: {}", path.display(), e);
                None
            }
        });

        if let Ok(mut cache) = self.outline_cache.lock() {
            cache.insert(key, loaded.clone());
        }
        loaded
    }
}

impl Default for FontResolver {
    fn default() -> Self {
        Self::new(None, DEFAULT_FAMILY)
    }
}

/// Lowercase with spaces, hyphens and underscores removed
fn normalize_family(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// First `.ttf`/`.otf` in `dir` whose stem matches `key`, in file-name order
fn find_font_file(dir: &Path, key: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut candidates: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .map(|ext| {
                    let ext = ext.to_string_lossy().to_lowercase();
                    OUTLINE_EXTENSIONS.contains(&ext.as_str())
                })
                .unwrap_or(false)
        })
        .filter(|path| {
            path.file_stem()
                .map(|stem| normalize_family(&stem.to_string_lossy()) == key)
                .unwrap_or(false)
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}
