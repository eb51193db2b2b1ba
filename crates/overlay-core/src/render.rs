//! Page previews
//!
//! Produces the pixel image annotations are placed on, together with the
//! page geometry and pixel size the compositor later needs. The pixel size
//! depends only on the page box, the zoom and the DPI scale, never on the
//! rasterizer backend.

use std::path::Path;

use image::{Rgb, RgbImage};
use lopdf::Document;

use crate::coords::DisplaySize;
use crate::error::OverlayError;
use crate::geometry::PageGeometry;

/// A rasterized page and the geometry it was produced from
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub image: RgbImage,
    /// Unscaled page size in points, whatever the zoom
    pub geometry: PageGeometry,
    pub pixel_width: u32,
    pub pixel_height: u32,
}

impl RenderedPage {
    /// Display size to capture annotations against
    pub fn display_size(&self) -> DisplaySize {
        DisplaySize::new(f64::from(self.pixel_width), f64::from(self.pixel_height))
    }
}

/// Backend that turns one page into pixels of an exact size
pub trait Rasterizer {
    fn rasterize(
        &self,
        source: &[u8],
        page_index: u32,
        width: u32,
        height: u32,
    ) -> Result<RgbImage, OverlayError>;
}

/// White page of the right size; enough for geometry-only previews and tests
#[derive(Debug, Clone, Copy, Default)]
pub struct BlankRasterizer;

impl Rasterizer for BlankRasterizer {
    fn rasterize(
        &self,
        _source: &[u8],
        _page_index: u32,
        width: u32,
        height: u32,
    ) -> Result<RgbImage, OverlayError> {
        Ok(RgbImage::from_pixel(width, height, Rgb([255, 255, 255])))
    }
}

pub struct PageRenderer<R = BlankRasterizer> {
    rasterizer: R,
    dpi_scale: f64,
}

impl PageRenderer<BlankRasterizer> {
    pub fn blank(dpi_scale: f64) -> Self {
        Self::new(BlankRasterizer, dpi_scale)
    }
}

impl<R: Rasterizer> PageRenderer<R> {
    pub fn new(rasterizer: R, dpi_scale: f64) -> Self {
        let dpi_scale = if dpi_scale.is_finite() && dpi_scale > 0.0 {
            dpi_scale
        } else {
            tracing::warn!("Invalid DPI scale {}, using 1.0", dpi_scale);
            1.0
        };
        Self {
            rasterizer,
            dpi_scale,
        }
    }

    pub fn render_page(
        &self,
        path: &Path,
        page_index: u32,
        zoom: f64,
    ) -> Result<RenderedPage, OverlayError> {
        let bytes = std::fs::read(path)
            .map_err(|e| OverlayError::DocumentUnreadable(format!("{}: {}", path.display(), e)))?;
        self.render_bytes(&bytes, page_index, zoom)
    }

    pub fn render_bytes(
        &self,
        source: &[u8],
        page_index: u32,
        zoom: f64,
    ) -> Result<RenderedPage, OverlayError> {
        let doc = Document::load_mem(source).map_err(OverlayError::unreadable)?;
        let geometry = PageGeometry::from_document(&doc, page_index)?;

        let zoom = if zoom.is_finite() && zoom > 0.0 {
            zoom
        } else {
            tracing::warn!("Invalid zoom {}, rendering at 1.0", zoom);
            1.0
        };
        let (pixel_width, pixel_height) = pixel_dimensions(&geometry, zoom * self.dpi_scale)
            .ok_or_else(|| {
                OverlayError::DocumentUnreadable(format!(
                    "page {} at zoom {} exceeds {} preview pixels",
                    page_index, zoom, MAX_PREVIEW_PIXELS
                ))
            })?;
        tracing::debug!(
            page_index,
            zoom,
            pixel_width,
            pixel_height,
            "Rendering page preview"
        );

        let image = self
            .rasterizer
            .rasterize(source, page_index, pixel_width, pixel_height)?;
        Ok(RenderedPage {
            image,
            geometry,
            pixel_width,
            pixel_height,
        })
    }
}

/// Largest preview a renderer will allocate (about 400 MB of RGB)
pub const MAX_PREVIEW_PIXELS: u64 = 1 << 27;

/// Pixel size of a page rendered at `scale` pixels per point, at least 1x1.
/// `None` when the result would exceed [`MAX_PREVIEW_PIXELS`].
pub fn pixel_dimensions(geometry: &PageGeometry, scale: f64) -> Option<(u32, u32)> {
    let to_pixels = |points: f64| -> Option<u32> {
        let pixels = (points * scale).round().max(1.0);
        (pixels.is_finite() && pixels <= f64::from(u32::MAX)).then_some(pixels as u32)
    };
    let width = to_pixels(geometry.width_points)?;
    let height = to_pixels(geometry.height_points)?;
    u64::from(width)
        .checked_mul(u64::from(height))
        .filter(|total| *total <= MAX_PREVIEW_PIXELS)
        .map(|_| (width, height))
}

#[cfg(feature = "pdfium")]
pub use pdfium_backend::PdfiumRasterizer;

#[cfg(feature = "pdfium")]
mod pdfium_backend {
    use image::{DynamicImage, RgbImage, RgbaImage};
    use pdfium_render::prelude::*;

    use super::Rasterizer;
    use crate::error::OverlayError;

    /// Rasterizer backed by a PDFium shared library
    pub struct PdfiumRasterizer {
        pdfium: Pdfium,
    }

    impl PdfiumRasterizer {
        /// Bind to PDFium next to the executable, in the working directory,
        /// or on the system library path, in that order.
        pub fn bind() -> Result<Self, OverlayError> {
            let exe_dir = std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|p| p.to_path_buf()));

            if let Some(dir) = exe_dir {
                if let Ok(bindings) =
                    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
                {
                    return Ok(Self {
                        pdfium: Pdfium::new(bindings),
                    });
                }
            }

            let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library())
                .map_err(|e| OverlayError::Config(format!("PDFium unavailable: {}", e)))?;
            Ok(Self {
                pdfium: Pdfium::new(bindings),
            })
        }
    }

    impl Rasterizer for PdfiumRasterizer {
        fn rasterize(
            &self,
            source: &[u8],
            page_index: u32,
            width: u32,
            height: u32,
        ) -> Result<RgbImage, OverlayError> {
            let document = self
                .pdfium
                .load_pdf_from_byte_slice(source, None)
                .map_err(OverlayError::unreadable)?;
            let index = u16::try_from(page_index)
                .map_err(|_| OverlayError::DocumentUnreadable(format!("page index {} too large", page_index)))?;
            let page = document.pages().get(index).map_err(OverlayError::unreadable)?;

            let config = PdfRenderConfig::new()
                .set_target_width(width as i32)
                .set_target_height(height as i32);
            let bitmap = page
                .render_with_config(&config)
                .map_err(OverlayError::unreadable)?;

            let rgba = RgbaImage::from_raw(width, height, bitmap.as_rgba_bytes().to_vec())
                .ok_or_else(|| {
                    OverlayError::DocumentUnreadable(format!(
                        "PDFium returned a bitmap that is not {}x{}",
                        width, height
                    ))
                })?;
            Ok(DynamicImage::ImageRgba8(rgba).to_rgb8())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Object};

    fn create_test_pdf(media_box: [i64; 4]) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => media_box.iter().map(|v| Object::Integer(*v)).collect::<Vec<_>>(),
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    #[test]
    fn test_pixel_size_follows_zoom_and_dpi() {
        let pdf = create_test_pdf([0, 0, 612, 792]);
        let renderer = PageRenderer::blank(2.0);

        let page = renderer.render_bytes(&pdf, 0, 1.0).unwrap();
        assert_eq!((page.pixel_width, page.pixel_height), (1224, 1584));
        assert_eq!(page.image.dimensions(), (1224, 1584));
        assert_eq!(page.geometry, PageGeometry::new(612.0, 792.0));

        let zoomed = renderer.render_bytes(&pdf, 0, 0.5).unwrap();
        assert_eq!((zoomed.pixel_width, zoomed.pixel_height), (612, 792));
        assert_eq!(zoomed.geometry, page.geometry);
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let pdf = create_test_pdf([0, 0, 595, 842]);
        let renderer = PageRenderer::blank(2.0);
        let a = renderer.render_bytes(&pdf, 0, 1.3).unwrap();
        let b = renderer.render_bytes(&pdf, 0, 1.3).unwrap();
        assert_eq!((a.pixel_width, a.pixel_height), (b.pixel_width, b.pixel_height));
        assert_eq!(a.image, b.image);
    }

    #[test]
    fn test_invalid_zoom_renders_at_one() {
        let pdf = create_test_pdf([0, 0, 100, 200]);
        let renderer = PageRenderer::blank(1.0);
        let page = renderer.render_bytes(&pdf, 0, f64::NAN).unwrap();
        assert_eq!((page.pixel_width, page.pixel_height), (100, 200));
    }

    #[test]
    fn test_display_size_matches_pixels() {
        let pdf = create_test_pdf([0, 0, 100, 200]);
        let page = PageRenderer::blank(2.0).render_bytes(&pdf, 0, 1.0).unwrap();
        assert_eq!(page.display_size(), DisplaySize::new(200.0, 400.0));
    }

    #[test]
    fn test_bad_inputs_are_unreadable() {
        let renderer = PageRenderer::blank(2.0);
        assert!(matches!(
            renderer.render_bytes(b"%PDF-garbage", 0, 1.0),
            Err(OverlayError::DocumentUnreadable(_))
        ));

        let pdf = create_test_pdf([0, 0, 100, 100]);
        assert!(matches!(
            renderer.render_bytes(&pdf, 3, 1.0),
            Err(OverlayError::DocumentUnreadable(_))
        ));
        assert!(matches!(
            renderer.render_page(Path::new("/nonexistent/file.pdf"), 0, 1.0),
            Err(OverlayError::DocumentUnreadable(_))
        ));
    }

    #[test]
    fn test_pixel_dimensions_never_zero() {
        let geometry = PageGeometry::new(0.2, 0.2);
        assert_eq!(pixel_dimensions(&geometry, 1.0), Some((1, 1)));
    }

    #[test]
    fn test_huge_zoom_is_rejected() {
        let pdf = create_test_pdf([0, 0, 612, 792]);
        let renderer = PageRenderer::blank(2.0);
        assert!(matches!(
            renderer.render_bytes(&pdf, 0, 1.0e7),
            Err(OverlayError::DocumentUnreadable(_))
        ));
        assert!(pixel_dimensions(&PageGeometry::new(612.0, 792.0), 1.0e12).is_none());
        // 16384 x 8192 is exactly the budget
        assert_eq!(
            pixel_dimensions(&PageGeometry::new(16384.0, 8192.0), 1.0),
            Some((16384, 8192))
        );
        assert!(pixel_dimensions(&PageGeometry::new(16384.0, 8193.0), 1.0).is_none());
    }
}
