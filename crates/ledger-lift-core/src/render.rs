use crate::error::ExtractError;

/// Largest raster side in pixels; bigger pages are scaled down keeping
/// their aspect ratio.
pub const MAX_DIMENSION_PX: u32 = 4096;

const POINTS_PER_INCH: f32 = 72.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    pub png: Vec<u8>,
    pub width_px: u32,
    pub height_px: u32,
}

pub trait PageRasterizer: Send + Sync {
    /// Renders 1-based `page` of `pdf_bytes` at `dpi`.
    fn render(&self, pdf_bytes: &[u8], page: u32, dpi: u32) -> Result<RasterImage, ExtractError>;
}

/// Pixel size for a page rendered at `dpi`, both sides within
/// `1..=MAX_DIMENSION_PX`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn render_dimensions(width_points: f32, height_points: f32, dpi: u32) -> (u32, u32) {
    let dpi = dpi as f32;
    let raw_w = (width_points * dpi / POINTS_PER_INCH).max(1.0);
    let raw_h = (height_points * dpi / POINTS_PER_INCH).max(1.0);

    let max_dim = raw_w.max(raw_h);
    let ratio = if max_dim > MAX_DIMENSION_PX as f32 {
        MAX_DIMENSION_PX as f32 / max_dim
    } else {
        1.0
    };
    let w = ((raw_w * ratio).round() as u32).clamp(1, MAX_DIMENSION_PX);
    let h = ((raw_h * ratio).round() as u32).clamp(1, MAX_DIMENSION_PX);
    (w, h)
}

/// PDFium-backed rasterizer. Only available with the `render` feature.
///
/// The `Pdfium` handle is bound per call because it is not `Send`; the OS
/// caches the library load.
#[cfg(feature = "render")]
pub struct PdfiumRasterizer;

#[cfg(feature = "render")]
impl PdfiumRasterizer {
    /// Fails with `CapabilityUnavailable` when no PDFium library is found.
    pub fn new() -> Result<Self, ExtractError> {
        load_pdfium()?;
        Ok(Self)
    }
}

/// Binds PDFium from `PDFIUM_DYNAMIC_LIB_PATH`, else from the system
/// library path.
#[cfg(feature = "render")]
fn load_pdfium() -> Result<pdfium_render::prelude::Pdfium, ExtractError> {
    use pdfium_render::prelude::Pdfium;

    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        tracing::debug!(path = %path, "loading pdfium from env var");
        let bindings = Pdfium::bind_to_library(&path).map_err(|err| {
            ExtractError::CapabilityUnavailable(format!("failed to load pdfium from {path}: {err}"))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|err| {
        ExtractError::CapabilityUnavailable(format!(
            "pdfium library not found; set PDFIUM_DYNAMIC_LIB_PATH: {err}"
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

#[cfg(feature = "render")]
impl PageRasterizer for PdfiumRasterizer {
    #[allow(clippy::cast_possible_wrap)]
    fn render(&self, pdf_bytes: &[u8], page: u32, dpi: u32) -> Result<RasterImage, ExtractError> {
        use image::{GenericImageView, ImageOutputFormat};
        use pdfium_render::prelude::PdfRenderConfig;

        let render_error = |reason: String| ExtractError::Render { page, reason };

        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(|err| render_error(format!("failed to load pdf: {err}")))?;
        let pages = document.pages();
        let index = page
            .checked_sub(1)
            .and_then(|index| u16::try_from(index).ok())
            .ok_or_else(|| render_error(format!("page index {page} is not renderable")))?;
        let pdf_page = pages
            .get(index)
            .map_err(|err| render_error(format!("page unavailable: {err}")))?;

        let (target_w, target_h) =
            render_dimensions(pdf_page.width().value, pdf_page.height().value, dpi);
        let config = PdfRenderConfig::new()
            .set_target_width(target_w as i32)
            .set_maximum_height(target_h as i32);
        let bitmap = pdf_page
            .render_with_config(&config)
            .map_err(|err| render_error(format!("rendering failed: {err}")))?;

        let image = bitmap.as_image();
        let (width_px, height_px) = image.dimensions();
        let mut png = Vec::new();
        image
            .write_to(&mut png, ImageOutputFormat::Png)
            .map_err(|err| render_error(format!("png encoding failed: {err}")))?;
        tracing::debug!(page, width_px, height_px, png_size = png.len(), "rendered page");

        Ok(RasterImage {
            png,
            width_px,
            height_px,
        })
    }
}

/// Reports the pixel size a real render would have and a placeholder PNG.
pub struct MockRasterizer {
    page_width: f32,
    page_height: f32,
}

impl MockRasterizer {
    #[must_use]
    pub fn new(page_width: f32, page_height: f32) -> Self {
        Self {
            page_width,
            page_height,
        }
    }
}

impl PageRasterizer for MockRasterizer {
    fn render(&self, _pdf_bytes: &[u8], _page: u32, dpi: u32) -> Result<RasterImage, ExtractError> {
        let (width_px, height_px) = render_dimensions(self.page_width, self.page_height, dpi);
        Ok(RasterImage {
            png: minimal_png(),
            width_px,
            height_px,
        })
    }
}

/// 1x1 white PNG.
fn minimal_png() -> Vec<u8> {
    vec![
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00, 0x00, 0x90,
        0x77, 0x53, 0xDE, 0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, 0x08, 0xD7, 0x63, 0xF8,
        0xCF, 0xC0, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01, 0xE2, 0x21, 0xBC, 0x33, 0x00, 0x00, 0x00,
        0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ]
}

#[cfg(test)]
mod tests {
    use super::{MAX_DIMENSION_PX, render_dimensions};

    #[test]
    fn letter_page_at_200_dpi() {
        let (w, h) = render_dimensions(612.0, 792.0, 200);
        assert_eq!((w, h), (1700, 2200));
    }

    #[test]
    fn oversized_pages_are_capped_keeping_aspect_ratio() {
        let (w, h) = render_dimensions(2000.0, 1000.0, 300);
        assert_eq!(w, MAX_DIMENSION_PX);
        assert_eq!(h, MAX_DIMENSION_PX / 2);
    }

    #[test]
    fn tiny_pages_render_at_least_one_pixel() {
        assert_eq!(render_dimensions(0.0, 0.0, 200), (1, 1));
    }
}
