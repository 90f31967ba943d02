use tracing::{debug, warn};

use crate::capability::ScannedBackend;
use crate::digital::extract_page_words;
use crate::error::ExtractError;
use crate::model::WordBox;
use crate::ocr::OcrWord;
use crate::pdf_reader::PdfSource;

/// Produces the positioned words of one page.
pub trait WordExtractor: Send + Sync {
    fn extract_words(&self, page: u32) -> Result<Vec<WordBox>, ExtractError>;
}

/// Reads words from the PDF text layer.
pub(crate) struct DigitalExtractor<'a> {
    pub source: &'a PdfSource,
    pub x_tolerance: f32,
    pub y_tolerance: f32,
}

impl WordExtractor for DigitalExtractor<'_> {
    fn extract_words(&self, page: u32) -> Result<Vec<WordBox>, ExtractError> {
        extract_page_words(self.source, page, self.x_tolerance, self.y_tolerance)
    }
}

/// Rasterizes a page and recovers words with OCR.
pub(crate) struct ScannedExtractor<'a> {
    pub bytes: &'a [u8],
    pub source: &'a PdfSource,
    pub backend: &'a ScannedBackend,
    pub dpi: u32,
}

impl WordExtractor for ScannedExtractor<'_> {
    fn extract_words(&self, page: u32) -> Result<Vec<WordBox>, ExtractError> {
        let page_size = self.source.page_box(page)?.display_size();
        let raster = self.backend.rasterizer.render(self.bytes, page, self.dpi)?;
        if raster.width_px == 0 || raster.height_px == 0 {
            return Err(ExtractError::Render {
                page,
                reason: "rasterizer produced an empty image".to_string(),
            });
        }
        let ocr_words = self.backend.engine.recognize(&raster.png)?;

        let words = ocr_words
            .iter()
            .map(|word| {
                rescale_ocr_word(
                    word,
                    page,
                    page_size,
                    (raster.width_px, raster.height_px),
                )
            })
            .collect::<Vec<_>>();
        let low = words
            .iter()
            .filter(|word| word.confidence.is_some_and(|c| c < 0.5))
            .count();
        if low > 0 {
            warn!(page, low_confidence_words = low, "ocr returned low-confidence words");
        }
        debug!(
            page,
            words = words.len(),
            width_px = raster.width_px,
            height_px = raster.height_px,
            "ocr page"
        );
        Ok(words)
    }
}

/// Maps an OCR word from raster pixels to page points using the ratio of
/// page size to raster size on each axis. Confidence is kept as reported.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rescale_ocr_word(
    word: &OcrWord,
    page: u32,
    page_size: (f32, f32),
    raster_size: (u32, u32),
) -> WordBox {
    let scale_x = page_size.0 / raster_size.0 as f32;
    let scale_y = page_size.1 / raster_size.1 as f32;
    WordBox::new(
        word.text.clone(),
        word.left * scale_x,
        word.top * scale_y,
        (word.left + word.width) * scale_x,
        (word.top + word.height) * scale_y,
        page,
    )
    .with_confidence(word.confidence)
}

#[cfg(test)]
mod tests {
    use super::rescale_ocr_word;
    use crate::ocr::OcrWord;

    #[test]
    fn rescaled_box_projects_back_to_pixels() {
        let word = OcrWord {
            text: "01/02/2024".to_string(),
            confidence: 0.4,
            left: 170.0,
            top: 440.0,
            width: 283.0,
            height: 41.0,
        };
        let page_size = (612.0, 792.0);
        let raster = (1700, 2200);
        let boxed = rescale_ocr_word(&word, 3, page_size, raster);

        let back_x = 1700.0 / 612.0;
        let back_y = 2200.0 / 792.0;
        assert!((boxed.x0 * back_x - word.left).abs() < 1e-3);
        assert!((boxed.y0 * back_y - word.top).abs() < 1e-3);
        assert!((boxed.x1 * back_x - (word.left + word.width)).abs() < 1e-3);
        assert!((boxed.y1 * back_y - (word.top + word.height)).abs() < 1e-3);
        assert_eq!(boxed.page, 3);
        assert_eq!(boxed.confidence, Some(0.4));
    }
}
