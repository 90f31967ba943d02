use crate::error::ExtractError;

/// One word as reported by an OCR engine, in raster pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    pub text: String,
    /// `0.0..=1.0`.
    pub confidence: f32,
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

pub trait OcrEngine: Send + Sync {
    /// Recognizes words in a PNG image.
    fn recognize(&self, png: &[u8]) -> Result<Vec<OcrWord>, ExtractError>;
}

/// Parses Tesseract TSV output into words.
///
/// Columns: level page_num block_num par_num line_num word_num left top
/// width height conf text. Only level 5 rows are words. Confidence is
/// 0-100 and scaled to 0.0-1.0; Tesseract reports -1 when it has none.
#[must_use]
pub fn parse_tsv_words(tsv: &str) -> Vec<OcrWord> {
    let mut words = Vec::new();

    for line in tsv.lines() {
        let fields = line.split('\t').collect::<Vec<_>>();
        if fields.len() < 12 || fields[0].trim() != "5" {
            continue;
        }

        let text = fields[11].trim();
        if text.is_empty() {
            continue;
        }

        let Ok(conf) = fields[10].trim().parse::<f32>() else {
            continue;
        };
        let confidence = if conf < 0.0 { 0.0 } else { (conf / 100.0).min(1.0) };

        let geometry = fields[6..10]
            .iter()
            .map(|value| value.trim().parse::<f32>())
            .collect::<Result<Vec<_>, _>>();
        let Ok(geometry) = geometry else {
            continue;
        };

        words.push(OcrWord {
            text: text.to_string(),
            confidence,
            left: geometry[0],
            top: geometry[1],
            width: geometry[2],
            height: geometry[3],
        });
    }

    words
}

/// Tesseract through its C API. Only available with the `ocr` feature.
#[cfg(feature = "ocr")]
pub struct TesseractEngine {
    tessdata_dir: Option<std::path::PathBuf>,
    lang: String,
}

#[cfg(feature = "ocr")]
impl TesseractEngine {
    /// Checks that Tesseract initializes with the given data directory
    /// (`None` uses the system default) and language.
    pub fn new(tessdata_dir: Option<&std::path::Path>, lang: &str) -> Result<Self, ExtractError> {
        let engine = Self {
            tessdata_dir: tessdata_dir.map(std::path::Path::to_path_buf),
            lang: lang.to_string(),
        };
        engine.init()?;
        Ok(engine)
    }

    fn init(&self) -> Result<tesseract::Tesseract, ExtractError> {
        let datapath = match &self.tessdata_dir {
            Some(dir) => Some(dir.to_str().ok_or_else(|| {
                ExtractError::CapabilityUnavailable("tessdata path is not UTF-8".to_string())
            })?),
            None => None,
        };
        tesseract::Tesseract::new(datapath, Some(self.lang.as_str()))
            .map_err(|err| ExtractError::CapabilityUnavailable(format!("tesseract: {err:?}")))
    }
}

#[cfg(feature = "ocr")]
impl OcrEngine for TesseractEngine {
    fn recognize(&self, png: &[u8]) -> Result<Vec<OcrWord>, ExtractError> {
        let mut tess = self
            .init()?
            .set_image_from_mem(png)
            .map_err(|err| ExtractError::Ocr(format!("{err:?}")))?;
        let tsv = tess
            .get_tsv_text(0)
            .map_err(|err| ExtractError::Ocr(format!("{err:?}")))?;
        Ok(parse_tsv_words(&tsv))
    }
}

/// Returns a fixed word list for every image.
pub struct MockOcrEngine {
    words: Vec<OcrWord>,
}

impl MockOcrEngine {
    #[must_use]
    pub fn new(words: Vec<OcrWord>) -> Self {
        Self { words }
    }
}

impl OcrEngine for MockOcrEngine {
    fn recognize(&self, _png: &[u8]) -> Result<Vec<OcrWord>, ExtractError> {
        Ok(self.words.clone())
    }
}
