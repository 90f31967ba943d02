use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to load PDF: {0}")]
    PdfLoad(#[from] lopdf::Error),

    #[error("page {page} could not be read: {reason}")]
    PageRead { page: u32, reason: String },

    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("no text found on page {page} in the selected area; try a different area")]
    NoTextFound { page: u32 },

    #[error("no transactions found: {0}")]
    NoTransactionsFound(String),

    #[error(
        "selection {width:.1}x{height:.1} is too small; both sides must be at least {minimum:.1} points"
    )]
    SelectionTooSmall {
        width: f32,
        height: f32,
        minimum: f32,
    },

    #[error("invalid page selection: {0}")]
    InvalidPageSelection(String),

    #[error("invalid column definition: {0}")]
    InvalidColumn(String),

    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("no pages available after applying selection")]
    NoPagesSelected,

    #[error("page {page} is out of range (document has {page_count} pages)")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("table on page {page} is too ambiguous (confidence={confidence:.2})")]
    AmbiguousTable { page: u32, confidence: f32 },

    #[error("extraction was cancelled")]
    Cancelled,

    #[error("OCR failed: {0}")]
    Ocr(String),

    #[error("failed to rasterize page {page}: {reason}")]
    Render { page: u32, reason: String },
}

impl ExtractError {
    /// Errors that only affect one page of a multi-page run.
    #[must_use]
    pub fn is_page_local(&self) -> bool {
        matches!(
            self,
            Self::PageRead { .. }
                | Self::CapabilityUnavailable(_)
                | Self::Ocr(_)
                | Self::Render { .. }
                | Self::NoTextFound { .. }
        )
    }
}
