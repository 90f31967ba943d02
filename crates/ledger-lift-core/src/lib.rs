pub mod capability;
mod classify;
mod digital;
mod document;
mod error;
pub mod export;
mod extractor;
mod fonts;
mod header;
mod merge;
mod model;
mod ocr;
mod options;
mod patterns;
mod pdf_reader;
mod pool;
mod region;
mod render;
mod rows;
mod statement;
mod table_detect;
mod table_parse;
mod warning;

pub use capability::ScannedBackend;
pub use classify::classify;
pub use document::{Document, DocumentState};
pub use error::ExtractError;
pub use extractor::{WordExtractor, rescale_ocr_word};
pub use model::{
    ColumnData, ColumnExtraction, ColumnSpec, DocumentAnalysis, FaithfulTable, Fields,
    PageAnalysis, PageReport, PageSummary, PageSummaryKind, Rect, RegionExtraction, RegionOutput,
    Row, SemanticField, StatementExtraction, StatementSummary, Table, TablesExtraction,
    Transaction, WordBox,
};
#[cfg(feature = "ocr")]
pub use ocr::TesseractEngine;
pub use ocr::{MockOcrEngine, OcrEngine, OcrWord, parse_tsv_words};
pub use options::{
    DateOrder, ExtractOptions, HeaderKeywords, HeaderMode, NoiseKeywords, PageSelection, QualityMode, Selection,
    StatementOptions,
};
pub use patterns::{find_date, is_amount_token, parse_amount, parse_date};
pub use pool::{CancelFlag, PageCallback, RunControl, run_pages};
pub use region::{extract_region_from_words, place_as_columns, place_as_rows, validate_selection};
#[cfg(feature = "render")]
pub use render::PdfiumRasterizer;
pub use render::{MAX_DIMENSION_PX, MockRasterizer, PageRasterizer, RasterImage, render_dimensions};
pub use rows::{cluster_rows, split_row_by_gap};
pub use statement::header_role;
pub use warning::{ExtractWarning, WarningCode};
