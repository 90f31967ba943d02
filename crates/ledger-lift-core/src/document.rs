//! One uploaded PDF and the extraction modes that run over it.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::capability::{self, ScannedBackend};
use crate::classify::analyze_page;
use crate::error::ExtractError;
use crate::extractor::{DigitalExtractor, ScannedExtractor, WordExtractor};
use crate::header::split_header;
use crate::merge::{PreparedTable, merge_tables};
use crate::model::{
    ColumnData, ColumnExtraction, ColumnSpec, DocumentAnalysis, PageAnalysis, PageReport,
    PageSummary, PageSummaryKind, RegionExtraction, Row, StatementExtraction, TablesExtraction,
    WordBox,
};
use crate::options::{ExtractOptions, PageSelection, Selection};
use crate::pdf_reader::PdfSource;
use crate::pool::{CancelFlag, RunControl, run_pages};
use crate::region::{PageColumns, columns_for_page, extract_region_from_words, validate_selection};
use crate::rows::cluster_rows;
use crate::statement::{check_ocr_confidence, infer_transactions};
use crate::table_detect::{apply_quality_mode, detect_tables_in_page};
use crate::warning::{ExtractWarning, WarningCode};

const LOW_OCR_WORD_CONFIDENCE: f32 = 0.5;

/// Where a document is in the extraction pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    Uploaded,
    Classified,
    WordsExtracted,
    RowsClustered,
    TableInferred,
    RegionExtracted,
    InferenceFailed,
}

impl DocumentState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::TableInferred | Self::RegionExtracted | Self::InferenceFailed
        )
    }

    /// Allowed edges. Terminal states re-enter `WordsExtracted` when the user
    /// picks another mode.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Uploaded, Self::Classified)
            | (Self::Classified | Self::RowsClustered, Self::WordsExtracted)
            | (Self::WordsExtracted, Self::RowsClustered | Self::InferenceFailed)
            | (
                Self::RowsClustered,
                Self::TableInferred | Self::RegionExtracted | Self::InferenceFailed,
            ) => true,
            (current, Self::WordsExtracted) => current.is_terminal(),
            _ => false,
        }
    }
}

struct PageRows {
    page: u32,
    words: Vec<WordBox>,
    rows: Vec<Row>,
    warnings: Vec<ExtractWarning>,
}

/// An uploaded PDF. Page analyses and word lists are computed on first use
/// and kept for the document's lifetime.
pub struct Document {
    bytes: Vec<u8>,
    source: PdfSource,
    options: ExtractOptions,
    backend: Option<Arc<ScannedBackend>>,
    analyses: Vec<OnceLock<Result<PageAnalysis, String>>>,
    words: Vec<OnceLock<Vec<WordBox>>>,
    state: Mutex<DocumentState>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("bytes", &self.bytes.len())
            .field("pages", &self.source.page_count())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Document {
    /// Loads a PDF from memory. Fails on unusable options or an unreadable
    /// file; individual pages are only read when needed.
    pub fn open(bytes: impl Into<Vec<u8>>, options: ExtractOptions) -> Result<Self, ExtractError> {
        options.validate()?;
        let bytes = bytes.into();
        let source = PdfSource::load(&bytes)?;
        let page_count = source.page_count() as usize;
        info!(pages = page_count, bytes = bytes.len(), "document opened");

        Ok(Self {
            bytes,
            source,
            options,
            backend: None,
            analyses: (0..page_count).map(|_| OnceLock::new()).collect(),
            words: (0..page_count).map(|_| OnceLock::new()).collect(),
            state: Mutex::new(DocumentState::Uploaded),
        })
    }

    /// Uses `backend` for scanned pages instead of the process-wide one.
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<ScannedBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    #[must_use]
    pub fn page_count(&self) -> u32 {
        self.source.page_count()
    }

    #[must_use]
    pub fn file_size(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    #[must_use]
    pub fn state(&self) -> DocumentState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn advance(&self, next: DocumentState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == next {
            return;
        }
        if state.can_advance_to(next) {
            debug!(from = ?*state, to = ?next, "document state");
            *state = next;
        } else {
            debug!(from = ?*state, to = ?next, "document state unchanged");
        }
    }

    fn begin(&self) {
        if self.state() == DocumentState::Uploaded {
            self.advance(DocumentState::Classified);
        }
    }

    fn finish<T>(
        &self,
        result: Result<T, ExtractError>,
        success: DocumentState,
    ) -> Result<T, ExtractError> {
        match &result {
            Ok(_) => self.advance(success),
            Err(ExtractError::Cancelled) => {}
            Err(_) => self.advance(DocumentState::InferenceFailed),
        }
        result
    }

    fn slot<'a, T>(&self, slots: &'a [T], page: u32) -> Result<&'a T, ExtractError> {
        page.checked_sub(1)
            .and_then(|index| usize::try_from(index).ok())
            .and_then(|index| slots.get(index))
            .ok_or(ExtractError::PageOutOfRange {
                page,
                page_count: self.page_count(),
            })
    }

    fn all_pages(&self) -> Vec<u32> {
        (1..=self.page_count()).collect()
    }

    /// Classification of one page; computed once.
    pub fn page_analysis(&self, page: u32) -> Result<PageAnalysis, ExtractError> {
        let cached = self
            .slot(&self.analyses, page)?
            .get_or_init(|| {
                analyze_page(&self.source, page).map_err(|err| match err {
                    ExtractError::PageRead { reason, .. } => reason,
                    other => other.to_string(),
                })
            });
        cached.clone().map_err(|reason| ExtractError::PageRead { page, reason })
    }

    /// Classifies every page. Unreadable pages are listed with their reason.
    pub fn analyze(&self) -> Result<DocumentAnalysis, ExtractError> {
        let pages = self.all_pages();
        let results = run_pages(&pages, self.options.max_workers, &CancelFlag::new(), |page| {
            self.page_analysis(page)
        })?;
        self.begin();

        let mut reports = Vec::with_capacity(results.len());
        let (mut digital, mut scanned, mut unreadable) = (0, 0, 0);
        for (page, result) in pages.iter().zip(results) {
            match result {
                Ok(analysis) => {
                    if analysis.is_digital {
                        digital += 1;
                    } else {
                        scanned += 1;
                    }
                    reports.push(PageReport {
                        page_num: *page,
                        analysis: Some(analysis),
                        error: None,
                    });
                }
                Err(err) => {
                    warn!(page, error = %err, "page could not be classified");
                    unreadable += 1;
                    reports.push(PageReport {
                        page_num: *page,
                        analysis: None,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        info!(digital, scanned, unreadable, "document analyzed");
        Ok(DocumentAnalysis {
            total_pages: pages.len(),
            digital_pages: digital,
            scanned_pages: scanned,
            unreadable_pages: unreadable,
            is_mixed: digital > 0 && scanned > 0,
            file_size: self.bytes.len(),
            pages: reports,
        })
    }

    fn backend(&self) -> Result<Arc<ScannedBackend>, ExtractError> {
        match &self.backend {
            Some(backend) => Ok(Arc::clone(backend)),
            None => capability::scanned_backend(),
        }
    }

    fn extract_words(&self, page: u32) -> Result<Vec<WordBox>, ExtractError> {
        let analysis = self.page_analysis(page)?;
        if !analysis.is_digital {
            return self.ocr_words(page, &*self.backend()?);
        }

        let extractor = DigitalExtractor {
            source: &self.source,
            x_tolerance: self.options.word_x_tolerance,
            y_tolerance: self.options.word_y_tolerance,
        };
        let words = extractor.extract_words(page)?;
        if !words.is_empty() {
            return Ok(words);
        }

        // The text layer has text that could not be placed on the page.
        warn!(page, text_length = analysis.text_length, "text layer yielded no positioned words");
        match self.backend() {
            Ok(backend) => self.ocr_words(page, &backend),
            Err(err) => Err(ExtractError::PageRead {
                page,
                reason: format!(
                    "the text layer has {} characters but none could be positioned ({err})",
                    analysis.text_length
                ),
            }),
        }
    }

    fn ocr_words(&self, page: u32, backend: &ScannedBackend) -> Result<Vec<WordBox>, ExtractError> {
        let extractor = ScannedExtractor {
            bytes: &self.bytes,
            source: &self.source,
            backend,
            dpi: self.options.ocr_dpi,
        };
        extractor.extract_words(page)
    }

    /// Words of one page, from the text layer or OCR as the page requires.
    fn page_words(&self, page: u32) -> Result<Vec<WordBox>, ExtractError> {
        let slot = self.slot(&self.words, page)?;
        if let Some(words) = slot.get() {
            return Ok(words.clone());
        }
        let words = self.extract_words(page)?;
        debug!(page, words = words.len(), "extracted words");
        Ok(slot.get_or_init(|| words).clone())
    }

    /// Turns a page-local failure into a warning; anything else stays an
    /// error.
    fn degrade(page: u32, err: ExtractError) -> Result<ExtractWarning, ExtractError> {
        let code = match &err {
            ExtractError::CapabilityUnavailable(_) => WarningCode::CapabilityUnavailable,
            other if other.is_page_local() => WarningCode::PageReadFailed,
            _ => return Err(err),
        };
        warn!(page, error = %err, "page skipped");
        Ok(ExtractWarning::new(code, err.to_string()).with_page(page))
    }

    fn low_ocr_warning(page: u32, words: &[WordBox]) -> Option<ExtractWarning> {
        let low = words
            .iter()
            .filter(|word| word.confidence.is_some_and(|c| c < LOW_OCR_WORD_CONFIDENCE))
            .count();
        (low > 0).then(|| {
            ExtractWarning::new(
                WarningCode::LowOcrConfidence,
                format!("{low} OCR words have low confidence"),
            )
            .with_page(page)
        })
    }

    fn gather_rows(&self, pages: &[u32], cancel: &CancelFlag) -> Result<Vec<PageRows>, ExtractError> {
        self.begin();
        let gathered = run_pages(pages, self.options.max_workers, cancel, |page| {
            let mut warnings = Vec::new();
            let words = match self.page_words(page) {
                Ok(words) => words,
                Err(err) => {
                    warnings.push(Self::degrade(page, err)?);
                    Vec::new()
                }
            };
            warnings.extend(Self::low_ocr_warning(page, &words));
            let rows = cluster_rows(&words, self.options.row_tolerance);
            Ok(PageRows {
                page,
                words,
                rows,
                warnings,
            })
        })?
        .into_iter()
        .collect::<Result<Vec<_>, ExtractError>>()?;

        self.advance(DocumentState::WordsExtracted);
        self.advance(DocumentState::RowsClustered);
        Ok(gathered)
    }

    /// Raw word boxes of one page.
    pub fn text_spans(&self, page: u32) -> Result<Vec<WordBox>, ExtractError> {
        self.begin();
        let words = self.page_words(page)?;
        self.advance(DocumentState::WordsExtracted);
        Ok(words)
    }

    /// Rectangle mode. The selection size is checked before any page is read.
    pub fn extract_region(&self, selection: &Selection) -> Result<RegionExtraction, ExtractError> {
        validate_selection(selection, self.options.min_selection_size)?;
        self.begin();

        let result = self.page_words(selection.page).and_then(|words| {
            self.advance(DocumentState::WordsExtracted);
            let region = extract_region_from_words(&words, selection, &self.options);
            if region.is_ok() {
                self.advance(DocumentState::RowsClustered);
            }
            region
        });
        self.finish(result, DocumentState::RegionExtracted)
    }

    fn validate_columns(columns: &[ColumnSpec]) -> Result<(), ExtractError> {
        if columns.is_empty() {
            return Err(ExtractError::InvalidColumn(
                "at least one column is required".to_string(),
            ));
        }
        for column in columns {
            if column.name.trim().is_empty() {
                return Err(ExtractError::InvalidColumn("column name is empty".to_string()));
            }
            if !(column.x0.is_finite() && column.x1.is_finite() && column.x1 > column.x0) {
                return Err(ExtractError::InvalidColumn(format!(
                    "column '{}' requires x1>x0",
                    column.name
                )));
            }
        }
        Ok(())
    }

    /// Column mode over the selected pages. Each page reports whether it
    /// produced a table, plain text or nothing; pages that fail are reported
    /// with their error instead of aborting the run.
    pub fn extract_columns(
        &self,
        columns: &[ColumnSpec],
        pages: &PageSelection,
        control: &RunControl,
    ) -> Result<ColumnExtraction, ExtractError> {
        Self::validate_columns(columns)?;
        let mut warnings = Vec::new();
        let (pages, clamped) = pages.clamp(self.page_count());
        if clamped {
            warnings.push(ExtractWarning::new(
                WarningCode::PageRangeClamped,
                format!("page range clamped to the document's {} pages", self.page_count()),
            ));
        }
        if pages.is_empty() {
            return Err(ExtractError::NoPagesSelected);
        }
        self.begin();

        let results = run_pages(&pages, self.options.max_workers, &control.cancel, |page| {
            let outcome = match self.page_words(page) {
                Ok(words) => {
                    let low_ocr = Self::low_ocr_warning(page, &words);
                    let found = columns_for_page(page, &words, columns, &self.options);
                    (found, low_ocr)
                }
                Err(err) => {
                    let reason = err.to_string();
                    let warning = Self::degrade(page, err)?;
                    let summary = PageSummary {
                        error: Some(reason),
                        ..PageSummary::none(page)
                    };
                    (
                        PageColumns {
                            rows: Vec::new(),
                            summary,
                        },
                        Some(warning),
                    )
                }
            };
            control.report(&outcome.0.summary);
            Ok(outcome)
        })
        .and_then(|results| results.into_iter().collect::<Result<Vec<_>, ExtractError>>());
        let results = match results {
            Ok(results) => results,
            Err(err) => return self.finish(Err(err), DocumentState::RegionExtracted),
        };
        self.advance(DocumentState::WordsExtracted);
        self.advance(DocumentState::RowsClustered);

        let mut data = vec![Vec::new(); columns.len()];
        let mut page_summaries = Vec::with_capacity(results.len());
        for (page, warning) in results {
            warnings.extend(warning);
            if page.summary.kind == PageSummaryKind::None && page.summary.error.is_none() {
                warnings.push(
                    ExtractWarning::new(WarningCode::NoRowsMatched, "no rows fall inside the columns")
                        .with_page(page.summary.page),
                );
            }
            for row in page.rows {
                for (column, cell) in data.iter_mut().zip(row) {
                    column.push(cell);
                }
            }
            page_summaries.push(page.summary);
        }

        let columns = columns
            .iter()
            .zip(data)
            .map(|(column, data)| ColumnData {
                name: column.name.clone(),
                data,
            })
            .collect::<Vec<_>>();
        info!(
            pages = page_summaries.len(),
            rows = columns.first().map_or(0, |column| column.data.len()),
            "column extraction finished"
        );

        self.finish(
            Ok(ColumnExtraction {
                columns,
                page_summaries,
                warnings,
            }),
            DocumentState::RegionExtracted,
        )
    }

    /// Bank-statement mode over every page.
    pub fn extract_smart(&self, control: &RunControl) -> Result<StatementExtraction, ExtractError> {
        let result = self.smart(control);
        self.finish(result, DocumentState::TableInferred)
    }

    fn smart(&self, control: &RunControl) -> Result<StatementExtraction, ExtractError> {
        let gathered = self.gather_rows(&self.all_pages(), &control.cancel)?;
        check_ocr_confidence(
            gathered.iter().flat_map(|page| page.words.iter()),
            self.options.statement.min_ocr_confidence,
        )?;

        let mut warnings = Vec::new();
        let mut pages = Vec::with_capacity(gathered.len());
        for page in gathered {
            warnings.extend(page.warnings);
            pages.push((page.page, page.rows));
        }

        let mut extraction = infer_transactions(&pages, &self.options)?;
        warnings.append(&mut extraction.warnings);
        extraction.warnings = warnings;
        Ok(extraction)
    }

    /// Whole-document table mode: every table block on every page, with
    /// tables that run across a page break merged.
    pub fn extract_faithful_tables(
        &self,
        control: &RunControl,
    ) -> Result<TablesExtraction, ExtractError> {
        let result = self.faithful_tables(control);
        self.finish(result, DocumentState::TableInferred)
    }

    fn faithful_tables(&self, control: &RunControl) -> Result<TablesExtraction, ExtractError> {
        let gathered = self.gather_rows(&self.all_pages(), &control.cancel)?;

        let mut warnings = Vec::new();
        let mut detected = Vec::new();
        for page in &gathered {
            warnings.extend(page.warnings.iter().cloned());
            detected.extend(detect_tables_in_page(page.page, &page.rows, &self.options));
        }
        let kept = apply_quality_mode(detected, &self.options, &mut warnings)?;

        let mut prepared = Vec::new();
        for (index, table) in kept.into_iter().enumerate() {
            let table_id = index + 1;
            let (headers, rows) = split_header(
                table.rows,
                self.options.header_mode,
                table.page,
                table_id,
                &mut warnings,
            );
            if rows.is_empty() {
                continue;
            }
            prepared.push(PreparedTable {
                page: table.page,
                table_id,
                headers,
                rows,
                confidence: table.confidence,
            });
        }

        if prepared.is_empty() {
            warnings.push(ExtractWarning::new(
                WarningCode::NoTablesDetected,
                "no table rows were detected in the document",
            ));
        }

        let tables = merge_tables(&prepared);
        info!(tables = tables.len(), "faithful tables extracted");
        Ok(TablesExtraction { tables, warnings })
    }
}
