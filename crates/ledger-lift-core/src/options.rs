use std::collections::BTreeSet;
use std::str::FromStr;

use crate::error::ExtractError;
use crate::model::{ColumnSpec, Rect, SemanticField};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderMode {
    AutoDetect,
    HasHeader,
    NoHeader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityMode {
    BestEffort,
    Strict,
    SkipAmbiguous,
}

/// How an all-numeric date such as `03/04/2024` is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOrder {
    DayFirst,
    MonthFirst,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSelection {
    pages: BTreeSet<u32>,
}

impl PageSelection {
    #[must_use]
    pub fn range(start: u32, end: u32) -> Self {
        Self {
            pages: (start.max(1)..=end).collect(),
        }
    }

    #[must_use]
    pub fn contains(&self, page: u32) -> bool {
        self.pages.contains(&page)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.pages.iter().copied()
    }

    /// Drops pages past the end of the document. Returns the kept pages and
    /// whether anything was dropped.
    #[must_use]
    pub fn clamp(&self, page_count: u32) -> (Vec<u32>, bool) {
        let kept = self
            .pages
            .iter()
            .copied()
            .filter(|page| *page <= page_count)
            .collect::<Vec<_>>();
        let clamped = kept.len() != self.pages.len();
        (kept, clamped)
    }
}

impl FromStr for PageSelection {
    type Err = String;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let mut pages = BTreeSet::new();
        for token in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if let Some((start, end)) = token.split_once('-') {
                let start: u32 = start
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid page range start: '{start}'"))?;
                let end: u32 = end
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid page range end: '{end}'"))?;
                if start == 0 || end == 0 {
                    return Err("pages are 1-based".to_string());
                }
                if end < start {
                    return Err(format!(
                        "invalid range '{token}': end is smaller than start"
                    ));
                }
                pages.extend(start..=end);
            } else {
                let page: u32 = token
                    .parse()
                    .map_err(|_| format!("invalid page number: '{token}'"))?;
                if page == 0 {
                    return Err("pages are 1-based".to_string());
                }
                pages.insert(page);
            }
        }

        if pages.is_empty() {
            return Err("page selection cannot be empty".to_string());
        }

        Ok(Self { pages })
    }
}

/// A user rectangle on one page, in points with a top-left origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection {
    pub page: u32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Selection {
    #[must_use]
    pub fn rect(&self) -> Rect {
        Rect::from_origin_size(self.x, self.y, self.width, self.height)
    }
}

fn parse_coordinate(name: &str, raw: &str) -> Result<f32, String> {
    let value: f32 = raw
        .trim()
        .parse()
        .map_err(|_| format!("invalid {name}: '{}'", raw.trim()))?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(format!("{name} must be finite"))
    }
}

impl FromStr for Selection {
    type Err = String;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let (page_part, rect_part) = spec.split_once(':').ok_or_else(|| {
            format!("invalid selection format '{spec}', expected page:x,y,width,height")
        })?;

        let page: u32 = page_part
            .trim()
            .parse()
            .map_err(|_| format!("invalid page number in selection: '{page_part}'"))?;
        if page == 0 {
            return Err("selection page number must be >= 1".to_string());
        }

        let parts = rect_part.split(',').collect::<Vec<_>>();
        let [x, y, width, height] = parts.as_slice() else {
            return Err(format!(
                "invalid selection format '{spec}', expected exactly 4 values"
            ));
        };

        Ok(Self {
            page,
            x: parse_coordinate("x", x)?,
            y: parse_coordinate("y", y)?,
            width: parse_coordinate("width", width)?,
            height: parse_coordinate("height", height)?,
        })
    }
}

impl FromStr for ColumnSpec {
    type Err = String;

    /// Parses `name:x0-x1`.
    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let (name, band) = spec
            .rsplit_once(':')
            .ok_or_else(|| format!("invalid column '{spec}', expected name:x0-x1"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("column '{spec}' has an empty name"));
        }
        let (x0, x1) = band
            .split_once('-')
            .ok_or_else(|| format!("invalid column band '{band}', expected x0-x1"))?;
        let x0 = parse_coordinate("x0", x0)?;
        let x1 = parse_coordinate("x1", x1)?;
        if x1 <= x0 {
            return Err(format!("column '{name}' requires x1>x0"));
        }
        Ok(Self {
            name: name.to_string(),
            x0,
            x1,
        })
    }
}

/// Keyword phrases per header role, checked in order; the first role with a
/// matching phrase wins, so `Withdrawal Amount` reads as a debit column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderKeywords {
    pub roles: Vec<(SemanticField, Vec<String>)>,
}

impl HeaderKeywords {
    #[must_use]
    pub fn phrases(&self, role: SemanticField) -> &[String] {
        self.roles
            .iter()
            .find(|(candidate, _)| *candidate == role)
            .map_or(&[], |(_, phrases)| phrases.as_slice())
    }
}

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|word| (*word).to_string()).collect()
}

impl Default for HeaderKeywords {
    fn default() -> Self {
        Self {
            roles: vec![
                (
                    SemanticField::Date,
                    owned(&[
                        "date",
                        "dt",
                        "txn date",
                        "transaction date",
                        "value date",
                        "posting date",
                    ]),
                ),
                (
                    SemanticField::Balance,
                    owned(&[
                        "balance",
                        "bal",
                        "closing balance",
                        "running balance",
                        "available balance",
                    ]),
                ),
                (
                    SemanticField::Debit,
                    owned(&[
                        "debit",
                        "debits",
                        "withdrawal",
                        "withdrawals",
                        "dr",
                        "outflow",
                        "paid out",
                    ]),
                ),
                (
                    SemanticField::Credit,
                    owned(&[
                        "credit",
                        "credits",
                        "deposit",
                        "deposits",
                        "cr",
                        "inflow",
                        "paid in",
                    ]),
                ),
                (
                    SemanticField::Reference,
                    owned(&[
                        "ref",
                        "reference",
                        "cheque",
                        "chq",
                        "ref no",
                        "cheque no",
                        "transaction id",
                    ]),
                ),
                (
                    SemanticField::Description,
                    owned(&[
                        "description",
                        "particulars",
                        "narration",
                        "details",
                        "transaction details",
                        "remarks",
                    ]),
                ),
                (SemanticField::Amount, owned(&["amount", "amt"])),
            ],
        }
    }
}

/// Rows that belong to the statement layout rather than its transactions:
/// totals, carried balances and page footers. Phrases match whole words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoiseKeywords {
    /// Phrases that mark a row wherever they appear in it.
    pub anywhere: Vec<String>,
    /// Phrases that mark a row only when they open it, as in `Page 2 of 5`.
    pub leading: Vec<String>,
}

impl Default for NoiseKeywords {
    fn default() -> Self {
        Self {
            anywhere: owned(&[
                "total",
                "totals",
                "subtotal",
                "grand total",
                "summary",
                "opening balance",
                "closing balance",
                "brought forward",
                "carried forward",
            ]),
            leading: owned(&["page", "continued"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatementOptions {
    pub keywords: HeaderKeywords,
    /// Rows below a header that are skipped outright.
    pub noise: NoiseKeywords,
    /// Distinct roles a row needs before it counts as a header. Date is
    /// always one of them.
    pub min_header_roles: usize,
    pub date_order: DateOrder,
    /// Mean OCR confidence below which a scanned-only statement is rejected.
    pub min_ocr_confidence: f32,
}

impl Default for StatementOptions {
    fn default() -> Self {
        Self {
            keywords: HeaderKeywords::default(),
            noise: NoiseKeywords::default(),
            min_header_roles: 3,
            date_order: DateOrder::DayFirst,
            min_ocr_confidence: 0.45,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOptions {
    pub row_tolerance: f32,
    pub word_x_tolerance: f32,
    pub word_y_tolerance: f32,
    pub ocr_dpi: u32,
    pub max_workers: usize,
    pub min_selection_size: f32,
    pub cell_gap: f32,
    pub min_cols: usize,
    pub header_mode: HeaderMode,
    pub quality_mode: QualityMode,
    pub min_table_confidence: f32,
    pub statement: StatementOptions,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            row_tolerance: 2.0,
            word_x_tolerance: 1.0,
            word_y_tolerance: 1.0,
            ocr_dpi: 200,
            max_workers: 4,
            min_selection_size: 10.0,
            cell_gap: 6.0,
            min_cols: 2,
            header_mode: HeaderMode::AutoDetect,
            quality_mode: QualityMode::BestEffort,
            min_table_confidence: 0.60,
            statement: StatementOptions::default(),
        }
    }
}

impl ExtractOptions {
    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ExtractError> {
        let invalid = |message: &str| Err(ExtractError::InvalidOption(message.to_string()));

        if self.min_cols < 2 {
            return invalid("min_cols must be at least 2");
        }
        if !(self.row_tolerance.is_finite() && self.row_tolerance >= 0.0) {
            return invalid("row_tolerance must be a non-negative number");
        }
        if !(self.cell_gap.is_finite() && self.cell_gap >= 0.0) {
            return invalid("cell_gap must be a non-negative number");
        }
        if !(self.min_selection_size.is_finite() && self.min_selection_size >= 0.0) {
            return invalid("min_selection_size must be a non-negative number");
        }
        if !(1..=1200).contains(&self.ocr_dpi) {
            return invalid("ocr_dpi must be between 1 and 1200");
        }
        if self.max_workers == 0 {
            return invalid("max_workers must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.min_table_confidence) {
            return invalid("min_table_confidence must be within 0..=1");
        }
        if self.statement.min_header_roles == 0 {
            return invalid("min_header_roles must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ExtractOptions, PageSelection, Selection};
    use crate::model::ColumnSpec;
    use std::str::FromStr;

    #[test]
    fn parse_page_selection_range_and_single() {
        let selection = PageSelection::from_str("1-3,5").expect("selection should parse");
        assert!(selection.contains(1));
        assert!(selection.contains(3));
        assert!(selection.contains(5));
        assert!(!selection.contains(4));
    }

    #[test]
    fn reject_invalid_page_selection() {
        let err = PageSelection::from_str("3-1").expect_err("invalid range should fail");
        assert!(err.contains("invalid range"));
    }

    #[test]
    fn clamp_drops_pages_past_the_end() {
        let selection = PageSelection::range(2, 6);
        let (pages, clamped) = selection.clamp(4);
        assert_eq!(pages, vec![2, 3, 4]);
        assert!(clamped);
    }

    #[test]
    fn parse_selection() {
        let selection = Selection::from_str("2:10,20,120,40").expect("selection should parse");
        assert_eq!(selection.page, 2);
        let rect = selection.rect();
        assert_eq!(rect.x1, 130.0);
        assert_eq!(rect.y1, 60.0);
    }

    #[test]
    fn reject_selection_with_missing_values() {
        let err = Selection::from_str("1:0,0,10").expect_err("short selection should fail");
        assert!(err.contains("expected exactly 4 values"));
    }

    #[test]
    fn parse_column_spec_with_colon_in_name() {
        let column = ColumnSpec::from_str("Ref: No:120-180").expect("column should parse");
        assert_eq!(column.name, "Ref: No");
        assert_eq!((column.x0, column.x1), (120.0, 180.0));
        assert!(ColumnSpec::from_str("Amount:200-150").is_err());
    }

    #[test]
    fn validate_rejects_unusable_options() {
        assert!(ExtractOptions::default().validate().is_ok());
        let options = ExtractOptions {
            min_cols: 1,
            ..ExtractOptions::default()
        };
        assert!(options.validate().is_err());
        let options = ExtractOptions {
            ocr_dpi: 0,
            ..ExtractOptions::default()
        };
        assert!(options.validate().is_err());
    }
}
