use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::warning::ExtractWarning;

/// One recognized text token with its bounding box in page space
/// (points, top-left origin).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordBox {
    pub text: String,
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
    pub page: u32,
    /// OCR confidence in `0.0..=1.0`; `None` for text-layer words.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl WordBox {
    /// Builds a box, swapping inverted corners so that `x1 >= x0` and `y1 >= y0`.
    #[must_use]
    pub fn new(text: impl Into<String>, x0: f32, y0: f32, x1: f32, y1: f32, page: u32) -> Self {
        Self {
            text: text.into(),
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
            page,
            confidence: None,
        }
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    #[must_use]
    pub fn mid_x(&self) -> f32 {
        (self.x0 + self.x1) / 2.0
    }

    #[must_use]
    pub fn mid_y(&self) -> f32 {
        (self.y0 + self.y1) / 2.0
    }

    #[must_use]
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    #[must_use]
    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    #[must_use]
    pub fn intersects(&self, rect: &Rect) -> bool {
        self.x0 <= rect.x1 && self.x1 >= rect.x0 && self.y0 <= rect.y1 && self.y1 >= rect.y0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    #[must_use]
    pub fn from_origin_size(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x0: x,
            y0: y,
            x1: x + width,
            y1: y + height,
        }
    }

    #[must_use]
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    #[must_use]
    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageAnalysis {
    pub page_num: u32,
    pub is_digital: bool,
    pub text_length: usize,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageReport {
    pub page_num: u32,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<PageAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentAnalysis {
    pub total_pages: usize,
    pub digital_pages: usize,
    pub scanned_pages: usize,
    pub unreadable_pages: usize,
    pub is_mixed: bool,
    pub file_size: usize,
    pub pages: Vec<PageReport>,
}

/// Words judged to sit on one visual line, sorted by `x0`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub page: u32,
    pub words: Vec<WordBox>,
}

impl Row {
    #[must_use]
    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|word| word.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[must_use]
    pub fn top(&self) -> f32 {
        self.words
            .iter()
            .map(|word| word.y0)
            .fold(f32::INFINITY, f32::min)
    }

    #[must_use]
    pub fn bottom(&self) -> f32 {
        self.words
            .iter()
            .map(|word| word.y1)
            .fold(f32::NEG_INFINITY, f32::max)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// User-defined vertical band used by column mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub x0: f32,
    pub x1: f32,
}

impl ColumnSpec {
    #[must_use]
    pub fn contains(&self, word: &WordBox) -> bool {
        let center = word.mid_x();
        self.x0 <= center && center <= self.x1
    }
}

/// Headers plus equal-length rows; the unit handed to exporters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Pads ragged rows with empty cells. Rows wider than the headers get
    /// generated `col_N` headers so no cell is lost.
    #[must_use]
    pub fn new(mut headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let widest = rows.iter().map(Vec::len).max().unwrap_or(0);
        while headers.len() < widest {
            headers.push(format!("col_{}", headers.len() + 1));
        }
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Self { headers, rows }
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.headers.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RegionOutput {
    Table(Table),
    Text { text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionExtraction {
    pub page: u32,
    pub output: RegionOutput,
    pub word_count: usize,
    pub warnings: Vec<ExtractWarning>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnData {
    pub name: String,
    pub data: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSummaryKind {
    Table,
    Text,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageSummary {
    pub page: u32,
    #[serde(rename = "type")]
    pub kind: PageSummaryKind,
    pub rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PageSummary {
    #[must_use]
    pub fn none(page: u32) -> Self {
        Self {
            page,
            kind: PageSummaryKind::None,
            rows: 0,
            text: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnExtraction {
    pub columns: Vec<ColumnData>,
    pub page_summaries: Vec<PageSummary>,
    pub warnings: Vec<ExtractWarning>,
}

impl ColumnExtraction {
    /// Flattens the column-major output into an exportable table.
    #[must_use]
    pub fn to_table(&self) -> Table {
        let headers = self.columns.iter().map(|column| column.name.clone()).collect();
        let height = self
            .columns
            .iter()
            .map(|column| column.data.len())
            .max()
            .unwrap_or(0);
        let rows = (0..height)
            .map(|index| {
                self.columns
                    .iter()
                    .map(|column| column.data.get(index).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();
        Table::new(headers, rows)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaithfulTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub pages: Vec<u32>,
    pub confidence: f32,
}

impl FaithfulTable {
    #[must_use]
    pub fn to_table(&self) -> Table {
        Table::new(self.headers.clone(), self.rows.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TablesExtraction {
    pub tables: Vec<FaithfulTable>,
    pub warnings: Vec<ExtractWarning>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticField {
    Date,
    Description,
    Reference,
    Debit,
    Credit,
    Amount,
    Balance,
}

impl SemanticField {
    #[must_use]
    pub fn is_monetary(self) -> bool {
        matches!(
            self,
            Self::Debit | Self::Credit | Self::Amount | Self::Balance
        )
    }
}

/// Insertion-ordered `header -> value` pairs; serialized as a JSON object
/// whose key order follows the statement's columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields(Vec<(String, String)>);

impl Fields {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.0.iter_mut().find(|(name, _)| *name == key) {
            slot.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    pub(crate) fn append_text(&mut self, key: &str, extra: &str) {
        match self.0.iter_mut().find(|(name, _)| name == key) {
            Some((_, value)) if value.is_empty() => extra.clone_into(value),
            Some((_, value)) => {
                value.push(' ');
                value.push_str(extra);
            }
            None => self.0.push((key.to_string(), extra.to_string())),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Fields {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// A statement row recognized as a transaction. `fields` keeps the
/// statement's own column names; `roles` tags which of them carry a
/// recognized meaning.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub page: u32,
    pub fields: Fields,
    pub roles: BTreeMap<String, SemanticField>,
    pub date: Option<NaiveDate>,
    pub debit: Option<Decimal>,
    pub credit: Option<Decimal>,
    pub balance: Option<Decimal>,
}

impl Transaction {
    #[must_use]
    pub fn header_for(&self, role: SemanticField) -> Option<&str> {
        self.roles
            .iter()
            .find(|(_, field)| **field == role)
            .map(|(header, _)| header.as_str())
    }

    #[must_use]
    pub fn value_for(&self, role: SemanticField) -> Option<&str> {
        self.header_for(role)
            .and_then(|header| self.fields.get(header))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementSummary {
    pub transaction_count: usize,
    pub total_debits: Decimal,
    pub total_credits: Decimal,
    pub final_balance: Option<Decimal>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub pages_with_transactions: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementExtraction {
    pub headers: Vec<String>,
    pub transactions: Vec<Transaction>,
    pub summary: StatementSummary,
    pub warnings: Vec<ExtractWarning>,
}

impl StatementExtraction {
    #[must_use]
    pub fn to_table(&self) -> Table {
        let rows = self
            .transactions
            .iter()
            .map(|transaction| {
                self.headers
                    .iter()
                    .map(|header| transaction.fields.get(header).unwrap_or_default().to_string())
                    .collect()
            })
            .collect();
        Table::new(self.headers.clone(), rows)
    }
}

#[cfg(test)]
mod tests {
    use super::{Fields, Table, WordBox};

    #[test]
    fn word_box_swaps_inverted_corners() {
        let word = WordBox::new("x", 10.0, 20.0, 5.0, 12.0, 1);
        assert_eq!((word.x0, word.x1), (5.0, 10.0));
        assert_eq!((word.y0, word.y1), (12.0, 20.0));
    }

    #[test]
    fn table_pads_ragged_rows_and_extends_headers() {
        let table = Table::new(
            vec!["a".to_string()],
            vec![vec!["1".to_string(), "2".to_string()], vec![]],
        );
        assert_eq!(table.headers, vec!["a", "col_2"]);
        assert_eq!(table.rows[1], vec!["", ""]);
    }

    #[test]
    fn fields_serialize_in_insertion_order() {
        let mut fields = Fields::default();
        fields.insert("Txn Date", "01/02/2024");
        fields.insert("Balance", "10.00");
        fields.append_text("Narration", "UPI");
        fields.append_text("Narration", "coffee");
        let json = serde_json::to_string(&fields).expect("fields serialize");
        assert_eq!(
            json,
            r#"{"Txn Date":"01/02/2024","Balance":"10.00","Narration":"UPI coffee"}"#
        );
    }
}
