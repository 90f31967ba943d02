use tracing::debug;

use crate::header::generated_headers;
use crate::model::FaithfulTable;
use crate::table_parse::normalize_rows;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PreparedTable {
    pub page: u32,
    pub table_id: usize,
    pub headers: Option<Vec<String>>,
    pub rows: Vec<Vec<String>>,
    pub confidence: f32,
}

impl PreparedTable {
    fn width(&self) -> usize {
        let rows = self.rows.iter().map(Vec::len).max().unwrap_or(0);
        rows.max(self.headers.as_ref().map_or(0, Vec::len))
    }
}

/// Folds prepared tables into output tables. A table that opens a page
/// continues the last table of the previous page when both have the same
/// width and the new one either repeats the header or has none.
pub(crate) fn merge_tables(tables: &[PreparedTable]) -> Vec<FaithfulTable> {
    let mut merged: Vec<FaithfulTable> = Vec::new();

    for (index, table) in tables.iter().enumerate() {
        let width = table.width();
        let previous = index.checked_sub(1).map(|prev| &tables[prev]);
        let continues = previous.is_some_and(|prev| prev.page + 1 == table.page)
            && merged.last().is_some_and(|last| {
                last.headers.len() == width
                    && table
                        .headers
                        .as_ref()
                        .is_none_or(|headers| *headers == last.headers)
            });

        if let Some(last) = merged.last_mut().filter(|_| continues) {
            debug!(page = table.page, table_id = table.table_id, "table continues from previous page");
            last.rows.extend(normalize_rows(&table.rows, width));
            last.pages.push(table.page);
            last.confidence = last.confidence.min(table.confidence);
            continue;
        }

        let headers = match &table.headers {
            Some(found) => {
                let mut headers = found.clone();
                headers.resize(width, String::new());
                for (position, header) in headers.iter_mut().enumerate() {
                    if header.trim().is_empty() {
                        *header = format!("col_{}", position + 1);
                    }
                }
                headers
            }
            None => generated_headers(width),
        };

        merged.push(FaithfulTable {
            headers,
            rows: normalize_rows(&table.rows, width),
            pages: vec![table.page],
            confidence: table.confidence,
        });
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::{PreparedTable, merge_tables};

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|cell| (*cell).to_string()).collect()
    }

    fn table(page: u32, table_id: usize, headers: &[&str], rows: &[&[&str]]) -> PreparedTable {
        PreparedTable {
            page,
            table_id,
            headers: (!headers.is_empty()).then(|| strings(headers)),
            rows: rows.iter().map(|row| strings(row)).collect(),
            confidence: 0.9,
        }
    }

    #[test]
    fn merges_a_table_continuing_on_the_next_page() {
        let tables = vec![
            table(1, 1, &["Date", "Amount"], &[&["01/01", "1.00"]]),
            table(2, 2, &["Date", "Amount"], &[&["02/01", "2.00"]]),
            table(3, 3, &[], &[&["03/01", "3.00"]]),
        ];
        let merged = merge_tables(&tables);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].pages, vec![1, 2, 3]);
        assert_eq!(merged[0].rows.len(), 3);
        assert_eq!(merged[0].rows[2], vec!["03/01", "3.00"]);
    }

    #[test]
    fn different_header_or_width_starts_a_new_table() {
        let tables = vec![
            table(1, 1, &["Date", "Amount"], &[&["01/01", "1.00"]]),
            table(2, 2, &["Item", "Qty"], &[&["Pens", "2"]]),
            table(3, 3, &[], &[&["a", "b", "c"]]),
        ];
        let merged = merge_tables(&tables);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[2].headers, vec!["col_1", "col_2", "col_3"]);
    }

    #[test]
    fn second_table_on_a_page_never_continues() {
        let tables = vec![
            table(1, 1, &["A", "B"], &[&["1", "2"]]),
            table(2, 2, &["C", "D"], &[&["3", "4"]]),
            table(2, 3, &[], &[&["5", "6"]]),
        ];
        let merged = merge_tables(&tables);
        assert_eq!(merged.len(), 3);
    }
}
