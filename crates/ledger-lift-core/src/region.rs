//! Extraction restricted to user geometry: a rectangle on one page, or a set
//! of named x-bands applied to every page in a range.

use tracing::debug;

use crate::error::ExtractError;
use crate::model::{
    ColumnSpec, PageSummary, PageSummaryKind, Rect, RegionExtraction, RegionOutput, Row, Table,
    WordBox,
};
use crate::options::{ExtractOptions, Selection};
use crate::rows::{cell_text, cluster_rows, split_row_by_gap};
use crate::table_parse::{cells_for_bands, gap_cells, infer_bands, table_confidence};
use crate::warning::{ExtractWarning, WarningCode};

/// Rejects selections narrower or shorter than `minimum` points.
pub fn validate_selection(selection: &Selection, minimum: f32) -> Result<(), ExtractError> {
    let (width, height) = (selection.width.abs(), selection.height.abs());
    if width < minimum || height < minimum {
        return Err(ExtractError::SelectionTooSmall {
            width,
            height,
            minimum,
        });
    }
    Ok(())
}

fn normalized_rect(selection: &Selection) -> Rect {
    let rect = selection.rect();
    Rect {
        x0: rect.x0.min(rect.x1),
        y0: rect.y0.min(rect.y1),
        x1: rect.x0.max(rect.x1),
        y1: rect.y0.max(rect.y1),
    }
}

fn filled_headers(cells: Vec<String>) -> Vec<String> {
    cells
        .into_iter()
        .enumerate()
        .map(|(index, cell)| {
            if cell.trim().is_empty() {
                format!("col_{}", index + 1)
            } else {
                cell
            }
        })
        .collect()
}

fn rows_text(rows: &[Row]) -> String {
    rows.iter().map(Row::text).collect::<Vec<_>>().join("\n")
}

/// Builds a table or falls back to text from the words a selection touches.
///
/// The selected rows become a table when there are at least two of them,
/// they project onto at least two columns and their cell counts are
/// consistent enough to clear `min_table_confidence`. Row 0 is the header.
pub fn extract_region_from_words(
    words: &[WordBox],
    selection: &Selection,
    options: &ExtractOptions,
) -> Result<RegionExtraction, ExtractError> {
    validate_selection(selection, options.min_selection_size)?;

    let rect = normalized_rect(selection);
    let selected = words
        .iter()
        .filter(|word| word.page == selection.page && word.intersects(&rect))
        .cloned()
        .collect::<Vec<_>>();
    if selected.is_empty() {
        return Err(ExtractError::NoTextFound {
            page: selection.page,
        });
    }

    let rows = cluster_rows(&selected, options.row_tolerance);
    let refs = rows.iter().collect::<Vec<_>>();
    let bands = infer_bands(&refs, options.cell_gap);
    let confidence = table_confidence(&gap_cells(&refs, options.cell_gap));
    let mut warnings = Vec::new();

    let output = if rows.len() >= 2 && bands.len() >= 2 && confidence >= options.min_table_confidence
    {
        let mut cells = rows.iter().map(|row| cells_for_bands(row, &bands));
        let headers = filled_headers(cells.next().unwrap_or_default());
        RegionOutput::Table(Table::new(headers, cells.collect()))
    } else {
        warnings.push(
            ExtractWarning::new(
                WarningCode::RegionFallbackText,
                "selection does not look like a table; returning its text",
            )
            .with_page(selection.page)
            .with_confidence(confidence),
        );
        RegionOutput::Text {
            text: rows_text(&rows),
        }
    };

    debug!(
        page = selection.page,
        words = selected.len(),
        rows = rows.len(),
        columns = bands.len(),
        confidence,
        "extracted region"
    );

    Ok(RegionExtraction {
        page: selection.page,
        output,
        word_count: selected.len(),
        warnings,
    })
}

/// Cells of one page under user-defined columns.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PageColumns {
    pub rows: Vec<Vec<String>>,
    pub summary: PageSummary,
}

/// Assigns each row's words to the column containing their centre. Rows
/// that touch no column are left out.
pub(crate) fn columns_for_page(
    page: u32,
    words: &[WordBox],
    columns: &[ColumnSpec],
    options: &ExtractOptions,
) -> PageColumns {
    let rows = cluster_rows(words, options.row_tolerance);

    let mut matched_rows = Vec::new();
    let mut matched_text = Vec::new();
    for row in &rows {
        let cells = columns
            .iter()
            .map(|column| {
                row.words
                    .iter()
                    .filter(|word| column.contains(word))
                    .map(|word| word.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>();
        if cells.iter().any(|cell| !cell.is_empty()) {
            matched_text.push(
                cells
                    .iter()
                    .filter(|cell| !cell.is_empty())
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(" "),
            );
            matched_rows.push(cells);
        }
    }

    let filled_columns = (0..columns.len())
        .filter(|index| matched_rows.iter().any(|row| !row[*index].is_empty()))
        .count();
    let kind = match matched_rows.len() {
        0 => PageSummaryKind::None,
        count if count >= 2 && filled_columns >= 2 => PageSummaryKind::Table,
        _ => PageSummaryKind::Text,
    };
    debug!(page, rows = rows.len(), matched = matched_rows.len(), ?kind, "column page");

    let summary = PageSummary {
        page,
        kind,
        rows: matched_rows.len(),
        text: (kind == PageSummaryKind::Text).then(|| matched_text.join("\n")),
        error: None,
    };
    PageColumns {
        rows: matched_rows,
        summary,
    }
}

fn blocks(words: &[WordBox], options: &ExtractOptions) -> Vec<String> {
    cluster_rows(words, options.row_tolerance)
        .iter()
        .flat_map(|row| {
            split_row_by_gap(row, options.cell_gap)
                .iter()
                .map(|cell| cell_text(cell))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Each gap-separated block in reading order becomes its own one-cell row.
#[must_use]
pub fn place_as_rows(words: &[WordBox], options: &ExtractOptions) -> Vec<Vec<String>> {
    blocks(words, options)
        .into_iter()
        .map(|block| vec![block])
        .collect()
}

/// All blocks in reading order side by side in a single row.
#[must_use]
pub fn place_as_columns(words: &[WordBox], options: &ExtractOptions) -> Vec<Vec<String>> {
    let cells = blocks(words, options);
    if cells.is_empty() {
        return Vec::new();
    }
    vec![cells]
}

#[cfg(test)]
mod tests {
    use super::{columns_for_page, extract_region_from_words, place_as_columns, place_as_rows};
    use crate::error::ExtractError;
    use crate::model::{ColumnSpec, PageSummaryKind, RegionOutput, WordBox};
    use crate::options::{ExtractOptions, Selection};
    use crate::warning::WarningCode;

    fn word(text: &str, x0: f32, y0: f32, x1: f32) -> WordBox {
        WordBox::new(text, x0, y0, x1, y0 + 10.0, 1)
    }

    fn statement_words() -> Vec<WordBox> {
        vec![
            word("Date", 50.0, 100.0, 72.0),
            word("Amount", 200.0, 100.0, 236.0),
            word("2024-01-01", 50.0, 120.0, 100.0),
            word("100.00", 200.0, 120.0, 230.0),
            word("2024-01-02", 50.0, 140.0, 100.0),
            word("-50.00", 200.0, 140.0, 228.0),
            word("Footer", 50.0, 400.0, 80.0),
        ]
    }

    fn selection(x: f32, y: f32, width: f32, height: f32) -> Selection {
        Selection {
            page: 1,
            x,
            y,
            width,
            height,
        }
    }

    #[test]
    fn small_selection_is_rejected() {
        let err = extract_region_from_words(
            &statement_words(),
            &selection(0.0, 0.0, 9.5, 200.0),
            &ExtractOptions::default(),
        )
        .expect_err("narrow selection should fail");
        assert!(matches!(err, ExtractError::SelectionTooSmall { .. }));
    }

    #[test]
    fn tabular_selection_becomes_a_table() {
        let region = extract_region_from_words(
            &statement_words(),
            &selection(40.0, 95.0, 250.0, 60.0),
            &ExtractOptions::default(),
        )
        .expect("region should extract");
        let RegionOutput::Table(table) = region.output else {
            panic!("expected a table");
        };
        assert_eq!(table.headers, vec!["Date", "Amount"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1], vec!["2024-01-02", "-50.00"]);
        assert_eq!(region.word_count, 6);
    }

    #[test]
    fn single_line_selection_falls_back_to_text() {
        let region = extract_region_from_words(
            &statement_words(),
            &selection(40.0, 395.0, 100.0, 20.0),
            &ExtractOptions::default(),
        )
        .expect("region should extract");
        assert_eq!(
            region.output,
            RegionOutput::Text {
                text: "Footer".to_string()
            }
        );
        assert_eq!(region.warnings[0].code, WarningCode::RegionFallbackText);
    }

    #[test]
    fn empty_selection_reports_no_text() {
        let err = extract_region_from_words(
            &statement_words(),
            &selection(400.0, 500.0, 50.0, 50.0),
            &ExtractOptions::default(),
        )
        .expect_err("nothing is selected");
        assert!(matches!(err, ExtractError::NoTextFound { page: 1 }));
    }

    #[test]
    fn column_page_kinds() {
        let columns = vec![
            ColumnSpec {
                name: "Date".to_string(),
                x0: 40.0,
                x1: 110.0,
            },
            ColumnSpec {
                name: "Amount".to_string(),
                x0: 190.0,
                x1: 240.0,
            },
        ];
        let options = ExtractOptions::default();

        let page = columns_for_page(1, &statement_words(), &columns, &options);
        assert_eq!(page.summary.kind, PageSummaryKind::Table);
        assert_eq!(page.rows.len(), 4);
        assert_eq!(page.rows[3], vec!["Footer", ""]);

        let far = vec![word("Note", 400.0, 50.0, 430.0)];
        let page = columns_for_page(2, &far, &columns, &options);
        assert_eq!(page.summary.kind, PageSummaryKind::None);
        assert!(page.rows.is_empty());

        let lone = vec![word("Total", 50.0, 50.0, 75.0)];
        let page = columns_for_page(3, &lone, &columns, &options);
        assert_eq!(page.summary.kind, PageSummaryKind::Text);
        assert_eq!(page.summary.text.as_deref(), Some("Total"));
    }

    #[test]
    fn placement_transforms() {
        let words = vec![
            word("Opening", 10.0, 0.0, 50.0),
            word("balance", 53.0, 0.0, 90.0),
            word("1,000.00", 200.0, 0.0, 240.0),
            word("Closing", 10.0, 20.0, 50.0),
        ];
        let options = ExtractOptions::default();
        assert_eq!(
            place_as_rows(&words, &options),
            vec![vec!["Opening balance"], vec!["1,000.00"], vec!["Closing"]]
        );
        assert_eq!(
            place_as_columns(&words, &options),
            vec![vec!["Opening balance", "1,000.00", "Closing"]]
        );
        assert!(place_as_columns(&[], &options).is_empty());
    }
}
