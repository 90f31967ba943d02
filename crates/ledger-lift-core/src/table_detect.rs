use tracing::debug;

use crate::error::ExtractError;
use crate::model::Row;
use crate::options::{ExtractOptions, QualityMode};
use crate::rows::split_row_by_gap;
use crate::table_parse::{cells_for_bands, gap_cells, infer_bands, table_confidence};
use crate::warning::{ExtractWarning, WarningCode};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DetectedTable {
    pub page: u32,
    pub rows: Vec<Vec<String>>,
    pub confidence: f32,
}

fn build_table(page: u32, block: &[&Row], options: &ExtractOptions) -> Option<DetectedTable> {
    if block.len() < 2 {
        return None;
    }

    let confidence = table_confidence(&gap_cells(block, options.cell_gap));
    let bands = infer_bands(block, options.cell_gap);
    let rows = if bands.len() >= options.min_cols {
        block.iter().map(|row| cells_for_bands(row, &bands)).collect()
    } else {
        // Wrapped text can bridge two columns' extents; keep the gap split.
        gap_cells(block, options.cell_gap)
    };

    Some(DetectedTable {
        page,
        rows,
        confidence,
    })
}

/// Splits a page's rows into table blocks: runs of rows with at least
/// `min_cols` gap-separated cells. One short row inside a run (a wrapped
/// description, say) is kept when the next row resumes the table.
pub(crate) fn detect_tables_in_page(
    page: u32,
    rows: &[Row],
    options: &ExtractOptions,
) -> Vec<DetectedTable> {
    let min_cols = options.min_cols.max(2);
    let mut tables = Vec::new();
    let mut current: Vec<&Row> = Vec::new();
    let mut pending: Option<&Row> = None;

    let flush = |block: &mut Vec<&Row>, tables: &mut Vec<DetectedTable>| {
        if let Some(table) = build_table(page, block, options) {
            tables.push(table);
        }
        block.clear();
    };

    for row in rows.iter().filter(|row| !row.is_empty()) {
        let cells = split_row_by_gap(row, options.cell_gap).len();
        if cells >= min_cols {
            if let Some(short) = pending.take() {
                current.push(short);
            }
            current.push(row);
        } else if !current.is_empty() && pending.is_none() {
            pending = Some(row);
        } else {
            pending = None;
            flush(&mut current, &mut tables);
        }
    }
    flush(&mut current, &mut tables);

    debug!(page, tables = tables.len(), "detected tables");
    tables
}

/// Applies the quality policy to tables scoring below
/// `min_table_confidence`.
pub(crate) fn apply_quality_mode(
    tables: Vec<DetectedTable>,
    options: &ExtractOptions,
    warnings: &mut Vec<ExtractWarning>,
) -> Result<Vec<DetectedTable>, ExtractError> {
    let mut out = Vec::new();

    for table in tables {
        if table.confidence >= options.min_table_confidence {
            out.push(table);
            continue;
        }

        match options.quality_mode {
            QualityMode::BestEffort => {
                warnings.push(
                    ExtractWarning::new(
                        WarningCode::LowConfidence,
                        "table confidence is low; kept in best-effort mode",
                    )
                    .with_page(table.page)
                    .with_confidence(table.confidence),
                );
                out.push(table);
            }
            QualityMode::Strict => {
                return Err(ExtractError::AmbiguousTable {
                    page: table.page,
                    confidence: table.confidence,
                });
            }
            QualityMode::SkipAmbiguous => {
                warnings.push(
                    ExtractWarning::new(WarningCode::LowConfidence, "skipping low-confidence table")
                        .with_page(table.page)
                        .with_confidence(table.confidence),
                );
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::{DetectedTable, apply_quality_mode, detect_tables_in_page};
    use crate::error::ExtractError;
    use crate::model::{Row, WordBox};
    use crate::options::{ExtractOptions, QualityMode};
    use crate::rows::cluster_rows;
    use crate::warning::WarningCode;

    fn line(y: f32, cells: &[(&str, f32)]) -> Vec<WordBox> {
        cells
            .iter()
            .map(|(text, x)| {
                #[allow(clippy::cast_precision_loss)]
                let width = text.len() as f32 * 5.0;
                WordBox::new(*text, *x, y, *x + width, y + 10.0, 1)
            })
            .collect()
    }

    fn page_rows(lines: &[Vec<WordBox>]) -> Vec<Row> {
        let words = lines.iter().flatten().cloned().collect::<Vec<_>>();
        cluster_rows(&words, 2.0)
    }

    #[test]
    fn finds_one_table_between_prose_lines() {
        let rows = page_rows(&[
            line(10.0, &[("Account", 50.0), ("summary", 90.0)]),
            line(40.0, &[("Item", 50.0), ("Qty", 200.0), ("Price", 300.0)]),
            line(60.0, &[("Pens", 50.0), ("2", 200.0), ("3.50", 300.0)]),
            line(80.0, &[("Paper", 50.0), ("1", 200.0), ("9.00", 300.0)]),
        ]);
        let tables = detect_tables_in_page(1, &rows, &ExtractOptions::default());
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows.len(), 3);
        assert_eq!(tables[0].rows[1], vec!["Pens", "2", "3.50"]);
        assert!((tables[0].confidence - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn keeps_a_single_wrapped_row_inside_a_table() {
        let rows = page_rows(&[
            line(40.0, &[("Date", 50.0), ("Details", 150.0), ("Amount", 300.0)]),
            line(60.0, &[("01/02/2024", 50.0), ("Grocer", 150.0), ("12.00", 300.0)]),
            line(72.0, &[("market", 150.0)]),
            line(90.0, &[("02/02/2024", 50.0), ("Fuel", 150.0), ("40.00", 300.0)]),
        ]);
        let tables = detect_tables_in_page(1, &rows, &ExtractOptions::default());
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows.len(), 4);
        assert_eq!(tables[0].rows[2], vec!["", "market", ""]);
    }

    #[test]
    fn two_short_rows_end_the_block() {
        let rows = page_rows(&[
            line(40.0, &[("a", 50.0), ("b", 200.0)]),
            line(60.0, &[("c", 50.0), ("d", 200.0)]),
            line(80.0, &[("note", 50.0)]),
            line(100.0, &[("more", 50.0)]),
            line(120.0, &[("e", 50.0), ("f", 200.0)]),
        ]);
        let tables = detect_tables_in_page(1, &rows, &ExtractOptions::default());
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows.len(), 2);
    }

    fn weak_table() -> DetectedTable {
        DetectedTable {
            page: 3,
            rows: vec![vec!["a".to_string()], vec!["b".to_string(), "c".to_string()]],
            confidence: 0.4,
        }
    }

    #[test]
    fn quality_modes_handle_low_confidence_tables() {
        let mut warnings = Vec::new();
        let kept = apply_quality_mode(vec![weak_table()], &ExtractOptions::default(), &mut warnings)
            .expect("best effort keeps tables");
        assert_eq!(kept.len(), 1);
        assert_eq!(warnings[0].code, WarningCode::LowConfidence);

        let strict = ExtractOptions {
            quality_mode: QualityMode::Strict,
            ..ExtractOptions::default()
        };
        let err = apply_quality_mode(vec![weak_table()], &strict, &mut warnings)
            .expect_err("strict rejects ambiguous tables");
        assert!(matches!(err, ExtractError::AmbiguousTable { page: 3, .. }));

        let skip = ExtractOptions {
            quality_mode: QualityMode::SkipAmbiguous,
            ..ExtractOptions::default()
        };
        let mut warnings = Vec::new();
        let kept = apply_quality_mode(vec![weak_table()], &skip, &mut warnings)
            .expect("skip mode drops tables");
        assert!(kept.is_empty());
        assert_eq!(warnings.len(), 1);
    }
}
