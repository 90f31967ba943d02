use crate::options::HeaderMode;
use crate::patterns::parse_amount;
use crate::warning::{ExtractWarning, WarningCode};

const HEADER_CONFIDENCE_THRESHOLD: f32 = 0.55;

fn is_numeric(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty()
        && (trimmed.replace(',', "").parse::<f64>().is_ok() || parse_amount(trimmed).is_some())
}

#[allow(clippy::cast_precision_loss)]
fn non_numeric_ratio(cells: &[String]) -> f32 {
    let filled = cells
        .iter()
        .filter(|cell| !cell.trim().is_empty())
        .collect::<Vec<_>>();
    if filled.is_empty() {
        return 0.0;
    }

    let non_numeric = filled.iter().filter(|cell| !is_numeric(cell)).count();
    non_numeric as f32 / filled.len() as f32
}

/// Whether the first row reads as a header: mostly text, followed by a row
/// that is at least partly numeric.
pub(crate) fn infer_has_header(rows: &[Vec<String>]) -> (bool, f32) {
    if rows.is_empty() {
        return (false, 0.0);
    }

    let first = non_numeric_ratio(&rows[0]);
    let second = rows.get(1).map_or(0.0, |row| non_numeric_ratio(row));

    let confidence = (first * 0.6 + (1.0 - second) * 0.4).clamp(0.0, 1.0);
    let has_header = first >= 0.6 && second <= 0.7;
    (has_header, confidence)
}

/// Splits a block into its header row (when there is one) and data rows.
pub(crate) fn split_header(
    rows: Vec<Vec<String>>,
    mode: HeaderMode,
    page: u32,
    table_id: usize,
    warnings: &mut Vec<ExtractWarning>,
) -> (Option<Vec<String>>, Vec<Vec<String>>) {
    let take_first = |mut rows: Vec<Vec<String>>| {
        if rows.is_empty() {
            return (None, rows);
        }
        let header = rows.remove(0);
        (Some(header), rows)
    };

    match mode {
        HeaderMode::HasHeader => take_first(rows),
        HeaderMode::NoHeader => (None, rows),
        HeaderMode::AutoDetect => {
            let (has_header, confidence) = infer_has_header(&rows);
            if has_header && confidence >= HEADER_CONFIDENCE_THRESHOLD {
                return take_first(rows);
            }

            if confidence < HEADER_CONFIDENCE_THRESHOLD {
                warnings.push(
                    ExtractWarning::new(
                        WarningCode::HeaderInferenceLowConfidence,
                        "header inference confidence is low; keeping the first row as data",
                    )
                    .with_page(page)
                    .with_table_id(table_id)
                    .with_confidence(confidence),
                );
            }

            (None, rows)
        }
    }
}

/// `col_1 .. col_width`.
pub(crate) fn generated_headers(width: usize) -> Vec<String> {
    (1..=width).map(|index| format!("col_{index}")).collect()
}
