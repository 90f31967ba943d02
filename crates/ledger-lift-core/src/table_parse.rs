use std::collections::HashMap;

use crate::model::{Row, WordBox};
use crate::rows::{cell_text, split_row_by_gap};

/// A column inferred from the horizontal projection of a block of rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Band {
    pub x0: f32,
    pub x1: f32,
}

impl Band {
    fn distance(&self, x: f32) -> f32 {
        if x < self.x0 {
            self.x0 - x
        } else if x > self.x1 {
            x - self.x1
        } else {
            0.0
        }
    }
}

pub(crate) fn normalize_rows(rows: &[Vec<String>], width: usize) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| {
            let mut out = row.clone();
            out.resize(width, String::new());
            out
        })
        .collect()
}

pub(crate) fn modal_width(rows: &[Vec<String>]) -> usize {
    let mut freq = HashMap::new();
    for width in rows.iter().map(Vec::len) {
        *freq.entry(width).or_insert(0_usize) += 1;
    }

    freq.into_iter()
        .max_by_key(|(width, count)| (*count, *width))
        .map_or(0, |(width, _)| width)
}

/// Gap-separated cell texts of each row.
pub(crate) fn gap_cells(rows: &[&Row], gap: f32) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| {
            split_row_by_gap(row, gap)
                .iter()
                .map(|cell| cell_text(cell))
                .collect()
        })
        .collect()
}

/// How table-like a block is: the share of rows with the modal cell count,
/// blended with how close the narrowest row is to the widest.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn table_confidence(rows: &[Vec<String>]) -> f32 {
    if rows.len() < 2 {
        return 0.0;
    }

    let modal = modal_width(rows);
    if modal == 0 {
        return 0.0;
    }

    let consistent =
        rows.iter().filter(|row| row.len() == modal).count() as f32 / rows.len() as f32;
    let max_width = rows.iter().map(Vec::len).max().unwrap_or(modal);
    let min_width = rows.iter().map(Vec::len).min().unwrap_or(modal);
    let uniformity = if max_width == 0 {
        0.0
    } else {
        1.0 - ((max_width - min_width) as f32 / max_width as f32)
    };

    (consistent * 0.75 + uniformity * 0.25).clamp(0.0, 1.0)
}

/// Column bands from the union of word extents: overlapping or nearly
/// touching extents (closer than `gap`) join one band.
pub(crate) fn infer_bands(rows: &[&Row], gap: f32) -> Vec<Band> {
    let mut extents = rows
        .iter()
        .flat_map(|row| row.words.iter())
        .map(|word| (word.x0, word.x1))
        .collect::<Vec<_>>();
    extents.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut bands: Vec<Band> = Vec::new();
    for (x0, x1) in extents {
        let joins = bands.last().is_some_and(|band| x0 - band.x1 <= gap);
        if let Some(band) = bands.last_mut().filter(|_| joins) {
            band.x1 = band.x1.max(x1);
        } else {
            bands.push(Band { x0, x1 });
        }
    }
    bands
}

fn band_for(word: &WordBox, bands: &[Band]) -> Option<usize> {
    let center = word.mid_x();
    bands
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.distance(center).total_cmp(&b.distance(center)))
        .map(|(index, _)| index)
}

/// One string per band; words in the same band are joined with spaces.
pub(crate) fn cells_for_bands(row: &Row, bands: &[Band]) -> Vec<String> {
    let mut cells = vec![String::new(); bands.len()];
    for word in &row.words {
        if let Some(index) = band_for(word, bands) {
            let cell = &mut cells[index];
            if !cell.is_empty() {
                cell.push(' ');
            }
            cell.push_str(&word.text);
        }
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::{cells_for_bands, infer_bands, modal_width, normalize_rows, table_confidence};
    use crate::model::{Row, WordBox};

    fn row(words: &[(&str, f32, f32)], y: f32) -> Row {
        Row {
            page: 1,
            words: words
                .iter()
                .map(|(text, x0, x1)| WordBox::new(*text, *x0, y, *x1, y + 10.0, 1))
                .collect(),
        }
    }

    #[test]
    fn normalizes_ragged_rows() {
        let rows = vec![
            vec!["a".to_string()],
            vec!["b".to_string(), "c".to_string()],
        ];
        let normalized = normalize_rows(&rows, 3);
        assert_eq!(normalized[0], vec!["a", "", ""]);
        assert_eq!(normalized[1], vec!["b", "c", ""]);
    }

    #[test]
    fn detects_modal_width() {
        let rows = vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["1".to_string(), "2".to_string()],
            vec!["x".to_string()],
        ];
        assert_eq!(modal_width(&rows), 2);
    }

    #[test]
    fn consistent_rows_score_full_confidence() {
        let rows = vec![
            vec!["Date".to_string(), "Amount".to_string()],
            vec!["2024-01-01".to_string(), "100.00".to_string()],
        ];
        assert!((table_confidence(&rows) - 1.0).abs() < f32::EPSILON);
        assert_eq!(table_confidence(&rows[..1]), 0.0);
    }

    #[test]
    fn bands_follow_column_projection() {
        let rows = [
            row(&[("Date", 50.0, 72.0), ("Details", 120.0, 155.0), ("Amount", 300.0, 336.0)], 0.0),
            row(
                &[
                    ("01/02/2024", 50.0, 100.0),
                    ("Coffee", 120.0, 150.0),
                    ("shop", 153.0, 175.0),
                    ("4.50", 318.0, 336.0),
                ],
                20.0,
            ),
        ];
        let refs = rows.iter().collect::<Vec<_>>();
        let bands = infer_bands(&refs, 6.0);
        assert_eq!(bands.len(), 3);
        assert_eq!(cells_for_bands(&rows[1], &bands), vec!["01/02/2024", "Coffee shop", "4.50"]);
    }
}
