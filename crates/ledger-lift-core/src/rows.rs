use crate::model::{Row, WordBox};

/// Groups words into visual lines.
///
/// Words are sorted by vertical midpoint and folded into the open row while
/// their midpoint stays within `tolerance` of the row's running average
/// midpoint. Closed rows are sorted by `x0`. Words from different pages never
/// share a row.
#[must_use]
pub fn cluster_rows(words: &[WordBox], tolerance: f32) -> Vec<Row> {
    let mut sorted = words.to_vec();
    sorted.sort_by(|a, b| {
        a.page
            .cmp(&b.page)
            .then(a.mid_y().total_cmp(&b.mid_y()))
            .then(a.x0.total_cmp(&b.x0))
    });

    let mut rows = Vec::new();
    let mut current: Vec<WordBox> = Vec::new();
    let mut sum_mid = 0.0_f32;

    for word in sorted {
        if let Some(first) = current.first() {
            #[allow(clippy::cast_precision_loss)]
            let average = sum_mid / current.len() as f32;
            if first.page != word.page || (word.mid_y() - average).abs() > tolerance {
                rows.push(close_row(std::mem::take(&mut current)));
                sum_mid = 0.0;
            }
        }
        sum_mid += word.mid_y();
        current.push(word);
    }
    if !current.is_empty() {
        rows.push(close_row(current));
    }

    rows
}

fn close_row(mut words: Vec<WordBox>) -> Row {
    words.sort_by(|a, b| a.x0.total_cmp(&b.x0));
    let page = words.first().map_or(0, |word| word.page);
    Row { page, words }
}

/// Splits a row into cells wherever the horizontal gap between neighbouring
/// words exceeds `gap`.
#[must_use]
pub fn split_row_by_gap(row: &Row, gap: f32) -> Vec<Vec<&WordBox>> {
    let mut cells: Vec<Vec<&WordBox>> = Vec::new();
    for word in &row.words {
        let joins = cells
            .last()
            .and_then(|cell| cell.last())
            .is_some_and(|previous| word.x0 - previous.x1 <= gap);
        if let Some(cell) = cells.last_mut().filter(|_| joins) {
            cell.push(word);
        } else {
            cells.push(vec![word]);
        }
    }
    cells
}

pub(crate) fn cell_text(words: &[&WordBox]) -> String {
    words
        .iter()
        .map(|word| word.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::{cluster_rows, split_row_by_gap};
    use crate::model::WordBox;

    fn word(text: &str, x0: f32, y0: f32, x1: f32, y1: f32) -> WordBox {
        WordBox::new(text, x0, y0, x1, y1, 1)
    }

    fn two_column_page() -> Vec<WordBox> {
        vec![
            word("100.00", 200.0, 120.5, 230.0, 130.5),
            word("Date", 50.0, 100.0, 72.0, 110.0),
            word("-50.00", 200.0, 140.0, 228.0, 150.0),
            word("2024-01-01", 50.0, 120.0, 100.0, 130.0),
            word("Amount", 200.0, 100.2, 236.0, 110.2),
            word("2024-01-02", 50.0, 140.3, 100.0, 150.3),
        ]
    }

    #[test]
    fn clusters_two_column_page_into_three_sorted_rows() {
        let rows = cluster_rows(&two_column_page(), 2.0);
        assert_eq!(rows.len(), 3);
        let texts = rows
            .iter()
            .map(|row| row.words.iter().map(|w| w.text.as_str()).collect::<Vec<_>>())
            .collect::<Vec<_>>();
        assert_eq!(
            texts,
            vec![
                vec!["Date", "Amount"],
                vec!["2024-01-01", "100.00"],
                vec!["2024-01-02", "-50.00"],
            ]
        );
    }

    #[test]
    fn clustering_is_deterministic_and_a_partition() {
        let words = two_column_page();
        let first = cluster_rows(&words, 2.0);
        let second = cluster_rows(&words, 2.0);
        assert_eq!(first, second);

        let total = first.iter().map(|row| row.words.len()).sum::<usize>();
        assert_eq!(total, words.len());
        for word in &words {
            let hits = first
                .iter()
                .filter(|row| row.words.iter().any(|w| w == word))
                .count();
            assert_eq!(hits, 1, "{} must be in exactly one row", word.text);
        }
    }

    #[test]
    fn running_average_prevents_drift() {
        // Each word sits 1.5pt below the previous one, so chaining on the
        // previous word alone would put all six on one line.
        let words = (0..6_u8)
            .map(|i| {
                let y = f32::from(i) * 1.5;
                word(&format!("w{i}"), f32::from(i) * 20.0, y, f32::from(i) * 20.0 + 10.0, y + 10.0)
            })
            .collect::<Vec<_>>();
        let rows = cluster_rows(&words, 2.0);
        assert!(rows.len() > 1);
    }

    #[test]
    fn empty_input_and_zero_height_words() {
        assert!(cluster_rows(&[], 2.0).is_empty());
        let flat = vec![word("a", 0.0, 10.0, 5.0, 10.0), word("b", 10.0, 10.5, 15.0, 10.5)];
        let rows = cluster_rows(&flat, 2.0);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].words.len(), 2);
    }

    #[test]
    fn words_on_different_pages_never_share_a_row() {
        let words = vec![
            WordBox::new("p1", 0.0, 10.0, 10.0, 20.0, 1),
            WordBox::new("p2", 20.0, 10.0, 30.0, 20.0, 2),
        ];
        let rows = cluster_rows(&words, 2.0);
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].page, rows[1].page), (1, 2));
    }

    #[test]
    fn splits_cells_on_wide_gaps() {
        let rows = cluster_rows(
            &[
                word("Opening", 10.0, 0.0, 50.0, 10.0),
                word("balance", 53.0, 0.0, 90.0, 10.0),
                word("1,000.00", 200.0, 0.0, 240.0, 10.0),
            ],
            2.0,
        );
        let cells = split_row_by_gap(&rows[0], 6.0);
        assert_eq!(cells.len(), 2);
        assert_eq!(super::cell_text(&cells[0]), "Opening balance");
    }
}
