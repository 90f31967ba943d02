//! Bank-statement transaction inference.
//!
//! A header row is recognized by banking keywords; its cells define the
//! columns for the rows below it (and for later pages until another header
//! appears). A row carrying a date and an amount opens a transaction; other
//! rows continue the open transaction's description.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::error::ExtractError;
use crate::model::{
    Fields, Row, SemanticField, StatementExtraction, StatementSummary, Transaction, WordBox,
};
use crate::options::{ExtractOptions, HeaderKeywords, NoiseKeywords, StatementOptions};
use crate::patterns::{find_date, is_amount_token, parse_amount, parse_date};
use crate::rows::{cell_text, split_row_by_gap};
use crate::warning::{ExtractWarning, WarningCode};

fn tokens(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn contains_phrase(text: &[String], phrase: &str) -> bool {
    let phrase = tokens(phrase);
    !phrase.is_empty()
        && text
            .windows(phrase.len())
            .any(|window| window == phrase.as_slice())
}

/// The role a header cell names, if any. Phrases match whole words, and
/// roles are tried in the keyword table's order.
#[must_use]
pub fn header_role(cell: &str, keywords: &HeaderKeywords) -> Option<SemanticField> {
    let cell_tokens = tokens(cell);
    keywords.roles.iter().find_map(|(role, phrases)| {
        phrases
            .iter()
            .any(|phrase| contains_phrase(&cell_tokens, phrase))
            .then_some(*role)
    })
}

/// Totals, carried balances and page footers: rows that must neither become
/// transactions nor extend one.
pub(crate) fn is_noise_row(text: &str, noise: &NoiseKeywords) -> bool {
    let row_tokens = tokens(text);
    noise
        .anywhere
        .iter()
        .any(|phrase| contains_phrase(&row_tokens, phrase))
        || noise.leading.iter().any(|phrase| {
            let phrase = tokens(phrase);
            !phrase.is_empty() && row_tokens.starts_with(&phrase)
        })
}

#[derive(Debug, Clone, PartialEq)]
struct HeaderColumn {
    name: String,
    role: Option<SemanticField>,
    left: f32,
    right: f32,
}

#[derive(Debug, Clone, PartialEq)]
struct StatementHeader {
    columns: Vec<HeaderColumn>,
}

impl StatementHeader {
    fn detect(row: &Row, options: &StatementOptions, gap: f32) -> Option<Self> {
        let mut seen: BTreeMap<String, usize> = BTreeMap::new();
        let columns = split_row_by_gap(row, gap)
            .iter()
            .map(|cell| {
                let text = cell_text(cell);
                let count = seen.entry(text.clone()).or_default();
                *count += 1;
                let name = if *count == 1 {
                    text.clone()
                } else {
                    format!("{text} ({count})")
                };
                HeaderColumn {
                    name,
                    role: header_role(&text, &options.keywords),
                    left: cell.first().map_or(0.0, |word| word.x0),
                    right: cell.last().map_or(0.0, |word| word.x1),
                }
            })
            .collect::<Vec<_>>();

        let roles = columns
            .iter()
            .filter_map(|column| column.role)
            .collect::<BTreeSet<_>>();
        let is_header = roles.contains(&SemanticField::Date)
            && roles.len() >= options.min_header_roles.max(1);
        is_header.then_some(Self { columns })
    }

    /// Column boundaries sit halfway across the gap between neighbouring
    /// header cells; the outer columns are open-ended.
    fn column_for(&self, x: f32) -> usize {
        self.columns
            .windows(2)
            .take_while(|pair| x > (pair[0].right + pair[1].left) / 2.0)
            .count()
    }

    fn cells(&self, row: &Row) -> Vec<String> {
        let mut cells = vec![String::new(); self.columns.len()];
        for word in &row.words {
            let cell = &mut cells[self.column_for(word.mid_x())];
            if !cell.is_empty() {
                cell.push(' ');
            }
            cell.push_str(&word.text);
        }
        cells
    }

    fn index_of(&self, role: SemanticField) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.role == Some(role))
    }

    /// Where continuation text goes: the description column, else the first
    /// column that is neither a date nor money.
    fn text_column(&self) -> Option<usize> {
        self.index_of(SemanticField::Description).or_else(|| {
            self.columns.iter().position(|column| {
                column
                    .role
                    .is_none_or(|role| role != SemanticField::Date && !role.is_monetary())
            })
        })
    }
}

fn build_transaction(
    page: u32,
    row: &Row,
    header: &StatementHeader,
    options: &StatementOptions,
) -> Option<Transaction> {
    let cells = header.cells(row);
    let date = header
        .index_of(SemanticField::Date)
        .and_then(|index| parse_date(&cells[index], options.date_order))
        .or_else(|| find_date(&row.text(), options.date_order))?;
    if !row.words.iter().any(|word| is_amount_token(&word.text)) {
        return None;
    }

    let amount_in = |role: SemanticField| {
        header
            .index_of(role)
            .and_then(|index| parse_amount(&cells[index]))
    };
    let mut debit = amount_in(SemanticField::Debit).map(|value| value.abs());
    let mut credit = amount_in(SemanticField::Credit).map(|value| value.abs());
    if debit.is_none()
        && credit.is_none()
        && let Some(value) = amount_in(SemanticField::Amount)
    {
        if value < Decimal::ZERO {
            debit = Some(-value);
        } else {
            credit = Some(value);
        }
    }

    let balance = amount_in(SemanticField::Balance);

    let mut fields = Fields::default();
    let mut roles = BTreeMap::new();
    for (column, cell) in header.columns.iter().zip(&cells) {
        if let Some(role) = column.role {
            roles.insert(column.name.clone(), role);
        }
        fields.insert(column.name.clone(), cell.clone());
    }

    Some(Transaction {
        page,
        fields,
        roles,
        date: Some(date),
        debit,
        credit,
        balance,
    })
}

fn summarize(transactions: &[Transaction]) -> StatementSummary {
    let dates = transactions.iter().filter_map(|transaction| transaction.date);
    StatementSummary {
        transaction_count: transactions.len(),
        total_debits: transactions.iter().filter_map(|t| t.debit).sum(),
        total_credits: transactions.iter().filter_map(|t| t.credit).sum(),
        final_balance: transactions.iter().rev().find_map(|t| t.balance),
        date_from: dates.clone().min(),
        date_to: dates.max(),
        pages_with_transactions: transactions
            .iter()
            .map(|transaction| transaction.page)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
    }
}

/// Fails when every word came from OCR and their mean confidence is below
/// `minimum`. Text-layer words carry no confidence and always pass.
pub(crate) fn check_ocr_confidence<'a>(
    words: impl IntoIterator<Item = &'a WordBox>,
    minimum: f32,
) -> Result<(), ExtractError> {
    let mut total = 0_usize;
    let mut confidences = Vec::new();
    for word in words {
        total += 1;
        if let Some(confidence) = word.confidence {
            confidences.push(confidence);
        }
    }
    if confidences.is_empty() || confidences.len() != total {
        return Ok(());
    }

    #[allow(clippy::cast_precision_loss)]
    let mean = confidences.iter().sum::<f32>() / confidences.len() as f32;
    if mean < minimum {
        return Err(ExtractError::NoTransactionsFound(format!(
            "OCR confidence is too low to trust ({mean:.2} < {minimum:.2}); select the table manually"
        )));
    }
    Ok(())
}

/// Turns page-ordered rows into transactions.
pub(crate) fn infer_transactions(
    pages: &[(u32, Vec<Row>)],
    options: &ExtractOptions,
) -> Result<StatementExtraction, ExtractError> {
    let statement = &options.statement;
    let mut headers: Vec<String> = Vec::new();
    let mut header: Option<StatementHeader> = None;
    let mut transactions: Vec<Transaction> = Vec::new();
    let mut warnings = Vec::new();

    for (page, rows) in pages {
        let found = rows.iter().enumerate().find_map(|(index, row)| {
            StatementHeader::detect(row, statement, options.cell_gap).map(|found| (index, found))
        });
        let start = match found {
            Some((index, found)) => {
                for column in &found.columns {
                    if !headers.contains(&column.name) {
                        headers.push(column.name.clone());
                    }
                }
                debug!(page, columns = found.columns.len(), "statement header");
                header = Some(found);
                index + 1
            }
            None => 0,
        };
        let Some(active) = header.as_ref() else {
            continue;
        };

        let before = transactions.len();
        let mut dropped = 0_usize;
        let mut noise = 0_usize;
        for row in rows.iter().skip(start) {
            if is_noise_row(&row.text(), &statement.noise) {
                noise += 1;
                continue;
            }
            if let Some(transaction) = build_transaction(*page, row, active, statement) {
                transactions.push(transaction);
                continue;
            }

            let target = active
                .text_column()
                .map(|index| active.columns[index].name.as_str());
            match (transactions.last_mut(), target) {
                (Some(last), Some(name)) => last.fields.append_text(name, &row.text()),
                _ => dropped += 1,
            }
        }

        let added = transactions.len() - before;
        if added == 0 && rows.len() > start {
            warnings.push(
                ExtractWarning::new(
                    WarningCode::NoRowsMatched,
                    "no transaction rows on this page",
                )
                .with_page(*page),
            );
        }
        debug!(page, transactions = added, dropped, noise, "statement page");
    }

    if header.is_none() {
        return Err(ExtractError::NoTransactionsFound(
            "no statement header row was recognized; select the table manually".to_string(),
        ));
    }
    if transactions.is_empty() {
        return Err(ExtractError::NoTransactionsFound(
            "a statement header was found but no rows carried both a date and an amount"
                .to_string(),
        ));
    }

    let summary = summarize(&transactions);
    info!(
        transactions = summary.transaction_count,
        pages = summary.pages_with_transactions.len(),
        "inferred statement"
    );

    Ok(StatementExtraction {
        headers,
        transactions,
        summary,
        warnings,
    })
}
