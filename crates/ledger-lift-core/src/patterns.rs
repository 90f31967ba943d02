use std::str::FromStr;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;

use crate::options::DateOrder;

const CURRENCY_SYMBOLS: &[char] = &[
    '$', '€', '£', '¥', '₹', '¢', '₨', '₽', '₩', '₪', '₦', '₴', '₵', '₡', '₲', '₸', '₺', '₼',
];
const CURRENCY_CODES: &[&str] = &["rs.", "rs", "inr", "usd", "eur", "gbp"];

static AMOUNT_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?:\d{1,3}(?:[,.' ]\d{3})+|\d{1,2}(?:,\d{2})+,\d{3})(?:[.,]\d{2})?|\d+[.,]\d{2})$",
    )
    .expect("valid regex")
});

static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})$").expect("valid regex")
});

static NUMERIC_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})[-/.](\d{1,2})[-/.](\d{4}|\d{2})$").expect("valid regex")
});

static DAY_MONTH_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})[\s\-/]+([A-Za-z]{3,9})\.?[\s\-/,]+(\d{4}|\d{2})$").expect("valid regex")
});

static MONTH_NAME_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z]{3,9})\.?\s+(\d{1,2}),?\s+(\d{4})$").expect("valid regex")
});

static DATE_SEARCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:\d{4}[-/.]\d{1,2}[-/.]\d{1,2}|\d{1,2}[-/.]\d{1,2}[-/.](?:\d{4}|\d{2})|\d{1,2}[\s\-/]+[A-Za-z]{3,9}\.?[\s\-/,]+(?:\d{4}|\d{2})|[A-Za-z]{3,9}\.?\s+\d{1,2},?\s+\d{4})\b",
    )
    .expect("valid regex")
});

fn strip_suffix_ci<'a>(value: &'a str, suffix: &str) -> Option<&'a str> {
    let split = value.len().checked_sub(suffix.len())?;
    let (head, tail) = (value.get(..split)?, value.get(split..)?);
    tail.eq_ignore_ascii_case(suffix).then_some(head)
}

fn strip_prefix_ci<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let (head, tail) = (value.get(..prefix.len())?, value.get(prefix.len()..)?);
    head.eq_ignore_ascii_case(prefix).then_some(tail)
}

/// Separates sign markers and currency from the digits of an amount.
/// Returns the sign and the bare numeric body.
fn split_amount(raw: &str) -> Option<(bool, String)> {
    let mut value = raw.trim();
    let mut negative = false;

    for _ in 0..3 {
        let before = value;
        if let Some(rest) = strip_suffix_ci(value, "dr").or_else(|| strip_suffix_ci(value, "dr.")) {
            negative = true;
            value = rest.trim_end();
        } else if let Some(rest) =
            strip_suffix_ci(value, "cr").or_else(|| strip_suffix_ci(value, "cr."))
        {
            value = rest.trim_end();
        }
        if let Some(inner) = value.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
            negative = true;
            value = inner.trim();
        }
        if let Some(rest) = value.strip_prefix(['-', '\u{2212}']) {
            negative = true;
            value = rest.trim_start();
        }
        if let Some(rest) = value.strip_suffix('-') {
            negative = true;
            value = rest.trim_end();
        }
        if let Some(rest) = value.strip_prefix('+') {
            value = rest.trim_start();
        }
        value = value.trim_matches(CURRENCY_SYMBOLS).trim();
        for code in CURRENCY_CODES {
            if let Some(rest) = strip_prefix_ci(value, code) {
                value = rest.trim_start();
            }
            if let Some(rest) = strip_suffix_ci(value, code) {
                value = rest.trim_end();
            }
        }
        if value == before {
            break;
        }
    }

    let body = value.trim();
    let starts = body.chars().next().is_some_and(|ch| ch.is_ascii_digit());
    let ends = body.chars().last().is_some_and(|ch| ch.is_ascii_digit());
    let valid = body
        .chars()
        .all(|ch| ch.is_ascii_digit() || matches!(ch, ',' | '.' | '\'' | ' '));
    (starts && ends && valid).then(|| (negative, body.to_string()))
}

/// Parses a monetary value. Parentheses, a leading or trailing minus and a
/// `Dr` suffix mark negatives. When both `,` and `.` appear the later one is
/// the decimal separator; a lone `,` followed by at most two digits is one
/// too.
#[must_use]
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let (negative, body) = split_amount(raw)?;
    let body = body.replace(['\'', ' '], "");

    let commas = body.matches(',').count();
    let dots = body.matches('.').count();
    let normalized = match (commas, dots) {
        (0, 0) => body,
        (c, d) if c > 0 && d > 0 => {
            let last_comma = body.rfind(',').unwrap_or(0);
            let last_dot = body.rfind('.').unwrap_or(0);
            if last_comma > last_dot {
                body.replace('.', "").replace(',', ".")
            } else {
                body.replace(',', "")
            }
        }
        (1, 0) => match body.split_once(',') {
            Some((_, decimals)) if decimals.len() <= 2 => body.replace(',', "."),
            _ => body.replace(',', ""),
        },
        (_, 0) => body.replace(',', ""),
        (0, 1) => body,
        (0, _) => body.replace('.', ""),
        _ => return None,
    };

    let value = Decimal::from_str(&normalized).ok()?;
    Some(if negative { -value } else { value })
}

/// Whether a token looks like money rather than a count or an id: it must
/// carry two decimals or thousands separators.
#[must_use]
pub fn is_amount_token(raw: &str) -> bool {
    split_amount(raw).is_some_and(|(_, body)| AMOUNT_SHAPE.is_match(&body))
        && parse_amount(raw).is_some()
}

fn month_from_name(name: &str) -> Option<u32> {
    let lower = name.to_ascii_lowercase();
    let prefix = lower.get(..3)?;
    let month = match prefix {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn full_year(raw: &str) -> Option<i32> {
    let year: i32 = raw.parse().ok()?;
    Some(match raw.len() {
        2 if year < 70 => 2000 + year,
        2 => 1900 + year,
        _ => year,
    })
}

/// Parses a whole-cell date. All-numeric day/month order follows `order`,
/// falling back to the other order when the preferred one is impossible.
#[must_use]
pub fn parse_date(raw: &str, order: DateOrder) -> Option<NaiveDate> {
    let value = raw.trim();

    if let Some(caps) = ISO_DATE.captures(value) {
        return NaiveDate::from_ymd_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, caps[3].parse().ok()?);
    }

    if let Some(caps) = NUMERIC_DATE.captures(value) {
        let first: u32 = caps[1].parse().ok()?;
        let second: u32 = caps[2].parse().ok()?;
        let year = full_year(&caps[3])?;
        let (day, month) = match order {
            DateOrder::DayFirst => (first, second),
            DateOrder::MonthFirst => (second, first),
        };
        return NaiveDate::from_ymd_opt(year, month, day)
            .or_else(|| NaiveDate::from_ymd_opt(year, day, month));
    }

    if let Some(caps) = DAY_MONTH_NAME.captures(value) {
        let month = month_from_name(&caps[2])?;
        return NaiveDate::from_ymd_opt(full_year(&caps[3])?, month, caps[1].parse().ok()?);
    }

    if let Some(caps) = MONTH_NAME_DAY.captures(value) {
        let month = month_from_name(&caps[1])?;
        return NaiveDate::from_ymd_opt(full_year(&caps[3])?, month, caps[2].parse().ok()?);
    }

    None
}

/// The first parseable date anywhere in `text`.
#[must_use]
pub fn find_date(text: &str, order: DateOrder) -> Option<NaiveDate> {
    parse_date(text, order).or_else(|| {
        DATE_SEARCH
            .find_iter(text)
            .find_map(|candidate| parse_date(candidate.as_str(), order))
    })
}
