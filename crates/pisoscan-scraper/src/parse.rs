//! Shared extraction helpers used by every source implementation.
//!
//! All helpers return `None` on unparseable input — a listing card with a
//! mangled price must not abort the page it sits on. Spanish number
//! formatting is assumed: `.` as thousands separator, `,` as decimal
//! separator.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid number regex"));

static INTEGER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid int regex"));

/// Parses a price like `"250.000 €"`, `"1.200 €/mes"`, or `"899.000€"`.
///
/// Strips thousands separators, currency and per-month suffixes, normalizes
/// the decimal separator, and returns the first numeric token.
#[must_use]
pub fn parse_price(text: &str) -> Option<Decimal> {
    if text.trim().is_empty() {
        return None;
    }

    let cleaned = text
        .replace('.', "")
        .replace(',', ".")
        .replace('€', "")
        .replace("/mes", "")
        .replace([' ', '\u{a0}'], "");

    NUMBER_RE
        .find(&cleaned)
        .and_then(|m| Decimal::from_str(m.as_str()).ok())
}

/// Returns the first integer token in `text`, e.g. `"3 hab."` -> `3`.
#[must_use]
pub fn parse_int(text: &str) -> Option<i32> {
    INTEGER_RE
        .find(text)
        .and_then(|m| m.as_str().parse::<i32>().ok())
}

/// Parses a surface area like `"120 m²"` or `"85,5 m2"`.
#[must_use]
pub fn parse_area(text: &str) -> Option<Decimal> {
    if text.trim().is_empty() {
        return None;
    }

    let cleaned = text
        .replace('.', "")
        .replace(',', ".")
        .replace("m²", "")
        .replace("m2", "")
        .replace([' ', '\u{a0}'], "");

    NUMBER_RE
        .find(&cleaned)
        .and_then(|m| Decimal::from_str(m.as_str()).ok())
}
