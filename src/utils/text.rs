// src/utils/text.rs

//! Text helpers shared by all extractors: whitespace cleanup, the WBS rule,
//! German number parsing and currency rendering.

use std::sync::LazyLock;

use regex::Regex;

static WBS_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bwbs\b|wohnberechtigungsschein").expect("static regex")
});

static WBS_NEGATED_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bwbs\b[:\s-]*(nein|no|nicht)").expect("static regex")
});

static FIRST_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:[.,]\d+)?").expect("static regex"));

static THOUSANDS_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,3}(\.\d{3})+$").expect("static regex"));

/// Phrases that explicitly waive the WBS requirement.
const WBS_NEGATIONS: &[&str] = &[
    "kein wbs",
    "ohne wbs",
    "no wbs",
    "wbs nicht erforderlich",
    "wbs nicht notwendig",
    "wbs nicht nötig",
    "ohne wohnberechtigungsschein",
    "kein wohnberechtigungsschein",
];

/// Collapse runs of whitespace and trim.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether free text says a WBS is required.
///
/// Not mentioned at all means not required. Mentioned and not negated anywhere
/// in the same text means required.
pub fn requires_eligibility_certificate(text: &str) -> bool {
    if text.trim().is_empty() || !WBS_KEYWORD.is_match(text) {
        return false;
    }

    let lower = text.to_lowercase();
    if WBS_NEGATIONS.iter().any(|phrase| lower.contains(phrase)) {
        return false;
    }

    !WBS_NEGATED_SUFFIX.is_match(&lower)
}

/// First number in the text, reading `,` as the decimal separator.
///
/// `"2,5 Zimmer"` → `2.5`
pub fn first_number(text: &str) -> Option<f64> {
    FIRST_NUMBER
        .find(text)
        .and_then(|m| m.as_str().replace(',', ".").parse().ok())
}

/// Parse an amount written either German style (`1.234,50`) or plain (`1234.5`).
///
/// Currency symbols, units and spaces are ignored. A lone dot followed by
/// exactly three-digit groups (`1.234`) is read as a thousands separator.
pub fn parse_decimal(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else if THOUSANDS_ONLY.is_match(cleaned.trim_start_matches('-')) {
        cleaned.replace('.', "")
    } else {
        cleaned
    };

    normalized.parse().ok()
}

/// Render an amount German style with two decimals: `1234.5` → `"1.234,50 €"`.
pub fn format_euro(amount: f64) -> String {
    format!("{} €", format_german(amount, 2))
}

/// Render a number with `.` thousands and `,` decimal separators.
pub fn format_german(amount: f64, decimals: usize) -> String {
    let negative = amount < 0.0;
    let scale = 10f64.powi(decimals as i32);
    let scaled = (amount.abs() * scale).round() as u64;
    let factor = scale as u64;
    let whole = scaled / factor;
    let fraction = scaled % factor;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    let sign = if negative && scaled > 0 { "-" } else { "" };
    if decimals == 0 {
        format!("{sign}{grouped}")
    } else {
        format!("{sign}{grouped},{fraction:0decimals$}")
    }
}

/// Re-render an amount as German currency; unparsable input is kept as-is.
pub fn euro_from_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(parse_decimal(trimmed).map_or_else(|| trimmed.to_string(), format_euro))
}

/// Show a plain decimal with a German comma: `"2.5"` → `"2,5"`.
pub fn decimal_comma(text: &str) -> String {
    text.trim().replace('.', ",")
}

/// Truncate to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
