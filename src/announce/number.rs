//! Accounting-style number cleaning for MOPS table cells.

use once_cell::sync::Lazy;
use regex::Regex;

/// Characters and marks that never carry numeric meaning in a filing cell
static NOISE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:NT\$|US\$|\$|元|新台幣|仟|千|%|％|,|，|\s|\u{00a0}|\u{3000})")
        .expect("Failed to compile accounting noise regex")
});

/// Parse a cell such as `(1,234,567)`, `NT$ 12,345` or `－3.21` into a number.
///
/// Parentheses and leading minus signs (ASCII, full-width or Unicode minus)
/// denote negatives. Empty cells and lone dashes yield `None`.
pub fn parse_accounting_number(text: &str) -> Option<f64> {
    let cleaned = NOISE.replace_all(text.trim(), "");
    let mut body: &str = &cleaned;

    let mut negative = false;
    if let Some(inner) = body.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        negative = true;
        body = inner;
    } else if let Some(inner) = body.strip_prefix('（').and_then(|s| s.strip_suffix('）')) {
        negative = true;
        body = inner;
    }

    for minus in ['-', '－', '−'] {
        if let Some(rest) = body.strip_prefix(minus) {
            negative = !negative;
            body = rest;
            break;
        }
    }

    if body.is_empty() || body.chars().all(|c| matches!(c, '-' | '－' | '−')) {
        return None;
    }

    let value: f64 = body.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value } else { value })
}
