use std::str::FromStr;

use anyhow::{anyhow, Result};
use rust_decimal::Decimal;

const NUMBER_ESCAPE_CHAR: &[char] = &[',', ' ', '\n', '\r', '\t'];

/// Converts a GBK encoded byte slice to a UTF-8 `String`.
///
/// Malformed sequences are replaced with U+FFFD rather than failing, the
/// quote payload only needs the ASCII fields to survive.
pub fn gbk_2_utf8(data: &[u8]) -> String {
    let (text, _, _) = encoding_rs::GBK.decode(data);
    text.into_owned()
}

/// Parses a decimal value from a given string.
///
/// Thousands separators and surrounding whitespace are dropped before the
/// conversion, so `"1,234.56"` parses as `1234.56`.
pub fn parse_decimal(s: &str) -> Result<Decimal> {
    let cleaned = clean_escape_chars(s);
    Decimal::from_str(&cleaned)
        .map_err(|why| anyhow!("Failed to parse '{}' as Decimal because {:?}", cleaned, why))
}

/// Removes the number escape characters from a given string.
fn clean_escape_chars(s: &str) -> String {
    s.chars().filter(|c| !NUMBER_ESCAPE_CHAR.contains(c)).collect()
}

/// 截取前 `max_chars` 個字元，有截斷時補上 "..."
pub fn preview(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
