//! Timestamp coercion for webhook payloads.
//!
//! Webhooks send `timestamp` as numbers, numeric strings, quoted numeric strings,
//! or date strings. Everything is coerced to epoch milliseconds; anything that
//! cannot be read falls back to the current time.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

/// Quote characters stripped (one layer) from string timestamps.
const ENCLOSING_QUOTES: &[char] = &['"', '\'', '\u{201C}', '\u{201D}', '\u{2018}', '\u{2019}'];

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Current time as epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Coerce a raw `timestamp` value into epoch milliseconds.
///
/// Numbers pass through (fractions truncated). Strings lose one layer of straight or
/// curly quotes, then are read as a base-10 integer, then as a date. Absent, empty,
/// negative, non-finite or unreadable input yields the current time.
pub fn normalize_timestamp(raw: Option<&Value>) -> i64 {
    match raw {
        Some(Value::Number(n)) => from_number(n).unwrap_or_else(now_ms),
        Some(Value::String(s)) if !s.is_empty() => from_text(s).unwrap_or_else(now_ms),
        _ => now_ms(),
    }
}

fn from_number(n: &serde_json::Number) -> Option<i64> {
    if let Some(i) = n.as_i64() {
        return (i >= 0).then_some(i);
    }
    let f = n.as_f64()?;
    if f.is_finite() && f >= 0.0 && f < i64::MAX as f64 {
        Some(f.trunc() as i64)
    } else {
        None
    }
}

fn from_text(raw: &str) -> Option<i64> {
    let cleaned = strip_enclosing_quotes(raw.trim()).trim();
    if cleaned.is_empty() {
        return None;
    }
    parse_integer(cleaned).or_else(|| parse_date(cleaned))
}

/// Remove one layer of matching-position quotes, e.g. `"1620000000000"` or `“1620000000000”`.
pub(crate) fn strip_enclosing_quotes(s: &str) -> &str {
    let mut chars = s.chars();
    match (chars.next(), chars.next_back()) {
        (Some(first), Some(last))
            if ENCLOSING_QUOTES.contains(&first) && ENCLOSING_QUOTES.contains(&last) =>
        {
            chars.as_str()
        }
        _ => s,
    }
}

/// Digits with an optional fractional part, truncated; date strings such as `2021-05-03`
/// are left to `parse_date`.
fn parse_integer(s: &str) -> Option<i64> {
    let number = s.strip_prefix('+').unwrap_or(s);
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if whole.is_empty() || !all_digits(whole) || !all_digits(fraction) {
        return None;
    }
    whole.parse::<i64>().ok()
}

fn parse_date(s: &str) -> Option<i64> {
    let ms = if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        dt.timestamp_millis()
    } else if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        dt.timestamp_millis()
    } else if let Some(dt) = NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
    {
        dt.and_utc().timestamp_millis()
    } else {
        let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
        date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis()
    };
    (ms >= 0).then_some(ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recent(ts: i64) -> bool {
        (now_ms() - ts).abs() < 5_000
    }

    #[test]
    fn quoted_numeric_string_is_unwrapped() {
        let raw = json!("\"1620000000000\"");
        assert_eq!(normalize_timestamp(Some(&raw)), 1_620_000_000_000);
    }

    #[test]
    fn curly_quoted_numeric_string_is_unwrapped() {
        let raw = json!("\u{201C}1620000000000\u{201D}");
        assert_eq!(normalize_timestamp(Some(&raw)), 1_620_000_000_000);
    }

    #[test]
    fn numbers_pass_through() {
        assert_eq!(normalize_timestamp(Some(&json!(42))), 42);
        assert_eq!(normalize_timestamp(Some(&json!(0))), 0);
        assert_eq!(normalize_timestamp(Some(&json!(1620000000000.75))), 1_620_000_000_000);
    }

    #[test]
    fn fractional_numeric_string_is_truncated() {
        assert_eq!(
            normalize_timestamp(Some(&json!("1620000000000.5"))),
            1_620_000_000_000
        );
        assert_eq!(
            normalize_timestamp(Some(&json!("\"1620000000000.\""))),
            1_620_000_000_000
        );
        assert!(recent(normalize_timestamp(Some(&json!(".5")))));
        assert!(recent(normalize_timestamp(Some(&json!("1.2.3")))));
    }

    #[test]
    fn absent_or_empty_uses_now() {
        assert!(recent(normalize_timestamp(None)));
        assert!(recent(normalize_timestamp(Some(&json!(null)))));
        assert!(recent(normalize_timestamp(Some(&json!("")))));
        assert!(recent(normalize_timestamp(Some(&json!(false)))));
    }

    const MAY_3_2021_MS: i64 = 1_620_000_000_000;

    #[test]
    fn date_strings_are_parsed() {
        assert_eq!(
            normalize_timestamp(Some(&json!("2021-05-03T00:00:00Z"))),
            MAY_3_2021_MS
        );
        assert_eq!(normalize_timestamp(Some(&json!("2021-05-03"))), MAY_3_2021_MS);
        assert_eq!(
            normalize_timestamp(Some(&json!("Mon, 03 May 2021 00:00:00 +0000"))),
            MAY_3_2021_MS
        );
        assert_eq!(
            normalize_timestamp(Some(&json!("'2021-05-03 00:00:00'"))),
            MAY_3_2021_MS
        );
    }

    #[test]
    fn garbage_and_negative_values_fall_back_to_now() {
        assert!(recent(normalize_timestamp(Some(&json!("not a date")))));
        assert!(recent(normalize_timestamp(Some(&json!(-5)))));
        assert!(recent(normalize_timestamp(Some(&json!("-5")))));
        assert!(recent(normalize_timestamp(Some(&json!({ "a": 1 })))));
    }

    #[test]
    fn strip_enclosing_quotes_removes_one_layer() {
        assert_eq!(strip_enclosing_quotes("\"\"x\"\""), "\"x\"");
        assert_eq!(strip_enclosing_quotes("x"), "x");
        assert_eq!(strip_enclosing_quotes("\""), "\"");
    }
}
