//! Tolerant parsing of webhook response bodies.
//!
//! Webhook authors (often no-code automation tools) emit multi-line text inside JSON
//! strings without escaping it, use typographic quotes, or single-quote their
//! strings. Each strategy below targets one of those failure classes. They run in
//! order from least to most destructive and the first successful decode wins, so
//! well-formed bodies always take the direct path.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};

use super::protocol::WebhookResponse;

/// Agent text used when no strategy can read the body.
pub const UNREADABLE_RESPONSE_TEXT: &str =
    "I received your message, but had trouble processing the response.";

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("response body is empty")]
    Empty,
    #[error("{strategy} parse failed: {source}")]
    Json {
        strategy: ParseStrategy,
        #[source]
        source: serde_json::Error,
    },
}

/// The recovery strategies, in the order they are attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    /// Decode as-is.
    Direct,
    /// Escape raw control characters and stray quotes/backslashes inside `"text"` values only.
    TextFieldRepair,
    /// Straighten curly double quotes and blank out control characters everywhere.
    Sanitize,
    /// Collapse line breaks to spaces and double-escape literal `\n` / `\r`.
    CollapseNewlines,
    /// Collapse all whitespace and convert single-quoted literals to double-quoted.
    Aggressive,
}

impl ParseStrategy {
    pub const ALL: [ParseStrategy; 5] = [
        ParseStrategy::Direct,
        ParseStrategy::TextFieldRepair,
        ParseStrategy::Sanitize,
        ParseStrategy::CollapseNewlines,
        ParseStrategy::Aggressive,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ParseStrategy::Direct => "direct",
            ParseStrategy::TextFieldRepair => "text-field-repair",
            ParseStrategy::Sanitize => "sanitize",
            ParseStrategy::CollapseNewlines => "collapse-newlines",
            ParseStrategy::Aggressive => "aggressive",
        }
    }

    /// Run this strategy alone against `raw`.
    pub fn apply(self, raw: &str) -> Result<WebhookResponse, ParseError> {
        match self {
            ParseStrategy::Direct => decode(self, raw),
            ParseStrategy::TextFieldRepair => decode(self, &repair_text_fields(raw)),
            ParseStrategy::Sanitize => decode(self, &sanitize(raw)),
            ParseStrategy::CollapseNewlines => decode(self, &collapse_newlines(raw)),
            ParseStrategy::Aggressive => decode(self, &aggressive(raw)),
        }
    }
}

impl fmt::Display for ParseStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse a webhook body. Never fails: when every strategy is exhausted the result is
/// a successful response carrying one agent message with [`UNREADABLE_RESPONSE_TEXT`].
pub fn parse_webhook_response(raw: &str) -> WebhookResponse {
    parse_with_strategy(raw).0
}

/// Like [`parse_webhook_response`], also reporting which strategy decoded the body
/// (`None` when the synthetic fallback was returned).
pub fn parse_with_strategy(raw: &str) -> (WebhookResponse, Option<ParseStrategy>) {
    for strategy in ParseStrategy::ALL {
        match strategy.apply(raw) {
            Ok(response) => {
                log::debug!("webhook response parsed with strategy {}", strategy);
                return (response, Some(strategy));
            }
            Err(e) => log::debug!("{}", e),
        }
    }
    log::warn!(
        "all parsing strategies failed for webhook response ({} bytes)",
        raw.len()
    );
    (unreadable_response(), None)
}

fn unreadable_response() -> WebhookResponse {
    WebhookResponse::success(vec![json!({
        "sender": "agent",
        "text": UNREADABLE_RESPONSE_TEXT,
    })])
}

fn decode(strategy: ParseStrategy, text: &str) -> Result<WebhookResponse, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    serde_json::from_str::<Value>(text)
        .map(WebhookResponse::from_value)
        .map_err(|source| ParseError::Json { strategy, source })
}

fn text_field_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r#""text"\s*:\s*""#).expect("text field regex should compile"))
}

fn control_run_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"[\x00-\x19]+").expect("control run regex should compile"))
}

fn line_break_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"[\n\r]+").expect("line break regex should compile"))
}

fn whitespace_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex should compile"))
}

fn single_quoted_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#"([^\\])?'([^']*)'([^\\])?"#).expect("single quote regex should compile")
    })
}

/// Rewrite the value of every `"text": "..."` field so that it is a valid JSON string.
/// Content outside those values is copied through untouched.
fn repair_text_fields(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 32);
    let mut cursor = 0;
    while let Some(m) = text_field_regex().find_at(raw, cursor) {
        out.push_str(&raw[cursor..m.end()]);
        let consumed = escape_string_value(&raw[m.end()..], &mut out);
        cursor = m.end() + consumed;
    }
    out.push_str(&raw[cursor..]);
    out
}

/// Copy one string value (starting just after its opening quote) into `out`, escaping
/// raw control characters, invalid backslash escapes, and interior quotes. The value
/// ends at the first unescaped quote followed by `,`, `}`, `]` or end of input.
/// Returns the number of bytes consumed, including the closing quote.
fn escape_string_value(rest: &str, out: &mut String) -> usize {
    let mut chars = rest.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.peek().copied() {
                Some((j, next)) if is_valid_escape(next, &rest[j + next.len_utf8()..]) => {
                    out.push('\\');
                    out.push(next);
                    chars.next();
                }
                _ => out.push_str("\\\\"),
            },
            '"' => {
                if closes_value(&rest[i + 1..]) {
                    out.push('"');
                    return i + 1;
                }
                out.push_str("\\\"");
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    rest.len()
}

fn is_valid_escape(next: char, after: &str) -> bool {
    match next {
        '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' => true,
        'u' => after.len() >= 4 && after.as_bytes()[..4].iter().all(u8::is_ascii_hexdigit),
        _ => false,
    }
}

fn closes_value(after: &str) -> bool {
    matches!(after.trim_start().chars().next(), None | Some(',' | '}' | ']'))
}

fn sanitize(raw: &str) -> String {
    let straightened = raw.replace(['\u{201C}', '\u{201D}'], "\"");
    control_run_regex()
        .replace_all(&straightened, " ")
        .into_owned()
}

fn collapse_newlines(raw: &str) -> String {
    line_break_regex()
        .replace_all(raw, " ")
        .replace("\\n", "\\\\n")
        .replace("\\r", "\\\\r")
}

fn aggressive(raw: &str) -> String {
    let collapsed = whitespace_regex().replace_all(raw, " ");
    single_quoted_regex()
        .replace_all(&collapsed, "${1}\"${2}\"${3}")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::ResponseStatus;

    #[test]
    fn well_formed_json_takes_direct_path() {
        let raw = r#"{"status":"success","messages":[{"id":"1","text":"hi","sender":"agent"}]}"#;
        let (response, strategy) = parse_with_strategy(raw);
        assert_eq!(strategy, Some(ParseStrategy::Direct));
        let direct: Value = serde_json::from_str(raw).unwrap();
        assert_eq!(response, WebhookResponse::from_value(direct));
    }

    #[test]
    fn literal_newline_in_text_recovered_by_field_repair() {
        let raw = "{\"status\":\"success\",\"messages\":[{\"text\":\"line1\nline2\",\"sender\":\"agent\"}]}";
        let (response, strategy) = parse_with_strategy(raw);
        assert_eq!(strategy, Some(ParseStrategy::TextFieldRepair));
        assert_eq!(response.messages.len(), 1);
        assert_eq!(response.messages[0]["text"], "line1\nline2");
        assert_eq!(response.messages[0]["sender"], "agent");
    }

    #[test]
    fn field_repair_escapes_tabs_quotes_and_stray_backslashes() {
        let raw = "{\"messages\":[{\"text\":\"a\tb \"quoted\" C:\\path\",\"sender\":\"agent\"}]}";
        let (response, strategy) = parse_with_strategy(raw);
        assert_eq!(strategy, Some(ParseStrategy::TextFieldRepair));
        assert_eq!(response.messages[0]["text"], "a\tb \"quoted\" C:\\path");
    }

    #[test]
    fn field_repair_keeps_valid_escapes() {
        let mut out = String::new();
        let consumed = escape_string_value("x\\n\\u00e9\\\"y\", \"next\"", &mut out);
        assert_eq!(out, "x\\n\\u00e9\\\"y\"");
        assert_eq!(consumed, out.len());
    }

    #[test]
    fn curly_quoted_json_recovered_by_sanitize() {
        let raw = "{\u{201C}status\u{201D}: \u{201C}success\u{201D}, \u{201C}messages\u{201D}: [{\u{201C}text\u{201D}: \u{201C}hey\u{201D}}]}";
        let (response, strategy) = parse_with_strategy(raw);
        assert_eq!(strategy, Some(ParseStrategy::Sanitize));
        assert_eq!(response.messages[0]["text"], "hey");
    }

    #[test]
    fn single_quoted_json_recovered_by_aggressive() {
        let raw = "{'status': 'success', 'messages': [{'text': 'hello there'}]}";
        let (response, strategy) = parse_with_strategy(raw);
        assert_eq!(strategy, Some(ParseStrategy::Aggressive));
        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.messages[0]["text"], "hello there");
    }

    #[test]
    fn collapse_newlines_doubles_literal_escapes() {
        assert_eq!(collapse_newlines("a\r\n\nb\\nc"), "a b\\\\nc");
    }

    #[test]
    fn sanitize_blanks_control_runs() {
        assert_eq!(sanitize("a\u{1}\u{2}b\u{201C}"), "a b\"");
    }

    #[test]
    fn garbage_falls_back_to_synthetic_message() {
        for raw in ["", "   ", "<html>502 Bad Gateway</html>", "{\"messages\": [", "}{"] {
            let (response, strategy) = parse_with_strategy(raw);
            assert_eq!(strategy, None, "input {raw:?}");
            assert_eq!(response.status, ResponseStatus::Success);
            assert_eq!(response.messages.len(), 1);
            assert_eq!(response.messages[0]["text"], UNREADABLE_RESPONSE_TEXT);
        }
    }

    #[test]
    fn parsing_is_repeatable() {
        for raw in [
            "{\"messages\":[{\"text\":\"a\nb\"}]}",
            "not json at all",
            "[\"x\", \"y\"]",
        ] {
            assert_eq!(parse_webhook_response(raw), parse_webhook_response(raw));
        }
    }

    #[test]
    fn each_strategy_runs_independently() {
        let raw = "{\"text\":\"x\ny\"}";
        assert!(ParseStrategy::Direct.apply(raw).is_err());
        assert!(ParseStrategy::TextFieldRepair.apply(raw).is_ok());
        assert!(matches!(ParseStrategy::Direct.apply(""), Err(ParseError::Empty)));
    }
}
