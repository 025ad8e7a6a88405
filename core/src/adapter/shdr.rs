//! SHDR line tokenizing and multiline-frame accumulation.
//!
//! The wire grammar (timestamp prefix, `|`-separated tokens, `*`-prefixed
//! commands) is as described for the input protocol; the multiline
//! sentinel format `--multiline--<TAG>` is taken verbatim from that
//! description rather than the original agent's `__multiline__` substring
//! convention, since the two disagree and the newer format is explicit.

use chrono::{DateTime, Utc};

pub const MULTILINE_PREFIX: &str = "--multiline--";

/// `Some(tag)` if `token` is a multiline sentinel of the form
/// `--multiline--TAG`, with `TAG` non-empty.
pub fn multiline_tag(token: &str) -> Option<&str> {
    let tag = token.strip_prefix(MULTILINE_PREFIX)?;
    if tag.is_empty() {
        None
    } else {
        Some(tag)
    }
}

/// One decoded SHDR line, split into its optional leading timestamp and
/// the remaining `|`-separated tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct ShdrLine {
    pub timestamp: Option<DateTime<Utc>>,
    pub tokens: Vec<String>,
}

fn looks_like_timestamp(token: &str) -> bool {
    let bytes = token.as_bytes();
    bytes.len() >= 5 && bytes[..4].iter().all(u8::is_ascii_digit) && bytes[4] == b'-'
}

/// Split a raw SHDR line (without its trailing `\n`) into a timestamp (if
/// present) and the remaining tokens.
pub fn parse_line(raw: &str) -> ShdrLine {
    let mut parts = raw.split('|');
    let first = parts.next().unwrap_or("");

    if looks_like_timestamp(first) {
        if let Ok(ts) = DateTime::parse_from_rfc3339(first) {
            return ShdrLine {
                timestamp: Some(ts.with_timezone(&Utc)),
                tokens: parts.map(|s| s.to_string()).collect(),
            };
        }
    }

    let mut tokens = Vec::with_capacity(1);
    tokens.push(first.to_string());
    tokens.extend(parts.map(|s| s.to_string()));
    ShdrLine { timestamp: None, tokens }
}

/// A `* key: value` adapter command, or an asset-creation preamble.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    DeviceModel(String),
    Calibration(String),
    AdapterVersion(String),
    MtconnectVersion(String),
    Ping,
    Pong(u64),
    Unknown(String),
}

/// Parse the tokens of a line whose first token begins with `*`.
pub fn parse_command(first_token: &str, rest: &[String]) -> Command {
    let body = first_token.trim_start_matches('*').trim();
    let (key, inline_value) = match body.split_once(':') {
        Some((k, v)) => (k.trim(), Some(v.trim().to_string())),
        None => (body, None),
    };
    let joined_rest = || rest.join("|");
    match key {
        "PING" => Command::Ping,
        "PONG" => Command::Pong(
            inline_value
                .or_else(|| rest.first().cloned())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(0),
        ),
        "deviceModel" => Command::DeviceModel(inline_value.unwrap_or_else(joined_rest)),
        "calibration" => Command::Calibration(inline_value.unwrap_or_else(joined_rest)),
        "adapterVersion" => Command::AdapterVersion(inline_value.unwrap_or_else(joined_rest)),
        "mtconnectVersion" => Command::MtconnectVersion(inline_value.unwrap_or_else(joined_rest)),
        other => Command::Unknown(other.to_string()),
    }
}

/// Accumulates the lines of a multiline frame between its opening and
/// closing `--multiline--TAG` sentinels.
#[derive(Debug, Clone)]
pub struct MultilineAccumulator {
    tag: String,
    lines: Vec<String>,
}

impl MultilineAccumulator {
    pub fn new(tag: impl Into<String>) -> Self {
        MultilineAccumulator { tag: tag.into(), lines: Vec::new() }
    }

    /// Feed one raw line. Returns `Some(body)` if this line was the
    /// closing sentinel, consuming the accumulator; otherwise `None` and
    /// the line is appended to the body.
    pub fn feed(&mut self, raw_line: &str) -> Option<String> {
        if multiline_tag(raw_line) == Some(self.tag.as_str()) {
            Some(self.lines.join("\n"))
        } else {
            self.lines.push(raw_line.to_string());
            None
        }
    }
}

/// Encode a multiline body under `tag`, as an adapter implementation
/// would frame it on the wire. Used by tests to round-trip against the
/// parser above.
pub fn encode_multiline(tag: &str, body: &str) -> String {
    let sentinel = format!("{MULTILINE_PREFIX}{tag}");
    let mut out = String::new();
    out.push_str(&sentinel);
    out.push('\n');
    out.push_str(body);
    out.push('\n');
    out.push_str(&sentinel);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_leading_timestamp() {
        let line = parse_line("2021-01-07T18:34:15.000Z|x|RUNNING");
        assert!(line.timestamp.is_some());
        assert_eq!(line.tokens, vec!["x".to_string(), "RUNNING".to_string()]);
    }

    #[test]
    fn treats_non_timestamp_first_token_as_data() {
        let line = parse_line("x|RUNNING");
        assert!(line.timestamp.is_none());
        assert_eq!(line.tokens, vec!["x".to_string(), "RUNNING".to_string()]);
    }

    #[test]
    fn detects_multiline_sentinel() {
        assert_eq!(multiline_tag("--multiline--ASSET1"), Some("ASSET1"));
        assert_eq!(multiline_tag("--multiline--"), None);
        assert_eq!(multiline_tag("plain"), None);
    }

    #[test]
    fn multiline_round_trip_preserves_embedded_newlines() {
        let body = "<Body line 1>\n<Body line 2>";
        let encoded = encode_multiline("ASSET", body);
        let mut lines = encoded.lines();
        let opener = lines.next().unwrap();
        let tag = multiline_tag(opener).unwrap();
        let mut acc = MultilineAccumulator::new(tag);
        let mut result = None;
        for line in lines {
            if let Some(b) = acc.feed(line) {
                result = Some(b);
                break;
            }
        }
        assert_eq!(result.as_deref(), Some(body));
    }

    #[test]
    fn parses_command_line() {
        let cmd = parse_command("*adapterVersion: 1.5", &[]);
        assert_eq!(cmd, Command::AdapterVersion("1.5".to_string()));
    }
}
