//! Incremental interpretation of extraction-tool stdout.
//!
//! Quality fetches emit one JSON document, parsed once the stream ends.
//! Downloads emit progress lines in one of two shapes, tried per line:
//!
//! 1. JSON objects with `progress` / `speed` / `eta` fields
//!    (`{"progress": " 12.3%", "speed": "1.2MiB/s", "eta": "00:10"}`)
//! 2. free text carrying a percentage somewhere (`[download]  45.5% of ...`)
//!
//! Lines matching neither shape are banners or warnings and are dropped.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::core::error::SessionError;
use crate::models::job::JobKind;
use crate::models::quality::QualityList;
use crate::models::session::SessionUpdate;

static PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)%").expect("valid percent regex"));

static ANSI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("valid ansi regex"));

/// Upper bound for an unterminated line before it is parsed anyway.
const MAX_PENDING_LINE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserKind {
    Quality,
    Progress,
}

impl From<JobKind> for ParserKind {
    fn from(kind: JobKind) -> Self {
        match kind {
            JobKind::FetchQualities => ParserKind::Quality,
            JobKind::Download => ParserKind::Progress,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedEvent {
    Qualities(QualityList),
    Progress(SessionUpdate),
    Malformed(String),
}

pub enum OutputParser {
    Quality(QualityParser),
    Progress(ProgressParser),
}

impl OutputParser {
    pub fn new(kind: ParserKind) -> Self {
        match kind {
            ParserKind::Quality => OutputParser::Quality(QualityParser::default()),
            ParserKind::Progress => OutputParser::Progress(ProgressParser::default()),
        }
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ParsedEvent> {
        match self {
            OutputParser::Quality(p) => {
                p.feed(chunk);
                Vec::new()
            }
            OutputParser::Progress(p) => p.feed(chunk).into_iter().map(ParsedEvent::Progress).collect(),
        }
    }

    /// Flushes buffered output once stdout is closed.
    pub fn finish(self) -> Vec<ParsedEvent> {
        match self {
            OutputParser::Quality(p) => match p.finish() {
                Ok(list) => vec![ParsedEvent::Qualities(list)],
                Err(e) => vec![ParsedEvent::Malformed(e.to_string())],
            },
            OutputParser::Progress(mut p) => {
                p.finish().into_iter().map(ParsedEvent::Progress).collect()
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct QualityParser {
    buf: Vec<u8>,
}

impl QualityParser {
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    pub fn finish(self) -> Result<QualityList, SessionError> {
        parse_quality_output(&self.buf)
    }
}

pub fn parse_quality_output(bytes: &[u8]) -> Result<QualityList, SessionError> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    if text.is_empty() {
        return Err(SessionError::MalformedOutput("empty output".to_string()));
    }
    serde_json::from_str::<QualityList>(text).map_err(|e| SessionError::MalformedOutput(e.to_string()))
}

/// `{"error": "..."}` as printed by the quality tool on failure.
pub fn tool_error_message(bytes: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(bytes).ok()?;
    value
        .get("error")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Line-buffers progress output so ticks split across reads are not lost.
#[derive(Debug, Default)]
pub struct ProgressParser {
    pending: Vec<u8>,
}

impl ProgressParser {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SessionUpdate> {
        let mut ticks = Vec::new();
        for &b in chunk {
            if b == b'\n' || b == b'\r' {
                self.flush_line(&mut ticks);
            } else {
                self.pending.push(b);
                if self.pending.len() >= MAX_PENDING_LINE {
                    self.flush_line(&mut ticks);
                }
            }
        }
        ticks
    }

    pub fn finish(&mut self) -> Vec<SessionUpdate> {
        let mut ticks = Vec::new();
        self.flush_line(&mut ticks);
        ticks
    }

    fn flush_line(&mut self, ticks: &mut Vec<SessionUpdate>) {
        if self.pending.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        match parse_progress_line(&line) {
            Some(tick) => ticks.push(tick),
            None => tracing::trace!("ignoring tool output: {}", line.trim()),
        }
    }
}

pub fn parse_progress_line(line: &str) -> Option<SessionUpdate> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    parse_json_tier(line).or_else(|| parse_percent_tier(line))
}

/// Structured tier. Succeeds for JSON objects carrying at least one usable field.
pub fn parse_json_tier(line: &str) -> Option<SessionUpdate> {
    let value: Value = serde_json::from_str(line).ok()?;
    let obj = value.as_object()?;

    let progress = obj.get("progress").and_then(|v| match v {
        Value::String(s) => parse_percent_str(s),
        Value::Number(n) => n.as_f64().and_then(valid_percent),
        _ => None,
    });
    let speed = obj.get("speed").and_then(display_field);
    let eta = obj.get("eta").and_then(display_field);

    let update = SessionUpdate {
        progress,
        speed,
        eta,
    };
    if update.is_empty() {
        None
    } else {
        Some(update)
    }
}

/// Legacy tier: first `<digits>[.<digits>]%` anywhere in the text.
pub fn parse_percent_tier(line: &str) -> Option<SessionUpdate> {
    let clean = strip_ansi(line);
    let caps = PERCENT_RE.captures(&clean)?;
    let progress = caps.get(1)?.as_str().parse::<f64>().ok().and_then(valid_percent)?;
    Some(SessionUpdate {
        progress: Some(progress),
        ..Default::default()
    })
}

fn parse_percent_str(s: &str) -> Option<f64> {
    let clean = strip_ansi(s);
    clean
        .trim()
        .trim_end_matches('%')
        .trim()
        .parse::<f64>()
        .ok()
        .and_then(valid_percent)
}

fn valid_percent(v: f64) -> Option<f64> {
    if v.is_finite() && (0.0..=100.0).contains(&v) {
        Some(v)
    } else {
        None
    }
}

/// Speed/ETA strings; yt-dlp prints `?` or `Unknown` when it has no estimate.
fn display_field(v: &Value) -> Option<String> {
    let s = match v {
        Value::String(s) => strip_ansi(s).trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if s.is_empty() || s == "?" || s.eq_ignore_ascii_case("unknown") || s.eq_ignore_ascii_case("n/a") {
        None
    } else {
        Some(s)
    }
}

fn strip_ansi(s: &str) -> std::borrow::Cow<'_, str> {
    ANSI_RE.replace_all(s, "")
}
