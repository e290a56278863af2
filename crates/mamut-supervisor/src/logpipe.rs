//! Parsing and forwarding of child process log lines.
//!
//! Node binaries log in one of a few structured formats. Each line read from
//! a child's stdout or stderr is turned into a [`LogEntry`] by a
//! [`LineParser`] and then re-emitted through `tracing`, tagged with the
//! component and source stream, before being handed to discovery hooks.
//!
//! | Schema | Produced by | Message key | Level key | Fields |
//! |---|---|---|---|---|
//! | [`LogSchema::GoStructured`] | geth-style JSON loggers | `msg` | `lvl` / `level` | flat |
//! | [`LogSchema::RustStructured`] | `tracing-subscriber` JSON | `fields.message` | `level` | nested under `fields` |
//! | [`LogSchema::Plain`] | anything else | whole line | info | none |
//!
//! Lines that fail to parse as the configured structured schema fall back to
//! [`LogSchema::Plain`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, error, info, trace, warn};

/// Severity of a child log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    /// Trace.
    Trace,
    /// Debug.
    Debug,
    /// Info.
    #[default]
    Info,
    /// Warning.
    Warn,
    /// Error and above.
    Error,
}

impl LogLevel {
    /// Parses the level spellings used by common node loggers.
    ///
    /// Unknown spellings map to [`LogLevel::Info`].
    pub fn parse_lenient(text: &str) -> Self {
        match text.trim().to_ascii_lowercase().as_str() {
            "trace" | "trce" => Self::Trace,
            "debug" | "dbug" => Self::Debug,
            "warn" | "warning" => Self::Warn,
            "error" | "eror" | "crit" | "fatal" => Self::Error,
            _ => Self::Info,
        }
    }
}

/// One parsed log line.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LogEntry {
    /// The human-readable message.
    pub message: String,
    /// Severity.
    pub level: LogLevel,
    /// Remaining structured fields.
    pub fields: BTreeMap<String, Value>,
}

impl LogEntry {
    /// Creates an unstructured entry.
    pub fn plain(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Adds a structured field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Returns a field rendered as text.
    ///
    /// String values are returned without quotes; other values in their
    /// JSON form.
    pub fn field_str(&self, key: &str) -> Option<String> {
        self.fields.get(key).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    fn render_fields(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.fields {
            if !out.is_empty() {
                out.push(' ');
            }
            match value {
                Value::String(s) => out.push_str(&format!("{key}={s}")),
                other => out.push_str(&format!("{key}={other}")),
            }
        }
        out
    }
}

/// Turns a raw line into a [`LogEntry`].
pub trait LineParser: Send + Sync {
    /// Parses one line (without its trailing newline).
    fn parse(&self, line: &str) -> LogEntry;
}

impl<F> LineParser for F
where
    F: Fn(&str) -> LogEntry + Send + Sync,
{
    fn parse(&self, line: &str) -> LogEntry {
        self(line)
    }
}

/// Built-in log formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSchema {
    /// Flat JSON objects with `msg` and `lvl`.
    GoStructured,
    /// `tracing-subscriber` JSON with a nested `fields` object.
    RustStructured,
    /// Free text.
    #[default]
    Plain,
}

impl FromStr for LogSchema {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "go_structured" | "go" => Ok(Self::GoStructured),
            "rust_structured" | "rust" => Ok(Self::RustStructured),
            "plain" => Ok(Self::Plain),
            other => Err(format!("unknown log schema {other:?}")),
        }
    }
}

impl fmt::Display for LogSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::GoStructured => "go_structured",
            Self::RustStructured => "rust_structured",
            Self::Plain => "plain",
        })
    }
}

impl LineParser for LogSchema {
    fn parse(&self, line: &str) -> LogEntry {
        let parsed = match self {
            Self::GoStructured => parse_go_structured(line),
            Self::RustStructured => parse_rust_structured(line),
            Self::Plain => None,
        };
        parsed.unwrap_or_else(|| LogEntry::plain(line.trim_end()))
    }
}

fn parse_object(line: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(line.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn take_string(map: &mut Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match map.remove(*key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

fn parse_go_structured(line: &str) -> Option<LogEntry> {
    let mut map = parse_object(line)?;
    let message = take_string(&mut map, &["msg", "message"]).unwrap_or_default();
    let level = take_string(&mut map, &["lvl", "level"])
        .map(|l| LogLevel::parse_lenient(&l))
        .unwrap_or_default();
    map.remove("t");
    map.remove("time");
    Some(LogEntry {
        message,
        level,
        fields: map.into_iter().collect(),
    })
}

fn parse_rust_structured(line: &str) -> Option<LogEntry> {
    let mut map = parse_object(line)?;
    let level = take_string(&mut map, &["level"])
        .map(|l| LogLevel::parse_lenient(&l))
        .unwrap_or_default();
    let mut fields = match map.remove("fields") {
        Some(Value::Object(fields)) => fields,
        _ => Map::new(),
    };
    let message = take_string(&mut fields, &["message"])
        .or_else(|| take_string(&mut map, &["message", "msg"]))
        .unwrap_or_default();
    if let Some(target) = map.remove("target") {
        fields.entry("target").or_insert(target);
    }
    Some(LogEntry {
        message,
        level,
        fields: fields.into_iter().collect(),
    })
}

/// The child stream a line was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl Stream {
    /// Returns the stream name used in log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Re-emits a child log entry through `tracing` at the child's level.
pub fn forward(entry: &LogEntry, component: &str, src: Stream) {
    let fields = entry.render_fields();
    let src = src.as_str();
    let msg = entry.message.as_str();
    match entry.level {
        LogLevel::Trace => trace!(component, src, fields = %fields, "{msg}"),
        LogLevel::Debug => debug!(component, src, fields = %fields, "{msg}"),
        LogLevel::Info => info!(component, src, fields = %fields, "{msg}"),
        LogLevel::Warn => warn!(component, src, fields = %fields, "{msg}"),
        LogLevel::Error => error!(component, src, fields = %fields, "{msg}"),
    }
}
