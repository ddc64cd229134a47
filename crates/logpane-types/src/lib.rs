//! Shared types for logpane
//!
//! This crate contains the record types passed between the transport, the
//! store and whatever displays the filtered view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::Arc;

// ============================================================================
// Severity
// ============================================================================

/// Log severity level
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
    Unknown,
}

impl Severity {
    /// Every severity, in ascending order (unknown last)
    pub const ALL: [Severity; 6] = [
        Self::Debug,
        Self::Info,
        Self::Warn,
        Self::Error,
        Self::Fatal,
        Self::Unknown,
    ];

    /// Parse severity from common level names
    pub fn from_name(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "trace" | "trc" | "debug" | "dbg" | "debg" => Self::Debug,
            "info" | "inf" | "information" => Self::Info,
            "warn" | "warning" | "wrn" => Self::Warn,
            "error" | "err" | "erro" => Self::Error,
            "fatal" | "panic" | "critical" | "crit" | "ftl" => Self::Fatal,
            _ => Self::Unknown,
        }
    }

    /// Parse the bit-coded numeric levels used by log-publishing middleware
    /// (1 = debug, 2 = info, 4 = warn, 8 = error, 16 = fatal)
    pub fn from_code(code: u64) -> Self {
        match code {
            1 => Self::Debug,
            2 => Self::Info,
            4 => Self::Warn,
            8 => Self::Error,
            16 => Self::Fatal,
            _ => Self::Unknown,
        }
    }

    /// Short display string (3 chars)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DBG",
            Self::Info => "INF",
            Self::Warn => "WRN",
            Self::Error => "ERR",
            Self::Fatal => "FTL",
            Self::Unknown => "???",
        }
    }
}

// ============================================================================
// Fields
// ============================================================================

/// A named text value of a record
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Field {
    pub name: Cow<'static, str>,
    pub value: String,
}

impl Field {
    pub fn new(name: impl Into<Cow<'static, str>>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered list of named text values. Names may repeat for list-valued data
/// such as topics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Fields(Vec<Field>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field
    pub fn push(&mut self, name: impl Into<Cow<'static, str>>, value: impl Into<String>) {
        self.0.push(Field::new(name, value));
    }

    /// Builder form of [`Fields::push`]
    pub fn with(mut self, name: impl Into<Cow<'static, str>>, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    /// First value stored under `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    /// All values stored under `name`, in order
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |f| f.name == name)
            .map(|f| f.value.as_str())
    }

    /// Every value, in order. This is what filters match against.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|f| f.value.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Field> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Field> for Fields {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Fields {
    type Item = &'a Field;
    type IntoIter = std::slice::Iter<'a, Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ============================================================================
// Records
// ============================================================================

/// Well-known field names
pub mod field {
    pub const MESSAGE: &str = "message";
    pub const NODE: &str = "node";
    pub const FILE: &str = "file";
    pub const FUNCTION: &str = "function";
    pub const LINE: &str = "line";
    pub const TOPIC: &str = "topic";
}

/// A record as delivered by a transport, before the store assigns it an id
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RecordBody {
    pub timestamp: Option<DateTime<Utc>>,
    pub severity: Severity,
    pub fields: Fields,
}

impl RecordBody {
    pub fn new(severity: Severity, fields: Fields) -> Self {
        Self {
            timestamp: None,
            severity,
            fields,
        }
    }

    /// Shorthand for a record with only a message field
    pub fn message(severity: Severity, message: impl Into<String>) -> Self {
        Self::new(severity, Fields::new().with(field::MESSAGE, message))
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// A stored record. Immutable once the store has assigned its id.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Record {
    /// Unique id, increasing in arrival order
    pub id: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub severity: Severity,
    pub fields: Fields,
}

/// Records are shared with readers behind an `Arc` to keep clones cheap
pub type ArcRecord = Arc<Record>;

impl Record {
    pub fn from_body(id: u64, body: RecordBody) -> Self {
        Self {
            id,
            timestamp: body.timestamp,
            severity: body.severity,
            fields: body.fields,
        }
    }

    /// The message field, or an empty string
    pub fn message(&self) -> &str {
        self.fields.get(field::MESSAGE).unwrap_or("")
    }

    /// The originating node name, if any
    pub fn node(&self) -> Option<&str> {
        self.fields.get(field::NODE)
    }

    /// `file:line` when both are present
    pub fn location(&self) -> Option<String> {
        match (self.fields.get(field::FILE), self.fields.get(field::LINE)) {
            (Some(file), Some(line)) => Some(format!("{}:{}", file, line)),
            (Some(file), None) => Some(file.to_string()),
            _ => None,
        }
    }
}

/// A log message as published by a node: message text plus the source
/// location and the topics the node publishes on
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeLog {
    pub timestamp: Option<DateTime<Utc>>,
    pub severity: Severity,
    pub node: String,
    pub message: String,
    pub file: String,
    pub function: String,
    pub line: u32,
    pub topics: Vec<String>,
}

impl From<NodeLog> for RecordBody {
    fn from(log: NodeLog) -> Self {
        let mut fields = Fields::new()
            .with(field::MESSAGE, log.message)
            .with(field::NODE, log.node);
        if !log.file.is_empty() {
            fields.push(field::FILE, log.file);
            fields.push(field::LINE, log.line.to_string());
        }
        if !log.function.is_empty() {
            fields.push(field::FUNCTION, log.function);
        }
        for topic in log.topics {
            fields.push(field::TOPIC, topic);
        }

        Self {
            timestamp: log.timestamp,
            severity: log.severity,
            fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_parsing() {
        assert_eq!(Severity::from_name("WARNING"), Severity::Warn);
        assert_eq!(Severity::from_name(" err "), Severity::Error);
        assert_eq!(Severity::from_name("verbose"), Severity::Unknown);
        assert_eq!(Severity::from_code(8), Severity::Error);
        assert_eq!(Severity::from_code(3), Severity::Unknown);
    }

    #[test]
    fn test_node_log_fields() {
        let body: RecordBody = NodeLog {
            severity: Severity::Warn,
            node: "/planner".to_string(),
            message: "path blocked".to_string(),
            file: "planner.cpp".to_string(),
            function: "plan".to_string(),
            line: 42,
            topics: vec!["/cmd_vel".to_string(), "/path".to_string()],
            ..Default::default()
        }
        .into();

        let record = Record::from_body(7, body);
        assert_eq!(record.message(), "path blocked");
        assert_eq!(record.node(), Some("/planner"));
        assert_eq!(record.location().as_deref(), Some("planner.cpp:42"));
        assert_eq!(
            record.fields.get_all(field::TOPIC).collect::<Vec<_>>(),
            vec!["/cmd_vel", "/path"]
        );
        assert_eq!(record.fields.values().count(), 7);
    }
}
