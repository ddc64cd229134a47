use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use logpane_types::{Fields, RecordBody, Severity, field};

/// A parsed input line: the record plus the topic it was tagged with, if any
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedLine {
    pub topic: Option<String>,
    pub body: RecordBody,
}

/// Keys consumed by the structured parser; anything else is kept as an
/// auxiliary field
const MESSAGE_KEYS: &[&str] = &["msg", "message", "log", "text", "body"];
const LEVEL_KEYS: &[&str] = &["level", "severity", "lvl", "loglevel", "log_level"];
const NODE_KEYS: &[&str] = &["name", "node", "logger"];
const TIME_KEYS: &[&str] = &["timestamp", "time", "ts", "stamp", "@timestamp"];
const TOPIC_KEY: &str = "topic";
const TOPICS_KEY: &str = "topics";

/// Log parser for extracting structure from raw input lines
pub struct RecordParser;

impl RecordParser {
    /// Parse a raw line into a record body
    pub fn parse(raw: &str) -> ParsedLine {
        let (timestamp, content) = Self::extract_timestamp(raw);

        if let Some(mut parsed) = Self::try_parse_json(content) {
            if parsed.body.timestamp.is_none() {
                parsed.body.timestamp = timestamp;
            }
            return parsed;
        }

        let mut body = RecordBody::message(Self::extract_level_from_text(content), content);
        body.timestamp = timestamp;
        ParsedLine { topic: None, body }
    }

    /// Extract an RFC 3339 timestamp from the beginning of a line
    fn extract_timestamp(raw: &str) -> (Option<DateTime<Utc>>, &str) {
        // 2024-01-15T10:30:00Z (20 chars) up to nanosecond precision
        if raw.len() >= 20 {
            let search_end = Self::floor_char_boundary(raw, 35.min(raw.len()));
            if let Some(z_pos) = raw.get(..search_end).and_then(|s| s.find('Z')) {
                let ts_str = &raw[..=z_pos];
                if let Ok(ts) = DateTime::parse_from_rfc3339(ts_str) {
                    let remaining = raw[z_pos + 1..].trim_start();
                    return (Some(ts.with_timezone(&Utc)), remaining);
                }
            }
        }
        (None, raw)
    }

    /// Find the largest valid char boundary <= the given byte index
    fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
        if idx >= s.len() {
            return s.len();
        }
        while idx > 0 && !s.is_char_boundary(idx) {
            idx -= 1;
        }
        idx
    }

    fn try_parse_json(content: &str) -> Option<ParsedLine> {
        let trimmed = content.trim();
        if !trimmed.starts_with('{') {
            return None;
        }

        let value: Value = serde_json::from_str(trimmed).ok()?;
        let obj = value.as_object()?;

        let mut fields = Fields::new();
        if let Some(message) = Self::first_text(obj, MESSAGE_KEYS) {
            fields.push(field::MESSAGE, message);
        }
        if let Some(node) = Self::first_text(obj, NODE_KEYS) {
            fields.push(field::NODE, node);
        }
        if let Some(file) = obj.get(field::FILE).and_then(Self::as_text) {
            fields.push(field::FILE, file);
        }
        if let Some(line) = obj.get(field::LINE).and_then(Self::as_text) {
            fields.push(field::LINE, line);
        }
        if let Some(function) = obj.get(field::FUNCTION).and_then(Self::as_text) {
            fields.push(field::FUNCTION, function);
        }
        if let Some(Value::Array(topics)) = obj.get(TOPICS_KEY) {
            for topic in topics.iter().filter_map(Self::as_text) {
                fields.push(field::TOPIC, topic);
            }
        }

        // Remaining scalar keys become auxiliary fields, in key order
        for (key, value) in obj {
            if Self::is_known_key(key) {
                continue;
            }
            if let Some(text) = Self::as_text(value) {
                fields.push(key.clone(), text);
            }
        }

        let severity = Self::extract_level_from_json(obj);
        let timestamp = TIME_KEYS
            .iter()
            .find_map(|k| obj.get(*k))
            .and_then(Self::as_timestamp);
        let topic = obj.get(TOPIC_KEY).and_then(Value::as_str).map(str::to_string);

        Some(ParsedLine {
            topic,
            body: RecordBody {
                timestamp,
                severity,
                fields,
            },
        })
    }

    fn is_known_key(key: &str) -> bool {
        MESSAGE_KEYS.contains(&key)
            || LEVEL_KEYS.contains(&key)
            || NODE_KEYS.contains(&key)
            || TIME_KEYS.contains(&key)
            || [
                field::FILE,
                field::LINE,
                field::FUNCTION,
                TOPIC_KEY,
                TOPICS_KEY,
            ]
            .contains(&key)
    }

    fn first_text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| obj.get(*k)).and_then(Self::as_text)
    }

    /// Scalar JSON values rendered as text; objects, arrays and null are skipped
    fn as_text(value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn as_timestamp(value: &Value) -> Option<DateTime<Utc>> {
        match value {
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|ts| ts.with_timezone(&Utc)),
            // Seconds since the epoch, possibly fractional
            Value::Number(n) => {
                let secs = n.as_f64()?;
                let nanos = ((secs.fract()) * 1e9) as u32;
                DateTime::from_timestamp(secs.trunc() as i64, nanos)
            }
            _ => None,
        }
    }

    fn extract_level_from_json(obj: &Map<String, Value>) -> Severity {
        for key in LEVEL_KEYS {
            match obj.get(*key) {
                Some(Value::String(s)) => return Severity::from_name(s),
                Some(Value::Number(n)) => {
                    if let Some(code) = n.as_u64() {
                        return Severity::from_code(code);
                    }
                }
                _ => {}
            }
        }
        Severity::Unknown
    }

    /// Extract severity from plain text patterns
    fn extract_level_from_text(content: &str) -> Severity {
        let upper = content.to_uppercase();

        let bracket_patterns = [
            ("[FATAL]", Severity::Fatal),
            ("[PANIC]", Severity::Fatal),
            ("[CRITICAL]", Severity::Fatal),
            ("[ERROR]", Severity::Error),
            ("[ERR]", Severity::Error),
            ("[WARN]", Severity::Warn),
            ("[WARNING]", Severity::Warn),
            ("[INFO]", Severity::Info),
            ("[DEBUG]", Severity::Debug),
            ("[TRACE]", Severity::Debug),
        ];
        if let Some(level) = Self::first_contained(&upper, &bracket_patterns) {
            return level;
        }

        let colon_patterns = [
            ("FATAL:", Severity::Fatal),
            ("ERROR:", Severity::Error),
            ("WARNING:", Severity::Warn),
            ("WARN:", Severity::Warn),
            ("INFO:", Severity::Info),
            ("DEBUG:", Severity::Debug),
        ];
        if let Some(level) = Self::first_contained(&upper, &colon_patterns) {
            return level;
        }

        let start_patterns = [
            ("FATAL", Severity::Fatal),
            ("ERROR", Severity::Error),
            ("WARN", Severity::Warn),
            ("INFO", Severity::Info),
            ("DEBUG", Severity::Debug),
        ];
        let trimmed_upper = upper.trim_start();
        start_patterns
            .iter()
            .find(|(pattern, _)| trimmed_upper.starts_with(pattern))
            .map(|(_, level)| *level)
            .unwrap_or(Severity::Unknown)
    }

    fn first_contained(upper: &str, patterns: &[(&str, Severity)]) -> Option<Severity> {
        patterns
            .iter()
            .find(|(pattern, _)| upper.contains(pattern))
            .map(|(_, level)| *level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_prefix() {
        let parsed = RecordParser::parse("2024-01-15T10:30:00.123456789Z some log message");
        assert!(parsed.body.timestamp.is_some());
        assert_eq!(parsed.body.fields.get(field::MESSAGE), Some("some log message"));
    }

    #[test]
    fn test_parse_structured_line() {
        let line = r#"{"level":8,"msg":"motor stalled","name":"/base","file":"base.cpp","line":12,"function":"spin","topics":["/odom","/cmd_vel"],"topic":"/log","joint":"left"}"#;
        let parsed = RecordParser::parse(line);
        assert_eq!(parsed.topic.as_deref(), Some("/log"));
        assert_eq!(parsed.body.severity, Severity::Error);

        let fields = &parsed.body.fields;
        assert_eq!(fields.get(field::MESSAGE), Some("motor stalled"));
        assert_eq!(fields.get(field::NODE), Some("/base"));
        assert_eq!(fields.get(field::LINE), Some("12"));
        assert_eq!(fields.get_all(field::TOPIC).count(), 2);
        assert_eq!(fields.get("joint"), Some("left"));
    }

    #[test]
    fn test_parse_json_level_name_and_time() {
        let line = r#"{"level":"warn","msg":"slow","time":"2024-01-15T10:30:00Z"}"#;
        let parsed = RecordParser::parse(line);
        assert_eq!(parsed.body.severity, Severity::Warn);
        assert!(parsed.body.timestamp.is_some());
        assert_eq!(parsed.topic, None);
    }

    #[test]
    fn test_parse_text_level() {
        let parsed = RecordParser::parse("[ERROR] something went wrong");
        assert_eq!(parsed.body.severity, Severity::Error);

        let parsed = RecordParser::parse("nothing to see");
        assert_eq!(parsed.body.severity, Severity::Unknown);
    }

    #[test]
    fn test_parse_multibyte_utf8_no_panic() {
        let parsed = RecordParser::parse("─────────────────────────────────────────");
        assert!(parsed.body.timestamp.is_none());

        let parsed = RecordParser::parse("2024-01-15T10:30:00Z ╭────────────────────────────╮");
        assert!(parsed.body.timestamp.is_some());
    }
}
