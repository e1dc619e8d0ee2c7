use std::sync::LazyLock;

use chrono::{NaiveDateTime, Timelike};
use regex::Regex;

use hubble_types::ParsedLogRecord;

/// `<timestamp> <LEVEL> <message>` as printed by the node
static LINE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<datetime>[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}\.[0-9]+Z)\s+(?P<level>\w+)\s+(?P<message>.+)$",
    )
    .expect("line pattern is valid")
});

/// Log parser splitting raw node output into timestamp, level and message
pub struct LogParser;

impl LogParser {
    /// Parse a raw log line, returning `None` if it does not have the node's shape
    pub fn parse(raw: &str) -> Option<ParsedLogRecord> {
        let caps = LINE_PATTERN.captures(raw.trim())?;
        let timestamp = Self::normalize_timestamp(&caps["datetime"])?;

        Some(ParsedLogRecord {
            timestamp,
            level: caps["level"].to_string(),
            message: caps["message"].to_string(),
        })
    }

    /// Truncate the fractional seconds to 6 digits, parse, and drop sub-second precision
    ///
    /// Input looks like `2024-01-15T10:30:00.123456789Z`.
    pub fn normalize_timestamp(raw: &str) -> Option<NaiveDateTime> {
        let body = raw.strip_suffix('Z')?;
        let (whole, fraction) = body.split_once('.')?;
        let fraction = fraction.get(..6).unwrap_or(fraction);

        NaiveDateTime::parse_from_str(&format!("{whole}.{fraction}"), "%Y-%m-%dT%H:%M:%S%.f")
            .ok()?
            .with_nanosecond(0)
    }
}
