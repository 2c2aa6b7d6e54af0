use std::sync::OnceLock;

use chrono::{DateTime, Local, NaiveDateTime};
use regex::Regex;

use crate::WorldPoint;

/// `strftime` layout of the log timestamp (local time, second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One threshold violation between two people in one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ViolationRecord {
    pub timestamp: DateTime<Local>,
    pub distance: f64,
    /// Ground positions of the pair, kept for in-process consumers; not persisted.
    pub pair: Option<(WorldPoint, WorldPoint)>,
}

impl ViolationRecord {
    pub fn new(distance: f64, timestamp: DateTime<Local>) -> Self {
        Self {
            timestamp,
            distance,
            pair: None,
        }
    }

    pub fn with_pair(mut self, a: WorldPoint, b: WorldPoint) -> Self {
        self.pair = Some((a, b));
        self
    }

    /// The persisted line, without the trailing newline.
    pub fn log_line(&self) -> String {
        format!(
            "{} - Distance violation: {:.2} meters",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.distance
        )
    }
}

/// A violation line read back from the log.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParsedViolation {
    pub timestamp: NaiveDateTime,
    pub distance: f64,
}

fn line_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(concat!(
                r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})",
                r" - Distance violation: (\d+\.\d{2}) meters$",
            ))
            .ok()
        })
        .as_ref()
}

/// Parse one log line. Returns `None` for anything that is not a violation line.
pub fn parse_log_line(line: &str) -> Option<ParsedViolation> {
    let caps = line_pattern()?.captures(line.trim_end_matches(['\r', '\n']))?;
    let timestamp = NaiveDateTime::parse_from_str(&caps[1], TIMESTAMP_FORMAT).ok()?;
    let distance = caps[2].parse().ok()?;
    Some(ParsedViolation {
        timestamp,
        distance,
    })
}
