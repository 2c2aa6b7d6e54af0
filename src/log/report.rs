use std::io::BufRead;

use anyhow::Result;
use chrono::NaiveDateTime;
use serde::Serialize;

use crate::log::record::{parse_log_line, TIMESTAMP_FORMAT};

/// Aggregate view of a violation log.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LogSummary {
    pub violations: u64,
    pub malformed_lines: u64,
    pub min_distance: Option<f64>,
    pub mean_distance: Option<f64>,
    pub first_timestamp: Option<String>,
    pub last_timestamp: Option<String>,
}

/// Read a violation log and summarize it. Blank lines are ignored; other
/// unparseable lines are counted as malformed and skipped.
pub fn summarize<R: BufRead>(reader: R) -> Result<LogSummary> {
    let mut summary = LogSummary::default();
    let mut total = 0.0;
    let mut first: Option<NaiveDateTime> = None;
    let mut last: Option<NaiveDateTime> = None;

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let Some(parsed) = parse_log_line(&line) else {
            summary.malformed_lines += 1;
            continue;
        };
        summary.violations += 1;
        total += parsed.distance;
        summary.min_distance = Some(
            summary
                .min_distance
                .map_or(parsed.distance, |m| m.min(parsed.distance)),
        );
        first = Some(first.map_or(parsed.timestamp, |f| f.min(parsed.timestamp)));
        last = Some(last.map_or(parsed.timestamp, |l| l.max(parsed.timestamp)));
    }

    if summary.violations > 0 {
        summary.mean_distance = Some(total / summary.violations as f64);
    }
    summary.first_timestamp = first.map(|t| t.format(TIMESTAMP_FORMAT).to_string());
    summary.last_timestamp = last.map(|t| t.format(TIMESTAMP_FORMAT).to_string());
    Ok(summary)
}
