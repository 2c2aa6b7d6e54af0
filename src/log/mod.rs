//! Append-only violation audit log.
//!
//! One line per violating pair per frame:
//!
//! ```text
//! 2024-05-01 14:03:22 - Distance violation: 1.12 meters
//! ```
//!
//! The log file is opened in append mode for every write and is never
//! truncated or rewritten. Write failures surface as `PersistenceError` and
//! never stop the frame loop.

mod record;
mod report;
mod sink;

pub use record::{parse_log_line, ParsedViolation, ViolationRecord, TIMESTAMP_FORMAT};
pub use report::{summarize, LogSummary};
pub use sink::{FileViolationLog, InMemoryViolationLog, ViolationSink};
