use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::log::record::ViolationRecord;
use crate::MeasureError;

/// Durable destination for violation records.
pub trait ViolationSink {
    /// Append one record. Implementations never rewrite earlier records.
    fn record(&mut self, record: &ViolationRecord) -> Result<(), MeasureError>;
}

impl<S: ViolationSink + ?Sized> ViolationSink for Box<S> {
    fn record(&mut self, record: &ViolationRecord) -> Result<(), MeasureError> {
        (**self).record(record)
    }
}

/// Text log on disk, opened in append mode for every write.
///
/// Opening per write keeps the file valid across crashes and lets external
/// rotation move the file away between records.
#[derive(Clone, Debug)]
pub struct FileViolationLog {
    path: PathBuf,
}

impl FileViolationLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ViolationSink for FileViolationLog {
    fn record(&mut self, record: &ViolationRecord) -> Result<(), MeasureError> {
        let persistence = |source| MeasureError::PersistenceError {
            path: self.path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(persistence)?;
        writeln!(file, "{}", record.log_line()).map_err(persistence)?;
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Clone, Debug, Default)]
pub struct InMemoryViolationLog {
    records: Vec<ViolationRecord>,
}

impl InMemoryViolationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[ViolationRecord] {
        &self.records
    }

    pub fn lines(&self) -> Vec<String> {
        self.records.iter().map(|r| r.log_line()).collect()
    }
}

impl ViolationSink for InMemoryViolationLog {
    fn record(&mut self, record: &ViolationRecord) -> Result<(), MeasureError> {
        self.records.push(record.clone());
        Ok(())
    }
}
