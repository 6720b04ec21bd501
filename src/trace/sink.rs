//! Destinations for trace records.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use super::TraceRecord;
use crate::error::{Error, Result};

/// Append-only consumer of completed intervals.
pub trait TraceSink {
    fn emit(&mut self, record: TraceRecord) -> Result<()>;

    fn emit_all(&mut self, records: Vec<TraceRecord>) -> Result<()> {
        for record in records {
            self.emit(record)?;
        }
        Ok(())
    }
}

/// Collects records in memory; clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct MemoryTraceSink {
    records: Arc<Mutex<Vec<TraceRecord>>>,
}

impl MemoryTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TraceRecord> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TraceSink for MemoryTraceSink {
    fn emit(&mut self, record: TraceRecord) -> Result<()> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).push(record);
        Ok(())
    }
}

#[derive(Serialize)]
struct TraceFile<'a> {
    #[serde(rename = "traceEvents")]
    trace_events: &'a [TraceRecord],
}

/// Buffers records and writes a `{"traceEvents": [...]}` file on finish.
#[derive(Debug)]
pub struct JsonTraceWriter {
    path: PathBuf,
    records: Vec<TraceRecord>,
}

impl JsonTraceWriter {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf(), records: Vec::new() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write every buffered record to disk.
    pub fn finish(self) -> Result<usize> {
        let context = || format!("writing trace {}", self.path.display());
        let file = File::create(&self.path).map_err(|e| Error::io(context(), e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &TraceFile { trace_events: &self.records })?;
        writer.flush().map_err(|e| Error::io(context(), e))?;
        Ok(self.records.len())
    }
}

impl TraceSink for JsonTraceWriter {
    fn emit(&mut self, record: TraceRecord) -> Result<()> {
        self.records.push(record);
        Ok(())
    }
}
