//! Destinations for result records.
//!
//! Sinks are handed to workers explicitly; nothing in the crate writes records
//! through global state. A sink must not block for long and must not drop
//! records silently. Write errors are reported with `tracing` and the record
//! is counted as lost.

use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use tracing::warn;

use crate::record::ResultRecord;

/// Receives every record a worker produces.
pub trait RecordSink: Send + Sync + 'static {
    fn record(&self, record: &ResultRecord);

    /// Pushes buffered output to its destination.
    fn flush(&self) {}
}

/// Appends untruncated record lines to a file.
pub struct FileSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    failed_writes: AtomicU64,
}

impl FileSink {
    pub fn create(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open {}", path.display()))?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
            failed_writes: AtomicU64::new(0),
        })
    }

    /// Records that could not be written.
    pub fn failed_writes(&self) -> u64 {
        self.failed_writes.load(Ordering::Relaxed)
    }
}

impl RecordSink for FileSink {
    fn record(&self, record: &ResultRecord) {
        let line = record.to_line();
        let mut writer = match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(err) = writeln!(writer, "{line}") {
            self.failed_writes.fetch_add(1, Ordering::Relaxed);
            warn!(path = %self.path.display(), error = %err, "failed to write result record");
        }
    }

    fn flush(&self) {
        let mut writer = match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(err) = writer.flush() {
            warn!(path = %self.path.display(), error = %err, "failed to flush result log");
        }
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        <Self as RecordSink>::flush(self);
    }
}

/// Writes record lines to stdout, optionally truncated.
#[derive(Clone, Copy, Debug)]
pub struct ConsoleSink {
    max_length: usize,
    truncate: bool,
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self {
            max_length: 120,
            truncate: true,
        }
    }
}

impl ConsoleSink {
    pub fn new(max_length: usize, truncate: bool) -> Self {
        Self {
            max_length,
            truncate,
        }
    }

    pub fn render<'a>(&self, line: &'a str) -> Cow<'a, str> {
        if self.truncate {
            truncate_line(line, self.max_length)
        } else {
            Cow::Borrowed(line)
        }
    }
}

impl RecordSink for ConsoleSink {
    fn record(&self, record: &ResultRecord) {
        let line = record.to_line();
        let mut stdout = std::io::stdout().lock();
        if let Err(err) = writeln!(stdout, "{}", self.render(&line)) {
            warn!(error = %err, "failed to write result record to stdout");
        }
    }

    fn flush(&self) {
        if let Err(err) = std::io::stdout().lock().flush() {
            warn!(error = %err, "failed to flush stdout");
        }
    }
}

/// Lines shorter than `max_length` characters pass through. Longer lines keep
/// `max_length - 4` characters and end in `" ..."`.
pub fn truncate_line(line: &str, max_length: usize) -> Cow<'_, str> {
    if line.chars().count() < max_length {
        return Cow::Borrowed(line);
    }
    let keep = max_length.saturating_sub(4);
    let cut = line
        .char_indices()
        .nth(keep)
        .map(|(idx, _)| idx)
        .unwrap_or(line.len());
    Cow::Owned(format!("{} ...", &line[..cut]))
}

/// Forwards each record to several sinks, in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn RecordSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn RecordSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn RecordSink>) {
        self.sinks.push(sink);
    }
}

impl RecordSink for FanoutSink {
    fn record(&self, record: &ResultRecord) {
        for sink in &self.sinks {
            sink.record(record);
        }
    }

    fn flush(&self) {
        for sink in &self.sinks {
            sink.flush();
        }
    }
}

/// Keeps records in memory.
#[derive(Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<ResultRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ResultRecord> {
        match self.records.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self.records.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordSink for MemorySink {
    fn record(&self, record: &ResultRecord) {
        let mut records = match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        records.push(record.clone());
    }
}
