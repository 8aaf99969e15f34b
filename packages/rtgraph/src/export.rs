// Session export
//
// Duplicates the acquired stream to a persistent sink. Sinks never return
// errors to the reader: failures are logged and counted, acquisition goes on.
//
// CSV layout, one file per session, one row per sample in arrival order:
//
//   timestamp,value_1,value_2
//   0.010,0.0627,-0.31

use crate::types::{SampleTuple, StreamError, StreamResult};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Destination for a copy of every acquired sample
pub trait SampleSink: Send {
    /// Record one sample. Must not panic or propagate failures.
    fn accept(&mut self, sample: &SampleTuple);

    /// Flush and release the sink at session end
    fn finish(&mut self) {}

    /// Failures observed so far
    fn failure_count(&self) -> u64 {
        0
    }

    /// Most recent failure, if any
    fn last_error(&self) -> Option<String> {
        None
    }
}

pub struct CsvExporter {
    path: PathBuf,
    writer: Option<csv::Writer<BufWriter<File>>>,
    flush_every: usize,
    since_flush: usize,
    records_written: u64,
    failures: u64,
    last_error: Option<String>,
}

impl CsvExporter {
    /// Create `<dir>/session_<timestamp>_<tag>.csv` and write the header
    pub fn create(dir: &Path, tag: &str, channel_count: usize, flush_every: usize) -> StreamResult<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|e| StreamError::Export(format!("Cannot create {}: {}", dir.display(), e)))?;

        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("session_{}_{}.csv", stamp, tag));
        Self::create_at(path, channel_count, flush_every)
    }

    /// Create the export file at an explicit path
    pub fn create_at(path: PathBuf, channel_count: usize, flush_every: usize) -> StreamResult<Self> {
        let file = File::create(&path)
            .map_err(|e| StreamError::Export(format!("Cannot create {}: {}", path.display(), e)))?;
        let mut writer = csv::Writer::from_writer(BufWriter::new(file));

        let header = std::iter::once("timestamp".to_string())
            .chain((1..=channel_count).map(|i| format!("value_{}", i)));
        writer.write_record(header)?;
        writer.flush()?;

        log::info!("Exporting session to {}", path.display());

        Ok(Self {
            path,
            writer: Some(writer),
            flush_every: flush_every.max(1),
            since_flush: 0,
            records_written: 0,
            failures: 0,
            last_error: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    fn record_failure(&mut self, error: String) {
        self.failures += 1;
        if self.failures == 1 {
            log::error!("Export to {} failed: {}", self.path.display(), error);
        } else {
            log::debug!("Export failure #{}: {}", self.failures, error);
        }
        self.last_error = Some(error);
    }
}

impl SampleSink for CsvExporter {
    fn accept(&mut self, sample: &SampleTuple) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };

        let record = std::iter::once(sample.timestamp.to_string())
            .chain(sample.values.iter().map(|v| v.to_string()));
        let mut result = writer.write_record(record).map_err(|e| e.to_string());

        if result.is_ok() {
            self.records_written += 1;
            self.since_flush += 1;
            if self.since_flush >= self.flush_every {
                self.since_flush = 0;
                result = writer.flush().map_err(|e| e.to_string());
            }
        }

        if let Err(e) = result {
            self.record_failure(e);
        }
    }

    fn finish(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                self.record_failure(e.to_string());
            }
            log::info!(
                "Export finished: {} records written to {}",
                self.records_written,
                self.path.display()
            );
        }
    }

    fn failure_count(&self) -> u64 {
        self.failures
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }
}

impl Drop for CsvExporter {
    fn drop(&mut self) {
        self.finish();
    }
}
