// Common types for the acquisition engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for acquisition operations
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors that can occur while acquiring, buffering or exporting samples
#[derive(Debug, Error)]
pub enum StreamError {
    /// Unsupported endpoint, rate, channel count or window size
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    /// A line from the device could not be turned into a sample
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Source closed")]
    SourceClosed,

    #[error("Serial port error: {0}")]
    Serial(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Acquisition already running")]
    AlreadyRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One timestamped reading across all channels
///
/// `timestamp` is in seconds since the source was opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleTuple {
    pub timestamp: f64,
    pub values: Vec<f64>,
}

impl SampleTuple {
    pub fn new(timestamp: f64, values: Vec<f64>) -> Self {
        Self { timestamp, values }
    }

    pub fn num_channels(&self) -> usize {
        self.values.len()
    }
}

/// Lifecycle state of the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    #[default]
    Idle,
    Running,
    /// Transient, only observable while `stop()` tears a session down
    Stopping,
}

/// Statistics about the current (or last) acquisition session
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkerStats {
    pub session_id: Option<String>,
    pub state: WorkerState,
    pub samples_received: u64,
    pub samples_drained: u64,
    pub samples_discarded: u64,
    pub current_queue_len: usize,
    pub peak_queue_len: usize,
    pub export_failures: u64,
    pub uptime_seconds: Option<f64>,
}

/// Events emitted by the worker
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    StateChanged {
        session_id: String,
        state: WorkerState,
    },
    /// The source went away while the session was running
    AcquisitionLost { session_id: String, reason: String },
    /// First export failure of a session; acquisition continues
    ExportFailed { session_id: String, error: String },
}

impl WorkerEvent {
    pub fn session_id(&self) -> &str {
        match self {
            WorkerEvent::StateChanged { session_id, .. }
            | WorkerEvent::AcquisitionLost { session_id, .. }
            | WorkerEvent::ExportFailed { session_id, .. } => session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_state_serializes_lowercase() {
        let json = serde_json::to_string(&WorkerState::Running).unwrap();
        assert_eq!(json, "\"running\"");
        assert_eq!(WorkerState::default(), WorkerState::Idle);
    }

    #[test]
    fn test_error_messages() {
        let err = StreamError::Configuration("rate 42 not supported".to_string());
        assert_eq!(err.to_string(), "Invalid configuration: rate 42 not supported");
        assert_eq!(StreamError::SourceClosed.to_string(), "Source closed");
    }
}
