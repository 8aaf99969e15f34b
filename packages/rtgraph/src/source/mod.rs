// Sample sources
//
// `SampleSource` is the capability "produce timestamped sample tuples".
// Sources are selected at start time from a `SourceDescriptor`:
// - Serial: a device streaming comma-separated numeric lines
// - Synthetic: a built-in generator that needs no hardware
//
// New source types are added by implementing the trait, adding a
// `SourceType` variant and a match arm in `create_source`.

#[cfg(target_family = "unix")]
mod serial;
mod synthetic;

use crate::catalog::{SourceType, SYNTHETIC_RATE};
use crate::types::{SampleTuple, StreamError, StreamResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(target_family = "unix")]
pub use serial::{parse_line, SerialSampleSource};
pub use synthetic::{SyntheticSampleSource, SYNTHETIC_CHANNELS};

/// Which source to open, where, and how fast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    /// Device path for serial sources, empty for synthetic
    #[serde(default)]
    pub endpoint: String,
    /// Baud rate for serial, samples per second for synthetic
    pub rate: u32,
}

impl SourceDescriptor {
    pub fn new(source_type: SourceType, endpoint: impl Into<String>, rate: u32) -> Self {
        Self {
            source_type,
            endpoint: endpoint.into(),
            rate,
        }
    }

    pub fn serial(endpoint: impl Into<String>, baud_rate: u32) -> Self {
        Self::new(SourceType::Serial, endpoint, baud_rate)
    }

    pub fn synthetic() -> Self {
        Self::new(SourceType::Synthetic, String::new(), SYNTHETIC_RATE)
    }
}

/// Trait for all sample sources
///
/// `read_next` waits until a sample is available. Sources are driven from the
/// reader task, which may drop an in-flight `read_next` future when the session
/// is stopped, so implementations must leave themselves closable afterwards.
#[async_trait]
pub trait SampleSource: Send {
    /// Open the underlying device or generator
    ///
    /// Fails with `StreamError::Connection` when the endpoint cannot be opened.
    async fn open(&mut self) -> StreamResult<()>;

    /// Wait for the next sample
    ///
    /// Fails with `StreamError::SourceClosed` once the source is closed or the
    /// device went away. Malformed input is skipped internally.
    async fn read_next(&mut self) -> StreamResult<SampleTuple>;

    /// Release the underlying handle. Idempotent.
    async fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Channel count if fixed by the source itself
    fn fixed_channel_count(&self) -> Option<usize> {
        None
    }

    /// Short human-readable description for logs
    fn describe(&self) -> String;
}

/// Options forwarded to sources when they are built from a descriptor
#[derive(Debug, Clone, Default)]
pub struct SourceOptions {
    pub synthetic_seed: Option<u64>,
}

/// Build a source from a descriptor
///
/// The descriptor is expected to be validated against the catalog already;
/// this only checks what depends on the session's channel count.
pub fn create_source(
    descriptor: &SourceDescriptor,
    channel_count: usize,
    options: &SourceOptions,
) -> StreamResult<Box<dyn SampleSource>> {
    match descriptor.source_type {
        #[cfg(target_family = "unix")]
        SourceType::Serial => Ok(Box::new(SerialSampleSource::new(
            descriptor.endpoint.clone(),
            descriptor.rate,
            channel_count,
        ))),

        #[cfg(not(target_family = "unix"))]
        SourceType::Serial => Err(StreamError::Configuration(
            "Serial sources are not supported on this platform".to_string(),
        )),

        SourceType::Synthetic => {
            if channel_count != SYNTHETIC_CHANNELS {
                return Err(StreamError::Configuration(format!(
                    "Synthetic source produces {} channels, session declared {}",
                    SYNTHETIC_CHANNELS, channel_count
                )));
            }
            Ok(Box::new(SyntheticSampleSource::new(
                descriptor.rate,
                options.synthetic_seed,
            )))
        }
    }
}
