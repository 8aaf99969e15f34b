// Real-time acquisition and buffering engine
//
// Architecture:
// - `catalog`: source types, attached endpoints and supported rates
// - `source`: pluggable sample sources (serial device, synthetic generator)
// - `reader`: per-session task feeding the handoff queue and the exporter
// - `queue`: lock-free FIFO between the reader task and the consumer
// - `ring_buffer`: fixed-window per-channel buffers read for plotting
// - `export`: CSV copy of the acquired stream
// - `worker`: lifecycle management and coordination

pub mod catalog;
pub mod config;
pub mod export;
pub mod queue;
mod reader;
pub mod ring_buffer;
pub mod source;
pub mod types;
pub mod worker;

pub use catalog::{available_endpoints, available_rates, SourceType};
pub use config::WorkerConfig;
pub use export::{CsvExporter, SampleSink};
pub use queue::{HandoffQueue, QueueMetrics};
pub use ring_buffer::{RingBuffer, SampleBuffers};
pub use source::{create_source, SampleSource, SourceDescriptor, SYNTHETIC_CHANNELS};
pub use types::{SampleTuple, StreamError, StreamResult, WorkerEvent, WorkerState, WorkerStats};
pub use worker::Worker;
