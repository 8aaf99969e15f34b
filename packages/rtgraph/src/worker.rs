// Worker - orchestrates acquisition sessions
//
// The worker manages:
// - Source resolution and validation through the catalog
// - The reader task lifecycle (start, cancellation, bounded join)
// - The handoff queue between the reader task and the consumer
// - The ring buffers read by the presentation shell
// - State transitions and event emission
//
// The public API is synchronous and meant to be called from the shell's
// consumer context. The worker owns the runtime hosting the reader task, so it
// must not be driven from inside another tokio runtime.

use crate::catalog::{self, SourceType};
use crate::config::WorkerConfig;
use crate::export::{CsvExporter, SampleSink};
use crate::queue::HandoffQueue;
use crate::reader::{run_reader, EventCallback, ReaderContext, ReaderExit};
use crate::ring_buffer::SampleBuffers;
use crate::source::{create_source, SampleSource, SourceDescriptor, SourceOptions};
use crate::types::{StreamError, StreamResult, WorkerEvent, WorkerState, WorkerStats};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Where a session's copy of the stream goes
enum ExportTarget {
    Disabled,
    Csv,
    Sink(Box<dyn SampleSink>),
}

/// Bookkeeping for the current (or last, if it ended on its own) session
struct Session {
    id: String,
    descriptor: Option<SourceDescriptor>,
    export_enabled: bool,
    cancel_token: CancellationToken,
    handle: JoinHandle<ReaderExit>,
    started_at: Instant,
}

/// Acquisition and buffering engine
pub struct Worker {
    config: WorkerConfig,
    runtime: Runtime,

    queue: HandoffQueue,
    // Drain and resize both go through this lock
    buffers: Mutex<SampleBuffers>,

    state: Arc<RwLock<WorkerState>>,
    session: Mutex<Option<Session>>,
    last_session_id: RwLock<Option<String>>,
    samples_drained: AtomicU64,
    export_failures: Arc<AtomicU64>,

    event_callback: EventCallback,
}

impl Worker {
    /// Create an idle worker
    pub fn new(config: WorkerConfig) -> StreamResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.runtime_threads.max(1))
            .thread_name("rtgraph-reader")
            .enable_all()
            .build()?;

        let buffers = SampleBuffers::new(0, config.default_window_size.max(1))?;

        Ok(Self {
            config,
            runtime,
            queue: HandoffQueue::new(),
            buffers: Mutex::new(buffers),
            state: Arc::new(RwLock::new(WorkerState::Idle)),
            session: Mutex::new(None),
            last_session_id: RwLock::new(None),
            samples_drained: AtomicU64::new(0),
            export_failures: Arc::new(AtomicU64::new(0)),
            event_callback: Arc::new(RwLock::new(None)),
        })
    }

    /// Set event callback function
    ///
    /// Called from the reader task for involuntary stops and export failures,
    /// and from the caller's context for ordinary state changes. The callback
    /// must not call back into the worker; forward events to the shell instead.
    pub fn set_event_callback<F>(&self, callback: F)
    where
        F: Fn(WorkerEvent) + Send + Sync + 'static,
    {
        *self.event_callback.write() = Some(Box::new(callback));
    }

    fn emit_event(&self, event: WorkerEvent) {
        if let Some(callback) = self.event_callback.read().as_ref() {
            callback(event);
        }
    }

    fn emit_all(&self, events: Vec<WorkerEvent>) {
        for event in events {
            self.emit_event(event);
        }
    }

    /// Start a session; returns false (and changes nothing) on failure
    pub fn start(
        &self,
        descriptor: &SourceDescriptor,
        channel_count: usize,
        window_size: usize,
        export_enabled: bool,
    ) -> bool {
        match self.try_start(descriptor, channel_count, window_size, export_enabled) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Cannot start acquisition: {}", e);
                false
            }
        }
    }

    /// Start a session from a descriptor, reporting why it failed
    pub fn try_start(
        &self,
        descriptor: &SourceDescriptor,
        channel_count: usize,
        window_size: usize,
        export_enabled: bool,
    ) -> StreamResult<()> {
        if self.is_active() {
            return Err(StreamError::AlreadyRunning);
        }

        catalog::validate(descriptor)?;
        let options = SourceOptions {
            synthetic_seed: self.config.synthetic_seed,
        };
        let source = create_source(descriptor, channel_count, &options)?;

        let export = if export_enabled {
            ExportTarget::Csv
        } else {
            ExportTarget::Disabled
        };
        self.launch(source, Some(descriptor.clone()), channel_count, window_size, export)
    }

    /// Start a session from any source implementation
    pub fn start_with_source(
        &self,
        source: Box<dyn SampleSource>,
        channel_count: usize,
        window_size: usize,
        export_enabled: bool,
    ) -> StreamResult<()> {
        if self.is_active() {
            return Err(StreamError::AlreadyRunning);
        }
        let export = if export_enabled {
            ExportTarget::Csv
        } else {
            ExportTarget::Disabled
        };
        self.launch(source, None, channel_count, window_size, export)
    }

    /// Start a session whose exported copy goes to `sink` instead of a CSV file
    pub fn start_with_sink(
        &self,
        source: Box<dyn SampleSource>,
        sink: Box<dyn SampleSink>,
        channel_count: usize,
        window_size: usize,
    ) -> StreamResult<()> {
        if self.is_active() {
            return Err(StreamError::AlreadyRunning);
        }
        self.launch(source, None, channel_count, window_size, ExportTarget::Sink(sink))
    }

    fn launch(
        &self,
        mut source: Box<dyn SampleSource>,
        descriptor: Option<SourceDescriptor>,
        channel_count: usize,
        window_size: usize,
        export: ExportTarget,
    ) -> StreamResult<()> {
        let mut session_slot = self.session.lock();

        // Re-check under the session lock; another caller may have won the race
        if *self.state.read() != WorkerState::Idle {
            return Err(StreamError::AlreadyRunning);
        }
        if channel_count == 0 {
            return Err(StreamError::Configuration(
                "Channel count must be greater than zero".to_string(),
            ));
        }
        if let Some(fixed) = source.fixed_channel_count() {
            if fixed != channel_count {
                return Err(StreamError::Configuration(format!(
                    "Source produces {} channels, session declared {}",
                    fixed, channel_count
                )));
            }
        }
        let new_buffers = SampleBuffers::new(channel_count, window_size)?;

        // A session that ended on its own is still parked here
        if let Some(stale) = session_slot.take() {
            self.reap(stale);
        }

        log::info!("Opening source: {}", source.describe());
        self.runtime.block_on(source.open())?;

        let session_id = uuid::Uuid::new_v4().to_string();
        // Emitted once the session lock is released
        let mut events = Vec::new();

        self.export_failures.store(0, Ordering::Relaxed);
        let export_enabled = !matches!(export, ExportTarget::Disabled);
        let exporter: Option<Box<dyn SampleSink>> = match export {
            ExportTarget::Disabled => None,
            ExportTarget::Sink(sink) => Some(sink),
            ExportTarget::Csv => match CsvExporter::create(
                &self.config.export_dir,
                &session_id[..8],
                channel_count,
                self.config.export_flush_every,
            ) {
                Ok(exporter) => Some(Box::new(exporter)),
                Err(e) => {
                    log::error!("Export disabled for session {}: {}", session_id, e);
                    self.export_failures.fetch_add(1, Ordering::Relaxed);
                    events.push(WorkerEvent::ExportFailed {
                        session_id: session_id.clone(),
                        error: e.to_string(),
                    });
                    None
                }
            },
        };

        self.queue.clear();
        self.queue.reset_metrics();
        *self.buffers.lock() = new_buffers;
        self.samples_drained.store(0, Ordering::Relaxed);

        let cancel_token = CancellationToken::new();
        let ctx = ReaderContext {
            session_id: session_id.clone(),
            queue: self.queue.clone(),
            exporter,
            cancel_token: cancel_token.clone(),
            state: Arc::clone(&self.state),
            export_failures: Arc::clone(&self.export_failures),
            event_callback: Arc::clone(&self.event_callback),
            backlog_warn_threshold: self.config.backlog_warn_threshold,
        };

        // Running before the task exists, so an immediate source loss is seen as involuntary
        *self.state.write() = WorkerState::Running;
        let handle = self.runtime.spawn(run_reader(source, ctx));

        *session_slot = Some(Session {
            id: session_id.clone(),
            descriptor,
            export_enabled,
            cancel_token,
            handle,
            started_at: Instant::now(),
        });
        *self.last_session_id.write() = Some(session_id.clone());
        drop(session_slot);

        log::info!(
            "Acquisition started: session {}, {} channels, window {}",
            session_id,
            channel_count,
            window_size
        );
        events.insert(
            0,
            WorkerEvent::StateChanged {
                session_id,
                state: WorkerState::Running,
            },
        );
        self.emit_all(events);

        Ok(())
    }

    /// Stop the running session
    ///
    /// No-op when idle. Buffers keep their contents for display; samples still
    /// queued are discarded.
    pub fn stop(&self) {
        let mut session_slot = self.session.lock();
        let Some(session) = session_slot.take() else {
            return;
        };

        let was_running = {
            let mut state = self.state.write();
            if *state == WorkerState::Running {
                *state = WorkerState::Stopping;
                true
            } else {
                false
            }
        };

        let session_id = session.id.clone();
        if was_running {
            log::info!("Stopping acquisition session {}", session_id);
        }

        self.reap(session);

        if !was_running {
            // Session had already ended on its own; nothing observable changes
            return;
        }

        *self.state.write() = WorkerState::Idle;
        drop(session_slot);
        log::info!("Acquisition stopped");

        self.emit_all(vec![
            WorkerEvent::StateChanged {
                session_id: session_id.clone(),
                state: WorkerState::Stopping,
            },
            WorkerEvent::StateChanged {
                session_id,
                state: WorkerState::Idle,
            },
        ]);
    }

    /// Cancel and join a session's reader task, then drop queued samples
    fn reap(&self, session: Session) {
        session.cancel_token.cancel();

        let timeout = self.config.stop_timeout();
        let mut handle = session.handle;
        let joined = self
            .runtime
            .block_on(async { tokio::time::timeout(timeout, &mut handle).await });

        match joined {
            Ok(Ok(exit)) => log::debug!("Reader exited: {:?}", exit),
            Ok(Err(e)) => log::error!("Reader task failed: {}", e),
            Err(_) => {
                log::warn!(
                    "Reader for session {} did not stop within {:?}, aborting",
                    session.id,
                    timeout
                );
                handle.abort();
            }
        }

        let discarded = self.queue.clear();
        if discarded > 0 {
            log::debug!("Discarded {} unconsumed samples", discarded);
        }
    }

    /// Move every queued sample into the ring buffers
    ///
    /// Works while running and after a session ended on its own, so nothing the
    /// reader queued before a device loss is missed. No-op after `stop()`.
    /// Returns how many samples were moved.
    pub fn drain(&self) -> usize {
        let drainable = match self.state() {
            WorkerState::Running => true,
            // A parked session means the reader ended without stop()
            WorkerState::Idle => self.session.lock().is_some(),
            WorkerState::Stopping => false,
        };
        if !drainable {
            return 0;
        }

        let mut buffers = self.buffers.lock();
        let samples = self.queue.drain();
        let mut moved = 0;

        for sample in &samples {
            if buffers.push_sample(sample) {
                moved += 1;
            } else {
                log::warn!(
                    "Dropping sample with {} values, session has {} channels",
                    sample.num_channels(),
                    buffers.channel_count()
                );
            }
        }

        self.samples_drained.fetch_add(moved as u64, Ordering::Relaxed);
        moved
    }

    /// Reallocate the ring buffers at a new window size, clearing history
    pub fn resize(&self, window_size: usize) -> StreamResult<()> {
        self.buffers.lock().resize(window_size)?;
        log::info!("Window resized to {} samples", window_size);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        *self.state.read() == WorkerState::Running
    }

    fn is_active(&self) -> bool {
        *self.state.read() != WorkerState::Idle
    }

    pub fn state(&self) -> WorkerState {
        *self.state.read()
    }

    /// Channel count of the current (or last) session, 0 before the first one
    pub fn channel_count(&self) -> usize {
        self.buffers.lock().channel_count()
    }

    pub fn window_size(&self) -> usize {
        self.buffers.lock().capacity()
    }

    /// Buffered values of one channel, oldest first; empty for unknown channels
    pub fn read_channel(&self, channel: usize) -> Vec<f64> {
        self.buffers.lock().read(channel).unwrap_or_default()
    }

    /// Buffered timestamps, oldest first, aligned with `read_channel`
    pub fn read_time(&self) -> Vec<f64> {
        self.buffers.lock().read_time()
    }

    /// Number of samples waiting in the handoff queue
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Descriptor of the current session, `None` for custom sources or when idle
    pub fn descriptor(&self) -> Option<SourceDescriptor> {
        self.session
            .lock()
            .as_ref()
            .filter(|_| self.is_running())
            .and_then(|s| s.descriptor.clone())
    }

    pub fn export_enabled(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .map(|s| s.export_enabled && self.is_running())
            .unwrap_or(false)
    }

    pub fn available_endpoints(&self, source_type: SourceType) -> Vec<String> {
        catalog::available_endpoints(source_type)
    }

    pub fn available_rates(&self, source_type: SourceType) -> Vec<u32> {
        catalog::available_rates(source_type)
    }

    /// Get current statistics
    pub fn stats(&self) -> WorkerStats {
        let metrics = self.queue.get_metrics();
        let uptime_seconds = self
            .session
            .lock()
            .as_ref()
            .filter(|_| self.is_running())
            .map(|s| s.started_at.elapsed().as_secs_f64());

        WorkerStats {
            session_id: self.last_session_id.read().clone(),
            state: self.state(),
            samples_received: metrics.total_pushed,
            samples_drained: self.samples_drained.load(Ordering::Relaxed),
            samples_discarded: metrics.total_discarded,
            current_queue_len: metrics.current_size,
            peak_queue_len: metrics.peak_size,
            export_failures: self.export_failures.load(Ordering::Relaxed),
            uptime_seconds,
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.session.lock().is_some() {
            log::info!("Worker dropped with an active session, stopping it");
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SYNTHETIC_CHANNELS;
    use std::time::Duration;

    fn test_config() -> WorkerConfig {
        WorkerConfig {
            synthetic_seed: Some(1),
            stop_timeout_ms: 500,
            ..Default::default()
        }
    }

    fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_new_worker_is_idle() {
        let worker = Worker::new(test_config()).unwrap();
        assert_eq!(worker.state(), WorkerState::Idle);
        assert!(!worker.is_running());
        assert_eq!(worker.channel_count(), 0);
        assert_eq!(worker.window_size(), 500);
        assert_eq!(worker.drain(), 0);
        assert!(worker.read_channel(0).is_empty());
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        let worker = Worker::new(test_config()).unwrap();
        worker.stop();
        worker.stop();
        assert_eq!(worker.state(), WorkerState::Idle);
    }

    #[test]
    fn test_synthetic_session_fills_buffers() {
        let worker = Worker::new(test_config()).unwrap();
        assert!(worker.start(&SourceDescriptor::synthetic(), SYNTHETIC_CHANNELS, 50, false));
        assert!(worker.is_running());
        assert_eq!(worker.channel_count(), SYNTHETIC_CHANNELS);

        assert!(wait_for(|| {
            worker.drain();
            worker.read_time().len() >= 5
        }));

        let times = worker.read_time();
        assert!(times.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(worker.read_channel(0).len(), times.len());
        assert_eq!(worker.read_channel(1).len(), times.len());

        worker.stop();
        assert_eq!(worker.state(), WorkerState::Idle);
        assert_eq!(worker.queued(), 0);
        // Buffers survive stop for display
        assert_eq!(worker.read_time(), times);
    }

    #[test]
    fn test_synthetic_channel_mismatch_rejected() {
        let worker = Worker::new(test_config()).unwrap();
        assert!(!worker.start(&SourceDescriptor::synthetic(), 3, 50, false));
        assert_eq!(worker.state(), WorkerState::Idle);
    }

    #[test]
    fn test_unknown_serial_endpoint_rejected() {
        let worker = Worker::new(test_config()).unwrap();
        let descriptor = SourceDescriptor::serial("/dev/rtgraph-not-attached", 115_200);
        assert!(!worker.start(&descriptor, 2, 50, false));
        assert_eq!(worker.state(), WorkerState::Idle);
        assert!(matches!(
            worker.try_start(&descriptor, 2, 50, false),
            Err(StreamError::Configuration(_))
        ));
    }

    #[test]
    fn test_zero_window_rejected() {
        let worker = Worker::new(test_config()).unwrap();
        assert!(!worker.start(&SourceDescriptor::synthetic(), SYNTHETIC_CHANNELS, 0, false));
        assert_eq!(worker.state(), WorkerState::Idle);
    }

    #[test]
    fn test_events_for_start_and_stop() {
        let worker = Worker::new(test_config()).unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        worker.set_event_callback(move |event| sink.lock().push(event));

        assert!(worker.start(&SourceDescriptor::synthetic(), SYNTHETIC_CHANNELS, 10, false));
        worker.stop();

        let states: Vec<WorkerState> = events
            .lock()
            .iter()
            .filter_map(|e| match e {
                WorkerEvent::StateChanged { state, .. } => Some(*state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![WorkerState::Running, WorkerState::Stopping, WorkerState::Idle]
        );
    }
}
