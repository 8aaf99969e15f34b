// Reader loop
//
// One task per session. Pulls samples from the source, copies them to the
// exporter, and pushes them onto the handoff queue until cancelled or until
// the source closes. Cancellation is checked first on every iteration and
// drops any in-flight read, so a silent device never delays shutdown.

use crate::export::SampleSink;
use crate::queue::HandoffQueue;
use crate::source::SampleSource;
use crate::types::{StreamError, WorkerEvent, WorkerState};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub(crate) type EventCallback = Arc<RwLock<Option<Box<dyn Fn(WorkerEvent) + Send + Sync>>>>;

/// Why the reader task ended
#[derive(Debug, Clone, PartialEq)]
pub enum ReaderExit {
    /// Stop was requested
    Cancelled,
    /// The source closed or failed on its own
    SourceLost(String),
}

/// Everything the reader task shares with the worker
pub(crate) struct ReaderContext {
    pub session_id: String,
    pub queue: HandoffQueue,
    pub exporter: Option<Box<dyn SampleSink>>,
    pub cancel_token: CancellationToken,
    pub state: Arc<RwLock<WorkerState>>,
    pub export_failures: Arc<AtomicU64>,
    pub event_callback: EventCallback,
    pub backlog_warn_threshold: usize,
}

impl ReaderContext {
    fn emit(&self, event: WorkerEvent) {
        if let Some(callback) = self.event_callback.read().as_ref() {
            callback(event);
        }
    }

    fn export(&mut self, sample: &crate::types::SampleTuple) {
        let Some(exporter) = self.exporter.as_mut() else {
            return;
        };

        let before = exporter.failure_count();
        exporter.accept(sample);
        let after = exporter.failure_count();

        if after > before {
            self.export_failures.fetch_add(after - before, Ordering::Relaxed);
            if before == 0 {
                let error = exporter
                    .last_error()
                    .unwrap_or_else(|| "unknown export failure".to_string());
                self.emit(WorkerEvent::ExportFailed {
                    session_id: self.session_id.clone(),
                    error,
                });
            }
        }
    }
}

/// Run the reader loop for an already opened source
pub(crate) async fn run_reader(
    mut source: Box<dyn SampleSource>,
    mut ctx: ReaderContext,
) -> ReaderExit {
    log::info!(
        "Reader started for session {} ({})",
        ctx.session_id,
        source.describe()
    );

    let mut backlog_warned = false;

    let exit = loop {
        tokio::select! {
            biased;

            _ = ctx.cancel_token.cancelled() => {
                log::info!("Reader cancelled");
                break ReaderExit::Cancelled;
            }

            result = source.read_next() => {
                match result {
                    Ok(sample) => {
                        ctx.export(&sample);
                        ctx.queue.push(sample);

                        let backlog = ctx.queue.len();
                        if backlog > ctx.backlog_warn_threshold {
                            if !backlog_warned {
                                log::warn!(
                                    "Handoff queue backlog at {} samples, consumer is not keeping up",
                                    backlog
                                );
                                backlog_warned = true;
                            }
                        } else {
                            backlog_warned = false;
                        }
                    }
                    Err(StreamError::Parse(e)) => {
                        log::debug!("Skipping malformed sample: {}", e);
                    }
                    Err(e) => {
                        break ReaderExit::SourceLost(e.to_string());
                    }
                }
            }
        }
    };

    source.close().await;
    if let Some(exporter) = ctx.exporter.as_mut() {
        exporter.finish();
    }

    if let ReaderExit::SourceLost(reason) = &exit {
        // Only an unrequested end is involuntary; a concurrent stop() owns the transition
        let lost = {
            let mut state = ctx.state.write();
            if *state == WorkerState::Running {
                *state = WorkerState::Idle;
                true
            } else {
                false
            }
        };

        if lost {
            log::warn!("Acquisition stopped involuntarily: {}", reason);
            ctx.emit(WorkerEvent::AcquisitionLost {
                session_id: ctx.session_id.clone(),
                reason: reason.clone(),
            });
            ctx.emit(WorkerEvent::StateChanged {
                session_id: ctx.session_id.clone(),
                state: WorkerState::Idle,
            });
        }
    }

    log::info!("Reader for session {} finished", ctx.session_id);
    exit
}
