use crate::cli::RunArgs;
use crate::exit_codes;
use crate::output;
use rtgraph::catalog::SYNTHETIC_RATE;
use rtgraph::{SourceDescriptor, SourceType, Worker, WorkerConfig, WorkerEvent, WorkerStats};
use serde::Serialize;
use std::time::{Duration, Instant};

const DEFAULT_BAUD_RATE: u32 = 115_200;

#[derive(Serialize)]
struct RunSummary {
    source: SourceDescriptor,
    channel_count: usize,
    window_size: usize,
    export_enabled: bool,
    source_lost: Option<String>,
    stats: WorkerStats,
    time: Vec<f64>,
    channels: Vec<Vec<f64>>,
}

pub fn execute(args: RunArgs) -> i32 {
    let mut config = match &args.config {
        Some(path) => match WorkerConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: cannot read configuration {}: {}", path.display(), e);
                return exit_codes::EXECUTION_ERROR;
            }
        },
        None => WorkerConfig::load_or_default(),
    };
    if let Some(dir) = &args.export_dir {
        config.export_dir = dir.clone();
    }

    let source_type = SourceType::from(args.source);
    let descriptor = match source_type {
        SourceType::Serial => {
            let Some(port) = args.port.clone() else {
                eprintln!("Error: --port is required for serial sources");
                return exit_codes::INVALID_ARGS;
            };
            SourceDescriptor::serial(port, args.rate.unwrap_or(DEFAULT_BAUD_RATE))
        }
        SourceType::Synthetic => SourceDescriptor::new(
            SourceType::Synthetic,
            args.port.clone().unwrap_or_default(),
            args.rate.unwrap_or(SYNTHETIC_RATE),
        ),
    };
    let window_size = args.samples.unwrap_or(config.default_window_size);
    let tick = Duration::from_millis(args.tick_ms.max(1));
    let duration = Duration::from_millis(args.duration_ms);

    let worker = match Worker::new(config) {
        Ok(worker) => worker,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };

    let (event_tx, event_rx) = crossbeam::channel::unbounded();
    worker.set_event_callback(move |event| {
        let _ = event_tx.send(event);
    });

    if let Err(e) = worker.try_start(&descriptor, args.channels, window_size, args.export) {
        eprintln!("Warning: cannot start acquisition: {}", e);
        return exit_codes::EXECUTION_ERROR;
    }
    eprintln!(
        "Acquiring from {} ({} channels, {} samples window)",
        describe(&descriptor),
        args.channels,
        window_size
    );

    let started = Instant::now();
    let mut last_progress = started;
    let mut source_lost = None;

    while started.elapsed() < duration && source_lost.is_none() {
        std::thread::sleep(tick);
        worker.drain();

        for event in event_rx.try_iter() {
            log::debug!("Session {}: {:?}", event.session_id(), event);
            match event {
                WorkerEvent::AcquisitionLost { reason, .. } => {
                    eprintln!("Warning: acquisition stopped: {}", reason);
                    source_lost = Some(reason);
                }
                WorkerEvent::ExportFailed { error, .. } => {
                    eprintln!("Warning: export failed: {}", error);
                }
                WorkerEvent::StateChanged { .. } => {}
            }
        }

        if last_progress.elapsed() >= Duration::from_secs(1) {
            last_progress = Instant::now();
            let stats = worker.stats();
            eprintln!(
                "[{:>5.1}s] received {} drained {} queued {}",
                started.elapsed().as_secs_f64(),
                stats.samples_received,
                stats.samples_drained,
                stats.current_queue_len
            );
        }
    }

    // Pick up what was queued since the last tick, including after a device loss
    worker.drain();
    worker.stop();

    let summary = RunSummary {
        source: descriptor,
        channel_count: worker.channel_count(),
        window_size: worker.window_size(),
        export_enabled: args.export,
        source_lost,
        stats: worker.stats(),
        time: worker.read_time(),
        channels: (0..worker.channel_count())
            .map(|ch| worker.read_channel(ch))
            .collect(),
    };

    let code = if args.json {
        output::print_json(&summary, false)
    } else {
        print_summary(&summary);
        exit_codes::SUCCESS
    };

    if summary.source_lost.is_some() {
        exit_codes::EXECUTION_ERROR
    } else {
        code
    }
}

fn describe(descriptor: &SourceDescriptor) -> String {
    if descriptor.endpoint.is_empty() {
        format!("{} @ {}", descriptor.source_type, descriptor.rate)
    } else {
        format!(
            "{} {} @ {}",
            descriptor.source_type, descriptor.endpoint, descriptor.rate
        )
    }
}

fn print_summary(summary: &RunSummary) {
    let stats = &summary.stats;
    println!("Session:    {}", stats.session_id.as_deref().unwrap_or("-"));
    println!("Source:     {}", describe(&summary.source));
    println!("Received:   {}", stats.samples_received);
    println!("Drained:    {}", stats.samples_drained);
    println!("Discarded:  {}", stats.samples_discarded);
    println!("Peak queue: {}", stats.peak_queue_len);
    if summary.export_enabled {
        println!("Export failures: {}", stats.export_failures);
    }
    if let Some(reason) = &summary.source_lost {
        println!("Stopped early: {}", reason);
    }

    println!();
    println!("Window ({} of {} samples):", summary.time.len(), summary.window_size);
    for (ch, values) in summary.channels.iter().enumerate() {
        match values.last() {
            Some(last) => println!(
                "  value_{}: {} samples, last {:.4}",
                ch + 1,
                values.len(),
                last
            ),
            None => println!("  value_{}: empty", ch + 1),
        }
    }
}
