use clap::{Args, Parser, Subcommand, ValueEnum};
use rtgraph::SourceType;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "rtgraph",
    version,
    about = "Real-time serial data acquisition and buffering",
    long_about = "Acquire samples from a serial device or the built-in synthetic generator,\n\
                  buffer the most recent window per channel and optionally export to CSV."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// List source types and their rates
    Sources(SourcesArgs),
    /// List the endpoints currently available for a source type
    Ports(PortsArgs),
    /// Run an acquisition session
    Run(RunArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum SourceArg {
    Serial,
    Synthetic,
}

impl From<SourceArg> for SourceType {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Serial => SourceType::Serial,
            SourceArg::Synthetic => SourceType::Synthetic,
        }
    }
}

#[derive(Args)]
pub struct SourcesArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct PortsArgs {
    /// Source type to query
    #[arg(long, value_enum, default_value_t = SourceArg::Serial)]
    pub source: SourceArg,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct RunArgs {
    /// Source type
    #[arg(long, value_enum)]
    pub source: SourceArg,

    /// Serial port (required for serial sources)
    #[arg(long, env = "RTGRAPH_PORT")]
    pub port: Option<String>,

    /// Baud rate or sample rate, one of `rtgraph sources`; defaults to the source's usual rate
    #[arg(long)]
    pub rate: Option<u32>,

    /// Values per sample
    #[arg(long, default_value_t = 2)]
    pub channels: usize,

    /// Samples kept per channel (window size)
    #[arg(long)]
    pub samples: Option<usize>,

    /// Drain interval in milliseconds
    #[arg(long, default_value_t = 16)]
    pub tick_ms: u64,

    /// Stop after this many milliseconds
    #[arg(long, default_value_t = 5000)]
    pub duration_ms: u64,

    /// Export the session to CSV
    #[arg(long)]
    pub export: bool,

    /// Directory receiving the CSV export
    #[arg(long)]
    pub export_dir: Option<PathBuf>,

    /// Configuration file (JSON); defaults to the per-user file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output the summary as JSON
    #[arg(long)]
    pub json: bool,
}
