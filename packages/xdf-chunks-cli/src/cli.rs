use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "xdf-chunks",
    version,
    about = "Chunked, time-synchronized playback of XDF recordings",
    long_about = "Slice multi-stream XDF recordings (Lab Streaming Layer) into fixed-duration\n\
                  windows and emit them as JSON, optionally paced in real time."
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
    /// Emit a recording chunk by chunk
    Chunks(ChunksArgs),
    /// Show the streams contained in a recording
    Info(InfoArgs),
    /// Validate an XDF file
    Validate(ValidateArgs),
}

#[derive(Args)]
pub struct ChunksArgs {
    /// Input XDF file path
    #[arg(long)]
    pub file: String,

    /// Streams to include, in output order (default: all)
    #[arg(long, num_args = 1..)]
    pub select: Vec<String>,

    /// Follow a single stream; chunks without samples are skipped
    #[arg(long, conflicts_with_all = ["select", "force_single_sample"])]
    pub stream: Option<String>,

    /// Chunk duration in seconds [default: 1.0]
    #[arg(long)]
    pub chunk_dur: Option<f64>,

    /// Drop samples before this time (seconds, after rezeroing)
    #[arg(long)]
    pub start: Option<f64>,

    /// Drop samples after this time (seconds, inclusive)
    #[arg(long)]
    pub stop: Option<f64>,

    /// Keep the recording's own clock instead of starting at t=0
    #[arg(long, default_value_t = false)]
    pub no_rezero: bool,

    /// Streams emitted as one container per sample
    #[arg(long, num_args = 1..)]
    pub force_single_sample: Vec<String>,

    /// Ignore the clock offsets stored in the file
    #[arg(long, default_value_t = false)]
    pub no_clock_sync: bool,

    /// Refit the timestamps of regular-rate streams to remove jitter
    #[arg(long, default_value_t = false)]
    pub dejitter: bool,

    /// Pace output in wall-clock time (1.0 = real time)
    #[arg(long, env = "XDF_PLAYBACK_RATE")]
    pub playback_rate: Option<f64>,

    /// JSON file with iterator settings; command-line flags take precedence
    #[arg(long)]
    pub config: Option<String>,

    /// Include sample values in the output
    #[arg(long, default_value_t = false)]
    pub include_data: bool,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output, one chunk per line
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct InfoArgs {
    /// Input XDF file path
    #[arg(long)]
    pub file: String,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Input XDF file path
    #[arg(long)]
    pub file: String,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}
