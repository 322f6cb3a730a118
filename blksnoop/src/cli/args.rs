//! CLI argument definitions

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "blksnoop",
    about = "Trace block device I/O and print per-request latency with the issuing process",
    after_help = "\
EXAMPLES:
    sudo blksnoop                    Trace all block I/O
    sudo blksnoop -Q                 Include OS queued time
    sudo blksnoop --duration 10      Stop after ten seconds"
)]
pub struct Args {
    /// Include OS queued time (issue to dispatch) as an extra column
    #[arg(short = 'Q', long = "queue")]
    pub queue: bool,

    /// Stop after N seconds (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub duration: u64,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}
