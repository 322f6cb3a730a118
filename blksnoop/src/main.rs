//! # blksnoop - Main Entry Point
//!
//! Preflight → load eBPF → configure → attach the three kprobes → consume
//! the ring buffer until Ctrl-C (or `--duration` elapses).

use anyhow::{Context, Result};
use aya::maps::RingBuf;
use clap::Parser;
use log::info;
use std::time::Duration;
use tokio::io::unix::AsyncFd;

use blksnoop::cli::Args;
use blksnoop::preflight::run_preflight_checks;
use blksnoop::trace::{
    attach_block_probes, configure_queue_tracking, header_row, init_ebpf_logger,
    load_ebpf_program, print_channel_diagnostics, EventProcessor,
};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_NOPERM: i32 = 77;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = err.to_string().to_lowercase();
    if msg.contains("permission denied") || msg.contains("requires root") {
        EXIT_NOPERM
    } else {
        EXIT_ERROR
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();

    // Run pre-flight checks before anything else
    let plan = run_preflight_checks()?;

    if !args.quiet {
        println!("blksnoop v{}", env!("CARGO_PKG_VERSION"));
    }

    // ── Load eBPF, push config, attach probes ───────────────────────────
    let mut bpf = load_ebpf_program()?;
    init_ebpf_logger(&mut bpf);

    // Config must be in place before the first probe can fire
    configure_queue_tracking(&mut bpf, args.queue)?;
    attach_block_probes(&mut bpf, &plan)?;

    // ── Take the event channel ──────────────────────────────────────────
    let ring_buf = RingBuf::try_from(bpf.take_map("EVENTS").context("EVENTS map not found")?)?;
    let mut events =
        AsyncFd::new(ring_buf).context("Failed to register event channel with the reactor")?;

    println!("{}", header_row(args.queue));

    let mut processor = EventProcessor::new(args.queue);

    // Setup Ctrl+C handler
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    // Optional session deadline
    let duration_limit = (args.duration > 0).then(|| Duration::from_secs(args.duration));
    let deadline = async {
        match duration_limit {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    // Track why we exited the loop
    let exit_reason;

    // Main event consumption loop: block until records arrive or we are
    // canceled; canceled exits without draining
    loop {
        tokio::select! {
            guard = events.readable_mut() => {
                let mut guard = guard.context("Event channel poll failed")?;
                let ring = guard.get_inner_mut();
                while let Some(item) = ring.next() {
                    let bytes: &[u8] = &item;
                    processor.handle_record(bytes);
                }
                guard.clear_ready();
            }
            _ = &mut ctrl_c => {
                exit_reason = "interrupted";
                break;
            }
            () = &mut deadline => {
                exit_reason = "duration limit reached";
                break;
            }
        }
    }

    info!("Consumer loop stopped: {exit_reason}");

    // Summary (stderr, so piped row output stays clean)
    if !args.quiet {
        eprintln!(
            "\n{}: {} events ({} reads, {} writes)",
            exit_reason, processor.event_count, processor.read_count, processor.write_count,
        );
        print_channel_diagnostics(&bpf)?;
    }

    Ok(())
}
