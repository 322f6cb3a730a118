//! # eBPF Program Loading and Attachment
//!
//! Loads the embedded eBPF bytecode, pushes the session configuration into
//! the kernel, and attaches the three kprobes.
//!
//! ## Attachment Points
//!
//! - **Issue**: `blk_account_io_start` → `blksnoop_io_start`
//! - **Dispatch**: `blk_mq_start_request` (plus legacy `blk_start_request`
//!   on kernels that still have it) → `blksnoop_io_dispatch`
//! - **Completion**: `blk_account_io_done` → `blksnoop_io_done`
//!
//! Attach failure on any required symbol is fatal: the session never starts
//! partially attached.

use aya::{include_bytes_aligned, maps::HashMap, programs::KProbe, Ebpf};
use aya_log::EbpfLogger;
use blksnoop_common::CONFIG_QUEUE_TRACKING;
use log::{info, warn};

use crate::domain::TraceError;
use crate::preflight::AttachPlan;

/// Kernel symbol where block I/O accounting begins for a request.
pub const ISSUE_SYMBOL: &str = "blk_account_io_start";
/// Kernel symbol where a request enters multi-queue hardware dispatch.
pub const DISPATCH_SYMBOL: &str = "blk_mq_start_request";
/// Dispatch symbol of the legacy single-queue I/O path.
pub const LEGACY_DISPATCH_SYMBOL: &str = "blk_start_request";
/// Kernel symbol where block I/O accounting completes for a request.
pub const COMPLETION_SYMBOL: &str = "blk_account_io_done";

const ISSUE_PROGRAM: &str = "blksnoop_io_start";
const DISPATCH_PROGRAM: &str = "blksnoop_io_dispatch";
const COMPLETION_PROGRAM: &str = "blksnoop_io_done";

/// Load the eBPF program binary
///
/// Always uses the release build; eBPF programs are small and compile fast
/// in release, and the release build uses LTO to eliminate dead code.
///
/// # Errors
/// Returns an error if the eBPF program binary cannot be loaded
pub fn load_ebpf_program() -> Result<Ebpf, TraceError> {
    let bpf = Ebpf::load(include_bytes_aligned!(
        "../../../target/bpfel-unknown-none/release/blksnoop"
    ))?;
    Ok(bpf)
}

/// Initialize eBPF logger
pub fn init_ebpf_logger(bpf: &mut Ebpf) {
    if let Err(e) = EbpfLogger::init(bpf) {
        warn!("Failed to initialize eBPF logger: {e}");
    }
}

/// Write the queue-tracking flag into the kernel CONFIG map.
///
/// Must happen before any probe is attached so the issue probe never
/// observes a half-configured session.
///
/// # Errors
/// Returns an error if the CONFIG map is missing or cannot be written
pub fn configure_queue_tracking(bpf: &mut Ebpf, enabled: bool) -> Result<(), TraceError> {
    let mut config: HashMap<_, u32, u64> =
        HashMap::try_from(bpf.map_mut("CONFIG").ok_or(TraceError::MapNotFound("CONFIG"))?)?;
    config.insert(CONFIG_QUEUE_TRACKING, u64::from(enabled), 0)?;
    info!("✓ Queue tracking: {}", if enabled { "on" } else { "off" });
    Ok(())
}

/// Attach the three block I/O kprobes.
///
/// The dispatch program is attached to both dispatch symbols when the legacy
/// one exists; recording is idempotent under double attachment because the
/// dispatch table overwrites on insert.
///
/// # Errors
/// Returns an error if any program is missing, fails to load, or fails to
/// attach to its kernel symbol
pub fn attach_block_probes(bpf: &mut Ebpf, plan: &AttachPlan) -> Result<(), TraceError> {
    attach_kprobe(bpf, ISSUE_PROGRAM, &[ISSUE_SYMBOL])?;

    let dispatch_symbols: &[&str] = if plan.legacy_dispatch {
        &[DISPATCH_SYMBOL, LEGACY_DISPATCH_SYMBOL]
    } else {
        &[DISPATCH_SYMBOL]
    };
    attach_kprobe(bpf, DISPATCH_PROGRAM, dispatch_symbols)?;

    attach_kprobe(bpf, COMPLETION_PROGRAM, &[COMPLETION_SYMBOL])?;

    Ok(())
}

/// Load one kprobe program and attach it to every given kernel symbol.
fn attach_kprobe(
    bpf: &mut Ebpf,
    program_name: &'static str,
    symbols: &[&str],
) -> Result<(), TraceError> {
    let program: &mut KProbe = bpf
        .program_mut(program_name)
        .ok_or(TraceError::ProgramNotFound(program_name))?
        .try_into()?;
    program.load()?;

    for symbol in symbols {
        program.attach(symbol, 0).map_err(|e| TraceError::ProbeAttachFailed {
            probe: program_name.to_string(),
            symbol: (*symbol).to_string(),
            error: e.to_string(),
        })?;
        info!("✓ Attached kprobe: {symbol}");
    }

    Ok(())
}
