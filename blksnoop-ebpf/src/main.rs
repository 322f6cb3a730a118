//! # eBPF Kernel-Side Instrumentation
//!
//! The three kprobes that follow one block I/O request from issue to
//! completion:
//!
//! - `blksnoop_io_start` - `blk_account_io_start`: record who issued the I/O
//! - `blksnoop_io_dispatch` - `blk_mq_start_request` (and the legacy
//!   `blk_start_request` where it exists): record when it entered dispatch
//!   and how big it was
//! - `blksnoop_io_done` - `blk_account_io_done`: correlate, emit one
//!   [`IoEvent`], clear both table entries
//!
//! All three may fire concurrently for different requests; for one request
//! the kernel's own lifecycle orders them. No probe ever blocks: map
//! operations are per-key atomic and a full ring buffer drops the newest
//! record instead of stalling the completion path.
//!
//! ## Build
//!
//! ```bash
//! cargo xtask build-ebpf --release
//! ```

#![no_std]
#![no_main]

use aya_ebpf::{
    helpers::{
        bpf_get_current_comm, bpf_get_current_pid_tgid, bpf_ktime_get_ns, bpf_probe_read_kernel,
    },
    macros::{kprobe, map},
    maps::{HashMap, RingBuf},
    programs::ProbeContext,
};
use blksnoop_common::{
    fill_completion, Attribution, DispatchInfo, IoEvent, RequestFields, RequestRef,
    CONFIG_QUEUE_TRACKING, DISK_NAME_LEN, TASK_COMM_LEN,
};

// ============================================================================
// Kernel struct field offsets
// ============================================================================
//
// Best-effort offsets for x86_64, ~5.10 era. Kernel version dependent; a
// failed or nonsensical read degrades the affected field to zero rather than
// aborting the probe.

/// `struct request`: after the three queue pointers.
const RQ_CMD_FLAGS_OFFSET: u64 = 24;
/// `struct request.__data_len`
const RQ_DATA_LEN_OFFSET: u64 = 40;
/// `struct request.__sector`
const RQ_SECTOR_OFFSET: u64 = 48;
/// `struct request.bio`
const RQ_BIO_OFFSET: u64 = 56;
/// `struct request.rq_disk`
const RQ_DISK_OFFSET: u64 = 176;
/// `struct bio.bi_bdev`
const BIO_BDEV_OFFSET: u64 = 8;
/// `struct block_device.bd_inode`
const BDEV_INODE_OFFSET: u64 = 48;
/// `struct inode.i_ino`
const INODE_INO_OFFSET: u64 = 64;
/// `struct gendisk.disk_name` (after major/first_minor/minors)
const GENDISK_NAME_OFFSET: u64 = 12;

/// In-flight request ceiling for both correlation tables.
const MAX_IN_FLIGHT: u32 = 10240;

// ============================================================================
// eBPF Maps - Shared data structures between kernel and userspace
// ============================================================================

/// Attribution Table: request -> issuing-process context.
///
/// Written at `blk_account_io_start`, deleted at completion. At most one
/// entry per live request; insert overwrites.
#[map]
static ATTRIBUTIONS: HashMap<RequestRef, Attribution> =
    HashMap::with_max_entries(MAX_IN_FLIGHT, 0);

/// Dispatch Table: request -> {dispatch timestamp, payload length}.
///
/// Written at dispatch, deleted at completion. Insert overwrites, which makes
/// dispatch recording idempotent when both dispatch symbols are attached.
#[map]
static DISPATCHES: HashMap<RequestRef, DispatchInfo> =
    HashMap::with_max_entries(MAX_IN_FLIGHT, 0);

/// Event channel: completed I/O records to userspace.
///
/// 64 pages. Bounded; when full the completion probe drops the newest record
/// and counts it in `EVENTS_DROPPED`.
#[map]
static EVENTS: RingBuf = RingBuf::with_byte_size(256 * 1024, 0);

/// Config passed from userspace without recompiling eBPF.
///
/// - **Key 0**: queue-time tracking (0 = off, 1 = on)
#[map]
static CONFIG: HashMap<u32, u64> = HashMap::with_max_entries(16, 0);

/// Completion records dropped because the event channel was full.
#[map]
static EVENTS_DROPPED: HashMap<u32, u64> = HashMap::with_max_entries(1, 0);

/// Completions observed with no dispatch record (request predates tracing,
/// or its record was evicted). Not an error; nothing is emitted for these.
#[map]
static MISSED_DISPATCHES: HashMap<u32, u64> = HashMap::with_max_entries(1, 0);

// ============================================================================
// Probe entry points
// ============================================================================

/// Issue probe: cache PID, comm and backing inode by request.
#[kprobe]
pub fn blksnoop_io_start(ctx: ProbeContext) -> u32 {
    match try_io_start(&ctx) {
        Ok(ret) | Err(ret) => ret,
    }
}

/// Dispatch probe: snapshot timestamp and payload length by request.
#[kprobe]
pub fn blksnoop_io_dispatch(ctx: ProbeContext) -> u32 {
    match try_io_dispatch(&ctx) {
        Ok(ret) | Err(ret) => ret,
    }
}

/// Completion probe: correlate both tables, emit one record, clear state.
#[kprobe]
pub fn blksnoop_io_done(ctx: ProbeContext) -> u32 {
    match try_io_done(&ctx) {
        Ok(ret) | Err(ret) => ret,
    }
}

// ============================================================================
// Handlers
// ============================================================================

fn try_io_start(ctx: &ProbeContext) -> Result<u32, u32> {
    let req: RequestRef = ctx.arg(0).ok_or(1u32)?;

    // A failed comm resolution degrades to an empty name, never aborts
    let comm = bpf_get_current_comm().unwrap_or([0u8; TASK_COMM_LEN]);
    let pid = (bpf_get_current_pid_tgid() >> 32) as u32;
    let inode_id = read_inode_id(req).unwrap_or(0);

    // Timestamp capture is skipped entirely when queue tracking is off
    let queued_at_ns = if queue_tracking_enabled() { unsafe { bpf_ktime_get_ns() } } else { 0 };

    let attr = Attribution { inode_id, queued_at_ns, pid, comm, _padding: [0u8; 4] };
    ATTRIBUTIONS.insert(&req, &attr, 0).map_err(|_| 1u32)?;

    Ok(0)
}

fn try_io_dispatch(ctx: &ProbeContext) -> Result<u32, u32> {
    let req: RequestRef = ctx.arg(0).ok_or(1u32)?;

    // __data_len is only stable at dispatch time, so it is captured here
    // together with the timestamp rather than at issue
    let byte_len: u32 = unsafe {
        bpf_probe_read_kernel((req + RQ_DATA_LEN_OFFSET) as *const u32).map_err(|_| 1u32)?
    };

    let info = DispatchInfo {
        dispatched_at_ns: unsafe { bpf_ktime_get_ns() },
        byte_len: u64::from(byte_len),
    };
    DISPATCHES.insert(&req, &info, 0).map_err(|_| 1u32)?;

    Ok(0)
}

fn try_io_done(ctx: &ProbeContext) -> Result<u32, u32> {
    let req: RequestRef = ctx.arg(0).ok_or(1u32)?;

    let dispatch = match unsafe { DISPATCHES.get(&req) } {
        Some(d) => *d,
        None => {
            // Missed tracing: the request began before we attached. No
            // timing data, so nothing is emitted - but table entries must
            // not outlive the request.
            bump_counter(&MISSED_DISPATCHES);
            let _ = ATTRIBUTIONS.remove(&req);
            return Ok(0);
        }
    };

    let now = unsafe { bpf_ktime_get_ns() };
    let attribution = unsafe { ATTRIBUTIONS.get(&req) }.copied();

    let mut fields =
        RequestFields { sector: 0, cmd_flags: 0, disk_name: [0u8; DISK_NAME_LEN] };
    fields.sector = unsafe {
        bpf_probe_read_kernel((req + RQ_SECTOR_OFFSET) as *const u64).unwrap_or(0)
    };
    fields.cmd_flags = read_cmd_flags(req).unwrap_or(0);
    if attribution.is_some() {
        read_disk_name(req, &mut fields.disk_name);
    }

    let mut event = IoEvent::default();
    fill_completion(
        &mut event,
        &dispatch,
        attribution.as_ref(),
        &fields,
        now,
        queue_tracking_enabled(),
    );

    if EVENTS.output(&event, 0).is_err() {
        // Channel full: drop the newest record, never stall completion
        bump_counter(&EVENTS_DROPPED);
    }

    // The only place entries leave the tables outside full teardown
    let _ = DISPATCHES.remove(&req);
    let _ = ATTRIBUTIONS.remove(&req);

    Ok(0)
}

// ============================================================================
// Helpers
// ============================================================================

fn queue_tracking_enabled() -> bool {
    unsafe { CONFIG.get(&CONFIG_QUEUE_TRACKING) }.copied().unwrap_or(0) != 0
}

fn bump_counter(map: &HashMap<u32, u64>) {
    let key = 0u32;
    let current = unsafe { map.get(&key) }.copied().unwrap_or(0);
    let _ = map.insert(&key, &(current + 1), 0);
}

/// The 4.8-era shifted layout kept the op bits at the top of a 64-bit flags
/// word; every other layout fits in the low 32 bits.
#[cfg(feature = "shifted-op")]
#[inline(always)]
fn read_cmd_flags(req: RequestRef) -> Option<u64> {
    unsafe { bpf_probe_read_kernel((req + RQ_CMD_FLAGS_OFFSET) as *const u64) }.ok()
}

#[cfg(not(feature = "shifted-op"))]
#[inline(always)]
fn read_cmd_flags(req: RequestRef) -> Option<u64> {
    unsafe { bpf_probe_read_kernel((req + RQ_CMD_FLAGS_OFFSET) as *const u32) }
        .ok()
        .map(u64::from)
}

/// Resolve the backing inode number: `request -> bio -> bi_bdev -> bd_inode
/// -> i_ino`. Any failed or null step degrades to `None`.
#[inline(always)]
fn read_inode_id(req: RequestRef) -> Option<u64> {
    let bio: u64 = unsafe { bpf_probe_read_kernel((req + RQ_BIO_OFFSET) as *const u64) }.ok()?;
    if bio == 0 {
        return None;
    }

    let bdev: u64 =
        unsafe { bpf_probe_read_kernel((bio + BIO_BDEV_OFFSET) as *const u64) }.ok()?;
    if bdev == 0 {
        return None;
    }

    let inode: u64 =
        unsafe { bpf_probe_read_kernel((bdev + BDEV_INODE_OFFSET) as *const u64) }.ok()?;
    if inode == 0 {
        return None;
    }

    unsafe { bpf_probe_read_kernel((inode + INODE_INO_OFFSET) as *const u64) }.ok()
}

/// Read `request -> rq_disk -> disk_name`; leaves `name` zeroed on failure.
#[inline(always)]
fn read_disk_name(req: RequestRef, name: &mut [u8; DISK_NAME_LEN]) {
    let disk: u64 = match unsafe { bpf_probe_read_kernel((req + RQ_DISK_OFFSET) as *const u64) }
    {
        Ok(ptr) => ptr,
        Err(_) => return,
    };
    if disk == 0 {
        return;
    }

    if let Ok(read) = unsafe {
        bpf_probe_read_kernel((disk + GENDISK_NAME_OFFSET) as *const [u8; DISK_NAME_LEN])
    } {
        *name = read;
    }
}

#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
