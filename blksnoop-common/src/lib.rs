//! # Shared Data Structures (eBPF ↔ Userspace)
//!
//! Types and logic shared between the kernel-side probes and the userspace
//! consumer. All boundary-crossing types use `#[repr(C)]` for a consistent
//! memory layout on both sides.
//!
//! ## Key Types
//!
//! - [`Attribution`] - Issuing-process context, recorded when I/O accounting
//!   starts for a request
//! - [`DispatchInfo`] - Timestamp and payload length, recorded when the
//!   request enters hardware dispatch
//! - [`IoEvent`] - One completed I/O, passed to userspace via ring buffer
//!
//! The record-construction step of the completion probe ([`fill_completion`])
//! and the read/write classification ([`is_write`]) live here rather than in
//! the eBPF crate so the userspace test suite can exercise them directly.

#![no_std]

/// Fixed width of a process name, matching the kernel's `TASK_COMM_LEN`.
pub const TASK_COMM_LEN: usize = 16;

/// Fixed width of a disk name, matching the kernel's `DISK_NAME_LEN`.
pub const DISK_NAME_LEN: usize = 32;

/// Opaque per-request correlation key: the kernel `struct request *` value.
///
/// Valid only while the I/O request is in-flight; never dereferenced in
/// userspace. Used purely as the lookup key for the attribution and dispatch
/// tables.
pub type RequestRef = u64;

// ============================================================================
// CONFIG map keys
// ============================================================================

/// CONFIG map key: queue-time tracking enabled (0 = off, 1 = on).
///
/// Written once by userspace before the probes are attached. When off, the
/// issue probe skips its timestamp capture entirely and every emitted event
/// carries `queue_delay_ns == 0`.
pub const CONFIG_QUEUE_TRACKING: u32 = 0;

// ============================================================================
// cmd_flags write-test layouts
// ============================================================================

/// Dedicated write bit in pre-4.8 `cmd_flags` layouts (`legacy-write-flag`).
pub const REQ_WRITE: u64 = 1;

/// Bit position of the op-code field in the 4.8-era shifted layout
/// (`shifted-op`): 3 op bits at the top of a 64-bit flags word.
pub const REQ_OP_SHIFT: u64 = 61;

/// Low-byte op-code mask in the modern `cmd_flags` layout (default).
pub const REQ_OP_MASK: u64 = 0xff;

/// Op code for a write request (same value in the shifted and masked layouts).
pub const REQ_OP_WRITE: u64 = 1;

#[cfg(all(feature = "legacy-write-flag", feature = "shifted-op"))]
compile_error!(
    "features `legacy-write-flag` and `shifted-op` select mutually exclusive cmd_flags layouts"
);

/// Classify a request as a write from its `cmd_flags` word.
///
/// The active flag layout is selected at build time via cargo features;
/// exactly one of the three historical encodings is compiled in. A request
/// that is not a write under the active encoding is a read - there is no
/// third category.
#[cfg(feature = "legacy-write-flag")]
#[must_use]
pub fn is_write(cmd_flags: u64) -> bool {
    cmd_flags & REQ_WRITE != 0
}

#[cfg(feature = "shifted-op")]
#[must_use]
pub fn is_write(cmd_flags: u64) -> bool {
    (cmd_flags >> REQ_OP_SHIFT) == REQ_OP_WRITE
}

#[cfg(not(any(feature = "legacy-write-flag", feature = "shifted-op")))]
#[must_use]
pub fn is_write(cmd_flags: u64) -> bool {
    cmd_flags & REQ_OP_MASK == REQ_OP_WRITE
}

// ============================================================================
// Boundary-crossing records
// ============================================================================

/// Issuing-process context for one in-flight request.
///
/// Written by the issue probe (`blk_account_io_start`), read and deleted by
/// the completion probe. At most one exists per live request; a re-insert for
/// the same key overwrites.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Attribution {
    /// Inode number of the backing file, 0 if unresolvable.
    pub inode_id: u64,

    /// `bpf_ktime_get_ns()` at issue time; 0 when queue tracking is disabled.
    pub queued_at_ns: u64,

    /// Issuing process id (TGID).
    pub pid: u32,

    /// Process name, NUL-padded. Empty when `bpf_get_current_comm` fails.
    pub comm: [u8; TASK_COMM_LEN],

    #[allow(clippy::pub_underscore_fields)]
    pub _padding: [u8; 4],
}

/// Dispatch-time state for one in-flight request.
///
/// Written by the dispatch probe. A request may dispatch more than once
/// (retries, or both dispatch symbols attached); the latest write wins, which
/// is the behavior we want - latency is measured from the dispatch that was
/// actually serviced.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct DispatchInfo {
    /// `bpf_ktime_get_ns()` when the request entered hardware dispatch.
    pub dispatched_at_ns: u64,

    /// Request payload size in bytes. Captured here because `__data_len` is
    /// only stable at dispatch time, not at issue time.
    pub byte_len: u64,
}

/// One completed block I/O, sent to userspace via the ring buffer.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct IoEvent {
    /// Absolute completion time in microseconds (monotonic clock).
    pub timestamp_us: u64,

    /// Inode number of the backing file, 0 if unknown.
    pub inode_id: u64,

    /// Starting sector of the request.
    pub sector: u64,

    /// Payload size in bytes, from the dispatch record.
    pub byte_len: u64,

    /// Completion time minus dispatch time.
    pub latency_ns: u64,

    /// Dispatch time minus issue time; 0 unless queue tracking is enabled
    /// and the request was attributed.
    pub queue_delay_ns: u64,

    /// Issuing process id, 0 when attribution was missed.
    pub pid: u32,

    /// 1 for a write, 0 for a read.
    pub write: u32,

    /// Issuing process name; `"?"` when attribution was missed.
    pub comm: [u8; TASK_COMM_LEN],

    /// Device name, zeroed when attribution was missed.
    pub disk_name: [u8; DISK_NAME_LEN],
}

impl Default for IoEvent {
    fn default() -> Self {
        Self {
            timestamp_us: 0,
            inode_id: 0,
            sector: 0,
            byte_len: 0,
            latency_ns: 0,
            queue_delay_ns: 0,
            pid: 0,
            write: 0,
            comm: [0; TASK_COMM_LEN],
            disk_name: [0; DISK_NAME_LEN],
        }
    }
}

/// Fields the completion probe reads from the live request object.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RequestFields {
    /// `request.__sector` at completion time.
    pub sector: u64,

    /// `request.cmd_flags` at completion time.
    pub cmd_flags: u64,

    /// `request.rq_disk->disk_name`; zeroed when unread.
    pub disk_name: [u8; DISK_NAME_LEN],
}

/// Build a completion record from the two table lookups plus live request
/// state.
///
/// `attribution == None` is the degraded path: the record is still emitted
/// (timing data is meaningful without attribution) but carries placeholder
/// identity fields (`pid = 0`, `comm = "?"`, zeroed inode and disk name).
/// `byte_len` always comes from the dispatch record, in both paths.
///
/// The missing-dispatch guard is NOT here: a completion with no dispatch
/// record never reaches record construction at all.
pub fn fill_completion(
    event: &mut IoEvent,
    dispatch: &DispatchInfo,
    attribution: Option<&Attribution>,
    req: &RequestFields,
    now_ns: u64,
    queue_tracking: bool,
) {
    event.timestamp_us = now_ns / 1000;
    event.latency_ns = now_ns.saturating_sub(dispatch.dispatched_at_ns);
    event.byte_len = dispatch.byte_len;
    event.sector = req.sector;
    event.write = u32::from(is_write(req.cmd_flags));

    match attribution {
        Some(attr) => {
            event.pid = attr.pid;
            event.inode_id = attr.inode_id;
            event.comm = attr.comm;
            event.disk_name = req.disk_name;
            // queued_at_ns == 0 means the timestamp was never captured
            event.queue_delay_ns = if queue_tracking && attr.queued_at_ns > 0 {
                dispatch.dispatched_at_ns.saturating_sub(attr.queued_at_ns)
            } else {
                0
            };
        }
        None => {
            event.pid = 0;
            event.inode_id = 0;
            event.comm = [0; TASK_COMM_LEN];
            event.comm[0] = b'?';
            event.disk_name = [0; DISK_NAME_LEN];
            event.queue_delay_ns = 0;
        }
    }
}

#[cfg(feature = "user")]
use aya::Pod;

// These unsafe impls are required for eBPF <-> userspace communication
// Pod trait ensures types can be safely transmitted as plain bytes
#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for Attribution {}

#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for DispatchInfo {}

#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for IoEvent {}
