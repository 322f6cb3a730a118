//! # blksnoop - Block I/O Latency Snooper
//!
//! Attributes block-device I/O latency to the issuing process by correlating
//! three kernel instrumentation points over the lifetime of each request,
//! then streams one latency record per completed I/O to a live display.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    eBPF Programs (Kernel)                    │
//! │  blk_account_io_start ─▶ ATTRIBUTIONS {pid, comm, inode}     │
//! │  blk_mq_start_request ─▶ DISPATCHES   {timestamp, length}    │
//! │  blk_account_io_done  ─▶ correlate ─▶ IoEvent ─▶ ring buffer │
//! └───────────────────────────────┬──────────────────────────────┘
//!                                 │ ring buffer events
//!                                 ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                   blksnoop (This Crate)                      │
//! │  consumer loop ─▶ EventProcessor ─▶ fixed-width display rows │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`cli`]: Command-line argument parsing
//! - [`preflight`]: Privilege, kernel-version and kernel-symbol checks run
//!   before any eBPF is loaded
//! - [`trace`]: The tracing pipeline
//!   - `ebpf_setup`: Load the embedded bytecode, push config, attach kprobes
//!   - `event_processor`: Decode ring-buffer records, keep the session
//!     baseline, count what went by
//!   - `event_display`: Project records to fixed-width text rows
//!   - `diagnostics`: Surface kernel-side drop/miss counters at exit
//! - [`domain`]: Structured error types
//!
//! ## Typical Usage
//!
//! ```bash
//! # Trace all block I/O
//! sudo blksnoop
//!
//! # Include OS queued time between issue and dispatch
//! sudo blksnoop -Q
//! ```

// Expose modules for testing
pub mod cli;
pub mod domain;
pub mod preflight;
pub mod trace;
