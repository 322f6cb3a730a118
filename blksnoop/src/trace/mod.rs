//! Tracing pipeline
//!
//! The userspace half of the correlation engine:
//! - eBPF program loading, configuration and kprobe attachment
//! - Event consumption from the kernel ring buffer
//! - Display-row projection with a session-relative time baseline
//! - Exit diagnostics from kernel-side counters

pub mod diagnostics;
pub mod ebpf_setup;
pub mod event_display;
pub mod event_processor;

// Re-export common entry points
pub use diagnostics::print_channel_diagnostics;
pub use ebpf_setup::{
    attach_block_probes, configure_queue_tracking, init_ebpf_logger, load_ebpf_program,
};
pub use event_display::{format_event_row, header_row};
pub use event_processor::EventProcessor;
