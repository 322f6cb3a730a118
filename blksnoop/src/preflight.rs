//! Pre-flight checks for blksnoop
//!
//! Validates system requirements before attempting to load eBPF programs.
//! Provides clear, actionable error messages when requirements aren't met.

#![allow(unsafe_code)] // geteuid() requires unsafe

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::trace::ebpf_setup::{
    COMPLETION_SYMBOL, DISPATCH_SYMBOL, ISSUE_SYMBOL, LEGACY_DISPATCH_SYMBOL,
};

/// Minimum kernel version for the eBPF ring buffer used as the event channel
const MIN_KERNEL_VERSION: (u32, u32) = (5, 8);

const KALLSYMS_PATH: &str = "/proc/kallsyms";

/// Which dispatch symbols to attach, decided from `/proc/kallsyms`.
#[derive(Debug, Clone, Copy)]
pub struct AttachPlan {
    /// Also attach the legacy single-queue dispatch symbol. Absent from
    /// kernels that dropped the single-queue I/O path; dispatch recording is
    /// idempotent when both symbols fire.
    pub legacy_dispatch: bool,
}

/// Run all pre-flight checks before eBPF loading
pub fn run_preflight_checks() -> Result<AttachPlan> {
    check_privileges()?;
    check_kernel_version()?;
    check_kprobe_symbols(Path::new(KALLSYMS_PATH))
}

/// Check if running with sufficient privileges for eBPF
fn check_privileges() -> Result<()> {
    if unsafe { libc::geteuid() } == 0 {
        return Ok(());
    }

    // Not root - CAP_BPF + CAP_PERFMON would also do on 5.8+, but kprobe
    // attachment needs CAP_SYS_ADMIN on most distributions anyway
    bail!(
        "Permission denied: blksnoop requires root privileges to load eBPF programs.\n\n\
         Run with: sudo blksnoop ..."
    );
}

/// Check if the kernel version is sufficient for eBPF features
fn check_kernel_version() -> Result<()> {
    let version_str = std::fs::read_to_string("/proc/version")
        .context("Failed to read kernel version from /proc/version")?;

    // Parse version like "Linux version 5.15.0-generic ..." or "Linux version 6.1.0-arch1-1 ..."
    let release = version_str.split_whitespace().nth(2).unwrap_or("unknown");

    let version_parts: Vec<&str> = release.split('.').collect();
    if version_parts.len() < 2 {
        // Can't parse, assume it's fine
        return Ok(());
    }

    let major: u32 = version_parts[0].parse().unwrap_or(0);
    let minor: u32 = version_parts[1]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .unwrap_or(0);

    if (major, minor) < MIN_KERNEL_VERSION {
        bail!(
            "Kernel version {}.{} is too old.\n\n\
             blksnoop requires Linux {}.{} or newer for eBPF ring buffer support.\n\
             Current kernel: {}",
            major,
            minor,
            MIN_KERNEL_VERSION.0,
            MIN_KERNEL_VERSION.1,
            release
        );
    }

    Ok(())
}

/// Check that the block I/O accounting symbols this tool probes actually
/// exist on this kernel, and decide whether the legacy dispatch symbol is
/// worth attaching.
pub fn check_kprobe_symbols(kallsyms_path: &Path) -> Result<AttachPlan> {
    let kallsyms = std::fs::read_to_string(kallsyms_path)
        .with_context(|| format!("Failed to read {}", kallsyms_path.display()))?;

    for required in [ISSUE_SYMBOL, DISPATCH_SYMBOL, COMPLETION_SYMBOL] {
        if !symbol_present(&kallsyms, required) {
            bail!(
                "Kernel symbol {required} not found in {}.\n\n\
                 blksnoop attaches kprobes to the block I/O accounting path;\n\
                 this kernel does not expose it under the expected name.",
                kallsyms_path.display()
            );
        }
    }

    Ok(AttachPlan { legacy_dispatch: symbol_present(&kallsyms, LEGACY_DISPATCH_SYMBOL) })
}

// kallsyms rows are "address type name [module]"
fn symbol_present(kallsyms: &str, symbol: &str) -> bool {
    kallsyms.lines().any(|line| line.split_whitespace().nth(2) == Some(symbol))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FAKE_KALLSYMS: &str = "\
ffffffff81000000 T _stext
ffffffff814cd630 T blk_account_io_start
ffffffff814cd8a0 T blk_mq_start_request
ffffffff814cdc10 T blk_account_io_done
ffffffff81e00000 t some_local_symbol\n";

    #[test]
    fn test_symbol_present() {
        assert!(symbol_present(FAKE_KALLSYMS, "blk_mq_start_request"));
        assert!(!symbol_present(FAKE_KALLSYMS, "blk_start_request"));
        // Prefix of a real symbol must not match
        assert!(!symbol_present(FAKE_KALLSYMS, "blk_account_io"));
    }

    #[test]
    fn test_plan_without_legacy_dispatch() {
        let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(FAKE_KALLSYMS.as_bytes()).expect("Failed to write kallsyms");

        let plan = check_kprobe_symbols(file.path()).expect("Preflight should pass");
        assert!(!plan.legacy_dispatch);
    }

    #[test]
    fn test_plan_with_legacy_dispatch() {
        let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(FAKE_KALLSYMS.as_bytes()).expect("Failed to write kallsyms");
        file.write_all(b"ffffffff814cd700 T blk_start_request\n")
            .expect("Failed to write kallsyms");

        let plan = check_kprobe_symbols(file.path()).expect("Preflight should pass");
        assert!(plan.legacy_dispatch);
    }

    #[test]
    fn test_missing_required_symbol_fails() {
        let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(b"ffffffff81000000 T _stext\n").expect("Failed to write kallsyms");

        let err = check_kprobe_symbols(file.path()).unwrap_err();
        assert!(err.to_string().contains("blk_account_io_start"));
    }
}
