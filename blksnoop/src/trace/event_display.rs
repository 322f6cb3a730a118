// Time conversions intentionally lose precision for display purposes
#![allow(clippy::cast_precision_loss)]

//! Fixed-width display rows for completed I/O
//!
//! A pure projection of [`IoEvent`] to text; all state (the session
//! baseline) lives in the event processor.

use blksnoop_common::IoEvent;

/// Column header row. The QUE(ms) column appears only with queue tracking.
#[must_use]
pub fn header_row(queue_tracking: bool) -> String {
    let mut row = format!(
        "{:<11} {:<14} {:<6} {:<10} {:<7} {:<1} {:<22} {:<7}",
        "TIME(s)", "COMM", "PID", "inodeID", "DISK", "T", "SECTOR", "BYTES"
    );
    if queue_tracking {
        row.push_str(&format!("{:>7} ", "QUE(ms)"));
    }
    row.push_str(&format!("{:>7}", "LAT(ms)"));
    row
}

/// Project one completion record to its display row.
///
/// `baseline_us` is the session time origin (the first record's timestamp);
/// the TIME(s) column shows seconds since then. Latency and queue delay are
/// shown in milliseconds with two decimals.
#[must_use]
pub fn format_event_row(event: &IoEvent, baseline_us: u64, queue_tracking: bool) -> String {
    let relative_s = event.timestamp_us.saturating_sub(baseline_us) as f64 / 1_000_000.0;
    let direction = if event.write != 0 { 'W' } else { 'R' };

    let mut row = format!(
        "{:<11.6} {:<14.14} {:<6} {:<10} {:<7} {:<1} {:<22} {:<7}",
        relative_s,
        fixed_str(&event.comm),
        event.pid,
        event.inode_id,
        fixed_str(&event.disk_name),
        direction,
        event.sector,
        event.byte_len,
    );
    if queue_tracking {
        row.push_str(&format!("{:>7.2} ", event.queue_delay_ns as f64 / 1_000_000.0));
    }
    row.push_str(&format!("{:>7.2}", event.latency_ns as f64 / 1_000_000.0));
    row
}

/// View a NUL-padded fixed-width byte field as text, lossy on invalid UTF-8.
#[must_use]
pub fn fixed_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use blksnoop_common::{DISK_NAME_LEN, TASK_COMM_LEN};

    fn sample_event() -> IoEvent {
        let mut comm = [0u8; TASK_COMM_LEN];
        comm[..4].copy_from_slice(b"dd\0\0");
        let mut disk_name = [0u8; DISK_NAME_LEN];
        disk_name[..4].copy_from_slice(b"sda\0");
        IoEvent {
            timestamp_us: 2_000_000,
            inode_id: 42,
            sector: 2048,
            byte_len: 4096,
            latency_ns: 1_500_000,
            queue_delay_ns: 250_000,
            pid: 1234,
            write: 0,
            comm,
            disk_name,
        }
    }

    #[test]
    fn test_header_has_queue_column_only_when_enabled() {
        assert!(!header_row(false).contains("QUE(ms)"));
        assert!(header_row(true).contains("QUE(ms)"));
        assert!(header_row(false).ends_with("LAT(ms)"));
    }

    #[test]
    fn test_row_relative_time_and_latency() {
        let row = format_event_row(&sample_event(), 2_000_000, false);
        assert!(row.starts_with("0.000000"));
        // 1_500_000 ns = 1.50 ms
        assert!(row.ends_with("   1.50"));
    }

    #[test]
    fn test_row_one_second_after_baseline() {
        let row = format_event_row(&sample_event(), 1_000_000, false);
        assert!(row.starts_with("1.000000"));
    }

    #[test]
    fn test_queue_column_inserted_before_latency() {
        let row = format_event_row(&sample_event(), 2_000_000, true);
        // 250_000 ns = 0.25 ms queue delay, then 1.50 ms latency
        assert!(row.ends_with("   0.25    1.50"));
    }

    #[test]
    fn test_direction_char() {
        let mut event = sample_event();
        assert!(format_event_row(&event, 0, false).contains(" R "));
        event.write = 1;
        assert!(format_event_row(&event, 0, false).contains(" W "));
    }

    #[test]
    fn test_long_comm_is_truncated_to_column() {
        let mut event = sample_event();
        event.comm = *b"averylongprocess";
        let row = format_event_row(&event, 2_000_000, false);
        assert!(row.contains("averylongproce"));
        assert!(!row.contains("averylongproces"));
    }

    #[test]
    fn test_fixed_str_stops_at_nul() {
        assert_eq!(fixed_str(b"sda\0\0\0"), "sda");
        assert_eq!(fixed_str(b"?"), "?");
        assert_eq!(fixed_str(&[0u8; 8]), "");
    }
}
