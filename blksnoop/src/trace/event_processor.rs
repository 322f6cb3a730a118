//! # Event Processing
//!
//! Consumes completion records from the eBPF ring buffer and turns them into
//! display rows.
//!
//! The first record observed establishes the session time origin; every
//! later row reports seconds since then. The processor also keeps per-session
//! counters for the exit summary.

use blksnoop_common::IoEvent;
use log::warn;

use super::event_display::format_event_row;

/// Encapsulates record decoding, the session baseline, and counters
pub struct EventProcessor {
    // Configuration
    queue_tracking: bool,

    // Session time origin, fixed by the first record observed
    baseline_us: Option<u64>,

    // Mutable state
    pub event_count: usize,
    pub read_count: usize,
    pub write_count: usize,
    /// Ring items too short to hold a record (should never happen)
    pub truncated_records: usize,
}

impl EventProcessor {
    /// Create a new event processor
    #[must_use]
    pub fn new(queue_tracking: bool) -> Self {
        Self {
            queue_tracking,
            baseline_us: None,
            event_count: 0,
            read_count: 0,
            write_count: 0,
            truncated_records: 0,
        }
    }

    /// Decode one raw ring-buffer item and print its display row
    pub fn handle_record(&mut self, bytes: &[u8]) {
        if bytes.len() < std::mem::size_of::<IoEvent>() {
            warn!("Received incomplete event ({} bytes)", bytes.len());
            self.truncated_records += 1;
            return;
        }

        // SAFETY: We verified the buffer size matches IoEvent, and the eBPF
        // program writes valid IoEvent data
        #[allow(unsafe_code)]
        let event = unsafe { std::ptr::read_unaligned(bytes.as_ptr().cast::<IoEvent>()) };

        let row = self.render(&event);
        println!("{row}");
    }

    /// Project one record to its display row, establishing the session
    /// baseline from the first record seen
    pub fn render(&mut self, event: &IoEvent) -> String {
        let baseline_us = *self.baseline_us.get_or_insert(event.timestamp_us);

        self.event_count += 1;
        if event.write != 0 {
            self.write_count += 1;
        } else {
            self.read_count += 1;
        }

        format_event_row(event, baseline_us, self.queue_tracking)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_at(timestamp_us: u64) -> IoEvent {
        IoEvent { timestamp_us, latency_ns: 1_000_000, ..IoEvent::default() }
    }

    #[test]
    fn test_first_record_sets_baseline() {
        let mut processor = EventProcessor::new(false);
        let row = processor.render(&event_at(987_654_321));
        assert!(row.starts_with("0.000000"));
    }

    #[test]
    fn test_relative_time_is_monotonic() {
        let mut processor = EventProcessor::new(false);
        processor.render(&event_at(1_000_000));
        let second = processor.render(&event_at(1_500_000));
        let third = processor.render(&event_at(4_000_000));
        assert!(second.starts_with("0.500000"));
        assert!(third.starts_with("3.000000"));
    }

    #[test]
    fn test_counters_track_direction() {
        let mut processor = EventProcessor::new(false);
        processor.render(&event_at(1));
        let mut write = event_at(2);
        write.write = 1;
        processor.render(&write);
        assert_eq!(processor.event_count, 2);
        assert_eq!(processor.read_count, 1);
        assert_eq!(processor.write_count, 1);
    }

    #[test]
    fn test_short_item_is_counted_not_rendered() {
        let mut processor = EventProcessor::new(false);
        processor.handle_record(&[0u8; 4]);
        assert_eq!(processor.truncated_records, 1);
        assert_eq!(processor.event_count, 0);
    }
}
