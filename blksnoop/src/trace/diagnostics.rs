//! Exit diagnostics from kernel-side counters

use anyhow::{Context, Result};
use aya::maps::HashMap;
use aya::Ebpf;
use log::warn;

/// Print event-channel diagnostics at session end:
/// - records dropped because the channel was full (drop-newest policy)
/// - completions whose dispatch was never observed (missed tracing)
///
/// # Errors
/// Returns an error if the counter maps cannot be accessed
pub fn print_channel_diagnostics(bpf: &Ebpf) -> Result<()> {
    let dropped = read_counter(bpf, "EVENTS_DROPPED")?;
    let missed = read_counter(bpf, "MISSED_DISPATCHES")?;

    if dropped > 0 {
        warn!("{dropped} completion records dropped on a full event channel");
    }
    eprintln!("channel: dropped={dropped} missed_dispatch={missed}");

    Ok(())
}

/// Read a single-entry counter map; 0 when the probe never bumped it
fn read_counter(bpf: &Ebpf, name: &str) -> Result<u64> {
    let map: HashMap<_, u32, u64> =
        HashMap::try_from(bpf.map(name).with_context(|| format!("{name} map not found"))?)?;
    Ok(map.get(&0u32, 0).unwrap_or(0))
}
