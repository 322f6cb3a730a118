//! Structured error types for blksnoop
//!
//! Using thiserror for automatic Display implementation and error chaining.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("eBPF program {0} not found in loaded object")]
    ProgramNotFound(&'static str),

    #[error("Failed to attach {probe} to kernel symbol {symbol}: {error}")]
    ProbeAttachFailed { probe: String, symbol: String, error: String },

    #[error("eBPF map {0} not found")]
    MapNotFound(&'static str),

    #[error(transparent)]
    Program(#[from] aya::programs::ProgramError),

    #[error(transparent)]
    Map(#[from] aya::maps::MapError),

    #[error(transparent)]
    Aya(#[from] aya::EbpfError),
}
