//! Domain model for blksnoop
//!
//! Structured error types for the tracing pipeline.

pub mod errors;

pub use errors::TraceError;
