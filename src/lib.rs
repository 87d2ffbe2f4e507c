//! Decode firmware telemetry buffers using a schema loaded at runtime.
//!
//! Two schema flavors are supported:
//! * [`event_trace`]: fixed-size records of a timestamp and a combined
//!   event-id/payload word
//! * [`firmware_log`]: variable-size log messages, either back-to-back or
//!   framed by magic bytes for ring buffers read at an arbitrary rotation point

pub mod bits;
pub mod event_trace;
pub mod firmware_log;
pub mod types;
