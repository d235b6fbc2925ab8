//! Shared helpers for integration tests.

pub mod log_capture;
