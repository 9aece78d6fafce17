//! The itops-alert service.
//!
//! Wires the correlation engines of `itops_alert_core` to their backends,
//! serves the HTTP API and supervises everything under one cancellation
//! token. `main.rs` only parses flags and reports errors.

pub mod api;
pub mod cli;
pub mod error;
pub mod supervisor;
pub mod telemetry;
