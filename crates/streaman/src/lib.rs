//! Streaman - record live streams from a browser
//!
//! Library exposing the HTTP surface for testing and reuse; the binary wires
//! it to configuration, telemetry and signal handling.

pub mod files;
pub mod page;
pub mod telemetry;
pub mod web;
