//! Panorama Common Utilities
//!
//! Shared infrastructure for all Panorama crates:
//! - Error types and result aliases
//! - Polling schedules and run clocks
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
