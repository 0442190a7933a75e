//! Panorama Desktop Platform Integration
//!
//! OS-facing pieces that sit below the capture engine:
//! - **Display Enumeration:** active monitors with virtual-desktop geometry
//! - **Capabilities:** install-location and session checks with user guidance

pub mod capabilities;
pub mod display;

pub use display::*;
