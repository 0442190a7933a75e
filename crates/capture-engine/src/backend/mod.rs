//! Framework backends.

use std::sync::Arc;

use crate::framework::Framework;

pub mod gst;
pub mod simulated;

pub use gst::{probe_runtime, GstFramework, RuntimeProbe, REQUIRED_FACTORIES};
pub use simulated::{Faults, SimulatedFramework};

/// Which backend to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    GStreamer,
    /// In-memory rehearsal; nothing is captured or written.
    Simulated,
}

/// Construct the backend.
pub fn get_backend(kind: BackendKind) -> Arc<dyn Framework> {
    match kind {
        BackendKind::GStreamer => Arc::new(GstFramework::new()),
        BackendKind::Simulated => Arc::new(SimulatedFramework::new()),
    }
}
