//! Panorama Capture Engine
//!
//! Drives an external media framework to composite every monitor onto one
//! canvas and record it to a file or stream it over RTMP.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                   PipelineSession                    │
//! │  ┌──────────┐  ┌──────────────┐  ┌────────────────┐  │
//! │  │ Canvas   │  │ Bitrate      │  │ OutputProfile  │  │
//! │  │ layout   │  │ planner      │  │ (record/stream)│  │
//! │  └────┬─────┘  └──────┬───────┘  └───────┬────────┘  │
//! │       ▼               ▼                  ▼           │
//! │  ┌────────────────────────────────────────────────┐  │
//! │  │      Framework (GStreamer / simulated)         │  │
//! │  │  scene  sources  encoders  service  output     │  │
//! │  └────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────┘
//!            ▲
//!            │ start / stop (streaming only)
//!   StreamController ◄── control thread ◄── keyboard
//! ```

pub mod backend;
pub mod bitrate;
pub mod fallback;
pub mod framework;
pub mod handle;
pub mod pipeline;
pub mod profile;
pub mod runner;
pub mod session;
pub mod settings;
pub mod streaming;

pub use backend::{get_backend, BackendKind};
pub use bitrate::{plan_bitrate, BitratePolicy};
pub use framework::{Framework, OutputStats};
pub use profile::{OutputProfile, OutputTarget};
pub use runner::{run_recording, run_streaming, RunSummary};
pub use session::*;
pub use settings::Settings;
pub use streaming::{
    run_control_loop, ControlCommand, KeySource, QuitSignal, ScriptedKeys, StreamController,
    TerminalKeys,
};
