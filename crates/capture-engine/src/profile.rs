//! Output profiles.
//!
//! A profile carries everything that differs between recording to a file
//! and streaming to an RTMP endpoint: which modules to load, which encoders
//! and outputs to try, the settings handed to each, and how long to wait
//! for the output to stop.

use std::path::PathBuf;
use std::time::Duration;

use panorama_common::clock::PollSchedule;
use panorama_common::config::{RecordingDefaults, StreamingDefaults};

use crate::bitrate::BitratePolicy;
use crate::framework::kinds;
use crate::settings::Settings;

/// Where encoded data goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    File { path: PathBuf },
    Rtmp { server: String, stream_key: String },
}

/// Reconnect behavior handed to a network output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconnect {
    pub retry_delay_secs: u32,
    pub max_retries: u32,
}

/// Full parameterization of one pipeline run.
#[derive(Debug, Clone)]
pub struct OutputProfile {
    pub target: OutputTarget,
    pub fps: u32,
    pub bitrate: BitratePolicy,
    pub audio_bitrate_kbps: u32,
    pub keyint_secs: Option<u32>,

    /// Plugin modules loaded explicitly during init, in order.
    pub modules: Vec<String>,

    /// Video encoder ids in priority order.
    pub video_encoders: Vec<String>,

    /// Audio encoder ids in priority order.
    pub audio_encoders: Vec<String>,

    /// Output type ids in priority order.
    pub outputs: Vec<String>,

    pub stop: PollSchedule,
    pub reconnect: Option<Reconnect>,

    /// Whether a failed `start` leaves the session ready for another try
    /// instead of tearing it down.
    pub retry_after_start_failure: bool,
}

impl OutputProfile {
    /// Record to `path` at the fixed recording frame rate.
    pub fn recording(path: impl Into<PathBuf>, defaults: &RecordingDefaults) -> Self {
        let mut modules = platform_capture_modules();
        modules.extend(["isomp4", "matroska"].map(String::from));

        Self {
            target: OutputTarget::File { path: path.into() },
            fps: defaults.fps,
            bitrate: BitratePolicy::new(
                defaults.base_bitrate_kbps,
                defaults.min_bitrate_kbps,
                defaults.max_bitrate_kbps,
            ),
            audio_bitrate_kbps: defaults.audio_bitrate_kbps,
            keyint_secs: None,
            modules,
            video_encoders: ["x264enc", "nvh264enc", "vah264enc", "amfh264enc"]
                .map(String::from)
                .to_vec(),
            audio_encoders: audio_encoder_candidates(),
            outputs: vec![
                kinds::MP4_OUTPUT.to_string(),
                kinds::MATROSKA_OUTPUT.to_string(),
            ],
            stop: PollSchedule::from_millis(defaults.stop_poll_interval_ms, defaults.stop_timeout_ms),
            reconnect: None,
            retry_after_start_failure: false,
        }
    }

    /// Stream to `server` with `stream_key`.
    ///
    /// `fps` and `bitrate_kbps` are clamped into the configured ranges.
    pub fn streaming(
        server: impl Into<String>,
        stream_key: impl Into<String>,
        fps: i64,
        bitrate_kbps: i64,
        defaults: &StreamingDefaults,
    ) -> Self {
        let mut modules = platform_capture_modules();
        modules.extend(["flv", "rtmp2", "rtmp"].map(String::from));

        Self {
            target: OutputTarget::Rtmp {
                server: server.into(),
                stream_key: stream_key.into(),
            },
            fps: defaults.clamp_fps(fps),
            bitrate: BitratePolicy::new(
                defaults.clamp_bitrate(bitrate_kbps),
                defaults.min_bitrate_kbps,
                defaults.max_bitrate_kbps,
            ),
            audio_bitrate_kbps: defaults.audio_bitrate_kbps,
            keyint_secs: Some(defaults.keyint_secs),
            modules,
            video_encoders: ["x264enc", "nvh264enc", "nvcudah264enc", "amfh264enc"]
                .map(String::from)
                .to_vec(),
            audio_encoders: audio_encoder_candidates(),
            outputs: vec![kinds::RTMP_OUTPUT.to_string()],
            stop: PollSchedule::from_millis(defaults.stop_poll_interval_ms, defaults.stop_timeout_ms),
            reconnect: Some(Reconnect {
                retry_delay_secs: defaults.retry_delay_secs,
                max_retries: defaults.max_retries,
            }),
            retry_after_start_failure: true,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.target, OutputTarget::Rtmp { .. })
    }

    /// Short label for logs and banners.
    pub fn label(&self) -> &'static str {
        if self.is_streaming() {
            "streaming"
        } else {
            "recording"
        }
    }

    /// Settings for the video encoder at the planned bitrate.
    pub fn video_encoder_settings(&self, bitrate_kbps: u32) -> Settings {
        let settings = Settings::new()
            .with("bitrate", bitrate_kbps)
            .with("buffer_size", bitrate_kbps)
            .with("preset", "veryfast");

        match self.keyint_secs {
            Some(keyint) => settings
                .with("keyint_sec", keyint)
                .with("profile", "main")
                .with("tune", "zerolatency"),
            None => settings.with("profile", "high").with("level", "5.1"),
        }
    }

    pub fn audio_encoder_settings(&self) -> Settings {
        Settings::new().with("bitrate", self.audio_bitrate_kbps)
    }

    /// Settings for the network service, if this profile needs one.
    pub fn service_settings(&self) -> Option<Settings> {
        match &self.target {
            OutputTarget::Rtmp { server, stream_key } => Some(
                Settings::new()
                    .with("server", server.as_str())
                    .with("key", stream_key.as_str())
                    .with("service", "Custom"),
            ),
            OutputTarget::File { .. } => None,
        }
    }

    pub fn output_settings(&self) -> Settings {
        match &self.target {
            OutputTarget::File { path } => {
                Settings::new().with("path", path.to_string_lossy().into_owned())
            }
            OutputTarget::Rtmp { .. } => Settings::new()
                .with("bind_ip", "default")
                .with("low_latency_mode_enabled", true),
        }
    }

    /// Reconnect settings applied to the output after creation.
    pub fn reconnect_settings(&self) -> Option<Settings> {
        self.reconnect.map(|reconnect| {
            Settings::new()
                .with("retry_delay", reconnect.retry_delay_secs)
                .with("max_retries", reconnect.max_retries)
        })
    }

    /// Upper bound on the stop wait, if any.
    pub fn stop_timeout(&self) -> Option<Duration> {
        self.stop.timeout
    }
}

fn platform_capture_modules() -> Vec<String> {
    let (screen, audio) = if cfg!(target_os = "windows") {
        ("d3d11", "wasapi2")
    } else if cfg!(target_os = "macos") {
        ("applemedia", "osxaudio")
    } else {
        ("ximagesrc", "pulseaudio")
    };
    [
        screen,
        audio,
        "compositor",
        "audiomixer",
        "videocrop",
        "x264",
        "libav",
    ]
    .map(String::from)
    .to_vec()
}

fn audio_encoder_candidates() -> Vec<String> {
    ["avenc_aac", "mfaacenc", "fdkaacenc"]
        .map(String::from)
        .to_vec()
}
