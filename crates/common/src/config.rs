//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PanoramaError, PanoramaResult};

/// Environment variable overriding the framework install root.
pub const FRAMEWORK_DIR_ENV: &str = "PANORAMA_FRAMEWORK_DIR";

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Where the external media framework is installed.
    pub framework: FrameworkConfig,

    /// Recording profile defaults.
    pub recording: RecordingDefaults,

    /// Streaming profile defaults.
    pub streaming: StreamingDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Location and startup parameters of the external media framework.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkConfig {
    /// Install root.
    pub install_dir: PathBuf,

    /// Core binaries, relative to `install_dir`.
    pub bin_subdir: PathBuf,

    /// Plugin binaries, relative to `install_dir`.
    pub plugin_subdir: PathBuf,

    /// Plugin data, relative to `install_dir`.
    pub data_subdir: PathBuf,

    /// Locale handed to the framework core at startup.
    pub locale: String,

    /// Pause between releasing the last object and shutting the core down.
    pub settle_delay_ms: u64,
}

/// Default recording parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingDefaults {
    /// Capture frame rate. Not clamped.
    pub fps: u32,

    /// Bitrate at the 1080p30 reference (kbps).
    pub base_bitrate_kbps: u32,

    /// Bitrate floor (kbps).
    pub min_bitrate_kbps: u32,

    /// Bitrate ceiling (kbps).
    pub max_bitrate_kbps: u32,

    /// Audio bitrate (kbps).
    pub audio_bitrate_kbps: u32,

    /// Default output file.
    pub output_path: PathBuf,

    /// Default duration in seconds.
    pub duration_secs: u64,

    /// Upper bound on the wait for the output to stop. `None` waits forever.
    pub stop_timeout_ms: Option<u64>,

    /// Interval between "still active?" checks while stopping.
    pub stop_poll_interval_ms: u64,
}

/// Default streaming parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingDefaults {
    pub fps: u32,
    pub min_fps: u32,
    pub max_fps: u32,

    /// Requested bitrate at the 1080p30 reference (kbps).
    pub bitrate_kbps: u32,
    pub min_bitrate_kbps: u32,
    pub max_bitrate_kbps: u32,

    pub audio_bitrate_kbps: u32,

    /// Keyframe interval in seconds.
    pub keyint_secs: u32,

    pub stop_timeout_ms: Option<u64>,
    pub stop_poll_interval_ms: u64,

    /// Interval between keyboard checks in the control loop.
    pub key_poll_interval_ms: u64,

    /// Reconnect delay handed to the network output (seconds).
    pub retry_delay_secs: u32,

    /// Reconnect attempts handed to the network output.
    pub max_retries: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "panorama=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        let (install_dir, bin_subdir, plugin_subdir, data_subdir) = platform_install_layout();
        Self {
            install_dir: PathBuf::from(install_dir),
            bin_subdir: PathBuf::from(bin_subdir),
            plugin_subdir: PathBuf::from(plugin_subdir),
            data_subdir: PathBuf::from(data_subdir),
            locale: "en-US".to_string(),
            settle_delay_ms: 500,
        }
    }
}

impl Default for RecordingDefaults {
    fn default() -> Self {
        Self {
            fps: 10,
            base_bitrate_kbps: 5000,
            min_bitrate_kbps: 5000,
            max_bitrate_kbps: 50_000,
            audio_bitrate_kbps: 128,
            output_path: PathBuf::from("multi_monitor_recording.mp4"),
            duration_secs: 10,
            stop_timeout_ms: None,
            stop_poll_interval_ms: 100,
        }
    }
}

impl Default for StreamingDefaults {
    fn default() -> Self {
        Self {
            fps: 30,
            min_fps: 10,
            max_fps: 60,
            bitrate_kbps: 5000,
            min_bitrate_kbps: 1000,
            max_bitrate_kbps: 50_000,
            audio_bitrate_kbps: 128,
            keyint_secs: 2,
            stop_timeout_ms: Some(5000),
            stop_poll_interval_ms: 100,
            key_poll_interval_ms: 100,
            retry_delay_secs: 2,
            max_retries: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl StreamingDefaults {
    /// Clamp a user-supplied frame rate into the accepted range.
    pub fn clamp_fps(&self, fps: i64) -> u32 {
        fps.clamp(self.min_fps as i64, self.max_fps as i64) as u32
    }

    /// Clamp a user-supplied bitrate into the accepted range.
    pub fn clamp_bitrate(&self, kbps: i64) -> u32 {
        kbps.clamp(self.min_bitrate_kbps as i64, self.max_bitrate_kbps as i64) as u32
    }
}

impl FrameworkConfig {
    pub fn bin_dir(&self) -> PathBuf {
        self.install_dir.join(&self.bin_subdir)
    }

    pub fn plugin_dir(&self) -> PathBuf {
        self.install_dir.join(&self.plugin_subdir)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.install_dir.join(&self.data_subdir)
    }

    /// Data path template with the framework's `%module%` placeholder.
    pub fn module_data_template(&self) -> PathBuf {
        self.data_dir().join("%module%")
    }

    /// Data directory of one named module.
    pub fn module_data_dir(&self, module: &str) -> PathBuf {
        self.data_dir().join(module)
    }
}

impl AppConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Load config from an explicit JSON file, then apply environment overrides.
    pub fn load_from(path: &Path) -> PanoramaResult<Self> {
        if !path.exists() {
            return Err(PanoramaError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var(FRAMEWORK_DIR_ENV) {
            if !dir.trim().is_empty() {
                tracing::debug!(dir = %dir, "Framework dir overridden from environment");
                self.framework.install_dir = PathBuf::from(dir);
            }
        }
    }

    /// Reject configurations no profile could run with.
    pub fn validate(&self) -> PanoramaResult<()> {
        if self.recording.fps == 0 || self.streaming.fps == 0 {
            return Err(PanoramaError::config("fps must be positive"));
        }
        if self.recording.min_bitrate_kbps > self.recording.max_bitrate_kbps {
            return Err(PanoramaError::config(
                "recording min_bitrate_kbps exceeds max_bitrate_kbps",
            ));
        }
        if self.streaming.min_bitrate_kbps > self.streaming.max_bitrate_kbps {
            return Err(PanoramaError::config(
                "streaming min_bitrate_kbps exceeds max_bitrate_kbps",
            ));
        }
        if self.streaming.min_fps == 0 {
            return Err(PanoramaError::config("streaming min_fps must be positive"));
        }
        if self.streaming.min_fps > self.streaming.max_fps {
            return Err(PanoramaError::config("streaming min_fps exceeds max_fps"));
        }
        Ok(())
    }
}

/// Default GStreamer install layout per OS:
/// `(install_dir, bin_subdir, plugin_subdir, data_subdir)`.
fn platform_install_layout() -> (&'static str, &'static str, &'static str, &'static str) {
    if cfg!(target_os = "windows") {
        (
            "C:/Program Files/gstreamer/1.0/msvc_x86_64",
            "bin",
            "lib/gstreamer-1.0",
            "share/gstreamer-1.0",
        )
    } else if cfg!(target_os = "macos") {
        (
            "/Library/Frameworks/GStreamer.framework/Versions/1.0",
            "bin",
            "lib/gstreamer-1.0",
            "share/gstreamer-1.0",
        )
    } else {
        (
            "/usr",
            "bin",
            "lib/x86_64-linux-gnu/gstreamer-1.0",
            "share/gstreamer-1.0",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streaming_clamps_match_cli_contract() {
        let defaults = StreamingDefaults::default();
        assert_eq!(defaults.clamp_fps(5), 10);
        assert_eq!(defaults.clamp_fps(144), 60);
        assert_eq!(defaults.clamp_fps(30), 30);
        assert_eq!(defaults.clamp_bitrate(0), 1000);
        assert_eq!(defaults.clamp_bitrate(-20), 1000);
        assert_eq!(defaults.clamp_bitrate(80_000), 50_000);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"recording": {"duration_secs": 42}}"#).unwrap();
        assert_eq!(config.recording.duration_secs, 42);
        assert_eq!(config.recording.fps, 10);
        assert_eq!(config.streaming.stop_timeout_ms, Some(5000));
        assert_eq!(config.framework.settle_delay_ms, 500);
    }

    #[test]
    fn validate_rejects_inverted_bitrate_bounds() {
        let mut config = AppConfig::default();
        config.streaming.min_bitrate_kbps = 60_000;
        assert!(matches!(
            config.validate(),
            Err(PanoramaError::Config { .. })
        ));
    }

    #[test]
    fn validate_rejects_zero_min_fps() {
        let mut config = AppConfig::default();
        config.streaming.min_fps = 0;
        assert!(matches!(
            config.validate(),
            Err(PanoramaError::Config { .. })
        ));
    }

    #[test]
    fn module_paths_are_rooted_at_install_dir() {
        let framework = FrameworkConfig {
            install_dir: PathBuf::from("/opt/fw"),
            bin_subdir: PathBuf::from("bin"),
            plugin_subdir: PathBuf::from("plugins"),
            data_subdir: PathBuf::from("data"),
            ..FrameworkConfig::default()
        };
        assert_eq!(framework.plugin_dir(), PathBuf::from("/opt/fw/plugins"));
        assert_eq!(
            framework.module_data_template(),
            PathBuf::from("/opt/fw/data/%module%")
        );
        assert_eq!(
            framework.module_data_dir("x264"),
            PathBuf::from("/opt/fw/data/x264")
        );
    }
}
