//! The request/response contract of the external media framework.
//!
//! Everything the lifecycle manager does to the framework goes through
//! [`Framework`]. Objects are referred to by opaque [`ObjectId`]s; creation
//! calls return `None` when the framework refuses the request.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::settings::Settings;

/// Number of numbered output slots cleared at teardown.
pub const MAX_OUTPUT_SLOTS: u32 = 6;

/// Slot carrying the composed video scene.
pub const SLOT_SCENE: u32 = 0;
/// Slot carrying the microphone.
pub const SLOT_MICROPHONE: u32 = 1;
/// Slot carrying desktop audio.
pub const SLOT_DESKTOP_AUDIO: u32 = 2;

/// Source type identifiers understood by every backend.
pub mod kinds {
    pub const MONITOR_CAPTURE: &str = "monitor_capture";
    pub const DESKTOP_AUDIO_CAPTURE: &str = "desktop_audio_capture";
    pub const MICROPHONE_CAPTURE: &str = "microphone_capture";
    pub const RTMP_CUSTOM_SERVICE: &str = "rtmp_custom";
    pub const MP4_OUTPUT: &str = "mp4_output";
    pub const MATROSKA_OUTPUT: &str = "matroska_output";
    pub const RTMP_OUTPUT: &str = "rtmp_output";
}

/// Handle to a framework object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

/// Handle to a source placed in a scene. Owned by its scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What kind of object a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Scene,
    Source,
    VideoEncoder,
    AudioEncoder,
    Service,
    Output,
}

/// Outcome of loading one plugin module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleLoadStatus {
    Success,
    FileNotFound,
    MissingExports,
    IncompatibleVersion,
    Error,
    Unknown(i32),
}

impl ModuleLoadStatus {
    /// Map a raw framework status code.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Success,
            -1 => Self::Error,
            -2 => Self::FileNotFound,
            -3 => Self::MissingExports,
            -4 => Self::IncompatibleVersion,
            other => Self::Unknown(other),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for ModuleLoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("Success"),
            Self::FileNotFound => f.write_str("File not found"),
            Self::MissingExports => f.write_str("Missing exports"),
            Self::IncompatibleVersion => f.write_str("Incompatible version"),
            Self::Error => f.write_str("Generic error"),
            Self::Unknown(code) => write!(f, "Unknown error {code}"),
        }
    }
}

/// Why a video reset was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VideoResetError {
    #[error("video reset failed")]
    Fail,
    #[error("video format not supported")]
    NotSupported,
    #[error("invalid video parameters")]
    InvalidParam,
    #[error("video is currently active")]
    CurrentlyActive,
    #[error("graphics module not found")]
    ModuleNotFound,
}

impl VideoResetError {
    /// Numeric code as reported by the framework.
    pub fn code(&self) -> i32 {
        match self {
            Self::Fail => -1,
            Self::NotSupported => -2,
            Self::InvalidParam => -3,
            Self::CurrentlyActive => -4,
            Self::ModuleNotFound => -5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Nv12,
    I420,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorSpace {
    Bt601,
    Bt709,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorRange {
    Partial,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleType {
    Bilinear,
    Bicubic,
    Lanczos,
}

/// Core video mix parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSettings {
    pub fps_num: u32,
    pub fps_den: u32,
    pub base_width: u32,
    pub base_height: u32,
    pub output_width: u32,
    pub output_height: u32,
    pub format: PixelFormat,
    pub colorspace: ColorSpace,
    pub range: ColorRange,
    pub scale_type: ScaleType,
    pub gpu_conversion: bool,
}

impl VideoSettings {
    /// Unscaled NV12 / BT.709 mix covering the whole canvas.
    pub fn for_canvas(width: u32, height: u32, fps: u32) -> Self {
        Self {
            fps_num: fps,
            fps_den: 1,
            base_width: width,
            base_height: height,
            output_width: width,
            output_height: height,
            format: PixelFormat::Nv12,
            colorspace: ColorSpace::Bt709,
            range: ColorRange::Partial,
            scale_type: ScaleType::Bicubic,
            gpu_conversion: true,
        }
    }

    /// Integer frame rate, rounded down.
    pub fn fps(&self) -> u32 {
        self.fps_num / self.fps_den.max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeakerLayout {
    Mono,
    Stereo,
}

impl SpeakerLayout {
    pub fn channels(&self) -> u32 {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
        }
    }
}

/// Core audio mix parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSettings {
    pub sample_rate: u32,
    pub speakers: SpeakerLayout,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            speakers: SpeakerLayout::Stereo,
        }
    }
}

/// How a placed source is fitted into bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundsType {
    None,
    Stretch,
    ScaleInner,
}

/// Pixels trimmed from each edge of a placed source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crop {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Crop {
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// Geometry of a source placed in a scene.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ItemTransform {
    pub position: (f32, f32),
    pub scale: (f32, f32),
    pub bounds: BoundsType,
    pub crop: Crop,
    pub visible: bool,
}

impl ItemTransform {
    /// Full, unscaled, uncropped placement at a canvas offset.
    pub fn native_at(x: u32, y: u32) -> Self {
        Self {
            position: (x as f32, y as f32),
            scale: (1.0, 1.0),
            bounds: BoundsType::None,
            crop: Crop::default(),
            visible: true,
        }
    }
}

/// Runtime statistics of an output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputStats {
    /// Frames delivered to the encoder.
    pub frames_captured: u64,

    /// Frames dropped due to processing or network delays.
    pub frames_dropped: u64,

    /// Bytes written to disk or sent over the network, when known.
    pub bytes_written: u64,

    /// Time since the output started, in seconds.
    pub uptime_secs: f64,

    /// How far the output lags behind real time, from 0.0 (keeping up) to
    /// 1.0 (saturated).
    pub congestion: f64,
}

impl OutputStats {
    /// Drop rate as a percentage.
    pub fn drop_rate(&self) -> f64 {
        let total = self.frames_captured + self.frames_dropped;
        if total == 0 {
            return 0.0;
        }
        self.frames_dropped as f64 / total as f64 * 100.0
    }

    pub fn megabytes_written(&self) -> f64 {
        self.bytes_written as f64 / 1024.0 / 1024.0
    }
}

/// The external media framework.
///
/// Implementations must be callable from the control thread and the main
/// thread; the lifecycle manager serializes mutating calls itself.
pub trait Framework: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Start the framework core.
    fn startup(&self, locale: &str) -> bool;

    /// Shut the framework core down. Every object must be released first.
    fn shutdown(&self);

    /// Register a module binary directory and its data path template.
    fn add_module_path(&self, bin_path: &Path, data_path: &Path);

    /// File name of a module binary in a module directory.
    fn module_file_name(&self, module: &str) -> String;

    /// Open and initialize one module.
    fn load_module(&self, module_file: &Path, data_path: &Path) -> ModuleLoadStatus;

    /// Finish module loading after all explicit loads.
    fn post_load_modules(&self);

    fn reset_video(&self, video: &VideoSettings) -> Result<(), VideoResetError>;

    fn reset_audio(&self, audio: &AudioSettings) -> bool;

    fn create_scene(&self, name: &str) -> Option<ObjectId>;

    fn create_source(&self, kind: &str, name: &str, settings: &Settings) -> Option<ObjectId>;

    /// Place a source into a scene.
    fn scene_add(&self, scene: ObjectId, source: ObjectId) -> Option<ItemId>;

    fn set_item_transform(&self, item: ItemId, transform: &ItemTransform);

    fn item_transform(&self, item: ItemId) -> Option<ItemTransform>;

    /// Assign (or clear, with `None`) a numbered output slot.
    fn set_output_source(&self, slot: u32, source: Option<ObjectId>);

    fn create_video_encoder(&self, kind: &str, name: &str, settings: &Settings)
        -> Option<ObjectId>;

    fn create_audio_encoder(
        &self,
        kind: &str,
        name: &str,
        settings: &Settings,
        mixer: usize,
    ) -> Option<ObjectId>;

    /// Feed an encoder from the core video or audio mix.
    fn bind_encoder_to_mix(&self, encoder: ObjectId);

    fn create_service(&self, kind: &str, name: &str, settings: &Settings) -> Option<ObjectId>;

    fn create_output(&self, kind: &str, name: &str, settings: &Settings) -> Option<ObjectId>;

    fn output_set_video_encoder(&self, output: ObjectId, encoder: ObjectId);

    fn output_set_audio_encoder(&self, output: ObjectId, encoder: ObjectId, track: usize);

    fn output_set_service(&self, output: ObjectId, service: ObjectId);

    /// Merge settings into an existing output.
    fn output_update(&self, output: ObjectId, settings: &Settings);

    fn output_start(&self, output: ObjectId) -> bool;

    /// Request a graceful stop. Completion is observed through `output_active`.
    fn output_stop(&self, output: ObjectId);

    fn output_force_stop(&self, output: ObjectId);

    fn output_active(&self, output: ObjectId) -> bool;

    fn output_last_error(&self, output: ObjectId) -> Option<String>;

    fn output_stats(&self, output: ObjectId) -> OutputStats;

    /// Drop the caller's reference to an object.
    fn release(&self, object: ObjectId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_codes_map_to_reasons() {
        assert_eq!(ModuleLoadStatus::from_code(0), ModuleLoadStatus::Success);
        assert_eq!(
            ModuleLoadStatus::from_code(-2).to_string(),
            "File not found"
        );
        assert_eq!(
            ModuleLoadStatus::from_code(-4).to_string(),
            "Incompatible version"
        );
        assert_eq!(
            ModuleLoadStatus::from_code(17).to_string(),
            "Unknown error 17"
        );
    }

    #[test]
    fn native_placement_is_unscaled_and_uncropped() {
        let transform = ItemTransform::native_at(1080, 200);
        assert_eq!(transform.position, (1080.0, 200.0));
        assert_eq!(transform.scale, (1.0, 1.0));
        assert_eq!(transform.bounds, BoundsType::None);
        assert!(transform.crop.is_zero());
        assert!(transform.visible);
    }

    #[test]
    fn test_drop_rate() {
        let stats = OutputStats {
            frames_captured: 90,
            frames_dropped: 10,
            ..OutputStats::default()
        };
        assert!((stats.drop_rate() - 10.0).abs() < 1e-9);
        assert_eq!(OutputStats::default().drop_rate(), 0.0);
    }
}
