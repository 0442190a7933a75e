//! GStreamer launch-string construction.
//!
//! The GStreamer backend describes the whole capture graph as a
//! [`GraphSpec`] and renders it to a `gst-launch` style string: one capture
//! branch per monitor feeding a compositor, optional audio branches feeding
//! a mixer, both encoders, and a muxer plus sink.

use std::fmt::Write as _;
use std::path::Path;

use panorama_common::error::{PanoramaError, PanoramaResult};

use crate::framework::Crop;
use crate::settings::Settings;

/// Screen capture element for one monitor.
#[derive(Debug, Clone, PartialEq)]
pub enum ScreenCapture {
    /// `ximagesrc` over a region of the X11 root window.
    X11 {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        show_pointer: bool,
    },
    /// `d3d11screencapturesrc` for one monitor.
    D3d11 {
        monitor_index: usize,
        show_cursor: bool,
    },
    /// `avfvideosrc` capturing one screen.
    AvFoundation {
        screen_index: usize,
        capture_cursor: bool,
    },
}

/// One monitor placed on the compositor canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoBranch {
    pub capture: ScreenCapture,
    pub xpos: u32,
    pub ypos: u32,
    pub width: u32,
    pub height: u32,
    pub crop: Crop,
}

/// Audio capture element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioCapture {
    /// PulseAudio / PipeWire monitor of the default sink.
    PulseMonitor,
    PulseInput { device: Option<String> },
    WasapiLoopback,
    WasapiInput,
    OsxInput,
}

/// An element factory with properties, rendered as `factory k=v ...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSpec {
    pub factory: String,
    pub properties: Vec<(String, String)>,
    /// Caps filter placed right after the element.
    pub caps: Option<String>,
}

impl ElementSpec {
    pub fn new(factory: impl Into<String>) -> Self {
        Self {
            factory: factory.into(),
            properties: Vec::new(),
            caps: None,
        }
    }

    pub fn prop(mut self, key: &str, value: impl ToString) -> Self {
        self.properties.push((key.to_string(), value.to_string()));
        self
    }

    fn render(&self) -> String {
        let mut out = self.factory.clone();
        for (key, value) in &self.properties {
            let _ = write!(out, " {key}={value}");
        }
        if let Some(caps) = &self.caps {
            let _ = write!(out, " ! {caps}");
        }
        out
    }
}

/// Container and destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkSpec {
    Mp4File { path: String },
    MatroskaFile { path: String },
    Rtmp { sink_factory: String, location: String },
}

/// Everything needed to render one capture graph.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphSpec {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub fps: u32,
    pub video: Vec<VideoBranch>,
    pub audio: Vec<AudioCapture>,
    pub sample_rate: u32,
    pub channels: u32,
    pub video_encoder: ElementSpec,
    pub audio_encoder: ElementSpec,
    pub sink: SinkSpec,
}

/// Render `spec` to a launch string.
pub fn build_launch(spec: &GraphSpec) -> PanoramaResult<String> {
    if spec.canvas_width == 0 || spec.canvas_height == 0 || spec.fps == 0 {
        return Err(PanoramaError::output_start(format!(
            "Invalid canvas {}x{} at {} fps",
            spec.canvas_width, spec.canvas_height, spec.fps
        )));
    }

    let fps = spec.fps;
    let mut launch = String::from("compositor name=comp background=black");
    for (pad, branch) in spec.video.iter().enumerate() {
        let _ = write!(
            launch,
            " sink_{pad}::xpos={} sink_{pad}::ypos={} sink_{pad}::width={} sink_{pad}::height={}",
            branch.xpos, branch.ypos, branch.width, branch.height
        );
    }

    // Compositor output is the canvas; a blank canvas still needs a live
    // source so the muxer gets frames.
    let _ = write!(
        launch,
        " ! video/x-raw,width={w},height={h},framerate={fps}/1 ! videoconvert ! video/x-raw,format=NV12 ! queue max-size-buffers=8 ! {enc} ! h264parse ! queue max-size-buffers=8 ! mux.",
        w = spec.canvas_width,
        h = spec.canvas_height,
        enc = spec.video_encoder.render(),
    );

    if spec.video.is_empty() {
        let _ = write!(
            launch,
            " videotestsrc is-live=true pattern=black ! video/x-raw,width={},height={},framerate={fps}/1 ! comp.",
            spec.canvas_width, spec.canvas_height
        );
    }

    for (pad, branch) in spec.video.iter().enumerate() {
        let capture = screen_capture_fragment(&branch.capture)?;
        let crop = crop_fragment(&branch.crop);
        // Leaky queue so a slow encoder drops frames instead of stalling capture.
        let _ = write!(
            launch,
            " {capture} ! queue max-size-buffers=200 leaky=downstream ! videoconvert ! videorate ! video/x-raw,framerate={fps}/1{crop} ! comp.sink_{pad}"
        );
    }

    if !spec.audio.is_empty() {
        let _ = write!(
            launch,
            " audiomixer name=amix ! audioconvert ! audioresample ! audio/x-raw,rate={},channels={} ! {} ! aacparse ! queue ! mux.",
            spec.sample_rate,
            spec.channels,
            spec.audio_encoder.render()
        );
        for capture in &spec.audio {
            let _ = write!(
                launch,
                " {} ! audioconvert ! audioresample ! queue ! amix.",
                audio_capture_fragment(capture)
            );
        }
    }

    let _ = write!(launch, " {}", sink_fragment(&spec.sink));
    Ok(launch)
}

fn screen_capture_fragment(capture: &ScreenCapture) -> PanoramaResult<String> {
    match capture {
        ScreenCapture::X11 {
            x,
            y,
            width,
            height,
            show_pointer,
        } => {
            let region = x11_capture_region_fragment(*x, *y, *width, *height)?;
            // `use-damage=false` ensures full frame delivery.
            Ok(format!(
                "ximagesrc use-damage=false show-pointer={show_pointer}{region}"
            ))
        }
        ScreenCapture::D3d11 {
            monitor_index,
            show_cursor,
        } => Ok(format!(
            "d3d11screencapturesrc monitor-index={monitor_index} show-cursor={show_cursor} ! d3d11download"
        )),
        ScreenCapture::AvFoundation {
            screen_index,
            capture_cursor,
        } => Ok(format!(
            "avfvideosrc capture-screen=true device-index={screen_index} capture-screen-cursor={capture_cursor}"
        )),
    }
}

fn x11_capture_region_fragment(x: i32, y: i32, width: u32, height: u32) -> PanoramaResult<String> {
    if width == 0 || height == 0 {
        return Err(PanoramaError::output_start(format!(
            "Invalid X11 capture region {width}x{height} at ({x},{y})"
        )));
    }

    let width_i32 = i32::try_from(width)
        .map_err(|_| PanoramaError::output_start(format!("X11 capture width too large: {width}")))?;
    let height_i32 = i32::try_from(height).map_err(|_| {
        PanoramaError::output_start(format!("X11 capture height too large: {height}"))
    })?;

    let endx = x
        .checked_add(width_i32 - 1)
        .ok_or_else(|| PanoramaError::output_start("X11 capture region x-range overflow"))?;
    let endy = y
        .checked_add(height_i32 - 1)
        .ok_or_else(|| PanoramaError::output_start("X11 capture region y-range overflow"))?;

    Ok(format!(" startx={x} starty={y} endx={endx} endy={endy}"))
}

fn crop_fragment(crop: &Crop) -> String {
    if crop.is_zero() {
        return String::new();
    }
    format!(
        " ! videocrop left={} top={} right={} bottom={}",
        crop.left, crop.top, crop.right, crop.bottom
    )
}

fn audio_capture_fragment(capture: &AudioCapture) -> String {
    match capture {
        AudioCapture::PulseMonitor => "pulsesrc device=@DEFAULT_MONITOR@ do-timestamp=true".to_string(),
        AudioCapture::PulseInput { device: Some(device) } => {
            format!("pulsesrc device=\"{}\" do-timestamp=true", device.replace('"', "\\\""))
        }
        AudioCapture::PulseInput { device: None } => "pulsesrc do-timestamp=true".to_string(),
        AudioCapture::WasapiLoopback => "wasapi2src loopback=true low-latency=true".to_string(),
        AudioCapture::WasapiInput => "wasapi2src low-latency=true".to_string(),
        AudioCapture::OsxInput => "osxaudiosrc".to_string(),
    }
}

fn sink_fragment(sink: &SinkSpec) -> String {
    match sink {
        SinkSpec::Mp4File { path } => {
            format!("mp4mux name=mux ! filesink location=\"{path}\"")
        }
        SinkSpec::MatroskaFile { path } => {
            format!("matroskamux name=mux ! filesink location=\"{path}\"")
        }
        SinkSpec::Rtmp {
            sink_factory,
            location,
        } => {
            let location = location.replace('"', "\\\"");
            format!("flvmux name=mux streamable=true ! {sink_factory} location=\"{location}\"")
        }
    }
}

/// Map generic video encoder settings onto a concrete H.264 encoder.
pub fn video_encoder_element(factory: &str, settings: &Settings, fps: u32) -> ElementSpec {
    let bitrate = settings.get_int("bitrate").unwrap_or(5000);
    let keyint_frames = settings
        .get_int("keyint_sec")
        .map(|secs| secs * fps as i64)
        .unwrap_or_else(|| (fps as i64 * 2).max(2));
    let zerolatency = settings.get_str("tune") == Some("zerolatency");

    let mut element = ElementSpec::new(factory).prop("bitrate", bitrate);
    match factory {
        "x264enc" => {
            element = element
                .prop("speed-preset", settings.get_str("preset").unwrap_or("veryfast"))
                .prop("key-int-max", keyint_frames);
            if zerolatency {
                element = element.prop("tune", "zerolatency");
            }
        }
        "nvh264enc" => {
            element = element.prop("gop-size", keyint_frames);
            if zerolatency {
                element = element.prop("zerolatency", true);
            }
        }
        "nvcudah264enc" | "amfh264enc" => {
            element = element.prop("gop-size", keyint_frames);
        }
        "vah264enc" => {
            element = element.prop("key-int-max", keyint_frames);
        }
        _ => {}
    }

    if let Some(profile) = settings.get_str("profile") {
        let mut caps = format!("video/x-h264,profile={profile}");
        if let Some(level) = settings.get_str("level") {
            let _ = write!(caps, ",level=(string){level}");
        }
        element.caps = Some(caps);
    }
    element
}

/// Map generic audio encoder settings onto a concrete AAC encoder.
pub fn audio_encoder_element(factory: &str, settings: &Settings) -> ElementSpec {
    let kbps = settings.get_int("bitrate").unwrap_or(128);
    // AAC encoders take bits per second.
    ElementSpec::new(factory).prop("bitrate", kbps * 1000)
}

/// RTMP publish location from a server URL and stream key.
pub fn rtmp_location(server: &str, stream_key: &str) -> String {
    let server = server.trim_end_matches('/');
    if stream_key.is_empty() {
        server.to_string()
    } else {
        format!("{server}/{stream_key}")
    }
}

pub fn escape_path(path: &Path) -> String {
    path.to_string_lossy().replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x264() -> ElementSpec {
        ElementSpec::new("x264enc").prop("bitrate", 6952)
    }

    fn branch(pad_x: u32, x: i32) -> VideoBranch {
        VideoBranch {
            capture: ScreenCapture::X11 {
                x,
                y: 0,
                width: 1920,
                height: 1080,
                show_pointer: true,
            },
            xpos: pad_x,
            ypos: 0,
            width: 1920,
            height: 1080,
            crop: Crop::default(),
        }
    }

    fn spec(video: Vec<VideoBranch>, audio: Vec<AudioCapture>) -> GraphSpec {
        GraphSpec {
            canvas_width: 3840,
            canvas_height: 1080,
            fps: 10,
            video,
            audio,
            sample_rate: 48_000,
            channels: 2,
            video_encoder: x264(),
            audio_encoder: ElementSpec::new("avenc_aac").prop("bitrate", 128_000),
            sink: SinkSpec::Mp4File {
                path: "out.mp4".to_string(),
            },
        }
    }

    #[test]
    fn x11_region_fragment_uses_inclusive_end_coordinates() {
        let fragment = x11_capture_region_fragment(2560, 0, 2560, 1440).unwrap();
        assert_eq!(fragment, " startx=2560 starty=0 endx=5119 endy=1439");
    }

    #[test]
    fn x11_region_fragment_rejects_zero_size() {
        let err = x11_capture_region_fragment(0, 0, 0, 1080).unwrap_err();
        assert!(err.to_string().contains("Invalid X11 capture region"));
    }

    #[test]
    fn each_monitor_gets_a_compositor_pad() {
        let launch = build_launch(&spec(vec![branch(0, -1920), branch(1920, 0)], Vec::new())).unwrap();
        assert!(launch.starts_with("compositor name=comp"));
        assert!(launch.contains("sink_0::xpos=0 sink_0::ypos=0"));
        assert!(launch.contains("sink_1::xpos=1920"));
        assert!(launch.contains("startx=-1920 starty=0 endx=-1 endy=1079"));
        assert!(launch.contains("! comp.sink_1"));
        assert!(launch.contains("video/x-raw,width=3840,height=1080,framerate=10/1"));
        assert!(!launch.contains("audiomixer"));
        assert!(launch.ends_with("mp4mux name=mux ! filesink location=\"out.mp4\""));
    }

    #[test]
    fn audio_branches_share_one_mixer() {
        let launch = build_launch(&spec(
            vec![branch(0, 0)],
            vec![
                AudioCapture::PulseMonitor,
                AudioCapture::PulseInput { device: None },
            ],
        ))
        .unwrap();
        assert_eq!(launch.matches("audiomixer name=amix").count(), 1);
        assert_eq!(launch.matches("! amix.").count(), 2);
        assert!(launch.contains("avenc_aac bitrate=128000 ! aacparse"));
    }

    #[test]
    fn blank_canvas_uses_test_source() {
        let launch = build_launch(&spec(Vec::new(), Vec::new())).unwrap();
        assert!(launch.contains("videotestsrc is-live=true pattern=black"));
    }

    #[test]
    fn crop_is_only_rendered_when_set() {
        let mut cropped = branch(0, 0);
        cropped.crop.left = 8;
        let launch = build_launch(&spec(vec![cropped], Vec::new())).unwrap();
        assert!(launch.contains("videocrop left=8 top=0 right=0 bottom=0"));
    }

    #[test]
    fn rtmp_sink_is_streamable_flv() {
        let sink = sink_fragment(&SinkSpec::Rtmp {
            sink_factory: "rtmp2sink".to_string(),
            location: rtmp_location("rtmp://live.example/app/", "key123"),
        });
        assert_eq!(
            sink,
            "flvmux name=mux streamable=true ! rtmp2sink location=\"rtmp://live.example/app/key123\""
        );
    }

    #[test]
    fn x264_mapping_for_streaming() {
        let settings = Settings::new()
            .with("bitrate", 5000)
            .with("preset", "veryfast")
            .with("keyint_sec", 2)
            .with("profile", "main")
            .with("tune", "zerolatency");
        let element = video_encoder_element("x264enc", &settings, 30);
        assert_eq!(
            element.render(),
            "x264enc bitrate=5000 speed-preset=veryfast key-int-max=60 tune=zerolatency ! video/x-h264,profile=main"
        );
    }

    #[test]
    fn recording_level_lands_in_caps() {
        let settings = Settings::new()
            .with("bitrate", 6952)
            .with("profile", "high")
            .with("level", "5.1");
        let element = video_encoder_element("nvh264enc", &settings, 10);
        assert_eq!(
            element.caps.as_deref(),
            Some("video/x-h264,profile=high,level=(string)5.1")
        );
        assert!(element.properties.contains(&("gop-size".to_string(), "20".to_string())));
    }

    #[test]
    fn audio_bitrate_is_converted_to_bits() {
        let element = audio_encoder_element("avenc_aac", &Settings::new().with("bitrate", 128));
        assert_eq!(element.render(), "avenc_aac bitrate=128000");
    }
}
