//! GStreamer implementation of the framework contract.
//!
//! Objects are kept as plain descriptions until an output starts. Starting
//! an output renders the scene, audio slots, encoders and sink into one
//! launch string (see [`crate::pipeline`]) and sets the resulting pipeline
//! to `Playing`. A graceful stop sends EOS so the muxer can finalize the
//! file; completion is observed by draining the pipeline bus.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use gst::prelude::*;
use gstreamer as gst;
use panorama_common::error::{PanoramaError, PanoramaResult};

use crate::framework::{
    kinds, AudioSettings, Framework, ItemId, ItemTransform, ModuleLoadStatus, ObjectId,
    OutputStats, VideoResetError, VideoSettings, SLOT_DESKTOP_AUDIO, SLOT_MICROPHONE, SLOT_SCENE,
};
use crate::pipeline::{
    audio_encoder_element, build_launch, escape_path, rtmp_location, video_encoder_element,
    AudioCapture, GraphSpec, ScreenCapture, SinkSpec, VideoBranch,
};
use crate::settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostPlatform {
    Linux,
    Windows,
    MacOS,
}

fn host_platform() -> HostPlatform {
    if cfg!(target_os = "windows") {
        HostPlatform::Windows
    } else if cfg!(target_os = "macos") {
        HostPlatform::MacOS
    } else {
        HostPlatform::Linux
    }
}

#[derive(Debug)]
enum GstObject {
    Scene,
    Source {
        kind: String,
        settings: Settings,
    },
    VideoEncoder {
        factory: String,
        settings: Settings,
    },
    AudioEncoder {
        factory: String,
        settings: Settings,
    },
    Service {
        settings: Settings,
    },
    Output {
        kind: String,
        settings: Settings,
        video: Option<ObjectId>,
        audio: Option<ObjectId>,
        service: Option<ObjectId>,
    },
}

#[derive(Debug)]
struct SceneItem {
    scene: ObjectId,
    source: ObjectId,
    transform: ItemTransform,
}

struct RunningOutput {
    pipeline: gst::Pipeline,
    started: Instant,
    fps: u32,
    location: Option<PathBuf>,
    finished: bool,
    qos_events: u64,
    qos_proportion: f64,
}

impl RunningOutput {
    fn halt(&mut self) {
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            tracing::warn!(error = ?e, "Failed to set pipeline to Null");
        }
        self.finished = true;
    }
}

#[derive(Default)]
struct GstState {
    initialized: bool,
    module_paths: Vec<PathBuf>,
    next_id: u64,
    next_item: u64,
    objects: HashMap<ObjectId, GstObject>,
    items: HashMap<ItemId, SceneItem>,
    slots: HashMap<u32, ObjectId>,
    video: Option<VideoSettings>,
    audio: AudioSettings,
    running: HashMap<ObjectId, RunningOutput>,
    last_errors: HashMap<ObjectId, String>,
}

impl GstState {
    fn insert(&mut self, object: GstObject) -> ObjectId {
        self.next_id += 1;
        let id = ObjectId(self.next_id);
        self.objects.insert(id, object);
        id
    }
}

/// GStreamer-backed framework.
#[derive(Default)]
pub struct GstFramework {
    state: Mutex<GstState>,
}

impl GstFramework {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, GstState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Whether an element factory is registered.
pub fn factory_available(factory: &str) -> bool {
    gst::ElementFactory::find(factory).is_some()
}

/// What the installed GStreamer runtime offers.
#[derive(Debug, Clone)]
pub struct RuntimeProbe {
    pub version: String,
    /// Each requested factory and whether it is registered.
    pub factories: Vec<(String, bool)>,
}

/// Initialize GStreamer and look up `factories` in its registry.
pub fn probe_runtime(factories: &[&str]) -> PanoramaResult<RuntimeProbe> {
    gst::init().map_err(|e| PanoramaError::platform(format!("GStreamer init failed: {e}")))?;
    let (major, minor, micro, _) = gst::version();
    Ok(RuntimeProbe {
        version: format!("{major}.{minor}.{micro}"),
        factories: factories
            .iter()
            .map(|factory| (factory.to_string(), factory_available(factory)))
            .collect(),
    })
}

fn source_factory(kind: &str) -> Option<&'static str> {
    match (kind, host_platform()) {
        (kinds::MONITOR_CAPTURE, HostPlatform::Linux) => Some("ximagesrc"),
        (kinds::MONITOR_CAPTURE, HostPlatform::Windows) => Some("d3d11screencapturesrc"),
        (kinds::MONITOR_CAPTURE, HostPlatform::MacOS) => Some("avfvideosrc"),
        (kinds::DESKTOP_AUDIO_CAPTURE, HostPlatform::Linux) => Some("pulsesrc"),
        (kinds::DESKTOP_AUDIO_CAPTURE, HostPlatform::Windows) => Some("wasapi2src"),
        (kinds::MICROPHONE_CAPTURE, HostPlatform::Linux) => Some("pulsesrc"),
        (kinds::MICROPHONE_CAPTURE, HostPlatform::Windows) => Some("wasapi2src"),
        (kinds::MICROPHONE_CAPTURE, HostPlatform::MacOS) => Some("osxaudiosrc"),
        _ => None,
    }
}

fn output_factories(kind: &str) -> Option<&'static [&'static str]> {
    match kind {
        kinds::MP4_OUTPUT => Some(&["mp4mux", "filesink"]),
        kinds::MATROSKA_OUTPUT => Some(&["matroskamux", "filesink"]),
        kinds::RTMP_OUTPUT => Some(&["flvmux"]),
        _ => None,
    }
}

fn rtmp_sink_factory() -> Option<&'static str> {
    ["rtmp2sink", "rtmpsink"]
        .into_iter()
        .find(|factory| factory_available(factory))
}

/// Element factories every run needs regardless of profile.
pub const REQUIRED_FACTORIES: &[&str] = &[
    "compositor",
    "videoconvert",
    "videorate",
    "h264parse",
    "queue",
];

impl Framework for GstFramework {
    fn name(&self) -> &str {
        "gstreamer"
    }

    fn startup(&self, locale: &str) -> bool {
        let mut state = self.state();
        if let Err(e) = gst::init() {
            tracing::error!(error = %e, "Failed to initialize GStreamer");
            return false;
        }
        state.initialized = true;

        let registry = gst::Registry::get();
        for path in &state.module_paths {
            if path.is_dir() {
                let changed = registry.scan_path(path);
                tracing::debug!(path = %path.display(), changed, "Scanned module path");
            }
        }

        let (major, minor, micro, _) = gst::version();
        tracing::info!(version = %format!("{major}.{minor}.{micro}"), locale, "GStreamer initialized");
        true
    }

    fn shutdown(&self) {
        let mut state = self.state();
        for (_, mut run) in state.running.drain() {
            run.halt();
        }
        state.objects.clear();
        state.items.clear();
        state.slots.clear();
        state.last_errors.clear();
        state.video = None;
        state.initialized = false;
    }

    fn add_module_path(&self, bin_path: &Path, data_path: &Path) {
        let mut state = self.state();
        tracing::debug!(
            bin = %bin_path.display(),
            data = %data_path.display(),
            "Adding module path"
        );
        if state.initialized && bin_path.is_dir() {
            gst::Registry::get().scan_path(bin_path);
        }
        state.module_paths.push(bin_path.to_path_buf());
    }

    fn module_file_name(&self, module: &str) -> String {
        match host_platform() {
            HostPlatform::Windows => format!("gst{module}.dll"),
            HostPlatform::MacOS => format!("libgst{module}.dylib"),
            HostPlatform::Linux => format!("libgst{module}.so"),
        }
    }

    fn load_module(&self, module_file: &Path, _data_path: &Path) -> ModuleLoadStatus {
        if !module_file.exists() {
            return ModuleLoadStatus::FileNotFound;
        }
        match gst::Plugin::load_file(module_file) {
            Ok(plugin) => {
                tracing::debug!(plugin = %plugin.plugin_name(), version = %plugin.version(), "Plugin loaded");
                ModuleLoadStatus::Success
            }
            Err(e) => {
                tracing::debug!(path = %module_file.display(), error = %e, "Plugin load failed");
                ModuleLoadStatus::Error
            }
        }
    }

    fn post_load_modules(&self) {
        let missing: Vec<&str> = REQUIRED_FACTORIES
            .iter()
            .copied()
            .filter(|factory| !factory_available(factory))
            .collect();
        if !missing.is_empty() {
            tracing::warn!(missing = ?missing, "Required GStreamer elements are not registered");
        }
    }

    fn reset_video(&self, video: &VideoSettings) -> Result<(), VideoResetError> {
        let mut state = self.state();
        if !state.initialized {
            return Err(VideoResetError::Fail);
        }
        if video.base_width == 0 || video.base_height == 0 || video.fps() == 0 {
            return Err(VideoResetError::InvalidParam);
        }
        if state.running.values().any(|run| !run.finished) {
            return Err(VideoResetError::CurrentlyActive);
        }
        if !factory_available("compositor") {
            return Err(VideoResetError::ModuleNotFound);
        }
        state.video = Some(video.clone());
        Ok(())
    }

    fn reset_audio(&self, audio: &AudioSettings) -> bool {
        let mut state = self.state();
        if !state.initialized || !factory_available("audiomixer") {
            return false;
        }
        state.audio = *audio;
        true
    }

    fn create_scene(&self, _name: &str) -> Option<ObjectId> {
        let mut state = self.state();
        state.initialized.then(|| state.insert(GstObject::Scene))
    }

    fn create_source(&self, kind: &str, name: &str, settings: &Settings) -> Option<ObjectId> {
        let mut state = self.state();
        if !state.initialized {
            return None;
        }
        let Some(factory) = source_factory(kind) else {
            tracing::warn!(kind, name, "Source type not supported on this platform");
            return None;
        };
        if !factory_available(factory) {
            tracing::warn!(kind, factory, "Source element not available");
            return None;
        }
        Some(state.insert(GstObject::Source {
            kind: kind.to_string(),
            settings: settings.clone(),
        }))
    }

    fn scene_add(&self, scene: ObjectId, source: ObjectId) -> Option<ItemId> {
        let mut state = self.state();
        let scene_ok = matches!(state.objects.get(&scene), Some(GstObject::Scene));
        let source_ok = matches!(state.objects.get(&source), Some(GstObject::Source { .. }));
        if !scene_ok || !source_ok {
            return None;
        }
        state.next_item += 1;
        let item = ItemId(state.next_item);
        state.items.insert(
            item,
            SceneItem {
                scene,
                source,
                transform: ItemTransform::native_at(0, 0),
            },
        );
        Some(item)
    }

    fn set_item_transform(&self, item: ItemId, transform: &ItemTransform) {
        if let Some(entry) = self.state().items.get_mut(&item) {
            entry.transform = *transform;
        }
    }

    fn item_transform(&self, item: ItemId) -> Option<ItemTransform> {
        self.state().items.get(&item).map(|entry| entry.transform)
    }

    fn set_output_source(&self, slot: u32, source: Option<ObjectId>) {
        let mut state = self.state();
        match source {
            Some(id) => state.slots.insert(slot, id),
            None => state.slots.remove(&slot),
        };
    }

    fn create_video_encoder(&self, kind: &str, _name: &str, settings: &Settings) -> Option<ObjectId> {
        let mut state = self.state();
        (state.initialized && factory_available(kind)).then(|| {
            state.insert(GstObject::VideoEncoder {
                factory: kind.to_string(),
                settings: settings.clone(),
            })
        })
    }

    fn create_audio_encoder(
        &self,
        kind: &str,
        _name: &str,
        settings: &Settings,
        _mixer: usize,
    ) -> Option<ObjectId> {
        let mut state = self.state();
        (state.initialized && factory_available(kind)).then(|| {
            state.insert(GstObject::AudioEncoder {
                factory: kind.to_string(),
                settings: settings.clone(),
            })
        })
    }

    fn bind_encoder_to_mix(&self, encoder: ObjectId) {
        // Encoders are linked to the compositor and mixer when the graph is built.
        tracing::trace!(encoder = encoder.0, "Encoder bound to core mix");
    }

    fn create_service(&self, kind: &str, _name: &str, settings: &Settings) -> Option<ObjectId> {
        let mut state = self.state();
        (state.initialized && kind == kinds::RTMP_CUSTOM_SERVICE).then(|| {
            state.insert(GstObject::Service {
                settings: settings.clone(),
            })
        })
    }

    fn create_output(&self, kind: &str, _name: &str, settings: &Settings) -> Option<ObjectId> {
        let mut state = self.state();
        if !state.initialized {
            return None;
        }
        let factories = output_factories(kind)?;
        if let Some(missing) = factories.iter().find(|f| !factory_available(f)) {
            tracing::warn!(kind, factory = *missing, "Output element not available");
            return None;
        }
        if kind == kinds::RTMP_OUTPUT && rtmp_sink_factory().is_none() {
            tracing::warn!(kind, "Neither rtmp2sink nor rtmpsink is available");
            return None;
        }
        Some(state.insert(GstObject::Output {
            kind: kind.to_string(),
            settings: settings.clone(),
            video: None,
            audio: None,
            service: None,
        }))
    }

    fn output_set_video_encoder(&self, output: ObjectId, encoder: ObjectId) {
        if let Some(GstObject::Output { video, .. }) = self.state().objects.get_mut(&output) {
            *video = Some(encoder);
        }
    }

    fn output_set_audio_encoder(&self, output: ObjectId, encoder: ObjectId, _track: usize) {
        if let Some(GstObject::Output { audio, .. }) = self.state().objects.get_mut(&output) {
            *audio = Some(encoder);
        }
    }

    fn output_set_service(&self, output: ObjectId, service_id: ObjectId) {
        if let Some(GstObject::Output { service, .. }) = self.state().objects.get_mut(&output) {
            *service = Some(service_id);
        }
    }

    fn output_update(&self, output: ObjectId, update: &Settings) {
        if let Some(GstObject::Output { settings, .. }) = self.state().objects.get_mut(&output) {
            settings.merge(update);
        }
    }

    fn output_start(&self, output: ObjectId) -> bool {
        let mut state = self.state();
        let (spec, location, secret) = match graph_for(&state, output) {
            Ok(graph) => graph,
            Err(message) => {
                state.last_errors.insert(output, message);
                return false;
            }
        };

        let launch = match build_launch(&spec) {
            Ok(launch) => launch,
            Err(e) => {
                state.last_errors.insert(output, e.to_string());
                return false;
            }
        };
        let logged = match &secret {
            Some(secret) if !secret.is_empty() => launch.replace(secret.as_str(), "****"),
            _ => launch.clone(),
        };
        tracing::debug!(launch = %logged, "Building output pipeline");

        let pipeline = match gst::parse::launch(&launch)
            .map_err(|e| format!("Failed to build pipeline: {e}"))
            .and_then(|element| {
                element
                    .dynamic_cast::<gst::Pipeline>()
                    .map_err(|_| "Launch string did not produce a pipeline".to_string())
            }) {
            Ok(pipeline) => pipeline,
            Err(message) => {
                state.last_errors.insert(output, message);
                return false;
            }
        };

        if let Err(e) = pipeline.set_state(gst::State::Playing) {
            let _ = pipeline.set_state(gst::State::Null);
            state
                .last_errors
                .insert(output, format!("Failed to start pipeline: {e:?}"));
            return false;
        }

        state.running.insert(
            output,
            RunningOutput {
                pipeline,
                started: Instant::now(),
                fps: spec.fps,
                location,
                finished: false,
                qos_events: 0,
                qos_proportion: 1.0,
            },
        );
        true
    }

    fn output_stop(&self, output: ObjectId) {
        let mut state = self.state();
        let Some(run) = state.running.get_mut(&output) else {
            return;
        };
        // EOS lets the muxer write its trailer before the pipeline goes down.
        if !run.pipeline.send_event(gst::event::Eos::new()) {
            tracing::warn!(output = output.0, "Failed to send EOS event; output may be truncated");
            run.halt();
        }
    }

    fn output_force_stop(&self, output: ObjectId) {
        if let Some(run) = self.state().running.get_mut(&output) {
            run.halt();
        }
    }

    fn output_active(&self, output: ObjectId) -> bool {
        let mut guard = self.state();
        let state = &mut *guard;
        let Some(run) = state.running.get_mut(&output) else {
            return false;
        };
        if run.finished {
            return false;
        }

        if let Some(bus) = run.pipeline.bus() {
            while let Some(msg) = bus.pop() {
                match msg.view() {
                    gst::MessageView::Eos(_) => {
                        tracing::debug!(output = output.0, "EOS received; pipeline drained");
                        run.halt();
                    }
                    gst::MessageView::Error(err) => {
                        tracing::warn!(output = output.0, error = %err.error(), "Pipeline error");
                        state.last_errors.insert(output, err.error().to_string());
                        run.halt();
                    }
                    // One QoS message per late or dropped buffer.
                    gst::MessageView::Qos(qos) => {
                        run.qos_events += 1;
                        let (_jitter, proportion, _quality) = qos.values();
                        run.qos_proportion = proportion;
                    }
                    _ => {}
                }
                if run.finished {
                    break;
                }
            }
        }
        !run.finished
    }

    fn output_last_error(&self, output: ObjectId) -> Option<String> {
        self.state().last_errors.get(&output).cloned()
    }

    fn output_stats(&self, output: ObjectId) -> OutputStats {
        let state = self.state();
        let Some(run) = state.running.get(&output) else {
            return OutputStats::default();
        };
        let position_ms = run
            .pipeline
            .query_position::<gst::ClockTime>()
            .map(|pos| pos.mseconds())
            .unwrap_or(0);
        let bytes_written = run
            .location
            .as_ref()
            .and_then(|path| std::fs::metadata(path).ok())
            .map(|meta| meta.len())
            .unwrap_or(0);
        OutputStats {
            frames_captured: position_ms * run.fps as u64 / 1000,
            frames_dropped: run.qos_events,
            bytes_written,
            uptime_secs: run.started.elapsed().as_secs_f64(),
            congestion: congestion_from_proportion(run.qos_proportion),
        }
    }

    fn release(&self, object: ObjectId) {
        let mut state = self.state();
        if let Some(mut run) = state.running.remove(&object) {
            if !run.finished {
                run.halt();
            }
        }
        state.last_errors.remove(&object);
        state
            .items
            .retain(|_, item| item.scene != object && item.source != object);
        state.slots.retain(|_, id| *id != object);
        if state.objects.remove(&object).is_none() {
            tracing::warn!(id = object.0, "Release of unknown object");
        }
    }
}

/// Map a QoS proportion (processing rate relative to real time, above 1.0
/// when late) onto a 0.0..=1.0 congestion figure.
fn congestion_from_proportion(proportion: f64) -> f64 {
    if proportion.is_finite() && proportion > 1.0 {
        (1.0 - 1.0 / proportion).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Element graph for `output`, plus the file it writes (if any) and a
/// secret to redact from logs.
fn graph_for(
    state: &GstState,
    output: ObjectId,
) -> Result<(GraphSpec, Option<PathBuf>, Option<String>), String> {
    let Some(GstObject::Output {
        kind,
        settings,
        video,
        audio,
        service,
    }) = state.objects.get(&output)
    else {
        return Err(format!("Unknown output {output}"));
    };
    let mix = state
        .video
        .as_ref()
        .ok_or_else(|| "Video has not been reset".to_string())?;
    let fps = mix.fps();

    let video_encoder = match video.and_then(|id| state.objects.get(&id)) {
        Some(GstObject::VideoEncoder { factory, settings }) => {
            video_encoder_element(factory, settings, fps)
        }
        _ => return Err("Output has no video encoder".to_string()),
    };
    let audio_encoder = match audio.and_then(|id| state.objects.get(&id)) {
        Some(GstObject::AudioEncoder { factory, settings }) => {
            audio_encoder_element(factory, settings)
        }
        _ => return Err("Output has no audio encoder".to_string()),
    };

    let video_branches = scene_branches(state)?;
    let audio_branches = [SLOT_DESKTOP_AUDIO, SLOT_MICROPHONE]
        .into_iter()
        .filter_map(|slot| state.slots.get(&slot))
        .filter_map(|id| match state.objects.get(id) {
            Some(GstObject::Source { kind, settings }) => audio_capture(kind, settings),
            _ => None,
        })
        .collect();

    let (sink, location, secret) = match kind.as_str() {
        kinds::MP4_OUTPUT | kinds::MATROSKA_OUTPUT => {
            let path = settings
                .get_str("path")
                .map(PathBuf::from)
                .ok_or_else(|| "File output has no path".to_string())?;
            let escaped = escape_path(&path);
            let sink = if kind == kinds::MP4_OUTPUT {
                SinkSpec::Mp4File { path: escaped }
            } else {
                SinkSpec::MatroskaFile { path: escaped }
            };
            (sink, Some(path), None)
        }
        kinds::RTMP_OUTPUT => {
            let service_settings = match service.and_then(|id| state.objects.get(&id)) {
                Some(GstObject::Service { settings }) => settings,
                _ => return Err("Streaming output has no service".to_string()),
            };
            let server = service_settings.get_str("server").unwrap_or_default();
            let key = service_settings.get_str("key").unwrap_or_default();
            let sink_factory =
                rtmp_sink_factory().ok_or_else(|| "No RTMP sink element available".to_string())?;
            (
                SinkSpec::Rtmp {
                    sink_factory: sink_factory.to_string(),
                    location: rtmp_location(server, key),
                },
                None,
                Some(key.to_string()),
            )
        }
        other => return Err(format!("Unsupported output type '{other}'")),
    };

    Ok((
        GraphSpec {
            canvas_width: mix.base_width,
            canvas_height: mix.base_height,
            fps,
            video: video_branches,
            audio: audio_branches,
            sample_rate: state.audio.sample_rate,
            channels: state.audio.speakers.channels(),
            video_encoder,
            audio_encoder,
            sink,
        },
        location,
        secret,
    ))
}

fn scene_branches(state: &GstState) -> Result<Vec<VideoBranch>, String> {
    let Some(scene) = state.slots.get(&SLOT_SCENE) else {
        return Err("No scene assigned to the video slot".to_string());
    };

    let mut items: Vec<(&ItemId, &SceneItem)> = state
        .items
        .iter()
        .filter(|(_, item)| item.scene == *scene && item.transform.visible)
        .collect();
    items.sort_by_key(|(id, _)| **id);

    let mut branches = Vec::with_capacity(items.len());
    for (_, item) in items {
        let Some(GstObject::Source { kind, settings }) = state.objects.get(&item.source) else {
            continue;
        };
        if kind != kinds::MONITOR_CAPTURE {
            continue;
        }
        branches.push(monitor_branch(settings, &item.transform)?);
    }
    Ok(branches)
}

fn monitor_branch(settings: &Settings, transform: &ItemTransform) -> Result<VideoBranch, String> {
    let int = |key: &str| {
        settings
            .get_int(key)
            .ok_or_else(|| format!("Monitor source is missing '{key}'"))
    };
    let x = i32::try_from(int("x")?).map_err(|e| e.to_string())?;
    let y = i32::try_from(int("y")?).map_err(|e| e.to_string())?;
    let width = u32::try_from(int("width")?).map_err(|e| e.to_string())?;
    let height = u32::try_from(int("height")?).map_err(|e| e.to_string())?;
    let index = usize::try_from(int("monitor")?).map_err(|e| e.to_string())?;
    let cursor = settings.get_bool("capture_cursor").unwrap_or(true);

    let capture = match host_platform() {
        HostPlatform::Linux => ScreenCapture::X11 {
            x,
            y,
            width,
            height,
            show_pointer: cursor,
        },
        HostPlatform::Windows => ScreenCapture::D3d11 {
            monitor_index: index,
            show_cursor: cursor,
        },
        HostPlatform::MacOS => ScreenCapture::AvFoundation {
            screen_index: index,
            capture_cursor: cursor,
        },
    };

    let crop = transform.crop;
    let visible_w = width.saturating_sub(crop.left + crop.right);
    let visible_h = height.saturating_sub(crop.top + crop.bottom);
    Ok(VideoBranch {
        capture,
        xpos: transform.position.0.max(0.0).round() as u32,
        ypos: transform.position.1.max(0.0).round() as u32,
        width: (visible_w as f32 * transform.scale.0).round() as u32,
        height: (visible_h as f32 * transform.scale.1).round() as u32,
        crop,
    })
}

fn audio_capture(kind: &str, settings: &Settings) -> Option<AudioCapture> {
    match (kind, host_platform()) {
        (kinds::DESKTOP_AUDIO_CAPTURE, HostPlatform::Linux) => Some(AudioCapture::PulseMonitor),
        (kinds::DESKTOP_AUDIO_CAPTURE, HostPlatform::Windows) => Some(AudioCapture::WasapiLoopback),
        (kinds::MICROPHONE_CAPTURE, HostPlatform::Linux) => {
            let device = settings
                .get_str("device_id")
                .filter(|id| *id != "default")
                .map(str::to_string);
            Some(AudioCapture::PulseInput { device })
        }
        (kinds::MICROPHONE_CAPTURE, HostPlatform::Windows) => Some(AudioCapture::WasapiInput),
        (kinds::MICROPHONE_CAPTURE, HostPlatform::MacOS) => Some(AudioCapture::OsxInput),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::Crop;

    #[test]
    fn congestion_tracks_late_pipelines() {
        assert_eq!(congestion_from_proportion(1.0), 0.0);
        assert_eq!(congestion_from_proportion(0.5), 0.0);
        assert_eq!(congestion_from_proportion(f64::NAN), 0.0);
        assert!((congestion_from_proportion(2.0) - 0.5).abs() < 1e-9);
        assert!((congestion_from_proportion(4.0) - 0.75).abs() < 1e-9);
    }

    fn monitor_settings() -> Settings {
        Settings::new()
            .with("monitor", 1)
            .with("x", -1080)
            .with("y", 200)
            .with("width", 1080)
            .with("height", 1920)
            .with("capture_cursor", true)
    }

    #[test]
    fn monitor_branch_uses_placement_and_crop() {
        let mut transform = ItemTransform::native_at(0, 200);
        transform.crop = Crop {
            left: 40,
            ..Crop::default()
        };
        let branch = monitor_branch(&monitor_settings(), &transform).unwrap();
        assert_eq!((branch.xpos, branch.ypos), (0, 200));
        assert_eq!((branch.width, branch.height), (1040, 1920));
        if host_platform() == HostPlatform::Linux {
            assert_eq!(
                branch.capture,
                ScreenCapture::X11 {
                    x: -1080,
                    y: 200,
                    width: 1080,
                    height: 1920,
                    show_pointer: true
                }
            );
        }
    }

    #[test]
    fn monitor_branch_requires_geometry() {
        let err = monitor_branch(&Settings::new().with("monitor", 0), &ItemTransform::native_at(0, 0))
            .unwrap_err();
        assert!(err.contains("missing 'x'"));
    }

    #[test]
    fn default_microphone_uses_default_device() {
        if host_platform() != HostPlatform::Linux {
            return;
        }
        let settings = Settings::new().with("device_id", "default");
        assert_eq!(
            audio_capture(kinds::MICROPHONE_CAPTURE, &settings),
            Some(AudioCapture::PulseInput { device: None })
        );
    }

    #[test]
    fn module_names_follow_platform_convention() {
        let framework = GstFramework::new();
        let file = framework.module_file_name("x264");
        assert!(file.contains("gstx264"));
    }
}
