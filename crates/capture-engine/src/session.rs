//! Pipeline lifecycle management.
//!
//! A [`PipelineSession`] walks the framework through a fixed sequence of
//! phases and owns every object it acquires on the way:
//!
//! ```text
//! Uninitialized -> CoreReady -> SourcesReady -> EncodersReady -> Running
//!                                                    ^             |
//!                                                    |  (stream)   v
//!                                                    +-------- Stopped -> ShutDown
//! ```
//!
//! A forward step that fails tears down whatever was acquired so far and
//! leaves the session in [`Phase::ShutDown`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use panorama_common::clock::RunClock;
use panorama_common::config::FrameworkConfig;
use panorama_common::error::{PanoramaError, PanoramaResult};
use panorama_platform_core::{normalize_layout, CanvasLayout, MonitorDescriptor};

use crate::bitrate::plan_bitrate;
use crate::fallback::first_success;
use crate::framework::{
    kinds, AudioSettings, Framework, ItemId, ItemTransform, ModuleLoadStatus, ObjectId,
    ObjectKind, OutputStats, VideoSettings, MAX_OUTPUT_SLOTS, SLOT_DESKTOP_AUDIO,
    SLOT_MICROPHONE, SLOT_SCENE,
};
use crate::handle::OwnedHandle;
use crate::profile::OutputProfile;
use crate::settings::Settings;

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    CoreReady,
    SourcesReady,
    EncodersReady,
    Running,
    Stopped,
    ShutDown,
}

/// A monitor capture source and its place in the scene.
#[derive(Debug)]
pub struct MonitorSource {
    pub monitor_index: usize,
    pub item: ItemId,
    handle: OwnedHandle,
}

impl MonitorSource {
    pub fn id(&self) -> ObjectId {
        self.handle.id()
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }
}

/// Outcome of stopping a running output.
#[derive(Debug, Clone, PartialEq)]
pub struct StopReport {
    /// The output had to be force-stopped after the wait timed out.
    pub forced: bool,
    pub waited: Duration,
    /// Statistics read just before the output was released.
    pub stats: OutputStats,
}

/// Owns one run of the capture pipeline.
pub struct PipelineSession {
    framework: Arc<dyn Framework>,
    config: FrameworkConfig,
    profile: OutputProfile,
    monitors: Vec<MonitorDescriptor>,
    phase: Phase,
    core_started: bool,

    layout: Option<CanvasLayout>,
    bitrate_kbps: Option<u32>,
    failed_modules: Vec<(String, ModuleLoadStatus)>,
    run_clock: Option<RunClock>,

    scene: Option<OwnedHandle>,
    monitor_sources: Vec<MonitorSource>,
    desktop_audio: Option<OwnedHandle>,
    microphone: Option<OwnedHandle>,
    video_encoder: Option<OwnedHandle>,
    audio_encoder: Option<OwnedHandle>,
    service: Option<OwnedHandle>,
    output: Option<OwnedHandle>,
}

impl PipelineSession {
    /// Create a session for `monitors`. Nothing is acquired until [`init`](Self::init).
    pub fn new(
        framework: Arc<dyn Framework>,
        config: FrameworkConfig,
        profile: OutputProfile,
        monitors: Vec<MonitorDescriptor>,
    ) -> Self {
        Self {
            framework,
            config,
            profile,
            monitors,
            phase: Phase::Uninitialized,
            core_started: false,
            layout: None,
            bitrate_kbps: None,
            failed_modules: Vec::new(),
            run_clock: None,
            scene: None,
            monitor_sources: Vec::new(),
            desktop_audio: None,
            microphone: None,
            video_encoder: None,
            audio_encoder: None,
            service: None,
            output: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn profile(&self) -> &OutputProfile {
        &self.profile
    }

    /// Normalized monitor layout, available from `CoreReady` on.
    pub fn layout(&self) -> Option<&CanvasLayout> {
        self.layout.as_ref()
    }

    pub fn bitrate_kbps(&self) -> Option<u32> {
        self.bitrate_kbps
    }

    /// Modules that failed to load during init, with the reason.
    pub fn failed_modules(&self) -> &[(String, ModuleLoadStatus)] {
        &self.failed_modules
    }

    pub fn monitor_sources(&self) -> &[MonitorSource] {
        &self.monitor_sources
    }

    pub fn has_desktop_audio(&self) -> bool {
        self.desktop_audio.is_some()
    }

    pub fn has_microphone(&self) -> bool {
        self.microphone.is_some()
    }

    /// Type ids of the selected video and audio encoders.
    pub fn encoder_names(&self) -> Option<(&str, &str)> {
        match (&self.video_encoder, &self.audio_encoder) {
            (Some(video), Some(audio)) => Some((video.name(), audio.name())),
            _ => None,
        }
    }

    /// Start the framework core, load modules and reset the video and audio mix.
    pub fn init(&mut self) -> PanoramaResult<()> {
        self.expect_phase("init", &[Phase::Uninitialized])?;
        let result = self.try_init();
        self.advance(result, Phase::CoreReady)
    }

    /// Build the scene with one capture source per monitor, plus audio sources.
    pub fn setup_sources(&mut self) -> PanoramaResult<()> {
        self.expect_phase("setup_sources", &[Phase::CoreReady])?;
        let result = self.try_setup_sources();
        self.advance(result, Phase::SourcesReady)
    }

    /// Select encoders and bind them to the core mix.
    pub fn setup_encoding(&mut self) -> PanoramaResult<()> {
        self.expect_phase("setup_encoding", &[Phase::SourcesReady])?;
        let result = self.try_setup_encoding();
        self.advance(result, Phase::EncodersReady)
    }

    /// Create and start the output.
    ///
    /// For profiles that allow retrying, a failed start releases the output
    /// and keeps the current phase; otherwise the session is torn down.
    pub fn start(&mut self) -> PanoramaResult<()> {
        self.expect_phase("start", &[Phase::EncodersReady, Phase::Stopped])?;
        match self.try_start() {
            Ok(()) => {
                self.phase = Phase::Running;
                self.run_clock = Some(RunClock::start());
                tracing::info!(profile = self.profile.label(), "Output started");
                Ok(())
            }
            Err(e) if self.profile.retry_after_start_failure => {
                tracing::error!(error = %e, "Output start failed");
                Err(e)
            }
            Err(e) => self.advance(Err(e), Phase::Running),
        }
    }

    /// Stop the running output and release it.
    ///
    /// Waits for the output to go inactive according to the profile's stop
    /// schedule and force-stops it if the wait times out.
    pub fn stop(&mut self) -> PanoramaResult<StopReport> {
        if self.phase != Phase::Running {
            return Err(PanoramaError::NotRunning);
        }
        let Some(output) = self.output.take() else {
            self.phase = Phase::Stopped;
            return Err(PanoramaError::NotRunning);
        };

        tracing::info!(profile = self.profile.label(), "Stopping output");
        let (forced, waited) = self.halt_output(output.id());
        let stats = self.framework.output_stats(output.id());
        output.release();

        self.phase = Phase::Stopped;
        self.run_clock = None;
        tracing::info!(
            forced,
            waited_ms = waited.as_millis() as u64,
            frames = stats.frames_captured,
            dropped = stats.frames_dropped,
            "Output stopped"
        );
        Ok(StopReport {
            forced,
            waited,
            stats,
        })
    }

    /// Statistics of the running output.
    pub fn stats(&self) -> PanoramaResult<OutputStats> {
        match (&self.output, self.phase) {
            (Some(output), Phase::Running) => {
                let mut stats = self.framework.output_stats(output.id());
                if let Some(clock) = &self.run_clock {
                    stats.uptime_secs = clock.elapsed_secs();
                }
                Ok(stats)
            }
            _ => Err(PanoramaError::NotRunning),
        }
    }

    /// Release everything in reverse order of acquisition and shut the core down.
    ///
    /// Calling this more than once is harmless.
    pub fn teardown(&mut self) {
        if self.phase == Phase::ShutDown {
            return;
        }
        tracing::info!(phase = ?self.phase, "Tearing down pipeline");

        if let Some(id) = self.output.as_ref().map(OwnedHandle::id) {
            if self.framework.output_active(id) {
                self.halt_output(id);
            }
        }

        if self.core_started {
            for slot in 0..MAX_OUTPUT_SLOTS {
                self.framework.set_output_source(slot, None);
            }
        }

        drop(self.output.take());
        drop(self.service.take());
        drop(self.audio_encoder.take());
        drop(self.video_encoder.take());
        drop(self.microphone.take());
        drop(self.desktop_audio.take());
        for source in self.monitor_sources.drain(..) {
            drop(source);
        }
        drop(self.scene.take());

        if self.core_started {
            std::thread::sleep(Duration::from_millis(self.config.settle_delay_ms));
            self.framework.shutdown();
            self.core_started = false;
            tracing::info!(backend = self.framework.name(), "Framework shut down");
        }

        self.run_clock = None;
        self.phase = Phase::ShutDown;
    }

    fn expect_phase(&self, operation: &str, allowed: &[Phase]) -> PanoramaResult<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(PanoramaError::invalid_phase(operation, self.phase))
        }
    }

    fn advance(&mut self, result: PanoramaResult<()>, next: Phase) -> PanoramaResult<()> {
        match result {
            Ok(()) => {
                tracing::debug!(from = ?self.phase, to = ?next, "Phase advanced");
                self.phase = next;
                Ok(())
            }
            Err(e) => {
                tracing::error!(phase = ?self.phase, error = %e, "Pipeline step failed");
                self.teardown();
                Err(e)
            }
        }
    }

    fn try_init(&mut self) -> PanoramaResult<()> {
        let layout = normalize_layout(&self.monitors)?;
        let framework = Arc::clone(&self.framework);

        let data_template = self.config.module_data_template();
        framework.add_module_path(&self.config.bin_dir(), &data_template);
        framework.add_module_path(&self.config.plugin_dir(), &data_template);

        if !framework.startup(&self.config.locale) {
            return Err(PanoramaError::core_init(format!(
                "{} core failed to start",
                framework.name()
            )));
        }
        self.core_started = true;
        tracing::info!(backend = framework.name(), locale = %self.config.locale, "Framework started");

        let plugin_dir = self.config.plugin_dir();
        for module in &self.profile.modules {
            let file: PathBuf = plugin_dir.join(framework.module_file_name(module));
            let status = framework.load_module(&file, &self.config.module_data_dir(module));
            if status.is_success() {
                tracing::debug!(module = %module, "Loaded module");
            } else {
                let err = PanoramaError::ModuleLoadFailed {
                    module: module.clone(),
                    reason: status.to_string(),
                };
                tracing::warn!(path = %file.display(), "{err}");
                self.failed_modules.push((module.clone(), status));
            }
        }
        framework.post_load_modules();

        let video = VideoSettings::for_canvas(
            layout.canvas.width,
            layout.canvas.height,
            self.profile.fps,
        );
        framework.reset_video(&video).map_err(|e| {
            PanoramaError::core_init(format!("video reset failed with code {}: {e}", e.code()))
        })?;
        tracing::info!(
            width = video.base_width,
            height = video.base_height,
            fps = self.profile.fps,
            "Video reset"
        );

        let audio = AudioSettings::default();
        if !framework.reset_audio(&audio) {
            return Err(PanoramaError::core_init("audio reset failed"));
        }

        self.layout = Some(layout);
        Ok(())
    }

    fn try_setup_sources(&mut self) -> PanoramaResult<()> {
        let framework = Arc::clone(&self.framework);
        let placements = self
            .layout
            .as_ref()
            .map(|layout| layout.monitors.clone())
            .ok_or_else(|| PanoramaError::invalid_phase("setup_sources", self.phase))?;

        let scene_name = "Multi-Monitor Scene";
        let scene = framework
            .create_scene(scene_name)
            .ok_or_else(|| PanoramaError::scene(format!("framework refused '{scene_name}'")))?;
        let scene = OwnedHandle::new(Arc::clone(&framework), scene, ObjectKind::Scene, scene_name);

        for placed in &placements {
            let monitor = &placed.monitor;
            let name = format!("Monitor {} - {}", monitor.index, monitor.name);
            let settings = Settings::new()
                .with("monitor", monitor.index)
                .with("monitor_name", monitor.name.as_str())
                .with("x", monitor.x)
                .with("y", monitor.y)
                .with("width", monitor.width)
                .with("height", monitor.height)
                .with("capture_cursor", true)
                .with("compatibility", false)
                .with("force_scaling", false);

            let Some(id) = framework.create_source(kinds::MONITOR_CAPTURE, &name, &settings) else {
                let err = PanoramaError::SourceCreationFailed { source_name: name };
                tracing::warn!(monitor = monitor.index, "{err}; skipping monitor");
                continue;
            };
            let handle = OwnedHandle::new(Arc::clone(&framework), id, ObjectKind::Source, name);

            let Some(item) = framework.scene_add(scene.id(), id) else {
                tracing::warn!(monitor = monitor.index, "Could not add source to scene; skipping monitor");
                continue;
            };

            let transform = ItemTransform::native_at(placed.position.x, placed.position.y);
            framework.set_item_transform(item, &transform);

            match framework.item_transform(item) {
                Some(applied) => tracing::info!(
                    monitor = monitor.index,
                    x = applied.position.0,
                    y = applied.position.1,
                    width = monitor.width,
                    height = monitor.height,
                    "Placed monitor source"
                ),
                None => tracing::warn!(monitor = monitor.index, "Placement could not be read back"),
            }

            self.monitor_sources.push(MonitorSource {
                monitor_index: monitor.index,
                item,
                handle,
            });
        }

        if self.monitor_sources.is_empty() {
            tracing::warn!("No monitor sources were created; output will be blank");
        }

        self.desktop_audio = framework
            .create_source(kinds::DESKTOP_AUDIO_CAPTURE, "Desktop Audio", &Settings::new())
            .map(|id| OwnedHandle::new(Arc::clone(&framework), id, ObjectKind::Source, "Desktop Audio"));
        if self.desktop_audio.is_none() {
            tracing::warn!("Desktop audio capture unavailable");
        }

        let mic_settings = Settings::new().with("device_id", "default");
        self.microphone = framework
            .create_source(kinds::MICROPHONE_CAPTURE, "Microphone", &mic_settings)
            .map(|id| OwnedHandle::new(Arc::clone(&framework), id, ObjectKind::Source, "Microphone"));
        if self.microphone.is_none() {
            tracing::warn!("Microphone capture unavailable");
        }

        framework.set_output_source(SLOT_SCENE, Some(scene.id()));
        if let Some(mic) = &self.microphone {
            framework.set_output_source(SLOT_MICROPHONE, Some(mic.id()));
        }
        if let Some(desktop) = &self.desktop_audio {
            framework.set_output_source(SLOT_DESKTOP_AUDIO, Some(desktop.id()));
        }

        tracing::info!(
            monitors = self.monitor_sources.len(),
            desktop_audio = self.desktop_audio.is_some(),
            microphone = self.microphone.is_some(),
            "Sources ready"
        );
        self.scene = Some(scene);
        Ok(())
    }

    fn try_setup_encoding(&mut self) -> PanoramaResult<()> {
        let framework = Arc::clone(&self.framework);
        let canvas = self
            .layout
            .as_ref()
            .map(|layout| layout.canvas)
            .ok_or_else(|| PanoramaError::invalid_phase("setup_encoding", self.phase))?;

        let bitrate = plan_bitrate(canvas, self.profile.fps, &self.profile.bitrate);
        let video_settings = self.profile.video_encoder_settings(bitrate);
        let video = first_success(&self.profile.video_encoders, |kind| {
            framework.create_video_encoder(kind, "video_encoder", &video_settings)
        })
        .map_err(|e| PanoramaError::EncoderCreationFailed {
            kind: "video".to_string(),
            attempted: e.attempted,
        })?;
        tracing::info!(encoder = %video.candidate, bitrate_kbps = bitrate, "Video encoder selected");
        let video = OwnedHandle::new(
            Arc::clone(&framework),
            video.value,
            ObjectKind::VideoEncoder,
            video.candidate.as_str(),
        );

        let audio_settings = self.profile.audio_encoder_settings();
        let audio = first_success(&self.profile.audio_encoders, |kind| {
            framework.create_audio_encoder(kind, "audio_encoder", &audio_settings, 0)
        })
        .map_err(|e| PanoramaError::EncoderCreationFailed {
            kind: "audio".to_string(),
            attempted: e.attempted,
        })?;
        tracing::info!(encoder = %audio.candidate, "Audio encoder selected");
        let audio = OwnedHandle::new(
            Arc::clone(&framework),
            audio.value,
            ObjectKind::AudioEncoder,
            audio.candidate.as_str(),
        );

        framework.bind_encoder_to_mix(video.id());
        framework.bind_encoder_to_mix(audio.id());

        self.bitrate_kbps = Some(bitrate);
        self.video_encoder = Some(video);
        self.audio_encoder = Some(audio);
        Ok(())
    }

    fn try_start(&mut self) -> PanoramaResult<()> {
        let framework = Arc::clone(&self.framework);
        let (video, audio) = match (&self.video_encoder, &self.audio_encoder) {
            (Some(video), Some(audio)) => (video.id(), audio.id()),
            _ => return Err(PanoramaError::invalid_phase("start", self.phase)),
        };

        if self.service.is_none() {
            if let Some(settings) = self.profile.service_settings() {
                let id = framework
                    .create_service(kinds::RTMP_CUSTOM_SERVICE, "rtmp_service", &settings)
                    .ok_or_else(|| PanoramaError::output_start("failed to create streaming service"))?;
                self.service = Some(OwnedHandle::new(
                    Arc::clone(&framework),
                    id,
                    ObjectKind::Service,
                    "rtmp_service",
                ));
            }
        }

        let output_settings = self.profile.output_settings();
        let selected = first_success(&self.profile.outputs, |kind| {
            framework.create_output(kind, "output", &output_settings)
        })
        .map_err(|e| {
            PanoramaError::output_start(format!(
                "no output could be created (tried: {})",
                e.attempted.join(", ")
            ))
        })?;
        let output = OwnedHandle::new(
            Arc::clone(&framework),
            selected.value,
            ObjectKind::Output,
            selected.candidate.as_str(),
        );
        tracing::info!(output = %selected.candidate, "Output created");

        if let Some(reconnect) = self.profile.reconnect_settings() {
            framework.output_update(output.id(), &reconnect);
        }

        framework.output_set_video_encoder(output.id(), video);
        framework.output_set_audio_encoder(output.id(), audio, 0);
        if let Some(service) = &self.service {
            framework.output_set_service(output.id(), service.id());
        }

        if !framework.output_start(output.id()) {
            let message = framework
                .output_last_error(output.id())
                .unwrap_or_else(|| format!("{} refused to start", selected.candidate));
            return Err(PanoramaError::output_start(message));
        }

        self.output = Some(output);
        Ok(())
    }

    /// Request a graceful stop and wait; force-stop on timeout.
    fn halt_output(&self, output: ObjectId) -> (bool, Duration) {
        let framework = &self.framework;
        framework.output_stop(output);
        let outcome = self
            .profile
            .stop
            .wait_until(|| !framework.output_active(output));

        if outcome.timed_out() {
            let err = PanoramaError::StopTimeout {
                waited_ms: outcome.waited().as_millis() as u64,
            };
            tracing::warn!("{err}; forcing stop");
            framework.output_force_stop(output);
        }
        (outcome.timed_out(), outcome.waited())
    }
}

impl Drop for PipelineSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::simulated::SimulatedFramework;
    use panorama_common::config::RecordingDefaults;

    fn quick_config() -> FrameworkConfig {
        FrameworkConfig {
            settle_delay_ms: 0,
            ..FrameworkConfig::default()
        }
    }

    fn session(framework: Arc<SimulatedFramework>) -> PipelineSession {
        PipelineSession::new(
            framework,
            quick_config(),
            OutputProfile::recording("test.mp4", &RecordingDefaults::default()),
            vec![MonitorDescriptor::new("DP-1", 0, 0, 1920, 1080).with_primary(true)],
        )
    }

    #[test]
    fn out_of_order_call_has_no_side_effects() {
        let framework = Arc::new(SimulatedFramework::new());
        let mut session = session(framework.clone());

        let err = session.setup_encoding().unwrap_err();
        assert!(matches!(err, PanoramaError::InvalidPhase { .. }));
        assert_eq!(session.phase(), Phase::Uninitialized);
        assert!(framework.calls().is_empty());
    }

    #[test]
    fn empty_monitor_list_aborts_init() {
        let framework = Arc::new(SimulatedFramework::new());
        let mut session = PipelineSession::new(
            framework.clone(),
            quick_config(),
            OutputProfile::recording("test.mp4", &RecordingDefaults::default()),
            Vec::new(),
        );

        assert!(matches!(session.init(), Err(PanoramaError::NoDisplaysFound)));
        assert_eq!(session.phase(), Phase::ShutDown);
        assert_eq!(framework.shutdown_count(), 0);
    }

    #[test]
    fn stop_before_start_is_rejected() {
        let framework = Arc::new(SimulatedFramework::new());
        let mut session = session(framework);
        session.init().unwrap();
        assert!(matches!(session.stop(), Err(PanoramaError::NotRunning)));
        assert_eq!(session.phase(), Phase::CoreReady);
    }

    #[test]
    fn drop_tears_down() {
        let framework = Arc::new(SimulatedFramework::new());
        {
            let mut session = session(framework.clone());
            session.init().unwrap();
            session.setup_sources().unwrap();
        }
        assert_eq!(framework.shutdown_count(), 1);
        assert_eq!(framework.live_objects(), 0);
    }
}
