//! In-memory framework that records every call.
//!
//! Used for dry runs and tests. Faults can be injected to exercise every
//! failure path of the lifecycle manager without a real media stack.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::framework::{
    AudioSettings, Framework, ItemId, ItemTransform, ModuleLoadStatus, ObjectId, ObjectKind,
    OutputStats, VideoResetError, VideoSettings, MAX_OUTPUT_SLOTS,
};
use crate::settings::Settings;

/// Failures to inject.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    pub fail_startup: bool,
    pub video_reset: Option<VideoResetError>,
    pub fail_audio_reset: bool,
    pub fail_scene: bool,

    /// Type ids whose creation is refused (encoders, outputs, sources).
    pub rejected_kinds: HashSet<String>,

    /// Object names whose creation is refused.
    pub rejected_names: HashSet<String>,

    /// Load status per module name. Unlisted modules load.
    pub module_statuses: HashMap<String, ModuleLoadStatus>,

    /// Make `output_start` fail with this message.
    pub output_start_error: Option<String>,

    /// Number of "still active" answers after a stop request.
    pub stop_lag_polls: u32,

    /// The output only stops when forced.
    pub never_stops: bool,

    /// Congestion reported by running outputs.
    pub congestion: f64,
}

impl Faults {
    pub fn reject_kind(mut self, kind: &str) -> Self {
        self.rejected_kinds.insert(kind.to_string());
        self
    }

    pub fn reject_name(mut self, name: &str) -> Self {
        self.rejected_names.insert(name.to_string());
        self
    }

    pub fn module_status(mut self, module: &str, status: ModuleLoadStatus) -> Self {
        self.module_statuses.insert(module.to_string(), status);
        self
    }
}

/// One recorded framework call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    AddModulePath(PathBuf),
    Startup,
    LoadModule(String),
    PostLoad,
    ResetVideo { width: u32, height: u32, fps: u32 },
    ResetAudio,
    Create { kind: String, name: String, id: Option<ObjectId> },
    SceneAdd { scene: ObjectId, source: ObjectId },
    SetTransform { item: ItemId, transform: ItemTransform },
    SetSlot { slot: u32, source: Option<ObjectId> },
    BindMix(ObjectId),
    OutputStart(ObjectId),
    OutputStop(ObjectId),
    OutputForceStop(ObjectId),
    Release(ObjectId),
    Shutdown,
}

#[derive(Debug)]
struct SimObject {
    kind: ObjectKind,
    type_id: String,
    name: String,
    settings: Settings,
    releases: u32,
}

#[derive(Debug)]
struct SimOutput {
    started: Instant,
    fps: u32,
    stop_requested: bool,
    lag_remaining: u32,
    active: bool,
}

#[derive(Debug, Default)]
struct SimState {
    next_id: u64,
    core_running: bool,
    shutdowns: u32,
    objects: HashMap<ObjectId, SimObject>,
    items: HashMap<ItemId, (ObjectId, ItemTransform)>,
    slots: HashMap<u32, ObjectId>,
    video: Option<VideoSettings>,
    outputs: HashMap<ObjectId, SimOutput>,
    last_errors: HashMap<ObjectId, String>,
    calls: Vec<Call>,
}

/// Framework double backed by in-memory bookkeeping.
#[derive(Debug, Default)]
pub struct SimulatedFramework {
    faults: Faults,
    state: Mutex<SimState>,
}

impl SimulatedFramework {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: Faults) -> Self {
        Self {
            faults,
            state: Mutex::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Names of released objects, in release order.
    pub fn released_names(&self) -> Vec<String> {
        let state = self.state();
        state
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Release(id) => state.objects.get(id).map(|o| o.name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Objects created and not yet released.
    pub fn live_objects(&self) -> usize {
        self.state()
            .objects
            .values()
            .filter(|o| o.releases == 0)
            .count()
    }

    /// Objects released more than once.
    pub fn double_releases(&self) -> usize {
        self.state()
            .objects
            .values()
            .filter(|o| o.releases > 1)
            .count()
    }

    /// Type id of every created object with this kind, in creation order.
    pub fn created(&self, kind: ObjectKind) -> Vec<String> {
        let state = self.state();
        let mut objects: Vec<_> = state
            .objects
            .iter()
            .filter(|(_, o)| o.kind == kind)
            .map(|(id, o)| (*id, o.type_id.clone()))
            .collect();
        objects.sort();
        objects.into_iter().map(|(_, type_id)| type_id).collect()
    }

    /// Settings an object was created with.
    pub fn settings_of(&self, name: &str) -> Option<Settings> {
        self.state()
            .objects
            .values()
            .find(|o| o.name == name)
            .map(|o| o.settings.clone())
    }

    pub fn slot(&self, slot: u32) -> Option<ObjectId> {
        self.state().slots.get(&slot).copied()
    }

    pub fn video(&self) -> Option<VideoSettings> {
        self.state().video.clone()
    }

    pub fn core_running(&self) -> bool {
        self.state().core_running
    }

    pub fn shutdown_count(&self) -> u32 {
        self.state().shutdowns
    }

    fn create(
        &self,
        kind: ObjectKind,
        type_id: &str,
        name: &str,
        settings: &Settings,
    ) -> Option<ObjectId> {
        let mut state = self.state();
        let refused = !state.core_running
            || self.faults.rejected_kinds.contains(type_id)
            || self.faults.rejected_names.contains(name)
            || (kind == ObjectKind::Scene && self.faults.fail_scene);

        let id = if refused {
            None
        } else {
            state.next_id += 1;
            let id = ObjectId(state.next_id);
            state.objects.insert(
                id,
                SimObject {
                    kind,
                    type_id: type_id.to_string(),
                    name: name.to_string(),
                    settings: settings.clone(),
                    releases: 0,
                },
            );
            Some(id)
        };
        state.calls.push(Call::Create {
            kind: type_id.to_string(),
            name: name.to_string(),
            id,
        });
        id
    }
}

impl Framework for SimulatedFramework {
    fn name(&self) -> &str {
        "simulated"
    }

    fn startup(&self, _locale: &str) -> bool {
        let mut state = self.state();
        state.calls.push(Call::Startup);
        state.core_running = !self.faults.fail_startup;
        state.core_running
    }

    fn shutdown(&self) {
        let mut state = self.state();
        state.calls.push(Call::Shutdown);
        state.core_running = false;
        state.shutdowns += 1;
    }

    fn add_module_path(&self, bin_path: &Path, _data_path: &Path) {
        self.state()
            .calls
            .push(Call::AddModulePath(bin_path.to_path_buf()));
    }

    fn module_file_name(&self, module: &str) -> String {
        format!("{module}.module")
    }

    fn load_module(&self, module_file: &Path, _data_path: &Path) -> ModuleLoadStatus {
        let module = module_file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let status = self
            .faults
            .module_statuses
            .get(&module)
            .copied()
            .unwrap_or(ModuleLoadStatus::Success);
        self.state().calls.push(Call::LoadModule(module));
        status
    }

    fn post_load_modules(&self) {
        self.state().calls.push(Call::PostLoad);
    }

    fn reset_video(&self, video: &VideoSettings) -> Result<(), VideoResetError> {
        let mut state = self.state();
        state.calls.push(Call::ResetVideo {
            width: video.base_width,
            height: video.base_height,
            fps: video.fps(),
        });
        if let Some(err) = self.faults.video_reset {
            return Err(err);
        }
        if video.base_width == 0 || video.base_height == 0 {
            return Err(VideoResetError::InvalidParam);
        }
        state.video = Some(video.clone());
        Ok(())
    }

    fn reset_audio(&self, _audio: &AudioSettings) -> bool {
        self.state().calls.push(Call::ResetAudio);
        !self.faults.fail_audio_reset
    }

    fn create_scene(&self, name: &str) -> Option<ObjectId> {
        self.create(ObjectKind::Scene, "scene", name, &Settings::new())
    }

    fn create_source(&self, kind: &str, name: &str, settings: &Settings) -> Option<ObjectId> {
        self.create(ObjectKind::Source, kind, name, settings)
    }

    fn scene_add(&self, scene: ObjectId, source: ObjectId) -> Option<ItemId> {
        let mut state = self.state();
        state.calls.push(Call::SceneAdd { scene, source });
        if !state.objects.contains_key(&scene) || !state.objects.contains_key(&source) {
            return None;
        }
        let item = ItemId(state.items.len() as u64 + 1);
        state
            .items
            .insert(item, (source, ItemTransform::native_at(0, 0)));
        Some(item)
    }

    fn set_item_transform(&self, item: ItemId, transform: &ItemTransform) {
        let mut state = self.state();
        state.calls.push(Call::SetTransform {
            item,
            transform: *transform,
        });
        if let Some(entry) = state.items.get_mut(&item) {
            entry.1 = *transform;
        }
    }

    fn item_transform(&self, item: ItemId) -> Option<ItemTransform> {
        self.state().items.get(&item).map(|(_, t)| *t)
    }

    fn set_output_source(&self, slot: u32, source: Option<ObjectId>) {
        let mut state = self.state();
        state.calls.push(Call::SetSlot { slot, source });
        if slot >= MAX_OUTPUT_SLOTS {
            return;
        }
        match source {
            Some(id) => state.slots.insert(slot, id),
            None => state.slots.remove(&slot),
        };
    }

    fn create_video_encoder(&self, kind: &str, name: &str, settings: &Settings) -> Option<ObjectId> {
        self.create(ObjectKind::VideoEncoder, kind, name, settings)
    }

    fn create_audio_encoder(
        &self,
        kind: &str,
        name: &str,
        settings: &Settings,
        _mixer: usize,
    ) -> Option<ObjectId> {
        self.create(ObjectKind::AudioEncoder, kind, name, settings)
    }

    fn bind_encoder_to_mix(&self, encoder: ObjectId) {
        self.state().calls.push(Call::BindMix(encoder));
    }

    fn create_service(&self, kind: &str, name: &str, settings: &Settings) -> Option<ObjectId> {
        self.create(ObjectKind::Service, kind, name, settings)
    }

    fn create_output(&self, kind: &str, name: &str, settings: &Settings) -> Option<ObjectId> {
        self.create(ObjectKind::Output, kind, name, settings)
    }

    fn output_set_video_encoder(&self, _output: ObjectId, _encoder: ObjectId) {}

    fn output_set_audio_encoder(&self, _output: ObjectId, _encoder: ObjectId, _track: usize) {}

    fn output_set_service(&self, _output: ObjectId, _service: ObjectId) {}

    fn output_update(&self, output: ObjectId, settings: &Settings) {
        if let Some(object) = self.state().objects.get_mut(&output) {
            object.settings.merge(settings);
        }
    }

    fn output_start(&self, output: ObjectId) -> bool {
        let mut state = self.state();
        state.calls.push(Call::OutputStart(output));
        if let Some(message) = &self.faults.output_start_error {
            state.last_errors.insert(output, message.clone());
            return false;
        }
        let fps = state.video.as_ref().map(VideoSettings::fps).unwrap_or(30);
        state.outputs.insert(
            output,
            SimOutput {
                started: Instant::now(),
                fps,
                stop_requested: false,
                lag_remaining: self.faults.stop_lag_polls,
                active: true,
            },
        );
        true
    }

    fn output_stop(&self, output: ObjectId) {
        let mut state = self.state();
        state.calls.push(Call::OutputStop(output));
        if let Some(run) = state.outputs.get_mut(&output) {
            run.stop_requested = true;
        }
    }

    fn output_force_stop(&self, output: ObjectId) {
        let mut state = self.state();
        state.calls.push(Call::OutputForceStop(output));
        if let Some(run) = state.outputs.get_mut(&output) {
            run.active = false;
        }
    }

    fn output_active(&self, output: ObjectId) -> bool {
        let mut state = self.state();
        let Some(run) = state.outputs.get_mut(&output) else {
            return false;
        };
        if run.active && run.stop_requested && !self.faults.never_stops {
            if run.lag_remaining == 0 {
                run.active = false;
            } else {
                run.lag_remaining -= 1;
            }
        }
        run.active
    }

    fn output_last_error(&self, output: ObjectId) -> Option<String> {
        self.state().last_errors.get(&output).cloned()
    }

    fn output_stats(&self, output: ObjectId) -> OutputStats {
        let state = self.state();
        let Some(run) = state.outputs.get(&output) else {
            return OutputStats::default();
        };
        let uptime_secs = run.started.elapsed().as_secs_f64();
        let frames_captured = (uptime_secs * run.fps as f64) as u64;
        OutputStats {
            frames_captured,
            frames_dropped: 0,
            bytes_written: frames_captured * 4096,
            uptime_secs,
            congestion: self.faults.congestion,
        }
    }

    fn release(&self, object: ObjectId) {
        let mut state = self.state();
        state.calls.push(Call::Release(object));
        if let Some(run) = state.outputs.get_mut(&object) {
            run.active = false;
        }
        match state.objects.get_mut(&object) {
            Some(o) => o.releases += 1,
            None => tracing::warn!(id = object.0, "Release of unknown object"),
        }
    }
}
