use std::sync::Arc;
use std::time::Duration;

use panorama_capture_engine::backend::simulated::{Call, Faults, SimulatedFramework};
use panorama_capture_engine::framework::{
    kinds, ModuleLoadStatus, ObjectKind, VideoResetError, MAX_OUTPUT_SLOTS, SLOT_DESKTOP_AUDIO,
    SLOT_MICROPHONE, SLOT_SCENE,
};
use panorama_capture_engine::{run_recording, OutputProfile, Phase, PipelineSession};
use panorama_common::config::{FrameworkConfig, RecordingDefaults};
use panorama_common::error::PanoramaError;
use panorama_platform_core::MonitorDescriptor;

fn three_monitors() -> Vec<MonitorDescriptor> {
    let mut monitors = vec![
        MonitorDescriptor::new("main", 0, 0, 1920, 1080).with_primary(true),
        MonitorDescriptor::new("rotated", 1920, 0, 1080, 1920),
        MonitorDescriptor::new("left", -1080, 200, 1080, 1920),
    ];
    for (index, monitor) in monitors.iter_mut().enumerate() {
        monitor.index = index;
    }
    monitors
}

fn config() -> FrameworkConfig {
    FrameworkConfig {
        settle_delay_ms: 0,
        ..FrameworkConfig::default()
    }
}

fn recording_session(framework: &Arc<SimulatedFramework>) -> PipelineSession {
    recording_session_with(framework, RecordingDefaults::default())
}

fn recording_session_with(
    framework: &Arc<SimulatedFramework>,
    defaults: RecordingDefaults,
) -> PipelineSession {
    PipelineSession::new(
        framework.clone(),
        config(),
        OutputProfile::recording("capture.mp4", &defaults),
        three_monitors(),
    )
}

fn prepared(session: &mut PipelineSession) {
    session.init().unwrap();
    session.setup_sources().unwrap();
    session.setup_encoding().unwrap();
}

#[test]
fn recording_run_builds_canvas_and_releases_in_order() {
    let framework = Arc::new(SimulatedFramework::new());
    let mut session = recording_session(&framework);

    let summary = run_recording(&mut session, Duration::ZERO).unwrap();
    assert!(!summary.stop.forced);
    assert_eq!(session.phase(), Phase::ShutDown);
    assert_eq!(session.bitrate_kbps(), Some(6952));

    let calls = framework.calls();
    assert!(calls.contains(&Call::ResetVideo {
        width: 4080,
        height: 2120,
        fps: 10
    }));

    let positions: Vec<(f32, f32)> = calls
        .iter()
        .filter_map(|call| match call {
            Call::SetTransform { transform, .. } => Some(transform.position),
            _ => None,
        })
        .collect();
    assert_eq!(positions, vec![(1080.0, 0.0), (3000.0, 0.0), (0.0, 200.0)]);

    let startup = calls.iter().position(|c| *c == Call::Startup).unwrap();
    let first_load = calls
        .iter()
        .position(|c| matches!(c, Call::LoadModule(_)))
        .unwrap();
    assert!(startup < first_load);

    assert_eq!(
        framework.released_names(),
        vec![
            "output",
            "audio_encoder",
            "video_encoder",
            "Microphone",
            "Desktop Audio",
            "Monitor 0 - main",
            "Monitor 1 - rotated",
            "Monitor 2 - left",
            "Multi-Monitor Scene",
        ]
    );
    assert_eq!(calls.last(), Some(&Call::Shutdown));
    assert_eq!(framework.live_objects(), 0);
    assert_eq!(framework.double_releases(), 0);
    for slot in 0..MAX_OUTPUT_SLOTS {
        assert_eq!(framework.slot(slot), None);
    }
}

#[test]
fn slots_are_assigned_after_sources() {
    let framework = Arc::new(SimulatedFramework::new());
    let mut session = recording_session(&framework);
    session.init().unwrap();
    session.setup_sources().unwrap();

    assert!(framework.slot(SLOT_SCENE).is_some());
    assert!(framework.slot(SLOT_MICROPHONE).is_some());
    assert!(framework.slot(SLOT_DESKTOP_AUDIO).is_some());
    assert_eq!(session.monitor_sources().len(), 3);

    let settings = framework.settings_of("Monitor 2 - left").unwrap();
    assert_eq!(settings.get_int("x"), Some(-1080));
    assert_eq!(settings.get_int("monitor"), Some(2));
    assert_eq!(settings.get_bool("capture_cursor"), Some(true));
    assert_eq!(settings.get_bool("force_scaling"), Some(false));
}

#[test]
fn teardown_is_idempotent() {
    let framework = Arc::new(SimulatedFramework::new());
    let mut session = recording_session(&framework);
    prepared(&mut session);

    session.teardown();
    let calls_after_first = framework.calls().len();
    session.teardown();

    assert_eq!(framework.calls().len(), calls_after_first);
    assert_eq!(framework.shutdown_count(), 1);
    assert_eq!(framework.double_releases(), 0);
    assert!(matches!(
        session.init(),
        Err(PanoramaError::InvalidPhase { .. })
    ));
}

#[test]
fn failed_monitor_source_is_skipped() {
    let framework = Arc::new(SimulatedFramework::with_faults(
        Faults::default().reject_name("Monitor 1 - rotated"),
    ));
    let mut session = recording_session(&framework);
    prepared(&mut session);

    let names: Vec<&str> = session.monitor_sources().iter().map(|s| s.name()).collect();
    assert_eq!(names, vec!["Monitor 0 - main", "Monitor 2 - left"]);
    assert_eq!(session.phase(), Phase::EncodersReady);
}

#[test]
fn missing_audio_sources_are_tolerated() {
    let framework = Arc::new(SimulatedFramework::with_faults(
        Faults::default()
            .reject_kind(kinds::DESKTOP_AUDIO_CAPTURE)
            .reject_kind(kinds::MICROPHONE_CAPTURE),
    ));
    let mut session = recording_session(&framework);
    prepared(&mut session);

    assert!(!session.has_desktop_audio());
    assert!(!session.has_microphone());
    assert!(framework.slot(SLOT_MICROPHONE).is_none());
}

#[test]
fn encoder_fallback_takes_first_available() {
    let framework = Arc::new(SimulatedFramework::with_faults(
        Faults::default().reject_kind("x264enc"),
    ));
    let mut session = recording_session(&framework);
    prepared(&mut session);

    assert_eq!(session.encoder_names(), Some(("nvh264enc", "avenc_aac")));
    assert_eq!(framework.created(ObjectKind::VideoEncoder), vec!["nvh264enc"]);
}

#[test]
fn exhausted_encoder_candidates_tear_down() {
    let framework = Arc::new(SimulatedFramework::with_faults(
        Faults::default()
            .reject_kind("x264enc")
            .reject_kind("nvh264enc")
            .reject_kind("vah264enc")
            .reject_kind("amfh264enc"),
    ));
    let mut session = recording_session(&framework);
    session.init().unwrap();
    session.setup_sources().unwrap();

    match session.setup_encoding() {
        Err(PanoramaError::EncoderCreationFailed { kind, attempted }) => {
            assert_eq!(kind, "video");
            assert_eq!(attempted, vec!["x264enc", "nvh264enc", "vah264enc", "amfh264enc"]);
        }
        other => panic!("expected EncoderCreationFailed, got {other:?}"),
    }
    assert_eq!(session.phase(), Phase::ShutDown);
    assert_eq!(framework.live_objects(), 0);
    assert_eq!(framework.shutdown_count(), 1);
}

#[test]
fn core_start_failure_does_not_shut_down() {
    let framework = Arc::new(SimulatedFramework::with_faults(Faults {
        fail_startup: true,
        ..Faults::default()
    }));
    let mut session = recording_session(&framework);

    assert!(matches!(
        session.init(),
        Err(PanoramaError::CoreInitFailed { .. })
    ));
    assert_eq!(session.phase(), Phase::ShutDown);
    assert_eq!(framework.shutdown_count(), 0);
}

#[test]
fn video_reset_code_is_reported() {
    let framework = Arc::new(SimulatedFramework::with_faults(Faults {
        video_reset: Some(VideoResetError::NotSupported),
        ..Faults::default()
    }));
    let mut session = recording_session(&framework);

    let err = session.init().unwrap_err();
    assert!(err.to_string().contains("code -2"), "{err}");
    assert_eq!(framework.shutdown_count(), 1);
}

#[test]
fn module_failures_are_not_fatal() {
    let framework = Arc::new(SimulatedFramework::with_faults(
        Faults::default().module_status("x264", ModuleLoadStatus::MissingExports),
    ));
    let mut session = recording_session(&framework);
    session.init().unwrap();

    assert_eq!(
        session.failed_modules(),
        &[("x264".to_string(), ModuleLoadStatus::MissingExports)]
    );
    assert_eq!(session.phase(), Phase::CoreReady);
}

#[test]
fn scene_failure_releases_nothing_twice() {
    let framework = Arc::new(SimulatedFramework::with_faults(Faults {
        fail_scene: true,
        ..Faults::default()
    }));
    let mut session = recording_session(&framework);
    session.init().unwrap();

    assert!(matches!(
        session.setup_sources(),
        Err(PanoramaError::SceneCreationFailed { .. })
    ));
    assert_eq!(session.phase(), Phase::ShutDown);
    assert_eq!(framework.double_releases(), 0);
}

#[test]
fn recording_start_failure_tears_down() {
    let framework = Arc::new(SimulatedFramework::with_faults(Faults {
        output_start_error: Some("disk full".to_string()),
        ..Faults::default()
    }));
    let mut session = recording_session(&framework);
    prepared(&mut session);

    match session.start() {
        Err(PanoramaError::OutputStartFailed { message }) => assert_eq!(message, "disk full"),
        other => panic!("expected OutputStartFailed, got {other:?}"),
    }
    assert_eq!(session.phase(), Phase::ShutDown);
    assert_eq!(framework.live_objects(), 0);
}

#[test]
fn file_output_falls_back_to_matroska() {
    let framework = Arc::new(SimulatedFramework::with_faults(
        Faults::default().reject_kind(kinds::MP4_OUTPUT),
    ));
    let mut session = recording_session(&framework);
    prepared(&mut session);
    session.start().unwrap();

    assert_eq!(framework.created(ObjectKind::Output), vec!["matroska_output"]);
    let settings = framework.settings_of("output").unwrap();
    assert_eq!(settings.get_str("path"), Some("capture.mp4"));
}

#[test]
fn stop_before_start_is_rejected() {
    let framework = Arc::new(SimulatedFramework::new());
    let mut session = recording_session(&framework);
    prepared(&mut session);

    assert!(matches!(session.stop(), Err(PanoramaError::NotRunning)));
    assert_eq!(session.phase(), Phase::EncodersReady);
}

#[test]
fn slow_stop_within_timeout_is_graceful() {
    let framework = Arc::new(SimulatedFramework::with_faults(Faults {
        stop_lag_polls: 3,
        ..Faults::default()
    }));
    let defaults = RecordingDefaults {
        stop_timeout_ms: Some(1000),
        stop_poll_interval_ms: 5,
        ..RecordingDefaults::default()
    };
    let mut session = recording_session_with(&framework, defaults);
    prepared(&mut session);
    session.start().unwrap();

    let report = session.stop().unwrap();
    assert!(!report.forced);
    assert_eq!(report.waited, Duration::from_millis(15));
    assert!(!framework
        .calls()
        .iter()
        .any(|c| matches!(c, Call::OutputForceStop(_))));
    assert_eq!(session.phase(), Phase::Stopped);
}

#[test]
fn stop_timeout_forces_stop() {
    let framework = Arc::new(SimulatedFramework::with_faults(Faults {
        never_stops: true,
        ..Faults::default()
    }));
    let defaults = RecordingDefaults {
        stop_timeout_ms: Some(50),
        stop_poll_interval_ms: 10,
        ..RecordingDefaults::default()
    };
    let mut session = recording_session_with(&framework, defaults);
    prepared(&mut session);
    session.start().unwrap();

    let report = session.stop().unwrap();
    assert!(report.forced);
    assert_eq!(report.waited, Duration::from_millis(50));
    assert!(framework
        .calls()
        .iter()
        .any(|c| matches!(c, Call::OutputForceStop(_))));

    session.teardown();
    assert_eq!(framework.live_objects(), 0);
}
