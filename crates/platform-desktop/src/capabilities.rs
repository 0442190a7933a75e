//! Capability detection and guidance.
//!
//! Panorama drives an externally installed media framework and needs a
//! graphical session to capture from. These checks run before anything
//! is started so missing pieces can be reported with a fix.

use std::path::Path;

use panorama_common::config::{FrameworkConfig, FRAMEWORK_DIR_ENV};

use crate::display::{detect_display_server, DisplayServer};

/// A system capability that Panorama may need.
#[derive(Debug, Clone)]
pub struct Capability {
    pub name: String,
    pub description: String,
    pub available: bool,
    pub required: bool,
    pub fix_instructions: Option<String>,
}

impl Capability {
    /// A named check whose fix is only shown when it is missing.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        available: bool,
        required: bool,
        fix: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            available,
            required,
            fix_instructions: (!available).then(|| fix.into()),
        }
    }
}

/// Check all platform capabilities.
pub fn check_capabilities(framework: &FrameworkConfig) -> Vec<Capability> {
    vec![
        check_framework_install(framework),
        check_plugin_dir(framework),
        check_graphical_session(),
        check_audio_access(),
    ]
}

/// Whether every required capability is present.
pub fn all_required_available(capabilities: &[Capability]) -> bool {
    capabilities
        .iter()
        .filter(|c| c.required)
        .all(|c| c.available)
}

fn check_framework_install(framework: &FrameworkConfig) -> Capability {
    let available = framework.install_dir.exists();
    Capability::new(
        "Media Framework",
        format!("Framework install at {}", framework.install_dir.display()),
        available,
        true,
        format!(
            "Install GStreamer to the default location or set {FRAMEWORK_DIR_ENV} / --framework-dir"
        ),
    )
}

fn check_plugin_dir(framework: &FrameworkConfig) -> Capability {
    let plugin_dir = framework.plugin_dir();
    Capability::new(
        "Framework Plugins",
        format!("Plugin modules in {}", plugin_dir.display()),
        plugin_dir.is_dir(),
        false,
        "Install the good/bad/ugly plugin sets; modules are also found via the system registry",
    )
}

fn check_graphical_session() -> Capability {
    let server = detect_display_server();
    let available = server != DisplayServer::Unknown;
    let description = match server {
        DisplayServer::Wayland => "Wayland session (monitor capture may require XWayland)",
        DisplayServer::X11 => "X11 session",
        DisplayServer::Windows => "Windows desktop",
        DisplayServer::MacOS => "macOS desktop",
        DisplayServer::Unknown => "No graphical session detected",
    };
    Capability::new(
        "Graphical Session",
        description,
        available,
        true,
        "Run from a graphical desktop session (DISPLAY or WAYLAND_DISPLAY must be set)",
    )
}

fn check_audio_access() -> Capability {
    let available = if cfg!(target_os = "linux") {
        std::env::var("XDG_RUNTIME_DIR")
            .map(|dir| Path::new(&dir).join("pulse").exists())
            .unwrap_or(false)
    } else {
        true
    };
    Capability::new(
        "Audio Capture",
        "Desktop audio and microphone capture (optional)",
        available,
        false,
        "Start PulseAudio or PipeWire (pipewire-pulse) to capture audio",
    )
}

/// Print a user-friendly capability report.
pub fn print_capability_report(capabilities: &[Capability]) {
    println!("Panorama System Capabilities:");
    println!("{}", "-".repeat(60));

    for cap in capabilities {
        let status = if cap.available {
            "[OK]"
        } else if cap.required {
            "[MISSING - REQUIRED]"
        } else {
            "[MISSING - OPTIONAL]"
        };

        println!("  {} {}: {}", status, cap.name, cap.description);

        if let Some(ref fix) = cap.fix_instructions {
            println!("    Fix: {fix}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn missing_install_is_required_and_has_fix() {
        let framework = FrameworkConfig {
            install_dir: PathBuf::from("/definitely/not/installed/here"),
            ..FrameworkConfig::default()
        };
        let cap = check_framework_install(&framework);
        assert!(!cap.available);
        assert!(cap.required);
        assert!(cap.fix_instructions.is_some());
        assert!(!all_required_available(&[cap]));
    }

    #[test]
    fn optional_gaps_do_not_block() {
        let caps = vec![
            Capability::new("a", "required", true, true, "n/a"),
            Capability::new("b", "optional", false, false, "install b"),
        ];
        assert!(all_required_available(&caps));
        assert!(caps[0].fix_instructions.is_none());
        assert_eq!(caps[1].fix_instructions.as_deref(), Some("install b"));
    }
}
