//! Display/monitor detection.

use panorama_common::error::{PanoramaError, PanoramaResult};
use panorama_platform_core::{EnumerationContext, MonitorDescriptor, MonitorEnumerator};

/// Enumerates monitors through the OS display APIs (`xcap`).
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopEnumerator;

impl DesktopEnumerator {
    pub fn new() -> Self {
        Self
    }
}

impl MonitorEnumerator for DesktopEnumerator {
    fn name(&self) -> &str {
        "desktop"
    }

    fn enumerate(&self, ctx: &mut EnumerationContext) -> PanoramaResult<()> {
        let monitors = xcap::Monitor::all()
            .map_err(|e| PanoramaError::platform(format!("Monitor enumeration failed: {e}")))?;

        for (position, monitor) in monitors.iter().enumerate() {
            match describe(monitor) {
                Ok(descriptor) if descriptor.width > 0 && descriptor.height > 0 => {
                    ctx.push(descriptor);
                }
                Ok(descriptor) => {
                    tracing::warn!(name = %descriptor.name, "Skipping monitor with empty geometry");
                }
                Err(e) => {
                    tracing::warn!(position, error = %e, "Skipping unreadable monitor");
                }
            }
        }
        Ok(())
    }
}

fn describe(monitor: &xcap::Monitor) -> Result<MonitorDescriptor, xcap::XCapError> {
    let mut descriptor = MonitorDescriptor::new(
        monitor.name()?,
        monitor.x()?,
        monitor.y()?,
        monitor.width()?,
        monitor.height()?,
    )
    .with_primary(monitor.is_primary()?);
    descriptor.scale_factor = monitor.scale_factor().map(f64::from).unwrap_or(1.0);
    descriptor.refresh_rate_hz = monitor.frequency().map(|hz| hz.round() as u32).unwrap_or(0);
    Ok(descriptor)
}

/// Display server / platform family the process runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayServer {
    Wayland,
    X11,
    Windows,
    MacOS,
    Unknown,
}

/// Detect the current display server.
pub fn detect_display_server() -> DisplayServer {
    if cfg!(target_os = "windows") {
        DisplayServer::Windows
    } else if cfg!(target_os = "macos") {
        DisplayServer::MacOS
    } else if std::env::var("WAYLAND_DISPLAY").is_ok() {
        DisplayServer::Wayland
    } else if std::env::var("DISPLAY").is_ok() {
        DisplayServer::X11
    } else {
        DisplayServer::Unknown
    }
}
