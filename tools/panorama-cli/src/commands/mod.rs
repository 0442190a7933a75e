pub mod check;
pub mod monitors;
pub mod record;
pub mod stream;

use std::io::BufRead;
use std::sync::Arc;

use panorama_capture_engine::{get_backend, BackendKind, Framework};
use panorama_common::config::AppConfig;
use panorama_common::error::PanoramaResult;
use panorama_platform_core::{enumerate_monitors, MonitorDescriptor, StaticEnumerator};
use panorama_platform_desktop::DesktopEnumerator;

/// Settings shared by every subcommand.
pub struct RunContext {
    pub config: AppConfig,
    pub dry_run: bool,
    pub assume_yes: bool,
}

impl RunContext {
    pub fn backend_kind(&self) -> BackendKind {
        if self.dry_run {
            BackendKind::Simulated
        } else {
            BackendKind::GStreamer
        }
    }

    pub fn backend(&self) -> Arc<dyn Framework> {
        get_backend(self.backend_kind())
    }

    pub fn monitors(&self) -> PanoramaResult<Vec<MonitorDescriptor>> {
        if self.dry_run {
            enumerate_monitors(&StaticEnumerator::single_full_hd())
        } else {
            enumerate_monitors(&DesktopEnumerator::new())
        }
    }

    /// Block until Enter unless `--yes` was given.
    pub fn confirm(&self, prompt: &str) -> anyhow::Result<()> {
        if self.assume_yes {
            return Ok(());
        }
        println!("\n{prompt}");
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        Ok(())
    }
}

pub fn print_monitor_table(monitors: &[MonitorDescriptor]) {
    for m in monitors {
        println!(
            "  [{}] {} {}x{} at ({}, {}) @ {}Hz (scale: {}x) {}",
            m.index,
            m.name,
            m.width,
            m.height,
            m.x,
            m.y,
            m.refresh_rate_hz,
            m.scale_factor,
            if m.primary { "(primary)" } else { "" }
        );
    }
}
