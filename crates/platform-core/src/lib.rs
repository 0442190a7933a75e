//! Panorama platform core contracts.
//!
//! This crate contains the cross-platform display data structures used by
//! the capture engine without coupling to a concrete OS backend, plus the
//! canvas normalizer that turns raw virtual-desktop rectangles into
//! placements on one composited canvas.

pub mod layout;

use panorama_common::error::PanoramaResult;
use serde::{Deserialize, Serialize};

pub use layout::{normalize_layout, Canvas, CanvasLayout, CanvasPoint, PlacedMonitor};

/// Information about a connected monitor, as reported by the OS.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorDescriptor {
    /// Zero-based position in OS enumeration order.
    pub index: usize,
    /// Opaque device identifier.
    pub name: String,
    /// Position in the virtual desktop (pixels, may be negative).
    pub x: i32,
    pub y: i32,
    /// Resolution in physical pixels.
    pub width: u32,
    pub height: u32,
    /// Whether this monitor is primary.
    pub primary: bool,
    /// Scale factor (for example 1.0, 1.25, 2.0).
    pub scale_factor: f64,
    /// Refresh rate in Hz, 0 when unknown.
    pub refresh_rate_hz: u32,
}

impl MonitorDescriptor {
    /// A monitor with unit scale and unknown refresh rate.
    pub fn new(name: impl Into<String>, x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            index: 0,
            name: name.into(),
            x,
            y,
            width,
            height,
            primary: false,
            scale_factor: 1.0,
            refresh_rate_hz: 0,
        }
    }

    pub fn with_primary(mut self, primary: bool) -> Self {
        self.primary = primary;
        self
    }

    /// Right edge in virtual-desktop coordinates.
    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    /// Bottom edge in virtual-desktop coordinates.
    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }
}

/// Accumulates monitors during one enumeration pass.
///
/// Enumerators receive the context explicitly instead of writing into a
/// shared buffer; indices are assigned in the order monitors are pushed.
#[derive(Debug, Default)]
pub struct EnumerationContext {
    monitors: Vec<MonitorDescriptor>,
}

impl EnumerationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one monitor and return its assigned index.
    pub fn push(&mut self, mut monitor: MonitorDescriptor) -> usize {
        let index = self.monitors.len();
        monitor.index = index;
        tracing::info!(
            index,
            name = %monitor.name,
            width = monitor.width,
            height = monitor.height,
            x = monitor.x,
            y = monitor.y,
            primary = monitor.primary,
            "Found monitor"
        );
        self.monitors.push(monitor);
        index
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    pub fn into_monitors(self) -> Vec<MonitorDescriptor> {
        self.monitors
    }
}

/// Source of raw monitor geometry.
pub trait MonitorEnumerator {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Push every active display into `ctx`.
    fn enumerate(&self, ctx: &mut EnumerationContext) -> PanoramaResult<()>;
}

/// Run one enumeration pass.
pub fn enumerate_monitors(enumerator: &dyn MonitorEnumerator) -> PanoramaResult<Vec<MonitorDescriptor>> {
    tracing::debug!(backend = enumerator.name(), "Enumerating monitors");
    let mut ctx = EnumerationContext::new();
    enumerator.enumerate(&mut ctx)?;
    tracing::info!(count = ctx.len(), "Monitor enumeration complete");
    Ok(ctx.into_monitors())
}

/// Enumerator over a fixed list, used for dry runs and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticEnumerator {
    monitors: Vec<MonitorDescriptor>,
}

impl StaticEnumerator {
    pub fn new(monitors: Vec<MonitorDescriptor>) -> Self {
        Self { monitors }
    }

    /// One primary 1920x1080 monitor at the origin.
    pub fn single_full_hd() -> Self {
        Self::new(vec![
            MonitorDescriptor::new("VIRTUAL-1", 0, 0, 1920, 1080).with_primary(true)
        ])
    }
}

impl MonitorEnumerator for StaticEnumerator {
    fn name(&self) -> &str {
        "static"
    }

    fn enumerate(&self, ctx: &mut EnumerationContext) -> PanoramaResult<()> {
        for monitor in &self.monitors {
            ctx.push(monitor.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_follow_enumeration_order() {
        let enumerator = StaticEnumerator::new(vec![
            MonitorDescriptor::new("b", 1920, 0, 1920, 1080),
            MonitorDescriptor::new("a", 0, 0, 1920, 1080).with_primary(true),
        ]);
        let monitors = enumerate_monitors(&enumerator).unwrap();
        assert_eq!(monitors[0].index, 0);
        assert_eq!(monitors[0].name, "b");
        assert_eq!(monitors[1].index, 1);
        assert!(monitors[1].primary);
    }

    #[test]
    fn edges_do_not_overflow() {
        let monitor = MonitorDescriptor::new("far", i32::MAX, i32::MAX, u32::MAX, u32::MAX);
        assert_eq!(monitor.right(), i32::MAX as i64 + u32::MAX as i64);
        assert_eq!(monitor.bottom(), i32::MAX as i64 + u32::MAX as i64);
    }
}
