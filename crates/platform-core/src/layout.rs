//! Canvas normalization.
//!
//! The canvas is the bounding box of every monitor. Placements are
//! translated so the top-left-most edge sits at (0, 0).

use panorama_common::error::{PanoramaError, PanoramaResult};
use serde::{Deserialize, Serialize};

use crate::MonitorDescriptor;

/// Size of the composited output frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

/// A non-negative offset on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasPoint {
    pub x: u32,
    pub y: u32,
}

/// A monitor together with its normalized canvas position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedMonitor {
    pub monitor: MonitorDescriptor,
    pub position: CanvasPoint,
}

/// Normalized layout of every enumerated monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasLayout {
    pub monitors: Vec<PlacedMonitor>,
    pub canvas: Canvas,
    /// Virtual-desktop coordinates of the canvas origin.
    pub origin: (i32, i32),
}

impl CanvasLayout {
    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    pub fn primary(&self) -> Option<&PlacedMonitor> {
        self.monitors.iter().find(|m| m.monitor.primary)
    }
}

/// Compute the canvas and every monitor's normalized position.
///
/// Fails with [`PanoramaError::NoDisplaysFound`] for an empty input.
pub fn normalize_layout(monitors: &[MonitorDescriptor]) -> PanoramaResult<CanvasLayout> {
    let min_x = monitors.iter().map(|m| m.x).min();
    let min_y = monitors.iter().map(|m| m.y).min();
    let max_x = monitors.iter().map(MonitorDescriptor::right).max();
    let max_y = monitors.iter().map(MonitorDescriptor::bottom).max();

    let (Some(min_x), Some(min_y), Some(max_x), Some(max_y)) = (min_x, min_y, max_x, max_y) else {
        return Err(PanoramaError::NoDisplaysFound);
    };

    let placed = monitors
        .iter()
        .map(|monitor| {
            let position = CanvasPoint {
                x: span(min_x as i64, monitor.x as i64),
                y: span(min_y as i64, monitor.y as i64),
            };
            tracing::debug!(
                index = monitor.index,
                x = position.x,
                y = position.y,
                "Adjusted monitor position"
            );
            PlacedMonitor {
                monitor: monitor.clone(),
                position,
            }
        })
        .collect::<Vec<_>>();

    let canvas = Canvas {
        width: span(min_x as i64, max_x),
        height: span(min_y as i64, max_y),
    };

    tracing::info!(
        width = canvas.width,
        height = canvas.height,
        monitors = placed.len(),
        "Canvas computed"
    );

    Ok(CanvasLayout {
        monitors: placed,
        canvas,
        origin: (min_x, min_y),
    })
}

fn span(from: i64, to: i64) -> u32 {
    u32::try_from(to - from).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rect(name: &str, x: i32, y: i32, w: u32, h: u32) -> MonitorDescriptor {
        MonitorDescriptor::new(name, x, y, w, h)
    }

    #[test]
    fn empty_input_has_no_displays() {
        assert!(matches!(
            normalize_layout(&[]),
            Err(PanoramaError::NoDisplaysFound)
        ));
    }

    #[test]
    fn single_monitor_sits_at_origin() {
        let layout = normalize_layout(&[rect("solo", -300, 120, 2560, 1440)]).unwrap();
        assert_eq!(layout.monitors[0].position, CanvasPoint { x: 0, y: 0 });
        assert_eq!(
            layout.canvas,
            Canvas {
                width: 2560,
                height: 1440
            }
        );
        assert_eq!(layout.origin, (-300, 120));
    }

    #[test]
    fn rotated_and_negative_layout() {
        let layout = normalize_layout(&[
            rect("main", 0, 0, 1920, 1080),
            rect("rotated", 1920, 0, 1080, 1920),
            rect("left", -1080, 200, 1080, 1920),
        ])
        .unwrap();

        let positions: Vec<_> = layout.monitors.iter().map(|m| m.position).collect();
        assert_eq!(
            positions,
            vec![
                CanvasPoint { x: 1080, y: 0 },
                CanvasPoint { x: 3000, y: 0 },
                CanvasPoint { x: 0, y: 200 },
            ]
        );
        assert_eq!(
            layout.canvas,
            Canvas {
                width: 4080,
                height: 2120
            }
        );
    }

    #[test]
    fn primary_lookup() {
        let layout = normalize_layout(&[
            rect("a", 0, 0, 1920, 1080),
            rect("b", 1920, 0, 1920, 1080).with_primary(true),
        ])
        .unwrap();
        assert_eq!(layout.primary().map(|m| m.monitor.name.as_str()), Some("b"));
    }

    fn monitor_strategy() -> impl Strategy<Value = MonitorDescriptor> {
        (-8000i32..8000, -8000i32..8000, 1u32..8000, 1u32..8000)
            .prop_map(|(x, y, w, h)| MonitorDescriptor::new("gen", x, y, w, h))
    }

    proptest! {
        #[test]
        fn normalized_positions_touch_origin(monitors in prop::collection::vec(monitor_strategy(), 1..6)) {
            let layout = normalize_layout(&monitors).unwrap();
            let min_x = layout.monitors.iter().map(|m| m.position.x).min().unwrap();
            let min_y = layout.monitors.iter().map(|m| m.position.y).min().unwrap();
            prop_assert_eq!(min_x, 0);
            prop_assert_eq!(min_y, 0);
        }

        #[test]
        fn canvas_is_bounding_box(monitors in prop::collection::vec(monitor_strategy(), 1..6)) {
            let layout = normalize_layout(&monitors).unwrap();
            let min_x = monitors.iter().map(|m| m.x as i64).min().unwrap();
            let min_y = monitors.iter().map(|m| m.y as i64).min().unwrap();
            let max_x = monitors.iter().map(|m| m.right()).max().unwrap();
            let max_y = monitors.iter().map(|m| m.bottom()).max().unwrap();
            prop_assert_eq!(layout.canvas.width as i64, max_x - min_x);
            prop_assert_eq!(layout.canvas.height as i64, max_y - min_y);
        }

        #[test]
        fn every_monitor_fits_inside_canvas(monitors in prop::collection::vec(monitor_strategy(), 1..6)) {
            let layout = normalize_layout(&monitors).unwrap();
            for placed in &layout.monitors {
                prop_assert!(placed.position.x as u64 + placed.monitor.width as u64 <= layout.canvas.width as u64);
                prop_assert!(placed.position.y as u64 + placed.monitor.height as u64 <= layout.canvas.height as u64);
            }
        }
    }
}
