//! Adaptive bitrate planning.
//!
//! Bitrate scales linearly with pixel throughput relative to 1080p30, then
//! is clamped into the profile's bounds.

use panorama_platform_core::Canvas;

/// Pixel throughput of 1920x1080 at 30 fps.
pub const REFERENCE_PIXEL_RATE: u128 = 1920 * 1080 * 30;

/// Base bitrate and bounds, all in kbps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitratePolicy {
    pub base_kbps: u32,
    pub min_kbps: u32,
    pub max_kbps: u32,
}

impl BitratePolicy {
    pub fn new(base_kbps: u32, min_kbps: u32, max_kbps: u32) -> Self {
        Self {
            base_kbps,
            min_kbps,
            max_kbps,
        }
    }
}

/// Bitrate in kbps for `canvas` at `fps`.
///
/// Rounds half up. An inverted policy (min above max) yields `max_kbps`.
pub fn plan_bitrate(canvas: Canvas, fps: u32, policy: &BitratePolicy) -> u32 {
    let pixel_rate = canvas.width as u128 * canvas.height as u128 * fps as u128;
    let scaled = (policy.base_kbps as u128 * pixel_rate * 2 + REFERENCE_PIXEL_RATE)
        / (REFERENCE_PIXEL_RATE * 2);
    let scaled = u32::try_from(scaled).unwrap_or(u32::MAX);
    let bitrate = scaled.max(policy.min_kbps).min(policy.max_kbps);

    tracing::info!(
        width = canvas.width,
        height = canvas.height,
        fps,
        scaled_kbps = scaled,
        bitrate_kbps = bitrate,
        "Planned bitrate"
    );
    bitrate
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const RECORDING: BitratePolicy = BitratePolicy {
        base_kbps: 5000,
        min_kbps: 5000,
        max_kbps: 50_000,
    };

    fn canvas(width: u32, height: u32) -> Canvas {
        Canvas { width, height }
    }

    #[test]
    fn reference_rate_returns_base() {
        let policy = BitratePolicy::new(6000, 1000, 50_000);
        assert_eq!(plan_bitrate(canvas(1920, 1080), 30, &policy), 6000);
    }

    #[test]
    fn small_canvas_is_raised_to_floor() {
        // 1667 kbps before clamping
        assert_eq!(plan_bitrate(canvas(1920, 1080), 10, &RECORDING), 5000);
    }

    #[test]
    fn three_monitor_canvas_at_ten_fps() {
        // 5000 * 4080 * 2120 * 10 / 62_208_000 = 6952.2
        assert_eq!(plan_bitrate(canvas(4080, 2120), 10, &RECORDING), 6952);
    }

    #[test]
    fn huge_canvas_is_capped() {
        assert_eq!(plan_bitrate(canvas(15_360, 4320), 60, &RECORDING), 50_000);
    }

    #[test]
    fn streaming_user_bitrate_scales_with_fps() {
        let policy = BitratePolicy::new(5000, 1000, 50_000);
        assert_eq!(plan_bitrate(canvas(1920, 1080), 60, &policy), 10_000);
        assert_eq!(plan_bitrate(canvas(1920, 1080), 10, &policy), 1667);
    }

    #[test]
    fn inverted_policy_does_not_panic() {
        let policy = BitratePolicy::new(5000, 9000, 2000);
        assert_eq!(plan_bitrate(canvas(1920, 1080), 30, &policy), 2000);
    }

    proptest! {
        #[test]
        fn always_within_bounds(w in 1u32..20_000, h in 1u32..20_000, fps in 1u32..240, base in 0u32..100_000) {
            let policy = BitratePolicy::new(base, 1000, 50_000);
            let bitrate = plan_bitrate(canvas(w, h), fps, &policy);
            prop_assert!((1000..=50_000).contains(&bitrate));
        }

        #[test]
        fn monotonic_in_pixels_and_fps(w in 1u32..10_000, h in 1u32..10_000, fps in 1u32..120, dw in 0u32..1000, dfps in 0u32..30) {
            let low = plan_bitrate(canvas(w, h), fps, &RECORDING);
            let wider = plan_bitrate(canvas(w + dw, h), fps, &RECORDING);
            let faster = plan_bitrate(canvas(w, h), fps + dfps, &RECORDING);
            prop_assert!(wider >= low);
            prop_assert!(faster >= low);
        }
    }
}
