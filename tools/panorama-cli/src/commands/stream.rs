//! Stream every monitor to an RTMP server with interactive control.

use std::time::Duration;

use panorama_capture_engine::{
    run_streaming, OutputProfile, PipelineSession, QuitSignal, StreamController, TerminalKeys,
};

use super::{print_monitor_table, RunContext};

pub fn run(
    ctx: &RunContext,
    server: String,
    stream_key: String,
    fps: Option<i64>,
    bitrate_kbps: Option<i64>,
) -> anyhow::Result<()> {
    let defaults = &ctx.config.streaming;
    let profile = OutputProfile::streaming(
        server.as_str(),
        stream_key.as_str(),
        fps.unwrap_or(defaults.fps as i64),
        bitrate_kbps.unwrap_or(defaults.bitrate_kbps as i64),
        defaults,
    );

    println!("Panorama Multi-Monitor RTMP Streamer");
    println!("{}", "=".repeat(50));
    println!("  Server: {server}");
    println!("  Stream Key: {}", mask_stream_key(&stream_key));
    println!("  FPS: {}", profile.fps);
    println!("  Target Bitrate: {} kbps", profile.bitrate.base_kbps);
    if ctx.dry_run {
        println!("  Mode: dry run (simulated framework, nothing is sent)");
    }
    println!(
        "\nIMPORTANT: Make sure GStreamer is installed in {}",
        ctx.config.framework.install_dir.display()
    );
    ctx.confirm("Press Enter to continue...")?;

    let monitors = match ctx.monitors() {
        Ok(monitors) => monitors,
        Err(e) => {
            tracing::error!(error = %e, "Monitor enumeration failed");
            return Ok(());
        }
    };
    println!("Monitors detected: {}", monitors.len());
    print_monitor_table(&monitors);

    let session =
        PipelineSession::new(ctx.backend(), ctx.config.framework.clone(), profile, monitors);
    let controller = StreamController::new(session);
    let quit = QuitSignal::new();
    let mut keys = TerminalKeys;

    println!();
    println!("Controls (press the key, then Enter):");
    println!("  S - start streaming");
    println!("  T - stop streaming");
    println!("  I - stream statistics");
    println!("  Q - quit");
    println!();

    let poll = Duration::from_millis(defaults.key_poll_interval_ms);
    if let Err(e) = run_streaming(&controller, &mut keys, &quit, poll) {
        tracing::error!(error = %e, "Streaming session failed");
    }
    Ok(())
}

/// Show at most the first 8 characters of a stream key.
fn mask_stream_key(key: &str) -> String {
    if key.chars().count() > 8 {
        let visible: String = key.chars().take(8).collect();
        format!("{visible}...")
    } else {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_keys_are_masked() {
        assert_eq!(mask_stream_key("live_abcdef123456"), "live_abc...");
        assert_eq!(mask_stream_key("12345678"), "12345678");
        assert_eq!(mask_stream_key(""), "");
    }
}
