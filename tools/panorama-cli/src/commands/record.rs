//! Record every monitor to a file.

use std::path::PathBuf;
use std::time::Duration;

use panorama_capture_engine::{run_recording, OutputProfile, PipelineSession};

use super::{print_monitor_table, RunContext};

pub fn run(
    ctx: &RunContext,
    duration_secs: Option<u64>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let defaults = &ctx.config.recording;
    let duration = Duration::from_secs(duration_secs.unwrap_or(defaults.duration_secs));
    let output = output.unwrap_or_else(|| defaults.output_path.clone());

    println!("Panorama Multi-Monitor Recorder");
    println!("{}", "=".repeat(50));
    println!("  Output: {}", output.display());
    println!("  Duration: {} seconds", duration.as_secs());
    println!("  FPS: {}", defaults.fps);
    if ctx.dry_run {
        println!("  Mode: dry run (simulated framework, nothing is written)");
    }
    println!("\nIMPORTANT: Grant screen and microphone permissions if prompted.");
    ctx.confirm("Press Enter to start...")?;

    let monitors = match ctx.monitors() {
        Ok(monitors) => monitors,
        Err(e) => {
            tracing::error!(error = %e, "Monitor enumeration failed");
            return Ok(());
        }
    };
    println!("Monitors detected: {}", monitors.len());
    print_monitor_table(&monitors);
    println!();

    let profile = OutputProfile::recording(&output, defaults);
    let mut session =
        PipelineSession::new(ctx.backend(), ctx.config.framework.clone(), profile, monitors);

    match run_recording(&mut session, duration) {
        Ok(summary) => {
            println!();
            println!("Recording saved to: {}", output.display());
            println!(
                "  Frames: {} captured, {} dropped ({:.2}%)",
                summary.stats.frames_captured,
                summary.stats.frames_dropped,
                summary.stats.drop_rate()
            );
            println!("  Written: {:.1} MB", summary.stats.megabytes_written());
            println!("  Elapsed: {:.1}s", summary.elapsed.as_secs_f64());
            if summary.stop.forced {
                println!("  Note: the output had to be force-stopped; the file may be truncated.");
            }
        }
        Err(e) => tracing::error!(error = %e, "Recording failed"),
    }
    Ok(())
}
