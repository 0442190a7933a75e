//! Show detected monitors and the canvas they compose.

use panorama_platform_core::normalize_layout;

use super::{print_monitor_table, RunContext};

pub fn run(ctx: &RunContext, json: bool) -> anyhow::Result<()> {
    let monitors = ctx.monitors()?;
    let layout = normalize_layout(&monitors)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&layout)?);
        return Ok(());
    }

    println!("Monitors detected: {}", monitors.len());
    print_monitor_table(&monitors);
    println!();
    println!(
        "Canvas: {}x{} (origin {}, {})",
        layout.canvas.width, layout.canvas.height, layout.origin.0, layout.origin.1
    );
    for placed in &layout.monitors {
        println!(
            "  [{}] {} -> canvas ({}, {})",
            placed.monitor.index, placed.monitor.name, placed.position.x, placed.position.y
        );
    }
    Ok(())
}
