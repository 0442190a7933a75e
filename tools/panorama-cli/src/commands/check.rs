//! Check system capabilities.

use panorama_capture_engine::backend::{probe_runtime, REQUIRED_FACTORIES};
use panorama_platform_desktop::capabilities::{
    all_required_available, check_capabilities, print_capability_report,
};
use panorama_platform_desktop::{detect_display_server, DisplayServer};

use super::{print_monitor_table, RunContext};

pub fn run(ctx: &RunContext) -> anyhow::Result<()> {
    println!("Panorama System Check");
    println!("{}", "=".repeat(50));

    match detect_display_server() {
        DisplayServer::Unknown => println!("[WARN] Display server: Unknown"),
        server => println!("[OK] Display server: {server:?}"),
    }

    match ctx.monitors() {
        Ok(monitors) => {
            println!("[OK] Monitors detected: {}", monitors.len());
            print_monitor_table(&monitors);
        }
        Err(e) => println!("[WARN] Monitor enumeration failed: {e}"),
    }

    let mut ready = true;
    match probe_runtime(REQUIRED_FACTORIES) {
        Ok(probe) => {
            println!("[OK] GStreamer {}", probe.version);
            for (factory, available) in &probe.factories {
                if *available {
                    println!("     [OK] element '{factory}'");
                } else {
                    println!("     [MISSING] element '{factory}'");
                    ready = false;
                }
            }
        }
        Err(e) => {
            println!("[MISSING] GStreamer runtime: {e}");
            ready = false;
        }
    }

    let capabilities = check_capabilities(&ctx.config.framework);
    println!();
    print_capability_report(&capabilities);

    println!();
    if ready && all_required_available(&capabilities) {
        println!("All required capabilities are available. Panorama is ready.");
    } else {
        println!("Some required capabilities are missing. See above for fixes.");
    }

    Ok(())
}
