//! Panorama CLI: record or stream every monitor as one canvas.
//!
//! Usage:
//!   panorama record [DURATION_SECS] [OUTPUT_PATH]
//!   panorama stream <SERVER_URL> <STREAM_KEY> [FPS] [BITRATE_KBPS]
//!   panorama monitors          Show the detected monitor layout
//!   panorama check             Check system capabilities

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use panorama_common::config::{AppConfig, LoggingConfig};

mod commands;

use commands::RunContext;

#[derive(Parser)]
#[command(
    name = "panorama",
    about = "Record or stream all monitors composited onto one canvas",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Rehearse against a simulated framework and a single virtual monitor
    #[arg(long, global = true)]
    dry_run: bool,

    /// Do not wait for Enter before starting
    #[arg(short = 'y', long = "yes", global = true)]
    assume_yes: bool,

    /// JSON configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Media framework install root
    #[arg(long, global = true, value_name = "DIR")]
    framework_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record all monitors and audio to a file
    Record {
        /// Recording length in seconds [default: 10]
        duration_secs: Option<u64>,

        /// Output file [default: multi_monitor_recording.mp4]
        output: Option<PathBuf>,
    },

    /// Stream all monitors and audio to an RTMP server
    #[command(after_help = "Examples:
  YouTube:  panorama stream \"rtmp://a.rtmp.youtube.com/live2\" \"your-stream-key\"
  Twitch:   panorama stream \"rtmp://live.twitch.tv/app\" \"your-stream-key\"
  Custom:   panorama stream \"rtmp://your-server.com/live\" \"stream-key\" 30 5000")]
    Stream {
        /// RTMP server URL
        server: String,

        /// Stream key
        stream_key: String,

        /// Frame rate, clamped to 10-60 [default: 30]
        #[arg(allow_negative_numbers = true)]
        fps: Option<i64>,

        /// Bitrate in kbps at 1080p30, clamped to 1000-50000 [default: 5000]
        #[arg(allow_negative_numbers = true)]
        bitrate_kbps: Option<i64>,
    },

    /// List monitors and the composited canvas
    Monitors {
        /// Print the layout as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check system capabilities
    Check,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
            let _ = e.print();
            return code;
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AppConfig::from_env(),
    };
    if let Some(dir) = cli.framework_dir {
        config.framework.install_dir = dir;
    }

    panorama_common::logging::init_logging(&LoggingConfig {
        level: if cli.verbose {
            "debug".to_string()
        } else {
            config.logging.level.clone()
        },
        json: cli.json_logs || config.logging.json,
    });

    let ctx = RunContext {
        config,
        dry_run: cli.dry_run,
        assume_yes: cli.assume_yes,
    };

    match cli.command {
        Commands::Record {
            duration_secs,
            output,
        } => commands::record::run(&ctx, duration_secs, output),
        Commands::Stream {
            server,
            stream_key,
            fps,
            bitrate_kbps,
        } => commands::stream::run(&ctx, server, stream_key, fps, bitrate_kbps),
        Commands::Monitors { json } => commands::monitors::run(&ctx, json),
        Commands::Check => commands::check::run(&ctx),
    }
}
