// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use reel_media::backends::Facing;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "reel-media")]
#[command(about = "Short-video capture, trimming and feed preloading tools")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Config file (default: <config dir>/reel-media/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show recording formats this machine supports and the one that would be used
    Formats,

    /// Trim a clip to the target length by stream copy
    Trim {
        /// Source clip
        input: PathBuf,

        /// Source duration in seconds
        #[arg(long)]
        source_duration: f64,

        /// Start offset in seconds (clamped to the valid range)
        #[arg(short, long, default_value = "0")]
        start: f64,

        /// Output file path (default: <input>_trimmed.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write a JPEG thumbnail of the first frame here
        #[arg(long)]
        thumbnail: Option<PathBuf>,
    },

    /// Print the preload window for a scroll position
    Window {
        /// Scroll offset in pixels
        #[arg(long)]
        offset: f64,

        /// Height of one post in pixels
        #[arg(long, default_value = "600")]
        extent: f64,

        /// Number of posts in the feed
        #[arg(long, default_value = "20")]
        posts: usize,
    },

    /// Record a clip from simulated devices and report it
    CaptureDemo {
        /// Camera to open
        #[arg(long, value_enum, default_value = "user")]
        facing: FacingArg,

        /// Stop after this many seconds instead of waiting for the cutoff
        #[arg(long)]
        stop_after: Option<f64>,

        /// Simulate a missing microphone
        #[arg(long)]
        no_microphone: bool,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum FacingArg {
    User,
    Environment,
}

impl From<FacingArg> for Facing {
    fn from(arg: FacingArg) -> Self {
        match arg {
            FacingArg::User => Facing::User,
            FacingArg::Environment => Facing::Environment,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=reel_media=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config = cli::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Formats => cli::show_formats(),
        Commands::Trim {
            input,
            source_duration,
            start,
            output,
            thumbnail,
        } => cli::trim_clip(&config, input, source_duration, start, output, thumbnail),
        Commands::Window {
            offset,
            extent,
            posts,
        } => cli::show_window(&config, offset, extent, posts),
        Commands::CaptureDemo {
            facing,
            stop_after,
            no_microphone,
        } => cli::capture_demo(&config, facing.into(), stop_after, no_microphone),
    }
}
