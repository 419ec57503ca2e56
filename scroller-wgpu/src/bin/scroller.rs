//! Scroller - clear-and-present demo window
//!
//! # Usage
//!
//! ```bash
//! scroller
//! scroller --config scroller.toml
//! scroller --width 800 --height 600 --depth --no-vsync
//! RUST_LOG=scroller_core=debug scroller
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use scroller_wgpu::{ScrollerConfig, run};

#[derive(Parser)]
#[command(name = "scroller")]
#[command(author, version, about = "Scrolling clear-color renderer")]
struct Args {
    /// TOML configuration file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Window width in logical pixels
    #[arg(long)]
    width: Option<u32>,

    /// Window height in logical pixels
    #[arg(long)]
    height: Option<u32>,

    /// Allocate a depth buffer sized to the window
    #[arg(long)]
    depth: bool,

    /// Frames the CPU may run ahead of the GPU (1-3)
    #[arg(long)]
    frames_in_flight: Option<usize>,

    /// Content offset change per second
    #[arg(long)]
    scroll_speed: Option<f64>,

    /// Force vertical sync on
    #[arg(long, conflicts_with = "no_vsync")]
    vsync: bool,

    /// Force vertical sync off
    #[arg(long)]
    no_vsync: bool,
}

impl Args {
    fn apply(&self, config: &mut ScrollerConfig) {
        if let Some(width) = self.width {
            config.window.width = width;
        }
        if let Some(height) = self.height {
            config.window.height = height;
        }
        if self.depth {
            config.renderer.use_depth_buffer = true;
        }
        if let Some(frames) = self.frames_in_flight {
            config.renderer.max_frames_in_flight = frames;
        }
        if let Some(speed) = self.scroll_speed {
            config.animation.scroll_speed = speed;
        }
        if self.vsync {
            config.window.vsync = true;
        } else if self.no_vsync {
            config.window.vsync = false;
        }
    }
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ScrollerConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ScrollerConfig::default(),
    };
    args.apply(&mut config);

    tracing::info!(
        "Starting {}x{} window, vsync {}",
        config.window.width,
        config.window.height,
        if config.window.vsync { "on" } else { "off" }
    );

    run(config)
}
