//! CLI argument parsing using clap

use crate::format::PixelFormat;
use crate::render::{ScalingMethod, StretchMode};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// framepool - render buffer pool and frame pipeline
///
/// Drives a simulated emulator thread and GUI thread through the pipeline
#[derive(Parser, Debug)]
#[command(name = "framepool")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Verbose output (can be repeated for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode - only show errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log output to file
    #[arg(long, global = true)]
    pub log: Option<String>,

    /// Configuration file (default: framepool.toml next to the executable)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the simulated pipeline
    Run {
        /// Frames to produce before stopping
        #[arg(short = 'n', long, default_value = "300")]
        frames: u64,

        /// Frame width
        #[arg(long, default_value = "256")]
        width: u32,

        /// Frame height
        #[arg(long, default_value = "240")]
        height: u32,

        /// Pixel format: xrgb8888, rgb565, rgb555, rgba8888, bgra8888
        #[arg(short, long, default_value = "xrgb8888")]
        format: PixelFormat,

        /// Emulator frame rate
        #[arg(long, default_value = "60")]
        fps: u32,

        /// GUI refresh rate
        #[arg(long, default_value = "60")]
        display_rate: u32,

        /// Pause playback after this many frames
        #[arg(long)]
        pause_at: Option<u64>,

        /// Flush the pipeline once this many frames were produced, as on a seek
        #[arg(long)]
        flush_at: Option<u64>,

        /// Always copy frames instead of alternating with zero-copy delivery
        #[arg(long)]
        copy_only: bool,

        /// Scaling method override: nearest, linear
        #[arg(long)]
        scaling: Option<ScalingMethod>,

        /// Stretch mode override: normal, 4:3, fullscreen, original
        #[arg(long)]
        stretch: Option<StretchMode>,

        /// Rotation override in degrees, counter-clockwise
        #[arg(long)]
        rotation: Option<u32>,

        /// Save the output surface as PNG when done
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// List available backends and their buffer pools
    Backends,

    /// Print a sample configuration file
    Config {
        /// Write the sample to this path instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Args {
    /// Get the log level based on verbose/quiet flags
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else {
            match self.verbose {
                0 => tracing::Level::INFO,
                1 => tracing::Level::DEBUG,
                _ => tracing::Level::TRACE,
            }
        }
    }

    /// Log filter directive, preferring flags over the configured level
    pub fn log_filter(&self, configured: &str) -> String {
        if self.quiet || self.verbose > 0 || configured.is_empty() {
            self.log_level().to_string().to_lowercase()
        } else {
            configured.to_string()
        }
    }
}

impl Default for Command {
    fn default() -> Self {
        Command::Run {
            frames: 300,
            width: 256,
            height: 240,
            format: PixelFormat::Xrgb8888,
            fps: 60,
            display_rate: 60,
            pause_at: None,
            flush_at: None,
            copy_only: false,
            scaling: None,
            stretch: None,
            rotation: None,
            snapshot: None,
        }
    }
}
