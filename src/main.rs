//! framepool - simulated emulator and GUI threads driving the frame pipeline

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use framepool::backend::{self, SoftwareFactory, SOFTWARE_RENDER_SYSTEM};
use framepool::config::{Args, Command, PipelineConfig};
use framepool::format::PixelFormat;
use framepool::render::{RenderManager, RendererRegistry, ScalingMethod, StretchMode};
use framepool::session::{Session, SessionConfig};

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::load_default()?,
    };

    // Initialize logging
    init_logging(&args, &config)?;

    // Execute command
    match args.command.unwrap_or_default() {
        Command::Run {
            frames,
            width,
            height,
            format,
            fps,
            display_rate,
            pause_at,
            flush_at,
            copy_only,
            scaling,
            stretch,
            rotation,
            snapshot,
        } => cmd_run(
            config,
            RunOptions {
                frames,
                width,
                height,
                format,
                fps,
                display_rate,
                pause_at,
                flush_at,
                copy_only,
                scaling,
                stretch,
                rotation,
                snapshot,
            },
        ),
        Command::Backends => cmd_backends(&config),
        Command::Config { output } => cmd_config(output),
    }
}

fn init_logging(args: &Args, config: &PipelineConfig) -> Result<()> {
    let level = args.log_filter(&config.log_level);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let log_file = args
        .log
        .clone()
        .or_else(|| (!config.log_file.is_empty()).then(|| config.log_file.clone()));

    if let Some(log_file) = log_file {
        let file = std::fs::File::create(&log_file)
            .with_context(|| format!("Failed to create log file '{}'", log_file))?;
        subscriber
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();
    } else {
        subscriber.init();
    }

    Ok(())
}

struct RunOptions {
    frames: u64,
    width: u32,
    height: u32,
    format: PixelFormat,
    fps: u32,
    display_rate: u32,
    pause_at: Option<u64>,
    flush_at: Option<u64>,
    copy_only: bool,
    scaling: Option<ScalingMethod>,
    stretch: Option<StretchMode>,
    rotation: Option<u32>,
    snapshot: Option<PathBuf>,
}

/// Run the simulated pipeline
fn cmd_run(config: PipelineConfig, options: RunOptions) -> Result<()> {
    println!("framepool {} - frame pipeline simulation\n", framepool::VERSION);

    if !config.backend.eq_ignore_ascii_case(SOFTWARE_RENDER_SYSTEM) {
        bail!("Backend '{}' cannot be driven by `run`", config.backend);
    }

    let factory = SoftwareFactory::new(config.surface_width, config.surface_height);
    let factory = Arc::new(match config.max_buffers() {
        Some(max) => factory.with_max_buffers(max),
        None => factory,
    });

    let mut registry = RendererRegistry::new();
    registry.register(factory.clone());

    let mut manager_config = config.to_manager_config();
    if let Some(scaling) = options.scaling {
        manager_config.video_settings.scaling_method = scaling;
    }
    if let Some(stretch) = options.stretch {
        manager_config.video_settings.stretch_mode = stretch;
    }
    if let Some(rotation) = options.rotation {
        manager_config.video_settings.rotation_degrees = rotation;
    }
    let manager = Arc::new(RenderManager::new(&registry, manager_config));

    let mut session = Session::new(
        manager.clone(),
        SessionConfig {
            width: options.width,
            height: options.height,
            format: options.format,
            frames: Some(options.frames),
            fps: options.fps,
            display_rate: options.display_rate,
            pause_at: options.pause_at,
            zero_copy: !options.copy_only,
            view_width: config.surface_width,
            view_height: config.surface_height,
        },
    );

    // Setup Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!("\nReceived Ctrl+C, stopping...");
        r.store(false, Ordering::SeqCst);
    }) {
        error!("Failed to install Ctrl+C handler: {}", e);
    }

    if let Err(e) = session.start() {
        error!("Failed to start session: {}", e);
        return Err(e.into());
    }
    println!(
        "Producing {} frames of {}x{} {}. Press Ctrl+C to stop.\n",
        options.frames, options.width, options.height, options.format
    );

    // Wait for the producer or Ctrl+C
    let mut flush_at = options.flush_at;
    while running.load(Ordering::SeqCst) && !session.is_finished() {
        if let Some(at) = flush_at {
            if session.stats().frames_produced >= at {
                info!("Flushing pipeline after {} frames", at);
                if let Err(e) = session.flush() {
                    error!("Failed to flush session: {}", e);
                }
                flush_at = None;
            }
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    let stats = session.stop();

    println!("Frames produced:  {}", stats.frames_produced);
    println!("Frames added:     {}", stats.render.frames_added);
    println!("  zero-copy:      {}", stats.render.zero_copy_frames);
    println!("Frames dropped:   {}", stats.render.frames_dropped);
    println!("Frames drawn:     {}", stats.render.frames_rendered);
    println!("Uploads:          {}", stats.render.uploads);
    println!("GUI ticks:        {}", stats.ticks);
    for pool in &stats.pools {
        println!(
            "Pool {} ({}): {} allocations, {} reuses, {} failures, {} free",
            pool.id,
            pool.backend,
            pool.stats.allocations,
            pool.stats.reuses,
            pool.stats.failures,
            pool.stats.free
        );
    }

    if let Some(path) = options.snapshot {
        factory
            .snapshot()
            .save(&path)
            .with_context(|| format!("Failed to save snapshot to '{}'", path.display()))?;
        info!("Saved surface snapshot to {}", path.display());
        println!("\nSnapshot saved to {}", path.display());
    }

    manager.deinitialize();
    println!("Stopped.");
    Ok(())
}

/// List available backends
fn cmd_backends(config: &PipelineConfig) -> Result<()> {
    let mut registry = RendererRegistry::new();
    for name in backend::BACKEND_NAMES {
        if let Some(factory) = backend::create_factory(
            name,
            config.surface_width,
            config.surface_height,
            config.max_buffers(),
        ) {
            registry.register(factory);
        }
    }

    if registry.is_empty() {
        println!("No backends available.");
        return Ok(());
    }

    let manager = RenderManager::new(&registry, config.to_manager_config());
    println!("Available backends:\n");

    for (i, factory) in manager.buffer_manager().factories().iter().enumerate() {
        let name = factory.render_system_name();
        println!("  {}. {}", i + 1, name);

        for pool in manager.buffer_manager().get_pools(name) {
            let scaling: Vec<&str> = ScalingMethod::ALL
                .iter()
                .filter(|method| pool.supports_scaling_method(**method))
                .map(|method| method.name())
                .collect();
            println!("     pool {}: scaling {}", pool.id(), scaling.join(", "));
        }
    }

    println!();
    Ok(())
}

/// Print or write a sample configuration
fn cmd_config(output: Option<PathBuf>) -> Result<()> {
    let sample = PipelineConfig::sample_config();
    match output {
        Some(path) => {
            std::fs::write(&path, sample)
                .with_context(|| format!("Failed to write '{}'", path.display()))?;
            println!("Sample configuration written to {}", path.display());
        }
        None => print!("{}", sample),
    }
    Ok(())
}
