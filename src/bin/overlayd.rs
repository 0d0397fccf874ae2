//! overlayd - live detection overlay daemon
//!
//! This daemon:
//! 1. Loads configuration (file + environment, then command-line overrides)
//! 2. Connects the configured video source and detector backend
//! 3. Runs one overlay session until Ctrl-C, `--seconds` elapses, or the
//!    connection closes
//!
//! Overlays and telemetry go to the log; run with `RUST_LOG=debug` to see
//! every rendered box.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

use live_overlay::config::OverlaydConfig;
use live_overlay::{
    AdaptiveScheduler, BackendRegistry, Dimensions, LogRenderer, LogTelemetry, Session,
    SyntheticSource, SystemClock,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Detector backend name (overrides OVERLAY_BACKEND / config file).
    #[arg(long)]
    backend: Option<String>,
    /// Stop after this many seconds (runs until Ctrl-C when omitted).
    #[arg(long)]
    seconds: Option<u64>,
    /// Target detection rate used for the initial delay.
    #[arg(long)]
    target_fps: Option<u32>,
    /// Working resolution as WIDTHxHEIGHT.
    #[arg(long, value_parser = Dimensions::parse)]
    working_size: Option<Dimensions>,
    /// Log every Nth telemetry snapshot.
    #[arg(long, default_value_t = 15)]
    telemetry_every: u64,
    /// Print registered detector backends and exit.
    #[arg(long)]
    list_backends: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let registry = BackendRegistry::with_builtin();
    if args.list_backends {
        for name in registry.list() {
            println!("{}", name);
        }
        return Ok(());
    }

    let mut config = OverlaydConfig::load()?;
    if let Some(backend) = args.backend {
        config.backend = backend.to_lowercase();
    }
    if let Some(fps) = args.target_fps {
        config.scheduler.target_fps = fps;
    }
    if let Some(size) = args.working_size {
        config.scheduler.working_size = size;
    }
    config.validate()?;

    let detector = registry.create(&config.backend)?;
    let mut source = SyntheticSource::new(config.source.clone())
        .with_context(|| format!("opening source {}", config.source.url))?;
    source.connect()?;

    let clock = Arc::new(SystemClock);
    let scheduler = AdaptiveScheduler::new(
        config.scheduler.clone(),
        Box::new(source),
        detector,
        clock.clone(),
    )?
    .with_renderer(Box::new(LogRenderer))
    .with_telemetry(Box::new(LogTelemetry::new(args.telemetry_every)));

    let (session, handle) = Session::new(scheduler, clock);
    log::info!(
        "overlayd running: session={} source={} backend={} working={} target_fps={}",
        handle.id(),
        config.source.url,
        config.backend,
        config.scheduler.working_size,
        config.scheduler.target_fps
    );

    let ctrlc_handle = handle.clone();
    ctrlc::set_handler(move || {
        log::info!("shutdown signal received, closing session...");
        let _ = ctrlc_handle.close();
    })
    .context("error setting Ctrl-C handler")?;

    if let Some(seconds) = args.seconds {
        let timer_handle = handle.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(seconds));
            log::info!("run time of {}s reached, closing session", seconds);
            let _ = timer_handle.close();
        });
    }

    // The synthetic camera is local: the peer connects and its stream is
    // available immediately.
    handle.connected()?;
    handle.stream_acquired()?;

    let summary = session.run();
    log::info!(
        "overlayd stopped: session={} frames={} stats={:?}",
        summary.id,
        summary.frames_processed,
        summary.stats
    );
    Ok(())
}
