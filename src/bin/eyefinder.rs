//! Producer: replays a recorded session and publishes gaze features.
//!
//! Usage:
//!   eyefinder session.jsonl                     # Default channel (/capstone, 123456)
//!   eyefinder session.jsonl --config eye.json   # Settings from a JSON file
//!   eyefinder session.jsonl --linger-secs 5     # Keep the channel up after the last frame

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use eyefinder::{run_until, Config, FeatureExtractor, Publisher, ReplaySession, SharedChannel};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "eyefinder")]
#[command(author, version, about = "Publish per-frame eye-gaze features over shared memory", long_about = None)]
struct Args {
    /// Replay manifest (JSON lines of {"image", "landmarks"})
    #[arg(required = true)]
    manifest: PathBuf,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the semaphore name
    #[arg(long)]
    semaphore: Option<String>,

    /// Override the shared memory key
    #[arg(long)]
    shm_key: Option<i32>,

    /// Override the frame resize factor
    #[arg(long)]
    scale: Option<f32>,

    /// Seconds to keep the channel alive after the last frame
    #[arg(long, default_value = "0")]
    linger_secs: u64,

    /// Show debug output
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = run_producer(&args) {
        tracing::error!(error = %e, "eyefinder failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_config(args: &Args) -> eyefinder::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(name) = &args.semaphore {
        config.channel.semaphore_name = name.clone();
    }
    if let Some(key) = args.shm_key {
        config.channel.shm_key = key;
    }
    if let Some(scale) = args.scale {
        config.frame.scale = scale;
    }
    Ok(config)
}

/// Sleep until `duration` has passed or `shutdown` is raised.
fn linger(duration: Duration, shutdown: &AtomicBool) {
    let deadline = Instant::now() + duration;
    while !shutdown.load(Ordering::Acquire) {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        std::thread::sleep((deadline - now).min(Duration::from_millis(50)));
    }
}

fn run_producer(args: &Args) -> eyefinder::Result<()> {
    // SIGINT/SIGTERM only raise the flag so the channel is dropped normally.
    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || handler_flag.store(true, Ordering::Release)).map_err(|e| {
        eyefinder::Error::InvalidConfig(format!("cannot install signal handler: {e}"))
    })?;

    let config = load_config(args)?;
    tracing::debug!(?config, "configuration");

    let extractor = FeatureExtractor::from_config(&config)?;
    let session = ReplaySession::load(&args.manifest, config.frame.scale)?;
    tracing::info!(frames = session.len(), manifest = %args.manifest.display(), "session loaded");
    let (mut frames, mut landmarks) = session.split();

    let channel = SharedChannel::create(&config.channel)?;
    let mut publisher = Publisher::new(channel);
    let stats = run_until(&mut frames, &mut landmarks, &extractor, &mut publisher, &shutdown)?;

    if args.verbose {
        eprintln!(
            "{} frame(s): {} published, {} bad, {} failed",
            stats.frames, stats.published, stats.bad_frames, stats.failed_frames
        );
    }
    if args.linger_secs > 0 && !stats.interrupted {
        tracing::info!(seconds = args.linger_secs, "holding channel open");
        linger(Duration::from_secs(args.linger_secs), &shutdown);
    }
    Ok(())
}
