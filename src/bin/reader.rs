//! Consumer: attaches to a running producer's channel and prints records.
//!
//! Usage:
//!   eyefinder-reader                        # One record, human-readable
//!   eyefinder-reader --count 10 --json      # Ten records as JSON lines
//!   eyefinder-reader --clean                # Remove a crashed producer's channel

use std::time::Duration;

use clap::Parser;
use eyefinder::{ChannelConfig, ChannelReader, FrameRecord, SharedChannel};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "eyefinder-reader")]
#[command(author, version, about = "Read eye-gaze records from shared memory", long_about = None)]
struct Args {
    /// Semaphore name
    #[arg(long, default_value = eyefinder::DEFAULT_SEMAPHORE_NAME)]
    semaphore: String,

    /// Shared memory key
    #[arg(long, default_value_t = eyefinder::DEFAULT_SHM_KEY)]
    shm_key: i32,

    /// Number of records to read
    #[arg(short = 'n', long, default_value = "1")]
    count: usize,

    /// Delay between reads, in milliseconds
    #[arg(long, default_value = "100")]
    interval_ms: u64,

    /// Output as JSON lines
    #[arg(short, long)]
    json: bool,

    /// Remove the semaphore and segment left by a producer that died
    #[arg(long)]
    clean: bool,

    /// Show debug output
    #[arg(short, long)]
    verbose: bool,
}

/// JSON form of one record.
#[derive(Serialize)]
struct RecordOutput {
    frame_id: u8,
    left_eye: Vec<(i32, i32)>,
    right_eye: Vec<(i32, i32)>,
    left_pupil: (i32, i32),
    right_pupil: (i32, i32),
    theta: i64,
    alpha: i64,
}

impl From<&FrameRecord> for RecordOutput {
    fn from(record: &FrameRecord) -> Self {
        let f = &record.features;
        let pairs = |points: Vec<eyefinder::Point>| points.iter().map(|p| (p.x, p.y)).collect();
        Self {
            frame_id: record.frame_id.value(),
            left_eye: pairs(f.left_eye()),
            right_eye: pairs(f.right_eye()),
            left_pupil: (f.left_pupil().x, f.left_pupil().y),
            right_pupil: (f.right_pupil().x, f.right_pupil().y),
            theta: f.theta() as i64,
            alpha: f.alpha() as i64,
        }
    }
}

fn main() {
    let args = Args::parse();
    let default = if args.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run_reader(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run_reader(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = ChannelConfig {
        semaphore_name: args.semaphore.clone(),
        shm_key: args.shm_key,
    };

    if args.clean {
        let removed = SharedChannel::remove_stale(&config)?;
        println!(
            "{}",
            if removed {
                "Removed stale channel."
            } else {
                "Nothing to remove."
            }
        );
        return Ok(());
    }

    let reader = ChannelReader::attach(&config)?;
    for i in 0..args.count {
        if i > 0 {
            std::thread::sleep(Duration::from_millis(args.interval_ms));
        }
        let record = reader.read()?;
        if args.json {
            println!("{}", serde_json::to_string(&RecordOutput::from(&record))?);
        } else {
            println!("{}", format_human_readable(&record));
        }
    }
    Ok(())
}

fn format_human_readable(record: &FrameRecord) -> String {
    let f = &record.features;
    let eye = |points: Vec<eyefinder::Point>| {
        points
            .iter()
            .map(|p| format!("({},{})", p.x, p.y))
            .collect::<Vec<_>>()
            .join(" ")
    };
    let mut s = String::new();
    s.push_str(&format!("--- Frame {} ---\n", record.frame_id));
    s.push_str(&format!("Left eye:    {}\n", eye(f.left_eye())));
    s.push_str(&format!("Right eye:   {}\n", eye(f.right_eye())));
    s.push_str(&format!(
        "Pupils:      L ({}, {})  R ({}, {})\n",
        f.left_pupil().x,
        f.left_pupil().y,
        f.right_pupil().x,
        f.right_pupil().y
    ));
    s.push_str(&format!("Head angles: theta {}  alpha {}", f.theta(), f.alpha()));
    s
}
