//! groundd - ground-plane distance monitor
//!
//! 1. Loads configuration (file named by GROUND_MONITOR_CONFIG, env, flags)
//! 2. Calibrates from preloaded points or from clicks typed on stdin
//! 3. Maps every detected person onto the ground plane
//! 4. Appends one line per violating pair to the violation log

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ground_monitor::ingest::open_source;
use ground_monitor::{BackendRegistry, LogDisplay, Mode, Monitor, MonitorConfig, StdinOperator};

#[derive(Parser, Debug)]
#[command(name = "groundd", about = "Monitor ground-plane distances between people")]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Violation threshold in meters
    #[arg(long, value_name = "METERS")]
    threshold: Option<f64>,

    /// Violation log file (appended, never truncated)
    #[arg(long, value_name = "PATH")]
    log_path: Option<PathBuf>,

    /// Frame source: stub://<name> or an image directory
    #[arg(long, value_name = "URL")]
    source: Option<String>,

    /// Detector backend name
    #[arg(long, value_name = "NAME")]
    detector: Option<String>,

    /// Stop after this many frames
    #[arg(long, value_name = "N")]
    frames: Option<u64>,

    /// List detector backends and exit
    #[arg(long)]
    list_detectors: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let registry = BackendRegistry::with_builtin_backends();
    if args.list_detectors {
        for name in registry.list() {
            println!("{name}");
        }
        return Ok(());
    }

    let mut cfg = match args.config.as_deref() {
        Some(path) => MonitorConfig::load_from(Some(path))?,
        None => MonitorConfig::load()?,
    };
    if let Some(threshold) = args.threshold {
        cfg.distance_threshold = threshold;
    }
    if let Some(path) = args.log_path {
        cfg.log_path = path;
    }
    if let Some(url) = args.source {
        cfg.source.url = url;
    }
    if let Some(name) = args.detector {
        cfg.detector.name = name;
    }
    if args.frames.is_some() {
        cfg.source.frame_limit = args.frames;
    }
    cfg.validate()?;

    let quit = Arc::new(AtomicBool::new(false));
    {
        let quit = Arc::clone(&quit);
        ctrlc::set_handler(move || quit.store(true, Ordering::SeqCst))?;
    }

    let mut monitor = Monitor::from_config(&cfg, &registry)?;
    let mut source = open_source(&cfg.source)?;

    log::info!(
        "groundd running: source={} detector={} threshold={:.2} m log={}",
        cfg.source.url,
        cfg.detector.name,
        cfg.distance_threshold,
        cfg.log_path.display()
    );
    if monitor.mode() == Mode::Calibrating {
        log::info!(
            "calibration: type {} pixel clicks as `x y`, each followed by its ground X and Y \
             in meters; `q` quits",
            cfg.calibration.min_points
        );
    }

    let mut operator = StdinOperator::stdio(Arc::clone(&quit));
    let mut display = LogDisplay::new();
    let stats = monitor.run(source.as_mut(), &mut operator, &mut display, &quit)?;
    log::info!(
        "frames={} measuring={} pairs={} violations={} unlogged={} skipped={}",
        stats.frames,
        stats.measuring_frames,
        stats.pairs,
        stats.violations,
        stats.persistence_failures,
        stats.skipped_projections + stats.skipped_detections
    );
    Ok(())
}
