//! violation_report - summarize a distance violation log
//!
//! Reads the append-only log written by groundd and prints the number of
//! violations, the closest and mean distance, and the covered time span.
//! Lines that are not violation records are counted and skipped.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use ground_monitor::log::summarize;

#[derive(Parser, Debug)]
#[command(name = "violation_report", about = "Summarize a distance violation log")]
struct Args {
    /// Path to the violation log
    #[arg(long, default_value = "distance_violations.log", env = "GROUND_MONITOR_LOG_PATH")]
    log: PathBuf,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let file = File::open(&args.log)
        .with_context(|| format!("failed to open violation log {}", args.log.display()))?;
    let summary = summarize(BufReader::new(file))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("violation_report: {}", args.log.display());
    println!("violations:      {}", summary.violations);
    if summary.malformed_lines > 0 {
        log::warn!("{} malformed line(s) skipped", summary.malformed_lines);
        println!("malformed lines: {}", summary.malformed_lines);
    }
    if let (Some(min), Some(mean)) = (summary.min_distance, summary.mean_distance) {
        println!("closest:         {min:.2} meters");
        println!("mean:            {mean:.2} meters");
    }
    if let (Some(first), Some(last)) = (&summary.first_timestamp, &summary.last_timestamp) {
        println!("first:           {first}");
        println!("last:            {last}");
    }
    Ok(())
}
