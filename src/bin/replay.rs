use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

use run_tracker_rs::live_status::{DisplaySurfaceHost, JsonFileSurface, NoSurface};
use run_tracker_rs::recording::RunLog;
use run_tracker_rs::sensors::external_sources;
use run_tracker_rs::{RunSessionController, TrackerConfig};

#[derive(Parser, Debug)]
#[command(about = "Replay a recorded run log through the tracking engine", long_about = None)]
struct Args {
    /// Path to events_*.json[.gz] log
    #[arg(long, conflicts_with = "log_dir")]
    log: Option<PathBuf>,

    /// Directory of logs to batch replay (processes events_*.json[.gz])
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// JSON file overriding tracker tunables
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seconds between simulated clock ticks
    #[arg(long, default_value = "1.0")]
    tick_secs: f64,

    /// Write summaries (JSON + GPX) here
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Mirror the replayed run onto a live status file
    #[arg(long)]
    live_status: Option<PathBuf>,
}

fn collect_logs(args: &Args) -> Result<Vec<PathBuf>> {
    if let Some(path) = &args.log {
        return Ok(vec![path.clone()]);
    }
    let dir = match &args.log_dir {
        Some(dir) => dir,
        None => bail!("pass --log or --log-dir"),
    };

    let mut logs: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("events_") && (n.ends_with(".json") || n.ends_with(".json.gz")))
                .unwrap_or(false)
        })
        .collect();
    logs.sort();
    Ok(logs)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => TrackerConfig::load(path)?,
        None => TrackerConfig::default(),
    };

    let logs = collect_logs(&args)?;
    if logs.is_empty() {
        bail!("no logs found");
    }

    for path in logs {
        let log = RunLog::load(&path)?;
        println!("Replaying {} ({} entries)", path.display(), log.len());

        let surface: Box<dyn DisplaySurfaceHost> = match &args.live_status {
            Some(path) => Box::new(JsonFileSurface::new(path)),
            None => Box::new(NoSurface),
        };
        let mut controller = RunSessionController::new(config.clone(), external_sources(), surface);
        let summaries = log.replay(&mut controller, args.tick_secs);

        if summaries.is_empty() {
            println!("  no completed run in log");
        }
        for summary in &summaries {
            let snapshot = &summary.snapshot;
            println!(
                "  {}: {} | {} km | avg {} /km | {} steps | +{:.0} m / -{:.0} m | {} route points",
                summary.session_id,
                snapshot.elapsed_display(),
                snapshot.distance_display(),
                snapshot.average_pace_display(),
                snapshot.step_count,
                snapshot.elevation_gain_meters,
                snapshot.elevation_loss_meters,
                snapshot.route.len()
            );
            println!(
                "    fixes {} accepted / {} rejected, gps {:.1} m, {} sensor errors",
                summary.diagnostics.accepted_fixes,
                summary.diagnostics.rejected_fixes,
                summary.diagnostics.gps_distance_meters,
                summary.diagnostics.sensor_errors
            );
            if let Some(dir) = &args.output_dir {
                let saved = summary.save(dir)?;
                println!("    saved {}", saved.display());
            }
        }
    }

    Ok(())
}
