use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, Instant};

use run_tracker_rs::geocode::{NominatimGeocoder, ReverseGeocoder};
use run_tracker_rs::live_status::{DisplaySurfaceHost, JsonFileSurface, NoSurface};
use run_tracker_rs::recording::{RunCommand, RunLog};
use run_tracker_rs::sensors::{simulated_sources, SimulatedCourse};
use run_tracker_rs::types::current_timestamp;
use run_tracker_rs::{Coordinate, RestoredRun, RunSessionController, RunTrackerService, SensorEvent, TrackerConfig};

#[derive(Parser, Debug)]
#[command(name = "run_tracker")]
#[command(about = "Run tracker - live session over simulated sensors", long_about = None)]
struct Args {
    /// Duration in seconds (0 = until Ctrl-C)
    #[arg(value_name = "SECONDS", default_value = "60")]
    duration: u64,

    /// JSON file overriding tracker tunables
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory
    #[arg(long, default_value = "run_tracker_sessions")]
    output_dir: PathBuf,

    /// Pause the run after this many seconds
    #[arg(long)]
    pause_at: Option<u64>,

    /// Length of the pause in seconds
    #[arg(long, default_value = "10")]
    pause_for: u64,

    /// Start latitude
    #[arg(long, default_value = "37.7749", allow_hyphen_values = true)]
    lat: f64,

    /// Start longitude
    #[arg(long, default_value = "-122.4194", allow_hyphen_values = true)]
    lon: f64,

    /// Simulate a device without a barometer
    #[arg(long)]
    no_altimeter: bool,

    /// Do not write the live status surface file
    #[arg(long)]
    no_live_status: bool,

    /// Resume the run left in the live status file by an earlier process
    #[arg(long)]
    restore: bool,

    /// Resolve a place line through a Nominatim-compatible endpoint
    #[arg(long)]
    geocode: bool,

    #[arg(long, default_value = "https://nominatim.openstreetmap.org/reverse")]
    geocode_url: String,

    /// Record commands and sensor events to events_<time>.json.gz
    #[arg(long)]
    record: bool,
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

fn ts_now_clean() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Record `command` at the time the service acted on it.
fn log_command(log: &Arc<Mutex<RunLog>>, timestamp: f64, command: RunCommand) {
    if let Ok(mut log) = log.lock() {
        log.push_command(timestamp, command);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => TrackerConfig::load(path)?,
        None => TrackerConfig::default(),
    };

    println!("[{}] Run Tracker Starting", ts_now());
    println!("  Duration: {} seconds (0=continuous)", args.duration);
    println!("  Output Dir: {}", args.output_dir.display());
    if let Some(pause_at) = args.pause_at {
        println!("  Pause: at {}s for {}s", pause_at, args.pause_for);
    }

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;
    let live_status_path = args.output_dir.join("live_status.json");

    let restored = if args.restore {
        let record = JsonFileSurface::load(&live_status_path)
            .with_context(|| format!("reading {}", live_status_path.display()))?;
        let restored = record
            .as_ref()
            .and_then(|r| RestoredRun::from_surface(r, current_timestamp()));
        if restored.is_none() {
            println!("[{}] No unfinished run to restore, starting fresh", ts_now());
        }
        restored
    } else {
        None
    };

    // Sensors push into raw_tx; the forwarder records and hands them on
    let (raw_tx, mut raw_rx) = mpsc::channel::<SensorEvent>(256);
    let (event_tx, event_rx) = mpsc::channel::<SensorEvent>(256);

    let course = SimulatedCourse::new(Coordinate::new(args.lat, args.lon), current_timestamp());
    let sources = simulated_sources(course, &raw_tx, args.no_altimeter);
    drop(raw_tx);

    let surface: Box<dyn DisplaySurfaceHost> = if args.no_live_status {
        Box::new(NoSurface)
    } else {
        Box::new(JsonFileSurface::new(&live_status_path))
    };
    let geocoder = if args.geocode {
        Some(Arc::new(NominatimGeocoder::with_base_url(&args.geocode_url)) as Arc<dyn ReverseGeocoder>)
    } else {
        None
    };

    let controller = RunSessionController::new(config, sources, surface);
    let (service, handle, mut summaries) = RunTrackerService::new(controller, event_rx, geocoder);
    let service_task = service.spawn();

    let run_log = Arc::new(Mutex::new(RunLog::new()));
    let record = args.record;
    let forward_log = run_log.clone();
    let forward_task = tokio::spawn(async move {
        while let Some(event) = raw_rx.recv().await {
            if record {
                let timestamp = event.timestamp().unwrap_or_else(current_timestamp);
                if let Ok(mut log) = forward_log.lock() {
                    log.push_event(timestamp, event.clone());
                }
            }
            if event_tx.send(event).await.is_err() {
                break;
            }
        }
    });

    let snapshot = match restored {
        Some(restored) => {
            let snapshot = handle.restore(restored).await?;
            log_command(
                &run_log,
                snapshot.taken_at,
                RunCommand::Restore {
                    elapsed_seconds: restored.elapsed_seconds,
                    distance_meters: restored.distance_meters,
                },
            );
            snapshot
        }
        None => {
            let snapshot = handle.start().await?;
            log_command(&run_log, snapshot.taken_at, RunCommand::Start);
            snapshot
        }
    };
    println!("[{}] Tracking {}", ts_now(), snapshot.session_id.as_deref().unwrap_or("-"));

    let started = Instant::now();
    let mut ticker = interval(Duration::from_secs(1));
    let mut paused_since: Option<Instant> = None;
    let mut pause_done = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                println!("[{}] Interrupted, stopping...", ts_now());
                break;
            }
        }

        let elapsed = started.elapsed().as_secs();
        if args.duration > 0 && elapsed >= args.duration {
            println!("[{}] Duration reached, stopping...", ts_now());
            break;
        }

        match (args.pause_at, paused_since) {
            (Some(pause_at), None) if !pause_done && elapsed >= pause_at => {
                let snapshot = handle.pause().await?;
                log_command(&run_log, snapshot.taken_at, RunCommand::Pause);
                println!("[{}] Paused at {}", ts_now(), snapshot.elapsed_display());
                paused_since = Some(Instant::now());
            }
            (_, Some(since)) if since.elapsed().as_secs() >= args.pause_for => {
                let snapshot = handle.resume().await?;
                log_command(&run_log, snapshot.taken_at, RunCommand::Resume);
                println!("[{}] Resumed at {}", ts_now(), snapshot.elapsed_display());
                paused_since = None;
                pause_done = true;
            }
            _ => {}
        }
    }

    let summary = handle.stop().await?;
    let stopped_at = summary
        .as_ref()
        .map(|s| s.snapshot.taken_at)
        .unwrap_or_else(current_timestamp);
    log_command(&run_log, stopped_at, RunCommand::Stop);
    handle.shutdown().await?;
    service_task.await?;
    forward_task.await?;

    // Anything finished by the service beyond the stop reply
    while let Ok(extra) = summaries.try_recv() {
        if summary.as_ref().map(|s| s.session_id != extra.session_id).unwrap_or(true) {
            let path = extra.save(&args.output_dir)?;
            println!("  Saved: {}", path.display());
        }
    }

    match summary {
        Some(summary) => {
            let snapshot = &summary.snapshot;
            println!("[{}] Run complete", ts_now());
            println!("  Time:      {}", snapshot.elapsed_display());
            println!("  Distance:  {} km", snapshot.distance_display());
            println!("  Avg pace:  {} /km", snapshot.average_pace_display());
            println!("  Steps:     {} ({} spm)", snapshot.step_count, snapshot.cadence_display());
            println!("  Elevation: {}", snapshot.elevation_gain_display());
            println!("  Route:     {} points", snapshot.route.len());
            if let Some(place) = &snapshot.place_line {
                println!("  Place:     {}", place);
            }
            println!(
                "  Fixes:     {} accepted, {} rejected",
                summary.diagnostics.accepted_fixes, summary.diagnostics.rejected_fixes
            );
            let path = summary.save(&args.output_dir)?;
            println!("  Saved: {}", path.display());
        }
        None => println!("[{}] No run was in progress", ts_now()),
    }

    if record {
        let path = args.output_dir.join(format!("events_{}.json.gz", ts_now_clean()));
        let log = run_log
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?
            .clone();
        log.save(&path)?;
        println!("  Events: {} entries -> {}", log.len(), path.display());
    }

    Ok(())
}
