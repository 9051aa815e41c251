use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::controller::{RestoredRun, RunSessionController};
use crate::error::{TrackerError, TrackerResult};
use crate::summary::RunSummary;
use crate::types::SensorEvent;

/// UI command, stamped with the time the session owner acted on it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunCommand {
    Start,
    /// Relaunch continuing an interrupted run
    Restore {
        elapsed_seconds: f64,
        distance_meters: f64,
    },
    Pause,
    Resume,
    Stop,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
pub enum LogEntry {
    Command { timestamp: f64, command: RunCommand },
    Event { timestamp: f64, event: SensorEvent },
}

impl LogEntry {
    pub fn timestamp(&self) -> f64 {
        match self {
            LogEntry::Command { timestamp, .. } | LogEntry::Event { timestamp, .. } => *timestamp,
        }
    }

    fn is_event(&self) -> bool {
        matches!(self, LogEntry::Event { .. })
    }
}

/// Recorded commands and sensor events, in arrival order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunLog {
    pub entries: Vec<LogEntry>,
}

fn is_gzip(path: &Path) -> bool {
    path.extension().map(|e| e == "gz").unwrap_or(false)
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_command(&mut self, timestamp: f64, command: RunCommand) {
        self.entries.push(LogEntry::Command { timestamp, command });
    }

    pub fn push_event(&mut self, timestamp: f64, event: SensorEvent) {
        self.entries.push(LogEntry::Event { timestamp, event });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read a `.json` or `.json.gz` log.
    pub fn load(path: &Path) -> TrackerResult<Self> {
        let file = File::open(path)
            .map_err(|e| TrackerError::StorageError(format!("{}: {}", path.display(), e)))?;
        let parsed = if is_gzip(path) {
            serde_json::from_reader(BufReader::new(GzDecoder::new(file)))
        } else {
            serde_json::from_reader(BufReader::new(file))
        };
        parsed.map_err(|e| TrackerError::StorageError(format!("{}: {}", path.display(), e)))
    }

    /// Write the log, gzip-compressed when `path` ends in `.gz`.
    pub fn save(&self, path: &Path) -> TrackerResult<()> {
        let storage_err = |e: std::io::Error| TrackerError::StorageError(format!("{}: {}", path.display(), e));
        let file = File::create(path).map_err(storage_err)?;

        if is_gzip(path) {
            let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
            serde_json::to_writer(&mut encoder, self)
                .map_err(|e| TrackerError::StorageError(e.to_string()))?;
            encoder.finish().and_then(|mut w| w.flush()).map_err(storage_err)?;
        } else {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, self)
                .map_err(|e| TrackerError::StorageError(e.to_string()))?;
            writer.flush().map_err(storage_err)?;
        }
        Ok(())
    }

    /// Drive `controller` through the log on its own timestamps, ticking
    /// the clock every `tick_secs` in between. Returns every finished run.
    pub fn replay(&self, controller: &mut RunSessionController, tick_secs: f64) -> Vec<RunSummary> {
        let mut entries: Vec<&LogEntry> = self.entries.iter().collect();
        // Commands go first among entries sharing a timestamp
        entries.sort_by(|a, b| {
            a.timestamp()
                .total_cmp(&b.timestamp())
                .then_with(|| a.is_event().cmp(&b.is_event()))
        });

        let tick_secs = if tick_secs > 0.0 { tick_secs } else { 1.0 };
        let mut next_tick: Option<f64> = None;
        let mut summaries = Vec::new();

        for entry in entries {
            let now = entry.timestamp();
            if let Some(mut tick_at) = next_tick {
                while tick_at <= now {
                    controller.tick(tick_at);
                    tick_at += tick_secs;
                }
                next_tick = Some(tick_at);
            }

            match entry {
                LogEntry::Command { command, .. } => match command {
                    RunCommand::Start => {
                        controller.start(now);
                        next_tick = Some(now + tick_secs);
                    }
                    RunCommand::Restore {
                        elapsed_seconds,
                        distance_meters,
                    } => {
                        let restored = RestoredRun {
                            elapsed_seconds: *elapsed_seconds,
                            distance_meters: *distance_meters,
                        };
                        controller.restore(now, restored);
                        next_tick = Some(now + tick_secs);
                    }
                    RunCommand::Pause => {
                        controller.pause(now);
                    }
                    RunCommand::Resume => {
                        controller.resume(now);
                    }
                    RunCommand::Stop => {
                        if let Some(summary) = controller.stop(now) {
                            summaries.push(summary);
                        }
                        next_tick = None;
                    }
                },
                LogEntry::Event { event, .. } => {
                    controller.on_event(event.clone(), now);
                }
            }
        }

        summaries
    }
}
