use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{TrackerError, TrackerResult};
use crate::snapshot::RunSnapshot;

/// Counters gathered while the run was tracked.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunDiagnostics {
    pub position_samples: u64,
    pub pedometer_samples: u64,
    pub altitude_samples: u64,
    pub sensor_errors: u64,
    pub accepted_fixes: u64,
    pub rejected_fixes: u64,
    pub gps_distance_meters: f64,
    pub live_status_submissions: u64,
}

/// Finalized run handed to the summary/compositing stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub session_id: String,
    pub started_at: String,
    pub ended_at: String,
    pub snapshot: RunSnapshot,
    pub diagnostics: RunDiagnostics,
}

/// Epoch seconds as a UTC date, `None` when outside chrono's range.
pub fn utc_datetime(timestamp: f64) -> Option<DateTime<Utc>> {
    if !timestamp.is_finite() {
        return None;
    }
    let secs = timestamp.floor();
    let nanos = ((timestamp - secs) * 1e9) as u32;
    DateTime::from_timestamp(secs as i64, nanos.min(999_999_999))
}

/// RFC 3339 rendering of an epoch timestamp (the epoch itself when out of range).
pub fn rfc3339(timestamp: f64) -> String {
    utc_datetime(timestamp).unwrap_or_default().to_rfc3339()
}

impl RunSummary {
    pub fn new(
        snapshot: RunSnapshot,
        started_at: f64,
        ended_at: f64,
        diagnostics: RunDiagnostics,
    ) -> Self {
        let session_id = snapshot
            .session_id
            .clone()
            .unwrap_or_else(|| format!("run-{}", snapshot.generation));
        RunSummary {
            session_id,
            started_at: rfc3339(started_at),
            ended_at: rfc3339(ended_at),
            snapshot,
            diagnostics,
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Route as a GPX 1.1 document.
    pub fn to_gpx(&self) -> String {
        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str("<gpx version=\"1.1\" creator=\"run_tracker_rs\">\n");
        xml.push_str("  <metadata>\n");
        xml.push_str(&format!("    <name>{}</name>\n", self.session_id));
        xml.push_str(&format!("    <time>{}</time>\n", self.started_at));
        xml.push_str("  </metadata>\n");
        xml.push_str("  <trk>\n");
        xml.push_str(&format!("    <name>{}</name>\n", self.session_id));
        xml.push_str("    <trkseg>\n");

        for point in &self.snapshot.route {
            xml.push_str(&format!(
                "      <trkpt lat=\"{:.7}\" lon=\"{:.7}\">\n",
                point.coordinate.latitude, point.coordinate.longitude
            ));
            xml.push_str(&format!("        <time>{}</time>\n", rfc3339(point.timestamp)));
            xml.push_str("      </trkpt>\n");
        }

        xml.push_str("    </trkseg>\n");
        xml.push_str("  </trk>\n");
        xml.push_str("</gpx>\n");
        xml
    }

    /// Write `<session_id>.json` and `<session_id>.gpx` into `dir`.
    /// Returns the JSON path.
    pub fn save(&self, dir: &Path) -> TrackerResult<PathBuf> {
        fs::create_dir_all(dir).map_err(|e| TrackerError::StorageError(e.to_string()))?;

        let json = self
            .to_json()
            .map_err(|e| TrackerError::StorageError(e.to_string()))?;
        let json_path = dir.join(format!("{}.json", self.session_id));
        fs::write(&json_path, json).map_err(|e| TrackerError::StorageError(e.to_string()))?;

        let gpx_path = dir.join(format!("{}.gpx", self.session_id));
        fs::write(&gpx_path, self.to_gpx()).map_err(|e| TrackerError::StorageError(e.to_string()))?;

        Ok(json_path)
    }
}
