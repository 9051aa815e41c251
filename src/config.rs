use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{TrackerError, TrackerResult};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    // ── Distance accumulation ──
    pub distance_max_accuracy_m: f64,
    pub distance_min_step_m: f64,
    pub distance_max_step_m: f64,
    pub distance_min_speed_ms: f64,

    // ── Stationary classification ──
    pub stationary_step_timeout_secs: f64,
    pub stationary_max_cadence_spm: f64,

    // ── Route sampling ──
    pub route_max_accuracy_m: f64,
    pub route_min_spacing_m: f64,
    pub route_max_interval_secs: f64,

    // ── Pace estimation ──
    pub pace_window_secs: f64,
    pub pace_min_window_secs: f64,
    pub pace_min_window_distance_m: f64,
    pub pace_ceiling_min_per_km: f64,

    // ── Live status surface ──
    pub live_status_staleness_secs: f64,
    pub live_status_dismiss_after_secs: f64,
    pub live_status_relevance_running: f64,
    pub live_status_relevance_paused: f64,

    // ── Reverse geocoding ──
    pub geocode_min_interval_secs: f64,
    pub geocode_min_distance_m: f64,

    // ── Sensor health ──
    pub position_silence_secs: f64,
    pub sensor_silence_secs: f64,

    // ── Session clock ──
    pub tick_interval_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            distance_max_accuracy_m: 25.0,
            distance_min_step_m: 5.0,
            distance_max_step_m: 100.0,
            distance_min_speed_ms: 0.5,
            stationary_step_timeout_secs: 3.0,
            stationary_max_cadence_spm: 3.0,
            route_max_accuracy_m: 50.0,
            route_min_spacing_m: 3.0,
            route_max_interval_secs: 10.0,
            pace_window_secs: 12.0,
            pace_min_window_secs: 3.0,
            pace_min_window_distance_m: 5.0,
            pace_ceiling_min_per_km: 20.0,
            live_status_staleness_secs: 60.0,
            live_status_dismiss_after_secs: 4.0,
            live_status_relevance_running: 1.0,
            live_status_relevance_paused: 0.5,
            geocode_min_interval_secs: 60.0,
            geocode_min_distance_m: 100.0,
            position_silence_secs: 30.0,
            sensor_silence_secs: 10.0,
            tick_interval_ms: 1000,
        }
    }
}

impl TrackerConfig {
    /// Load from a JSON file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> TrackerResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| TrackerError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        let config: TrackerConfig = serde_json::from_str(&text)
            .map_err(|e| TrackerError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TrackerResult<()> {
        let positive = [
            ("distance_max_accuracy_m", self.distance_max_accuracy_m),
            ("distance_max_step_m", self.distance_max_step_m),
            ("route_max_accuracy_m", self.route_max_accuracy_m),
            ("route_max_interval_secs", self.route_max_interval_secs),
            ("pace_window_secs", self.pace_window_secs),
            ("pace_ceiling_min_per_km", self.pace_ceiling_min_per_km),
            ("live_status_staleness_secs", self.live_status_staleness_secs),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(TrackerError::InvalidConfig(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }

        if self.distance_min_step_m >= self.distance_max_step_m {
            return Err(TrackerError::InvalidConfig(format!(
                "distance_min_step_m ({}) must be below distance_max_step_m ({})",
                self.distance_min_step_m, self.distance_max_step_m
            )));
        }
        if self.pace_min_window_secs >= self.pace_window_secs {
            return Err(TrackerError::InvalidConfig(format!(
                "pace_min_window_secs ({}) must be below pace_window_secs ({})",
                self.pace_min_window_secs, self.pace_window_secs
            )));
        }
        if self.tick_interval_ms == 0 {
            return Err(TrackerError::InvalidConfig(
                "tick_interval_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
