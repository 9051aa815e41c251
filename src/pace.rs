use std::collections::VecDeque;

use crate::config::TrackerConfig;
use crate::types::{Coordinate, PositionSample};

/// Where the current pace came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaceSource {
    Pedometer,
    GpsWindow,
}

#[derive(Clone, Copy, Debug)]
struct WindowPoint {
    timestamp: f64,
    coordinate: Coordinate,
}

/// Best-available instantaneous pace in minutes per kilometer.
///
/// Pedometer pace wins when it is plausible and recent; otherwise a sliding
/// window of trusted GPS fixes is used. Session-average pace is the caller's
/// fallback.
#[derive(Clone, Debug, Default)]
pub struct PaceEstimator {
    /// (min/km, sample time)
    pedometer_pace: Option<(f64, f64)>,
    window: VecDeque<WindowPoint>,
    window_seeded_at: Option<f64>,
    current: Option<(f64, PaceSource)>,
}

/// `true` when `pace` is finite, positive and under the ceiling.
pub fn is_plausible_pace(pace: f64, ceiling: f64) -> bool {
    pace.is_finite() && pace > 0.0 && pace < ceiling
}

impl PaceEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Drop GPS history (resume after pause, runner stopped).
    pub fn clear_window(&mut self) {
        self.window.clear();
        self.window_seeded_at = None;
    }

    /// Forget everything tied to the current sensor subscriptions.
    pub fn clear_segment(&mut self) {
        self.pedometer_pace = None;
        self.clear_window();
        self.current = None;
    }

    /// Feed the latest pedometer pace (seconds per meter) reported at
    /// `timestamp`. Returns true when the current pace changed.
    pub fn observe_pedometer_pace(
        &mut self,
        pace_sec_per_meter: Option<f64>,
        timestamp: f64,
        config: &TrackerConfig,
    ) -> bool {
        self.pedometer_pace = pace_sec_per_meter
            .map(|secs| secs * 1000.0 / 60.0)
            .filter(|pace| is_plausible_pace(*pace, config.pace_ceiling_min_per_km))
            .map(|pace| (pace, timestamp));
        self.reevaluate(timestamp, config)
    }

    /// Re-check pedometer pace freshness at `now`.
    pub fn refresh(&mut self, now: f64, config: &TrackerConfig) -> bool {
        self.reevaluate(now, config)
    }

    /// Feed a position fix. A stationary runner restarts the window and
    /// coarse fixes are skipped. Returns true when the current pace changed.
    pub fn observe_position(
        &mut self,
        sample: &PositionSample,
        stationary: bool,
        config: &TrackerConfig,
    ) -> bool {
        let trusted = !stationary
            && sample.has_valid_accuracy()
            && sample.horizontal_accuracy <= config.distance_max_accuracy_m;

        if stationary {
            self.clear_window();
        } else if trusted {
            if let Some(last) = self.window.back() {
                if sample.timestamp < last.timestamp {
                    // Out-of-order fix within the stream; ignore it
                    return false;
                }
            }
            if self.window_seeded_at.is_none() {
                self.window_seeded_at = Some(sample.timestamp);
            }
            self.window.push_back(WindowPoint {
                timestamp: sample.timestamp,
                coordinate: sample.coordinate,
            });
            let horizon = sample.timestamp - config.pace_window_secs;
            while self
                .window
                .front()
                .map(|p| p.timestamp < horizon)
                .unwrap_or(false)
            {
                self.window.pop_front();
            }
        }

        self.reevaluate(sample.timestamp, config)
    }

    fn window_pace(&self, config: &TrackerConfig) -> Option<f64> {
        let first = self.window.front()?;
        let last = self.window.back()?;
        let seeded_at = self.window_seeded_at?;

        // Not enough trusted history yet
        if last.timestamp - seeded_at < config.pace_window_secs {
            return None;
        }

        let duration = last.timestamp - first.timestamp;
        let displacement = first.coordinate.distance_to(&last.coordinate);
        if duration <= config.pace_min_window_secs || displacement <= config.pace_min_window_distance_m {
            return None;
        }

        let pace = (duration / 60.0) / (displacement / 1000.0);
        is_plausible_pace(pace, config.pace_ceiling_min_per_km).then_some(pace)
    }

    fn reevaluate(&mut self, now: f64, config: &TrackerConfig) -> bool {
        let pedometer = self
            .pedometer_pace
            .filter(|(_, at)| now - at <= config.sensor_silence_secs)
            .map(|(pace, _)| pace);
        let next = match pedometer {
            Some(pace) => Some((pace, PaceSource::Pedometer)),
            None => self.window_pace(config).map(|pace| (pace, PaceSource::GpsWindow)),
        };
        let changed = next != self.current;
        self.current = next;
        changed
    }

    pub fn current_pace(&self) -> Option<f64> {
        self.current.map(|(pace, _)| pace)
    }

    pub fn current_source(&self) -> Option<PaceSource> {
        self.current.map(|(_, source)| source)
    }
}

/// Session-average pace in minutes per kilometer, or `None` without distance.
pub fn average_pace(elapsed_seconds: f64, distance_meters: f64) -> Option<f64> {
    if !(distance_meters.is_finite() && distance_meters > 0.0 && elapsed_seconds > 0.0) {
        return None;
    }
    let pace = (elapsed_seconds / 60.0) / (distance_meters / 1000.0);
    pace.is_finite().then_some(pace)
}
