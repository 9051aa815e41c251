use serde::{Deserialize, Serialize};

use crate::format::{format_distance_km, format_elapsed, format_pace};
use crate::health_monitor::HealthReport;
use crate::live_status::LiveStatusSnapshot;
use crate::pace::PaceSource;
use crate::route::RoutePoint;
use crate::types::Coordinate;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Paused,
    Finished,
}

impl RunState {
    /// Running or paused: a session is open.
    pub fn is_active(&self) -> bool {
        matches!(self, RunState::Running | RunState::Paused)
    }
}

/// Immutable view of the run session, produced after every mutation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub session_id: Option<String>,
    pub generation: u64,
    pub state: RunState,
    pub elapsed_seconds: u64,
    pub distance_meters: f64,
    /// Minutes per kilometer
    pub current_pace: Option<f64>,
    pub pace_source: Option<PaceSource>,
    /// Minutes per kilometer over the whole session
    pub average_pace: Option<f64>,
    pub route: Vec<RoutePoint>,
    /// Steps per minute
    pub cadence: f64,
    pub step_count: u64,
    pub floors_ascended: u32,
    pub floors_descended: u32,
    pub elevation_gain_meters: f64,
    pub elevation_loss_meters: f64,
    pub max_elevation_meters: f64,
    pub place_line: Option<String>,
    pub health: HealthReport,
    pub taken_at: f64,
}

impl RunSnapshot {
    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    pub fn elapsed_display(&self) -> String {
        format_elapsed(self.elapsed_seconds)
    }

    pub fn distance_display(&self) -> String {
        format_distance_km(self.distance_meters)
    }

    /// Best available pace: instantaneous, then session average.
    pub fn pace_display(&self) -> String {
        format_pace(self.current_pace.or(self.average_pace))
    }

    pub fn current_pace_display(&self) -> String {
        format_pace(self.current_pace)
    }

    pub fn average_pace_display(&self) -> String {
        format_pace(self.average_pace)
    }

    pub fn cadence_display(&self) -> String {
        format!("{:.0}", self.cadence)
    }

    pub fn elevation_gain_display(&self) -> String {
        format!("{:.0} m", self.elevation_gain_meters)
    }

    pub fn route_coordinates(&self) -> Vec<Coordinate> {
        self.route.iter().map(|p| p.coordinate).collect()
    }

    /// The subset mirrored to the display surface.
    pub fn live_status(&self) -> LiveStatusSnapshot {
        LiveStatusSnapshot {
            generation: self.generation,
            elapsed_seconds: self.elapsed_seconds,
            distance_meters: self.distance_meters,
            average_pace: self.average_pace,
            current_pace: self.current_pace,
            is_running: self.is_running(),
            place_line: self.place_line.clone(),
            updated_at: self.taken_at,
        }
    }

    /// One-line status for logging.
    pub fn status_line(&self) -> String {
        format!(
            "[{:?}] {} | {} km | pace {} | {} steps | +{:.0}m",
            self.state,
            self.elapsed_display(),
            self.distance_display(),
            self.pace_display(),
            self.step_count,
            self.elevation_gain_meters
        )
    }
}
