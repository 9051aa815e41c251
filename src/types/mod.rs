use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use geo::{HaversineDistance, Point};
use serde::{Deserialize, Serialize};

/// WGS84 coordinate in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance in meters.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        self.to_point().haversine_distance(&other.to_point())
    }

    /// Coordinate reached by moving `meters` along `bearing_deg` (0 = north).
    ///
    /// Equirectangular approximation, accurate to well under a meter for the
    /// step sizes a runner produces between fixes.
    pub fn offset(&self, meters: f64, bearing_deg: f64) -> Coordinate {
        const R: f64 = 6_371_008.8;
        let bearing = bearing_deg.to_radians();
        let d_north = meters * bearing.cos();
        let d_east = meters * bearing.sin();
        let d_lat = d_north / R;
        let d_lon = d_east / (R * self.latitude.to_radians().cos());
        Coordinate {
            latitude: self.latitude + d_lat.to_degrees(),
            longitude: self.longitude + d_lon.to_degrees(),
        }
    }

    fn to_point(self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

/// Satellite position fix.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub timestamp: f64,
    pub coordinate: Coordinate,
    /// Horizontal accuracy radius in meters (negative = invalid fix)
    pub horizontal_accuracy: f64,
    /// Instantaneous ground speed in m/s, when the receiver reports one
    pub speed: Option<f64>,
}

impl PositionSample {
    pub fn new(
        timestamp: f64,
        coordinate: Coordinate,
        horizontal_accuracy: f64,
        speed: Option<f64>,
    ) -> Self {
        Self {
            timestamp,
            coordinate,
            horizontal_accuracy,
            speed,
        }
    }

    /// Accuracy usable for filtering: finite and non-negative.
    pub fn has_valid_accuracy(&self) -> bool {
        self.horizontal_accuracy.is_finite() && self.horizontal_accuracy >= 0.0
    }
}

/// Cumulative pedometer reading, relative to the subscription start.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PedometerSample {
    pub timestamp: f64,
    pub cumulative_steps: u64,
    /// Steps per minute
    pub cadence: Option<f64>,
    /// Meters
    pub cumulative_distance: Option<f64>,
    /// Seconds per meter
    pub pace_sec_per_meter: Option<f64>,
    pub floors_ascended: u32,
    pub floors_descended: u32,
}

/// Barometric altitude relative to the subscription start.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AltitudeSample {
    pub timestamp: f64,
    pub relative_altitude: f64,
}

/// Device motion-activity classification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    pub timestamp: f64,
    pub is_stationary: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Position,
    Pedometer,
    Altimeter,
    MotionActivity,
}

impl SensorKind {
    pub const ALL: [SensorKind; 4] = [
        SensorKind::Position,
        SensorKind::Pedometer,
        SensorKind::Altimeter,
        SensorKind::MotionActivity,
    ];
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SensorKind::Position => "position",
            SensorKind::Pedometer => "pedometer",
            SensorKind::Altimeter => "altimeter",
            SensorKind::MotionActivity => "motion activity",
        };
        f.write_str(name)
    }
}

/// One message from a sensor adapter to the session owner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SensorEvent {
    Position(PositionSample),
    Pedometer(PedometerSample),
    Altitude(AltitudeSample),
    Motion(MotionSample),
    /// Transient per-callback failure; the stream continues.
    Error { kind: SensorKind, message: String },
}

impl SensorEvent {
    pub fn kind(&self) -> SensorKind {
        match self {
            SensorEvent::Position(_) => SensorKind::Position,
            SensorEvent::Pedometer(_) => SensorKind::Pedometer,
            SensorEvent::Altitude(_) => SensorKind::Altimeter,
            SensorEvent::Motion(_) => SensorKind::MotionActivity,
            SensorEvent::Error { kind, .. } => *kind,
        }
    }

    pub fn timestamp(&self) -> Option<f64> {
        match self {
            SensorEvent::Position(s) => Some(s.timestamp),
            SensorEvent::Pedometer(s) => Some(s.timestamp),
            SensorEvent::Altitude(s) => Some(s.timestamp),
            SensorEvent::Motion(s) => Some(s.timestamp),
            SensorEvent::Error { .. } => None,
        }
    }
}

/// Seconds since the Unix epoch.
pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
