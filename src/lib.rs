//! Run-tracking state engine.
//!
//! Fuses position, pedometer, altimeter and motion-activity streams into one
//! monotonic run session (elapsed time, distance, pace, route, elevation) and
//! mirrors it onto a persistent display surface.

pub mod config;
pub mod controller;
pub mod distance;
pub mod elevation;
pub mod error;
pub mod format;
pub mod geocode;
pub mod health_monitor;
pub mod live_status;
pub mod pace;
pub mod pedometer;
pub mod recording;
pub mod route;
pub mod sensors;
pub mod service;
pub mod session_clock;
pub mod snapshot;
pub mod stationary;
pub mod summary;
pub mod types;

pub use config::TrackerConfig;
pub use controller::{RestoredRun, RunSessionController};
pub use error::{GeocodeError, SurfaceError, TrackerError, TrackerResult};
pub use service::{RunTrackerHandle, RunTrackerService};
pub use snapshot::{RunSnapshot, RunState};
pub use summary::RunSummary;
pub use types::{Coordinate, SensorEvent, SensorKind};
