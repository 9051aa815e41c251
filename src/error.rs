use thiserror::Error;

use crate::types::SensorKind;

/// Run tracker error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackerError {
    #[error("{0} sensor unavailable on this device")]
    SensorUnavailable(SensorKind),

    #[error("{0} permission denied")]
    PermissionDenied(SensorKind),

    #[error("Sensor failed: {0}")]
    SensorFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for tracker operations
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Reverse-geocoding failures. Always absorbed by the place-line refresher.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeocodeError {
    #[error("Network timeout")]
    NetworkTimeout,

    #[error("HTTP error: {0}")]
    HttpError(u16),

    #[error("Rate limited by geocoding service")]
    RateLimited,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("No place found for coordinate")]
    NoResult,

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Display-surface host failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SurfaceError {
    #[error("Display surface permission denied")]
    PermissionDenied,

    #[error("Display surface unsupported on this host")]
    Unsupported,

    #[error("Display surface write failed: {0}")]
    Io(String),
}

impl SurfaceError {
    /// Denial and lack of support disable the surface for the rest of the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SurfaceError::PermissionDenied | SurfaceError::Unsupported)
    }
}
