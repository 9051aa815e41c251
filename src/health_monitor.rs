use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::types::SensorKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorStatus {
    /// Not subscribed (idle, paused or finished)
    Inactive,
    Active,
    /// Subscribed but nothing arrived within the silence threshold
    Silent,
    Unavailable,
    PermissionDenied,
}

/// Tracks health for an individual sensor source, on sample time.
#[derive(Clone, Debug)]
pub struct SensorHealth {
    pub kind: SensorKind,
    pub silence_threshold_secs: f64,
    failure: Option<SensorStatus>,
    subscribed_at: Option<f64>,
    last_sample_at: Option<f64>,
    samples: u64,
    errors: u64,
    silence_reported: bool,
}

impl SensorHealth {
    pub fn new(kind: SensorKind, silence_threshold_secs: f64) -> Self {
        SensorHealth {
            kind,
            silence_threshold_secs,
            failure: None,
            subscribed_at: None,
            last_sample_at: None,
            samples: 0,
            errors: 0,
            silence_reported: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.kind, self.silence_threshold_secs);
    }

    pub fn mark_started(&mut self, now: f64) {
        self.failure = None;
        self.subscribed_at = Some(now);
        self.last_sample_at = None;
        self.silence_reported = false;
    }

    pub fn mark_stopped(&mut self) {
        self.subscribed_at = None;
    }

    pub fn mark_failed(&mut self, error: &TrackerError) {
        self.subscribed_at = None;
        self.failure = Some(match error {
            TrackerError::PermissionDenied(_) => SensorStatus::PermissionDenied,
            _ => SensorStatus::Unavailable,
        });
    }

    pub fn record_sample(&mut self, timestamp: f64) {
        self.samples += 1;
        self.last_sample_at = Some(timestamp);
        if self.silence_reported {
            log::info!("[HEALTH] {} stream recovered", self.kind);
            self.silence_reported = false;
        }
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    pub fn time_since_last_update(&self, now: f64) -> Option<f64> {
        self.last_sample_at
            .or(self.subscribed_at)
            .map(|t| (now - t).max(0.0))
    }

    pub fn is_silent(&self, now: f64) -> bool {
        self.subscribed_at.is_some()
            && self
                .time_since_last_update(now)
                .map(|d| d > self.silence_threshold_secs)
                .unwrap_or(false)
    }

    pub fn status(&self, now: f64) -> SensorStatus {
        if let Some(failure) = self.failure {
            return failure;
        }
        if self.subscribed_at.is_none() {
            return SensorStatus::Inactive;
        }
        if self.is_silent(now) {
            SensorStatus::Silent
        } else {
            SensorStatus::Active
        }
    }

    pub fn sample_count(&self) -> u64 {
        self.samples
    }

    pub fn error_count(&self) -> u64 {
        self.errors
    }
}

/// Report of sensor health status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub position: SensorStatus,
    pub pedometer: SensorStatus,
    pub altimeter: SensorStatus,
    pub motion_activity: SensorStatus,
}

impl Default for HealthReport {
    fn default() -> Self {
        Self {
            position: SensorStatus::Inactive,
            pedometer: SensorStatus::Inactive,
            altimeter: SensorStatus::Inactive,
            motion_activity: SensorStatus::Inactive,
        }
    }
}

pub struct HealthMonitor {
    pub position: SensorHealth,
    pub pedometer: SensorHealth,
    pub altimeter: SensorHealth,
    pub motion: SensorHealth,
}

impl HealthMonitor {
    pub fn new(config: &TrackerConfig) -> Self {
        HealthMonitor {
            position: SensorHealth::new(SensorKind::Position, config.position_silence_secs),
            pedometer: SensorHealth::new(SensorKind::Pedometer, config.sensor_silence_secs),
            altimeter: SensorHealth::new(SensorKind::Altimeter, config.sensor_silence_secs),
            // Classifier only reports on change
            motion: SensorHealth::new(SensorKind::MotionActivity, f64::INFINITY),
        }
    }

    pub fn get(&self, kind: SensorKind) -> &SensorHealth {
        match kind {
            SensorKind::Position => &self.position,
            SensorKind::Pedometer => &self.pedometer,
            SensorKind::Altimeter => &self.altimeter,
            SensorKind::MotionActivity => &self.motion,
        }
    }

    pub fn get_mut(&mut self, kind: SensorKind) -> &mut SensorHealth {
        match kind {
            SensorKind::Position => &mut self.position,
            SensorKind::Pedometer => &mut self.pedometer,
            SensorKind::Altimeter => &mut self.altimeter,
            SensorKind::MotionActivity => &mut self.motion,
        }
    }

    pub fn reset(&mut self) {
        for kind in SensorKind::ALL {
            self.get_mut(kind).reset();
        }
    }

    pub fn check_health(&self, now: f64) -> HealthReport {
        HealthReport {
            position: self.position.status(now),
            pedometer: self.pedometer.status(now),
            altimeter: self.altimeter.status(now),
            motion_activity: self.motion.status(now),
        }
    }

    /// Log each newly silent stream once per silence episode.
    pub fn report_silences(&mut self, now: f64) {
        for kind in SensorKind::ALL {
            let health = self.get_mut(kind);
            if health.is_silent(now) && !health.silence_reported {
                health.silence_reported = true;
                log::warn!(
                    "[HEALTH] {} SILENT for {:.1}s",
                    kind,
                    health.time_since_last_update(now).unwrap_or(0.0)
                );
            }
        }
    }

    /// Format health status for logging
    pub fn format_status(&self, now: f64) -> String {
        let label = |health: &SensorHealth| match health.status(now) {
            SensorStatus::Active => "✓".to_string(),
            SensorStatus::Inactive => "-".to_string(),
            SensorStatus::Silent => format!(
                "⚠ (silent {:.1}s)",
                health.time_since_last_update(now).unwrap_or(0.0)
            ),
            SensorStatus::Unavailable => "✗ unavailable".to_string(),
            SensorStatus::PermissionDenied => "✗ denied".to_string(),
        };

        format!(
            "Health: GPS {} | Steps {} | Baro {} | Motion {}",
            label(&self.position),
            label(&self.pedometer),
            label(&self.altimeter),
            label(&self.motion)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_health_detection() {
        let mut health = SensorHealth::new(SensorKind::Position, 30.0);
        assert_eq!(health.status(0.0), SensorStatus::Inactive);

        health.mark_started(0.0);
        assert_eq!(health.status(10.0), SensorStatus::Active);
        assert_eq!(health.status(31.0), SensorStatus::Silent);

        health.record_sample(31.0);
        assert_eq!(health.status(32.0), SensorStatus::Active);
        assert_eq!(health.sample_count(), 1);
    }

    #[test]
    fn test_failures_stick_until_restart() {
        let mut health = SensorHealth::new(SensorKind::Altimeter, 10.0);
        health.mark_failed(&TrackerError::SensorUnavailable(SensorKind::Altimeter));
        assert_eq!(health.status(0.0), SensorStatus::Unavailable);

        health.mark_failed(&TrackerError::PermissionDenied(SensorKind::Altimeter));
        assert_eq!(health.status(0.0), SensorStatus::PermissionDenied);

        health.mark_started(5.0);
        assert_eq!(health.status(6.0), SensorStatus::Active);
    }

    #[test]
    fn test_health_monitor() {
        let mut monitor = HealthMonitor::new(&TrackerConfig::default());
        for kind in SensorKind::ALL {
            monitor.get_mut(kind).mark_started(0.0);
        }

        let report = monitor.check_health(20.0);
        assert_eq!(report.position, SensorStatus::Active);
        assert_eq!(report.pedometer, SensorStatus::Silent);
        assert_eq!(report.motion_activity, SensorStatus::Active);

        monitor.report_silences(20.0);
        assert!(monitor.pedometer.silence_reported);

        let status = monitor.format_status(20.0);
        assert!(status.contains("✓"));
        assert!(status.contains("silent"));
    }
}
