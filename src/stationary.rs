use crate::config::TrackerConfig;
use crate::pedometer::StepTracker;
use crate::types::MotionSample;

/// Decides whether the runner is standing still.
///
/// Requires a trusted source (an active pedometer or a motion classifier),
/// and then either the classifier saying "stationary" or the pedometer
/// showing no new steps for a while at near-zero cadence.
#[derive(Clone, Debug, Default)]
pub struct StationaryDetector {
    classifier_available: bool,
    classifier_stationary: Option<bool>,
}

impl StationaryDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// The motion adapter started, so classifications will follow.
    pub fn mark_classifier_available(&mut self) {
        self.classifier_available = true;
    }

    pub fn apply(&mut self, sample: &MotionSample) {
        self.classifier_available = true;
        self.classifier_stationary = Some(sample.is_stationary);
    }

    /// Forget the last classification (adapters were stopped).
    pub fn clear_classification(&mut self) {
        self.classifier_stationary = None;
    }

    pub fn classifier_available(&self) -> bool {
        self.classifier_available
    }

    pub fn is_stationary(&self, now: f64, steps: &StepTracker, config: &TrackerConfig) -> bool {
        let trusted_source = steps.is_active() || self.classifier_available;
        if !trusted_source {
            return false;
        }

        if self.classifier_stationary == Some(true) {
            return true;
        }

        if !steps.is_active() {
            return false;
        }
        let steps_idle = steps
            .seconds_since_step_change(now)
            .map(|secs| secs > config.stationary_step_timeout_secs)
            .unwrap_or(false);
        steps_idle && steps.cadence() < config.stationary_max_cadence_spm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PedometerSample;

    fn steps_at(tracker: &mut StepTracker, timestamp: f64, steps: u64, cadence: f64) {
        tracker.apply(&PedometerSample {
            timestamp,
            cumulative_steps: steps,
            cadence: Some(cadence),
            ..Default::default()
        });
    }

    #[test]
    fn test_no_trusted_source_never_stationary() {
        let detector = StationaryDetector::new();
        let steps = StepTracker::new();
        assert!(!detector.is_stationary(100.0, &steps, &TrackerConfig::default()));
    }

    #[test]
    fn test_classifier_says_stationary() {
        let mut detector = StationaryDetector::new();
        detector.apply(&MotionSample {
            timestamp: 0.0,
            is_stationary: true,
        });
        assert!(detector.is_stationary(1.0, &StepTracker::new(), &TrackerConfig::default()));
    }

    #[test]
    fn test_step_heuristic_needs_idle_and_low_cadence() {
        let config = TrackerConfig::default();
        let detector = StationaryDetector::new();
        let mut steps = StepTracker::new();
        steps_at(&mut steps, 0.0, 10, 0.0);

        assert!(!detector.is_stationary(2.0, &steps, &config));
        assert!(detector.is_stationary(3.5, &steps, &config));

        // Cadence still reported high: a stale count alone is not enough
        steps_at(&mut steps, 4.0, 10, 150.0);
        assert!(!detector.is_stationary(5.0, &steps, &config));
    }

    #[test]
    fn test_classifier_moving_overrides_nothing_when_steps_idle() {
        let config = TrackerConfig::default();
        let mut detector = StationaryDetector::new();
        detector.apply(&MotionSample {
            timestamp: 0.0,
            is_stationary: false,
        });
        let mut steps = StepTracker::new();
        steps_at(&mut steps, 0.0, 10, 0.0);
        assert!(detector.is_stationary(10.0, &steps, &config));
    }

    #[test]
    fn test_classifier_available_without_pedometer() {
        let config = TrackerConfig::default();
        let mut detector = StationaryDetector::new();
        detector.mark_classifier_available();
        assert!(!detector.is_stationary(10.0, &StepTracker::new(), &config));
    }
}
