use serde::{Deserialize, Serialize};

use crate::types::PedometerSample;

/// Step-count accumulator fed by cumulative pedometer readings.
///
/// The pedometer is re-subscribed on every resume, so each reading is
/// relative to the current segment. Totals from earlier segments are carried
/// in `base` and every public total is non-decreasing.
#[derive(Clone, Debug, Default)]
pub struct StepTracker {
    base: StepTotals,
    totals: StepTotals,
    cadence_spm: f64,
    last_step_change_at: Option<f64>,
    active: bool,
    samples: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StepTotals {
    pub steps: u64,
    pub distance_m: f64,
    pub floors_ascended: u32,
    pub floors_descended: u32,
}

/// What changed after applying one reading.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StepUpdate {
    pub steps_changed: bool,
    pub distance_changed: bool,
}

impl StepTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Open a new subscription segment at `now` (resume).
    pub fn begin_segment(&mut self, now: f64) {
        self.base = self.totals;
        self.cadence_spm = 0.0;
        if self.active {
            self.last_step_change_at = Some(now);
        }
    }

    pub fn apply(&mut self, sample: &PedometerSample) -> StepUpdate {
        let mut update = StepUpdate::default();
        self.samples += 1;

        let steps = self.base.steps.saturating_add(sample.cumulative_steps);
        if steps > self.totals.steps {
            self.totals.steps = steps;
            self.last_step_change_at = Some(sample.timestamp);
            update.steps_changed = true;
        }
        if self.totals.steps > 0 {
            self.active = true;
        }

        if let Some(distance) = sample.cumulative_distance.filter(|d| d.is_finite() && *d >= 0.0) {
            let total = self.base.distance_m + distance;
            if total > self.totals.distance_m {
                self.totals.distance_m = total;
                update.distance_changed = true;
            }
        }

        self.totals.floors_ascended = self
            .totals
            .floors_ascended
            .max(self.base.floors_ascended.saturating_add(sample.floors_ascended));
        self.totals.floors_descended = self
            .totals
            .floors_descended
            .max(self.base.floors_descended.saturating_add(sample.floors_descended));

        self.cadence_spm = sample
            .cadence
            .filter(|c| c.is_finite() && *c >= 0.0)
            .unwrap_or(0.0);

        update
    }

    pub fn totals(&self) -> StepTotals {
        self.totals
    }

    pub fn cadence(&self) -> f64 {
        self.cadence_spm
    }

    /// True once a non-zero step count has been seen this session.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Seconds since the step count last moved, if it ever has.
    pub fn seconds_since_step_change(&self, now: f64) -> Option<f64> {
        self.last_step_change_at.map(|t| (now - t).max(0.0))
    }

    pub fn sample_count(&self) -> u64 {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(timestamp: f64, steps: u64, distance: f64) -> PedometerSample {
        PedometerSample {
            timestamp,
            cumulative_steps: steps,
            cadence: Some(160.0),
            cumulative_distance: Some(distance),
            ..Default::default()
        }
    }

    #[test]
    fn test_accumulates_within_segment() {
        let mut tracker = StepTracker::new();
        tracker.apply(&reading(0.0, 0, 0.0));
        assert!(!tracker.is_active());

        let update = tracker.apply(&reading(1.0, 3, 2.4));
        assert!(update.steps_changed);
        assert!(update.distance_changed);
        assert!(tracker.is_active());
        assert_eq!(tracker.totals().steps, 3);
        assert_eq!(tracker.cadence(), 160.0);
    }

    #[test]
    fn test_segments_rebase_totals() {
        let mut tracker = StepTracker::new();
        tracker.apply(&reading(0.0, 100, 80.0));

        tracker.begin_segment(50.0);
        // New subscription counts from zero again
        tracker.apply(&reading(51.0, 0, 0.0));
        assert_eq!(tracker.totals().steps, 100);

        tracker.apply(&reading(52.0, 10, 8.0));
        assert_eq!(tracker.totals().steps, 110);
        assert_eq!(tracker.totals().distance_m, 88.0);
    }

    #[test]
    fn test_totals_never_decrease() {
        let mut tracker = StepTracker::new();
        tracker.apply(&reading(0.0, 50, 40.0));
        let update = tracker.apply(&reading(1.0, 20, 10.0));
        assert_eq!(update, StepUpdate::default());
        assert_eq!(tracker.totals().steps, 50);
        assert_eq!(tracker.totals().distance_m, 40.0);
    }

    #[test]
    fn test_step_change_timing() {
        let mut tracker = StepTracker::new();
        assert_eq!(tracker.seconds_since_step_change(10.0), None);

        tracker.apply(&reading(10.0, 5, 4.0));
        tracker.apply(&reading(11.0, 5, 4.0));
        assert_eq!(tracker.seconds_since_step_change(14.0), Some(4.0));

        tracker.begin_segment(20.0);
        assert_eq!(tracker.seconds_since_step_change(21.0), Some(1.0));
    }

    #[test]
    fn test_missing_cadence_reads_as_zero() {
        let mut tracker = StepTracker::new();
        tracker.apply(&PedometerSample {
            timestamp: 0.0,
            cumulative_steps: 1,
            cadence: None,
            ..Default::default()
        });
        assert_eq!(tracker.cadence(), 0.0);
    }
}
