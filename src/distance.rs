use crate::config::TrackerConfig;
use crate::types::PositionSample;

/// Outcome of offering one position fix to the accumulator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StepVerdict {
    /// First trusted fix; nothing to measure against yet.
    Seeded,
    /// Displacement added to the GPS total.
    Accepted(f64),
    CoarseAccuracy,
    BelowNoiseFloor,
    Teleport,
    TooSlow,
    Stationary,
}

impl StepVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, StepVerdict::Accepted(_))
    }
}

/// Filters GPS displacements into a running distance and fuses it with the
/// pedometer total.
///
/// Each fix is measured against a reference fix. The reference only moves on
/// an accepted step or when the runner is known to have stopped, so jitter
/// around a point never adds up, while slow genuine progress accumulates
/// until it clears the noise floor.
#[derive(Clone, Debug, Default)]
pub struct DistanceAccumulator {
    reference: Option<PositionSample>,
    gps_total: f64,
    pedometer_total: f64,
    pedometer_offset: f64,
    distance: f64,
    accepted_steps: u64,
    rejected_steps: u64,
}

impl DistanceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Start from a known total (relaunch restored from the live status surface).
    pub fn restore(&mut self, distance_meters: f64) {
        self.reset();
        let distance = if distance_meters.is_finite() {
            distance_meters.max(0.0)
        } else {
            0.0
        };
        self.gps_total = distance;
        self.pedometer_offset = distance;
        self.distance = distance;
    }

    /// Drop the reference fix, e.g. across a pause.
    pub fn clear_reference(&mut self) {
        self.reference = None;
    }

    pub fn observe_position(
        &mut self,
        sample: &PositionSample,
        stationary: bool,
        config: &TrackerConfig,
    ) -> StepVerdict {
        let verdict = self.classify(sample, stationary, config);
        match verdict {
            StepVerdict::Accepted(step) => {
                self.gps_total += step;
                self.reference = Some(sample.clone());
                self.accepted_steps += 1;
                self.fuse();
            }
            StepVerdict::Seeded
            | StepVerdict::Teleport
            | StepVerdict::TooSlow
            | StepVerdict::Stationary => {
                self.reference = Some(sample.clone());
                if verdict != StepVerdict::Seeded {
                    self.rejected_steps += 1;
                }
            }
            StepVerdict::CoarseAccuracy | StepVerdict::BelowNoiseFloor => {
                self.rejected_steps += 1;
            }
        }
        verdict
    }

    fn classify(
        &self,
        sample: &PositionSample,
        stationary: bool,
        config: &TrackerConfig,
    ) -> StepVerdict {
        if !sample.has_valid_accuracy() || sample.horizontal_accuracy > config.distance_max_accuracy_m
        {
            return StepVerdict::CoarseAccuracy;
        }

        let reference = match &self.reference {
            Some(reference) => reference,
            None => return StepVerdict::Seeded,
        };

        if stationary {
            return StepVerdict::Stationary;
        }

        if let Some(speed) = sample.speed.filter(|s| s.is_finite()) {
            if speed <= config.distance_min_speed_ms {
                return StepVerdict::TooSlow;
            }
        }

        let step = reference.coordinate.distance_to(&sample.coordinate);
        if step >= config.distance_max_step_m {
            return StepVerdict::Teleport;
        }

        let combined_uncertainty = (reference.horizontal_accuracy + sample.horizontal_accuracy) / 2.0;
        let noise_floor = config.distance_min_step_m.max(combined_uncertainty);
        if step < noise_floor {
            return StepVerdict::BelowNoiseFloor;
        }

        StepVerdict::Accepted(step)
    }

    /// Pedometer cumulative distance acts as a floor under the total.
    /// Returns true when the total moved up.
    pub fn observe_pedometer_distance(&mut self, cumulative_meters: f64) -> bool {
        if !cumulative_meters.is_finite() || cumulative_meters < 0.0 {
            return false;
        }
        let before = self.distance;
        self.pedometer_total = self.pedometer_total.max(self.pedometer_offset + cumulative_meters);
        self.fuse();
        self.distance > before
    }

    fn fuse(&mut self) {
        self.distance = self.distance.max(self.gps_total).max(self.pedometer_total);
    }

    pub fn distance_meters(&self) -> f64 {
        self.distance
    }

    pub fn gps_distance_meters(&self) -> f64 {
        self.gps_total
    }

    pub fn accepted_steps(&self) -> u64 {
        self.accepted_steps
    }

    pub fn rejected_steps(&self) -> u64 {
        self.rejected_steps
    }
}
