/// Integrates relative-altitude readings into gain, loss and peak.
///
/// Altitudes are session-relative. Each altimeter subscription restarts at
/// zero, so a new segment re-bases onto the last known session altitude.
#[derive(Clone, Debug, Default)]
pub struct ElevationTracker {
    last_altitude: Option<f64>,
    segment_offset: f64,
    awaiting_rebase: bool,
    gain_m: f64,
    loss_m: f64,
    peak_m: f64,
}

impl ElevationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// The altimeter was re-subscribed; its next reading is a new zero.
    pub fn begin_segment(&mut self) {
        if self.last_altitude.is_some() {
            self.awaiting_rebase = true;
        }
    }

    /// Returns true when gain, loss or peak moved.
    pub fn observe(&mut self, relative_altitude: f64) -> bool {
        if !relative_altitude.is_finite() {
            return false;
        }

        if self.awaiting_rebase {
            self.awaiting_rebase = false;
            if let Some(last) = self.last_altitude {
                self.segment_offset = last - relative_altitude;
            }
            return false;
        }

        let altitude = relative_altitude + self.segment_offset;
        let last = match self.last_altitude.replace(altitude) {
            Some(last) => last,
            None => {
                let previous_peak = self.peak_m;
                self.peak_m = self.peak_m.max(altitude);
                return self.peak_m != previous_peak;
            }
        };

        let delta = altitude - last;
        if delta > 0.0 {
            self.gain_m += delta;
        } else if delta < 0.0 {
            self.loss_m += -delta;
        }
        self.peak_m = self.peak_m.max(altitude);
        delta != 0.0
    }

    pub fn gain_meters(&self) -> f64 {
        self.gain_m
    }

    pub fn loss_meters(&self) -> f64 {
        self.loss_m
    }

    pub fn peak_meters(&self) -> f64 {
        self.peak_m
    }

    /// Current altitude relative to the session start.
    pub fn current_meters(&self) -> Option<f64> {
        self.last_altitude
    }
}
