/// Elapsed-time bookkeeping anchored to wall-clock time.
///
/// Only the anchor is stored; elapsed is always `now - anchor`, so a suspended
/// process that misses ticks still reports the right value when it wakes up.
#[derive(Clone, Debug, Default)]
pub struct SessionClock {
    anchor: Option<f64>,
    frozen_elapsed: f64,
    last_reported: u64,
}

impl SessionClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from zero at `now`.
    pub fn start(&mut self, now: f64) {
        self.anchor = Some(now);
        self.frozen_elapsed = 0.0;
        self.last_reported = 0;
    }

    /// Freeze elapsed time at its current value.
    pub fn pause(&mut self, now: f64) {
        if let Some(anchor) = self.anchor.take() {
            self.frozen_elapsed = (now - anchor).max(self.frozen_elapsed);
        }
    }

    /// Re-anchor so the visible value continues from where it was frozen.
    pub fn resume(&mut self, now: f64) {
        if self.anchor.is_none() {
            self.anchor = Some(now - self.frozen_elapsed);
        }
    }

    /// Re-derive the anchor from an externally known elapsed value
    /// (relaunch restored from the live status surface).
    pub fn restore(&mut self, now: f64, elapsed_seconds: f64) {
        let elapsed = elapsed_seconds.max(0.0);
        self.anchor = Some(now - elapsed);
        self.frozen_elapsed = elapsed;
        self.last_reported = elapsed.floor() as u64;
    }

    /// Stop ticking for good; the frozen value stays readable.
    pub fn stop(&mut self, now: f64) {
        self.pause(now);
    }

    pub fn is_running(&self) -> bool {
        self.anchor.is_some()
    }

    /// Whole elapsed seconds. Never decreases, even if the wall clock steps back.
    pub fn elapsed_seconds(&mut self, now: f64) -> u64 {
        let elapsed = self.elapsed_precise(now).floor() as u64;
        self.last_reported = self.last_reported.max(elapsed);
        self.last_reported
    }

    pub fn elapsed_precise(&self, now: f64) -> f64 {
        match self.anchor {
            Some(anchor) => (now - anchor).max(0.0),
            None => self.frozen_elapsed,
        }
    }
}
