use crate::config::TrackerConfig;
use crate::distance::{DistanceAccumulator, StepVerdict};
use crate::elevation::ElevationTracker;
use crate::error::GeocodeError;
use crate::geocode::{Place, PlaceLineRefresher, PlaceLookup};
use crate::health_monitor::HealthMonitor;
use crate::live_status::{DisplaySurfaceHost, LiveStatusProjector, ProjectorState, SurfaceRecord};
use crate::pace::{average_pace, PaceEstimator};
use crate::pedometer::StepTracker;
use crate::route::RouteSampler;
use crate::sensors::SensorSource;
use crate::session_clock::SessionClock;
use crate::snapshot::{RunSnapshot, RunState};
use crate::stationary::StationaryDetector;
use crate::summary::{utc_datetime, RunDiagnostics, RunSummary};
use crate::types::{AltitudeSample, MotionSample, PedometerSample, PositionSample, SensorEvent, SensorKind};

/// Last known state of a run interrupted by a relaunch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RestoredRun {
    pub elapsed_seconds: f64,
    pub distance_meters: f64,
}

impl RestoredRun {
    /// Recover from the record the display surface still holds.
    ///
    /// A record written while running keeps counting the time the process
    /// was gone; a paused one resumes from its frozen value.
    pub fn from_surface(record: &SurfaceRecord, now: f64) -> Option<Self> {
        if !record.is_resumable() {
            return None;
        }
        let snapshot = &record.snapshot;
        let mut elapsed = snapshot.elapsed_seconds as f64;
        if snapshot.is_running {
            elapsed += (now - snapshot.updated_at).max(0.0);
        }
        Some(RestoredRun {
            elapsed_seconds: elapsed,
            distance_meters: snapshot.distance_meters,
        })
    }
}

/// `run-<start time>-<generation>`, unique per controller even for runs
/// started within the same second.
fn session_id(started_at: f64, generation: u64) -> String {
    match utc_datetime(started_at) {
        Some(at) => format!("{}-{}", at.format("run-%Y%m%d-%H%M%S"), generation),
        None => format!("run-{}", generation),
    }
}

/// Top-level run state machine: Idle → Running ⇄ Paused → Finished.
///
/// Single owner of the session model. Every entry point takes the current
/// time and returns the resulting snapshot. Illegal transitions are no-ops.
pub struct RunSessionController {
    config: TrackerConfig,
    state: RunState,
    generation: u64,
    session_id: Option<String>,
    started_at: f64,
    segment_started_at: f64,

    clock: SessionClock,
    steps: StepTracker,
    stationary: StationaryDetector,
    distance: DistanceAccumulator,
    pace: PaceEstimator,
    route: RouteSampler,
    elevation: ElevationTracker,
    places: PlaceLineRefresher,
    health: HealthMonitor,

    sources: Vec<Box<dyn SensorSource>>,
    projector: LiveStatusProjector,
    place_lookups_enabled: bool,
    pending_lookups: Vec<PlaceLookup>,
}

impl RunSessionController {
    pub fn new(
        config: TrackerConfig,
        sources: Vec<Box<dyn SensorSource>>,
        surface: Box<dyn DisplaySurfaceHost>,
    ) -> Self {
        let health = HealthMonitor::new(&config);
        let projector = LiveStatusProjector::new(surface, &config);
        Self {
            config,
            state: RunState::Idle,
            generation: 0,
            session_id: None,
            started_at: 0.0,
            segment_started_at: 0.0,
            clock: SessionClock::new(),
            steps: StepTracker::new(),
            stationary: StationaryDetector::new(),
            distance: DistanceAccumulator::new(),
            pace: PaceEstimator::new(),
            route: RouteSampler::new(),
            elevation: ElevationTracker::new(),
            places: PlaceLineRefresher::new(),
            health,
            sources,
            projector,
            place_lookups_enabled: false,
            pending_lookups: Vec::new(),
        }
    }

    /// Queue reverse-geocoding lookups for the owner to run.
    pub fn with_place_lookups(mut self) -> Self {
        self.place_lookups_enabled = true;
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn projector_state(&self) -> ProjectorState {
        self.projector.state()
    }

    // ─── Transitions ─────────────────────────────────────────────────────────

    pub fn start(&mut self, now: f64) -> RunSnapshot {
        if self.state.is_active() {
            log::debug!("start() ignored while {:?}", self.state);
            return self.snapshot(now);
        }

        self.open_session(now);
        self.clock.start(now);
        log::info!("Run {} started", self.session_id.as_deref().unwrap_or("?"));
        self.begin_tracking(now)
    }

    /// Reopen a run interrupted by a relaunch, continuing its elapsed time
    /// and distance.
    pub fn restore(&mut self, now: f64, restored: RestoredRun) -> RunSnapshot {
        if self.state.is_active() {
            log::debug!("restore() ignored while {:?}", self.state);
            return self.snapshot(now);
        }

        self.open_session(now);
        self.started_at = now - restored.elapsed_seconds.max(0.0);
        self.session_id = Some(session_id(self.started_at, self.generation));
        self.clock.restore(now, restored.elapsed_seconds);
        self.distance.restore(restored.distance_meters);
        log::info!(
            "Run {} restored at {:.0}s, {:.0} m",
            self.session_id.as_deref().unwrap_or("?"),
            restored.elapsed_seconds,
            restored.distance_meters
        );
        self.begin_tracking(now)
    }

    pub fn pause(&mut self, now: f64) -> RunSnapshot {
        if self.state != RunState::Running {
            log::debug!("pause() ignored while {:?}", self.state);
            return self.snapshot(now);
        }

        self.clock.pause(now);
        self.stop_sources();
        self.stationary.clear_classification();
        self.distance.clear_reference();
        self.pace.clear_segment();
        self.state = RunState::Paused;
        log::info!("Run paused at {}s", self.clock.elapsed_seconds(now));
        self.publish(now)
    }

    pub fn resume(&mut self, now: f64) -> RunSnapshot {
        if self.state != RunState::Paused {
            log::debug!("resume() ignored while {:?}", self.state);
            return self.snapshot(now);
        }

        self.clock.resume(now);
        self.steps.begin_segment(now);
        self.elevation.begin_segment();
        self.pace.clear_segment();
        self.segment_started_at = now;
        self.state = RunState::Running;
        self.start_sources(now);
        log::info!("Run resumed at {}s", self.clock.elapsed_seconds(now));
        self.publish(now)
    }

    /// Finish the run. Returns `None` when no session was open.
    pub fn stop(&mut self, now: f64) -> Option<RunSummary> {
        if !self.state.is_active() {
            log::debug!("stop() ignored while {:?}", self.state);
            return None;
        }

        self.clock.stop(now);
        if self.route.flush_final(&self.config) {
            log::debug!("Flushed final position into route");
        }
        self.stop_sources();
        self.pending_lookups.clear();
        self.state = RunState::Finished;

        let snapshot = self.snapshot(now);
        self.projector.end(&snapshot.live_status());
        log::info!("Run finished: {}", snapshot.status_line());

        let diagnostics = self.diagnostics();
        Some(RunSummary::new(snapshot, self.started_at, now, diagnostics))
    }

    fn open_session(&mut self, now: f64) {
        self.generation += 1;
        self.started_at = now;
        self.segment_started_at = now;
        self.session_id = Some(session_id(now, self.generation));

        self.clock = SessionClock::new();
        self.steps.reset();
        self.stationary.reset();
        self.distance.reset();
        self.pace.reset();
        self.route.reset();
        self.elevation.reset();
        self.places.reset();
        self.health.reset();
        self.pending_lookups.clear();
    }

    fn begin_tracking(&mut self, now: f64) -> RunSnapshot {
        self.state = RunState::Running;
        self.start_sources(now);
        let snapshot = self.snapshot(now);
        self.projector.start(&snapshot.live_status());
        snapshot
    }

    fn start_sources(&mut self, now: f64) {
        for source in self.sources.iter_mut() {
            let kind = source.kind();
            match source.start(now) {
                Ok(()) => {
                    self.health.get_mut(kind).mark_started(now);
                    if kind == SensorKind::MotionActivity {
                        self.stationary.mark_classifier_available();
                    }
                }
                Err(e) => {
                    log::warn!("[{}] not tracked: {}", kind, e);
                    self.health.get_mut(kind).mark_failed(&e);
                }
            }
        }
    }

    fn stop_sources(&mut self) {
        for source in self.sources.iter_mut() {
            source.stop();
            self.health.get_mut(source.kind()).mark_stopped();
        }
    }

    // ─── Samples ─────────────────────────────────────────────────────────────

    pub fn on_event(&mut self, event: SensorEvent, now: f64) -> RunSnapshot {
        match event {
            SensorEvent::Position(sample) => self.on_position(&sample, now),
            SensorEvent::Pedometer(sample) => self.on_pedometer(&sample, now),
            SensorEvent::Altitude(sample) => self.on_altitude(&sample, now),
            SensorEvent::Motion(sample) => self.on_motion(&sample, now),
            SensorEvent::Error { kind, message } => self.on_sensor_error(kind, &message, now),
        }
    }

    /// Samples are only taken while running, and only from the current
    /// subscription segment.
    fn accepts(&self, timestamp: f64) -> bool {
        self.state == RunState::Running && timestamp >= self.segment_started_at
    }

    pub fn on_position(&mut self, sample: &PositionSample, now: f64) -> RunSnapshot {
        if !self.accepts(sample.timestamp) {
            return self.snapshot(now);
        }
        self.health.position.record_sample(sample.timestamp);

        let stationary = self
            .stationary
            .is_stationary(sample.timestamp, &self.steps, &self.config);
        let verdict = self.distance.observe_position(sample, stationary, &self.config);
        if let StepVerdict::Accepted(step) = verdict {
            log::debug!("+{:.1} m -> {:.1} m", step, self.distance.distance_meters());
        }
        self.pace.observe_position(sample, stationary, &self.config);
        self.route.observe(sample, &self.config);

        if self.place_lookups_enabled
            && sample.has_valid_accuracy()
            && sample.horizontal_accuracy <= self.config.route_max_accuracy_m
        {
            if let Some(lookup) =
                self.places
                    .poll(self.generation, sample.coordinate, now, &self.config)
            {
                self.pending_lookups.push(lookup);
            }
        }

        self.publish(now)
    }

    pub fn on_pedometer(&mut self, sample: &PedometerSample, now: f64) -> RunSnapshot {
        if !self.accepts(sample.timestamp) {
            return self.snapshot(now);
        }
        self.health.pedometer.record_sample(sample.timestamp);

        let update = self.steps.apply(sample);
        if update.distance_changed {
            self.distance
                .observe_pedometer_distance(self.steps.totals().distance_m);
        }
        self.pace
            .observe_pedometer_pace(sample.pace_sec_per_meter, sample.timestamp, &self.config);
        self.publish(now)
    }

    pub fn on_altitude(&mut self, sample: &AltitudeSample, now: f64) -> RunSnapshot {
        if !self.accepts(sample.timestamp) {
            return self.snapshot(now);
        }
        self.health.altimeter.record_sample(sample.timestamp);
        self.elevation.observe(sample.relative_altitude);
        self.publish(now)
    }

    pub fn on_motion(&mut self, sample: &MotionSample, now: f64) -> RunSnapshot {
        if !self.accepts(sample.timestamp) {
            return self.snapshot(now);
        }
        self.health.motion.record_sample(sample.timestamp);
        self.stationary.apply(sample);
        self.publish(now)
    }

    fn on_sensor_error(&mut self, kind: SensorKind, message: &str, now: f64) -> RunSnapshot {
        log::warn!("[{}] sensor error: {}", kind, message);
        self.health.get_mut(kind).record_error();
        self.snapshot(now)
    }

    /// Periodic clock tick. Cosmetic: it refreshes elapsed time and the
    /// display surface, nothing depends on its regularity.
    pub fn tick(&mut self, now: f64) -> RunSnapshot {
        if self.state == RunState::Running {
            self.health.report_silences(now);
            self.pace.refresh(now, &self.config);
        }
        self.publish(now)
    }

    // ─── Place line ──────────────────────────────────────────────────────────

    /// Lookups queued since the last call.
    pub fn take_place_lookups(&mut self) -> Vec<PlaceLookup> {
        std::mem::take(&mut self.pending_lookups)
    }

    /// Apply a finished lookup. Results from an earlier session, or arriving
    /// after stop, are discarded and `None` is returned.
    pub fn apply_place_lookup(
        &mut self,
        lookup: &PlaceLookup,
        result: Result<Place, GeocodeError>,
        now: f64,
    ) -> Option<RunSnapshot> {
        if lookup.generation != self.generation || !self.state.is_active() {
            log::debug!(
                "Discarding place lookup for generation {} (current {}, {:?})",
                lookup.generation,
                self.generation,
                self.state
            );
            return None;
        }

        if self.places.complete(lookup, result) {
            log::info!("Place: {}", self.places.place_line().unwrap_or_default());
        }
        Some(self.publish(now))
    }

    // ─── Snapshots ───────────────────────────────────────────────────────────

    pub fn snapshot(&mut self, now: f64) -> RunSnapshot {
        let elapsed_seconds = match self.state {
            RunState::Idle => 0,
            _ => self.clock.elapsed_seconds(now),
        };
        let distance_meters = self.distance.distance_meters();
        let totals = self.steps.totals();

        RunSnapshot {
            session_id: self.session_id.clone(),
            generation: self.generation,
            state: self.state,
            elapsed_seconds,
            distance_meters,
            current_pace: self.pace.current_pace(),
            pace_source: self.pace.current_source(),
            average_pace: average_pace(elapsed_seconds as f64, distance_meters),
            route: self.route.points().to_vec(),
            cadence: self.steps.cadence(),
            step_count: totals.steps,
            floors_ascended: totals.floors_ascended,
            floors_descended: totals.floors_descended,
            elevation_gain_meters: self.elevation.gain_meters(),
            elevation_loss_meters: self.elevation.loss_meters(),
            max_elevation_meters: self.elevation.peak_meters(),
            place_line: self.places.place_line().map(str::to_string),
            health: self.health.check_health(now),
            taken_at: now,
        }
    }

    /// Snapshot plus a display-surface refresh while a session is open.
    fn publish(&mut self, now: f64) -> RunSnapshot {
        let snapshot = self.snapshot(now);
        if self.state.is_active() {
            self.projector.refresh(&snapshot.live_status());
        }
        snapshot
    }

    pub fn health_status(&self, now: f64) -> String {
        self.health.format_status(now)
    }

    fn diagnostics(&self) -> RunDiagnostics {
        RunDiagnostics {
            position_samples: self.health.position.sample_count(),
            pedometer_samples: self.steps.sample_count(),
            altitude_samples: self.health.altimeter.sample_count(),
            sensor_errors: SensorKind::ALL
                .iter()
                .map(|kind| self.health.get(*kind).error_count())
                .sum(),
            accepted_fixes: self.distance.accepted_steps(),
            rejected_fixes: self.distance.rejected_steps(),
            gps_distance_meters: self.distance.gps_distance_meters(),
            live_status_submissions: self.projector.submissions(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrackerError;
    use crate::health_monitor::SensorStatus;
    use crate::live_status::testing::{HostCall, RecordingSurface};
    use crate::live_status::{LiveStatusSnapshot, NoSurface, SurfaceHandle, SurfacePhase};
    use crate::pace::PaceSource;
    use crate::sensors::{external_sources, ExternalSource};
    use crate::types::Coordinate;
    use approx::assert_abs_diff_eq;

    const T0: f64 = 1_700_000_000.0;
    const ORIGIN: Coordinate = Coordinate {
        latitude: 40.7128,
        longitude: -74.006,
    };

    fn controller() -> RunSessionController {
        RunSessionController::new(TrackerConfig::default(), external_sources(), Box::new(NoSurface))
    }

    fn fix(t: f64, meters_north: f64, accuracy: f64, speed: Option<f64>) -> PositionSample {
        PositionSample::new(T0 + t, ORIGIN.offset(meters_north, 0.0), accuracy, speed)
    }

    fn steps(t: f64, count: u64, distance: Option<f64>, cadence: f64) -> PedometerSample {
        PedometerSample {
            timestamp: T0 + t,
            cumulative_steps: count,
            cadence: Some(cadence),
            cumulative_distance: distance,
            ..Default::default()
        }
    }

    #[test]
    fn test_end_to_end_scenario() {
        let mut run = controller();
        run.start(T0);

        run.on_position(&fix(0.0, 0.0, 5.0, None), T0);
        run.on_pedometer(&steps(0.0, 0, Some(0.0), 0.0), T0);
        let snapshot = run.on_position(&fix(5.0, 8.0, 8.0, Some(1.6)), T0 + 5.0);

        assert_abs_diff_eq!(snapshot.distance_meters, 8.0, epsilon = 0.1);
        assert_eq!(snapshot.current_pace, None);
        assert_eq!(snapshot.current_pace_display(), "00:00");
        assert_eq!(snapshot.route[0].coordinate, ORIGIN);

        let summary = run.stop(T0 + 6.0).unwrap();
        let route = &summary.snapshot.route;
        assert!(route.len() >= 2);
        let finish = ORIGIN.offset(8.0, 0.0);
        assert!(route.last().unwrap().coordinate.distance_to(&finish) < 0.01);
        assert_eq!(summary.snapshot.state, RunState::Finished);
    }

    #[test]
    fn test_pause_resume_time_continuity() {
        let mut run = controller();
        run.start(T0);
        assert_eq!(run.tick(T0 + 10.0).elapsed_seconds, 10);

        run.pause(T0 + 10.0);
        // Suspended: ticks while paused show the frozen value
        assert_eq!(run.tick(T0 + 14.0).elapsed_seconds, 10);
        run.resume(T0 + 15.0);

        assert_eq!(run.tick(T0 + 18.0).elapsed_seconds, 13);
    }

    #[test]
    fn test_stationary_suppression() {
        let mut run = controller();
        run.start(T0);
        run.on_motion(
            &MotionSample {
                timestamp: T0,
                is_stationary: true,
            },
            T0,
        );
        run.on_pedometer(&steps(0.0, 0, Some(0.0), 0.0), T0);

        // Alternate between two points 4 m apart
        let snapshot = (0..50)
            .map(|i| {
                let north = if i % 2 == 0 { 0.0 } else { 4.0 };
                run.on_position(&fix(i as f64, north, 10.0, Some(1.0)), T0 + i as f64)
            })
            .last()
            .unwrap();
        assert_eq!(snapshot.distance_meters, 0.0);
        assert_eq!(snapshot.current_pace, None);
    }

    #[test]
    fn test_step_heuristic_freezes_drift() {
        let mut run = controller();
        run.start(T0);
        run.on_pedometer(&steps(0.0, 40, None, 0.0), T0);

        // No new steps for > 3 s: a 10 m hop is drift
        run.on_position(&fix(4.0, 0.0, 5.0, None), T0 + 4.0);
        let snapshot = run.on_position(&fix(5.0, 10.0, 5.0, None), T0 + 5.0);
        assert_eq!(snapshot.distance_meters, 0.0);
    }

    #[test]
    fn test_noise_and_teleport_rejection() {
        let mut run = controller();
        run.start(T0);
        run.on_position(&fix(0.0, 0.0, 20.0, None), T0);
        let snapshot = run.on_position(&fix(1.0, 2.0, 20.0, None), T0 + 1.0);
        assert_eq!(snapshot.distance_meters, 0.0);

        let snapshot = run.on_position(&fix(2.0, 152.0, 5.0, None), T0 + 2.0);
        assert_eq!(snapshot.distance_meters, 0.0);
    }

    #[test]
    fn test_pedometer_floor_raises_distance() {
        let mut run = controller();
        run.start(T0);
        run.on_position(&fix(0.0, 0.0, 5.0, None), T0);
        run.on_position(&fix(5.0, 10.0, 5.0, None), T0 + 5.0);

        let snapshot = run.on_pedometer(&steps(6.0, 30, Some(25.0), 170.0), T0 + 6.0);
        assert_abs_diff_eq!(snapshot.distance_meters, 25.0);

        // Pedometer distance lagging behind never lowers the total
        let snapshot = run.on_pedometer(&steps(7.0, 31, Some(20.0), 170.0), T0 + 7.0);
        assert_abs_diff_eq!(snapshot.distance_meters, 25.0);
    }

    #[test]
    fn test_pedometer_pace_takes_priority() {
        let mut run = controller();
        run.start(T0);
        let mut sample = steps(1.0, 3, Some(2.5), 165.0);
        sample.pace_sec_per_meter = Some(0.33);
        let snapshot = run.on_pedometer(&sample, T0 + 1.0);
        assert_abs_diff_eq!(snapshot.current_pace.unwrap(), 5.5, epsilon = 0.01);
    }

    #[test]
    fn test_pedometer_pace_not_carried_across_resume() {
        let mut run = controller();
        run.start(T0);
        let mut sample = steps(1.0, 0, None, 0.0);
        sample.pace_sec_per_meter = Some(0.3);
        run.on_pedometer(&sample, T0 + 1.0);
        assert_eq!(run.pause(T0 + 2.0).current_pace, None);
        run.resume(T0 + 10.0);

        // Pedometer stays quiet; 2 m/s from GPS alone
        let snapshot = (10..=40)
            .map(|t| {
                let t = t as f64;
                run.on_position(&fix(t, 2.0 * (t - 10.0), 5.0, Some(2.0)), T0 + t)
            })
            .last()
            .unwrap();
        assert_eq!(snapshot.pace_source, Some(PaceSource::GpsWindow));
        assert_abs_diff_eq!(snapshot.current_pace.unwrap(), 1000.0 / 2.0 / 60.0, epsilon = 0.05);
    }

    #[test]
    fn test_silent_pedometer_pace_expires_on_tick() {
        let mut run = controller();
        run.start(T0);
        let mut sample = steps(1.0, 0, None, 0.0);
        sample.pace_sec_per_meter = Some(0.3);
        assert!(run.on_pedometer(&sample, T0 + 1.0).current_pace.is_some());

        assert!(run.tick(T0 + 5.0).current_pace.is_some());
        let snapshot = run.tick(T0 + 12.0);
        assert_eq!(snapshot.current_pace, None);
        assert_eq!(snapshot.pace_source, None);
    }

    #[test]
    fn test_stop_flushes_last_known_position() {
        let mut run = controller();
        run.start(T0);
        run.on_position(&fix(0.0, 0.0, 5.0, None), T0);
        // Too coarse for the route, but still the last known position
        run.on_position(&fix(4.0, 40.0, 60.0, None), T0 + 4.0);
        assert_eq!(run.snapshot(T0 + 4.0).route.len(), 1);

        let summary = run.stop(T0 + 5.0).unwrap();
        assert_eq!(summary.snapshot.route.len(), 2);
        assert_eq!(summary.snapshot.route[1].coordinate, ORIGIN.offset(40.0, 0.0));
    }

    #[test]
    fn test_illegal_transitions_are_noops() {
        let mut run = controller();
        assert_eq!(run.pause(T0).state, RunState::Idle);
        assert_eq!(run.resume(T0).state, RunState::Idle);
        assert!(run.stop(T0).is_none());

        run.start(T0);
        let generation = run.generation();
        // Duplicate start keeps the session
        run.start(T0 + 1.0);
        assert_eq!(run.generation(), generation);
        assert_eq!(run.resume(T0 + 2.0).state, RunState::Running);

        run.pause(T0 + 3.0);
        assert_eq!(run.pause(T0 + 4.0).state, RunState::Paused);

        assert!(run.stop(T0 + 5.0).is_some());
        assert!(run.stop(T0 + 6.0).is_none());
        assert_eq!(run.pause(T0 + 7.0).state, RunState::Finished);
    }

    #[test]
    fn test_new_start_resets_accumulators() {
        let mut run = controller();
        run.start(T0);
        run.on_position(&fix(0.0, 0.0, 5.0, None), T0);
        run.on_position(&fix(5.0, 10.0, 5.0, None), T0 + 5.0);
        run.on_pedometer(&steps(5.0, 12, None, 150.0), T0 + 5.0);
        run.stop(T0 + 6.0);

        let snapshot = run.start(T0 + 100.0);
        assert_eq!(snapshot.generation, 2);
        assert_eq!(snapshot.distance_meters, 0.0);
        assert_eq!(snapshot.step_count, 0);
        assert!(snapshot.route.is_empty());
        assert_eq!(snapshot.elapsed_seconds, 0);
    }

    #[test]
    fn test_session_ids_unique_within_one_second() {
        let mut run = controller();
        let first = run.start(T0).session_id.unwrap();
        assert_eq!(first, "run-20231114-221320-1");
        run.stop(T0 + 0.2);

        let second = run.start(T0 + 0.5).session_id.unwrap();
        assert_eq!(second, "run-20231114-221320-2");
        assert_eq!(run.stop(T0 + 0.9).unwrap().session_id, second);
    }

    #[test]
    fn test_out_of_range_start_time_does_not_panic() {
        let mut run = controller();
        let snapshot = run.start(1.0e13);
        assert_eq!(snapshot.session_id.as_deref(), Some("run-1"));

        let summary = run.stop(1.0e13 + 5.0).unwrap();
        assert_eq!(summary.session_id, "run-1");
        assert_eq!(summary.started_at, "1970-01-01T00:00:00+00:00");

        let restored = RestoredRun {
            elapsed_seconds: 30.0,
            distance_meters: 100.0,
        };
        let snapshot = run.restore(2.0e13, restored);
        assert_eq!(snapshot.session_id.as_deref(), Some("run-2"));
    }

    #[test]
    fn test_samples_ignored_unless_running() {
        let mut run = controller();
        let snapshot = run.on_position(&fix(0.0, 0.0, 5.0, None), T0);
        assert!(snapshot.route.is_empty());

        run.start(T0);
        run.on_position(&fix(0.0, 0.0, 5.0, None), T0);
        run.pause(T0 + 1.0);
        let snapshot = run.on_position(&fix(2.0, 30.0, 5.0, None), T0 + 2.0);
        assert_eq!(snapshot.route.len(), 1);
    }

    #[test]
    fn test_stale_segment_samples_dropped_after_resume() {
        let mut run = controller();
        run.start(T0);
        run.on_pedometer(&steps(5.0, 10, None, 150.0), T0 + 5.0);
        run.pause(T0 + 6.0);
        run.resume(T0 + 10.0);

        // Reading from the old subscription delivered late
        let snapshot = run.on_pedometer(&steps(6.0, 12, None, 150.0), T0 + 10.5);
        assert_eq!(snapshot.step_count, 10);

        let snapshot = run.on_pedometer(&steps(11.0, 4, None, 150.0), T0 + 11.0);
        assert_eq!(snapshot.step_count, 14);
    }

    #[test]
    fn test_elevation_continues_across_resume() {
        let mut run = controller();
        run.start(T0);
        for (t, alt) in [(0.0, 0.0), (2.0, 3.0), (4.0, 5.0)] {
            run.on_altitude(
                &AltitudeSample {
                    timestamp: T0 + t,
                    relative_altitude: alt,
                },
                T0 + t,
            );
        }
        run.pause(T0 + 5.0);
        run.resume(T0 + 8.0);
        for (t, alt) in [(8.0, 0.0), (10.0, 2.0)] {
            run.on_altitude(
                &AltitudeSample {
                    timestamp: T0 + t,
                    relative_altitude: alt,
                },
                T0 + t,
            );
        }
        let snapshot = run.snapshot(T0 + 10.0);
        assert_abs_diff_eq!(snapshot.elevation_gain_meters, 7.0);
        assert_abs_diff_eq!(snapshot.max_elevation_meters, 7.0);
    }

    #[test]
    fn test_unavailable_sensor_degrades_gracefully() {
        let sources: Vec<Box<dyn SensorSource>> = vec![
            Box::new(ExternalSource::failing(
                SensorKind::Position,
                TrackerError::PermissionDenied(SensorKind::Position),
            )),
            Box::new(ExternalSource::new(SensorKind::Pedometer)),
            Box::new(ExternalSource::failing(
                SensorKind::Altimeter,
                TrackerError::SensorUnavailable(SensorKind::Altimeter),
            )),
        ];
        let mut run = RunSessionController::new(TrackerConfig::default(), sources, Box::new(NoSurface));
        let snapshot = run.start(T0);

        assert_eq!(snapshot.state, RunState::Running);
        assert_eq!(snapshot.health.position, SensorStatus::PermissionDenied);
        assert_eq!(snapshot.health.altimeter, SensorStatus::Unavailable);
        assert_eq!(snapshot.health.pedometer, SensorStatus::Active);
        assert_eq!(snapshot.health.motion_activity, SensorStatus::Inactive);

        let snapshot = run.tick(T0 + 30.0);
        assert_eq!(snapshot.distance_meters, 0.0);
        assert_eq!(snapshot.pace_display(), "00:00");
        assert_eq!(snapshot.elapsed_seconds, 30);
    }

    #[test]
    fn test_sensor_errors_are_counted_not_fatal() {
        let mut run = controller();
        run.start(T0);
        let snapshot = run.on_event(
            SensorEvent::Error {
                kind: SensorKind::Pedometer,
                message: "transient".to_string(),
            },
            T0 + 1.0,
        );
        assert_eq!(snapshot.state, RunState::Running);
        let summary = run.stop(T0 + 2.0).unwrap();
        assert_eq!(summary.diagnostics.sensor_errors, 1);
    }

    #[test]
    fn test_stale_place_lookup_discarded() {
        let mut run = controller().with_place_lookups();
        run.start(T0);
        run.on_position(&fix(0.0, 0.0, 5.0, None), T0);
        let lookups = run.take_place_lookups();
        assert_eq!(lookups.len(), 1);
        let stale = lookups[0];

        run.stop(T0 + 1.0);
        run.start(T0 + 2.0);

        let place = Place {
            neighborhood: Some("Tribeca".to_string()),
            city: Some("New York".to_string()),
        };
        assert!(run.apply_place_lookup(&stale, Ok(place), T0 + 3.0).is_none());
        assert_eq!(run.snapshot(T0 + 3.0).place_line, None);
    }

    #[test]
    fn test_place_lookup_updates_place_line() {
        let mut run = controller().with_place_lookups();
        run.start(T0);
        run.on_position(&fix(0.0, 0.0, 5.0, None), T0);
        let lookup = run.take_place_lookups()[0];

        let place = Place {
            neighborhood: Some("Tribeca".to_string()),
            city: Some("New York".to_string()),
        };
        let snapshot = run.apply_place_lookup(&lookup, Ok(place), T0 + 1.0).unwrap();
        assert_eq!(snapshot.place_line.as_deref(), Some("Tribeca, New York"));

        // Rate limited: nothing new within the interval
        run.on_position(&fix(10.0, 150.0, 5.0, None), T0 + 10.0);
        assert!(run.take_place_lookups().is_empty());
    }

    #[test]
    fn test_live_status_follows_session() {
        let host = RecordingSurface::default();
        let mut run = RunSessionController::new(
            TrackerConfig::default(),
            external_sources(),
            Box::new(host.clone()),
        );
        run.start(T0);
        run.tick(T0 + 1.0);
        run.pause(T0 + 2.0);
        run.stop(T0 + 3.0);

        let calls = host.calls();
        assert!(matches!(calls.first(), Some(HostCall::Create(_))));
        let paused = calls.iter().any(|c| {
            matches!(c, HostCall::Update { snapshot, relevance, .. } if !snapshot.is_running && *relevance == 0.5)
        });
        assert!(paused);
        assert!(matches!(calls.last(), Some(HostCall::End { .. })));
        assert_eq!(run.projector_state(), ProjectorState::Ended);
    }

    #[test]
    fn test_denied_surface_never_blocks_tracking() {
        let mut run = RunSessionController::new(
            TrackerConfig::default(),
            external_sources(),
            Box::new(RecordingSurface::denying()),
        );
        run.start(T0);
        assert_eq!(run.projector_state(), ProjectorState::Disabled);
        run.on_position(&fix(0.0, 0.0, 5.0, None), T0);
        let snapshot = run.on_position(&fix(5.0, 12.0, 5.0, None), T0 + 5.0);
        assert_abs_diff_eq!(snapshot.distance_meters, 12.0, epsilon = 0.1);
    }

    #[test]
    fn test_restore_from_surface_record() {
        let record = SurfaceRecord {
            handle: SurfaceHandle(1),
            phase: SurfacePhase::Active,
            snapshot: LiveStatusSnapshot {
                generation: 1,
                elapsed_seconds: 600,
                distance_meters: 1_500.0,
                average_pace: None,
                current_pace: None,
                is_running: true,
                place_line: None,
                updated_at: T0,
            },
            relevance: 1.0,
            stale_after: T0 + 60.0,
            dismiss_at: None,
        };
        let restored = RestoredRun::from_surface(&record, T0 + 20.0).unwrap();
        assert_abs_diff_eq!(restored.elapsed_seconds, 620.0);

        let mut run = controller();
        let snapshot = run.restore(T0 + 20.0, restored);
        assert_eq!(snapshot.state, RunState::Running);
        assert_eq!(snapshot.elapsed_seconds, 620);
        assert_abs_diff_eq!(snapshot.distance_meters, 1_500.0);

        assert_eq!(run.tick(T0 + 25.0).elapsed_seconds, 625);

        let ended = SurfaceRecord {
            phase: SurfacePhase::Ended,
            ..record
        };
        assert!(RestoredRun::from_surface(&ended, T0).is_none());
    }

    #[test]
    fn test_distance_monotonic_over_mixed_stream() {
        let mut run = controller();
        run.start(T0);
        let mut last = 0.0;
        for i in 0..120 {
            let t = i as f64;
            let wobble = (t * 0.7).sin() * 3.0;
            let accuracy = if i % 17 == 0 { 40.0 } else { 6.0 };
            let snapshot = run.on_position(&fix(t, t * 2.8 + wobble, accuracy, Some(2.8)), T0 + t);
            assert!(snapshot.distance_meters >= last);
            last = snapshot.distance_meters;
            if i % 5 == 0 {
                let snapshot = run.on_pedometer(
                    &steps(t, (t * 2.8) as u64, Some(t * 2.5), 170.0),
                    T0 + t,
                );
                assert!(snapshot.distance_meters >= last);
                last = snapshot.distance_meters;
            }
        }
        assert!(last > 250.0);
        let pace = run.snapshot(T0 + 119.0).current_pace.unwrap();
        assert!(pace > 0.0 && pace < 20.0);
    }
}
