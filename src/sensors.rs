use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

use crate::error::{TrackerError, TrackerResult};
use crate::types::{
    current_timestamp, AltitudeSample, Coordinate, MotionSample, PedometerSample, PositionSample,
    SensorEvent, SensorKind,
};

/// One push-based sensor stream. Samples flow through a channel owned by
/// whoever constructed the source; the controller only starts and stops it.
pub trait SensorSource: Send {
    fn kind(&self) -> SensorKind;

    /// Subscribe. Cumulative readings count from `since`.
    fn start(&mut self, since: f64) -> TrackerResult<()>;

    /// Unsubscribe. Safe to call when already stopped.
    fn stop(&mut self);
}

/// Source whose samples are delivered by the caller (replay, tests).
/// It can be configured to fail at subscription time.
pub struct ExternalSource {
    kind: SensorKind,
    failure: Option<TrackerError>,
    running: bool,
}

impl ExternalSource {
    pub fn new(kind: SensorKind) -> Self {
        Self {
            kind,
            failure: None,
            running: false,
        }
    }

    pub fn failing(kind: SensorKind, error: TrackerError) -> Self {
        Self {
            kind,
            failure: Some(error),
            running: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl SensorSource for ExternalSource {
    fn kind(&self) -> SensorKind {
        self.kind
    }

    fn start(&mut self, _since: f64) -> TrackerResult<()> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
    }
}

/// One external source per sensor kind.
pub fn external_sources() -> Vec<Box<dyn SensorSource>> {
    SensorKind::ALL
        .iter()
        .map(|kind| Box::new(ExternalSource::new(*kind)) as Box<dyn SensorSource>)
        .collect()
}

// ─── Simulated sources ───────────────────────────────────────────────────────

/// Synthetic runner used when no device sensors are attached.
#[derive(Clone, Copy, Debug)]
pub struct SimulatedCourse {
    pub origin: Coordinate,
    pub bearing_deg: f64,
    pub speed_ms: f64,
    pub cadence_spm: f64,
    /// Peak-to-trough height of the rolling hills, meters
    pub hill_height_m: f64,
    /// Time the runner left `origin`
    pub began_at: f64,
}

impl SimulatedCourse {
    pub fn new(origin: Coordinate, began_at: f64) -> Self {
        Self {
            origin,
            bearing_deg: 45.0,
            speed_ms: 3.0,
            cadence_spm: 168.0,
            hill_height_m: 12.0,
            began_at,
        }
    }

    fn run_time(&self, t: f64) -> f64 {
        (t - self.began_at).max(0.0)
    }

    /// True position with a slow weave, plus a few meters of receiver jitter.
    pub fn position_at(&self, t: f64, seq: f64) -> PositionSample {
        let along = self.speed_ms * self.run_time(t);
        let weave = 20.0 * (along / 400.0).sin();
        let truth = self
            .origin
            .offset(along, self.bearing_deg)
            .offset(weave, self.bearing_deg + 90.0);
        let jittered = truth.offset(2.5 * (seq * 1.7).sin(), (seq * 37.0) % 360.0);

        PositionSample {
            timestamp: t,
            coordinate: jittered,
            horizontal_accuracy: 6.0 + (seq * 0.3).sin().abs() * 6.0,
            speed: Some(self.speed_ms + (seq * 0.5).sin() * 0.3),
        }
    }

    pub fn pedometer_at(&self, t: f64, since: f64) -> PedometerSample {
        let active = (t - since).max(0.0);
        let steps = (self.cadence_spm / 60.0 * active).floor() as u64;
        let stride = self.speed_ms * 60.0 / self.cadence_spm;
        PedometerSample {
            timestamp: t,
            cumulative_steps: steps,
            cadence: Some(self.cadence_spm),
            cumulative_distance: Some(steps as f64 * stride),
            pace_sec_per_meter: Some(1.0 / self.speed_ms),
            floors_ascended: (self.climbed(since, t) / 3.0).floor() as u32,
            floors_descended: 0,
        }
    }

    fn altitude(&self, t: f64) -> f64 {
        let along = self.speed_ms * self.run_time(t);
        self.hill_height_m / 2.0 * (1.0 - (along / 600.0).cos())
    }

    fn climbed(&self, since: f64, t: f64) -> f64 {
        (self.altitude(t) - self.altitude(since)).max(0.0)
    }

    pub fn altitude_at(&self, t: f64, since: f64) -> AltitudeSample {
        AltitudeSample {
            timestamp: t,
            relative_altitude: self.altitude(t) - self.altitude(since),
        }
    }
}

/// Tokio-task sensor stream driven by a [`SimulatedCourse`].
pub struct SimulatedSource {
    kind: SensorKind,
    course: SimulatedCourse,
    tx: Sender<SensorEvent>,
    task: Option<JoinHandle<()>>,
    failure: Option<TrackerError>,
}

impl SimulatedSource {
    pub fn new(kind: SensorKind, course: SimulatedCourse, tx: Sender<SensorEvent>) -> Self {
        Self {
            kind,
            course,
            tx,
            task: None,
            failure: None,
        }
    }

    /// A source missing on this device; every `start` fails with `error`.
    pub fn unavailable(
        kind: SensorKind,
        course: SimulatedCourse,
        tx: Sender<SensorEvent>,
        error: TrackerError,
    ) -> Self {
        Self {
            kind,
            course,
            tx,
            task: None,
            failure: Some(error),
        }
    }
}

impl SensorSource for SimulatedSource {
    fn kind(&self) -> SensorKind {
        self.kind
    }

    fn start(&mut self, since: f64) -> TrackerResult<()> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        if self.task.is_some() {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TrackerError::SensorFailed(format!("{}: {}", self.kind, e)))?;
        let tx = self.tx.clone();
        let course = self.course;
        let task = match self.kind {
            SensorKind::Position => runtime.spawn(position_loop(course, tx)),
            SensorKind::Pedometer => runtime.spawn(pedometer_loop(course, since, tx)),
            SensorKind::Altimeter => runtime.spawn(altimeter_loop(course, since, tx)),
            SensorKind::MotionActivity => runtime.spawn(motion_loop(tx)),
        };
        self.task = Some(task);
        log::debug!("[{}] subscribed", self.kind);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            log::debug!("[{}] unsubscribed", self.kind);
        }
    }
}

impl Drop for SimulatedSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Position, pedometer, altimeter and motion sources sharing one course.
pub fn simulated_sources(
    course: SimulatedCourse,
    tx: &Sender<SensorEvent>,
    without_altimeter: bool,
) -> Vec<Box<dyn SensorSource>> {
    SensorKind::ALL
        .iter()
        .map(|kind| {
            let source = if *kind == SensorKind::Altimeter && without_altimeter {
                SimulatedSource::unavailable(
                    *kind,
                    course,
                    tx.clone(),
                    TrackerError::SensorUnavailable(*kind),
                )
            } else {
                SimulatedSource::new(*kind, course, tx.clone())
            };
            Box::new(source) as Box<dyn SensorSource>
        })
        .collect()
}

/// Returns false once the receiver is gone.
fn send_event(tx: &Sender<SensorEvent>, event: SensorEvent, kind: SensorKind, count: &mut u64) -> bool {
    match tx.try_send(event) {
        Ok(_) => {
            *count += 1;
            if *count % 60 == 0 {
                log::debug!("[{}] {} samples", kind, count);
            }
            true
        }
        Err(TrySendError::Closed(_)) => {
            log::debug!("[{}] Channel closed after {} samples", kind, count);
            false
        }
        Err(TrySendError::Full(_)) => {
            // Channel full, drop this sample
            true
        }
    }
}

async fn position_loop(course: SimulatedCourse, tx: Sender<SensorEvent>) {
    let mut interval = interval(Duration::from_secs(1)); // 1 Hz fixes
    let mut sample_count = 0u64;
    let mut seq = 0.0;

    loop {
        interval.tick().await;
        seq += 1.0;
        let sample = course.position_at(current_timestamp(), seq);
        if !send_event(&tx, SensorEvent::Position(sample), SensorKind::Position, &mut sample_count) {
            break;
        }
    }
}

async fn pedometer_loop(course: SimulatedCourse, since: f64, tx: Sender<SensorEvent>) {
    let mut interval = interval(Duration::from_secs(1));
    let mut sample_count = 0u64;

    loop {
        interval.tick().await;
        let sample = course.pedometer_at(current_timestamp(), since);
        if !send_event(&tx, SensorEvent::Pedometer(sample), SensorKind::Pedometer, &mut sample_count) {
            break;
        }
    }
}

async fn altimeter_loop(course: SimulatedCourse, since: f64, tx: Sender<SensorEvent>) {
    let mut interval = interval(Duration::from_secs(2)); // 0.5 Hz
    let mut sample_count = 0u64;

    loop {
        interval.tick().await;
        let sample = course.altitude_at(current_timestamp(), since);
        if !send_event(&tx, SensorEvent::Altitude(sample), SensorKind::Altimeter, &mut sample_count) {
            break;
        }
    }
}

async fn motion_loop(tx: Sender<SensorEvent>) {
    // The simulated runner never stops; report once and hold the subscription
    let mut sample_count = 0u64;
    let sample = MotionSample {
        timestamp: current_timestamp(),
        is_stationary: false,
    };
    if !send_event(&tx, SensorEvent::Motion(sample), SensorKind::MotionActivity, &mut sample_count) {
        return;
    }
    tx.closed().await;
}
