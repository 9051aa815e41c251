use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;
use crate::error::SurfaceError;

/// The subset of the run mirrored onto the persistent display surface.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LiveStatusSnapshot {
    pub generation: u64,
    pub elapsed_seconds: u64,
    pub distance_meters: f64,
    pub average_pace: Option<f64>,
    pub current_pace: Option<f64>,
    pub is_running: bool,
    pub place_line: Option<String>,
    pub updated_at: f64,
}

impl LiveStatusSnapshot {
    /// Equal apart from the submission time.
    pub fn same_content(&self, other: &LiveStatusSnapshot) -> bool {
        self.generation == other.generation
            && self.elapsed_seconds == other.elapsed_seconds
            && self.distance_meters == other.distance_meters
            && self.average_pace == other.average_pace
            && self.current_pace == other.current_pace
            && self.is_running == other.is_running
            && self.place_line == other.place_line
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceHandle(pub u64);

/// OS-managed persistent display (lock screen card, ongoing notification,
/// widget). The host enforces its own rate limits and expiry.
pub trait DisplaySurfaceHost: Send {
    fn create(
        &mut self,
        initial: &LiveStatusSnapshot,
        staleness: Duration,
    ) -> Result<SurfaceHandle, SurfaceError>;

    fn update(
        &mut self,
        handle: SurfaceHandle,
        snapshot: &LiveStatusSnapshot,
        staleness: Duration,
        relevance: f64,
    ) -> Result<(), SurfaceError>;

    fn end(
        &mut self,
        handle: SurfaceHandle,
        final_snapshot: &LiveStatusSnapshot,
        dismiss_after: Duration,
    ) -> Result<(), SurfaceError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectorState {
    NotStarted,
    Active(SurfaceHandle),
    Ended,
    /// Host refused the surface; no-op until the next session.
    Disabled,
}

/// Mirrors session snapshots onto a [`DisplaySurfaceHost`].
///
/// Failures are logged and absorbed. A denial disables the projector for the
/// rest of the session and never reaches run tracking.
pub struct LiveStatusProjector {
    host: Box<dyn DisplaySurfaceHost>,
    state: ProjectorState,
    last_submitted: Option<LiveStatusSnapshot>,
    staleness: Duration,
    dismiss_after: Duration,
    relevance_running: f64,
    relevance_paused: f64,
    submissions: u64,
}

pub const MIN_RELEVANCE: f64 = 0.0;

impl LiveStatusProjector {
    pub fn new(host: Box<dyn DisplaySurfaceHost>, config: &TrackerConfig) -> Self {
        Self {
            host,
            state: ProjectorState::NotStarted,
            last_submitted: None,
            staleness: Duration::from_secs_f64(config.live_status_staleness_secs.max(0.0)),
            dismiss_after: Duration::from_secs_f64(config.live_status_dismiss_after_secs.max(0.0)),
            relevance_running: config.live_status_relevance_running,
            relevance_paused: config.live_status_relevance_paused,
            submissions: 0,
        }
    }

    pub fn state(&self) -> ProjectorState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, ProjectorState::Active(_))
    }

    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    pub fn start(&mut self, initial: &LiveStatusSnapshot) {
        if let ProjectorState::Active(_) = self.state {
            // A surface from an earlier session is still up
            self.end(initial);
        }

        self.last_submitted = None;
        match self.host.create(initial, self.staleness) {
            Ok(handle) => {
                log::info!("Live status surface created ({:?})", handle);
                self.state = ProjectorState::Active(handle);
                self.last_submitted = Some(initial.clone());
                self.submissions += 1;
            }
            Err(e) => {
                log::warn!("Live status surface unavailable, continuing without it: {}", e);
                self.state = ProjectorState::Disabled;
            }
        }
    }

    /// Submit the latest snapshot. Identical content is not resubmitted.
    pub fn refresh(&mut self, snapshot: &LiveStatusSnapshot) {
        let handle = match self.state {
            ProjectorState::Active(handle) => handle,
            _ => return,
        };
        if let Some(last) = &self.last_submitted {
            // Unchanged content is only resent to keep the host from expiring it
            let keep_alive_due =
                snapshot.updated_at - last.updated_at >= self.staleness.as_secs_f64() / 2.0;
            if last.same_content(snapshot) && !keep_alive_due {
                return;
            }
        }

        let relevance = if snapshot.is_running {
            self.relevance_running
        } else {
            self.relevance_paused
        };
        self.submit(handle, snapshot, relevance);
    }

    /// Final snapshot at minimum relevance, then dismissal after the grace delay.
    pub fn end(&mut self, final_snapshot: &LiveStatusSnapshot) {
        let handle = match self.state {
            ProjectorState::Active(handle) => handle,
            ProjectorState::Disabled => {
                self.state = ProjectorState::Ended;
                return;
            }
            _ => return,
        };

        self.submit(handle, final_snapshot, MIN_RELEVANCE);
        if let ProjectorState::Active(_) = self.state {
            if let Err(e) = self.host.end(handle, final_snapshot, self.dismiss_after) {
                log::warn!("Live status end failed: {}", e);
            }
        }
        self.state = ProjectorState::Ended;
    }

    fn submit(&mut self, handle: SurfaceHandle, snapshot: &LiveStatusSnapshot, relevance: f64) {
        match self.host.update(handle, snapshot, self.staleness, relevance) {
            Ok(()) => {
                self.last_submitted = Some(snapshot.clone());
                self.submissions += 1;
            }
            Err(e) if e.is_terminal() => {
                log::warn!("Live status surface revoked, disabling: {}", e);
                self.state = ProjectorState::Disabled;
            }
            Err(e) => {
                log::warn!("Live status update failed: {}", e);
            }
        }
    }
}

// ─── File-backed surface ─────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfacePhase {
    Active,
    Ended,
}

/// What a [`JsonFileSurface`] writes: the latest snapshot plus the host
/// contract parameters that came with it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurfaceRecord {
    pub handle: SurfaceHandle,
    pub phase: SurfacePhase,
    pub snapshot: LiveStatusSnapshot,
    pub relevance: f64,
    /// Host expires the display after this time without a refresh
    pub stale_after: f64,
    pub dismiss_at: Option<f64>,
}

impl SurfaceRecord {
    /// A record left behind by a run that never ended can resume it.
    pub fn is_resumable(&self) -> bool {
        self.phase == SurfacePhase::Active
    }
}

/// Surface host that persists each submission to a JSON file.
pub struct JsonFileSurface {
    path: PathBuf,
    next_handle: u64,
    current: Option<SurfaceRecord>,
}

impl JsonFileSurface {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            next_handle: 1,
            current: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back the last record written to `path`, if any.
    pub fn load(path: &Path) -> std::io::Result<Option<SurfaceRecord>> {
        match fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save(&self, record: &SurfaceRecord) -> Result<(), SurfaceError> {
        let json = serde_json::to_string_pretty(record).map_err(|e| SurfaceError::Io(e.to_string()))?;
        fs::write(&self.path, json).map_err(|e| SurfaceError::Io(e.to_string()))
    }

    fn write(&mut self, record: SurfaceRecord) -> Result<(), SurfaceError> {
        self.save(&record)?;
        self.current = Some(record);
        Ok(())
    }
}

impl DisplaySurfaceHost for JsonFileSurface {
    fn create(
        &mut self,
        initial: &LiveStatusSnapshot,
        staleness: Duration,
    ) -> Result<SurfaceHandle, SurfaceError> {
        let handle = SurfaceHandle(self.next_handle);
        self.next_handle += 1;
        self.write(SurfaceRecord {
            handle,
            phase: SurfacePhase::Active,
            snapshot: initial.clone(),
            relevance: 1.0,
            stale_after: initial.updated_at + staleness.as_secs_f64(),
            dismiss_at: None,
        })?;
        Ok(handle)
    }

    fn update(
        &mut self,
        handle: SurfaceHandle,
        snapshot: &LiveStatusSnapshot,
        staleness: Duration,
        relevance: f64,
    ) -> Result<(), SurfaceError> {
        self.write(SurfaceRecord {
            handle,
            phase: SurfacePhase::Active,
            snapshot: snapshot.clone(),
            relevance,
            stale_after: snapshot.updated_at + staleness.as_secs_f64(),
            dismiss_at: None,
        })
    }

    fn end(
        &mut self,
        handle: SurfaceHandle,
        final_snapshot: &LiveStatusSnapshot,
        dismiss_after: Duration,
    ) -> Result<(), SurfaceError> {
        let relevance = self
            .current
            .as_ref()
            .map(|r| r.relevance)
            .unwrap_or(MIN_RELEVANCE);
        let dismiss_at = final_snapshot.updated_at + dismiss_after.as_secs_f64();
        self.write(SurfaceRecord {
            handle,
            phase: SurfacePhase::Ended,
            snapshot: final_snapshot.clone(),
            relevance,
            stale_after: dismiss_at,
            dismiss_at: Some(dismiss_at),
        })
    }
}

/// Host without a persistent display; the projector disables itself.
pub struct NoSurface;

impl DisplaySurfaceHost for NoSurface {
    fn create(
        &mut self,
        _initial: &LiveStatusSnapshot,
        _staleness: Duration,
    ) -> Result<SurfaceHandle, SurfaceError> {
        Err(SurfaceError::Unsupported)
    }

    fn update(
        &mut self,
        _handle: SurfaceHandle,
        _snapshot: &LiveStatusSnapshot,
        _staleness: Duration,
        _relevance: f64,
    ) -> Result<(), SurfaceError> {
        Err(SurfaceError::Unsupported)
    }

    fn end(
        &mut self,
        _handle: SurfaceHandle,
        _final_snapshot: &LiveStatusSnapshot,
        _dismiss_after: Duration,
    ) -> Result<(), SurfaceError> {
        Err(SurfaceError::Unsupported)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Debug, PartialEq)]
    pub enum HostCall {
        Create(LiveStatusSnapshot),
        Update {
            snapshot: LiveStatusSnapshot,
            relevance: f64,
            staleness: Duration,
        },
        End {
            snapshot: LiveStatusSnapshot,
            dismiss_after: Duration,
        },
    }

    /// Records every host call; optionally refuses to create a surface.
    #[derive(Clone, Default)]
    pub struct RecordingSurface {
        pub calls: Arc<Mutex<Vec<HostCall>>>,
        pub deny: bool,
    }

    impl RecordingSurface {
        pub fn denying() -> Self {
            Self {
                deny: true,
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<HostCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl DisplaySurfaceHost for RecordingSurface {
        fn create(
            &mut self,
            initial: &LiveStatusSnapshot,
            _staleness: Duration,
        ) -> Result<SurfaceHandle, SurfaceError> {
            if self.deny {
                return Err(SurfaceError::PermissionDenied);
            }
            self.calls.lock().unwrap().push(HostCall::Create(initial.clone()));
            Ok(SurfaceHandle(7))
        }

        fn update(
            &mut self,
            _handle: SurfaceHandle,
            snapshot: &LiveStatusSnapshot,
            staleness: Duration,
            relevance: f64,
        ) -> Result<(), SurfaceError> {
            self.calls.lock().unwrap().push(HostCall::Update {
                snapshot: snapshot.clone(),
                relevance,
                staleness,
            });
            Ok(())
        }

        fn end(
            &mut self,
            _handle: SurfaceHandle,
            final_snapshot: &LiveStatusSnapshot,
            dismiss_after: Duration,
        ) -> Result<(), SurfaceError> {
            self.calls.lock().unwrap().push(HostCall::End {
                snapshot: final_snapshot.clone(),
                dismiss_after,
            });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{HostCall, RecordingSurface};
    use super::*;

    fn snapshot(elapsed: u64, running: bool) -> LiveStatusSnapshot {
        LiveStatusSnapshot {
            generation: 1,
            elapsed_seconds: elapsed,
            distance_meters: elapsed as f64 * 3.0,
            average_pace: None,
            current_pace: None,
            is_running: running,
            place_line: None,
            updated_at: 1_000.0 + elapsed as f64,
        }
    }

    #[test]
    fn test_lifecycle_and_relevance() {
        let host = RecordingSurface::default();
        let mut projector = LiveStatusProjector::new(Box::new(host.clone()), &TrackerConfig::default());
        assert_eq!(projector.state(), ProjectorState::NotStarted);

        projector.start(&snapshot(0, true));
        assert!(projector.is_active());
        projector.refresh(&snapshot(1, true));
        projector.refresh(&snapshot(1, false));
        projector.end(&snapshot(2, false));
        assert_eq!(projector.state(), ProjectorState::Ended);

        let calls = host.calls();
        assert_eq!(calls.len(), 5);
        assert!(matches!(calls[0], HostCall::Create(_)));
        match &calls[1] {
            HostCall::Update { relevance, staleness, .. } => {
                assert_eq!(*relevance, 1.0);
                assert_eq!(*staleness, Duration::from_secs(60));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(calls[2], HostCall::Update { relevance, .. } if relevance == 0.5));
        assert!(matches!(calls[3], HostCall::Update { relevance, .. } if relevance == MIN_RELEVANCE));
        assert!(matches!(
            &calls[4],
            HostCall::End { dismiss_after, .. } if *dismiss_after == Duration::from_secs(4)
        ));

        // Ended: further refreshes are no-ops
        projector.refresh(&snapshot(3, false));
        assert_eq!(host.calls().len(), 5);
    }

    #[test]
    fn test_identical_content_not_resubmitted() {
        let host = RecordingSurface::default();
        let mut projector = LiveStatusProjector::new(Box::new(host.clone()), &TrackerConfig::default());
        projector.start(&snapshot(0, true));

        let mut later = snapshot(0, true);
        later.updated_at += 0.4;
        projector.refresh(&later);
        assert_eq!(host.calls().len(), 1);
    }

    #[test]
    fn test_unchanged_content_kept_alive() {
        let host = RecordingSurface::default();
        let mut projector = LiveStatusProjector::new(Box::new(host.clone()), &TrackerConfig::default());
        projector.start(&snapshot(0, false));

        let mut later = snapshot(0, false);
        later.updated_at += 29.0;
        projector.refresh(&later);
        assert_eq!(host.calls().len(), 1);

        later.updated_at += 1.0;
        projector.refresh(&later);
        assert_eq!(host.calls().len(), 2);
    }

    #[test]
    fn test_denied_host_disables_silently() {
        let host = RecordingSurface::denying();
        let mut projector = LiveStatusProjector::new(Box::new(host.clone()), &TrackerConfig::default());
        projector.start(&snapshot(0, true));
        assert_eq!(projector.state(), ProjectorState::Disabled);

        projector.refresh(&snapshot(1, true));
        projector.end(&snapshot(2, false));
        assert!(host.calls().is_empty());
        assert_eq!(projector.submissions(), 0);
    }

    #[test]
    fn test_no_surface_host() {
        let mut projector = LiveStatusProjector::new(Box::new(NoSurface), &TrackerConfig::default());
        projector.start(&snapshot(0, true));
        assert_eq!(projector.state(), ProjectorState::Disabled);
    }

    #[test]
    fn test_json_surface_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live_status.json");
        assert_eq!(JsonFileSurface::load(&path).unwrap(), None);

        let mut projector = LiveStatusProjector::new(
            Box::new(JsonFileSurface::new(&path)),
            &TrackerConfig::default(),
        );
        projector.start(&snapshot(0, true));
        let created = JsonFileSurface::load(&path).unwrap().unwrap();
        assert_eq!(created.stale_after, 1_000.0 + 60.0);

        projector.refresh(&snapshot(30, true));

        let record = JsonFileSurface::load(&path).unwrap().unwrap();
        assert!(record.is_resumable());
        assert_eq!(record.snapshot.elapsed_seconds, 30);
        assert_eq!(record.stale_after, 1_030.0 + 60.0);

        projector.end(&snapshot(31, false));
        let record = JsonFileSurface::load(&path).unwrap().unwrap();
        assert_eq!(record.phase, SurfacePhase::Ended);
        assert_eq!(record.relevance, MIN_RELEVANCE);
        assert_eq!(record.dismiss_at, Some(1_031.0 + 4.0));
    }
}
