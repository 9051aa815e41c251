use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::controller::{RestoredRun, RunSessionController};
use crate::error::{GeocodeError, TrackerError, TrackerResult};
use crate::geocode::{Place, PlaceLookup, ReverseGeocoder};
use crate::snapshot::RunSnapshot;
use crate::summary::RunSummary;
use crate::types::{current_timestamp, SensorEvent};

/// Log a status line every this many ticks while running.
const STATUS_EVERY_TICKS: u64 = 10;

enum Command {
    Start(oneshot::Sender<RunSnapshot>),
    Pause(oneshot::Sender<RunSnapshot>),
    Resume(oneshot::Sender<RunSnapshot>),
    Restore(RestoredRun, oneshot::Sender<RunSnapshot>),
    Stop(oneshot::Sender<Option<RunSummary>>),
    Shutdown,
}

type LookupResult = (PlaceLookup, Result<Place, GeocodeError>);

/// Owns a [`RunSessionController`] on a single tokio task.
///
/// UI commands, sensor events, the clock tick and geocode completions are
/// all funnelled into one loop, so the session model has exactly one writer.
pub struct RunTrackerService {
    controller: RunSessionController,
    commands: mpsc::Receiver<Command>,
    events: mpsc::Receiver<SensorEvent>,
    geocoder: Option<Arc<dyn ReverseGeocoder>>,
    snapshots: watch::Sender<RunSnapshot>,
    summaries: mpsc::Sender<RunSummary>,
}

/// Cloneable front end to a running [`RunTrackerService`].
#[derive(Clone)]
pub struct RunTrackerHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<RunSnapshot>,
}

impl RunTrackerService {
    /// Returns the service, its handle and the stream of finished runs.
    pub fn new(
        controller: RunSessionController,
        events: mpsc::Receiver<SensorEvent>,
        geocoder: Option<Arc<dyn ReverseGeocoder>>,
    ) -> (Self, RunTrackerHandle, mpsc::Receiver<RunSummary>) {
        let controller = if geocoder.is_some() {
            controller.with_place_lookups()
        } else {
            controller
        };
        let (command_tx, command_rx) = mpsc::channel(32);
        let (snapshot_tx, snapshot_rx) = watch::channel(RunSnapshot::default());
        let (summary_tx, summary_rx) = mpsc::channel(4);

        let service = RunTrackerService {
            controller,
            commands: command_rx,
            events,
            geocoder,
            snapshots: snapshot_tx,
            summaries: summary_tx,
        };
        let handle = RunTrackerHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
        };
        (service, handle, summary_rx)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let RunTrackerService {
            mut controller,
            mut commands,
            mut events,
            geocoder,
            snapshots,
            summaries,
        } = self;

        let mut tick = interval(Duration::from_millis(controller.config().tick_interval_ms));
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let (lookup_tx, mut lookup_rx) = mpsc::channel::<LookupResult>(8);
        let mut tick_count = 0u64;

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let now = current_timestamp();
                    match command {
                        Some(Command::Start(reply)) => {
                            let snapshot = controller.start(now);
                            snapshots.send_replace(snapshot.clone());
                            let _ = reply.send(snapshot);
                        }
                        Some(Command::Pause(reply)) => {
                            let snapshot = controller.pause(now);
                            snapshots.send_replace(snapshot.clone());
                            let _ = reply.send(snapshot);
                        }
                        Some(Command::Resume(reply)) => {
                            let snapshot = controller.resume(now);
                            snapshots.send_replace(snapshot.clone());
                            let _ = reply.send(snapshot);
                        }
                        Some(Command::Restore(restored, reply)) => {
                            let snapshot = controller.restore(now, restored);
                            snapshots.send_replace(snapshot.clone());
                            let _ = reply.send(snapshot);
                        }
                        Some(Command::Stop(reply)) => {
                            let summary = finish(&mut controller, now, &snapshots, &summaries);
                            let _ = reply.send(summary);
                        }
                        Some(Command::Shutdown) | None => {
                            finish(&mut controller, now, &snapshots, &summaries);
                            log::info!("Run tracker shutting down");
                            break;
                        }
                    }
                }
                Some(event) = events.recv() => {
                    let snapshot = controller.on_event(event, current_timestamp());
                    snapshots.send_replace(snapshot);
                }
                _ = tick.tick() => {
                    let now = current_timestamp();
                    let snapshot = controller.tick(now);
                    if snapshot.is_running() {
                        tick_count += 1;
                        if tick_count % STATUS_EVERY_TICKS == 0 {
                            log::info!("{}", snapshot.status_line());
                            log::info!("{}", controller.health_status(now));
                        }
                    }
                    snapshots.send_replace(snapshot);
                }
                Some((lookup, result)) = lookup_rx.recv() => {
                    if let Some(snapshot) = controller.apply_place_lookup(&lookup, result, current_timestamp()) {
                        snapshots.send_replace(snapshot);
                    }
                }
            }

            for lookup in controller.take_place_lookups() {
                if let Some(geocoder) = &geocoder {
                    let lookup_future = geocoder.reverse(lookup.coordinate);
                    let tx = lookup_tx.clone();
                    tokio::spawn(async move {
                        let result = lookup_future.await;
                        let _ = tx.send((lookup, result)).await;
                    });
                }
            }
        }
    }
}

fn finish(
    controller: &mut RunSessionController,
    now: f64,
    snapshots: &watch::Sender<RunSnapshot>,
    summaries: &mpsc::Sender<RunSummary>,
) -> Option<RunSummary> {
    let summary = controller.stop(now)?;
    snapshots.send_replace(summary.snapshot.clone());
    if let Err(e) = summaries.try_send(summary.clone()) {
        log::warn!("Run summary not delivered: {}", e);
    }
    Some(summary)
}

impl RunTrackerHandle {
    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> TrackerResult<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| TrackerError::Internal("run tracker is not running".to_string()))?;
        rx.await
            .map_err(|_| TrackerError::Internal("run tracker dropped the request".to_string()))
    }

    pub async fn start(&self) -> TrackerResult<RunSnapshot> {
        self.request(Command::Start).await
    }

    pub async fn pause(&self) -> TrackerResult<RunSnapshot> {
        self.request(Command::Pause).await
    }

    pub async fn resume(&self) -> TrackerResult<RunSnapshot> {
        self.request(Command::Resume).await
    }

    pub async fn restore(&self, restored: RestoredRun) -> TrackerResult<RunSnapshot> {
        self.request(|reply| Command::Restore(restored, reply)).await
    }

    pub async fn stop(&self) -> TrackerResult<Option<RunSummary>> {
        self.request(Command::Stop).await
    }

    /// Finish any open run and end the service loop.
    pub async fn shutdown(&self) -> TrackerResult<()> {
        self.commands
            .send(Command::Shutdown)
            .await
            .map_err(|_| TrackerError::Internal("run tracker is not running".to_string()))
    }

    pub fn subscribe(&self) -> watch::Receiver<RunSnapshot> {
        self.snapshots.clone()
    }

    pub fn latest(&self) -> RunSnapshot {
        self.snapshots.borrow().clone()
    }
}
