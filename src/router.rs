//! Serialized dispatch of proximity events and manual commands.
//!
//! All transitions reach the [`SessionTracker`] through one bounded channel
//! and are applied one at a time by [`ProximityRouter::run`]. Handles are
//! cheap to clone and can be used from any thread or async task.

use crate::core::lifecycle::{SessionTracker, SyncReport, TrackerError, Transition};
use crate::core::region::TrackableRegion;
use crate::core::session::Session;
use crate::source::types::{ProximityEvent, ProximityKind};
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;

/// Default queue capacity between event sources and the tracker.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1_024;

type Reply<T> = Option<oneshot::Sender<T>>;

/// Work item for the tracker's event loop.
#[derive(Debug)]
pub enum TrackerCommand {
    Proximity(ProximityEvent),
    StartManual {
        region_id: String,
        at: DateTime<Utc>,
        reply: Reply<Result<Session, TrackerError>>,
    },
    EndManual {
        at: DateTime<Utc>,
        reply: Reply<Result<Transition, TrackerError>>,
    },
    ReloadRegions(Vec<TrackableRegion>),
    SyncPending {
        reply: Reply<Result<SyncReport, TrackerError>>,
    },
    ActiveSession {
        reply: oneshot::Sender<Option<Session>>,
    },
}

/// Errors sending to the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    QueueFull,
    Disconnected,
    NoReply,
}

impl std::fmt::Display for RouterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouterError::QueueFull => write!(f, "Event queue is full"),
            RouterError::Disconnected => write!(f, "Event loop is not running"),
            RouterError::NoReply => write!(f, "Event loop dropped the request"),
        }
    }
}

impl std::error::Error for RouterError {}

/// Sending side of the tracker's queue.
#[derive(Debug, Clone)]
pub struct RouterHandle {
    sender: Sender<TrackerCommand>,
}

impl RouterHandle {
    fn enqueue(&self, command: TrackerCommand) -> Result<(), RouterError> {
        self.sender.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => RouterError::QueueFull,
            TrySendError::Disconnected(_) => RouterError::Disconnected,
        })
    }

    /// Queue a proximity event.
    pub fn send_event(&self, event: ProximityEvent) -> Result<(), RouterError> {
        self.enqueue(TrackerCommand::Proximity(event))
    }

    /// Queue a manual check-in. The receiver resolves once it is applied.
    pub fn start_manual(
        &self,
        region_id: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<oneshot::Receiver<Result<Session, TrackerError>>, RouterError> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(TrackerCommand::StartManual {
            region_id: region_id.into(),
            at,
            reply: Some(tx),
        })?;
        Ok(rx)
    }

    /// Queue a manual check-out. The receiver resolves once it is applied.
    pub fn end_manual(
        &self,
        at: DateTime<Utc>,
    ) -> Result<oneshot::Receiver<Result<Transition, TrackerError>>, RouterError> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(TrackerCommand::EndManual { at, reply: Some(tx) })?;
        Ok(rx)
    }

    pub fn reload_regions(&self, regions: Vec<TrackableRegion>) -> Result<(), RouterError> {
        self.enqueue(TrackerCommand::ReloadRegions(regions))
    }

    pub fn sync_pending(
        &self,
    ) -> Result<oneshot::Receiver<Result<SyncReport, TrackerError>>, RouterError> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(TrackerCommand::SyncPending { reply: Some(tx) })?;
        Ok(rx)
    }

    pub fn active_session(&self) -> Result<oneshot::Receiver<Option<Session>>, RouterError> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(TrackerCommand::ActiveSession { reply: tx })?;
        Ok(rx)
    }
}

type Observer = Box<dyn FnMut(&Transition) + Send>;

/// Single consumer of the tracker queue.
pub struct ProximityRouter {
    tracker: SessionTracker,
    receiver: Receiver<TrackerCommand>,
    observer: Option<Observer>,
}

impl ProximityRouter {
    /// Create a router and the handle that feeds it.
    pub fn new(tracker: SessionTracker, capacity: usize) -> (Self, RouterHandle) {
        let (sender, receiver) = bounded(capacity);
        let router = Self {
            tracker,
            receiver,
            observer: None,
        };
        (router, RouterHandle { sender })
    }

    /// Call `observer` after every proximity transition and manual check-out.
    pub fn with_observer(mut self, observer: impl FnMut(&Transition) + Send + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    pub fn into_tracker(self) -> SessionTracker {
        self.tracker
    }

    /// Dispatch one proximity event to the tracker.
    pub fn on_event(
        &mut self,
        kind: ProximityKind,
        region_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Transition {
        let transition = match kind {
            ProximityKind::Enter => self.tracker.handle_enter(region_id, timestamp),
            ProximityKind::Exit => self.tracker.handle_exit(region_id, timestamp),
        };
        self.notify(&transition);
        transition
    }

    /// Apply one queued command.
    pub fn dispatch(&mut self, command: TrackerCommand) {
        match command {
            TrackerCommand::Proximity(event) => {
                self.on_event(event.kind, &event.region_id, event.timestamp);
            }
            TrackerCommand::StartManual {
                region_id,
                at,
                reply,
            } => {
                let result = self.tracker.start_manual_session(&region_id, at);
                if let Err(ref e) = result {
                    tracing::warn!("Manual check-in rejected: {e}");
                }
                respond(reply, result);
            }
            TrackerCommand::EndManual { at, reply } => {
                let result = self.tracker.end_manual_session(at);
                match result {
                    Ok(ref transition) => self.notify(transition),
                    Err(ref e) => tracing::warn!("Manual check-out rejected: {e}"),
                }
                respond(reply, result);
            }
            TrackerCommand::ReloadRegions(regions) => {
                tracing::info!(count = regions.len(), "Reloaded regions");
                self.tracker.set_regions(regions);
            }
            TrackerCommand::SyncPending { reply } => {
                let result = self.tracker.sync_pending();
                respond(reply, result);
            }
            TrackerCommand::ActiveSession { reply } => {
                let _ = reply.send(self.tracker.active_session().cloned());
            }
        }
    }

    /// Apply commands until `running` is cleared or every handle is dropped.
    pub fn run(&mut self, running: &AtomicBool) {
        while running.load(Ordering::SeqCst) {
            match self.receiver.recv_timeout(Duration::from_millis(100)) {
                Ok(command) => self.dispatch(command),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::debug!("All event sources disconnected");
                    break;
                }
            }
        }
    }

    /// Apply everything already queued without waiting.
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(command) = self.receiver.try_recv() {
            self.dispatch(command);
            applied += 1;
        }
        applied
    }

    fn notify(&mut self, transition: &Transition) {
        if let Some(ref mut observer) = self.observer {
            observer(transition);
        }
    }
}

fn respond<T>(reply: Reply<T>, value: T) {
    if let Some(tx) = reply {
        // The requester may have given up waiting
        let _ = tx.send(value);
    }
}
