//! Session runtime.
//!
//! Lifecycle events arrive on a single-consumer queue and are applied in arrival
//! order. The scheduler's self-rescheduling loop is one explicit `PendingTick`;
//! every exit from `Active` cancels it before anything else happens.
//!
//! The detector call is the only long wait. Events that arrive during it stay
//! queued until the call returns; the scheduler then asks the runtime's gate,
//! which drains the queue first, whether the result may still be used.

use rand::RngCore;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::error::{OverlayError, OverlayResult};
use crate::scheduler::{AdaptiveScheduler, CycleGate, CycleOutcome, SchedulerStats};
use crate::session::{SessionAction, SessionEvent, SessionMachine, SessionState};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Random session identifier, e.g. `session-1f0c9a...`.
pub fn new_session_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("session-{}", hex::encode(bytes))
}

/// Sending side of a session's event queue. Cheap to clone.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    id: Arc<str>,
    tx: Sender<SessionEvent>,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn send(&self, event: SessionEvent) -> OverlayResult<()> {
        self.tx.send(event).map_err(|_| OverlayError::SessionClosed)
    }

    pub fn connected(&self) -> OverlayResult<()> {
        self.send(SessionEvent::Connected)
    }

    pub fn stream_acquired(&self) -> OverlayResult<()> {
        self.send(SessionEvent::StreamAcquired)
    }

    pub fn stream_lost(&self) -> OverlayResult<()> {
        self.send(SessionEvent::StreamLost)
    }

    pub fn close(&self) -> OverlayResult<()> {
        self.send(SessionEvent::ConnectionClosed)
    }

    pub fn error(&self, message: impl Into<String>) -> OverlayResult<()> {
        self.send(SessionEvent::ConnectionError(message.into()))
    }
}

/// The single pending scheduler tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PendingTick {
    due: Option<Instant>,
}

impl PendingTick {
    pub fn schedule(&mut self, at: Instant) {
        self.due = Some(at);
    }

    pub fn cancel(&mut self) {
        self.due = None;
    }

    pub fn due(&self) -> Option<Instant> {
        self.due
    }

    /// Time until the tick is due; zero when overdue, `None` when nothing is pending.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.due.map(|due| due.saturating_duration_since(now))
    }
}

/// Final report returned by `Session::run`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: String,
    pub state: SessionState,
    pub frames_processed: u64,
    pub stats: SchedulerStats,
}

/// Event-side half of a session: state machine, queue, and timer.
struct Lifecycle {
    id: Arc<str>,
    machine: SessionMachine,
    rx: Receiver<SessionEvent>,
    timer: PendingTick,
    clock: Arc<dyn Clock>,
    /// Scheduler actions applied while a cycle held the scheduler.
    deferred: Vec<SessionAction>,
    /// Set when a transition left `Active` during the current cycle.
    left_active: bool,
    disconnected: bool,
}

impl Lifecycle {
    fn apply(&mut self, event: &SessionEvent) -> Vec<SessionAction> {
        let t = self.machine.apply(event);
        if t.changed() {
            log::info!("[{}] {} -> {} ({:?})", self.id, t.from, t.to, event);
        } else {
            log::debug!("[{}] {:?} ignored in state {}", self.id, event, t.from);
        }
        if let SessionEvent::ConnectionError(message) = event {
            log::warn!("[{}] connection error: {}", self.id, message);
        }
        if t.from == SessionState::Active && t.to != SessionState::Active {
            self.left_active = true;
        }
        for action in &t.actions {
            match action {
                SessionAction::StartScheduler => self.timer.schedule(self.clock.now()),
                SessionAction::StopScheduler | SessionAction::ReleaseResources => {
                    self.timer.cancel()
                }
            }
        }
        t.actions
    }

    /// Apply every queued event. A dropped queue counts as a close.
    fn drain(&mut self) -> Vec<SessionAction> {
        let mut actions = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => actions.extend(self.apply(&event)),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    actions.extend(self.on_disconnect());
                    break;
                }
            }
        }
        actions
    }

    fn on_disconnect(&mut self) -> Vec<SessionAction> {
        if self.disconnected {
            return Vec::new();
        }
        self.disconnected = true;
        log::info!("[{}] all session handles dropped", self.id);
        self.apply(&SessionEvent::ConnectionClosed)
    }
}

impl CycleGate for Lifecycle {
    fn still_active(&mut self) -> bool {
        let actions = self.drain();
        self.deferred.extend(actions);
        self.machine.state() == SessionState::Active && !self.left_active
    }
}

/// A session: lifecycle events driving one adaptive scheduler.
pub struct Session {
    lifecycle: Lifecycle,
    scheduler: AdaptiveScheduler,
}

impl Session {
    pub fn new(scheduler: AdaptiveScheduler, clock: Arc<dyn Clock>) -> (Self, SessionHandle) {
        Self::with_id(new_session_id(), scheduler, clock)
    }

    pub fn with_id(
        id: impl Into<String>,
        scheduler: AdaptiveScheduler,
        clock: Arc<dyn Clock>,
    ) -> (Self, SessionHandle) {
        let id: Arc<str> = Arc::from(id.into());
        let (tx, rx) = mpsc::channel();
        let session = Self {
            lifecycle: Lifecycle {
                id: id.clone(),
                machine: SessionMachine::new(),
                rx,
                timer: PendingTick::default(),
                clock,
                deferred: Vec::new(),
                left_active: false,
                disconnected: false,
            },
            scheduler,
        };
        (session, SessionHandle { id, tx })
    }

    pub fn id(&self) -> &str {
        &self.lifecycle.id
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.machine.state()
    }

    pub fn scheduler(&self) -> &AdaptiveScheduler {
        &self.scheduler
    }

    pub fn pending_tick(&self) -> Option<Instant> {
        self.lifecycle.timer.due()
    }

    /// Apply one event immediately, bypassing the queue.
    pub fn handle_event(&mut self, event: SessionEvent) {
        let actions = self.lifecycle.apply(&event);
        self.perform(&actions);
    }

    /// Apply every event currently queued, in arrival order.
    pub fn process_pending_events(&mut self) {
        let actions = self.lifecycle.drain();
        self.perform(&actions);
    }

    /// Run the pending tick now. Returns `None` when no tick is pending, which is
    /// always the case outside `Active`.
    pub fn fire_tick(&mut self) -> Option<CycleOutcome> {
        if self.state() != SessionState::Active {
            return None;
        }
        self.lifecycle.timer.due()?;
        self.lifecycle.timer.cancel();
        self.lifecycle.left_active = false;

        let outcome = self.scheduler.run_cycle(&mut self.lifecycle);

        if self.state() == SessionState::Active && !self.lifecycle.left_active {
            if let Some(retry_in) = outcome.retry_in() {
                let due = self.lifecycle.clock.now() + retry_in;
                self.lifecycle.timer.schedule(due);
            }
        }
        let deferred = std::mem::take(&mut self.lifecycle.deferred);
        self.perform(&deferred);

        log::trace!("[{}] tick: {:?}", self.lifecycle.id, outcome);
        Some(outcome)
    }

    /// Block processing events and ticks until the session closes.
    pub fn run(mut self) -> SessionSummary {
        log::info!("[{}] session running ({})", self.id(), self.state().status_line());
        let mut last_health_log = self.lifecycle.clock.now();

        while !self.state().is_closed() {
            let now = self.lifecycle.clock.now();
            let received = match self.lifecycle.timer.remaining(now) {
                Some(remaining) if remaining.is_zero() => {
                    self.fire_tick();
                    continue;
                }
                Some(remaining) => self.lifecycle.rx.recv_timeout(remaining),
                None => self
                    .lifecycle
                    .rx
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(event) => self.handle_event(event),
                Err(RecvTimeoutError::Timeout) => {
                    self.fire_tick();
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let actions = self.lifecycle.on_disconnect();
                    self.perform(&actions);
                }
            }

            let now = self.lifecycle.clock.now();
            if now.saturating_duration_since(last_health_log) >= HEALTH_LOG_INTERVAL {
                let stats = self.scheduler.stats();
                log::info!(
                    "[{}] health state={} frames={} delay={}ms completed={} failed={} deferred={}",
                    self.id(),
                    self.state(),
                    self.scheduler.metrics().frames_processed(),
                    self.scheduler.adaptive_delay().as_millis(),
                    stats.completed,
                    stats.failed,
                    stats.deferred
                );
                last_health_log = now;
            }
        }

        let summary = self.summary();
        log::info!(
            "[{}] session closed after {} frames",
            summary.id,
            summary.frames_processed
        );
        summary
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id().to_string(),
            state: self.state(),
            frames_processed: self.scheduler.metrics().frames_processed(),
            stats: self.scheduler.stats(),
        }
    }

    fn perform(&mut self, actions: &[SessionAction]) {
        for action in actions {
            match action {
                SessionAction::StartScheduler => self.scheduler.start(),
                SessionAction::StopScheduler => self.scheduler.stop(),
                SessionAction::ReleaseResources => self.scheduler.release(),
            }
        }
    }
}
