//! Session lifecycle.
//!
//! `Idle → AwaitingStream → Active → Closed`, with `Active → AwaitingStream` when
//! media is lost and any state `→ Closed`. `transition` is a pure function; the
//! runtime carries out the returned actions.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    AwaitingStream,
    Active,
    Closed,
}

impl SessionState {
    pub fn is_closed(&self) -> bool {
        matches!(self, SessionState::Closed)
    }

    /// Human-readable connection status.
    pub fn status_line(&self) -> &'static str {
        match self {
            SessionState::Idle => "Waiting for connection...",
            SessionState::AwaitingStream => "Waiting for stream...",
            SessionState::Active => "Connected",
            SessionState::Closed => "Disconnected",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingStream => "awaiting_stream",
            SessionState::Active => "active",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Lifecycle triggers from the connection collaborator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// Peer connection established; no media yet.
    Connected,
    StreamAcquired,
    StreamLost,
    ConnectionClosed,
    ConnectionError(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionAction {
    StartScheduler,
    /// Also cancels any pending tick.
    StopScheduler,
    ReleaseResources,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
    pub actions: Vec<SessionAction>,
}

impl Transition {
    fn stay(state: SessionState) -> Self {
        Self {
            from: state,
            to: state,
            actions: Vec::new(),
        }
    }

    fn to(from: SessionState, to: SessionState, actions: Vec<SessionAction>) -> Self {
        Self { from, to, actions }
    }

    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

pub fn transition(state: SessionState, event: &SessionEvent) -> Transition {
    use SessionAction::*;
    use SessionState::*;

    match (state, event) {
        (Closed, _) => Transition::stay(Closed),

        (Active, SessionEvent::ConnectionClosed | SessionEvent::ConnectionError(_)) => {
            Transition::to(Active, Closed, vec![StopScheduler, ReleaseResources])
        }
        (from, SessionEvent::ConnectionClosed | SessionEvent::ConnectionError(_)) => {
            Transition::to(from, Closed, vec![ReleaseResources])
        }

        (Idle, SessionEvent::Connected) => Transition::to(Idle, AwaitingStream, Vec::new()),
        (AwaitingStream, SessionEvent::StreamAcquired) => {
            Transition::to(AwaitingStream, Active, vec![StartScheduler])
        }
        (Active, SessionEvent::StreamLost) => {
            Transition::to(Active, AwaitingStream, vec![StopScheduler])
        }

        (state, _) => Transition::stay(state),
    }
}

/// Current state plus the transition function.
#[derive(Debug)]
pub struct SessionMachine {
    state: SessionState,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn apply(&mut self, event: &SessionEvent) -> Transition {
        let t = transition(self.state, event);
        self.state = t.to;
        t
    }
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}
