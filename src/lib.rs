//! Live Overlay Kernel
//!
//! Glues a live video source to a slow, variable-latency object detector and
//! draws the results over the stream in near real time.
//!
//! # Architecture
//!
//! - **Adaptive frame scheduler**: at most one detection in flight; the delay
//!   between cycles tracks the measured processing time, clamped to
//!   `[MIN_DELAY, MAX_DELAY]`.
//! - **Coordinate re-projection**: boxes found on the downscaled working frame
//!   are mapped onto the full-resolution display surface.
//! - **Metrics**: throughput, last latency, and windowed P95 tail latency.
//! - **Session state machine**: connection lifecycle events start and stop the
//!   scheduler; leaving `Active` cancels the pending tick and drops any result
//!   still in flight.
//!
//! # Module Structure
//!
//! - `scheduler`, `session`, `runtime`: the control loop and its lifecycle
//! - `frame`, `geometry`, `metrics`: per-cycle data and arithmetic
//! - `detect`, `ingest`, `sink`: collaborator seams and built-in implementations
//! - `config`: daemon configuration (file + environment)

pub mod clock;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod metrics;
pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod sink;

pub use clock::{Clock, ManualClock, SystemClock};
pub use detect::{BackendRegistry, DetectorBackend, MotionBackend, RawDetection, StubBackend};
pub use error::{OverlayError, OverlayResult};
pub use frame::{FrameJob, WorkingFrame};
pub use geometry::{
    reproject, reproject_all, reproject_detection, BoundingBox, Dimensions, NormalizedBox,
    ReprojectedDetection,
};
pub use ingest::{SourceConfig, SyntheticSource, VideoSource};
pub use metrics::{LatencyWindow, MetricsAggregator, Snapshot};
pub use runtime::{new_session_id, PendingTick, Session, SessionHandle, SessionSummary};
pub use scheduler::{
    AdaptiveScheduler, AlwaysActive, CycleGate, CycleOutcome, SchedulerConfig, SchedulerStats,
    FALLBACK_DELAY, MAX_DELAY, MIN_DELAY,
};
pub use session::{
    transition, SessionAction, SessionEvent, SessionMachine, SessionState, Transition,
};
pub use sink::{LogRenderer, LogTelemetry, RecordingSink, Renderer, TelemetrySink};
