use std::time::Duration;

use thiserror::Error;

/// Errors raised by the overlay core.
///
/// Only `InvalidDimension` is a caller contract violation. Everything else is
/// absorbed inside a scheduler cycle and surfaced through logs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OverlayError {
    #[error("invalid dimension {width}x{height}: both sides must be non-zero")]
    InvalidDimension { width: u32, height: u32 },

    #[error("completion timestamp precedes capture timestamp by {behind:?}")]
    OutOfOrderTimestamp { behind: Duration },

    #[error("detection failed: {0}")]
    DetectionFailure(String),

    #[error("video source not ready")]
    SourceNotReady,

    #[error("session closed")]
    SessionClosed,
}

pub type OverlayResult<T> = std::result::Result<T, OverlayError>;
