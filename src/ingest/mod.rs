//! Frame ingestion sources.
//!
//! The overlay core only needs three things from a video source: whether it is
//! currently producing frames, the latest frame, and its natural dimensions
//! (which are also the display surface dimensions).
//!
//! Real camera and peer streams implement `VideoSource` outside this crate.
//! The built-in source is the synthetic `stub://` camera.

use anyhow::Result;

use crate::geometry::Dimensions;

pub mod synthetic;

pub use synthetic::{SourceConfig, SyntheticSource};

/// Live video source feeding the scheduler.
pub trait VideoSource: Send {
    /// True when the source is playing and has a decodable frame.
    fn is_ready(&self) -> bool;

    /// Latest frame as RGB8 at `natural_dimensions()`.
    ///
    /// The slice is only valid until the next call.
    fn current_frame(&mut self) -> Result<&[u8]>;

    /// Full resolution of the stream.
    fn natural_dimensions(&self) -> Dimensions;
}
