use anyhow::Result;

use crate::detect::result::RawDetection;

/// Detector backend trait.
///
/// # Call discipline
///
/// The scheduler calls `detect` strictly one call at a time and measures each
/// call's wall-clock cost to pace the next one. Implementations may take as
/// long as they need and may fail; a failure costs the scheduler one cycle.
///
/// The pixel slice is RGB8, row-major, `width * height * 3` bytes, and is only
/// valid for the duration of the call. Boxes in the result are in the same
/// pixel space as the slice.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a working frame.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook, run once before the first cycle.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
