//! Synthetic camera source.
//!
//! `SyntheticSource` stands in for a remote camera stream (`stub://` URLs). It
//! renders a dim gradient with light sensor noise and a bright square sweeping
//! across the frame, so motion detection has something to find.

use anyhow::{bail, Result};
use rand::Rng;

use crate::frame::BYTES_PER_PIXEL;
use crate::geometry::Dimensions;
use crate::ingest::VideoSource;

/// Configuration for a video source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceConfig {
    /// Stream URL (e.g., "stub://camera").
    pub url: String,
    /// Nominal stream frame rate (informational for synthetic sources).
    pub fps: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            fps: 30,
            width: 1280,
            height: 720,
        }
    }
}

/// Square drawn over the background, in source pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Square {
    left: usize,
    top: usize,
    side: usize,
}

pub struct SyntheticSource {
    config: SourceConfig,
    /// Gradient plus sensor noise, rendered once.
    background: Vec<u8>,
    pixels: Vec<u8>,
    square: Option<Square>,
    frame_count: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        if !config.url.starts_with("stub://") {
            bail!(
                "source '{}' is not built in; only stub:// sources are available",
                config.url
            );
        }
        if config.width == 0 || config.height == 0 {
            bail!("source dimensions must be non-zero");
        }
        Ok(Self {
            config,
            background: Vec::new(),
            pixels: Vec::new(),
            square: None,
            frame_count: 0,
            connected: false,
        })
    }

    /// Synthetic sources are always reachable.
    pub fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!(
            "SyntheticSource: connected to {} ({}x{} @ {} fps)",
            self.config.url,
            self.config.width,
            self.config.height,
            self.config.fps
        );
        Ok(())
    }

    fn width(&self) -> usize {
        self.config.width as usize
    }

    fn render_background(&mut self) {
        let (w, h) = (self.width(), self.config.height as usize);
        let mut rng = rand::thread_rng();
        self.background = Vec::with_capacity(w * h * BYTES_PER_PIXEL);
        for y in 0..h {
            for x in 0..w {
                let base = ((x + y) * 64 / (w + h)) as i16 + 32;
                let value = (base + rng.gen_range(-3i16..=3)) as u8;
                self.background.extend_from_slice(&[value; BYTES_PER_PIXEL]);
            }
        }
        self.pixels = self.background.clone();
    }

    /// Square position for the current frame.
    fn next_square(&self) -> Square {
        let (w, h) = (self.width(), self.config.height as usize);
        let side = (w.min(h) / 6).max(1);
        let travel = w.saturating_sub(side).max(1);
        Square {
            left: (self.frame_count as usize * 8) % travel,
            top: h.saturating_sub(side) / 2,
            side,
        }
    }

    fn paint(&mut self, square: Square, from_background: bool) {
        let w = self.width();
        let right = (square.left + square.side).min(w);
        let bottom = (square.top + square.side).min(self.config.height as usize);
        for y in square.top..bottom {
            let start = (y * w + square.left) * BYTES_PER_PIXEL;
            let end = (y * w + right) * BYTES_PER_PIXEL;
            if from_background {
                self.pixels[start..end].copy_from_slice(&self.background[start..end]);
            } else {
                self.pixels[start..end].fill(240);
            }
        }
    }

    /// Restore the previous square from the background and draw the next one.
    fn render(&mut self) {
        if self.background.is_empty() {
            self.render_background();
        }
        if let Some(previous) = self.square.take() {
            self.paint(previous, true);
        }
        let square = self.next_square();
        self.paint(square, false);
        self.square = Some(square);
    }
}

impl VideoSource for SyntheticSource {
    fn is_ready(&self) -> bool {
        self.connected
    }

    fn current_frame(&mut self) -> Result<&[u8]> {
        if !self.is_ready() {
            bail!("source {} is not playing", self.config.url);
        }
        self.render();
        self.frame_count += 1;
        Ok(&self.pixels)
    }

    fn natural_dimensions(&self) -> Dimensions {
        Dimensions::new(self.config.width, self.config.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config() -> SourceConfig {
        SourceConfig {
            url: "stub://test".to_string(),
            fps: 10,
            width: 64,
            height: 48,
        }
    }

    #[test]
    fn synthetic_source_produces_frames() -> Result<()> {
        let mut source = SyntheticSource::new(stub_config())?;
        assert!(!source.is_ready());
        assert!(source.current_frame().is_err());
        source.connect()?;
        assert!(source.is_ready());

        let frame = source.current_frame()?;
        assert_eq!(frame.len(), 64 * 48 * BYTES_PER_PIXEL);
        assert_eq!(source.natural_dimensions(), Dimensions::new(64, 48));
        Ok(())
    }

    #[test]
    fn only_the_square_moves_between_frames() -> Result<()> {
        let mut source = SyntheticSource::new(stub_config())?;
        source.connect()?;
        let first = source.current_frame()?.to_vec();
        let second = source.current_frame()?.to_vec();

        // 64x48 source: 8px square centred vertically, advancing 8px per frame.
        let lit = |frame: &[u8], x: usize, y: usize| frame[(y * 64 + x) * BYTES_PER_PIXEL] == 240;
        assert!(lit(&first, 0, 20) && !lit(&first, 8, 20));
        assert!(!lit(&second, 0, 20) && lit(&second, 8, 20));

        let changed = first
            .chunks_exact(BYTES_PER_PIXEL)
            .zip(second.chunks_exact(BYTES_PER_PIXEL))
            .filter(|(a, b)| a != b)
            .count();
        assert_eq!(changed, 2 * 8 * 8);
        Ok(())
    }

    #[test]
    fn non_stub_urls_are_rejected() {
        let config = SourceConfig {
            url: "rtsp://camera".to_string(),
            ..stub_config()
        };
        assert!(SyntheticSource::new(config).is_err());
    }
}
