use anyhow::{anyhow, bail, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::geometry::Dimensions;
use crate::ingest::SourceConfig;
use crate::metrics::DEFAULT_WINDOW;
use crate::scheduler::{
    SchedulerConfig, DEFAULT_TARGET_FPS, DEFAULT_WORKING_SIZE, FALLBACK_DELAY, MAX_DELAY,
    MIN_DELAY,
};

const DEFAULT_SOURCE_URL: &str = "stub://camera";
const DEFAULT_SOURCE_FPS: u32 = 30;
const DEFAULT_SOURCE_WIDTH: u32 = 1280;
const DEFAULT_SOURCE_HEIGHT: u32 = 720;
const DEFAULT_BACKEND: &str = "motion";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct OverlaydConfigFile {
    source: Option<SourceConfigFile>,
    scheduler: Option<SchedulerConfigFile>,
    detector: Option<DetectorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SourceConfigFile {
    url: Option<String>,
    fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SchedulerConfigFile {
    target_fps: Option<u32>,
    /// "WxH", e.g. "320x240".
    working_size: Option<String>,
    min_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    fallback_delay_ms: Option<u64>,
    window: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    backend: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OverlaydConfig {
    pub source: SourceConfig,
    pub scheduler: SchedulerConfig,
    /// Name of a backend in the `BackendRegistry`.
    pub backend: String,
}

impl OverlaydConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("OVERLAY_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: OverlaydConfigFile) -> Result<Self> {
        let source = file.source.unwrap_or_default();
        let source = SourceConfig {
            url: source.url.unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            fps: source.fps.unwrap_or(DEFAULT_SOURCE_FPS),
            width: source.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
            height: source.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
        };

        let sched = file.scheduler.unwrap_or_default();
        let working_size = match sched.working_size.as_deref() {
            Some(value) => Dimensions::parse(value)?,
            None => DEFAULT_WORKING_SIZE,
        };
        let scheduler = SchedulerConfig {
            target_fps: sched.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
            working_size,
            min_delay: sched
                .min_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(MIN_DELAY),
            max_delay: sched
                .max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(MAX_DELAY),
            fallback_delay: sched
                .fallback_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(FALLBACK_DELAY),
            window: sched.window.unwrap_or(DEFAULT_WINDOW),
        };

        let backend = file
            .detector
            .and_then(|detector| detector.backend)
            .unwrap_or_else(|| DEFAULT_BACKEND.to_string());

        Ok(Self {
            source,
            scheduler,
            backend,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("OVERLAY_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(fps) = std::env::var("OVERLAY_TARGET_FPS") {
            self.scheduler.target_fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("OVERLAY_TARGET_FPS must be a positive integer"))?;
        }
        if let Ok(size) = std::env::var("OVERLAY_WORKING_SIZE") {
            if !size.trim().is_empty() {
                self.scheduler.working_size = Dimensions::parse(&size)
                    .map_err(|e| anyhow!("OVERLAY_WORKING_SIZE: {}", e))?;
            }
        }
        if let Ok(backend) = std::env::var("OVERLAY_BACKEND") {
            if !backend.trim().is_empty() {
                self.backend = backend.trim().to_lowercase();
            }
        }
        if let Ok(window) = std::env::var("OVERLAY_WINDOW") {
            self.scheduler.window = window
                .trim()
                .parse()
                .map_err(|_| anyhow!("OVERLAY_WINDOW must be an integer sample count"))?;
        }
        Ok(())
    }

    /// Re-run after applying command-line overrides.
    pub fn validate(&self) -> Result<()> {
        if self.source.url.trim().is_empty() {
            bail!("source url must not be empty");
        }
        if self.source.width == 0 || self.source.height == 0 {
            bail!(
                "source dimensions must be non-zero (got {}x{})",
                self.source.width,
                self.source.height
            );
        }
        if self.scheduler.target_fps == 0 {
            bail!("target_fps must be greater than zero");
        }
        self.scheduler.working_size.ensure_non_zero()?;
        if self.scheduler.window == 0 {
            bail!("latency window must hold at least one sample");
        }
        let s = &self.scheduler;
        if s.min_delay.is_zero() {
            bail!("min_delay must be greater than zero");
        }
        if s.min_delay > s.max_delay {
            bail!(
                "min_delay ({}ms) exceeds max_delay ({}ms)",
                s.min_delay.as_millis(),
                s.max_delay.as_millis()
            );
        }
        if s.fallback_delay < s.min_delay || s.fallback_delay > s.max_delay {
            bail!(
                "fallback_delay ({}ms) must lie within [{}ms, {}ms]",
                s.fallback_delay.as_millis(),
                s.min_delay.as_millis(),
                s.max_delay.as_millis()
            );
        }
        if self.backend.trim().is_empty() {
            bail!("detector backend must not be empty");
        }
        Ok(())
    }
}

impl Default for OverlaydConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            scheduler: SchedulerConfig::default(),
            backend: DEFAULT_BACKEND.to_string(),
        }
    }
}

fn read_config_file(path: &Path) -> Result<OverlaydConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
