use std::collections::BTreeMap;

use anyhow::{anyhow, Result};

use super::backend::DetectorBackend;
use super::backends::{MotionBackend, StubBackend};

type BackendFactory = Box<dyn Fn() -> Box<dyn DetectorBackend> + Send + Sync>;

/// Name-indexed factories for detector backends.
///
/// The registry hands out freshly constructed, exclusively owned backends. Each
/// scheduler owns its detector; nothing is shared between sessions.
pub struct BackendRegistry {
    factories: BTreeMap<String, BackendFactory>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with the built-in `motion` and `stub` backends.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("motion", || Box::new(MotionBackend::new()));
        registry.register("stub", || Box::new(StubBackend::new()));
        registry
    }

    /// Register a factory, replacing any previous one with the same name.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn DetectorBackend> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Build a backend by name.
    pub fn create(&self, name: &str) -> Result<Box<dyn DetectorBackend>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            anyhow!(
                "backend '{}' not registered (available: {})",
                name,
                self.list().join(", ")
            )
        })?;
        Ok(factory())
    }

    /// Registered backend names, sorted.
    pub fn list(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
