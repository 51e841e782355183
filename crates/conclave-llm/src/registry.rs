//! Backend registry
//!
//! Name-keyed lookup of configured model backends. The council draws its
//! candidate pool from here; insertion order is preserved so `min..max`
//! selection is deterministic for a given configuration.

use crate::error::{Error, Result};
use crate::provider::ModelBackend;
use std::sync::Arc;

/// Registry of configured model backends
#[derive(Default)]
pub struct BackendRegistry {
    backends: Vec<Arc<dyn ModelBackend>>,
}

impl BackendRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend. Re-registering a name replaces the old entry.
    pub fn register(&mut self, backend: Arc<dyn ModelBackend>) {
        if let Some(existing) = self
            .backends
            .iter_mut()
            .find(|b| b.name() == backend.name())
        {
            *existing = backend;
        } else {
            self.backends.push(backend);
        }
    }

    /// Look up a backend by name
    pub fn get(&self, name: &str) -> Result<Arc<dyn ModelBackend>> {
        self.backends
            .iter()
            .find(|b| b.name() == name)
            .cloned()
            .ok_or_else(|| Error::NotConfigured(name.to_string()))
    }

    /// All registered backends, in registration order
    #[must_use]
    pub fn all(&self) -> Vec<Arc<dyn ModelBackend>> {
        self.backends.clone()
    }

    /// Number of registered backends
    #[must_use]
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
