use std::collections::BTreeMap;

use anyhow::{anyhow, Result};

use crate::config::DetectorSettings;
use crate::detect::backend::DetectorBackend;
use crate::detect::backends::{ScriptedBackend, SyntheticCrowdBackend};

type BackendFactory = Box<dyn Fn(&DetectorSettings) -> Result<Box<dyn DetectorBackend>>>;

/// Named detector factories. The first registered name becomes the default.
pub struct BackendRegistry {
    factories: BTreeMap<String, BackendFactory>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
            default_name: None,
        }
    }

    /// Registry with every backend compiled into this build.
    pub fn with_builtin_backends() -> Self {
        let mut registry = Self::new();
        registry.register("synthetic", |settings| {
            Ok(Box::new(SyntheticCrowdBackend::new(
                settings.people,
                settings.seed,
            )))
        });
        registry.register("scripted", |settings| {
            let path = settings
                .script_path
                .as_ref()
                .ok_or_else(|| anyhow!("scripted detector requires detector.script_path"))?;
            Ok(Box::new(ScriptedBackend::from_json_file(path)?))
        });
        #[cfg(feature = "backend-tract")]
        registry.register("tract", |settings| {
            let path = settings
                .model_path
                .as_ref()
                .ok_or_else(|| anyhow!("tract detector requires detector.model_path"))?;
            let backend = crate::detect::backends::TractBackend::new(
                path,
                settings.input_width,
                settings.input_height,
            )?
            .with_threshold(settings.confidence);
            Ok(Box::new(backend))
        });
        registry
    }

    /// Register a backend factory under `name`.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&DetectorSettings) -> Result<Box<dyn DetectorBackend>> + 'static,
    {
        if self.default_name.is_none() {
            self.default_name = Some(name.to_string());
        }
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.factories.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    /// List registered backends.
    pub fn list(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Build the backend registered as `name`.
    pub fn create(
        &self,
        name: &str,
        settings: &DetectorSettings,
    ) -> Result<Box<dyn DetectorBackend>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            anyhow!(
                "unknown detector backend '{}' (available: {})",
                name,
                self.list().join(", ")
            )
        })?;
        let mut backend = factory(settings)?;
        backend.warm_up()?;
        Ok(backend)
    }

    /// Build the default backend.
    pub fn create_default(&self, settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
        let name = self
            .default_name
            .as_deref()
            .ok_or_else(|| anyhow!("no detector backends registered"))?;
        self.create(name, settings)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
