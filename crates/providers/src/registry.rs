//! Backend registry: validates configured backends and builds the active one.

use std::collections::BTreeMap;
use std::sync::Arc;

use ada_config::{AppConfig, BackendConfig};
use ada_core::backend::Backend;
use ada_core::error::BackendError;
use tracing::info;

use crate::llama::resolve_model;
use crate::ollama::OllamaBackend;

/// Every configured backend, checked up front, with one marked active.
pub struct BackendRegistry {
    configs: BTreeMap<String, BackendConfig>,
    active: String,
}

impl BackendRegistry {
    /// Check every configured backend and select the active one.
    ///
    /// Configuration mistakes in any entry are fatal here, before anything
    /// is downloaded or connected.
    pub fn from_config(config: &AppConfig) -> Result<Self, BackendError> {
        Self::new(config.backends.clone(), &config.backend)
    }

    pub fn new(configs: BTreeMap<String, BackendConfig>, active: &str) -> Result<Self, BackendError> {
        for backend in configs.values() {
            check(backend)?;
        }
        if !configs.contains_key(active) {
            return Err(BackendError::UnknownBackend(active.to_string()));
        }
        Ok(Self {
            configs,
            active: active.to_string(),
        })
    }

    /// Build the active backend.
    pub async fn connect(&self) -> Result<Arc<dyn Backend>, BackendError> {
        let config = self
            .configs
            .get(&self.active)
            .ok_or_else(|| BackendError::UnknownBackend(self.active.clone()))?;
        info!(backend = %self.active, kind = config.kind(), "Connecting backend");
        build(config).await
    }

    pub fn active(&self) -> &str {
        &self.active
    }

    /// All configured backend names, in name order.
    pub fn names(&self) -> Vec<&str> {
        self.configs.keys().map(String::as_str).collect()
    }

    /// `kind(model=...)` summary for a configured backend.
    pub fn describe(&self, name: &str) -> Option<String> {
        self.configs
            .get(name)
            .map(|c| format!("{}(model={})", c.kind(), c.model().unwrap_or("?")))
    }
}

fn check(config: &BackendConfig) -> Result<(), BackendError> {
    match config {
        BackendConfig::Llama(c) => resolve_model(c).map(|_| ()),
        BackendConfig::Ollama(c) => c
            .model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .map(|_| ())
            .ok_or(BackendError::MissingModel),
    }
}

/// Construct a backend from its configuration.
pub async fn build(config: &BackendConfig) -> Result<Arc<dyn Backend>, BackendError> {
    match config {
        BackendConfig::Ollama(c) => Ok(Arc::new(OllamaBackend::new(c)?)),
        #[cfg(feature = "local")]
        BackendConfig::Llama(c) => Ok(Arc::new(crate::llama::LlamaBackend::load(c).await?)),
        #[cfg(not(feature = "local"))]
        BackendConfig::Llama(c) => {
            resolve_model(c)?;
            Err(BackendError::NotConfigured(
                "in-process inference requires building with the 'local' feature".into(),
            ))
        }
    }
}
