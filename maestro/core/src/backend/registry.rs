//! Provider lookup

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use super::ollama::OllamaBackend;
use super::openrouter::OpenRouterBackend;
use super::traits::{LlmBackend, ModelInfo};
use crate::config::BackendSettings;

/// Reachability of one provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProviderHealth {
    /// Provider name
    pub provider: String,
    /// Whether the provider answered its health check
    pub healthy: bool,
}

/// Maps provider names to backends
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn LlmBackend>>,
}

impl BackendRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the standard provider set from configuration
    #[must_use]
    pub fn from_config(settings: &BackendSettings) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(OllamaBackend::new(&settings.ollama_url)));
        registry.register(Arc::new(OpenRouterBackend::new(
            &settings.openrouter_url,
            settings.openrouter_api_key.clone(),
        )));
        registry
    }

    /// Register a backend under its own name, replacing any previous one
    pub fn register(&mut self, backend: Arc<dyn LlmBackend>) {
        let name = backend.name().to_string();
        tracing::debug!(provider = %name, "Registered backend");
        self.backends.insert(name, backend);
    }

    /// Look up a backend by provider name
    #[must_use]
    pub fn get(&self, provider: &str) -> Option<Arc<dyn LlmBackend>> {
        self.backends.get(provider).cloned()
    }

    /// Registered provider names, sorted
    #[must_use]
    pub fn providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.backends.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Health check every provider, in name order
    pub async fn health(&self) -> Vec<ProviderHealth> {
        let mut report = Vec::new();
        for provider in self.providers() {
            let Some(backend) = self.backends.get(provider) else {
                continue;
            };
            report.push(ProviderHealth {
                provider: provider.to_string(),
                healthy: backend.health_check().await,
            });
        }
        report
    }

    /// Models from every provider; a failing provider is logged and skipped
    pub async fn list_models(&self) -> Vec<ModelInfo> {
        let mut models = Vec::new();
        for provider in self.providers() {
            let Some(backend) = self.backends.get(provider) else {
                continue;
            };
            match backend.list_models().await {
                Ok(mut found) => models.append(&mut found),
                Err(e) => {
                    tracing::warn!(provider = %provider, error = %e, "Could not list models");
                }
            }
        }
        models
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}
