//! Provider router: builds adapters from configuration and hands out the
//! right one by name.

use std::collections::HashMap;
use std::sync::Arc;

use miniluma_config::{AppConfig, ProviderConfig};
use miniluma_core::error::ProviderError;
use miniluma_core::message::Message;
use miniluma_core::provider::{Provider, ProviderRequest};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::anthropic::AnthropicProvider;
use crate::mock::MockProvider;
use crate::openai_compat::{OPENAI_BASE_URL, OpenAiCompatProvider};

/// Model used for a provider registered without one.
pub const FALLBACK_MODEL: &str = "mock-model";

/// Named providers plus the default one.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    models: HashMap<String, String>,
    default_provider: String,
}

/// Answer to a one-shot [`ProviderRouter::ask`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AskReply {
    pub provider: String,
    pub model: String,
    pub content: String,
}

impl ProviderRouter {
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            models: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// The model requests to `name` use unless the caller picks one.
    pub fn set_model(&mut self, name: impl Into<String>, model: impl Into<String>) {
        self.models.insert(name.into(), model.into());
    }

    pub fn model_for(&self, name: &str) -> &str {
        self.models
            .get(name)
            .map(String::as_str)
            .filter(|m| !m.is_empty())
            .unwrap_or(FALLBACK_MODEL)
    }

    /// Send a single prompt to `provider` (the default when `None`),
    /// outside any conversation.
    pub async fn ask(
        &self,
        provider: Option<&str>,
        prompt: &str,
        system_prompt: Option<&str>,
        model: Option<&str>,
    ) -> std::result::Result<AskReply, ProviderError> {
        let (name, backend) = self.resolve(provider)?;
        let model = model
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.model_for(&name))
            .to_string();

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt.filter(|s| !s.trim().is_empty()) {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(prompt));

        debug!(provider = %name, model = %model, "One-shot provider request");
        let response = backend.complete(ProviderRequest::new(&model, messages)).await?;
        Ok(AskReply {
            provider: name,
            model: if response.model.is_empty() { model } else { response.model },
            content: response.message.content,
        })
    }

    /// Register a provider under a name. Replaces any previous entry.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    pub fn default_name(&self) -> &str {
        &self.default_provider
    }

    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// Look up `name`, or the default provider when none is given.
    pub fn resolve(&self, name: Option<&str>) -> std::result::Result<(String, Arc<dyn Provider>), ProviderError> {
        let name = name.filter(|n| !n.is_empty()).unwrap_or(&self.default_provider);
        self.get(name)
            .map(|p| (name.to_string(), p))
            .ok_or_else(|| ProviderError::NotConfigured(format!("unknown provider '{name}'")))
    }

    /// Registered provider names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Build the adapter for one configured provider.
///
/// `anthropic` uses the native Messages API; `openai`, `deepseek`,
/// `silicon_flow` and any other name with a `base_url` use the
/// OpenAI-compatible adapter; `mock` needs no configuration at all.
pub fn create_provider(
    name: &str,
    config: &ProviderConfig,
) -> std::result::Result<Arc<dyn Provider>, ProviderError> {
    if name == "mock" {
        return Ok(Arc::new(MockProvider::new()));
    }

    let api_key = config.api_key.clone().unwrap_or_default();
    match (name, config.base_url.as_deref()) {
        ("anthropic", base_url) => {
            let mut provider = AnthropicProvider::new(api_key);
            if let Some(url) = base_url {
                provider = provider.with_base_url(url);
            }
            Ok(Arc::new(provider))
        }
        ("openai", None) => Ok(Arc::new(OpenAiCompatProvider::new(name, OPENAI_BASE_URL, api_key))),
        (_, Some(url)) => Ok(Arc::new(OpenAiCompatProvider::new(name, url, api_key))),
        (_, None) => Err(ProviderError::NotConfigured(format!(
            "provider '{name}' has no base_url"
        ))),
    }
}

/// Build a router from configuration.
///
/// Providers with an API key are registered. The default provider is
/// always present: without a key it is backed by [`MockProvider`].
/// The mock is also reachable as `mock`.
pub fn build_from_config(config: &AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.default_provider);
    router.register("mock", Arc::new(MockProvider::new()));
    router.set_model("mock", FALLBACK_MODEL);

    for (name, provider_config) in &config.providers {
        if !provider_config.has_api_key() {
            continue;
        }
        match create_provider(name, provider_config) {
            Ok(provider) => {
                info!(provider = %name, model = %provider_config.model, "Registered provider");
                router.register(name.clone(), provider);
                router.set_model(name.clone(), provider_config.model.clone());
            }
            Err(e) => warn!(provider = %name, error = %e, "Skipping provider"),
        }
    }

    if router.get(&config.default_provider).is_none() {
        warn!(
            provider = %config.default_provider,
            "No API key for default provider, falling back to mock responses"
        );
        router.register(config.default_provider.clone(), Arc::new(MockProvider::new()));
        router.set_model(config.default_provider.clone(), FALLBACK_MODEL);
    }

    router
}
