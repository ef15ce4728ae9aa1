// src/core/request.rs - Provider/model resolution and request body construction

use crate::chat::context::ContextMessage;
use crate::infra::config::{AiConfig, ApiProvider, RequestConfig};
use crate::infra::errors::NovelerError;
use crate::stream::StreamRequest;

/// Endpoint, credentials and model for one request.
#[derive(Clone, PartialEq)]
pub struct ResolvedTarget {
    pub provider_id: String,
    pub api_url: String,
    pub api_key: String,
    /// Model name as sent upstream.
    pub model: String,
}

impl std::fmt::Debug for ResolvedTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedTarget")
            .field("provider_id", &self.provider_id)
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .finish()
    }
}

/// Pick the provider and model for the next request.
///
/// The selected provider wins; otherwise the first active one. Within the
/// provider the selected model wins, then the first active model, then the
/// first model listed.
pub fn resolve_target(ai: &AiConfig) -> Result<ResolvedTarget, NovelerError> {
    if ai.api_providers.is_empty() {
        return Err(NovelerError::Config("no AI provider is configured".into()));
    }

    let provider = match ai.selected_provider_id.as_deref() {
        Some(id) => ai
            .api_providers
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| NovelerError::Config(format!("selected provider '{id}' not found")))?,
        None => ai
            .api_providers
            .iter()
            .find(|p| p.is_active)
            .ok_or_else(|| NovelerError::Config("no active AI provider".into()))?,
    };

    check_provider(provider)?;

    let model = match ai.selected_model_id.as_deref() {
        Some(id) => provider.models.iter().find(|m| m.id == id).ok_or_else(|| {
            NovelerError::Config(format!(
                "selected model '{id}' not found in provider '{}'",
                provider.name
            ))
        })?,
        None => provider
            .models
            .iter()
            .find(|m| m.is_active)
            .or_else(|| provider.models.first())
            .ok_or_else(|| {
                NovelerError::Config(format!("provider '{}' has no models", provider.name))
            })?,
    };

    Ok(ResolvedTarget {
        provider_id: provider.id.clone(),
        api_url: provider.api_url.trim().to_string(),
        api_key: provider.api_key.trim().to_string(),
        model: model.name.clone(),
    })
}

fn check_provider(provider: &ApiProvider) -> Result<(), NovelerError> {
    if provider.api_url.trim().is_empty() {
        return Err(NovelerError::Config(format!(
            "provider '{}' has no API URL",
            provider.name
        )));
    }
    if provider.api_key.trim().is_empty() {
        return Err(NovelerError::Config(format!(
            "provider '{}' has no API key",
            provider.name
        )));
    }
    Ok(())
}

/// `{model, messages, temperature, max_tokens, stream: true}` for the target.
pub fn build_request(
    target: &ResolvedTarget,
    messages: &[ContextMessage],
    params: &RequestConfig,
) -> StreamRequest {
    let body = serde_json::json!({
        "model": target.model,
        "messages": messages,
        "temperature": params.temperature,
        "max_tokens": params.max_tokens,
        "stream": true,
    });
    StreamRequest {
        url: target.api_url.clone(),
        api_key: target.api_key.clone(),
        body,
    }
}
