//! LLM integration for FastTrack.
//!
//! One OpenAI-compatible endpoint serves both the text model (insights,
//! summaries, questions) and the vision model (meal photos).
//!
//! Uses rig-core for HTTP transport and the `RigAdapter` to bridge rig's
//! `CompletionModel` trait to our `LlmProvider` trait.

pub mod provider;
mod rig_adapter;

pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::{ExposeSecret, SecretString};

use crate::config::LlmSettings;
use crate::error::LlmError;

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub model: String,
}

impl LlmConfig {
    /// Text-model config from the shared settings.
    pub fn text(settings: &LlmSettings) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
            model: settings.text_model.clone(),
        }
    }

    /// Vision-model config from the shared settings.
    pub fn vision(settings: &LlmSettings) -> Self {
        Self {
            model: settings.vision_model.clone(),
            ..Self::text(settings)
        }
    }
}

/// Create an LLM provider from configuration.
///
/// Groq and most compatible hosts only speak the Chat Completions API, so the
/// client is switched off rig's default Responses API.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openai;

    let client = openai::Client::<reqwest::Client>::builder()
        .api_key(config.api_key.expose_secret())
        .base_url(&config.base_url)
        .build()
        .map_err(|e| LlmError::RequestFailed {
            provider: "openai".to_string(),
            reason: format!("Failed to create OpenAI-compatible client: {}", e),
        })?
        .completions_api();

    let model = client.completion_model(&config.model);
    tracing::info!(model = %config.model, base_url = %config.base_url, "Using LLM provider");
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> LlmSettings {
        LlmSettings {
            api_key: SecretString::from("test-key"),
            base_url: crate::config::DEFAULT_LLM_BASE_URL.to_string(),
            text_model: "text-model".to_string(),
            vision_model: "vision-model".to_string(),
        }
    }

    #[test]
    fn test_create_provider_missing_key_still_constructs() {
        // The key is only checked by the server on the first request.
        let provider = create_provider(&LlmConfig::text(&settings()));
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().model_name(), "text-model");
    }

    #[test]
    fn test_vision_config_swaps_model() {
        let config = LlmConfig::vision(&settings());
        assert_eq!(config.model, "vision-model");
        assert_eq!(config.base_url, crate::config::DEFAULT_LLM_BASE_URL);
    }
}
