//! Completion API clients for RelayClaw.
//!
//! One backend today: the Gemini `generateContent` API. The loop
//! controller only ever sees the `CompletionClient` trait.

pub mod gemini;

pub use gemini::GeminiClient;

use relayclaw_config::AppConfig;
use relayclaw_core::error::ProviderError;

/// Build the configured completion client.
pub fn from_config(config: &AppConfig) -> Result<GeminiClient, ProviderError> {
    let api_key = config.api_key.clone().ok_or_else(|| {
        ProviderError::NotConfigured(
            "no completion API key; set GEMINI_API_KEY or api_key in config.toml".into(),
        )
    })?;

    Ok(GeminiClient::new(api_key, &config.model))
}
