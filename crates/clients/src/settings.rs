//! Per-user client configuration.

use serde::{Deserialize, Serialize};

/// Connection details for one backend service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendEndpoint {
    /// Base URL, e.g. `http://localhost:11434/v1`.
    pub base_url: String,
    pub api_key: Option<String>,
    /// Backend-specific model identifier.
    pub model: Option<String>,
    /// Request timeout in seconds. Long-running generations need generous
    /// values; image backends routinely take over a minute.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    300
}

impl BackendEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            model: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// The user's active model configuration plus call-site overrides.
///
/// Only the text backend is mandatory; every other capability is optional
/// and its absence makes the corresponding adapter `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    pub text: BackendEndpoint,
    /// Model name used for text generation.
    pub text_model: String,
    /// Usable context window of the text model, in tokens.
    #[serde(default = "default_context_window")]
    pub context_window_tokens: usize,
    pub tti: Option<BackendEndpoint>,
    pub tts: Option<BackendEndpoint>,
    pub stt: Option<BackendEndpoint>,
    /// Path to the user's active voice clone sample, if configured.
    pub voice_sample: Option<String>,
    /// User's preferred output language.
    pub language: Option<String>,
}

fn default_context_window() -> usize {
    8192
}

impl ClientSettings {
    pub fn new(text: BackendEndpoint, text_model: impl Into<String>) -> Self {
        Self {
            text,
            text_model: text_model.into(),
            context_window_tokens: default_context_window(),
            tti: None,
            tts: None,
            stt: None,
            voice_sample: None,
            language: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_applied_on_deserialize() {
        let json = r#"{
            "text": {"base_url": "http://localhost:8080/v1", "api_key": null, "model": null},
            "text_model": "llama3"
        }"#;
        let settings: ClientSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.context_window_tokens, 8192);
        assert_eq!(settings.text.timeout_secs, 300);
        assert!(settings.tti.is_none());
        assert!(settings.tts.is_none());
    }
}
