//! Pluggable model clients.
//!
//! A [`ModelClients`] value is the capability set a pipeline stage works
//! with: text generation is always present, the other capabilities are
//! nullable adapters. Call sites test presence (`clients.tti.is_some()`)
//! and degrade gracefully instead of probing attributes or catching
//! exceptions.

pub mod error;
pub mod image;
pub mod settings;
pub mod speech;
pub mod text;

pub use error::ClientError;
pub use image::ImageClient;
pub use settings::{BackendEndpoint, ClientSettings};
pub use speech::{SpeechClient, TranscribeClient};
pub use text::{GenerateOptions, HttpTextClient, TextGenerator};

/// The capability set constructed per call site from a user's active
/// configuration plus overrides.
pub struct ModelClients {
    /// Text generation; every pipeline needs it.
    pub text: Box<dyn TextGenerator>,
    /// Text-to-image, when a backend is configured.
    pub tti: Option<ImageClient>,
    /// Text-to-speech, when a backend is configured.
    pub tts: Option<SpeechClient>,
    /// Speech-to-text, when a backend is configured.
    pub stt: Option<TranscribeClient>,
}

impl ModelClients {
    /// Build the capability set from settings. Absent backends become
    /// `None` adapters rather than errors.
    pub fn from_settings(settings: &ClientSettings) -> Result<Self, ClientError> {
        let text = HttpTextClient::new(
            settings.text.clone(),
            settings.text_model.clone(),
            settings.context_window_tokens,
        )?;
        let tti = settings
            .tti
            .as_ref()
            .map(|ep| ImageClient::new(ep.clone()))
            .transpose()?;
        let tts = settings
            .tts
            .as_ref()
            .map(|ep| SpeechClient::new(ep.clone()))
            .transpose()?;
        let stt = settings
            .stt
            .as_ref()
            .map(|ep| TranscribeClient::new(ep.clone()))
            .transpose()?;
        Ok(Self {
            text: Box::new(text),
            tti,
            tts,
            stt,
        })
    }
}
