//! Speech synthesis and transcription adapters.

use crate::error::ClientError;
use crate::settings::BackendEndpoint;

/// Text-to-speech capability. Returns WAV bytes.
pub struct SpeechClient {
    http: reqwest::Client,
    endpoint: BackendEndpoint,
}

impl SpeechClient {
    pub fn new(endpoint: BackendEndpoint) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(endpoint.timeout_secs))
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;
        Ok(Self { http, endpoint })
    }

    /// Synthesize speech for `text`.
    ///
    /// `voice` may be a named voice or a path to a voice clone sample the
    /// backend can read; `language` is a two-letter code.
    pub async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        language: &str,
    ) -> Result<Vec<u8>, ClientError> {
        let url = format!(
            "{}/audio/speech",
            self.endpoint.base_url.trim_end_matches('/')
        );
        let mut body = serde_json::json!({
            "input": text,
            "language": language,
            "response_format": "wav",
        });
        if let Some(model) = &self.endpoint.model {
            body["model"] = serde_json::json!(model);
        }
        if let Some(voice) = voice {
            body["voice"] = serde_json::json!(voice);
        }

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.endpoint.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Speech-to-text capability.
pub struct TranscribeClient {
    http: reqwest::Client,
    endpoint: BackendEndpoint,
}

impl TranscribeClient {
    pub fn new(endpoint: BackendEndpoint) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(endpoint.timeout_secs))
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;
        Ok(Self { http, endpoint })
    }

    /// Transcribe an audio payload. `filename` hints the container format.
    pub async fn transcribe(
        &self,
        audio: Vec<u8>,
        filename: &str,
    ) -> Result<String, ClientError> {
        let url = format!(
            "{}/audio/transcriptions",
            self.endpoint.base_url.trim_end_matches('/')
        );
        let part = reqwest::multipart::Part::bytes(audio).file_name(filename.to_string());
        let mut form = reqwest::multipart::Form::new().part("file", part);
        if let Some(model) = &self.endpoint.model {
            form = form.text("model", model.clone());
        }

        let mut request = self.http.post(&url).multipart(form);
        if let Some(key) = &self.endpoint.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| ClientError::Decode(format!("{e}: {body}")))?;
        parsed["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ClientError::Decode("transcription response had no text field".into()))
    }
}
