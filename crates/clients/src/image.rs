//! Text-to-image adapter.
//!
//! Talks to an OpenAI-compatible image generation endpoint that answers
//! with base64-encoded payloads. The adapter returns raw bytes; writing
//! them under the notebook's asset directory is the pipeline's job.

use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use crate::error::ClientError;
use crate::settings::BackendEndpoint;

/// Image generation capability.
pub struct ImageClient {
    http: reqwest::Client,
    endpoint: BackendEndpoint,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImagePayload>,
}

#[derive(Debug, Deserialize)]
struct ImagePayload {
    b64_json: Option<String>,
}

impl ImageClient {
    pub fn new(endpoint: BackendEndpoint) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(endpoint.timeout_secs))
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;
        Ok(Self { http, endpoint })
    }

    /// Generate one image and return its encoded bytes (PNG).
    pub async fn generate_image(
        &self,
        prompt: &str,
        negative_prompt: Option<&str>,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, ClientError> {
        let url = format!(
            "{}/images/generations",
            self.endpoint.base_url.trim_end_matches('/')
        );
        let mut body = json!({
            "prompt": prompt,
            "size": format!("{width}x{height}"),
            "n": 1,
            "response_format": "b64_json",
        });
        if let Some(model) = &self.endpoint.model {
            body["model"] = json!(model);
        }
        if let Some(negative) = negative_prompt {
            body["negative_prompt"] = json!(negative);
        }

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.endpoint.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: ImageResponse = serde_json::from_str(&text)
            .map_err(|e| ClientError::Decode(format!("{e}: {text}")))?;
        let b64 = parsed
            .data
            .into_iter()
            .next()
            .and_then(|p| p.b64_json)
            .ok_or_else(|| ClientError::Decode("image response carried no payload".into()))?;
        base64::engine::general_purpose::STANDARD
            .decode(b64.as_bytes())
            .map_err(|e| ClientError::Decode(format!("invalid base64 image payload: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_response_shape_parses() {
        let raw = r#"{"data": [{"b64_json": "aGVsbG8="}]}"#;
        let parsed: ImageResponse = serde_json::from_str(raw).unwrap();
        let b64 = parsed.data[0].b64_json.as_ref().unwrap();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(b64.as_bytes())
            .unwrap();
        assert_eq!(bytes, b"hello");
    }
}
