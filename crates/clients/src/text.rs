//! Text generation over an OpenAI-compatible chat API.
//!
//! The [`TextGenerator`] trait is the seam the pipeline stages depend on;
//! tests substitute scripted implementations, production uses
//! [`HttpTextClient`].

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ClientError;
use crate::settings::BackendEndpoint;

/// Options for a single text generation call.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub system_prompt: Option<String>,
    pub max_new_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Text generation capability.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate free-form text.
    async fn generate_text(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, ClientError>;

    /// Generate a JSON object constrained by `schema` via the backend's
    /// schema-guided mode. Backends without that mode answer with whatever
    /// they produce; the caller validates and falls back.
    async fn generate_structured(
        &self,
        prompt: &str,
        schema: &Value,
        options: &GenerateOptions,
    ) -> Result<Value, ClientError>;

    /// Usable context window of the underlying model, in tokens.
    fn context_window_tokens(&self) -> usize;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// OpenAI-compatible chat completion client.
pub struct HttpTextClient {
    http: reqwest::Client,
    endpoint: BackendEndpoint,
    model: String,
    context_window: usize,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

impl HttpTextClient {
    pub fn new(
        endpoint: BackendEndpoint,
        model: String,
        context_window: usize,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(endpoint.timeout_secs))
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;
        Ok(Self {
            http,
            endpoint,
            model,
            context_window,
        })
    }

    /// List model identifiers the backend serves.
    pub async fn list_models(&self) -> Result<Vec<String>, ClientError> {
        let url = format!("{}/models", self.endpoint.base_url.trim_end_matches('/'));
        let response = self.authorized(self.http.get(&url)).send().await?;
        let list: ModelList = Self::read_json(response).await?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.endpoint.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn chat(&self, body: Value) -> Result<String, ClientError> {
        let url = format!(
            "{}/chat/completions",
            self.endpoint.base_url.trim_end_matches('/')
        );
        let response = self.authorized(self.http.post(&url)).json(&body).send().await?;
        let parsed: ChatResponse = Self::read_json(response).await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ClientError::Decode("response carried no message content".into()))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| ClientError::Decode(format!("{e}: {body}")))
    }

    fn messages(prompt: &str, options: &GenerateOptions) -> Vec<Value> {
        let mut messages = Vec::new();
        if let Some(system) = &options.system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": prompt}));
        messages
    }
}

#[async_trait]
impl TextGenerator for HttpTextClient {
    async fn generate_text(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, ClientError> {
        let mut body = json!({
            "model": self.model,
            "messages": Self::messages(prompt, options),
        });
        if let Some(max) = options.max_new_tokens {
            body["max_tokens"] = json!(max);
        }
        if let Some(t) = options.temperature {
            body["temperature"] = json!(t);
        }
        self.chat(body).await
    }

    async fn generate_structured(
        &self,
        prompt: &str,
        schema: &Value,
        options: &GenerateOptions,
    ) -> Result<Value, ClientError> {
        let mut body = json!({
            "model": self.model,
            "messages": Self::messages(prompt, options),
            "response_format": {
                "type": "json_schema",
                "json_schema": {"name": "plan", "schema": schema, "strict": true},
            },
        });
        if let Some(max) = options.max_new_tokens {
            body["max_tokens"] = json!(max);
        }
        let raw = self.chat(body).await?;
        serde_json::from_str(&raw)
            .map_err(|e| ClientError::Decode(format!("structured output was not JSON: {e}")))
    }

    fn context_window_tokens(&self) -> usize {
        self.context_window
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_include_system_prompt_first() {
        let options = GenerateOptions {
            system_prompt: Some("be brief".into()),
            ..Default::default()
        };
        let messages = HttpTextClient::messages("hello", &options);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "hello");
    }

    #[test]
    fn messages_without_system_prompt() {
        let messages = HttpTextClient::messages("hi", &GenerateOptions::default());
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
    }

    #[test]
    fn chat_response_shape_parses() {
        let raw = r#"{"choices": [{"message": {"role": "assistant", "content": "ok"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("ok"));
    }
}
