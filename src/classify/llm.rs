// LLM-backed headline classifier against an OpenAI-compatible chat
// completions endpoint. One request per headline; retries are the
// caller's concern.

use crate::classify::{normalize_category, Classifier, ClassifyError};
use crate::config::ClassifierConfig;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const SYSTEM_PROMPT: &str = "You label news headlines with exactly one category from: \
politics, business, technology, science, health, sports, entertainment, world, local, general. \
Reply with the category word only.";

pub struct LlmClassifier {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    timeout: Duration,
}

impl std::fmt::Debug for LlmClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClassifier")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl LlmClassifier {
    /// Fails fast when the API key is absent or the endpoint is not HTTPS
    /// (plain HTTP is allowed for localhost only).
    pub fn new(config: &ClassifierConfig) -> Result<Self, ClassifyError> {
        let api_key = match &config.api_key {
            Some(key) if !key.trim().is_empty() => SecretString::from(key.clone()),
            _ => return Err(ClassifyError::MissingApiKey),
        };

        let base_url = config.base_url.trim_end_matches('/').to_string();
        let is_localhost =
            base_url.starts_with("http://127.0.0.1") || base_url.starts_with("http://localhost");
        if !base_url.starts_with("https://") && !is_localhost {
            return Err(ClassifyError::InsecureBaseUrl);
        }

        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
            model: config.model.clone(),
            timeout: config.timeout(),
        })
    }

    async fn request_label(&self, text: &str) -> Result<String, ClassifyError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": text },
            ],
            "temperature": 0,
            "max_tokens": 8,
        });

        let request = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&body)
            .send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| ClassifyError::Timeout(self.timeout))??;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifyError::HttpStatus(status.as_u16()));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ClassifyError::InvalidResponse(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ClassifyError::InvalidResponse("no choices in response".to_string()))?;

        Ok(choice.message.content)
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, text: &str) -> Result<String, ClassifyError> {
        let raw = self.request_label(text).await?;
        let category = normalize_category(&raw);
        debug!(raw = %raw.trim(), %category, "Classified headline");
        Ok(category)
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}
