use crate::rate_limit::RateLimiter;
use codegraph_core::config::TextModelConfig;
use codegraph_core::error::StoreError;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;

const OPENAI_CHAT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Text-generation model used only as a low-confidence fallback.
///
/// Every caller must treat a `generate` failure as "keep the pattern-based
/// result"; the pipeline never propagates model errors.
pub trait TextModel: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, StoreError>;
}

/// Build the configured text model, already wrapped in a rate limiter.
/// Returns `None` when the provider is "none" (fallback disabled).
pub fn build_text_model(config: &TextModelConfig) -> Option<Box<dyn TextModel>> {
    match config.provider.trim().to_ascii_lowercase().as_str() {
        "none" | "" => None,
        _ => {
            let inner = HttpTextModel::from_config(config);
            Some(Box::new(RateLimitedTextModel::new(
                Box::new(inner),
                RateLimiter::new(config.requests_per_second, config.burst_size),
            )))
        }
    }
}

/// OpenAI-compatible chat-completions client (blocking).
pub struct HttpTextModel {
    endpoint: String,
    model: String,
    timeout: Duration,
}

impl HttpTextModel {
    pub fn from_config(config: &TextModelConfig) -> Self {
        let endpoint = config
            .endpoint
            .as_ref()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| OPENAI_CHAT_ENDPOINT.to_string());
        Self {
            endpoint,
            model: config.model.clone(),
            timeout: Duration::from_millis(config.timeout_ms.max(1)),
        }
    }

    fn resolve_api_key() -> Result<String, StoreError> {
        std::env::var("CODEGRAPH_TEXT_API_KEY")
            .map_err(|_| StoreError::external("missing_text_api_key"))
    }
}

impl TextModel for HttpTextModel {
    fn generate(&self, prompt: &str) -> Result<String, StoreError> {
        let api_key = Self::resolve_api_key()?;
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(StoreError::external)?;

        let payload = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0.0
        });
        let response = client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .header("content-type", "application/json")
            .json(&payload)
            .send()
            .map_err(StoreError::external)?;

        if !response.status().is_success() {
            return Err(StoreError::external(format!(
                "text_model_http_{}",
                response.status().as_u16()
            )));
        }

        let body: ChatResponse = response.json().map_err(StoreError::external)?;
        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| StoreError::external("text_model_empty_response"))
    }
}

/// Wraps any text model with the token-bucket limiter so repeated invocation
/// under load degrades to a fail-soft error instead of hammering the API.
pub struct RateLimitedTextModel {
    inner: Box<dyn TextModel>,
    limiter: RateLimiter,
}

impl RateLimitedTextModel {
    pub fn new(inner: Box<dyn TextModel>, limiter: RateLimiter) -> Self {
        Self { inner, limiter }
    }
}

impl TextModel for RateLimitedTextModel {
    fn generate(&self, prompt: &str) -> Result<String, StoreError> {
        self.limiter.acquire()?;
        self.inner.generate(prompt)
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedModel {
        responses: Mutex<Vec<Result<String, StoreError>>>,
        calls: Mutex<usize>,
    }

    impl TextModel for ScriptedModel {
        fn generate(&self, _prompt: &str) -> Result<String, StoreError> {
            *self.calls.lock().unwrap() += 1;
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(StoreError::external("exhausted")))
        }
    }

    #[test]
    fn none_provider_disables_the_model() {
        let config = TextModelConfig {
            provider: "none".to_string(),
            ..TextModelConfig::default()
        };
        assert!(build_text_model(&config).is_none());
    }

    #[test]
    fn rate_limited_model_rejects_after_burst_without_calling_inner() {
        let inner = ScriptedModel {
            responses: Mutex::new(vec![Ok("INTENT:0.9".to_string())]),
            calls: Mutex::new(0),
        };
        let limited = RateLimitedTextModel::new(Box::new(inner), RateLimiter::new(0.0, 1));

        assert!(limited.generate("first").is_ok());
        let err = limited.generate("second").unwrap_err();
        assert!(err.to_string().contains("rate_limited"));
    }

    #[test]
    fn chat_response_parsing_takes_first_choice() {
        let body = serde_json::json!({
            "choices": [
                {"message": {"content": "IMPLEMENTATION:0.8"}},
                {"message": {"content": "ignored"}}
            ]
        });
        let parsed: ChatResponse = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.choices[0].message.content, "IMPLEMENTATION:0.8");
    }
}
