//! OpenAI-compatible Chat Completions provider.
//!
//! Auth priority: explicit key → environment variable named by config
//! (default `OPENAI_API_KEY`). The environment is consulted on every call so
//! that a key exported after start-up is picked up without a restart.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::{MeterError, Result};

use super::{parse_provider_error, ChatOptions, LLMProvider, LLMResponse, Message, Usage};

/// Default model when none is configured or passed at call time.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

/// Chat Completions client speaking the OpenAI REST API.
pub struct OpenAIProvider {
    api_base: String,
    api_key_env: String,
    explicit_key: Option<String>,
    model: String,
    client: Client,
}

impl std::fmt::Debug for OpenAIProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIProvider")
            .field("api_base", &self.api_base)
            .field("api_key_env", &self.api_key_env)
            .field(
                "explicit_key",
                &self.explicit_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAIProvider {
    /// Build a provider from configuration. The credential is not read here.
    pub fn from_config(config: &ProviderConfig, model: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MeterError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key_env: config.api_key_env.clone(),
            explicit_key: None,
            model: model.to_string(),
            client,
        })
    }

    /// Use a fixed key instead of consulting the environment.
    pub fn with_api_key(mut self, key: &str) -> Self {
        self.explicit_key = Some(key.to_string()).filter(|k| !k.is_empty());
        self
    }

    /// Resolve the credential: explicit key first, then the environment.
    fn resolve_key(&self) -> Result<String> {
        if let Some(key) = &self.explicit_key {
            return Ok(key.clone());
        }
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| MeterError::Config(format!("{} is not set", self.api_key_env)))
    }

    fn api_url(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    fn build_body(&self, messages: &[Message], model: &str, options: &ChatOptions) -> Value {
        let messages: Vec<Value> = messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": &m.content }))
            .collect();

        let mut body = json!({
            "model": model,
            "messages": messages,
        });
        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temp) = options.temperature {
            body["temperature"] = json!(temp);
        }
        body
    }

    /// Text of the first choice. `None` when the response has no choices;
    /// a choice whose content is null yields an empty string.
    pub fn extract_text(response: &Value) -> Option<String> {
        let first = response["choices"].as_array()?.first()?;
        Some(
            first["message"]["content"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
        )
    }

    /// Token counts, or `None` when absent or out of `u32` range.
    fn extract_usage(response: &Value) -> Option<Usage> {
        let usage = response.get("usage")?;
        let prompt = u32::try_from(usage["prompt_tokens"].as_u64()?).ok()?;
        let completion = u32::try_from(usage["completion_tokens"].as_u64()?).ok()?;
        Some(Usage::new(prompt, completion))
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: Vec<Message>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<LLMResponse> {
        let api_key = self.resolve_key()?;
        let model = model.unwrap_or(&self.model);
        let body = self.build_body(&messages, model, &options);

        debug!(model = %model, messages = messages.len(), "OpenAI chat request");

        let response = self
            .client
            .post(self.api_url())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MeterError::Provider(format!("OpenAI request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            let json: Value = response.json().await.map_err(|e| {
                MeterError::Provider(format!("Failed to parse OpenAI response: {}", e))
            })?;

            let content = Self::extract_text(&json)
                .ok_or_else(|| MeterError::Provider("OpenAI returned no choices".into()))?;

            let mut llm_response = LLMResponse::text(&content);
            if let Some(u) = Self::extract_usage(&json) {
                llm_response = llm_response.with_usage(u);
            }
            return Ok(llm_response);
        }

        let error_text = response.text().await.unwrap_or_default();
        let body_msg = serde_json::from_str::<Value>(&error_text)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(String::from))
            .unwrap_or(error_text);

        Err(parse_provider_error(
            status.as_u16(),
            &format!("OpenAI API error: {}", body_msg),
        ))
    }
}
