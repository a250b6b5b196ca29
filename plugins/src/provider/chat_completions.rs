use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use forge_core::config::HttpProviderConfig;
use forge_core::error::{ProviderError, ProviderErrorKind};
use forge_core::executor::traits::RetryStrategyPlugin;
use forge_core::provider::{GenerateOptions, Generation, Provider, Usage};
use serde_json::{json, Value};

use super::http::{normalized_url, resolve_api_key, send_json, with_retry};

/// OpenAI-compatible `POST {base_url}/chat/completions`.
pub struct ChatCompletionsProvider {
    name: String,
    http: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    retry: Arc<dyn RetryStrategyPlugin>,
}

impl ChatCompletionsProvider {
    pub fn new(
        name: impl Into<String>,
        cfg: &HttpProviderConfig,
        timeout: Duration,
        retry: Arc<dyn RetryStrategyPlugin>,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            name: name.into(),
            http,
            url: normalized_url(&cfg.base_url, "/chat/completions"),
            model: cfg.model.clone(),
            api_key: resolve_api_key(cfg.api_key_env.as_deref())?,
            max_tokens: cfg.max_tokens,
            retry,
        })
    }

    fn payload(&self, prompt: &str, options: &GenerateOptions) -> Value {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &options.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        let mut payload = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": options.max_tokens.unwrap_or(self.max_tokens),
        });
        if let Some(obj) = payload.as_object_mut() {
            if let Some(t) = options.temperature {
                obj.insert("temperature".into(), json!(t));
            }
            if options.json {
                obj.insert("response_format".into(), json!({ "type": "json_object" }));
            }
        }
        payload
    }

    async fn send_once(&self, payload: &Value) -> Result<Generation, ProviderError> {
        let mut req = self.http.post(&self.url).json(payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let body = send_json(req).await?;
        parse_response(&body)
    }
}

fn parse_response(body: &Value) -> Result<Generation, ProviderError> {
    let content = body
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ProviderError::new(
                ProviderErrorKind::Decode,
                "response has no choices[0].message.content",
            )
        })?;
    let usage = body.get("usage").map(|u| Usage {
        input_tokens: u.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0),
        output_tokens: u.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0),
    });
    Ok(Generation {
        content: content.to_string(),
        usage,
    })
}

#[async_trait]
impl Provider for ChatCompletionsProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<Generation, ProviderError> {
        let payload = self.payload(prompt, options);
        tracing::debug!(
            target: "forge.provider",
            provider = %self.name,
            model = %self.model,
            prompt_len = prompt.len(),
            "chat completions request"
        );
        with_retry(&self.name, self.retry.as_ref(), || self.send_once(&payload)).await
    }
}
