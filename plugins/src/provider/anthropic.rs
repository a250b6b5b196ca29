use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use forge_core::config::HttpProviderConfig;
use forge_core::error::{ProviderError, ProviderErrorKind};
use forge_core::executor::traits::RetryStrategyPlugin;
use forge_core::provider::{GenerateOptions, Generation, Provider, Usage};
use serde_json::{json, Value};

use super::http::{normalized_url, resolve_api_key, send_json, with_retry};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API, `POST {base_url}/v1/messages`.
pub struct AnthropicProvider {
    name: String,
    http: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    retry: Arc<dyn RetryStrategyPlugin>,
}

impl AnthropicProvider {
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
            url: normalized_url(&cfg.base_url, "/v1/messages"),
            model: cfg.model.clone(),
            api_key: resolve_api_key(cfg.api_key_env.as_deref())?,
            max_tokens: cfg.max_tokens,
            retry,
        })
    }

    fn payload(&self, prompt: &str, options: &GenerateOptions) -> Value {
        let mut payload = json!({
            "model": self.model,
            "max_tokens": options.max_tokens.unwrap_or(self.max_tokens),
            "messages": [{ "role": "user", "content": prompt }],
        });
        if let Some(obj) = payload.as_object_mut() {
            // The Messages API has no JSON mode; the instruction goes in the system prompt.
            let system = match (&options.system, options.json) {
                (Some(s), true) => Some(format!("{s}\nRespond with a single JSON object only.")),
                (Some(s), false) => Some(s.clone()),
                (None, true) => Some("Respond with a single JSON object only.".to_string()),
                (None, false) => None,
            };
            if let Some(system) = system {
                obj.insert("system".into(), json!(system));
            }
            if let Some(t) = options.temperature {
                obj.insert("temperature".into(), json!(t));
            }
        }
        payload
    }

    async fn send_once(&self, payload: &Value) -> Result<Generation, ProviderError> {
        let mut req = self
            .http
            .post(&self.url)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(payload);
        if let Some(key) = &self.api_key {
            req = req.header("x-api-key", key);
        }
        let body = send_json(req).await?;
        parse_response(&body)
    }
}

fn parse_response(body: &Value) -> Result<Generation, ProviderError> {
    let blocks = body
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::new(ProviderErrorKind::Decode, "response has no content array"))?;
    let content: String = blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .collect();
    let usage = body.get("usage").map(|u| Usage {
        input_tokens: u.get("input_tokens").and_then(Value::as_u64).unwrap_or(0),
        output_tokens: u.get("output_tokens").and_then(Value::as_u64).unwrap_or(0),
    });
    Ok(Generation { content, usage })
}

#[async_trait]
impl Provider for AnthropicProvider {
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
            "messages request"
        );
        with_retry(&self.name, self.retry.as_ref(), || self.send_once(&payload)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::executor::NoRetry;
    use mockito::{Matcher, Server};

    fn provider(base_url: String) -> AnthropicProvider {
        let cfg = HttpProviderConfig {
            base_url,
            model: "claude-test".into(),
            api_key_env: None,
            max_tokens: 512,
        };
        AnthropicProvider::new("anthropic", &cfg, Duration::from_secs(5), Arc::new(NoRetry)).unwrap()
    }

    #[tokio::test]
    async fn test_generate_joins_text_blocks() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/v1/messages")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .match_body(Matcher::PartialJson(json!({
                "model": "claude-test",
                "max_tokens": 512,
                "system": "be brief",
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"content":[{"type":"text","text":"Change "},{"type":"tool_use","id":"x"},{"type":"text","text":"your oil."}],
                    "usage":{"input_tokens":9,"output_tokens":4}}"#,
            )
            .create_async()
            .await;

        let options = GenerateOptions {
            system: Some("be brief".into()),
            ..GenerateOptions::default()
        };
        let g = provider(server.url()).generate("hi", &options).await.unwrap();

        m.assert_async().await;
        assert_eq!(g.content, "Change your oil.");
        assert_eq!(g.usage.map(|u| u.output_tokens), Some(4));
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_quota() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/messages")
            .with_status(429)
            .with_body(r#"{"error":{"type":"rate_limit_error"}}"#)
            .create_async()
            .await;

        let err = provider(server.url())
            .generate("hi", &GenerateOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Quota);
        assert!(err.is_transient());
        assert!(err.message.contains("rate_limit_error"));
    }

    #[test]
    fn test_json_option_goes_into_system_prompt() {
        let p = provider("http://localhost".into());
        let options = GenerateOptions {
            json: true,
            ..GenerateOptions::default()
        };
        let payload = p.payload("x", &options);
        assert!(payload["system"].as_str().unwrap().contains("JSON object"));
        assert!(payload.get("response_format").is_none());
    }
}
