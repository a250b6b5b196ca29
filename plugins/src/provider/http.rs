use std::future::Future;
use std::time::Duration;

use forge_core::error::{ProviderError, ProviderErrorKind};
use forge_core::executor::traits::RetryStrategyPlugin;
use serde_json::Value;

const BODY_PREVIEW_LIMIT: usize = 512;

pub(crate) fn preview_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    let mut out = String::new();
    let mut truncated = false;
    for (idx, ch) in trimmed.chars().enumerate() {
        if idx >= BODY_PREVIEW_LIMIT {
            truncated = true;
            break;
        }
        out.push(ch);
    }

    if truncated {
        out.push_str("...");
    }

    out
}

pub(crate) fn from_reqwest(err: reqwest::Error) -> ProviderError {
    let kind = if err.is_timeout() {
        ProviderErrorKind::Timeout
    } else if err.is_connect() {
        ProviderErrorKind::Connect
    } else if err.is_decode() {
        ProviderErrorKind::Decode
    } else {
        ProviderErrorKind::Request
    };
    let error = ProviderError::new(kind, err.to_string());
    match err.status() {
        Some(status) => error.with_status(status.as_u16()),
        None => error,
    }
}

/// Sends `req` and returns the decoded JSON body of a 2xx response.
pub(crate) async fn send_json(req: reqwest::RequestBuilder) -> Result<Value, ProviderError> {
    let resp = req.send().await.map_err(from_reqwest)?;
    let status = resp.status();
    let retry_after = retry_after(resp.headers());
    let body = resp.text().await.map_err(from_reqwest)?;

    if !status.is_success() {
        let err = ProviderError::from_status(status.as_u16(), preview_body(&body));
        return Err(match retry_after {
            Some(wait) => err.with_retry_after(wait),
            None => err,
        });
    }

    serde_json::from_str::<Value>(&body).map_err(|err| {
        ProviderError::new(
            ProviderErrorKind::Decode,
            format!("failed to decode response body: {} | body={}", err, preview_body(&body)),
        )
        .with_status(status.as_u16())
    })
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Runs `call` until it succeeds, fails permanently, or the strategy gives up.
pub(crate) async fn with_retry<T, F, Fut>(
    provider: &str,
    retry: &dyn RetryStrategyPlugin,
    mut call: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempts = 0u32;
    loop {
        let err = match call().await {
            Ok(v) => return Ok(v),
            Err(err) => err,
        };
        attempts += 1;

        if !retry.should_retry(attempts, &err) {
            return Err(err);
        }
        let Some(delay) = retry.delay_for(attempts - 1, &err) else {
            tracing::debug!(
                target: "forge.provider",
                provider,
                attempt = attempts,
                retry_after_ms = err.retry_after.map(|d| d.as_millis() as u64),
                "retry budget exhausted"
            );
            return Err(err);
        };
        tracing::warn!(
            target: "forge.provider",
            provider,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            strategy = retry.name(),
            error = %err,
            "transient provider failure; retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Reads the API key from `env`, if one is configured.
pub(crate) fn resolve_api_key(env: Option<&str>) -> anyhow::Result<Option<String>> {
    let Some(var) = env.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(Some(key)),
        Ok(_) | Err(std::env::VarError::NotPresent) => {
            anyhow::bail!("environment variable {var} is not set")
        }
        Err(e) => Err(anyhow::Error::new(e).context(format!("read {var}"))),
    }
}

pub(crate) fn normalized_url(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::executor::NoRetry;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Immediate(u32);

    impl RetryStrategyPlugin for Immediate {
        fn name(&self) -> &str {
            "immediate"
        }

        fn next_delay(&self, _attempt: u32) -> Option<Duration> {
            Some(Duration::ZERO)
        }

        fn max_attempts(&self) -> u32 {
            self.0
        }
    }

    #[test]
    fn test_preview_body_truncates() {
        assert_eq!(preview_body("   "), "<empty body>");
        let preview = preview_body(&"a".repeat(BODY_PREVIEW_LIMIT + 10));
        assert!(preview.ends_with("..."));
        assert_eq!(preview.len(), BODY_PREVIEW_LIMIT + 3);
    }

    #[tokio::test]
    async fn test_with_retry_stops_on_fatal_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry("p", &Immediate(5), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::from_status(401, "denied"))
        })
        .await;

        assert_eq!(result.unwrap_err().kind, ProviderErrorKind::Auth);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_recovers_from_transient_error() {
        let calls = AtomicU32::new(0);
        let result = with_retry("p", &Immediate(3), || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ProviderError::from_status(503, "busy"))
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_retry_makes_one_call() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry("p", &NoRetry, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::new(ProviderErrorKind::Timeout, "slow"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_send_json_reads_retry_after() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/x")
            .with_status(429)
            .with_header("retry-after", "7")
            .with_body("slow down")
            .create_async()
            .await;

        let req = reqwest::Client::new().post(format!("{}/x", server.url()));
        let err = send_json(req).await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Quota);
        assert_eq!(err.retry_after, Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_retry_after_ignores_http_dates() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::RETRY_AFTER,
            reqwest::header::HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn test_resolve_api_key() {
        assert_eq!(resolve_api_key(None).unwrap(), None);
        assert!(resolve_api_key(Some("FORGE_TEST_SURELY_UNSET_KEY")).is_err());
    }
}
