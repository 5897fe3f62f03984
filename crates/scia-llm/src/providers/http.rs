use futures::stream::BoxStream;
use reqwest::{RequestBuilder, StatusCode};

use scia_core::config::ModelConfig;
use scia_core::error::{Result, SciaError};

use crate::streaming::{SseEvent, SseStream};

/// Sampling temperature to send, if any. Zero leaves the provider default.
pub(crate) fn temperature(config: &ModelConfig) -> Option<f32> {
    (config.temperature > 0.0).then_some(config.temperature)
}

/// Error for a non-success response. The status code stays in the message
/// so rate limits (`HTTP 429`) are recognised by the retry policy.
pub(crate) fn status_error(status: StatusCode, body: &str) -> SciaError {
    SciaError::LlmRequest(format!("HTTP {}: {}", status, body.trim()))
}

/// Post `body` with the configured extra headers and open the SSE response.
pub(crate) async fn open_event_stream(
    mut req: RequestBuilder,
    config: &ModelConfig,
    body: &serde_json::Value,
) -> Result<BoxStream<'static, SseEvent>> {
    for (k, v) in &config.extra_headers {
        req = req.header(k.as_str(), v.as_str());
    }

    let response = req
        .json(body)
        .send()
        .await
        .map_err(|e| SciaError::LlmRequest(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(status, &body));
    }

    Ok(Box::pin(SseStream::new(response.bytes_stream())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::is_rate_limited;

    #[test]
    fn too_many_requests_is_a_rate_limit() {
        let err = status_error(StatusCode::TOO_MANY_REQUESTS, "slow down\n");
        assert_eq!(
            err.to_string(),
            "LLM request failed: HTTP 429 Too Many Requests: slow down"
        );
        assert!(is_rate_limited(&err));
    }

    #[test]
    fn server_error_is_not_a_rate_limit() {
        let err = status_error(StatusCode::BAD_GATEWAY, "upstream");
        assert!(!is_rate_limited(&err));
    }

    #[test]
    fn zero_temperature_is_omitted() {
        let mut config = scia_test_utils::test_model_config();
        config.temperature = 0.0;
        assert_eq!(temperature(&config), None);
        config.temperature = 0.4;
        assert_eq!(temperature(&config), Some(0.4));
    }
}
