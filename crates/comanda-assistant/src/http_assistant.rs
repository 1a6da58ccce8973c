//! HTTP assistant client.
//!
//! Talks to the restaurant chatbot API:
//! `POST {api_base}/chat?phone=<id>` with
//! `{"messages":[{"role":"user","content":"..."}]}` and expects
//! `200 {"content":"..."}` back.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use comanda_core::config::schema::AssistantConfig;

use crate::traits::{AssistantClient, AssistantError};

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

// ─────────────────────────────────────────────
// HttpAssistant
// ─────────────────────────────────────────────

/// Assistant reached over HTTP with `reqwest`.
pub struct HttpAssistant {
    /// HTTP client (shared, connection-pooled).
    client: reqwest::Client,
    /// API base URL (e.g. `"http://localhost:8000/api/v1/chatbot"`).
    api_base: String,
    /// Per-request timeout.
    timeout: Duration,
    /// Extra headers to send with each request.
    extra_headers: HeaderMap,
}

impl std::fmt::Debug for HttpAssistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAssistant")
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpAssistant {
    /// Build a client from the assistant config.
    pub fn new(config: &AssistantConfig) -> Result<Self, AssistantError> {
        let mut extra_headers = HeaderMap::new();
        if let Some(ref headers) = config.extra_headers {
            for (key, value) in headers {
                if let (Ok(name), Ok(val)) = (
                    HeaderName::from_bytes(key.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    extra_headers.insert(name, val);
                } else {
                    warn!("Invalid header: {}={}", key, value);
                }
            }
        }

        let timeout = config.timeout();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AssistantError::Transport(e.to_string()))?;

        Ok(HttpAssistant {
            client,
            api_base: config.api_base.clone(),
            timeout,
            extra_headers,
        })
    }

    /// Build the full chat URL.
    fn chat_url(&self) -> String {
        let base = self.api_base.trim_end_matches('/');
        format!("{}/chat", base)
    }
}

#[async_trait]
impl AssistantClient for HttpAssistant {
    async fn ask(&self, identifier: &str, text: &str) -> Result<String, AssistantError> {
        let body = ChatRequest {
            messages: vec![ChatMessage {
                role: "user",
                content: text,
            }],
        };

        debug!(phone = %identifier, content_len = text.len(), "calling assistant");

        let result = self
            .client
            .post(self.chat_url())
            .query(&[("phone", identifier)])
            .headers(self.extra_headers.clone())
            .json(&body)
            .send()
            .await;

        let response = match result {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => {
                warn!(phone = %identifier, timeout = ?self.timeout, "assistant request timed out");
                return Err(AssistantError::Timeout(self.timeout));
            }
            Err(e) => {
                error!(phone = %identifier, error = %e, "assistant request failed");
                return Err(AssistantError::Transport(e.to_string()));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(phone = %identifier, status = %status, body = %body, "assistant API error");
            return Err(AssistantError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply = match response.json::<ChatReply>().await {
            Ok(reply) => reply,
            Err(e) if e.is_timeout() => return Err(AssistantError::Timeout(self.timeout)),
            Err(e) => {
                error!(phone = %identifier, error = %e, "failed to parse assistant reply");
                return Err(AssistantError::Decode(e.to_string()));
            }
        };

        match reply.content {
            Some(content) if !content.trim().is_empty() => {
                debug!(phone = %identifier, reply_len = content.len(), "assistant reply received");
                Ok(content)
            }
            _ => Err(AssistantError::EmptyReply),
        }
    }

    fn display_name(&self) -> &str {
        "http-assistant"
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_config(api_base: &str, timeout_ms: u64) -> AssistantConfig {
        AssistantConfig {
            api_base: api_base.to_string(),
            timeout_ms,
            extra_headers: None,
        }
    }

    // ── Unit tests ──

    #[test]
    fn test_chat_url_trailing_slash() {
        let config = make_config("http://localhost:8000/api/v1/chatbot/", 1000);
        let assistant = HttpAssistant::new(&config).unwrap();
        assert_eq!(assistant.chat_url(), "http://localhost:8000/api/v1/chatbot/chat");
    }

    #[test]
    fn test_chat_url_no_trailing_slash() {
        let config = make_config("http://localhost:8000/api/v1/chatbot", 1000);
        let assistant = HttpAssistant::new(&config).unwrap();
        assert_eq!(assistant.chat_url(), "http://localhost:8000/api/v1/chatbot/chat");
    }

    #[test]
    fn test_extra_headers() {
        let mut headers = HashMap::new();
        headers.insert("X-Api-Key".to_string(), "secret".to_string());
        let config = AssistantConfig {
            extra_headers: Some(headers),
            ..make_config("http://localhost", 1000)
        };
        let assistant = HttpAssistant::new(&config).unwrap();
        assert!(assistant.extra_headers.contains_key("x-api-key"));
    }

    // ── Integration tests with mock server ──

    #[tokio::test]
    async fn test_ask_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat"))
            .and(query_param("phone", "573001112233"))
            .and(body_json(serde_json::json!({
                "messages": [
                    { "role": "user", "content": "hola\nquiero 2 hamburguesas" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": "¡Claro! ¿Algo más?"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let assistant = HttpAssistant::new(&make_config(&mock_server.uri(), 2000)).unwrap();
        let reply = assistant
            .ask("573001112233", "hola\nquiero 2 hamburguesas")
            .await
            .unwrap();

        assert_eq!(reply, "¡Claro! ¿Algo más?");
    }

    #[tokio::test]
    async fn test_ask_sends_extra_headers() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat"))
            .and(header("X-Api-Key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": "ok"
            })))
            .mount(&mock_server)
            .await;

        let mut headers = HashMap::new();
        headers.insert("X-Api-Key".to_string(), "secret".to_string());
        let config = AssistantConfig {
            extra_headers: Some(headers),
            ..make_config(&mock_server.uri(), 2000)
        };

        let assistant = HttpAssistant::new(&config).unwrap();
        assert_eq!(assistant.ask("1", "hi").await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_ask_non_success_is_error_without_retry() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let assistant = HttpAssistant::new(&make_config(&mock_server.uri(), 2000)).unwrap();
        let err = assistant.ask("1", "hola").await.unwrap_err();

        match err {
            AssistantError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ask_times_out() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "content": "late" }))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&mock_server)
            .await;

        let assistant = HttpAssistant::new(&make_config(&mock_server.uri(), 200)).unwrap();

        let started = std::time::Instant::now();
        let err = assistant.ask("1", "hola").await.unwrap_err();

        assert!(matches!(err, AssistantError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_ask_missing_content() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&mock_server)
            .await;

        let assistant = HttpAssistant::new(&make_config(&mock_server.uri(), 2000)).unwrap();
        let err = assistant.ask("1", "hola").await.unwrap_err();
        assert!(matches!(err, AssistantError::EmptyReply));
    }

    #[tokio::test]
    async fn test_ask_invalid_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&mock_server)
            .await;

        let assistant = HttpAssistant::new(&make_config(&mock_server.uri(), 2000)).unwrap();
        let err = assistant.ask("1", "hola").await.unwrap_err();
        assert!(matches!(err, AssistantError::Decode(_)));
    }

    #[tokio::test]
    async fn test_ask_network_error() {
        // Point to a port that's not listening
        let assistant = HttpAssistant::new(&make_config("http://127.0.0.1:1", 2000)).unwrap();
        let err = assistant.ask("1", "hola").await.unwrap_err();
        assert!(matches!(err, AssistantError::Transport(_)));
    }
}
