//! OpenAI-compatible chat completion provider (`/v1/chat/completions`).
//!
//! One round-trip per call: the full conversation goes up, the first
//! choice's text comes back. All OpenAI wire types are private to this
//! module. History handling belongs to the chat agent; this provider is
//! stateless.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::llm::{ChatMessage, ProviderError};

const COMPLETIONS_PATH: &str = "/v1/chat/completions";

// ── Public provider ───────────────────────────────────────────────────────────

/// Adapter for any HTTP endpoint implementing `/v1/chat/completions`.
///
/// Constructed once at startup, then cheaply cloned because
/// `reqwest::Client` is an `Arc` internally.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    api_key: String,
}

impl OpenAiCompatibleProvider {
    /// `base_url` is the server root (e.g. `https://api.openai.com`).
    /// The whole request, body included, is aborted after `timeout_ms`.
    pub fn new(
        base_url: String,
        model: String,
        temperature: f32,
        max_tokens: u32,
        timeout_ms: u64,
        api_key: String,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;

        let endpoint = format!("{}{COMPLETIONS_PATH}", base_url.trim_end_matches('/'));
        Ok(Self { client, endpoint, model, temperature, max_tokens, api_key })
    }

    pub fn default_model(&self) -> &str {
        &self.model
    }

    /// Send `messages` and return the first choice's content as-is, even
    /// when it is empty. Only a missing choice or content is an error.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        model: Option<&str>,
    ) -> Result<String, ProviderError> {
        let payload = ChatCompletionRequest {
            model: model.unwrap_or(&self.model),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!(
            model = %payload.model,
            messages = messages.len(),
            "sending LLM request"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full LLM request payload");
        }

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(url = %self.endpoint, error = %e, timeout = e.is_timeout(), "LLM HTTP request failed (transport)");
                transport_error(e)
            })?;

        let response = check_status(response).await?;

        let parsed = response.json::<ChatCompletionResponse>().await.map_err(|e| {
            error!(error = %e, "failed to deserialize LLM response");
            if e.is_timeout() {
                ProviderError::Timeout
            } else {
                ProviderError::Request(format!("failed to parse response body: {e}"))
            }
        })?;

        debug!(choices = parsed.choices.len(), "received LLM response");
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&parsed)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(response = %json, "full LLM response payload");
        }

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(ProviderError::EmptyResponse)
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Request(e.to_string())
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// Error envelope used by OpenAI and compatible APIs.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Return the response if successful, otherwise an [`ProviderError::Http`]
/// carrying the envelope's `error.message`, the status text, or the body.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.map_err(transport_error)?;

    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .ok()
        .and_then(|env| env.error.message)
        .filter(|m| !m.is_empty())
        .or_else(|| status.canonical_reason().map(str::to_string))
        .unwrap_or(body);

    error!(%status, %message, "LLM request returned HTTP error");
    Err(ProviderError::Http { status: status.as_u16(), message })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    use super::*;

    type Seen = Arc<Mutex<Vec<(HeaderMap, Value)>>>;

    async fn spawn_stub(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn provider(base_url: String, timeout_ms: u64) -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new(base_url, "test-model".into(), 0.7, 2048, timeout_ms, "sk-test".into())
            .unwrap()
    }

    async fn record(
        State(seen): State<Seen>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        seen.lock().unwrap().push((headers, body));
        Json(json!({ "choices": [ { "message": { "role": "assistant", "content": "line one\nline two" } } ] }))
    }

    #[test]
    fn endpoint_appends_completions_path() {
        let p = provider("https://api.openai.com/".into(), 1000);
        assert_eq!(p.endpoint, "https://api.openai.com/v1/chat/completions");
    }

    #[tokio::test]
    async fn sends_history_and_returns_first_choice() {
        let seen: Seen = Arc::default();
        let app = Router::new()
            .route("/v1/chat/completions", post(record))
            .with_state(seen.clone());
        let p = provider(spawn_stub(app).await, 5_000);

        let history = [ChatMessage::system("sys"), ChatMessage::user("hello")];
        let reply = p.complete(&history, None).await.unwrap();
        assert_eq!(reply, "line one\nline two");

        let seen = seen.lock().unwrap();
        let (headers, body) = &seen[0];
        assert_eq!(headers["authorization"], "Bearer sk-test");
        assert!(headers["content-type"].to_str().unwrap().starts_with("application/json"));
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["max_tokens"], 2048);
        assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert_eq!(
            body["messages"],
            json!([{ "role": "system", "content": "sys" }, { "role": "user", "content": "hello" }])
        );
    }

    #[tokio::test]
    async fn model_override_is_sent() {
        let seen: Seen = Arc::default();
        let app = Router::new()
            .route("/v1/chat/completions", post(record))
            .with_state(seen.clone());
        let p = provider(spawn_stub(app).await, 5_000);

        p.complete(&[ChatMessage::system("s")], Some("other-model")).await.unwrap();
        assert_eq!(seen.lock().unwrap()[0].1["model"], "other-model");
    }

    #[tokio::test]
    async fn http_error_uses_envelope_message() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": { "message": "bad key" } })))
            }),
        );
        let p = provider(spawn_stub(app).await, 5_000);

        match p.complete(&[ChatMessage::system("s")], None).await {
            Err(ProviderError::Http { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "bad key");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_error_without_envelope_uses_status_text() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "upstream down") }),
        );
        let p = provider(spawn_stub(app).await, 5_000);

        let err = p.complete(&[ChatMessage::system("s")], None).await.unwrap_err();
        assert_eq!(err.reply_text(), "Service Unavailable");
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Json(json!({ "choices": [] }))
            }),
        );
        let p = provider(spawn_stub(app).await, 50);

        let err = p.complete(&[ChatMessage::system("s")], None).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout), "got {err:?}");
    }

    #[tokio::test]
    async fn empty_choices_is_empty_response() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { Json(json!({ "choices": [] })) }),
        );
        let p = provider(spawn_stub(app).await, 5_000);

        let err = p.complete(&[ChatMessage::system("s")], None).await.unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse));
    }

    #[tokio::test]
    async fn empty_content_is_returned_unchanged() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { Json(json!({ "choices": [ { "message": { "role": "assistant", "content": "  " } } ] })) }),
        );
        let p = provider(spawn_stub(app).await, 5_000);

        assert_eq!(p.complete(&[ChatMessage::system("s")], None).await.unwrap(), "  ");
    }

    #[tokio::test]
    async fn null_content_is_empty_response() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { Json(json!({ "choices": [ { "message": { "role": "assistant", "content": null } } ] })) }),
        );
        let p = provider(spawn_stub(app).await, 5_000);

        let err = p.complete(&[ChatMessage::system("s")], None).await.unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse));
    }

    #[tokio::test]
    async fn unreachable_server_is_request_error() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let p = provider(format!("http://{addr}"), 5_000);

        let err = p.complete(&[ChatMessage::system("s")], None).await.unwrap_err();
        assert!(matches!(err, ProviderError::Request(_)), "got {err:?}");
    }
}
