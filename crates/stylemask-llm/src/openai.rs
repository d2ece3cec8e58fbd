//! OpenAI-compatible chat-completions client.
//!
//! Any backend exposing the `{role, content}` message-array convention works:
//! ollama, llamafile, llama.cpp server, or the hosted OpenAI API.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::client::{GenerationRequest, ModelClient, ModelClientError, Result, TokenStream};

/// Placeholder key accepted by local OpenAI-compatible servers.
pub const NO_KEY_REQUIRED: &str = "sk-no-key-required";

pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: NO_KEY_REQUIRED.to_string(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }
}

/// Build the streaming chat request body for a [`GenerationRequest`].
///
/// Instructions go out as the system message, the running text as the user message.
pub fn build_completion_body(request: &GenerationRequest) -> Value {
    json!({
        "model": request.model,
        "messages": [
            { "role": "system", "content": request.instructions },
            { "role": "user", "content": request.input },
        ],
        "temperature": request.temperature,
        "seed": request.seed,
        "stream": true,
    })
}

// --- streaming chunk parsing ---

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, PartialEq)]
pub(crate) enum SseData {
    /// A content delta. Absent `content` fields decode to the empty string.
    Fragment(String),
    Done,
}

pub(crate) fn parse_sse_data(data: &str) -> Result<SseData> {
    if data.trim() == "[DONE]" {
        return Ok(SseData::Done);
    }

    let chunk: StreamChunk = serde_json::from_str(data)?;
    let content = chunk
        .choices
        .first()
        .and_then(|choice| choice.delta.content.clone())
        .unwrap_or_default();
    Ok(SseData::Fragment(content))
}

/// Decode an SSE response body into a [`TokenStream`] of content deltas.
///
/// Keep-alive events with empty data are skipped, `[DONE]` ends the content,
/// and transport or decode failures surface as `ModelClientError::Stream`.
fn decode_sse_response(response: reqwest::Response) -> TokenStream {
    let stream = response
        .bytes_stream()
        .eventsource()
        .filter_map(|event| async move {
            let data = match event {
                Ok(event) => event.data,
                Err(err) => return Some(Err(ModelClientError::Stream(err.to_string()))),
            };

            if data.trim().is_empty() {
                return None;
            }

            match parse_sse_data(&data) {
                Ok(SseData::Fragment(text)) => Some(Ok(text)),
                Ok(SseData::Done) => None,
                Err(err) => Some(Err(ModelClientError::Stream(err.to_string()))),
            }
        });

    Box::pin(stream)
}

#[async_trait]
impl ModelClient for OpenAiClient {
    async fn complete_stream(&self, request: &GenerationRequest) -> Result<TokenStream> {
        let body = build_completion_body(request);

        log::debug!(
            "POST {}/chat/completions model={} temperature={} seed={}",
            self.base_url,
            request.model,
            request.temperature,
            request.seed
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await?;
            return Err(ModelClientError::Api(format!("HTTP {}: {}", status, text)));
        }

        Ok(decode_sse_response(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> GenerationRequest {
        GenerationRequest::new("rewrite it", "The cat sat.", "test-model", 0.3, 42).unwrap()
    }

    async fn mount_sse(mock_server: &MockServer, body: &str) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body.to_string()),
            )
            .mount(mock_server)
            .await;
    }

    #[test]
    fn build_completion_body_includes_required_fields() {
        let body = build_completion_body(&request());

        assert_eq!(body["model"], "test-model");
        assert_eq!(body["stream"], true);
        assert_eq!(body["seed"], 42);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "rewrite it");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "The cat sat.");
    }

    #[test]
    fn parse_sse_data_content_delta_yields_fragment() {
        let data = r#"{"id":"chatcmpl_1","choices":[{"delta":{"content":"Hello"}}]}"#;
        assert_eq!(
            parse_sse_data(data).unwrap(),
            SseData::Fragment("Hello".to_string())
        );
    }

    #[test]
    fn parse_sse_data_absent_content_yields_empty_fragment() {
        let data = r#"{"id":"chatcmpl_1","choices":[{"delta":{}}]}"#;
        assert_eq!(
            parse_sse_data(data).unwrap(),
            SseData::Fragment(String::new())
        );
    }

    #[test]
    fn parse_sse_data_no_choices_yields_empty_fragment() {
        let data = r#"{"id":"chatcmpl_1","choices":[]}"#;
        assert_eq!(
            parse_sse_data(data).unwrap(),
            SseData::Fragment(String::new())
        );
    }

    #[test]
    fn parse_sse_data_done_with_whitespace() {
        assert_eq!(parse_sse_data("  [DONE]  ").unwrap(), SseData::Done);
    }

    #[test]
    fn parse_sse_data_invalid_json_errors() {
        assert!(parse_sse_data("{invalid json}").is_err());
    }

    #[tokio::test]
    async fn complete_stream_yields_fragments_until_done() {
        let mock_server = MockServer::start().await;

        let sse_body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n",
            "\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n",
            "\n",
            "data: [DONE]\n",
            "\n",
        );

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "model": "test-model",
                "stream": true,
                "seed": 42,
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_body),
            )
            .mount(&mock_server)
            .await;

        let client = OpenAiClient::new(mock_server.uri());
        let mut stream = client.complete_stream(&request()).await.unwrap();

        let mut out = String::new();
        while let Some(item) = stream.next().await {
            out.push_str(&item.unwrap());
        }

        assert_eq!(out, "Hello world");
    }

    #[tokio::test]
    async fn complete_stream_skips_keep_alive_events() {
        let mock_server = MockServer::start().await;

        let sse_body = concat!(
            "data: \n",
            "\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"only\"}}]}\n",
            "\n",
            "data: [DONE]\n",
            "\n",
        );
        mount_sse(&mock_server, sse_body).await;

        let client = OpenAiClient::new(mock_server.uri());
        let mut stream = client.complete_stream(&request()).await.unwrap();

        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.push(item.unwrap());
        }

        assert_eq!(out, vec!["only"]);
    }

    #[tokio::test]
    async fn complete_stream_maps_malformed_chunk_to_stream_error() {
        let mock_server = MockServer::start().await;

        let sse_body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"good\"}}]}\n",
            "\n",
            "data: {not json}\n",
            "\n",
        );
        mount_sse(&mock_server, sse_body).await;

        let client = OpenAiClient::new(mock_server.uri());
        let mut stream = client.complete_stream(&request()).await.unwrap();

        let first = stream.next().await.expect("first item");
        assert_eq!(first.unwrap(), "good");

        let second = stream.next().await.expect("second item");
        match second {
            Err(ModelClientError::Stream(_)) => {}
            Ok(fragment) => panic!("expected stream error, got fragment: {fragment:?}"),
            Err(other) => panic!("expected ModelClientError::Stream, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn complete_stream_non_2xx_is_api_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("backend down"))
            .mount(&mock_server)
            .await;

        let client = OpenAiClient::new(mock_server.uri());
        let result = client.complete_stream(&request()).await;

        match result {
            Err(ModelClientError::Api(msg)) => {
                assert!(msg.contains("500"));
                assert!(msg.contains("backend down"));
            }
            Err(other) => panic!("expected ModelClientError::Api, got {other:?}"),
            Ok(_) => panic!("expected an error, got a stream"),
        }
    }
}
