//! OpenAI-compatible `/chat/completions` client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CompletionError, CompletionRequest, CompletionService};

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Map a non-success HTTP status to a completion error.
pub(crate) fn classify_status(status: u16, body: String) -> CompletionError {
    if status == 429 || status >= 500 {
        CompletionError::Transient(format!("HTTP {}: {}", status, body))
    } else {
        CompletionError::Rejected { status, body }
    }
}

/// Raw HTTP client for any OpenAI-compatible endpoint.
///
/// Does no retrying and applies no per-call deadline; wrap it in
/// [`ResilientCompletion`](super::ResilientCompletion).
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompatClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model: model.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionService for OpenAiCompatClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let mut builder = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CompletionError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), body));
        }

        // Envelope decode failures are transport failures; the payload never
        // arrived intact.
        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Transient(format!("invalid response envelope: {}", e)))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| CompletionError::Transient("response contained no message".into()))?;

        debug!(
            stage = %request.stage,
            model = %self.model,
            response_len = content.len(),
            "Completion received"
        );
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use workflow_core::ModelStage;

    /// Serve one canned HTTP response on a local port; returns the base URL.
    async fn serve_once(status_line: &'static str, body: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            // Read headers, then the declared body length.
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if buf.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }
            let response = format!(
                "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{}", addr)
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new(ModelStage::Analysis, "system", "user", 0.3)
    }

    #[test]
    fn test_classify_status() {
        assert!(classify_status(503, String::new()).is_transient());
        assert!(classify_status(429, String::new()).is_transient());
        assert_eq!(
            classify_status(401, "nope".into()),
            CompletionError::Rejected {
                status: 401,
                body: "nope".into()
            }
        );
    }

    #[test]
    fn test_endpoint_normalization() {
        let client = OpenAiCompatClient::new("http://localhost:8000/v1/", None, "m").unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8000/v1/chat/completions");
    }

    #[tokio::test]
    async fn test_success_returns_message_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"{\"confidence\":0.8}"}}]}"#;
        let base = serve_once("HTTP/1.1 200 OK", body.to_string()).await;
        let client =
            OpenAiCompatClient::new(&base, Some("key".into()), "gpt-4-0125-preview").unwrap();
        let text = client.complete(&request()).await.unwrap();
        assert_eq!(text, r#"{"confidence":0.8}"#);
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let base = serve_once("HTTP/1.1 503 Service Unavailable", "{}".to_string()).await;
        let client = OpenAiCompatClient::new(&base, None, "m").unwrap();
        let err = client.complete(&request()).await.unwrap_err();
        assert!(err.is_transient(), "{err:?}");
    }

    #[tokio::test]
    async fn test_client_error_is_rejected() {
        let base = serve_once("HTTP/1.1 401 Unauthorized", r#"{"error":"bad key"}"#.to_string()).await;
        let client = OpenAiCompatClient::new(&base, None, "m").unwrap();
        let err = client.complete(&request()).await.unwrap_err();
        assert!(matches!(err, CompletionError::Rejected { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_empty_content_is_transient() {
        let body = r#"{"choices":[{"message":{"content":""}}]}"#;
        let base = serve_once("HTTP/1.1 200 OK", body.to_string()).await;
        let client = OpenAiCompatClient::new(&base, None, "m").unwrap();
        assert!(client.complete(&request()).await.unwrap_err().is_transient());
    }
}
