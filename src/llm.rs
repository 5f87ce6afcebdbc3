use async_stream::try_stream;
use futures_core::stream::Stream;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{env, pin::Pin};
use thiserror::Error;

/// Closed failure taxonomy for the provider boundary. Raw provider messages
/// are translated into one of these tags at the point of catching them; the
/// retry logic in `invoke` dispatches on the tag, never on message text.
/// `MalformedProviderOutput` marks undecodable provider payloads; the
/// security-report normalizer recovers that case locally instead of
/// surfacing it. `Exhausted` tags a whole-chain terminal failure
/// (`invoke::ChainFailure`) rather than a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    RateLimited,
    TimedOut,
    ModelUnavailable,
    InputTooLarge,
    MalformedProviderOutput,
    Exhausted,
    Unknown,
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    /// Tag a raw provider message. The substrings mirror what hosted model
    /// APIs actually put in their error bodies, checked in priority order.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        let kind = if lower.contains("rate") {
            ErrorKind::RateLimited
        } else if lower.contains("timeout") || lower.contains("timed out") {
            ErrorKind::TimedOut
        } else if lower.contains("token") {
            ErrorKind::InputTooLarge
        } else if lower.contains("model") {
            ErrorKind::ModelUnavailable
        } else {
            ErrorKind::Unknown
        };
        Self { kind, message }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }
}

/// One generation call against one model. Parameters arrive pre-clamped by
/// the invoker; adapters send them through as-is.
#[derive(Debug, Clone)]
pub struct GenerationCall {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub json_mode: bool,
}

pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// Capability handle for "generate text given model+params". The invoker is
/// handed one of these at construction time, so tests substitute a scripted
/// adapter and the CLI substitutes the offline mock.
#[async_trait::async_trait]
pub trait ModelProviderAdapter: Send + Sync {
    async fn generate(&self, call: GenerationCall) -> Result<String, ProviderError>;
    async fn generate_stream(&self, call: GenerationCall) -> Result<TextStream, ProviderError>;
}

/// OpenAI-compatible chat-completions client (OpenAI, Groq, local servers).
pub struct HttpAdapter {
    http: Client,
    api_base: String,
    configured_key: Option<String>,
}

impl HttpAdapter {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::new(ErrorKind::Unknown, e.to_string()))?;
        Ok(Self { http, api_base: api_base.into(), configured_key: None })
    }

    /// Key from the active profile; takes precedence over the env lookup.
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.configured_key = key;
        self
    }

    fn resolve_api_key(&self) -> Result<Option<String>, ProviderError> {
        if let Some(key) = self.configured_key.as_deref() {
            if !key.trim().is_empty() {
                return Ok(Some(key.to_string()));
            }
        }
        // Local servers need no key; hosted bases do.
        let (key, required) = if self.api_base.contains("api.groq.com") {
            (env::var("GROQ_API_KEY").ok(), true)
        } else if self.api_base.contains("127.0.0.1") || self.api_base.contains("localhost") {
            (env::var("LMSTUDIO_API_KEY").ok(), false)
        } else {
            (env::var("OPENAI_API_KEY").ok(), true)
        };
        if required && key.is_none() {
            return Err(ProviderError::new(
                ErrorKind::Unknown,
                format!("missing API key for base {}", self.api_base),
            ));
        }
        Ok(key)
    }

    async fn post_completion(
        &self,
        call: &GenerationCall,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        #[derive(Serialize)]
        struct ResponseFormat {
            r#type: &'static str,
        }

        #[derive(Serialize)]
        struct CompletionRequest<'a> {
            model: &'a str,
            messages: &'a [ChatMessage],
            temperature: f32,
            max_tokens: u32,
            stream: bool,
            #[serde(skip_serializing_if = "Option::is_none")]
            response_format: Option<ResponseFormat>,
        }

        let api_key = self.resolve_api_key()?;
        let url = format!("{}/chat/completions", self.api_base);
        let body = CompletionRequest {
            model: &call.model,
            messages: &call.messages,
            temperature: call.temperature,
            max_tokens: call.max_tokens,
            stream,
            response_format: call.json_mode.then_some(ResponseFormat { r#type: "json_object" }),
        };

        let mut rb = self.http.post(&url).json(&body);
        if let Some(key) = api_key.as_ref() {
            rb = rb.bearer_auth(key);
        }
        let resp = rb.send().await.map_err(translate_transport_error)?;
        if resp.status() != StatusCode::OK {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(translate_status_error(status, &text));
        }
        Ok(resp)
    }
}

fn translate_transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::new(ErrorKind::TimedOut, format!("request timed out: {}", e))
    } else {
        ProviderError::classify(e.to_string())
    }
}

fn translate_status_error(status: StatusCode, body: &str) -> ProviderError {
    let message = format!("provider error {}: {}", status, body);
    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::new(ErrorKind::RateLimited, message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            ProviderError::new(ErrorKind::TimedOut, message)
        }
        StatusCode::NOT_FOUND => ProviderError::new(ErrorKind::ModelUnavailable, message),
        StatusCode::PAYLOAD_TOO_LARGE => ProviderError::new(ErrorKind::InputTooLarge, message),
        // 400s carry the useful detail in the body ("model_decommissioned",
        // "context length ... tokens"); fall back to keyword tagging.
        _ => ProviderError::classify(message),
    }
}

#[async_trait::async_trait]
impl ModelProviderAdapter for HttpAdapter {
    async fn generate(&self, call: GenerationCall) -> Result<String, ProviderError> {
        #[derive(Deserialize)]
        struct ChoiceMessage {
            content: String,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: Option<ChoiceMessage>,
        }

        #[derive(Deserialize)]
        struct CompletionResponse {
            choices: Vec<Choice>,
        }

        let resp = self.post_completion(&call, false).await?;
        let parsed: CompletionResponse = resp.json().await.map_err(|e| {
            ProviderError::new(
                ErrorKind::MalformedProviderOutput,
                format!("decoding provider response: {}", e),
            )
        })?;
        let content = parsed
            .choices
            .first()
            .and_then(|c| c.message.as_ref())
            .map(|m| m.content.clone())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(ProviderError::new(ErrorKind::Unknown, "empty response received"));
        }
        Ok(content)
    }

    async fn generate_stream(&self, call: GenerationCall) -> Result<TextStream, ProviderError> {
        let resp = self.post_completion(&call, true).await?;

        // SSE lines of the form `data: {...}`; extract incremental content.
        let byte_stream = resp.bytes_stream();
        let s = try_stream! {
            use futures_util::StreamExt;
            futures_util::pin_mut!(byte_stream);
            while let Some(chunk) = byte_stream.next().await {
                let bytes = chunk.map_err(translate_transport_error)?;
                let text = String::from_utf8_lossy(&bytes);
                for line in text.lines() {
                    let line = line.trim();
                    if let Some(data) = line.strip_prefix("data: ") {
                        if data == "[DONE]" {
                            continue;
                        }
                        if let Some(piece) = extract_delta_content(data) {
                            yield piece;
                        }
                    }
                }
            }
        };
        Ok(Box::pin(s))
    }
}

/// Best-effort pull of the `"content"` field out of one SSE data line.
fn extract_delta_content(data: &str) -> Option<String> {
    let idx = data.find("\"content\":")?;
    let after = &data[idx + 10..];
    let start = after.find('"')?;
    let after = &after[start + 1..];
    let end = after.find('"')?;
    Some(after[..end].to_string())
}

pub fn api_base_for_provider(provider: &str) -> String {
    match provider.to_lowercase().as_str() {
        "groq" => "https://api.groq.com/openai/v1".to_string(),
        "lmstudio" => {
            env::var("LMSTUDIO_API_BASE").unwrap_or_else(|_| "http://127.0.0.1:1234/v1".to_string())
        }
        _ => "https://api.openai.com/v1".to_string(),
    }
}

/// Deterministic offline provider for tests and keyless runs. Responds with
/// the contents of `FIXI_MOCK_RESPONSE` when set, otherwise a fixed stub
/// carrying a fenced block so extraction paths stay exercised.
pub struct MockAdapter;

impl MockAdapter {
    fn response_text(&self) -> String {
        env::var("FIXI_MOCK_RESPONSE")
            .unwrap_or_else(|_| "[stub response]\n```\nfn example() {}\n```".to_string())
    }
}

#[async_trait::async_trait]
impl ModelProviderAdapter for MockAdapter {
    async fn generate(&self, _call: GenerationCall) -> Result<String, ProviderError> {
        Ok(self.response_text())
    }

    async fn generate_stream(&self, _call: GenerationCall) -> Result<TextStream, ProviderError> {
        let text = self.response_text();
        let s = try_stream! {
            for line in text.split_inclusive('\n') {
                yield line.to_string();
            }
        };
        Ok(Box::pin(s))
    }
}
