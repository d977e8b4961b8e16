//! Text-classification oracle.
//!
//! The oracle is an untrusted remote capability: it takes an instruction and
//! a message and answers with text that should be a JSON extraction record.
//! Parsing and validating that text is the extraction client's job.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::OracleConfig;
use crate::error::{ExtractionFailure, SentimentError};

/// Remote capability returning the raw extraction text for one message
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClassificationOracle: Send + Sync {
    /// Run `instruction` against `text`, returning the oracle's raw answer
    async fn classify(&self, instruction: &str, text: &str) -> Result<String, ExtractionFailure>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat-completions oracle
pub struct OpenAiOracle {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiOracle {
    /// Build the oracle from config. The HTTP client's own timeout matches
    /// the configured oracle timeout.
    pub fn new(config: &OracleConfig, api_key: String) -> Result<Self, SentimentError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn headers(&self) -> Result<HeaderMap, ExtractionFailure> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| ExtractionFailure::transport(format!("invalid API key header: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

fn transport_error(err: &reqwest::Error) -> ExtractionFailure {
    if err.is_timeout() {
        ExtractionFailure::timeout(err.to_string())
    } else {
        ExtractionFailure::transport(err.to_string())
    }
}

#[async_trait]
impl ClassificationOracle for OpenAiOracle {
    async fn classify(&self, instruction: &str, text: &str) -> Result<String, ExtractionFailure> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: instruction,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat { kind: "json_object" },
        };

        debug!(model = %self.model, "Oracle chat request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ExtractionFailure::transport(format!(
                "oracle returned {status}: {error_text}"
            )));
        }

        let body = response.text().await.map_err(|e| transport_error(&e))?;
        let chat: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| ExtractionFailure::malformed(format!("unexpected response envelope: {e}")))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ExtractionFailure::malformed("oracle response has no content"))
    }
}
