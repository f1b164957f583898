use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::config::{ProxyConfig, RequestShape};

/// Failure talking to the upstream LLM API. Details stay server-side.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("no upstream credential configured")]
    MissingCredential,
    #[error("upstream request timed out")]
    Timeout,
    #[error("upstream transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("upstream returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("upstream payload could not be decoded: {0}")]
    Decode(#[source] reqwest::Error),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e)
        } else {
            Self::Transport(e)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamReply {
    pub answer: Option<String>,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, query: &str) -> Result<UpstreamReply, UpstreamError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum UpstreamRequest<'a> {
    Chat { model: &'a str, messages: Vec<ChatMessage<'a>> },
    Query { query: &'a str },
}

#[derive(Debug, Deserialize)]
struct OaiChatResponse {
    #[serde(default)]
    choices: Vec<OaiChoice>,
}

#[derive(Debug, Deserialize)]
struct OaiChoice { message: OaiMessage }

#[derive(Debug, Deserialize)]
struct OaiMessage { content: Option<String> }

/// Pulls the answer text out of an upstream payload.
///
/// Accepts a top-level `result` string as well as the chat-completions
/// `choices[0].message.content` path. Empty strings are treated as missing.
pub fn extract_answer(payload: &Value) -> Option<String> {
    let direct = payload.get("result").and_then(Value::as_str).map(str::to_owned);
    let completion = || {
        serde_json::from_value::<OaiChatResponse>(payload.clone())
            .ok()
            .and_then(|r| r.choices.into_iter().next())
            .and_then(|c| c.message.content)
    };
    direct
        .filter(|s| !s.trim().is_empty())
        .or_else(|| completion().filter(|s| !s.trim().is_empty()))
}

/// Groq (OpenAI-compatible) chat-completions client.
#[derive(Clone)]
pub struct GroqChat {
    client: reqwest::Client,
    url: Url,
    api_key: Option<String>,
    model: String,
    system_prompt: String,
    shape: RequestShape,
}

impl GroqChat {
    pub fn from_config(cfg: &ProxyConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(UpstreamError::Transport)?;
        Ok(Self {
            client,
            url: cfg.upstream_url.clone(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            system_prompt: cfg.system_prompt.clone(),
            shape: cfg.request_shape,
        })
    }

    fn body<'a>(&'a self, query: &'a str) -> UpstreamRequest<'a> {
        match self.shape {
            RequestShape::Chat => UpstreamRequest::Chat {
                model: &self.model,
                messages: vec![
                    ChatMessage { role: "system", content: &self.system_prompt },
                    ChatMessage { role: "user", content: query },
                ],
            },
            RequestShape::Query => UpstreamRequest::Query { query },
        }
    }
}

#[async_trait]
impl LanguageModel for GroqChat {
    async fn complete(&self, query: &str) -> Result<UpstreamReply, UpstreamError> {
        let key = self.api_key.as_deref().ok_or(UpstreamError::MissingCredential)?;
        let resp = self
            .client
            .post(self.url.clone())
            .bearer_auth(key)
            .json(&self.body(query))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Status { status, body });
        }
        let payload: Value = resp.json().await?;
        Ok(UpstreamReply { answer: extract_answer(&payload) })
    }
}
