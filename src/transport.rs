use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("could not reach chat proxy: {0}")]
    Unreachable(#[from] reqwest::Error),
    #[error("chat proxy returned {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("chat proxy response had no answer")]
    MissingAnswer,
}

/// How the chat client reaches the proxy.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn ask(&self, query: &str) -> Result<String, TransportError>;
}

#[derive(Debug, Deserialize)]
struct ProxyBody {
    answer: Option<String>,
    error: Option<String>,
}

#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint: endpoint.into() })
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn ask(&self, query: &str) -> Result<String, TransportError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "query": query }))
            .send()
            .await?;
        let status = resp.status();
        let body: Option<ProxyBody> = resp.json().await.ok();
        if !status.is_success() {
            let message = body.and_then(|b| b.error).unwrap_or_else(|| status.to_string());
            return Err(TransportError::Rejected { status: status.as_u16(), message });
        }
        body.and_then(|b| b.answer).ok_or(TransportError::MissingAnswer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn spawn(status: StatusCode, reply: Value) -> String {
        let app = Router::new().route(
            "/api",
            post(move |Json(_): Json<Value>| {
                let reply = reply.clone();
                async move { (status, Json(reply)) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/api", addr)
    }

    #[tokio::test]
    async fn returns_answer() {
        let url = spawn(StatusCode::OK, json!({"answer": "hello"})).await;
        let t = HttpTransport::new(url, DEFAULT_CLIENT_TIMEOUT).unwrap();
        assert_eq!(t.ask("hi").await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn error_status_carries_envelope_message() {
        let url = spawn(StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "Failed to fetch response from Groq API."})).await;
        let t = HttpTransport::new(url, DEFAULT_CLIENT_TIMEOUT).unwrap();
        match t.ask("hi").await.unwrap_err() {
            TransportError::Rejected { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "Failed to fetch response from Groq API.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn success_without_answer_is_error() {
        let url = spawn(StatusCode::OK, json!({"result": "wrong field"})).await;
        let t = HttpTransport::new(url, DEFAULT_CLIENT_TIMEOUT).unwrap();
        assert!(matches!(t.ask("hi").await, Err(TransportError::MissingAnswer)));
    }

    #[tokio::test]
    async fn unreachable_proxy() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let t = HttpTransport::new(format!("http://{}/api", addr), Duration::from_secs(2)).unwrap();
        assert!(matches!(t.ask("hi").await, Err(TransportError::Unreachable(_))));
    }
}
