use axum::http::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use crate::models::LanguageModel;

pub const FALLBACK_ANSWER: &str = "Sorry, I couldn't understand that.";
pub const QUERY_REQUIRED: &str = "Query is required";
pub const METHOD_NOT_ALLOWED: &str = "Method not allowed";
pub const UPSTREAM_FAILED: &str = "Failed to fetch response from Groq API.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ProxyPayload {
    Answer { answer: String },
    Error { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyReply {
    pub status: StatusCode,
    pub payload: ProxyPayload,
}

impl ProxyReply {
    fn answer(answer: String) -> Self {
        Self { status: StatusCode::OK, payload: ProxyPayload::Answer { answer } }
    }

    fn error(status: StatusCode, msg: &str) -> Self {
        Self { status, payload: ProxyPayload::Error { error: msg.into() } }
    }
}

#[derive(Debug, Deserialize)]
struct QueryBody {
    query: Option<serde_json::Value>,
}

fn parse_query(body: &[u8]) -> Option<String> {
    let parsed: QueryBody = serde_json::from_slice(body).ok()?;
    let query = parsed.query?.as_str()?.to_owned();
    (!query.trim().is_empty()).then_some(query)
}

/// Chat proxy handler shared by every HTTP adapter.
///
/// Non-POST requests get 405 and bad bodies get 400 without touching the
/// upstream. Upstream failures are logged here and collapse into one generic
/// 500 so nothing from the provider leaks to the caller.
pub async fn handle(method: &Method, body: &[u8], model: &dyn LanguageModel) -> ProxyReply {
    let reply = dispatch(method, body, model).await;
    metrics::counter!("proxy_requests_total", "status" => reply.status.as_u16().to_string()).increment(1);
    reply
}

async fn dispatch(method: &Method, body: &[u8], model: &dyn LanguageModel) -> ProxyReply {
    if *method != Method::POST {
        return ProxyReply::error(StatusCode::METHOD_NOT_ALLOWED, METHOD_NOT_ALLOWED);
    }
    let Some(query) = parse_query(body) else {
        return ProxyReply::error(StatusCode::BAD_REQUEST, QUERY_REQUIRED);
    };

    match model.complete(&query).await {
        Ok(reply) => {
            if reply.answer.is_none() {
                tracing::warn!("upstream payload had no answer; using fallback");
            }
            ProxyReply::answer(reply.answer.unwrap_or_else(|| FALLBACK_ANSWER.into()))
        }
        Err(e) => {
            tracing::error!(error = %e, "upstream chat request failed");
            ProxyReply::error(StatusCode::INTERNAL_SERVER_ERROR, UPSTREAM_FAILED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{UpstreamError, UpstreamReply};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Script {
        Answer(Option<&'static str>),
        Fail,
    }

    struct MockModel {
        script: Script,
        calls: AtomicUsize,
    }

    impl MockModel {
        fn new(script: Script) -> Self { Self { script, calls: AtomicUsize::new(0) } }
        fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
    }

    #[async_trait]
    impl LanguageModel for MockModel {
        async fn complete(&self, _query: &str) -> Result<UpstreamReply, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script {
                Script::Answer(a) => Ok(UpstreamReply { answer: a.map(str::to_owned) }),
                Script::Fail => Err(UpstreamError::Status {
                    status: reqwest::StatusCode::BAD_GATEWAY,
                    body: "secret upstream detail".into(),
                }),
            }
        }
    }

    #[tokio::test]
    async fn answers_valid_query() {
        let model = MockModel::new(Script::Answer(Some("X")));
        for q in ["hello", "Tell me about your projects", "ünïcode?"] {
            let body = serde_json::json!({ "query": q }).to_string();
            let reply = handle(&Method::POST, body.as_bytes(), &model).await;
            assert_eq!(reply.status, StatusCode::OK);
            assert_eq!(reply.payload, ProxyPayload::Answer { answer: "X".into() });
        }
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn missing_or_empty_query_is_rejected_before_upstream() {
        let model = MockModel::new(Script::Answer(Some("X")));
        let bodies: [&[u8]; 6] = [br#"{}"#, br#"{"query":""}"#, br#"{"query":"   "}"#, br#"{"query":null}"#, br#"{"query":7}"#, b"not json"];
        for body in bodies {
            let reply = handle(&Method::POST, body, &model).await;
            assert_eq!(reply.status, StatusCode::BAD_REQUEST);
            assert_eq!(reply.payload, ProxyPayload::Error { error: QUERY_REQUIRED.into() });
        }
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn non_post_methods_are_rejected() {
        let model = MockModel::new(Script::Answer(Some("X")));
        for m in [Method::GET, Method::PUT, Method::DELETE] {
            let reply = handle(&m, br#"{"query":"hi"}"#, &model).await;
            assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);
        }
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn missing_answer_uses_fallback() {
        let model = MockModel::new(Script::Answer(None));
        let reply = handle(&Method::POST, br#"{"query":"hi"}"#, &model).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.payload, ProxyPayload::Answer { answer: FALLBACK_ANSWER.into() });
    }

    #[tokio::test]
    async fn upstream_failure_is_generic_500() {
        let model = MockModel::new(Script::Fail);
        let reply = handle(&Method::POST, br#"{"query":"hi"}"#, &model).await;
        assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(reply.payload, ProxyPayload::Error { error: UPSTREAM_FAILED.into() });
        let wire = serde_json::to_string(&reply.payload).unwrap();
        assert!(!wire.contains("secret"));
    }

    #[test]
    fn payload_wire_shapes() {
        let a = serde_json::to_value(ProxyPayload::Answer { answer: "a".into() }).unwrap();
        assert_eq!(a, serde_json::json!({"answer": "a"}));
        let e = serde_json::to_value(ProxyPayload::Error { error: "e".into() }).unwrap();
        assert_eq!(e, serde_json::json!({"error": "e"}));
    }
}
