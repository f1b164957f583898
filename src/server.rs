use axum::body::Bytes;
use axum::extract::{rejection::BytesRejection, State};
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use axum::{routing::any, Json, Router};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::models::LanguageModel;
use crate::proxy;

#[derive(Clone)]
pub struct AppState {
    pub model: Arc<dyn LanguageModel>,
}

impl AppState {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

/// An unreadable body (too large, aborted) is handed on as empty so the
/// reply still carries the JSON error envelope.
async fn chat_proxy(
    State(state): State<AppState>,
    method: Method,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = body.unwrap_or_else(|rejection| {
        tracing::warn!(error = %rejection, "request body rejected");
        Bytes::new()
    });
    let reply = proxy::handle(&method, &body, state.model.as_ref()).await;
    (reply.status, Json(reply.payload)).into_response()
}

/// `/api` is the serverless path, `/api/query` the standalone-server path.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api", any(chat_proxy))
        .route("/api/query", any(chat_proxy))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "chat proxy listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
