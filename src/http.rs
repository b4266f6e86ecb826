use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::{AuthConfig, Config};
use crate::dispatch::Dispatcher;
use crate::error::{LogDrainError, Result};
use crate::ingest::IngestPipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestPipeline>,
    pub dispatcher: Arc<Dispatcher>,
    pub auth: Arc<AuthConfig>,
}

impl IntoResponse for LogDrainError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            LogDrainError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            LogDrainError::InvalidSignature => {
                (StatusCode::UNAUTHORIZED, "Invalid signature".to_string())
            }
            LogDrainError::InvalidPayload(msg) | LogDrainError::InvalidParams(msg) => {
                (StatusCode::BAD_REQUEST, msg)
            }
            LogDrainError::ToolNotFound(name) => {
                (StatusCode::NOT_FOUND, format!("tool not found: {name}"))
            }
            other => {
                // Internal detail stays in the server log.
                error!("request failed: {other}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

async fn vercel_drain(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> std::result::Result<Response, LogDrainError> {
    let signature = headers
        .get("x-vercel-signature")
        .and_then(|v| v.to_str().ok());
    let receipt = state.pipeline.ingest_webhook(&body, signature).await?;
    Ok(with_verify_header(
        &state,
        (StatusCode::OK, Json(receipt)).into_response(),
    ))
}

/// Probe answer on a read-only method: the platform checks reachability
/// before enabling delivery, expecting the verify token header back.
async fn vercel_probe(State(state): State<AppState>) -> Response {
    with_verify_header(
        &state,
        (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response(),
    )
}

async fn gigalixir_drain(
    State(state): State<AppState>,
    body: String,
) -> std::result::Result<Response, LogDrainError> {
    let receipt = state.pipeline.ingest_syslog(body).await?;
    Ok((StatusCode::OK, Json(receipt)).into_response())
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    limit: Option<i64>,
}

/// Convenience query endpoint; routed through the dispatcher so it shares
/// the tool validation path.
async fn api_logs(
    State(state): State<AppState>,
    Query(q): Query<LogsQuery>,
) -> std::result::Result<Response, LogDrainError> {
    let args = match q.limit {
        Some(limit) => json!({ "limit": limit }),
        None => json!({}),
    };
    let output = state.dispatcher.dispatch("logs.recent", &args).await?;
    Ok((StatusCode::OK, Json(output)).into_response())
}

/// Shared-credential gate over the ingestion routes. The basic-auth
/// password is compared against the configured drain token; the username is
/// not significant.
async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.auth.drain_token.as_deref() else {
        return next.run(request).await;
    };
    match basic_auth_password(request.headers()) {
        Some(password) if password == expected => next.run(request).await,
        _ => LogDrainError::Unauthorized.into_response(),
    }
}

fn basic_auth_password(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = BASE64.decode(encoded).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;
    credentials
        .split_once(':')
        .map(|(_, password)| password.to_string())
}

fn with_verify_header(state: &AppState, mut response: Response) -> Response {
    if let Some(token) = state.auth.verify_token.as_deref() {
        if let Ok(value) = HeaderValue::from_str(token) {
            response.headers_mut().insert("x-vercel-verify", value);
        }
    }
    response
}

pub fn build_router(state: AppState) -> Router {
    let drains = Router::new()
        .route("/logs/vercel", post(vercel_drain).get(vercel_probe))
        .route("/logs/gigalixir", post(gigalixir_drain))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(drains)
        .route("/api/logs", get(api_logs))
        .with_state(state)
}

pub async fn serve_http(config: &Config, state: AppState) -> Result<()> {
    if state.auth.drain_token.is_none() {
        warn!("no drain token configured; ingestion endpoints are unauthenticated");
    }
    if state.auth.drain_secret.is_none() {
        warn!("no drain secret configured; webhook signatures are not verified");
    }

    let addr = format!(
        "{}:{}",
        config
            .server
            .http_addr
            .clone()
            .unwrap_or_else(|| "0.0.0.0".to_string()),
        config.server.http_port.unwrap_or(3000)
    );
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| LogDrainError::ConfigError(format!("bind {addr} failed: {e}")))?;
    info!("log drain listening on http://{addr}");
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}
