use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State, rejection::BytesRejection},
    http::StatusCode,
    routing::get,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use handoff::{MemoryStore, ParseResult, Resolved, StoreStats, Token, TokenExchange};
use relay::Relay;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::metrics::{Metrics, MetricsSnapshot, MintOutcome, ResolveOutcome, TimedOperation};
use crate::response::{ErrorBody, Reply, is_valid_callback};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const ACTION_GET_PARSE_RESULT: &str = "getParseResult";

#[derive(Clone)]
pub struct AppState {
    pub relay: Relay,
    pub exchange: TokenExchange,
    pub store: MemoryStore,
    pub metrics: Arc<Metrics>,
}

pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(query).post(upload))
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequest {
    pdf_base64: Option<String>,
    file_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    pub success: bool,
    pub status_code: u16,
    pub error: Option<String>,
    pub count: Option<usize>,
    pub pages: Option<ParseResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Token>,
    pub version: String,
}

impl RelayResponse {
    fn failure(status_code: u16, error: impl Into<String>) -> Self {
        Self {
            success: false,
            status_code,
            error: Some(error.into()),
            count: None,
            pages: None,
            token: None,
            version: VERSION.to_string(),
        }
    }

    fn into_reply(self) -> (StatusCode, Json<Self>) {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self))
    }
}

/// Relay write surface: store the PDF, parse it, return pages inline plus a
/// retrieval token when one could be minted.
async fn upload(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> (StatusCode, Json<RelayResponse>) {
    let request_id = Uuid::new_v4();
    let timer = TimedOperation::start();

    // Over-limit bodies surface here as a 413 rejection.
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::warn!(request_id = %request_id, error = %rejection, "Unreadable POST body");
            return RelayResponse::failure(rejection.status().as_u16(), rejection.body_text())
                .into_reply();
        }
    };
    let Ok(body) = std::str::from_utf8(&body) else {
        return RelayResponse::failure(400, "POST body is not valid UTF-8").into_reply();
    };

    if body.trim().is_empty() {
        return RelayResponse::failure(400, "Missing POST body").into_reply();
    }
    let request: UploadRequest = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) => {
            return RelayResponse::failure(400, format!("Invalid JSON in body: {e}")).into_reply();
        }
    };
    let Some(encoded) = request.pdf_base64.filter(|s| !s.trim().is_empty()) else {
        return RelayResponse::failure(400, "Missing pdfBase64").into_reply();
    };
    let bytes = match decode_pdf(&encoded) {
        Ok(b) => b,
        Err(e) => {
            return RelayResponse::failure(400, format!("Invalid pdfBase64: {e}")).into_reply();
        }
    };

    tracing::info!(
        request_id = %request_id,
        file_name = request.file_name.as_deref().unwrap_or_default(),
        bytes = bytes.len(),
        "Relay request"
    );

    let document = match state
        .relay
        .process(request.file_name.as_deref(), Bytes::from(bytes))
        .await {
        Ok(doc) => doc,
        Err(e) => {
            state.metrics.record_relay(false, timer.elapsed());
            tracing::warn!(request_id = %request_id, error = %e, "Relay failed");
            return RelayResponse::failure(e.status_code(), e.to_string()).into_reply();
        }
    };
    state.metrics.record_relay(true, timer.elapsed());

    let token = mint_token(&state, &document.result, request_id).await;

    RelayResponse {
        success: true,
        status_code: 200,
        error: None,
        count: Some(document.count),
        pages: Some(document.result),
        token,
        version: VERSION.to_string(),
    }
    .into_reply()
}

/// Best effort: a failed mint only costs the caller the token.
async fn mint_token(state: &AppState, result: &ParseResult, request_id: Uuid) -> Option<Token> {
    match state.exchange.store(result).await {
        Ok(Some(token)) => {
            state.metrics.record_mint(MintOutcome::Minted);
            Some(token)
        }
        Ok(None) => {
            state.metrics.record_mint(MintOutcome::Skipped);
            None
        }
        Err(e) => {
            state.metrics.record_mint(MintOutcome::Failed);
            tracing::warn!(request_id = %request_id, error = %e, "Token mint failed, replying without token");
            None
        }
    }
}

/// Accepts bare base64 or a `data:...;base64,` URL.
fn decode_pdf(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let trimmed = encoded.trim();
    let payload = match trimmed.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map_or(rest, |(_, data)| data),
        None => trimmed,
    };
    STANDARD.decode(payload)
}

#[derive(Serialize)]
struct StatusPayload {
    message: &'static str,
    timestamp: String,
    params: HashMap<String, String>,
    version: &'static str,
}

/// Query surface: `action=getParseResult&token=..` or a bare status probe,
/// optionally wrapped for script-tag delivery via `callback`.
async fn query(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Reply {
    let callback = match params.get("callback").map(String::as_str) {
        None | Some("") => None,
        Some(name) if is_valid_callback(name) => Some(name.to_string()),
        Some(_) => {
            return Reply::new(
                StatusCode::BAD_REQUEST,
                &ErrorBody::bad_request("Invalid callback name"),
                None,
            );
        }
    };

    match params.get("action").map(String::as_str) {
        None | Some("") => {
            let payload = StatusPayload {
                message: "Success",
                timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                params: params.clone(),
                version: VERSION,
            };
            Reply::new(StatusCode::OK, &payload, callback)
        }
        Some(ACTION_GET_PARSE_RESULT) => {
            let token = params.get("token").map(String::as_str).unwrap_or_default();
            match resolve_token(&state, token).await {
                Some(result) => Reply::new(StatusCode::OK, &result, callback),
                None => Reply::new(StatusCode::NOT_FOUND, &ErrorBody::not_found(), callback),
            }
        }
        Some(other) => Reply::new(
            StatusCode::BAD_REQUEST,
            &ErrorBody::bad_request(format!("Unknown action: {other}")),
            callback,
        ),
    }
}

/// Retrieval path. Cache read failures look the same as a missing token.
async fn resolve_token(state: &AppState, token: &str) -> Option<ParseResult> {
    match state.exchange.resolve(token).await {
        Ok(Resolved::Found(result)) => {
            state.metrics.record_resolve(ResolveOutcome::Found);
            Some(result)
        }
        Ok(Resolved::NotFound) => {
            state.metrics.record_resolve(ResolveOutcome::NotFound);
            None
        }
        Err(e) => {
            state.metrics.record_resolve(ResolveOutcome::Error);
            tracing::error!(error = %e, "Cache read failed during token lookup");
            None
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    bucket: String,
    cache: StoreStats,
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: VERSION,
        bucket: state.relay.bucket().to_string(),
        cache: state.store.stats(),
    })
}

async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
