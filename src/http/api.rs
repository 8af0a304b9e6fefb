use super::auth::{Authorized, Credentialed};
use super::{ws, AppState};
use crate::error::SessionError;
use crate::orchestrator_service::TurnOutcome;
use crate::protocol_envelope::ProtocolEnvelope;
use crate::tools::ConfirmationDecision;
use crate::transfer::ImportOptions;
use crate::types::{CallId, ChatMessage, Mode, SessionState};
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{FromRequest, Multipart, Query, Request, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/session/:session_id/store-user-info", post(store_user_info))
        .route("/session/:session_id/clear-user-info", post(clear_user_info))
        .route("/session/:session_id/set-mode", post(set_mode))
        .route("/session/:session_id/get-messages", get(get_messages))
        .route("/session/:session_id/export", get(export))
        .route("/session/:session_id/import", post(import))
        .route("/session/:session_id/clear-history", post(clear_history))
        .route("/session/:session_id/state", get(state))
        .route("/session/:session_id/chat", post(chat))
        .route("/session/:session_id/confirm", post(confirm))
        .route("/session/:session_id/cancel", post(cancel))
        .route("/session/:session_id/ws", get(websocket))
}

/// Any failure surfaced over HTTP, rendered as an error envelope.
#[derive(Debug)]
pub struct ApiError(SessionError);

impl ApiError {
    fn invalid(msg: impl Into<String>) -> Self {
        Self(SessionError::Validation(msg.into()))
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::invalid(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::invalid(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::invalid(err.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let envelope = ProtocolEnvelope::from_error(&self.0);
        let status =
            StatusCode::from_u16(envelope.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!(code = self.0.code(), error = %self.0, "Request failed");
        }
        (status, Json(envelope)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    ok: bool,
    version: &'static str,
    sessions: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
        sessions: state.registry.len().await,
    })
}

async fn store_user_info(session: Credentialed) -> ApiResult<Json<SessionState>> {
    let state = session.handle.store_user_info(&session.token).await?;
    Ok(Json(state))
}

async fn clear_user_info(session: Authorized) -> ApiResult<Json<SessionState>> {
    Ok(Json(session.handle.clear_user_info().await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetModeBody {
    mode: Mode,
    #[serde(default)]
    force: bool,
    #[serde(default)]
    is_after_clear_history: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SetModeResponse {
    mode: Mode,
    applied: bool,
    state: SessionState,
}

async fn set_mode(
    session: Authorized,
    body: Result<Json<SetModeBody>, JsonRejection>,
) -> ApiResult<Json<SetModeResponse>> {
    let Json(body) = body?;
    // A cleared history lost its welcome notice; re-entering the mode restores it.
    let force = body.force || body.is_after_clear_history;
    let transition = session.handle.set_mode(body.mode, force).await?;
    Ok(Json(SetModeResponse {
        mode: body.mode,
        applied: transition.is_applied(),
        state: session.handle.state(),
    }))
}

async fn get_messages(session: Authorized) -> Json<Vec<ChatMessage>> {
    let messages = session.handle.messages().await.unwrap_or_else(|error| {
        warn!(session_id = %session.handle.session_id(), %error, "History unreadable; returning none");
        Vec::new()
    });
    Json(messages)
}

async fn export(session: Authorized) -> ApiResult<Response> {
    let document = session.handle.export().await?;
    let body = serde_json::to_vec_pretty(&document).map_err(SessionError::from)?;
    let filename = format!(
        "ideaforge-{}-{}.json",
        session.handle.session_id(),
        document.metadata.exported_at.format("%Y%m%d%H%M%S")
    );
    let disposition = format!("attachment; filename=\"{filename}\"");
    Ok((
        [
            (CONTENT_TYPE, "application/json".to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// JSON import bodies are either an export document or
/// `{"document": ..., "options": ...}`.
fn split_import_body(body: Value, options: ImportOptions) -> ApiResult<(Value, ImportOptions)> {
    match body {
        Value::Object(mut map) if map.contains_key("document") => {
            let options = match map.remove("options") {
                Some(value) if !value.is_null() => serde_json::from_value(value)
                    .map_err(|e| ApiError::invalid(format!("invalid import options: {e}")))?,
                _ => options,
            };
            let document = map.remove("document").unwrap_or(Value::Null);
            Ok((document, options))
        }
        other => Ok((other, options)),
    }
}

async fn read_multipart(
    mut multipart: Multipart,
    mut options: ImportOptions,
) -> ApiResult<(Value, ImportOptions)> {
    let mut document = None;
    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("file" | "document") => {
                let bytes = field.bytes().await?;
                let parsed = serde_json::from_slice::<Value>(&bytes)
                    .map_err(|e| ApiError::invalid(format!("uploaded file is not JSON: {e}")))?;
                document = Some(parsed);
            }
            Some("options") => {
                let bytes = field.bytes().await?;
                options = serde_json::from_slice(&bytes)
                    .map_err(|e| ApiError::invalid(format!("invalid import options: {e}")))?;
            }
            _ => {}
        }
    }
    document
        .map(|document| (document, options))
        .ok_or_else(|| ApiError::invalid("multipart body has no `file` field"))
}

async fn import(
    State(state): State<AppState>,
    session: Authorized,
    options: Result<Query<ImportOptions>, QueryRejection>,
    request: Request,
) -> ApiResult<Response> {
    let Query(options) = options?;
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    let (document, options) = if is_multipart {
        let multipart = Multipart::from_request(request, &state).await?;
        read_multipart(multipart, options).await?
    } else {
        let Json(body) = Json::<Value>::from_request(request, &state).await?;
        split_import_body(body, options)?
    };

    let report = session.handle.import(document, options).await?;
    info!(
        session_id = %session.handle.session_id(),
        tables = report.tables_imported,
        records = report.records_imported,
        "Import finished"
    );
    Ok(Json(report).into_response())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClearHistoryResponse {
    removed: u64,
}

async fn clear_history(session: Authorized) -> ApiResult<Json<ClearHistoryResponse>> {
    let removed = session.handle.clear_history().await?;
    Ok(Json(ClearHistoryResponse { removed }))
}

async fn state(session: Authorized) -> Json<SessionState> {
    Json(session.handle.state())
}

#[derive(Debug, Deserialize)]
struct ChatBody {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatResponse {
    outcome: TurnOutcome,
    steps: usize,
    elapsed_ms: u64,
    state: SessionState,
}

async fn chat(
    session: Authorized,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> ApiResult<Json<ChatResponse>> {
    let Json(body) = body?;
    // The caller watches this turn until it settles.
    let _viewer = session.handle.viewer();
    let report = session.handle.chat(body.text, session.token).await?;
    Ok(Json(ChatResponse {
        outcome: report.outcome,
        steps: report.steps,
        elapsed_ms: report.elapsed_ms,
        state: report.state,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmBody {
    call_id: CallId,
    decision: ConfirmationDecision,
}

async fn confirm(
    session: Authorized,
    body: Result<Json<ConfirmBody>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let Json(body) = body?;
    session.handle.confirm(body.call_id, body.decision).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
struct CancelResponse {
    cancelled: bool,
}

async fn cancel(session: Authorized) -> Json<CancelResponse> {
    Json(CancelResponse {
        cancelled: session.handle.cancel(),
    })
}

async fn websocket(session: Authorized, upgrade: WebSocketUpgrade) -> Response {
    let Authorized { handle, token } = session;
    upgrade.on_upgrade(move |socket| ws::run(socket, handle, token))
}
