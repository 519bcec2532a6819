use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tracing::{info, warn};

use marathon_engine::{NotificationEvaluator, RotationEngine, Service};
use marathon_types::api::{Command, CommandReply};
use marathon_types::events::BatchReport;
use marathon_types::{Clock, ErrorBody, ErrorKind, LedgerError};

pub const TRIGGER_TOKEN_HEADER: &str = "x-trigger-token";

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub service: Service,
    pub rotation: Arc<RotationEngine>,
    pub notifications: Arc<NotificationEvaluator>,
    pub clock: Arc<dyn Clock>,
    pub freeze_window: chrono::Duration,
    pub trigger_token: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/commands", post(command))
        .route("/triggers/rotation", post(trigger_rotation))
        .route("/triggers/notification", post(trigger_notification))
        .with_state(state)
}

pub enum ApiError {
    Unauthorized,
    Ledger(LedgerError),
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self::Ledger(err)
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Invalid => StatusCode::BAD_REQUEST,
        ErrorKind::TryLater => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
            ApiError::Ledger(err) => {
                let body = ErrorBody::from(&err);
                (status_for(body.kind), Json(body)).into_response()
            }
        }
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn command(
    State(state): State<AppState>,
    Json(command): Json<Command>,
) -> Result<Json<CommandReply>, ApiError> {
    let label = command.label();
    let user_id = command.user_id();
    match state.service.execute(command).await {
        Ok(reply) => Ok(Json(reply)),
        Err(e) => {
            warn!(command = label, user_id = %user_id, "command failed: {}", e);
            Err(e.into())
        }
    }
}

fn authorize(state: &AppStateInner, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = &state.trigger_token else {
        return Ok(());
    };
    let supplied = headers
        .get(TRIGGER_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    if supplied == Some(expected.as_str()) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

async fn trigger_rotation(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<BatchReport>, ApiError> {
    authorize(&state, &headers)?;
    let now = state.clock.now();
    info!(%now, "Rotation triggered");
    Ok(Json(state.rotation.run_batch(now).await?))
}

async fn trigger_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<BatchReport>, ApiError> {
    authorize(&state, &headers)?;
    let now = state.clock.now();
    info!(%now, "Notification triggered");
    Ok(Json(
        state
            .notifications
            .run_batch(now, state.freeze_window)
            .await?,
    ))
}
