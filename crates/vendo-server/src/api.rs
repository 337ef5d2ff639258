//! HTTP API over the ledger.
//!
//! Endpoint contract (unit-facing plus the admin read paths):
//!
//! | Method | Path                    | Outcome                                   |
//! |--------|-------------------------|-------------------------------------------|
//! | POST   | `/api/unit/heartbeat`   | 201 auto-registered / 200 accepted / 401  |
//! | GET    | `/api/health`           | liveness probe                            |
//! | GET    | `/api/users`            | all users                                 |
//! | GET    | `/api/users/:card_id`   | one user or 404                           |
//! | POST   | `/api/register`         | 201 created / 409 already registered      |
//! | POST   | `/api/record_usage`     | 200 / 404 unknown / 400 no stock          |
//! | POST   | `/api/log`              | append a unit-tagged audit entry          |
//! | GET    | `/api/history`          | recent audit entries, newest first        |
//! | GET    | `/api/units`            | all units, expiry sweep applied first     |
//! | GET    | `/api/units/:name/log`  | audit entries tagged with that unit       |

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use vendo_core::liveness::HeartbeatOutcome;
use vendo_core::{accounting, liveness, LedgerError, LedgerStore};

/// Shared state for handlers. The store is internally reference-counted.
#[derive(Clone)]
pub struct AppState {
    pub store: LedgerStore,
}

/// Build the API router over a ledger store.
pub fn router(store: LedgerStore) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/unit/heartbeat", post(unit_heartbeat))
        .route("/api/users", get(list_users))
        .route("/api/users/:card_id", get(get_user))
        .route("/api/register", post(register))
        .route("/api/record_usage", post(record_usage))
        .route("/api/log", post(add_log))
        .route("/api/history", get(history))
        .route("/api/units", get(list_units))
        .route("/api/units/:name/log", get(unit_log))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(AppState { store })
}

// =========================================================================
// Error mapping
// =========================================================================

/// Request-level error: a status code plus a JSON `{"error": ...}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        let status = match &e {
            LedgerError::UserNotFound { .. } | LedgerError::UnitNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            LedgerError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            LedgerError::Exhausted { .. } | LedgerError::InvalidInput { .. } => {
                StatusCode::BAD_REQUEST
            }
            LedgerError::AlreadyRegistered { .. } => StatusCode::CONFLICT,
            LedgerError::Corrupt { .. } | LedgerError::Database(_) => {
                error!(error = %e, "internal ledger error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

// =========================================================================
// Handlers
// =========================================================================

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Deserialize)]
struct HeartbeatRequest {
    name: Option<String>,
    password: Option<String>,
}

async fn unit_heartbeat(
    State(state): State<AppState>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<Response, ApiError> {
    let (name, password) = match (req.name.as_deref(), req.password.as_deref()) {
        (Some(name), Some(password)) if !name.is_empty() && !password.is_empty() => {
            (name, password)
        }
        _ => return Err(ApiError::bad_request("name and password are required")),
    };

    match liveness::heartbeat(&state.store, name, password, Utc::now())? {
        HeartbeatOutcome::Registered => {
            info!(unit = %name, "unit auto-registered");
            Ok((
                StatusCode::CREATED,
                Json(json!({
                    "success": true,
                    "message": "unit auto-registered and heartbeat received",
                })),
            )
                .into_response())
        }
        HeartbeatOutcome::Accepted => Ok((
            StatusCode::OK,
            Json(json!({ "success": true, "message": "heartbeat received" })),
        )
            .into_response()),
    }
}

async fn list_users(State(state): State<AppState>) -> Result<Response, ApiError> {
    let users = state.store.list_users()?;
    Ok(Json(users).into_response())
}

async fn get_user(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
) -> Result<Response, ApiError> {
    match state.store.get_user(&card_id)? {
        Some(user) => Ok(Json(user).into_response()),
        None => Err(LedgerError::UserNotFound { card_id }.into()),
    }
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    card_id: Option<String>,
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Response, ApiError> {
    let card_id = req
        .card_id
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::bad_request("card_id is required"))?;

    let user = state.store.register_user(&card_id, Utc::now())?;
    info!(card_id = %card_id, "card registered");
    Ok((StatusCode::CREATED, Json(user)).into_response())
}

#[derive(Debug, Deserialize)]
struct RecordUsageRequest {
    card_id: Option<String>,
}

async fn record_usage(
    State(state): State<AppState>,
    Json(req): Json<RecordUsageRequest>,
) -> Result<Response, ApiError> {
    let card_id = req
        .card_id
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::bad_request("card_id is required"))?;

    let user = accounting::record_usage(&state.store, &card_id, Utc::now())?;
    info!(card_id = %card_id, stock = user.stock, "usage recorded");
    Ok(Json(json!({ "success": true, "user": user })).into_response())
}

#[derive(Debug, Deserialize)]
struct LogRequest {
    unit_name: Option<String>,
    message: Option<String>,
}

async fn add_log(
    State(state): State<AppState>,
    Json(req): Json<LogRequest>,
) -> Result<Response, ApiError> {
    let message = req
        .message
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ApiError::bad_request("message is required"))?;
    let unit_name = req.unit_name.unwrap_or_else(|| "unknown-unit".to_string());

    liveness::append_unit_log(&state.store, &unit_name, &message, Utc::now())?;
    Ok(Json(json!({ "success": true, "message": "log added" })).into_response())
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<u32>,
}

async fn history(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> Result<Response, ApiError> {
    let entries = state.store.recent_audit(q.limit.unwrap_or(100))?;
    Ok(Json(entries).into_response())
}

async fn list_units(State(state): State<AppState>) -> Result<Response, ApiError> {
    // Sweep first: expired units must never be reported online
    let units = liveness::list_units(&state.store, Utc::now())?;
    Ok(Json(units).into_response())
}

async fn unit_log(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(q): Query<HistoryQuery>,
) -> Result<Response, ApiError> {
    let entries = state.store.unit_audit(&name, q.limit.unwrap_or(100))?;
    Ok(Json(entries).into_response())
}
