// =============================================================================
// Dashboard REST API — Axum 0.7
// =============================================================================
//
// JSON over HTTP on the configured dashboard port. Every error body is
// `{ "error": <human message>, "code": <stable machine code> }`; client
// mistakes are 4xx, upstream/exchange failures are 5xx. The dashboard is a
// local management surface; CORS is permissive.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::registry::{BotPatch, NewBotSpec};
use crate::supervisor::{OpError, Supervisor};

// =============================================================================
// Router construction
// =============================================================================

/// Build the dashboard router with CORS middleware and shared state.
pub fn router(supervisor: Arc<Supervisor>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/overview", get(overview))
        .route("/api/bots", post(create_bot))
        .route("/api/bots/:id/start", post(start_bot))
        .route("/api/bots/:id/stop", post(stop_bot))
        .route("/api/bots/:id/edit", post(edit_bot))
        .route("/api/bots/:id/add-funds", post(add_funds))
        .route("/api/bots/:id", delete(delete_bot))
        .route("/api/bots/:id/logs", get(bot_logs))
        .route("/api/coin/:asset", get(coin_detail))
        .route("/api/reconcile", post(reconcile))
        .route("/api/dashboard/restart", post(restart))
        .layer(cors)
        .with_state(supervisor)
}

// =============================================================================
// Error mapping
// =============================================================================

/// Wrapper so supervisor errors render as the JSON error contract.
pub struct ApiError(OpError);

impl From<OpError> for ApiError {
    fn from(e: OpError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            OpError::NotFound(_) => StatusCode::NOT_FOUND,
            OpError::BotRunning(_) => StatusCode::CONFLICT,
            OpError::SymbolLocked
            | OpError::SymbolNotTradeable(_)
            | OpError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            OpError::Upstream(_) => StatusCode::BAD_GATEWAY,
            OpError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({
            "error": self.0.to_string(),
            "code": self.0.code(),
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// Handlers
// =============================================================================

async fn health(State(supervisor): State<Arc<Supervisor>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "bots": supervisor.registry.list().len(),
        "server_time": chrono::Utc::now().timestamp_millis(),
    }))
}

async fn overview(State(supervisor): State<Arc<Supervisor>>) -> ApiResult<impl IntoResponse> {
    let snapshot = supervisor.overview().await?;
    Ok(Json(snapshot))
}

async fn create_bot(
    State(supervisor): State<Arc<Supervisor>>,
    Json(spec): Json<NewBotSpec>,
) -> ApiResult<impl IntoResponse> {
    let bot = supervisor.create_bot(spec).await?;
    Ok((StatusCode::CREATED, Json(bot)))
}

async fn start_bot(
    State(supervisor): State<Arc<Supervisor>>,
    Path(id): Path<u64>,
) -> ApiResult<impl IntoResponse> {
    let bot = supervisor.start(id)?;
    Ok(Json(bot))
}

async fn stop_bot(
    State(supervisor): State<Arc<Supervisor>>,
    Path(id): Path<u64>,
) -> ApiResult<impl IntoResponse> {
    let bot = supervisor.stop(id).await?;
    Ok(Json(bot))
}

async fn edit_bot(
    State(supervisor): State<Arc<Supervisor>>,
    Path(id): Path<u64>,
    Json(patch): Json<BotPatch>,
) -> ApiResult<impl IntoResponse> {
    let bot = supervisor.edit(id, patch).await?;
    Ok(Json(bot))
}

#[derive(Debug, Deserialize)]
struct AddFundsRequest {
    amount_usdt: f64,
}

async fn add_funds(
    State(supervisor): State<Arc<Supervisor>>,
    Path(id): Path<u64>,
    Json(req): Json<AddFundsRequest>,
) -> ApiResult<impl IntoResponse> {
    let bot = supervisor.add_funds(id, req.amount_usdt)?;
    Ok(Json(bot))
}

async fn delete_bot(
    State(supervisor): State<Arc<Supervisor>>,
    Path(id): Path<u64>,
) -> ApiResult<impl IntoResponse> {
    supervisor.delete(id)?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    /// Number of records to return (default 50).
    n: Option<usize>,
}

async fn bot_logs(
    State(supervisor): State<Arc<Supervisor>>,
    Path(id): Path<u64>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<impl IntoResponse> {
    let records = supervisor.bot_logs(id, query.n.unwrap_or(50))?;
    Ok(Json(records))
}

async fn coin_detail(
    State(supervisor): State<Arc<Supervisor>>,
    Path(asset): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let detail = supervisor.coin_detail(&asset).await?;
    Ok(Json(detail))
}

async fn reconcile(State(supervisor): State<Arc<Supervisor>>) -> ApiResult<impl IntoResponse> {
    let adopted = supervisor.reconcile_orphans().await?;
    Ok(Json(serde_json::json!({ "adopted": adopted })))
}

async fn restart(State(supervisor): State<Arc<Supervisor>>) -> impl IntoResponse {
    info!("dashboard restart endpoint hit");
    supervisor.request_restart();
    Json(serde_json::json!({
        "restarting": true,
        "message": "daemon is shutting down; the process manager will restart it",
    }))
}
