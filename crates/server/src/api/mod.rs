// REST surface for presenter tooling: poll lifecycle, respondent
// registration and administration, and the history read side. Everything a
// live client needs streams over the WebSocket endpoint instead.

use crate::engine::{EngineOverview, PollEngine};
use crate::error::PollError;
use crate::validation::ValidatedJson;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use livepoll_common::types::{HistoryRecord, Participant, Poll};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DEFAULT_HISTORY_LIMIT: usize = 10;

#[derive(Clone)]
pub struct ApiState {
    pub engine: PollEngine,
}

pub fn router(engine: PollEngine) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/poll/current", get(current_poll))
        .route("/api/poll/create", post(create_poll))
        .route("/api/poll/end", post(end_poll))
        .route("/api/poll/history", get(poll_history))
        .route("/api/respondents/register", post(register_respondent))
        .route("/api/respondents", get(list_respondents))
        .route("/api/respondents/{respondent_id}", delete(remove_respondent))
        .with_state(ApiState { engine })
}

// ── Request/response bodies ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreatePollRequest {
    pub question: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub time_limit_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct EndPollResponse {
    pub ended: bool,
    pub record: HistoryRecord,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub polls: Vec<HistoryRecord>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub respondent_id: Uuid,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct RespondentsResponse {
    pub respondents: Vec<Participant>,
    pub count: usize,
}

// ── Handlers ────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now(),
    }))
}

async fn current_poll(State(state): State<ApiState>) -> Json<EngineOverview> {
    Json(state.engine.overview().await)
}

async fn create_poll(
    State(state): State<ApiState>,
    ValidatedJson(payload): ValidatedJson<CreatePollRequest>,
) -> Result<(StatusCode, Json<Poll>), PollError> {
    let poll = state
        .engine
        .create_poll(&payload.question, payload.options, payload.time_limit_secs)
        .await?;
    Ok((StatusCode::CREATED, Json(poll)))
}

async fn end_poll(State(state): State<ApiState>) -> Result<Json<EndPollResponse>, PollError> {
    // Engine-level ending is an idempotent no-op; here a second end is
    // surfaced to the presenter tooling as NO_ACTIVE_POLL.
    let record = state.engine.end_poll().await.ok_or(PollError::NoActivePoll)?;
    Ok(Json(EndPollResponse { ended: true, record }))
}

async fn poll_history(
    State(state): State<ApiState>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Json(HistoryResponse { polls: state.engine.history(limit).await })
}

async fn register_respondent(
    State(state): State<ApiState>,
    ValidatedJson(payload): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), PollError> {
    let (respondent_id, name) = state.engine.register(&payload.name).await?;
    Ok((StatusCode::CREATED, Json(RegisterResponse { respondent_id, name })))
}

async fn list_respondents(State(state): State<ApiState>) -> Json<RespondentsResponse> {
    let respondents = state.engine.participants().await;
    let count = respondents.len();
    Json(RespondentsResponse { respondents, count })
}

async fn remove_respondent(
    State(state): State<ApiState>,
    Path(respondent_id): Path<Uuid>,
) -> Result<StatusCode, PollError> {
    state.engine.remove_respondent(respondent_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
