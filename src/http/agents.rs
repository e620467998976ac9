use crate::error::{AppError, AppResult};
use crate::http::AppState;
use crate::models::{InspectionAgent, ResultStatus};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

fn bearer_token(headers: &HeaderMap) -> AppResult<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AppError::AgentUnauthenticated)
}

#[derive(Deserialize)]
pub struct RegisterInput {
    name: String,
    cluster_id: Option<String>,
    description: Option<String>,
    prometheus_url: Option<String>,
}

#[derive(Serialize)]
pub struct RegisterOutput {
    #[serde(flatten)]
    agent: InspectionAgent,
    token: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterInput>,
) -> AppResult<Json<RegisterOutput>> {
    let (agent, token) = state
        .agents
        .register(input.name, input.cluster_id, input.description, input.prometheus_url)
        .await?;
    Ok(Json(RegisterOutput { agent, token }))
}

pub async fn heartbeat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<serde_json::Value>> {
    let agent = state.agents.authenticate(bearer_token(&headers)?).await?;
    if agent.id != id {
        return Err(AppError::AgentUnauthenticated);
    }
    let now = state.agents.heartbeat(&agent.id).await?;
    Ok(Json(json!({ "server_time": now })))
}

#[derive(Deserialize, Default)]
pub struct TasksQuery {
    #[serde(default = "default_max")]
    max: i64,
}

fn default_max() -> i64 {
    5
}

#[derive(Serialize)]
pub struct TaskOut {
    run_id: String,
    item_id: Option<String>,
    item_snapshot: String,
    cluster_context: Option<String>,
    lease_expires_at: chrono::DateTime<chrono::Utc>,
}

pub async fn tasks(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<TasksQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<TaskOut>>> {
    let agent = state.agents.authenticate(bearer_token(&headers)?).await?;
    if agent.id != id {
        return Err(AppError::AgentUnauthenticated);
    }
    let tasks = state.agents.pull_tasks(&agent.id, q.max).await?;
    Ok(Json(
        tasks
            .into_iter()
            .map(|t| TaskOut {
                run_id: t.run_id,
                item_id: t.item_id,
                item_snapshot: t.item_snapshot,
                cluster_context: t.cluster_context,
                lease_expires_at: t.lease_expires_at,
            })
            .collect(),
    ))
}

#[derive(Deserialize)]
pub struct SubmitResultInput {
    run_id: String,
    item_id: Option<String>,
    status: ResultStatus,
    detail: Option<String>,
    suggestion: Option<String>,
}

pub async fn results(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<SubmitResultInput>,
) -> AppResult<Json<crate::models::InspectionResult>> {
    let agent = state.agents.authenticate(bearer_token(&headers)?).await?;
    if agent.id != id {
        return Err(AppError::AgentUnauthenticated);
    }
    let result = state
        .agents
        .submit_result(&input.run_id, input.item_id.as_deref(), input.status, input.detail, input.suggestion)
        .await?;
    Ok(Json(result))
}

#[derive(Deserialize)]
pub struct ReportFailureInput {
    run_id: String,
    reason: String,
}

/// Agent-initiated fatal: writes `failed` results for the run's remaining
/// items and finalises it as `incomplete` (§4.2).
pub async fn report_failure(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<ReportFailureInput>,
) -> AppResult<Json<serde_json::Value>> {
    let agent = state.agents.authenticate(bearer_token(&headers)?).await?;
    if agent.id != id {
        return Err(AppError::AgentUnauthenticated);
    }
    state.agents.report_run_failure(&input.run_id, &input.reason).await?;
    Ok(Json(json!({ "acknowledged": true })))
}
