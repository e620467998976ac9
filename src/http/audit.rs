use crate::http::AppState;
use crate::models::AuditLog;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

#[derive(Deserialize)]
pub struct AuditQuery {
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    100
}

pub async fn list(State(state): State<AppState>, Query(q): Query<AuditQuery>) -> crate::error::AppResult<Json<Vec<AuditLog>>> {
    Ok(Json(state.store.list_audit(q.limit.clamp(1, 1000)).await?))
}
