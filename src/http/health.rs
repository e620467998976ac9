use crate::http::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "inspection-core",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness additionally proves the store is reachable, so a load balancer
/// never routes traffic to an instance that can't talk to its database.
pub async fn ready(State(state): State<AppState>) -> Json<Value> {
    let db_ok = state.store.ping().await.is_ok();
    Json(json!({
        "status": if db_ok { "ready" } else { "not_ready" },
        "database": db_ok,
    }))
}
