//! HTTP surface (§6). One `axum::Router` wired over a cloneable `AppState`;
//! every handler returns `AppResult<Json<_>>` so error mapping happens once,
//! in `error::AppError`'s `IntoResponse` impl.

mod agents;
mod audit;
mod clusters;
mod health;
mod items;
mod license;
mod runs;

use crate::agents::AgentCoordinator;
use crate::cluster::ClusterService;
use crate::config::AppConfig;
use crate::license::LicenseGuard;
use crate::runs::RunOrchestrator;
use crate::store::Store;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub cfg: Arc<AppConfig>,
    pub clusters: ClusterService,
    pub runs: RunOrchestrator,
    pub agents: AgentCoordinator,
    pub license: Arc<LicenseGuard>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/clusters", get(clusters::list).post(clusters::create))
        .route(
            "/clusters/{id}",
            get(clusters::get).put(clusters::update).delete(clusters::delete),
        )
        .route("/clusters/{id}/test-connection", post(clusters::test_connection))
        .route("/inspection-items", get(items::list).post(items::create))
        .route("/inspection-items/export", get(items::export))
        .route("/inspection-items/import", post(items::import))
        .route(
            "/inspection-items/{id}",
            get(items::get).put(items::update).delete(items::delete),
        )
        .route("/inspection-runs", get(runs::list).post(runs::create))
        .route("/inspection-runs/{id}", get(runs::get).delete(runs::delete))
        .route("/inspection-runs/{id}/cancel", post(runs::cancel))
        .route("/inspection-runs/{id}/report", get(runs::report))
        .route("/license/status", get(license::status))
        .route("/license/upload", post(license::upload))
        .route("/agents", post(agents::register))
        .route("/agents/{id}/heartbeat", post(agents::heartbeat))
        .route("/agents/{id}/tasks", get(agents::tasks))
        .route("/agents/{id}/results", post(agents::results))
        .route("/agents/{id}/report-failure", post(agents::report_failure))
        .route("/audit-logs", get(audit::list))
        .layer(
            tower::ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CorsLayer::permissive())
                .layer(TimeoutLayer::new(Duration::from_secs(60))),
        )
        .with_state(state)
}
