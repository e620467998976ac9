use crate::error::{AppError, AppResult};
use crate::http::AppState;
use crate::models::{InspectionResult, InspectionRun};
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Deserialize)]
pub struct CreateRunInput {
    cluster_id: String,
    item_ids: Vec<String>,
    operator: Option<String>,
}

#[derive(Serialize)]
pub struct RunDetail {
    #[serde(flatten)]
    run: InspectionRun,
    results: Vec<InspectionResult>,
}

pub async fn list(State(state): State<AppState>) -> AppResult<Json<Vec<InspectionRun>>> {
    Ok(Json(state.runs.list_runs().await?))
}

pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<CreateRunInput>,
) -> AppResult<Json<InspectionRun>> {
    state.license.require("inspections").await?;
    let run = state.runs.create_run(&input.cluster_id, &input.item_ids, input.operator).await?;
    Ok(Json(run))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<RunDetail>> {
    let (run, results) = state.runs.get_run(&id).await?;
    Ok(Json(RunDetail { run, results }))
}

#[derive(Deserialize, Default)]
pub struct DeleteQuery {
    #[serde(default)]
    delete_files: bool,
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<DeleteQuery>,
) -> AppResult<Json<serde_json::Value>> {
    if q.delete_files {
        if let Ok(run) = state.store.get_run(&id).await {
            if let Some(report_path) = run.report_path {
                let emitter = crate::reports::ReportEmitter::new(state.cfg.clone());
                let _ = tokio::fs::remove_file(emitter.markdown_path(&report_path)).await;
                let _ = tokio::fs::remove_file(emitter.pdf_path(&report_path)).await;
            }
        }
    }
    state.runs.delete_run(&id).await?;
    Ok(Json(json!({ "deleted": true })))
}

pub async fn cancel(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<InspectionRun>> {
    Ok(Json(state.runs.cancel_run(&id).await?))
}

#[derive(Deserialize)]
pub struct ReportQuery {
    #[serde(default = "default_format")]
    format: String,
}

fn default_format() -> String {
    "md".to_string()
}

pub async fn report(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<ReportQuery>,
) -> AppResult<Response> {
    state.license.require("reports").await?;
    let run = state.store.get_run(&id).await?;
    let report_path = run
        .report_path
        .ok_or_else(|| AppError::NotFound("report not yet available for this run".to_string()))?;

    let emitter = crate::reports::ReportEmitter::new(state.cfg.clone());
    let (path, content_type) = match q.format.as_str() {
        "pdf" => (emitter.pdf_path(&report_path), "application/pdf"),
        _ => (emitter.markdown_path(&report_path), "text/markdown"),
    };

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| AppError::Internal(format!("reading report artefact: {e}")))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        Body::from(bytes),
    )
        .into_response())
}
