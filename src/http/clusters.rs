use crate::error::{AppError, AppResult};
use crate::http::AppState;
use crate::models::{Cluster, ExecutionMode};
use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Default)]
struct ClusterFields {
    name: Option<String>,
    prometheus_url: Option<String>,
    execution_mode: Option<String>,
    default_agent_id: Option<String>,
}

/// Reads the `multipart/form-data` shape described in §6: an optional
/// kubeconfig under `file` plus plain text fields for the rest.
async fn read_multipart(mut multipart: Multipart) -> AppResult<(ClusterFields, Option<String>)> {
    let mut fields = ClusterFields::default();
    let mut kubeconfig = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("reading kubeconfig upload: {e}")))?;
                kubeconfig = Some(String::from_utf8_lossy(&bytes).to_string());
            }
            "name" => fields.name = field.text().await.ok(),
            "prometheus_url" => fields.prometheus_url = field.text().await.ok().filter(|s| !s.is_empty()),
            "execution_mode" => fields.execution_mode = field.text().await.ok(),
            "default_agent_id" => fields.default_agent_id = field.text().await.ok().filter(|s| !s.is_empty()),
            _ => {}
        }
    }
    Ok((fields, kubeconfig))
}

pub async fn list(State(state): State<AppState>) -> AppResult<Json<Vec<Cluster>>> {
    Ok(Json(state.clusters.list().await?))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Cluster>> {
    Ok(Json(state.clusters.get(&id).await?))
}

pub async fn create(State(state): State<AppState>, multipart: Multipart) -> AppResult<Json<Cluster>> {
    state.license.require("clusters").await?;
    let (fields, kubeconfig) = read_multipart(multipart).await?;
    let name = fields.name.ok_or_else(|| AppError::Validation("name is required".to_string()))?;
    let kubeconfig = kubeconfig.ok_or_else(|| AppError::Validation("kubeconfig file is required".to_string()))?;
    let cluster = state.clusters.create(name, kubeconfig, fields.prometheus_url).await?;
    Ok(Json(cluster))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> AppResult<Json<Cluster>> {
    state.license.require("clusters").await?;
    let (fields, kubeconfig) = read_multipart(multipart).await?;
    let execution_mode = fields
        .execution_mode
        .map(|s| s.parse::<ExecutionMode>().unwrap_or(ExecutionMode::Server));
    let cluster = state
        .clusters
        .update(
            &id,
            fields.name,
            fields.prometheus_url.map(Some),
            execution_mode,
            fields.default_agent_id.map(Some),
            kubeconfig,
        )
        .await?;
    Ok(Json(cluster))
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
) -> AppResult<Json<Value>> {
    state.license.require("clusters").await?;
    state.clusters.delete(&id, q.delete_files).await?;
    Ok(Json(json!({ "deleted": true })))
}

pub async fn test_connection(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Cluster>> {
    Ok(Json(state.clusters.test_connection(&id).await?))
}
