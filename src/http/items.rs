use crate::error::{AppError, AppResult};
use crate::http::AppState;
use crate::models::{CheckConfig, InspectionItem};
use axum::extract::{Multipart, Path, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct ItemInput {
    name: String,
    description: Option<String>,
    #[serde(flatten)]
    config: CheckConfig,
}

pub async fn list(State(state): State<AppState>) -> AppResult<Json<Vec<InspectionItem>>> {
    Ok(Json(state.store.list_items().await?))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<InspectionItem>> {
    Ok(Json(state.store.get_item(&id).await?))
}

pub async fn create(State(state): State<AppState>, Json(input): Json<ItemInput>) -> AppResult<Json<InspectionItem>> {
    let now = Utc::now();
    let item = InspectionItem {
        id: Uuid::new_v4().to_string(),
        name: input.name,
        description: input.description,
        config: input.config,
        created_at: now,
        updated_at: now,
    };
    state.store.create_item(&item).await?;
    Ok(Json(item))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<ItemInput>,
) -> AppResult<Json<InspectionItem>> {
    let mut item = state.store.get_item(&id).await?;
    item.name = input.name;
    item.description = input.description;
    item.config = input.config;
    item.updated_at = Utc::now();
    state.store.update_item(&item).await?;
    Ok(Json(item))
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Value>> {
    state.store.delete_item(&id).await?;
    Ok(Json(json!({ "deleted": true })))
}

#[derive(Serialize)]
pub struct ExportBundle {
    exported_at: chrono::DateTime<Utc>,
    items: Vec<InspectionItem>,
}

pub async fn export(State(state): State<AppState>) -> AppResult<Json<ExportBundle>> {
    Ok(Json(ExportBundle { exported_at: Utc::now(), items: state.store.list_items().await? }))
}

#[derive(Deserialize)]
struct ImportBundle {
    items: Vec<ItemInput>,
}

/// Upserts by name: an import entry whose name matches an existing item
/// updates it in place, otherwise a new item is created.
pub async fn import(State(state): State<AppState>, mut multipart: Multipart) -> AppResult<Json<Value>> {
    let mut body: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("invalid multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            body = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("reading import upload: {e}")))?
                    .to_vec(),
            );
        }
    }
    let body = body.ok_or_else(|| AppError::Validation("file field is required".to_string()))?;
    let bundle: ImportBundle = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("malformed import bundle: {e}")))?;

    let existing = state.store.list_items().await?;
    let mut by_name: HashMap<String, InspectionItem> = existing.into_iter().map(|i| (i.name.clone(), i)).collect();

    let (mut created, mut updated) = (0u64, 0u64);
    for input in bundle.items {
        if let Some(mut item) = by_name.remove(&input.name) {
            item.description = input.description;
            item.config = input.config;
            item.updated_at = Utc::now();
            state.store.update_item(&item).await?;
            updated += 1;
        } else {
            let now = Utc::now();
            let item = InspectionItem {
                id: Uuid::new_v4().to_string(),
                name: input.name,
                description: input.description,
                config: input.config,
                created_at: now,
                updated_at: now,
            };
            state.store.create_item(&item).await?;
            created += 1;
        }
    }

    Ok(Json(json!({ "created": created, "updated": updated, "total": created + updated })))
}
