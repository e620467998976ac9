use super::{col_str, col_ts, fmt_ts, Store};
use crate::error::AppError;
use crate::models::{CheckConfig, InspectionItem};
use sqlx::any::AnyRow;

fn row_to_item(row: &AnyRow) -> Result<InspectionItem, AppError> {
    let config_json = col_str(row, "config")?;
    let mut config: CheckConfig = serde_json::from_str(&config_json).unwrap_or(CheckConfig::Unknown);
    // `check_type` is kept as its own column for indexing/filtering even
    // though it is also embedded in `config`'s tagged representation; trust
    // the column if the two ever disagree (e.g. a hand-edited row).
    let check_type = col_str(row, "check_type")?;
    if config.kind_str() != check_type && check_type != "unknown" {
        config = CheckConfig::Unknown;
    }
    Ok(InspectionItem {
        id: col_str(row, "id")?,
        name: col_str(row, "name")?,
        description: super::col_opt_str(row, "description")?,
        config,
        created_at: col_ts(row, "created_at")?,
        updated_at: col_ts(row, "updated_at")?,
    })
}

impl Store {
    pub async fn create_item(&self, item: &InspectionItem) -> Result<(), AppError> {
        let existing = sqlx::query("SELECT id FROM inspection_items WHERE name = ?")
            .bind(&item.name)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            return Err(AppError::Conflict(format!("item name {:?} already in use", item.name)));
        }
        sqlx::query(
            "INSERT INTO inspection_items (id, name, description, check_type, config, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&item.id)
        .bind(&item.name)
        .bind(&item.description)
        .bind(item.config.kind_str())
        .bind(serde_json::to_string(&item.config).unwrap_or_else(|_| "{}".to_string()))
        .bind(fmt_ts(item.created_at))
        .bind(fmt_ts(item.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_item(&self, id: &str) -> Result<InspectionItem, AppError> {
        let row = sqlx::query("SELECT * FROM inspection_items WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("inspection item {id} not found")))?;
        row_to_item(&row)
    }

    pub async fn list_items(&self) -> Result<Vec<InspectionItem>, AppError> {
        let rows = sqlx::query("SELECT * FROM inspection_items ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_item).collect()
    }

    pub async fn update_item(&self, item: &InspectionItem) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE inspection_items SET name = ?, description = ?, check_type = ?, config = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(&item.name)
        .bind(&item.description)
        .bind(item.config.kind_str())
        .bind(serde_json::to_string(&item.config).unwrap_or_else(|_| "{}".to_string()))
        .bind(fmt_ts(item.updated_at))
        .bind(&item.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_item(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM inspection_items WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
