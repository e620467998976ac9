use super::{col_opt_str, col_str, col_ts, fmt_ts, Store};
use crate::error::AppError;
use crate::models::AuditLog;
use sqlx::any::AnyRow;
use uuid::Uuid;

fn row_to_audit(row: &AnyRow) -> Result<AuditLog, AppError> {
    Ok(AuditLog {
        id: col_str(row, "id")?,
        actor: col_str(row, "actor")?,
        action: col_str(row, "action")?,
        target: col_str(row, "target")?,
        detail: col_opt_str(row, "detail")?,
        at: col_ts(row, "at")?,
    })
}

impl Store {
    pub async fn append_audit(&self, actor: &str, action: &str, target: &str, detail: Option<String>) -> Result<(), AppError> {
        let entry = AuditLog {
            id: Uuid::new_v4().to_string(),
            actor: actor.to_string(),
            action: action.to_string(),
            target: target.to_string(),
            detail,
            at: chrono::Utc::now(),
        };
        sqlx::query("INSERT INTO audit_logs (id, actor, action, target, detail, at) VALUES (?, ?, ?, ?, ?, ?)")
            .bind(&entry.id)
            .bind(&entry.actor)
            .bind(&entry.action)
            .bind(&entry.target)
            .bind(&entry.detail)
            .bind(fmt_ts(entry.at))
            .execute(&self.pool)
            .await?;
        tracing::info!(actor = %actor, action = %action, target = %target, "audit entry recorded");
        Ok(())
    }

    pub async fn list_audit(&self, limit: i64) -> Result<Vec<AuditLog>, AppError> {
        let rows = sqlx::query("SELECT * FROM audit_logs ORDER BY at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_audit).collect()
    }
}
