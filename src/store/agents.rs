use super::{col_bool, col_opt_str, col_opt_ts, col_str, col_ts, fmt_opt_ts, fmt_ts, Store};
use crate::error::AppError;
use crate::models::InspectionAgent;
use sqlx::any::AnyRow;

fn row_to_agent(row: &AnyRow) -> Result<InspectionAgent, AppError> {
    Ok(InspectionAgent {
        id: col_str(row, "id")?,
        name: col_str(row, "name")?,
        cluster_id: col_opt_str(row, "cluster_id")?,
        description: col_opt_str(row, "description")?,
        is_enabled: col_bool(row, "is_enabled")?,
        prometheus_url: col_opt_str(row, "prometheus_url")?,
        token_hash: col_str(row, "token_hash")?,
        last_seen_at: col_opt_ts(row, "last_seen_at")?,
        created_at: col_ts(row, "created_at")?,
    })
}

impl Store {
    pub async fn find_agent_by_name(&self, name: &str) -> Result<Option<InspectionAgent>, AppError> {
        let row = sqlx::query("SELECT * FROM inspection_agents WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_agent).transpose()
    }

    pub async fn create_agent(&self, agent: &InspectionAgent) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO inspection_agents (id, name, cluster_id, description, is_enabled, \
             prometheus_url, token_hash, last_seen_at, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&agent.id)
        .bind(&agent.name)
        .bind(&agent.cluster_id)
        .bind(&agent.description)
        .bind(agent.is_enabled as i64)
        .bind(&agent.prometheus_url)
        .bind(&agent.token_hash)
        .bind(fmt_opt_ts(agent.last_seen_at))
        .bind(fmt_ts(agent.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Rotates the token hash of an existing agent (used when re-registering
    /// an existing name, per the Agent Coordinator's idempotent-by-name rule).
    pub async fn rotate_agent_token(&self, agent_id: &str, new_token_hash: &str, cluster_id: Option<&str>) -> Result<(), AppError> {
        sqlx::query("UPDATE inspection_agents SET token_hash = ?, cluster_id = ? WHERE id = ?")
            .bind(new_token_hash)
            .bind(cluster_id)
            .bind(agent_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_agents_by_token_hash_candidates(&self) -> Result<Vec<InspectionAgent>, AppError> {
        // Bearer auth compares against every enabled agent's hash in constant
        // time; there is no indexable lookup by raw token since only the hash
        // is stored. Fine at this scale (single-writer, modest agent counts).
        let rows = sqlx::query("SELECT * FROM inspection_agents WHERE is_enabled = 1")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_agent).collect()
    }

    pub async fn touch_agent_last_seen(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE inspection_agents SET last_seen_at = ? WHERE id = ?")
            .bind(fmt_ts(chrono::Utc::now()))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
