use super::{col_i64, col_opt_i64, col_opt_str, col_opt_ts, col_str, col_ts, fmt_opt_ts, fmt_ts, Store};
use crate::error::AppError;
use crate::models::{Cluster, ConnectionStatus, ExecutionMode};
use sqlx::any::AnyRow;
use sqlx::Row;

fn row_to_cluster(row: &AnyRow) -> Result<Cluster, AppError> {
    let contexts_json = col_str(row, "contexts")?;
    let contexts: Vec<String> = serde_json::from_str(&contexts_json).unwrap_or_default();
    Ok(Cluster {
        id: col_str(row, "id")?,
        name: col_str(row, "name")?,
        kubeconfig_handle: col_str(row, "kubeconfig_handle")?,
        prometheus_url: col_opt_str(row, "prometheus_url")?,
        contexts,
        connection_status: col_str(row, "connection_status")?.parse().unwrap_or(ConnectionStatus::Unknown),
        connection_message: col_opt_str(row, "connection_message")?,
        kubernetes_version: col_opt_str(row, "kubernetes_version")?,
        node_count: col_opt_i64(row, "node_count")?,
        last_checked_at: col_opt_ts(row, "last_checked_at")?,
        execution_mode: col_str(row, "execution_mode")?.parse().unwrap_or(ExecutionMode::Server),
        default_agent_id: col_opt_str(row, "default_agent_id")?,
        created_at: col_ts(row, "created_at")?,
        updated_at: col_ts(row, "updated_at")?,
    })
}

impl Store {
    pub async fn create_cluster(&self, cluster: &Cluster) -> Result<(), AppError> {
        let existing = sqlx::query("SELECT id FROM clusters WHERE name = ?")
            .bind(&cluster.name)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            return Err(AppError::Conflict(format!("cluster name {:?} already in use", cluster.name)));
        }

        sqlx::query(
            "INSERT INTO clusters (id, name, kubeconfig_handle, prometheus_url, contexts, \
             connection_status, connection_message, kubernetes_version, node_count, \
             last_checked_at, execution_mode, default_agent_id, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&cluster.id)
        .bind(&cluster.name)
        .bind(&cluster.kubeconfig_handle)
        .bind(&cluster.prometheus_url)
        .bind(serde_json::to_string(&cluster.contexts).unwrap_or_else(|_| "[]".to_string()))
        .bind(cluster.connection_status.to_string())
        .bind(&cluster.connection_message)
        .bind(&cluster.kubernetes_version)
        .bind(cluster.node_count)
        .bind(fmt_opt_ts(cluster.last_checked_at))
        .bind(cluster.execution_mode.to_string())
        .bind(&cluster.default_agent_id)
        .bind(fmt_ts(cluster.created_at))
        .bind(fmt_ts(cluster.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_cluster(&self, id: &str) -> Result<Cluster, AppError> {
        let row = sqlx::query("SELECT * FROM clusters WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("cluster {id} not found")))?;
        row_to_cluster(&row)
    }

    pub async fn list_clusters(&self) -> Result<Vec<Cluster>, AppError> {
        let rows = sqlx::query("SELECT * FROM clusters ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_cluster).collect()
    }

    pub async fn update_cluster(&self, cluster: &Cluster) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE clusters SET name = ?, kubeconfig_handle = ?, prometheus_url = ?, \
             contexts = ?, connection_status = ?, connection_message = ?, kubernetes_version = ?, \
             node_count = ?, last_checked_at = ?, execution_mode = ?, default_agent_id = ?, \
             updated_at = ? WHERE id = ?",
        )
        .bind(&cluster.name)
        .bind(&cluster.kubeconfig_handle)
        .bind(&cluster.prometheus_url)
        .bind(serde_json::to_string(&cluster.contexts).unwrap_or_else(|_| "[]".to_string()))
        .bind(cluster.connection_status.to_string())
        .bind(&cluster.connection_message)
        .bind(&cluster.kubernetes_version)
        .bind(cluster.node_count)
        .bind(fmt_opt_ts(cluster.last_checked_at))
        .bind(cluster.execution_mode.to_string())
        .bind(&cluster.default_agent_id)
        .bind(fmt_ts(cluster.updated_at))
        .bind(&cluster.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_cluster(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM clusters WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Returns true if `agent_id` names an enabled agent that exists.
    pub async fn agent_is_usable(&self, agent_id: &str) -> Result<bool, AppError> {
        let row = sqlx::query("SELECT is_enabled FROM inspection_agents WHERE id = ?")
            .bind(agent_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(r) => col_i64(&r, "is_enabled")? != 0,
            None => false,
        })
    }
}
