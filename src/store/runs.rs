use super::{col_i64, col_opt_str, col_opt_ts, col_str, col_ts, fmt_opt_ts, fmt_ts, Store};
use crate::error::AppError;
use crate::models::{AgentStatus, Executor, InspectionRun, RunStatus};
use sqlx::any::AnyRow;

fn row_to_run(row: &AnyRow) -> Result<InspectionRun, AppError> {
    Ok(InspectionRun {
        id: col_str(row, "id")?,
        cluster_id: col_str(row, "cluster_id")?,
        operator: col_opt_str(row, "operator")?,
        status: col_str(row, "status")?.parse().map_err(AppError::Internal)?,
        executor: col_str(row, "executor")?.parse().unwrap_or(Executor::Server),
        agent_id: col_opt_str(row, "agent_id")?,
        agent_status: col_opt_str(row, "agent_status")?
            .map(|s| s.parse::<AgentStatus>())
            .transpose()
            .map_err(AppError::Internal)?,
        total_items: col_i64(row, "total_items")?,
        processed_items: col_i64(row, "processed_items")?,
        progress: col_i64(row, "progress")?,
        summary: col_opt_str(row, "summary")?,
        report_path: col_opt_str(row, "report_path")?,
        created_at: col_ts(row, "created_at")?,
        started_at: col_opt_ts(row, "started_at")?,
        completed_at: col_opt_ts(row, "completed_at")?,
        lease_expires_at: col_opt_ts(row, "lease_expires_at")?,
        cancel_requested: col_i64(row, "cancel_requested")? != 0,
    })
}

impl Store {
    pub async fn create_run(&self, run: &InspectionRun) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO inspection_runs (id, cluster_id, operator, status, executor, agent_id, \
             agent_status, total_items, processed_items, progress, summary, report_path, \
             created_at, started_at, completed_at, lease_expires_at, cancel_requested) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&run.id)
        .bind(&run.cluster_id)
        .bind(&run.operator)
        .bind(run.status.to_string())
        .bind(run.executor.to_string())
        .bind(&run.agent_id)
        .bind(run.agent_status.map(|s| s.to_string()))
        .bind(run.total_items)
        .bind(run.processed_items)
        .bind(run.progress)
        .bind(&run.summary)
        .bind(&run.report_path)
        .bind(fmt_ts(run.created_at))
        .bind(fmt_opt_ts(run.started_at))
        .bind(fmt_opt_ts(run.completed_at))
        .bind(fmt_opt_ts(run.lease_expires_at))
        .bind(run.cancel_requested as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_run(&self, id: &str) -> Result<InspectionRun, AppError> {
        let row = sqlx::query("SELECT * FROM inspection_runs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("run {id} not found")))?;
        row_to_run(&row)
    }

    pub async fn list_runs(&self) -> Result<Vec<InspectionRun>, AppError> {
        let rows = sqlx::query("SELECT * FROM inspection_runs ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_run).collect()
    }

    /// Runs for one cluster, used by cascade-delete (§3: "a Cluster weakly
    /// references runs (delete may optionally cascade runs+reports based on
    /// an operator flag)").
    pub async fn list_runs_by_cluster(&self, cluster_id: &str) -> Result<Vec<InspectionRun>, AppError> {
        let rows = sqlx::query("SELECT * FROM inspection_runs WHERE cluster_id = ? ORDER BY created_at ASC")
            .bind(cluster_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_run).collect()
    }

    /// Full update of a run row. Callers are responsible for respecting the
    /// state machine's monotonicity; once a run is terminal this is only
    /// ever called again to persist unrelated fields like `report_path`.
    pub async fn update_run(&self, run: &InspectionRun) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE inspection_runs SET status = ?, executor = ?, agent_id = ?, agent_status = ?, \
             total_items = ?, processed_items = ?, progress = ?, summary = ?, report_path = ?, \
             started_at = ?, completed_at = ?, lease_expires_at = ?, cancel_requested = ? WHERE id = ?",
        )
        .bind(run.status.to_string())
        .bind(run.executor.to_string())
        .bind(&run.agent_id)
        .bind(run.agent_status.map(|s| s.to_string()))
        .bind(run.total_items)
        .bind(run.processed_items)
        .bind(run.progress)
        .bind(&run.summary)
        .bind(&run.report_path)
        .bind(fmt_opt_ts(run.started_at))
        .bind(fmt_opt_ts(run.completed_at))
        .bind(fmt_opt_ts(run.lease_expires_at))
        .bind(run.cancel_requested as i64)
        .bind(&run.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_run(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM inspection_results WHERE run_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM inspection_runs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn request_cancel(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE inspection_runs SET cancel_requested = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Atomically select up to `max` queued agent tasks for `agent_id`,
    /// transition them to `running`, and stamp a fresh lease. Concurrent
    /// pullers racing on the same agent observe a serialisable selection:
    /// the `UPDATE ... WHERE agent_status = 'queued'` re-check at commit
    /// time means only the first committer claims any given run.
    pub async fn pull_agent_runs(
        &self,
        agent_id: &str,
        max: i64,
        lease_expires_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<InspectionRun>, AppError> {
        let mut tx = self.pool.begin().await?;

        let candidate_rows = sqlx::query(
            "SELECT id FROM inspection_runs WHERE executor = 'agent' AND agent_id = ? \
             AND agent_status = 'queued' ORDER BY created_at ASC LIMIT ?",
        )
        .bind(agent_id)
        .bind(max)
        .fetch_all(&mut *tx)
        .await?;

        let mut claimed = Vec::new();
        for row in candidate_rows {
            let id: String = col_str(&row, "id")?;
            let updated = sqlx::query(
                "UPDATE inspection_runs SET status = 'running', agent_status = 'running', \
                 started_at = COALESCE(started_at, ?), lease_expires_at = ? \
                 WHERE id = ? AND agent_status = 'queued'",
            )
            .bind(fmt_ts(chrono::Utc::now()))
            .bind(fmt_ts(lease_expires_at))
            .bind(&id)
            .execute(&mut *tx)
            .await?;
            if updated.rows_affected() == 1 {
                claimed.push(id);
            }
        }

        tx.commit().await?;

        let mut runs = Vec::with_capacity(claimed.len());
        for id in claimed {
            runs.push(self.get_run(&id).await?);
        }
        Ok(runs)
    }

    /// Reclaim runs whose agent lease has expired without a submit. Leaves
    /// already-submitted results intact; the run becomes pullable again.
    /// Returns `(run_id, agent_id)` pairs for audit logging.
    pub async fn reclaim_stale_leases(&self) -> Result<Vec<(String, Option<String>)>, AppError> {
        let now = fmt_ts(chrono::Utc::now());
        let rows = sqlx::query(
            "SELECT id, agent_id FROM inspection_runs WHERE executor = 'agent' AND status = 'running' \
             AND lease_expires_at IS NOT NULL AND lease_expires_at < ?",
        )
        .bind(&now)
        .fetch_all(&self.pool)
        .await?;

        let mut reclaimed = Vec::new();
        for row in rows {
            let id: String = col_str(&row, "id")?;
            let agent_id = col_opt_str(&row, "agent_id")?;
            sqlx::query(
                "UPDATE inspection_runs SET status = 'queued', agent_status = 'queued', \
                 lease_expires_at = NULL WHERE id = ?",
            )
            .bind(&id)
            .execute(&self.pool)
            .await?;
            reclaimed.push((id, agent_id));
        }
        Ok(reclaimed)
    }
}
