use super::{col_i64, col_opt_str, col_str, col_ts, fmt_ts, Store};
use crate::error::AppError;
use crate::models::{InspectionResult, InspectionRun};
use sqlx::any::AnyRow;

/// An item selected into a run at admission time, named + ordered so that
/// later edits to the source `InspectionItem` never alter run history.
#[derive(Debug, Clone)]
pub struct ItemSnapshot {
    pub item_id: Option<String>,
    pub item_name: String,
    pub item_seq: i64,
}

fn row_to_result(row: &AnyRow) -> Result<InspectionResult, AppError> {
    Ok(InspectionResult {
        id: col_str(row, "id")?,
        run_id: col_str(row, "run_id")?,
        item_id: col_opt_str(row, "item_id")?,
        item_name: col_str(row, "item_name")?,
        item_seq: col_i64(row, "item_seq")?,
        status: col_str(row, "status")?.parse().map_err(AppError::Internal)?,
        detail: col_opt_str(row, "detail")?,
        suggestion: col_opt_str(row, "suggestion")?,
        created_at: col_ts(row, "created_at")?,
    })
}

impl Store {
    /// Admits a run: inserts the run row and the per-item snapshots in one
    /// transaction, so a crash between the two can never leave a run with a
    /// mismatched `total_items`.
    pub async fn create_run_with_snapshots(
        &self,
        run: &InspectionRun,
        snapshots: &[ItemSnapshot],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

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
        .bind(run.started_at.map(fmt_ts))
        .bind(run.completed_at.map(fmt_ts))
        .bind(run.lease_expires_at.map(fmt_ts))
        .bind(run.cancel_requested as i64)
        .execute(&mut *tx)
        .await?;

        for snap in snapshots {
            sqlx::query(
                "INSERT INTO run_item_snapshots (run_id, item_id, item_name, item_seq) VALUES (?, ?, ?, ?)",
            )
            .bind(&run.id)
            .bind(&snap.item_id)
            .bind(&snap.item_name)
            .bind(snap.item_seq)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn list_snapshots(&self, run_id: &str) -> Result<Vec<ItemSnapshot>, AppError> {
        let rows = sqlx::query(
            "SELECT item_id, item_name, item_seq FROM run_item_snapshots WHERE run_id = ? ORDER BY item_seq ASC",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(ItemSnapshot {
                    item_id: col_opt_str(row, "item_id")?,
                    item_name: col_str(row, "item_name")?,
                    item_seq: col_i64(row, "item_seq")?,
                })
            })
            .collect()
    }

    pub async fn list_results(&self, run_id: &str) -> Result<Vec<InspectionResult>, AppError> {
        let rows = sqlx::query(
            "SELECT * FROM inspection_results WHERE run_id = ? ORDER BY item_seq ASC",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_result).collect()
    }

    /// Idempotent on `(run_id, item_id)` via the snapshot's sequence number:
    /// if a result already exists for this item, it is returned unchanged and
    /// `processed_items` is not advanced again. Otherwise inserts the row and
    /// returns the freshly re-read run with its counters advanced.
    ///
    /// Returns `(result, run, was_new)`.
    pub async fn submit_result(
        &self,
        run_id: &str,
        item_seq: i64,
        result: &InspectionResult,
    ) -> Result<(InspectionResult, InspectionRun, bool), AppError> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query("SELECT * FROM inspection_results WHERE run_id = ? AND item_seq = ?")
            .bind(run_id)
            .bind(item_seq)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(row) = existing {
            tx.commit().await?;
            let existing_result = row_to_result(&row)?;
            let run = self.get_run(run_id).await?;
            return Ok((existing_result, run, false));
        }

        sqlx::query(
            "INSERT INTO inspection_results (id, run_id, item_id, item_name, item_seq, status, detail, suggestion, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&result.id)
        .bind(&result.run_id)
        .bind(&result.item_id)
        .bind(&result.item_name)
        .bind(result.item_seq)
        .bind(result.status.to_string())
        .bind(&result.detail)
        .bind(&result.suggestion)
        .bind(fmt_ts(result.created_at))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE inspection_runs SET processed_items = processed_items + 1 WHERE id = ?",
        )
        .bind(run_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let mut run = self.get_run(run_id).await?;
        run.recompute_progress();
        self.update_run(&run).await?;

        Ok((result.clone(), run, true))
    }
}
