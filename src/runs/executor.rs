//! Server-executor loop (§4.1): one task per in-process run, single-threaded
//! and cooperative. Independent runs execute as independent tokio tasks.

use crate::checks::{self, PromqlClient};
use crate::config::AppConfig;
use crate::models::{InspectionResult, ResultStatus};
use crate::store::Store;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Drives one run's items end to end. Never returns an `Err` for per-item
/// trouble -- every failure becomes a `failed` result row and the loop moves
/// on, matching the Check Engine's own never-raise boundary (§4.3, §7).
pub async fn run(
    store: Store,
    cfg: Arc<AppConfig>,
    cancel_flag: Arc<AtomicBool>,
    promql_client: Arc<dyn PromqlClient>,
    run_id: String,
) -> Result<(), crate::error::AppError> {
    let mut run = store.get_run(&run_id).await?;
    run.status = crate::models::RunStatus::Running;
    run.started_at = Some(Utc::now());
    store.update_run(&run).await?;

    let cluster = store.get_cluster(&run.cluster_id).await?;
    let kubeconfig_blob = tokio::fs::read_to_string(&cluster.kubeconfig_handle)
        .await
        .unwrap_or_default();

    let snapshots = store.list_snapshots(&run_id).await?;
    let already = store.list_results(&run_id).await?;
    let done: std::collections::HashSet<i64> = already.iter().map(|r| r.item_seq).collect();

    let mut cancelled_mid_run = false;

    for snap in snapshots.into_iter().filter(|s| !done.contains(&s.item_seq)) {
        if cancel_flag.load(Ordering::SeqCst) {
            cancelled_mid_run = true;
            let result = InspectionResult {
                id: Uuid::new_v4().to_string(),
                run_id: run_id.clone(),
                item_id: snap.item_id.clone(),
                item_name: snap.item_name.clone(),
                item_seq: snap.item_seq,
                status: ResultStatus::Failed,
                detail: Some("cancelled before execution".to_string()),
                suggestion: None,
                created_at: Utc::now(),
            };
            store.submit_result(&run_id, snap.item_seq, &result).await?;
            continue;
        }

        let outcome = match &snap.item_id {
            None => checks::CheckOutcome {
                status: ResultStatus::Failed,
                detail: Some("referenced item no longer exists".to_string()),
                suggestion: None,
            },
            Some(item_id) => match store.get_item(item_id).await {
                Ok(item) => checks::evaluate(&cfg, &item, &cluster, &kubeconfig_blob, promql_client.as_ref()).await,
                Err(_) => checks::CheckOutcome {
                    status: ResultStatus::Failed,
                    detail: Some("referenced item no longer exists".to_string()),
                    suggestion: None,
                },
            },
        };

        let result = InspectionResult {
            id: Uuid::new_v4().to_string(),
            run_id: run_id.clone(),
            item_id: snap.item_id.clone(),
            item_name: snap.item_name.clone(),
            item_seq: snap.item_seq,
            status: outcome.status,
            detail: outcome.detail,
            suggestion: outcome.suggestion,
            created_at: Utc::now(),
        };
        store.submit_result(&run_id, snap.item_seq, &result).await?;
    }

    let forced = if cancelled_mid_run || cancel_flag.load(Ordering::SeqCst) {
        Some(crate::models::RunStatus::Cancelled)
    } else {
        None
    };
    super::finalise(&store, &cfg, &run_id, forced).await
}
