//! Run Orchestrator (§4.1): admits runs, routes them to the server executor
//! or the Agent Coordination Plane, and finalises aggregated outcomes.

mod executor;
mod state;
#[cfg(test)]
mod integration_tests;

pub use state::CancelRegistry;

use crate::checks::PromqlClient;
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::models::{AgentStatus, Executor, ExecutionMode, InspectionResult, InspectionRun, ResultStatus, RunStatus};
use crate::reports::ReportEmitter;
use crate::store::{ItemSnapshot, Store};
use chrono::Utc;
use futures::FutureExt;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct RunOrchestrator {
    store: Store,
    cfg: Arc<AppConfig>,
    cancel_flags: Arc<CancelRegistry>,
    promql_client: Arc<dyn PromqlClient>,
}

impl RunOrchestrator {
    pub fn new(store: Store, cfg: Arc<AppConfig>, promql_client: Arc<dyn PromqlClient>) -> Self {
        Self { store, cfg, cancel_flags: Arc::new(CancelRegistry::new()), promql_client }
    }

    /// Admits a run: validates the cluster and every item id, snapshots item
    /// names, routes to server or agent execution, and (for server runs)
    /// spawns the background executor task.
    pub async fn create_run(
        &self,
        cluster_id: &str,
        item_ids: &[String],
        operator: Option<String>,
    ) -> AppResult<InspectionRun> {
        if item_ids.is_empty() {
            return Err(AppError::Validation("at least one inspection item must be selected".to_string()));
        }

        let cluster = self.store.get_cluster(cluster_id).await?;

        let mut snapshots = Vec::with_capacity(item_ids.len());
        for (seq, item_id) in item_ids.iter().enumerate() {
            let item = self.store.get_item(item_id).await?;
            snapshots.push(ItemSnapshot { item_id: Some(item.id), item_name: item.name, item_seq: seq as i64 });
        }

        let (executor, agent_id, agent_status) = match cluster.execution_mode {
            ExecutionMode::Agent => match &cluster.default_agent_id {
                Some(agent_id) if self.store.agent_is_usable(agent_id).await? => {
                    (Executor::Agent, Some(agent_id.clone()), Some(AgentStatus::Queued))
                }
                _ => (Executor::Server, None, None),
            },
            ExecutionMode::Server => (Executor::Server, None, None),
        };

        let now = Utc::now();
        let run = InspectionRun {
            id: Uuid::new_v4().to_string(),
            cluster_id: cluster.id.clone(),
            operator,
            status: RunStatus::Queued,
            executor,
            agent_id,
            agent_status,
            total_items: snapshots.len() as i64,
            processed_items: 0,
            progress: 0,
            summary: None,
            report_path: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            lease_expires_at: None,
            cancel_requested: false,
        };

        self.store.create_run_with_snapshots(&run, &snapshots).await?;
        self.store.append_audit("operator", "run_created", &run.id, Some(format!("executor={executor}"))).await?;

        if executor == Executor::Server {
            self.spawn_executor(run.id.clone());
        }

        Ok(run)
    }

    fn spawn_executor(&self, run_id: String) {
        let store = self.store.clone();
        let cfg = self.cfg.clone();
        let flag = self.cancel_flags.flag_for(&run_id);
        let promql_client = self.promql_client.clone();

        tokio::spawn(async move {
            let outcome = std::panic::AssertUnwindSafe(executor::run(
                store.clone(),
                cfg.clone(),
                flag,
                promql_client,
                run_id.clone(),
            ))
            .catch_unwind()
            .await;

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(run_id = %run_id, error = %e, "run executor returned an error");
                    let _ = recover_from_panic(&store, &cfg, &run_id, &e.to_string()).await;
                }
                Err(panic) => {
                    let summary = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    tracing::error!(run_id = %run_id, panic = %summary, "run executor panicked");
                    let _ = recover_from_panic(&store, &cfg, &run_id, &summary).await;
                }
            }
        });
    }

    pub async fn get_run(&self, id: &str) -> AppResult<(InspectionRun, Vec<InspectionResult>)> {
        let run = self.store.get_run(id).await?;
        let results = self.store.list_results(id).await?;
        Ok((run, results))
    }

    pub async fn list_runs(&self) -> AppResult<Vec<InspectionRun>> {
        self.store.list_runs().await
    }

    pub async fn delete_run(&self, id: &str) -> AppResult<()> {
        self.cancel_flags.clear(id);
        self.store.delete_run(id).await
    }

    /// Completed runs reject cancellation idempotently: no error, the run is
    /// returned as-is. Agent runs resolve synchronously here; server runs
    /// only set the cooperative flag for the executor task to observe.
    pub async fn cancel_run(&self, id: &str) -> AppResult<InspectionRun> {
        let mut run = self.store.get_run(id).await?;
        if run.status.is_terminal() {
            return Ok(run);
        }

        self.store.request_cancel(id).await?;
        run.cancel_requested = true;

        match run.executor {
            Executor::Server => {
                self.cancel_flags.request_cancel(id);
                if run.status == RunStatus::Queued {
                    // No executor task may have been spawned to observe the
                    // flag yet (e.g. it raced ahead to completion); if the
                    // run is still queued, finalise it as cancelled directly.
                    finalise(&self.store, &self.cfg, id, Some(RunStatus::Cancelled)).await?;
                }
            }
            Executor::Agent => {
                run.agent_status = Some(AgentStatus::Failed);
                self.store.update_run(&run).await?;

                let snapshots = self.store.list_snapshots(id).await?;
                let existing = self.store.list_results(id).await?;
                let done: std::collections::HashSet<i64> = existing.iter().map(|r| r.item_seq).collect();
                for snap in snapshots.into_iter().filter(|s| !done.contains(&s.item_seq)) {
                    let skipped = InspectionResult {
                        id: Uuid::new_v4().to_string(),
                        run_id: id.to_string(),
                        item_id: snap.item_id.clone(),
                        item_name: snap.item_name.clone(),
                        item_seq: snap.item_seq,
                        status: ResultStatus::Failed,
                        detail: Some("cancelled by operator request".to_string()),
                        suggestion: None,
                        created_at: Utc::now(),
                    };
                    self.store.submit_result(id, snap.item_seq, &skipped).await?;
                }

                finalise(&self.store, &self.cfg, id, Some(RunStatus::Cancelled)).await?;
            }
        }

        self.store.append_audit("operator", "run_cancel_requested", id, None).await?;
        self.store.get_run(id).await
    }
}

async fn recover_from_panic(store: &Store, cfg: &Arc<AppConfig>, run_id: &str, summary: &str) -> AppResult<()> {
    let snapshots = store.list_snapshots(run_id).await?;
    let existing = store.list_results(run_id).await?;
    let done: std::collections::HashSet<i64> = existing.iter().map(|r| r.item_seq).collect();
    for snap in snapshots.into_iter().filter(|s| !done.contains(&s.item_seq)) {
        let result = InspectionResult {
            id: Uuid::new_v4().to_string(),
            run_id: run_id.to_string(),
            item_id: snap.item_id.clone(),
            item_name: snap.item_name.clone(),
            item_seq: snap.item_seq,
            status: ResultStatus::Failed,
            detail: Some(format!("executor panicked: {summary}")),
            suggestion: None,
            created_at: Utc::now(),
        };
        store.submit_result(run_id, snap.item_seq, &result).await?;
    }
    store.append_audit("executor", "run_panicked", run_id, Some(summary.to_string())).await?;
    finalise(store, cfg, run_id, Some(RunStatus::Incomplete)).await
}

/// Shared finalisation path for server completion, server cancellation,
/// agent completion/cancellation, and agent-reported fatal failure.
/// `forced_status` overrides the pass/fail-derived terminal status (used for
/// `cancelled`); `None` derives `completed`/`incomplete` from the results.
pub(crate) async fn finalise(
    store: &Store,
    cfg: &Arc<AppConfig>,
    run_id: &str,
    forced_status: Option<RunStatus>,
) -> AppResult<()> {
    let mut run = store.get_run(run_id).await?;
    if run.status.is_terminal() {
        return Ok(());
    }

    let results = store.list_results(run_id).await?;
    let (mut passed, mut warning, mut failed) = (0i64, 0i64, 0i64);
    for r in &results {
        match r.status {
            ResultStatus::Passed => passed += 1,
            ResultStatus::Warning => warning += 1,
            ResultStatus::Failed => failed += 1,
        }
    }

    run.status = forced_status.unwrap_or(if failed == 0 && warning == 0 { RunStatus::Completed } else { RunStatus::Incomplete });
    run.summary = Some(format!("{passed} item(s) passed, {warning} warning(s), {failed} failed"));
    run.completed_at = Some(Utc::now());
    run.recompute_progress();
    store.update_run(&run).await?;

    if let Ok(cluster) = store.get_cluster(&run.cluster_id).await {
        let emitter = ReportEmitter::new(cfg.clone());
        match emitter.emit(&run, &cluster, &results).await {
            Ok(path) => {
                run.report_path = Some(path);
                store.update_run(&run).await?;
            }
            Err(e) => {
                tracing::warn!(run_id = %run_id, error = %e, "report emission failed, leaving report_path unset");
                let _ = store.append_audit("report_emitter", "report_failed", run_id, Some(e.to_string())).await;
            }
        }
    }

    store
        .append_audit("orchestrator", "run_finalised", run_id, Some(run.status.to_string()))
        .await?;
    Ok(())
}
