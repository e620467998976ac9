//! Agent Coordination Plane (§4.2). Agents are interchangeable external
//! workers; the server never dials out to one -- all motion (pull / heartbeat
//! / submit) is initiated by the agent, so the only failure primitive needed
//! is the lease timeout handled in `lease`.

pub mod lease;
mod token;

pub use token::generate_token;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::models::{AgentStatus, Executor, InspectionAgent, InspectionResult, ResultStatus};
use crate::store::Store;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct AgentCoordinator {
    store: Store,
    cfg: Arc<AppConfig>,
}

pub struct AgentTask {
    pub run_id: String,
    pub item_id: Option<String>,
    pub item_snapshot: String,
    pub cluster_context: Option<String>,
    pub lease_expires_at: chrono::DateTime<Utc>,
}

impl AgentCoordinator {
    pub fn new(store: Store, cfg: Arc<AppConfig>) -> Self {
        Self { store, cfg }
    }

    /// Idempotent by name: re-registering an existing name rotates the token
    /// rather than erroring, so a redeployed agent can recover access.
    pub async fn register(
        &self,
        name: String,
        cluster_id: Option<String>,
        description: Option<String>,
        prometheus_url: Option<String>,
    ) -> AppResult<(InspectionAgent, String)> {
        if name.trim().is_empty() {
            return Err(AppError::Validation("agent name must not be empty".to_string()));
        }

        let token = token::generate_token();
        let token_hash = token::hash_token(&token);

        if let Some(mut existing) = self.store.find_agent_by_name(&name).await? {
            self.store
                .rotate_agent_token(&existing.id, &token_hash, cluster_id.as_deref())
                .await?;
            existing.token_hash = token_hash;
            existing.cluster_id = cluster_id;
            return Ok((existing, token));
        }

        let agent = InspectionAgent {
            id: Uuid::new_v4().to_string(),
            name,
            cluster_id,
            description,
            is_enabled: true,
            prometheus_url,
            token_hash,
            last_seen_at: None,
            created_at: Utc::now(),
        };
        self.store.create_agent(&agent).await?;
        Ok((agent, token))
    }

    /// Constant-time comparison against every enabled agent's hash. Updates
    /// `last_seen_at` on success.
    pub async fn authenticate(&self, bearer: &str) -> AppResult<InspectionAgent> {
        let candidates = self.store.list_agents_by_token_hash_candidates().await?;
        for agent in candidates {
            if token::verify_token(bearer, &agent.token_hash) {
                self.store.touch_agent_last_seen(&agent.id).await?;
                return Ok(agent);
            }
        }
        Err(AppError::AgentUnauthenticated)
    }

    pub async fn heartbeat(&self, agent_id: &str) -> AppResult<chrono::DateTime<Utc>> {
        self.store.touch_agent_last_seen(agent_id).await?;
        Ok(Utc::now())
    }

    pub async fn pull_tasks(&self, agent_id: &str, max: i64) -> AppResult<Vec<AgentTask>> {
        let lease_expires_at = Utc::now() + chrono::Duration::from_std(self.cfg.lease_ttl).unwrap_or_default();
        let runs = self.store.pull_agent_runs(agent_id, max.max(1), lease_expires_at).await?;

        let mut tasks = Vec::new();
        for run in runs {
            let cluster = self.store.get_cluster(&run.cluster_id).await.ok();
            let snapshots = self.store.list_snapshots(&run.id).await?;
            let already = self.store.list_results(&run.id).await?;
            let done: std::collections::HashSet<i64> = already.iter().map(|r| r.item_seq).collect();
            for snap in snapshots.into_iter().filter(|s| !done.contains(&s.item_seq)) {
                tasks.push(AgentTask {
                    run_id: run.id.clone(),
                    item_id: snap.item_id.clone(),
                    item_snapshot: snap.item_name.clone(),
                    cluster_context: cluster.as_ref().and_then(|c| c.contexts.first().cloned()),
                    lease_expires_at,
                });
            }
        }
        Ok(tasks)
    }

    /// Idempotent on `(run_id, item_id)`: a duplicate submit returns the
    /// original row unchanged without advancing counters a second time.
    pub async fn submit_result(
        &self,
        run_id: &str,
        item_id: Option<&str>,
        status: ResultStatus,
        detail: Option<String>,
        suggestion: Option<String>,
    ) -> AppResult<InspectionResult> {
        let snapshots = self.store.list_snapshots(run_id).await?;
        let snap = snapshots
            .iter()
            .find(|s| s.item_id.as_deref() == item_id)
            .ok_or_else(|| AppError::NotFound(format!("item {item_id:?} is not part of run {run_id}")))?;

        let result = InspectionResult {
            id: Uuid::new_v4().to_string(),
            run_id: run_id.to_string(),
            item_id: snap.item_id.clone(),
            item_name: snap.item_name.clone(),
            item_seq: snap.item_seq,
            status,
            detail,
            suggestion,
            created_at: Utc::now(),
        };

        let (stored, mut run, was_new) = self.store.submit_result(run_id, snap.item_seq, &result).await?;

        if was_new {
            run.lease_expires_at = Some(Utc::now() + chrono::Duration::from_std(self.cfg.lease_ttl).unwrap_or_default());
            self.store.update_run(&run).await?;

            if run.processed_items >= run.total_items {
                crate::runs::finalise(&self.store, &self.cfg, run_id, None).await?;
            }
        }

        Ok(stored)
    }

    /// Agent-initiated fatal: writes `failed` results for all remaining
    /// items and finalises the run as `incomplete`.
    pub async fn report_run_failure(&self, run_id: &str, reason: &str) -> AppResult<()> {
        let mut run = self.store.get_run(run_id).await?;
        if run.status.is_terminal() {
            return Ok(());
        }

        let snapshots = self.store.list_snapshots(run_id).await?;
        let existing = self.store.list_results(run_id).await?;
        let done: std::collections::HashSet<i64> = existing.iter().map(|r| r.item_seq).collect();

        for snap in snapshots.into_iter().filter(|s| !done.contains(&s.item_seq)) {
            let failure = InspectionResult {
                id: Uuid::new_v4().to_string(),
                run_id: run_id.to_string(),
                item_id: snap.item_id.clone(),
                item_name: snap.item_name.clone(),
                item_seq: snap.item_seq,
                status: ResultStatus::Failed,
                detail: Some(format!("agent reported fatal failure: {reason}")),
                suggestion: None,
                created_at: Utc::now(),
            };
            self.store.submit_result(run_id, snap.item_seq, &failure).await?;
        }

        run.agent_status = Some(AgentStatus::Failed);
        run.executor = Executor::Agent;
        self.store.update_run(&run).await?;
        self.store
            .append_audit("agent", "run_failed", run_id, Some(reason.to_string()))
            .await?;

        crate::runs::finalise(&self.store, &self.cfg, run_id, Some(crate::models::RunStatus::Incomplete)).await?;
        Ok(())
    }
}
