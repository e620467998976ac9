//! Stale-lease sweeper (§4.2): runs every `stale_sweep_interval`, detaching
//! any agent-executed run whose lease expired without a submit. The run
//! returns to `queued`/`agent_status=queued` and becomes pullable again by
//! any agent bound to it -- already-submitted results are untouched.

use crate::config::AppConfig;
use crate::store::Store;
use std::sync::Arc;

pub fn spawn(store: Store, cfg: Arc<AppConfig>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cfg.stale_sweep_interval);
        loop {
            interval.tick().await;
            if let Err(e) = sweep_once(&store).await {
                tracing::error!(error = %e, "stale-lease sweep failed");
            }
        }
    })
}

async fn sweep_once(store: &Store) -> Result<(), crate::error::AppError> {
    let reclaimed = store.reclaim_stale_leases().await?;
    for (run_id, agent_id) in reclaimed {
        tracing::warn!(run_id = %run_id, agent_id = ?agent_id, "agent lease expired, run requeued");
        store
            .append_audit(
                "sweeper",
                "agent_lease_expired",
                &run_id,
                Some(format!("agent_id={}", agent_id.unwrap_or_else(|| "unknown".to_string()))),
            )
            .await?;
    }
    Ok(())
}
