pub mod probe;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::models::Cluster;
use crate::store::Store;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct ClusterService {
    store: Store,
    cfg: Arc<AppConfig>,
}

impl ClusterService {
    pub fn new(store: Store, cfg: Arc<AppConfig>) -> Self {
        Self { store, cfg }
    }

    fn kubeconfig_path(&self, cluster_id: &str) -> std::path::PathBuf {
        self.cfg.configs_dir().join(format!("{cluster_id}.yaml"))
    }

    pub async fn read_kubeconfig(&self, cluster: &Cluster) -> AppResult<String> {
        tokio::fs::read_to_string(&cluster.kubeconfig_handle)
            .await
            .map_err(|e| AppError::Internal(format!("reading kubeconfig: {e}")))
    }

    pub async fn create(
        &self,
        name: String,
        kubeconfig_yaml: String,
        prometheus_url: Option<String>,
    ) -> AppResult<Cluster> {
        if name.trim().is_empty() {
            return Err(AppError::Validation("cluster name must not be empty".to_string()));
        }

        let id = Uuid::new_v4().to_string();
        let path = self.kubeconfig_path(&id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Internal(format!("creating configs dir: {e}")))?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let _ = tokio::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700)).await;
            }
        }
        tokio::fs::write(&path, &kubeconfig_yaml)
            .await
            .map_err(|e| AppError::Internal(format!("writing kubeconfig: {e}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).await;
        }

        let mut cluster = Cluster::new(id, name, path.display().to_string(), prometheus_url);

        let outcome = probe::probe(&kubeconfig_yaml, self.cfg.probe_timeout).await;
        cluster.connection_status = outcome.status;
        cluster.connection_message = Some(outcome.message);
        cluster.kubernetes_version = outcome.kubernetes_version;
        cluster.node_count = outcome.node_count;
        cluster.last_checked_at = Some(chrono::Utc::now());

        self.store.create_cluster(&cluster).await?;
        Ok(cluster)
    }

    pub async fn get(&self, id: &str) -> AppResult<Cluster> {
        self.store.get_cluster(id).await
    }

    pub async fn list(&self) -> AppResult<Vec<Cluster>> {
        self.store.list_clusters().await
    }

    pub async fn update(
        &self,
        id: &str,
        name: Option<String>,
        prometheus_url: Option<Option<String>>,
        execution_mode: Option<crate::models::ExecutionMode>,
        default_agent_id: Option<Option<String>>,
        new_kubeconfig_yaml: Option<String>,
    ) -> AppResult<Cluster> {
        let mut cluster = self.store.get_cluster(id).await?;

        if let Some(name) = name {
            cluster.name = name;
        }
        if let Some(url) = prometheus_url {
            cluster.prometheus_url = url;
        }
        if let Some(mode) = execution_mode {
            cluster.execution_mode = mode;
        }
        if let Some(agent_id) = default_agent_id {
            cluster.default_agent_id = agent_id;
        }

        // Invariant: execution_mode = agent ⇒ default_agent_id references an
        // existing, enabled agent, otherwise runs fall back to server.
        if cluster.execution_mode == crate::models::ExecutionMode::Agent {
            let usable = match &cluster.default_agent_id {
                Some(agent_id) => self.store.agent_is_usable(agent_id).await?,
                None => false,
            };
            if !usable {
                cluster.execution_mode = crate::models::ExecutionMode::Server;
            }
        }

        if let Some(yaml) = new_kubeconfig_yaml {
            tokio::fs::write(&cluster.kubeconfig_handle, &yaml)
                .await
                .map_err(|e| AppError::Internal(format!("writing kubeconfig: {e}")))?;
            let outcome = probe::probe(&yaml, self.cfg.probe_timeout).await;
            cluster.connection_status = outcome.status;
            cluster.connection_message = Some(outcome.message);
            cluster.kubernetes_version = outcome.kubernetes_version;
            cluster.node_count = outcome.node_count;
            cluster.last_checked_at = Some(chrono::Utc::now());
        }

        cluster.updated_at = chrono::Utc::now();
        self.store.update_cluster(&cluster).await?;
        Ok(cluster)
    }

    /// `delete_files=true` cascades: every run against this cluster (and its
    /// report artefacts, if any) is deleted along with the kubeconfig blob.
    /// `delete_files=false` leaves historic runs in place, weakly referencing
    /// a cluster id that no longer resolves (§3).
    pub async fn delete(&self, id: &str, delete_files: bool) -> AppResult<()> {
        let cluster = self.store.get_cluster(id).await?;

        if delete_files {
            let runs = self.store.list_runs_by_cluster(id).await?;
            let emitter = crate::reports::ReportEmitter::new(self.cfg.clone());
            for run in &runs {
                if let Some(report_path) = &run.report_path {
                    let _ = tokio::fs::remove_file(emitter.markdown_path(report_path)).await;
                    let _ = tokio::fs::remove_file(emitter.pdf_path(report_path)).await;
                }
                self.store.delete_run(&run.id).await?;
            }
        }

        self.store.delete_cluster(id).await?;
        if delete_files {
            let _ = tokio::fs::remove_file(&cluster.kubeconfig_handle).await;
        }
        Ok(())
    }

    pub async fn test_connection(&self, id: &str) -> AppResult<Cluster> {
        let mut cluster = self.store.get_cluster(id).await?;
        let yaml = self.read_kubeconfig(&cluster).await?;
        let outcome = probe::probe(&yaml, self.cfg.probe_timeout).await;
        cluster.connection_status = outcome.status;
        cluster.connection_message = Some(outcome.message);
        cluster.kubernetes_version = outcome.kubernetes_version;
        cluster.node_count = outcome.node_count;
        cluster.last_checked_at = Some(chrono::Utc::now());
        cluster.updated_at = chrono::Utc::now();
        self.store.update_cluster(&cluster).await?;
        Ok(cluster)
    }
}
